use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};

mod commands;
mod io;

#[derive(Parser)]
#[command(
    name = "loadgrid",
    about = "loadgrid: downscale load projections onto grid sites",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Downscale load projections onto the sites of a grid.
    ///
    /// Reads the site table and load projections named in the config and
    /// writes grid_load_projections.json to its out_dir.
    Downscale {
        /// Path to downscale.toml
        #[arg(short, long)]
        config: PathBuf,
        /// Override max_workers
        #[arg(long)]
        max_workers: Option<usize>,
        /// Override n_bootstraps
        #[arg(long)]
        n_bootstraps: Option<usize>,
        /// Override random_seed
        #[arg(long)]
        random_seed: Option<u64>,
    },
    /// Split aggregate load projections into regions with fixed shares
    Apportion {
        /// Load projections (JSON records)
        #[arg(short, long)]
        loads: PathBuf,
        /// Load value column
        #[arg(long)]
        value: String,
        /// Year column
        #[arg(long, default_value = "year")]
        year: String,
        /// Region share as REGION=SHARE; repeat for every region
        #[arg(short, long = "weight", value_parser = commands::apportion::parse_weight, required = true)]
        weights: Vec<(String, f64)>,
        /// Output file (JSON records)
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Check a config and its input files without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Generate a downscale.toml scaffold
    Init {
        /// Directory to write downscale.toml into
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Site table path written into the config
        #[arg(long, default_value = "grid.json")]
        grid: String,
        /// Load projections path written into the config
        #[arg(long, default_value = "load_projections.json")]
        loads: String,
        #[arg(long, default_value_t = 2022)]
        baseline_year: u32,
        /// Replace an existing downscale.toml
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let fallback = if cli.verbose {
        "info,loadgrid=debug,loadgrid_core=debug,loadgrid_downscale=debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (&cli.log_file, cli.log_json) {
        (Some(path), json) => {
            let file = std::fs::File::create(path)?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
        }
        (None, true) => builder.json().init(),
        (None, false) => builder.init(),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    match cli.command {
        Commands::Downscale {
            config,
            max_workers,
            n_bootstraps,
            random_seed,
        } => {
            let overrides = commands::downscale::Overrides {
                max_workers,
                n_bootstraps,
                random_seed,
            };
            commands::downscale::run(&config, &overrides).map(|_| ())
        }
        Commands::Apportion {
            loads,
            value,
            year,
            weights,
            out,
        } => commands::apportion::run(&loads, &value, &year, weights, &out),
        Commands::Validate { config } => commands::validate::run(&config),
        Commands::Init {
            path,
            grid,
            loads,
            baseline_year,
            force,
        } => commands::init::run(&path, &grid, &loads, baseline_year, force).map(|_| ()),
    }
}
