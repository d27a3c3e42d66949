use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use loadgrid_core::{DownscaleConfig, LoadTable, Period, ProjectionResolution, ProjectionTable, SiteTable};
use loadgrid_downscale::{
    DownscaleError, DownscaleParams, LoadColumns, RegionSource, SiteColumns, downscale_regional,
    downscale_total,
};
use tracing::info;

use crate::io;

/// File written into `out_dir`.
pub const OUTPUT_FILE: &str = "grid_load_projections.json";

/// Command line values that replace config settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_workers: Option<usize>,
    pub n_bootstraps: Option<usize>,
    pub random_seed: Option<u64>,
}

impl Overrides {
    fn apply(&self, config: &mut DownscaleConfig) {
        if let Some(workers) = self.max_workers {
            config.max_workers = Some(workers);
        }
        if let Some(n) = self.n_bootstraps {
            config.n_bootstraps = n;
        }
        if let Some(seed) = self.random_seed {
            config.random_seed = seed;
        }
    }
}

/// A validated config together with its loaded input tables.
pub struct Inputs {
    pub config: DownscaleConfig,
    pub sites: SiteTable,
    pub loads: LoadTable,
}

/// Validate `config`, read its input files, and check them against it.
pub fn load_inputs(config: DownscaleConfig) -> Result<Inputs> {
    config.validate().context("invalid config")?;

    let sites = SiteTable::from_json_records(io::read_records(&config.grid)?, &config.grid_index)
        .with_context(|| format!("invalid site table {}", config.grid.display()))?;
    let loads = LoadTable::from_json_records(io::read_records(&config.load_projections)?)
        .with_context(|| format!("invalid load projections {}", config.load_projections.display()))?;

    config
        .validate_inputs(&sites, &loads)
        .context("inputs do not match config")?;
    Ok(Inputs {
        config,
        sites,
        loads,
    })
}

pub fn run(config_path: &Path, overrides: &Overrides) -> Result<PathBuf> {
    let mut config = DownscaleConfig::from_file(config_path)?;
    overrides.apply(&mut config);
    let inputs = load_inputs(config)?;

    info!(
        sites = inputs.sites.len(),
        load_rows = inputs.loads.len(),
        resolution = inputs.config.projection_resolution.as_str(),
        "loaded inputs"
    );

    let table = downscale(&inputs).map_err(explain)?;

    let output = inputs.config.out_dir.join(OUTPUT_FILE);
    io::write_records(&output, table.to_json_records(&inputs.config.grid_index))?;
    info!(path = %output.display(), rows = table.len(), "wrote projections");
    println!("✓ Wrote {} rows to {}", table.len(), output.display());
    Ok(output)
}

fn params(config: &DownscaleConfig) -> DownscaleParams {
    DownscaleParams {
        saturation_limit: config.site_saturation_limit,
        priority_power: config.priority_power,
        n_trials: config.n_bootstraps,
        base_seed: config.random_seed,
        max_workers: config.max_workers,
    }
}

fn downscale(inputs: &Inputs) -> Result<ProjectionTable, DownscaleError> {
    let config = &inputs.config;
    let site_columns = SiteColumns::new(
        &config.grid_priority,
        &config.grid_baseline_load,
        &config.grid_capacity,
    );
    let load_columns = LoadColumns::new(&config.load_value, &config.load_year);
    let baseline = Period(config.baseline_year);
    let params = params(config);

    match config.projection_resolution {
        ProjectionResolution::Total => downscale_total(
            &inputs.sites,
            &site_columns,
            baseline,
            &inputs.loads,
            &load_columns,
            &params,
        ),
        ProjectionResolution::Regional => {
            let source = match (&config.load_regions, &config.region_weights) {
                (Some(column), _) => RegionSource::Column(column.clone()),
                (None, Some(weights)) => RegionSource::Weights(weights.clone()),
                (None, None) => return Err(missing_setting("load_regions")),
            };
            let region_column = config
                .grid_region
                .as_deref()
                .ok_or_else(|| missing_setting("grid_region"))?;

            let outcome = downscale_regional(
                &inputs.sites,
                &site_columns,
                region_column,
                baseline,
                &inputs.loads,
                &load_columns,
                &source,
                &params,
            )?;
            if !outcome.unresolved_sites.is_empty() {
                println!(
                    "! {} sites had no matching region and were not allocated",
                    outcome.unresolved_sites.len()
                );
            }
            Ok(outcome.table)
        }
    }
}

fn missing_setting(name: &'static str) -> DownscaleError {
    DownscaleError::InvalidParameter {
        name,
        value: "not set".to_string(),
    }
}

fn explain(err: DownscaleError) -> anyhow::Error {
    let context = if err.is_internal() {
        "internal consistency check failed, please report this as a bug"
    } else {
        "invalid downscale input"
    };
    anyhow::Error::new(err).context(context)
}
