use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use loadgrid_core::DownscaleConfig;

pub const CONFIG_FILE: &str = "downscale.toml";

pub fn run(dir: &Path, grid: &str, loads: &str, baseline_year: u32, force: bool) -> Result<PathBuf> {
    let output = dir.join(CONFIG_FILE);
    if output.exists() && !force {
        bail!("{} already exists, pass --force to replace it", output.display());
    }

    let config = DownscaleConfig::scaffold(grid, loads, baseline_year);
    std::fs::create_dir_all(dir)?;
    std::fs::write(&output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(output)
}
