use std::path::Path;

use anyhow::Result;
use loadgrid_core::DownscaleConfig;

use super::downscale::load_inputs;

pub fn run(config_path: &Path) -> Result<()> {
    let config = DownscaleConfig::from_file(config_path)?;
    let inputs = load_inputs(config)?;
    println!(
        "✓ {} is valid: {} sites, {} load projection rows, {} resolution",
        config_path.display(),
        inputs.sites.len(),
        inputs.loads.len(),
        inputs.config.projection_resolution.as_str()
    );
    Ok(())
}
