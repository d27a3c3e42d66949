use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use loadgrid_core::{LoadTable, RegionWeights};
use tracing::info;

use crate::io;

/// Parse a `REGION=SHARE` argument.
pub fn parse_weight(arg: &str) -> Result<(String, f64), String> {
    let (region, share) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected REGION=SHARE, got {arg:?}"))?;
    let region = region.trim();
    if region.is_empty() {
        return Err(format!("missing region name in {arg:?}"));
    }
    let share: f64 = share
        .trim()
        .parse()
        .map_err(|e| format!("invalid share in {arg:?}: {e}"))?;
    Ok((region.to_string(), share))
}

pub fn run(
    loads_path: &Path,
    value: &str,
    year: &str,
    weights: Vec<(String, f64)>,
    out: &Path,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (region, _) in &weights {
        if !seen.insert(region.as_str()) {
            bail!("region {region} given more than once");
        }
    }
    let weights: RegionWeights = weights.into_iter().collect();
    let loads = LoadTable::from_json_records(io::read_records(loads_path)?)
        .with_context(|| format!("invalid load projections {}", loads_path.display()))?;

    let regional = loadgrid_downscale::apportion(&loads, value, year, &weights)
        .context("failed to apportion load projections")?;

    io::write_records(out, regional.to_json_records())?;
    info!(regions = weights.len(), rows = regional.len(), path = %out.display(), "wrote regional projections");
    println!("✓ Apportioned {} rows into {}", regional.len(), out.display());
    Ok(())
}
