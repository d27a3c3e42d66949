//! Region apportioner.
//!
//! Splits an aggregate load series into per-region series with fixed shares.

use loadgrid_core::{LoadRecord, LoadTable, RegionWeights, config::REGION_WEIGHT_TOLERANCE};
use tracing::debug;

use crate::error::{DownscaleError, DownscaleResult};

/// Name of the region column in apportioned output.
pub const REGION_COLUMN: &str = "region";

/// Check that every share is in (0, 1] and the shares sum to 1.
pub fn validate_weights(weights: &RegionWeights) -> DownscaleResult<()> {
    let sum = weights.sum();
    if (sum - 1.0).abs() > REGION_WEIGHT_TOLERANCE * sum.abs().max(1.0) {
        return Err(DownscaleError::InvalidWeights { sum });
    }
    if let Some((region, weight)) = weights.iter().find(|(_, w)| !(*w > 0.0 && *w <= 1.0)) {
        return Err(DownscaleError::InvalidRegionWeight {
            region: region.clone(),
            weight,
        });
    }
    Ok(())
}

/// Apportion `loads` to regions.
///
/// Produces one record per (region, period) with `period_col`, [`REGION_COLUMN`]
/// and `value_col` set to the period value times the region's share. Records
/// are region-major: every period of the first region, then the next region.
pub fn apportion(
    loads: &LoadTable,
    value_col: &str,
    period_col: &str,
    weights: &RegionWeights,
) -> DownscaleResult<LoadTable> {
    validate_weights(weights)?;

    let periods = loads.period_column(period_col)?;
    let values = loads.numeric_column(value_col)?;

    let mut out = LoadTable::default();
    for (region, share) in weights.iter() {
        for (period, value) in periods.iter().zip(&values) {
            out.push(
                LoadRecord::new()
                    .with(period_col, f64::from(period.value()))
                    .with(REGION_COLUMN, region.as_str())
                    .with(value_col, value * share),
            );
        }
    }

    debug!(
        regions = weights.len(),
        periods = periods.len(),
        rows = out.len(),
        "apportioned load projections"
    );
    Ok(out)
}
