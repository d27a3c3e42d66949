//! Multi-period orchestrator for regional load series.
//!
//! Sites are partitioned by their region label and each partition is
//! downscaled independently against its region's series, with the same fold
//! as the aggregate path. Region partitions are processed in region order and
//! draw from disjoint seed ranges.

use std::collections::BTreeMap;

use loadgrid_core::{LoadTable, Period, ProjectionTable, RegionId, RegionWeights, SiteId, SiteTable};
use tracing::{info, warn};

use crate::apportion::{REGION_COLUMN, apportion};
use crate::calibrate::BootstrapCalibrator;
use crate::error::{DownscaleError, DownscaleResult};
use crate::params::{DownscaleParams, LoadColumns, SiteColumns};
use crate::series::{LoadSeries, RegionalSeries};
use crate::state::SiteInputs;
use crate::total::run_periods;

/// Where the per-region load series come from.
#[derive(Debug, Clone)]
pub enum RegionSource {
    /// The load table is already long form; this column holds the region.
    Column(String),
    /// The load table is aggregate; split it with fixed shares.
    Weights(RegionWeights),
}

/// Result of a regional run.
#[derive(Debug, Clone)]
pub struct RegionalOutcome {
    /// Rows of every resolved site, region by region.
    pub table: ProjectionTable,
    /// Sites whose region is missing or has no load series. Not allocated and
    /// not part of `table`.
    pub unresolved_sites: Vec<SiteId>,
    /// Regions downscaled, in processing order.
    pub regions: Vec<RegionId>,
}

struct Partition<'a> {
    region: &'a RegionId,
    series: &'a LoadSeries,
    sites: SiteTable,
    inputs: SiteInputs,
}

/// Downscale per-region load series onto the sites of each region.
///
/// `region_column` names the site attribute holding each site's region.
#[allow(clippy::too_many_arguments)]
pub fn downscale_regional(
    sites: &SiteTable,
    site_columns: &SiteColumns,
    region_column: &str,
    baseline: Period,
    loads: &LoadTable,
    load_columns: &LoadColumns,
    source: &RegionSource,
    params: &DownscaleParams,
) -> DownscaleResult<RegionalOutcome> {
    params.validate()?;

    let series = match source {
        RegionSource::Column(column) => RegionalSeries::from_table(loads, load_columns, column)?,
        RegionSource::Weights(weights) => {
            let long = apportion(loads, &load_columns.value, &load_columns.period, weights)?;
            RegionalSeries::from_table(&long, load_columns, REGION_COLUMN)?
        }
    };
    series.check_baseline(baseline)?;

    let mut positions: BTreeMap<&RegionId, Vec<usize>> =
        series.regions().map(|region| (region, Vec::new())).collect();
    let mut unresolved_sites = Vec::new();
    let labels = sites.text_column(region_column)?;
    for (position, (site_id, label)) in sites.site_ids().zip(labels).enumerate() {
        let members = match label {
            Some(label) => positions.get_mut(&RegionId::from(label)),
            None => None,
        };
        match members {
            Some(members) => members.push(position),
            None => unresolved_sites.push(site_id.clone()),
        }
    }
    if !unresolved_sites.is_empty() {
        warn!(
            count = unresolved_sites.len(),
            column = region_column,
            "excluding sites with unresolved regions"
        );
    }

    let partitions = series
        .iter()
        .map(|(region, region_series)| {
            let members = positions.remove(region).unwrap_or_default();
            if members.is_empty() {
                return Err(DownscaleError::UnknownRegion {
                    region: region.clone(),
                });
            }
            let subset = sites.select(&members);
            let inputs = SiteInputs::from_table(&subset, site_columns, params)?;
            Ok(Partition {
                region,
                series: region_series,
                sites: subset,
                inputs,
            })
        })
        .collect::<DownscaleResult<Vec<_>>>()?;

    let calibrator = BootstrapCalibrator::new(params.n_trials, params.max_workers)?;
    info!(
        regions = partitions.len(),
        sites = sites.len() - unresolved_sites.len(),
        unresolved = unresolved_sites.len(),
        trials = params.n_trials,
        workers = calibrator.workers(),
        "starting regional downscale"
    );

    let mut table = ProjectionTable::new(&load_columns.value, &load_columns.period);
    let mut regions = Vec::with_capacity(partitions.len());
    let mut seed = params.base_seed;
    for partition in &partitions {
        info!(
            region = %partition.region,
            sites = partition.sites.len(),
            periods = partition.series.len(),
            "downscaling region"
        );
        let region_table = run_periods(
            &calibrator,
            &partition.sites,
            &partition.inputs,
            baseline,
            partition.series,
            load_columns,
            seed,
        )?;
        table.append(region_table);
        regions.push(partition.region.clone());
        seed = seed.wrapping_add((partition.series.len() as u64).wrapping_mul(params.n_trials as u64));
    }

    Ok(RegionalOutcome {
        table,
        unresolved_sites,
        regions,
    })
}
