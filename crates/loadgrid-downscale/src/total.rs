//! Multi-period orchestrator for an aggregate load series.
//!
//! Periods are processed strictly in ascending order. Each period reads the
//! state left by the previous one, so the run is a fold:
//!
//! ```text
//! state_0 = initial(baseline)
//! state_k = apply(state_{k-1}, calibrate(target_k, snapshot(state_{k-1})))
//! ```
//!
//! Every state, the initial one included, is emitted as one row per site.
//! When the first period equals the baseline, that period's rows take the
//! place of the baseline rows.

use loadgrid_core::{LoadTable, Period, ProjectionRow, ProjectionTable, SiteTable};
use tracing::{info, warn};

use crate::calibrate::BootstrapCalibrator;
use crate::error::DownscaleResult;
use crate::params::{DownscaleParams, LoadColumns, SiteColumns};
use crate::series::LoadSeries;
use crate::state::{SiteInputs, SiteState};

/// Downscale an aggregate load series onto `sites`.
///
/// All input validation (parameters, duplicate periods, baseline ordering,
/// column presence and values) happens before the first trial runs.
pub fn downscale_total(
    sites: &SiteTable,
    site_columns: &SiteColumns,
    baseline: Period,
    loads: &LoadTable,
    load_columns: &LoadColumns,
    params: &DownscaleParams,
) -> DownscaleResult<ProjectionTable> {
    params.validate()?;
    let series = LoadSeries::from_table(loads, load_columns)?;
    series.check_baseline(baseline)?;
    let inputs = SiteInputs::from_table(sites, site_columns, params)?;
    let calibrator = BootstrapCalibrator::new(params.n_trials, params.max_workers)?;

    info!(
        sites = sites.len(),
        periods = series.len(),
        baseline = %baseline,
        trials = params.n_trials,
        workers = calibrator.workers(),
        "starting downscale"
    );

    run_periods(
        &calibrator,
        sites,
        &inputs,
        baseline,
        &series,
        load_columns,
        params.base_seed,
    )
}

/// Fold `series` over the sites, emitting the baseline rows and one row set
/// per period. Period `k` seeds its trials from `base_seed + k * n_trials`.
///
/// Baseline rows are skipped when the series starts at the baseline period,
/// so `(site, period)` stays unique.
pub(crate) fn run_periods(
    calibrator: &BootstrapCalibrator,
    sites: &SiteTable,
    inputs: &SiteInputs,
    baseline: Period,
    series: &LoadSeries,
    load_columns: &LoadColumns,
    base_seed: u64,
) -> DownscaleResult<ProjectionTable> {
    let mut table = ProjectionTable::new(&load_columns.value, &load_columns.period);
    let initial = SiteState::initial(inputs);
    let starts_at_baseline = series.points().first().map(|p| p.period) == Some(baseline);
    if !starts_at_baseline {
        emit(&mut table, sites, baseline, &initial);
    }

    let n_trials = calibrator.n_trials() as u64;
    series
        .points()
        .iter()
        .enumerate()
        .try_fold(initial, |state, (k, point)| -> DownscaleResult<SiteState> {
            let snapshot = state.snapshot(inputs);
            let seed = base_seed.wrapping_add((k as u64).wrapping_mul(n_trials));

            info!(
                period = %point.period,
                target = point.target,
                eligible = snapshot.len(),
                remaining = snapshot.total_remaining(),
                "allocating period"
            );
            if point.target == 0.0 {
                warn!(period = %point.period, "zero load increment, site state unchanged");
            }

            let allocation = calibrator.calibrate(point.target, &snapshot, seed)?;
            let next = state.apply(&snapshot, &allocation);
            emit(&mut table, sites, point.period, &next);
            Ok(next)
        })?;

    Ok(table)
}

fn emit(table: &mut ProjectionTable, sites: &SiteTable, period: Period, state: &SiteState) {
    for (record, &total_load) in sites.records().iter().zip(&state.total_load) {
        table.push(ProjectionRow {
            site_id: record.site_id.clone(),
            period,
            attributes: record.attributes.clone(),
            total_load,
            // The period's allocation is already folded into total_load.
            new_load: 0.0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DownscaleError;
    use loadgrid_core::{LoadRecord, SiteId, SiteRecord};

    fn sites() -> SiteTable {
        SiteTable::new(vec![
            SiteRecord::new("a").with("p", 1.0).with("base", 2.0).with("cap", 10.0).with("zone", "x"),
            SiteRecord::new("b").with("p", 3.0).with("base", 0.0).with("cap", 10.0).with("zone", "y"),
            SiteRecord::new("c").with("p", 0.0).with("base", 5.0).with("cap", 10.0).with("zone", "y"),
        ])
        .unwrap()
    }

    fn loads(rows: &[(f64, f64)]) -> LoadTable {
        LoadTable::new(
            rows.iter()
                .map(|&(year, load)| LoadRecord::new().with("year", year).with("load", load))
                .collect(),
        )
    }

    fn run(rows: &[(f64, f64)], params: &DownscaleParams) -> DownscaleResult<ProjectionTable> {
        downscale_total(
            &sites(),
            &SiteColumns::new("p", "base", "cap"),
            Period(2020),
            &loads(rows),
            &LoadColumns::new("load", "year"),
            params,
        )
    }

    fn params() -> DownscaleParams {
        DownscaleParams::default().with_trials(200).with_seed(1).with_workers(2)
    }

    #[test]
    fn emits_baseline_and_every_period() {
        let table = run(&[(2022.0, 4.0), (2021.0, 6.0)], &params()).unwrap();

        assert_eq!(table.len(), 9);
        assert_eq!(table.periods(), vec![Period(2020), Period(2021), Period(2022)]);
        assert_eq!(table.total_column(), "total_load");
        assert_eq!(table.period_total(Period(2020)), 7.0);
        assert!((table.period_total(Period(2021)) - 13.0).abs() < 1e-9);
        assert!((table.period_total(Period(2022)) - 17.0).abs() < 1e-9);
    }

    #[test]
    fn rows_keep_attributes_and_zero_new_load() {
        let table = run(&[(2021.0, 6.0)], &params()).unwrap();
        let row = table.get(&SiteId::from("b"), Period(2021)).unwrap();
        assert_eq!(row.attributes["zone"].as_text(), Some("y"));
        assert_eq!(row.new_load, 0.0);
        assert!(table.rows().iter().all(|r| r.new_load == 0.0));
    }

    #[test]
    fn zero_priority_sites_keep_baseline() {
        let table = run(&[(2021.0, 6.0), (2022.0, 8.0)], &params()).unwrap();
        for row in table.site_history(&SiteId::from("c")) {
            assert_eq!(row.total_load, 5.0);
        }
    }

    #[test]
    fn zero_target_leaves_state_unchanged() {
        let table = run(&[(2021.0, 0.0)], &params()).unwrap();
        for site in ["a", "b", "c"] {
            let id = SiteId::from(site);
            assert_eq!(
                table.get(&id, Period(2021)).unwrap().total_load,
                table.get(&id, Period(2020)).unwrap().total_load
            );
        }
    }

    #[test]
    fn same_seed_reproduces_run() {
        let first = run(&[(2021.0, 6.0), (2022.0, 5.0)], &params()).unwrap();
        let second = run(&[(2021.0, 6.0), (2022.0, 5.0)], &params().with_workers(4)).unwrap();
        assert_eq!(first.rows(), second.rows());
    }

    #[test]
    fn duplicate_period_fails_before_sampling() {
        let err = run(&[(2021.0, 6.0), (2021.0, 1.0)], &params()).unwrap_err();
        assert!(matches!(err, DownscaleError::DuplicatePeriod { .. }));
    }

    #[test]
    fn period_at_baseline_replaces_baseline_rows() {
        let table = run(&[(2020.0, 1.0), (2021.0, 1.0)], &params()).unwrap();

        assert_eq!(table.len(), 6);
        assert_eq!(table.periods(), vec![Period(2020), Period(2021)]);
        assert_eq!(table.site_history(&SiteId::from("a")).len(), 2);
        assert!((table.period_total(Period(2020)) - 8.0).abs() < 1e-9);
        assert!((table.period_total(Period(2021)) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn period_before_baseline_is_rejected() {
        let err = run(&[(2019.0, 1.0), (2021.0, 1.0)], &params()).unwrap_err();
        assert_eq!(
            err,
            DownscaleError::PeriodBeforeBaseline {
                period: Period(2019),
                baseline: Period(2020)
            }
        );
        assert!(err.is_validation());
    }

    #[test]
    fn demand_beyond_capacity_is_internal() {
        let err = run(&[(2021.0, 25.0)], &params()).unwrap_err();
        assert!(err.is_internal(), "{err}");
    }

    #[test]
    fn missing_priority_column_is_validation() {
        let err = downscale_total(
            &sites(),
            &SiteColumns::new("score", "base", "cap"),
            Period(2020),
            &loads(&[(2021.0, 1.0)]),
            &LoadColumns::new("load", "year"),
            &params(),
        )
        .unwrap_err();
        assert!(matches!(err, DownscaleError::Table(_)));
        assert!(err.is_validation());
    }
}
