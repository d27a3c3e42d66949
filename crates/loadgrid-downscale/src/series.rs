//! Load projection series, validated and ordered by period.

use std::collections::BTreeMap;

use loadgrid_core::{LoadTable, Period, RegionId};

use crate::error::{DownscaleError, DownscaleResult};
use crate::params::LoadColumns;

/// Load increment projected for one period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadPoint {
    pub period: Period,
    pub target: f64,
}

/// Periods in strictly increasing order, each with a non-negative target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSeries {
    points: Vec<LoadPoint>,
}

impl LoadSeries {
    /// Validate and sort points. Duplicate periods fail with `region` attached
    /// to the error when the series belongs to a region.
    pub fn new(mut points: Vec<LoadPoint>, region: Option<&RegionId>) -> DownscaleResult<Self> {
        for point in &points {
            if !(point.target.is_finite() && point.target >= 0.0) {
                return Err(DownscaleError::invalid_parameter(
                    "target_increment",
                    format!("{} for period {}", point.target, point.period),
                ));
            }
        }
        points.sort_by_key(|p| p.period);
        if let Some(pair) = points.windows(2).find(|w| w[0].period == w[1].period) {
            return Err(DownscaleError::DuplicatePeriod {
                period: pair[0].period,
                region: region.cloned(),
            });
        }
        Ok(Self { points })
    }

    /// Read an aggregate series from `loads`.
    pub fn from_table(loads: &LoadTable, columns: &LoadColumns) -> DownscaleResult<Self> {
        let periods = loads.period_column(&columns.period)?;
        let values = loads.numeric_column(&columns.value)?;
        let points = periods
            .into_iter()
            .zip(values)
            .map(|(period, target)| LoadPoint { period, target })
            .collect();
        Self::new(points, None)
    }

    pub fn points(&self) -> &[LoadPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.target).sum()
    }

    /// No period may precede the baseline period. A first period equal to
    /// the baseline is allowed and replaces the baseline rows in the output.
    pub fn check_baseline(&self, baseline: Period) -> DownscaleResult<()> {
        match self.points.first() {
            Some(first) if first.period < baseline => Err(DownscaleError::PeriodBeforeBaseline {
                period: first.period,
                baseline,
            }),
            _ => Ok(()),
        }
    }
}

/// Load series keyed by region, iterated in region order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionalSeries {
    regions: BTreeMap<RegionId, LoadSeries>,
}

impl RegionalSeries {
    /// Split a long-form table (one row per period and region) by region.
    ///
    /// Rows without a region value are rejected.
    pub fn from_table(
        loads: &LoadTable,
        columns: &LoadColumns,
        region_column: &str,
    ) -> DownscaleResult<Self> {
        let periods = loads.period_column(&columns.period)?;
        let values = loads.numeric_column(&columns.value)?;
        let labels = loads.text_column(region_column)?;

        let mut grouped: BTreeMap<RegionId, Vec<LoadPoint>> = BTreeMap::new();
        for (row, ((period, target), label)) in periods.into_iter().zip(values).zip(labels).enumerate() {
            let Some(label) = label else {
                return Err(DownscaleError::invalid_parameter(
                    "region",
                    format!("load projection row {row} has no {region_column} value"),
                ));
            };
            grouped
                .entry(RegionId::from(label))
                .or_default()
                .push(LoadPoint { period, target });
        }

        let mut regions = BTreeMap::new();
        for (region, points) in grouped {
            let series = LoadSeries::new(points, Some(&region))?;
            regions.insert(region, series);
        }
        Ok(Self { regions })
    }

    pub fn regions(&self) -> impl Iterator<Item = &RegionId> {
        self.regions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegionId, &LoadSeries)> {
        self.regions.iter()
    }

    pub fn get(&self, region: &RegionId) -> Option<&LoadSeries> {
        self.regions.get(region)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn check_baseline(&self, baseline: Period) -> DownscaleResult<()> {
        self.regions
            .values()
            .try_for_each(|series| series.check_baseline(baseline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgrid_core::LoadRecord;

    fn point(period: u32, target: f64) -> LoadPoint {
        LoadPoint {
            period: Period(period),
            target,
        }
    }

    #[test]
    fn sorts_periods_ascending() {
        let series = LoadSeries::new(vec![point(2030, 3.0), point(2025, 1.0)], None).unwrap();
        let periods: Vec<u32> = series.points().iter().map(|p| p.period.value()).collect();
        assert_eq!(periods, vec![2025, 2030]);
        assert_eq!(series.total(), 4.0);
    }

    #[test]
    fn duplicate_period_fails_fast() {
        let err = LoadSeries::new(vec![point(2030, 3.0), point(2030, 1.0)], None).unwrap_err();
        assert_eq!(
            err,
            DownscaleError::DuplicatePeriod {
                period: Period(2030),
                region: None
            }
        );
        assert!(err.is_validation());
    }

    #[test]
    fn negative_target_is_rejected() {
        let err = LoadSeries::new(vec![point(2030, -1.0)], None).unwrap_err();
        assert!(matches!(err, DownscaleError::InvalidParameter { .. }));
    }

    #[test]
    fn first_period_may_not_precede_baseline() {
        let series = LoadSeries::new(vec![point(2022, 1.0), point(2023, 1.0)], None).unwrap();
        assert!(series.check_baseline(Period(2021)).is_ok());
        assert!(series.check_baseline(Period(2022)).is_ok());
        let err = series.check_baseline(Period(2023)).unwrap_err();
        assert_eq!(
            err,
            DownscaleError::PeriodBeforeBaseline {
                period: Period(2022),
                baseline: Period(2023)
            }
        );
    }

    #[test]
    fn regional_series_groups_by_region() {
        let loads = LoadTable::new(vec![
            LoadRecord::new().with("year", 2024.0).with("zone", "north").with("load", 1.0),
            LoadRecord::new().with("year", 2023.0).with("zone", "north").with("load", 2.0),
            LoadRecord::new().with("year", 2023.0).with("zone", "south").with("load", 3.0),
        ]);
        let series =
            RegionalSeries::from_table(&loads, &LoadColumns::new("load", "year"), "zone").unwrap();

        assert_eq!(series.len(), 2);
        let north = series.get(&RegionId::from("north")).unwrap();
        assert_eq!(north.points()[0], point(2023, 2.0));
        assert_eq!(north.len(), 2);
    }

    #[test]
    fn regional_duplicates_are_scoped_per_region() {
        let loads = LoadTable::new(vec![
            LoadRecord::new().with("year", 2023.0).with("zone", "north").with("load", 1.0),
            LoadRecord::new().with("year", 2023.0).with("zone", "north").with("load", 2.0),
        ]);
        let err = RegionalSeries::from_table(&loads, &LoadColumns::new("load", "year"), "zone")
            .unwrap_err();
        assert_eq!(
            err,
            DownscaleError::DuplicatePeriod {
                period: Period(2023),
                region: Some(RegionId::from("north")),
            }
        );
    }
}
