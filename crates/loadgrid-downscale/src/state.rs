//! Per-site run state.
//!
//! A run folds over periods: each period reads an immutable [`SiteState`],
//! takes a [`Snapshot`] of the sites eligible for allocation, and produces the
//! next state from the calibrated [`Allocation`]. Trials only ever see the
//! snapshot.

use loadgrid_core::{SiteId, SiteTable};

use crate::error::{DownscaleError, DownscaleResult};
use crate::params::{DownscaleParams, SiteColumns};

/// Per-site values fixed for the whole run, in site table order.
#[derive(Debug, Clone)]
pub struct SiteInputs {
    pub site_ids: Vec<SiteId>,
    /// `priority ^ priority_power`.
    pub weights: Vec<f64>,
    pub baseline_load: Vec<f64>,
    /// `capacity * saturation_limit`.
    pub developable_capacity: Vec<f64>,
}

impl SiteInputs {
    pub fn from_table(
        sites: &SiteTable,
        columns: &SiteColumns,
        params: &DownscaleParams,
    ) -> DownscaleResult<Self> {
        let priority = sites.numeric_column(&columns.priority)?;
        let baseline_load = sites.numeric_column(&columns.baseline_load)?;
        let capacity = sites.numeric_column(&columns.capacity)?;
        let site_ids: Vec<SiteId> = sites.site_ids().cloned().collect();

        for (i, site_id) in site_ids.iter().enumerate() {
            for (name, value) in [
                ("priority", priority[i]),
                ("baseline_load", baseline_load[i]),
                ("capacity", capacity[i]),
            ] {
                if !(value.is_finite() && value >= 0.0) {
                    return Err(DownscaleError::invalid_parameter(
                        name,
                        format!("{value} for site {site_id}"),
                    ));
                }
            }
        }

        let weights = priority
            .iter()
            .map(|p| p.powf(params.priority_power))
            .collect();
        let developable_capacity = capacity
            .iter()
            .map(|c| c * params.saturation_limit)
            .collect();

        Ok(Self {
            site_ids,
            weights,
            baseline_load,
            developable_capacity,
        })
    }

    pub fn len(&self) -> usize {
        self.site_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.site_ids.is_empty()
    }
}

/// Running state of every site after a period closes.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteState {
    /// Capacity still available. Non-increasing across periods.
    pub remaining_capacity: Vec<f64>,
    /// Baseline plus all allocations so far. Non-decreasing across periods.
    pub total_load: Vec<f64>,
}

impl SiteState {
    /// State at the baseline period: full developable capacity, baseline load.
    pub fn initial(inputs: &SiteInputs) -> Self {
        Self {
            remaining_capacity: inputs.developable_capacity.clone(),
            total_load: inputs.baseline_load.clone(),
        }
    }

    /// Sites with strictly positive weight, in site table order.
    pub fn snapshot(&self, inputs: &SiteInputs) -> Snapshot {
        let sites = inputs
            .weights
            .iter()
            .enumerate()
            .filter(|(_, w)| **w > 0.0)
            .map(|(position, &weight)| SnapshotSite {
                position,
                site_id: inputs.site_ids[position].clone(),
                remaining_capacity: self.remaining_capacity[position],
                weight,
            })
            .collect();
        Snapshot { sites }
    }

    /// Fold a calibrated allocation into a new state.
    pub fn apply(&self, snapshot: &Snapshot, allocation: &Allocation) -> SiteState {
        let mut next = self.clone();
        for (site, &amount) in snapshot.sites.iter().zip(allocation.values()) {
            next.total_load[site.position] += amount;
            // Calibration rescales by a factor within rounding of 1, so a
            // fully allocated site can land a few ulps below zero.
            next.remaining_capacity[site.position] =
                (next.remaining_capacity[site.position] - amount).max(0.0);
        }
        next
    }
}

/// A site as seen by the trials of one period.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSite {
    /// Row position in the site table.
    pub position: usize,
    pub site_id: SiteId,
    pub remaining_capacity: f64,
    pub weight: f64,
}

/// Read-only view of the eligible sites for one period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    sites: Vec<SnapshotSite>,
}

impl Snapshot {
    /// Build a snapshot from `(site_id, remaining_capacity, weight)` triples.
    /// Sites without positive weight are left out.
    pub fn from_sites<I, S>(sites: I) -> Self
    where
        I: IntoIterator<Item = (S, f64, f64)>,
        S: Into<SiteId>,
    {
        let sites = sites
            .into_iter()
            .enumerate()
            .filter(|(_, (_, _, weight))| *weight > 0.0)
            .map(|(position, (site_id, remaining_capacity, weight))| SnapshotSite {
                position,
                site_id: site_id.into(),
                remaining_capacity,
                weight,
            })
            .collect();
        Self { sites }
    }

    pub fn sites(&self) -> &[SnapshotSite] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn total_remaining(&self) -> f64 {
        self.sites.iter().map(|s| s.remaining_capacity).sum()
    }
}

/// Allocated load per snapshot site, aligned with [`Snapshot::sites`].
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation(Vec<f64>);

impl Allocation {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum in snapshot order.
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Pair each value with its site id.
    pub fn by_site<'a>(&'a self, snapshot: &'a Snapshot) -> impl Iterator<Item = (&'a SiteId, f64)> {
        snapshot.sites.iter().map(|s| &s.site_id).zip(self.0.iter().copied())
    }

    /// Allocation of a single site, if it is part of the snapshot.
    pub fn get(&self, snapshot: &Snapshot, site_id: &SiteId) -> Option<f64> {
        self.by_site(snapshot)
            .find(|(id, _)| *id == site_id)
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgrid_core::SiteRecord;

    fn table() -> SiteTable {
        SiteTable::new(vec![
            SiteRecord::new("a").with("p", 2.0).with("base", 1.0).with("cap", 10.0),
            SiteRecord::new("b").with("p", 0.0).with("base", 0.0).with("cap", 10.0),
            SiteRecord::new("c").with("p", 0.5).with("base", 3.0).with("cap", 4.0),
        ])
        .unwrap()
    }

    fn columns() -> SiteColumns {
        SiteColumns::new("p", "base", "cap")
    }

    #[test]
    fn inputs_apply_power_and_saturation() {
        let params = DownscaleParams::default()
            .with_priority_power(2.0)
            .with_saturation_limit(0.5);
        let inputs = SiteInputs::from_table(&table(), &columns(), &params).unwrap();

        assert_eq!(inputs.weights, vec![4.0, 0.0, 0.25]);
        assert_eq!(inputs.developable_capacity, vec![5.0, 5.0, 2.0]);
        assert_eq!(inputs.baseline_load, vec![1.0, 0.0, 3.0]);
    }

    #[test]
    fn negative_capacity_is_rejected() {
        let sites = SiteTable::new(vec![
            SiteRecord::new("a").with("p", 1.0).with("base", 0.0).with("cap", -1.0),
        ])
        .unwrap();
        let err = SiteInputs::from_table(&sites, &columns(), &DownscaleParams::default()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn snapshot_excludes_zero_weight_sites() {
        let inputs = SiteInputs::from_table(&table(), &columns(), &DownscaleParams::default()).unwrap();
        let state = SiteState::initial(&inputs);
        let snapshot = state.snapshot(&inputs);

        let ids: Vec<&str> = snapshot.sites().iter().map(|s| s.site_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(snapshot.sites()[1].position, 2);
    }

    #[test]
    fn apply_moves_load_from_capacity_to_total() {
        let inputs = SiteInputs::from_table(&table(), &columns(), &DownscaleParams::default()).unwrap();
        let state = SiteState::initial(&inputs);
        let snapshot = state.snapshot(&inputs);
        let next = state.apply(&snapshot, &Allocation::new(vec![6.0, 4.0]));

        assert_eq!(next.total_load, vec![7.0, 0.0, 7.0]);
        assert_eq!(next.remaining_capacity, vec![4.0, 10.0, 0.0]);
        // The previous state is untouched.
        assert_eq!(state.total_load, vec![1.0, 0.0, 3.0]);
    }

    #[test]
    fn apply_clamps_rounding_below_zero() {
        let snapshot = Snapshot::from_sites([("a", 1.0, 1.0)]);
        let state = SiteState {
            remaining_capacity: vec![1.0],
            total_load: vec![0.0],
        };
        let next = state.apply(&snapshot, &Allocation::new(vec![1.0 + 1e-15]));
        assert_eq!(next.remaining_capacity, vec![0.0]);
    }

    #[test]
    fn allocation_lookup_by_site() {
        let snapshot = Snapshot::from_sites([("a", 1.0, 1.0), ("b", 1.0, 0.0), ("c", 2.0, 1.0)]);
        let allocation = Allocation::new(vec![0.5, 1.5]);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(allocation.get(&snapshot, &SiteId::from("c")), Some(1.5));
        assert_eq!(allocation.get(&snapshot, &SiteId::from("b")), None);
        assert_eq!(allocation.total(), 2.0);
    }
}
