//! Run parameters and column bindings.

use crate::error::{DownscaleError, DownscaleResult};

/// Relative tolerance for allocation totals.
pub const REL_TOLERANCE: f64 = 1e-9;

/// Absolute floor for allocation totals, so totals near zero compare cleanly.
pub const ABS_TOLERANCE: f64 = 1e-9;

/// Default number of bootstrap trials per period.
pub const DEFAULT_N_TRIALS: usize = 10_000;

/// Whether two allocation totals agree within tolerance.
pub fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= (REL_TOLERANCE * a.abs().max(b.abs())).max(ABS_TOLERANCE)
}

/// Names of the site table columns the engine reads.
#[derive(Debug, Clone)]
pub struct SiteColumns {
    pub priority: String,
    pub baseline_load: String,
    pub capacity: String,
}

impl SiteColumns {
    pub fn new(
        priority: impl Into<String>,
        baseline_load: impl Into<String>,
        capacity: impl Into<String>,
    ) -> Self {
        Self {
            priority: priority.into(),
            baseline_load: baseline_load.into(),
            capacity: capacity.into(),
        }
    }
}

/// Names of the load projection columns the engine reads.
#[derive(Debug, Clone)]
pub struct LoadColumns {
    pub value: String,
    pub period: String,
}

impl LoadColumns {
    pub fn new(value: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            period: period.into(),
        }
    }
}

/// Tuning knobs of a downscaling run.
#[derive(Debug, Clone)]
pub struct DownscaleParams {
    /// Fraction of nominal capacity a site may ever absorb. Range: (0, 1].
    pub saturation_limit: f64,
    /// Exponent applied to priority to form the sampling weight.
    pub priority_power: f64,
    /// Bootstrap trials per period.
    pub n_trials: usize,
    /// Seed of the first trial of the first period.
    pub base_seed: u64,
    /// Worker threads for trial execution. `None` uses one per core.
    pub max_workers: Option<usize>,
}

impl Default for DownscaleParams {
    fn default() -> Self {
        Self {
            saturation_limit: 1.0,
            priority_power: 1.0,
            n_trials: DEFAULT_N_TRIALS,
            base_seed: 0,
            max_workers: None,
        }
    }
}

impl DownscaleParams {
    pub fn with_trials(mut self, n_trials: usize) -> Self {
        self.n_trials = n_trials;
        self
    }

    pub fn with_seed(mut self, base_seed: u64) -> Self {
        self.base_seed = base_seed;
        self
    }

    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_saturation_limit(mut self, limit: f64) -> Self {
        self.saturation_limit = limit;
        self
    }

    pub fn with_priority_power(mut self, power: f64) -> Self {
        self.priority_power = power;
        self
    }

    pub fn validate(&self) -> DownscaleResult<()> {
        if !(self.saturation_limit > 0.0 && self.saturation_limit <= 1.0) {
            return Err(DownscaleError::invalid_parameter(
                "saturation_limit",
                self.saturation_limit,
            ));
        }
        if !self.priority_power.is_finite() {
            return Err(DownscaleError::invalid_parameter(
                "priority_power",
                self.priority_power,
            ));
        }
        if self.n_trials == 0 {
            return Err(DownscaleError::invalid_parameter("n_trials", 0));
        }
        if self.max_workers == Some(0) {
            return Err(DownscaleError::invalid_parameter("max_workers", 0));
        }
        Ok(())
    }
}
