//! Bootstrap calibrator.
//!
//! Runs `n_trials` independent deployment trials for one period, averages the
//! per-site allocations, and rescales the averages so they sum exactly to the
//! period target.
//!
//! Trials are grouped into fixed blocks of [`TRIAL_BLOCK`] consecutive trial
//! indices. Blocks run in parallel on a dedicated worker pool; each block is
//! summed sequentially and block sums are combined in block order. The result
//! is therefore bit-identical for any worker count, and memory stays bounded
//! by one partial sum per block.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{DownscaleError, DownscaleResult};
use crate::params::is_close;
use crate::simulate::simulate;
use crate::state::{Allocation, Snapshot};

/// Number of consecutive trials summed by one unit of parallel work.
pub const TRIAL_BLOCK: usize = 64;

/// Seed of trial `trial` within a period whose first trial uses `base_seed`.
pub fn trial_seed(base_seed: u64, trial: usize) -> u64 {
    base_seed.wrapping_add(trial as u64)
}

/// Averages many deployment trials into one allocation.
pub struct BootstrapCalibrator {
    n_trials: usize,
    pool: ThreadPool,
}

impl BootstrapCalibrator {
    /// Build a calibrator with its own worker pool. `max_workers = None`
    /// sizes the pool to the available cores.
    pub fn new(n_trials: usize, max_workers: Option<usize>) -> DownscaleResult<Self> {
        if n_trials == 0 {
            return Err(DownscaleError::invalid_parameter("n_trials", 0));
        }
        if max_workers == Some(0) {
            return Err(DownscaleError::invalid_parameter("max_workers", 0));
        }

        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("loadgrid-trial-{i}"));
        if let Some(workers) = max_workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| DownscaleError::WorkerPool(e.to_string()))?;

        Ok(Self { n_trials, pool })
    }

    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Calibrated allocation of `target` over `snapshot`.
    ///
    /// Trial `i` uses seed `trial_seed(base_seed, i)`. Sites a trial leaves
    /// out count as zero in the mean.
    pub fn calibrate(
        &self,
        target: f64,
        snapshot: &Snapshot,
        base_seed: u64,
    ) -> DownscaleResult<Allocation> {
        if target == 0.0 {
            return Ok(Allocation::zeros(snapshot.len()));
        }

        let n_blocks = self.n_trials.div_ceil(TRIAL_BLOCK);
        let block_sums: Vec<Vec<f64>> = self.pool.install(|| {
            (0..n_blocks)
                .into_par_iter()
                .map(|block| self.run_block(block, target, snapshot, base_seed))
                .collect::<DownscaleResult<Vec<_>>>()
        })?;

        let mut sums = vec![0.0; snapshot.len()];
        for block in &block_sums {
            for (sum, value) in sums.iter_mut().zip(block) {
                *sum += value;
            }
        }

        let n = self.n_trials as f64;
        let mean: Vec<f64> = sums.iter().map(|s| s / n).collect();
        let mean_total: f64 = mean.iter().sum();
        if !(mean_total > 0.0) {
            return Err(DownscaleError::CalibratedTotalMismatch {
                expected: target,
                actual: mean_total,
            });
        }

        let allocation = Allocation::new(mean.iter().map(|m| m / mean_total * target).collect());
        let total = allocation.total();
        if !is_close(total, target) {
            return Err(DownscaleError::CalibratedTotalMismatch {
                expected: target,
                actual: total,
            });
        }

        debug!(
            target,
            sites = snapshot.len(),
            trials = self.n_trials,
            base_seed,
            mean_total,
            "calibrated allocation"
        );
        Ok(allocation)
    }

    fn run_block(
        &self,
        block: usize,
        target: f64,
        snapshot: &Snapshot,
        base_seed: u64,
    ) -> DownscaleResult<Vec<f64>> {
        let start = block * TRIAL_BLOCK;
        let end = (start + TRIAL_BLOCK).min(self.n_trials);
        let mut sums = vec![0.0; snapshot.len()];
        for trial in start..end {
            let allocation = simulate(target, snapshot, trial_seed(base_seed, trial))?;
            for (sum, value) in sums.iter_mut().zip(allocation.values()) {
                *sum += value;
            }
        }
        Ok(sums)
    }
}

/// One-shot calibration with a temporary worker pool.
pub fn calibrate(
    target: f64,
    snapshot: &Snapshot,
    n_trials: usize,
    base_seed: u64,
    max_workers: Option<usize>,
) -> DownscaleResult<Allocation> {
    BootstrapCalibrator::new(n_trials, max_workers)?.calibrate(target, snapshot, base_seed)
}
