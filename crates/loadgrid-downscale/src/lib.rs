//! loadgrid downscaling engine: regional apportionment, bootstrap
//! deployment and multi-period allocation.
//!
//! This crate turns aggregate load projections into per-site load
//! trajectories. It reads site and load tables from `loadgrid-core` and
//! produces a [`ProjectionTable`](loadgrid_core::ProjectionTable); reading and
//! writing files is left to the caller.
//!
//! # Components
//!
//! - **`apportion`**: split an aggregate series into regions with fixed shares
//! - **`simulate`**: one weight-biased deployment trial
//! - **`calibrate`**: parallel bootstrap over many trials, rescaled to the target
//! - **`total`**: multi-period fold over an aggregate series
//! - **`regional`**: per-region partitioning on top of the same fold
//! - **`state`**: per-site run state, snapshots and allocations

pub mod apportion;
pub mod calibrate;
pub mod error;
pub mod params;
pub mod regional;
pub mod series;
pub mod simulate;
pub mod state;
pub mod total;

pub use apportion::{REGION_COLUMN, apportion, validate_weights};
pub use calibrate::{BootstrapCalibrator, TRIAL_BLOCK, calibrate, trial_seed};
pub use error::{DownscaleError, DownscaleResult};
pub use params::{DownscaleParams, LoadColumns, SiteColumns, is_close};
pub use regional::{RegionSource, RegionalOutcome, downscale_regional};
pub use series::{LoadPoint, LoadSeries, RegionalSeries};
pub use simulate::{simulate, weighted_order};
pub use state::{Allocation, SiteInputs, SiteState, Snapshot, SnapshotSite};
pub use total::downscale_total;
