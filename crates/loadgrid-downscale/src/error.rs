//! Downscaling error types.

use loadgrid_core::{CoreError, Period, RegionId, SiteId};
use thiserror::Error;

/// Errors that can occur while apportioning or downscaling load.
///
/// Variants fall into two classes. Validation errors are raised before any
/// sampling starts and point at input the caller can fix. Internal errors
/// are consistency checks on the allocator's own output and indicate a
/// defect in this crate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DownscaleError {
    #[error("weights of input region_weights must sum to 1, sum of input weights is: {sum}")]
    InvalidWeights { sum: f64 },

    #[error("region weight for {region} must be in (0, 1], got {weight}")]
    InvalidRegionWeight { region: RegionId, weight: f64 },

    #[error("multiple records for load projections period {period}{}", region_suffix(.region))]
    DuplicatePeriod {
        period: Period,
        region: Option<RegionId>,
    },

    #[error("load projection period {period} precedes the baseline period {baseline}")]
    PeriodBeforeBaseline { period: Period, baseline: Period },

    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("load projections reference region {region}, which has no sites")]
    UnknownRegion { region: RegionId },

    #[error(transparent)]
    Table(#[from] CoreError),

    #[error("shortfall {shortfall} exceeds remaining capacity {remaining} of boundary site {}", site_label(.site_id))]
    ShortfallExceedsCapacity {
        site_id: Option<SiteId>,
        shortfall: f64,
        remaining: f64,
    },

    #[error("deployed total {actual} is not equal to projected total {expected}")]
    TrialTotalMismatch { expected: f64, actual: f64 },

    #[error("calibrated total {actual} is not equal to projected total {expected}")]
    CalibratedTotalMismatch { expected: f64, actual: f64 },

    #[error("failed to build trial worker pool: {0}")]
    WorkerPool(String),
}

fn region_suffix(region: &Option<RegionId>) -> String {
    region
        .as_ref()
        .map(|r| format!(" in region {r}"))
        .unwrap_or_default()
}

fn site_label(site_id: &Option<SiteId>) -> String {
    site_id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<none>".to_string())
}

impl DownscaleError {
    pub(crate) fn invalid_parameter(name: &'static str, value: impl ToString) -> Self {
        DownscaleError::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }

    /// True for errors caused by caller input ("fix your input").
    pub fn is_validation(&self) -> bool {
        !self.is_internal()
    }

    /// True for failed consistency checks on the allocator itself ("file a bug").
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            DownscaleError::ShortfallExceedsCapacity { .. }
                | DownscaleError::TrialTotalMismatch { .. }
                | DownscaleError::CalibratedTotalMismatch { .. }
                | DownscaleError::WorkerPool(_)
        )
    }
}

pub type DownscaleResult<T> = Result<T, DownscaleError>;
