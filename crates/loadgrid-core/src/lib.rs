//! Shared types for loadgrid crates.
//!
//! - **`types`**: site/region identifiers, periods, attribute values, region weights
//! - **`table`**: site tables and load projection tables with named columns
//! - **`projection`**: the per-site, per-period output table
//! - **`config`**: `downscale.toml` parsing and static validation

pub mod config;
pub mod error;
pub mod projection;
pub mod table;
pub mod types;

pub use config::{DownscaleConfig, ProjectionResolution};
pub use error::{CoreError, CoreResult};
pub use projection::{ProjectionRow, ProjectionTable};
pub use table::{LoadRecord, LoadTable, SiteRecord, SiteTable};
pub use types::*;
