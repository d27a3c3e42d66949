//! downscale.toml configuration parser.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, CoreResult};
use crate::table::{LoadTable, SiteTable};
use crate::types::RegionWeights;

/// Tolerance for region weights summing to one.
pub const REGION_WEIGHT_TOLERANCE: f64 = 1e-10;

/// Spatial resolution of the input load projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionResolution {
    /// One aggregate series for the whole area.
    Total,
    /// Series resolved to regions, either explicitly or via a priori weights.
    Regional,
}

impl ProjectionResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionResolution::Total => "total",
            ProjectionResolution::Regional => "regional",
        }
    }
}

impl fmt::Display for ProjectionResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectionResolution {
    type Err = CoreError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "total" => Ok(ProjectionResolution::Total),
            "regional" => Ok(ProjectionResolution::Regional),
            other => Err(CoreError::invalid_config(
                "projection_resolution",
                format!("{other} is not a valid option (expected total or regional)"),
            )),
        }
    }
}

impl Serialize for ProjectionResolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProjectionResolution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownscaleConfig {
    /// Site table (JSON records).
    pub grid: PathBuf,
    /// Field holding the site id in `grid`.
    #[serde(default = "default_grid_index")]
    pub grid_index: String,
    pub grid_priority: String,
    pub grid_baseline_load: String,
    pub grid_capacity: String,
    pub baseline_year: u32,
    pub projection_resolution: ProjectionResolution,
    /// Load projections (JSON records).
    pub load_projections: PathBuf,
    pub load_value: String,
    pub load_year: String,
    pub out_dir: PathBuf,

    /// Site attribute holding each site's region. Regional runs only.
    pub grid_region: Option<String>,
    /// Load projection column holding the region of each row.
    pub load_regions: Option<String>,
    /// Shares used to apportion an aggregate series to regions.
    pub region_weights: Option<RegionWeights>,

    #[serde(default = "default_saturation")]
    pub site_saturation_limit: f64,
    #[serde(default = "default_priority_power")]
    pub priority_power: f64,
    #[serde(default = "default_n_bootstraps")]
    pub n_bootstraps: usize,
    #[serde(default)]
    pub random_seed: u64,
    pub max_workers: Option<usize>,
}

fn default_grid_index() -> String {
    "site_id".to_string()
}

fn default_saturation() -> f64 {
    1.0
}

fn default_priority_power() -> f64 {
    1.0
}

fn default_n_bootstraps() -> usize {
    10_000
}

impl DownscaleConfig {
    /// Parse a config file. Relative input and output paths are resolved
    /// against the directory containing the file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: DownscaleConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.grid, &mut self.load_projections, &mut self.out_dir] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Scaffold a minimal total-resolution config.
    pub fn scaffold(grid: &str, load_projections: &str, baseline_year: u32) -> Self {
        DownscaleConfig {
            grid: PathBuf::from(grid),
            grid_index: default_grid_index(),
            grid_priority: "suitability_score".to_string(),
            grid_baseline_load: "baseline_load".to_string(),
            grid_capacity: "developable_capacity".to_string(),
            baseline_year,
            projection_resolution: ProjectionResolution::Total,
            load_projections: PathBuf::from(load_projections),
            load_value: "load".to_string(),
            load_year: "year".to_string(),
            out_dir: PathBuf::from("."),
            grid_region: None,
            load_regions: None,
            region_weights: None,
            site_saturation_limit: default_saturation(),
            priority_power: default_priority_power(),
            n_bootstraps: default_n_bootstraps(),
            random_seed: 0,
            max_workers: None,
        }
    }

    /// Checks that need no input data.
    pub fn validate(&self) -> CoreResult<()> {
        if self.baseline_year == 0 {
            return Err(CoreError::invalid_config("baseline_year", "must be positive"));
        }
        if !(self.site_saturation_limit > 0.0 && self.site_saturation_limit <= 1.0) {
            return Err(CoreError::invalid_config(
                "site_saturation_limit",
                format!("{} is outside (0, 1]", self.site_saturation_limit),
            ));
        }
        if !self.priority_power.is_finite() {
            return Err(CoreError::invalid_config("priority_power", "must be finite"));
        }
        if self.n_bootstraps == 0 {
            return Err(CoreError::invalid_config("n_bootstraps", "must be positive"));
        }
        if self.max_workers == Some(0) {
            return Err(CoreError::invalid_config("max_workers", "must be positive when set"));
        }

        match self.projection_resolution {
            ProjectionResolution::Total => {
                if self.load_regions.is_some() || self.region_weights.is_some() {
                    return Err(CoreError::invalid_config(
                        "projection_resolution",
                        "load_regions and region_weights only apply to regional projections",
                    ));
                }
            }
            ProjectionResolution::Regional => {
                if self.grid_region.is_none() {
                    return Err(CoreError::invalid_config(
                        "grid_region",
                        "required when projection_resolution is regional",
                    ));
                }
                match (&self.load_regions, &self.region_weights) {
                    (Some(_), Some(_)) | (None, None) => {
                        return Err(CoreError::invalid_config(
                            "load_regions",
                            "exactly one of load_regions or region_weights must be specified",
                        ));
                    }
                    (None, Some(weights)) => {
                        let sum = weights.sum();
                        if (sum - 1.0).abs() > REGION_WEIGHT_TOLERANCE {
                            return Err(CoreError::invalid_config(
                                "region_weights",
                                format!("weights must sum to 1, sum of input weights is {sum}"),
                            ));
                        }
                    }
                    (Some(_), None) => {}
                }
            }
        }
        Ok(())
    }

    /// Checks against the loaded site table and load projections.
    pub fn validate_inputs(&self, sites: &SiteTable, loads: &LoadTable) -> CoreResult<()> {
        for column in [&self.grid_priority, &self.grid_baseline_load, &self.grid_capacity] {
            sites.numeric_column(column)?;
        }
        loads.numeric_column(&self.load_value)?;
        let years = loads.period_column(&self.load_year)?;

        if let Some(first) = years.iter().min() {
            if first.value() < self.baseline_year {
                return Err(CoreError::invalid_config(
                    "baseline_year",
                    format!(
                        "first year in load_projections ({first}) precedes the input baseline_year ({})",
                        self.baseline_year
                    ),
                ));
            }
        }

        if self.projection_resolution == ProjectionResolution::Regional {
            if let Some(column) = &self.grid_region {
                sites.text_column(column)?;
            }
            if let Some(column) = &self.load_regions {
                loads.text_column(column)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{LoadRecord, SiteRecord};

    const MINIMAL: &str = r#"
grid = "grid.json"
grid_priority = "suitability_score"
grid_baseline_load = "dc_capacity_mw_existing"
grid_capacity = "developable_capacity_mw"
baseline_year = 2022
projection_resolution = "TOTAL"
load_projections = "loads.json"
load_value = "dc_load_mw"
load_year = "year"
out_dir = "out"
"#;

    fn sites() -> SiteTable {
        SiteTable::new(vec![
            SiteRecord::new("1")
                .with("suitability_score", 0.9)
                .with("dc_capacity_mw_existing", 0.0)
                .with("developable_capacity_mw", 10.0)
                .with("zone", "north"),
        ])
        .unwrap()
    }

    fn loads(years: &[f64]) -> LoadTable {
        LoadTable::new(
            years
                .iter()
                .map(|&y| LoadRecord::new().with("year", y).with("dc_load_mw", 5.0))
                .collect(),
        )
    }

    #[test]
    fn parse_minimal_with_defaults() {
        let config: DownscaleConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.projection_resolution, ProjectionResolution::Total);
        assert_eq!(config.grid_index, "site_id");
        assert_eq!(config.n_bootstraps, 10_000);
        assert_eq!(config.site_saturation_limit, 1.0);
        assert_eq!(config.random_seed, 0);
        assert!(config.max_workers.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn resolution_is_case_insensitive() {
        for value in ["regional", "REGIONAL", "Regional"] {
            let parsed: ProjectionResolution = value.parse().unwrap();
            assert_eq!(parsed, ProjectionResolution::Regional);
        }
        assert!("national".parse::<ProjectionResolution>().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = format!("{MINIMAL}\nbogus = 1\n");
        assert!(toml::from_str::<DownscaleConfig>(&text).is_err());
    }

    #[test]
    fn scaffold_roundtrips_through_toml() {
        let config = DownscaleConfig::scaffold("grid.json", "loads.json", 2022);
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("projection_resolution = \"total\""));
        let back: DownscaleConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.baseline_year, 2022);
    }

    #[test]
    fn regional_requires_exactly_one_region_source() {
        let mut config: DownscaleConfig = toml::from_str(MINIMAL).unwrap();
        config.projection_resolution = ProjectionResolution::Regional;
        config.grid_region = Some("zone".to_string());
        assert!(config.validate().is_err());

        config.load_regions = Some("zone".to_string());
        config.validate().unwrap();

        config.region_weights = Some([("north", 1.0)].into_iter().collect());
        assert!(config.validate().is_err());
    }

    #[test]
    fn region_weights_must_sum_to_one() {
        let mut config: DownscaleConfig = toml::from_str(MINIMAL).unwrap();
        config.projection_resolution = ProjectionResolution::Regional;
        config.grid_region = Some("zone".to_string());
        config.region_weights = Some([("north", 0.5), ("south", 0.2)].into_iter().collect());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must sum to 1"));
    }

    #[test]
    fn saturation_limit_bounds() {
        let mut config: DownscaleConfig = toml::from_str(MINIMAL).unwrap();
        config.site_saturation_limit = 0.0;
        assert!(config.validate().is_err());
        config.site_saturation_limit = 1.5;
        assert!(config.validate().is_err());
        config.site_saturation_limit = 0.5;
        config.validate().unwrap();
    }

    #[test]
    fn inputs_must_have_configured_columns() {
        let config: DownscaleConfig = toml::from_str(MINIMAL).unwrap();
        config.validate_inputs(&sites(), &loads(&[2023.0, 2024.0])).unwrap();

        let mut renamed = config.clone();
        renamed.grid_priority = "best_site_score".to_string();
        let err = renamed.validate_inputs(&sites(), &loads(&[2023.0])).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn projections_must_follow_baseline_year() {
        let config: DownscaleConfig = toml::from_str(MINIMAL).unwrap();
        let err = config.validate_inputs(&sites(), &loads(&[2021.0, 2030.0])).unwrap_err();
        assert!(err.to_string().contains("precedes the input baseline_year"));
    }

    #[test]
    fn projections_may_start_at_baseline_year() {
        let config: DownscaleConfig = toml::from_str(MINIMAL).unwrap();
        config.validate_inputs(&sites(), &loads(&[2022.0, 2030.0])).unwrap();
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let mut config: DownscaleConfig = toml::from_str(MINIMAL).unwrap();
        config.resolve_paths(Path::new("/data/run1"));
        assert_eq!(config.grid, PathBuf::from("/data/run1/grid.json"));
        assert_eq!(config.out_dir, PathBuf::from("/data/run1/out"));
    }
}
