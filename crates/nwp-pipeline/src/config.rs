//! Pipeline configuration.
//!
//! One immutable [`PipelineConfig`] value is handed to the pipeline at
//! construction; nothing is read from process-wide state afterwards.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use nwp_common::{BoundingBox, DerivedProduct, LeadTime, Variable};
use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Everything one pipeline invocation needs to know.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Staging root holding `grib/`, `tif/` and `txt/`
    pub root_dir: PathBuf,
    #[serde(default)]
    pub source: SourceConfig,
    /// Variables fetched for every lead time
    pub variables: Vec<Variable>,
    pub lead_times: LeadTimes,
    /// Products computed from several variables of one lead time
    #[serde(default)]
    pub derived: Vec<DerivedProduct>,
    /// Keep component rasters after a derived product has been written
    #[serde(default)]
    pub keep_components: bool,
    /// Clip window for every output raster
    pub bbox: BoundingBox,
    pub regrid: RegridConfig,
    #[serde(default)]
    pub raster: RasterConfig,
    /// Units processed concurrently within one stage
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

fn default_concurrency() -> usize {
    4
}

/// Remote archive source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_root_url")]
    pub root_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_grid_kind")]
    pub grid_kind: String,
    #[serde(default = "default_level_kind")]
    pub level_kind: String,
    /// Pause after every request, whatever its outcome
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

fn default_root_url() -> String {
    "https://opendata.dwd.de/weather/nwp/icon/grib".to_string()
}

fn default_model() -> String {
    "icon_global".to_string()
}

fn default_grid_kind() -> String {
    "icosahedral".to_string()
}

fn default_level_kind() -> String {
    "single-level".to_string()
}

fn default_request_delay_ms() -> u64 {
    500
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            model: default_model(),
            grid_kind: default_grid_kind(),
            level_kind: default_level_kind(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl SourceConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// External regridding tool (CDO) and its shared read-only inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct RegridConfig {
    #[serde(default = "default_regrid_program")]
    pub program: String,
    /// CDO output format passed to `-f`
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Target grid description
    pub target_grid: PathBuf,
    /// Precomputed interpolation weights
    pub weights: PathBuf,
}

fn default_regrid_program() -> String {
    "cdo".to_string()
}

fn default_output_format() -> String {
    "grb2".to_string()
}

/// External raster tool (gdal_translate) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RasterConfig {
    #[serde(default = "default_raster_program")]
    pub program: String,
    #[serde(default = "default_output_type")]
    pub output_type: String,
    #[serde(default = "default_srs")]
    pub srs: String,
}

fn default_raster_program() -> String {
    "gdal_translate".to_string()
}

fn default_output_type() -> String {
    "Float32".to_string()
}

fn default_srs() -> String {
    "EPSG:4326".to_string()
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            program: default_raster_program(),
            output_type: default_output_type(),
            srs: default_srs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
    #[serde(default = "default_tool_secs")]
    pub tool_secs: u64,
}

fn default_request_secs() -> u64 {
    300
}

fn default_tool_secs() -> u64 {
    600
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: default_request_secs(),
            tool_secs: default_tool_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_secs(self.tool_secs)
    }
}

/// Lead times, either listed explicitly or as an inclusive range.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LeadTimes {
    List(Vec<u16>),
    Range { start: u16, end: u16, step: u16 },
}

impl LeadTimes {
    /// The configured lead times in order, duplicates removed.
    pub fn hours(&self) -> Vec<LeadTime> {
        let raw: Vec<u16> = match self {
            LeadTimes::List(hours) => hours.clone(),
            LeadTimes::Range { start, end, step } => {
                (*start..=*end).step_by((*step).max(1) as usize).collect()
            }
        };

        let mut seen = HashSet::new();
        raw.into_iter()
            .filter(|h| seen.insert(*h))
            .map(LeadTime::new)
            .collect()
    }
}

impl PipelineConfig {
    /// Lead times of every run.
    pub fn lead_times(&self) -> Vec<LeadTime> {
        self.lead_times.hours()
    }

    /// Variables of every run, duplicates removed.
    pub fn variables(&self) -> Vec<Variable> {
        let mut seen = HashSet::new();
        self.variables
            .iter()
            .copied()
            .filter(|v| seen.insert(*v))
            .collect()
    }

    /// Check the configuration for values that would make every run fail.
    pub fn validate(&self) -> Result<()> {
        if self.variables.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one variable is required".to_string(),
            ));
        }
        if self.lead_times().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one lead time is required".to_string(),
            ));
        }
        if let LeadTimes::Range { step: 0, .. } = self.lead_times {
            return Err(PipelineError::InvalidConfig(
                "lead time step must be positive".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if !self.bbox.is_valid() {
            return Err(PipelineError::InvalidConfig(format!(
                "bounding box needs left < right and bottom < top: {:?}",
                self.bbox
            )));
        }
        for product in &self.derived {
            for component in product.components() {
                if !self.variables.contains(&component) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "{} requires variable {}",
                        product, component
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
root_dir: /data/icon
variables: [T_2M, TOT_PREC, U_10M, V_10M]
lead_times: [6, 12, 18]
derived: [WIND_10M]
bbox: { left: 19.0, right: 60.0, top: 70.0, bottom: 40.0 }
regrid:
  target_grid: /data/icon/grids/target_grid_world_0125.txt
  weights: /data/icon/grids/weights_icogl2world_0125.nc
"#;

    fn minimal() -> PipelineConfig {
        serde_yaml::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = minimal();
        assert_eq!(config.source.root_url, "https://opendata.dwd.de/weather/nwp/icon/grib");
        assert_eq!(config.source.model, "icon_global");
        assert_eq!(config.regrid.program, "cdo");
        assert_eq!(config.regrid.output_format, "grb2");
        assert_eq!(config.raster.program, "gdal_translate");
        assert_eq!(config.raster.output_type, "Float32");
        assert_eq!(config.concurrency, 4);
        assert!(!config.keep_components);
        assert_eq!(config.timeouts.tool(), Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lead_time_range() {
        let lt = LeadTimes::Range {
            start: 0,
            end: 12,
            step: 3,
        };
        let hours: Vec<u16> = lt.hours().iter().map(|l| l.hours()).collect();
        assert_eq!(hours, vec![0, 3, 6, 9, 12]);
    }

    #[test]
    fn test_lead_time_range_from_yaml() {
        let yaml = MINIMAL.replace("lead_times: [6, 12, 18]", "lead_times: { start: 6, end: 18, step: 6 }");
        let config: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            config.lead_times(),
            vec![LeadTime::new(6), LeadTime::new(12), LeadTime::new(18)]
        );
    }

    #[test]
    fn test_duplicate_lead_times_removed() {
        let lt = LeadTimes::List(vec![6, 12, 6]);
        assert_eq!(lt.hours(), vec![LeadTime::new(6), LeadTime::new(12)]);
    }

    #[test]
    fn test_derived_requires_components() {
        let yaml = MINIMAL.replace("U_10M, ", "");
        let config: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("U_10M"));
    }

    #[test]
    fn test_invalid_bbox_rejected() {
        let mut config = minimal();
        config.bbox = BoundingBox::new(60.0, 70.0, 19.0, 40.0);
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = minimal();
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_variable_fails_to_parse() {
        let yaml = MINIMAL.replace("T_2M", "T_850");
        assert!(serde_yaml::from_str::<PipelineConfig>(&yaml).is_err());
    }
}
