//! Service configuration loaded from a single YAML file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use nwp_pipeline::PipelineConfig;
use serde::{Deserialize, Deserializer};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// When the daily run fires and which model run it targets.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Wall-clock time of day (UTC), `HH:MM` or `HH:MM:SS`
    #[serde(default = "default_trigger_time", deserialize_with = "deserialize_time")]
    pub trigger_time: NaiveTime,
    /// Hours between a run's reference time and its publication
    #[serde(default = "default_lag_hours")]
    pub lag_hours: u32,
    /// Hours between model cycles (6 for ICON global)
    #[serde(default = "default_cycle_step_hours")]
    pub cycle_step_hours: u32,
}

fn default_trigger_time() -> NaiveTime {
    NaiveTime::from_hms_opt(4, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_lag_hours() -> u32 {
    4
}

fn default_cycle_step_hours() -> u32 {
    6
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            trigger_time: default_trigger_time(),
            lag_hours: default_lag_hours(),
            cycle_step_hours: default_cycle_step_hours(),
        }
    }
}

fn deserialize_time<'de, D>(deserializer: D) -> std::result::Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_time(&s).map_err(serde::de::Error::custom)
}

pub fn parse_time(s: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| format!("invalid time of day '{}', expected HH:MM or HH:MM:SS", s))
}

impl ServiceConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ServiceConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded service config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;

        let step = self.schedule.cycle_step_hours;
        if step == 0 || 24 % step != 0 {
            bail!("cycle_step_hours must divide 24, got {}", step);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nwp_common::Variable;

    const EXAMPLE: &str = r#"
pipeline:
  root_dir: /data/icon
  variables: [T_2M, TD_2M, TOT_PREC, U_10M, V_10M]
  lead_times: { start: 6, end: 48, step: 6 }
  derived: [WIND_10M]
  bbox: { left: 19.0, right: 60.0, top: 70.0, bottom: 40.0 }
  regrid:
    target_grid: /data/icon/grids/target_grid_world_0125.txt
    weights: /data/icon/grids/weights_icogl2world_0125.nc
  concurrency: 8

schedule:
  trigger_time: "05:30"
  lag_hours: 5
"#;

    #[test]
    fn test_parse_service_config() {
        let config: ServiceConfig = serde_yaml::from_str(EXAMPLE).unwrap();

        assert_eq!(config.pipeline.variables.len(), 5);
        assert_eq!(config.pipeline.variables[2], Variable::TotPrec);
        assert_eq!(config.pipeline.lead_times().len(), 8);
        assert_eq!(config.pipeline.concurrency, 8);
        assert_eq!(
            config.schedule.trigger_time,
            NaiveTime::from_hms_opt(5, 30, 0).unwrap()
        );
        assert_eq!(config.schedule.lag_hours, 5);
        assert_eq!(config.schedule.cycle_step_hours, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_schedule_defaults() {
        let yaml = EXAMPLE.split("schedule:").next().unwrap();
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.schedule.trigger_time, NaiveTime::from_hms_opt(4, 0, 0).unwrap());
        assert_eq!(config.schedule.lag_hours, 4);
    }

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("06:15").unwrap(), NaiveTime::from_hms_opt(6, 15, 0).unwrap());
        assert_eq!(parse_time("06:15:30").unwrap(), NaiveTime::from_hms_opt(6, 15, 30).unwrap());
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("noon").is_err());
    }

    #[test]
    fn test_invalid_cycle_step() {
        let mut config: ServiceConfig = serde_yaml::from_str(EXAMPLE).unwrap();
        config.schedule.cycle_step_hours = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.yaml");
        std::fs::write(&path, EXAMPLE).unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.pipeline.root_dir, Path::new("/data/icon"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServiceConfig::load(Path::new("/nonexistent/icon.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
