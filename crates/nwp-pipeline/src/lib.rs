//! Fetch, decompress, regrid and rasterize ICON forecast fields.
//!
//! A [`RunPipeline`] takes one [`ModelRun`](nwp_common::ModelRun) through
//! five stages:
//!
//! 1. **Retrieve**: download `{model}_..._{VAR}.grib2.bz2` archives
//! 2. **Decompress**: expand them into raw icosahedral GRIB2 files
//! 3. **Regrid**: remap to a regular lat/lon grid with CDO
//! 4. **Rasterize**: clip to the bounding box and write Float32 GeoTIFFs
//! 5. **Derive**: compute products such as 10 m wind speed from components
//!
//! All run state lives in the staging directory (see [`StagingLayout`]), so
//! running the same model run again only does the work that is missing.

pub mod config;
pub mod decompress;
pub mod error;
pub mod layout;
pub mod outcome;
pub mod pipeline;
pub mod rasterize;
pub mod regrid;
pub mod retrieve;
pub mod tool;

pub use config::{LeadTimes, PipelineConfig, RasterConfig, RegridConfig, SourceConfig, TimeoutConfig};
pub use error::{PipelineError, Result, UnitError, UnitResult};
pub use layout::{Artifact, StagingLayout};
pub use outcome::{
    OutcomeClass, RunReport, Stage, StageCounts, StageOutcome, StageStatus, Subject, UnitStage,
    STAGE_OUTCOMES_METRIC,
};
pub use pipeline::RunPipeline;
pub use tool::{ProcessRunner, ToolError, ToolInvocation, ToolOutput, ToolRunner};

// Re-export cancellation so callers don't need a direct tokio-util dependency
pub use tokio_util::sync::CancellationToken;
