//! Remapping from the native icosahedral grid to the regular target grid.

use std::sync::Arc;
use std::time::Duration;

use nwp_common::UnitId;
use tracing::{debug, instrument};

use crate::config::{PipelineConfig, RegridConfig};
use crate::error::{UnitError, UnitResult};
use crate::layout::{partial_path, Artifact, StagingLayout};
use crate::outcome::StageStatus;
use crate::tool::{run_expecting_output, ToolInvocation, ToolRunner};

pub struct Regridder {
    runner: Arc<dyn ToolRunner>,
    layout: StagingLayout,
    config: RegridConfig,
    timeout: Duration,
}

impl Regridder {
    pub fn new(config: &PipelineConfig, layout: StagingLayout, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            layout,
            config: config.regrid.clone(),
            timeout: config.timeouts.tool(),
        }
    }

    /// `cdo -f {format} remap,{grid},{weights} {input} {output}`
    pub fn invocation(&self, input: &std::path::Path, output: &std::path::Path) -> ToolInvocation {
        let operator = format!(
            "remap,{},{}",
            self.config.target_grid.display(),
            self.config.weights.display()
        );
        ToolInvocation::new(&self.config.program, self.timeout)
            .args(["-f", self.config.output_format.as_str()])
            .arg(operator)
            .path_arg(input)
            .path_arg(output)
    }

    #[instrument(skip(self), fields(unit = %unit))]
    pub async fn regrid(&self, unit: &UnitId) -> UnitResult<StageStatus> {
        if self.layout.is_done_past(unit, Artifact::Regridded) {
            return Ok(StageStatus::AlreadyDone);
        }

        let input = self.layout.path(unit, Artifact::RawGrid);
        if !input.is_file() {
            return Err(UnitError::MissingInput(input));
        }
        let output = self.layout.path(unit, Artifact::Regridded);
        let temp = partial_path(&output);

        let invocation = self.invocation(&input, &temp);
        run_expecting_output(self.runner.as_ref(), &invocation, &temp).await?;

        tokio::fs::rename(&temp, &output).await?;
        tokio::fs::remove_file(&input).await?;
        debug!(path = %output.display(), "Regridded");
        Ok(StageStatus::Completed)
    }
}
