//! Conversion of regridded fields into clipped GeoTIFF rasters.
//!
//! Reprojection and clipping always go through `gdal_translate`. Accumulated
//! fields are clipped into `txt/{run}/` first and then scaled in memory;
//! derived products are computed from the finished component rasters. Band
//! data is read and written with GDAL on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nwp_common::{
    BoundingBox, DerivedProduct, FieldKind, GridError, LeadTime, ModelRun, RasterGrid, UnitId,
    Variable,
};
use tracing::{debug, instrument};

use crate::config::{PipelineConfig, RasterConfig};
use crate::error::{UnitError, UnitResult};
use crate::layout::{ensure_parent, partial_path, remove_if_exists, Artifact, StagingLayout};
use crate::outcome::StageStatus;
use crate::tool::{run_expecting_output, ToolInvocation, ToolRunner};

const SECONDS_PER_HOUR: f32 = 3600.0;

pub struct Rasterizer {
    runner: Arc<dyn ToolRunner>,
    layout: StagingLayout,
    config: RasterConfig,
    bbox: BoundingBox,
    keep_components: bool,
    timeout: Duration,
}

impl Rasterizer {
    pub fn new(config: &PipelineConfig, layout: StagingLayout, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            layout,
            config: config.raster.clone(),
            bbox: config.bbox,
            keep_components: config.keep_components,
            timeout: config.timeouts.tool(),
        }
    }

    /// Clipped GeoTIFF straight from the regridded field.
    pub fn geotiff_invocation(&self, input: &Path, output: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.config.program, self.timeout)
            .args(["-of", "GTiff"])
            .args(["-ot", self.config.output_type.as_str()])
            .args(["-a_srs", self.config.srs.as_str()])
            .arg("-projwin")
            .args(self.bbox.projwin_args())
            .path_arg(input)
            .path_arg(output)
    }

    /// Run `gdal_translate` into `output` through its `.partial` sibling.
    async fn translate(&self, input: &Path, output: &Path) -> UnitResult<()> {
        ensure_parent(output).await?;
        let temp = partial_path(output);
        let invocation = self.geotiff_invocation(input, &temp);
        run_expecting_output(self.runner.as_ref(), &invocation, &temp).await?;
        tokio::fs::rename(&temp, output).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(unit = %unit))]
    pub async fn rasterize(&self, unit: &UnitId) -> UnitResult<StageStatus> {
        if self.layout.is_done_past(unit, Artifact::Raster) {
            return Ok(StageStatus::AlreadyDone);
        }

        let input = self.layout.path(unit, Artifact::Regridded);
        if !input.is_file() {
            return Err(UnitError::MissingInput(input));
        }
        let output = self.layout.path(unit, Artifact::Raster);

        match unit.variable.kind() {
            FieldKind::Instantaneous => self.translate(&input, &output).await?,
            FieldKind::Accumulated => self.accumulate(unit, &input, &output).await?,
        }

        tokio::fs::remove_file(&input).await?;
        debug!(path = %output.display(), "Raster written");
        Ok(StageStatus::Completed)
    }

    /// Turn a published rate into the depth accumulated over the forecast
    /// window: `v × lead_hours × 3600`, in f32.
    async fn accumulate(&self, unit: &UnitId, input: &Path, output: &Path) -> UnitResult<()> {
        let staged = self.layout.staged_raster(unit);
        let factor = unit.lead.hours() as f32 * SECONDS_PER_HOUR;

        let result: UnitResult<()> = async {
            self.translate(input, &staged).await?;
            let source = staged.clone();
            write_computed(output, move || Ok(RasterGrid::read(&source)?.scaled(factor))).await
        }
        .await;

        let cleanup = remove_if_exists(&staged).await;
        result?;
        Ok(cleanup?)
    }

    /// Compute a derived raster from its component rasters.
    ///
    /// Components are deleted afterwards unless configured otherwise.
    #[instrument(skip(self), fields(run = %run, lead = %lead, product = %product))]
    pub async fn derive(
        &self,
        run: ModelRun,
        lead: LeadTime,
        product: DerivedProduct,
    ) -> UnitResult<StageStatus> {
        let output = self.layout.derived_raster(run, lead, product);
        let components = self.layout.component_rasters(run, lead, product);

        if output.is_file() {
            // Components can survive an interrupted earlier pass
            self.release_components(&components).await?;
            return Ok(StageStatus::AlreadyDone);
        }
        if let Some(missing) = self.layout.missing_component(run, lead, product) {
            return Err(UnitError::MissingInput(missing));
        }

        let inputs: Vec<PathBuf> = components.iter().map(|(_, path)| path.clone()).collect();
        write_computed(&output, move || {
            let grids = inputs
                .iter()
                .map(|path| RasterGrid::read(path))
                .collect::<Result<Vec<_>, GridError>>()?;
            match product {
                DerivedProduct::WindSpeed10m => RasterGrid::magnitude(&grids[0], &grids[1]),
            }
        })
        .await?;

        self.release_components(&components).await?;
        debug!(path = %output.display(), "Derived raster written");
        Ok(StageStatus::Completed)
    }

    async fn release_components(&self, components: &[(Variable, PathBuf)]) -> UnitResult<()> {
        if self.keep_components {
            return Ok(());
        }
        for (_, path) in components {
            remove_if_exists(path).await?;
        }
        Ok(())
    }
}

/// Compute a grid on the blocking pool and write it as a GeoTIFF through
/// the `.partial` sibling of `output`.
async fn write_computed<F>(output: &Path, compute: F) -> UnitResult<()>
where
    F: FnOnce() -> Result<RasterGrid, GridError> + Send + 'static,
{
    ensure_parent(output).await?;
    let temp = partial_path(output);
    let target = temp.clone();

    let written = tokio::task::spawn_blocking(move || -> Result<(), GridError> {
        compute()?.write_geotiff(&target)
    })
    .await
    .map_err(|e| UnitError::Io(std::io::Error::other(e.to_string())))?;

    if let Err(e) = written {
        remove_if_exists(&temp).await?;
        return Err(e.into());
    }
    tokio::fs::rename(&temp, output).await?;
    Ok(())
}
