//! Run pipeline: every stage for every unit of one model run.
//!
//! Stages are barriers. All units finish retrieval before any unit is
//! decompressed, and so on. Within a stage, units run concurrently up to
//! the configured limit. A unit that did not succeed at one stage is not
//! offered to the next stage of the same pass.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use nwp_common::{DerivedProduct, LeadTime, ModelRun, UnitId};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::decompress::decompress;
use crate::error::{PipelineError, Result, UnitResult};
use crate::layout::StagingLayout;
use crate::outcome::{RunReport, Stage, StageOutcome, StageStatus, Subject, UnitStage};
use crate::rasterize::Rasterizer;
use crate::regrid::Regridder;
use crate::retrieve::Retriever;
use crate::tool::ToolRunner;

const PROBE_FILE: &str = ".nwp-pipeline-write-probe";

pub struct RunPipeline {
    config: PipelineConfig,
    layout: StagingLayout,
    retriever: Retriever,
    regridder: Regridder,
    rasterizer: Rasterizer,
}

impl RunPipeline {
    /// Validate the configuration and build the stage workers.
    pub fn new(config: PipelineConfig, runner: Arc<dyn ToolRunner>) -> Result<Self> {
        config.validate()?;

        let layout = StagingLayout::from_config(&config);
        let retriever = Retriever::new(&config, layout.clone())?;
        let regridder = Regridder::new(&config, layout.clone(), runner.clone());
        let rasterizer = Rasterizer::new(&config, layout.clone(), runner);

        Ok(Self {
            config,
            layout,
            retriever,
            regridder,
            rasterizer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    /// The unit set of a run: lead times × variables.
    pub fn units(&self, run: ModelRun) -> Vec<UnitId> {
        UnitId::cross_product(run, &self.config.lead_times(), &self.config.variables())
    }

    /// Checks that would make every unit fail. Nothing is attempted if one
    /// of them does not hold.
    pub async fn preflight(&self) -> Result<()> {
        check_readable(&self.config.regrid.target_grid).await?;
        check_readable(&self.config.regrid.weights).await?;

        let root = self.layout.root();
        let unwritable = |e: std::io::Error| PipelineError::UnwritableRoot {
            path: root.to_path_buf(),
            reason: e.to_string(),
        };
        tokio::fs::create_dir_all(root).await.map_err(unwritable)?;

        let probe = root.join(PROBE_FILE);
        tokio::fs::write(&probe, b"").await.map_err(unwritable)?;
        tokio::fs::remove_file(&probe).await.map_err(unwritable)?;
        Ok(())
    }

    /// Process one model run.
    ///
    /// Unit failures are reported in the returned [`RunReport`]; only
    /// preflight failures are returned as errors. When `cancel` fires, the
    /// stage in progress is completed and later stages are not started.
    #[instrument(skip(self, cancel), fields(run = %run))]
    pub async fn run(&self, run: ModelRun, cancel: &CancellationToken) -> Result<RunReport> {
        self.preflight().await?;

        let mut report = RunReport::new(run);
        let mut active = self.units(run);
        info!(
            units = active.len(),
            concurrency = self.config.concurrency,
            "Starting run"
        );

        for unit_stage in UnitStage::ALL {
            let stage = Stage::from(unit_stage);
            if cancel.is_cancelled() {
                warn!(stage = stage.as_str(), "Cancelled before stage");
                report.cancelled = true;
                break;
            }
            if active.is_empty() {
                break;
            }

            let units = std::mem::take(&mut active);
            let outcomes = match unit_stage {
                UnitStage::Retrieve => {
                    self.run_jobs(stage, units, Subject::Unit, |u| async move {
                        self.retriever.fetch(&u).await
                    })
                    .await
                }
                UnitStage::Decompress => {
                    self.run_jobs(stage, units, Subject::Unit, |u| async move {
                        decompress(&self.layout, &u).await
                    })
                    .await
                }
                UnitStage::Regrid => {
                    self.run_jobs(stage, units, Subject::Unit, |u| async move {
                        self.regridder.regrid(&u).await
                    })
                    .await
                }
                UnitStage::Rasterize => {
                    self.run_jobs(stage, units, Subject::Unit, |u| async move {
                        self.rasterizer.rasterize(&u).await
                    })
                    .await
                }
            };
            active = outcomes
                .iter()
                .filter(|o| o.is_ok())
                .filter_map(StageOutcome::unit)
                .collect();
            report.extend(outcomes);
        }

        if !report.cancelled && !self.config.derived.is_empty() {
            if cancel.is_cancelled() {
                report.cancelled = true;
            } else {
                let outcomes = self.run_derive(run).await;
                report.extend(outcomes);
            }
        }

        report.finish();
        report.log_summary();
        Ok(report)
    }

    /// Run `work` for every job on the bounded pool and record each outcome.
    async fn run_jobs<J, S, F, Fut>(
        &self,
        stage: Stage,
        jobs: Vec<J>,
        subject: S,
        work: F,
    ) -> Vec<StageOutcome>
    where
        J: Copy,
        S: Fn(J) -> Subject,
        F: Fn(J) -> Fut,
        Fut: Future<Output = UnitResult<StageStatus>>,
    {
        stream::iter(jobs)
            .map(|job| {
                let pending = work(job);
                let subject = subject(job);
                async move {
                    let outcome = StageOutcome::new(subject, stage, pending.await);
                    outcome.record();
                    outcome
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await
    }

    async fn run_derive(&self, run: ModelRun) -> Vec<StageOutcome> {
        let jobs: Vec<(LeadTime, DerivedProduct)> = self
            .config
            .lead_times()
            .into_iter()
            .flat_map(|lead| self.config.derived.iter().map(move |p| (lead, *p)))
            .collect();

        self.run_jobs(
            Stage::Derive,
            jobs,
            |(lead, product)| Subject::Derived { run, lead, product },
            |(lead, product)| async move { self.rasterizer.derive(run, lead, product).await },
        )
        .await
    }
}

async fn check_readable(path: &Path) -> Result<()> {
    tokio::fs::File::open(path)
        .await
        .map(|_| ())
        .map_err(|e| PipelineError::UnreadableResource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
