//! Per-unit stage outcomes and the run report.

use std::fmt;

use chrono::{DateTime, Utc};
use nwp_common::{DerivedProduct, LeadTime, ModelRun, UnitId};
use tracing::{error, info, warn};

use crate::error::UnitError;

/// Metric counting one outcome per subject per stage.
pub const STAGE_OUTCOMES_METRIC: &str = "nwp_stage_outcomes_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Retrieve,
    Decompress,
    Regrid,
    Rasterize,
    Derive,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Retrieve,
        Stage::Decompress,
        Stage::Regrid,
        Stage::Rasterize,
        Stage::Derive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Retrieve => "retrieve",
            Stage::Decompress => "decompress",
            Stage::Regrid => "regrid",
            Stage::Rasterize => "rasterize",
            Stage::Derive => "derive",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages applied to every unit, in order. `Derive` runs afterwards per
/// (lead time, product).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStage {
    Retrieve,
    Decompress,
    Regrid,
    Rasterize,
}

impl UnitStage {
    pub const ALL: [UnitStage; 4] = [
        UnitStage::Retrieve,
        UnitStage::Decompress,
        UnitStage::Regrid,
        UnitStage::Rasterize,
    ];
}

impl From<UnitStage> for Stage {
    fn from(stage: UnitStage) -> Self {
        match stage {
            UnitStage::Retrieve => Stage::Retrieve,
            UnitStage::Decompress => Stage::Decompress,
            UnitStage::Regrid => Stage::Regrid,
            UnitStage::Rasterize => Stage::Rasterize,
        }
    }
}

/// Successful stage result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage did its work in this pass
    Completed,
    /// The stage's artifact, or a later one, already existed
    AlreadyDone,
}

/// What a stage outcome is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Unit(UnitId),
    Derived {
        run: ModelRun,
        lead: LeadTime,
        product: DerivedProduct,
    },
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Unit(unit) => write!(f, "{}", unit),
            Subject::Derived { run, lead, product } => write!(f, "{}_{}_{}", run, lead, product),
        }
    }
}

/// Summary class of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeClass {
    Completed,
    AlreadyDone,
    Skipped,
    Failed,
}

#[derive(Debug)]
pub struct StageOutcome {
    pub subject: Subject,
    pub stage: Stage,
    pub result: Result<StageStatus, UnitError>,
}

impl StageOutcome {
    pub fn new(subject: Subject, stage: Stage, result: Result<StageStatus, UnitError>) -> Self {
        Self {
            subject,
            stage,
            result,
        }
    }

    pub fn unit(&self) -> Option<UnitId> {
        match self.subject {
            Subject::Unit(unit) => Some(unit),
            Subject::Derived { .. } => None,
        }
    }

    pub fn class(&self) -> OutcomeClass {
        match &self.result {
            Ok(StageStatus::Completed) => OutcomeClass::Completed,
            Ok(StageStatus::AlreadyDone) => OutcomeClass::AlreadyDone,
            Err(e) if e.is_skip() => OutcomeClass::Skipped,
            Err(_) => OutcomeClass::Failed,
        }
    }

    /// Outcome label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match &self.result {
            Ok(StageStatus::Completed) => "completed",
            Ok(StageStatus::AlreadyDone) => "already_done",
            Err(e) => e.kind(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Emit the process-log line and count the outcome.
    pub fn record(&self) {
        let subject = self.subject.to_string();
        let stage = self.stage.as_str();
        let outcome = self.label();

        match &self.result {
            Ok(_) => info!(unit = %subject, stage, outcome, "Stage finished"),
            Err(UnitError::NotYetPublished { status: 404, .. }) => {
                info!(unit = %subject, stage, outcome, "Not yet published")
            }
            Err(e @ UnitError::NotYetPublished { .. }) => {
                warn!(unit = %subject, stage, outcome, error = %e, "Unexpected response, treating as not yet published")
            }
            Err(e) if e.is_skip() => warn!(unit = %subject, stage, outcome, error = %e, "Skipped"),
            Err(e) => error!(unit = %subject, stage, outcome, error = %e, "Stage failed"),
        }

        metrics::counter!(STAGE_OUTCOMES_METRIC, "stage" => stage, "outcome" => outcome)
            .increment(1);
    }
}

/// Everything that happened during one pipeline invocation.
#[derive(Debug)]
pub struct RunReport {
    pub run: ModelRun,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when the invocation stopped early at a stage barrier
    pub cancelled: bool,
    pub outcomes: Vec<StageOutcome>,
}

/// Outcome counts of one stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageCounts {
    pub completed: usize,
    pub already_done: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn new(run: ModelRun) -> Self {
        Self {
            run,
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = StageOutcome>) {
        self.outcomes.extend(outcomes);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn stage_outcomes(&self, stage: Stage) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes.iter().filter(move |o| o.stage == stage)
    }

    /// Outcome of one subject at one stage, if it was attempted.
    pub fn outcome(&self, subject: Subject, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.stage == stage && o.subject == subject)
    }

    pub fn counts(&self, stage: Stage) -> StageCounts {
        let mut counts = StageCounts::default();
        for outcome in self.stage_outcomes(stage) {
            match outcome.class() {
                OutcomeClass::Completed => counts.completed += 1,
                OutcomeClass::AlreadyDone => counts.already_done += 1,
                OutcomeClass::Skipped => counts.skipped += 1,
                OutcomeClass::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.class() == OutcomeClass::Failed)
            .count()
    }

    pub fn log_summary(&self) {
        for stage in Stage::ALL {
            let c = self.counts(stage);
            if c == StageCounts::default() {
                continue;
            }
            info!(
                run = %self.run,
                stage = stage.as_str(),
                completed = c.completed,
                already_done = c.already_done,
                skipped = c.skipped,
                failed = c.failed,
                "Stage summary"
            );
        }

        let duration_secs = self
            .finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or_default();
        info!(
            run = %self.run,
            failures = self.failures(),
            cancelled = self.cancelled,
            duration_secs,
            "Run finished"
        );
    }
}
