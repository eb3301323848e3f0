//! Daily trigger loop.
//!
//! The scheduler is Idle until the configured time of day (UTC), then
//! Running until the pipeline returns, whatever the unit outcomes. It fires
//! at most once per calendar day and never catches up a missed trigger.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use nwp_common::ModelRun;
use nwp_pipeline::{CancellationToken, RunPipeline, RunReport};
use tracing::{error, info, instrument};

use crate::config::ScheduleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running(ModelRun),
}

/// Next firing instant at or after `now`.
///
/// Today's trigger is used when it has not passed and has not fired yet;
/// otherwise tomorrow's.
pub fn next_trigger(
    trigger_time: NaiveTime,
    now: DateTime<Utc>,
    last_fired: Option<NaiveDate>,
) -> DateTime<Utc> {
    let today = now.date_naive();
    let today_at = Utc.from_utc_datetime(&today.and_time(trigger_time));

    if now <= today_at && last_fired != Some(today) {
        today_at
    } else {
        today_at + ChronoDuration::days(1)
    }
}

/// Model run expected to be published at `fire_time`.
pub fn target_run(schedule: &ScheduleConfig, fire_time: DateTime<Utc>) -> ModelRun {
    ModelRun::expected_at(fire_time, schedule.lag_hours, schedule.cycle_step_hours)
}

pub struct Scheduler {
    pipeline: RunPipeline,
    schedule: ScheduleConfig,
    state: SchedulerState,
    last_fired: Option<NaiveDate>,
}

impl Scheduler {
    pub fn new(pipeline: RunPipeline, schedule: ScheduleConfig) -> Self {
        Self {
            pipeline,
            schedule,
            state: SchedulerState::Idle,
            last_fired: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Process one model run now.
    #[instrument(skip(self, cancel))]
    pub async fn run_once(
        &mut self,
        run: ModelRun,
        cancel: &CancellationToken,
    ) -> nwp_pipeline::Result<RunReport> {
        self.state = SchedulerState::Running(run);
        let result = self.pipeline.run(run, cancel).await;
        self.state = SchedulerState::Idle;
        result
    }

    /// Fire once a day until `cancel` is triggered.
    ///
    /// Cancellation stops the wait immediately. A run in progress finishes
    /// its current stage first.
    pub async fn run_forever(&mut self, cancel: CancellationToken) {
        loop {
            let now = Utc::now();
            let fire_at = next_trigger(self.schedule.trigger_time, now, self.last_fired);
            let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);

            info!(
                next_trigger = %fire_at,
                wait_secs = wait.as_secs(),
                "Idle until next trigger"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutting down scheduler");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let run = target_run(&self.schedule, fire_at);
            self.last_fired = Some(fire_at.date_naive());
            info!(run = %run, "Running scheduled pipeline");

            match self.run_once(run, &cancel).await {
                Ok(report) => info!(
                    run = %run,
                    failures = report.failures(),
                    cancelled = report.cancelled,
                    "Scheduled pipeline finished"
                ),
                Err(e) => error!(run = %run, error = %e, "Scheduled pipeline aborted"),
            }

            if cancel.is_cancelled() {
                info!("Shutting down scheduler");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nwp_pipeline::{PipelineConfig, ProcessRunner};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn schedule(lag_hours: u32) -> ScheduleConfig {
        ScheduleConfig {
            trigger_time: time(5, 30),
            lag_hours,
            cycle_step_hours: 6,
        }
    }

    #[test]
    fn test_next_trigger_later_today() {
        let next = next_trigger(time(5, 30), at("2018-11-20T03:00:00Z"), None);
        assert_eq!(next, at("2018-11-20T05:30:00Z"));
    }

    #[test]
    fn test_next_trigger_exactly_now() {
        let next = next_trigger(time(5, 30), at("2018-11-20T05:30:00Z"), None);
        assert_eq!(next, at("2018-11-20T05:30:00Z"));
    }

    #[test]
    fn test_missed_trigger_not_caught_up() {
        let next = next_trigger(time(5, 30), at("2018-11-20T09:00:00Z"), None);
        assert_eq!(next, at("2018-11-21T05:30:00Z"));
    }

    #[test]
    fn test_fires_once_per_day() {
        let today = NaiveDate::from_ymd_opt(2018, 11, 20).unwrap();
        let next = next_trigger(time(5, 30), at("2018-11-20T05:30:00Z"), Some(today));
        assert_eq!(next, at("2018-11-21T05:30:00Z"));
    }

    #[test]
    fn test_next_trigger_across_month_end() {
        let next = next_trigger(time(5, 30), at("2018-11-30T23:00:00Z"), None);
        assert_eq!(next, at("2018-12-01T05:30:00Z"));
    }

    #[test]
    fn test_target_run_truncates_to_cycle() {
        let run = target_run(&schedule(5), at("2018-11-20T05:30:00Z"));
        assert_eq!(run.to_string(), "2018112000");

        let run = target_run(&schedule(3), at("2018-11-20T14:10:00Z"));
        assert_eq!(run.to_string(), "2018112006");
    }

    #[test]
    fn test_target_run_previous_day() {
        let run = target_run(&schedule(8), at("2018-11-20T05:30:00Z"));
        assert_eq!(run.to_string(), "2018111918");
    }

    fn pipeline(root: &std::path::Path) -> RunPipeline {
        let yaml = format!(
            r#"
root_dir: {root}
variables: [T_2M]
lead_times: [6]
bbox: {{ left: 19.0, right: 60.0, top: 70.0, bottom: 40.0 }}
regrid:
  target_grid: {root}/grid.txt
  weights: {root}/weights.nc
"#,
            root = root.display()
        );
        let config: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        RunPipeline::new(config, Arc::new(ProcessRunner)).unwrap()
    }

    #[tokio::test]
    async fn test_cancel_while_idle_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        // Half a day away, so the loop is parked in its wait
        let trigger_time = (Utc::now() + ChronoDuration::hours(12)).time();
        let schedule = ScheduleConfig {
            trigger_time,
            lag_hours: 4,
            cycle_step_hours: 6,
        };
        let mut scheduler = Scheduler::new(pipeline(dir.path()), schedule);

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), scheduler.run_forever(cancel))
            .await
            .expect("scheduler returns once cancelled");

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.last_fired, None);
        assert!(!dir.path().join("grib").exists());
    }
}
