use crate::engine::Orchestrator;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use taskfleet_core::{FleetError, FleetResult, TaskStatus};
use tokio_util::sync::CancellationToken;

const IDLE_SLEEP: Duration = Duration::from_secs(60);

/// A daily pipeline that should run on a cron schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPipeline {
    pub name: String,
    pub cron_expression: String,
    /// Project the pipeline reports on; `None` means all projects.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Cron-based scheduler that manages a collection of [`ScheduledPipeline`]s.
///
/// The scheduler can compute next fire times, filter enabled jobs, and run a
/// background loop that builds and executes the daily pipeline whenever a job
/// fires.
#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<ScheduledPipeline>,
}

impl Scheduler {
    /// Create a new scheduler with the given jobs.
    pub fn new(jobs: Vec<ScheduledPipeline>) -> Self {
        Self { jobs }
    }

    /// Parse a cron expression string into a [`cron::Schedule`].
    ///
    /// Uses the 7-field cron format: sec min hour day-of-month month day-of-week year.
    pub fn parse_cron(cron_expr: &str) -> FleetResult<Schedule> {
        Schedule::from_str(cron_expr).map_err(|e| {
            FleetError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
        })
    }

    /// Compute the next fire time for a given cron expression.
    pub fn next_fire_time(cron_expr: &str) -> FleetResult<DateTime<Utc>> {
        let schedule = Self::parse_cron(cron_expr)?;
        schedule.upcoming(Utc).next().ok_or_else(|| {
            FleetError::Config(format!(
                "Cron expression '{cron_expr}' has no upcoming fire times"
            ))
        })
    }

    /// Reject the first job whose cron expression does not parse.
    pub fn validate(&self) -> FleetResult<()> {
        for job in &self.jobs {
            Self::parse_cron(&job.cron_expression)?;
        }
        Ok(())
    }

    /// Return references to only the enabled jobs.
    pub fn enabled_jobs(&self) -> Vec<&ScheduledPipeline> {
        self.jobs.iter().filter(|j| j.enabled).collect()
    }

    /// Return the total number of jobs (enabled and disabled).
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Build and run the daily pipeline for one job. Returns how many of its
    /// tasks completed.
    pub async fn fire(orchestrator: &Orchestrator, job: &ScheduledPipeline) -> FleetResult<usize> {
        let task_ids = orchestrator
            .create_daily_pipeline(job.project_id.as_deref())
            .await?;
        let results = orchestrator.execute_workflow(&task_ids).await;
        let completed = results
            .iter()
            .filter(|t| t.status() == TaskStatus::Completed)
            .count();
        tracing::info!(
            job = %job.name,
            completed,
            total = results.len(),
            "Scheduler: pipeline run finished"
        );
        Ok(completed)
    }

    /// Start the scheduler background loop.
    ///
    /// Spawns a tokio task that continuously:
    /// 1. Computes the next fire time for each enabled job.
    /// 2. Sleeps until the nearest fire time.
    /// 3. Runs every job whose fire time has been reached.
    ///
    /// The loop ends as soon as the orchestrator shuts down, including while
    /// it sleeps. Returns the [`tokio::task::JoinHandle`] so the caller can
    /// await it.
    pub fn start(self, orchestrator: Arc<Orchestrator>) -> tokio::task::JoinHandle<()> {
        let shutdown = orchestrator.shutdown_token();
        tokio::spawn(async move {
            while !shutdown.is_cancelled() {
                let enabled = self.enabled_jobs();

                if enabled.is_empty() {
                    tracing::info!("Scheduler: no enabled jobs, sleeping 60s");
                    Self::sleep_or_shutdown(&shutdown, IDLE_SLEEP).await;
                    continue;
                }

                // Compute next fire time for each enabled job.
                let mut nearest: Option<DateTime<Utc>> = None;
                let mut job_times: Vec<(&ScheduledPipeline, DateTime<Utc>)> = Vec::new();

                for job in enabled {
                    match Self::next_fire_time(&job.cron_expression) {
                        Ok(next) => {
                            job_times.push((job, next));
                            nearest = Some(nearest.map_or(next, |cur| cur.min(next)));
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Scheduler: skipping job '{}' due to cron error: {}",
                                job.name,
                                e
                            );
                        }
                    }
                }

                let Some(nearest) = nearest else {
                    tracing::warn!(
                        "Scheduler: all enabled jobs have invalid cron expressions, sleeping 60s"
                    );
                    Self::sleep_or_shutdown(&shutdown, IDLE_SLEEP).await;
                    continue;
                };

                // Sleep until the nearest fire time.
                let now = Utc::now();
                if nearest > now {
                    let wait = (nearest - now).to_std().unwrap_or_default();
                    tracing::debug!("Scheduler: sleeping for {:?} until next job", wait);
                    Self::sleep_or_shutdown(&shutdown, wait).await;
                }

                // Fire only jobs that are due. Anything slightly early is
                // picked up on the next pass with the same fire time.
                let now = Utc::now();
                for (job, fire_time) in &job_times {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    if *fire_time <= now {
                        tracing::info!("Scheduler: firing job '{}'", job.name);
                        if let Err(e) = Self::fire(&orchestrator, job).await {
                            tracing::error!(job = %job.name, error = %e, "Scheduler: job failed");
                        }
                    }
                }
            }
            tracing::info!("Scheduler: orchestrator shut down, stopping");
        })
    }

    async fn sleep_or_shutdown(shutdown: &CancellationToken, wait: Duration) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
