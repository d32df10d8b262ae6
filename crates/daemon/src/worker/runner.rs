// Task runner: executes one task and contains every failure.
//
// `run` never returns an error. Whatever happens inside the task becomes a
// `TaskOutcome`, and the runner writes exactly one log line for it.

use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::UnexpectedErrorPolicy;
use crate::queue::{JobQueue, SyncJob};
use crate::tasks::{execute, SyncTask, TaskContext, TaskError, TaskSuccess};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(String),
    Skipped { reason: String },
    /// Terminal failure. `exhausted` is set when a retry policy ran out.
    Failed { error: String, exhausted: bool },
    Retry { after: Duration, error: String },
    /// Unexpected failure under `worker.on_unexpected = "fatal"`.
    Fatal { error: String },
}

impl TaskOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

#[derive(Clone)]
pub struct TaskRunner {
    ctx: TaskContext,
}

impl TaskRunner {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Run `task`, which has now been attempted `attempts` times counting
    /// this run.
    pub async fn run(&self, task: &SyncTask, attempts: u32) -> TaskOutcome {
        let ctx = self.ctx.clone();
        let owned = task.clone();
        let result = match tokio::spawn(async move { execute(&ctx, &owned).await }).await {
            Ok(result) => result,
            Err(join) => Err(TaskError::Unexpected(anyhow!("task panicked: {join}"))),
        };
        self.classify(task, attempts, result)
    }

    /// Claim the next ready job, run it and record the outcome.
    /// Returns `None` when nothing is ready.
    pub async fn run_next(&self) -> Result<Option<(i64, TaskOutcome)>> {
        let Some(job) = self.ctx.db.with(|conn| JobQueue::new(conn).claim_next(Utc::now()))? else {
            return Ok(None);
        };

        let outcome = match job.task() {
            Ok(task) => self.run(&task, job.attempt_count).await,
            Err(decode) => {
                let error = format!("{decode:#}");
                error!(job_id = job.id, kind = %job.kind, error = %error, "undecodable job payload");
                TaskOutcome::Failed { error, exhausted: false }
            }
        };
        self.record(&job, &outcome)?;
        Ok(Some((job.id, outcome)))
    }

    fn record(&self, job: &SyncJob, outcome: &TaskOutcome) -> Result<()> {
        let now = Utc::now();
        let updated = self.ctx.db.with(|conn| {
            let queue = JobQueue::new(conn);
            match outcome {
                TaskOutcome::Completed(_) => queue.mark_done(job.id, now),
                TaskOutcome::Skipped { reason } => queue.mark_skipped(job.id, reason, now),
                TaskOutcome::Failed { error, exhausted: true } | TaskOutcome::Fatal { error } => {
                    queue.mark_dead(job.id, error, now)
                }
                TaskOutcome::Failed { error, exhausted: false } => queue.mark_failed(job.id, error, now),
                TaskOutcome::Retry { after, error } => queue.schedule_retry(job.id, *after, error, now),
            }
        })?;
        if !updated {
            debug!(job_id = job.id, "job state changed underneath the runner");
        }
        Ok(())
    }

    fn classify(
        &self,
        task: &SyncTask,
        attempts: u32,
        result: std::result::Result<TaskSuccess, TaskError>,
    ) -> TaskOutcome {
        let kind = task.kind();
        let subject_id = task.subject_id();

        let error = match result {
            Ok(TaskSuccess::Completed(summary)) => {
                info!(kind, subject_id = %subject_id, attempts, summary = %summary, "task completed");
                return TaskOutcome::Completed(summary);
            }
            Ok(TaskSuccess::Skipped(reason)) => {
                info!(kind, subject_id = %subject_id, reason = %reason, "task skipped");
                return TaskOutcome::Skipped { reason };
            }
            Err(error) => error,
        };

        let policy = task.retry_policy().filter(|_| error.is_retryable());
        if let Some(after) = policy.and_then(|policy| policy.next_delay(attempts)) {
            warn!(
                kind,
                subject_id = %subject_id,
                attempts,
                retry_in_secs = after.as_secs(),
                error = %format!("{error:#}"),
                "task failed, will retry"
            );
            return TaskOutcome::Retry { after, error: format!("{error:#}") };
        }
        let exhausted = policy.is_some();

        match error {
            TaskError::Precondition(message) => {
                warn!(kind, subject_id = %subject_id, reason = %message, "task precondition not met");
                TaskOutcome::Failed { error: message, exhausted }
            }
            TaskError::Remote { status, not_provisioned: true, message } => {
                warn!(
                    kind,
                    subject_id = %subject_id,
                    status,
                    error = %message,
                    "remote entity not provisioned yet"
                );
                TaskOutcome::Failed { error: message, exhausted }
            }
            TaskError::Remote { status, message, .. } => {
                error!(kind, subject_id = %subject_id, attempts, status, error = %message, "remote call failed");
                TaskOutcome::Failed { error: message, exhausted }
            }
            TaskError::Unexpected(source) => {
                let message = format!("{source:#}");
                error!(kind, subject_id = %subject_id, attempts, error = %message, "task failed unexpectedly");
                match self.ctx.config.worker.on_unexpected {
                    UnexpectedErrorPolicy::Fatal => TaskOutcome::Fatal { error: message },
                    UnexpectedErrorPolicy::Log => TaskOutcome::Failed { error: message, exhausted },
                }
            }
        }
    }
}
