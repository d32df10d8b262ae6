// Worker pool: N tokio workers draining the job queue.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::runner::TaskRunner;
use crate::queue::JobQueue;

pub struct WorkerPool {
    runner: TaskRunner,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(runner: TaskRunner) -> Self {
        let worker = &runner.context().config.worker;
        let concurrency = worker.concurrency.max(1);
        let poll_interval = Duration::from_millis(worker.poll_interval_ms.max(10));
        Self { runner, concurrency, poll_interval }
    }

    /// Requeue jobs a previous process left running, then start the workers.
    ///
    /// Workers stop when `shutdown` fires. A fatal task outcome fires it too.
    pub fn start(self, shutdown: broadcast::Sender<()>) -> Result<Vec<JoinHandle<()>>> {
        let recovered = self.runner.context().db.with(|conn| JobQueue::new(conn).recover_stale(Utc::now()))?;
        if recovered > 0 {
            info!(recovered, "requeued jobs interrupted by a previous run");
        }

        info!(workers = self.concurrency, poll_ms = self.poll_interval.as_millis() as u64, "worker pool started");
        let wake = self.runner.context().wake.clone();
        Ok((0..self.concurrency)
            .map(|worker_id| {
                let runner = self.runner.clone();
                let wake = wake.clone();
                let shutdown = shutdown.clone();
                let poll_interval = self.poll_interval;
                tokio::spawn(worker_loop(worker_id, runner, wake, poll_interval, shutdown))
            })
            .collect())
    }
}

async fn worker_loop(
    worker_id: usize,
    runner: TaskRunner,
    wake: Arc<Notify>,
    poll_interval: Duration,
    shutdown: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        if !matches!(shutdown_rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)) {
            break;
        }

        // Registered before looking at the queue so a commit in between
        // still wakes this worker.
        let notified = wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match runner.run_next().await {
            Ok(Some((job_id, outcome))) => {
                if outcome.is_fatal() {
                    error!(worker_id, job_id, "stopping workers after fatal task failure");
                    let _ = shutdown.send(());
                    break;
                }
                continue;
            }
            Ok(None) => {}
            Err(error) => {
                error!(worker_id, error = %format!("{error:#}"), "job queue unavailable");
            }
        }

        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,
            _ = &mut notified => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    debug!(worker_id, "worker stopped");
}
