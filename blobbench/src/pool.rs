//! A fixed-size pool of workers that drain the job queue.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use crate::collector::ResultSender;
use crate::job::{Job, Outcome};
use crate::queue::JobReceiver;

/// Spawns a fixed number of workers that each claim jobs until the queue is drained.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// Creates a pool of `workers` workers. A pool always has at least one worker.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns the workers onto the current runtime.
    ///
    /// Every worker runs `task` for each job it claims and pushes exactly one outcome per job.
    /// Workers exit once the queue is closed and drained, or when the collector has gone away.
    /// The senders are dropped as workers exit, so a worker that panics surfaces as a
    /// [`CollectError`](crate::collector::CollectError) rather than a hang.
    pub fn spawn<F, Fut>(&self, jobs: JobReceiver, results: ResultSender, task: F) -> Workers
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let task = Arc::new(task);

        let handles = (0..self.workers)
            .map(|worker| {
                let jobs = jobs.clone();
                let results = results.clone();
                let task = Arc::clone(&task);

                let span = tracing::debug_span!("worker", worker);
                tokio::spawn(
                    async move {
                        let mut processed = 0u64;
                        while let Some(job) = jobs.next().await {
                            let outcome = task(job).await;
                            processed += 1;
                            if results.send(outcome).await.is_err() {
                                tracing::debug!("collector went away");
                                break;
                            }
                        }
                        tracing::trace!(processed, "worker finished");
                    }
                    .instrument(span),
                )
            })
            .collect();

        Workers { handles }
    }
}

/// Handles of spawned workers.
#[derive(Debug)]
pub struct Workers {
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Waits for all workers to exit.
    ///
    /// Returns the first panic, if any worker panicked.
    pub async fn join(self) -> Result<(), JoinError> {
        for result in join_all(self.handles).await {
            result?;
        }
        Ok(())
    }
}
