//! The bounded queue that workers drain jobs from.

use async_channel::{Receiver, Sender, TrySendError};

use crate::job::Job;

/// Errors returned when enqueueing a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("job queue is closed")]
    Closed,
    #[error("job queue is full")]
    Full,
}

/// An ordered, bounded multi-consumer queue of jobs.
///
/// Jobs are delivered in enqueue order, each to exactly one consumer. Once the queue is closed and
/// empty, every consumer's [`JobReceiver::next`] returns `None`.
#[derive(Debug)]
pub struct JobQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl JobQueue {
    /// Creates an open queue that holds up to `capacity` jobs.
    pub fn new(capacity: usize) -> Self {
        // A zero capacity panics in async-channel, and an empty run enqueues nothing anyway.
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Creates a closed queue holding jobs `1..=count`.
    pub fn filled(count: u64) -> Result<Self, QueueError> {
        let capacity = usize::try_from(count).map_err(|_| QueueError::Full)?;
        let queue = Self::new(capacity);
        for id in 1..=count {
            queue.enqueue(Job::new(id))?;
        }
        queue.close();
        Ok(queue)
    }

    pub fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Declares that no further jobs will be enqueued.
    pub fn close(&self) {
        self.sender.close();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Number of jobs that have not been claimed yet.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Returns a handle for draining the queue. Handles can be cloned freely.
    pub fn receiver(&self) -> JobReceiver {
        JobReceiver(self.receiver.clone())
    }
}

/// The consuming end of a [`JobQueue`].
#[derive(Clone, Debug)]
pub struct JobReceiver(Receiver<Job>);

impl JobReceiver {
    /// Claims the next job, waiting while the queue is open and empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<Job> {
        self.0.recv().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[tokio::test]
    async fn drains_in_enqueue_order() {
        let queue = JobQueue::filled(3).unwrap();
        let receiver = queue.receiver();

        assert_eq!(receiver.next().await, Some(Job::new(1)));
        assert_eq!(receiver.next().await, Some(Job::new(2)));
        assert_eq!(receiver.next().await, Some(Job::new(3)));
        assert_eq!(receiver.next().await, None);
        assert_eq!(receiver.next().await, None);
    }

    #[tokio::test]
    async fn empty_queue_terminates_immediately() {
        let queue = JobQueue::filled(0).unwrap();
        assert!(queue.is_closed());
        assert_eq!(queue.receiver().next().await, None);
    }

    #[test]
    fn rejects_enqueue_after_close() {
        let queue = JobQueue::new(4);
        queue.enqueue(Job::new(1)).unwrap();
        queue.close();

        assert_eq!(queue.enqueue(Job::new(2)), Err(QueueError::Closed));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn rejects_enqueue_beyond_capacity() {
        let queue = JobQueue::new(2);
        queue.enqueue(Job::new(1)).unwrap();
        queue.enqueue(Job::new(2)).unwrap();

        assert_eq!(queue.enqueue(Job::new(3)), Err(QueueError::Full));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn delivers_each_job_once_across_consumers() {
        let queue = JobQueue::filled(500).unwrap();

        let consumers: Vec<_> = (0..8)
            .map(|_| {
                let receiver = queue.receiver();
                tokio::spawn(async move {
                    let mut claimed = Vec::new();
                    while let Some(job) = receiver.next().await {
                        claimed.push(job.id());
                        tokio::task::yield_now().await;
                    }
                    claimed
                })
            })
            .collect();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }

        assert_eq!(all.len(), 500);
        let unique: BTreeSet<_> = all.into_iter().collect();
        assert_eq!(unique, (1..=500).collect());
        assert!(queue.is_empty());
    }
}
