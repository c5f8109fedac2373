//! Collection of job outcomes.

use std::fmt;

use sketches_ddsketch::DDSketch;
use tokio::sync::mpsc;

use crate::job::Outcome;

/// Upper bound of outcomes buffered between workers and the collector.
const MAX_BUFFERED_OUTCOMES: u64 = 4096;

/// Errors returned while draining outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    #[error("all workers exited after reporting {received} of {expected} outcomes")]
    Disconnected { expected: u64, received: u64 },
}

/// Creates a result channel that expects exactly `expected` outcomes.
pub fn channel(expected: u64) -> (ResultSender, ResultCollector) {
    let capacity = expected.clamp(1, MAX_BUFFERED_OUTCOMES) as usize;
    let (sender, receiver) = mpsc::channel(capacity);

    let collector = ResultCollector {
        receiver,
        expected,
        received: 0,
    };
    (ResultSender(sender), collector)
}

/// The producing end of the result channel, shared by all workers.
#[derive(Clone, Debug)]
pub struct ResultSender(mpsc::Sender<Outcome>);

impl ResultSender {
    /// Pushes an outcome, waiting while the buffer is full.
    ///
    /// Returns the outcome back if the collector has gone away.
    pub async fn send(&self, outcome: Outcome) -> Result<(), Outcome> {
        self.0.send(outcome).await.map_err(|err| err.0)
    }
}

/// The consuming end of the result channel, owned by the run controller.
#[derive(Debug)]
pub struct ResultCollector {
    receiver: mpsc::Receiver<Outcome>,
    expected: u64,
    received: u64,
}

impl ResultCollector {
    /// Whether all expected outcomes have been drained.
    pub fn is_complete(&self) -> bool {
        self.received >= self.expected
    }

    /// Waits for the next outcome.
    ///
    /// Returns `Ok(None)` after exactly `expected` outcomes have been drained, without waiting for
    /// the workers to exit. Fails if every sender is dropped before that.
    pub async fn next(&mut self) -> Result<Option<Outcome>, CollectError> {
        if self.is_complete() {
            return Ok(None);
        }

        match self.receiver.recv().await {
            Some(outcome) => {
                self.received += 1;
                Ok(Some(outcome))
            }
            None => Err(CollectError::Disconnected {
                expected: self.expected,
                received: self.received,
            }),
        }
    }
}

/// Aggregated outcomes of a phase.
#[derive(Default)]
pub struct Tally {
    successes: u64,
    failures: Vec<(String, String)>,
    latency: DDSketch,
}

impl Tally {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success { elapsed, .. } => {
                self.successes += 1;
                self.latency.add(elapsed.as_secs_f64());
            }
            Outcome::Failure { name, reason } => {
                self.failures.push((name.clone(), reason.clone()));
            }
        }
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// Object names and reasons of all failed jobs, in collection order.
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures.len() as u64
    }

    /// Latencies of successful jobs in seconds.
    pub fn latency(&self) -> &DDSketch {
        &self.latency
    }
}

impl fmt::Debug for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tally")
            .field("successes", &self.successes)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn success(name: &str) -> Outcome {
        Outcome::Success {
            name: name.into(),
            elapsed: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn stops_after_expected_outcomes() {
        let (sender, mut collector) = channel(2);
        sender.send(success("file_1.bin")).await.unwrap();
        sender.send(success("file_2.bin")).await.unwrap();

        assert!(collector.next().await.unwrap().is_some());
        assert!(collector.next().await.unwrap().is_some());
        // The sender is still alive, but the collector must not wait for it.
        assert_eq!(collector.next().await, Ok(None));
        assert!(collector.is_complete());
    }

    #[tokio::test]
    async fn completes_immediately_without_jobs() {
        let (_sender, mut collector) = channel(0);
        assert_eq!(collector.next().await, Ok(None));
    }

    #[tokio::test]
    async fn reports_disconnected_producers() {
        let (sender, mut collector) = channel(3);
        sender.send(success("file_1.bin")).await.unwrap();
        drop(sender);

        assert!(collector.next().await.unwrap().is_some());
        assert_eq!(
            collector.next().await,
            Err(CollectError::Disconnected {
                expected: 3,
                received: 1
            })
        );
    }

    #[test]
    fn tallies_outcomes() {
        let mut tally = Tally::default();
        tally.record(&success("file_1.bin"));
        tally.record(&Outcome::Failure {
            name: "file_2.bin".into(),
            reason: "boom".into(),
        });
        tally.record(&success("file_3.bin"));

        assert_eq!(tally.successes(), 2);
        assert_eq!(tally.total(), 3);
        assert_eq!(
            tally.failures(),
            [("file_2.bin".to_owned(), "boom".to_owned())]
        );
        assert_eq!(tally.latency().count(), 2);
    }
}
