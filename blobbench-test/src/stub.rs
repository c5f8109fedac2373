//! An in-memory [`BlobClient`] that records every call it receives.
//!
//! Use it to observe how the harness schedules work: which objects were written, how many
//! uploads were in flight at the same time, and what happens when individual calls fail.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blobbench_client::{BlobClient, Error, PayloadStream, Result};
use futures_util::TryStreamExt;

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    objects: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    failing_names: HashSet<String>,
    failing_calls: HashSet<usize>,
}

/// Builder for a [`RecordingClient`].
#[derive(Debug, Default)]
pub struct RecordingClientBuilder {
    delay: Duration,
    failing_names: HashSet<String>,
    failing_calls: HashSet<usize>,
}

impl RecordingClientBuilder {
    /// Holds every upload for the given duration before it completes.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails every upload of the object with the given name.
    pub fn failing_name(mut self, name: &str) -> Self {
        self.failing_names.insert(name.to_owned());
        self
    }

    /// Fails the n-th upload call, counting from 1 in the order calls arrive.
    pub fn failing_call(mut self, call: usize) -> Self {
        self.failing_calls.insert(call);
        self
    }

    pub fn build(self) -> RecordingClient {
        RecordingClient {
            inner: Arc::new(Inner {
                delay: self.delay,
                failing_names: self.failing_names,
                failing_calls: self.failing_calls,
                ..Default::default()
            }),
        }
    }
}

/// A [`BlobClient`] that keeps object sizes in memory and records its calls.
///
/// Clones share the same recorded state.
#[derive(Clone, Debug, Default)]
pub struct RecordingClient {
    inner: Arc<Inner>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RecordingClientBuilder {
        RecordingClientBuilder::default()
    }

    /// Names of all upload calls in the order they arrived, including failed ones.
    pub fn calls(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().calls.clone()
    }

    /// The size of a stored object.
    pub fn object(&self, name: &str) -> Option<u64> {
        self.inner.state.lock().unwrap().objects.get(name).copied()
    }

    /// The number of stored objects.
    pub fn object_count(&self) -> usize {
        self.inner.state.lock().unwrap().objects.len()
    }

    /// The highest number of uploads that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BlobClient for RecordingClient {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn upload(&self, name: &str, stream: PayloadStream, _concurrency: usize) -> Result<()> {
        let call = {
            let mut state = self.inner.state.lock().unwrap();
            state.calls.push(name.to_owned());
            state.calls.len()
        };

        let in_flight = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if !self.inner.delay.is_zero() {
            tokio::time::sleep(self.inner.delay).await;
        }

        let result = if self.inner.failing_calls.contains(&call)
            || self.inner.failing_names.contains(name)
        {
            Err(Error::Io(io::Error::other(format!(
                "injected failure for call {call}"
            ))))
        } else {
            stream
                .try_fold(0u64, |size, chunk| async move {
                    Ok(size + chunk.len() as u64)
                })
                .await
                .map_err(Error::from)
        };

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        let size = result?;
        self.inner
            .state
            .lock()
            .unwrap()
            .objects
            .insert(name.to_owned(), size);
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<u64> {
        self.object(name).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("object {name} not found"),
            ))
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.inner.state.lock().unwrap().objects.remove(name);
        Ok(())
    }
}
