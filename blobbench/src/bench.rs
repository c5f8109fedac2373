//! The run controller: drives jobs through the worker pool and measures each phase.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use blobbench_client::{AzureBlobClient, Error, SharedClient};
use bytesize::MIB;
use secrecy::ExposeSecret;

use crate::collector::{self, Tally};
use crate::config::{Config, ConfigError};
use crate::job::{DEFAULT_PREFIX, Job, Outcome};
use crate::payload::{PayloadSource, TempFilePayload};
use crate::pool::WorkerPool;
use crate::queue::JobQueue;
use crate::report::Reporter;

/// A pass over all objects of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Upload,
    Download,
    Cleanup,
}

impl Phase {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Cleanup => "delete",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Upload => "uploaded",
            Self::Download => "downloaded",
            Self::Cleanup => "deleted",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Upload => "UPLOAD",
            Self::Download => "DOWNLOAD",
            Self::Cleanup => "CLEANUP",
        }
    }

    /// Whether the phase moves payload bytes, and therefore has a throughput.
    pub fn transfers_data(self) -> bool {
        !matches!(self, Self::Cleanup)
    }
}

/// Parameters shared by all phases of a run.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Number of objects, and therefore jobs per phase.
    pub num_files: u64,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Concurrency hint passed to the client for every single transfer.
    pub concurrency: usize,
    /// Prefix of object names.
    pub prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_files: 1000,
            workers: 8,
            concurrency: 16,
            prefix: DEFAULT_PREFIX.to_owned(),
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            num_files: config.num_files,
            workers: config.workers,
            concurrency: config.concurrency,
            prefix: config.prefix.clone(),
        }
    }
}

/// Timing and outcomes of one phase.
#[derive(Debug)]
pub struct RunStats {
    pub phase: Phase,
    /// Number of jobs in the phase, including failed ones.
    pub files: u64,
    pub bytes_per_file: u64,
    /// Wall-clock time from the first dispatch to the last collected outcome.
    pub elapsed: Duration,
    pub tally: Tally,
}

impl RunStats {
    pub fn megabytes_per_file(&self) -> f64 {
        self.bytes_per_file as f64 / MIB as f64
    }

    /// Aggregate throughput in MB/s over all jobs, failed ones included.
    ///
    /// Returns `0` if no time elapsed.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 * self.megabytes_per_file() / secs
        } else {
            0.0
        }
    }

    pub fn ops_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 / secs
        } else {
            0.0
        }
    }
}

/// Runs the phases of a benchmark against a single client.
#[derive(Debug)]
pub struct Benchmark {
    client: SharedClient,
    settings: Settings,
}

impl Benchmark {
    pub fn new(client: SharedClient, settings: Settings) -> Self {
        Self { client, settings }
    }

    /// Uploads `num_files` copies of the payload.
    pub async fn upload<W: Write>(
        &self,
        payload: Arc<dyn PayloadSource>,
        reporter: &mut Reporter<W>,
    ) -> Result<RunStats> {
        let size = payload.size();
        let context = self.context(Some(payload));
        self.run_phase(Phase::Upload, size, reporter, move |job| {
            let context = Arc::clone(&context);
            async move { context.upload(job).await }
        })
        .await
    }

    /// Downloads all objects, failing jobs whose size differs from `expected_size`.
    pub async fn download<W: Write>(
        &self,
        expected_size: u64,
        reporter: &mut Reporter<W>,
    ) -> Result<RunStats> {
        let context = self.context(None);
        self.run_phase(Phase::Download, expected_size, reporter, move |job| {
            let context = Arc::clone(&context);
            async move { context.download(job, expected_size).await }
        })
        .await
    }

    /// Deletes all objects. Objects that do not exist count as deleted.
    pub async fn cleanup<W: Write>(&self, reporter: &mut Reporter<W>) -> Result<RunStats> {
        let context = self.context(None);
        self.run_phase(Phase::Cleanup, 0, reporter, move |job| {
            let context = Arc::clone(&context);
            async move { context.delete(job).await }
        })
        .await
    }

    fn context(&self, payload: Option<Arc<dyn PayloadSource>>) -> Arc<JobContext> {
        Arc::new(JobContext {
            client: Arc::clone(&self.client),
            payload,
            prefix: self.settings.prefix.clone(),
            concurrency: self.settings.concurrency.max(1),
        })
    }

    async fn run_phase<W, F, Fut>(
        &self,
        phase: Phase,
        bytes_per_file: u64,
        reporter: &mut Reporter<W>,
        task: F,
    ) -> Result<RunStats>
    where
        W: Write,
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let files = self.settings.num_files;
        let pool = WorkerPool::new(self.settings.workers);
        reporter.phase_started(phase, files, pool.workers())?;

        let queue = JobQueue::filled(files).context("failed to fill job queue")?;
        let (results, mut collector) = collector::channel(files);

        tracing::info!(phase = phase.verb(), files, workers = pool.workers(), "starting");
        let start = Instant::now();
        let workers = pool.spawn(queue.receiver(), results, task);

        let mut tally = Tally::default();
        while let Some(outcome) = collector.next().await? {
            reporter.outcome(phase, &outcome)?;
            tally.record(&outcome);
        }
        let elapsed = start.elapsed();

        workers.join().await.context("worker panicked")?;
        tracing::info!(
            phase = phase.verb(),
            elapsed = elapsed.as_secs_f64(),
            failures = tally.failures().len(),
            "finished"
        );

        let stats = RunStats {
            phase,
            files,
            bytes_per_file,
            elapsed,
            tally,
        };
        reporter.summary(&stats)?;
        Ok(stats)
    }
}

/// Everything a worker needs to execute a single job.
#[derive(Debug)]
struct JobContext {
    client: SharedClient,
    payload: Option<Arc<dyn PayloadSource>>,
    prefix: String,
    concurrency: usize,
}

impl JobContext {
    async fn upload(&self, job: Job) -> Outcome {
        let name = job.object_name(&self.prefix);
        let start = Instant::now();

        let result: blobbench_client::Result<()> = async {
            let payload = self.payload.as_ref().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no payload to upload")
            })?;
            // The read handle lives inside the stream and is closed when the client drops it.
            let stream = payload.open().await.map_err(|err| {
                std::io::Error::new(err.kind(), format!("failed to open payload: {err}"))
            })?;
            self.client.upload(&name, stream, self.concurrency).await
        }
        .await;

        finish(name, start, result)
    }

    async fn download(&self, job: Job, expected: u64) -> Outcome {
        let name = job.object_name(&self.prefix);
        let start = Instant::now();

        let result = match self.client.download(&name).await {
            Ok(actual) if actual == expected => Ok(()),
            Ok(actual) => Err(Error::SizeMismatch { expected, actual }),
            Err(err) => Err(err),
        };

        finish(name, start, result)
    }

    async fn delete(&self, job: Job) -> Outcome {
        let name = job.object_name(&self.prefix);
        let start = Instant::now();
        let result = self.client.delete(&name).await;
        finish(name, start, result)
    }
}

fn finish(name: String, start: Instant, result: blobbench_client::Result<()>) -> Outcome {
    match result {
        Ok(()) => {
            let elapsed = start.elapsed();
            tracing::debug!(%name, ?elapsed, "job succeeded");
            Outcome::Success { name, elapsed }
        }
        Err(err) => {
            tracing::warn!(%name, error = %err, "job failed");
            Outcome::Failure {
                name,
                reason: err.to_string(),
            }
        }
    }
}

/// Creates the Azure client described by the configuration.
pub fn azure_client(config: &Config) -> Result<SharedClient> {
    let key = config
        .account_key
        .as_ref()
        .ok_or(ConfigError::Missing("accountKey"))?;

    let mut builder = AzureBlobClient::builder(
        &config.account_name,
        key.expose_secret().as_str(),
        &config.container_name,
    )
    .block_size(usize::try_from(config.block_size.as_u64()).unwrap_or(usize::MAX));
    if let Some(ref endpoint) = config.endpoint {
        builder = builder.endpoint(endpoint.as_str());
    }

    let client = builder.build().context("failed to create storage client")?;
    Ok(Arc::new(client))
}

/// Runs a complete benchmark as described by the configuration.
///
/// Uploads first, then optionally downloads and deletes the objects. Returns the statistics of
/// every phase that ran. Individual job failures are reported but do not fail the run.
pub async fn run<W: Write>(config: &Config, reporter: &mut Reporter<W>) -> Result<Vec<RunStats>> {
    config.validate()?;

    let client = azure_client(config)?;
    let settings = Settings::from(config);
    let size = config.file_size.saturating_mul(MIB);

    let destination = format!(
        "{} {} (container {})",
        client.name(),
        config.endpoint.as_deref().unwrap_or("default endpoint"),
        config.container_name
    );
    reporter.banner(&settings, size, &destination)?;

    if config.create_container {
        client
            .prepare()
            .await
            .with_context(|| format!("failed to create container {}", config.container_name))?;
    }

    let payload = TempFilePayload::generate(size)
        .await
        .context("failed to generate payload")?;
    let payload: Arc<dyn PayloadSource> = Arc::new(payload);

    let benchmark = Benchmark::new(client, settings);
    let mut stats = vec![benchmark.upload(Arc::clone(&payload), reporter).await?];
    // The payload file is no longer needed once all uploads are done.
    drop(payload);

    if config.download {
        stats.push(benchmark.download(size, reporter).await?);
    }
    if config.cleanup {
        stats.push(benchmark.cleanup(reporter).await?);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(files: u64, bytes_per_file: u64, elapsed: Duration) -> RunStats {
        RunStats {
            phase: Phase::Upload,
            files,
            bytes_per_file,
            elapsed,
            tally: Tally::default(),
        }
    }

    #[test]
    fn computes_throughput() {
        let stats = stats(1000, 64 * MIB, Duration::from_secs(10));
        assert_eq!(stats.megabytes_per_file(), 64.0);
        assert_eq!(stats.throughput(), 6400.0);
        assert_eq!(stats.ops_per_second(), 100.0);
    }

    #[test]
    fn zero_elapsed_has_zero_throughput() {
        let stats = stats(10, MIB, Duration::ZERO);
        assert_eq!(stats.throughput(), 0.0);
        assert_eq!(stats.ops_per_second(), 0.0);
    }

    #[test]
    fn phases_describe_themselves() {
        assert_eq!(Phase::Upload.verb(), "upload");
        assert_eq!(Phase::Cleanup.past_tense(), "deleted");
        assert!(Phase::Download.transfers_data());
        assert!(!Phase::Cleanup.transfers_data());
    }
}
