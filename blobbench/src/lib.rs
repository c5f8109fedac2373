//! A throughput benchmark for blob storage.
//!
//! The harness generates a random payload once, then uploads `num_files` copies of it through a
//! fixed pool of concurrent workers and reports the wall-clock time and aggregate throughput.
//!
//! A run is composed of the following parts:
//!
//! - [`queue::JobQueue`] holds one [`job::Job`] per object and is drained by the workers.
//! - [`pool::WorkerPool`] runs a fixed number of workers, each producing one [`job::Outcome`] per
//!   job it claims.
//! - [`collector::ResultCollector`] drains exactly one outcome per job.
//! - [`bench::Benchmark`] wires these together for each phase and measures it, while
//!   [`report::Reporter`] prints the results.
//!
//! Transfers go through a [`blobbench_client::BlobClient`], which is an Azure Blob Storage client
//! when running from the command line.

pub mod bench;
pub mod cli;
pub mod collector;
pub mod config;
pub mod job;
pub mod observability;
pub mod payload;
pub mod pool;
pub mod queue;
pub mod report;
