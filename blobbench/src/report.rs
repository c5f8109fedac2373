//! Console output of a benchmark run.

use std::io::{self, Write};
use std::time::Duration;

use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::bench::{Phase, RunStats, Settings};
use crate::job::Outcome;

/// Writes the human-readable report of a run.
#[derive(Debug)]
pub struct Reporter<W> {
    out: W,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Describes the run before any work starts.
    pub fn banner(&mut self, settings: &Settings, size: u64, destination: &str) -> io::Result<()> {
        let total = ByteSize::b(size.saturating_mul(settings.num_files));

        writeln!(self.out, "{}", "## Blob storage benchmark".bold())?;
        writeln!(self.out, "  file size: {}", ByteSize::b(size).bold())?;
        writeln!(
            self.out,
            "  number of files: {} ({total} total)",
            settings.num_files.bold()
        )?;
        writeln!(self.out, "  workers: {}", settings.workers.bold())?;
        writeln!(
            self.out,
            "  concurrency per transfer: {}",
            settings.concurrency.bold()
        )?;
        writeln!(self.out, "  destination: {destination}")?;
        writeln!(self.out)
    }

    pub fn phase_started(&mut self, phase: Phase, files: u64, workers: usize) -> io::Result<()> {
        writeln!(
            self.out,
            "{} ({} files, workers: {})",
            format!("## {}", phase.label()).bold(),
            files.blue(),
            workers.bold()
        )
    }

    /// Reports a single collected outcome.
    pub fn outcome(&mut self, phase: Phase, outcome: &Outcome) -> io::Result<()> {
        match outcome {
            Outcome::Success { name, .. } => {
                writeln!(self.out, "File {name} {} successfully!", phase.past_tense())
            }
            Outcome::Failure { name, reason } => {
                let line = format!("failed to {} file {name}: {reason}", phase.verb());
                writeln!(self.out, "{}", line.red())
            }
        }
    }

    /// Reports timing, throughput and outcome counts of a finished phase.
    pub fn summary(&mut self, stats: &RunStats) -> io::Result<()> {
        writeln!(
            self.out,
            "Total {} time: {:.2} seconds",
            stats.phase.verb(),
            stats.elapsed.as_secs_f64()
        )?;
        if stats.phase.transfers_data() {
            writeln!(self.out, "Throughput: {:.2} MB/s", stats.throughput())?;
        }

        let failures = stats.tally.failures().len();
        write!(self.out, "  {} succeeded", stats.tally.successes().green())?;
        if failures > 0 {
            write!(self.out, ", {}", format!("{failures} FAILED").bold().red())?;
        }
        writeln!(self.out, "; {:.2} operations/s", stats.ops_per_second().bold())?;

        self.percentiles(stats.tally.latency())?;
        writeln!(self.out)
    }

    fn percentiles(&mut self, sketch: &DDSketch) -> io::Result<()> {
        let Some(sum) = sketch.sum() else {
            return Ok(());
        };
        let quantile = |q| {
            let secs = sketch.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs.max(0.0))
        };

        let avg = Duration::from_secs_f64((sum / sketch.count() as f64).max(0.0));
        let p50 = quantile(0.5);
        let p90 = quantile(0.9);
        let p99 = quantile(0.99);
        writeln!(
            self.out,
            "  latency avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
            avg.bold()
        )
    }
}
