//! Delivering sweep results to reporters.
//!
//! Reporters are side channels: console summaries, JSON lines, log lines. Each
//! one runs inside its own failure boundary, so an error or even a panic in one
//! reporter is logged and the others still run. The sweep result itself is
//! never affected.

use crate::output::OutputFormatter;
use crate::sweeper::SweepResult;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

/// Error returned by a reporter.
#[derive(Debug)]
pub enum ReportError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
    Other(String),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Serialize(e) => write!(f, "Serialization failed: {}", e),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<std::io::Error> for ReportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}

/// Something that wants to hear about finished sweeps.
pub trait SweepReporter {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    fn report(&self, result: &SweepResult) -> Result<(), ReportError>;
}

/// Hands `result` to every reporter, each in isolation. Returns how many failed.
pub fn dispatch_reports(reporters: &[Box<dyn SweepReporter>], result: &SweepResult) -> usize {
    let mut failed = 0;
    for reporter in reporters {
        match panic::catch_unwind(AssertUnwindSafe(|| reporter.report(result))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                tracing::warn!(reporter = reporter.name(), error = %e, "reporter failed");
            }
            Err(_) => {
                failed += 1;
                tracing::warn!(reporter = reporter.name(), "reporter panicked");
            }
        }
    }
    failed
}

/// Colored summary table on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl SweepReporter for ConsoleReporter {
    fn name(&self) -> &str {
        "console"
    }

    fn report(&self, result: &SweepResult) -> Result<(), ReportError> {
        OutputFormatter::sweep_summary(result);
        Ok(())
    }
}

/// One JSON object per sweep, one per line, on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReporter;

impl SweepReporter for JsonReporter {
    fn name(&self) -> &str {
        "json"
    }

    fn report(&self, result: &SweepResult) -> Result<(), ReportError> {
        let line = serde_json::to_string(result)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
        Ok(())
    }
}

/// A single `info` log line per sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl SweepReporter for LogReporter {
    fn name(&self) -> &str {
        "log"
    }

    fn report(&self, result: &SweepResult) -> Result<(), ReportError> {
        let per_category = result
            .moved
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(category, count)| format!("{}={}", category, count))
            .collect::<Vec<_>>()
            .join(" ");

        if result.has_failures() {
            tracing::warn!(
                moved = result.total_moved(),
                failed = result.failures.len(),
                "sweep finished with failures: {}",
                per_category
            );
        } else if result.total_moved() > 0 {
            tracing::info!(moved = result.total_moved(), "sweep finished: {}", per_category);
        } else {
            tracing::debug!("sweep finished: nothing to move");
        }
        Ok(())
    }
}
