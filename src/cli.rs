//! Command-line interface for dltidy.
//!
//! Parses arguments, loads and validates configuration, then runs either a
//! single sweep or the watch loop.

use crate::config::Config;
use crate::logging::Verbosity;
use crate::output::{OutputFormatter, ProgressObserver};
use crate::report::{ConsoleReporter, JsonReporter, LogReporter, SweepReporter, dispatch_reports};
use crate::sweeper::DirectorySweeper;
use crate::watch::{ChangeTrigger, WatchBackend};
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "dltidy")]
#[command(version)]
#[command(about = "Sort a downloads folder into category folders by file extension")]
#[command(long_about = "Sort a downloads folder into category folders by file extension. \
Files that are still downloading are left alone, and nothing is ever overwritten: \
name clashes become \"name (1).ext\", \"name (2).ext\" and so on.")]
pub struct Cli {
    /// Directory to sort (defaults to source_dir from the config, then ~/Downloads)
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// Configuration file to use instead of the default locations
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep running and sort again whenever the directory changes
    #[arg(short, long)]
    pub watch: bool,

    /// Poll for changes every MS milliseconds instead of using native events
    #[arg(long, value_name = "MS", requires = "watch")]
    pub poll: Option<u64>,

    /// Quiet period after a change before sweeping, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub settle: u64,

    /// Show what would be moved without touching anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Wait SECS seconds before the first sweep (overrides startup_delay_secs)
    #[arg(long, value_name = "SECS")]
    pub delay: Option<u64>,

    /// Print one JSON object per sweep instead of the summary table
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll == Some(0) {
            return Err("Poll interval must be greater than 0".to_string());
        }
        if let Some(source) = &self.source
            && source.as_os_str().is_empty()
        {
            return Err("Source directory cannot be empty".to_string());
        }
        Ok(())
    }

    /// The source directory from the command line, made absolute against the working directory.
    pub fn source_path(&self) -> Option<PathBuf> {
        self.source
            .as_deref()
            .map(|path| std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
    }

    pub fn watch_backend(&self) -> WatchBackend {
        match self.poll {
            Some(ms) => WatchBackend::Poll(Duration::from_millis(ms)),
            None => WatchBackend::Native,
        }
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle)
    }
}

/// How a run ended, when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every entry was moved or deliberately left in place.
    Completed,
    /// At least one file could not be moved.
    CompletedWithFailures,
}

impl From<RunStatus> for ExitCode {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Completed => ExitCode::SUCCESS,
            RunStatus::CompletedWithFailures => ExitCode::from(2),
        }
    }
}

/// Runs dltidy with parsed arguments.
///
/// # Errors
///
/// Returns an error for anything that stops the run as a whole: bad
/// configuration, an unreadable source directory, or a watcher that cannot
/// start. Per-file problems are reported and reflected in [`RunStatus`].
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use dltidy::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["dltidy", "--dry-run", "/home/me/Downloads"]);
/// let status = run_cli(&cli).expect("run failed");
/// println!("{:?}", status);
/// ```
pub fn run_cli(cli: &Cli) -> anyhow::Result<RunStatus> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref()).context("Error loading configuration")?;
    let settings = config
        .resolve(cli.source_path().as_deref())
        .context("Invalid configuration")?;

    let delay = cli
        .delay
        .map(Duration::from_secs)
        .unwrap_or(settings.startup_delay);
    if !delay.is_zero() {
        tracing::info!(seconds = delay.as_secs(), "waiting before the first sweep");
        std::thread::sleep(delay);
    }

    if !cli.dry_run {
        settings.bootstrap();
    }
    let sweeper = settings.sweeper(cli.dry_run);

    if cli.watch {
        run_watch(cli, &settings.source_dir, &sweeper)
    } else {
        run_once(cli, &settings.source_dir, &sweeper)
    }
}

fn run_once(cli: &Cli, source_dir: &Path, sweeper: &DirectorySweeper) -> anyhow::Result<RunStatus> {
    if !cli.json {
        OutputFormatter::info(&format!("Sorting contents of: {}", source_dir.display()));
        if cli.dry_run {
            OutputFormatter::dry_run_notice("No files will be moved.");
        }
    }

    let mut progress = ProgressObserver::new();
    let result = sweeper.sweep_observed(source_dir, &mut progress);
    progress.finish();
    let result = result?;

    let reporters: Vec<Box<dyn SweepReporter>> = if cli.json {
        vec![Box::new(JsonReporter)]
    } else {
        vec![Box::new(ConsoleReporter)]
    };
    dispatch_reports(&reporters, &result);

    Ok(if result.has_failures() {
        RunStatus::CompletedWithFailures
    } else {
        RunStatus::Completed
    })
}

fn run_watch(cli: &Cli, source_dir: &Path, sweeper: &DirectorySweeper) -> anyhow::Result<RunStatus> {
    let trigger = ChangeTrigger::start(source_dir, cli.watch_backend())?;

    let signal = trigger.signal();
    ctrlc::set_handler(move || signal.close()).context("Error installing Ctrl-C handler")?;

    let reporters: Vec<Box<dyn SweepReporter>> = if cli.json {
        vec![Box::new(JsonReporter)]
    } else {
        vec![Box::new(LogReporter)]
    };

    if !cli.json {
        OutputFormatter::info(&format!("Watching: {}", source_dir.display()));
        OutputFormatter::info("Press Ctrl+C to quit");
    }

    let mut failed_sweeps = 0usize;
    let sweeps = trigger.run(cli.settle_window(), || match sweeper.sweep(source_dir) {
        Ok(result) => {
            if result.has_failures() {
                failed_sweeps += 1;
            }
            dispatch_reports(&reporters, &result);
        }
        Err(e) => tracing::error!("{}", e),
    });

    tracing::info!(sweeps, failed_sweeps, "stopped watching");
    Ok(if failed_sweeps > 0 {
        RunStatus::CompletedWithFailures
    } else {
        RunStatus::Completed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dltidy").chain(args.iter().copied())).unwrap()
    }

    /// Source directory plus an empty config file so the run ignores the user's own config.
    fn setup() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = temp_dir.path().join("empty.toml");
        fs::write(&config, "").unwrap();
        let source = temp_dir.path().join("Downloads");
        fs::create_dir(&source).unwrap();
        (temp_dir, config)
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert!(cli.source.is_none());
        assert!(!cli.watch);
        assert_eq!(cli.settle_window(), Duration::from_millis(500));
        assert_eq!(cli.watch_backend(), WatchBackend::Native);
        assert_eq!(cli.verbosity(), Verbosity::Normal);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_watch_flags() {
        let cli = parse(&["--watch", "--poll", "250", "--settle", "0", "/tmp"]);
        assert_eq!(cli.watch_backend(), WatchBackend::Poll(Duration::from_millis(250)));
        assert_eq!(cli.settle_window(), Duration::ZERO);
        assert_eq!(cli.source_path(), Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_poll_requires_watch() {
        let result = Cli::try_parse_from(["dltidy", "--poll", "100"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let result = Cli::try_parse_from(["dltidy", "-v", "-q"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll() {
        let cli = parse(&["--watch", "--poll", "0"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_relative_source_becomes_absolute() {
        let cli = parse(&["some/dir"]);
        assert!(cli.source_path().unwrap().is_absolute());
    }

    #[test]
    fn test_run_once_moves_files() {
        let (temp_dir, config) = setup();
        let source = temp_dir.path().join("Downloads");
        fs::write(source.join("song.mp3"), b"la").unwrap();
        fs::write(source.join("film.mp4.crdownload"), b"partial").unwrap();

        let cli = parse(&[
            "--config",
            config.to_str().unwrap(),
            "--no-color",
            source.to_str().unwrap(),
        ]);
        let status = run_cli(&cli).unwrap();

        assert_eq!(status, RunStatus::Completed);
        assert!(source.join("Audio/song.mp3").exists());
        assert!(source.join("film.mp4.crdownload").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let (temp_dir, config) = setup();
        let source = temp_dir.path().join("Downloads");
        fs::write(source.join("report.pdf"), b"%PDF").unwrap();

        let cli = parse(&[
            "--dry-run",
            "--json",
            "--config",
            config.to_str().unwrap(),
            source.to_str().unwrap(),
        ]);
        let status = run_cli(&cli).unwrap();

        assert_eq!(status, RunStatus::Completed);
        assert!(source.join("report.pdf").exists());
        assert!(!source.join("Docs").exists());
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let (temp_dir, config) = setup();
        let missing = temp_dir.path().join("nope");
        let cli = parse(&["--config", config.to_str().unwrap(), missing.to_str().unwrap()]);
        assert!(run_cli(&cli).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(format!("{:?}", ExitCode::from(RunStatus::Completed)), format!("{:?}", ExitCode::SUCCESS));
        assert_eq!(
            format!("{:?}", ExitCode::from(RunStatus::CompletedWithFailures)),
            format!("{:?}", ExitCode::from(2))
        );
    }
}
