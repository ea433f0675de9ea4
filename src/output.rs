//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and the per-sweep summary table.

use crate::mover::{MoveError, MoveOutcome, SourceEntry};
use crate::sweeper::{SweepObserver, SweepResult};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for sweeps
/// - Summary tables with per-category counts
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use dltidy::output::OutputFormatter;
    /// OutputFormatter::success("Downloads sorted");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for a sweep over `total` entries.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        let pb = ProgressBar::new(total);
        pb.set_style(style);
        pb
    }

    /// Prints the full report for one sweep: counts per category (zeros included),
    /// skipped entries, and every failed entry with its reason.
    ///
    /// ```no_run
    /// use dltidy::output::OutputFormatter;
    /// # fn show(result: &dltidy::SweepResult) {
    /// OutputFormatter::sweep_summary(result);
    /// # }
    /// ```
    pub fn sweep_summary(result: &SweepResult) {
        Self::header(if result.dry_run {
            "DRY RUN SUMMARY"
        } else {
            "SUMMARY"
        });

        // BTreeMap keeps categories sorted for consistent output
        let max_category_len = result
            .moved
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in &result.moved {
            let count_text = if *count == 0 {
                count.to_string().dimmed()
            } else {
                count.to_string().green()
            };
            println!(
                "{:<width$} | {} {}",
                category,
                count_text,
                plural(*count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        let total = result.total_moved();
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total.to_string().green().bold(),
            plural(total),
            width = max_category_len
        );

        let skipped = &result.skipped;
        if skipped.transient + skipped.unclassified + skipped.vanished > 0 {
            println!(
                "Left in place: {} downloading, {} unrecognized, {} vanished",
                skipped.transient, skipped.unclassified, skipped.vanished
            );
        }

        if result.has_failures() {
            Self::warning(&format!(
                "{} {} could not be moved:",
                result.failures.len(),
                plural(result.failures.len())
            ));
            for failure in &result.failures {
                eprintln!("   {} {}: {}", "✗".red(), failure.entry, failure.reason);
            }
        } else if result.dry_run {
            Self::dry_run_notice("No files were modified.");
        } else if total > 0 {
            Self::success("All files sorted.");
        }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Drives a progress bar from sweep callbacks.
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self { bar: None }
    }

    /// Clears the bar once the sweep is done.
    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepObserver for ProgressObserver {
    fn on_snapshot(&mut self, entries: usize) {
        self.bar = Some(OutputFormatter::create_progress_bar(entries as u64));
    }

    fn on_entry(&mut self, entry: &SourceEntry, result: &Result<MoveOutcome, MoveError>) {
        let Some(bar) = &self.bar else {
            return;
        };
        match result {
            Ok(MoveOutcome::Moved { category, .. }) | Ok(MoveOutcome::Planned { category, .. }) => {
                bar.set_message(format!("{} → {}", entry.display_name(), category));
            }
            Err(_) => bar.set_message(format!("{} ✗", entry.display_name())),
            Ok(MoveOutcome::Skipped(_)) => {}
        }
        bar.inc(1);
    }
}
