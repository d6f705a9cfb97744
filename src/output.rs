//! Output formatting and styling module.
//!
//! Everything the CLI prints for a person goes through here. Diagnostics go
//! through `tracing` instead, so this module never logs.

use crate::retention::{SweepPlan, SweepReport};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - A spinner for sweeps
/// - Summary tables for organize and sweep runs
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidywatch::output::OutputFormatter;
    /// OutputFormatter::success("Moved report.pdf");
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

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a ticking spinner for work of unknown length.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidywatch::output::OutputFormatter;
    /// let spinner = OutputFormatter::spinner("Sweeping /home/me/Downloads");
    /// spinner.finish_and_clear();
    /// ```
    pub fn spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Prints a table of moved entries per category.
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_category_len = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Entries".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 12));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count, "entry", "entries"),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 12));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files, "entry", "entries"),
            width = max_category_len
        );
    }

    /// Prints what a sweep removed and what it could not.
    pub fn sweep_report(root: &Path, report: &SweepReport) {
        Self::header(&format!("SWEEP {}", root.display()));
        for path in &report.trashed_items {
            Self::success(&format!("Trashed {}", path.display()));
        }
        for path in &report.pruned_dirs {
            Self::success(&format!("Pruned {}", path.display()));
        }
        for (path, reason) in &report.skipped {
            Self::warning(&format!("Skipped {}: {}", path.display(), reason));
        }
        for (path, reason) in &report.failures {
            Self::error(&format!("Failed {}: {}", path.display(), reason));
        }

        if report.total_removed() == 0 && report.is_clean() {
            Self::info("Nothing to clean up.");
            return;
        }
        println!(
            "{} {}, {} {}",
            report.trashed_items.len().to_string().green(),
            plural(report.trashed_items.len(), "item trashed", "items trashed"),
            report.pruned_dirs.len().to_string().green(),
            plural(report.pruned_dirs.len(), "folder pruned", "folders pruned"),
        );
    }

    /// Prints a sweep dry run.
    pub fn sweep_plan(root: &Path, plan: &SweepPlan) {
        Self::dry_run_notice(&format!("Sweep of {}", root.display()));
        for path in &plan.expired_items {
            Self::dry_run_notice(&format!("Would trash {}", path.display()));
        }
        for path in &plan.empty_dirs {
            Self::dry_run_notice(&format!("Would prune {}", path.display()));
        }
        if plan.expired_items.is_empty() && plan.empty_dirs.is_empty() {
            Self::info("Nothing to clean up.");
        }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural(count: usize, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 { one } else { many }
}
