//! Console rendering for the `wotd` binary.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::checkpoint::ScriptDocument;
use crate::distribute::{DistributionReport, PlatformOutcome};
use crate::utils::format_file_size;

const RULE_WIDTH: usize = 60;

/// Spinner for long waits; hidden when `quiet`
pub fn spinner(message: impl Into<String>, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message(message.into());
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}

pub fn print_banner(title: &str, subtitle: Option<&str>) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("{}", rule);
    println!("  {}", style(title).bold());
    if let Some(subtitle) = subtitle {
        println!("  {}", style(subtitle).yellow());
    }
    println!("{}", rule);
}

/// `[3/5] Generating narration audio...`
pub fn print_step(index: usize, total: usize, message: &str) {
    println!();
    println!("{} {}", style(format!("[{}/{}]", index, total)).cyan().bold(), message);
}

pub fn print_script(document: &ScriptDocument) {
    println!("  {} {}", style("Word:").bold(), document.word);
    if let Some(phonetic) = &document.phonetic {
        println!("  {} {}", style("Phonetic:").bold(), phonetic);
    }
    for (i, definition) in document.definitions.iter().enumerate() {
        println!("  {}. {}", i + 1, definition);
    }
    println!("  {} {}", style("Narration:").bold(), document.narration);
    println!(
        "  {} {}",
        style("On screen:").bold(),
        document.on_screen_text.join(" | ")
    );
    println!("  {} {}", style("Background:").bold(), document.background_color);
}

pub fn print_export(path: &Path) {
    let size = fs_err::metadata(path).map(|m| m.len()).unwrap_or(0);
    println!(
        "  {} {} ({})",
        style("Output:").bold(),
        path.display(),
        format_file_size(size)
    );
}

pub fn print_distribution(report: &DistributionReport) {
    println!();
    println!("{}", style("Distribution results:").bold());
    for (platform, outcome) in report.iter() {
        let marker = match outcome {
            PlatformOutcome::Published { .. } => style("OK").green(),
            PlatformOutcome::Skipped { .. } => style("SKIP").yellow(),
            PlatformOutcome::AuthExpired { .. } | PlatformOutcome::Failed { .. } => {
                style("FAIL").red()
            }
        };
        println!("  {:<10} {:<5} {}", platform, marker, outcome);
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}
