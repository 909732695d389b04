//! Colored narration for the terminal.
//!
//! Logs go through `tracing`; these lines are the operator-facing story of a
//! command and are printed regardless of the log level.

use colored::Colorize;

pub fn header(title: &str) {
    println!("\n{}", title.bold().cyan());
    println!("{}", "=".repeat(title.chars().count()).cyan());
}

pub fn step(message: &str) {
    println!("{} {}", "==>".blue().bold(), message);
}

pub fn success(message: &str) {
    println!("  {} {}", "OK".green().bold(), message);
}

pub fn warning(message: &str) {
    println!("  {} {}", "WARN".yellow().bold(), message);
}

pub fn failure(message: &str) {
    eprintln!("  {} {}", "FAIL".red().bold(), message);
}

pub fn detail(label: &str, value: &str) {
    println!("     {:<24} {}", format!("{}:", label).dimmed(), value);
}

/// Numbered troubleshooting list, printed to stderr.
pub fn checklist(items: &[&str]) {
    if items.is_empty() {
        return;
    }
    eprintln!("\n{}", "Troubleshooting".yellow().bold());
    for line in format_checklist(items) {
        eprintln!("{}", line);
    }
}

fn format_checklist(items: &[&str]) -> Vec<String> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("  {}. {}", i + 1, item))
        .collect()
}

/// `1m 05s` style duration for attempt summaries.
pub fn elapsed(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{}s", secs, duration.subsec_millis() / 100)
    }
}
