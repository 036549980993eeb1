//! Output formatting utilities

use advisor_lib::Severity;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table, or a notice when there is nothing to show
pub fn print_table<T: Tabled>(items: &[T], empty_message: &str) {
    if items.is_empty() {
        println!("{}", empty_message.yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "=".repeat(title.chars().count().max(40)));
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format currency
pub fn format_usd(amount: f64) -> String {
    format!("${:.2}", amount)
}

pub fn format_dbus(dbus: f64) -> String {
    format!("{:.2}", dbus)
}

pub fn format_pct(pct: f64) -> String {
    format!("{:.1}%", pct)
}

/// Color a severity for terminal output
pub fn color_severity(severity: Severity) -> String {
    let label = severity.as_str();
    match severity {
        Severity::Expired => label.red().bold().to_string(),
        Severity::Critical => label.red().to_string(),
        Severity::Unknown => label.magenta().to_string(),
        Severity::Warning => label.yellow().to_string(),
        Severity::Good => label.green().to_string(),
    }
}

/// Truncate long reasons so tables stay readable
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatting() {
        assert_eq!(format_usd(1234.5), "$1234.50");
        assert_eq!(format_pct(12.345), "12.3%");
        assert_eq!(format_dbus(3.0), "3.00");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_severity_color_keeps_label() {
        colored::control::set_override(false);
        assert_eq!(color_severity(Severity::Critical), "critical");
    }
}
