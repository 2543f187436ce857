//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::anomaly::PercentChange;
use rust_decimal::Decimal;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format currency
pub fn format_currency(amount: Decimal, currency: &str) -> String {
    let amount = amount.round_dp(2);
    match currency {
        "USD" => format!("${:.2}", amount),
        "EUR" => format!("€{:.2}", amount),
        "GBP" => format!("£{:.2}", amount),
        _ => format!("{:.2} {}", amount, currency),
    }
}

/// Color a percent excess by size
pub fn color_percent(percent: &PercentChange) -> String {
    let formatted = format!("{}%", percent);
    match percent {
        PercentChange::Infinite => formatted.red().bold().to_string(),
        PercentChange::Finite(value) if *value >= Decimal::from(100) => formatted.red().to_string(),
        PercentChange::Finite(value) if *value >= Decimal::from(25) => {
            formatted.yellow().to_string()
        }
        PercentChange::Finite(_) => formatted,
    }
}
