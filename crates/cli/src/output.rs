//! Output formatting utilities

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

/// Print a rounded table, or a note when there is nothing to show
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No rows".yellow());
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

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Two decimals with thousands separators, e.g. `1,150.00`
pub fn format_value(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// MAPE as a percentage, `n/a` when undefined
pub fn format_mape(mape: Option<f64>) -> String {
    match mape {
        Some(m) if m.is_finite() => format!("{:.2}%", m),
        _ => "n/a".to_string(),
    }
}

/// Color R² by fit quality
pub fn color_r2(r2: f64) -> String {
    if !r2.is_finite() {
        return "n/a".dimmed().to_string();
    }
    let formatted = format!("{:.2}", r2);
    if r2 >= 0.9 {
        formatted.green().to_string()
    } else if r2 >= 0.5 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Color a formatted percentage delta by sign
pub fn color_delta(delta: &str) -> String {
    if delta.starts_with('+') {
        delta.green().to_string()
    } else if delta.starts_with('-') {
        delta.red().to_string()
    } else {
        delta.dimmed().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value_groups_thousands() {
        assert_eq!(format_value(1150.0), "1,150.00");
        assert_eq!(format_value(1234567.891), "1,234,567.89");
        assert_eq!(format_value(12.5), "12.50");
        assert_eq!(format_value(-1000.0), "-1,000.00");
        assert_eq!(format_value(f64::NAN), "n/a");
    }

    #[test]
    fn test_format_mape() {
        assert_eq!(format_mape(Some(1.234)), "1.23%");
        assert_eq!(format_mape(None), "n/a");
    }
}
