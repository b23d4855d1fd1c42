//! Output formatting utilities for CLI commands

use colored::Colorize;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print one device listing line
pub fn device(index: u32, name: &str) {
    println!("{} {}", format!("GPU {}:", index).bold(), name);
}
