//! Colored operator output.
//!
//! Status and success lines go to stdout, warnings and failures to stderr.
//! Diagnostics for debugging go through `tracing` instead.

use crossterm::style::Stylize;

pub fn status(msg: &str) {
    println!("{} {}", "[*]".cyan().bold(), msg);
}

pub fn ok(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "[!]".yellow().bold(), msg.yellow());
}

pub fn fail(msg: &str) {
    eprintln!("{} {}", "[FAIL]".red().bold(), msg.red());
}

/// `[3/9] Package index update/upgrade`
pub fn step_banner(index: usize, total: usize, label: &str) {
    println!();
    println!("{}", format!("[{index}/{total}] {label}").bold());
}
