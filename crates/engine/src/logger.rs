//! Run-scoped console and file logger
//!
//! Colored output on the console, the same lines monochrome in
//! `conversion.log` at the destination root. Safe for concurrent writers;
//! the file sink appends under its own lock.

use chrono::Local;
use console::style;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

pub struct Logger {
    sink: Option<Mutex<File>>,
    verbose: bool,
}

impl Logger {
    /// Create a logger. When `log_path` is given the file is opened in
    /// append mode (created if absent).
    pub fn new(log_path: Option<&Path>, verbose: bool) -> io::Result<Self> {
        let sink = match log_path {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(Self { sink, verbose })
    }

    /// Logger that writes to the console only. Used by tests and dry runs
    /// before the destination exists.
    pub fn console_only() -> Self {
        Self {
            sink: None,
            verbose: false,
        }
    }

    fn write_file(&self, tag: &str, message: &str) {
        if let Some(sink) = &self.sink {
            let mut file = sink.lock().unwrap();
            let _ = writeln!(file, "[{}] {}", tag, message);
        }
    }

    /// Section-level message with a timestamp prefix
    pub fn log(&self, message: &str) {
        let ts = Local::now().format("%H:%M:%S").to_string();
        println!("[{}] {}", style(&ts).blue(), message);
        self.write_file(&ts, message);
    }

    pub fn info(&self, message: &str) {
        println!("[{}] {}", style("i").cyan(), message);
        self.write_file("INFO", message);
    }

    pub fn success(&self, message: &str) {
        println!("[{}] {}", style("✓").green(), message);
        self.write_file("SUCCESS", message);
    }

    pub fn warn(&self, message: &str) {
        println!("[{}] {}", style("⚠").yellow(), message);
        self.write_file("WARN", message);
    }

    pub fn error(&self, message: &str) {
        let ts = Local::now().format("%H:%M:%S").to_string();
        println!("[{} {}] {}", style("ERROR").red().bold(), style(&ts).red(), message);
        self.write_file("ERROR", message);
    }

    /// Safety-relevant events (guarded deletes, aborted deletions)
    pub fn security(&self, message: &str) {
        println!("[{}] {}", style("🔒 SAFETY").red().bold(), message);
        self.write_file("SAFETY", message);
    }

    /// Verbose-only diagnostics (swallowed traversal errors and the like)
    pub fn debug(&self, message: &str) {
        if !self.verbose {
            return;
        }
        println!("[{}] {}", style("debug").dim(), message);
        self.write_file("DEBUG", message);
    }

    /// Banner printed before the run starts
    pub fn show_header(&self, keep_originals: bool) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║                 {}                         ║", style("mediapress media converter").bold());
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();

        if !keep_originals {
            println!("{}", style("⚠️  Deletion mode is enabled!").red().bold());
            println!("{}", style("Originals are removed after each verified conversion").red());
            println!("{}", style("To keep them: --keep-originals").yellow());
        } else {
            println!("{}", style("🔒 Safe mode: original files will be preserved").green());
        }
        println!();
    }
}

/// Render a text progress bar, e.g. `██████░░░░` for 60% at width 10.
pub fn progress_bar(percent: f64, width: usize) -> String {
    let clamped = percent.clamp(0.0, 100.0);
    let filled = (clamped / 100.0 * width as f64) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}
