use colored::*;
use filewarden_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// indicatif spinners for the scan stage and bars for hashing and copying.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = guard.replace(pb) {
            old.finish_and_clear();
        }
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn bar(total: usize, label: &str) -> ProgressBar {
        let pb = ProgressBar::new(total as u64);
        let template = format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} files ({{eta}} remaining)",
            label
        );
        if let Ok(style) = ProgressStyle::with_template(&template) {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

fn done(message: String) {
    eprintln!("  {} {}", "✓".green(), message);
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, folders: usize) {
        self.set_bar(Self::spinner(format!("Scanning {} folders...", folders)));
    }

    fn on_scan_complete(&self, new_files: usize, removed_files: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Folders scanned: {} new, {} gone in {:.2}s",
            new_files, removed_files, duration_secs
        ));
    }

    fn on_hash_start(&self, total_files: usize) {
        self.set_bar(Self::spinner(format!("Hashing {} tracked files...", total_files)));
    }

    fn on_hash_complete(&self, drifted: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!("Hashing complete: {} drifted in {:.2}s", drifted, duration_secs));
    }

    fn on_persist_complete(&self, rows: usize) {
        if rows > 0 {
            done(format!("Registry updated: {} rows", rows));
        }
    }

    fn on_copy_start(&self, destination: &str, total_files: usize) {
        eprintln!("  Copying to {}", destination.cyan());
        self.set_bar(Self::bar(total_files, "Copying"));
    }

    fn on_copy_progress(&self, copied: usize, _total_files: usize) {
        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = guard.as_ref() {
            pb.set_position(copied as u64);
        }
    }

    fn on_copy_complete(&self, succeeded: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Copy complete: {} copied, {} failed in {:.2}s",
            succeeded, failed, duration_secs
        ));
    }
}
