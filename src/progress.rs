//! Console completion counter shared by concurrent workers.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct Progress {
    label: &'static str,
    total: usize,
    done: AtomicUsize,
}

impl Progress {
    pub fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            total,
            done: AtomicUsize::new(0),
        }
    }

    /// Record one finished item and redraw the progress line.
    /// Returns the completed count after this item.
    pub fn tick(&self) -> usize {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let line = format_line(self.label, done, self.total);

        let mut stdout = std::io::stdout().lock();
        let end = if done >= self.total { "\n" } else { "\r" };
        let _ = write!(stdout, "{line}{end}");
        let _ = stdout.flush();
        done
    }
}

fn percentage(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done as f64 / total as f64 * 100.0
}

fn format_line(label: &str, done: usize, total: usize) -> String {
    format!(
        "{label}: {done}/{total} completed ({:.2}%)",
        percentage(done, total)
    )
}
