//! Progress reporting for the long-running pipeline stages.
//!
//! Rendering is intentionally minimal: the trait is the contract, and the
//! default implementation just rate-limits info-level log lines.

use std::time::Instant;

pub(crate) trait Progress {
    fn update(&mut self, message: &str, count: usize, total: usize);
}

/// Logs progress at most once a second, plus the first and final updates.
#[derive(Debug, Default)]
pub(crate) struct LogProgress {
    last: Option<Instant>,
}

impl LogProgress {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Progress for LogProgress {
    fn update(&mut self, message: &str, count: usize, total: usize) {
        let due = count == 0
            || count == total
            || self.last.map(|at| at.elapsed().as_secs() >= 1).unwrap_or(true);
        if !due {
            return;
        }
        self.last = Some(Instant::now());

        if count == total && total > 0 {
            log::info!("{}: done. ({}/{})", message, count, total);
        } else {
            let percent = if total > 0 { count * 100 / total } else { 0 };
            log::info!("{}: {:3}% ({}/{})", message, percent, count, total);
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct NullProgress;

impl Progress for NullProgress {
    fn update(&mut self, _message: &str, _count: usize, _total: usize) {}
}
