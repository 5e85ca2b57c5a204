//! Throttled progress reporting.
//!
//! The original's `ShowProgressBar` redrew a console progress bar, but only
//! when at least 200ms had passed since the last redraw, the percentage
//! moved by at least 1%, or (for unknown-size downloads) the byte count
//! changed at all. This reimplements that throttle as a small sink callers
//! can feed every chunk without flooding a log file or terminal.

use std::sync::Mutex;
use std::time::{Duration, Instant};

const MIN_INTERVAL: Duration = Duration::from_millis(200);
const MIN_PERCENT_DELTA: f64 = 1.0;

struct State {
    last_emit: Instant,
    last_percent: f64,
    last_bytes: u64,
    first: bool,
}

/// A throttled sink for `(downloaded, total)` progress updates.
///
/// `total == 0` means the total size is unknown; in that case every update
/// with a changed byte count is emitted (there's no percentage to compare).
pub struct Progress {
    state: Mutex<State>,
    label: String,
}

/// One update worth emitting to the user/log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub downloaded: u64,
    pub total: u64,
    pub percent: Option<f64>,
}

impl Tick {
    /// Human-readable "downloaded / total" for log lines, matching the
    /// original's `FormatBytes` helper used in its progress bar.
    pub fn format_bytes(&self) -> String {
        let downloaded = humansize::format_size(self.downloaded, humansize::BINARY);
        if self.total > 0 {
            format!("{downloaded} / {}", humansize::format_size(self.total, humansize::BINARY))
        } else {
            downloaded
        }
    }
}

impl Progress {
    pub fn new(label: impl Into<String>) -> Self {
        Progress {
            state: Mutex::new(State {
                last_emit: Instant::now(),
                last_percent: -1.0,
                last_bytes: u64::MAX,
                first: true,
            }),
            label: label.into(),
        }
    }

    /// Feed a progress update. Returns `Some(tick)` when the update clears
    /// the throttle and should actually be emitted, `None` otherwise.
    pub fn update(&self, downloaded: u64, total: u64) -> Option<Tick> {
        let mut state = self.state.lock().expect("progress mutex poisoned");
        let now = Instant::now();

        let percent = if total > 0 {
            Some((downloaded as f64 / total as f64) * 100.0)
        } else {
            None
        };

        let should_emit = state.first
            || now.duration_since(state.last_emit) >= MIN_INTERVAL
            || match percent {
                Some(pct) => (pct - state.last_percent).abs() >= MIN_PERCENT_DELTA,
                None => downloaded != state.last_bytes,
            };

        if !should_emit {
            return None;
        }

        state.first = false;
        state.last_emit = now;
        state.last_percent = percent.unwrap_or(state.last_percent);
        state.last_bytes = downloaded;

        Some(Tick {
            downloaded,
            total,
            percent,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_always_emits() {
        let progress = Progress::new("file.txt");
        assert!(progress.update(0, 100).is_some());
    }

    #[test]
    fn small_percent_change_is_suppressed() {
        let progress = Progress::new("file.txt");
        progress.update(0, 100);
        assert!(progress.update(1, 100).is_none());
    }

    #[test]
    fn large_percent_change_emits() {
        let progress = Progress::new("file.txt");
        progress.update(0, 100);
        assert!(progress.update(50, 100).is_some());
    }

    #[test]
    fn unknown_total_emits_on_any_byte_change() {
        let progress = Progress::new("stream");
        progress.update(0, 0);
        assert!(progress.update(128, 0).is_some());
        assert!(progress.update(128, 0).is_none());
    }
}
