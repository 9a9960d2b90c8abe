use std::time::{Duration, Instant};
use tracing::info;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Format a large integer with thousands separators.
pub fn fmt_number(n: i64) -> String {
    let s = n.unsigned_abs().to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}

/// Linear ETA: time per item so far × items left.
pub fn estimate_remaining(done: usize, total: u64, elapsed: Duration) -> Option<Duration> {
    if done == 0 || total == 0 {
        return None;
    }
    let left = total.saturating_sub(done as u64);
    Some(elapsed.div_f64(done as f64).mul_f64(left as f64))
}

/// "Progress: 60/3648 (1.6%) - ETA: 4.2 minutes"; "Progress: Unknown" without a total.
pub fn format_progress(done: usize, total: u64, elapsed: Duration) -> String {
    if total == 0 {
        return "Progress: Unknown".to_string();
    }
    let pct = done as f64 / total as f64 * 100.0;
    match estimate_remaining(done, total, elapsed) {
        Some(eta) => format!(
            "Progress: {}/{} ({:.1}%) - ETA: {:.1} minutes",
            done,
            total,
            pct,
            eta.as_secs_f64() / 60.0
        ),
        None => format!("Progress: {}/{} ({:.1}%)", done, total, pct),
    }
}
