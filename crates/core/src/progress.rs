//! Progress arithmetic, marker parsing, and event throttling.
//!
//! Pure helpers shared by the three worker variants. Marker parsing
//! understands the two shapes ffmpeg emits: `out_time_ms=` lines from
//! `-progress pipe:` output and `time=HH:MM:SS.cc` from the periodic
//! stderr stats line.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

/// Clamp an arbitrary percentage into the job-progress range `[0, 100]`.
pub fn clamp_percent(value: f64) -> f32 {
    value.clamp(0.0, 100.0) as f32
}

/// Percentage of `done` over `total` for continuous quantities (seconds,
/// frames). A non-positive total yields 0 — the caller has no usable hint.
pub fn ratio_percent(done: f64, total: f64) -> f32 {
    if total <= 0.0 {
        return 0.0;
    }
    clamp_percent(done / total * 100.0)
}

/// Percentage of completed items over a known item count.
/// Zero total counts as fully complete (nothing to do).
pub fn completion_percent(done: usize, total: usize) -> f32 {
    if total == 0 {
        return 100.0;
    }
    clamp_percent(done as f64 / total as f64 * 100.0)
}

/// Parse a recognizable progress marker from one diagnostic line,
/// returning processed input time in seconds.
///
/// Returns `None` for lines without a marker; callers treat those as
/// opaque diagnostics.
pub fn parse_time_marker(line: &str) -> Option<f64> {
    static OUT_TIME_RE: OnceLock<Regex> = OnceLock::new();
    static TIME_RE: OnceLock<Regex> = OnceLock::new();

    let out_time = OUT_TIME_RE
        .get_or_init(|| Regex::new(r"out_time_ms=(\d+)").expect("valid regex"));
    if let Some(caps) = out_time.captures(line) {
        let value: f64 = caps[1].parse().ok()?;
        // Despite the name, ffmpeg's out_time_ms is in microseconds.
        return Some(value / 1_000_000.0);
    }

    let time = TIME_RE.get_or_init(|| {
        Regex::new(r"time=(\d+):(\d{2}):(\d{2})(?:\.(\d+))?").expect("valid regex")
    });
    let caps = time.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let fraction = caps
        .get(4)
        .and_then(|m| format!("0.{}", m.as_str()).parse::<f64>().ok())
        .unwrap_or(0.0);
    Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
}

/// Rate limiter for progress publication.
///
/// Workers call [`allow`](Self::allow) before publishing; at most one
/// event per `min_interval` passes. The terminal event is never routed
/// through the throttle.
#[derive(Debug)]
pub struct ProgressThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Returns true (and arms the interval) if enough time has passed
    /// since the last allowed event.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
