//! Session clocks.
//!
//! Timestamps inside a session are offsets from a monotonic start instant.
//! The wall-clock start is kept only for logs and filenames.

use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};

/// Monotonic stopwatch started when a session (or a producer) starts.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl RecordingClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Wall-clock start, formatted like [`iso_timestamp`].
    pub fn epoch_wall(&self) -> String {
        format_iso(self.started_at)
    }
}

/// Current UTC time as ISO 8601 with millisecond precision and a `Z`
/// suffix, e.g. `2024-05-01T09:30:12.345Z`.
pub fn iso_timestamp() -> String {
    format_iso(Utc::now())
}

fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Lets through at most one tick per period of a target rate.
///
/// Used to publish rendered frames at the capture rate while the render
/// loop itself runs faster.
#[derive(Debug)]
pub struct RateController {
    period_ns: u64,
    next_due_ns: u64,
}

impl RateController {
    /// A zero rate is treated as 1 Hz.
    pub fn new(rate_hz: u32) -> Self {
        Self {
            period_ns: 1_000_000_000 / u64::from(rate_hz.max(1)),
            next_due_ns: 0,
        }
    }

    /// Whether a tick at `now_ns` is due. Ticks up to an eighth of a period
    /// early still count; after a stall the schedule restarts from `now_ns`
    /// instead of bursting to catch up.
    pub fn should_tick(&mut self, now_ns: u64) -> bool {
        if now_ns.saturating_add(self.period_ns / 8) < self.next_due_ns {
            return false;
        }
        let base = if now_ns > self.next_due_ns.saturating_add(self.period_ns) {
            now_ns
        } else {
            self.next_due_ns
        };
        self.next_due_ns = base.saturating_add(self.period_ns);
        true
    }

    pub fn interval_ns(&self) -> u64 {
        self.period_ns
    }
}
