//! Server clock synchronization.
//!
//! [`ClockSync`] keeps a smoothed estimate of `server_time - local_time` in
//! milliseconds. Each sample starts a smoothing run that walks the offset
//! towards the new target in equal steps and then snaps onto it exactly, so
//! consumers never see a jump larger than one step. The manager drives the
//! runs by calling [`ClockSync::tick`] every [`ClockSync::tick_interval`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default number of sub-ticks per smoothing run.
pub const DEFAULT_SMOOTHING_STEPS: u32 = 50;

/// Default duration of a smoothing run.
pub const DEFAULT_SMOOTHING_WINDOW: Duration = Duration::from_secs(1);

/// Local wall-clock time in milliseconds since the Unix epoch.
pub fn local_time_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy)]
struct SmoothingRun {
    target: f64,
    step: f64,
    remaining: u32,
}

/// Smoothed estimate of the offset between the server clock and ours.
#[derive(Debug, Clone)]
pub struct ClockSync {
    offset: f64,
    steps: u32,
    window: Duration,
    run: Option<SmoothingRun>,
    round_trip: Option<f64>,
}

impl ClockSync {
    /// `steps` is clamped to at least 1.
    pub fn new(steps: u32, window: Duration) -> Self {
        Self {
            offset: 0.0,
            steps: steps.max(1),
            window,
            run: None,
            round_trip: None,
        }
    }

    /// Current offset estimate in milliseconds.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Server time in milliseconds, as estimated for local time `now`.
    pub fn server_time_at(&self, now: f64) -> f64 {
        now + self.offset
    }

    /// Last measured heartbeat round-trip time in milliseconds.
    pub fn round_trip(&self) -> Option<f64> {
        self.round_trip
    }

    /// Whether a smoothing run is in flight.
    pub fn is_smoothing(&self) -> bool {
        self.run.is_some()
    }

    /// Spacing between sub-ticks of a smoothing run.
    pub fn tick_interval(&self) -> Duration {
        self.window / self.steps
    }

    /// Record a server time sample taken at local time `now`.
    ///
    /// Cancels any run in progress and starts a new one from the current
    /// (possibly partially adjusted) offset.
    pub fn sample(&mut self, server_time: f64, echoed_time: Option<f64>, now: f64) {
        if let Some(sent) = echoed_time {
            let rtt = now - sent;
            if rtt.is_finite() && rtt >= 0.0 {
                self.round_trip = Some(rtt);
            }
        }

        let target = server_time - now;
        if !target.is_finite() {
            tracing::warn!(server_time, now, "ignoring non-finite clock sample");
            return;
        }

        let delta = target - self.offset;
        self.run = Some(SmoothingRun {
            target,
            step: delta / f64::from(self.steps),
            remaining: self.steps,
        });
        tracing::debug!(target, delta, "clock smoothing started");
    }

    /// Advance the active run by one sub-tick. Returns `true` while the run
    /// needs more ticks.
    pub fn tick(&mut self) -> bool {
        let Some(run) = self.run.as_mut() else {
            return false;
        };

        run.remaining = run.remaining.saturating_sub(1);
        if run.remaining == 0 {
            self.offset = run.target;
            self.run = None;
            false
        } else {
            self.offset += run.step;
            true
        }
    }

    /// Drop the active run, keeping the current offset.
    pub fn cancel(&mut self) {
        self.run = None;
    }

    /// Forget everything. Used when a new server session starts.
    pub fn reset(&mut self) {
        self.offset = 0.0;
        self.run = None;
        self.round_trip = None;
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_STEPS, DEFAULT_SMOOTHING_WINDOW)
    }
}
