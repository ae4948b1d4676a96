//! Device clocks and the per-cycle translation between device microseconds
//! and graph frames.

use std::{fmt, sync::Arc, time::Instant};

/// Source of a free-running microsecond counter.
pub trait ClockSource: Send + Sync {
    fn now_micros(&self) -> u64;
}

/// Counts microseconds from the moment the device was opened.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl ClockSource for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Shared handle to one open device's clock.
#[derive(Clone)]
pub struct DeviceClock(Arc<dyn ClockSource>);

impl DeviceClock {
    pub fn new(source: impl ClockSource + 'static) -> Self {
        Self(Arc::new(source))
    }

    pub fn monotonic() -> Self {
        Self::new(MonotonicClock::start())
    }

    pub fn now_micros(&self) -> u64 {
        self.0.now_micros()
    }
}

impl fmt::Debug for DeviceClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceClock").field(&self.now_micros()).finish()
    }
}

/// The device-time span that one process cycle's frames cover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleWindow {
    /// Device time of frame 0.
    pub origin_us: f64,
    /// Duration of one frame in microseconds.
    pub frame_us: f64,
    pub nframes: u32,
}

impl CycleWindow {
    pub fn new(origin_us: f64, frame_us: f64, nframes: u32) -> Self {
        Self {
            origin_us,
            frame_us,
            nframes,
        }
    }

    /// Window for the period that ended at `now_us`. Messages received
    /// during the previous period land in this cycle, one period late.
    pub fn ending_at(now_us: u64, nframes: u32, frame_us: f64) -> Self {
        let span = nframes as f64 * frame_us;
        Self::new(now_us as f64 - span, frame_us, nframes)
    }

    /// Nearest frame offset for a device timestamp, clamped into
    /// `[0, nframes - 1]`.
    pub fn frame_for(&self, timestamp_us: u64) -> u32 {
        let last = self.nframes.saturating_sub(1);
        if self.frame_us <= 0.0 {
            return 0;
        }
        let offset = ((timestamp_us as f64 - self.origin_us) / self.frame_us).round();
        if offset <= 0.0 {
            0
        } else if offset >= last as f64 {
            last
        } else {
            offset as u32
        }
    }
}

/// Device timestamp for an event at `frame` of the current cycle, given the
/// device clock position sampled at cycle start.
pub fn device_time_for_frame(position_us: u64, frame: u32, frame_us: f64) -> u64 {
    position_us + (frame as f64 * frame_us).round() as u64
}
