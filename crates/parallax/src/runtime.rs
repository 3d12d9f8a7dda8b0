use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Time value handed to the uniform block for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Seconds since the session started. Never reset.
    pub seconds: f32,
    /// Monotonic tick counter.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where frame time comes from.
pub trait TimeSource: Send {
    /// Produces the sample for the next tick.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the monotonic system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.origin.elapsed().as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Externally driven clock. Clones share the same time value.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    seconds: Arc<AtomicU32>,
    frame: u64,
}

impl ManualTimeSource {
    pub fn new(seconds: f32) -> Self {
        let source = Self::default();
        source.set(seconds);
        source
    }

    pub fn set(&self, seconds: f32) {
        self.seconds.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f32) {
        self.set(self.now() + seconds);
    }

    pub fn now(&self) -> f32 {
        f32::from_bits(self.seconds.load(Ordering::Relaxed))
    }
}

impl TimeSource for ManualTimeSource {
    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.now(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_time_is_monotonic() {
        let mut source = SystemTimeSource::new();
        let first = source.sample();
        let second = source.sample();
        assert!(second.seconds >= first.seconds);
        assert_eq!(second.frame_index, first.frame_index + 1);
    }

    #[test]
    fn manual_time_is_shared_between_clones() {
        let handle = ManualTimeSource::new(1.0);
        let mut source = handle.clone();
        handle.advance(0.5);
        assert_eq!(source.sample().seconds, 1.5);
        assert_eq!(source.sample().frame_index, 1);
    }
}
