//! Wall-time measurement with a small rolling average, used by every pipeline stage to report
//! per-stage timings.

use std::{
    fmt,
    time::{Duration, Instant},
};

/// Number of samples kept for the rolling average.
const WINDOW: usize = 30;

/// A named timer that keeps a rolling average of the last [`WINDOW`] measurements.
pub struct Timer {
    name: &'static str,
    samples: [Duration; WINDOW],
    count: usize,
    next: usize,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            samples: [Duration::ZERO; WINDOW],
            count: 0,
            next: 0,
        }
    }

    /// Returns the name this timer was created with.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Times the execution of `f`, folding the measured duration into the rolling average.
    pub fn time<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(start.elapsed());
        result
    }

    /// Manually records a duration that was measured elsewhere.
    pub fn record(&mut self, duration: Duration) {
        self.samples[self.next] = duration;
        self.next = (self.next + 1) % WINDOW;
        self.count = (self.count + 1).min(WINDOW);
    }

    /// Returns the rolling average duration, or `Duration::ZERO` if nothing was recorded yet.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.samples[..self.count].iter().sum::<Duration>() / self.count as u32
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("average", &self.average())
            .finish()
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2?}", self.name, self.average())
    }
}

/// Tracks and periodically logs a frames-per-second rate, along with an arbitrary set of
/// [`Timer`]s describing where the time within each frame went.
pub struct FpsCounter {
    label: &'static str,
    last_log: Instant,
    frames_since_log: u32,
}

impl FpsCounter {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            last_log: Instant::now(),
            frames_since_log: 0,
        }
    }

    /// Records one processed frame, logging the current rate (and the given timers) about once
    /// a second.
    pub fn tick_with<'a>(&mut self, timers: impl Iterator<Item = &'a Timer>) {
        self.frames_since_log += 1;
        let elapsed = self.last_log.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames_since_log as f64 / elapsed.as_secs_f64();
            let timer_report = timers.map(|t| t.to_string()).collect::<Vec<_>>().join(", ");
            log::debug!("{}: {:.1} FPS ({})", self.label, fps, timer_report);
            self.frames_since_log = 0;
            self.last_log = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_average() {
        let mut timer = Timer::new("test");
        assert_eq!(timer.average(), Duration::ZERO);

        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        assert_eq!(timer.average(), Duration::from_millis(15));
    }

    #[test]
    fn average_drops_old_samples_past_window() {
        let mut timer = Timer::new("test");
        for _ in 0..WINDOW {
            timer.record(Duration::from_millis(100));
        }
        timer.record(Duration::from_millis(0));
        // one sample overwritten: average should move away from 100ms
        assert!(timer.average() < Duration::from_millis(100));
    }
}
