//! Lightweight profiling timers.
//!
//! [`Timer`] accumulates the time spent in a per-frame pipeline stage, [`FpsCounter`] logs
//! throughput (and average stage times) once per second.

use std::{
    cell::Cell,
    fmt,
    time::{Duration, Instant},
};

/// Accumulates the time taken by repeated invocations of an operation.
pub struct Timer {
    name: &'static str,
    total: Cell<Duration>,
    laps: Cell<u32>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            total: Cell::new(Duration::ZERO),
            laps: Cell::new(0),
        }
    }

    /// Invokes `f`, adding the time it took to the accumulated total.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.total.set(self.total.get() + start.elapsed());
        self.laps.set(self.laps.get() + 1);
        result
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Average time per recorded lap, or zero when nothing was recorded yet.
    pub fn average(&self) -> Duration {
        match self.laps.get() {
            0 => Duration::ZERO,
            laps => self.total.get() / laps,
        }
    }

    pub fn reset(&self) {
        self.total.set(Duration::ZERO);
        self.laps.set(0);
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2}ms",
            self.name,
            self.average().as_secs_f64() * 1000.0,
        )
    }
}

/// Counts iterations of a loop and logs the rate once per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    window_start: Instant,
}

impl FpsCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            window_start: Instant::now(),
        }
    }

    /// Records one loop iteration.
    pub fn tick(&mut self) {
        self.tick_with([]);
    }

    /// Records one loop iteration, logging the given stage timers alongside the rate.
    ///
    /// The timers are reset whenever a log line is emitted.
    pub fn tick_with<'a>(&mut self, timers: impl IntoIterator<Item = &'a Timer>) {
        self.frames += 1;

        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames as f64 / elapsed.as_secs_f64();
            let stages = timers
                .into_iter()
                .map(|timer| {
                    let text = timer.to_string();
                    timer.reset();
                    text
                })
                .collect::<Vec<_>>();
            if stages.is_empty() {
                log::debug!("{}: {:.1} FPS", self.name, fps);
            } else {
                log::debug!("{}: {:.1} FPS ({})", self.name, fps, stages.join(", "));
            }

            self.frames = 0;
            self.window_start = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_laps() {
        let timer = Timer::new("test");
        assert_eq!(timer.average(), Duration::ZERO);
        let value = timer.time(|| 42);
        assert_eq!(value, 42);
        timer.time(|| ());
        assert_eq!(timer.laps.get(), 2);
        timer.reset();
        assert_eq!(timer.average(), Duration::ZERO);
    }
}
