//! Device scoped timers.
use std::time::Instant;

/// High-resolution timer tied to the device that executes communication.
pub trait DeviceTimer {
    /// Record the start point.
    fn start(&mut self);

    /// Record the stop point.
    fn stop(&mut self);

    /// Milliseconds between the recorded start and stop points. Returns 0.0
    /// if either point is missing.
    fn elapsed_ms(&self) -> f64;
}

/// Monotonic host clock timer, used by transports whose "device" is the CPU.
#[derive(Debug, Default)]
pub struct HostTimer {
    start: Option<Instant>,
    stop: Option<Instant>,
}

impl HostTimer {
    pub fn new() -> HostTimer {
        HostTimer::default()
    }
}

impl DeviceTimer for HostTimer {
    fn start(&mut self) {
        self.start = Some(Instant::now());
        self.stop = None;
    }

    fn stop(&mut self) {
        self.stop = Some(Instant::now());
    }

    fn elapsed_ms(&self) -> f64 {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => stop.duration_since(start).as_secs_f64() * 1.0e3,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn host_timer_measures_sleep() {
        let mut timer = HostTimer::new();
        assert_eq!(timer.elapsed_ms(), 0.0);
        timer.start();
        std::thread::sleep(Duration::from_millis(5));
        timer.stop();
        assert!(timer.elapsed_ms() >= 5.0);
    }

    #[test]
    fn restart_clears_stop_point() {
        let mut timer = HostTimer::new();
        timer.start();
        timer.stop();
        timer.start();
        assert_eq!(timer.elapsed_ms(), 0.0);
    }
}
