use core::fmt::{self, Write};
use heapless::String;

#[cfg(all(not(test), not(feature = "std")))]
use embassy_time::Instant;

#[cfg(all(not(test), not(feature = "std")))]
pub(crate) fn now_us() -> u64 {
    Instant::now().as_micros()
}

#[cfg(any(test, feature = "std"))]
pub(crate) fn now_us() -> u64 {
    extern crate std;
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Splits a step into consecutive phases, measuring each from the previous checkpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stopwatch {
    start_us: u64,
    last_checkpoint_us: u64,
}

impl Stopwatch {
    pub(crate) fn start() -> Self {
        let now = now_us();
        Self {
            start_us: now,
            last_checkpoint_us: now,
        }
    }

    /// Microseconds since the previous checkpoint.
    pub(crate) fn lap(&mut self) -> u64 {
        let now = now_us();
        let elapsed = now.saturating_sub(self.last_checkpoint_us);
        self.last_checkpoint_us = now;
        elapsed
    }

    pub(crate) fn total(&self) -> u64 {
        now_us().saturating_sub(self.start_us)
    }
}

/// Wall-clock cost of the most recent step, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepTimings {
    /// Gravity and body integration.
    pub integrate_us: u64,
    /// Pair scan and narrow phase.
    pub broad_narrow_us: u64,
    /// Warm starting, velocity iterations and positional correction.
    pub solve_us: u64,
    pub total_us: u64,
    /// Manifolds built during the step.
    pub manifolds: usize,
}

impl StepTimings {
    /// One-line summary, e.g. for an on-screen overlay.
    pub fn report(&self) -> String<192> {
        let mut text = String::new();
        let _ = write!(text, "{}", self);
        text
    }
}

impl fmt::Display for StepTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "integrate: {} broad/narrow: {} solve: {} total: {} manifolds: {}",
            self.integrate_us, self.broad_narrow_us, self.solve_us, self.total_us, self.manifolds
        )
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    #[test]
    fn test_stopwatch_laps() {
        let mut watch = Stopwatch::start();
        std::thread::sleep(std::time::Duration::from_micros(200));
        let first = watch.lap();
        assert!(first >= 200);

        watch.lap();
        assert!(watch.total() >= first);
    }

    #[test]
    fn test_report_contains_phases() {
        let timings = StepTimings {
            integrate_us: 3,
            broad_narrow_us: 5,
            solve_us: 7,
            total_us: 15,
            manifolds: 2,
        };
        let text = timings.report();
        assert!(text.contains("integrate: 3"));
        assert!(text.contains("solve: 7"));
        assert!(text.contains("total: 15"));
        assert!(text.contains("manifolds: 2"));
    }

    #[test]
    fn test_default_is_zero() {
        assert_eq!(StepTimings::default().total_us, 0);
    }
}
