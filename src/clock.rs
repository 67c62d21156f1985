use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Monotonic millisecond tick source with blocking delays.
///
/// Ticks wrap at `u32::MAX`; compare them with `wrapping_sub`.
pub trait Clock {
    /// Milliseconds since an arbitrary origin
    fn now_ms(&self) -> u32;
    /// Block the calling thread for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
    /// Current wall-clock time, used to stamp log lines
    fn wall_time(&self) -> DateTime<Utc>;
}

/// Elapsed milliseconds between two wrapping ticks
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// [`Clock`] backed by the host's monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start a clock whose tick origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn ticks_wrap() {
        use super::*;
        assert_eq!(elapsed_ms(10, u32::MAX - 9), 20);
        assert_eq!(elapsed_ms(5000, 1000), 4000);
        let mut clk = SystemClock::new();
        let t0 = clk.now_ms();
        clk.delay_ms(2);
        assert!(elapsed_ms(clk.now_ms(), t0) >= 2);
    }
}
