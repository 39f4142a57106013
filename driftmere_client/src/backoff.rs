// Exponential reconnect backoff.
//
// Delay grows by a fixed multiplier per consecutive failure and is capped;
// a successful connection resets the sequence. The transport retries
// indefinitely — giving up is the application's decision, made by closing
// the session.

use std::time::Duration;

#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            base,
            multiplier,
            cap,
            attempt: 0,
        }
    }

    /// Delay before the next attempt: `min(base × multiplier^n, cap)` where
    /// `n` counts completed calls since the last reset.
    pub fn next_delay(&mut self) -> Duration {
        let n = self.attempt;
        self.attempt = self.attempt.saturating_add(1);
        let factor = self.multiplier.powi(n.min(32) as i32);
        let secs = self.base.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.cap.as_secs_f64() {
            return self.cap;
        }
        Duration::from_secs_f64(secs)
    }

    /// A connection succeeded; the next failure starts from the base again.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_geometrically_to_the_cap() {
        let mut b = Backoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(3));
        assert_eq!(b.next_delay(), Duration::from_millis(100));
        assert_eq!(b.next_delay(), Duration::from_millis(200));
        assert_eq!(b.next_delay(), Duration::from_millis(400));
        assert_eq!(b.next_delay(), Duration::from_millis(800));
        assert_eq!(b.next_delay(), Duration::from_millis(1600));
        // Capped from here on.
        assert_eq!(b.next_delay(), Duration::from_secs(3));
        assert_eq!(b.next_delay(), Duration::from_secs(3));
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut b = Backoff::new(Duration::from_millis(50), 2.0, Duration::from_secs(10));
        b.next_delay();
        b.next_delay();
        assert_eq!(b.attempt(), 2);
        b.reset();
        assert_eq!(b.attempt(), 0);
        assert_eq!(b.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let mut b = Backoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(5));
        for _ in 0..1000 {
            let d = b.next_delay();
            assert!(d <= Duration::from_secs(5));
        }
    }
}
