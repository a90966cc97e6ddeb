//! Sample clock — drift-free time advancement for a simulated backend.
//!
//! Counts whole frames at a fixed sample rate. A fractional frame remainder
//! accumulates so that advancing by seconds never drifts over long sessions.

/// A frame-counting clock, the time base of a simulated backend.
#[derive(Debug, Clone)]
pub struct SampleClock {
    sample_rate: u32,
    position_frames: u64,
    /// Fractional frame accumulator for drift-free advancement.
    frame_remainder: f64,
}

impl SampleClock {
    /// Create a clock at position zero.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            position_frames: 0,
            frame_remainder: 0.0,
        }
    }

    /// Current position in seconds.
    pub fn seconds(&self) -> f64 {
        (self.position_frames as f64 + self.frame_remainder) / self.sample_rate as f64
    }

    /// Advance by a duration in seconds, carrying the fractional frame.
    pub fn advance_by_seconds(&mut self, secs: f64) {
        let total = self.frame_remainder + secs * self.sample_rate as f64;
        let whole = total.floor();
        self.frame_remainder = total - whole;
        self.position_frames += whole as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(SampleClock::new(44100).seconds(), 0.0);
    }

    #[test]
    fn whole_frames_advance_exactly() {
        let mut c = SampleClock::new(48000);
        c.advance_by_seconds(0.5);
        c.advance_by_seconds(0.5);
        assert!((c.seconds() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fractional_advance_does_not_drift() {
        let mut c = SampleClock::new(44100);
        let step = 1.0 / 60.0;
        for _ in 0..36_000 {
            c.advance_by_seconds(step);
        }
        // Ten minutes of 60 Hz ticks.
        assert!((c.seconds() - 600.0).abs() < 1e-6, "drift: {}", c.seconds());
    }
}
