//! ## acmsim-core::time
//! **Simulated time**
//!
//! Dates are plain `f64` seconds since the start of the current run. The
//! kernel only ever compares and adds them, so no wrapper type is needed.

use std::time::Duration;

/// A simulated date or duration, in seconds.
pub type SimTime = f64;

/// Converts a wall-clock style duration into simulated seconds.
#[inline]
pub fn from_duration(duration: Duration) -> SimTime {
    duration.as_secs_f64()
}

/// Converts simulated seconds into a `Duration`, clamping negatives to zero.
#[inline]
pub fn to_duration(time: SimTime) -> Duration {
    Duration::from_secs_f64(time.max(0.0))
}

/// Time needed to push `bytes` through a channel of `bits_per_second`.
#[inline]
pub fn transmission_time(bytes: usize, bits_per_second: f64) -> SimTime {
    (bytes as f64 * 8.0) / bits_per_second
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_conversions() {
        assert_eq!(from_duration(Duration::from_millis(250)), 0.25);
        assert_eq!(to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(to_duration(-3.0), Duration::ZERO);
    }

    #[test]
    fn transmission_time_of_a_packet() {
        // 1500 bytes on a 1.2 Mbit/s channel.
        let t = transmission_time(1500, 1_200_000.0);
        assert!((t - 0.01).abs() < 1e-12);
    }
}
