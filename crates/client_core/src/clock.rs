//! Decomposes elapsed time into the clock face fields.

use shared::domain::ClockReading;

pub fn decompose(elapsed_seconds: u64) -> ClockReading {
    ClockReading {
        hours: elapsed_seconds / 3600,
        minutes: (elapsed_seconds % 3600) / 60,
        seconds: elapsed_seconds % 60,
    }
}

pub fn decompose_millis(elapsed_millis: u64) -> ClockReading {
    decompose(elapsed_millis / 1000)
}

/// Fractional seconds are truncated; negative and non-finite input reads as zero.
pub fn decompose_seconds_f64(elapsed_seconds: f64) -> ClockReading {
    if !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 {
        return ClockReading::default();
    }
    decompose(elapsed_seconds.trunc() as u64)
}
