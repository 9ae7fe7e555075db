//! Maps a pointer position on a circular dial to a discrete unit value.

/// Returns the dial position under the pointer offset `(dx, dy)` from the dial
/// centre, in `[0, unit_count)`.
///
/// Offsets use screen coordinates (`dy` grows downward). The angle is measured
/// clockwise from 12 o'clock, so straight up is 0, straight right is a quarter
/// turn. Each unit covers `360 / unit_count` degrees starting at its mark.
/// The centre itself and non-finite offsets map to 0.
pub fn dial_value(dx: f64, dy: f64, unit_count: u32) -> u32 {
    if unit_count == 0 || !dx.is_finite() || !dy.is_finite() {
        return 0;
    }
    let degrees = clockwise_angle(dx, dy);
    let step = 360.0 / f64::from(unit_count);
    let value = (degrees / step).floor();
    if value <= 0.0 {
        0
    } else if value >= f64::from(unit_count) {
        unit_count - 1
    } else {
        value as u32
    }
}

/// Clockwise angle from 12 o'clock in `[0, 360)` degrees.
pub fn clockwise_angle(dx: f64, dy: f64) -> f64 {
    // `+ 0.0` folds negative zero so both sides of the vertical axis agree.
    let radians = (dx + 0.0).atan2(-dy + 0.0);
    let degrees = radians.to_degrees();
    let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}

#[cfg(test)]
#[path = "tests/dial_tests.rs"]
mod tests;
