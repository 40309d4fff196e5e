/// Rounds to one decimal place, ties to even on the scaled value.
///
/// ```rust
/// # use threshold_checks::round_tenths;
/// assert_eq!(round_tenths(42.345), 42.3);
/// assert_eq!(round_tenths(42.25), 42.2);
/// ```
pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Formats a value for messages and perf data: rounded to tenths, whole values without
/// a fractional part.
pub fn display_number(value: f64) -> String {
    let rounded = round_tenths(value);
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.1}", rounded)
    }
}
