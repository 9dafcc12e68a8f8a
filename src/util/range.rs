//! Linear value remapping
//!
//! Backends use these to translate normalized `[0, 1]` parameters into their
//! native units around a native default.

/// Map `value` from `[old_min, old_max]` onto `[new_min, new_max]`
///
/// Undefined when `old_min == old_max`; callers must not pass a degenerate
/// source range.
pub fn range_convert(value: f32, old_min: f32, old_max: f32, new_min: f32, new_max: f32) -> f32 {
    new_min + (value - old_min) / (old_max - old_min) * (new_max - new_min)
}

/// Piecewise-linear remap that pins the midpoint
///
/// Values at or below `old_mid` use the lower segment, everything else the
/// upper one, so `old_min`, `old_mid` and `old_max` land exactly on
/// `new_min`, `new_mid` and `new_max`.
pub fn range_convert_midpoint(
    value: f32,
    old_min: f32,
    old_mid: f32,
    old_max: f32,
    new_min: f32,
    new_mid: f32,
    new_max: f32,
) -> f32 {
    if value <= old_mid {
        range_convert(value, old_min, old_mid, new_min, new_mid)
    } else {
        range_convert(value, old_mid, old_max, new_mid, new_max)
    }
}
