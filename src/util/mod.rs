//! Pure numeric and audio helpers shared by every backend

pub mod range;
pub mod trim;

pub use range::{range_convert, range_convert_midpoint};
pub use trim::{compute_trim_bounds, trim_silence_rms_gate, TrimBounds, TrimParams};
