//! Normalized parameter mapping and PCM format caching

use crate::error::{BackendError, Result};
use crate::util::{range_convert, range_convert_midpoint};

/// A backend's native range for one parameter
///
/// Normalized `0.0`, `0.5` and `1.0` map onto `min`, `default` and `max`,
/// each half linearly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeRange {
    pub min: f32,
    pub default: f32,
    pub max: f32,
}

impl NativeRange {
    pub const fn new(min: f32, default: f32, max: f32) -> Self {
        Self { min, default, max }
    }

    /// Whether `default` lies strictly between `min` and `max`
    ///
    /// Many engines report their default volume as the maximum; those
    /// ranges are mapped linearly instead of around the default.
    fn has_midpoint(&self) -> bool {
        (self.default - self.min) * (self.max - self.default) > 0.0
    }

    /// Convert a normalized value, rejecting anything outside `[0, 1]`
    pub fn to_native(&self, normalized: f32) -> Result<f32> {
        if !(0.0..=1.0).contains(&normalized) {
            return Err(BackendError::RangeOutOfBounds);
        }
        if self.has_midpoint() {
            Ok(range_convert_midpoint(
                normalized, 0.0, 0.5, 1.0, self.min, self.default, self.max,
            ))
        } else {
            Ok(range_convert(normalized, 0.0, 1.0, self.min, self.max))
        }
    }

    /// Convert a native value back, clamped to `[0, 1]`
    pub fn to_normalized(&self, native: f32) -> f32 {
        if self.min == self.max {
            return 0.5;
        }
        let normalized = if self.has_midpoint() {
            range_convert_midpoint(native, self.min, self.default, self.max, 0.0, 0.5, 1.0)
        } else {
            range_convert(native, self.min, self.max, 0.0, 1.0)
        };
        normalized.clamp(0.0, 1.0)
    }
}

/// PCM format produced by `speak_to_memory`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: usize,
    pub sample_rate: usize,
    pub bit_depth: usize,
}

/// Lazily probed [`AudioFormat`], invalidated whenever the voice changes
#[derive(Debug, Default)]
pub struct AudioFormatCache {
    format: Option<AudioFormat>,
}

impl AudioFormatCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached format or run `probe` to learn it
    pub fn get_or_probe<F>(&mut self, probe: F) -> Result<AudioFormat>
    where
        F: FnOnce() -> Result<AudioFormat>,
    {
        if let Some(format) = self.format {
            return Ok(format);
        }
        let format = probe()?;
        self.format = Some(format);
        Ok(format)
    }

    pub fn store(&mut self, format: AudioFormat) {
        self.format = Some(format);
    }

    pub fn invalidate(&mut self) {
        self.format = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_native_anchors() {
        let r = NativeRange::new(-10.0, 0.0, 10.0);
        assert_eq!(r.to_native(0.0), Ok(-10.0));
        assert_eq!(r.to_native(0.5), Ok(0.0));
        assert_eq!(r.to_native(1.0), Ok(10.0));
    }

    #[test]
    fn test_to_native_rejects_out_of_range() {
        let r = NativeRange::new(0.0, 50.0, 100.0);
        assert_eq!(r.to_native(-0.01), Err(BackendError::RangeOutOfBounds));
        assert_eq!(r.to_native(1.01), Err(BackendError::RangeOutOfBounds));
        assert_eq!(r.to_native(f32::NAN), Err(BackendError::RangeOutOfBounds));
    }

    #[test]
    fn test_round_trip() {
        let r = NativeRange::new(80.0, 175.0, 450.0);
        for i in 0..=20 {
            let x = i as f32 / 20.0;
            let back = r.to_normalized(r.to_native(x).unwrap());
            assert!((back - x).abs() < 1e-4);
        }
    }

    #[test]
    fn test_default_at_edge_maps_linearly() {
        let r = NativeRange::new(0.0, 1.0, 1.0);
        assert_eq!(r.to_native(0.5), Ok(0.5));
        assert_eq!(r.to_normalized(1.0), 1.0);
        assert_eq!(r.to_normalized(0.25), 0.25);
    }

    #[test]
    fn test_degenerate_range() {
        let r = NativeRange::new(1.0, 1.0, 1.0);
        assert_eq!(r.to_native(0.3), Ok(1.0));
        assert_eq!(r.to_normalized(1.0), 0.5);
    }

    #[test]
    fn test_to_normalized_clamps() {
        let r = NativeRange::new(0.0, 50.0, 100.0);
        assert_eq!(r.to_normalized(150.0), 1.0);
        assert_eq!(r.to_normalized(-5.0), 0.0);
    }

    #[test]
    fn test_format_cache_probes_once() {
        let mut cache = AudioFormatCache::new();
        let fmt = AudioFormat { channels: 1, sample_rate: 22_050, bit_depth: 16 };
        let mut probes = 0;
        for _ in 0..3 {
            let got = cache
                .get_or_probe(|| {
                    probes += 1;
                    Ok(fmt)
                })
                .unwrap();
            assert_eq!(got, fmt);
        }
        assert_eq!(probes, 1);

        cache.invalidate();
        assert_eq!(
            cache.get_or_probe(|| Err(BackendError::SpeakFailure)),
            Err(BackendError::SpeakFailure)
        );
    }
}
