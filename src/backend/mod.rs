//! The capability contract every speech backend implements
//!
//! A backend only has to provide a name. Every other operation has a default
//! body returning [`BackendError::NotImplemented`], so a screen reader that
//! can only speak and stop implements exactly those two methods.
//!
//! Normalized parameters (volume, rate, pitch) are always `[0, 1]` at this
//! layer; backends convert to native units with [`NativeRange`]. Voice
//! indices are `0..count_voices()` as of the last `refresh_voices()`.

pub mod params;
pub mod state;
pub mod voices;

pub use params::{AudioFormat, AudioFormatCache, NativeRange};
pub use state::{PlaybackState, SpeechState};
pub use voices::{Voice, VoiceList};

use crate::error::{BackendError, Result};
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, Mutex, MutexGuard};

/// Receives synthesized audio: `(samples, channels, sample_rate)`
///
/// Samples are interleaved `f32` in `[-1, 1]` and only borrowed for the
/// duration of the call.
pub type AudioSink<'a> = dyn FnMut(&[f32], usize, usize) + 'a;

/// A backend instance shared between the registry cache and its callers
///
/// The contract does not make backends thread-safe; the mutex only makes
/// shared ownership sound and serializes calls on one instance.
pub type SharedBackend = Arc<Mutex<dyn TextToSpeechBackend>>;

/// Lock a shared backend, treating a poisoned lock as an internal failure
pub fn lock_backend(backend: &SharedBackend) -> Result<MutexGuard<'_, dyn TextToSpeechBackend + 'static>> {
    backend
        .lock()
        .map_err(|_| BackendError::InternalBackendError)
}

/// Operations a backend advertises, so callers can probe before invoking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const SPEAK: Capabilities = Capabilities(1 << 0);
    pub const SPEAK_TO_MEMORY: Capabilities = Capabilities(1 << 1);
    pub const BRAILLE: Capabilities = Capabilities(1 << 2);
    pub const OUTPUT: Capabilities = Capabilities(1 << 3);
    pub const STOP: Capabilities = Capabilities(1 << 4);
    pub const PAUSE: Capabilities = Capabilities(1 << 5);
    pub const IS_SPEAKING: Capabilities = Capabilities(1 << 6);
    pub const VOLUME: Capabilities = Capabilities(1 << 7);
    pub const RATE: Capabilities = Capabilities(1 << 8);
    pub const PITCH: Capabilities = Capabilities(1 << 9);
    pub const VOICES: Capabilities = Capabilities(1 << 10);
    pub const AUDIO_FORMAT: Capabilities = Capabilities(1 << 11);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Capabilities(bits)
    }

    /// True when every flag in `other` is set
    pub fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Capabilities) {
        self.0 |= rhs.0;
    }
}

/// Text-to-speech backend contract
///
/// State model: a fresh instance is uninitialized; `initialize` moves it to
/// idle (`AlreadyInitialized` on repeat). `speak`/`output` start speaking,
/// `stop` returns to idle and succeeds when already idle, `pause` and
/// `resume` toggle between speaking and paused. [`SpeechState`] implements
/// these transitions for backends that track state themselves.
#[allow(unused_variables)]
pub trait TextToSpeechBackend: Send {
    /// Display name, also used for registry lookups
    fn name(&self) -> &str;

    /// Operations this backend implements
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Connect to the platform service
    fn initialize(&mut self) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    /// Begin speaking without blocking; poll [`is_speaking`](Self::is_speaking) for completion
    ///
    /// With `interrupt`, the current utterance is stopped first; having
    /// nothing to stop is not an error.
    fn speak(&mut self, text: &str, interrupt: bool) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    /// Synthesize `text` completely and hand the audio to `sink` exactly once
    fn speak_to_memory(&mut self, text: &str, sink: &mut AudioSink<'_>) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    /// Show `text` on a braille display
    fn braille(&mut self, text: &str) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    /// Speak and braille; stops at the first modality that fails
    fn output(&mut self, text: &str, interrupt: bool) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    fn is_speaking(&mut self) -> Result<bool> {
        Err(BackendError::NotImplemented)
    }

    fn stop(&mut self) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    fn pause(&mut self) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    fn resume(&mut self) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    fn volume(&mut self) -> Result<f32> {
        Err(BackendError::NotImplemented)
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    fn rate(&mut self) -> Result<f32> {
        Err(BackendError::NotImplemented)
    }

    fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    fn pitch(&mut self) -> Result<f32> {
        Err(BackendError::NotImplemented)
    }

    /// Re-enumerate voices; indices are only stable between refreshes
    fn refresh_voices(&mut self) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    fn count_voices(&mut self) -> Result<usize> {
        Err(BackendError::NotImplemented)
    }

    fn voice_name(&mut self, index: usize) -> Result<String> {
        Err(BackendError::NotImplemented)
    }

    fn voice_language(&mut self, index: usize) -> Result<String> {
        Err(BackendError::NotImplemented)
    }

    fn set_voice(&mut self, index: usize) -> Result<()> {
        Err(BackendError::NotImplemented)
    }

    /// Index of the active voice
    fn voice(&mut self) -> Result<usize> {
        Err(BackendError::NotImplemented)
    }

    /// Channel count `speak_to_memory` currently produces
    fn channels(&mut self) -> Result<usize> {
        Err(BackendError::NotImplemented)
    }

    /// Sample rate `speak_to_memory` currently produces
    fn sample_rate(&mut self) -> Result<usize> {
        Err(BackendError::NotImplemented)
    }

    /// Bit depth of the backend's native PCM before conversion to float
    fn bit_depth(&mut self) -> Result<usize> {
        Err(BackendError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NameOnly;

    impl TextToSpeechBackend for NameOnly {
        fn name(&self) -> &str {
            "Name only"
        }
    }

    #[test]
    fn test_defaults_are_not_implemented() {
        let mut b = NameOnly;
        assert_eq!(b.initialize(), Err(BackendError::NotImplemented));
        assert_eq!(b.speak("hi", true), Err(BackendError::NotImplemented));
        assert_eq!(b.speak_to_memory("hi", &mut |_, _, _| {}), Err(BackendError::NotImplemented));
        assert_eq!(b.output("hi", false), Err(BackendError::NotImplemented));
        assert_eq!(b.is_speaking(), Err(BackendError::NotImplemented));
        assert_eq!(b.volume(), Err(BackendError::NotImplemented));
        assert_eq!(b.set_voice(0), Err(BackendError::NotImplemented));
        assert_eq!(b.bit_depth(), Err(BackendError::NotImplemented));
        assert!(b.capabilities().is_empty());
    }

    #[test]
    fn test_capabilities_bitset() {
        let mut caps = Capabilities::SPEAK | Capabilities::STOP;
        assert!(caps.contains(Capabilities::SPEAK));
        assert!(!caps.contains(Capabilities::PAUSE));
        caps |= Capabilities::PAUSE;
        assert!(caps.contains(Capabilities::SPEAK | Capabilities::PAUSE));
        assert_eq!(Capabilities::from_bits(caps.bits()), caps);
    }

    #[test]
    fn test_shared_backend_coercion() {
        let shared: SharedBackend = Arc::new(Mutex::new(NameOnly));
        let guard = lock_backend(&shared).unwrap();
        assert_eq!(guard.name(), "Name only");
    }
}
