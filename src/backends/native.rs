//! Native TTS backend using the tts crate
//!
//! The `tts` crate provides a unified interface to:
//! - Speech Dispatcher on Linux (via native bindings)
//! - AVFoundation on macOS/iOS (via native bindings)
//! - WinRT on Windows
//!
//! Everything except in-memory synthesis is available, subject to what the
//! platform engine reports in `supported_features()`.

use crate::backend::{Capabilities, NativeRange, SpeechState, TextToSpeechBackend, Voice, VoiceList};
use crate::error::{BackendError, Result};
use log::{debug, error, warn};
use tts::{Features, Tts as TtsCrate};

pub const NAME: &str = "Native";

/// Native TTS backend using the tts crate
pub struct NativeBackend {
    /// The tts crate's TTS instance, present once initialized
    tts: Option<TtsCrate>,

    state: SpeechState,

    voices: VoiceList,

    /// Engine voices in the same order as `voices`
    engine_voices: Vec<tts::Voice>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            tts: None,
            state: SpeechState::new(),
            voices: VoiceList::new(),
            engine_voices: Vec::new(),
        }
    }

    fn tts(&mut self) -> Result<&mut TtsCrate> {
        self.tts.as_mut().ok_or(BackendError::NotInitialized)
    }

    /// The engine handle, provided the engine supports `feature`
    fn tts_with(&mut self, feature: fn(&Features) -> bool) -> Result<&mut TtsCrate> {
        let tts = self.tts()?;
        if feature(&tts.supported_features()) {
            Ok(tts)
        } else {
            Err(BackendError::NotImplemented)
        }
    }

    fn failed(op: &str, e: tts::Error, kind: BackendError) -> BackendError {
        error!("Native TTS {} failed: {}", op, e);
        kind
    }

    fn volume_range(tts: &TtsCrate) -> NativeRange {
        NativeRange::new(tts.min_volume(), tts.normal_volume(), tts.max_volume())
    }

    fn rate_range(tts: &TtsCrate) -> NativeRange {
        NativeRange::new(tts.min_rate(), tts.normal_rate(), tts.max_rate())
    }

    fn pitch_range(tts: &TtsCrate) -> NativeRange {
        NativeRange::new(tts.min_pitch(), tts.normal_pitch(), tts.max_pitch())
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TextToSpeechBackend for NativeBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::SPEAK | Capabilities::OUTPUT;
        let Some(tts) = &self.tts else {
            return caps;
        };
        let features = tts.supported_features();
        if features.stop {
            caps |= Capabilities::STOP;
        }
        if features.is_speaking {
            caps |= Capabilities::IS_SPEAKING;
        }
        if features.volume {
            caps |= Capabilities::VOLUME;
        }
        if features.rate {
            caps |= Capabilities::RATE;
        }
        if features.pitch {
            caps |= Capabilities::PITCH;
        }
        if features.voice {
            caps |= Capabilities::VOICES;
        }
        caps
    }

    fn initialize(&mut self) -> Result<()> {
        self.state.check_initialize()?;
        debug!("Creating native TTS backend");

        let tts = TtsCrate::default().map_err(|e| {
            debug!("Native TTS unavailable: {}", e);
            BackendError::BackendNotAvailable
        })?;
        self.tts = Some(tts);
        self.state.initialized()?;

        if let Err(e) = self.refresh_voices() {
            debug!("Voice enumeration skipped: {}", e);
        }
        debug!("Native TTS backend created successfully");
        Ok(())
    }

    fn speak(&mut self, text: &str, interrupt: bool) -> Result<()> {
        self.state.ensure_initialized()?;
        debug!("Speaking: {}", text);
        // tts interrupts by stopping first, which is fine when nothing plays
        self.tts()?
            .speak(text, interrupt)
            .map_err(|e| Self::failed("speak", e, BackendError::SpeakFailure))?;
        self.state.speaking()
    }

    fn output(&mut self, text: &str, interrupt: bool) -> Result<()> {
        self.speak(text, interrupt)
    }

    fn is_speaking(&mut self) -> Result<bool> {
        let speaking = self
            .tts_with(|f| f.is_speaking)?
            .is_speaking()
            .map_err(|e| Self::failed("is_speaking", e, BackendError::InternalBackendError))?;
        if !speaking {
            self.state.finished();
        }
        Ok(speaking)
    }

    fn stop(&mut self) -> Result<()> {
        debug!("Canceling speech");
        self.tts_with(|f| f.stop)?
            .stop()
            .map_err(|e| Self::failed("stop", e, BackendError::InternalBackendError))?;
        self.state.stop()
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        let tts = self.tts_with(|f| f.volume)?;
        let native = Self::volume_range(tts).to_native(volume)?;
        debug!("Setting volume to {} (native {})", volume, native);
        tts.set_volume(native)
            .map_err(|e| Self::failed("set_volume", e, BackendError::InternalBackendError))?;
        Ok(())
    }

    fn volume(&mut self) -> Result<f32> {
        let tts = self.tts_with(|f| f.volume)?;
        let native = tts
            .get_volume()
            .map_err(|e| Self::failed("get_volume", e, BackendError::InternalBackendError))?;
        Ok(Self::volume_range(tts).to_normalized(native))
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        let tts = self.tts_with(|f| f.rate)?;
        let native = Self::rate_range(tts).to_native(rate)?;
        debug!("Setting rate to {} (native {})", rate, native);
        tts.set_rate(native)
            .map_err(|e| Self::failed("set_rate", e, BackendError::InternalBackendError))?;
        Ok(())
    }

    fn rate(&mut self) -> Result<f32> {
        let tts = self.tts_with(|f| f.rate)?;
        let native = tts
            .get_rate()
            .map_err(|e| Self::failed("get_rate", e, BackendError::InternalBackendError))?;
        Ok(Self::rate_range(tts).to_normalized(native))
    }

    fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        let tts = self.tts_with(|f| f.pitch)?;
        let native = Self::pitch_range(tts).to_native(pitch)?;
        debug!("Setting pitch to {} (native {})", pitch, native);
        tts.set_pitch(native)
            .map_err(|e| Self::failed("set_pitch", e, BackendError::InternalBackendError))?;
        Ok(())
    }

    fn pitch(&mut self) -> Result<f32> {
        let tts = self.tts_with(|f| f.pitch)?;
        let native = tts
            .get_pitch()
            .map_err(|e| Self::failed("get_pitch", e, BackendError::InternalBackendError))?;
        Ok(Self::pitch_range(tts).to_normalized(native))
    }

    fn refresh_voices(&mut self) -> Result<()> {
        let tts = self.tts_with(|f| f.voice)?;
        let engine_voices = tts
            .voices()
            .map_err(|e| Self::failed("voices", e, BackendError::InternalBackendError))?;
        let current = if tts.supported_features().get_voice {
            tts.voice().ok().flatten().map(|v| v.name())
        } else {
            None
        };

        debug!("Found {} native voices", engine_voices.len());
        self.voices.replace(
            engine_voices
                .iter()
                .map(|v| Voice::new(v.name(), v.language().to_string()))
                .collect(),
        );
        self.engine_voices = engine_voices;
        if let Some(name) = current {
            self.voices.select_by_name(&name);
        }
        Ok(())
    }

    fn count_voices(&mut self) -> Result<usize> {
        self.tts_with(|f| f.voice)?;
        Ok(self.voices.len())
    }

    fn voice_name(&mut self, index: usize) -> Result<String> {
        self.tts_with(|f| f.voice)?;
        Ok(self.voices.get(index)?.name.clone())
    }

    fn voice_language(&mut self, index: usize) -> Result<String> {
        self.tts_with(|f| f.voice)?;
        Ok(self.voices.get(index)?.language.clone())
    }

    fn set_voice(&mut self, index: usize) -> Result<()> {
        self.tts_with(|f| f.voice)?;
        self.voices.get(index)?;
        let Some(engine_voice) = self.engine_voices.get(index).cloned() else {
            warn!("Voice list out of sync with engine voices");
            return Err(BackendError::VoiceNotFound);
        };
        debug!("Selecting voice: {:?}", engine_voice);
        self.tts()?
            .set_voice(&engine_voice)
            .map_err(|e| Self::failed("set_voice", e, BackendError::InternalBackendError))?;
        self.voices.select(index)?;
        Ok(())
    }

    fn voice(&mut self) -> Result<usize> {
        self.tts_with(|f| f.voice)?;
        self.voices.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_backend() {
        let mut backend = NativeBackend::new();
        assert_eq!(backend.name(), NAME);
        assert_eq!(backend.speak("hello", false), Err(BackendError::NotInitialized));
        assert_eq!(backend.stop(), Err(BackendError::NotInitialized));
        assert_eq!(backend.set_rate(0.5), Err(BackendError::NotInitialized));
        assert_eq!(
            backend.speak_to_memory("hello", &mut |_, _, _| {}),
            Err(BackendError::NotImplemented)
        );
    }

    #[test]
    fn test_initialize() {
        // May fail if the system has no speech service (CI, containers)
        let mut backend = NativeBackend::new();
        match backend.initialize() {
            Ok(()) => {
                assert_eq!(backend.initialize(), Err(BackendError::AlreadyInitialized));
                assert!(backend.capabilities().contains(Capabilities::SPEAK));
                if backend.capabilities().contains(Capabilities::RATE) {
                    assert_eq!(backend.set_rate(1.5), Err(BackendError::RangeOutOfBounds));
                }
            }
            Err(e) => println!("⚠ Native TTS unavailable (may be expected in CI): {}", e),
        }
    }
}
