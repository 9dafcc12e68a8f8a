//! Backend contract tests
//!
//! A scripted backend built from the shared helpers exercises the state
//! machine, parameter mapping, voice indexing and output semantics that
//! every real backend must follow

use voxhub::backend::{
    AudioFormat, AudioFormatCache, AudioSink, NativeRange, PlaybackState, SpeechState, Voice, VoiceList,
};
use voxhub::{BackendError, Capabilities, Result, TextToSpeechBackend};

const RATE: NativeRange = NativeRange::new(80.0, 175.0, 450.0);
const VOLUME: NativeRange = NativeRange::new(0.0, 100.0, 100.0);

struct Scripted {
    state: SpeechState,
    rate: f32,
    volume: f32,
    voices: VoiceList,
    format: AudioFormatCache,
    probes: usize,
    braille_works: bool,
    log: Vec<String>,
}

impl Scripted {
    fn new() -> Self {
        Self {
            state: SpeechState::new(),
            rate: RATE.default,
            volume: VOLUME.default,
            voices: VoiceList::new(),
            format: AudioFormatCache::new(),
            probes: 0,
            braille_works: true,
            log: Vec::new(),
        }
    }

    fn ready() -> Self {
        let mut b = Self::new();
        b.initialize().unwrap();
        b
    }

    fn audio_format(&mut self) -> Result<AudioFormat> {
        self.state.ensure_initialized()?;
        let probes = &mut self.probes;
        let rate = if self.voices.current() == Ok(1) { 16_000 } else { 22_050 };
        self.format.get_or_probe(|| {
            *probes += 1;
            Ok(AudioFormat {
                channels: 1,
                sample_rate: rate,
                bit_depth: 16,
            })
        })
    }
}

impl TextToSpeechBackend for Scripted {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SPEAK | Capabilities::OUTPUT | Capabilities::BRAILLE | Capabilities::PAUSE
    }

    fn initialize(&mut self) -> Result<()> {
        self.state.check_initialize()?;
        self.voices.replace(vec![Voice::new("Alpha", "en-US"), Voice::new("Beta", "de-DE")]);
        self.voices.select(0)?;
        self.state.initialized()
    }

    fn speak(&mut self, text: &str, interrupt: bool) -> Result<()> {
        self.state.ensure_initialized()?;
        if interrupt {
            self.state.stop()?;
        }
        self.log.push(format!("speak:{}", text));
        self.state.speaking()
    }

    fn speak_to_memory(&mut self, text: &str, sink: &mut AudioSink<'_>) -> Result<()> {
        let format = self.audio_format()?;
        let samples = vec![0.25f32; text.len() * 10];
        sink(&samples, format.channels, format.sample_rate);
        Ok(())
    }

    fn braille(&mut self, text: &str) -> Result<()> {
        self.state.ensure_initialized()?;
        if !self.braille_works {
            return Err(BackendError::InternalBackendError);
        }
        self.log.push(format!("braille:{}", text));
        Ok(())
    }

    fn output(&mut self, text: &str, interrupt: bool) -> Result<()> {
        self.speak(text, interrupt)?;
        self.braille(text)
    }

    fn is_speaking(&mut self) -> Result<bool> {
        self.state.ensure_initialized()?;
        Ok(self.state.get() == PlaybackState::Speaking)
    }

    fn stop(&mut self) -> Result<()> {
        self.state.stop()
    }

    fn pause(&mut self) -> Result<()> {
        self.state.pause()
    }

    fn resume(&mut self) -> Result<()> {
        self.state.resume()
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.state.ensure_initialized()?;
        self.volume = VOLUME.to_native(volume)?;
        Ok(())
    }

    fn volume(&mut self) -> Result<f32> {
        self.state.ensure_initialized()?;
        Ok(VOLUME.to_normalized(self.volume))
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.state.ensure_initialized()?;
        self.rate = RATE.to_native(rate)?;
        Ok(())
    }

    fn rate(&mut self) -> Result<f32> {
        self.state.ensure_initialized()?;
        Ok(RATE.to_normalized(self.rate))
    }

    fn count_voices(&mut self) -> Result<usize> {
        Ok(self.voices.len())
    }

    fn voice_name(&mut self, index: usize) -> Result<String> {
        Ok(self.voices.get(index)?.name.clone())
    }

    fn voice_language(&mut self, index: usize) -> Result<String> {
        Ok(self.voices.get(index)?.language.clone())
    }

    fn set_voice(&mut self, index: usize) -> Result<()> {
        self.voices.select(index)?;
        self.format.invalidate();
        Ok(())
    }

    fn voice(&mut self) -> Result<usize> {
        self.voices.current()
    }

    fn channels(&mut self) -> Result<usize> {
        Ok(self.audio_format()?.channels)
    }

    fn sample_rate(&mut self) -> Result<usize> {
        Ok(self.audio_format()?.sample_rate)
    }

    fn bit_depth(&mut self) -> Result<usize> {
        Ok(self.audio_format()?.bit_depth)
    }
}

/// Implements nothing but its name
struct Bare;

impl TextToSpeechBackend for Bare {
    fn name(&self) -> &str {
        "Bare"
    }
}

#[test]
fn test_unimplemented_defaults() {
    let mut b = Bare;
    assert!(b.capabilities().is_empty());
    assert_eq!(b.initialize(), Err(BackendError::NotImplemented));
    assert_eq!(b.speak("x", false), Err(BackendError::NotImplemented));
    assert_eq!(b.speak_to_memory("x", &mut |_, _, _| {}), Err(BackendError::NotImplemented));
    assert_eq!(b.output("x", true), Err(BackendError::NotImplemented));
    assert_eq!(b.stop(), Err(BackendError::NotImplemented));
    assert_eq!(b.set_pitch(0.5), Err(BackendError::NotImplemented));
    assert_eq!(b.count_voices(), Err(BackendError::NotImplemented));
    assert_eq!(b.sample_rate(), Err(BackendError::NotImplemented));
    assert!(BackendError::NotImplemented.is_soft());
}

#[test]
fn test_initialize_once() {
    let mut b = Scripted::new();
    assert_eq!(b.speak("early", false), Err(BackendError::NotInitialized));
    assert!(b.initialize().is_ok());
    assert_eq!(b.initialize(), Err(BackendError::AlreadyInitialized));
}

#[test]
fn test_state_machine() {
    let mut b = Scripted::ready();
    assert_eq!(b.pause(), Err(BackendError::NotSpeaking));
    assert_eq!(b.resume(), Err(BackendError::NotPaused));

    b.speak("hello", false).unwrap();
    assert_eq!(b.is_speaking(), Ok(true));
    assert!(b.pause().is_ok());
    assert_eq!(b.pause(), Err(BackendError::AlreadyPaused));
    assert_eq!(b.is_speaking(), Ok(false));
    assert!(b.resume().is_ok());
    assert_eq!(b.resume(), Err(BackendError::NotPaused));

    assert!(b.stop().is_ok());
    assert_eq!(b.is_speaking(), Ok(false));
    // stop while idle succeeds
    assert!(b.stop().is_ok());
}

#[test]
fn test_interrupt_while_idle_succeeds() {
    let mut b = Scripted::ready();
    assert!(b.speak("first", true).is_ok());
    assert!(b.speak("second", true).is_ok());
    assert_eq!(b.log, vec!["speak:first", "speak:second"]);
}

#[test]
fn test_output_stops_at_first_failure() {
    let mut b = Scripted::ready();
    b.output("both", false).unwrap();
    assert_eq!(b.log, vec!["speak:both", "braille:both"]);

    b.log.clear();
    b.braille_works = false;
    assert_eq!(b.output("again", false), Err(BackendError::InternalBackendError));
    assert_eq!(b.log, vec!["speak:again"]);
}

#[test]
fn test_normalized_parameters() {
    let mut b = Scripted::ready();
    assert_eq!(b.rate(), Ok(0.5));
    b.set_rate(1.0).unwrap();
    assert_eq!(b.rate, 450.0);
    b.set_rate(0.25).unwrap();
    assert_eq!(b.rate, 127.5);
    assert!((b.rate().unwrap() - 0.25).abs() < 1e-5);

    assert_eq!(b.set_rate(1.01), Err(BackendError::RangeOutOfBounds));
    assert_eq!(b.set_volume(-0.5), Err(BackendError::RangeOutOfBounds));
    assert!((b.rate().unwrap() - 0.25).abs() < 1e-5, "Rejected values leave state alone");

    // default at the top of the range maps linearly
    assert_eq!(b.volume(), Ok(1.0));
    b.set_volume(0.5).unwrap();
    assert_eq!(b.volume, 50.0);
}

#[test]
fn test_voice_indexing() {
    let mut b = Scripted::ready();
    assert_eq!(b.count_voices(), Ok(2));
    assert_eq!(b.voice_name(1).as_deref(), Ok("Beta"));
    assert_eq!(b.voice_language(0).as_deref(), Ok("en-US"));
    assert_eq!(b.voice_name(2), Err(BackendError::VoiceNotFound));
    assert_eq!(b.set_voice(2), Err(BackendError::VoiceNotFound));
    assert_eq!(b.voice(), Ok(0));
    b.set_voice(1).unwrap();
    assert_eq!(b.voice(), Ok(1));
}

#[test]
fn test_audio_format_probed_once_per_voice() {
    let mut b = Scripted::ready();
    assert_eq!(b.sample_rate(), Ok(22_050));
    assert_eq!(b.channels(), Ok(1));
    assert_eq!(b.bit_depth(), Ok(16));
    assert_eq!(b.probes, 1);

    b.set_voice(1).unwrap();
    assert_eq!(b.sample_rate(), Ok(16_000));
    assert_eq!(b.probes, 2);
}

#[test]
fn test_speak_to_memory_calls_sink_once() {
    let mut b = Scripted::ready();
    let mut calls = Vec::new();
    b.speak_to_memory("abc", &mut |samples, channels, rate| {
        calls.push((samples.len(), channels, rate));
    })
    .unwrap();
    assert_eq!(calls, vec![(30, 1, 22_050)]);
}
