//! espeak-ng backend
//!
//! Each utterance is one `espeak-ng` child process reading its text from
//! stdin. Audio goes to the default output (PulseAudio; on WSL the WSLg
//! server is picked up automatically), or with `--stdout` into a WAV
//! stream that `speak_to_memory` decodes.
//!
//! Non-interrupting speech queues behind the running utterance; the queue
//! advances whenever the backend is polled (`is_speaking`, `speak`, `stop`).
//!
//! Dependencies:
//! - espeak-ng (install with: sudo apt install espeak-ng)

use crate::backend::{
    AudioFormat, AudioFormatCache, AudioSink, Capabilities, NativeRange, SpeechState,
    TextToSpeechBackend, Voice, VoiceList,
};
use crate::error::{BackendError, Result};
use crate::platform::{find_executable, pulse_server_override};
use log::{debug, error, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::process::{Child, Command, Stdio};

pub const NAME: &str = "eSpeak NG";

/// Words per minute
const RATE: NativeRange = NativeRange::new(80.0, 175.0, 450.0);
/// Amplitude
const VOLUME: NativeRange = NativeRange::new(0.0, 100.0, 200.0);
const PITCH: NativeRange = NativeRange::new(0.0, 50.0, 99.0);

const DEFAULT_VOICE: &str = "en";

/// Text synthesized to learn the output format
const PROBE_TEXT: &str = "a";

/// One row of `espeak-ng --voices`: `Pty Language Age/Gender VoiceName File ...`
static VOICE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\s+(\S+)\s+\S+\s+(\S+)\s+\S+").expect("valid voice regex"));

/// espeak-ng backend
pub struct EspeakBackend {
    /// Path to espeak-ng, found during initialize
    espeak_path: Option<String>,

    /// PulseAudio server to hand to child processes
    pulse_server: Option<&'static str>,

    /// Currently running espeak-ng process
    current_process: Option<Child>,

    /// Utterances waiting behind the current one
    queue: VecDeque<String>,

    state: SpeechState,

    rate: f32,
    volume: f32,
    pitch: f32,

    voices: VoiceList,

    /// espeak `-v` identifiers in the same order as `voices`
    voice_ids: Vec<String>,

    /// Identifier passed with `-v`
    voice: String,

    format: AudioFormatCache,
}

impl EspeakBackend {
    pub fn new() -> Self {
        Self {
            espeak_path: None,
            pulse_server: None,
            current_process: None,
            queue: VecDeque::new(),
            state: SpeechState::new(),
            rate: RATE.default,
            volume: VOLUME.default,
            pitch: PITCH.default,
            voices: VoiceList::new(),
            voice_ids: Vec::new(),
            voice: DEFAULT_VOICE.to_string(),
            format: AudioFormatCache::new(),
        }
    }

    fn espeak_path(&self) -> Result<&str> {
        self.espeak_path.as_deref().ok_or(BackendError::NotInitialized)
    }

    /// Base command with the current voice settings applied
    fn command(&self) -> Result<Command> {
        let mut cmd = Command::new(self.espeak_path()?);
        cmd.arg("-v").arg(&self.voice);
        cmd.arg("-s").arg((self.rate.round() as u32).to_string());
        cmd.arg("-a").arg((self.volume.round() as u32).to_string());
        cmd.arg("-p").arg((self.pitch.round() as u32).to_string());
        cmd.arg("--stdin");
        if let Some(server) = self.pulse_server {
            cmd.env("PULSE_SERVER", server);
        }
        Ok(cmd)
    }

    fn spawn(&mut self, text: &str) -> Result<()> {
        let mut cmd = self.command()?;
        cmd.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn espeak-ng: {}", e);
            BackendError::SpeakFailure
        })?;
        send_text(&mut child, text)?;
        debug!("espeak-ng process started with PID {}", child.id());
        self.current_process = Some(child);
        Ok(())
    }

    /// Reap a finished process and start the next queued utterance
    fn poll(&mut self) -> Result<bool> {
        loop {
            if let Some(child) = self.current_process.as_mut() {
                match child.try_wait() {
                    Ok(None) => return Ok(true),
                    Ok(Some(status)) => {
                        debug!("espeak-ng exited with {}", status);
                        self.current_process = None;
                    }
                    Err(e) => {
                        error!("Failed to poll espeak-ng: {}", e);
                        return Err(BackendError::InternalBackendError);
                    }
                }
            }
            match self.queue.pop_front() {
                Some(text) => self.spawn(&text)?,
                None => {
                    self.state.finished();
                    return Ok(false);
                }
            }
        }
    }

    /// Kill the running process and drop anything queued
    fn cancel_process(&mut self) {
        self.queue.clear();
        if let Some(mut child) = self.current_process.take() {
            debug!("Killing espeak-ng process");
            #[cfg(unix)]
            {
                // a stopped process must be continued to receive SIGKILL promptly
                let _ = signal(&child, nix::sys::signal::Signal::SIGCONT);
            }
            match child.kill() {
                Ok(_) => {
                    let _ = child.wait(); // Clean up zombie
                }
                Err(e) => {
                    debug!("Failed to kill espeak-ng process: {}", e);
                }
            }
        }
    }

    /// Run espeak-ng to completion with WAV on stdout and decode it
    fn synthesize(&self, text: &str) -> Result<(Vec<f32>, AudioFormat)> {
        let mut cmd = self.command()?;
        cmd.arg("--stdout")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn espeak-ng: {}", e);
            BackendError::SpeakFailure
        })?;
        send_text(&mut child, text)?;
        let output = child.wait_with_output().map_err(|e| {
            error!("Failed to collect espeak-ng output: {}", e);
            BackendError::SpeakFailure
        })?;
        if !output.status.success() {
            error!("espeak-ng exited with {}", output.status);
            return Err(BackendError::SpeakFailure);
        }
        decode_wav(&output.stdout)
    }

    /// Output format for the current voice, synthesizing a probe if unknown
    fn audio_format(&mut self) -> Result<AudioFormat> {
        self.state.ensure_initialized()?;
        let mut cache = std::mem::take(&mut self.format);
        let result = cache.get_or_probe(|| {
            debug!("Probing espeak-ng output format");
            self.synthesize(PROBE_TEXT).map(|(_, format)| format)
        });
        self.format = cache;
        result
    }
}

impl Default for EspeakBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EspeakBackend {
    fn drop(&mut self) {
        debug!("Shutting down espeak-ng backend");
        self.cancel_process();
    }
}

/// Write `text` to the child's stdin and close it, reaping the child on failure
fn send_text(child: &mut Child, text: &str) -> Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(e) = stdin.write_all(text.as_bytes()) {
        error!("Failed to send text to espeak-ng: {}", e);
        let _ = child.kill();
        let _ = child.wait();
        return Err(BackendError::SpeakFailure);
    }
    Ok(())
}

#[cfg(unix)]
fn signal(child: &Child, sig: nix::sys::signal::Signal) -> Result<()> {
    use nix::unistd::Pid;
    nix::sys::signal::kill(Pid::from_raw(child.id() as i32), sig).map_err(|e| {
        error!("Failed to send {:?} to espeak-ng: {}", sig, e);
        BackendError::InternalBackendError
    })
}

/// Decode espeak-ng's WAV stream into float samples
///
/// espeak-ng cannot seek stdout, so the header's data length is a
/// placeholder; decoding stops at the first sample past the real data.
pub(crate) fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, AudioFormat)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| {
        error!("espeak-ng produced invalid WAV: {}", e);
        BackendError::InternalBackendError
    })?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().map_while(|s| s.ok()).collect(),
        hound::SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map_while(|s| s.ok())
                .map(|s| s as f32 / scale)
                .collect()
        }
    };
    let format = AudioFormat {
        channels: spec.channels as usize,
        sample_rate: spec.sample_rate as usize,
        bit_depth: spec.bits_per_sample as usize,
    };
    Ok((samples, format))
}

/// Parse `espeak-ng --voices` into display voices and `-v` identifiers
pub(crate) fn parse_voices(listing: &str) -> (Vec<Voice>, Vec<String>) {
    listing
        .lines()
        .filter_map(|line| VOICE_LINE.captures(line))
        .map(|caps| {
            let language = caps[1].to_string();
            let name = caps[2].replace('_', " ");
            (Voice::new(name, language.clone()), language)
        })
        .unzip()
}

impl TextToSpeechBackend for EspeakBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        let caps = Capabilities::SPEAK
            | Capabilities::SPEAK_TO_MEMORY
            | Capabilities::OUTPUT
            | Capabilities::STOP
            | Capabilities::IS_SPEAKING
            | Capabilities::VOLUME
            | Capabilities::RATE
            | Capabilities::PITCH
            | Capabilities::VOICES
            | Capabilities::AUDIO_FORMAT;
        if cfg!(unix) {
            caps | Capabilities::PAUSE
        } else {
            caps
        }
    }

    fn initialize(&mut self) -> Result<()> {
        self.state.check_initialize()?;
        debug!("Creating espeak-ng backend");

        let path = find_executable(&["espeak-ng", "/usr/bin/espeak-ng"], &["--version"]).ok_or_else(|| {
            debug!("espeak-ng not found. Install with: sudo apt install espeak-ng");
            BackendError::BackendNotAvailable
        })?;
        debug!("Found espeak-ng at: {}", path);
        self.espeak_path = Some(path);
        self.pulse_server = pulse_server_override();
        self.state.initialized()?;

        if let Err(e) = self.refresh_voices() {
            warn!("Could not list espeak-ng voices: {}", e);
        }
        Ok(())
    }

    fn speak(&mut self, text: &str, interrupt: bool) -> Result<()> {
        self.state.ensure_initialized()?;
        debug!("Speaking: {}", text);
        if interrupt {
            self.cancel_process();
        } else if self.poll()? {
            debug!("Queueing utterance behind running speech");
            self.queue.push_back(text.to_string());
            return Ok(());
        }
        self.spawn(text)?;
        self.state.speaking()
    }

    fn speak_to_memory(&mut self, text: &str, sink: &mut AudioSink<'_>) -> Result<()> {
        self.state.ensure_initialized()?;
        debug!("Synthesizing to memory: {}", text);
        let (samples, format) = self.synthesize(text)?;
        self.format.store(format);
        sink(&samples, format.channels, format.sample_rate);
        Ok(())
    }

    fn output(&mut self, text: &str, interrupt: bool) -> Result<()> {
        self.speak(text, interrupt)
    }

    fn is_speaking(&mut self) -> Result<bool> {
        self.state.ensure_initialized()?;
        self.poll()
    }

    fn stop(&mut self) -> Result<()> {
        self.state.ensure_initialized()?;
        debug!("Canceling speech");
        self.cancel_process();
        self.state.stop()
    }

    #[cfg(unix)]
    fn pause(&mut self) -> Result<()> {
        self.state.ensure_initialized()?;
        self.poll()?;
        self.state.check_pause()?;
        if let Some(child) = &self.current_process {
            signal(child, nix::sys::signal::Signal::SIGSTOP)?;
        }
        self.state.pause()
    }

    #[cfg(unix)]
    fn resume(&mut self) -> Result<()> {
        self.state.check_resume()?;
        if let Some(child) = &self.current_process {
            signal(child, nix::sys::signal::Signal::SIGCONT)?;
        }
        self.state.resume()
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.state.ensure_initialized()?;
        self.volume = VOLUME.to_native(volume)?;
        debug!("Setting amplitude to {}", self.volume);
        Ok(())
    }

    fn volume(&mut self) -> Result<f32> {
        self.state.ensure_initialized()?;
        Ok(VOLUME.to_normalized(self.volume))
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.state.ensure_initialized()?;
        self.rate = RATE.to_native(rate)?;
        debug!("Setting speed to {} wpm", self.rate);
        Ok(())
    }

    fn rate(&mut self) -> Result<f32> {
        self.state.ensure_initialized()?;
        Ok(RATE.to_normalized(self.rate))
    }

    fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        self.state.ensure_initialized()?;
        self.pitch = PITCH.to_native(pitch)?;
        debug!("Setting pitch to {}", self.pitch);
        Ok(())
    }

    fn pitch(&mut self) -> Result<f32> {
        self.state.ensure_initialized()?;
        Ok(PITCH.to_normalized(self.pitch))
    }

    fn refresh_voices(&mut self) -> Result<()> {
        let output = Command::new(self.espeak_path()?)
            .arg("--voices")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| {
                error!("Failed to list espeak-ng voices: {}", e);
                BackendError::InternalBackendError
            })?;
        if !output.status.success() {
            error!("espeak-ng --voices exited with {}", output.status);
            return Err(BackendError::InternalBackendError);
        }
        let (voices, ids) = parse_voices(&String::from_utf8_lossy(&output.stdout));
        debug!("Found {} espeak-ng voices", voices.len());
        self.voices.replace(voices);
        if let Some(index) = ids.iter().position(|id| *id == self.voice) {
            self.voices.select(index)?;
        }
        self.voice_ids = ids;
        Ok(())
    }

    fn count_voices(&mut self) -> Result<usize> {
        self.state.ensure_initialized()?;
        Ok(self.voices.len())
    }

    fn voice_name(&mut self, index: usize) -> Result<String> {
        self.state.ensure_initialized()?;
        Ok(self.voices.get(index)?.name.clone())
    }

    fn voice_language(&mut self, index: usize) -> Result<String> {
        self.state.ensure_initialized()?;
        Ok(self.voices.get(index)?.language.clone())
    }

    fn set_voice(&mut self, index: usize) -> Result<()> {
        self.state.ensure_initialized()?;
        let id = self.voice_ids.get(index).cloned().ok_or(BackendError::VoiceNotFound)?;
        self.voices.select(index)?;
        self.voice = id;
        debug!("Setting voice to {} (index {})", self.voice, index);
        self.format.invalidate();
        Ok(())
    }

    fn voice(&mut self) -> Result<usize> {
        self.state.ensure_initialized()?;
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

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-us           --/M      English_(America)  gmw/en-US            (en 10)
 2  en              --/M      English_(Great_Britain) gmw/en          (en 2)
";

    #[test]
    fn test_parse_voices() {
        let (voices, ids) = parse_voices(LISTING);
        assert_eq!(ids, vec!["af", "en-us", "en"]);
        assert_eq!(voices[1], Voice::new("English (America)", "en-us"));
        assert_eq!(voices[2].name, "English (Great Britain)");
    }

    #[test]
    fn test_parse_voices_ignores_noise() {
        let (voices, ids) = parse_voices("garbage\n\n");
        assert!(voices.is_empty());
        assert!(ids.is_empty());
    }

    #[test]
    fn test_decode_wav_with_placeholder_length() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for s in [0i16, 16_384, -16_384, 32_767] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        // unseekable stdout header: the data chunk claims far more than follows
        let data_pos = bytes.windows(4).position(|w| w == b"data").unwrap();
        bytes[data_pos + 4..data_pos + 8].copy_from_slice(&0x7fff_f000u32.to_le_bytes());
        bytes.truncate(data_pos + 8 + 8);

        let (samples, format) = decode_wav(&bytes).unwrap();
        assert_eq!(format, AudioFormat { channels: 1, sample_rate: 22_050, bit_depth: 16 });
        assert_eq!(samples, vec![0.0, 0.5, -0.5, 32_767.0 / 32_768.0]);
    }

    /// Backend pointed at an arbitrary executable instead of espeak-ng
    #[cfg(unix)]
    fn with_executable(name: &str) -> EspeakBackend {
        let mut backend = EspeakBackend::new();
        backend.espeak_path = Some(name.to_string());
        backend
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_voice_listing_is_an_error() {
        let mut backend = with_executable("false");
        assert_eq!(backend.refresh_voices(), Err(BackendError::InternalBackendError));
        assert!(backend.voice_ids.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejected_input_reaps_child() {
        // `true` exits without reading, so a write larger than the pipe buffer fails
        let backend = with_executable("true");
        let text = "a".repeat(1 << 20);
        assert_eq!(
            backend.synthesize(&text).map(|_| ()),
            Err(BackendError::SpeakFailure)
        );
    }

    #[test]
    fn test_native_ranges() {
        assert_eq!(RATE.to_native(0.5), Ok(175.0));
        assert_eq!(VOLUME.to_native(1.0), Ok(200.0));
        assert_eq!(PITCH.to_native(0.0), Ok(0.0));
    }

    #[test]
    fn test_uninitialized_backend() {
        let mut backend = EspeakBackend::new();
        assert_eq!(backend.speak("hi", true), Err(BackendError::NotInitialized));
        assert_eq!(backend.set_volume(0.5), Err(BackendError::NotInitialized));
        assert_eq!(backend.channels(), Err(BackendError::NotInitialized));
    }

    #[test]
    fn test_create_espeak_backend() {
        let mut backend = EspeakBackend::new();
        match backend.initialize() {
            Ok(()) => {
                assert_eq!(backend.set_rate(-0.1), Err(BackendError::RangeOutOfBounds));
                assert!(backend.set_rate(0.75).is_ok());
                assert!((backend.rate().unwrap() - 0.75).abs() < 0.01);
                assert!(backend.stop().is_ok());
                #[cfg(unix)]
                assert_eq!(backend.pause().err(), Some(BackendError::NotSpeaking));
                let count = backend.count_voices().unwrap();
                assert_eq!(backend.set_voice(count), Err(BackendError::VoiceNotFound));
            }
            Err(e) => println!("⚠ espeak-ng backend not available: {}", e),
        }
    }
}
