//! Rendering speech to PCM buffers and WAV files

use crate::backend::TextToSpeechBackend;
use crate::error::{BackendError, VoxError};
use crate::util::{trim_silence_rms_gate, TrimParams};
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

type Result<T> = std::result::Result<T, VoxError>;

/// Interleaved float PCM captured from `speak_to_memory`
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: usize,
}

impl Pcm {
    /// Remove leading and trailing silence in place
    pub fn trim(&mut self, params: &TrimParams) {
        let before = self.samples.len();
        self.samples = trim_silence_rms_gate(&self.samples, self.channels, self.sample_rate, params);
        debug!("Trimmed {} of {} samples", before - self.samples.len(), before);
    }
}

/// Synthesize `text` and copy the audio out of the backend's callback
pub fn synthesize(backend: &mut dyn TextToSpeechBackend, text: &str) -> Result<Pcm> {
    let mut pcm: Option<Pcm> = None;
    backend.speak_to_memory(text, &mut |samples, channels, sample_rate| {
        pcm = Some(Pcm {
            samples: samples.to_vec(),
            channels,
            sample_rate,
        });
    })?;
    pcm.ok_or(VoxError::Speech(BackendError::SpeakFailure))
}

/// Write `pcm` as a 16-bit integer WAV file
pub fn write_wav(path: &Path, pcm: &Pcm) -> Result<()> {
    if pcm.channels == 0 || pcm.channels > u16::MAX as usize || pcm.sample_rate > u32::MAX as usize {
        return Err(VoxError::Speech(BackendError::InvalidParam));
    }
    let spec = hound::WavSpec {
        channels: pcm.channels as u16,
        sample_rate: pcm.sample_rate as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let file = File::create(path)?;
    let mut writer = hound::WavWriter::new(BufWriter::new(file), spec)?;
    for &sample in &pcm.samples {
        let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;
    info!("Wrote {} samples to {:?}", pcm.samples.len(), path);
    Ok(())
}
