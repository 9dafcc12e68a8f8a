//! Leading/trailing silence removal for synthesized speech
//!
//! An RMS gate with hysteresis finds where speech starts and stops, the span
//! is padded and snapped to quiet samples, and short raised-cosine fades are
//! applied so the cut never clicks.
//!
//! All functions here are pure over caller-owned buffers.

use log::debug;
use std::f32::consts::PI;

/// dB value reported for digital silence and empty windows
const SILENCE_DB: f32 = -160.0;

/// Added to the RMS before the logarithm so silence does not produce `-inf`
const RMS_EPSILON: f64 = 1e-8;

/// Percentile of frame energies taken as the noise floor estimate
const FLOOR_PERCENTILE: f32 = 0.20;

/// Tuning for [`trim_silence_rms_gate`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrimParams {
    /// Analysis frame length
    pub frame_ms: f32,
    /// Distance between consecutive analysis frames
    pub hop_ms: f32,
    /// Window at the start used for the noise floor estimate
    pub head_ms: f32,
    /// Window at the end used for the noise floor estimate
    pub tail_ms: f32,
    /// Lowest noise floor the estimate may report
    pub min_floor_db: f32,
    /// Highest noise floor the estimate may report
    pub max_floor_db: f32,
    /// Energy above the floor needed to enter speech
    pub open_db: f32,
    /// Energy above the floor at or below which speech is left; must be below `open_db`
    pub close_db: f32,
    /// Consecutive loud frames needed to enter speech
    pub min_speech_frames: u32,
    /// Consecutive quiet frames needed to leave speech
    pub min_silence_frames: u32,
    /// Audio kept before the detected onset
    pub preroll_ms: f32,
    /// Audio kept after the detected offset
    pub postroll_ms: f32,
    /// Radius around each cut searched for the quietest sample
    pub boundary_search_ms: f32,
    /// Length of the fade applied at both ends
    pub fade_ms: f32,
}

impl Default for TrimParams {
    fn default() -> Self {
        Self {
            frame_ms: 20.0,
            hop_ms: 10.0,
            head_ms: 200.0,
            tail_ms: 200.0,
            min_floor_db: -90.0,
            max_floor_db: -30.0,
            open_db: 12.0,
            close_db: 6.0,
            min_speech_frames: 3,
            min_silence_frames: 10,
            preroll_ms: 30.0,
            postroll_ms: 60.0,
            boundary_search_ms: 5.0,
            fade_ms: 5.0,
        }
    }
}

/// Where speech was found, in sample frames (one frame = one sample per channel)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimBounds {
    /// First frame kept
    pub start_frame: usize,
    /// One past the last frame kept
    pub end_frame: usize,
    pub speech_detected: bool,
    pub noise_floor_db: f32,
    pub open_thr_db: f32,
    pub close_thr_db: f32,
}

impl TrimBounds {
    fn undetected(total_frames: usize) -> Self {
        Self {
            start_frame: 0,
            end_frame: total_frames,
            speech_detected: false,
            noise_floor_db: SILENCE_DB,
            open_thr_db: SILENCE_DB,
            close_thr_db: SILENCE_DB,
        }
    }
}

fn ms_to_frames(ms: f32, sample_rate: usize) -> usize {
    let frames = (ms as f64 * sample_rate as f64) / 1000.0;
    (frames + 0.5).floor().max(0.0) as usize
}

fn rms_to_db(rms: f64) -> f32 {
    (20.0 * (rms + RMS_EPSILON).log10()) as f32
}

fn frame_rms(samples: &[f32], start: usize, len: usize, total_frames: usize, channels: usize) -> f64 {
    let end = start.saturating_add(len).min(total_frames);
    if end <= start {
        return 0.0;
    }
    let window = &samples[start * channels..end * channels];
    let sum_sq: f64 = window.iter().map(|&v| (v as f64) * (v as f64)).sum();
    (sum_sq / window.len() as f64).sqrt()
}

fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return SILENCE_DB;
    }
    let mut tmp = values.to_vec();
    let k = (p.clamp(0.0, 1.0) * (tmp.len() - 1) as f32).floor() as usize;
    let (_, kth, _) = tmp.select_nth_unstable_by(k, |a, b| a.total_cmp(b));
    *kth
}

/// Sum of absolute sample values across channels for one frame
fn frame_energy(samples: &[f32], frame: usize, channels: usize) -> f64 {
    samples[frame * channels..(frame + 1) * channels]
        .iter()
        .map(|v| v.abs() as f64)
        .sum()
}

/// Move an inclusive start boundary to the quietest frame within `search`
fn snap_start(samples: &[f32], target: usize, total_frames: usize, channels: usize, search: usize) -> usize {
    let target = target.min(total_frames);
    if search == 0 || total_frames == 0 {
        return target;
    }
    let begin = target.saturating_sub(search);
    let end = target.saturating_add(search).saturating_add(1).min(total_frames);
    let mut best = target;
    let mut best_score = f64::INFINITY;
    for f in begin..end {
        let score = frame_energy(samples, f, channels);
        if score < best_score {
            best_score = score;
            best = f;
        }
    }
    best
}

/// Move an exclusive end boundary so the frames on both sides of it are quiet
fn snap_end(samples: &[f32], target: usize, total_frames: usize, channels: usize, search: usize) -> usize {
    let target = target.min(total_frames);
    if search == 0 || total_frames == 0 {
        return target;
    }
    let begin = target.saturating_sub(search);
    let end = target.saturating_add(search).min(total_frames);
    let mut best = target;
    let mut best_score = f64::INFINITY;
    for b in begin..=end {
        let mut score = 0.0;
        if b > 0 {
            score += frame_energy(samples, b - 1, channels);
        }
        if b < total_frames {
            score += frame_energy(samples, b, channels);
        }
        if score < best_score {
            best_score = score;
            best = b;
        }
    }
    best
}

fn apply_fade_in(samples: &mut [f32], channels: usize, fade_frames: usize) {
    let fade_frames = fade_frames.min(samples.len() / channels);
    for (i, frame) in samples.chunks_exact_mut(channels).take(fade_frames).enumerate() {
        let gain = if fade_frames > 1 {
            let t = i as f32 / (fade_frames - 1) as f32;
            0.5 - 0.5 * (PI * t).cos()
        } else {
            1.0
        };
        frame.iter_mut().for_each(|v| *v *= gain);
    }
}

fn apply_fade_out(samples: &mut [f32], channels: usize, fade_frames: usize) {
    let total_frames = samples.len() / channels;
    let fade_frames = fade_frames.min(total_frames);
    let start = total_frames - fade_frames;
    for (i, frame) in samples.chunks_exact_mut(channels).skip(start).enumerate() {
        let gain = if fade_frames > 1 {
            let t = i as f32 / (fade_frames - 1) as f32;
            0.5 + 0.5 * (PI * t).cos()
        } else {
            0.0
        };
        frame.iter_mut().for_each(|v| *v *= gain);
    }
}

fn is_degenerate(samples: &[f32], channels: usize, sample_rate: usize) -> bool {
    channels == 0 || sample_rate == 0 || samples.is_empty() || samples.len() % channels != 0
}

/// Locate speech inside an interleaved buffer without modifying it
///
/// Degenerate input (no channels, no sample rate, empty, or a length that is
/// not a whole number of frames) and buffers where no speech is found both
/// report `speech_detected == false` with the full buffer as the span.
pub fn compute_trim_bounds(samples: &[f32], channels: usize, sample_rate: usize, params: &TrimParams) -> TrimBounds {
    if is_degenerate(samples, channels, sample_rate) {
        return TrimBounds::undetected(if channels == 0 { 0 } else { samples.len() / channels });
    }
    let total_frames = samples.len() / channels;
    let frame_len = ms_to_frames(params.frame_ms, sample_rate).max(1);
    let hop = ms_to_frames(params.hop_ms, sample_rate).max(1);
    let n = if total_frames <= frame_len {
        1
    } else {
        1 + (total_frames - frame_len) / hop
    };

    let db: Vec<f32> = (0..n)
        .map(|i| rms_to_db(frame_rms(samples, i * hop, frame_len, total_frames, channels)))
        .collect();

    let head_frames = (ms_to_frames(params.head_ms, sample_rate) / hop).max(1).min(n);
    let tail_frames = (ms_to_frames(params.tail_ms, sample_rate) / hop).max(1).min(n);
    let floor_db = percentile(&db[..head_frames], FLOOR_PERCENTILE)
        .min(percentile(&db[n - tail_frames..], FLOOR_PERCENTILE))
        .clamp(params.min_floor_db, params.max_floor_db);
    let open_thr = floor_db + params.open_db;
    let close_thr = floor_db + params.close_db;

    let min_on = params.min_speech_frames.max(1) as usize;
    let min_off = params.min_silence_frames.max(1) as usize;
    let mut in_speech = false;
    let mut on_run = 0usize;
    let mut off_run = 0usize;
    let mut start_idx: Option<usize> = None;
    let mut end_idx = n;

    for (i, &v) in db.iter().enumerate() {
        if !in_speech {
            if v >= open_thr {
                on_run += 1;
                if on_run >= min_on {
                    in_speech = true;
                    off_run = 0;
                    on_run = 0;
                    start_idx.get_or_insert(i + 1 - min_on);
                }
            } else {
                on_run = 0;
            }
        } else if v <= close_thr {
            off_run += 1;
            if off_run >= min_off {
                in_speech = false;
                on_run = 0;
                off_run = 0;
                end_idx = end_idx.min(i + 1 - min_off);
            }
        } else {
            off_run = 0;
            end_idx = n;
        }
    }

    let mut bounds = TrimBounds {
        noise_floor_db: floor_db,
        open_thr_db: open_thr,
        close_thr_db: close_thr,
        ..TrimBounds::undetected(total_frames)
    };
    let Some(start_idx) = start_idx else {
        debug!("No speech detected (floor {:.1} dB, open {:.1} dB)", floor_db, open_thr);
        return bounds;
    };

    let mut start = start_idx * hop;
    let mut end = if end_idx >= n { total_frames } else { end_idx * hop };
    start = start.saturating_sub(ms_to_frames(params.preroll_ms, sample_rate));
    end = end
        .saturating_add(ms_to_frames(params.postroll_ms, sample_rate))
        .min(total_frames);

    let search = ms_to_frames(params.boundary_search_ms, sample_rate);
    start = snap_start(samples, start, total_frames, channels, search).min(total_frames);
    end = snap_end(samples, end, total_frames, channels, search).min(total_frames);

    if end <= start {
        debug!("Speech span collapsed after boundary refinement, keeping full buffer");
        return bounds;
    }

    bounds.start_frame = start;
    bounds.end_frame = end;
    bounds.speech_detected = true;
    bounds
}

/// Remove leading and trailing silence from interleaved float PCM
///
/// Returns a copy of the input unchanged when the input is degenerate or no
/// speech is detected; otherwise the detected span with fades applied. The
/// result is never longer than the input.
pub fn trim_silence_rms_gate(samples: &[f32], channels: usize, sample_rate: usize, params: &TrimParams) -> Vec<f32> {
    if is_degenerate(samples, channels, sample_rate) {
        return samples.to_vec();
    }
    let bounds = compute_trim_bounds(samples, channels, sample_rate, params);
    if !bounds.speech_detected {
        return samples.to_vec();
    }

    let mut out = samples[bounds.start_frame * channels..bounds.end_frame * channels].to_vec();
    let fade_frames = ms_to_frames(params.fade_ms, sample_rate);
    apply_fade_in(&mut out, channels, fade_frames);
    apply_fade_out(&mut out, channels, fade_frames);
    debug!(
        "Trimmed {} frames to {} (start {}, end {})",
        samples.len() / channels,
        out.len() / channels,
        bounds.start_frame,
        bounds.end_frame
    );
    out
}
