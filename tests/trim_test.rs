//! Silence trimming tests
//!
//! Synthetic buffers with known speech spans run through the RMS gate

use std::f32::consts::PI;
use voxhub::util::{compute_trim_bounds, trim_silence_rms_gate, TrimParams};

const RATE: usize = 16_000;

fn silence(ms: usize) -> Vec<f32> {
    vec![0.0; RATE * ms / 1000]
}

/// 440 Hz sine at the given peak amplitude
fn tone(ms: usize, amplitude: f32) -> Vec<f32> {
    (0..RATE * ms / 1000)
        .map(|i| amplitude * (2.0 * PI * 440.0 * i as f32 / RATE as f32).sin())
        .collect()
}

/// Deterministic low-level noise
fn noise(len: usize, amplitude: f32) -> Vec<f32> {
    let mut state: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            amplitude * ((state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0)
        })
        .collect()
}

fn speech_buffer() -> Vec<f32> {
    // -6 dBFS peak
    [silence(200), tone(500, 0.5), silence(200)].concat()
}

#[test]
fn test_tone_between_silences() {
    let input = speech_buffer();
    let total = input.len();
    let bounds = compute_trim_bounds(&input, 1, RATE, &TrimParams::default());

    assert!(bounds.speech_detected);
    assert!(bounds.start_frame > 0);
    assert!((bounds.start_frame as f32) < 0.3 * total as f32);
    assert!((bounds.end_frame as f32) > 0.5 * total as f32);
    assert!(bounds.end_frame <= total);
    assert!(bounds.open_thr_db > bounds.close_thr_db);

    let output = trim_silence_rms_gate(&input, 1, RATE, &TrimParams::default());
    assert!(!output.is_empty());
    assert!(output.len() < input.len());
    assert_eq!(output.len(), bounds.end_frame - bounds.start_frame);
}

#[test]
fn test_preroll_keeps_onset() {
    let input = speech_buffer();
    let bounds = compute_trim_bounds(&input, 1, RATE, &TrimParams::default());
    // the tone starts at 200 ms; allow one hop of frame overlap, 30 ms preroll and a 5 ms snap window
    let onset = RATE * 200 / 1000;
    assert!(bounds.start_frame <= onset);
    assert!(bounds.start_frame >= onset - RATE * 60 / 1000);
}

#[test]
fn test_output_faded_at_edges() {
    let output = trim_silence_rms_gate(&speech_buffer(), 1, RATE, &TrimParams::default());
    assert_eq!(output[0], 0.0);
    assert!(output.last().unwrap().abs() < 1e-6);
}

#[test]
fn test_all_silence_passes_through() {
    let input = silence(900);
    let bounds = compute_trim_bounds(&input, 1, RATE, &TrimParams::default());
    assert!(!bounds.speech_detected);
    assert_eq!(trim_silence_rms_gate(&input, 1, RATE, &TrimParams::default()), input);
}

#[test]
fn test_empty_passes_through() {
    let output = trim_silence_rms_gate(&[], 1, RATE, &TrimParams::default());
    assert!(output.is_empty());
}

#[test]
fn test_speech_to_the_end_is_kept() {
    let input = [silence(200), tone(400, 0.5)].concat();
    let bounds = compute_trim_bounds(&input, 1, RATE, &TrimParams::default());
    assert!(bounds.speech_detected);
    // only the boundary snap may pull the end in
    assert!(bounds.end_frame >= input.len() - RATE * 5 / 1000);
    assert!(bounds.end_frame <= input.len());
}

#[test]
fn test_noise_floor_tracks_background() {
    let mut input = [silence(200), tone(500, 0.5), silence(200)].concat();
    for (s, n) in input.iter_mut().zip(noise(14_400, 0.003)) {
        *s += n;
    }
    let params = TrimParams::default();
    let bounds = compute_trim_bounds(&input, 1, RATE, &params);
    assert!(bounds.speech_detected);
    assert!(bounds.noise_floor_db > params.min_floor_db);
    assert!(bounds.noise_floor_db < params.max_floor_db);
    assert!(trim_silence_rms_gate(&input, 1, RATE, &params).len() < input.len());
}

#[test]
fn test_short_blip_is_ignored() {
    // 20 ms is fewer than three consecutive loud 10 ms hops
    let input = [silence(300), tone(20, 0.5), silence(300)].concat();
    let params = TrimParams {
        frame_ms: 10.0,
        ..TrimParams::default()
    };
    let bounds = compute_trim_bounds(&input, 1, RATE, &params);
    assert!(!bounds.speech_detected);
    assert_eq!(trim_silence_rms_gate(&input, 1, RATE, &params), input);
}

#[test]
fn test_stereo_keeps_whole_frames() {
    let mono = speech_buffer();
    let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
    let params = TrimParams::default();

    let mono_bounds = compute_trim_bounds(&mono, 1, RATE, &params);
    let stereo_bounds = compute_trim_bounds(&stereo, 2, RATE, &params);
    assert_eq!(mono_bounds.start_frame, stereo_bounds.start_frame);
    assert_eq!(mono_bounds.end_frame, stereo_bounds.end_frame);

    let output = trim_silence_rms_gate(&stereo, 2, RATE, &params);
    assert_eq!(output.len() % 2, 0);
    assert!(output.len() < stereo.len());
}

#[test]
fn test_never_longer_than_input() {
    let params = TrimParams::default();
    let buffers = [
        speech_buffer(),
        tone(300, 0.9),
        silence(50),
        noise(4_000, 0.5),
        [tone(100, 0.2), silence(400), tone(100, 0.2)].concat(),
    ];
    for input in buffers {
        assert!(trim_silence_rms_gate(&input, 1, RATE, &params).len() <= input.len());
    }
}

#[test]
fn test_huge_windows_stay_in_bounds() {
    let input = speech_buffer();
    for params in [
        TrimParams { postroll_ms: 1e20, ..TrimParams::default() },
        TrimParams { boundary_search_ms: 1e20, ..TrimParams::default() },
        TrimParams { preroll_ms: 1e20, postroll_ms: 1e20, boundary_search_ms: 1e20, ..TrimParams::default() },
    ] {
        let bounds = compute_trim_bounds(&input, 1, RATE, &params);
        assert!(bounds.start_frame <= bounds.end_frame);
        assert!(bounds.end_frame <= input.len());
        assert!(trim_silence_rms_gate(&input, 1, RATE, &params).len() <= input.len());
    }
}
