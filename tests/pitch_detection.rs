//! Integration tests for streaming pitch detection using synthesised audio.

use lazy_static::lazy_static;
use mono_pitch::{NoteName, PitchDetector, PitchEstimate};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

const SAMPLE_RATE: f32 = 44_100.0;
const CHUNK: usize = 512;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sine(freq: f32, amplitude: f32, seconds: f32) -> Vec<f32> {
    let len = (seconds * SAMPLE_RATE) as usize;
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE).sin())
        .collect()
}

/// Linear sweep from `f0` to `f1` Hz with continuous phase.
fn sweep(f0: f32, f1: f32, seconds: f32) -> Vec<f32> {
    let len = (seconds * SAMPLE_RATE) as usize;
    let rate = (f1 - f0) as f64 / seconds as f64;
    (0..len)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let phase = 2.0 * std::f64::consts::PI * (f0 as f64 * t + 0.5 * rate * t * t);
            0.5 * phase.sin() as f32
        })
        .collect()
}

/// Deterministic uniform noise in [-0.5, 0.5).
fn white_noise(len: usize, mut seed: u64) -> Vec<f32> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed >> 40) as f32 / (1u64 << 24) as f32 - 0.5
        })
        .collect()
}

/// Feed `samples` in fixed-size chunks, as an audio callback would.
fn run(detector: &mut PitchDetector, samples: &[f32]) -> Vec<Option<PitchEstimate>> {
    let mut out = Vec::new();
    for chunk in samples.chunks(CHUNK) {
        out.extend(detector.push(chunk));
    }
    out
}

fn detector() -> PitchDetector {
    PitchDetector::builder()
        .sample_rate(SAMPLE_RATE)
        .fft_size(4096)
        .noise_threshold(0.002)
        .build()
        .unwrap()
}

lazy_static! {
    static ref NOISE: Vec<f32> = white_noise(SAMPLE_RATE as usize / 2, 0x9E37_79B9_7F4A_7C15);
}

#[test]
fn a440_is_detected() {
    init_logging();
    let mut detector = detector();
    let results = run(&mut detector, &sine(440.0, 0.5, 0.5));
    assert!(results.len() > 10);

    for estimate in &results {
        let estimate = estimate.expect("every frame of a clean sine yields an estimate");
        assert_eq!(estimate.note, NoteName::A);
        assert!((estimate.frequency - 440.0).abs() <= 2.0, "{}", estimate.frequency);
        assert!(estimate.confidence > 0.3);
    }
}

#[test]
fn silence_never_yields_a_note() {
    init_logging();
    let mut detector = detector();
    let silence = vec![0.0; SAMPLE_RATE as usize];
    let results = run(&mut detector, &silence);
    assert!(!results.is_empty());
    assert!(results.iter().all(Option::is_none));

    // below the noise gate
    let results = run(&mut detector, &sine(440.0, 0.001, 0.5));
    assert!(results.iter().all(Option::is_none));
}

#[test]
fn white_noise_yields_no_estimate() {
    init_logging();
    let mut detector = detector();
    let results = run(&mut detector, &NOISE);
    assert!(results.len() > 10);
    assert!(results.iter().all(Option::is_none), "{results:?}");
    assert!(detector.state().accepted_note().is_none());
}

#[test]
fn tone_after_noise_is_still_found() {
    init_logging();
    let mut detector = detector();
    run(&mut detector, &NOISE);
    let results = run(&mut detector, &sine(261.63, 0.4, 0.5));
    let last = results.last().copied().flatten().unwrap();
    assert_eq!(last.note, NoteName::C);
    assert!((last.frequency - 261.63).abs() <= 2.0);
}

#[test]
fn sines_converge_to_nearest_note() {
    init_logging();
    let cases: Vec<(f32, NoteName)> = vec![
        (82.41, NoteName::E),
        (110.0, NoteName::A),
        (146.83, NoteName::D),
        (196.0, NoteName::G),
        (246.94, NoteName::B),
        (277.18, NoteName::Cs),
        (311.13, NoteName::Ds),
        (349.23, NoteName::F),
        (369.99, NoteName::Fs),
        (415.30, NoteName::Gs),
        (466.16, NoteName::As),
        (659.25, NoteName::E),
        (1046.5, NoteName::C),
        (1567.98, NoteName::G),
        // slightly sharp of A4, still A
        (447.0, NoteName::A),
    ];
    let failures = Arc::new(Mutex::new(Vec::<String>::new()));

    cases.par_iter().for_each(|&(freq, note)| {
        let mut detector = detector();
        let results = run(&mut detector, &sine(freq, 0.5, 0.4));
        let last = results.last().copied().flatten();
        match last {
            Some(e) if e.note == note && (e.frequency - freq).abs() <= 2.0 => {}
            other => failures
                .lock()
                .unwrap()
                .push(format!("{freq} Hz: expected {note}, got {other:?}")),
        }
    });

    let failures = Arc::try_unwrap(failures).unwrap().into_inner().unwrap();
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn octaves_share_a_note() {
    init_logging();
    for base in [110.0f32, 123.47, 164.81] {
        let notes: Vec<NoteName> = [1.0f32, 2.0, 4.0]
            .iter()
            .map(|m| {
                let mut detector = detector();
                run(&mut detector, &sine(base * m, 0.5, 0.3))
                    .last()
                    .copied()
                    .flatten()
                    .unwrap()
                    .note
            })
            .collect();
        assert!(notes.windows(2).all(|w| w[0] == w[1]), "{base}: {notes:?}");
    }
}

#[test]
fn sweep_changes_note_once_at_boundary() {
    init_logging();
    let (f0, f1, seconds) = (420.0f32, 435.0f32, 2.0f32);
    let mut detector = detector();
    let hop = detector.hop_size();
    let fft = detector.fft_size();
    let results = run(&mut detector, &sweep(f0, f1, seconds));

    let notes: Vec<NoteName> = results
        .iter()
        .map(|r| r.expect("sweep frames are all pitched").note)
        .collect();
    assert_eq!(notes.first(), Some(&NoteName::Gs));
    assert_eq!(notes.last(), Some(&NoteName::A));

    let changes: Vec<usize> = (1..notes.len())
        .filter(|&i| notes[i] != notes[i - 1])
        .collect();
    assert_eq!(changes.len(), 1, "{notes:?}");

    // instantaneous frequency at the centre of the frame that switched
    let centre = (changes[0] * hop + fft / 2) as f32 / SAMPLE_RATE;
    let freq_at_switch = f0 + (f1 - f0) * centre / seconds;
    // equal-tempered G#/A boundary is 427.47 Hz
    assert!(
        (426.0..=429.5).contains(&freq_at_switch),
        "switched at {freq_at_switch} Hz"
    );
}

#[test]
fn smoothing_settles_on_constant_input() {
    init_logging();
    let mut detector = detector();
    run(&mut detector, &sine(523.25, 0.5, 0.3));
    let results = run(&mut detector, &sine(392.0, 0.5, 0.6));
    let last = results.last().copied().flatten().unwrap();
    assert_eq!(last.note, NoteName::G);
    assert!((last.frequency - 392.0).abs() <= 2.0, "{}", last.frequency);
    let smoothed = detector.state().smoothed_frequency().unwrap();
    assert_eq!(smoothed, last.frequency);
}
