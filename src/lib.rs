//! # mono_pitch
//!
//! Real-time monophonic pitch detection: estimate the dominant fundamental
//! frequency of a continuous audio stream, map it to the nearest note name and
//! report a confidence score, while suppressing silence, noise and jitter.
//!
//! ## Example
//! ```rust
//! use mono_pitch::PitchDetector;
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Build a detector for the capture rate
//!     let mut detector = PitchDetector::builder()
//!         .sample_rate(44_100.0)
//!         .fft_size(4096)
//!         .build()?;
//!
//!     // 2) In your audio callback, push whatever the device delivers:
//!     let chunk: Vec<f32> = vec![0.0; 512]; // fill with actual samples
//!     for estimate in detector.push(&chunk).flatten() {
//!         if estimate.confidence > 0.3 {
//!             println!(
//!                 "{} at {:.1} Hz (confidence {:.2})",
//!                 estimate.note, estimate.frequency, estimate.confidence
//!             );
//!         }
//!     }
//!
//!     Ok(())
//! }
//! # run().unwrap();
//! ```
//!
//! Estimates meant for another thread go through [`handoff::slot`], which
//! keeps only the latest value.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// Streaming detector API.
pub use detector::{DetectorError, Estimates, PitchDetector, PitchDetectorBuilder, SampleChunk};

/// Per-frame estimation.
pub use estimator::{DetectionState, EstimatorConfig, PitchEstimate, PitchEstimator};

/// Pitch classes.
pub use note::NoteName;

/// Windowed magnitude spectrum.
pub use spectrum::SpectralAnalyzer;

/// Streaming buffer driver.
pub mod detector;

/// Spectrum-to-pitch estimation with smoothing and debounce.
pub mod estimator;

/// Latest-value handoff between threads.
pub mod handoff;

/// Frequency to note-name mapping.
pub mod note;

/// Hann-windowed FFT analysis.
pub mod spectrum;
