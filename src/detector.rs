//! Pitch Detector
//!
//! Streaming driver: accumulates arbitrarily sized sample chunks into a sliding
//! analysis window and runs the spectral analyzer and pitch estimator once per hop.

use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::{
    estimator::{DetectionState, EstimatorConfig, PitchEstimate, PitchEstimator},
    spectrum::SpectralAnalyzer,
};

/// Errors returned when constructing or feeding a [`PitchDetector`].
#[derive(Debug, Error)]
pub enum DetectorError {
    /// A construction parameter is out of range.
    #[error("invalid argument `{arg}`: {msg}")]
    InvalidArgument {
        /// The name of the invalid argument.
        arg: &'static str,
        /// A description of the problem.
        msg: String,
    },

    /// A chunk was captured at a different rate than the detector was built for.
    #[error("expected samples at {expected} Hz, got {got} Hz")]
    SampleRateMismatch {
        /// The sample rate the detector was built with.
        expected: f32,
        /// The sample rate of the offending chunk.
        got: f32,
    },
}

/// Mono samples together with the rate they were captured at.
#[derive(Debug, Copy, Clone)]
pub struct SampleChunk<'a> {
    /// Amplitude samples, oldest first.
    pub samples: &'a [f32],
    /// Capture rate in Hz.
    pub sample_rate: f32,
}

impl<'a> SampleChunk<'a> {
    /// Wrap `samples` captured at `sample_rate` Hz.
    pub fn new(samples: &'a [f32], sample_rate: f32) -> Self {
        SampleChunk {
            samples,
            sample_rate,
        }
    }
}

/// Builder for a [`PitchDetector`].
pub struct PitchDetectorBuilder {
    sample_rate: f32,
    fft_size: usize,
    hop_size: Option<usize>,
    config: EstimatorConfig,
}

impl PitchDetectorBuilder {
    /// Start with default parameters:
    /// sample_rate = 44_100, fft_size = 4096, hop_size = fft_size / 4,
    /// and the thresholds of [`EstimatorConfig::default`].
    pub fn new() -> Self {
        PitchDetectorBuilder {
            sample_rate: 44_100.0,
            fft_size: 4096,
            hop_size: None,
            config: EstimatorConfig::default(),
        }
    }

    /// Set the sample rate of the incoming audio in Hz.
    pub fn sample_rate(mut self, rate: f32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the analysis window length; must be a power of two.
    pub fn fft_size(mut self, size: usize) -> Self {
        self.fft_size = size;
        self
    }

    /// Set how many samples the window advances between analyses.
    pub fn hop_size(mut self, hop: usize) -> Self {
        self.hop_size = Some(hop);
        self
    }

    /// Set the length of the median smoothing history.
    pub fn history_size(mut self, n: usize) -> Self {
        self.config.history_size = n;
        self
    }

    /// Set the exponential smoothing weight, in `(0, 1]`.
    pub fn smoothing_alpha(mut self, alpha: f32) -> Self {
        self.config.smoothing_alpha = alpha;
        self
    }

    /// Set the RMS level at or below which frames count as silence.
    pub fn noise_threshold(mut self, threshold: f32) -> Self {
        self.config.noise_threshold = threshold;
        self
    }

    /// Set the lower edge of the peak search band in Hz.
    pub fn min_frequency(mut self, hz: f32) -> Self {
        self.config.min_frequency = hz;
        self
    }

    /// Set the upper edge of the peak search band in Hz.
    pub fn max_frequency(mut self, hz: f32) -> Self {
        self.config.max_frequency = hz;
        self
    }

    /// Set the exclusive range a refined frequency must fall in.
    pub fn accepted_range(mut self, min_hz: f32, max_hz: f32) -> Self {
        self.config.accept_min = min_hz;
        self.config.accept_max = max_hz;
        self
    }

    /// Set the minimum time between two reported note changes.
    pub fn note_hold(mut self, hold: Duration) -> Self {
        self.config.note_hold = hold;
        self
    }

    /// Set the confidence reported while a note change is held back.
    pub fn held_confidence(mut self, confidence: f32) -> Self {
        self.config.held_confidence = confidence;
        self
    }

    /// Set the minimum peak-to-mean ratio for a frame to be reported.
    pub fn snr_floor(mut self, floor: f32) -> Self {
        self.config.snr_floor = floor;
        self
    }

    /// Replace all estimator thresholds at once.
    pub fn estimator_config(mut self, config: EstimatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Finalize and create the detector.
    pub fn build(self) -> Result<PitchDetector, DetectorError> {
        if self.fft_size < 4 || !self.fft_size.is_power_of_two() {
            return Err(DetectorError::InvalidArgument {
                arg: "fft_size",
                msg: format!("must be a power of two >= 4, got {}", self.fft_size),
            });
        }
        let hop_size = self.hop_size.unwrap_or(self.fft_size / 4);
        if hop_size == 0 || hop_size > self.fft_size {
            return Err(DetectorError::InvalidArgument {
                arg: "hop_size",
                msg: format!("must be in 1..={}, got {hop_size}", self.fft_size),
            });
        }

        let estimator = PitchEstimator::new(self.config, self.sample_rate, self.fft_size)?;
        let state = estimator.new_state();

        debug!(
            "pitch detector: {} Hz, fft {} hop {}, search bins {:?}, {:?}",
            self.sample_rate,
            self.fft_size,
            hop_size,
            estimator.search_band(),
            estimator.config()
        );

        Ok(PitchDetector {
            // holds a full window plus one hop-sized chunk; larger chunks grow it once
            window: Vec::with_capacity(self.fft_size + hop_size),
            fft_size: self.fft_size,
            hop_size,
            sample_rate: self.sample_rate,
            frames_analyzed: 0,
            analyzer: SpectralAnalyzer::new(self.fft_size),
            estimator,
            state,
        })
    }
}

impl Default for PitchDetectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming monophonic pitch detector.
///
/// Owns its transform plan, analysis window and [`DetectionState`]; create one
/// per audio stream and drive it from a single thread.
pub struct PitchDetector {
    window: Vec<f32>,
    fft_size: usize,
    hop_size: usize,
    sample_rate: f32,
    frames_analyzed: u64,
    analyzer: SpectralAnalyzer,
    estimator: PitchEstimator,
    state: DetectionState,
}

impl PitchDetector {
    /// Start customizing with a builder.
    pub fn builder() -> PitchDetectorBuilder {
        PitchDetectorBuilder::new()
    }

    /// Sample rate the detector was built for.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Analysis window length.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Samples the window advances per analysis.
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Samples currently buffered and not yet dropped by a hop.
    pub fn buffered(&self) -> usize {
        self.window.len()
    }

    /// Number of frames analysed since construction or the last [`reset`](Self::reset).
    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed
    }

    /// Smoothing and debounce state.
    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// Append `samples` and return the estimates for every full window.
    ///
    /// Each item corresponds to one analysed frame: `Some(estimate)` or `None`
    /// when the frame was rejected. Analysis happens lazily as the iterator is
    /// advanced; dropping it analyses the remaining windows and discards their
    /// results, so the buffer never holds more than `fft_size - 1` samples
    /// between pushes.
    pub fn push(&mut self, samples: &[f32]) -> Estimates<'_> {
        self.window.extend_from_slice(samples);
        Estimates { detector: self }
    }

    /// Like [`push`](Self::push), but checks the chunk's sample rate first.
    pub fn push_chunk(
        &mut self,
        chunk: &SampleChunk<'_>,
    ) -> Result<Estimates<'_>, DetectorError> {
        if chunk.sample_rate != self.sample_rate {
            return Err(DetectorError::SampleRateMismatch {
                expected: self.sample_rate,
                got: chunk.sample_rate,
            });
        }
        Ok(self.push(chunk.samples))
    }

    /// Drop buffered audio and all temporal state.
    pub fn reset(&mut self) {
        self.window.clear();
        self.frames_analyzed = 0;
        self.state.reset();
    }

    /// Stream time of the first sample of the next frame.
    fn frame_time(&self) -> Duration {
        let start = self.frames_analyzed as f64 * self.hop_size as f64;
        Duration::from_secs_f64(start / self.sample_rate as f64)
    }

    fn analyze_next(&mut self) -> Option<Option<PitchEstimate>> {
        if self.window.len() < self.fft_size {
            return None;
        }

        let timestamp = self.frame_time();
        let frame = &self.window[..self.fft_size];
        let spectrum = self.analyzer.analyze(frame);
        let estimate = self
            .estimator
            .estimate(spectrum, frame, timestamp, &mut self.state);

        self.window.drain(..self.hop_size);
        self.frames_analyzed += 1;
        Some(estimate)
    }
}

/// Lazy per-frame results of one [`PitchDetector::push`].
///
/// Frames not consumed before the iterator is dropped are still analysed, so
/// the smoothing and debounce state sees every frame.
#[must_use = "dropping the iterator discards the estimates of this push"]
pub struct Estimates<'a> {
    detector: &'a mut PitchDetector,
}

impl Iterator for Estimates<'_> {
    type Item = Option<PitchEstimate>;

    fn next(&mut self) -> Option<Self::Item> {
        self.detector.analyze_next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let d = &self.detector;
        let n = if d.window.len() < d.fft_size {
            0
        } else {
            (d.window.len() - d.fft_size) / d.hop_size + 1
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for Estimates<'_> {}

impl Drop for Estimates<'_> {
    fn drop(&mut self) {
        while self.detector.analyze_next().is_some() {}
    }
}
