//! Pitch Estimator
//!
//! Turns one magnitude spectrum into a stabilised `(frequency, note, confidence)`
//! estimate: noise gate, band-limited peak search, parabolic refinement,
//! median + exponential smoothing, note mapping and note-hold debounce.

use std::{collections::VecDeque, ops::RangeInclusive, time::Duration};

use log::{debug, trace, warn};

use crate::{detector::DetectorError, note::NoteName};

/// SNR at which confidence saturates to 1.0.
const FULL_CONFIDENCE_SNR: f32 = 10.0;

/// Tunable thresholds for [`PitchEstimator`].
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Number of accepted frequencies kept for the median filter.
    pub history_size: usize,
    /// Weight of the new median in the exponential blend, in `(0, 1]`.
    /// Higher is more responsive, lower is steadier.
    pub smoothing_alpha: f32,
    /// Frames with an RMS amplitude at or below this are treated as silence.
    pub noise_threshold: f32,
    /// Lower edge of the peak search band in Hz.
    pub min_frequency: f32,
    /// Upper edge of the peak search band in Hz.
    pub max_frequency: f32,
    /// Refined frequencies must be strictly above this (Hz).
    pub accept_min: f32,
    /// Refined frequencies must be strictly below this (Hz).
    pub accept_max: f32,
    /// Minimum time between two note changes.
    pub note_hold: Duration,
    /// Confidence reported while a note change is being held back.
    pub held_confidence: f32,
    /// Frames whose peak-to-mean ratio in the search band is below this are rejected.
    pub snr_floor: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            history_size: 5,
            smoothing_alpha: 0.5,
            noise_threshold: 0.005,
            min_frequency: 80.0,
            max_frequency: 2000.0,
            accept_min: 20.0,
            accept_max: 4000.0,
            note_hold: Duration::from_millis(150),
            held_confidence: 0.8,
            snr_floor: 5.0,
        }
    }
}

impl EstimatorConfig {
    /// Check every threshold for a usable value.
    pub fn validate(&self) -> Result<(), DetectorError> {
        fn invalid(arg: &'static str, msg: &str) -> Result<(), DetectorError> {
            Err(DetectorError::InvalidArgument {
                arg,
                msg: msg.to_string(),
            })
        }

        if self.history_size == 0 {
            return invalid("history_size", "must be >= 1");
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return invalid("smoothing_alpha", "must be in (0, 1]");
        }
        if !(self.noise_threshold >= 0.0 && self.noise_threshold.is_finite()) {
            return invalid("noise_threshold", "must be a finite value >= 0");
        }
        if !(self.min_frequency > 0.0 && self.min_frequency < self.max_frequency) {
            return invalid("min_frequency", "must be > 0 and below max_frequency");
        }
        if !self.max_frequency.is_finite() {
            return invalid("max_frequency", "must be finite");
        }
        if !(0.0..self.accept_max).contains(&self.accept_min) {
            return invalid("accept_min", "must be >= 0 and below accept_max");
        }
        if !(0.0..=1.0).contains(&self.held_confidence) {
            return invalid("held_confidence", "must be in [0, 1]");
        }
        if !(self.snr_floor >= 0.0 && self.snr_floor.is_finite()) {
            return invalid("snr_floor", "must be a finite value >= 0");
        }
        Ok(())
    }
}

/// One detected pitch.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PitchEstimate {
    /// Smoothed fundamental frequency in Hz.
    pub frequency: f32,
    /// Nearest pitch class (or the held previous one, see [`EstimatorConfig::note_hold`]).
    pub note: NoteName,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Temporal state carried between frames by a single estimator.
#[derive(Debug, Clone)]
pub struct DetectionState {
    history: VecDeque<f32>,
    capacity: usize,
    sorted: Vec<f32>,
    last_smoothed: Option<f32>,
    accepted_note: Option<NoteName>,
    note_changed_at: Duration,
}

impl DetectionState {
    /// Empty state keeping up to `history_size` frequencies (at least one).
    pub fn new(history_size: usize) -> Self {
        let capacity = history_size.max(1);
        DetectionState {
            history: VecDeque::with_capacity(capacity),
            capacity,
            sorted: Vec::with_capacity(capacity),
            last_smoothed: None,
            accepted_note: None,
            note_changed_at: Duration::ZERO,
        }
    }

    /// Forget everything, keeping the allocated capacity.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_smoothed = None;
        self.accepted_note = None;
        self.note_changed_at = Duration::ZERO;
    }

    /// Last smoothed frequency, if any frame has been accepted.
    pub fn smoothed_frequency(&self) -> Option<f32> {
        self.last_smoothed
    }

    /// Note most recently accepted by the debounce.
    pub fn accepted_note(&self) -> Option<NoteName> {
        self.accepted_note
    }

    /// Recent raw frequencies, oldest first.
    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    fn smooth(&mut self, frequency: f32, alpha: f32) -> f32 {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(frequency);

        self.sorted.clear();
        self.sorted.extend(self.history.iter().copied());
        self.sorted.sort_unstable_by(f32::total_cmp);
        let median = median_of_sorted(&self.sorted);

        let smoothed = match self.last_smoothed {
            Some(prev) => alpha * median + (1.0 - alpha) * prev,
            None => median,
        };
        self.last_smoothed = Some(smoothed);
        smoothed
    }
}

/// Spectrum-to-pitch stage for a fixed sample rate and FFT size.
#[derive(Debug, Clone)]
pub struct PitchEstimator {
    config: EstimatorConfig,
    sample_rate: f32,
    fft_size: usize,
    band: Option<RangeInclusive<usize>>,
}

impl PitchEstimator {
    /// Validate `config` and precompute the peak search band.
    pub fn new(
        config: EstimatorConfig,
        sample_rate: f32,
        fft_size: usize,
    ) -> Result<Self, DetectorError> {
        config.validate()?;
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(DetectorError::InvalidArgument {
                arg: "sample_rate",
                msg: format!("must be a finite value > 0, got {sample_rate}"),
            });
        }
        if fft_size < 4 {
            return Err(DetectorError::InvalidArgument {
                arg: "fft_size",
                msg: format!("must be >= 4, got {fft_size}"),
            });
        }

        let bins = fft_size / 2;
        let per_hz = fft_size as f32 / sample_rate;
        let lo = (config.min_frequency * per_hz).floor() as usize;
        let hi = ((config.max_frequency * per_hz).ceil() as usize).min(bins - 1);
        let band = if lo <= hi {
            Some(lo..=hi)
        } else {
            warn!(
                "search band {}-{} Hz is empty at {} Hz / {} points; no pitch will be reported",
                config.min_frequency, config.max_frequency, sample_rate, fft_size
            );
            None
        };

        Ok(PitchEstimator {
            config,
            sample_rate,
            fft_size,
            band,
        })
    }

    /// Thresholds in use.
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Bins searched for the fundamental, `None` when the band is empty.
    pub fn search_band(&self) -> Option<RangeInclusive<usize>> {
        self.band.clone()
    }

    /// Fresh state sized for this estimator's history.
    pub fn new_state(&self) -> DetectionState {
        DetectionState::new(self.config.history_size)
    }

    /// Frequency in Hz of a (possibly fractional) bin.
    pub fn bin_frequency(&self, bin: f32) -> f32 {
        bin * self.sample_rate / self.fft_size as f32
    }

    /// Estimate the pitch of one frame.
    ///
    /// `spectrum` is the magnitude spectrum of `frame`, `timestamp` the stream
    /// time of the frame used for the note hold. Returns `None` for every
    /// rejected frame; `state` is only updated by frames that get past the
    /// gate, band, boundary, SNR and range checks.
    pub fn estimate(
        &self,
        spectrum: &[f32],
        frame: &[f32],
        timestamp: Duration,
        state: &mut DetectionState,
    ) -> Option<PitchEstimate> {
        let level = rms(frame);
        if level <= self.config.noise_threshold {
            trace!("rejected: rms {level:.5} at or below noise gate");
            return None;
        }

        let Some(band) = &self.band else {
            trace!("rejected: empty search band");
            return None;
        };
        let lo = *band.start();
        let hi = (*band.end()).min(spectrum.len().saturating_sub(1));
        if spectrum.is_empty() || lo > hi {
            trace!("rejected: search band outside spectrum");
            return None;
        }

        let searched = &spectrum[lo..=hi];
        let (offset, &peak_mag) = searched
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        let peak = lo + offset;

        if peak == 0 || peak + 1 >= spectrum.len() {
            trace!("rejected: peak on spectrum boundary (bin {peak})");
            return None;
        }

        let mean = searched.iter().sum::<f32>() / searched.len() as f32;
        if mean <= f32::EPSILON {
            trace!("rejected: empty spectrum");
            return None;
        }
        let snr = peak_mag / mean;
        if snr < self.config.snr_floor {
            trace!("rejected: snr {snr:.2} below floor {}", self.config.snr_floor);
            return None;
        }

        let refined = peak as f32
            + parabolic_offset(spectrum[peak - 1], peak_mag, spectrum[peak + 1]);
        let frequency = self.bin_frequency(refined);
        if !(frequency > self.config.accept_min && frequency < self.config.accept_max) {
            trace!("rejected: {frequency:.1} Hz outside accepted range");
            return None;
        }

        let smoothed = state.smooth(frequency, self.config.smoothing_alpha);
        let note = NoteName::from_frequency(smoothed)?;

        match state.accepted_note {
            Some(prev) if prev == note => {}
            Some(prev)
                if timestamp.saturating_sub(state.note_changed_at) < self.config.note_hold =>
            {
                trace!("holding {prev} over {note} at {smoothed:.1} Hz");
                return Some(PitchEstimate {
                    frequency: smoothed,
                    note: prev,
                    confidence: self.config.held_confidence,
                });
            }
            _ => {
                debug!("note {note} at {smoothed:.1} Hz ({:.3}s)", timestamp.as_secs_f32());
                state.accepted_note = Some(note);
                state.note_changed_at = timestamp;
            }
        }

        Some(PitchEstimate {
            frequency: smoothed,
            note,
            confidence: confidence_from_snr(snr),
        })
    }
}

/// Root mean square amplitude; 0.0 for an empty frame.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Sub-bin offset of a peak from its magnitude and its two neighbours.
///
/// Falls back to 0.0 when the three points are (numerically) collinear.
pub fn parabolic_offset(alpha: f32, beta: f32, gamma: f32) -> f32 {
    let denom = alpha - 2.0 * beta + gamma;
    if denom.abs() <= f32::EPSILON {
        return 0.0;
    }
    let p = 0.5 * (alpha - gamma) / denom;
    if p.is_finite() {
        p
    } else {
        0.0
    }
}

/// Map a peak-to-mean ratio onto `[0, 1]`.
pub fn confidence_from_snr(snr: f32) -> f32 {
    ((snr - 1.0) / (FULL_CONFIDENCE_SNR - 1.0)).clamp(0.0, 1.0)
}

fn median_of_sorted(sorted: &[f32]) -> f32 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}
