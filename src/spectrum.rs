//! Spectrum
//!
//! Hann-windowed magnitude spectrum of a fixed-size real frame.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::{f32::consts::PI, sync::Arc};

/// Hann window of length `n`: `0.5 - 0.5 * cos(2πi / (n - 1))`.
pub fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / denom).cos())
        .collect()
}

/// Windowed spectral analyzer with a transform plan owned for its whole lifetime.
///
/// All buffers are allocated in [`SpectralAnalyzer::new`]; [`SpectralAnalyzer::analyze`]
/// does not allocate.
pub struct SpectralAnalyzer {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
}

impl SpectralAnalyzer {
    /// Plan a forward transform of `fft_size` points.
    ///
    /// `fft_size` is expected to be a power of two; callers validate it
    /// (see [`crate::PitchDetectorBuilder::build`]).
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        SpectralAnalyzer {
            fft_size,
            fft,
            window: hann_window(fft_size),
            fft_buffer: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
            scratch: vec![Complex { re: 0.0, im: 0.0 }; scratch_len],
            magnitude: vec![0.0; fft_size / 2],
        }
    }

    /// Number of points in the transform.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced per frame (`fft_size / 2`).
    pub fn bins(&self) -> usize {
        self.magnitude.len()
    }

    /// Magnitude spectrum of `frame`.
    ///
    /// Frames shorter than the FFT size are zero padded on the right, longer
    /// frames are truncated. Bin `k` corresponds to `k * sample_rate / fft_size` Hz.
    pub fn analyze(&mut self, frame: &[f32]) -> &[f32] {
        let n = frame.len().min(self.fft_size);
        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            let sample = if i < n { frame[i] } else { 0.0 };
            slot.re = sample * self.window[i];
            slot.im = 0.0;
        }

        self.fft.process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        for (mag, c) in self.magnitude.iter_mut().zip(&self.fft_buffer) {
            *mag = (c.re * c.re + c.im * c.im).sqrt();
        }
        &self.magnitude
    }
}
