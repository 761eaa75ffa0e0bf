use std::sync::Arc;

use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::buffer::SampleBuffer;
use crate::config::WindowKind;
use crate::error::{AnalysisError, Result};

/// Overlap-add positions whose summed squared window falls below this are
/// divided by it instead, so the unreliable edges can only shrink.
const WINDOW_SUM_FLOOR: f64 = 1e-3;

/// Frames that fit entirely inside `samples`. A partial frame at the end is
/// dropped, never padded.
pub fn frame_count(samples: usize, frame_length: usize, hop_length: usize) -> usize {
    if samples < frame_length {
        0
    } else {
        (samples - frame_length) / hop_length + 1
    }
}

/// Time of the centre of frame `frame`, in seconds from the start of the buffer.
pub fn frame_to_time(frame: usize, frame_length: usize, hop_length: usize, sample_rate: u32) -> f64 {
    (frame * hop_length + frame_length / 2) as f64 / sample_rate as f64
}

/// Magnitudes of the non-negative frequency bins, one row per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralGrid {
    magnitudes: Vec<Vec<f64>>,
    frame_length: usize,
    hop_length: usize,
    sample_rate: u32,
}

impl SpectralGrid {
    pub fn n_frames(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn n_bins(&self) -> usize {
        self.frame_length / 2 + 1
    }

    pub fn get(&self, bin: usize, frame: usize) -> f64 {
        self.magnitudes[frame][bin]
    }

    pub fn frame(&self, frame: usize) -> &[f64] {
        &self.magnitudes[frame]
    }

    pub fn frames(&self) -> &[Vec<f64>] {
        &self.magnitudes
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Centre frequency of every bin, in Hz.
    pub fn frequencies(&self) -> Vec<f64> {
        let step = self.sample_rate as f64 / self.frame_length as f64;
        (0..self.n_bins()).map(|k| k as f64 * step).collect()
    }

    pub fn frame_times(&self) -> Vec<f64> {
        (0..self.n_frames())
            .map(|t| frame_to_time(t, self.frame_length, self.hop_length, self.sample_rate))
            .collect()
    }

    pub fn max_magnitude(&self) -> f64 {
        self.magnitudes
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }
}

/// Short-time Fourier transform over fixed frames, forward and back.
pub struct Stft {
    frame_length: usize,
    half_size: usize,
    hop: usize,
    window: Vec<f64>,

    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Stft {
    pub fn new(frame_length: usize, hop: usize, window: WindowKind) -> Self {
        assert!(frame_length.is_power_of_two());
        assert!(hop > 0);

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(frame_length);
        let inverse = planner.plan_fft_inverse(frame_length);

        Stft {
            frame_length,
            half_size: frame_length / 2 + 1,
            hop,
            window: window.coefficients(frame_length),

            forward,
            inverse,
        }
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Complex half spectra (`frame_length / 2 + 1` bins) of every full frame.
    /// Frames are transformed in parallel and returned in frame order.
    pub fn spectra(&self, buffer: &SampleBuffer) -> Result<Vec<Vec<Complex64>>> {
        let samples = buffer.samples();
        let n_frames = frame_count(samples.len(), self.frame_length, self.hop);
        if n_frames == 0 {
            return Err(AnalysisError::InsufficientAudio {
                samples: samples.len(),
                frame_length: self.frame_length,
            });
        }

        log::debug!(
            "STFT: {} samples, frame={}, hop={}, {} frames",
            samples.len(),
            self.frame_length,
            self.hop,
            n_frames
        );

        let spectra: Vec<Vec<Complex64>> = (0..n_frames)
            .into_par_iter()
            .map_init(
                || vec![Complex64::default(); self.forward.get_inplace_scratch_len()],
                |scratch, t| {
                    let start = t * self.hop;
                    let mut freq: Vec<Complex64> = samples[start..start + self.frame_length]
                        .iter()
                        .zip(self.window.iter())
                        .map(|(x, w)| Complex64::new(*x as f64 * w, 0.0))
                        .collect();
                    self.forward.process_with_scratch(&mut freq, scratch);
                    freq.truncate(self.half_size);
                    freq
                },
            )
            .collect();
        Ok(spectra)
    }

    pub fn magnitudes(&self, buffer: &SampleBuffer) -> Result<SpectralGrid> {
        let spectra = self.spectra(buffer)?;
        Ok(self.grid(&spectra, buffer.sample_rate()))
    }

    pub fn grid(&self, spectra: &[Vec<Complex64>], sample_rate: u32) -> SpectralGrid {
        let magnitudes: Vec<Vec<f64>> = spectra
            .par_iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect::<Vec<_>>())
            .collect();
        SpectralGrid {
            magnitudes,
            frame_length: self.frame_length,
            hop_length: self.hop,
            sample_rate,
        }
    }

    /// Weighted overlap-add resynthesis of half spectra into `output_len` samples.
    /// Samples past the last frame stay zero.
    pub fn inverse(&self, spectra: &[Vec<Complex64>], output_len: usize) -> Vec<f64> {
        let mut output = vec![0.0; output_len];
        let mut window_sum = vec![0.0; output_len];

        let mut freq = vec![Complex64::default(); self.frame_length];
        let mut scratch = vec![Complex64::default(); self.inverse.get_inplace_scratch_len()];
        let scale = 1.0 / self.frame_length as f64;

        for (t, spectrum) in spectra.iter().enumerate() {
            assert_eq!(spectrum.len(), self.half_size);

            // rebuild the negative frequencies from the conjugate-symmetric half
            freq[..self.half_size].copy_from_slice(spectrum);
            for k in self.half_size..self.frame_length {
                freq[k] = spectrum[self.frame_length - k].conj();
            }
            self.inverse.process_with_scratch(&mut freq, &mut scratch);

            let start = t * self.hop;
            let end = (start + self.frame_length).min(output_len);
            for (i, n) in (start..end).enumerate() {
                output[n] += freq[i].re * scale * self.window[i];
                window_sum[n] += self.window[i] * self.window[i];
            }
        }

        output
            .iter_mut()
            .zip(window_sum.iter())
            .for_each(|(y, w)| *y /= w.max(WINDOW_SUM_FLOOR));
        output
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> SampleBuffer {
        let samples = (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin() as f32)
            .collect();
        SampleBuffer::new(samples, sample_rate).unwrap()
    }

    #[test]
    fn grid_shape() {
        let stft = Stft::new(2048, 512, WindowKind::Hann);
        let grid = stft.magnitudes(&sine(440.0, 22050, 10000)).unwrap();

        assert_eq!(grid.n_frames(), (10000 - 2048) / 512 + 1);
        assert_eq!(grid.n_bins(), 1025);
        assert!(grid.frames().iter().all(|f| f.len() == 1025));
        assert_eq!(grid.frequencies().len(), 1025);
        assert_eq!(grid.frame_times().len(), grid.n_frames());
    }

    #[test]
    fn exact_frame_fit() {
        let stft = Stft::new(256, 64, WindowKind::Hann);
        let grid = stft.magnitudes(&sine(100.0, 8000, 256)).unwrap();
        assert_eq!(grid.n_frames(), 1);
    }

    #[test]
    fn short_buffer_is_insufficient() {
        let stft = Stft::new(2048, 512, WindowKind::Hann);
        let err = stft.magnitudes(&sine(440.0, 22050, 2047)).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InsufficientAudio {
                samples: 2047,
                frame_length: 2048
            }
        );
    }

    #[test]
    fn sine_lands_in_its_bin() {
        // bin 10 of a 256-point transform at 8 kHz
        let freq = 10.0 * 8000.0 / 256.0;
        let stft = Stft::new(256, 64, WindowKind::Hann);
        let grid = stft.magnitudes(&sine(freq, 8000, 4096)).unwrap();

        for t in 0..grid.n_frames() {
            let peak = grid
                .frame(t)
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(k, _)| k);
            assert_eq!(peak, Some(10));
        }
        assert_ulps_eq!(grid.frequencies()[10], freq);
    }

    #[test]
    fn frame_times_use_frame_centres() {
        assert_ulps_eq!(frame_to_time(0, 2048, 512, 22050), 1024.0 / 22050.0);
        assert_ulps_eq!(frame_to_time(4, 2048, 512, 22050), 3072.0 / 22050.0);
    }

    #[test]
    fn inverse_reconstructs_interior() {
        let buffer = sine(523.0, 8000, 4096);
        let stft = Stft::new(256, 64, WindowKind::Hann);
        let spectra = stft.spectra(&buffer).unwrap();
        let rebuilt = stft.inverse(&spectra, buffer.len());

        assert_eq!(rebuilt.len(), buffer.len());
        for n in 256..(4096 - 256) {
            assert_abs_diff_eq!(rebuilt[n], buffer.samples()[n] as f64, epsilon = 1e-4);
        }
    }
}
