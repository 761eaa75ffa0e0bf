//! Harmonic/percussive separation by median filtering.
//!
//! Harmonic energy is smooth along time, percussive energy is smooth along
//! frequency. Median-filtering the magnitude grid along each axis gives an
//! estimate of both, and a soft mask built from the two splits the original
//! spectra. Only the percussive part is resynthesized since that is what the
//! onset stages want.

use rayon::prelude::*;
use rustfft::num_complex::Complex64;

use super::math;
use super::stft::{SpectralGrid, Stft};
use crate::buffer::SampleBuffer;
use crate::error::Result;

/// Soft masks with the same shape as the grid they came from (frame-major).
pub struct Masks {
    pub harmonic: Vec<Vec<f64>>,
    pub percussive: Vec<Vec<f64>>,
}

/// `x^p / (x^p + reference^p)`, zero where both are zero.
fn soft_mask(x: f64, reference: f64, power: f64) -> f64 {
    let z = x.max(reference);
    if z <= f64::MIN_POSITIVE {
        return 0.0;
    }
    let m = (x / z).powf(power);
    let r = (reference / z).powf(power);
    m / (m + r)
}

pub fn masks(grid: &SpectralGrid, kernel: usize, power: f64) -> Masks {
    let n_frames = grid.n_frames();
    let n_bins = grid.n_bins();

    // Along time, one row per bin.
    let harmonic_by_bin: Vec<Vec<f64>> = (0..n_bins)
        .into_par_iter()
        .map(|k| {
            let row: Vec<f64> = (0..n_frames).map(|t| grid.get(k, t)).collect();
            math::median_filter(&row, kernel)
        })
        .collect();

    // Along frequency, one column per frame.
    let percussive: Vec<Vec<f64>> = grid
        .frames()
        .par_iter()
        .map(|frame| math::median_filter(frame, kernel))
        .collect();

    let (harmonic_mask, percussive_mask): (Vec<Vec<f64>>, Vec<Vec<f64>>) = (0..n_frames)
        .map(|t| {
            (0..n_bins)
                .map(|k| {
                    let h = harmonic_by_bin[k][t];
                    let p = percussive[t][k];
                    (soft_mask(h, p, power), soft_mask(p, h, power))
                })
                .unzip::<f64, f64, Vec<f64>, Vec<f64>>()
        })
        .unzip();

    Masks {
        harmonic: harmonic_mask,
        percussive: percussive_mask,
    }
}

fn apply(spectra: &[Vec<Complex64>], mask: &[Vec<f64>]) -> Vec<Vec<Complex64>> {
    spectra
        .iter()
        .zip(mask.iter())
        .map(|(frame, gains)| {
            frame
                .iter()
                .zip(gains.iter())
                .map(|(c, g)| *c * *g)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Percussive component of `buffer`, same length and sample rate.
pub fn percussive(buffer: &SampleBuffer, stft: &Stft, kernel: usize, power: f64) -> Result<SampleBuffer> {
    let spectra = stft.spectra(buffer)?;
    let grid = stft.grid(&spectra, buffer.sample_rate());

    log::debug!(
        "HPSS: {} frames x {} bins, kernel={}, power={:.1}",
        grid.n_frames(),
        grid.n_bins(),
        kernel,
        power
    );

    let masks = masks(&grid, kernel, power);
    let masked = apply(&spectra, &masks.percussive);
    let samples = stft
        .inverse(&masked, buffer.len())
        .into_iter()
        .map(|x| x as f32)
        .collect();

    SampleBuffer::new(samples, buffer.sample_rate())
}
