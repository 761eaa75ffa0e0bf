use crate::dsp::math::{self, NormalizeType};
use crate::dsp::stft::{frame_to_time, SpectralGrid};

/// Onset strength per analysis frame. Never negative.
#[derive(Clone, Debug, PartialEq)]
pub struct OnsetEnvelope {
    values: Vec<f64>,
    frame_length: usize,
    hop_length: usize,
    sample_rate: u32,
}

impl OnsetEnvelope {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Envelope samples per second.
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_length as f64
    }

    pub fn frame_to_time(&self, frame: usize) -> f64 {
        frame_to_time(frame, self.frame_length, self.hop_length, self.sample_rate)
    }

    /// True when there is nothing to track: no frames or no flux at all.
    pub fn is_degenerate(&self) -> bool {
        self.values.iter().all(|v| *v <= 0.0)
    }
}

/// Positive spectral flux: for every frame, the sum over bins of how much each
/// magnitude grew since the previous frame. The first frame has no predecessor
/// and scores zero.
///
/// With `log_compression > 0` magnitudes are mapped through
/// `ln(1 + log_compression * m)` first, which keeps quiet onsets visible next
/// to loud ones. With `normalize` the envelope is scaled to a peak of 1.
pub fn onset_strength(grid: &SpectralGrid, log_compression: f64, normalize: bool) -> OnsetEnvelope {
    let compress = |m: f64| {
        if log_compression > 0.0 {
            (log_compression * m).ln_1p()
        } else {
            m
        }
    };

    let mut previous: Vec<f64> = match grid.frames().first() {
        Some(first) => first.iter().map(|m| compress(*m)).collect(),
        None => Vec::new(),
    };

    let mut values = Vec::with_capacity(grid.n_frames());
    if grid.n_frames() > 0 {
        values.push(0.0);
    }
    for frame in grid.frames().iter().skip(1) {
        let flux = frame
            .iter()
            .zip(previous.iter_mut())
            .map(|(mag, prev)| {
                let current = compress(*mag);
                let rise = (current - *prev).max(0.0);
                *prev = current;
                rise
            })
            .sum::<f64>();
        values.push(flux);
    }

    if normalize {
        math::normalize(&mut values, NormalizeType::UnitMax);
    }

    log::debug!(
        "Onset envelope: {} frames, peak {:.4}",
        values.len(),
        math::max(&values).map_or(0.0, |(_, v)| v)
    );

    OnsetEnvelope {
        values,
        frame_length: grid.frame_length(),
        hop_length: grid.hop_length(),
        sample_rate: grid.sample_rate(),
    }
}

#[cfg(test)]
pub(crate) fn envelope_from_values(values: Vec<f64>, hop_length: usize, sample_rate: u32) -> OnsetEnvelope {
    OnsetEnvelope {
        values,
        frame_length: hop_length * 4,
        hop_length,
        sample_rate,
    }
}
