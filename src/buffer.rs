use std::time::Duration;

use crate::error::{AnalysisError, Result};

/// Mono audio handed to the engine by whoever decoded it. Never mutated; every
/// stage that changes the signal builds a new buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidInput(
                "sample rate must be positive".to_string(),
            ));
        }
        if let Some(i) = samples.iter().position(|x| !x.is_finite()) {
            return Err(AnalysisError::InvalidInput(format!(
                "sample {} is not a finite number",
                i
            )));
        }
        Ok(SampleBuffer {
            samples,
            sample_rate,
        })
    }

    /// Averages interleaved channels down to one.
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(AnalysisError::InvalidInput(
                "channel count must be positive".to_string(),
            ));
        }
        let mono = interleaved
            .chunks_exact(channels)
            .map(|x| x.iter().sum::<f32>() / x.len() as f32)
            .collect();
        Self::new(mono, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> SampleBuffer {
        SampleBuffer {
            samples: self.samples[start..end].to_vec(),
            sample_rate: self.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_rate_and_nan() {
        assert!(SampleBuffer::new(vec![0.0; 4], 0).is_err());
        assert!(SampleBuffer::new(vec![0.0, f32::NAN], 44100).is_err());
    }

    #[test]
    fn downmixes_interleaved() {
        let buf = SampleBuffer::from_interleaved(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, 8000).unwrap();
        assert_eq!(buf.samples(), &[0.5, 0.5, 0.0]);
        assert_eq!(buf.sample_rate(), 8000);
    }

    #[test]
    fn duration_follows_rate() {
        let buf = SampleBuffer::new(vec![0.0; 22050 * 3], 22050).unwrap();
        assert_ulps_eq!(buf.duration_seconds(), 3.0);
        assert_eq!(buf.duration(), Duration::from_secs(3));
    }
}
