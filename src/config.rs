use std::path::Path;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::Deserialize;

use crate::error::{AnalysisError, Result};

/// Smoothing window applied to every analysis frame.
#[derive(FromPrimitive, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann = 0,
    Hamming = 1,
    Blackman = 2,
    Triangular = 3,
    Rectangular = 4,
}

impl WindowKind {
    /// Window for a numeric code, as passed across the wasm boundary.
    pub fn from_code(code: u8) -> Result<Self> {
        WindowKind::from_u8(code)
            .ok_or_else(|| AnalysisError::InvalidConfig(format!("unknown window code {}", code)))
    }

    pub fn coefficients(self, size: usize) -> Vec<f64> {
        match self {
            WindowKind::Hann => apodize::hanning_iter(size).collect(),
            WindowKind::Hamming => apodize::hamming_iter(size).collect(),
            WindowKind::Blackman => apodize::blackman_iter(size).collect(),
            WindowKind::Triangular => apodize::triangular_iter(size).collect(),
            WindowKind::Rectangular => vec![1.0; size],
        }
    }
}

/// Every tunable of an analysis run. One engine covers the plain, separated and
/// trimmed variants through the flags below.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Samples per analysis frame. Must be a power of two.
    pub frame_length: usize,
    /// Samples advanced between frames.
    pub hop_length: usize,
    pub window: WindowKind,

    /// Lowest tempo considered, in bpm.
    pub min_tempo: f64,
    /// Tempo search ceiling, in bpm.
    pub max_tempo: f64,
    /// Centre of the log-normal tempo prior.
    pub start_bpm: f64,
    /// Width of the tempo prior in octaves.
    pub prior_std_octaves: f64,
    /// Length of each autocorrelation window.
    pub tempo_window_seconds: f64,

    /// How strongly the beat tracker sticks to the tempo prior.
    pub tightness: f64,
    /// Drop weak beats at the start and end of the track.
    pub trim_beats: bool,

    /// Gain for `ln(1 + gain * magnitude)` before the flux. Zero disables compression.
    pub onset_log_compression: f64,
    /// Scale the onset envelope so its peak is 1.
    pub normalize_onset: bool,

    pub harmonic_percussive: bool,
    /// Median filter length, in frames and bins. Must be odd.
    pub hpss_kernel: usize,
    /// Exponent of the soft mask.
    pub hpss_power: f64,

    pub trim_silence: bool,
    /// Frames quieter than this many dB below the loudest frame count as silence.
    pub trim_top_db: f64,

    /// Seconds that must separate two kept markers.
    pub marker_min_spacing: f64,
    /// Keep every n-th marker that survives the spacing filter.
    pub marker_stride: usize,

    /// Lowest value of the rendered spectrogram, in dB.
    pub db_floor: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            frame_length: 2048,
            hop_length: 512,
            window: WindowKind::Hann,

            min_tempo: 30.0,
            max_tempo: 240.0,
            start_bpm: 120.0,
            prior_std_octaves: 1.0,
            tempo_window_seconds: 8.0,

            tightness: 100.0,
            trim_beats: true,

            onset_log_compression: 1000.0,
            normalize_onset: true,

            harmonic_percussive: false,
            hpss_kernel: 31,
            hpss_power: 2.0,

            trim_silence: false,
            trim_top_db: 60.0,

            marker_min_spacing: 0.3,
            marker_stride: 4,

            db_floor: -80.0,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(AnalysisError::InvalidConfig(msg));

        if self.frame_length < 2 || !self.frame_length.is_power_of_two() {
            return invalid(format!(
                "frame length must be a power of two, got {}",
                self.frame_length
            ));
        }
        if self.hop_length == 0 || self.hop_length > self.frame_length {
            return invalid(format!(
                "hop length must be in 1..={}, got {}",
                self.frame_length, self.hop_length
            ));
        }
        if !(self.min_tempo > 0.0 && self.min_tempo < self.max_tempo) {
            return invalid(format!(
                "tempo range must satisfy 0 < floor < ceiling, got [{}, {}]",
                self.min_tempo, self.max_tempo
            ));
        }
        if !(self.min_tempo..=self.max_tempo).contains(&self.start_bpm) {
            return invalid(format!(
                "start bpm must lie in [{}, {}], got {}",
                self.min_tempo, self.max_tempo, self.start_bpm
            ));
        }
        if self.prior_std_octaves <= 0.0 {
            return invalid("tempo prior width must be positive".to_string());
        }
        if self.tempo_window_seconds <= 0.0 {
            return invalid("tempo window must be positive".to_string());
        }
        if self.tightness < 0.0 {
            return invalid(format!("tightness must be >= 0, got {}", self.tightness));
        }
        if self.onset_log_compression < 0.0 {
            return invalid("onset log compression must be >= 0".to_string());
        }
        if self.hpss_kernel == 0 || self.hpss_kernel % 2 == 0 {
            return invalid(format!(
                "hpss kernel must be odd, got {}",
                self.hpss_kernel
            ));
        }
        if self.hpss_power <= 0.0 {
            return invalid("hpss mask power must be positive".to_string());
        }
        if self.trim_top_db <= 0.0 {
            return invalid("trim threshold must be positive".to_string());
        }
        if self.marker_min_spacing < 0.0 {
            return invalid("marker spacing must be >= 0".to_string());
        }
        if self.marker_stride == 0 {
            return invalid("marker stride must be >= 1".to_string());
        }
        if self.db_floor >= 0.0 {
            return invalid(format!("dB floor must be negative, got {}", self.db_floor));
        }
        Ok(())
    }
}

/// Reads an `AnalysisConfig` from a TOML file. Missing keys keep their defaults.
pub fn load_config(path: &Path) -> anyhow::Result<AnalysisConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AnalysisConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_length, 2048);
        assert_eq!(config.hop_length, 512);
        assert_eq!(config.max_tempo, 240.0);
        assert_eq!(config.marker_stride, 4);
        assert_eq!(config.db_floor, -80.0);
    }

    #[test]
    fn rejects_bad_frames() {
        let config = AnalysisConfig {
            frame_length: 1000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));

        let config = AnalysisConfig {
            hop_length: 4096,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_tempo_range() {
        let config = AnalysisConfig {
            min_tempo: 200.0,
            max_tempo: 100.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_stride_and_even_kernel() {
        let config = AnalysisConfig {
            marker_stride: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            hpss_kernel: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn start_bpm_must_sit_inside_the_range() {
        let config = AnalysisConfig {
            start_bpm: 250.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));

        let config = AnalysisConfig {
            min_tempo: 60.0,
            max_tempo: 100.0,
            start_bpm: 120.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            start_bpm: 240.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            hop_length = 256
            window = "hamming"
            harmonic_percussive = true
            "#,
        )
        .unwrap();

        assert_eq!(config.hop_length, 256);
        assert_eq!(config.window, WindowKind::Hamming);
        assert!(config.harmonic_percussive);
        assert_eq!(config.frame_length, 2048);
    }

    #[test]
    fn window_kind_from_code() {
        assert_eq!(WindowKind::from_u8(0), Some(WindowKind::Hann));
        assert_eq!(WindowKind::from_u8(2), Some(WindowKind::Blackman));
        assert_eq!(WindowKind::from_u8(9), None);
        assert_eq!(WindowKind::from_code(1), Ok(WindowKind::Hamming));
        assert!(matches!(
            WindowKind::from_code(9),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn hann_window_is_symmetric() {
        let w = WindowKind::Hann.coefficients(8);
        assert_eq!(w.len(), 8);
        assert_ulps_eq!(w[0], 0.0, epsilon = 1e-12);
        for i in 0..4 {
            assert_ulps_eq!(w[i], w[7 - i], epsilon = 1e-12);
        }
    }
}
