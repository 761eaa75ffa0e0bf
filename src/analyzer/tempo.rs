use crate::analyzer::onset::OnsetEnvelope;
use crate::config::{AnalysisConfig, WindowKind};
use crate::dsp::math::{self, NormalizeType, EPS};
use crate::error::{AnalysisError, Result};

/// Frames in the smoothing window run over the envelope before autocorrelation.
const SMOOTHING_LENGTH: usize = 7;

/// Result of the tempo stage as the pipeline reports it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TempoEstimate {
    Detected(f64),
    /// No periodicity inside the configured range.
    Undetermined,
}

impl TempoEstimate {
    pub fn bpm(&self) -> Option<f64> {
        match self {
            TempoEstimate::Detected(bpm) => Some(*bpm),
            TempoEstimate::Undetermined => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, TempoEstimate::Detected(_))
    }
}

/// Global tempo of an onset envelope.
///
/// The envelope is cut into overlapping windows of a few seconds. Each window
/// gets its own normalised autocorrelation and the windows are combined with a
/// per-lag median, so a single noisy stretch cannot pull the estimate. The
/// median curve is weighted by a log-normal prior around `start_bpm` and its
/// best lag inside `[min_bpm, max_bpm]` wins.
pub struct TempoEstimator {
    rate: u32,
    increment: usize,

    min_bpm: f64,
    max_bpm: f64,
    start_bpm: f64,
    std_octaves: f64,
    window_seconds: f64,
}

impl TempoEstimator {
    pub fn new(rate: u32, increment: usize, config: &AnalysisConfig) -> Self {
        TempoEstimator {
            rate,
            increment,

            min_bpm: config.min_tempo,
            max_bpm: config.max_tempo,
            start_bpm: config.start_bpm,
            std_octaves: config.prior_std_octaves,
            window_seconds: config.tempo_window_seconds,
        }
    }

    /// Onset frames per second.
    fn frame_rate(&self) -> f64 {
        self.rate as f64 / self.increment as f64
    }

    fn lag_to_bpm(&self, lag: f64) -> f64 {
        60.0 * self.frame_rate() / lag
    }

    fn prior(&self, bpm: f64) -> f64 {
        (-0.5 * ((bpm / self.start_bpm).log2() / self.std_octaves).powi(2)).exp()
    }

    fn no_candidate(&self) -> AnalysisError {
        AnalysisError::NoTempoCandidate {
            min_bpm: self.min_bpm,
            max_bpm: self.max_bpm,
        }
    }

    pub fn estimate(&self, envelope: &OnsetEnvelope) -> Result<f64> {
        self.calculate_tempo(envelope.values())
    }

    /// Tempo in bpm of the detection function `df`, one value per onset frame.
    pub fn calculate_tempo(&self, df: &[f64]) -> Result<f64> {
        if df.is_empty() {
            return Err(self.no_candidate());
        }

        let mut kernel = WindowKind::Hann.coefficients(SMOOTHING_LENGTH);
        math::normalize(&mut kernel, NormalizeType::UnitSum);
        let smoothed = math::convolve_same(df, &kernel);

        let win_len = ((self.window_seconds * self.frame_rate()).round() as usize)
            .clamp(1, smoothed.len());
        let step = (win_len / 4).max(1);

        let lag_min = ((60.0 * self.frame_rate() / self.max_bpm).ceil() as usize).max(1);
        let lag_max = ((60.0 * self.frame_rate() / self.min_bpm).floor() as usize).min(win_len - 1);
        if lag_min > lag_max {
            log::warn!(
                "Tempo: window of {} frames cannot hold lags {}..={}",
                win_len,
                lag_min,
                lag_max
            );
            return Err(self.no_candidate());
        }
        // one extra lag on the right for the parabolic refinement
        let n_lags = (lag_max + 2).min(win_len);

        let mut acfs = Vec::new();
        let mut start = 0;
        while start + win_len <= smoothed.len() {
            if let Some(acf) = window_acf(&smoothed[start..start + win_len], n_lags) {
                acfs.push(acf);
            }
            start += step;
        }

        log::debug!(
            "Tempo: {} of {} windows usable, win_len={}, lags {}..={}",
            acfs.len(),
            (smoothed.len() - win_len) / step + 1,
            win_len,
            lag_min,
            lag_max
        );

        if acfs.is_empty() {
            return Err(self.no_candidate());
        }

        let mut column = vec![0.0; acfs.len()];
        let score: Vec<f64> = (0..n_lags)
            .map(|lag| {
                column
                    .iter_mut()
                    .zip(acfs.iter())
                    .for_each(|(c, acf)| *c = acf[lag]);
                let median = math::median_in_place(&mut column).unwrap_or(0.0);
                if lag == 0 {
                    median
                } else {
                    median * self.prior(self.lag_to_bpm(lag as f64))
                }
            })
            .collect();

        let (offset, best) = match math::max(&score[lag_min..=lag_max]) {
            Some((offset, best)) if best > 0.0 => (offset, best),
            _ => return Err(self.no_candidate()),
        };
        let lag = lag_min + offset;

        let shift = if lag + 1 < score.len() {
            math::parabolic_offset(score[lag - 1], score[lag], score[lag + 1])
        } else {
            0.0
        };
        let bpm = self
            .lag_to_bpm(lag as f64 + shift)
            .clamp(self.min_bpm, self.max_bpm);

        log::debug!(
            "Tempo: best lag {} ({:+.3}), score {:.4}, {:.2} bpm",
            lag,
            shift,
            best,
            bpm
        );
        Ok(bpm)
    }
}

/// Autocorrelation of the mean-removed window for lags `0..n_lags`, scaled so
/// that lag zero is 1. `None` for a flat window.
fn window_acf(frame: &[f64], n_lags: usize) -> Option<Vec<f64>> {
    let mean = math::mean(frame);
    let centred: Vec<f64> = frame.iter().map(|x| x - mean).collect();

    let acf: Vec<f64> = (0..n_lags)
        .map(|lag| {
            centred[..centred.len() - lag]
                .iter()
                .zip(centred[lag..].iter())
                .map(|(a, b)| a * b)
                .sum::<f64>()
        })
        .collect();

    let energy = acf[0];
    if energy <= EPS {
        return None;
    }
    Some(acf.iter().map(|x| x / energy).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 22050;
    const HOP: usize = 512;

    /// Onset function with a unit spike every `60 / bpm` seconds.
    fn pulses(bpm: f64, seconds: f64) -> Vec<f64> {
        let fr = RATE as f64 / HOP as f64;
        let len = (seconds * fr) as usize;
        let period = 60.0 * fr / bpm;
        let mut df = vec![0.0; len];
        let mut t = period / 2.0;
        while (t as usize) < len {
            df[(t.round() as usize).min(len - 1)] = 1.0;
            t += period;
        }
        df
    }

    fn estimator() -> TempoEstimator {
        TempoEstimator::new(RATE, HOP, &AnalysisConfig::default())
    }

    fn near_multiple(bpm: f64, target: f64) -> bool {
        [target, target / 2.0, target * 2.0]
            .iter()
            .any(|t| (bpm - t).abs() <= 2.0)
    }

    #[test]
    fn pulse_train_tempo() {
        for target in [90.0, 120.0, 140.0] {
            let bpm = estimator().calculate_tempo(&pulses(target, 20.0)).unwrap();
            assert!(near_multiple(bpm, target), "{} for {}", bpm, target);
        }
    }

    #[test]
    fn prior_settles_120() {
        let bpm = estimator().calculate_tempo(&pulses(120.0, 20.0)).unwrap();
        assert_abs_diff_eq!(bpm, 120.0, epsilon = 2.0);
    }

    #[test]
    fn stays_inside_the_range() {
        let config = AnalysisConfig {
            min_tempo: 100.0,
            max_tempo: 160.0,
            ..Default::default()
        };
        let est = TempoEstimator::new(RATE, HOP, &config);
        for target in [110.0, 140.0] {
            let bpm = est.calculate_tempo(&pulses(target, 15.0)).unwrap();
            assert!((100.0..=160.0).contains(&bpm), "{} for {}", bpm, target);
            assert_abs_diff_eq!(bpm, target, epsilon = 2.0);
        }
        // slower or faster pulses may find nothing, but never leave the range
        for target in [60.0, 90.0, 200.0] {
            if let Ok(bpm) = est.calculate_tempo(&pulses(target, 15.0)) {
                assert!((100.0..=160.0).contains(&bpm), "{} for {}", bpm, target);
            }
        }
    }

    #[test]
    fn flat_envelope_has_no_candidate() {
        let err = estimator().calculate_tempo(&vec![0.0; 500]).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::NoTempoCandidate {
                min_bpm: 30.0,
                max_bpm: 240.0
            }
        );
        assert!(estimator().calculate_tempo(&[]).is_err());
        assert!(estimator().calculate_tempo(&vec![0.3; 500]).is_err());
    }

    #[test]
    fn envelope_too_short_for_the_slowest_lag() {
        // five frames cannot hold a lag of even 11 frames
        assert!(estimator().calculate_tempo(&[0.0, 1.0, 0.0, 1.0, 0.0]).is_err());
    }

    #[test]
    fn estimate_undetermined_has_no_bpm() {
        assert_eq!(TempoEstimate::Undetermined.bpm(), None);
        assert_eq!(TempoEstimate::Detected(128.0).bpm(), Some(128.0));
        assert!(!TempoEstimate::Undetermined.is_detected());
    }
}
