use crate::analyzer::onset::OnsetEnvelope;
use crate::config::WindowKind;
use crate::dsp::math::{self, EPS};
use crate::error::{AnalysisError, Result};

/// Peaks below this share of the envelope maximum do not count as usable.
const PEAK_FLOOR: f64 = 0.1;
/// The first beat may not come before the local score reaches this share of its maximum.
const FIRST_BEAT_FLOOR: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeatStatus {
    Tracked,
    /// Fewer than two usable onset peaks. The sequence holds zero or one beat.
    EmptyOnsetEnvelope,
}

/// Beat instants in seconds, strictly increasing.
#[derive(Clone, Debug, PartialEq)]
pub struct BeatSequence {
    times: Vec<f64>,
    status: BeatStatus,
}

impl BeatSequence {
    pub fn new(times: Vec<f64>, status: BeatStatus) -> Self {
        BeatSequence { times, status }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn status(&self) -> BeatStatus {
        self.status
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Mean spacing between consecutive beats, in seconds.
    pub fn mean_interval(&self) -> Option<f64> {
        if self.times.len() < 2 {
            return None;
        }
        let span = self.times[self.times.len() - 1] - self.times[0];
        Some(span / (self.times.len() - 1) as f64)
    }

    /// Tempo implied by the mean beat spacing. Not the same computation as the
    /// tempo stage and the two may disagree.
    pub fn implied_tempo(&self) -> Option<f64> {
        self.mean_interval()
            .filter(|interval| *interval > 0.0)
            .map(|interval| 60.0 / interval)
    }
}

/// Onset peaks strong enough to be beat candidates.
fn usable_peaks(df: &[f64]) -> Vec<usize> {
    let top = match math::max(df) {
        Some((_, top)) if top > 0.0 => top,
        _ => return Vec::new(),
    };
    math::local_maxima(df)
        .into_iter()
        .filter(|&i| df[i] >= PEAK_FLOOR * top)
        .collect()
}

/// Dynamic-programming beat tracker.
///
/// Every onset frame gets a cumulative score: its own local score plus the
/// best cumulative score one beat back, penalised by how far that interval is
/// from the expected beat period. Backtracking from a strong final frame gives
/// the beat sequence.
pub struct BeatTracker {
    tightness: f64,
    trim: bool,
}

impl BeatTracker {
    pub fn new(tightness: f64, trim: bool) -> Self {
        BeatTracker { tightness, trim }
    }

    /// Beats of `envelope` at tempo `bpm`, in seconds shifted by `offset`.
    pub fn track(&self, envelope: &OnsetEnvelope, bpm: f64, offset: f64) -> BeatSequence {
        let period = 60.0 * envelope.frame_rate() / bpm;
        let to_times = |frames: Vec<usize>| -> Vec<f64> {
            frames
                .into_iter()
                .map(|f| envelope.frame_to_time(f) + offset)
                .collect()
        };

        match self.calculate_beats(envelope.values(), period) {
            Ok(frames) => {
                log::debug!("Beat tracking: {} beats at period {:.2} frames", frames.len(), period);
                BeatSequence::new(to_times(frames), BeatStatus::Tracked)
            }
            Err(err) => {
                let peaks = usable_peaks(envelope.values());
                log::warn!("Beat tracking: {}, keeping {} peak(s)", err, peaks.len());
                BeatSequence::new(to_times(peaks), BeatStatus::EmptyOnsetEnvelope)
            }
        }
    }

    /// Beat frames of the detection function `df` for a beat period given in
    /// frames. Fails with `EmptyOnsetEnvelope` when `df` has fewer than two
    /// usable peaks.
    pub fn calculate_beats(&self, df: &[f64], period: f64) -> Result<Vec<usize>> {
        if usable_peaks(df).len() < 2 {
            return Err(AnalysisError::EmptyOnsetEnvelope);
        }
        let std = math::std_dev(df);
        if std <= EPS || !(period > 0.0) {
            return Err(AnalysisError::EmptyOnsetEnvelope);
        }

        let localscore = self.local_score(df, std, period);
        let df_len = localscore.len();

        let d_min = ((period / 2.0).round() as usize).max(1);
        let d_max = ((2.0 * period).round() as usize).max(d_min);
        // transition weights, indexed by distance back from the current frame
        let txwt: Vec<f64> = (d_min..=d_max)
            .map(|d| -self.tightness * (d as f64 / period).ln().powi(2))
            .collect();

        let first_beat_floor = FIRST_BEAT_FLOOR * math::max(&localscore).map_or(0.0, |(_, v)| v);
        let mut cumscore = vec![0.0; df_len];
        let mut backlink: Vec<Option<usize>> = vec![None; df_len];
        let mut first_beat = true;

        for i in 0..df_len {
            let best = (d_min..=d_max.min(i))
                .zip(txwt.iter())
                .map(|(d, w)| (i - d, cumscore[i - d] + w))
                .max_by(|a, b| a.1.total_cmp(&b.1));

            cumscore[i] = localscore[i] + best.map_or(0.0, |(_, score)| score);
            if first_beat && localscore[i] < first_beat_floor {
                continue;
            }
            backlink[i] = best.map(|(j, _)| j);
            first_beat = false;
        }

        let mut beats = vec![last_beat(&cumscore)];
        while let Some(previous) = beats.last().and_then(|&b| backlink[b]) {
            beats.push(previous);
        }
        beats.reverse();

        if self.trim {
            beats = trim_beats(&localscore, beats);
        }
        Ok(beats)
    }

    /// Onset function scaled to unit deviation and smoothed by a Gaussian
    /// about one beat period wide.
    fn local_score(&self, df: &[f64], std: f64, period: f64) -> Vec<f64> {
        let reach = period.round() as isize;
        let window: Vec<f64> = (-reach..=reach)
            .map(|k| (-0.5 * (k as f64 * 32.0 / period).powi(2)).exp())
            .collect();
        let scaled: Vec<f64> = df.iter().map(|x| x / std).collect();
        math::convolve_same(&scaled, &window)
    }
}

/// Last local maximum of the cumulative score that reaches half the median of
/// all its maxima.
fn last_beat(cumscore: &[f64]) -> usize {
    let maxima = math::local_maxima(cumscore);
    let values: Vec<f64> = maxima.iter().map(|&i| cumscore[i]).collect();
    let median = match math::median(&values) {
        Some(median) => median,
        None => return cumscore.len() - 1,
    };
    maxima
        .into_iter()
        .rev()
        .find(|&i| 2.0 * cumscore[i] > median)
        .unwrap_or(cumscore.len() - 1)
}

/// Drops leading and trailing beats whose smoothed strength falls below half
/// its RMS. Keeps the input if nothing would survive.
fn trim_beats(localscore: &[f64], beats: Vec<usize>) -> Vec<usize> {
    let strength: Vec<f64> = beats.iter().map(|&b| localscore[b]).collect();
    let smooth = math::convolve_same(&strength, &WindowKind::Hann.coefficients(5));
    let threshold = 0.5 * math::mean(&smooth.iter().map(|x| x * x).collect::<Vec<_>>()).sqrt();

    let start = smooth.iter().position(|s| *s > threshold);
    let end = smooth.iter().rposition(|s| *s > threshold);
    match (start, end) {
        (Some(start), Some(end)) => beats[start..=end].to_vec(),
        _ => beats,
    }
}
