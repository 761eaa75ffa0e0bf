//! The analysis pipeline and its stages.
//!
//! [`BeatAnalyzer`] runs the stages in order: optional harmonic/percussive
//! separation, optional silence trim, spectral transform, onset strength,
//! tempo and beat tracking. Marker filtering, the dB spectrogram and the text
//! export work on a finished [`Analysis`].

use std::time::Duration;

use crate::buffer::SampleBuffer;
use crate::cancel::CancelToken;
use crate::config::AnalysisConfig;
use crate::dsp::stft::{SpectralGrid, Stft};
use crate::dsp::{hpss, silence};
use crate::error::{AnalysisError, Result, Stage};

pub mod beat;
pub mod export;
pub mod markers;
pub mod onset;
pub mod spectrogram;
pub mod tempo;

use beat::{BeatSequence, BeatTracker};
use onset::OnsetEnvelope;
use spectrogram::DecibelGrid;
use tempo::{TempoEstimate, TempoEstimator};

/// Everything one run produces.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub tempo: TempoEstimate,
    pub beats: BeatSequence,
    /// Magnitudes of the signal the onsets were taken from.
    pub spectrogram: SpectralGrid,
    pub onset_envelope: OnsetEnvelope,
    /// Samples cut from the front by the silence trim.
    pub trim_offset: usize,
    duration_seconds: f64,
}

impl Analysis {
    /// Tempo implied by the mean spacing of the tracked beats. Usually close
    /// to `tempo`, but computed separately.
    pub fn beat_tempo(&self) -> Option<f64> {
        self.beats.implied_tempo()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds)
    }

    /// Seconds cut from the front by the silence trim.
    pub fn time_offset(&self) -> f64 {
        self.trim_offset as f64 / self.spectrogram.sample_rate() as f64
    }

    pub fn export_text(&self) -> String {
        export::beat_timestamps_text(self.beats.times())
    }
}

pub struct BeatAnalyzer {
    config: AnalysisConfig,
    cancel: CancelToken,
}

impl BeatAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(BeatAnalyzer {
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze(&self, buffer: &SampleBuffer) -> Result<Analysis> {
        let config = &self.config;
        if buffer.len() < config.frame_length {
            log::warn!(
                "Input of {} samples is shorter than one frame of {}",
                buffer.len(),
                config.frame_length
            );
            return Err(AnalysisError::InsufficientAudio {
                samples: buffer.len(),
                frame_length: config.frame_length,
            });
        }

        let stft = Stft::new(config.frame_length, config.hop_length, config.window);

        let separated;
        let mut signal = buffer;
        if config.harmonic_percussive {
            self.cancel.check(Stage::Separation)?;
            separated = hpss::percussive(signal, &stft, config.hpss_kernel, config.hpss_power)?;
            signal = &separated;
        }

        let trimmed;
        let mut trim_offset = 0;
        if config.trim_silence {
            self.cancel.check(Stage::Trim)?;
            trimmed = silence::trim(
                signal,
                config.frame_length,
                config.hop_length,
                config.trim_top_db,
            );
            trim_offset = trimmed.offset;
            signal = &trimmed.buffer;
        }
        let time_offset = trim_offset as f64 / buffer.sample_rate() as f64;

        self.cancel.check(Stage::Framing)?;
        let spectrogram = stft.magnitudes(signal)?;

        self.cancel.check(Stage::Onset)?;
        let onset_envelope = onset::onset_strength(
            &spectrogram,
            config.onset_log_compression,
            config.normalize_onset,
        );

        self.cancel.check(Stage::Tempo)?;
        let estimator = TempoEstimator::new(buffer.sample_rate(), config.hop_length, config);
        let tempo = match estimator.estimate(&onset_envelope) {
            Ok(bpm) => TempoEstimate::Detected(bpm),
            Err(err @ AnalysisError::NoTempoCandidate { .. }) => {
                log::warn!("{}, tempo is undetermined", err);
                TempoEstimate::Undetermined
            }
            Err(err) => return Err(err),
        };

        self.cancel.check(Stage::BeatTracking)?;
        let tracker = BeatTracker::new(config.tightness, config.trim_beats);
        let beats = tracker.track(
            &onset_envelope,
            tempo.bpm().unwrap_or(config.start_bpm),
            time_offset,
        );

        match tempo {
            TempoEstimate::Detected(bpm) => {
                log::info!("Estimated tempo {:.2} bpm, {} beats", bpm, beats.len())
            }
            TempoEstimate::Undetermined => log::info!("Tempo undetermined, {} beats", beats.len()),
        }

        Ok(Analysis {
            tempo,
            beats,
            spectrogram,
            onset_envelope,
            trim_offset,
            duration_seconds: buffer.duration_seconds(),
        })
    }

    /// Beat times thinned out for annotation, using the configured spacing and stride.
    pub fn markers(&self, analysis: &Analysis) -> Result<Vec<f64>> {
        markers::filter_markers(
            analysis.beats.times(),
            self.config.marker_min_spacing,
            self.config.marker_stride,
        )
    }

    pub fn spectrogram_db(&self, analysis: &Analysis) -> DecibelGrid {
        spectrogram::to_decibels(
            &analysis.spectrogram,
            self.config.db_floor,
            analysis.time_offset(),
        )
    }
}
