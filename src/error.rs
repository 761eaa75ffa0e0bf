use std::fmt;

use thiserror::Error;

/// The pipeline stage an error was raised from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Framing,
    Separation,
    Trim,
    Onset,
    Tempo,
    BeatTracking,
    MarkerFilter,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Framing => "framing",
            Stage::Separation => "harmonic/percussive separation",
            Stage::Trim => "silence trim",
            Stage::Onset => "onset strength",
            Stage::Tempo => "tempo estimation",
            Stage::BeatTracking => "beat tracking",
            Stage::MarkerFilter => "marker filter",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("insufficient audio: {samples} samples is shorter than one {frame_length}-sample frame")]
    InsufficientAudio { samples: usize, frame_length: usize },

    #[error("onset envelope is empty or degenerate")]
    EmptyOnsetEnvelope,

    #[error("no tempo candidate between {min_bpm:.1} and {max_bpm:.1} bpm")]
    NoTempoCandidate { min_bpm: f64, max_bpm: f64 },

    #[error("marker filter needs at least one beat")]
    EmptyBeatSequenceForFilter,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("analysis cancelled before {stage}")]
    Cancelled { stage: Stage },

    #[error("malformed beat export at line {line}: {reason}")]
    MalformedExport { line: usize, reason: String },
}

impl AnalysisError {
    /// The stage that produced this error, if it belongs to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AnalysisError::InsufficientAudio { .. } => Some(Stage::Framing),
            AnalysisError::EmptyOnsetEnvelope => Some(Stage::Onset),
            AnalysisError::NoTempoCandidate { .. } => Some(Stage::Tempo),
            AnalysisError::EmptyBeatSequenceForFilter => Some(Stage::MarkerFilter),
            AnalysisError::Cancelled { stage } => Some(*stage),
            AnalysisError::MalformedExport { .. } => Some(Stage::Export),
            AnalysisError::InvalidConfig(_) | AnalysisError::InvalidInput(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_report_their_stage() {
        let err = AnalysisError::InsufficientAudio {
            samples: 100,
            frame_length: 2048,
        };
        assert_eq!(err.stage(), Some(Stage::Framing));
        assert_eq!(
            err.to_string(),
            "insufficient audio: 100 samples is shorter than one 2048-sample frame"
        );

        let err = AnalysisError::Cancelled {
            stage: Stage::BeatTracking,
        };
        assert_eq!(err.stage(), Some(Stage::BeatTracking));
        assert_eq!(err.to_string(), "analysis cancelled before beat tracking");

        assert_eq!(AnalysisError::InvalidConfig("x".into()).stage(), None);
    }
}
