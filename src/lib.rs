extern crate apodize;
extern crate rayon;
extern crate rustfft;

#[cfg(test)]
#[macro_use]
extern crate approx;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

pub mod analyzer;
pub mod buffer;
pub mod cancel;
pub mod config;
pub mod dsp;
pub mod error;

pub use analyzer::beat::{BeatSequence, BeatStatus};
pub use analyzer::spectrogram::DecibelGrid;
pub use analyzer::tempo::TempoEstimate;
pub use analyzer::{Analysis, BeatAnalyzer};
pub use buffer::SampleBuffer;
pub use cancel::CancelToken;
pub use config::{load_config, AnalysisConfig, WindowKind};
pub use error::{AnalysisError, Result, Stage};

use wasm_bindgen::prelude::{wasm_bindgen, JsError};

/// Runs one analysis of mono `samples` with `config`.
pub fn analyze(samples: Vec<f32>, sample_rate: u32, config: AnalysisConfig) -> Result<Analysis> {
    let buffer = SampleBuffer::new(samples, sample_rate)?;
    BeatAnalyzer::new(config)?.analyze(&buffer)
}

/// Tempo of mono `samples` with the default settings.
pub fn tempo_of(samples: &[f32], sample_rate: u32) -> Result<TempoEstimate> {
    Ok(analyze(samples.to_vec(), sample_rate, AnalysisConfig::default())?.tempo)
}

/// Export text of mono `samples`, framed with the window whose code is `window`.
pub fn export_of(samples: &[f32], sample_rate: u32, window: u8) -> Result<String> {
    let config = AnalysisConfig {
        window: WindowKind::from_code(window)?,
        ..Default::default()
    };
    Ok(analyze(samples.to_vec(), sample_rate, config)?.export_text())
}

/// Estimated tempo of mono `samples`. `None` if the clip has no tempo in
/// range; bad input is an error.
#[wasm_bindgen]
pub fn detect_bpm(samples: &[f32], sample_rate: u32) -> std::result::Result<Option<f64>, JsError> {
    Ok(tempo_of(samples, sample_rate)?.bpm())
}

/// Beat times of mono `samples` in the `.txt` export format. `window` is the
/// numeric code of a [`WindowKind`].
#[wasm_bindgen]
pub fn beat_timestamps_text(
    samples: &[f32],
    sample_rate: u32,
    window: u8,
) -> std::result::Result<String, JsError> {
    Ok(export_of(samples, sample_rate, window)?)
}
