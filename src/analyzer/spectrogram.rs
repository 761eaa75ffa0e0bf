use serde::Serialize;

use crate::dsp::stft::SpectralGrid;

/// Smallest magnitude taken into the log, keeps silent bins finite.
const AMIN: f64 = 1e-5;

/// Spectrogram in dB relative to its loudest bin, ready for plotting.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DecibelGrid {
    /// One row per frame, one column per frequency bin.
    pub values: Vec<Vec<f64>>,
    /// Bin centre frequencies in Hz.
    pub frequencies: Vec<f64>,
    /// Frame centre times in seconds.
    pub times: Vec<f64>,
    pub floor_db: f64,
}

impl DecibelGrid {
    pub fn n_frames(&self) -> usize {
        self.values.len()
    }

    pub fn n_bins(&self) -> usize {
        self.frequencies.len()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn amplitude_to_db(x: f64) -> f64 {
    20.0 * x.max(AMIN).log10()
}

/// `20 log10(m / max)` for every magnitude, clipped below at `floor_db`.
/// `time_offset` shifts the time axis, e.g. back onto an untrimmed clip.
pub fn to_decibels(grid: &SpectralGrid, floor_db: f64, time_offset: f64) -> DecibelGrid {
    let reference = grid.max_magnitude();
    let values = if reference < AMIN {
        // nothing louder than the log floor, the whole grid sits at the bottom
        vec![vec![floor_db; grid.n_bins()]; grid.n_frames()]
    } else {
        let reference_db = amplitude_to_db(reference);
        grid.frames()
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .map(|m| (amplitude_to_db(*m) - reference_db).max(floor_db))
                    .collect::<Vec<_>>()
            })
            .collect()
    };

    DecibelGrid {
        values,
        frequencies: grid.frequencies(),
        times: grid.frame_times().into_iter().map(|t| t + time_offset).collect(),
        floor_db,
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::buffer::SampleBuffer;
    use crate::config::WindowKind;
    use crate::dsp::stft::Stft;

    fn grid_of(samples: Vec<f32>) -> SpectralGrid {
        let buffer = SampleBuffer::new(samples, 8000).unwrap();
        Stft::new(256, 64, WindowKind::Hann).magnitudes(&buffer).unwrap()
    }

    #[test]
    fn loudest_bin_is_zero_db() {
        let samples = (0..4000)
            .map(|i| (2.0 * PI * 1000.0 * i as f64 / 8000.0).sin() as f32)
            .collect();
        let grid = grid_of(samples);
        let db = to_decibels(&grid, -80.0, 0.0);

        assert_eq!(db.n_frames(), grid.n_frames());
        assert_eq!(db.n_bins(), grid.n_bins());
        let top = db.values.iter().flatten().copied().fold(f64::MIN, f64::max);
        assert_ulps_eq!(top, 0.0);
        assert!(db.values.iter().flatten().all(|v| (-80.0..=0.0).contains(v)));
    }

    #[test]
    fn silence_sits_on_the_floor() {
        let db = to_decibels(&grid_of(vec![0.0; 2000]), -80.0, 0.0);
        assert!(db.values.iter().flatten().all(|v| *v == -80.0));
    }

    #[test]
    fn times_follow_the_offset() {
        let grid = grid_of(vec![0.1; 2000]);
        let db = to_decibels(&grid, -60.0, 2.0);
        assert_ulps_eq!(db.times[0], 2.0 + grid.frame_times()[0]);
        assert_eq!(db.floor_db, -60.0);
    }

    #[test]
    fn serializes_axes() {
        let db = to_decibels(&grid_of(vec![0.0; 256]), -80.0, 0.0);
        let json: serde_json::Value = serde_json::from_str(&db.to_json().unwrap()).unwrap();
        assert_eq!(json["frequencies"].as_array().unwrap().len(), 129);
        assert_eq!(json["times"].as_array().unwrap().len(), 1);
        assert_eq!(json["floor_db"], -80.0);
    }
}
