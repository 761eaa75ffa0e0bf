use crate::error::{AnalysisError, Result};

/// Thins beat times out for annotation overlays.
///
/// The first beat is always kept. A later beat is kept only when it lies more
/// than `min_spacing` seconds after the last kept one. Of the survivors every
/// `stride`-th is returned, starting with the first. The input is left as is.
pub fn filter_markers(beats: &[f64], min_spacing: f64, stride: usize) -> Result<Vec<f64>> {
    let first = match beats.first() {
        Some(first) => *first,
        None => return Err(AnalysisError::EmptyBeatSequenceForFilter),
    };

    let mut spaced = vec![first];
    let mut last = first;
    for &t in &beats[1..] {
        if t - last > min_spacing {
            spaced.push(t);
            last = t;
        }
    }

    let markers: Vec<f64> = spaced.into_iter().step_by(stride.max(1)).collect();
    log::debug!(
        "Markers: {} of {} beats kept (spacing {:.3}s, stride {})",
        markers.len(),
        beats.len(),
        min_spacing,
        stride
    );
    Ok(markers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(
            filter_markers(&[], 0.3, 4),
            Err(AnalysisError::EmptyBeatSequenceForFilter)
        );
    }

    #[test]
    fn single_beat_survives() {
        assert_eq!(filter_markers(&[1.25], 0.3, 4).unwrap(), vec![1.25]);
    }

    #[test]
    fn gap_is_measured_from_the_last_kept_beat() {
        let beats = [0.0, 0.2, 0.4, 0.5, 0.75, 1.0];
        // 0.2 is too close to 0.0, 0.5 to 0.4 and 1.0 to 0.75
        assert_eq!(filter_markers(&beats, 0.3, 1).unwrap(), vec![0.0, 0.4, 0.75]);
    }

    #[test]
    fn gap_equal_to_the_spacing_is_dropped() {
        let beats = [0.0, 0.5, 1.0, 1.5];
        assert_eq!(filter_markers(&beats, 0.5, 1).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn stride_keeps_every_nth() {
        let beats: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        assert_eq!(filter_markers(&beats, 0.3, 4).unwrap(), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn output_is_a_spaced_subsequence() {
        let beats: Vec<f64> = (0..200).map(|i| (i as f64 * 0.173).sqrt() * 3.0).collect();
        let markers = filter_markers(&beats, 0.3, 2).unwrap();

        assert!(markers.windows(2).all(|w| w[1] - w[0] > 0.3));
        let mut rest = beats.iter();
        assert!(markers.iter().all(|m| rest.any(|b| b == m)));
    }
}
