use super::stft::frame_count;
use crate::buffer::SampleBuffer;

/// Power floor for the dB conversion so silent frames stay finite.
const POWER_FLOOR: f64 = 1e-10;

/// Leading and trailing silence removed from a buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Trimmed {
    pub buffer: SampleBuffer,
    /// Index of the first kept sample in the untrimmed buffer.
    pub offset: usize,
}

fn frame_rms(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<f64> {
    let n_frames = frame_count(samples.len(), frame_length, hop_length).max(1);
    (0..n_frames)
        .map(|t| {
            let start = t * hop_length;
            let end = (start + frame_length).min(samples.len());
            let frame = &samples[start..end];
            let power = frame.iter().map(|x| (*x as f64).powi(2)).sum::<f64>() / frame.len() as f64;
            power.sqrt()
        })
        .collect()
}

/// Cuts everything before the first and after the last frame whose RMS is
/// within `top_db` of the loudest frame. A buffer with no energy at all is
/// returned whole.
pub fn trim(buffer: &SampleBuffer, frame_length: usize, hop_length: usize, top_db: f64) -> Trimmed {
    let untouched = || Trimmed {
        buffer: buffer.clone(),
        offset: 0,
    };
    if buffer.is_empty() {
        return untouched();
    }

    let rms = frame_rms(buffer.samples(), frame_length, hop_length);
    let peak_power = rms.iter().map(|r| r * r).fold(0.0, f64::max);
    if peak_power <= POWER_FLOOR {
        log::debug!("Silence trim: no energy above the floor, keeping the whole buffer");
        return untouched();
    }

    let reference_db = 10.0 * peak_power.log10();
    let loud: Vec<usize> = rms
        .iter()
        .enumerate()
        .filter(|(_, r)| 10.0 * (*r * *r).max(POWER_FLOOR).log10() - reference_db > -top_db)
        .map(|(i, _)| i)
        .collect();

    let (first, last) = match (loud.first(), loud.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return untouched(),
    };
    let start = first * hop_length;
    // the final frame also owns the tail that did not fill a whole frame
    let end = if last + 1 == rms.len() {
        buffer.len()
    } else {
        (last * hop_length + frame_length).min(buffer.len())
    };

    log::debug!(
        "Silence trim: keeping samples {}..{} of {} (top_db={:.1})",
        start,
        end,
        buffer.len(),
        top_db
    );

    Trimmed {
        buffer: buffer.slice(start, end),
        offset: start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_both_ends() {
        let mut samples = vec![0.0f32; 20000];
        samples[8000..12000].iter_mut().for_each(|x| *x = 0.5);
        let buffer = SampleBuffer::new(samples, 22050).unwrap();

        let trimmed = trim(&buffer, 2048, 512, 60.0);
        assert!(trimmed.offset > 5000 && trimmed.offset <= 8000);
        let end = trimmed.offset + trimmed.buffer.len();
        assert!(end >= 12000 && end < 15000);
        assert!(trimmed.buffer.len() >= 2048);
    }

    #[test]
    fn silence_is_left_alone() {
        let buffer = SampleBuffer::new(vec![0.0; 22050], 22050).unwrap();
        let trimmed = trim(&buffer, 2048, 512, 60.0);
        assert_eq!(trimmed.offset, 0);
        assert_eq!(trimmed.buffer, buffer);
    }

    #[test]
    fn loud_throughout_is_left_alone() {
        let buffer = SampleBuffer::new(vec![0.25; 10000], 22050).unwrap();
        let trimmed = trim(&buffer, 2048, 512, 60.0);
        assert_eq!(trimmed.offset, 0);
        assert_eq!(trimmed.buffer.len(), 10000);
    }

    #[test]
    fn short_buffer_is_one_frame() {
        let buffer = SampleBuffer::new(vec![0.1; 100], 22050).unwrap();
        let trimmed = trim(&buffer, 2048, 512, 60.0);
        assert_eq!(trimmed.buffer.len(), 100);
    }
}
