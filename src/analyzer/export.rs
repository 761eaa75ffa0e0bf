use crate::error::{AnalysisError, Result};

const SUFFIX: &str = " sec";

/// One `"<seconds> sec"` line per beat, three decimals, rounded.
pub fn beat_timestamps_text(beats: &[f64]) -> String {
    beats
        .iter()
        .map(|t| format!("{:.3}{}", t, SUFFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads text written by [`beat_timestamps_text`] back into seconds. Blank
/// text is an empty sequence.
pub fn parse_beat_text(text: &str) -> Result<Vec<f64>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    text.lines()
        .enumerate()
        .map(|(i, line)| {
            let malformed = |reason: String| AnalysisError::MalformedExport {
                line: i + 1,
                reason,
            };
            let value = line
                .trim_end()
                .strip_suffix(SUFFIX)
                .ok_or_else(|| malformed(format!("missing '{}' suffix", SUFFIX.trim())))?;
            value
                .trim()
                .parse::<f64>()
                .map_err(|e| malformed(format!("{:?}: {}", value, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_three_decimals() {
        assert_eq!(beat_timestamps_text(&[0.1239]), "0.124 sec");
        assert_eq!(beat_timestamps_text(&[2.0, 12.34449]), "2.000 sec\n12.344 sec");
        assert_eq!(beat_timestamps_text(&[]), "");
    }

    #[test]
    fn no_trailing_newline() {
        let text = beat_timestamps_text(&[0.5, 1.0, 1.5]);
        assert_eq!(text.lines().count(), 3);
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn parses_back_within_half_a_millisecond() {
        let beats: Vec<f64> = (0..50).map(|i| 0.0371 + i as f64 * 0.46373).collect();
        let parsed = parse_beat_text(&beat_timestamps_text(&beats)).unwrap();

        assert_eq!(parsed.len(), beats.len());
        for (p, b) in parsed.iter().zip(beats.iter()) {
            assert_abs_diff_eq!(*p, *b, epsilon = 0.0005);
        }
    }

    #[test]
    fn reports_the_bad_line() {
        let err = parse_beat_text("0.500 sec\n1.000\n1.500 sec").unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedExport { line: 2, .. }));

        let err = parse_beat_text("0.500 sec\nabc sec").unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedExport { line: 2, .. }));
        assert!(parse_beat_text("").unwrap().is_empty());
    }
}
