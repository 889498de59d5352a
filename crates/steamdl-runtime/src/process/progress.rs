//! steamcmd progress line parsing.
//!
//! steamcmd reports download state as
//! `Update state (0x61) downloading, progress: 42.50 (1024 / 2048)`.

const MARKER: &str = "progress: ";

/// Percentage from a steamcmd status line, clamped to 0-100.
pub fn parse_progress(line: &str) -> Option<f32> {
    let start = line.find(MARKER)? + MARKER.len();
    let number = line[start..].split_whitespace().next()?;
    let pct: f32 = number.parse().ok()?;
    pct.is_finite().then(|| pct.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_update_state_line() {
        let line = " Update state (0x61) downloading, progress: 12.34 (1505099 / 12193152)";
        assert_eq!(parse_progress(line), Some(12.34));
    }

    #[test]
    fn ignores_other_lines() {
        assert_eq!(parse_progress("Logging in user 'anonymous' to Steam Public...OK"), None);
        assert_eq!(parse_progress("progress: n/a"), None);
        assert_eq!(parse_progress("progress: "), None);
    }

    #[test]
    fn clamps_out_of_range() {
        assert_eq!(parse_progress("progress: 100.7 (1 / 1)"), Some(100.0));
    }
}
