use crate::signal::RRSeries;
use anyhow::{Context, Result};

/// Parse newline-delimited RR intervals in ms, ignoring blank/comment lines.
///
/// Beat timestamps are accumulated from the intervals, starting at zero.
pub fn parse_rr_intervals(text: &str) -> Result<Vec<u32>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not a number: {}", idx + 1, trimmed))?;
        if !val.is_finite() || val < 0.0 || val > u32::MAX as f64 {
            anyhow::bail!("line {} is not a valid interval: {}", idx + 1, trimmed);
        }
        out.push(val.round() as u32);
    }
    if out.is_empty() {
        anyhow::bail!("no RR intervals found");
    }
    Ok(out)
}

pub fn parse_rr_series(text: &str) -> Result<RRSeries> {
    Ok(RRSeries::from_intervals(&parse_rr_intervals(text)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blanks_are_skipped() {
        let series = parse_rr_series("# night\n800\n\n 900.4 \n# end\n1000\n").unwrap();
        let rr: Vec<u32> = series.points.iter().map(|p| p.rr_ms).collect();
        assert_eq!(rr, vec![800, 900, 1000]);
        assert_eq!(series.end_ms(), Some(2700));
    }

    #[test]
    fn bad_line_is_reported_with_its_number() {
        let err = parse_rr_intervals("800\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse_rr_intervals("800\n-5\n").is_err());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse_rr_intervals("# nothing\n\n").is_err());
    }
}
