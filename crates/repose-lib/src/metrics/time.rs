use super::{mean_sd, rmssd};
use crate::{config::TimeDomainConfig, outcome::Outcome, signal::RRPoint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where the reported heart rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrSource {
    Sensor,
    RollingWindow,
    MeanRr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDomain {
    pub n: usize,
    pub mean_rr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    /// Percentage of successive differences above 50 ms.
    pub pnn50: f64,
    pub sdsd: f64,
    pub mean_hr: f64,
    pub hr_source: HrSource,
    pub triangular_index: Option<f64>,
}

/// Time-domain statistics over clean beats.
pub fn time_domain(clean: &[RRPoint], cfg: &TimeDomainConfig) -> Outcome<TimeDomain> {
    let values: Vec<f64> = clean.iter().map(RRPoint::value).collect();
    let Some((mean_rr, sdnn)) = mean_sd(&values) else {
        return Outcome::too_few(2, values.len());
    };
    let n = values.len();
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let pnn50 = diffs.iter().filter(|d| d.abs() > 50.0).count() as f64 / diffs.len() as f64 * 100.0;
    let sdsd = mean_sd(&diffs).map(|(_, sd)| sd).unwrap_or(0.0);
    let (mean_hr, hr_source) = heart_rate(clean, mean_rr, cfg);

    Outcome::Found(TimeDomain {
        n,
        mean_rr,
        sdnn,
        rmssd: rmssd(&values),
        pnn50,
        sdsd,
        mean_hr,
        hr_source,
        triangular_index: triangular_index(&values, cfg),
    })
}

fn heart_rate(clean: &[RRPoint], mean_rr: f64, cfg: &TimeDomainConfig) -> (f64, HrSource) {
    let sensor: Vec<f64> = clean
        .iter()
        .filter_map(|p| p.hr_bpm)
        .map(f64::from)
        .collect();
    if !sensor.is_empty() {
        return (sensor.iter().sum::<f64>() / sensor.len() as f64, HrSource::Sensor);
    }
    if let Some(rolling) = rolling_heart_rate(clean, cfg) {
        return (rolling, HrSource::RollingWindow);
    }
    let hr = if mean_rr > 0.0 { 60_000.0 / mean_rr } else { 0.0 };
    (hr, HrSource::MeanRr)
}

/// Mean of per-window heart rates over half-overlapping windows.
fn rolling_heart_rate(clean: &[RRPoint], cfg: &TimeDomainConfig) -> Option<f64> {
    let first = clean.first()?.timestamp_ms;
    let last = clean.last()?.timestamp_ms;
    let window = cfg.hr_window_ms.max(1);
    let step = (window / 2).max(1);
    let mut rates = Vec::new();
    let mut lo = 0;
    let mut start = first;
    while start <= last {
        let end = start + window;
        while lo < clean.len() && clean[lo].timestamp_ms < start {
            lo += 1;
        }
        let beats: Vec<f64> = clean[lo..]
            .iter()
            .take_while(|p| p.timestamp_ms < end)
            .map(RRPoint::value)
            .collect();
        if beats.len() >= cfg.hr_min_beats {
            let mean = beats.iter().sum::<f64>() / beats.len() as f64;
            if mean > 0.0 {
                rates.push((60_000.0 / mean).clamp(cfg.hr_min_bpm, cfg.hr_max_bpm));
            }
        }
        if end > last {
            break;
        }
        start += step;
    }
    if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }
}

/// Beats divided by the height of the tallest histogram bin.
fn triangular_index(values: &[f64], cfg: &TimeDomainConfig) -> Option<f64> {
    if values.len() < cfg.triangular_min_beats || cfg.histogram_bin_ms <= 0.0 {
        return None;
    }
    let mut bins: HashMap<i64, usize> = HashMap::new();
    for value in values {
        *bins.entry((value / cfg.histogram_bin_ms).floor() as i64).or_default() += 1;
    }
    let tallest = bins.values().copied().max()?;
    Some(values.len() as f64 / tallest as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::assert_close;
    use crate::outcome::Insufficient;
    use crate::signal::RRSeries;

    fn compute(series: &RRSeries) -> TimeDomain {
        time_domain(&series.points, &TimeDomainConfig::default())
            .found()
            .unwrap()
    }

    #[test]
    fn constant_series_yields_zero_variability() {
        let series = RRSeries::from_intervals(&[1000; 30]);
        let td = compute(&series);
        assert_eq!(td.n, 30);
        assert_eq!(td.mean_rr, 1000.0);
        assert_eq!(td.sdnn, 0.0);
        assert_eq!(td.rmssd, 0.0);
        assert_eq!(td.pnn50, 0.0);
        assert_eq!(td.sdsd, 0.0);
        assert_eq!(td.hr_source, HrSource::RollingWindow);
        assert_close(td.mean_hr, 60.0, 1e-12);
        assert_eq!(td.triangular_index, Some(1.0));
    }

    #[test]
    fn alternating_series_statistics() {
        let intervals: Vec<u32> = (0..40).map(|i| if i % 2 == 0 { 800 } else { 900 }).collect();
        let td = compute(&RRSeries::from_intervals(&intervals));
        assert_close(td.mean_rr, 850.0, 1e-12);
        assert_close(td.rmssd, 100.0, 1e-12);
        assert_close(td.pnn50, 100.0, 1e-12);
        // 39 differences of ±100 around a near-zero mean.
        assert!(td.sdsd > 100.0 && td.sdsd < 102.0);
        assert_eq!(td.triangular_index, Some(2.0));
    }

    #[test]
    fn sensor_heart_rate_takes_precedence() {
        let points: Vec<RRPoint> = RRSeries::from_intervals(&[1000; 10])
            .points
            .into_iter()
            .map(|p| p.with_hr(58))
            .collect();
        let td = time_domain(&points, &TimeDomainConfig::default())
            .found()
            .unwrap();
        assert_eq!(td.hr_source, HrSource::Sensor);
        assert_eq!(td.mean_hr, 58.0);
        assert_eq!(td.triangular_index, None);
    }

    #[test]
    fn sparse_beats_fall_back_to_mean_rr() {
        let points: Vec<RRPoint> = (0..4).map(|i| RRPoint::new(i * 20_000, 1200)).collect();
        let td = time_domain(&points, &TimeDomainConfig::default())
            .found()
            .unwrap();
        assert_eq!(td.hr_source, HrSource::MeanRr);
        assert_close(td.mean_hr, 50.0, 1e-12);
    }

    #[test]
    fn single_beat_is_insufficient() {
        let outcome = time_domain(&[RRPoint::new(0, 900)], &TimeDomainConfig::default());
        assert_eq!(
            outcome.reason(),
            Some(Insufficient::TooFewBeats {
                required: 2,
                available: 1
            })
        );
    }
}
