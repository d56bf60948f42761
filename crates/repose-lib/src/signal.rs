use serde::{Deserialize, Serialize};

/// One beat-to-beat interval as delivered by the beat detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RRPoint {
    /// Beat timestamp in milliseconds, non-decreasing within a recording
    pub timestamp_ms: i64,
    /// Interval in milliseconds
    pub rr_ms: u32,
    /// Heart rate reported by the sensor alongside this beat, if any
    #[serde(default)]
    pub hr_bpm: Option<u16>,
}

impl RRPoint {
    pub fn new(timestamp_ms: i64, rr_ms: u32) -> Self {
        Self {
            timestamp_ms,
            rr_ms,
            hr_bpm: None,
        }
    }

    pub fn with_hr(mut self, hr_bpm: u16) -> Self {
        self.hr_bpm = Some(hr_bpm);
        self
    }

    pub fn value(&self) -> f64 {
        self.rr_ms as f64
    }
}

/// RR intervals (milliseconds) of one recording session.
///
/// Created once by the collector and only read by the analysis code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub points: Vec<RRPoint>,
}

impl RRSeries {
    pub fn new(points: Vec<RRPoint>) -> Self {
        Self { points }
    }

    /// Build a series from bare intervals, accumulating timestamps from zero.
    pub fn from_intervals(intervals: &[u32]) -> Self {
        let mut acc = 0i64;
        let points = intervals
            .iter()
            .map(|&rr| {
                acc += rr as i64;
                RRPoint::new(acc, rr)
            })
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(RRPoint::value).collect()
    }

    pub fn start_ms(&self) -> Option<i64> {
        self.points.first().map(|p| p.timestamp_ms)
    }

    pub fn end_ms(&self) -> Option<i64> {
        self.points.last().map(|p| p.timestamp_ms)
    }

    /// Span between first and last beat timestamps.
    pub fn duration_ms(&self) -> i64 {
        match (self.start_ms(), self.end_ms()) {
            (Some(start), Some(end)) => (end - start).max(0),
            _ => 0,
        }
    }

    /// Index of the beat whose timestamp is closest to `timestamp_ms`.
    pub fn nearest_index(&self, timestamp_ms: i64) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self
            .points
            .partition_point(|p| p.timestamp_ms < timestamp_ms);
        if idx == 0 {
            return Some(0);
        }
        if idx >= self.points.len() {
            return Some(self.points.len() - 1);
        }
        let before = timestamp_ms - self.points[idx - 1].timestamp_ms;
        let after = self.points[idx].timestamp_ms - timestamp_ms;
        Some(if before <= after { idx - 1 } else { idx })
    }
}
