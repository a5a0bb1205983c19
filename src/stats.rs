//! Shared statistics builder: sample distributions and fixed-bucket histograms.

use serde::{Deserialize, Serialize};

/// Histogram bucket count used when the caller does not configure one.
pub const DEFAULT_BUCKET_COUNT: usize = 40;

/// One sampled value tagged with the display frame index that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameValue {
    pub frame: i32,
    pub value: f64,
}

impl FrameValue {
    pub fn new(frame: i32, value: f64) -> Self {
        Self { frame, value }
    }
}

/// Fixed-range, fixed-bucket-count frequency distribution.
///
/// Bucket boundaries are computed once from the range passed to [`Histogram::build`]
/// and never resized afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<u32>,
}

impl Histogram {
    pub fn build(values: impl Iterator<Item = f64>, min: f64, max: f64, buckets: usize) -> Self {
        let buckets = buckets.max(1);
        let mut counts = vec![0u32; buckets];
        let span = max - min;
        for value in values {
            let idx = if span <= 0.0 {
                0
            } else {
                let raw = ((value - min) / span * buckets as f64).floor() as usize;
                raw.min(buckets - 1)
            };
            counts[idx] = counts[idx].saturating_add(1);
        }
        Self { min, max, counts }
    }

    pub fn bucket_count(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| u64::from(*c)).sum()
    }
}

/// Summary statistics over one sample series, with frame back-references for
/// the extreme and median samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub lower_quartile: f64,
    pub upper_quartile: f64,
    pub min_frame: i32,
    pub max_frame: i32,
    pub median_frame: i32,
    pub histogram: Histogram,
}

/// Summarize a per-frame sample series. Returns `None` for an empty series.
///
/// Median is the lower middle element of the sorted samples; quartiles sit at
/// sorted positions `(n - 1) / 4` and `3 * (n - 1) / 4`. Ties sort by frame
/// index so repeated runs pick the same back-references.
pub fn summarize(samples: &[FrameValue], buckets: usize) -> Option<Distribution> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.value.total_cmp(&b.value).then_with(|| a.frame.cmp(&b.frame)));

    let n = sorted.len();
    let sum: f64 = sorted.iter().map(|s| s.value).sum();
    let min = sorted[0];
    let max = sorted[n - 1];
    let median = sorted[(n - 1) / 2];
    let lower = sorted[(n - 1) / 4];
    let upper = sorted[3 * (n - 1) / 4];
    let histogram = Histogram::build(sorted.iter().map(|s| s.value), min.value, max.value, buckets);

    Some(Distribution {
        count: n,
        sum,
        mean: sum / n as f64,
        min: min.value,
        max: max.value,
        median: median.value,
        lower_quartile: lower.value,
        upper_quartile: upper.value,
        min_frame: min.frame,
        max_frame: max.frame,
        median_frame: median.frame,
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<FrameValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| FrameValue::new(i as i32, *v))
            .collect()
    }

    #[test]
    fn empty_series_has_no_distribution() {
        assert!(summarize(&[], 8).is_none());
    }

    #[test]
    fn single_sample_collapses_all_statistics() {
        let d = summarize(&series(&[4.5]), 8).unwrap();
        assert_eq!(d.count, 1);
        assert_eq!(d.min, 4.5);
        assert_eq!(d.max, 4.5);
        assert_eq!(d.median, 4.5);
        assert_eq!(d.mean, 4.5);
        assert_eq!(d.lower_quartile, 4.5);
        assert_eq!(d.upper_quartile, 4.5);
        assert_eq!(d.histogram.total(), 1);
    }

    #[test]
    fn even_length_median_picks_lower_middle() {
        let d = summarize(&series(&[1.0, 2.0, 3.0, 4.0]), 4).unwrap();
        assert_eq!(d.median, 2.0);
        assert_eq!(d.median_frame, 1);
    }

    #[test]
    fn quartiles_are_ordered() {
        let d = summarize(&series(&[9.0, 1.0, 5.0, 3.0, 7.0, 2.0, 8.0]), 4).unwrap();
        assert!(d.min <= d.lower_quartile);
        assert!(d.lower_quartile <= d.median);
        assert!(d.median <= d.upper_quartile);
        assert!(d.upper_quartile <= d.max);
    }

    #[test]
    fn extreme_back_references_point_at_their_frames() {
        let samples = vec![
            FrameValue::new(10, 3.0),
            FrameValue::new(11, 9.0),
            FrameValue::new(12, 1.0),
        ];
        let d = summarize(&samples, 4).unwrap();
        assert_eq!(d.min_frame, 12);
        assert_eq!(d.max_frame, 11);
        assert_eq!(d.median_frame, 10);
    }

    #[test]
    fn histogram_counts_sum_to_sample_count() {
        let values = [0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.0, 3.0, 10.0];
        let d = summarize(&series(&values), 5).unwrap();
        assert_eq!(d.histogram.total(), values.len() as u64);
        assert_eq!(d.histogram.bucket_count(), 5);
    }

    #[test]
    fn histogram_with_zero_span_uses_first_bucket() {
        let h = Histogram::build([2.0, 2.0, 2.0].into_iter(), 2.0, 2.0, 6);
        assert_eq!(h.counts[0], 3);
        assert_eq!(h.total(), 3);
    }

    #[test]
    fn histogram_max_value_lands_in_last_bucket() {
        let h = Histogram::build([0.0, 10.0].into_iter(), 0.0, 10.0, 4);
        assert_eq!(h.counts[0], 1);
        assert_eq!(h.counts[3], 1);
    }
}
