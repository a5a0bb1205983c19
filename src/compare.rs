//! Pairing and comparison of two independently built analyses.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use crate::{Analysis, DepthFilter, Histogram, MarkerData};

/// A same-named marker associated across two analyses. A side where the name
/// never appeared carries no index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPairing {
    pub name: String,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

/// Thread-name pairing counts between two analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPairingSummary {
    pub matching: usize,
    pub left_only: usize,
    pub right_only: usize,
}

/// Two histograms rebuilt over the union of both sides' ranges so they can be
/// compared bar for bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedBuckets {
    pub min: f64,
    pub max: f64,
    pub left: Histogram,
    pub right: Histogram,
}

/// Result of pairing two analyses. Rebuilt from scratch on every comparison;
/// nothing here is updated incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub pairings: Vec<MarkerPairing>,
    pub threads: ThreadPairingSummary,
    /// Most frequent `right_min_depth - left_min_depth` across paired markers,
    /// usable as a depth-filter offset for the right side.
    pub depth_offset: i32,
    pub frame_buckets: Option<SharedBuckets>,
}

/// Pair two analyses by marker and thread name and derive the depth offset.
pub fn compare(left: &Analysis, right: &Analysis) -> Comparison {
    let bucket_count = shared_bucket_count(left, right);
    let pairings = pair_markers(left, right);
    Comparison {
        threads: pair_threads(left, right),
        depth_offset: depth_offset(left, right, &pairings),
        frame_buckets: frame_shared_buckets(left, right, bucket_count),
        pairings,
    }
}

fn shared_bucket_count(left: &Analysis, right: &Analysis) -> usize {
    if left.bucket_count != right.bucket_count {
        tracing::warn!(
            "bucket counts differ between analyses ({} vs {}), comparing over the smaller",
            left.bucket_count,
            right.bucket_count
        );
    }
    left.bucket_count.min(right.bucket_count).max(1)
}

/// One pairing per name appearing on either side: left-side markers first in
/// their own order, then right-only names in right order.
pub fn pair_markers(left: &Analysis, right: &Analysis) -> Vec<MarkerPairing> {
    let left_index: BTreeMap<&str, usize> = left
        .markers
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.as_str(), i))
        .collect();
    let right_index: BTreeMap<&str, usize> = right
        .markers
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.as_str(), i))
        .collect();

    let mut pairings = Vec::with_capacity(left.markers.len() + right.markers.len());
    for (i, marker) in left.markers.iter().enumerate() {
        pairings.push(MarkerPairing {
            name: marker.name.clone(),
            left: Some(i),
            right: right_index.get(marker.name.as_str()).copied(),
        });
    }
    for (i, marker) in right.markers.iter().enumerate() {
        if !left_index.contains_key(marker.name.as_str()) {
            pairings.push(MarkerPairing {
                name: marker.name.clone(),
                left: None,
                right: Some(i),
            });
        }
    }
    pairings
}

fn pair_threads(left: &Analysis, right: &Analysis) -> ThreadPairingSummary {
    let mut summary = ThreadPairingSummary {
        matching: 0,
        left_only: 0,
        right_only: 0,
    };
    for thread in &left.threads {
        if right.thread_by_name(&thread.name).is_some() {
            summary.matching += 1;
        } else {
            summary.left_only += 1;
        }
    }
    for thread in &right.threads {
        if left.thread_by_name(&thread.name).is_none() {
            summary.right_only += 1;
        }
    }
    summary
}

/// Mode of the signed min-depth difference across markers paired on both
/// sides. Ties go to the highest count, then the smallest absolute difference,
/// then the smaller signed value.
pub fn depth_offset(left: &Analysis, right: &Analysis, pairings: &[MarkerPairing]) -> i32 {
    let mut diffs: BTreeMap<i32, usize> = BTreeMap::new();
    for pairing in pairings {
        let (Some(li), Some(ri)) = (pairing.left, pairing.right) else {
            continue;
        };
        let diff = right.markers[ri].min_depth as i32 - left.markers[li].min_depth as i32;
        *diffs.entry(diff).or_insert(0) += 1;
    }

    let mut best: Option<(i32, usize)> = None;
    for (&diff, &count) in &diffs {
        let better = match best {
            None => true,
            Some((best_diff, best_count)) => {
                count > best_count || (count == best_count && diff.abs() < best_diff.abs())
            }
        };
        if better {
            best = Some((diff, count));
        }
    }
    best.map(|(diff, _)| diff).unwrap_or(0)
}

/// Derive the right-hand depth filter that matches a left-hand one, given the
/// adopted depth offset. Depths stay 1-based.
pub fn aligned_depth_filter(left: DepthFilter, offset: i32) -> DepthFilter {
    match left {
        DepthFilter::All => DepthFilter::All,
        DepthFilter::Exact(depth) => {
            let shifted = i64::from(depth) + i64::from(offset);
            DepthFilter::Exact(shifted.max(1) as u32)
        }
    }
}

/// Rebuild both sides' per-frame duration histograms for one paired marker
/// over the union of their ranges.
pub fn marker_shared_buckets(
    left: &MarkerData,
    right: &MarkerData,
    buckets: usize,
) -> SharedBuckets {
    shared_buckets(
        left.frames.iter().map(|f| f.ms),
        right.frames.iter().map(|f| f.ms),
        left.duration.min.min(right.duration.min),
        left.duration.max.max(right.duration.max),
        buckets,
    )
}

/// Shared-range histograms over both sides' whole-frame durations. `None` when
/// either side analyzed no frames.
pub fn frame_shared_buckets(
    left: &Analysis,
    right: &Analysis,
    buckets: usize,
) -> Option<SharedBuckets> {
    let left_duration = left.frame_summary.duration.as_ref()?;
    let right_duration = right.frame_summary.duration.as_ref()?;
    Some(shared_buckets(
        left.frame_summary.frames.iter().map(|f| f.value),
        right.frame_summary.frames.iter().map(|f| f.value),
        left_duration.min.min(right_duration.min),
        left_duration.max.max(right_duration.max),
        buckets,
    ))
}

fn shared_buckets(
    left: impl Iterator<Item = f64>,
    right: impl Iterator<Item = f64>,
    min: f64,
    max: f64,
    buckets: usize,
) -> SharedBuckets {
    SharedBuckets {
        min,
        max,
        left: Histogram::build(left, min, max, buckets),
        right: Histogram::build(right, min, max, buckets),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalysisOptions, Frame, MarkerSample, ThreadSlice, TraceModel, analyze};

    fn model(markers: &[&str], frames: Vec<Option<Frame>>) -> TraceModel {
        TraceModel::new(
            markers.iter().map(|s| s.to_string()).collect(),
            vec!["Main".to_string(), "Render".to_string()],
            0,
            0,
            frames,
        )
    }

    fn flat_frame(samples: Vec<MarkerSample>) -> Frame {
        let duration_ms = samples.iter().filter(|s| s.depth == 1).map(|s| s.ms).sum();
        Frame {
            start_ms: 0.0,
            duration_ms,
            threads: vec![ThreadSlice { thread: 0, samples }],
        }
    }

    fn sample(name: u32, depth: u32, ms: f64) -> MarkerSample {
        MarkerSample { name, depth, ms }
    }

    fn analysis_of(markers: &[&str], frames: Vec<Option<Frame>>) -> Analysis {
        let model = model(markers, frames);
        analyze(&model, &AnalysisOptions::default())
    }

    #[test]
    fn pairings_cover_the_union_of_names() {
        let left = analysis_of(
            &["A", "B"],
            vec![Some(flat_frame(vec![sample(0, 1, 1.0), sample(1, 2, 0.5)]))],
        );
        let right = analysis_of(
            &["B", "C"],
            vec![Some(flat_frame(vec![sample(0, 1, 1.0), sample(1, 2, 0.5)]))],
        );

        let pairings = pair_markers(&left, &right);
        assert_eq!(pairings.len(), 3);

        let a = pairings.iter().find(|p| p.name == "A").unwrap();
        assert!(a.left.is_some());
        assert_eq!(a.right, None);

        let b = pairings.iter().find(|p| p.name == "B").unwrap();
        assert!(b.left.is_some());
        assert!(b.right.is_some());

        let c = pairings.iter().find(|p| p.name == "C").unwrap();
        assert_eq!(c.left, None);
        assert!(c.right.is_some());
    }

    #[test]
    fn empty_sides_pair_to_an_empty_list() {
        let left = analysis_of(&["A"], Vec::new());
        let right = analysis_of(&["A"], Vec::new());
        let comparison = compare(&left, &right);
        assert!(comparison.pairings.is_empty());
        assert_eq!(comparison.depth_offset, 0);
        assert!(comparison.frame_buckets.is_none());
    }

    #[test]
    fn depth_offset_adopts_the_most_frequent_difference() {
        // Left: A,B,C,D at depths 1,1,1,1. Right: same names at 2,2,2,3.
        let left = analysis_of(
            &["A", "B", "C", "D"],
            vec![Some(flat_frame(vec![
                sample(0, 1, 1.0),
                sample(1, 1, 1.0),
                sample(2, 1, 1.0),
                sample(3, 1, 1.0),
            ]))],
        );
        let right = analysis_of(
            &["A", "B", "C", "D"],
            vec![Some(flat_frame(vec![
                sample(0, 2, 1.0),
                sample(1, 2, 1.0),
                sample(2, 2, 1.0),
                sample(3, 3, 1.0),
            ]))],
        );

        let comparison = compare(&left, &right);
        assert_eq!(comparison.depth_offset, 1);
    }

    #[test]
    fn depth_offset_tie_breaks_toward_zero() {
        // One marker one level deeper on the right, one marker one level
        // shallower: both differences occur once, zero-distance tie-break
        // cannot apply, so the smaller signed value wins.
        let left = analysis_of(
            &["A", "B"],
            vec![Some(flat_frame(vec![sample(0, 2, 1.0), sample(1, 2, 1.0)]))],
        );
        let right = analysis_of(
            &["A", "B"],
            vec![Some(flat_frame(vec![sample(0, 1, 1.0), sample(1, 3, 1.0)]))],
        );

        let comparison = compare(&left, &right);
        assert_eq!(comparison.depth_offset, -1);
    }

    #[test]
    fn aligned_depth_filters_shift_and_clamp() {
        assert_eq!(aligned_depth_filter(DepthFilter::All, 2), DepthFilter::All);
        assert_eq!(
            aligned_depth_filter(DepthFilter::Exact(3), 1),
            DepthFilter::Exact(4)
        );
        assert_eq!(
            aligned_depth_filter(DepthFilter::Exact(2), -5),
            DepthFilter::Exact(1)
        );
    }

    #[test]
    fn shared_buckets_span_the_union_range() {
        let left = analysis_of(&["A"], vec![Some(flat_frame(vec![sample(0, 1, 2.0)]))]);
        let right = analysis_of(&["A"], vec![Some(flat_frame(vec![sample(0, 1, 10.0)]))]);

        let a_left = left.marker_by_name("A").unwrap();
        let a_right = right.marker_by_name("A").unwrap();
        let shared = marker_shared_buckets(a_left, a_right, 8);

        assert_eq!(shared.min, 2.0);
        assert_eq!(shared.max, 10.0);
        assert_eq!(shared.left.total(), 1);
        assert_eq!(shared.right.total(), 1);
        assert_eq!(shared.left.counts[0], 1);
        assert_eq!(shared.right.counts[7], 1);
    }

    #[test]
    fn frame_buckets_count_every_selected_frame() {
        let frames_left = vec![
            Some(flat_frame(vec![sample(0, 1, 4.0)])),
            Some(flat_frame(vec![sample(0, 1, 6.0)])),
        ];
        let frames_right = vec![Some(flat_frame(vec![sample(0, 1, 12.0)]))];
        let left = analysis_of(&["A"], frames_left);
        let right = analysis_of(&["A"], frames_right);

        let comparison = compare(&left, &right);
        let buckets = comparison.frame_buckets.unwrap();
        assert_eq!(buckets.left.total(), 2);
        assert_eq!(buckets.right.total(), 1);
        assert_eq!(buckets.min, 4.0);
        assert_eq!(buckets.max, 12.0);
    }

    #[test]
    fn thread_pairing_counts_matching_and_unique_sides() {
        // Left uses Main only, right uses Main and Render.
        let left = analysis_of(&["A"], vec![Some(flat_frame(vec![sample(0, 1, 1.0)]))]);
        let right_model = model(
            &["A"],
            vec![Some(Frame {
                start_ms: 0.0,
                duration_ms: 2.0,
                threads: vec![
                    ThreadSlice {
                        thread: 0,
                        samples: vec![sample(0, 1, 1.0)],
                    },
                    ThreadSlice {
                        thread: 1,
                        samples: vec![sample(0, 1, 1.0)],
                    },
                ],
            })],
        );
        let right = analyze(&right_model, &AnalysisOptions::default());

        let comparison = compare(&left, &right);
        assert_eq!(
            comparison.threads,
            ThreadPairingSummary {
                matching: 1,
                left_only: 0,
                right_only: 1
            }
        );
    }
}
