//! Sequential merge of per-frame reductions into an immutable analysis.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::{
    AnalysisOptions, AnalysisPhase, AnalysisProgress, Distribution, FrameReduction, FrameValue,
    TraceModel, reduce_frames, summarize,
};

/// One frame's contribution to a marker: per-frame total and occurrence count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerFrame {
    pub frame: i32,
    pub ms: f64,
    pub count: u32,
}

/// Aggregated statistics for one marker name across the selected frame range.
///
/// Owned exclusively by its [`Analysis`]; a new filter setting produces a new
/// analysis rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerData {
    pub name: String,
    pub first_frame: i32,
    pub frames_seen: usize,
    pub total_count: u64,
    pub ms_total: f64,
    pub min_depth: u32,
    pub max_depth: u32,
    pub threads: Vec<String>,
    pub ms_min_individual: f64,
    pub ms_max_individual: f64,
    pub min_individual_frame: i32,
    pub max_individual_frame: i32,
    pub ms_removed: Option<f64>,
    pub ms_ignored: Option<f64>,
    /// Distribution of the per-frame millisecond totals.
    pub duration: Distribution,
    /// Distribution of the per-frame occurrence counts.
    pub count: Distribution,
    pub frames: Vec<MarkerFrame>,
}

/// One frame's contribution to a thread's frame time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadFrame {
    pub frame: i32,
    pub ms_busy: f64,
    pub ms_idle: f64,
}

/// Per-thread frame-time distribution over the selected frame range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadData {
    pub name: String,
    pub frames_seen: usize,
    pub ms_busy_total: f64,
    pub ms_idle_total: f64,
    pub frame_time: Distribution,
    pub frames: Vec<ThreadFrame>,
}

/// Distribution of whole-frame durations across the selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSummary {
    pub count: usize,
    pub ms_total: f64,
    pub first_frame: Option<i32>,
    pub last_frame: Option<i32>,
    pub duration: Option<Distribution>,
    pub frames: Vec<FrameValue>,
}

impl FrameSummary {
    fn empty() -> Self {
        Self {
            count: 0,
            ms_total: 0.0,
            first_frame: None,
            last_frame: None,
            duration: None,
            frames: Vec::new(),
        }
    }
}

/// The aggregate root produced by one analysis pass. Immutable after
/// construction; markers keep the order in which the merge first saw them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub frame_summary: FrameSummary,
    pub markers: Vec<MarkerData>,
    pub threads: Vec<ThreadData>,
    /// Display indices the analysis was built over, in selection order.
    pub selection: Vec<i32>,
    pub bucket_count: usize,
}

impl Analysis {
    pub fn marker_index(&self, name: &str) -> Option<usize> {
        self.markers.iter().position(|m| m.name == name)
    }

    pub fn marker_by_name(&self, name: &str) -> Option<&MarkerData> {
        self.marker_index(name).map(|i| &self.markers[i])
    }

    pub fn marker_at(&self, index: usize) -> Option<&MarkerData> {
        self.markers.get(index)
    }

    pub fn thread_by_name(&self, name: &str) -> Option<&ThreadData> {
        self.threads.iter().find(|t| t.name == name)
    }
}

/// Analyze a trace with the given filter settings.
pub fn analyze(model: &TraceModel, options: &AnalysisOptions) -> Analysis {
    analyze_with_progress(model, options, &AnalysisProgress::new())
}

/// Analyze a trace, advancing the caller's progress counters as frames finish.
pub fn analyze_with_progress(
    model: &TraceModel,
    options: &AnalysisOptions,
    progress: &AnalysisProgress,
) -> Analysis {
    let filters = options.resolve(model);
    let offsets = options.selection(model);
    let reductions = reduce_frames(model, &offsets, &filters, progress);
    progress.set_phase(AnalysisPhase::Merging);
    merge(model, options, &offsets, &reductions)
}

struct MarkerBuilder {
    id: u32,
    first_frame: i32,
    total_count: u64,
    ms_total: f64,
    min_depth: u32,
    max_depth: u32,
    threads: BTreeSet<u32>,
    ms_min_individual: f64,
    ms_max_individual: f64,
    min_individual_frame: i32,
    max_individual_frame: i32,
    ms_removed: Option<f64>,
    ms_ignored: Option<f64>,
    frames: Vec<MarkerFrame>,
}

struct ThreadBuilder {
    id: u32,
    ms_busy_total: f64,
    ms_idle_total: f64,
    frames: Vec<ThreadFrame>,
}

/// Merge per-frame reductions in selection order. Merge order, not completion
/// order, decides first-seen bookkeeping and sample ordering, which keeps
/// repeated runs bitwise identical.
fn merge(
    model: &TraceModel,
    options: &AnalysisOptions,
    offsets: &[usize],
    reductions: &[Option<FrameReduction>],
) -> Analysis {
    let buckets = options.bucket_count.max(1);

    let mut marker_order: Vec<MarkerBuilder> = Vec::new();
    let mut marker_index: HashMap<u32, usize> = HashMap::new();
    let mut thread_order: Vec<ThreadBuilder> = Vec::new();
    let mut thread_index: HashMap<u32, usize> = HashMap::new();
    let mut frame_values: Vec<FrameValue> = Vec::new();

    for reduction in reductions.iter().flatten() {
        frame_values.push(FrameValue::new(reduction.display_index, reduction.frame_ms));

        for (id, slot) in reduction.markers.iter().enumerate() {
            if slot.count == 0 {
                continue;
            }
            let id = id as u32;
            let at = *marker_index.entry(id).or_insert_with(|| {
                marker_order.push(MarkerBuilder {
                    id,
                    first_frame: reduction.display_index,
                    total_count: 0,
                    ms_total: 0.0,
                    min_depth: u32::MAX,
                    max_depth: 0,
                    threads: BTreeSet::new(),
                    ms_min_individual: f64::MAX,
                    ms_max_individual: f64::MIN,
                    min_individual_frame: reduction.display_index,
                    max_individual_frame: reduction.display_index,
                    ms_removed: None,
                    ms_ignored: None,
                    frames: Vec::new(),
                });
                marker_order.len() - 1
            });
            let builder = &mut marker_order[at];
            builder.total_count += u64::from(slot.count);
            builder.ms_total += slot.ms_total;
            builder.min_depth = builder.min_depth.min(slot.min_depth);
            builder.max_depth = builder.max_depth.max(slot.max_depth);
            builder.threads.extend(slot.threads.iter().copied());
            if slot.ms_min_individual < builder.ms_min_individual {
                builder.ms_min_individual = slot.ms_min_individual;
                builder.min_individual_frame = reduction.display_index;
            }
            if slot.ms_max_individual > builder.ms_max_individual {
                builder.ms_max_individual = slot.ms_max_individual;
                builder.max_individual_frame = reduction.display_index;
            }
            if let Some(ms) = slot.ms_removed {
                *builder.ms_removed.get_or_insert(0.0) += ms;
            }
            if let Some(ms) = slot.ms_ignored {
                *builder.ms_ignored.get_or_insert(0.0) += ms;
            }
            builder.frames.push(MarkerFrame {
                frame: reduction.display_index,
                ms: slot.ms_total,
                count: slot.count,
            });
        }

        for (id, slot) in reduction.threads.iter().enumerate() {
            if !slot.present {
                continue;
            }
            let id = id as u32;
            let at = *thread_index.entry(id).or_insert_with(|| {
                thread_order.push(ThreadBuilder {
                    id,
                    ms_busy_total: 0.0,
                    ms_idle_total: 0.0,
                    frames: Vec::new(),
                });
                thread_order.len() - 1
            });
            let builder = &mut thread_order[at];
            builder.ms_busy_total += slot.ms_busy;
            builder.ms_idle_total += slot.ms_idle;
            builder.frames.push(ThreadFrame {
                frame: reduction.display_index,
                ms_busy: slot.ms_busy,
                ms_idle: slot.ms_idle,
            });
        }
    }

    let markers = marker_order
        .into_iter()
        .filter_map(|builder| {
            let duration_samples: Vec<FrameValue> = builder
                .frames
                .iter()
                .map(|f| FrameValue::new(f.frame, f.ms))
                .collect();
            let count_samples: Vec<FrameValue> = builder
                .frames
                .iter()
                .map(|f| FrameValue::new(f.frame, f64::from(f.count)))
                .collect();
            let duration = summarize(&duration_samples, buckets)?;
            let count = summarize(&count_samples, buckets)?;
            Some(MarkerData {
                name: model.marker_name(builder.id).to_string(),
                first_frame: builder.first_frame,
                frames_seen: builder.frames.len(),
                total_count: builder.total_count,
                ms_total: builder.ms_total,
                min_depth: builder.min_depth,
                max_depth: builder.max_depth,
                threads: builder
                    .threads
                    .iter()
                    .map(|id| model.thread_name(*id).to_string())
                    .collect(),
                ms_min_individual: builder.ms_min_individual,
                ms_max_individual: builder.ms_max_individual,
                min_individual_frame: builder.min_individual_frame,
                max_individual_frame: builder.max_individual_frame,
                ms_removed: builder.ms_removed,
                ms_ignored: builder.ms_ignored,
                duration,
                count,
                frames: builder.frames,
            })
        })
        .collect();

    let threads = thread_order
        .into_iter()
        .filter_map(|builder| {
            let samples: Vec<FrameValue> = builder
                .frames
                .iter()
                .map(|f| FrameValue::new(f.frame, f.ms_busy + f.ms_idle))
                .collect();
            let frame_time = summarize(&samples, buckets)?;
            Some(ThreadData {
                name: model.thread_name(builder.id).to_string(),
                frames_seen: builder.frames.len(),
                ms_busy_total: builder.ms_busy_total,
                ms_idle_total: builder.ms_idle_total,
                frame_time,
                frames: builder.frames,
            })
        })
        .collect();

    let frame_summary = if frame_values.is_empty() {
        FrameSummary::empty()
    } else {
        FrameSummary {
            count: frame_values.len(),
            ms_total: frame_values.iter().map(|f| f.value).sum(),
            first_frame: frame_values.first().map(|f| f.frame),
            last_frame: frame_values.last().map(|f| f.frame),
            duration: summarize(&frame_values, buckets),
            frames: frame_values,
        }
    };

    Analysis {
        frame_summary,
        markers,
        threads,
        selection: offsets.iter().map(|&o| model.display_index(o)).collect(),
        bucket_count: buckets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Frame, FrameSelection, MarkerSample, ThreadSlice};

    const FRAME: u32 = 0;
    const UPDATE: u32 = 1;
    const GC: u32 = 2;

    fn sample(name: u32, depth: u32, ms: f64) -> MarkerSample {
        MarkerSample { name, depth, ms }
    }

    fn two_instance_frame() -> Frame {
        // Update appears twice on the main thread: 0.5ms and 1.5ms.
        Frame {
            start_ms: 0.0,
            duration_ms: 4.0,
            threads: vec![ThreadSlice {
                thread: 0,
                samples: vec![
                    sample(FRAME, 1, 4.0),
                    sample(UPDATE, 2, 0.5),
                    sample(UPDATE, 2, 1.5),
                ],
            }],
        }
    }

    fn model(frames: Vec<Option<Frame>>) -> TraceModel {
        TraceModel::new(
            vec!["Frame".to_string(), "Update".to_string(), "GC".to_string()],
            vec!["Main".to_string()],
            0,
            0,
            frames,
        )
    }

    #[test]
    fn same_named_instances_sum_within_and_across_frames() {
        let model = model(vec![Some(two_instance_frame()), Some(two_instance_frame())]);
        let analysis = analyze(&model, &AnalysisOptions::default());

        let update = analysis.marker_by_name("Update").unwrap();
        assert_eq!(update.total_count, 4);
        assert_eq!(update.ms_total, 4.0);
        assert_eq!(update.frames.len(), 2);
        assert_eq!(update.frames[0].ms, 2.0);
        assert_eq!(update.ms_min_individual, 0.5);
        assert_eq!(update.ms_max_individual, 1.5);
    }

    #[test]
    fn removing_a_child_over_two_frames_gives_back_its_time() {
        // Parent 2.0ms per frame with a 0.1ms child, over two frames.
        let frame = Frame {
            start_ms: 0.0,
            duration_ms: 2.0,
            threads: vec![ThreadSlice {
                thread: 0,
                samples: vec![sample(UPDATE, 1, 2.0), sample(GC, 2, 0.1)],
            }],
        };
        let model = model(vec![Some(frame.clone()), Some(frame)]);
        let mut options = AnalysisOptions::default();
        options.remove_marker = Some("GC".to_string());
        let analysis = analyze(&model, &options);

        let update = analysis.marker_by_name("Update").unwrap();
        assert!((update.ms_total - 3.8).abs() < 1e-9);
        assert_eq!(update.ms_removed, Some(0.2));

        // The removed marker keeps its occurrences but loses all duration.
        let gc = analysis.marker_by_name("GC").unwrap();
        assert_eq!(gc.total_count, 2);
        assert_eq!(gc.ms_total, 0.0);

        // Frame totals drop by count(GC) x duration(GC).
        assert!((analysis.frame_summary.ms_total - 3.8).abs() < 1e-9);
    }

    #[test]
    fn self_time_equals_total_minus_child_time() {
        let frame = Frame {
            start_ms: 0.0,
            duration_ms: 4.0,
            threads: vec![ThreadSlice {
                thread: 0,
                samples: vec![
                    sample(FRAME, 1, 4.0),
                    sample(UPDATE, 2, 3.0),
                    sample(GC, 3, 1.0),
                ],
            }],
        };
        let model = model(vec![Some(frame)]);
        let mut options = AnalysisOptions::default();
        options.self_time = true;
        let analysis = analyze(&model, &options);

        assert_eq!(analysis.marker_by_name("Frame").unwrap().ms_total, 1.0);
        assert_eq!(analysis.marker_by_name("Update").unwrap().ms_total, 2.0);
        assert_eq!(analysis.marker_by_name("GC").unwrap().ms_total, 1.0);
    }

    #[test]
    fn empty_selection_yields_an_empty_analysis() {
        let model = model(Vec::new());
        let analysis = analyze(&model, &AnalysisOptions::default());

        assert_eq!(analysis.frame_summary.count, 0);
        assert!(analysis.markers.is_empty());
        assert!(analysis.threads.is_empty());
        assert!(analysis.frame_summary.duration.is_none());
    }

    #[test]
    fn single_frame_collapses_marker_statistics() {
        let model = model(vec![Some(two_instance_frame())]);
        let analysis = analyze(&model, &AnalysisOptions::default());

        let update = analysis.marker_by_name("Update").unwrap();
        assert_eq!(update.duration.median, update.duration.mean);
        assert_eq!(update.duration.min, update.duration.max);
        assert_eq!(update.duration.median, 2.0);
    }

    #[test]
    fn thread_frame_times_track_depth_one_markers() {
        let model = model(vec![Some(two_instance_frame()), Some(two_instance_frame())]);
        let analysis = analyze(&model, &AnalysisOptions::default());

        let main = analysis.thread_by_name("Main").unwrap();
        assert_eq!(main.frames_seen, 2);
        assert_eq!(main.ms_busy_total, 8.0);
        assert_eq!(main.ms_idle_total, 0.0);
        assert_eq!(main.frame_time.median, 4.0);
    }

    #[test]
    fn histogram_counts_match_frames_seen() {
        let model = model(vec![Some(two_instance_frame()); 5]);
        let analysis = analyze(&model, &AnalysisOptions::default());

        let update = analysis.marker_by_name("Update").unwrap();
        assert_eq!(update.duration.histogram.total(), 5);
        let summary = analysis.frame_summary.duration.as_ref().unwrap();
        assert_eq!(summary.histogram.total(), 5);
    }

    #[test]
    fn explicit_frame_subsets_keep_selection_order() {
        let mut frames = Vec::new();
        for i in 0..4 {
            let mut frame = two_instance_frame();
            frame.duration_ms = 4.0 + i as f64;
            frame.threads[0].samples[0].ms = 4.0 + i as f64;
            frames.push(Some(frame));
        }
        let model = model(frames);
        let mut options = AnalysisOptions::default();
        options.frames = FrameSelection::Frames(vec![3, 1]);
        let analysis = analyze(&model, &options);

        assert_eq!(analysis.selection, vec![3, 1]);
        assert_eq!(analysis.frame_summary.frames[0].frame, 3);
        assert_eq!(analysis.frame_summary.frames[1].frame, 1);
        assert_eq!(analysis.frame_summary.first_frame, Some(3));
        assert_eq!(analysis.frame_summary.ms_total, 7.0 + 5.0);
    }

    #[test]
    fn repeated_analysis_is_bitwise_identical() {
        let model = model(vec![Some(two_instance_frame()); 16]);
        let options = AnalysisOptions::default();
        let a = analyze(&model, &options);
        let b = analyze(&model, &options);
        assert_eq!(a, b);
    }

    #[test]
    fn quartile_ordering_holds_for_frame_summaries() {
        let mut frames = Vec::new();
        for ms in [3.0, 9.0, 1.0, 7.0, 5.0, 2.0, 8.0] {
            let mut frame = two_instance_frame();
            frame.duration_ms = ms;
            frames.push(Some(frame));
        }
        let model = model(frames);
        let analysis = analyze(&model, &AnalysisOptions::default());
        let d = analysis.frame_summary.duration.as_ref().unwrap();

        assert!(d.min <= d.lower_quartile);
        assert!(d.lower_quartile <= d.median);
        assert!(d.median <= d.upper_quartile);
        assert!(d.upper_quartile <= d.max);
    }
}
