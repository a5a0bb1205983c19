//! Per-frame marker reduction: filtering, self time, removal cascading and
//! parent-marker scoping.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

use crate::{DEFAULT_BUCKET_COUNT, TraceModel};

/// Call-stack depth filter: everything, or one exact depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthFilter {
    All,
    Exact(u32),
}

/// Thread inclusion: every thread, or an allow-list of thread names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSelection {
    All,
    Only(Vec<String>),
}

/// Frame selection: the whole capture, or an explicit display-index subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSelection {
    All,
    Frames(Vec<i32>),
}

/// Caller-owned filter settings for one analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub threads: ThreadSelection,
    pub depth_filter: DepthFilter,
    pub parent_marker: Option<String>,
    pub self_time: bool,
    pub remove_marker: Option<String>,
    pub frames: FrameSelection,
    pub bucket_count: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            threads: ThreadSelection::All,
            depth_filter: DepthFilter::All,
            parent_marker: None,
            self_time: false,
            remove_marker: None,
            frames: FrameSelection::All,
            bucket_count: DEFAULT_BUCKET_COUNT,
        }
    }
}

impl AnalysisOptions {
    /// Resolve name-based settings against one trace's name tables.
    pub fn resolve(&self, model: &TraceModel) -> ResolvedFilters {
        let threads = match &self.threads {
            ThreadSelection::All => None,
            ThreadSelection::Only(names) => Some(
                names
                    .iter()
                    .filter_map(|name| model.thread_id(name))
                    .collect::<BTreeSet<u32>>(),
            ),
        };
        let scope = match &self.parent_marker {
            None => ParentScope::Off,
            Some(name) => match model.marker_id(name) {
                Some(id) => ParentScope::Marker(id),
                // Named parent never occurs in this trace: the scope stays armed
                // but never activates, so the analysis filters to empty.
                None => ParentScope::Absent,
            },
        };
        ResolvedFilters {
            threads,
            depth_filter: self.depth_filter,
            scope,
            self_time: self.self_time,
            remove: self
                .remove_marker
                .as_deref()
                .and_then(|name| model.marker_id(name)),
        }
    }

    /// Storage offsets to analyze, in selection order. Out-of-range display
    /// indices clamp (with a diagnostic) rather than fail.
    pub fn selection(&self, model: &TraceModel) -> Vec<usize> {
        match &self.frames {
            FrameSelection::All => model.all_offsets(),
            FrameSelection::Frames(indices) => indices
                .iter()
                .filter_map(|display| model.resolve_display(*display))
                .collect(),
        }
    }
}

/// Filter settings resolved to name ids for one trace.
#[derive(Debug, Clone)]
pub struct ResolvedFilters {
    pub threads: Option<BTreeSet<u32>>,
    pub depth_filter: DepthFilter,
    pub scope: ParentScope,
    pub self_time: bool,
    pub remove: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentScope {
    Off,
    Marker(u32),
    Absent,
}

/// Per-marker accumulator for one frame.
///
/// `ms_removed` / `ms_ignored` stay `None` until an adjustment actually occurs,
/// so "no adjustment" is distinguishable from adjustments summing to zero.
#[derive(Debug, Clone)]
pub struct FrameMarkerSlot {
    pub count: u32,
    pub ms_total: f64,
    pub ms_min_individual: f64,
    pub ms_max_individual: f64,
    pub min_depth: u32,
    pub max_depth: u32,
    pub threads: Vec<u32>,
    pub ms_removed: Option<f64>,
    pub ms_ignored: Option<f64>,
}

impl Default for FrameMarkerSlot {
    fn default() -> Self {
        Self {
            count: 0,
            ms_total: 0.0,
            ms_min_individual: f64::MAX,
            ms_max_individual: 0.0,
            min_depth: u32::MAX,
            max_depth: 0,
            threads: Vec::new(),
            ms_removed: None,
            ms_ignored: None,
        }
    }
}

impl FrameMarkerSlot {
    /// True when the reducer wrote anything into this slot.
    pub fn touched(&self) -> bool {
        self.count > 0 || self.ms_removed.is_some() || self.ms_ignored.is_some()
    }
}

/// Per-thread accumulator for one frame: depth-1 marker time split into busy
/// and idle buckets.
#[derive(Debug, Clone, Default)]
pub struct FrameThreadSlot {
    pub present: bool,
    pub ms_busy: f64,
    pub ms_idle: f64,
}

impl FrameThreadSlot {
    pub fn ms_total(&self) -> f64 {
        self.ms_busy + self.ms_idle
    }
}

/// One frame's reduction output. Owned by exactly one reducer invocation;
/// frames never share slots.
#[derive(Debug, Clone)]
pub struct FrameReduction {
    pub offset: usize,
    pub display_index: i32,
    pub frame_ms: f64,
    pub markers: Vec<FrameMarkerSlot>,
    pub threads: Vec<FrameThreadSlot>,
}

struct OpenMarker {
    name: u32,
    depth: u32,
    accepted: bool,
}

/// Reduce one frame's marker streams into per-marker and per-thread slots.
///
/// Returns `None` when the frame slot holds no data; the caller treats that as
/// an absent contribution, not an error.
pub fn reduce_frame(
    model: &TraceModel,
    offset: usize,
    filters: &ResolvedFilters,
) -> Option<FrameReduction> {
    let frame = model.frame(offset)?;
    let mut out = FrameReduction {
        offset,
        display_index: model.display_index(offset),
        frame_ms: frame.duration_ms,
        markers: vec![FrameMarkerSlot::default(); model.marker_names().len()],
        threads: vec![FrameThreadSlot::default(); model.thread_names().len()],
    };
    for slice_idx in 0..frame.threads.len() {
        reduce_slice(model, offset, slice_idx, filters, &mut out);
    }
    Some(out)
}

fn reduce_slice(
    model: &TraceModel,
    offset: usize,
    slice_idx: usize,
    filters: &ResolvedFilters,
    out: &mut FrameReduction,
) {
    let Some(frame) = model.frame(offset) else {
        return;
    };
    let slice = &frame.threads[slice_idx];
    let child_ms = model.child_ms(offset, slice_idx);
    let selected = filters
        .threads
        .as_ref()
        .is_none_or(|set| set.contains(&slice.thread));
    let is_main = slice.thread == model.main_thread();
    let idle = model.idle_marker();

    let mut open: Vec<OpenMarker> = Vec::new();
    // Samples at depths greater than this are inside a removed subtree.
    let mut ignore_below: Option<u32> = None;
    // Depth at which the scope parent was last seen open.
    let mut scope_depth: Option<u32> = None;

    for (i, sample) in slice.samples.iter().enumerate() {
        let depth = sample.depth.max(1);
        while open.last().is_some_and(|m| m.depth >= depth) {
            open.pop();
        }
        if ignore_below.is_some_and(|limit| depth <= limit) {
            ignore_below = None;
        }
        if scope_depth.is_some_and(|parent| depth <= parent) {
            scope_depth = None;
        }

        if filters.remove == Some(sample.name) {
            remove_sample(sample.ms, &open, filters, selected, is_main, idle, slice.thread, out);
            if selected {
                let slot = &mut out.markers[sample.name as usize];
                slot.count = slot.count.saturating_add(1);
                *slot.ms_ignored.get_or_insert(0.0) += sample.ms;
                // The instance still counts, with zero contribution.
                slot.ms_min_individual = slot.ms_min_individual.min(0.0);
                slot.ms_max_individual = slot.ms_max_individual.max(0.0);
                slot.min_depth = slot.min_depth.min(depth);
                slot.max_depth = slot.max_depth.max(depth);
                add_thread(&mut slot.threads, slice.thread);
            }
            if ignore_below.is_none() {
                ignore_below = Some(depth);
            }
            open.push(OpenMarker { name: sample.name, depth, accepted: false });
            continue;
        }

        if ignore_below.is_some() {
            if selected {
                let slot = &mut out.markers[sample.name as usize];
                *slot.ms_ignored.get_or_insert(0.0) += sample.ms;
            }
            open.push(OpenMarker { name: sample.name, depth, accepted: false });
            continue;
        }

        let in_scope = match filters.scope {
            ParentScope::Off => true,
            ParentScope::Absent => false,
            ParentScope::Marker(id) => {
                if sample.name == id {
                    scope_depth = Some(depth);
                    true
                } else {
                    scope_depth.is_some()
                }
            }
        };
        let depth_ok = match filters.depth_filter {
            DepthFilter::All => true,
            DepthFilter::Exact(wanted) => depth == wanted,
        };

        let contribution = if filters.self_time {
            sample.ms - child_ms.get(i).copied().unwrap_or(0.0)
        } else {
            sample.ms
        };

        let accepted = in_scope && depth_ok && selected;
        if accepted {
            let slot = &mut out.markers[sample.name as usize];
            slot.count = slot.count.saturating_add(1);
            slot.ms_total += contribution;
            slot.ms_min_individual = slot.ms_min_individual.min(contribution);
            slot.ms_max_individual = slot.ms_max_individual.max(contribution);
            slot.min_depth = slot.min_depth.min(depth);
            slot.max_depth = slot.max_depth.max(depth);
            add_thread(&mut slot.threads, slice.thread);
            if depth == 1 {
                let thread_slot = &mut out.threads[slice.thread as usize];
                thread_slot.present = true;
                if idle == Some(sample.name) {
                    thread_slot.ms_idle += contribution;
                } else {
                    thread_slot.ms_busy += contribution;
                }
            }
        }
        open.push(OpenMarker { name: sample.name, depth, accepted });
    }
}

/// Removal cascade for one matched sample: the frame total reflects removal on
/// the main thread, and (outside self-time mode) open ancestors and the depth-1
/// bucket give the removed time back.
#[allow(clippy::too_many_arguments)]
fn remove_sample(
    ms: f64,
    open: &[OpenMarker],
    filters: &ResolvedFilters,
    selected: bool,
    is_main: bool,
    idle: Option<u32>,
    thread: u32,
    out: &mut FrameReduction,
) {
    if is_main {
        out.frame_ms -= ms;
    }
    if filters.self_time || !selected {
        return;
    }
    // Nested same-named removals walk the same ancestors again; their totals
    // are decremented more than once in that case.
    for ancestor in open.iter().filter(|m| m.accepted) {
        let slot = &mut out.markers[ancestor.name as usize];
        slot.ms_total -= ms;
        *slot.ms_removed.get_or_insert(0.0) += ms;
    }
    if let Some(root) = open.first()
        && root.accepted
        && root.depth == 1
    {
        let thread_slot = &mut out.threads[thread as usize];
        if idle == Some(root.name) {
            thread_slot.ms_idle -= ms;
        } else {
            thread_slot.ms_busy -= ms;
        }
    }
}

fn add_thread(threads: &mut Vec<u32>, id: u32) {
    if let Err(pos) = threads.binary_search(&id) {
        threads.insert(pos, id);
    }
}
