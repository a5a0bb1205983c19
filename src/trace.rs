//! In-memory trace model: frames of per-thread pre-order marker streams.

use serde::{Deserialize, Serialize};

/// Marker name treated as idle time when it appears at depth 1.
pub const IDLE_MARKER: &str = "Idle";

/// A named interval sample captured at a 1-based call-stack depth.
///
/// Within one thread's sample array a marker always precedes its children and
/// children carry `depth == parent.depth + 1` (depth-first pre-order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerSample {
    pub name: u32,
    pub depth: u32,
    pub ms: f64,
}

/// One thread's ordered samples for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSlice {
    pub thread: u32,
    pub samples: Vec<MarkerSample>,
}

/// One captured frame: every thread's sample stream plus the frame envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub start_ms: f64,
    pub duration_ms: f64,
    pub threads: Vec<ThreadSlice>,
}

/// The read-only trace handed to analysis: frames, name tables, the main-thread
/// designation, and the display-index ↔ storage-offset bijection.
///
/// Child times are precomputed per thread slice at construction so self-time
/// analysis never re-walks the sample arrays.
#[derive(Debug, Clone)]
pub struct TraceModel {
    marker_names: Vec<String>,
    thread_names: Vec<String>,
    main_thread: u32,
    frame_offset: i32,
    frames: Vec<Option<Frame>>,
    child_ms: Vec<Vec<Vec<f64>>>,
    idle_marker: Option<u32>,
}

impl TraceModel {
    pub fn new(
        marker_names: Vec<String>,
        thread_names: Vec<String>,
        main_thread: u32,
        frame_offset: i32,
        frames: Vec<Option<Frame>>,
    ) -> Self {
        let child_ms = frames
            .iter()
            .map(|frame| match frame {
                Some(frame) => frame
                    .threads
                    .iter()
                    .map(|slice| child_times(&slice.samples))
                    .collect(),
                None => Vec::new(),
            })
            .collect();
        let idle_marker = marker_names
            .iter()
            .position(|n| n == IDLE_MARKER)
            .map(|i| i as u32);
        Self {
            marker_names,
            thread_names,
            main_thread,
            frame_offset,
            frames,
            child_ms,
            idle_marker,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Option<Frame>] {
        &self.frames
    }

    pub fn frame_offset(&self) -> i32 {
        self.frame_offset
    }

    /// Frame at a storage offset; `None` for an out-of-range offset or a frame
    /// slot with no data yet.
    pub fn frame(&self, offset: usize) -> Option<&Frame> {
        self.frames.get(offset).and_then(|f| f.as_ref())
    }

    /// Precomputed direct-child time for one thread slice, aligned with its
    /// sample array.
    pub fn child_ms(&self, offset: usize, slice: usize) -> &[f64] {
        static EMPTY: [f64; 0] = [];
        self.child_ms
            .get(offset)
            .and_then(|f| f.get(slice))
            .map(|v| v.as_slice())
            .unwrap_or(&EMPTY)
    }

    pub fn marker_names(&self) -> &[String] {
        &self.marker_names
    }

    pub fn thread_names(&self) -> &[String] {
        &self.thread_names
    }

    pub fn marker_name(&self, id: u32) -> &str {
        self.marker_names
            .get(id as usize)
            .map(|s| s.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn thread_name(&self, id: u32) -> &str {
        self.thread_names
            .get(id as usize)
            .map(|s| s.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn marker_id(&self, name: &str) -> Option<u32> {
        self.marker_names.iter().position(|n| n == name).map(|i| i as u32)
    }

    pub fn thread_id(&self, name: &str) -> Option<u32> {
        self.thread_names.iter().position(|n| n == name).map(|i| i as u32)
    }

    pub fn main_thread(&self) -> u32 {
        self.main_thread
    }

    pub fn idle_marker(&self) -> Option<u32> {
        self.idle_marker
    }

    /// Display index shown for a storage offset.
    pub fn display_index(&self, offset: usize) -> i32 {
        offset as i32 + self.frame_offset
    }

    /// Storage offset for a display index, clamped into the valid range.
    ///
    /// Returns `None` only for an empty trace; out-of-range indices clamp to
    /// the nearest valid frame and log a diagnostic.
    pub fn resolve_display(&self, display: i32) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        let last = self.frames.len() - 1;
        let idx = display;
        let raw = i64::from(idx) - i64::from(self.frame_offset);
        if raw < 0 {
            tracing::warn!("frame index {} below range, clamping to first frame", idx);
            return Some(0);
        }
        let offset = raw as usize;
        if offset > last {
            tracing::warn!("frame index {} above range, clamping to last frame", idx);
            return Some(last);
        }
        Some(offset)
    }

    pub fn all_offsets(&self) -> Vec<usize> {
        (0..self.frames.len()).collect()
    }
}

/// Direct-child time per sample, from one forward pass with a depth-indexed
/// stack of open marker indices.
fn child_times(samples: &[MarkerSample]) -> Vec<f64> {
    let mut child = vec![0.0; samples.len()];
    let mut open: Vec<usize> = Vec::new();
    for (i, sample) in samples.iter().enumerate() {
        let depth = sample.depth.max(1) as usize;
        open.truncate(depth - 1);
        if let Some(&parent) = open.last() {
            child[parent] += sample.ms;
        }
        open.push(i);
    }
    child
}
