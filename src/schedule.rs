//! Parallel frame fan-out and analysis progress counters.

use rayon::prelude::*;

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::{FrameReduction, ResolvedFilters, TraceModel, reduce_frame};

/// Coarse phase of an analysis pass, observable while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AnalysisPhase {
    Idle = 0,
    Reducing = 1,
    Merging = 2,
    Done = 3,
}

impl AnalysisPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Reducing,
            2 => Self::Merging,
            3 => Self::Done,
            _ => Self::Idle,
        }
    }
}

/// Progress shared between an analysis pass and its caller.
///
/// Workers advance one atomic counter; nothing else is shared mutable state.
#[derive(Debug, Default)]
pub struct AnalysisProgress {
    phase: AtomicU8,
    frames_done: AtomicUsize,
    frames_total: AtomicUsize,
}

/// Point-in-time copy of an [`AnalysisProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub phase: AnalysisPhase,
    pub frames_done: usize,
    pub frames_total: usize,
}

impl AnalysisProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: AnalysisPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub(crate) fn begin(&self, total: usize) {
        self.frames_done.store(0, Ordering::Release);
        self.frames_total.store(total, Ordering::Release);
        self.set_phase(AnalysisPhase::Reducing);
    }

    fn advance(&self) {
        self.frames_done.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase(),
            frames_done: self.frames_done.load(Ordering::Acquire),
            frames_total: self.frames_total.load(Ordering::Acquire),
        }
    }

    pub fn fraction(&self) -> f32 {
        let snapshot = self.snapshot();
        if snapshot.frames_total == 0 {
            return 0.0;
        }
        snapshot.frames_done as f32 / snapshot.frames_total as f32
    }
}

/// Reduce every selected frame concurrently.
///
/// Each invocation owns its output slot, so frames may complete in any order;
/// the returned vector still lines up with `offsets` position for position.
/// Frames without data come back as `None`.
pub fn reduce_frames(
    model: &TraceModel,
    offsets: &[usize],
    filters: &ResolvedFilters,
    progress: &AnalysisProgress,
) -> Vec<Option<FrameReduction>> {
    progress.begin(offsets.len());
    offsets
        .par_iter()
        .map(|&offset| {
            let reduction = reduce_frame(model, offset, filters);
            progress.advance();
            reduction
        })
        .collect()
}
