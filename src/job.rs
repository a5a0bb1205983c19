//! Background analysis jobs with a polled state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::{
    Analysis, AnalysisOptions, AnalysisPhase, AnalysisProgress, Comparison, ProgressSnapshot,
    TraceModel, analyze_with_progress, compare,
};

/// Result of a finished background job.
#[derive(Debug)]
pub enum JobOutput {
    Analysis(Box<Analysis>),
    Comparison {
        left: Box<Analysis>,
        right: Box<Analysis>,
        comparison: Comparison,
    },
}

#[derive(Debug)]
struct JobShared {
    in_flight: AtomicBool,
    progress: AnalysisProgress,
    result: Mutex<Option<JobOutput>>,
}

/// Runs one analysis or comparison at a time on a background worker.
///
/// The caller polls [`AnalysisJob::status`] instead of receiving a callback; a
/// submission while a job is in flight is dropped, not queued. There is no
/// mid-flight cancellation: abandoning a result means letting the worker
/// finish and discarding what it produced.
#[derive(Debug)]
pub struct AnalysisJob {
    shared: Arc<JobShared>,
    handle: Option<JoinHandle<()>>,
}

impl Default for AnalysisJob {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisJob {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(JobShared {
                in_flight: AtomicBool::new(false),
                progress: AnalysisProgress::new(),
                result: Mutex::new(None),
            }),
            handle: None,
        }
    }

    /// Analyze one trace in the background. Returns false when a job is
    /// already in flight.
    pub fn submit_analyze(&mut self, model: Arc<TraceModel>, options: AnalysisOptions) -> bool {
        self.submit(move |progress| {
            JobOutput::Analysis(Box::new(analyze_with_progress(&model, &options, progress)))
        })
    }

    /// Analyze two traces and pair them in the background. Both analyses read
    /// their models concurrently with nothing else; the reducers never mutate
    /// source frames.
    pub fn submit_compare(
        &mut self,
        left: Arc<TraceModel>,
        right: Arc<TraceModel>,
        options: AnalysisOptions,
    ) -> bool {
        self.submit(move |progress| {
            let left = analyze_with_progress(&left, &options, progress);
            let right = analyze_with_progress(&right, &options, progress);
            let comparison = compare(&left, &right);
            JobOutput::Comparison {
                left: Box::new(left),
                right: Box::new(right),
                comparison,
            }
        })
    }

    fn submit(&mut self, work: impl FnOnce(&AnalysisProgress) -> JobOutput + Send + 'static) -> bool {
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("analysis job already in flight, dropping request");
            return false;
        }

        // in_flight was clear, so any previous worker has finished; reap it.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        *lock_result(&self.shared.result) = None;
        self.shared.progress.set_phase(AnalysisPhase::Idle);

        let shared = Arc::clone(&self.shared);
        self.handle = Some(std::thread::spawn(move || {
            let output = work(&shared.progress);
            *lock_result(&shared.result) = Some(output);
            shared.progress.set_phase(AnalysisPhase::Done);
            shared.in_flight.store(false, Ordering::Release);
        }));
        true
    }

    pub fn is_running(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ProgressSnapshot {
        self.shared.progress.snapshot()
    }

    /// Hand over the finished result, once. `None` while the job is still
    /// running or when the result was already taken.
    pub fn take(&mut self) -> Option<JobOutput> {
        if self.status().phase != AnalysisPhase::Done {
            return None;
        }
        lock_result(&self.shared.result).take()
    }
}

fn lock_result<'a>(
    result: &'a Mutex<Option<JobOutput>>,
) -> std::sync::MutexGuard<'a, Option<JobOutput>> {
    result.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
