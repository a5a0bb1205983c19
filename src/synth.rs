//! Deterministic synthetic trace generation.

use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{Frame, IDLE_MARKER, MarkerSample, ThreadSlice, TraceModel};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthOptions {
    pub frames: usize,
    pub seed: u64,
    /// Worker threads in addition to the main and render threads.
    pub workers: u32,
    pub frame_offset: i32,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            frames: 64,
            seed: 1,
            workers: 2,
            frame_offset: 0,
        }
    }
}

const FRAME_MARKER: u32 = 0;
const UPDATE: u32 = 1;
const PHYSICS: u32 = 2;
const ANIMATION: u32 = 3;
const RENDER: u32 = 4;
const GC: u32 = 5;
const IDLE: u32 = 6;
const JOB: u32 = 7;

/// Build a reproducible trace: same options, same trace, bit for bit.
///
/// The main thread carries a nested stream (Frame -> Update -> Physics /
/// Animation, Frame -> Render, occasional GC); worker threads split their
/// depth-1 time between a job marker and an explicit idle marker.
pub fn synth_trace(options: &SynthOptions) -> TraceModel {
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);

    let marker_names = vec![
        "Frame".to_string(),
        "Update".to_string(),
        "Physics".to_string(),
        "Animation".to_string(),
        "Render".to_string(),
        "GC".to_string(),
        IDLE_MARKER.to_string(),
        "Job".to_string(),
    ];
    let mut thread_names = vec!["Main".to_string(), "Render Thread".to_string()];
    for i in 0..options.workers {
        thread_names.push(format!("Worker {i}"));
    }

    let mut frames = Vec::with_capacity(options.frames);
    let mut start_ms = 0.0;
    for _ in 0..options.frames {
        let frame = synth_frame(&mut rng, start_ms, options.workers);
        start_ms += frame.duration_ms;
        frames.push(Some(frame));
    }

    TraceModel::new(marker_names, thread_names, 0, options.frame_offset, frames)
}

fn synth_frame(rng: &mut ChaCha8Rng, start_ms: f64, workers: u32) -> Frame {
    let physics = ms_between(rng, 0.5, 2.5);
    let animation = ms_between(rng, 0.2, 1.2);
    let update_self = ms_between(rng, 0.5, 2.0);
    let update = update_self + physics + animation;
    let render = ms_between(rng, 1.0, 4.0);
    let frame_self = ms_between(rng, 0.1, 0.4);
    let gc = if rng.next_u32() % 8 == 0 {
        Some(ms_between(rng, 0.5, 3.0))
    } else {
        None
    };
    let frame_total = update + render + frame_self + gc.unwrap_or(0.0);

    let mut main_samples = vec![
        MarkerSample {
            name: FRAME_MARKER,
            depth: 1,
            ms: frame_total,
        },
        MarkerSample {
            name: UPDATE,
            depth: 2,
            ms: update,
        },
        MarkerSample {
            name: PHYSICS,
            depth: 3,
            ms: physics,
        },
        MarkerSample {
            name: ANIMATION,
            depth: 3,
            ms: animation,
        },
        MarkerSample {
            name: RENDER,
            depth: 2,
            ms: render,
        },
    ];
    if let Some(gc) = gc {
        main_samples.push(MarkerSample {
            name: GC,
            depth: 2,
            ms: gc,
        });
    }

    let render_busy = ms_between(rng, 1.0, frame_total.max(1.5));
    let mut threads = vec![
        ThreadSlice {
            thread: 0,
            samples: main_samples,
        },
        ThreadSlice {
            thread: 1,
            samples: vec![
                MarkerSample {
                    name: RENDER,
                    depth: 1,
                    ms: render_busy,
                },
                MarkerSample {
                    name: IDLE,
                    depth: 1,
                    ms: (frame_total - render_busy).max(0.0),
                },
            ],
        },
    ];
    for worker in 0..workers {
        let busy = ms_between(rng, 0.0, frame_total);
        threads.push(ThreadSlice {
            thread: 2 + worker,
            samples: vec![
                MarkerSample {
                    name: JOB,
                    depth: 1,
                    ms: busy,
                },
                MarkerSample {
                    name: IDLE,
                    depth: 1,
                    ms: (frame_total - busy).max(0.0),
                },
            ],
        });
    }

    Frame {
        start_ms,
        duration_ms: frame_total,
        threads,
    }
}

fn ms_between(rng: &mut ChaCha8Rng, lo: f64, hi: f64) -> f64 {
    let unit = rng.next_u32() as f64 / u32::MAX as f64;
    lo + unit * (hi - lo)
}
