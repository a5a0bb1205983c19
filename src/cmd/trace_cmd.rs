//! Trace utilities (`framelens trace ...`).

use clap::Subcommand;

use std::path::PathBuf;

use crate::{FramelensResult, SynthOptions, TraceFile, synth_trace};

use super::analyze_cmd::generated_at;

#[derive(Debug, Subcommand)]
pub enum TraceCommand {
    /// Generate a deterministic synthetic trace.
    Synth {
        /// Output path for the trace file.
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 64)]
        frames: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Worker threads in addition to the main and render threads.
        #[arg(long, default_value_t = 2)]
        workers: u32,
        /// Display index of the first frame.
        #[arg(long, default_value_t = 0)]
        frame_offset: i32,
    },
    /// Describe a trace file.
    Info {
        trace: PathBuf,
    },
}

pub fn trace_command(command: &TraceCommand) -> FramelensResult<serde_json::Value> {
    match command {
        TraceCommand::Synth {
            out,
            frames,
            seed,
            workers,
            frame_offset,
        } => {
            let model = synth_trace(&SynthOptions {
                frames: *frames,
                seed: *seed,
                workers: *workers,
                frame_offset: *frame_offset,
            });
            TraceFile::from_model(&model)?.write_json(out)?;
            Ok(serde_json::json!({
                "schemaVersion": "framelens.trace_synth.v1",
                "out": out,
                "generatedAt": generated_at(),
                "frames": frames,
                "seed": seed,
                "workers": workers,
                "markerNames": model.marker_names().len(),
                "threadNames": model.thread_names().len(),
            }))
        }
        TraceCommand::Info { trace } => {
            let file = TraceFile::read_json(trace)?;
            let loaded = file.frames.iter().filter(|f| f.is_some()).count();
            let ms_total: f64 = file
                .frames
                .iter()
                .flatten()
                .map(|f| f.duration_ms)
                .sum();
            Ok(serde_json::json!({
                "schemaVersion": "framelens.trace_info.v1",
                "trace": trace,
                "format": file.format,
                "version": file.version,
                "frames": file.frames.len(),
                "loadedFrames": loaded,
                "firstFrame": file.frame_offset,
                "msTotal": ms_total,
                "markerNames": file.marker_names.len(),
                "threadNames": file.thread_names,
                "mainThread": file
                    .thread_names
                    .get(file.main_thread as usize),
                "checksum": file.checksum,
            }))
        }
    }
}
