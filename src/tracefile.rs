//! Trace file format (.flt) read/write.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{Frame, FramelensError, FramelensResult, TraceModel};

pub const TRACE_FORMAT: &str = "framelens-trace";
pub const CURRENT_TRACE_VERSION: u32 = 1;

/// On-disk trace container. The analysis core never touches this directly; it
/// is converted into a [`TraceModel`] first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceFile {
    pub format: String,
    pub version: u32,
    pub marker_names: Vec<String>,
    pub thread_names: Vec<String>,
    pub main_thread: u32,
    pub frame_offset: i32,
    pub frames: Vec<Option<Frame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl TraceFile {
    pub fn from_model(model: &TraceModel) -> FramelensResult<Self> {
        let frames = model.frames().to_vec();
        let checksum = Some(frames_checksum(&frames)?);
        Ok(Self {
            format: TRACE_FORMAT.to_string(),
            version: CURRENT_TRACE_VERSION,
            marker_names: model.marker_names().to_vec(),
            thread_names: model.thread_names().to_vec(),
            main_thread: model.main_thread(),
            frame_offset: model.frame_offset(),
            frames,
            checksum,
        })
    }

    pub fn write_json(&self, path: &Path) -> FramelensResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> FramelensResult<Self> {
        let bytes = std::fs::read(path)?;
        let file: TraceFile = serde_json::from_slice(&bytes)?;
        if let Some(stored) = &file.checksum {
            let computed = frames_checksum(&file.frames)?;
            if *stored != computed {
                tracing::warn!(
                    "trace checksum mismatch in {} (stored {stored}, computed {computed})",
                    path.display()
                );
            }
        }
        Ok(file)
    }

    /// Validate the container and hand its payload to the trace model.
    ///
    /// Structural corruption is the one hard failure in the pipeline; data
    /// that merely filters to nothing is not an error.
    pub fn into_model(self) -> FramelensResult<TraceModel> {
        if self.format != TRACE_FORMAT {
            return Err(FramelensError::Trace(format!(
                "unsupported trace format {:?} (expected {TRACE_FORMAT:?})",
                self.format
            )));
        }
        if self.version != CURRENT_TRACE_VERSION {
            return Err(FramelensError::Trace(format!(
                "unsupported trace version {} (expected {CURRENT_TRACE_VERSION})",
                self.version
            )));
        }
        for (offset, frame) in self.frames.iter().enumerate() {
            let Some(frame) = frame else {
                continue;
            };
            for slice in &frame.threads {
                if slice.thread as usize >= self.thread_names.len() {
                    return Err(FramelensError::Trace(format!(
                        "frame {offset} references unknown thread id {}",
                        slice.thread
                    )));
                }
                for sample in &slice.samples {
                    if sample.name as usize >= self.marker_names.len() {
                        return Err(FramelensError::Trace(format!(
                            "frame {offset} references unknown marker id {}",
                            sample.name
                        )));
                    }
                    if sample.depth == 0 {
                        return Err(FramelensError::Trace(format!(
                            "frame {offset} holds a sample at depth 0 (depths are 1-based)"
                        )));
                    }
                }
            }
        }
        Ok(TraceModel::new(
            self.marker_names,
            self.thread_names,
            self.main_thread,
            self.frame_offset,
            self.frames,
        ))
    }
}

fn frames_checksum(frames: &[Option<Frame>]) -> FramelensResult<String> {
    let bytes = serde_json::to_vec(frames)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MarkerSample, ThreadSlice};

    fn sample_model() -> TraceModel {
        TraceModel::new(
            vec!["Frame".to_string(), "Update".to_string()],
            vec!["Main".to_string()],
            0,
            1,
            vec![Some(Frame {
                start_ms: 0.0,
                duration_ms: 8.0,
                threads: vec![ThreadSlice {
                    thread: 0,
                    samples: vec![
                        MarkerSample {
                            name: 0,
                            depth: 1,
                            ms: 8.0,
                        },
                        MarkerSample {
                            name: 1,
                            depth: 2,
                            ms: 3.0,
                        },
                    ],
                }],
            })],
        )
    }

    #[test]
    fn container_round_trips_through_the_model() {
        let file = TraceFile::from_model(&sample_model()).unwrap();
        assert_eq!(file.format, TRACE_FORMAT);
        assert!(file.checksum.is_some());

        let model = file.into_model().unwrap();
        assert_eq!(model.frame_count(), 1);
        assert_eq!(model.marker_id("Update"), Some(1));
        assert_eq!(model.display_index(0), 1);
    }

    #[test]
    fn wrong_format_is_rejected() {
        let mut file = TraceFile::from_model(&sample_model()).unwrap();
        file.format = "something-else".to_string();
        assert!(matches!(file.into_model(), Err(FramelensError::Trace(_))));
    }

    #[test]
    fn out_of_range_marker_ids_are_rejected() {
        let mut file = TraceFile::from_model(&sample_model()).unwrap();
        if let Some(frame) = file.frames[0].as_mut() {
            frame.threads[0].samples[0].name = 99;
        }
        assert!(matches!(file.into_model(), Err(FramelensError::Trace(_))));
    }

    #[test]
    fn zero_depth_samples_are_rejected() {
        let mut file = TraceFile::from_model(&sample_model()).unwrap();
        if let Some(frame) = file.frames[0].as_mut() {
            frame.threads[0].samples[0].depth = 0;
        }
        assert!(matches!(file.into_model(), Err(FramelensError::Trace(_))));
    }

    #[test]
    fn json_round_trip_preserves_the_payload() {
        let file = TraceFile::from_model(&sample_model()).unwrap();
        let json = serde_json::to_string(&file).unwrap();
        let parsed: TraceFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.marker_names, file.marker_names);
        assert_eq!(parsed.frames.len(), 1);
        assert_eq!(parsed.checksum, file.checksum);
    }
}
