//! `framelens compare` command.

use clap::Args;

use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    Analysis, AnalysisJob, Comparison, Config, FramelensError, FramelensResult, JobOutput,
    aligned_depth_filter, marker_shared_buckets,
};

use super::analyze_cmd::{FilterArgs, generated_at, poll_job};

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Baseline trace file.
    pub left: PathBuf,
    /// Trace file to compare against the baseline.
    pub right: PathBuf,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Also emit shared-range buckets for this marker.
    #[arg(long)]
    pub marker: Option<String>,
    /// Marker rows to include in the report.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub fn compare_command(config: &Config, args: &CompareArgs) -> FramelensResult<serde_json::Value> {
    let options = args.filters.to_options(config)?;
    let left = Arc::new(crate::TraceFile::read_json(&args.left)?.into_model()?);
    let right = Arc::new(crate::TraceFile::read_json(&args.right)?.into_model()?);

    let mut job = AnalysisJob::new();
    if !job.submit_compare(left, right, options.clone()) {
        return Err(FramelensError::Trace(
            "comparison job rejected the request".to_string(),
        ));
    }
    poll_job(&job);
    let (left, right, comparison) = match job.take() {
        Some(JobOutput::Comparison {
            left,
            right,
            comparison,
        }) => (*left, *right, comparison),
        _ => {
            return Err(FramelensError::Trace(
                "comparison job finished without a result".to_string(),
            ));
        }
    };

    let mut rows = pairing_rows(&left, &right, &comparison);
    rows.sort_by(|a, b| {
        b.delta_abs
            .total_cmp(&a.delta_abs)
            .then_with(|| a.name.cmp(&b.name))
    });
    let matched = comparison
        .pairings
        .iter()
        .filter(|p| p.left.is_some() && p.right.is_some())
        .count();
    let left_only = comparison.pairings.iter().filter(|p| p.right.is_none()).count();
    let right_only = comparison.pairings.iter().filter(|p| p.left.is_none()).count();

    let marker_buckets = match &args.marker {
        None => None,
        Some(name) => {
            let pair = left
                .marker_by_name(name)
                .zip(right.marker_by_name(name))
                .map(|(l, r)| marker_shared_buckets(l, r, left.bucket_count.min(right.bucket_count)));
            if pair.is_none() {
                tracing::warn!("marker {name:?} is not present on both sides, skipping buckets");
            }
            pair
        }
    };

    Ok(serde_json::json!({
        "schemaVersion": "framelens.comparison.v1",
        "left": args.left,
        "right": args.right,
        "generatedAt": generated_at(),
        "pairings": {
            "total": comparison.pairings.len(),
            "matching": matched,
            "leftOnly": left_only,
            "rightOnly": right_only,
        },
        "threads": comparison.threads,
        "depthOffset": comparison.depth_offset,
        "alignedRightDepth": aligned_depth_filter(options.depth_filter, comparison.depth_offset),
        "frameBuckets": comparison.frame_buckets,
        "markerBuckets": marker_buckets,
        "markers": rows.iter().take(args.limit).map(PairingRow::to_json).collect::<Vec<_>>(),
    }))
}

struct PairingRow {
    name: String,
    left_ms: Option<f64>,
    right_ms: Option<f64>,
    delta: f64,
    delta_abs: f64,
}

impl PairingRow {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "left": self.left_ms,
            "right": self.right_ms,
            "delta": self.delta,
        })
    }
}

fn pairing_rows(left: &Analysis, right: &Analysis, comparison: &Comparison) -> Vec<PairingRow> {
    comparison
        .pairings
        .iter()
        .map(|pairing| {
            let left_ms = pairing.left.map(|i| left.markers[i].ms_total);
            let right_ms = pairing.right.map(|i| right.markers[i].ms_total);
            let delta = right_ms.unwrap_or(0.0) - left_ms.unwrap_or(0.0);
            PairingRow {
                name: pairing.name.clone(),
                left_ms,
                right_ms,
                delta,
                delta_abs: delta.abs(),
            }
        })
        .collect()
}
