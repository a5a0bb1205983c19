//! `framelens analyze` command.

use clap::Args;
use time::format_description::well_known::Rfc3339;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    Analysis, AnalysisJob, AnalysisOptions, Config, DepthFilter, FrameSelection, FramelensError,
    FramelensResult, JobOutput, MarkerData, ThreadData, ThreadSelection, TraceFile,
};

/// Filter settings shared by the analyze and compare commands.
#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Restrict analysis to these thread names.
    #[arg(long, value_delimiter = ',')]
    pub threads: Vec<String>,
    /// Keep markers at exactly this call-stack depth ("all" for every depth).
    #[arg(long, default_value = "all")]
    pub depth: String,
    /// Scope to one parent marker and its subtree.
    #[arg(long)]
    pub parent: Option<String>,
    /// Report self time (duration minus direct children) instead of totals.
    #[arg(long)]
    pub self_time: bool,
    /// Remove this marker, giving its time back to ancestors and frame totals.
    #[arg(long)]
    pub remove: Option<String>,
    /// Frame display indices to analyze, e.g. "0-99" or "3,17,42".
    #[arg(long)]
    pub frames: Option<String>,
    /// Histogram bucket count.
    #[arg(long)]
    pub buckets: Option<usize>,
}

impl FilterArgs {
    pub fn to_options(&self, config: &Config) -> FramelensResult<AnalysisOptions> {
        Ok(AnalysisOptions {
            threads: if self.threads.is_empty() {
                ThreadSelection::All
            } else {
                ThreadSelection::Only(self.threads.clone())
            },
            depth_filter: parse_depth(&self.depth)?,
            parent_marker: self.parent.clone(),
            self_time: self.self_time,
            remove_marker: self.remove.clone(),
            frames: match &self.frames {
                None => FrameSelection::All,
                Some(raw) => parse_frames(raw)?,
            },
            bucket_count: self.buckets.unwrap_or(config.bucket_count).max(1),
        })
    }
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Trace file to analyze.
    pub trace: PathBuf,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Marker rows to include in the report.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub fn analyze_command(config: &Config, args: &AnalyzeArgs) -> FramelensResult<serde_json::Value> {
    let options = args.filters.to_options(config)?;
    let model = Arc::new(TraceFile::read_json(&args.trace)?.into_model()?);
    let analysis = run_analysis_job(model, options)?;

    let mut rows: Vec<&MarkerData> = analysis.markers.iter().collect();
    rows.sort_by(|a, b| {
        b.ms_total
            .total_cmp(&a.ms_total)
            .then_with(|| a.name.cmp(&b.name))
    });
    let markers = rows
        .iter()
        .take(args.limit)
        .map(|m| marker_row(m))
        .collect::<Vec<_>>();
    let threads = analysis.threads.iter().map(thread_row).collect::<Vec<_>>();

    Ok(serde_json::json!({
        "schemaVersion": "framelens.analysis.v1",
        "trace": args.trace,
        "generatedAt": generated_at(),
        "frameSummary": frame_summary_row(&analysis),
        "markerCount": analysis.markers.len(),
        "markers": markers,
        "threads": threads,
    }))
}

pub(crate) fn generated_at() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Run one analysis end to end on the background job and poll it to
/// completion, the way an interactive caller would.
pub(crate) fn run_analysis_job(
    model: Arc<crate::TraceModel>,
    options: AnalysisOptions,
) -> FramelensResult<Analysis> {
    let mut job = AnalysisJob::new();
    if !job.submit_analyze(model, options) {
        return Err(FramelensError::Trace(
            "analysis job rejected the request".to_string(),
        ));
    }
    poll_job(&job);
    match job.take() {
        Some(JobOutput::Analysis(analysis)) => Ok(*analysis),
        _ => Err(FramelensError::Trace(
            "analysis job finished without a result".to_string(),
        )),
    }
}

pub(crate) fn poll_job(job: &AnalysisJob) {
    while job.is_running() {
        let status = job.status();
        tracing::debug!(
            "analysis progress {}/{} ({:?})",
            status.frames_done,
            status.frames_total,
            status.phase
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn parse_depth(raw: &str) -> FramelensResult<DepthFilter> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(DepthFilter::All);
    }
    match raw.parse::<u32>() {
        Ok(depth) if depth >= 1 => Ok(DepthFilter::Exact(depth)),
        _ => Err(FramelensError::InvalidArgument(format!(
            "--depth expects \"all\" or a depth >= 1, got {raw:?}"
        ))),
    }
}

fn parse_frames(raw: &str) -> FramelensResult<FrameSelection> {
    if let Some((lo, hi)) = raw.split_once('-') {
        let lo = parse_frame_index(lo)?;
        let hi = parse_frame_index(hi)?;
        if hi < lo {
            return Err(FramelensError::InvalidArgument(format!(
                "--frames range {raw:?} is inverted"
            )));
        }
        return Ok(FrameSelection::Frames((lo..=hi).collect()));
    }
    let indices = raw
        .split(',')
        .map(parse_frame_index)
        .collect::<FramelensResult<Vec<i32>>>()?;
    Ok(FrameSelection::Frames(indices))
}

fn parse_frame_index(raw: &str) -> FramelensResult<i32> {
    raw.trim().parse::<i32>().map_err(|_| {
        FramelensError::InvalidArgument(format!("invalid frame index {:?}", raw.trim()))
    })
}

fn marker_row(marker: &MarkerData) -> serde_json::Value {
    serde_json::json!({
        "name": marker.name,
        "count": marker.total_count,
        "framesSeen": marker.frames_seen,
        "firstFrame": marker.first_frame,
        "msTotal": marker.ms_total,
        "msMean": marker.duration.mean,
        "msMedian": marker.duration.median,
        "msMin": marker.duration.min,
        "msMax": marker.duration.max,
        "msLowerQuartile": marker.duration.lower_quartile,
        "msUpperQuartile": marker.duration.upper_quartile,
        "medianFrame": marker.duration.median_frame,
        "countMedian": marker.count.median,
        "minDepth": marker.min_depth,
        "maxDepth": marker.max_depth,
        "threads": marker.threads,
        "msRemoved": marker.ms_removed,
        "msIgnored": marker.ms_ignored,
    })
}

fn thread_row(thread: &ThreadData) -> serde_json::Value {
    serde_json::json!({
        "name": thread.name,
        "framesSeen": thread.frames_seen,
        "msBusyTotal": thread.ms_busy_total,
        "msIdleTotal": thread.ms_idle_total,
        "msMedian": thread.frame_time.median,
        "msMin": thread.frame_time.min,
        "msMax": thread.frame_time.max,
    })
}

fn frame_summary_row(analysis: &Analysis) -> serde_json::Value {
    let summary = &analysis.frame_summary;
    match &summary.duration {
        None => serde_json::json!({ "count": 0 }),
        Some(duration) => serde_json::json!({
            "count": summary.count,
            "msTotal": summary.ms_total,
            "firstFrame": summary.first_frame,
            "lastFrame": summary.last_frame,
            "msMean": duration.mean,
            "msMedian": duration.median,
            "msMin": duration.min,
            "msMax": duration.max,
            "medianFrame": duration.median_frame,
            "maxFrame": duration.max_frame,
        }),
    }
}
