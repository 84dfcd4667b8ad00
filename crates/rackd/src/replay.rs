//! Trace replay: feeds recorded AddJob / FreeResources / CompleteJob
//! events through a [`SchedulerHandle`].

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rackgrid_core::{JobId, JobRequest, MachineId};
use rackgrid_scheduler::{Allocation, NotifyFn, NotifyFuture, SchedulerHandle};

/// One line of a replay trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceEvent {
    AddJob(JobRequest),
    FreeResources { machines: Vec<MachineId> },
    CompleteJob { job_id: JobId },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub rejected: usize,
    /// Trace lines that could not be decoded and were skipped.
    pub malformed: usize,
    pub allocations: usize,
}

/// A decoded trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub events: Vec<TraceEvent>,
    /// 1-based numbers of lines that failed to decode.
    pub malformed: Vec<usize>,
}

/// Parse a JSON-lines trace. Blank lines and `#` comments are skipped.
///
/// A line that does not decode (unknown op, negative `k` or machine ID,
/// missing field) is logged and skipped; the rest of the trace is kept.
pub fn parse_trace(content: &str) -> Trace {
    let mut trace = Trace::default();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(event) => trace.events.push(event),
            Err(e) => {
                warn!(line = idx + 1, error = %e, "skipping malformed trace line");
                trace.malformed.push(idx + 1);
            }
        }
    }
    trace
}

pub fn load_trace(path: &Path) -> anyhow::Result<Trace> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace {}", path.display()))?;
    Ok(parse_trace(&content))
}

/// Apply the trace's events in order. Rejected events are logged and
/// counted; the replay carries on with the next one.
pub async fn replay(handle: &SchedulerHandle, trace: Trace) -> ReplaySummary {
    let mut summary = ReplaySummary {
        malformed: trace.malformed.len(),
        ..ReplaySummary::default()
    };

    for event in trace.events {
        summary.events += 1;
        match event {
            TraceEvent::AddJob(request) => {
                let job_id = request.job_id;
                match handle.add_job(request).await {
                    Ok(allocations) => summary.allocations += allocations.len(),
                    Err(e) => {
                        warn!(job_id, error = %e, "add_job rejected");
                        summary.rejected += 1;
                    }
                }
            }
            TraceEvent::FreeResources { machines } => {
                let report = handle.free_resources(&machines).await;
                if let Some(e) = report.first_error() {
                    warn!(machines = ?machines, error = %e, "free_resources partly rejected");
                    summary.rejected += 1;
                }
                summary.allocations += report.allocations.len();
            }
            TraceEvent::CompleteJob { job_id } => match handle.complete_job(job_id).await {
                Ok(report) => summary.allocations += report.allocations.len(),
                Err(e) => {
                    warn!(job_id, error = %e, "complete_job rejected");
                    summary.rejected += 1;
                }
            },
        }
    }

    info!(
        events = summary.events,
        rejected = summary.rejected,
        malformed = summary.malformed,
        allocations = summary.allocations,
        "trace replayed"
    );
    summary
}

/// Notifier that writes each allocation to stdout as one JSON line.
pub fn stdout_notifier() -> NotifyFn {
    Arc::new(|allocation: Allocation| -> NotifyFuture {
        Box::pin(async move {
            let line = serde_json::to_string(&serde_json::json!({
                "event": "notify_allocation",
                "job_id": allocation.job_id,
                "machines": allocation.machines,
                "partial": allocation.partial,
            }))?;
            println!("{line}");
            Ok(())
        })
    })
}
