//! Run summary output and exit code mapping.

use notice_core::NoticeSummary;
use notice_engine::{DispatchReport, RunOutcome, RunReport, Stage};
use relay_logging::{relay_error, relay_info, relay_warn};

pub const EXIT_OK: u8 = 0;
/// Configuration or authentication failure.
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_ALL_SINKS_FAILED: u8 = 2;
pub const EXIT_INTERRUPTED: u8 = 130;

pub fn exit_code(report: &RunReport) -> u8 {
    if report.is_interrupted() {
        return EXIT_INTERRUPTED;
    }
    match &report.outcome {
        RunOutcome::Published { dispatch, .. } if dispatch.all_pushes_failed() => {
            EXIT_ALL_SINKS_FAILED
        }
        _ => EXIT_OK,
    }
}

/// Human-readable lines describing the scraped notices.
pub fn summary_lines(summary: &NoticeSummary) -> Vec<String> {
    let mut lines = vec![
        format!("Total notices: {}", summary.total),
        format!("Placement: {}", summary.placement),
        format!("Internship: {}", summary.internship),
        format!("Other (not published): {}", summary.other),
    ];
    if !summary.by_category.is_empty() {
        lines.push("By category:".to_string());
        for (category, count) in &summary.by_category {
            let name = if category.is_empty() { "(none)" } else { category };
            lines.push(format!("  {name}: {count}"));
        }
    }
    if !summary.recent_companies.is_empty() {
        lines.push("Recent companies:".to_string());
        for (company, kind) in &summary.recent_companies {
            lines.push(format!("  {company} ({kind})"));
        }
    }
    lines
}

pub fn dispatch_lines(dispatch: &DispatchReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sinks: {}/{} succeeded",
        dispatch.succeeded(),
        dispatch.attempted()
    )];
    for push in &dispatch.pushes {
        lines.push(match &push.outcome {
            Ok(receipt) => match receipt.new_notices {
                Some(count) => format!(
                    "  {}: ok (status {}, {} new)",
                    push.name, receipt.status, count
                ),
                None => format!("  {}: ok (status {})", push.name, receipt.status),
            },
            Err(err) => format!("  {}: failed ({})", push.name, err),
        });
    }
    match &dispatch.snapshot {
        Some(Ok(path)) => lines.push(format!("  snapshot: {}", path.display())),
        Some(Err(err)) => lines.push(format!("  snapshot: failed ({err})")),
        None => lines.push("  snapshot: skipped".to_string()),
    }
    lines
}

/// Logs the outcome of a run; `stages` are the stages entered, in order.
pub fn log_report(report: &RunReport, stages: &[Stage]) {
    if let Some(grid) = &report.grid {
        relay_info!(
            "Grid: {} via {} ({} bytes, {})",
            grid.url,
            grid.method,
            grid.byte_len,
            grid.encoding
        );
    }
    match &report.outcome {
        RunOutcome::Published {
            summary,
            batch,
            dispatch,
        } => {
            for line in summary_lines(summary) {
                relay_info!("{}", line);
            }
            relay_info!(
                "Published {} notices scraped at {}",
                batch.total_notices(),
                batch.scraped_at()
            );
            for line in dispatch_lines(dispatch) {
                relay_info!("{}", line);
            }
            if dispatch.all_pushes_failed() {
                relay_error!("Every push sink failed");
            }
            if dispatch.interrupted {
                relay_warn!("Interrupted during dispatch; {}", completed(stages));
            }
        }
        RunOutcome::NoNotices { rows_seen } => {
            relay_warn!("No notices to publish ({} grid rows)", rows_seen);
        }
        RunOutcome::FetchFailed(err) => relay_error!("Run ended: grid fetch failed: {}", err),
        RunOutcome::ParseFailed(err) => relay_error!("Run ended: grid parse failed: {}", err),
        RunOutcome::Interrupted { stage } => {
            relay_warn!("Interrupted while {}; {}", stage, completed(stages));
        }
    }
}

fn completed(stages: &[Stage]) -> String {
    // The last stage entered is the one that did not finish.
    match stages.split_last() {
        Some((_, done)) if !done.is_empty() => {
            let names: Vec<String> = done.iter().map(|s| s.to_string()).collect();
            format!("completed: {}", names.join(", "))
        }
        _ => "nothing completed".to_string(),
    }
}
