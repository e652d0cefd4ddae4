use std::path::PathBuf;

use notice_core::{NoticeBatch, PayloadShape};
use relay_logging::{relay_error, relay_info, relay_warn};
use tokio_util::sync::CancellationToken;

use crate::persist::{PersistError, SnapshotWriter};
use crate::progress::ProgressSink;
use crate::sink::{PushReceipt, PushSink, SinkError};
use crate::{RunEvent, Stage};

#[derive(Debug)]
pub struct SinkReport {
    pub name: String,
    pub shape: PayloadShape,
    pub outcome: Result<PushReceipt, SinkError>,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub pushes: Vec<SinkReport>,
    /// `None` only when the run was interrupted before the snapshot step.
    pub snapshot: Option<Result<PathBuf, PersistError>>,
    pub interrupted: bool,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.pushes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.pushes.iter().filter(|p| p.outcome.is_ok()).count()
    }

    pub fn all_pushes_failed(&self) -> bool {
        !self.pushes.is_empty() && self.succeeded() == 0
    }

    pub fn snapshot_written(&self) -> bool {
        matches!(self.snapshot, Some(Ok(_)))
    }
}

/// Fans a batch out to every push sink in order, then writes the local
/// snapshot. A failing sink never stops the ones after it.
#[derive(Debug)]
pub struct Dispatcher {
    sinks: Vec<PushSink>,
    snapshot: SnapshotWriter,
}

impl Dispatcher {
    pub fn new(sinks: Vec<PushSink>, snapshot: SnapshotWriter) -> Self {
        Self { sinks, snapshot }
    }

    pub fn sinks(&self) -> &[PushSink] {
        &self.sinks
    }

    pub async fn dispatch(
        &self,
        batch: &NoticeBatch,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        progress.emit(RunEvent::StageStarted(Stage::Pushing));
        for sink in &self.sinks {
            if cancel.is_cancelled() {
                report.interrupted = true;
                return report;
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.interrupted = true;
                    return report;
                }
                outcome = sink.push(batch) => outcome,
            };
            match &outcome {
                Ok(receipt) => {
                    relay_info!("Pushed to {} (status {})", sink.name(), receipt.status);
                    match receipt.new_notices {
                        Some(count) if count > 0 => {
                            relay_info!("{} reported {} new notice(s)", sink.name(), count)
                        }
                        Some(_) => relay_info!("{} reported no new notices", sink.name()),
                        None => {}
                    }
                }
                Err(err) => relay_warn!("Could not push to {}: {}", sink.name(), err),
            }
            progress.emit(RunEvent::SinkFinished {
                sink: sink.name().to_string(),
                ok: outcome.is_ok(),
            });
            report.pushes.push(SinkReport {
                name: sink.name().to_string(),
                shape: sink.shape(),
                outcome,
            });
        }

        if cancel.is_cancelled() {
            report.interrupted = true;
            return report;
        }
        progress.emit(RunEvent::StageStarted(Stage::Snapshotting));
        let snapshot = self.snapshot.write(batch);
        if let Err(err) = &snapshot {
            relay_error!(
                "Could not write snapshot {:?}: {}",
                self.snapshot.path(),
                err
            );
        }
        progress.emit(RunEvent::SinkFinished {
            sink: "snapshot".to_string(),
            ok: snapshot.is_ok(),
        });
        report.snapshot = Some(snapshot);
        report
    }
}
