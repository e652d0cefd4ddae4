use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, FixedOffset};
use notice_core::{now_ist, summarize, NoticeBatch, NoticeSummary};
use relay_logging::{relay_error, relay_info, relay_warn};
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::fetch::{GridFetcher, ReqwestGridFetcher};
use crate::parse::{parse_grid, ParseError};
use crate::persist::SnapshotWriter;
use crate::progress::ProgressSink;
use crate::session::{ensure_session, AuthError, PortalSession, SessionProvider};
use crate::sink::{PushSink, SinkError};
use crate::{FailureKind, FetchError, FetchMetadata, RunEvent, Stage};

/// Source of the per-run `scraped_at` stamp.
pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

#[derive(Debug)]
pub enum RunOutcome {
    /// Notices were found and handed to every sink.
    Published {
        summary: NoticeSummary,
        batch: NoticeBatch,
        dispatch: DispatchReport,
    },
    /// The grid parsed cleanly but no row qualified as a notice.
    NoNotices { rows_seen: usize },
    FetchFailed(FetchError),
    ParseFailed(ParseError),
    /// Cancelled before dispatch; `stage` is where the run stopped.
    Interrupted { stage: Stage },
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub grid: Option<FetchMetadata>,
}

impl RunReport {
    fn new(outcome: RunOutcome, grid: Option<FetchMetadata>) -> Self {
        Self { outcome, grid }
    }

    pub fn is_interrupted(&self) -> bool {
        match &self.outcome {
            RunOutcome::Interrupted { .. } => true,
            RunOutcome::Published { dispatch, .. } => dispatch.interrupted,
            _ => false,
        }
    }
}

/// Session -> grid fetch -> row parse -> filter -> dispatch, once.
pub struct Pipeline {
    provider: Box<dyn SessionProvider>,
    fetcher: Box<dyn GridFetcher>,
    dispatcher: Dispatcher,
    clock: Clock,
}

impl Pipeline {
    pub fn new(
        provider: Box<dyn SessionProvider>,
        fetcher: Box<dyn GridFetcher>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            provider,
            fetcher,
            dispatcher,
            clock: Arc::new(now_ist),
        }
    }

    /// Wires the reqwest fetcher, one push sink per configured target and the
    /// snapshot writer.
    pub fn from_config(
        config: &RelayConfig,
        provider: Box<dyn SessionProvider>,
    ) -> Result<Self, SinkError> {
        let fetcher = ReqwestGridFetcher::new(
            config.fetch_settings(),
            config.notice_page_url.clone(),
            config.grid_url.clone(),
        );
        let sinks = config
            .sinks
            .iter()
            .cloned()
            .map(|sink| PushSink::with_timeout(sink, config.request_timeout))
            .collect::<Result<Vec<_>, _>>()?;
        let dispatcher = Dispatcher::new(sinks, SnapshotWriter::new(config.snapshot_path.clone()));
        Ok(Self::new(provider, Box::new(fetcher), dispatcher))
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the pipeline once. Only an authentication failure is returned as
    /// an error; fetch and parse problems end the run and are reported in
    /// [`RunOutcome`].
    pub async fn run(
        &self,
        session: &PortalSession,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunReport, AuthError> {
        let progress = StageTracker::new(progress);

        progress.emit(RunEvent::StageStarted(Stage::Authenticating));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(RunReport::new(RunOutcome::Interrupted { stage: Stage::Authenticating }, None));
            }
            tokens = ensure_session(self.provider.as_ref(), session) => { tokens?; }
        }

        let response = match self.fetcher.fetch(session, &progress, cancel).await {
            Ok(response) => response,
            Err(err) if err.kind == FailureKind::Cancelled => {
                let stage = progress.last_stage();
                relay_warn!("Run interrupted while {}", stage);
                return Ok(RunReport::new(RunOutcome::Interrupted { stage }, None));
            }
            Err(err) => {
                relay_error!("Grid fetch failed: {}", err);
                return Ok(RunReport::new(RunOutcome::FetchFailed(err), None));
            }
        };
        let grid = Some(response.metadata.clone());

        progress.emit(RunEvent::StageStarted(Stage::Parsing));
        let parsed = match parse_grid(&response.body) {
            Ok(parsed) => parsed,
            Err(err) => {
                relay_error!("Grid response could not be parsed: {}", err);
                return Ok(RunReport::new(RunOutcome::ParseFailed(err), grid));
            }
        };
        if parsed.notices.is_empty() {
            relay_warn!(
                "No notices found ({} row(s) in the grid response)",
                parsed.rows_seen
            );
            return Ok(RunReport::new(
                RunOutcome::NoNotices {
                    rows_seen: parsed.rows_seen,
                },
                grid,
            ));
        }

        progress.emit(RunEvent::StageStarted(Stage::Filtering));
        let summary = summarize(&parsed.notices);
        let batch = NoticeBatch::relevant((self.clock)(), &parsed.notices);
        relay_info!(
            "Scraped {} notices, {} placement/internship kept",
            summary.total,
            batch.total_notices()
        );

        if cancel.is_cancelled() {
            return Ok(RunReport::new(
                RunOutcome::Interrupted {
                    stage: Stage::Filtering,
                },
                grid,
            ));
        }

        let dispatch = self.dispatcher.dispatch(&batch, &progress, cancel).await;
        if !dispatch.interrupted {
            progress.emit(RunEvent::StageStarted(Stage::Done));
        }
        Ok(RunReport::new(
            RunOutcome::Published {
                summary,
                batch,
                dispatch,
            },
            grid,
        ))
    }
}

/// Forwards events while remembering the latest stage.
struct StageTracker<'a> {
    inner: &'a dyn ProgressSink,
    last: Mutex<Stage>,
}

impl<'a> StageTracker<'a> {
    fn new(inner: &'a dyn ProgressSink) -> Self {
        Self {
            inner,
            last: Mutex::new(Stage::Authenticating),
        }
    }

    fn last_stage(&self) -> Stage {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for StageTracker<'_> {
    fn emit(&self, event: RunEvent) {
        if let RunEvent::StageStarted(stage) = &event {
            *self.last.lock().unwrap_or_else(PoisonError::into_inner) = *stage;
        }
        self.inner.emit(event);
    }
}
