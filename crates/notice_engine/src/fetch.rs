use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, REFERER};
use reqwest::StatusCode;
use relay_logging::{relay_debug, relay_info, relay_warn};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::decode::decode_body;
use crate::progress::ProgressSink;
use crate::session::PortalSession;
use crate::types::map_reqwest_error;
use crate::{FailureKind, FetchError, FetchMetadata, GridResponse, HttpMethod, RunEvent, Stage};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Safari/537.36";
/// Requests every row in a single page.
pub const GRID_PAGE_SIZE: u32 = 10_000;
const GRID_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Pause between the page load and the grid query. The portal expects the
    /// grid request to follow the page the way a browser would.
    pub settle_delay: Duration,
    pub max_bytes: u64,
    pub user_agent: String,
    pub grid_query_id: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            max_bytes: 16 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            grid_query_id: crate::config::DEFAULT_GRID_QUERY_ID.to_string(),
        }
    }
}

/// Form/query parameters the grid widget sends. `nd` is an anti-cache token.
pub fn grid_params(query_id: &str, nd: i64) -> Vec<(&'static str, String)> {
    vec![
        ("action", "fetchData".to_string()),
        ("jqqueryid", query_id.to_string()),
        ("_search", "false".to_string()),
        ("nd", nd.to_string()),
        ("rows", GRID_PAGE_SIZE.to_string()),
        ("page", "1".to_string()),
        ("sidx", String::new()),
        ("sord", "asc".to_string()),
    ]
}

#[async_trait::async_trait]
pub trait GridFetcher: Send + Sync {
    async fn fetch(
        &self,
        session: &PortalSession,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<GridResponse, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGridFetcher {
    settings: FetchSettings,
    notice_page_url: Url,
    grid_url: Url,
}

impl ReqwestGridFetcher {
    pub fn new(settings: FetchSettings, notice_page_url: Url, grid_url: Url) -> Self {
        Self {
            settings,
            notice_page_url,
            grid_url,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    async fn load_page(
        &self,
        session: &PortalSession,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        relay_info!("Loading notice page {}", self.notice_page_url);
        let response = cancellable(cancel, async {
            session
                .client()
                .get(self.notice_page_url.clone())
                .send()
                .await
                .map_err(map_reqwest_error)
        })
        .await?;
        ensure_success(response.status())?;
        let bytes = read_limited(
            response,
            self.settings.max_bytes,
            Stage::LoadingPage,
            progress,
            cancel,
        )
        .await?;
        relay_info!("Notice page loaded ({} bytes)", bytes.len());
        Ok(bytes.len() as u64)
    }

    async fn query_grid(
        &self,
        session: &PortalSession,
        cancel: &CancellationToken,
    ) -> Result<(reqwest::Response, HttpMethod), FetchError> {
        let params = grid_params(&self.settings.grid_query_id, epoch_millis());
        relay_info!("Requesting grid data from {}", self.grid_url);

        let post = cancellable(cancel, async {
            self.grid_request(session, HttpMethod::Post)
                .form(&params)
                .send()
                .await
                .map_err(map_reqwest_error)
        })
        .await?;
        if post.status() == StatusCode::OK {
            return Ok((post, HttpMethod::Post));
        }

        relay_warn!("Grid POST returned {}, retrying as GET", post.status());
        let get = cancellable(cancel, async {
            self.grid_request(session, HttpMethod::Get)
                .query(&params)
                .send()
                .await
                .map_err(map_reqwest_error)
        })
        .await?;
        Ok((get, HttpMethod::Get))
    }

    fn grid_request(&self, session: &PortalSession, method: HttpMethod) -> reqwest::RequestBuilder {
        let client = session.client();
        let builder = match method {
            HttpMethod::Post => client.post(self.grid_url.clone()),
            HttpMethod::Get => client.get(self.grid_url.clone()),
        };
        builder
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT, GRID_ACCEPT)
            .header(REFERER, self.notice_page_url.as_str())
    }
}

#[async_trait::async_trait]
impl GridFetcher for ReqwestGridFetcher {
    async fn fetch(
        &self,
        session: &PortalSession,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<GridResponse, FetchError> {
        progress.emit(RunEvent::StageStarted(Stage::LoadingPage));
        self.load_page(session, progress, cancel).await?;

        progress.emit(RunEvent::StageStarted(Stage::Settling));
        relay_debug!("Waiting {:?} before the grid query", self.settings.settle_delay);
        cancellable(cancel, async {
            tokio::time::sleep(self.settings.settle_delay).await;
            Ok(())
        })
        .await?;

        progress.emit(RunEvent::StageStarted(Stage::QueryingGrid));
        let (response, method) = self.query_grid(session, cancel).await?;
        let status = response.status();
        ensure_success(status)?;

        let url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let bytes = read_limited(
            response,
            self.settings.max_bytes,
            Stage::QueryingGrid,
            progress,
            cancel,
        )
        .await?;
        let decoded = decode_body(&bytes, content_type.as_deref());
        relay_info!(
            "Grid response received via {} ({} bytes, content-type {:?})",
            method,
            bytes.len(),
            content_type
        );

        Ok(GridResponse {
            body: decoded.text,
            metadata: FetchMetadata {
                url,
                method,
                status: status.as_u16(),
                content_type,
                byte_len: bytes.len() as u64,
                encoding: decoded.encoding_label,
                used_fallback: method == HttpMethod::Get,
            },
        })
    }
}

fn ensure_success(status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ))
    }
}

/// Streams the body, failing once it grows past `max_bytes`.
async fn read_limited(
    response: reqwest::Response,
    max_bytes: u64,
    stage: Stage,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, FetchError> {
    if let Some(content_len) = response.content_length() {
        if content_len > max_bytes {
            return Err(FetchError::new(
                FailureKind::TooLarge {
                    max_bytes,
                    actual: Some(content_len),
                },
                "response too large",
            ));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FetchError::new(FailureKind::Cancelled, "run cancelled"));
            }
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(map_reqwest_error)?;
        let next_len = bytes.len() as u64 + chunk.len() as u64;
        if next_len > max_bytes {
            return Err(FetchError::new(
                FailureKind::TooLarge {
                    max_bytes,
                    actual: Some(next_len),
                },
                "response too large",
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    progress.emit(RunEvent::BytesReceived {
        stage,
        bytes: bytes.len() as u64,
    });
    Ok(bytes)
}

pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::new(FailureKind::Cancelled, "run cancelled")),
        result = fut => result,
    }
}

fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
