use std::time::Duration;

use notice_core::{encode_payload, NoticeBatch, PayloadShape};
use relay_logging::{relay_info, relay_warn};
use serde_json::Value;
use thiserror::Error;

use crate::config::SinkConfig;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// How much of an error body is kept for the log.
const ERROR_BODY_PREVIEW: usize = 500;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sink returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// What a sink said about an accepted push.
#[derive(Debug, Clone, PartialEq)]
pub struct PushReceipt {
    pub status: u16,
    /// Number of notices the sink reported as new, when it reports one.
    pub new_notices: Option<u64>,
    pub body: Option<Value>,
    /// Set when the status arrived but the body could not be read.
    pub body_error: Option<String>,
}

/// An HTTP endpoint receiving one projection of each batch.
#[derive(Debug, Clone)]
pub struct PushSink {
    config: SinkConfig,
    client: reqwest::Client,
}

impl PushSink {
    pub fn new(config: SinkConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Builds a sink with its own client bounded by `timeout`.
    pub fn with_timeout(config: SinkConfig, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(config, client))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn shape(&self) -> PayloadShape {
        self.config.shape
    }

    pub async fn push(&self, batch: &NoticeBatch) -> Result<PushReceipt, SinkError> {
        let endpoint = self.config.endpoint();
        let payload = encode_payload(self.config.shape, batch)?;
        relay_info!(
            "Pushing {} notices ({:?} payload, {} bytes) to {} at {}",
            batch.total_notices(),
            self.config.shape,
            payload.len(),
            self.config.name,
            endpoint
        );

        let response = self
            .client
            .post(&endpoint)
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let (text, body_error) = match response.text().await {
            Ok(text) => (text, None),
            Err(err) => {
                relay_warn!(
                    "Could not read {} response body (status {}): {}",
                    self.config.name,
                    status,
                    err
                );
                (String::new(), Some(err.to_string()))
            }
        };
        if !status.is_success() {
            return Err(SinkError::Status {
                status: status.as_u16(),
                body: truncate(&text, ERROR_BODY_PREVIEW),
            });
        }

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(value) => Some(value),
            Err(_) if body_error.is_some() => None,
            Err(err) => {
                relay_warn!("{} returned a non-JSON body: {}", self.config.name, err);
                None
            }
        };
        let new_notices = body
            .as_ref()
            .and_then(|value| value.get("new_notices"))
            .and_then(Value::as_u64);

        Ok(PushReceipt {
            status: status.as_u16(),
            new_notices,
            body,
            body_error,
        })
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abcdef", 3), "abc");
    }
}
