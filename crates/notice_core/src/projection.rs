use serde::Serialize;

use crate::NoticeBatch;

/// Which view of a batch a sink receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// The batch as-is, including `notice_text` and `notice_by`.
    Full,
    /// Listing fields only; see [`MinimalNotice`].
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinimalNotice<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub notice_type: &'a str,
    pub category: &'a str,
    pub company: &'a str,
    pub notice_time: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinimalBatch<'a> {
    pub scraped_at: &'a str,
    pub total_notices: usize,
    pub notices: Vec<MinimalNotice<'a>>,
}

pub fn minimal_projection(batch: &NoticeBatch) -> MinimalBatch<'_> {
    let notices: Vec<MinimalNotice<'_>> = batch
        .notices()
        .iter()
        .map(|notice| MinimalNotice {
            id: &notice.id,
            notice_type: &notice.notice_type,
            category: &notice.category,
            company: &notice.company,
            notice_time: &notice.notice_time,
        })
        .collect();
    MinimalBatch {
        scraped_at: batch.scraped_at(),
        total_notices: notices.len(),
        notices,
    }
}

/// Compact UTF-8 JSON body for a push request.
pub fn encode_payload(shape: PayloadShape, batch: &NoticeBatch) -> serde_json::Result<Vec<u8>> {
    match shape {
        PayloadShape::Full => serde_json::to_vec(batch),
        PayloadShape::Minimal => serde_json::to_vec(&minimal_projection(batch)),
    }
}

/// Indented UTF-8 JSON for the local snapshot file.
pub fn encode_snapshot(batch: &NoticeBatch) -> serde_json::Result<String> {
    let mut text = serde_json::to_string_pretty(batch)?;
    text.push('\n');
    Ok(text)
}
