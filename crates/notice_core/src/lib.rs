//! Notice core: the notice record, batches, projections and the type filter.
mod batch;
mod classify;
mod notice;
mod projection;

pub use batch::{format_scraped_at, now_ist, NoticeBatch, IST};
pub use classify::{filter_batch, filter_relevant, summarize, NoticeSummary, RECENT_COMPANY_LIMIT};
pub use notice::{Notice, NoticeKind};
pub use projection::{
    encode_payload, encode_snapshot, minimal_projection, MinimalBatch, MinimalNotice, PayloadShape,
};
