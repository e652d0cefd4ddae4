use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::filter_relevant;
use crate::Notice;

/// Fixed UTC+05:30 offset used for every `scraped_at` stamp.
pub const IST: FixedOffset = match FixedOffset::east_opt(5 * 3600 + 30 * 60) {
    Some(offset) => offset,
    None => panic!("invalid IST offset"),
};

pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&IST)
}

/// RFC 3339 with microseconds, always rendered in the +05:30 offset.
pub fn format_scraped_at(at: DateTime<FixedOffset>) -> String {
    at.with_timezone(&IST)
        .to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// The result of one scrape. Immutable once built; `total_notices` always
/// equals `notices.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BatchWire")]
pub struct NoticeBatch {
    scraped_at: String,
    total_notices: usize,
    notices: Vec<Notice>,
}

impl NoticeBatch {
    pub fn new(scraped_at: DateTime<FixedOffset>, notices: Vec<Notice>) -> Self {
        Self::with_stamp(format_scraped_at(scraped_at), notices)
    }

    /// Builds the publishable batch: only placement and internship notices,
    /// in source order.
    pub fn relevant(scraped_at: DateTime<FixedOffset>, notices: &[Notice]) -> Self {
        Self::new(scraped_at, filter_relevant(notices))
    }

    pub(crate) fn with_stamp(scraped_at: String, notices: Vec<Notice>) -> Self {
        Self {
            scraped_at,
            total_notices: notices.len(),
            notices,
        }
    }

    pub fn scraped_at(&self) -> &str {
        &self.scraped_at
    }

    pub fn total_notices(&self) -> usize {
        self.total_notices
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

#[derive(Deserialize)]
struct BatchWire {
    scraped_at: String,
    total_notices: usize,
    notices: Vec<Notice>,
}

impl TryFrom<BatchWire> for NoticeBatch {
    type Error = String;

    fn try_from(wire: BatchWire) -> Result<Self, Self::Error> {
        if wire.total_notices != wire.notices.len() {
            return Err(format!(
                "total_notices is {} but {} notices are present",
                wire.total_notices,
                wire.notices.len()
            ));
        }
        Ok(Self::with_stamp(wire.scraped_at, wire.notices))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_scraped_at, IST};

    #[test]
    fn stamp_is_rendered_in_ist_with_micros() {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 1, 4, 30, 0)
            .unwrap()
            .with_timezone(&IST);
        assert_eq!(format_scraped_at(at), "2024-01-01T10:00:00.000000+05:30");
    }

    #[test]
    fn foreign_offsets_are_converted() {
        let utc = Utc
            .with_ymd_and_hms(2024, 6, 30, 20, 0, 0)
            .unwrap()
            .fixed_offset();
        assert_eq!(format_scraped_at(utc), "2024-07-01T01:30:00.000000+05:30");
    }
}
