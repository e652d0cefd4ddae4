use std::collections::HashMap;

use crate::{Notice, NoticeBatch, NoticeKind};

/// Number of `(company, type)` pairs kept in [`NoticeSummary::recent_companies`].
pub const RECENT_COMPANY_LIMIT: usize = 5;

/// Keeps placement and internship notices, preserving order.
pub fn filter_relevant(notices: &[Notice]) -> Vec<Notice> {
    notices
        .iter()
        .filter(|notice| notice.is_relevant())
        .cloned()
        .collect()
}

/// Re-applies the type filter to a batch. Filtering a batch built with
/// [`NoticeBatch::relevant`] returns an equal batch.
pub fn filter_batch(batch: &NoticeBatch) -> NoticeBatch {
    NoticeBatch::with_stamp(
        batch.scraped_at().to_string(),
        filter_relevant(batch.notices()),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NoticeSummary {
    pub total: usize,
    pub placement: usize,
    pub internship: usize,
    pub other: usize,
    /// Relevant notices per category, largest first, ties by name.
    pub by_category: Vec<(String, usize)>,
    /// First relevant `(company, type)` pairs in source order.
    pub recent_companies: Vec<(String, String)>,
}

impl NoticeSummary {
    pub fn relevant(&self) -> usize {
        self.placement + self.internship
    }
}

pub fn summarize(notices: &[Notice]) -> NoticeSummary {
    let mut summary = NoticeSummary {
        total: notices.len(),
        ..NoticeSummary::default()
    };
    let mut categories: HashMap<&str, usize> = HashMap::new();

    for notice in notices {
        match notice.kind() {
            NoticeKind::Placement => summary.placement += 1,
            NoticeKind::Internship => summary.internship += 1,
            NoticeKind::Other => {
                summary.other += 1;
                continue;
            }
        }
        *categories.entry(notice.category.as_str()).or_default() += 1;
        if summary.recent_companies.len() < RECENT_COMPANY_LIMIT {
            summary
                .recent_companies
                .push((notice.company.clone(), notice.notice_type.clone()));
        }
    }

    let mut by_category: Vec<(String, usize)> = categories
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    by_category.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    summary.by_category = by_category;
    summary
}
