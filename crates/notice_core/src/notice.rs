use serde::{Deserialize, Serialize};

/// One announcement from the notice board grid.
///
/// Field order matches the grid's column order and the JSON wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub id: String,
    #[serde(rename = "type")]
    pub notice_type: String,
    pub category: String,
    pub company: String,
    pub notice_text: String,
    pub notice_by: String,
    pub notice_time: String,
}

impl Notice {
    pub fn kind(&self) -> NoticeKind {
        NoticeKind::from_label(&self.notice_type)
    }

    /// Placement and internship notices are the only ones republished.
    pub fn is_relevant(&self) -> bool {
        self.kind().is_relevant()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Placement,
    Internship,
    Other,
}

impl NoticeKind {
    pub const PLACEMENT: &'static str = "PLACEMENT";
    pub const INTERNSHIP: &'static str = "INTERNSHIP";

    /// Exact, case-sensitive match against the grid's type labels.
    pub fn from_label(label: &str) -> Self {
        match label {
            Self::PLACEMENT => NoticeKind::Placement,
            Self::INTERNSHIP => NoticeKind::Internship,
            _ => NoticeKind::Other,
        }
    }

    pub fn is_relevant(self) -> bool {
        matches!(self, NoticeKind::Placement | NoticeKind::Internship)
    }
}

#[cfg(test)]
mod tests {
    use super::NoticeKind;

    #[test]
    fn labels_are_matched_exactly() {
        assert_eq!(NoticeKind::from_label("PLACEMENT"), NoticeKind::Placement);
        assert_eq!(NoticeKind::from_label("INTERNSHIP"), NoticeKind::Internship);
        assert_eq!(NoticeKind::from_label("placement"), NoticeKind::Other);
        assert_eq!(NoticeKind::from_label(" PLACEMENT"), NoticeKind::Other);
        assert_eq!(NoticeKind::from_label("CDC"), NoticeKind::Other);
    }
}
