use notice_core::Notice;
use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use relay_logging::{relay_debug, relay_warn};

use crate::markup::strip_markup;

/// Rows with fewer cells than this are dropped.
pub const MIN_CELLS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed grid xml at byte {position}: {message}")]
    Malformed { position: u64, message: String },
    #[error("grid xml ended with {open} unclosed element(s)")]
    Truncated { open: usize },
}

/// A `<row>` as it appears in the grid document: its `id` attribute and the
/// trimmed text of each `<cell>`, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridRow {
    pub id_attr: Option<String>,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedGrid {
    pub rows_seen: usize,
    pub notices: Vec<Notice>,
}

/// Parses a jqGrid XML document (`<rows><row id=".."><cell>..</cell>..</row>..</rows>`)
/// into notices, in document order. Rows that do not qualify are skipped.
pub fn parse_grid(xml: &str) -> Result<ParsedGrid, ParseError> {
    let rows = read_rows(xml)?;
    if rows.is_empty() {
        relay_warn!("Grid document contains no <row> elements");
    }
    let rows_seen = rows.len();
    let notices: Vec<Notice> = rows.into_iter().filter_map(notice_from_row).collect();
    relay_debug!(
        "Grid parsed rows_seen={} notices={} dropped={}",
        rows_seen,
        notices.len(),
        rows_seen - notices.len()
    );
    Ok(ParsedGrid { rows_seen, notices })
}

/// Maps cells positionally to a notice. Returns `None` for rows with fewer
/// than [`MIN_CELLS`] cells or with an empty id or type.
pub fn notice_from_row(row: GridRow) -> Option<Notice> {
    if row.cells.len() < MIN_CELLS {
        return None;
    }
    let mut cells = row.cells.into_iter();
    let mut next = || cells.next().unwrap_or_default();

    let mut id = next();
    if id.is_empty() {
        id = row.id_attr.map(|v| v.trim().to_string()).unwrap_or_default();
    }
    let notice = Notice {
        id,
        notice_type: next(),
        category: next(),
        company: next(),
        notice_text: strip_markup(&next()),
        notice_by: next(),
        notice_time: next(),
    };
    if notice.id.is_empty() || notice.notice_type.is_empty() {
        return None;
    }
    Some(notice)
}

/// Collects every `<row>` in document order.
pub fn read_rows(xml: &str) -> Result<Vec<GridRow>, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = true;

    let mut collector = RowCollector::default();
    let mut depth: usize = 0;

    loop {
        let event = reader.read_event().map_err(|err| ParseError::Malformed {
            position: reader.buffer_position() as u64,
            message: err.to_string(),
        })?;
        match event {
            Event::Start(start) => {
                depth += 1;
                collector.open(&start, depth, false);
            }
            Event::Empty(start) => collector.open(&start, depth + 1, true),
            Event::End(end) => {
                collector.close(end.local_name().as_ref(), depth);
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) => {
                if collector.in_cell() {
                    collector.push_text(&unescape_cell_text(&String::from_utf8_lossy(&text)));
                }
            }
            Event::CData(data) => {
                if collector.in_cell() {
                    collector.push_text(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ParseError::Truncated { open: depth });
    }
    Ok(collector.rows)
}

#[derive(Default)]
struct RowCollector {
    rows: Vec<GridRow>,
    current: Option<GridRow>,
    /// Depth at which the open `<cell>` started, plus its text so far.
    cell: Option<(usize, String)>,
}

impl RowCollector {
    fn in_cell(&self) -> bool {
        self.cell.is_some()
    }

    fn push_text(&mut self, text: &str) {
        if let Some((_, buf)) = self.cell.as_mut() {
            buf.push_str(text);
        }
    }

    fn open(&mut self, start: &BytesStart<'_>, depth: usize, self_closing: bool) {
        // Markup nested inside a cell only contributes its text.
        if self.cell.is_some() {
            return;
        }
        match start.local_name().as_ref() {
            b"row" if self.current.is_none() => {
                let row = GridRow {
                    id_attr: row_id(start),
                    cells: Vec::new(),
                };
                if self_closing {
                    self.rows.push(row);
                } else {
                    self.current = Some(row);
                }
            }
            b"cell" => {
                if let Some(row) = self.current.as_mut() {
                    if self_closing {
                        row.cells.push(String::new());
                    } else {
                        self.cell = Some((depth, String::new()));
                    }
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8], depth: usize) {
        match name {
            b"cell" if matches!(self.cell, Some((d, _)) if d == depth) => {
                if let (Some((_, text)), Some(row)) = (self.cell.take(), self.current.as_mut()) {
                    row.cells.push(text.trim().to_string());
                }
            }
            b"row" if self.cell.is_none() => {
                if let Some(row) = self.current.take() {
                    self.rows.push(row);
                }
            }
            _ => {}
        }
    }
}

/// Resolves XML and HTML named entities plus numeric references one at a
/// time. A reference that cannot be resolved is kept verbatim.
pub fn unescape_cell_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let name_len = tail[1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '#'))
            .unwrap_or(tail.len() - 1);
        if name_len > 0 && tail[1 + name_len..].starts_with(';') {
            let reference = &tail[..name_len + 2];
            match unescape_with(reference, resolve_entity) {
                Ok(value) => out.push_str(&value),
                Err(_) => out.push_str(reference),
            }
            rest = &tail[reference.len()..];
        } else {
            out.push('&');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    resolve_predefined_entity(name).or_else(|| resolve_html5_entity(name))
}

fn row_id(start: &BytesStart<'_>) -> Option<String> {
    start
        .try_get_attribute("id")
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::unescape_cell_text;

    #[test]
    fn html_and_xml_entities_resolve_together() {
        assert_eq!(
            unescape_cell_text("Apply&nbsp;now &amp; hurry"),
            "Apply\u{a0}now & hurry"
        );
        assert_eq!(unescape_cell_text("&lt;b&gt; &#65;&#x42;"), "<b> AB");
    }

    #[test]
    fn unknown_references_stay_verbatim() {
        assert_eq!(unescape_cell_text("&bogus; &amp; co"), "&bogus; & co");
        assert_eq!(unescape_cell_text("R & D; 5&"), "R & D; 5&");
        assert_eq!(unescape_cell_text("&#xZZ; ok"), "&#xZZ; ok");
    }
}
