use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Plain text of a notice cell.
///
/// Values without a complete tag are returned unchanged, so a bare `<` as in
/// `marks<cutoff` survives. Anything else is parsed as an HTML fragment; its
/// text is kept, block boundaries and `<br>` become a single space,
/// whitespace runs collapse and the result is trimmed.
pub fn strip_markup(raw: &str) -> String {
    let Some(markup) = escape_stray_angles(raw) else {
        return raw.to_string();
    };
    let fragment = Html::parse_fragment(&markup);
    let mut text = TextCollector::default();
    for child in fragment.root_element().children() {
        visit(child, &mut text);
    }
    text.finish()
}

/// Escapes every `<` that does not open a complete tag, so the HTML parser
/// keeps it as text instead of swallowing the rest of the value. Returns
/// `None` when no complete tag is present at all.
fn escape_stray_angles(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut has_tag = false;
    for (index, ch) in raw.char_indices() {
        if ch != '<' {
            out.push(ch);
            continue;
        }
        if opens_tag(&raw[index + 1..]) {
            has_tag = true;
            out.push('<');
        } else {
            out.push_str("&lt;");
        }
    }
    has_tag.then_some(out)
}

/// `rest` follows a `<`: a tag starts with a letter, `/`, `!` or `?` and is
/// closed by `>` before any further `<`.
fn opens_tag(rest: &str) -> bool {
    let starts_tag = rest
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));
    starts_tag
        && match (rest.find('>'), rest.find('<')) {
            (Some(close), Some(next_open)) => close < next_open,
            (Some(_), None) => true,
            (None, _) => false,
        }
}

fn visit(node: NodeRef<'_, Node>, text: &mut TextCollector) {
    match node.value() {
        Node::Text(chunk) => text.push_str(chunk),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, text);
            }
        }
        _ => {
            for child in node.children() {
                visit(child, text);
            }
        }
    }
}

fn visit_element(element: ElementRef<'_>, text: &mut TextCollector) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "script" | "style" | "noscript" | "template" => {}
        "br" | "hr" => text.separate(),
        "p" | "div" | "li" | "ul" | "ol" | "table" | "tr" | "td" | "th" | "h1" | "h2" | "h3"
        | "h4" | "h5" | "h6" | "blockquote" | "section" | "article" => {
            text.separate();
            for child in element.children() {
                visit(child, text);
            }
            text.separate();
        }
        _ => {
            for child in element.children() {
                visit(child, text);
            }
        }
    }
}

#[derive(Default)]
struct TextCollector {
    out: String,
    pending_space: bool,
}

impl TextCollector {
    fn push_str(&mut self, chunk: &str) {
        for ch in chunk.chars() {
            if ch.is_whitespace() {
                self.separate();
            } else {
                if self.pending_space && !self.out.is_empty() {
                    self.out.push(' ');
                }
                self.pending_space = false;
                self.out.push(ch);
            }
        }
    }

    fn separate(&mut self) {
        self.pending_space = true;
    }

    fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::strip_markup;

    #[test]
    fn text_without_angle_bracket_is_untouched() {
        assert_eq!(strip_markup("  Apply   now & hurry "), "  Apply   now & hurry ");
    }

    #[test]
    fn tags_are_removed() {
        assert_eq!(strip_markup("<p>Apply now</p>"), "Apply now");
    }

    #[test]
    fn inline_tags_do_not_split_words() {
        assert_eq!(strip_markup("Hello <b>wor</b>ld!"), "Hello world!");
    }

    #[test]
    fn blocks_and_breaks_become_spaces() {
        assert_eq!(
            strip_markup("<div>Line one<br>Line two</div><p>\n  Last   line </p>"),
            "Line one Line two Last line"
        );
    }

    #[test]
    fn scripts_and_styles_are_dropped() {
        assert_eq!(
            strip_markup("<style>p{}</style><p>Visible</p><script>alert(1)</script>"),
            "Visible"
        );
    }

    #[test]
    fn unfinished_tags_are_kept_as_text() {
        assert_eq!(strip_markup("Eligible if marks<cutoff"), "Eligible if marks<cutoff");
        assert_eq!(strip_markup("CGPA<8 & branch<ECE"), "CGPA<8 & branch<ECE");
    }

    #[test]
    fn stray_angles_survive_next_to_real_tags() {
        assert_eq!(
            strip_markup("<b>Eligible</b> if marks<cutoff"),
            "Eligible if marks<cutoff"
        );
        assert_eq!(strip_markup("<p>CGPA<8 &amp; CSE</p>"), "CGPA<8 & CSE");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(strip_markup("<p>R&amp;D &lt;team&gt;</p>"), "R&D <team>");
    }
}
