use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use relay_logging::relay_warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBody {
    pub text: String,
    pub encoding_label: String,
    /// Some bytes were invalid for the encoding and became U+FFFD.
    pub had_replacements: bool,
}

/// Decode a response body into UTF-8 using: BOM -> Content-Type charset -> chardetng fallback.
///
/// Invalid byte sequences are replaced with U+FFFD and logged, never rejected.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> DecodedBody {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(label) = content_type.and_then(extract_charset) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            return decode_with(bytes, enc);
        }
    }

    // Grid responses are overwhelmingly UTF-8; only sniff when that fails.
    if let Ok(text) = std::str::from_utf8(bytes) {
        return DecodedBody {
            text: text.to_string(),
            encoding_label: encoding_rs::UTF_8.name().to_string(),
            had_replacements: false,
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("charset") {
                return None;
            }
            Some(value.trim().trim_matches(['"', '\'']))
        })
        .next()
        .map(|s| s.to_string())
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedBody {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        relay_warn!(
            "Body is not valid {}; invalid bytes were replaced with U+FFFD",
            enc.name()
        );
    }
    DecodedBody {
        text: text.into_owned(),
        encoding_label: enc.name().to_string(),
        had_replacements: had_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::extract_charset;

    #[test]
    fn charset_parameter_is_found_in_any_case() {
        assert_eq!(
            extract_charset("text/xml; CharSet=\"ISO-8859-1\"").as_deref(),
            Some("ISO-8859-1")
        );
        assert_eq!(extract_charset("text/xml;charset=utf-8").as_deref(), Some("utf-8"));
        assert_eq!(extract_charset("text/xml"), None);
    }
}
