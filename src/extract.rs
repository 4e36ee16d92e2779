use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::error;

use crate::xml::{self, Element};

static INLINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s-u)<!--(.*?)-->").unwrap());
// Decorative comment tokens the exporter leaves inside the payload itself.
static DECOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s-u)<-.*->").unwrap());

/// Recover the XML payload embedded in an extrakt page's comment blocks.
///
/// Every comment region is a candidate; the first one that starts with an
/// XML declaration and parses cleanly wins. Candidates that fail to parse
/// are logged with the source URL and the scan continues. `None` means the
/// page carries no payload, which callers treat as "nothing to ingest".
pub fn inline_xml_from_page(page: &[u8], url: &str) -> Option<Element> {
    for cap in INLINE_RE.captures_iter(page) {
        let Some(m) = cap.get(1) else { continue };
        let comment = m.as_bytes().trim_ascii();
        if !comment.starts_with(b"<?xml") {
            continue;
        }

        let cleaned = DECOR_RE.replace_all(comment, &b""[..]);

        // The declaration runs through the first '>' and names the byte
        // encoding; the body after it is what gets parsed.
        let Some(gt) = cleaned.iter().position(|&b| b == b'>') else {
            continue;
        };
        let (decl, body) = cleaned.split_at(gt + 1);

        let text = decode_declared(body, decl).replace('\u{000b}', " ");
        match xml::parse(&text) {
            Ok(doc) => return Some(doc),
            Err(e) => error!("Failed to parse XML comment on {}: {}", url, e),
        }
    }
    None
}

fn decode_declared(body: &[u8], decl: &[u8]) -> String {
    let decl = decl.to_ascii_lowercase();
    if windows_contain(&decl, b"utf-8") {
        String::from_utf8_lossy(body).into_owned()
    } else {
        decode_latin1(body)
    }
}

fn windows_contain(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Latin-1 is a 1:1 byte-to-codepoint mapping; the extrakt pages and their
/// payloads default to it.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://dipbt.bundestag.de/extrakt/ba/WP17/40001.html";

    #[test]
    fn payload_with_decoration_parses() {
        let page = b"<html><body>\n<!-- layout -->\n<!--\n<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<- extrakt dump ->\n<VORGANG><TITEL>Beispiel</TITEL></VORGANG>\n-->\n</body></html>";
        let doc = inline_xml_from_page(page, URL).unwrap();
        assert_eq!(doc.find_text("TITEL").as_deref(), Some("Beispiel"));
    }

    #[test]
    fn latin1_payload_is_decoded() {
        let page = b"<!--<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><VORGANG><TITEL>Bew\xe4hrung</TITEL></VORGANG>-->";
        let doc = inline_xml_from_page(page, URL).unwrap();
        assert_eq!(doc.find_text("TITEL").as_deref(), Some("Bew\u{e4}hrung"));
    }

    #[test]
    fn vertical_tab_is_normalized() {
        let page = b"<!--<?xml version=\"1.0\"?><VORGANG><TITEL>Teil\x0beins</TITEL></VORGANG>-->";
        let doc = inline_xml_from_page(page, URL).unwrap();
        assert_eq!(doc.find_text("TITEL").as_deref(), Some("Teil eins"));
    }

    #[test]
    fn malformed_candidate_does_not_abort_scan() {
        let page = b"<!--<?xml version=\"1.0\"?><VORGANG><TITEL>kaputt</VORGANG>-->\n<!--<?xml version=\"1.0\"?><VORGANG><TITEL>heil</TITEL></VORGANG>-->";
        let doc = inline_xml_from_page(page, URL).unwrap();
        assert_eq!(doc.find_text("TITEL").as_deref(), Some("heil"));
    }

    #[test]
    fn page_without_payload_yields_none() {
        let page = b"<html><!-- nur layout --><body>Kein Extrakt</body></html>";
        assert!(inline_xml_from_page(page, URL).is_none());
    }

    #[test]
    fn non_xml_comments_are_skipped() {
        let page = b"<!-- erster --><!--<?xml version=\"1.0\"?><V><X>ok</X></V>--><!-- letzter -->";
        let doc = inline_xml_from_page(page, URL).unwrap();
        assert_eq!(doc.find_text("X").as_deref(), Some("ok"));
    }
}
