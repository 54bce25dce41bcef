// src/utils/text.rs

//! Comment body normalization.
//!
//! Board comments arrive as HTML fragments (`<br>` line breaks, quote links,
//! `<span class="quote">` greentext, escaped entities). Downstream consumers
//! want plain text with the quoting characters intact.

use scraper::{Html, Node};

/// Convert a raw comment body into plain text.
///
/// `<br>` becomes a newline, entities are decoded and every other tag is
/// dropped while keeping its text. Absent or empty input yields `""`.
pub fn normalize(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return String::new(),
    };

    let fragment = Html::parse_fragment(raw);
    let mut text = String::with_capacity(raw.len());

    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(chunk) => text.push_str(chunk),
            Node::Element(element) if element.name() == "br" => text.push('\n'),
            _ => {}
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_empty() {
        assert_eq!(normalize(None), "");
        assert_eq!(normalize(Some("")), "");
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(normalize(Some("a<br>b")), "a\nb");
        assert_eq!(normalize(Some("a<br><br>b")), "a\n\nb");
    }

    #[test]
    fn test_entities() {
        assert_eq!(normalize(Some("&gt;&gt;123")), ">>123");
        assert_eq!(normalize(Some("&quot;quoted&quot;")), "\"quoted\"");
        assert_eq!(normalize(Some("it&#039;s &amp; more")), "it's & more");
    }

    #[test]
    fn test_board_markup() {
        let raw = "<a href=\"#p4242\" class=\"quotelink\">&gt;&gt;4242</a><br>\
                   <span class=\"quote\">&gt;implying</span><br>no";
        assert_eq!(normalize(Some(raw)), ">>4242\n>implying\nno");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(normalize(Some("just words")), "just words");
    }
}
