//! Visible-text extraction from HTML markup.

use scraper::{node::Node, Html};

/// Elements whose text is never shown to a reader.
/// `noscript` content arrives as one raw-markup text node.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript"];

/// Convert markup into lowercase visible text.
///
/// Parsing is lenient: malformed markup yields whatever text html5ever can
/// recover. Text nodes are trimmed, empty ones dropped, and the rest joined
/// with a single space.
pub fn extract_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
            Node::Element(el) => HIDDEN_TAGS.contains(&el.name()),
            _ => false,
        });
        if hidden {
            continue;
        }
        let piece = text.trim();
        if !piece.is_empty() {
            parts.push(piece);
        }
    }

    parts.join(" ").to_lowercase()
}
