//! Content normalization: markup-aware text extraction with a fallback
//! chain, then segmentation into bounded evidence snippets

use scraper::{Html, Node};

use crate::model::{EvidenceDocument, NormalizedDocument};

/// Maximum characters per snippet.
pub const MAX_SNIPPET_LENGTH: usize = 240;
/// Maximum snippets retained per document.
pub const MAX_SNIPPETS_PER_DOCUMENT: usize = 20;

/// An extraction result below this many non-whitespace characters is
/// treated as unusable and the next strategy is tried.
const MIN_USABLE_CHARS: usize = 50;

/// Normalize retrieved documents into bounded snippet sets.
///
/// Documents that yield no snippets are dropped from the output entirely.
pub fn normalize_documents(documents: &[EvidenceDocument]) -> Vec<NormalizedDocument> {
    let mut normalized = Vec::new();
    for doc in documents {
        let text = extract_text(&doc.content);
        let snippets = segment_snippets(&text);
        if snippets.is_empty() {
            tracing::debug!(url = %doc.url, "Document produced no snippets, dropping");
            continue;
        }
        normalized.push(NormalizedDocument {
            doc_id: doc.content_hash.chars().take(16).collect(),
            url: doc.url.to_string(),
            content_hash: doc.content_hash.clone(),
            snippets,
            source: doc.source,
        });
    }
    tracing::debug!(
        input_docs = documents.len(),
        output_docs = normalized.len(),
        "Normalized documents"
    );
    normalized
}

/// Ordered extraction chain; the first usable result wins and the raw
/// content passes through when both strategies come up short.
pub fn extract_text(raw: &str) -> String {
    if let Some(text) = extract_main_content(raw) {
        return text;
    }
    if let Some(text) = strip_markup(raw) {
        return text;
    }
    raw.to_string()
}

/// Primary strategy: HTML-aware main-content extraction via markdown
/// conversion.
fn extract_main_content(raw: &str) -> Option<String> {
    let text = htmd::convert(raw).ok()?;
    usable(text)
}

/// Secondary strategy: permissive markup strip that walks the DOM and
/// drops script/style/nav/header/footer subtrees.
fn strip_markup(raw: &str) -> Option<String> {
    let document = Html::parse_document(raw);
    let mut lines = Vec::new();

    for node in document.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let excluded = node.ancestors().any(|ancestor| match ancestor.value() {
            Node::Element(el) => matches!(
                el.name(),
                "script" | "style" | "nav" | "header" | "footer" | "head" | "noscript"
            ),
            _ => false,
        });
        if excluded {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    usable(lines.join("\n"))
}

fn usable(text: String) -> Option<String> {
    let non_whitespace = text.chars().filter(|c| !c.is_whitespace()).count();
    if non_whitespace >= MIN_USABLE_CHARS {
        Some(text)
    } else {
        None
    }
}

/// Split extracted text on newlines into trimmed, truncated snippets.
pub fn segment_snippets(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(truncate_chars)
        .take(MAX_SNIPPETS_PER_DOCUMENT)
        .collect()
}

fn truncate_chars(line: &str) -> String {
    if line.chars().count() <= MAX_SNIPPET_LENGTH {
        line.to_string()
    } else {
        line.chars().take(MAX_SNIPPET_LENGTH).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvidenceSource;
    use chrono::Utc;
    use url::Url;

    fn document(content: &str) -> EvidenceDocument {
        EvidenceDocument {
            url: Url::parse("https://example.com/doc").unwrap(),
            domain: "example.com".to_string(),
            content: content.to_string(),
            content_hash: "abcdef0123456789abcdef".to_string(),
            http_status: 200,
            retrieved_at: Utc::now(),
            from_cache: false,
            source: EvidenceSource::OfficialWeb,
        }
    }

    #[test]
    fn html_body_text_is_extracted() {
        let html = "<html><body><p>The supplier reported stable revenue for fiscal year \
                    2025 and no outstanding payment incidents.</p></body></html>";
        let text = extract_text(html);
        assert!(text.contains("stable revenue"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn markup_strip_excludes_script_and_nav() {
        let html = "<html><head><script>var x = 1;</script></head><body>\
                    <nav>Home | About | Contact us today</nav>\
                    <p>Net debt increased significantly during the period under review, \
                    raising liquidity concerns for the company.</p>\
                    <footer>Copyright 2025 Example Corp, all rights reserved</footer></body></html>";
        let text = strip_markup(html).unwrap();
        assert!(text.contains("Net debt increased"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("Contact us"));
    }

    #[test]
    fn short_content_falls_through_to_raw() {
        let raw = "tiny";
        assert_eq!(extract_text(raw), "tiny");
    }

    #[test]
    fn snippets_are_truncated_to_the_cap() {
        let long_line = "x".repeat(500);
        let snippets = segment_snippets(&long_line);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].chars().count(), MAX_SNIPPET_LENGTH);
    }

    #[test]
    fn snippet_count_is_capped_at_twenty() {
        let text = (0..40)
            .map(|i| format!("paragraph number {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let snippets = segment_snippets(&text);
        assert_eq!(snippets.len(), MAX_SNIPPETS_PER_DOCUMENT);
    }

    #[test]
    fn blank_lines_are_dropped() {
        let snippets = segment_snippets("first\n\n   \nsecond");
        assert_eq!(snippets, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn document_source_is_carried_through() {
        let mut doc = document("A golden fixture paragraph about supplier finances.");
        doc.source = EvidenceSource::InternalGolden;
        let normalized = normalize_documents(&[doc]);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].source, EvidenceSource::InternalGolden);
    }

    #[test]
    fn document_with_no_text_is_dropped() {
        let docs = vec![document("   \n  "), document("A meaningful paragraph about supplier finances.")];
        let normalized = normalize_documents(&docs);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].content_hash, "abcdef0123456789abcdef");
        assert_eq!(normalized[0].doc_id, "abcdef0123456789");
    }
}
