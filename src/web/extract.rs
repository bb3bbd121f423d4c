use std::io::Cursor;

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub title: String,
    pub text: String,
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reduce an HTML page to a readable title/text pair.
///
/// Readability extraction first; if it yields nothing, fall back to a
/// plain markdown conversion of the raw HTML so that pages without an
/// article body still produce something usable.
pub fn extract_readable_document(html: &str, url: &Url) -> anyhow::Result<ExtractedDocument> {
    let mut cursor = Cursor::new(html.as_bytes());
    if let Ok(product) = llm_readability::extractor::extract(&mut cursor, url) {
        let title = normalize_whitespace(&product.title);
        let text = normalize_whitespace(&product.text);
        if !text.is_empty() {
            return Ok(ExtractedDocument {
                title: if title.is_empty() { "untitled".to_string() } else { title },
                text,
            });
        }
    }

    let converted = htmd::convert(html).map_err(|e| anyhow::anyhow!("extract failed: {e}"))?;
    let text = normalize_whitespace(&converted);
    if text.is_empty() {
        anyhow::bail!("extract produced empty text");
    }
    Ok(ExtractedDocument {
        title: "untitled".to_string(),
        text,
    })
}
