//! Text preparation for classification and embedding.

use std::sync::OnceLock;

use regex::Regex;

use crate::storage::{ProductAttributes, ProductDetails, ProductRecord};

/// Characters of description kept in the classification bundle.
pub const MAX_DESCRIPTION_CHARS: usize = 1_000;

/// Upper bound on the whole classification bundle.
pub const MAX_BUNDLE_CHARS: usize = 2_000;

/// Upper bound on the text sent for embedding.
pub const MAX_EMBEDDING_CHARS: usize = 4_000;

/// Tags kept in the classification bundle.
const MAX_TAGS: usize = 30;

struct MarkupPatterns {
    blocks: Regex,
    tags: Regex,
    whitespace: Regex,
}

fn markup_patterns() -> Option<&'static MarkupPatterns> {
    static PATTERNS: OnceLock<Option<MarkupPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(MarkupPatterns {
                blocks: Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").ok()?,
                tags: Regex::new(r"(?s)<[^>]*>").ok()?,
                whitespace: Regex::new(r"\s+").ok()?,
            })
        })
        .as_ref()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Strips HTML markup, decodes common entities and collapses whitespace.
pub fn strip_markup(html: &str) -> String {
    let Some(patterns) = markup_patterns() else {
        return html.split_whitespace().collect::<Vec<_>>().join(" ");
    };

    let without_blocks = patterns.blocks.replace_all(html, " ");
    let without_tags = patterns.tags.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    patterns
        .whitespace
        .replace_all(&decoded, " ")
        .trim()
        .to_string()
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn push_field(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        out.push_str(label);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
}

/// Builds the bounded text the classifier sees.
///
/// Vendor falls back to the brand name when the product row has none.
pub fn build_text_bundle(details: &ProductDetails) -> String {
    let product = &details.product;
    let description = product
        .description
        .as_deref()
        .map(strip_markup)
        .unwrap_or_default();
    let vendor = product
        .vendor
        .as_deref()
        .or_else(|| details.brand.as_ref().map(|b| b.name.as_str()));
    let tags = product
        .tags
        .iter()
        .take(MAX_TAGS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let mut bundle = String::new();
    push_field(&mut bundle, "Title", Some(&product.title));
    push_field(
        &mut bundle,
        "Description",
        Some(truncate_chars(&description, MAX_DESCRIPTION_CHARS)),
    );
    push_field(&mut bundle, "Product type", product.product_type.as_deref());
    push_field(&mut bundle, "Vendor", vendor);
    push_field(&mut bundle, "Tags", Some(&tags));

    truncate_chars(bundle.trim_end(), MAX_BUNDLE_CHARS).to_string()
}

/// Builds the text embedded for similarity search.
pub fn build_embedding_text(product: &ProductRecord, attributes: &ProductAttributes) -> String {
    let description = product
        .description
        .as_deref()
        .map(strip_markup)
        .unwrap_or_default();

    let parts: Vec<&str> = [
        Some(product.title.as_str()),
        Some(description.as_str()),
        attributes.category.as_deref(),
        attributes.gender.as_deref(),
        attributes.primary_color.as_deref(),
        attributes.product_type.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .collect();

    truncate_chars(&parts.join(". "), MAX_EMBEDDING_CHARS).to_string()
}
