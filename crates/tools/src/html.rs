//! Just-enough HTML handling for the scrape and transcript tools.
//!
//! This is deliberately not a DOM parser: tool output is model food, so a
//! readable approximation beats fidelity.

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|template)[^>]*>.*?</(script|style|noscript|template)>")
        .expect("static regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

static TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));

static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("static regex"));

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Reduce an HTML document to readable text.
pub(crate) fn to_text(html: &str) -> String {
    let without_blocks = SCRIPT_OR_STYLE.replace_all(html, " ");

    // Keep paragraph-ish structure before stripping the rest.
    let with_breaks = without_blocks
        .replace("</p>", "\n")
        .replace("</P>", "\n")
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</div>", "\n")
        .replace("</li>", "\n");

    let stripped = TAG.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&stripped);

    let collapsed: String = decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_LINES.replace_all(&collapsed, "\n\n").into_owned()
}

/// Document title, if present.
pub(crate) fn title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .map(|captures| decode_entities(captures[1].trim()))
        .filter(|title| !title.is_empty())
}

/// Absolute image URLs referenced by the document, capped.
pub(crate) fn image_urls(html: &str, base: &url::Url, cap: usize) -> Vec<String> {
    IMG_SRC
        .captures_iter(html)
        .filter_map(|captures| base.join(&captures[1]).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
        .take(cap)
        .collect()
}

/// Decode the handful of entities that actually show up in text content.
pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}
