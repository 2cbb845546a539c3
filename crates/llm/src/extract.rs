//! Post-completion artifact distillation.
//!
//! Scans the artifacts tool executions produced during the request and
//! derives the deduplicated index of sources, images and media surfaced in
//! `message_complete`. Nothing in here ever touches the model's
//! conversation: these artifacts are client-only supplementary data.

use std::collections::HashSet;

use serde::Serialize;
use tools::{Artifacts, Source};

/// Query parameters stripped during canonicalization. Tracking noise that
/// would otherwise defeat URL-based deduplication.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "ref", "ref_src", "igshid",
];

/// The `extractedContent` payload of `message_complete`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    /// Deduplicated cited sources.
    pub sources: Vec<Source>,
    /// Deduplicated image URLs.
    pub images: Vec<String>,
    /// Deduplicated YouTube watch URLs.
    pub youtube_videos: Vec<String>,
    /// Deduplicated non-YouTube video URLs.
    pub other_videos: Vec<String>,
    /// Deduplicated other media URLs.
    pub media: Vec<String>,
}

impl ExtractedContent {
    /// Whether anything was extracted.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.images.is_empty()
            && self.youtube_videos.is_empty()
            && self.other_videos.is_empty()
            && self.media.is_empty()
    }

    /// Distill the artifact sets gathered over the whole request.
    ///
    /// Deduplication is by canonical URL; the first occurrence wins, so
    /// earlier tool results take precedence over later repeats.
    pub fn distill<I>(artifact_sets: I) -> Self
    where
        I: IntoIterator<Item = Artifacts>,
    {
        let mut seen = HashSet::new();
        let mut extracted = Self::default();

        for artifacts in artifact_sets {
            for source in artifacts.sources {
                let Some(canonical) = canonicalize_url(&source.url) else {
                    continue;
                };

                if seen.insert(format!("source:{canonical}")) {
                    extracted.sources.push(Source {
                        url: canonical,
                        ..source
                    });
                }
            }

            dedup_into(&mut extracted.images, artifacts.images, "image", &mut seen);
            dedup_into(&mut extracted.youtube_videos, artifacts.youtube_videos, "yt", &mut seen);
            dedup_into(&mut extracted.other_videos, artifacts.other_videos, "video", &mut seen);
            dedup_into(&mut extracted.media, artifacts.media, "media", &mut seen);
        }

        extracted
    }
}

fn dedup_into(target: &mut Vec<String>, candidates: Vec<String>, class: &str, seen: &mut HashSet<String>) {
    for candidate in candidates {
        let Some(canonical) = canonicalize_url(&candidate) else {
            continue;
        };

        if seen.insert(format!("{class}:{canonical}")) {
            target.push(canonical);
        }
    }
}

/// Canonical form of a URL for deduplication and display.
///
/// Lowercases scheme and host (the parser already does), strips the
/// fragment and tracking parameters, and sorts the remaining query pairs.
pub(crate) fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = url::Url::parse(raw).ok()?;

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            let key = key.to_ascii_lowercase();
            !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
        })
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let query: String = pairs
            .iter()
            .map(|(key, value)| {
                if value.is_empty() {
                    key.clone()
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");

        url.set_query(Some(&query));
    }

    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> Source {
        Source {
            title: "t".to_string(),
            url: url.to_string(),
            snippet: "s".to_string(),
        }
    }

    #[test]
    fn canonicalization_strips_tracking_and_sorts() {
        assert_eq!(
            canonicalize_url("HTTPS://Example.COM/a?utm_source=x&b=2&a=1#frag").as_deref(),
            Some("https://example.com/a?a=1&b=2")
        );
        assert_eq!(
            canonicalize_url("https://example.com/?fbclid=abc").as_deref(),
            Some("https://example.com/")
        );
        assert_eq!(canonicalize_url("ftp://example.com/x"), None);
        assert_eq!(canonicalize_url("not a url"), None);
    }

    #[test]
    fn distill_dedups_by_canonical_url() {
        let first = Artifacts {
            sources: vec![source("https://example.com/page?utm_campaign=a")],
            images: vec!["https://example.com/img.png".to_string()],
            ..Default::default()
        };

        let second = Artifacts {
            sources: vec![source("https://example.com/page"), source("https://other.example/x")],
            images: vec!["https://example.com/img.png#top".to_string()],
            youtube_videos: vec!["https://www.youtube.com/watch?v=abc12345678".to_string()],
            ..Default::default()
        };

        let extracted = ExtractedContent::distill([first, second]);

        assert_eq!(extracted.sources.len(), 2);
        assert_eq!(extracted.sources[0].url, "https://example.com/page");
        assert_eq!(extracted.images, vec!["https://example.com/img.png".to_string()]);
        assert_eq!(extracted.youtube_videos.len(), 1);
    }

    #[test]
    fn same_url_may_appear_in_different_classes() {
        let artifacts = Artifacts {
            images: vec!["https://example.com/clip.gif".to_string()],
            media: vec!["https://example.com/clip.gif".to_string()],
            ..Default::default()
        };

        let extracted = ExtractedContent::distill([artifacts]);

        assert_eq!(extracted.images.len(), 1);
        assert_eq!(extracted.media.len(), 1);
    }
}
