use serde::{Deserialize, Serialize};

/// A cited source: where a search hit or scraped page came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Page or result title.
    pub title: String,
    /// Source URL.
    pub url: String,
    /// Short excerpt.
    pub snippet: String,
}

/// Links, images and media distilled from tool outputs.
///
/// Artifacts travel next to the tool reply but never inside it: they are
/// surfaced to the client in `message_complete` and are not part of the
/// model's conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Artifacts {
    /// Cited sources.
    pub sources: Vec<Source>,
    /// Image URLs.
    pub images: Vec<String>,
    /// YouTube watch URLs.
    pub youtube_videos: Vec<String>,
    /// Non-YouTube video URLs.
    pub other_videos: Vec<String>,
    /// Other media URLs (audio, documents).
    pub media: Vec<String>,
}

impl Artifacts {
    /// Whether anything was collected.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.images.is_empty()
            && self.youtube_videos.is_empty()
            && self.other_videos.is_empty()
            && self.media.is_empty()
    }

    /// Append everything from `other`.
    pub fn merge(&mut self, other: Artifacts) {
        self.sources.extend(other.sources);
        self.images.extend(other.images);
        self.youtube_videos.extend(other.youtube_videos);
        self.other_videos.extend(other.other_videos);
        self.media.extend(other.media);
    }
}
