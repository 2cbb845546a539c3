use std::sync::LazyLock;

use config::ToolsConfig;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{Artifacts, OutputKind, Tool, ToolContext, ToolDescriptor, ToolError, ToolOutput, html};

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?v=|youtube\.com/embed/|youtube\.com/shorts/|youtu\.be/)([A-Za-z0-9_-]{11})")
        .expect("static regex")
});

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static regex"));

static CAPTION_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("static regex"));

/// YouTube metadata plus transcript retrieval.
///
/// Metadata comes from the public oEmbed endpoint; captions from the
/// legacy timedtext endpoint, which serves plain XML for videos with
/// published caption tracks.
pub struct YoutubeTranscriptTool {
    descriptor: ToolDescriptor,
}

impl YoutubeTranscriptTool {
    /// Build the tool from configuration.
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "youtube_transcript".to_string(),
                description: "Get the title, author and transcript of a YouTube video from its URL or id."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "video": {
                            "type": "string",
                            "description": "YouTube URL or 11-character video id"
                        },
                        "language": {
                            "type": "string",
                            "description": "Caption language code (default 'en')"
                        }
                    },
                    "required": ["video"],
                    "additionalProperties": false
                }),
                output_kind: OutputKind::Multimedia,
                max_execution_ms: config.timeout_seconds * 1_000,
                max_output_bytes: config.max_output_bytes,
                cacheable: true,
                cache_ttl_seconds: 86_400,
                idempotency_key_fields: vec!["video".to_string(), "language".to_string()],
            },
        }
    }
}

#[derive(Deserialize)]
struct OembedResponse {
    title: String,
    author_name: String,
}

/// Extract the 11-character video id from a URL or bare id.
fn video_id(input: &str) -> Option<&str> {
    if let Some(captures) = VIDEO_ID.captures(input) {
        return captures.get(1).map(|m| m.as_str());
    }

    BARE_ID.is_match(input).then_some(input)
}

#[async_trait::async_trait]
impl Tool for YoutubeTranscriptTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let video = arguments
            .get("video")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("Missing 'video'"))?;

        let language = arguments.get("language").and_then(Value::as_str).unwrap_or("en");

        let Some(id) = video_id(video) else {
            return Err(ToolError::new(format!("Could not find a YouTube video id in '{video}'")));
        };

        let watch_url = format!("https://www.youtube.com/watch?v={id}");

        let oembed = ctx
            .http
            .get("https://www.youtube.com/oembed")
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| ToolError::new(format!("Metadata request failed: {e}")))?;

        if !oembed.status().is_success() {
            return Err(ToolError::new(format!("Video {id} not found or not embeddable")));
        }

        let metadata: OembedResponse = oembed
            .json()
            .await
            .map_err(|e| ToolError::new(format!("Unparseable metadata response: {e}")))?;

        let timedtext = ctx
            .http
            .get("https://video.google.com/timedtext")
            .query(&[("lang", language), ("v", id)])
            .send()
            .await
            .map_err(|e| ToolError::new(format!("Transcript request failed: {e}")))?;

        let transcript_xml = if timedtext.status().is_success() {
            timedtext.text().await.unwrap_or_default()
        } else {
            String::new()
        };

        let transcript = parse_transcript(&transcript_xml);

        let content = match &transcript {
            Some(transcript) => format!(
                "Title: {}\nAuthor: {}\n\nTranscript ({language}):\n{transcript}",
                metadata.title, metadata.author_name
            ),
            None => format!(
                "Title: {}\nAuthor: {}\n\nNo {language} captions are published for this video.",
                metadata.title, metadata.author_name
            ),
        };

        Ok(ToolOutput {
            content,
            artifacts: Some(Artifacts {
                youtube_videos: vec![watch_url],
                ..Default::default()
            }),
        })
    }
}

/// Join caption fragments into running text. Timedtext XML double-encodes
/// entities, so decoding runs twice.
fn parse_transcript(xml: &str) -> Option<String> {
    let fragments: Vec<String> = CAPTION_TEXT
        .captures_iter(xml)
        .map(|captures| html::decode_entities(&html::decode_entities(captures[1].trim())))
        .filter(|fragment| !fragment.is_empty())
        .collect();

    if fragments.is_empty() {
        return None;
    }

    Some(fragments.join(" "))
}
