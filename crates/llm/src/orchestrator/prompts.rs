//! System prompt assembly.

use crate::messages::{ChatRequest, Location};

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools. Use tools when \
    they give you better information than you already have; answer directly when they would not. \
    Cite what you learned from tools in your answer. Be accurate and concise.";

const PLANNING_SYSTEM_PROMPT: &str = "You are a planning assistant. Break the user's goal into a \
    clear, numbered, step-by-step plan. Research with the available read-only tools where facts are \
    needed. Keep each step concrete and actionable. Do not execute the plan.";

const VOICE_MODE_PROMPT: &str = "Respond with a single JSON object of the form \
    {\"voiceResponse\": \"...\", \"fullResponse\": \"...\"}. voiceResponse is a short spoken-style \
    summary of one or two sentences; fullResponse is the complete answer.";

/// The note injected before the forced closing call once the safety
/// iteration is reached.
pub(crate) const SYNTHESIS_PROMPT: &str = "Tool budget exhausted. Do not request any more tools. \
    Compose the best possible final answer from the conversation and tool results above, and say \
    so when something could not be verified.";

/// Whether this run is a chat or a planning conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunMode {
    Chat,
    Planning,
}

/// Build the system prompt for a request.
pub(crate) fn system_prompt(mode: RunMode, request: &ChatRequest) -> String {
    let mut prompt = match mode {
        RunMode::Chat => CHAT_SYSTEM_PROMPT.to_string(),
        RunMode::Planning => PLANNING_SYSTEM_PROMPT.to_string(),
    };

    if let Some(language) = request.language.as_deref().filter(|l| !l.is_empty()) {
        prompt.push_str(&format!("\n\nAnswer in the language with ISO 639-1 code '{language}'."));
    }

    if let Some(location) = &request.location {
        prompt.push_str(&format!("\n\n{}", location_fragment(location)));
    }

    if request.is_continuation {
        prompt.push_str("\n\nThis conversation continues an earlier exchange; do not re-introduce yourself.");
    }

    if request.voice_mode {
        prompt.push_str(&format!("\n\n{VOICE_MODE_PROMPT}"));
    }

    prompt
}

fn location_fragment(location: &Location) -> String {
    let mut parts = Vec::new();

    if let Some(address) = location.address.as_deref().filter(|a| !a.is_empty()) {
        parts.push(address.to_string());
    }

    if let (Some(latitude), Some(longitude)) = (location.latitude, location.longitude) {
        parts.push(format!("lat {latitude}, lng {longitude}"));
    }

    format!("The user's approximate location: {}.", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChatRequest {
        serde_json::from_str(r#"{ "messages": [{ "role": "user", "content": "hi" }] }"#).unwrap()
    }

    #[test]
    fn chat_prompt_is_plain_by_default() {
        let prompt = system_prompt(RunMode::Chat, &request());
        assert!(prompt.contains("helpful assistant"));
        assert!(!prompt.contains("ISO 639-1"));
        assert!(!prompt.contains("voiceResponse"));
    }

    #[test]
    fn options_append_fragments() {
        let mut request = request();
        request.language = Some("de".to_string());
        request.voice_mode = true;
        request.location = Some(Location {
            latitude: Some(52.52),
            longitude: Some(13.4),
            address: Some("Berlin".to_string()),
        });

        let prompt = system_prompt(RunMode::Chat, &request);
        assert!(prompt.contains("'de'"));
        assert!(prompt.contains("Berlin; lat 52.52, lng 13.4"));
        assert!(prompt.contains("voiceResponse"));
    }

    #[test]
    fn planning_prompt_differs() {
        let prompt = system_prompt(RunMode::Planning, &request());
        assert!(prompt.contains("step-by-step plan"));
    }
}
