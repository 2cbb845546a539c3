//! Moderation prompt construction and verdict parsing.
//!
//! Guardrail calls are ordinary model calls issued by the orchestrator
//! through the normal selector; this module owns the prompts and the
//! tolerant parsing of whatever the moderation model answers.

use serde::Deserialize;

use crate::messages::Message;

/// What the moderation model decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Verdict {
    /// Whether the content may pass.
    pub allowed: bool,
    /// Model-supplied reasoning, used for the refusal message.
    pub reason: Option<String>,
}

const MODERATION_SYSTEM_PROMPT: &str = "You are a content policy classifier for a chat gateway. \
    Judge ONLY whether the given content violates policy: instructions for serious harm, \
    sexual content involving minors, or targeted harassment. Ordinary controversial, rude or \
    adult-adjacent content is allowed. Respond with JSON: {\"allowed\": true|false, \
    \"reason\": \"...\"} and nothing else.";

/// Conversation for an input-side moderation call.
pub(crate) fn input_messages(user_input: &str) -> Vec<Message> {
    vec![
        Message::system(MODERATION_SYSTEM_PROMPT),
        Message::user(format!("Content to classify (user input):\n\n{user_input}")),
    ]
}

/// Conversation for an output-side moderation call.
pub(crate) fn output_messages(final_answer: &str) -> Vec<Message> {
    vec![
        Message::system(MODERATION_SYSTEM_PROMPT),
        Message::user(format!("Content to classify (assistant output):\n\n{final_answer}")),
    ]
}

/// Parse a moderation answer.
///
/// JSON first; otherwise a phrase scan where negative phrases are checked
/// before positive ones. Anything ambiguous passes: moderation fails open
/// at the parsing level, the configured mode governs only call failures.
pub(crate) fn parse_verdict(response: &str) -> Verdict {
    #[derive(Deserialize)]
    struct WireVerdict {
        allowed: bool,
        #[serde(default)]
        reason: Option<String>,
    }

    let trimmed = response.trim();

    if let Some(json_slice) = extract_json_object(trimmed)
        && let Ok(parsed) = serde_json::from_str::<WireVerdict>(json_slice)
    {
        return Verdict {
            allowed: parsed.allowed,
            reason: parsed.reason,
        };
    }

    let lowered = trimmed.to_ascii_lowercase();

    // Negative phrases first: "not allowed" contains "allowed".
    for negative in ["not allowed", "disallowed", "blocked", "violates", "unsafe"] {
        if lowered.contains(negative) {
            return Verdict {
                allowed: false,
                reason: Some(trimmed.to_string()),
            };
        }
    }

    for positive in ["allowed", "safe", "no violation"] {
        if lowered.contains(positive) {
            return Verdict {
                allowed: true,
                reason: None,
            };
        }
    }

    Verdict {
        allowed: true,
        reason: None,
    }
}

/// The first balanced `{...}` slice, tolerating prose or code fences
/// around the JSON.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;

    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
