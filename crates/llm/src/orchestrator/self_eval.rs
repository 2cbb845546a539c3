//! Self-evaluation: one cheap follow-up call judging whether a candidate
//! answer is comprehensive.

use serde::Deserialize;

use crate::messages::Message;

const SELF_EVAL_SYSTEM_PROMPT: &str = "You judge answer quality. Given a question and a candidate \
    answer, decide whether the answer is comprehensive: it addresses every part of the question \
    with enough substance to be useful. Respond with JSON: {\"comprehensive\": true|false, \
    \"reason\": \"...\"}.";

/// Conversation for the self-evaluation call.
pub(crate) fn messages(question: &str, answer: &str) -> Vec<Message> {
    vec![
        Message::system(SELF_EVAL_SYSTEM_PROMPT),
        Message::user(format!("Question:\n{question}\n\nCandidate answer:\n{answer}")),
    ]
}

/// Parse the judgement.
///
/// JSON first; otherwise free text where negative phrases are checked
/// before positive ones ("not comprehensive" contains "comprehensive").
/// Ambiguity counts as comprehensive: the retry budget is precious and a
/// confused judge should not spend it.
pub(crate) fn parse_comprehensive(response: &str) -> bool {
    #[derive(Deserialize)]
    struct WireJudgement {
        comprehensive: bool,
    }

    let trimmed = response.trim();

    if let Some(start) = trimmed.find('{')
        && let Some(end) = trimmed.rfind('}')
        && start < end
        && let Ok(parsed) = serde_json::from_str::<WireJudgement>(&trimmed[start..=end])
    {
        return parsed.comprehensive;
    }

    let lowered = trimmed.to_ascii_lowercase();

    for negative in ["not comprehensive", "incomprehensive", "incomplete", "insufficient"] {
        if lowered.contains(negative) {
            return false;
        }
    }

    for positive in ["comprehensive", "complete", "sufficient", "yes"] {
        if lowered.contains(positive) {
            return true;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_judgements_parse() {
        assert!(parse_comprehensive(r#"{"comprehensive": true, "reason": "covers everything"}"#));
        assert!(!parse_comprehensive(r#"{"comprehensive": false, "reason": "misses the second part"}"#));
    }

    #[test]
    fn negative_phrases_checked_before_positive() {
        assert!(!parse_comprehensive("The answer is not comprehensive."));
        assert!(!parse_comprehensive("Incomplete: it skips the comparison."));
        assert!(parse_comprehensive("The answer is comprehensive."));
    }

    #[test]
    fn ambiguity_counts_as_comprehensive() {
        assert!(parse_comprehensive("Hard to say."));
        assert!(parse_comprehensive(""));
    }
}
