use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::messages::Message;

/// Per-message framing overhead in tokens, matching the OpenAI chat
/// format's role and separator tokens.
const MESSAGE_OVERHEAD: u64 = 4;

fn bpe() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            log::warn!("Failed to initialize tokenizer, falling back to byte estimate: {e}");
            None
        }
    })
    .as_ref()
}

/// Estimate the prompt tokens a conversation will consume.
///
/// Used for rate-limit projection, not billing: the estimate only has to
/// be close enough that `current + projected` comparisons are meaningful.
pub(crate) fn estimate_prompt_tokens(messages: &[Message]) -> u64 {
    messages
        .iter()
        .map(|message| {
            let text_tokens = match bpe() {
                Some(bpe) => bpe.encode_with_special_tokens(&message.content).len() as u64,
                // Rough fallback: one token per four bytes.
                None => message.content.len() as u64 / 4,
            };

            let tool_call_tokens: u64 = message
                .tool_calls
                .iter()
                .flatten()
                .map(|call| (call.name.len() as u64 + call.arguments.to_string().len() as u64) / 4)
                .sum();

            text_tokens + tool_call_tokens + MESSAGE_OVERHEAD
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_with_content() {
        let short = vec![Message::user("hi")];
        let long = vec![Message::user("hi ".repeat(500))];

        let short_estimate = estimate_prompt_tokens(&short);
        let long_estimate = estimate_prompt_tokens(&long);

        assert!(short_estimate >= MESSAGE_OVERHEAD);
        assert!(long_estimate > short_estimate + 100);
    }

    #[test]
    fn empty_conversation_estimates_zero() {
        assert_eq!(estimate_prompt_tokens(&[]), 0);
    }
}
