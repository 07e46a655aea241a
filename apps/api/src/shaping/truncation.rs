//! Truncation Guard: detects replies cut off mid-sentence and asks the
//! provider, once, to finish them.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::llm_client::prompts::CONTINUATION_INSTRUCTION;
use crate::llm_client::{ChatMessage, CompletionProvider, CompletionRequest};
use crate::shaping::sanitize::sanitize;

/// Replies shorter than this are never treated as cut off.
pub const MIN_TRUNCATION_LEN: usize = 200;

/// Token budget for the continuation request.
pub const CONTINUATION_MAX_TOKENS: u32 = 160;

static TERMINAL_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["'”’]?\s*$"#).expect("valid regex"));

/// A reply over 200 characters that does not end in terminal punctuation.
pub fn is_cut_off(reply: &str) -> bool {
    let trimmed = reply.trim();
    trimmed.chars().count() > MIN_TRUNCATION_LEN && !TERMINAL_PUNCTUATION.is_match(trimmed)
}

/// Appends a short continuation when `reply` looks cut off.
///
/// Makes at most one provider call. A failed or empty continuation leaves the
/// reply as it was.
pub async fn continue_if_cut_off(
    provider: &dyn CompletionProvider,
    messages: &[ChatMessage],
    reply: String,
    temperature: f32,
) -> String {
    if !is_cut_off(&reply) {
        return reply;
    }

    info!("Reply looks cut off ({} chars); requesting continuation", reply.len());

    let mut continuation_messages = messages.to_vec();
    continuation_messages.push(ChatMessage::assistant(reply.clone()));
    continuation_messages.push(ChatMessage::user(CONTINUATION_INSTRUCTION));

    let request = CompletionRequest {
        messages: continuation_messages,
        max_tokens: CONTINUATION_MAX_TOKENS,
        temperature,
    };

    match provider.complete(&request).await {
        Ok(text) => {
            let tail = sanitize(&text);
            if tail.is_empty() {
                reply
            } else {
                format!("{} {}", reply.trim_end(), tail)
            }
        }
        Err(e) => {
            warn!("Continuation failed, keeping original reply: {}", e);
            reply
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::fake::ScriptedProvider;
    use crate::llm_client::{LlmError, Role};

    fn unterminated(len: usize) -> String {
        "a".repeat(len)
    }

    #[test]
    fn test_cut_off_heuristic() {
        assert!(is_cut_off(&unterminated(215)));
        assert!(!is_cut_off(&unterminated(50)));
        assert!(!is_cut_off(&format!("{}.", unterminated(214))));
        assert!(!is_cut_off(&format!("{}?\"  ", unterminated(214))));
        assert!(!is_cut_off(&unterminated(200)));
    }

    #[tokio::test]
    async fn test_long_unterminated_reply_triggers_continuation() {
        let provider = ScriptedProvider::replies(&["and that completes it."]);
        let reply = unterminated(215);

        let out = continue_if_cut_off(&provider, &[ChatMessage::user("q")], reply.clone(), 0.2).await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(out, format!("{reply} and that completes it."));

        let sent = &provider.requests()[0];
        assert_eq!(sent.max_tokens, CONTINUATION_MAX_TOKENS);
        assert_eq!(sent.messages.len(), 3);
        assert_eq!(sent.messages[1].role, Role::Assistant);
        assert_eq!(sent.messages[2].content, CONTINUATION_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_short_reply_is_left_alone() {
        let provider = ScriptedProvider::replies(&["unused"]);
        let reply = unterminated(50);
        let out = continue_if_cut_off(&provider, &[], reply.clone(), 0.2).await;
        assert_eq!(provider.calls(), 0);
        assert_eq!(out, reply);
    }

    #[tokio::test]
    async fn test_failed_continuation_keeps_original() {
        let provider = ScriptedProvider::new([Err(LlmError::Api {
            status: 503,
            message: "down".to_string(),
        })]);
        let reply = unterminated(215);
        let out = continue_if_cut_off(&provider, &[], reply.clone(), 0.2).await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(out, reply);
    }
}
