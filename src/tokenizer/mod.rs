//! Token estimation for requests the upstream did not meter.
//!
//! With the `tiktoken` feature (default), text is encoded with the BPE used
//! by the model, falling back to `cl100k_base` for unknown models. Without
//! it, a four-characters-per-token heuristic is used.

use crate::types::{ChatRequest, Usage};

/// Count tokens in `text` as `model` would.
#[cfg(feature = "tiktoken")]
pub fn count_tokens(text: &str, model: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let tokens = bpe_for_model(model).encode_with_special_tokens(text).len();
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

#[cfg(feature = "tiktoken")]
fn bpe_for_model(model: &str) -> &'static tiktoken_rs::CoreBPE {
    use tiktoken_rs::tokenizer::{self, Tokenizer};

    match tokenizer::get_tokenizer(model).unwrap_or(Tokenizer::Cl100kBase) {
        Tokenizer::O200kHarmony => tiktoken_rs::o200k_harmony_singleton(),
        Tokenizer::O200kBase => tiktoken_rs::o200k_base_singleton(),
        Tokenizer::Cl100kBase => tiktoken_rs::cl100k_base_singleton(),
        Tokenizer::R50kBase | Tokenizer::Gpt2 => tiktoken_rs::r50k_base_singleton(),
        Tokenizer::P50kBase => tiktoken_rs::p50k_base_singleton(),
        Tokenizer::P50kEdit => tiktoken_rs::p50k_edit_singleton(),
    }
}

/// Count tokens in `text` as `model` would (character heuristic).
#[cfg(not(feature = "tiktoken"))]
pub fn count_tokens(text: &str, _model: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Estimate prompt and completion tokens for a finished exchange.
pub fn estimate_usage(request: &ChatRequest, completion: &str) -> Usage {
    Usage::new(
        count_tokens(&request.prompt_text(), &request.model),
        count_tokens(completion, &request.model),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn empty_text_has_no_tokens() {
        assert_eq!(count_tokens("", "gpt-4"), 0);
    }

    #[test]
    fn longer_text_has_more_tokens() {
        let short = count_tokens("hello", "gpt-4");
        let long = count_tokens("hello there, how are you doing on this fine day?", "gpt-4");
        assert!(short >= 1);
        assert!(long > short);
    }

    #[test]
    fn unknown_models_still_count() {
        assert!(count_tokens("hello world", "claude-3-haiku") > 0);
    }

    #[test]
    fn usage_estimate_covers_prompt_and_completion() {
        let request = ChatRequest::new("gpt-4", vec![Message::user("What is 2 + 2?")]);
        let usage = estimate_usage(&request, "4");
        assert!(usage.prompt_tokens > 0);
        assert!(usage.completion_tokens > 0);
    }
}
