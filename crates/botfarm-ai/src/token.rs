//! Token counting for prompt budgeting.
//!
//! Every budget decision in the runtime (compaction triggers, prompt
//! section reservations, entity list truncation) is expressed in model
//! tokens, so all of it goes through a [`TokenCounter`].

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::{AiError, Result};

/// Rough number of characters per token for English prose.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimates how many model tokens a text fragment costs.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

impl<T: TokenCounter + ?Sized> TokenCounter for Arc<T> {
    fn count(&self, text: &str) -> usize {
        (**self).count(text)
    }
}

/// Character-length heuristic. Needs no tokenizer data, so it is what the
/// tests and offline tooling use.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// Exact BPE counting via tiktoken.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Select the encoding for `model`, falling back to `cl100k_base` for
    /// models tiktoken does not know.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                tracing::debug!(model, "No tiktoken encoding for model, using cl100k_base");
                tiktoken_rs::cl100k_base().map_err(|e| AiError::Tokenizer(e.to_string()))?
            }
        };
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Build the best available counter for `model`, degrading to the
/// heuristic when tokenizer data cannot be loaded.
pub fn counter_for_model(model: &str) -> Arc<dyn TokenCounter> {
    match TiktokenCounter::for_model(model) {
        Ok(counter) => Arc::new(counter),
        Err(error) => {
            tracing::warn!(model, error = %error, "Falling back to heuristic token counting");
            Arc::new(HeuristicCounter)
        }
    }
}
