//! Token counting against the live model tokenizer.
//!
//! Budget accounting must use the same tokenization scheme the model
//! uses for generation, so counts are exact, not approximate. When no
//! tokenizer is attached yet (the model is still loading) or encoding
//! fails, counting falls back to a ~4-characters-per-token heuristic.
//! The fallback is a degraded-accuracy event, not an error: token
//! budgeting must never block a response.

use std::sync::{Arc, RwLock};
use tokenizers::Tokenizer;
use tracing::warn;

/// A token count plus whether it came from the heuristic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    /// Number of tokens.
    pub tokens: usize,
    /// True when the heuristic was used instead of the real tokenizer.
    pub degraded: bool,
}

/// Counts tokens for budget accounting.
///
/// Starts without a tokenizer (heuristic mode) and upgrades in place
/// via [`attach`](TokenCounter::attach) once the model resource cache
/// has a loaded pipeline to share its tokenizer from.
pub struct TokenCounter {
    tokenizer: RwLock<Option<Arc<Tokenizer>>>,
}

impl TokenCounter {
    /// Create a counter backed by a real tokenizer.
    pub fn new(tokenizer: Arc<Tokenizer>) -> Self {
        Self {
            tokenizer: RwLock::new(Some(tokenizer)),
        }
    }

    /// Create a counter in heuristic-only mode.
    pub fn heuristic() -> Self {
        Self {
            tokenizer: RwLock::new(None),
        }
    }

    /// Attach (or replace) the tokenizer. Called once the model load
    /// resolves; counts from then on are exact.
    pub fn attach(&self, tokenizer: Arc<Tokenizer>) {
        if let Ok(mut guard) = self.tokenizer.write() {
            *guard = Some(tokenizer);
        }
    }

    /// Whether a real tokenizer is currently attached.
    pub fn is_exact(&self) -> bool {
        self.tokenizer.read().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Count tokens in `text`.
    ///
    /// Exact when a tokenizer is attached; otherwise `max(1, len / 4)`.
    pub fn count(&self, text: &str) -> TokenCount {
        let tokenizer = self
            .tokenizer
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().cloned());

        if let Some(tokenizer) = tokenizer {
            match tokenizer.encode(text, false) {
                Ok(encoding) => {
                    return TokenCount {
                        tokens: encoding.len(),
                        degraded: false,
                    };
                }
                Err(e) => {
                    warn!(error = %e, "Tokenizer encode failed, falling back to heuristic count");
                }
            }
        }

        TokenCount {
            tokens: Self::heuristic_count(text),
            degraded: true,
        }
    }

    /// The ~4-chars-per-token heuristic. Never returns 0 so even an
    /// empty item costs something against the budget.
    fn heuristic_count(text: &str) -> usize {
        (text.len() / 4).max(1)
    }

    /// Hard-truncate `text` to at most `budget` tokens.
    ///
    /// Encode, keep the first `budget` ids, decode back — accepting
    /// that this may cut mid-sentence. In heuristic mode the cut is
    /// `budget * 4` characters. Last-resort safety valve only; window
    /// selection is the primary budget mechanism.
    pub fn truncate(&self, text: &str, budget: usize) -> String {
        if budget == 0 {
            return String::new();
        }

        let tokenizer = self
            .tokenizer
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().cloned());

        if let Some(tokenizer) = tokenizer {
            match tokenizer.encode(text, false) {
                Ok(encoding) => {
                    let ids = encoding.get_ids();
                    if ids.len() <= budget {
                        return text.to_string();
                    }
                    match tokenizer.decode(&ids[..budget], true) {
                        Ok(cut) => return cut,
                        Err(e) => {
                            warn!(error = %e, "Tokenizer decode failed during truncation");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Tokenizer encode failed during truncation");
                }
            }
        }

        if Self::heuristic_count(text) <= budget {
            return text.to_string();
        }
        text.chars().take(budget * 4).collect()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::heuristic()
    }
}
