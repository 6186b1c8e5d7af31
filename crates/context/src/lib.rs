//! Context window management — the core of PitchPal.
//!
//! Under a hard token budget, decides which pieces of conversational
//! history, persona description, and system instructions make it into
//! the prompt sent to the language model.
//!
//! # Pipeline
//!
//! | Stage | Component | Policy |
//! |-------|-----------|--------|
//! | 1. Count | [`TokenCounter`] | Exact via the model tokenizer, heuristic fallback |
//! | 2. Store | [`ContextStore`] | Append-only, per-conversation, asymmetric retention |
//! | 3. Score | [`relevance`] | importance x recency x category x role |
//! | 4. Select | [`WindowSelector`] | Guaranteed categories first, greedy fill, recency floor |
//! | 5. Render | [`PromptAssembler`] | Fixed section order, hard truncation as last resort |

pub mod assembler;
pub mod relevance;
pub mod selector;
pub mod store;
pub mod token;

pub use assembler::PromptAssembler;
pub use selector::{Selection, SelectionWarning, WindowSelector};
pub use store::{ContextStore, OptimizeReport};
pub use token::{TokenCount, TokenCounter};
