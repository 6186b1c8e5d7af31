//! Core domain types for PitchPal.
//!
//! PitchPal lets sales reps practice pitches against scripted "persona"
//! customers played by a locally loaded LLM. This crate holds the value
//! objects shared by every other crate: the [`ContextItem`] unit of
//! retained conversation state, the [`PersonaProfile`] customer script,
//! and the error taxonomy.

pub mod error;
pub mod item;
pub mod persona;

pub use error::{ContextError, Error, ModelError, Result};
pub use item::{Category, ContextItem, ConversationId, Role};
pub use persona::PersonaProfile;
