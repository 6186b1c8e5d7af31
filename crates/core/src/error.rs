//! Error types for the PitchPal domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Degraded-but-recoverable conditions (tokenizer fallback, a guaranteed
//! item that cannot fit the budget) are deliberately NOT errors — they
//! are logged warnings and explicit result values, so the normal path
//! never conflates "answer late or imperfect" with "answer not at all".

use thiserror::Error;

/// The top-level error type for all PitchPal operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Context errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Validation failures on context store inputs. Surfaced immediately to
/// the caller, never silently coerced.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Invalid role: '{0}' (expected system, user, or assistant)")]
    InvalidRole(String),

    #[error("Invalid category: '{0}' (expected instruction, persona, message, or feedback)")]
    InvalidCategory(String),

    #[error("Importance {0} outside [0.0, 1.0]")]
    InvalidImportance(f32),
}

/// Failures of the model resource layer. A failed load is terminal
/// until an explicit reload — it is broadcast to every waiter of that
/// attempt rather than retried silently per request.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model load failed for '{model}': {reason}")]
    LoadFailed { model: String, reason: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model not loaded (cache is in '{0}' state)")]
    NotLoaded(String),

    #[error("Timed out after {0}s waiting for model load")]
    Timeout(u64),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}
