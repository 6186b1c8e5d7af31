//! ContextItem — the unit of retained conversation state.
//!
//! Every message, persona blurb, instruction, and feedback note that a
//! training session keeps around is one immutable `ContextItem`. The
//! token count is computed exactly once, at creation time, with the same
//! tokenizer the generation model uses — never recomputed lazily, so
//! budget accounting cannot drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ContextError;

/// Unique identifier for a practice conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a context item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (training rules, persona framing)
    System,
    /// The trainee delivering the pitch
    User,
    /// The persona customer played by the model
    Assistant,
}

impl Role {
    /// The label used when rendering transcript lines (`USER: ...`).
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

impl FromStr for Role {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ContextError::InvalidRole(other.to_string())),
        }
    }
}

/// What kind of content a context item carries.
///
/// The category drives retention and selection policy: instructions and
/// persona descriptions survive time-based cleanup and get first claim
/// on the prompt budget, ordinary messages age out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// System instruction — re-needed on every turn
    Instruction,
    /// Persona description — keeps the roleplay in character
    Persona,
    /// An ordinary conversational turn
    Message,
    /// Coaching feedback attached to the session
    Feedback,
}

impl Category {
    /// Categories guaranteed first claim on the prompt budget.
    pub fn is_guaranteed(&self) -> bool {
        matches!(self, Category::Instruction | Category::Persona)
    }
}

impl FromStr for Category {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instruction" => Ok(Category::Instruction),
            "persona" => Ok(Category::Persona),
            "message" => Ok(Category::Message),
            "feedback" => Ok(Category::Feedback),
            other => Err(ContextError::InvalidCategory(other.to_string())),
        }
    }
}

/// One immutable unit of retained conversation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    /// Unique item ID
    pub id: String,

    /// Which conversation this item belongs to
    pub conversation_id: ConversationId,

    /// Who produced it
    pub role: Role,

    /// What kind of content it carries
    pub category: Category,

    /// The text content
    pub content: String,

    /// Declared importance in [0, 1]
    pub importance: f32,

    /// Exact token count for `content` at creation time
    pub token_count: usize,

    /// When this item was created
    pub created_at: DateTime<Utc>,
}

impl ContextItem {
    /// Create a new item. Validates the importance range; the caller
    /// supplies the token count so the store computes it exactly once.
    pub fn new(
        conversation_id: ConversationId,
        role: Role,
        category: Category,
        content: impl Into<String>,
        importance: f32,
        token_count: usize,
    ) -> Result<Self, ContextError> {
        if !(0.0..=1.0).contains(&importance) || importance.is_nan() {
            return Err(ContextError::InvalidImportance(importance));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            role,
            category,
            content: content.into(),
            importance,
            token_count,
            created_at: Utc::now(),
        })
    }
}
