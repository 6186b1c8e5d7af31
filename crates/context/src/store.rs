//! The append-only store of context items, partitioned by conversation.
//!
//! One store serves the whole process. Items are filtered by
//! `conversation_id`, not physically partitioned; each conversation's
//! slice is logically independent, so a single RwLock suffices — the
//! write lock also guarantees that one conversation's turns land in
//! the order requests were accepted.

use chrono::{Duration, Utc};
use pitchpal_core::{Category, ContextError, ContextItem, ConversationId, PersonaProfile, Role};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::assembler::PromptAssembler;
use crate::selector::WindowSelector;
use crate::token::TokenCounter;

/// Result of a store optimization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Items removed to get under the target.
    pub removed_count: usize,
    /// Token total of the items kept.
    pub kept_tokens: usize,
}

/// Process-wide store of [`ContextItem`]s.
pub struct ContextStore {
    counter: Arc<TokenCounter>,
    selector: WindowSelector,
    items: RwLock<Vec<ContextItem>>,
}

impl ContextStore {
    /// Create a store. `guaranteed_recent_count` is the number of most
    /// recent turns the window selector always keeps.
    pub fn new(counter: Arc<TokenCounter>, guaranteed_recent_count: usize) -> Self {
        Self {
            counter,
            selector: WindowSelector::new(guaranteed_recent_count),
            items: RwLock::new(Vec::new()),
        }
    }

    /// The token counter this store stamps items with.
    pub fn counter(&self) -> Arc<TokenCounter> {
        self.counter.clone()
    }

    /// Append a new item. The token count is computed here, exactly
    /// once, with the active tokenizer — never recomputed later.
    pub async fn add(
        &self,
        conversation_id: ConversationId,
        role: Role,
        category: Category,
        content: impl Into<String>,
        importance: f32,
    ) -> Result<ContextItem, ContextError> {
        let content = content.into();
        let count = self.counter.count(&content);
        if count.degraded {
            warn!(
                conversation_id = %conversation_id,
                tokens = count.tokens,
                "Token count degraded to heuristic for new context item"
            );
        }

        let item = ContextItem::new(
            conversation_id,
            role,
            category,
            content,
            importance,
            count.tokens,
        )?;

        self.items.write().await.push(item.clone());
        Ok(item)
    }

    /// Append a new item from untyped string inputs (the route layer's
    /// view). Invalid role or category values are rejected, never
    /// coerced.
    pub async fn add_parsed(
        &self,
        conversation_id: ConversationId,
        role: &str,
        category: &str,
        content: impl Into<String>,
        importance: f32,
    ) -> Result<ContextItem, ContextError> {
        let role = Role::from_str(role)?;
        let category = Category::from_str(category)?;
        self.add(conversation_id, role, category, content, importance)
            .await
    }

    /// Sum of token counts, optionally restricted to one conversation.
    /// Recomputed on demand — never cached staler than the last mutation.
    pub async fn total_tokens(&self, conversation_id: Option<&ConversationId>) -> usize {
        let items = self.items.read().await;
        items
            .iter()
            .filter(|i| conversation_id.is_none_or(|id| &i.conversation_id == id))
            .map(|i| i.token_count)
            .sum()
    }

    /// Number of stored items across all conversations.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Snapshot of one conversation's items in insertion order.
    pub async fn items_for(&self, conversation_id: &ConversationId) -> Vec<ContextItem> {
        let items = self.items.read().await;
        items
            .iter()
            .filter(|i| &i.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    /// Remove items older than `max_age`, except those whose category
    /// is in `preserve_categories` OR whose importance exceeds
    /// `preserve_importance_threshold` (either exemption alone is
    /// enough). Instructions and personas must survive normal cleanup
    /// because they are re-needed on every turn.
    ///
    /// Returns the number of items removed.
    pub async fn clear_older_than(
        &self,
        max_age: Duration,
        preserve_categories: &[Category],
        preserve_importance_threshold: f32,
    ) -> usize {
        let now = Utc::now();
        let mut items = self.items.write().await;
        let before = items.len();

        items.retain(|item| {
            let age = now - item.created_at;
            age <= max_age
                || preserve_categories.contains(&item.category)
                || item.importance > preserve_importance_threshold
        });

        let removed = before - items.len();
        if removed > 0 {
            debug!(removed, "Cleared aged-out context items");
        }
        removed
    }

    /// Remove every item belonging to one conversation.
    pub async fn clear_conversation(&self, conversation_id: &ConversationId) -> usize {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|i| &i.conversation_id != conversation_id);
        before - items.len()
    }

    /// Shrink the persisted store itself down to `target_tokens`,
    /// using the same relevance scoring the window selector uses.
    /// Bounds unbounded memory growth in long-running processes.
    ///
    /// Lowest-scored non-guaranteed items go first; guaranteed items
    /// are only removed if dropping everything else still was not
    /// enough.
    pub async fn optimize(&self, target_tokens: usize) -> OptimizeReport {
        let now = Utc::now();
        let mut items = self.items.write().await;

        let mut total: usize = items.iter().map(|i| i.token_count).sum();
        if total <= target_tokens {
            return OptimizeReport {
                removed_count: 0,
                kept_tokens: total,
            };
        }

        // Removal order: non-guaranteed before guaranteed, lowest
        // score first, later insertion first on exact ties (earlier
        // insertion wins retention).
        let mut order: Vec<(usize, f32, bool)> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                (
                    i,
                    crate::relevance::score(item, now),
                    item.category.is_guaranteed(),
                )
            })
            .collect();
        order.sort_by(|(ai, a_score, a_guaranteed), (bi, b_score, b_guaranteed)| {
            a_guaranteed
                .cmp(b_guaranteed)
                .then_with(|| {
                    a_score
                        .partial_cmp(b_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| bi.cmp(ai))
        });

        let mut doomed: Vec<usize> = Vec::new();
        for (idx, _, guaranteed) in order {
            if total <= target_tokens {
                break;
            }
            if guaranteed {
                warn!(
                    item_id = %items[idx].id,
                    category = ?items[idx].category,
                    "Optimization is evicting a guaranteed-category item to reach the target"
                );
            }
            total -= items[idx].token_count;
            doomed.push(idx);
        }

        let doomed_set: std::collections::HashSet<usize> = doomed.iter().copied().collect();
        let removed_count = doomed_set.len();
        let mut keep_idx = 0usize;
        items.retain(|_| {
            let keep = !doomed_set.contains(&keep_idx);
            keep_idx += 1;
            keep
        });

        debug!(
            removed = removed_count,
            kept_tokens = total,
            target = target_tokens,
            "Optimized context store"
        );
        OptimizeReport {
            removed_count,
            kept_tokens: total,
        }
    }

    /// Convenience composition of selection and assembly: build the
    /// rendered context string for one conversation's next model call.
    pub async fn build_window(
        &self,
        conversation_id: &ConversationId,
        live_user_input: &str,
        persona_profile: Option<&PersonaProfile>,
        budget_tokens: usize,
    ) -> String {
        let items = self.items_for(conversation_id).await;
        let selection = self.selector.select(&items, budget_tokens);
        debug!(
            conversation_id = %conversation_id,
            selected = selection.items.len(),
            available = items.len(),
            window_tokens = selection.total_tokens,
            budget = budget_tokens,
            dropped_guaranteed = selection.warnings.len(),
            "Built context window"
        );

        PromptAssembler::new(self.counter.clone()).build(
            &selection.items,
            live_user_input,
            persona_profile,
            budget_tokens,
        )
    }
}
