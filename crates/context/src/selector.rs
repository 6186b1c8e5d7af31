//! Window selection — picks which context items fit the token budget.
//!
//! Two-phase greedy algorithm with a recency floor, deliberately
//! explainable and O(n log n) rather than a knapsack optimum:
//!
//! 1. **Guarantee phase**: instruction and persona items get first
//!    claim on the budget — a persona-less prompt breaks character
//!    consistency, so this is correctness, not optimization.
//! 2. **Recency floor**: the newest N message items are reserved next
//!    (when they fit) even if their relevance score would drop them,
//!    keeping short-term coherence.
//! 3. **Fill phase**: remaining budget is filled with the remaining
//!    message/feedback items in descending relevance order, stopping
//!    at the first item that would not fit.
//!
//! Output is re-sorted into chronological order — selection order is
//! not render order.

use chrono::Utc;
use pitchpal_core::{Category, ContextItem};
use std::collections::HashSet;
use tracing::warn;

/// A guaranteed-category item that could not fit the budget.
///
/// A soft signal, not an error: the item is dropped and processing
/// continues with a known-incomplete prompt.
#[derive(Debug, Clone)]
pub struct SelectionWarning {
    /// ID of the dropped item.
    pub item_id: String,
    /// Its category.
    pub category: Category,
    /// Its token cost.
    pub token_count: usize,
    /// The budget it failed to fit into.
    pub budget_remaining: usize,
}

/// The outcome of window selection.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Selected items in chronological order, ready for assembly.
    pub items: Vec<ContextItem>,
    /// Sum of selected items' token counts. Always <= the budget.
    pub total_tokens: usize,
    /// Guaranteed items dropped for lack of budget.
    pub warnings: Vec<SelectionWarning>,
}

/// Selects a maximal-value subset of items within a token budget.
pub struct WindowSelector {
    /// How many of the newest message items are always kept.
    guaranteed_recent_count: usize,
}

impl WindowSelector {
    pub fn new(guaranteed_recent_count: usize) -> Self {
        Self {
            guaranteed_recent_count,
        }
    }

    /// Select items that fit in `budget_tokens`.
    ///
    /// Empty input returns an empty selection, never an error. A
    /// guaranteed item larger than the whole budget is omitted with a
    /// warning — the system degrades rather than failing the request.
    pub fn select(&self, items: &[ContextItem], budget_tokens: usize) -> Selection {
        if items.is_empty() {
            return Selection::default();
        }

        let now = Utc::now();
        let ranked = crate::relevance::rank(items, now);

        let mut remaining = budget_tokens;
        let mut chosen: HashSet<&str> = HashSet::new();
        let mut warnings = Vec::new();

        // Phase 1: guaranteed categories, best score first.
        for &idx in &ranked {
            let item = &items[idx];
            if !item.category.is_guaranteed() {
                continue;
            }
            if item.token_count <= remaining {
                remaining -= item.token_count;
                chosen.insert(item.id.as_str());
            } else {
                warn!(
                    item_id = %item.id,
                    category = ?item.category,
                    token_count = item.token_count,
                    budget_remaining = remaining,
                    "Guaranteed context item does not fit the budget, dropping it"
                );
                warnings.push(SelectionWarning {
                    item_id: item.id.clone(),
                    category: item.category,
                    token_count: item.token_count,
                    budget_remaining: remaining,
                });
            }
        }

        // Phase 2: recency floor — the newest message items are
        // reserved ahead of relevance-ordered filling, so a very
        // recent but low-importance turn is never starved out by
        // higher-scored older material.
        if self.guaranteed_recent_count > 0 {
            let mut recent: Vec<&ContextItem> = items
                .iter()
                .filter(|i| i.category == Category::Message)
                .collect();
            recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            for item in recent.into_iter().take(self.guaranteed_recent_count) {
                if item.token_count <= remaining {
                    remaining -= item.token_count;
                    chosen.insert(item.id.as_str());
                }
            }
        }

        // Phase 3: everything else, best score first, stopping at the
        // first miss. The score-ordered sequence is roughly
        // price-ordered, so later items are no more affordable in
        // expectation; a full bin-packing pass is intentionally not
        // attempted.
        for &idx in &ranked {
            let item = &items[idx];
            if item.category.is_guaranteed() || chosen.contains(item.id.as_str()) {
                continue;
            }
            if item.token_count > remaining {
                break;
            }
            remaining -= item.token_count;
            chosen.insert(item.id.as_str());
        }

        // Chronological order for rendering.
        let mut selected: Vec<ContextItem> = items
            .iter()
            .filter(|i| chosen.contains(i.id.as_str()))
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let total_tokens = selected.iter().map(|i| i.token_count).sum();
        Selection {
            items: selected,
            total_tokens,
            warnings,
        }
    }
}

impl Default for WindowSelector {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pitchpal_core::{ConversationId, Role};

    fn item(
        category: Category,
        role: Role,
        importance: f32,
        tokens: usize,
        age_secs: i64,
    ) -> ContextItem {
        let mut it = ContextItem::new(
            ConversationId::from("conv"),
            role,
            category,
            format!("{category:?} content"),
            importance,
            tokens,
        )
        .unwrap();
        it.created_at = Utc::now() - Duration::seconds(age_secs);
        it
    }

    #[test]
    fn empty_items_give_empty_selection() {
        let selection = WindowSelector::default().select(&[], 4000);
        assert!(selection.items.is_empty());
        assert_eq!(selection.total_tokens, 0);
        assert!(selection.warnings.is_empty());
    }

    #[test]
    fn budget_is_respected() {
        let items: Vec<ContextItem> = (0..20)
            .map(|i| item(Category::Message, Role::User, 0.8, 100, i))
            .collect();
        let selection = WindowSelector::new(0).select(&items, 550);
        assert!(selection.total_tokens <= 550);
        assert!(selection.items.len() <= 5);
    }

    #[test]
    fn instruction_beats_message_at_equal_cost() {
        let instruction = item(Category::Instruction, Role::System, 0.5, 1000, 10);
        let message = item(Category::Message, Role::User, 1.0, 1000, 5);
        let items = vec![message, instruction.clone()];

        let selection = WindowSelector::new(0).select(&items, 1000);
        assert_eq!(selection.items.len(), 1);
        assert_eq!(selection.items[0].id, instruction.id);
    }

    #[test]
    fn oversized_guaranteed_item_warns_instead_of_failing() {
        let persona = item(Category::Persona, Role::System, 1.0, 4500, 0);
        let selection = WindowSelector::default().select(&[persona.clone()], 4000);

        assert!(selection.items.is_empty());
        assert_eq!(selection.warnings.len(), 1);
        assert_eq!(selection.warnings[0].item_id, persona.id);
        assert_eq!(selection.warnings[0].token_count, 4500);
    }

    #[test]
    fn recency_floor_rescues_recent_low_importance_turns() {
        // Ten messages; the five newest have negligible importance and
        // would lose to the older, heavier-scored ones.
        let mut items = Vec::new();
        for i in 0..5 {
            items.push(item(Category::Message, Role::User, 0.9, 100, 1000 + i));
        }
        for i in 0..5 {
            items.push(item(Category::Message, Role::User, 0.01, 100, i));
        }

        // Budget fits only 7 of the 10: the 5 recent ones must all be
        // there even though every older item outscores them.
        let selection = WindowSelector::new(5).select(&items, 700);
        let selected_ids: Vec<&str> = selection.items.iter().map(|i| i.id.as_str()).collect();
        for recent in &items[5..] {
            assert!(
                selected_ids.contains(&recent.id.as_str()),
                "recent turn must be force-included"
            );
        }
        assert!(selection.total_tokens <= 700);
    }

    #[test]
    fn recency_floor_still_respects_budget() {
        let mut items = Vec::new();
        for i in 0..10 {
            items.push(item(Category::Message, Role::User, 0.5, 300, i));
        }
        let selection = WindowSelector::new(5).select(&items, 1000);
        assert!(selection.total_tokens <= 1000);
    }

    #[test]
    fn fill_phase_stops_at_first_miss() {
        // Highest-scored item is too big; a smaller, lower-scored item
        // would fit but the greedy cutoff stops before it.
        let big = item(Category::Message, Role::User, 1.0, 900, 0);
        let small = item(Category::Message, Role::Assistant, 0.2, 50, 5);
        let selection = WindowSelector::new(0).select(&[big, small], 500);
        assert!(selection.items.is_empty());
    }

    #[test]
    fn output_is_chronological() {
        let old = item(Category::Message, Role::User, 0.3, 10, 500);
        let newer = item(Category::Message, Role::Assistant, 0.9, 10, 100);
        let newest = item(Category::Message, Role::User, 0.6, 10, 1);
        let items = vec![newer.clone(), newest.clone(), old.clone()];

        let selection = WindowSelector::new(0).select(&items, 4000);
        let ids: Vec<&str> = selection.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![old.id.as_str(), newer.id.as_str(), newest.id.as_str()]);
    }

    #[test]
    fn guaranteed_items_selected_before_fill() {
        let instruction = item(Category::Instruction, Role::System, 0.9, 400, 60);
        let persona = item(Category::Persona, Role::System, 0.9, 400, 60);
        let chatter: Vec<ContextItem> = (0..10)
            .map(|i| item(Category::Message, Role::User, 0.9, 200, i))
            .collect();

        let mut items = chatter;
        items.push(instruction.clone());
        items.push(persona.clone());

        let selection = WindowSelector::new(0).select(&items, 1000);
        let ids: Vec<&str> = selection.items.iter().map(|i| i.id.as_str()).collect();
        assert!(ids.contains(&instruction.id.as_str()));
        assert!(ids.contains(&persona.id.as_str()));
        assert!(selection.total_tokens <= 1000);
    }
}
