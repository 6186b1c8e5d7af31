//! Relevance scoring — ranks context items for window selection.
//!
//! The score is a product of four factors: declared importance, a
//! recency decay, a category multiplier, and a role multiplier. The
//! decay never reaches zero — old items stay eligible, just
//! deprioritized. Tie-breaks use insertion order (earlier wins) so
//! selection stays deterministic.

use chrono::{DateTime, Utc};
use pitchpal_core::{Category, ContextItem, Role};

/// Compute the relevance score for one item at time `now`.
///
/// Score = importance x recency x category weight x role weight.
///
/// Recency: within the first hour the score decays linearly by up to
/// 30%; beyond that it loses 10% per additional hour, floored at 50%
/// of base.
pub fn score(item: &ContextItem, now: DateTime<Utc>) -> f32 {
    let base = item.importance;

    let elapsed_secs = (now - item.created_at).num_seconds().max(0) as f32;
    let recency = if elapsed_secs < 3600.0 {
        1.0 - (elapsed_secs / 3600.0) * 0.3
    } else {
        let elapsed_hours = elapsed_secs / 3600.0;
        (1.0 - (elapsed_hours - 1.0) * 0.1).max(0.5)
    };

    base * recency * category_weight(item.category) * role_weight(item.role)
}

fn category_weight(category: Category) -> f32 {
    match category {
        Category::Instruction => 1.0,
        Category::Persona => 0.9,
        Category::Feedback => 0.8,
        Category::Message => 1.0,
    }
}

fn role_weight(role: Role) -> f32 {
    match role {
        Role::System => 1.0,
        Role::User => 0.9,
        Role::Assistant => 0.8,
    }
}

/// Return indices into `items` sorted by (score desc, created_at asc,
/// insertion order asc). Stable and deterministic for equal scores.
pub fn rank(items: &[ContextItem], now: DateTime<Utc>) -> Vec<usize> {
    let mut indexed: Vec<(usize, f32)> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (i, score(item, now)))
        .collect();

    indexed.sort_by(|(ai, a_score), (bi, b_score)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| items[*ai].created_at.cmp(&items[*bi].created_at))
            .then_with(|| ai.cmp(bi))
    });

    indexed.into_iter().map(|(i, _)| i).collect()
}
