//! Prompt assembly — renders selected context items into the final
//! prompt string handed to the model.
//!
//! Fixed structural order: system instructions, persona description,
//! coaching feedback, the chronological conversation transcript, and
//! the live (not-yet-stored) user turn labeled as the current turn.
//! If label overhead pushes the rendered string past the budget, a
//! final hard truncation pass cuts at the token level — a last-resort
//! safety valve, not the primary selection mechanism.

use pitchpal_core::{Category, ContextItem, PersonaProfile};
use std::sync::Arc;
use tracing::warn;

use crate::token::TokenCounter;

const PERSONA_HEADER: &str = "[Persona]";
const FEEDBACK_HEADER: &str = "[Coaching Feedback]";
const CONVERSATION_HEADER: &str = "[Conversation]";
const CURRENT_TURN_HEADER: &str = "[Current Turn]";

/// Renders selected context into the final prompt string.
pub struct PromptAssembler {
    counter: Arc<TokenCounter>,
}

impl PromptAssembler {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self { counter }
    }

    /// Build the prompt from selected items plus the live user input.
    ///
    /// `selected_items` must already be within budget and in
    /// chronological order (the selector guarantees both).
    pub fn build(
        &self,
        selected_items: &[ContextItem],
        live_user_input: &str,
        persona_profile: Option<&PersonaProfile>,
        budget_tokens: usize,
    ) -> String {
        let mut sections: Vec<String> = Vec::new();

        // 1. System instructions.
        let instructions: Vec<&str> = selected_items
            .iter()
            .filter(|i| i.category == Category::Instruction)
            .map(|i| i.content.as_str())
            .collect();
        if !instructions.is_empty() {
            sections.push(instructions.join("\n\n"));
        }

        // 2. Persona description: live profile first, then any stored
        // persona items.
        let mut persona_lines: Vec<String> = Vec::new();
        if let Some(profile) = persona_profile {
            persona_lines.push(profile.render());
        }
        for item in selected_items.iter().filter(|i| i.category == Category::Persona) {
            persona_lines.push(item.content.clone());
        }
        if !persona_lines.is_empty() {
            sections.push(format!("{}\n{}", PERSONA_HEADER, persona_lines.join("\n")));
        }

        // 3. Coaching feedback attached to the session.
        let feedback: Vec<String> = selected_items
            .iter()
            .filter(|i| i.category == Category::Feedback)
            .map(|i| format!("- {}", i.content))
            .collect();
        if !feedback.is_empty() {
            sections.push(format!("{}\n{}", FEEDBACK_HEADER, feedback.join("\n")));
        }

        // 4. Chronological transcript of message items.
        let transcript: Vec<String> = selected_items
            .iter()
            .filter(|i| i.category == Category::Message)
            .map(|i| format!("{}: {}", i.role.label(), i.content))
            .collect();
        if !transcript.is_empty() {
            sections.push(format!("{}\n{}", CONVERSATION_HEADER, transcript.join("\n")));
        }

        // 5. The live user turn, labeled distinctly.
        sections.push(format!("{}\nUSER: {}", CURRENT_TURN_HEADER, live_user_input));

        let rendered = sections.join("\n\n");

        // Template/label overhead is not counted per-item, so the
        // rendered whole can exceed the budget. Hard-truncate then.
        let count = self.counter.count(&rendered);
        if count.tokens > budget_tokens {
            warn!(
                rendered_tokens = count.tokens,
                budget = budget_tokens,
                degraded = count.degraded,
                "Assembled prompt exceeds budget, applying hard truncation"
            );
            return self.counter.truncate(&rendered, budget_tokens);
        }

        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchpal_core::{ConversationId, Role};

    fn counter() -> Arc<TokenCounter> {
        Arc::new(TokenCounter::heuristic())
    }

    fn item(category: Category, role: Role, content: &str) -> ContextItem {
        ContextItem::new(
            ConversationId::from("conv"),
            role,
            category,
            content,
            0.8,
            (content.len() / 4).max(1),
        )
        .unwrap()
    }

    #[test]
    fn sections_render_in_fixed_order() {
        let items = vec![
            item(Category::Message, Role::User, "Hello"),
            item(Category::Instruction, Role::System, "Stay in character."),
            item(Category::Persona, Role::System, "A skeptical CFO."),
            item(Category::Message, Role::Assistant, "Hi there"),
        ];

        let prompt = PromptAssembler::new(counter()).build(&items, "Let me tell you more", None, 4000);

        let instruction_pos = prompt.find("Stay in character.").unwrap();
        let persona_pos = prompt.find("[Persona]").unwrap();
        let conversation_pos = prompt.find("[Conversation]").unwrap();
        let current_pos = prompt.find("[Current Turn]").unwrap();

        assert!(instruction_pos < persona_pos);
        assert!(persona_pos < conversation_pos);
        assert!(conversation_pos < current_pos);
    }

    #[test]
    fn transcript_lines_use_role_labels_in_order() {
        let items = vec![
            item(Category::Message, Role::User, "Hello"),
            item(Category::Message, Role::Assistant, "Hi there"),
        ];

        let prompt = PromptAssembler::new(counter()).build(&items, "Next", None, 4000);
        let user_pos = prompt.find("USER: Hello").unwrap();
        let assistant_pos = prompt.find("ASSISTANT: Hi there").unwrap();
        assert!(user_pos < assistant_pos);
    }

    #[test]
    fn live_input_labeled_as_current_turn() {
        let prompt = PromptAssembler::new(counter()).build(&[], "My closing offer", None, 4000);
        assert!(prompt.contains("[Current Turn]\nUSER: My closing offer"));
    }

    #[test]
    fn persona_profile_rendered_when_given() {
        let profile = PersonaProfile {
            name: "Dana".into(),
            background: "CFO".into(),
            concerns: vec![],
            budget_range: None,
            communication_style: "blunt".into(),
            objections: vec![],
        };
        let prompt = PromptAssembler::new(counter()).build(&[], "Pitch", Some(&profile), 4000);
        assert!(prompt.contains("You are playing Dana"));
    }

    #[test]
    fn feedback_items_get_their_own_section() {
        let items = vec![item(
            Category::Feedback,
            Role::System,
            "Slow down when naming the price.",
        )];
        let prompt = PromptAssembler::new(counter()).build(&items, "Ok", None, 4000);
        assert!(prompt.contains("[Coaching Feedback]"));
        assert!(prompt.contains("- Slow down when naming the price."));
    }

    #[test]
    fn over_budget_output_is_hard_truncated() {
        let long = "word ".repeat(2000);
        let items = vec![item(Category::Message, Role::User, &long)];
        let prompt = PromptAssembler::new(counter()).build(&items, "hi", None, 50);

        let recount = TokenCounter::heuristic().count(&prompt);
        assert!(recount.tokens <= 50);
    }

    #[test]
    fn empty_selection_still_renders_current_turn() {
        let prompt = PromptAssembler::new(counter()).build(&[], "Opening line", None, 4000);
        assert!(!prompt.contains("[Conversation]"));
        assert!(prompt.contains("Opening line"));
    }
}
