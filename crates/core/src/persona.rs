//! Persona profiles — the scripted customers trainees pitch to.
//!
//! A persona pins down who the model is roleplaying: their situation,
//! their concerns, how much they can spend, and how they talk. The
//! rendered form is injected into every prompt as a persona-category
//! context item so the roleplay stays in character across turns.

use serde::{Deserialize, Serialize};

/// A scripted customer character profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    /// The customer's name
    pub name: String,

    /// Who they are and what situation they're in
    pub background: String,

    /// What they worry about when buying
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concerns: Vec<String>,

    /// Their spending range, as stated in the script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_range: Option<String>,

    /// How they communicate (e.g. "blunt, impatient, numbers-first")
    pub communication_style: String,

    /// Canned objections they should raise during the pitch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objections: Vec<String>,
}

impl PersonaProfile {
    /// Render the profile as the persona section text for the prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("You are playing {}, a potential customer.\n", self.name));
        out.push_str(&format!("Background: {}\n", self.background));
        out.push_str(&format!("Communication style: {}\n", self.communication_style));
        if let Some(budget) = &self.budget_range {
            out.push_str(&format!("Budget: {}\n", budget));
        }
        if !self.concerns.is_empty() {
            out.push_str("Concerns:\n");
            for concern in &self.concerns {
                out.push_str(&format!("- {}\n", concern));
            }
        }
        if !self.objections.is_empty() {
            out.push_str("Raise these objections when the pitch touches them:\n");
            for objection in &self.objections {
                out.push_str(&format!("- {}\n", objection));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersonaProfile {
        PersonaProfile {
            name: "Dana Reyes".into(),
            background: "Operations director at a 200-person logistics firm".into(),
            concerns: vec!["Integration effort".into(), "Vendor lock-in".into()],
            budget_range: Some("$20k-40k annually".into()),
            communication_style: "skeptical, detail-oriented".into(),
            objections: vec!["We already have a tool for this".into()],
        }
    }

    #[test]
    fn render_includes_all_sections() {
        let text = sample().render();
        assert!(text.contains("Dana Reyes"));
        assert!(text.contains("logistics firm"));
        assert!(text.contains("Vendor lock-in"));
        assert!(text.contains("$20k-40k"));
        assert!(text.contains("already have a tool"));
    }

    #[test]
    fn render_skips_empty_sections() {
        let persona = PersonaProfile {
            name: "Sam".into(),
            background: "Freelancer".into(),
            concerns: vec![],
            budget_range: None,
            communication_style: "casual".into(),
            objections: vec![],
        };
        let text = persona.render();
        assert!(!text.contains("Concerns:"));
        assert!(!text.contains("Budget:"));
        assert!(!text.contains("objections"));
    }

    #[test]
    fn persona_serialization_roundtrip() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: PersonaProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "Dana Reyes");
        assert_eq!(back.concerns.len(), 2);
    }
}
