//! `pitchpal practice` — Interactive pitch practice session.

use pitchpal_chat::ChatSession;
use pitchpal_config::AppConfig;
use pitchpal_core::{ConversationId, PersonaProfile};
use pitchpal_engine::{CandleLoader, ModelResourceCache};
use std::io::{BufRead, Write};
use std::sync::Arc;

const DEFAULT_INSTRUCTIONS: &[&str] = &[
    "You are roleplaying a potential customer in a sales training exercise. \
     Stay in character at all times. Respond to the salesperson's pitch the way \
     your persona would: raise your scripted objections when the pitch touches \
     them, and only warm up if they are genuinely addressed. Keep replies short \
     and conversational.",
];

pub async fn run(
    model: Option<String>,
    persona_path: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(model) = model {
        config.model.name = model;
    }

    let persona = match persona_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read persona file '{path}': {e}"))?;
            serde_json::from_str::<PersonaProfile>(&raw)
                .map_err(|e| format!("Invalid persona file '{path}': {e}"))?
        }
        None => default_persona(),
    };

    let cache = Arc::new(ModelResourceCache::new(
        config.model.name.clone(),
        Arc::new(CandleLoader::new()),
    ));
    let session = ChatSession::new(cache, &config);

    let conversation = ConversationId::from("practice");
    session
        .seed_conversation(conversation.clone(), persona.clone(), DEFAULT_INSTRUCTIONS)
        .await?;

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║       PitchPal — Practice Session            ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:    {}", config.model.name);
    println!("  Budget:   {} tokens ({} reserved for replies)",
        config.context.max_tokens, config.context.reserved_tokens);
    println!("  Customer: {} — {}", persona.name, persona.background);
    println!();
    println!("  Make your pitch and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let stdin = std::io::stdin();
    print!("  You > ");
    std::io::stdout().flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            break;
        }

        eprint!("  ...");
        match session.handle_turn(&conversation, input).await {
            Ok(reply) => {
                eprint!("\r     \r");
                println!();
                for line in reply.lines() {
                    println!("  {} > {line}", persona.name);
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Session over. Good pitch! 👋");
    println!();
    Ok(())
}

/// The built-in persona used when no profile file is given.
fn default_persona() -> PersonaProfile {
    PersonaProfile {
        name: "Dana Reyes".into(),
        background: "Operations director at a 200-person logistics firm, \
                     evaluating tools she did not ask for"
            .into(),
        concerns: vec![
            "Integration effort with existing systems".into(),
            "Vendor lock-in".into(),
        ],
        budget_range: Some("$20k-40k annually".into()),
        communication_style: "skeptical, detail-oriented, numbers-first".into(),
        objections: vec![
            "We already have a tool that does most of this".into(),
            "My team has no bandwidth for another rollout this quarter".into(),
        ],
    }
}
