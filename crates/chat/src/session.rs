//! The per-process practice session.

use chrono::Duration;
use pitchpal_config::AppConfig;
use pitchpal_core::{Category, ContextItem, ConversationId, ModelError, PersonaProfile, Result, Role};
use pitchpal_context::{ContextStore, OptimizeReport, TokenCounter};
use pitchpal_engine::{GenerationParams, ModelResourceCache};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Importance stamped on a rep's own turns. Slightly above the
/// assistant's so that, all else equal, what the rep said outlives
/// what the persona answered.
const USER_TURN_IMPORTANCE: f32 = 0.7;
const ASSISTANT_TURN_IMPORTANCE: f32 = 0.6;

/// Items seeded at conversation start must survive every cleanup path.
const SEED_IMPORTANCE: f32 = 1.0;

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceReport {
    /// Items removed because they aged past the TTL.
    pub expired_removed: usize,
    /// Result of shrinking the store to its size target.
    pub optimize: OptimizeReport,
}

/// One process's practice-session state: store, model cache, budget.
pub struct ChatSession {
    store: Arc<ContextStore>,
    cache: Arc<ModelResourceCache>,
    personas: RwLock<HashMap<ConversationId, PersonaProfile>>,
    prompt_budget: usize,
    store_target_tokens: usize,
    cache_ttl: Duration,
    params: GenerationParams,
}

impl ChatSession {
    /// Wire a session from configuration. The token counter starts in
    /// heuristic mode and upgrades itself once the first model load
    /// shares its tokenizer.
    pub fn new(cache: Arc<ModelResourceCache>, config: &AppConfig) -> Self {
        let counter = Arc::new(TokenCounter::heuristic());
        let store = Arc::new(ContextStore::new(
            counter,
            config.context.max_history_turns,
        ));

        Self {
            store,
            cache,
            personas: RwLock::new(HashMap::new()),
            prompt_budget: config.context.prompt_budget(),
            // The persisted store may hold several windows' worth of
            // history before maintenance steps in.
            store_target_tokens: config.context.max_tokens.saturating_mul(4),
            cache_ttl: Duration::hours(config.context.cache_ttl_hours as i64),
            params: GenerationParams {
                max_tokens: config.model.max_response_tokens,
                temperature: config.model.temperature,
            },
        }
    }

    /// The underlying context store.
    pub fn store(&self) -> Arc<ContextStore> {
        self.store.clone()
    }

    /// The model cache this session generates with.
    pub fn cache(&self) -> Arc<ModelResourceCache> {
        self.cache.clone()
    }

    /// The persona a conversation was seeded with, if any.
    pub async fn persona(&self, conversation_id: &ConversationId) -> Option<PersonaProfile> {
        self.personas.read().await.get(conversation_id).cloned()
    }

    /// Seed a fresh conversation with its behavioral instructions and
    /// the customer persona the model will play. Seeded items carry
    /// maximum importance so selection and cleanup always keep them.
    pub async fn seed_conversation(
        &self,
        conversation_id: ConversationId,
        persona: PersonaProfile,
        instructions: &[&str],
    ) -> Result<Vec<ContextItem>> {
        let mut seeded = Vec::new();
        for instruction in instructions {
            seeded.push(
                self.store
                    .add(
                        conversation_id.clone(),
                        Role::System,
                        Category::Instruction,
                        *instruction,
                        SEED_IMPORTANCE,
                    )
                    .await?,
            );
        }
        seeded.push(
            self.store
                .add(
                    conversation_id.clone(),
                    Role::System,
                    Category::Persona,
                    persona.render(),
                    SEED_IMPORTANCE,
                )
                .await?,
        );

        info!(
            conversation_id = %conversation_id,
            persona = %persona.name,
            seeded = seeded.len(),
            "Seeded conversation"
        );
        self.personas.write().await.insert(conversation_id, persona);
        Ok(seeded)
    }

    /// Run one turn: assemble the context window, generate the
    /// persona's reply, persist both sides of the exchange.
    ///
    /// The live input is rendered as the current turn, not read back
    /// from the store, so it is persisted only after generation
    /// succeeds. A failed turn leaves the transcript untouched and the
    /// rep can simply retry.
    pub async fn handle_turn(
        &self,
        conversation_id: &ConversationId,
        user_input: &str,
    ) -> Result<String> {
        let pipeline = self.cache.get_pipeline().await?;

        // Share the model's tokenizer with the counter so budget
        // accounting is exact from here on.
        if let Some(tokenizer) = pipeline.tokenizer() {
            self.store.counter().attach(tokenizer);
        }

        let prompt = self
            .store
            .build_window(conversation_id, user_input, None, self.prompt_budget)
            .await;

        let params = self.params.clone();
        let prompt_for_model = prompt.clone();
        let output = tokio::task::spawn_blocking(move || {
            pipeline.generate(&prompt_for_model, &params)
        })
        .await
        .map_err(|e| ModelError::TaskFailed(format!("generation task panicked: {e}")))??;

        debug!(
            conversation_id = %conversation_id,
            prompt_tokens = output.prompt_tokens,
            completion_tokens = output.completion_tokens,
            "Turn generated"
        );

        self.store
            .add(
                conversation_id.clone(),
                Role::User,
                Category::Message,
                user_input,
                USER_TURN_IMPORTANCE,
            )
            .await?;
        self.store
            .add(
                conversation_id.clone(),
                Role::Assistant,
                Category::Message,
                output.text.clone(),
                ASSISTANT_TURN_IMPORTANCE,
            )
            .await?;

        Ok(output.text)
    }

    /// Record a coaching note against a conversation. Feedback items
    /// compete for window space like messages but decay slower in
    /// effect because of their category weight.
    pub async fn add_feedback(
        &self,
        conversation_id: &ConversationId,
        note: &str,
        importance: f32,
    ) -> Result<ContextItem> {
        Ok(self
            .store
            .add(
                conversation_id.clone(),
                Role::System,
                Category::Feedback,
                note,
                importance,
            )
            .await?)
    }

    /// Periodic housekeeping: expire aged-out messages (instructions
    /// and personas are exempt, as is anything above the importance
    /// threshold), then shrink the store to its size target.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let expired_removed = self
            .store
            .clear_older_than(
                self.cache_ttl,
                &[Category::Instruction, Category::Persona],
                0.9,
            )
            .await;
        let optimize = self.store.optimize(self.store_target_tokens).await;

        info!(
            expired_removed,
            optimized_removed = optimize.removed_count,
            kept_tokens = optimize.kept_tokens,
            "Maintenance pass complete"
        );
        MaintenanceReport {
            expired_removed,
            optimize,
        }
    }

    /// End a practice run: drop its transcript and persona.
    pub async fn end_conversation(&self, conversation_id: &ConversationId) -> usize {
        self.personas.write().await.remove(conversation_id);
        self.store.clear_conversation(conversation_id).await
    }
}
