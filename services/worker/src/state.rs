//! Shared Application State
//!
//! Wires configuration into the concrete services: the LLM client, the rubric
//! grader, the session store and the background feedback queue.

use anyhow::{Context, Result};
use async_openai::config::OpenAIConfig;
use oralexam_core::{
    feedback::FeedbackOrchestrator,
    grader::{LLMRubricGrader, RubricGrader},
    llm_client::{LLMClient, OpenAICompatibleClient},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    config::Config,
    db::PgSessionStore,
    jobs::{FeedbackQueue, QueueSettings},
    prompts::load_prompts,
    sessions::SessionService,
    store::{InMemorySessionStore, SessionStore},
};

/// Everything a command needs, created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SessionStore>,
    pub orchestrator: FeedbackOrchestrator,
    pub sessions: SessionService,
}

/// Builds the chat client for the configured provider.
pub fn build_llm_client(config: &Config) -> Result<Arc<dyn LLMClient>> {
    let api_key = config
        .api_key()
        .context("No API key configured for the selected provider")?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.provider.api_base());
    info!(provider = ?config.provider, model = %config.chat_model, "LLM client configured");
    Ok(Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.chat_model.clone(),
    )))
}

/// Builds the orchestrator with the LLM-backed grader.
pub fn build_orchestrator(config: &Config) -> Result<FeedbackOrchestrator> {
    let prompts = load_prompts(config.prompts_path.as_deref())?;
    let grader: Arc<dyn RubricGrader> =
        Arc::new(LLMRubricGrader::new(build_llm_client(config)?, prompts));
    Ok(FeedbackOrchestrator::new(grader))
}

/// Opens Postgres (running migrations) or falls back to the in-memory store.
pub async fn build_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgSessionStore::connect(url)
                .await
                .context("Failed to connect to database")?;
            store.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set; sessions are kept in memory for this process only.");
            Ok(Arc::new(InMemorySessionStore::new()))
        }
    }
}

impl AppState {
    /// Builds the state and starts the feedback queue. The returned handle
    /// finishes once the queue has drained after the state is dropped.
    pub async fn from_config(config: Config) -> Result<(Self, JoinHandle<()>)> {
        let orchestrator = build_orchestrator(&config)?;
        let store = build_store(&config).await?;
        let (queue, dispatcher) = FeedbackQueue::start(
            store.clone(),
            orchestrator.clone(),
            QueueSettings::from_config(&config),
        );
        let sessions = SessionService::new(store.clone(), queue);
        let interrupted = sessions
            .recover_interrupted(config.feedback_timeout)
            .await
            .context("Failed to recover interrupted feedback runs")?;
        if interrupted > 0 {
            info!(interrupted, "Marked interrupted feedback runs as failed");
        }

        Ok((
            Self {
                config: Arc::new(config),
                store,
                orchestrator,
                sessions,
            },
            dispatcher,
        ))
    }
}
