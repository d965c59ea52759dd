// MindHarbor - Support agent (response orchestrator)
//
// ReceivedMessage → CrisisOverride | Retrieval → PromptAssembly → Generation.
// Any generation problem lands in the fallback responder, so a validated
// message always gets a reply.

pub mod context;
pub mod fallback;

use crate::config::Config;
use crate::ingest::{ingest, DirectorySource};
use crate::metrics::Metrics;
use crate::provider::factory::create_generator;
use crate::provider::{GenerationParams, Generator};
use crate::retrieval::{retrieve_with_floor, Chunker, Index, KnowledgeBase, KnowledgeStatus};
use crate::session::{ChatError, ChatMessage, ChatSession, SessionStore, SessionSummary, ValidationError};
use fallback::{is_crisis, FallbackResponder, CRISIS_RESPONSE, DISCLAIMER};
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Opening message of every explicitly started session.
pub const GREETING: &str = "Hello! I'm your mental health companion. I'm here to provide support, guidance, and a listening ear. How are you feeling today?";

/// Why a reply came from the fallback responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Index uninitialized or built from an empty corpus.
    NoIndex,
    NoGenerator,
    GenerationFailed,
    EmptyOutput,
    Timeout,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoIndex => "no_index",
            Self::NoGenerator => "no_generator",
            Self::GenerationFailed => "generation_failed",
            Self::EmptyOutput => "empty_output",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ReplySource {
    Crisis,
    Generated,
    Fallback(FallbackReason),
}

/// A reply and how it was produced.
#[derive(Debug, Clone)]
pub struct Response {
    pub text: String,
    pub source: ReplySource,
}

/// What `handle_user_message` hands back to the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response_text: String,
    pub session_id: String,
    pub source: ReplySource,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub version: &'static str,
    pub knowledge: KnowledgeStatus,
    pub generator: Option<String>,
    pub model: String,
    pub users: usize,
}

/// Trim `text` and check it is 1..=`max_chars` characters long.
pub fn validate_message(text: &str, max_chars: usize) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(ValidationError::TooLong { len, max: max_chars });
    }
    Ok(trimmed)
}

/// Explicit context object shared by every request handler.
pub struct SupportAgent {
    config: Config,
    knowledge: Arc<KnowledgeBase>,
    sessions: Arc<SessionStore>,
    generator: Option<Arc<dyn Generator>>,
    params: GenerationParams,
    fallback: FallbackResponder,
    metrics: Metrics,
}

impl SupportAgent {
    pub fn new(
        config: Config,
        knowledge: Arc<KnowledgeBase>,
        sessions: Arc<SessionStore>,
        generator: Option<Arc<dyn Generator>>,
    ) -> Self {
        let params = GenerationParams::from(&config.generator);
        Self {
            config,
            knowledge,
            sessions,
            generator,
            params,
            fallback: FallbackResponder::new(),
            metrics: Metrics::new(),
        }
    }

    /// Wire up the session store, an empty knowledge base and the generator
    /// described by `config`. The index still has to be loaded.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let sessions = SessionStore::open(config.sessions_path()?, &config.chat).await?;
        let knowledge = KnowledgeBase::new(Chunker::new(
            config.knowledge.chunk_size,
            config.knowledge.chunk_overlap,
        ));
        let generator = create_generator(&config.generator)?;
        Ok(Self::new(
            config,
            Arc::new(knowledge),
            Arc::new(sessions),
            generator,
        ))
    }

    /// Install the persisted index when one is configured and present,
    /// otherwise ingest the documents directory and build a fresh one.
    pub async fn load_knowledge(&self, cancel: Arc<AtomicBool>) -> anyhow::Result<KnowledgeStatus> {
        if let Some(path) = self.config.index_path()? {
            if path.exists() {
                match Index::load(&path) {
                    Ok(index) => {
                        tracing::info!(path = %path.display(), chunks = index.len(), "Loaded persisted index");
                        self.knowledge.install(index).await;
                        return Ok(self.knowledge.status().await);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "Persisted index unusable, rebuilding: {}", e);
                    }
                }
            }
        }
        self.refresh_knowledge(cancel).await
    }

    /// Re-ingest the documents directory and swap in a new index.
    pub async fn refresh_knowledge(&self, cancel: Arc<AtomicBool>) -> anyhow::Result<KnowledgeStatus> {
        let dir = self.config.documents_path()?;
        let report = tokio::task::spawn_blocking(move || ingest(&DirectorySource::new(dir))).await?;
        if !report.failures.is_empty() {
            tracing::warn!(failed = report.failures.len(), "Some documents could not be ingested");
        }
        Ok(self.knowledge.rebuild(report.documents, cancel).await?)
    }

    /// Validate, record the user turn, respond and record the reply. Fails
    /// only on invalid input; backend trouble degrades to fallback text.
    pub async fn handle_user_message(&self, user_id: &str, text: &str) -> Result<ChatReply, ChatError> {
        let message = match validate_message(text, self.config.chat.max_message_chars) {
            Ok(m) => m,
            Err(e) => {
                self.metrics.record_rejected().await;
                return Err(e.into());
            }
        };
        self.metrics.record_message().await;

        let session = self.sessions.find_or_start_session(user_id).await;
        self.sessions
            .append_message(&session.id, ChatMessage::user(message))
            .await?;

        let context = self
            .sessions
            .recent_messages(&session.id, self.config.chat.history_window)
            .await?;
        let response = self.respond(message, &context).await;

        self.sessions
            .append_message(&session.id, ChatMessage::assistant(response.text.clone()))
            .await?;

        Ok(ChatReply {
            response_text: response.text,
            session_id: session.id,
            source: response.source,
        })
    }

    /// Produce a reply for `message` given recent turns (oldest first). Never
    /// fails.
    pub async fn respond(&self, message: &str, context: &[ChatMessage]) -> Response {
        if is_crisis(message) {
            tracing::warn!("Crisis language detected, returning crisis resources");
            self.metrics.record_crisis_override().await;
            return Response {
                text: CRISIS_RESPONSE.to_string(),
                source: ReplySource::Crisis,
            };
        }

        let Some(index) = self.knowledge.snapshot().await else {
            return self.fall_back(message, FallbackReason::NoIndex).await;
        };
        let Some(generator) = &self.generator else {
            return self.fall_back(message, FallbackReason::NoGenerator).await;
        };

        let prompt = {
            let hits = retrieve_with_floor(
                &index,
                message,
                self.config.knowledge.top_k,
                self.config.knowledge.min_score,
            );
            self.metrics.record_retrieval(hits.len()).await;

            let window = self.config.chat.prompt_window;
            let conversation = &context[context.len().saturating_sub(window)..];
            context::build_grounding_prompt(&hits, conversation, message)
        };

        let timeout = Duration::from_secs(self.config.generator.timeout_secs);
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, generator.generate(&prompt, &self.params)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                self.metrics.record_generator_call(true, elapsed).await;
                self.metrics.record_generated().await;
                tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Generated reply");
                Response {
                    text: self.decorate(text.trim()),
                    source: ReplySource::Generated,
                }
            }
            Ok(Ok(_)) => {
                self.metrics.record_generator_call(false, elapsed).await;
                tracing::warn!("Generator returned empty output");
                self.fall_back(message, FallbackReason::EmptyOutput).await
            }
            Ok(Err(e)) => {
                self.metrics.record_generator_call(false, elapsed).await;
                tracing::warn!(error = %e, "Generation failed");
                self.fall_back(message, FallbackReason::GenerationFailed).await
            }
            Err(_) => {
                self.metrics.record_generator_call(false, elapsed).await;
                tracing::warn!(timeout_secs = timeout.as_secs(), "Generation timed out");
                self.fall_back(message, FallbackReason::Timeout).await
            }
        }
    }

    async fn fall_back(&self, message: &str, reason: FallbackReason) -> Response {
        self.metrics.record_fallback(reason.as_str()).await;
        tracing::debug!(reason = reason.as_str(), "Using fallback responder");
        Response {
            text: self.fallback.respond(message).to_string(),
            source: ReplySource::Fallback(reason),
        }
    }

    fn decorate(&self, text: &str) -> String {
        if self.config.generator.append_disclaimer {
            format!("{}{}", text, DISCLAIMER)
        } else {
            text.to_string()
        }
    }

    /// Deactivate the user's current session and open a new one seeded with
    /// the greeting.
    pub async fn start_new_session(&self, user_id: &str) -> Result<ChatSession, ChatError> {
        let session = self
            .sessions
            .start_new_session(user_id, Some(ChatMessage::assistant(GREETING)))
            .await?;
        self.metrics.record_session_started().await;
        Ok(session)
    }

    /// Most recently updated sessions first; `None` uses the configured limit.
    pub async fn list_recent_sessions(&self, user_id: &str, limit: Option<usize>) -> Vec<SessionSummary> {
        let limit = limit.unwrap_or(self.config.chat.history_limit);
        self.sessions.list_recent_sessions(user_id, limit).await
    }

    pub async fn status(&self) -> AgentStatus {
        AgentStatus {
            version: crate::VERSION,
            knowledge: self.knowledge.status().await,
            generator: self.generator.as_ref().map(|g| g.name().to_string()),
            model: self.params.model.clone(),
            users: self.sessions.user_count().await,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
