// MindHarbor - Conversation state store (per-user sessions, file persistence)
//
// Every user owns one JSON file holding all of their sessions. Mutations for a
// user run under that user's lock and end with one atomic write of the file,
// so deactivating the old session and activating the new one land together.
// Different users never contend on the same lock.

use crate::config::ChatConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejections of caller input. The only failures a chat user ever sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    Empty,
    #[error("Message must be between 1 and {max} characters (got {len})")]
    TooLong { len: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not switch the active session for user {user_id} after {attempts} attempts")]
    SessionStateConflict { user_id: String, attempts: usize },
    #[error("unknown session: {0}")]
    UnknownSession(String),
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Cap assumed for histories read back from disk until the store re-applies
/// its configured limit.
const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Append-only message log that keeps only the newest `capacity` entries.
/// Serialized as the plain, oldest-first list of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "Vec<ChatMessage>", from = "Vec<ChatMessage>")]
pub struct MessageHistory {
    capacity: usize,
    messages: VecDeque<ChatMessage>,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            messages: VecDeque::new(),
        }
    }

    /// Append, evicting from the front once over capacity.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        self.evict();
    }

    /// Change the cap, dropping the oldest messages if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict();
    }

    /// The last `n` messages in chronological order.
    pub fn last(&self, n: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict(&mut self) {
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }
}

impl From<MessageHistory> for Vec<ChatMessage> {
    fn from(history: MessageHistory) -> Self {
        history.messages.into()
    }
}

impl From<Vec<ChatMessage>> for MessageHistory {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self {
            capacity: messages.len().max(DEFAULT_HISTORY_CAPACITY),
            messages: messages.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub messages: MessageHistory,
    pub is_active: bool,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    fn new(user_id: &str, title: &str, capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            messages: MessageHistory::new(capacity),
            is_active: true,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            is_active: self.is_active,
            message_count: self.messages.len(),
            last_message: self.messages.last(1).pop().map(|m| m.content),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Lightweight view of a session for history listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub is_active: bool,
    pub message_count: usize,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything stored for one user; also the on-disk file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSessions {
    user_id: String,
    sessions: Vec<ChatSession>,
}

impl UserSessions {
    fn active(&self) -> Option<&ChatSession> {
        self.sessions
            .iter()
            .filter(|s| s.is_active)
            .max_by_key(|s| s.updated_at)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct SessionStore {
    sessions_dir: Option<PathBuf>,
    max_messages: usize,
    title: String,
    retry_attempts: usize,
    users: RwLock<HashMap<String, Arc<Mutex<UserSessions>>>>,
    /// session id → owning user id
    owners: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    /// Open a store persisted under `sessions_dir`, loading every user file
    /// already there. `None` keeps everything in memory.
    pub async fn open(sessions_dir: Option<PathBuf>, config: &ChatConfig) -> anyhow::Result<Self> {
        let store = Self {
            sessions_dir,
            max_messages: config.max_messages,
            title: config.session_title.clone(),
            retry_attempts: config.session_retry_attempts.max(1),
            users: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
        };
        store.load_all().await?;
        Ok(store)
    }

    pub fn in_memory(config: &ChatConfig) -> Self {
        Self {
            sessions_dir: None,
            max_messages: config.max_messages,
            title: config.session_title.clone(),
            retry_attempts: config.session_retry_attempts.max(1),
            users: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
        }
    }

    async fn load_all(&self) -> anyhow::Result<()> {
        let Some(dir) = &self.sessions_dir else {
            return Ok(());
        };
        // Created lazily on first write
        if !dir.is_dir() {
            return Ok(());
        }

        let mut users = self.users.write().await;
        let mut owners = self.owners.write().await;
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_user(&path).await {
                Ok(mut data) => {
                    for session in &mut data.sessions {
                        session.messages.set_capacity(self.max_messages);
                        owners.insert(session.id.clone(), data.user_id.clone());
                    }
                    tracing::debug!(user = %data.user_id, sessions = data.sessions.len(), "Loaded sessions");
                    users.insert(data.user_id.clone(), Arc::new(Mutex::new(data)));
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), "Failed to load sessions: {}", e);
                }
            }
        }
        Ok(())
    }

    async fn user_slot(&self, user_id: &str) -> Arc<Mutex<UserSessions>> {
        if let Some(slot) = self.users.read().await.get(user_id) {
            return slot.clone();
        }
        self.users
            .write()
            .await
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(UserSessions {
                    user_id: user_id.to_string(),
                    sessions: Vec::new(),
                }))
            })
            .clone()
    }

    async fn owner_of(&self, session_id: &str) -> Result<String, ChatError> {
        self.owners
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ChatError::UnknownSession(session_id.to_string()))
    }

    async fn persist(&self, data: &UserSessions) -> anyhow::Result<()> {
        match &self.sessions_dir {
            Some(dir) => save_user(&user_path(dir, &data.user_id), data).await,
            None => Ok(()),
        }
    }

    /// Append a message and update `updated_at`. A failed write is logged and
    /// the in-memory state is kept.
    pub async fn append_message(&self, session_id: &str, message: ChatMessage) -> Result<(), ChatError> {
        let user_id = self.owner_of(session_id).await?;
        let slot = self.user_slot(&user_id).await;
        let mut data = slot.lock().await;

        let session = data
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| ChatError::UnknownSession(session_id.to_string()))?;
        session.messages.push(message);
        session.updated_at = Utc::now();

        if let Err(e) = self.persist(&data).await {
            tracing::error!(session = %session_id, "Failed to save session: {}", e);
        }
        Ok(())
    }

    /// The user's active session, if any.
    pub async fn get_active_session(&self, user_id: &str) -> Option<ChatSession> {
        let slot = self.users.read().await.get(user_id).cloned()?;
        let data = slot.lock().await;
        data.active().cloned()
    }

    /// Look up a session by id.
    pub async fn session(&self, session_id: &str) -> Option<ChatSession> {
        let user_id = self.owner_of(session_id).await.ok()?;
        let slot = self.user_slot(&user_id).await;
        let data = slot.lock().await;
        data.sessions.iter().find(|s| s.id == session_id).cloned()
    }

    /// Return the active session, creating one when the user has none.
    pub async fn find_or_start_session(&self, user_id: &str) -> ChatSession {
        let slot = self.user_slot(user_id).await;
        let mut data = slot.lock().await;
        if let Some(active) = data.active() {
            return active.clone();
        }

        let session = ChatSession::new(user_id, &self.title, self.max_messages);
        data.sessions.push(session.clone());
        self.owners
            .write()
            .await
            .insert(session.id.clone(), user_id.to_string());

        if let Err(e) = self.persist(&data).await {
            tracing::error!(user = %user_id, "Failed to save new session: {}", e);
        }
        tracing::info!(user = %user_id, session = %session.id, "Started session");
        session
    }

    /// Deactivate every active session of the user and activate a new one,
    /// as one step. If the write fails the change is rolled back and retried;
    /// once retries run out the call fails with `SessionStateConflict` and the
    /// previous state stays in place.
    pub async fn start_new_session(
        &self,
        user_id: &str,
        opening: Option<ChatMessage>,
    ) -> Result<ChatSession, ChatError> {
        let slot = self.user_slot(user_id).await;
        let mut data = slot.lock().await;

        for attempt in 1..=self.retry_attempts {
            let deactivated: Vec<usize> = data
                .sessions
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_active)
                .map(|(i, _)| i)
                .collect();
            for &i in &deactivated {
                data.sessions[i].is_active = false;
            }

            let mut session = ChatSession::new(user_id, &self.title, self.max_messages);
            if let Some(message) = opening.clone() {
                session.messages.push(message);
            }
            data.sessions.push(session.clone());

            match self.persist(&data).await {
                Ok(()) => {
                    self.owners
                        .write()
                        .await
                        .insert(session.id.clone(), user_id.to_string());
                    tracing::info!(
                        user = %user_id,
                        session = %session.id,
                        deactivated = deactivated.len(),
                        "Started new session"
                    );
                    return Ok(session);
                }
                Err(e) => {
                    data.sessions.pop();
                    for &i in &deactivated {
                        data.sessions[i].is_active = true;
                    }
                    tracing::warn!(user = %user_id, attempt, "Session switch not persisted, rolled back: {}", e);
                }
            }
        }

        Err(ChatError::SessionStateConflict {
            user_id: user_id.to_string(),
            attempts: self.retry_attempts,
        })
    }

    /// The last `n` messages of a session, oldest first.
    pub async fn recent_messages(&self, session_id: &str, n: usize) -> Result<Vec<ChatMessage>, ChatError> {
        let user_id = self.owner_of(session_id).await?;
        let slot = self.user_slot(&user_id).await;
        let data = slot.lock().await;
        data.sessions
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| s.messages.last(n))
            .ok_or_else(|| ChatError::UnknownSession(session_id.to_string()))
    }

    /// Up to `limit` of the user's sessions, most recently updated first.
    pub async fn list_recent_sessions(&self, user_id: &str, limit: usize) -> Vec<SessionSummary> {
        let Some(slot) = self.users.read().await.get(user_id).cloned() else {
            return Vec::new();
        };
        let data = slot.lock().await;
        // Reverse first so ties keep the newer session in front
        let mut sessions: Vec<&ChatSession> = data.sessions.iter().rev().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.into_iter().take(limit).map(ChatSession::summary).collect()
    }

    /// Number of users with stored sessions.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

/// One file per user. Bytes outside `[A-Za-z0-9-]` (including `_` itself)
/// become `_xx`, so distinct ids never share a file.
fn user_path(dir: &Path, user_id: &str) -> PathBuf {
    let mut safe_name = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            safe_name.push(byte as char);
        } else {
            safe_name.push_str(&format!("_{:02x}", byte));
        }
    }
    dir.join(format!("{}.json", safe_name))
}

async fn save_user(path: &Path, data: &UserSessions) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Atomic write: write to temp file then rename
    let tmp_path = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(data)?;
    tokio::fs::write(&tmp_path, &content).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    Ok(())
}

async fn load_user(path: &Path) -> anyhow::Result<UserSessions> {
    let content = tokio::fs::read_to_string(path).await?;
    let data: UserSessions = serde_json::from_str(&content)?;
    Ok(data)
}
