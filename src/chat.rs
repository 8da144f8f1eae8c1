//! Per-user chat session.
//!
//! A session is transient: it holds a handle to the persisted message log
//! and is reconstructed from it on every interaction. Lifecycle is
//! uninitialized → active; `start` persists the system prompt and the
//! opening assistant message, `send` runs one retrieval-augmented exchange.
//!
//! The retrieved context is folded into the system turn of the in-memory
//! history copy only; the persisted system message row is never rewritten
//! by a turn. The turn's completion call runs under a hard deadline; on
//! timeout the caller gets [`ChatError::Timeout`] and no assistant message
//! is persisted (the user message already is).

use sqlx::{Row, SqlitePool};
use std::time::Duration;
use uuid::Uuid;

use doc_chat_core::index::{PassageFilter, VectorIndex};
use doc_chat_core::vectorize::Vectorizer;

use crate::completion::{ChatTurn, CompletionModel, Role};
use crate::config::Config;
use crate::{db, search};

/// Fixed system-prompt template. `{user_name}` and `{current_date}` are
/// substituted at session start. The trailing context header is where each
/// turn appends its retrieved passages.
const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are a specialized AI Conversational Assistant focused on health insurance plans and eligibility requirements. \
Greet the user by their name and ask for their question.\n\n\
User_name: {user_name}\n\
Current date: {current_date}\n\n\
### Your Primary Role:\n\
- Provide detailed information about supported insurance plans.\n\
- Assess eligibility requirements for all plan types.\n\
- Determine how medical conditions affect coverage.\n\
- Clarify users' medical history through conversation.\n\
- Explain plan types, coverage, and codes.\n\
- Outline 5-year medical history requirements.\n\n\
### Response Protocol:\n\
1. ALWAYS check the provided `knowledge-base` context before answering.\n\
2. Use the context and message history to craft accurate responses.\n\
3. If information is unavailable, respond: 'I don't have enough information to answer this question accurately.'\n\
4. For questions outside plan coverage and eligibility, respond: 'I can only answer questions about supported insurance plans and their eligibility requirements.'\n\
5. When discussing ineligibility, list ALL specific plans affected.\n\
6. Provide plan-specific details when available in the context.\n\n\
### Disqualifying Conditions (5-year history):\n\
- Cancer, heart disease, heart attacks, bypass surgery, strokes.\n\
- Autoimmune disorders (e.g., Lupus, MS).\n\
- Blood disorders (e.g., Anemia, AIDS, HIV, Hemophilia).\n\
- Organ failure, transplants, or dialysis.\n\
- Current pregnancy.\n\
- Hospitalization history.\n\
- Respiratory disorders (e.g., Emphysema, COPD).\n\
- Musculoskeletal disorders.\n\
- Substance abuse or dependency.\n\
- Type 1 Diabetes.\n\
- Major surgeries (past or planned).\n\n\
### `knowledge-base` Context:\n";

/// Instruction prompt that rewrites a conversational message into a
/// retrieval-friendly query. Deterministic instruction-following, not free
/// generation.
const QUERY_REWRITE_PROMPT: &str = "\
You are tasked with formatting user queries for semantic vector search.\n\
Follow these guidelines so the query is optimized for accurate similarity matching:\n\n\
### Guidelines:\n\
1. Retain all medical terms and conditions exactly as stated in the query.\n\
2. Preserve specific plan names, numbers, and identifiers without modification.\n\
3. Maintain temporal references (e.g., \"current\", \"past 5 years\") as they appear in the query.\n\
4. Avoid adding or inferring information not explicitly present in the original query.\n\
5. Ensure the output is concise, clear, and suitable for vector similarity search.\n\n\
### Example:\n\
**Input:**\n\
\"Can someone with a history of heart disease in the last 3 years get America's Choice 2500 Gold plan?\"\n\n\
**Output:**\n\
\"heart disease medical history 3 years eligibility America's Choice 2500 Gold plan\"\n";

/// Chat failure, classified for the caller.
#[derive(Debug)]
pub enum ChatError {
    /// Rejected before any external call.
    EmptyMessage,
    /// No profile for the user id; the session cannot render its prompt.
    UnknownUser(String),
    /// The completion call exceeded its deadline. Not retried; no
    /// assistant message was persisted.
    Timeout,
    /// The completion service failed outright.
    Completion(anyhow::Error),
    /// The message log could not be read or written.
    Store(anyhow::Error),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::EmptyMessage => write!(f, "message must not be empty"),
            ChatError::UnknownUser(id) => write!(f, "no profile for user '{id}'"),
            ChatError::Timeout => write!(f, "completion call timed out"),
            ChatError::Completion(e) => write!(f, "completion failed: {e}"),
            ChatError::Store(e) => write!(f, "message store failed: {e}"),
        }
    }
}

impl std::error::Error for ChatError {}

/// A persisted chat message as rendered back to callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// One user's chat session over the shared message log.
pub struct ChatSession<'a> {
    pool: &'a SqlitePool,
    index: &'a dyn VectorIndex,
    vectorizer: &'a dyn Vectorizer,
    model: &'a dyn CompletionModel,
    config: &'a Config,
    user_id: String,
}

impl<'a> ChatSession<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        index: &'a dyn VectorIndex,
        vectorizer: &'a dyn Vectorizer,
        model: &'a dyn CompletionModel,
        config: &'a Config,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            index,
            vectorizer,
            model,
            config,
            user_id: user_id.into(),
        }
    }

    /// Initialize the session: persist the system prompt and the opening
    /// assistant greeting. Transition: uninitialized → active.
    pub async fn start(&self) -> Result<ChatMessage, ChatError> {
        let name = db::user_name(self.pool, &self.user_id)
            .await
            .map_err(ChatError::Store)?
            .ok_or_else(|| ChatError::UnknownUser(self.user_id.clone()))?;

        let prompt = SYSTEM_PROMPT_TEMPLATE
            .replace("{user_name}", &name)
            .replace(
                "{current_date}",
                &chrono::Utc::now().format("%Y-%m-%d").to_string(),
            );

        self.add_message(Role::System, &prompt).await?;
        let turns = self.load_turns().await?;

        let completion = self
            .model
            .complete(&turns)
            .await
            .map_err(ChatError::Completion)?;

        self.add_message(Role::Assistant, &completion).await
    }

    /// Run one retrieval-augmented exchange and return the assistant reply.
    pub async fn send(&self, user_message: &str) -> Result<ChatMessage, ChatError> {
        if user_message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.add_message(Role::User, user_message).await?;
        let mut turns = self.load_turns().await?;

        let query = self.rewrite_query(user_message).await;
        let filter = PassageFilter::for_user(&self.user_id);
        let hits = search::retrieve(
            self.index,
            self.vectorizer,
            self.config,
            &query,
            self.config.retrieval.k,
            Some(&filter),
        )
        .await;

        if hits.is_empty() {
            tracing::warn!("no relevant passages for query: {query}");
        }

        let context: Vec<String> = hits
            .iter()
            .filter(|hit| !hit.payload.excerpt.is_empty())
            .enumerate()
            .map(|(i, hit)| {
                format!(
                    "[{}] title: {} content: {}",
                    i + 1,
                    hit.payload.title,
                    hit.payload.excerpt
                )
            })
            .collect();

        // Fold the context into the prevailing system turn, in the
        // in-memory copy only; the persisted row stays as written.
        if !context.is_empty() {
            if let Some(pos) = turns.iter().rposition(|t| t.role == Role::System) {
                turns[pos].content = format!("{}{}\n", turns[pos].content, context.join("\n"));
            }
        }

        tracing::debug!(
            user_message,
            rewritten_query = %query,
            context_count = context.len(),
            history_len = turns.len(),
            "sending chat completion"
        );

        let deadline = Duration::from_secs(self.config.completion.timeout_secs);
        let completion = match tokio::time::timeout(deadline, self.model.complete(&turns)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(ChatError::Completion(e)),
            Err(_) => {
                tracing::error!("completion call exceeded {}s deadline", deadline.as_secs());
                return Err(ChatError::Timeout);
            }
        };

        self.add_message(Role::Assistant, &completion).await
    }

    /// The user's conversation as rendered back to callers: user and
    /// assistant turns only, oldest first.
    pub async fn history(&self) -> Result<Vec<ChatMessage>, ChatError> {
        let rows = sqlx::query(
            r#"
            SELECT id, role, content, created_at, updated_at
            FROM chat_messages
            WHERE user_id = ? AND role IN ('user', 'assistant')
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(&self.user_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| ChatError::Store(e.into()))?;

        rows.into_iter()
            .map(|row| {
                let role: String = row.get("role");
                Ok(ChatMessage {
                    id: row.get("id"),
                    role: role.parse().map_err(ChatError::Store)?,
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }

    /// Rewrite a conversational message into a retrieval query. Failures
    /// and timeouts degrade to the raw message: retrieval quality suffers
    /// but the turn proceeds.
    async fn rewrite_query(&self, user_message: &str) -> String {
        let turns = vec![
            ChatTurn::new(Role::System, QUERY_REWRITE_PROMPT),
            ChatTurn::new(Role::User, user_message),
        ];
        let deadline = Duration::from_secs(self.config.completion.timeout_secs);
        match tokio::time::timeout(deadline, self.model.complete(&turns)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(Ok(_)) => user_message.to_string(),
            Ok(Err(e)) => {
                tracing::warn!("query rewrite failed, using raw message: {e}");
                user_message.to_string()
            }
            Err(_) => {
                tracing::warn!("query rewrite timed out, using raw message");
                user_message.to_string()
            }
        }
    }

    async fn add_message(&self, role: Role, content: &str) -> Result<ChatMessage, ChatError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, user_id, role, content, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&self.user_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| ChatError::Store(e.into()))?;

        Ok(ChatMessage {
            id,
            role,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Full ordered history across all roles, as completion input.
    async fn load_turns(&self) -> Result<Vec<ChatTurn>, ChatError> {
        let rows = sqlx::query(
            r#"
            SELECT role, content
            FROM chat_messages
            WHERE user_id = ?
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(&self.user_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| ChatError::Store(e.into()))?;

        rows.into_iter()
            .map(|row| {
                let role: String = row.get("role");
                let role: Role = role.parse().map_err(ChatError::Store)?;
                Ok(ChatTurn::new(role, row.get::<String, _>("content")))
            })
            .collect()
    }
}
