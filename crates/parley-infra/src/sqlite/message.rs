//! SQLite message ledger.
//!
//! Appends run in one writer transaction: check the conversation, read the
//! last `(seq, created_at)`, insert the next position. The single writer
//! connection serializes these transactions, so positions never collide.
//!
//! The only in-place write is settling a failed reply, a conditional update
//! on `status`.

use chrono::{DateTime, Duration, Utc};
use parley_core::repository::message::MessageRepository;
use parley_types::chat::{ChatMessage, ConversationId, MessageRole, MessageStatus, NewMessage};
use parley_types::error::RepositoryError;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{
    format_datetime, is_unique_violation, now_micros, page_bounds, parse_datetime, query_err,
};

#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn conversation_exists(&self, id: &ConversationId) -> Result<bool, RepositoryError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM conversations WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;
        Ok(row.is_some())
    }

    async fn fetch_one(
        &self,
        sql: &str,
        binds: &[&str],
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let row = query
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.map(|row| MessageRow::from_row(&row).map_err(query_err)?.into_message())
            .transpose()
    }
}

struct MessageRow {
    id: String,
    conversation_id: String,
    seq: i64,
    role: String,
    content: String,
    status: String,
    created_at: String,
    request_id: Option<String>,
    reply_to: Option<String>,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            seq: row.try_get("seq")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            request_id: row.try_get("request_id")?,
            reply_to: row.try_get("reply_to")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let conversation_id: ConversationId = self
            .conversation_id
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let role: MessageRole = self.role.parse().map_err(|e: String| RepositoryError::Query(e))?;
        let status: MessageStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let reply_to = self
            .reply_to
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid reply_to: {e}")))?;

        Ok(ChatMessage {
            id,
            conversation_id,
            seq: self.seq as u64,
            role,
            content: self.content,
            status,
            created_at: parse_datetime(&self.created_at)?,
            request_id: self.request_id,
            reply_to,
        })
    }
}

/// Next `(seq, created_at)` after the conversation's last message.
fn next_position(
    last: Option<(i64, DateTime<Utc>)>,
    now: DateTime<Utc>,
) -> (i64, DateTime<Utc>) {
    match last {
        Some((seq, at)) if now <= at => (seq + 1, at + Duration::microseconds(1)),
        Some((seq, _)) => (seq + 1, now),
        None => (1, now),
    }
}

impl MessageRepository for SqliteMessageRepository {
    async fn append_message(&self, message: &NewMessage) -> Result<ChatMessage, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM conversations WHERE id = ?")
            .bind(message.conversation_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let last: Option<(i64, String)> = sqlx::query_as(
            "SELECT seq, created_at FROM messages WHERE conversation_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(message.conversation_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?;
        let last = match last {
            Some((seq, at)) => Some((seq, parse_datetime(&at)?)),
            None => None,
        };
        let (seq, created_at) = next_position(last, now_micros());
        let id = Uuid::now_v7();

        sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, seq, role, content, status, created_at, request_id, reply_to)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(message.conversation_id.as_str())
        .bind(seq)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(message.status.to_string())
        .bind(format_datetime(&created_at))
        .bind(&message.request_id)
        .bind(message.reply_to.map(|r| r.to_string()))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(
                    "request id already used or message already answered".to_string(),
                )
            } else {
                query_err(e)
            }
        })?;

        tx.commit().await.map_err(query_err)?;
        debug!(conversation_id = %message.conversation_id, seq, "message row inserted");

        Ok(ChatMessage {
            id,
            conversation_id: message.conversation_id.clone(),
            seq: seq as u64,
            role: message.role,
            content: message.content.clone(),
            status: message.status,
            created_at,
            request_id: message.request_id.clone(),
            reply_to: message.reply_to,
        })
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        if !self.conversation_exists(conversation_id).await? {
            return Err(RepositoryError::NotFound);
        }

        let (limit, offset) = page_bounds(limit, offset);
        let rows = sqlx::query(
            r#"SELECT * FROM messages
               WHERE conversation_id = ?
               ORDER BY seq ASC
               LIMIT ? OFFSET ?"#,
        )
        .bind(conversation_id.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row = MessageRow::from_row(row).map_err(query_err)?;
            messages.push(message_row.into_message()?);
        }
        Ok(messages)
    }

    async fn find_by_request_id(
        &self,
        conversation_id: &ConversationId,
        request_id: &str,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        self.fetch_one(
            "SELECT * FROM messages WHERE conversation_id = ? AND request_id = ?",
            &[conversation_id.as_str(), request_id],
        )
        .await
    }

    async fn find_reply(
        &self,
        conversation_id: &ConversationId,
        user_message_id: &Uuid,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let id = user_message_id.to_string();
        self.fetch_one(
            "SELECT * FROM messages WHERE conversation_id = ? AND reply_to = ? AND role = 'assistant'",
            &[conversation_id.as_str(), id.as_str()],
        )
        .await
    }

    async fn settle_reply(
        &self,
        conversation_id: &ConversationId,
        reply_id: &Uuid,
        content: &str,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let id = reply_id.to_string();
        let result = sqlx::query(
            r#"UPDATE messages SET status = 'completed', content = ?
               WHERE id = ? AND conversation_id = ? AND role = 'assistant' AND status <> 'completed'"#,
        )
        .bind(content)
        .bind(&id)
        .bind(conversation_id.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        debug!(conversation_id = %conversation_id, message_id = %id, "reply settled");
        self.fetch_one("SELECT * FROM messages WHERE id = ?", &[id.as_str()])
            .await
    }

    async fn count_messages(&self) -> Result<u64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        Ok(count as u64)
    }
}
