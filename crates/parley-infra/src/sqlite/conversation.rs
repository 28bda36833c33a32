//! SQLite conversation repository.

use parley_core::repository::InsertOutcome;
use parley_core::repository::conversation::ConversationRepository;
use parley_types::chat::{Conversation, ConversationId};
use parley_types::error::RepositoryError;
use parley_types::identity::UserId;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, page_bounds, parse_datetime, query_err};

#[derive(Clone)]
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        executor: &sqlx::SqlitePool,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(executor)
            .await
            .map_err(query_err)?;

        row.map(|row| {
            ConversationRow::from_row(&row)
                .map_err(query_err)?
                .into_conversation()
        })
        .transpose()
    }
}

struct ConversationRow {
    id: String,
    owner_id: String,
    title: String,
    created_at: String,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let id: ConversationId = self
            .id
            .parse()
            .map_err(|e: String| RepositoryError::Query(format!("invalid conversation id: {e}")))?;
        let owner = Uuid::parse_str(&self.owner_id)
            .map_err(|e| RepositoryError::Query(format!("invalid owner_id: {e}")))?;
        Ok(Conversation {
            id,
            owner_id: UserId::from_uuid(owner),
            title: self.title,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl ConversationRepository for SqliteConversationRepository {
    async fn create_if_absent(
        &self,
        conversation: &Conversation,
    ) -> Result<InsertOutcome<Conversation>, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO conversations (id, owner_id, title, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(conversation.id.as_str())
        .bind(conversation.owner_id.to_string())
        .bind(&conversation.title)
        .bind(format_datetime(&conversation.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        let stored = self
            .fetch(&self.pool.writer, &conversation.id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(if result.rows_affected() == 1 {
            InsertOutcome::inserted(stored)
        } else {
            InsertOutcome::existing(stored)
        })
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        self.fetch(&self.pool.reader, id).await
    }

    async fn list_conversations(
        &self,
        owner_id: &UserId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let (limit, offset) = page_bounds(limit, offset);
        let rows = sqlx::query(
            r#"SELECT * FROM conversations
               WHERE owner_id = ?
               ORDER BY created_at DESC, id DESC
               LIMIT ? OFFSET ?"#,
        )
        .bind(owner_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in &rows {
            let conversation_row = ConversationRow::from_row(row).map_err(query_err)?;
            conversations.push(conversation_row.into_conversation()?);
        }
        Ok(conversations)
    }

    async fn count_conversations(&self) -> Result<u64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        Ok(count as u64)
    }
}
