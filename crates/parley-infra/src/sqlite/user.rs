//! SQLite user repository.

use parley_core::repository::InsertOutcome;
use parley_core::repository::user::UserRepository;
use parley_types::error::RepositoryError;
use parley_types::identity::{User, UserId};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_err};

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: DatabasePool,
}

impl SqliteUserRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch_by_email(
        &self,
        executor: &sqlx::SqlitePool,
        email: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(executor)
            .await
            .map_err(query_err)?;

        row.map(|row| UserRow::from_row(&row).map_err(query_err)?.into_user())
            .transpose()
    }
}

struct UserRow {
    id: String,
    email: String,
    display_name: Option<String>,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_user(self) -> Result<User, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid user id: {e}")))?;
        Ok(User {
            id: UserId::from_uuid(id),
            email: self.email,
            display_name: self.display_name,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl UserRepository for SqliteUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch_by_email(&self.pool.reader, email).await
    }

    async fn insert_if_absent(&self, user: &User) -> Result<InsertOutcome<User>, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO users (id, email, display_name, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(email) DO NOTHING"#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(format_datetime(&user.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        // Re-read on the writer so the row just written (ours or the
        // winner's) is visible.
        let stored = self
            .fetch_by_email(&self.pool.writer, &user.email)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(if result.rows_affected() == 1 {
            InsertOutcome::inserted(stored)
        } else {
            InsertOutcome::existing(stored)
        })
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        Ok(count as u64)
    }
}
