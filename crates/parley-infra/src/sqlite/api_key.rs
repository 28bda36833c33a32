//! API keys: the credential store behind the HTTP auth extractor.
//!
//! Keys are `parley_<64 hex>` strings. Only their SHA-256 hash is stored;
//! the plaintext is shown once at creation. A key maps to the principal
//! (email, optional name) it was issued for.

use chrono::{DateTime, Utc};
use parley_types::error::RepositoryError;
use parley_types::identity::{Principal, normalize_email};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_err};

pub const KEY_PREFIX: &str = "parley_";

/// A freshly issued key. `plaintext` is never stored.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub id: Uuid,
    pub plaintext: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SqliteApiKeyRepository {
    pool: DatabasePool,
}

impl SqliteApiKeyRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Issue a new key for `email`.
    pub async fn create_key(&self, email: &str, name: &str) -> Result<IssuedApiKey, RepositoryError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(RepositoryError::Query("email must not be empty".to_string()));
        }

        let issued = IssuedApiKey {
            id: Uuid::now_v7(),
            plaintext: generate_api_key(),
            email,
            name: name.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO api_keys (id, key_hash, email, name, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(issued.id.to_string())
        .bind(hash_api_key(&issued.plaintext))
        .bind(&issued.email)
        .bind(&issued.name)
        .bind(format_datetime(&issued.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(issued)
    }

    /// The principal a plaintext key was issued for, if the key is known.
    ///
    /// Bumps `last_used_at` on a best-effort basis.
    pub async fn principal_for_key(&self, plaintext: &str) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query("SELECT id, email, name FROM api_keys WHERE key_hash = ?")
            .bind(hash_api_key(plaintext))
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.try_get("id").map_err(query_err)?;
        let email: String = row.try_get("email").map_err(query_err)?;
        let name: String = row.try_get("name").map_err(query_err)?;

        if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(&id)
            .execute(&self.pool.writer)
            .await
        {
            tracing::debug!(error = %e, "could not record api key use");
        }

        let principal = Principal::new(email);
        Ok(Some(if name.trim().is_empty() {
            principal
        } else {
            principal.with_display_name(name)
        }))
    }

    pub async fn count_keys(&self) -> Result<u64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        Ok(count as u64)
    }

    /// When the key with this id was last presented.
    pub async fn last_used_at(&self, id: &Uuid) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT last_used_at FROM api_keys WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(query_err)?;
        row.and_then(|(at,)| at).as_deref().map(parse_datetime).transpose()
    }
}

/// SHA-256 of an API key, lowercase hex.
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)
}

/// A new random key: prefix plus 32 random bytes in hex.
pub fn generate_api_key() -> String {
    let mut rng = rand::rng();
    let mut key_bytes = [0u8; 32];
    rng.fill(&mut key_bytes[..]);
    format!(
        "{KEY_PREFIX}{}",
        key_bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
    )
}
