//! Persistent signature storage with SQLite.
//!
//! Append-only: records are inserted and read, never updated or deleted.
//! Several records may exist for the same user and session; lookups return
//! the most recent one.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sessionproof_auth::SignatureRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// A signature record as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSignature {
    pub id: Uuid,
    pub record: SignatureRecord,
    pub created_at: DateTime<Utc>,
}

/// Storage for server-attested signature records.
#[derive(Clone)]
pub struct SignatureStore {
    pool: SqlitePool,
}

impl SignatureStore {
    /// Open or create a database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                sqlx::Error::Configuration(format!("Failed to create db directory: {}", e).into())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::new(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signatures (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                proof TEXT NOT NULL,
                signature TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS signatures_session_id ON signatures (session_id)")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS signatures_user_id ON signatures (user_id)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Append a record.
    pub async fn insert(&self, record: &SignatureRecord) -> Result<StoredSignature, StoreError> {
        self.insert_with_id(Uuid::new_v4(), record).await
    }

    async fn insert_with_id(
        &self,
        id: Uuid,
        record: &SignatureRecord,
    ) -> Result<StoredSignature, StoreError> {
        // Stored with microsecond precision
        let created_at = Utc::now().trunc_subsecs(6);

        sqlx::query(
            r#"
            INSERT INTO signatures (id, session_id, user_id, proof, signature, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&record.session_id)
        .bind(&record.user_id)
        .bind(&record.proof)
        .bind(&record.signature)
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(StoredSignature {
            id,
            record: record.clone(),
            created_at,
        })
    }

    /// Most recent record for a session, from any user.
    pub async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<StoredSignature>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, session_id, user_id, proof, signature, created_at
            FROM signatures
            WHERE session_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_stored(&row)).transpose()
    }

    /// Most recent record for a user's session.
    pub async fn find_by_user_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<StoredSignature>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, session_id, user_id, proof, signature, created_at
            FROM signatures
            WHERE user_id = ? AND session_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_stored(&row)).transpose()
    }

    /// Round-trip a trivial query to check the database is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Number of records stored for a session.
    pub async fn count_for_session(&self, session_id: &str) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM signatures WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_stored(row: &sqlx::sqlite::SqliteRow) -> Result<StoredSignature, StoreError> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");

    Ok(StoredSignature {
        id: Uuid::parse_str(&id).map_err(|_| StoreError::Corrupt("id"))?,
        record: SignatureRecord {
            session_id: row.get("session_id"),
            user_id: row.get("user_id"),
            proof: row.get("proof"),
            signature: row.get("signature"),
        },
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| StoreError::Corrupt("created_at"))?
            .with_timezone(&Utc),
    })
}

/// Errors that can occur during signature store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("constraint violation")]
    Constraint,
    #[error("corrupt row: invalid {0}")]
    Corrupt(&'static str),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) if !matches!(db.kind(), sqlx::error::ErrorKind::Other) => {
                Self::Constraint
            }
            _ => Self::Database(error),
        }
    }
}
