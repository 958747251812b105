use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{ReactionId, SessionName};

pub const IN_MEMORY_DATABASE_URL: &str = "sqlite::memory:";

/// Append-only reaction log for one presentation session.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionRecord {
    pub id: ReactionId,
    pub slide_index: u32,
    pub reaction: String,
    pub created_at: DateTime<Utc>,
}

/// Where session databases live. Every session gets its own database so
/// sessions never observe each other's reactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    InMemory,
    Directory(PathBuf),
}

impl StoreLocation {
    pub fn database_url(&self, session: &SessionName) -> String {
        match self {
            Self::InMemory => IN_MEMORY_DATABASE_URL.to_string(),
            Self::Directory(dir) => {
                let path = dir.join(format!("{session}.db"));
                format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
            }
        }
    }

    /// Whether a database for `session` already exists. In-memory stores
    /// never outlive their pool.
    pub fn has_store(&self, session: &SessionName) -> bool {
        match self {
            Self::InMemory => false,
            Self::Directory(dir) => dir.join(format!("{session}.db")).is_file(),
        }
    }

    pub async fn open(&self, session: &SessionName) -> Result<Storage> {
        let database_url = self.database_url(session);
        Storage::new(&database_url)
            .await
            .with_context(|| format!("failed to open reaction store for session '{session}'"))
    }
}

/// The two things the presentation endpoint needs from a reaction store.
#[async_trait]
pub trait ReactionLog: Send + Sync {
    async fn append_reaction(&self, slide_index: u32, reaction: &str) -> Result<ReactionRecord>;
    async fn reaction_counts(&self, slide_index: u32) -> Result<HashMap<String, u64>>;
    async fn reaction_totals(&self) -> Result<HashMap<String, u64>>;
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if database_url.starts_with(IN_MEMORY_DATABASE_URL) {
            // An in-memory database vanishes with its last connection.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(%database_url, "reaction store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn append_reaction(&self, slide_index: u32, reaction: &str) -> Result<ReactionRecord> {
        let created_at = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO slide_reactions (slide_index, reaction, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(i64::from(slide_index))
        .bind(reaction)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .context("failed to append slide reaction")?;
        Ok(ReactionRecord {
            id: ReactionId(rec.get::<i64, _>(0)),
            slide_index,
            reaction: reaction.to_string(),
            created_at,
        })
    }

    pub async fn reaction_counts(&self, slide_index: u32) -> Result<HashMap<String, u64>> {
        let rows = sqlx::query(
            "SELECT reaction, COUNT(*) FROM slide_reactions WHERE slide_index = ? GROUP BY reaction",
        )
        .bind(i64::from(slide_index))
        .fetch_all(&self.pool)
        .await
        .context("failed to count slide reactions")?;
        Ok(collect_counts(rows))
    }

    pub async fn reaction_totals(&self) -> Result<HashMap<String, u64>> {
        let rows = sqlx::query("SELECT reaction, COUNT(*) FROM slide_reactions GROUP BY reaction")
            .fetch_all(&self.pool)
            .await
            .context("failed to total slide reactions")?;
        Ok(collect_counts(rows))
    }

    pub async fn list_reactions(&self, slide_index: u32) -> Result<Vec<ReactionRecord>> {
        let rows = sqlx::query(
            "SELECT id, slide_index, reaction, created_at
             FROM slide_reactions
             WHERE slide_index = ?
             ORDER BY id ASC",
        )
        .bind(i64::from(slide_index))
        .fetch_all(&self.pool)
        .await
        .context("failed to list slide reactions")?;
        Ok(rows
            .into_iter()
            .map(|r| ReactionRecord {
                id: ReactionId(r.get::<i64, _>(0)),
                slide_index: u32::try_from(r.get::<i64, _>(1)).unwrap_or_default(),
                reaction: r.get::<String, _>(2),
                created_at: r.get::<DateTime<Utc>, _>(3),
            })
            .collect())
    }
}

#[async_trait]
impl ReactionLog for Storage {
    async fn append_reaction(&self, slide_index: u32, reaction: &str) -> Result<ReactionRecord> {
        Storage::append_reaction(self, slide_index, reaction).await
    }

    async fn reaction_counts(&self, slide_index: u32) -> Result<HashMap<String, u64>> {
        Storage::reaction_counts(self, slide_index).await
    }

    async fn reaction_totals(&self) -> Result<HashMap<String, u64>> {
        Storage::reaction_totals(self).await
    }
}

fn collect_counts(rows: Vec<sqlx::sqlite::SqliteRow>) -> HashMap<String, u64> {
    rows.into_iter()
        .map(|r| {
            let count = u64::try_from(r.get::<i64, _>(1)).unwrap_or_default();
            (r.get::<String, _>(0), count)
        })
        .collect()
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with(IN_MEMORY_DATABASE_URL) || !database_url.starts_with("sqlite:") {
        return None;
    }
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return None;
    }
    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
