use super::model::{
    batch_from_row, post_from_row, postmeta_from_row, relationship_from_row, term_from_row,
    term_taxonomy_from_row, user_from_row, AttachmentDocument, ATTACHMENT_METADATA_KEY,
    BATCH_COLUMNS, POST_COLUMNS, TERM_TAXONOMY_COLUMNS,
};
use crate::model::{
    AttachmentMeta, BatchRecord, Post, Postmeta, Term, TermRelationship, TermTaxonomy, User,
};
use crate::store::{AttachmentSource, BatchStore, ContentStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// `{prefix} ({?, ?, ...}){suffix}` with one bind per ID.
fn in_list(prefix: &str, ids: &[i64], suffix: &str) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(prefix);
    qb.push(" (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");
    qb.push(suffix);
    qb
}

fn distinct(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// SQLite-backed content store. Serves both the staging side (reads plus
/// sender batch rows) and the production side (batch upserts).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
    uploads_url: String,
}

impl SqliteStore {
    pub fn new(pool: Pool, uploads_url: impl Into<String>) -> Self {
        Self {
            pool,
            uploads_url: uploads_url.into(),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    #[instrument(skip_all)]
    pub async fn count_batches(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batches")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Stamp the batch row as modified now.
    #[instrument(skip_all)]
    pub async fn touch_batch(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE batches SET modified = ? WHERE id = ?")
            .bind(chrono::Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to touch batch")?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    #[instrument(skip_all)]
    async fn get_post_by_id(&self, id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    #[instrument(skip_all)]
    async fn get_post_by_guid(&self, guid: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE guid = ?"))
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    #[instrument(skip_all)]
    async fn get_parent_guid(&self, parent_id: i64) -> Result<Option<String>> {
        if parent_id <= 0 {
            return Ok(None);
        }
        let guid = sqlx::query_scalar::<_, String>("SELECT guid FROM posts WHERE id = ?")
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(guid.filter(|g| !g.trim().is_empty()))
    }

    #[instrument(skip_all)]
    async fn bulk_get_posts_by_ids(&self, ids: &[i64]) -> Result<Vec<Post>> {
        let ids = distinct(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = in_list(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id IN"),
            &ids,
            "",
        )
        .build()
        .fetch_all(&self.pool)
        .await?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in &rows {
            let post = post_from_row(row)?;
            by_id.insert(post.id, post);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    #[instrument(skip_all)]
    async fn get_meta_by_post_id(&self, post_id: i64) -> Result<Vec<Postmeta>> {
        let rows = sqlx::query(
            "SELECT meta_id, post_id, meta_key, meta_value FROM postmeta WHERE post_id = ? ORDER BY meta_id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(postmeta_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn get_relationships_by_post_ids(
        &self,
        post_ids: &[i64],
    ) -> Result<Vec<TermRelationship>> {
        let ids = distinct(post_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = in_list(
            "SELECT object_id, term_taxonomy_id, term_order FROM term_relationships WHERE object_id IN",
            &ids,
            " ORDER BY object_id, term_order, term_taxonomy_id",
        )
        .build()
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(relationship_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn get_term_taxonomies_by_ids(&self, ids: &[i64]) -> Result<Vec<TermTaxonomy>> {
        let ids = distinct(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = in_list(
            &format!("SELECT {TERM_TAXONOMY_COLUMNS} FROM term_taxonomy WHERE term_taxonomy_id IN"),
            &ids,
            " ORDER BY term_taxonomy_id",
        )
        .build()
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(term_taxonomy_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn get_term_taxonomy_by_term_and_taxonomy(
        &self,
        term_id: i64,
        taxonomy: &str,
    ) -> Result<Option<TermTaxonomy>> {
        let row = sqlx::query(&format!(
            "SELECT {TERM_TAXONOMY_COLUMNS} FROM term_taxonomy WHERE term_id = ? AND taxonomy = ?"
        ))
        .bind(term_id)
        .bind(taxonomy)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(term_taxonomy_from_row).transpose()
    }

    #[instrument(skip_all)]
    async fn get_terms_by_ids(&self, ids: &[i64]) -> Result<Vec<Term>> {
        let ids = distinct(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = in_list(
            "SELECT term_id, name, slug, term_group FROM terms WHERE term_id IN",
            &ids,
            " ORDER BY term_id",
        )
        .build()
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(term_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn bulk_get_users(&self, ids: &[i64]) -> Result<Vec<User>> {
        let ids = distinct(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = in_list(
            "SELECT id, user_login, user_nicename, user_email, display_name FROM users WHERE id IN",
            &ids,
            " ORDER BY id",
        )
        .build()
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }
}

#[async_trait]
impl BatchStore for SqliteStore {
    #[instrument(skip_all)]
    async fn get_batch_by_id(&self, id: i64) -> Result<Option<BatchRecord>> {
        let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    #[instrument(skip_all)]
    async fn get_batch_by_guid(&self, guid: &str) -> Result<Option<BatchRecord>> {
        let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE guid = ?"))
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    /// Insert keyed by GUID. A row that appeared since the caller's lookup is
    /// overwritten in place and keeps its ID.
    #[instrument(skip_all)]
    async fn insert_batch(&self, record: &BatchRecord) -> Result<i64> {
        let rec = sqlx::query(
            "INSERT INTO batches (guid, title, creator_id, content, modified) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(guid) DO UPDATE SET title = excluded.title, creator_id = excluded.creator_id, \
             content = excluded.content, modified = excluded.modified \
             RETURNING id",
        )
        .bind(&record.guid)
        .bind(&record.title)
        .bind(record.creator_id)
        .bind(&record.content)
        .bind(record.modified)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert batch {}", record.guid))?;
        Ok(rec.get::<i64, _>("id"))
    }

    #[instrument(skip_all)]
    async fn update_batch(&self, record: &BatchRecord) -> Result<()> {
        sqlx::query(
            "UPDATE batches SET title = ?, creator_id = ?, content = ?, modified = ? WHERE id = ?",
        )
        .bind(&record.title)
        .bind(record.creator_id)
        .bind(&record.content)
        .bind(record.modified)
        .bind(record.id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update batch {}", record.id))?;
        Ok(())
    }
}

#[async_trait]
impl AttachmentSource for SqliteStore {
    #[instrument(skip_all)]
    async fn attachment_meta(&self, attachment_id: i64) -> Result<Option<AttachmentMeta>> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT meta_value FROM postmeta WHERE post_id = ? AND meta_key = ? ORDER BY meta_id LIMIT 1",
        )
        .bind(attachment_id)
        .bind(ATTACHMENT_METADATA_KEY)
        .fetch_optional(&self.pool)
        .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<AttachmentDocument>(&raw) {
            Ok(doc) => Ok(Some(doc.into_meta(&self.uploads_url))),
            Err(err) => {
                warn!(?err, attachment_id, "unreadable attachment metadata");
                Ok(None)
            }
        }
    }
}
