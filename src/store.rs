//! Storage seams consumed by the protocol core.
//!
//! Lookups by ID or GUID return `None` (or an empty list) for missing rows;
//! callers routinely pass stale references and treat absence as normal. An
//! `Err` means the store itself failed.
use anyhow::Result;
use async_trait::async_trait;

use crate::model::{
    AttachmentMeta, BatchRecord, Post, Postmeta, Term, TermRelationship, TermTaxonomy, User,
};

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_post_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_post_by_guid(&self, guid: &str) -> Result<Option<Post>>;

    /// GUID of the post with the given ID, typically a parent post.
    async fn get_parent_guid(&self, parent_id: i64) -> Result<Option<String>>;

    /// Posts for the given IDs in request order; unknown IDs are skipped.
    async fn bulk_get_posts_by_ids(&self, ids: &[i64]) -> Result<Vec<Post>>;

    async fn get_meta_by_post_id(&self, post_id: i64) -> Result<Vec<Postmeta>>;

    async fn get_relationships_by_post_ids(&self, post_ids: &[i64])
        -> Result<Vec<TermRelationship>>;

    async fn get_term_taxonomies_by_ids(&self, ids: &[i64]) -> Result<Vec<TermTaxonomy>>;

    async fn get_term_taxonomy_by_term_and_taxonomy(
        &self,
        term_id: i64,
        taxonomy: &str,
    ) -> Result<Option<TermTaxonomy>>;

    async fn get_terms_by_ids(&self, ids: &[i64]) -> Result<Vec<Term>>;

    async fn bulk_get_users(&self, ids: &[i64]) -> Result<Vec<User>>;
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn get_batch_by_id(&self, id: i64) -> Result<Option<BatchRecord>>;

    async fn get_batch_by_guid(&self, guid: &str) -> Result<Option<BatchRecord>>;

    /// Insert a new row, ignoring `record.id`; returns the assigned ID.
    async fn insert_batch(&self, record: &BatchRecord) -> Result<i64>;

    /// Overwrite title, creator, content and modified time of `record.id`.
    async fn update_batch(&self, record: &BatchRecord) -> Result<()>;
}

/// Media metadata for attachment posts.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn attachment_meta(&self, attachment_id: i64) -> Result<Option<AttachmentMeta>>;
}
