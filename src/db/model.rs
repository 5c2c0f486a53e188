//! Row mappers and stored document shapes used by the repository.
//!
//! Keep these focused on turning rows into entities. Business logic should
//! live in higher layers.

use anyhow::Result;
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;

use crate::model::{
    AttachmentMeta, BatchRecord, Post, Postmeta, Term, TermRelationship, TermTaxonomy, User,
};

/// Postmeta key holding the JSON media document of an attachment.
pub const ATTACHMENT_METADATA_KEY: &str = "_wp_attachment_metadata";

pub const POST_COLUMNS: &str = "id, guid, post_type, post_parent, post_author, post_title, \
     post_content, post_status, post_modified";

pub const TERM_TAXONOMY_COLUMNS: &str =
    "term_taxonomy_id, term_id, taxonomy, description, parent, count";

pub const BATCH_COLUMNS: &str = "id, guid, title, creator_id, content, modified";

pub fn post_from_row(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        post_type: row.try_get("post_type")?,
        parent: row.try_get("post_parent")?,
        parent_guid: None,
        author: row.try_get("post_author")?,
        title: row.try_get("post_title")?,
        content: row.try_get("post_content")?,
        status: row.try_get("post_status")?,
        modified: row.try_get("post_modified")?,
        meta: Vec::new(),
        taxonomies: Vec::new(),
    })
}

pub fn postmeta_from_row(row: &SqliteRow) -> Result<Postmeta> {
    Ok(Postmeta {
        id: row.try_get("meta_id")?,
        post_id: row.try_get("post_id")?,
        key: row.try_get("meta_key")?,
        value: row.try_get("meta_value")?,
    })
}

pub fn relationship_from_row(row: &SqliteRow) -> Result<TermRelationship> {
    Ok(TermRelationship {
        object_id: row.try_get("object_id")?,
        term_taxonomy_id: row.try_get("term_taxonomy_id")?,
        term_order: row.try_get("term_order")?,
    })
}

pub fn term_taxonomy_from_row(row: &SqliteRow) -> Result<TermTaxonomy> {
    Ok(TermTaxonomy {
        id: row.try_get("term_taxonomy_id")?,
        term_id: row.try_get("term_id")?,
        taxonomy: row.try_get("taxonomy")?,
        description: row.try_get("description")?,
        parent: row.try_get("parent")?,
        count: row.try_get("count")?,
    })
}

pub fn term_from_row(row: &SqliteRow) -> Result<Term> {
    Ok(Term {
        id: row.try_get("term_id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        group: row.try_get("term_group")?,
    })
}

pub fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        login: row.try_get("user_login")?,
        nicename: row.try_get("user_nicename")?,
        email: row.try_get("user_email")?,
        display_name: row.try_get("display_name")?,
    })
}

pub fn batch_from_row(row: &SqliteRow) -> Result<BatchRecord> {
    Ok(BatchRecord {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        title: row.try_get("title")?,
        creator_id: row.try_get("creator_id")?,
        content: row.try_get("content")?,
        modified: row.try_get("modified")?,
    })
}

/// Stored media document, e.g.
/// `{"file":"2014/05/a.jpg","sizes":{"thumbnail":{"file":"a-150x150.jpg"}}}`.
#[derive(Debug, Deserialize)]
pub struct AttachmentDocument {
    pub file: String,
    #[serde(default)]
    pub sizes: BTreeMap<String, AttachmentSizeDocument>,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentSizeDocument {
    pub file: String,
}

impl AttachmentDocument {
    /// Resolve URLs against the uploads base URL. Size files share the main file's directory.
    pub fn into_meta(self, uploads_url: &str) -> AttachmentMeta {
        let base = uploads_url.trim_end_matches('/');
        let dir = Path::new(&self.file)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size_url = |file: &str| {
            if dir.is_empty() {
                format!("{base}/{file}")
            } else {
                format!("{base}/{dir}/{file}")
            }
        };
        let sizes = self
            .sizes
            .into_iter()
            .map(|(name, size)| {
                let url = size_url(&size.file);
                (name, url)
            })
            .collect();
        AttachmentMeta {
            url: format!("{base}/{}", self.file),
            file: self.file,
            sizes,
        }
    }
}
