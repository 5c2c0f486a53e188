//! Content graph entities shared by the sender and the receiver.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Post type that carries media files and gets an [`Attachment`] descriptor.
pub const ATTACHMENT_POST_TYPE: &str = "attachment";

/// Only this taxonomy is climbed when resolving ancestor term-taxonomies.
pub const HIERARCHICAL_TAXONOMY: &str = "category";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub guid: String,
    pub post_type: String,
    pub parent: i64,
    /// GUID of the parent post, the only parent reference that is meaningful
    /// on the receiving store.
    #[serde(default)]
    pub parent_guid: Option<String>,
    pub author: i64,
    pub title: String,
    pub content: String,
    pub status: String,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub meta: Vec<Postmeta>,
    #[serde(default)]
    pub taxonomies: Vec<TaxonomyRelationship>,
}

impl Post {
    pub fn has_parent(&self) -> bool {
        self.parent > 0
    }

    pub fn is_attachment(&self) -> bool {
        self.post_type == ATTACHMENT_POST_TYPE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Postmeta {
    pub id: i64,
    pub post_id: i64,
    pub key: String,
    pub value: String,
}

/// A post's membership in a term-taxonomy, as carried on the post itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxonomyRelationship {
    pub term_taxonomy_id: i64,
    pub order: i64,
}

/// Raw relationship row as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermRelationship {
    pub object_id: i64,
    pub term_taxonomy_id: i64,
    pub term_order: i64,
}

/// Compared and hashed by full value; two rows sharing an ID but differing
/// elsewhere are distinct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TermTaxonomy {
    pub id: i64,
    pub term_id: i64,
    pub taxonomy: String,
    pub description: String,
    pub parent: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Term {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub group: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub nicename: String,
    pub email: String,
    pub display_name: String,
}

/// Media directory plus every URL variant (full size first).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub path: String,
    pub sizes: Vec<String>,
}

/// Raw attachment metadata as returned by an
/// [`AttachmentSource`](crate::store::AttachmentSource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMeta {
    /// File path relative to the uploads root, e.g. `2014/05/photo.jpg`.
    pub file: String,
    /// URL of the full-size file.
    pub url: String,
    /// Registered size name to URL.
    pub sizes: Vec<(String, String)>,
}

/// A GUID-identified unit of content transferred between stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    /// Local row ID in whichever store holds this batch. Never transmitted.
    #[serde(skip)]
    pub id: Option<i64>,
    pub guid: String,
    pub title: String,
    pub creator_id: i64,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub term_taxonomies: Vec<TermTaxonomy>,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Batch {
    /// Empty batch with a freshly minted GUID.
    pub fn new(title: impl Into<String>, creator_id: i64) -> Self {
        Self {
            id: None,
            guid: Uuid::new_v4().to_string(),
            title: title.into(),
            creator_id,
            modified: Utc::now(),
            posts: Vec::new(),
            term_taxonomies: Vec::new(),
            terms: Vec::new(),
            users: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Empty batch carrying the identity of a stored row.
    pub fn from_record(record: &BatchRecord) -> Self {
        Self {
            id: Some(record.id),
            guid: record.guid.clone(),
            title: record.title.clone(),
            creator_id: record.creator_id,
            modified: record.modified,
            posts: Vec::new(),
            term_taxonomies: Vec::new(),
            terms: Vec::new(),
            users: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn contains_post(&self, post_id: i64) -> bool {
        self.posts.iter().any(|p| p.id == post_id)
    }

    pub fn post_ids(&self) -> Vec<i64> {
        self.posts.iter().map(|p| p.id).collect()
    }

    /// Distinct author IDs across all posts, ascending.
    pub fn author_ids(&self) -> Vec<i64> {
        self.posts
            .iter()
            .map(|p| p.author)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// A stored batch row. `content` is opaque: the root post ID list on the
/// sender, the encoded envelope on the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    pub id: i64,
    pub guid: String,
    pub title: String,
    pub creator_id: i64,
    pub content: String,
    pub modified: DateTime<Utc>,
}
