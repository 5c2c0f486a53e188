//! Batch graph assembly: expand a set of root posts into everything the
//! receiver needs to rebuild them without another round trip.
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::model::{Attachment, AttachmentMeta, Batch, Post, Postmeta};
use crate::store::{AttachmentSource, ContentStore};
use crate::taxonomy::TaxonomyResolver;

/// Transform applied to the caller's root post IDs before resolution.
pub type RootFilter = Arc<dyn Fn(Vec<i64>) -> Vec<i64> + Send + Sync>;

/// Extension points of the assembler, fixed at construction time.
#[derive(Clone)]
pub struct AssemblerConfig {
    /// Meta keys whose values are IDs of other posts to pull into the batch.
    pub relation_keys: HashSet<String>,
    pub root_filter: RootFilter,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            relation_keys: HashSet::new(),
            root_filter: Arc::new(|ids| ids),
        }
    }
}

impl fmt::Debug for AssemblerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblerConfig")
            .field("relation_keys", &self.relation_keys)
            .finish_non_exhaustive()
    }
}

impl AssemblerConfig {
    pub fn with_relation_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relation_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_root_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Vec<i64>) -> Vec<i64> + Send + Sync + 'static,
    {
        self.root_filter = Arc::new(filter);
        self
    }
}

/// Posts and attachments collected during one assembly.
#[derive(Default)]
struct Accumulator {
    included: HashSet<i64>,
    posts: Vec<Post>,
    attachments: Vec<Attachment>,
}

pub struct Assembler<'a> {
    store: &'a dyn ContentStore,
    attachments: &'a dyn AttachmentSource,
    config: AssemblerConfig,
}

impl<'a> Assembler<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        attachments: &'a dyn AttachmentSource,
        config: AssemblerConfig,
    ) -> Self {
        Self {
            store,
            attachments,
            config,
        }
    }

    /// Assemble a fresh, untitled batch from `root_ids`.
    pub async fn assemble(&self, root_ids: &[i64]) -> Result<Batch> {
        let mut batch = Batch::new(String::new(), 0);
        self.populate(&mut batch, root_ids).await?;
        Ok(batch)
    }

    /// Replace the content of `batch` with the closure of `root_ids`.
    /// IDs that resolve to no post are skipped.
    #[instrument(skip_all, fields(guid = %batch.guid))]
    pub async fn populate(&self, batch: &mut Batch, root_ids: &[i64]) -> Result<()> {
        let roots = (self.config.root_filter)(root_ids.to_vec());
        let root_posts = self
            .store
            .bulk_get_posts_by_ids(&roots)
            .await
            .context("failed to load root posts")?;
        if root_posts.len() < roots.len() {
            debug!(
                requested = roots.len(),
                found = root_posts.len(),
                "some root posts were not found"
            );
        }

        let mut acc = Accumulator::default();
        for post in root_posts {
            self.include(post, &mut acc).await?;
        }

        let author_ids: Vec<i64> = acc
            .posts
            .iter()
            .map(|p| p.author)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let users = self
            .store
            .bulk_get_users(&author_ids)
            .await
            .context("failed to load authors")?;

        let closure = TaxonomyResolver::new(self.store)
            .resolve(&mut acc.posts)
            .await?;

        batch.posts = acc.posts;
        batch.attachments = acc.attachments;
        batch.users = users;
        batch.term_taxonomies = closure.term_taxonomies;
        batch.terms = closure.terms;

        info!(
            posts = batch.posts.len(),
            attachments = batch.attachments.len(),
            users = batch.users.len(),
            term_taxonomies = batch.term_taxonomies.len(),
            "assembled batch"
        );
        Ok(())
    }

    /// Add `post` and, depth-first, every related post it references.
    async fn include(&self, post: Post, acc: &mut Accumulator) -> Result<()> {
        let mut stack = vec![post];
        while let Some(mut post) = stack.pop() {
            if !acc.included.insert(post.id) {
                continue;
            }

            let meta = self
                .store
                .get_meta_by_post_id(post.id)
                .await
                .with_context(|| format!("failed to load meta of post {}", post.id))?;

            if post.is_attachment() {
                match self.attachments.attachment_meta(post.id).await? {
                    Some(media) => acc.attachments.push(attachment_descriptor(media)),
                    None => debug!(post_id = post.id, "attachment has no media metadata"),
                }
            }

            post.parent_guid = if post.has_parent() {
                self.store.get_parent_guid(post.parent).await?
            } else {
                None
            };

            let mut related = Vec::new();
            for item in &meta {
                let Some(related_id) = self.related_post_id(item) else {
                    continue;
                };
                if acc.included.contains(&related_id) {
                    continue;
                }
                match self.store.get_post_by_id(related_id).await? {
                    Some(p) => related.push(p),
                    None => debug!(
                        post_id = post.id,
                        related_id,
                        key = %item.key,
                        "related post not found"
                    ),
                }
            }

            post.meta = meta;
            acc.posts.push(post);
            // Reverse so related posts are visited in meta order.
            stack.extend(related.into_iter().rev());
        }
        Ok(())
    }

    fn related_post_id(&self, item: &Postmeta) -> Option<i64> {
        if !self.config.relation_keys.contains(&item.key) {
            return None;
        }
        match item.value.trim().parse::<i64>() {
            Ok(id) if id > 0 => Some(id),
            _ => {
                debug!(key = %item.key, value = %item.value, "relation value is not a post id");
                None
            }
        }
    }
}

fn attachment_descriptor(media: AttachmentMeta) -> Attachment {
    let path = Path::new(&media.file)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut sizes = Vec::with_capacity(media.sizes.len() + 1);
    sizes.push(media.url);
    sizes.extend(media.sizes.into_iter().map(|(_, url)| url));
    Attachment { path, sizes }
}
