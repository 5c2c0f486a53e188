//! Taxonomy closure: every term-taxonomy a set of posts belongs to, plus all
//! of their ancestors, plus the term rows they reference.
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

use crate::model::{Post, TaxonomyRelationship, Term, TermTaxonomy, HIERARCHICAL_TAXONOMY};
use crate::store::ContentStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomyClosure {
    pub term_taxonomies: Vec<TermTaxonomy>,
    pub terms: Vec<Term>,
}

pub struct TaxonomyResolver<'a> {
    store: &'a dyn ContentStore,
}

impl<'a> TaxonomyResolver<'a> {
    pub fn new(store: &'a dyn ContentStore) -> Self {
        Self { store }
    }

    /// Attach relationship pairs to `posts` and return the closed set of
    /// term-taxonomies and terms they need.
    #[instrument(skip_all, fields(posts = posts.len()))]
    pub async fn resolve(&self, posts: &mut [Post]) -> Result<TaxonomyClosure> {
        let post_ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        let relationships = self
            .store
            .get_relationships_by_post_ids(&post_ids)
            .await
            .context("failed to load term relationships")?;

        let index: HashMap<i64, usize> = posts
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i))
            .collect();

        let mut seen_tt = HashSet::new();
        let mut term_taxonomy_ids = Vec::new();
        for rel in &relationships {
            // object_id is assumed to be a post; rows for other objects have
            // no post to land on and only contribute their term-taxonomy.
            if let Some(&i) = index.get(&rel.object_id) {
                posts[i].taxonomies.push(TaxonomyRelationship {
                    term_taxonomy_id: rel.term_taxonomy_id,
                    order: rel.term_order,
                });
            }
            if seen_tt.insert(rel.term_taxonomy_id) {
                term_taxonomy_ids.push(rel.term_taxonomy_id);
            }
        }

        let base = self
            .store
            .get_term_taxonomies_by_ids(&term_taxonomy_ids)
            .await
            .context("failed to load term-taxonomies")?;
        let ancestors = self.ancestors(&base).await?;

        let term_taxonomies = dedup_by_value(base.into_iter().chain(ancestors));
        let term_ids = referenced_term_ids(&term_taxonomies);
        let terms = self
            .store
            .get_terms_by_ids(&term_ids)
            .await
            .context("failed to load terms")?;

        debug!(
            term_taxonomies = term_taxonomies.len(),
            terms = terms.len(),
            "resolved taxonomy closure"
        );
        Ok(TaxonomyClosure {
            term_taxonomies,
            terms,
        })
    }

    /// Climb parent links of every entry in `base` until a root or a lookup
    /// miss. Each term-taxonomy is climbed from at most once.
    async fn ancestors(&self, base: &[TermTaxonomy]) -> Result<Vec<TermTaxonomy>> {
        let mut visited: HashSet<i64> = base.iter().map(|tt| tt.id).collect();
        let mut found = Vec::new();

        for start in base {
            let mut parent = start.parent;
            while parent > 0 {
                let next = self
                    .store
                    .get_term_taxonomy_by_term_and_taxonomy(parent, HIERARCHICAL_TAXONOMY)
                    .await
                    .with_context(|| format!("failed to load parent term {parent}"))?;
                let Some(next) = next else {
                    debug!(term_id = parent, "parent term-taxonomy not found");
                    break;
                };
                if !visited.insert(next.id) {
                    // Already in the set; its own chain is climbed separately.
                    break;
                }
                parent = next.parent;
                found.push(next);
            }
        }
        Ok(found)
    }
}

/// Keep the first occurrence of every distinct value, preserving order.
fn dedup_by_value(items: impl IntoIterator<Item = TermTaxonomy>) -> Vec<TermTaxonomy> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|tt| seen.insert(tt.clone()))
        .collect()
}

/// Term IDs for each term-taxonomy, including its non-zero parent ID. The
/// receiver expects term rows for parents as well.
fn referenced_term_ids(term_taxonomies: &[TermTaxonomy]) -> Vec<i64> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for tt in term_taxonomies {
        for id in [tt.term_id, tt.parent] {
            if id > 0 && seen.insert(id) {
                ids.push(id);
            }
        }
    }
    ids
}
