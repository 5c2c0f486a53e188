//! Receiver-side dry run over a decoded batch. Reports problems an operator
//! can act on; never writes.
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::model::{Batch, Post};
use crate::store::ContentStore;

/// Checks whether a media URL is reachable.
#[async_trait]
pub trait AssetProbe: Send + Sync {
    async fn exists(&self, url: &str) -> bool;
}

/// `HEAD` probe with a per-request timeout.
#[derive(Clone)]
pub struct HttpProbe {
    http: Client,
    timeout: Duration,
}

impl fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProbe")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("content-stager/0.1")
            .no_proxy()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl AssetProbe for HttpProbe {
    async fn exists(&self, url: &str) -> bool {
        match self.http.head(url).timeout(self.timeout).send().await {
            Ok(res) => {
                debug!(url, status = %res.status(), "probed attachment");
                res.status() == StatusCode::OK
            }
            Err(err) => {
                debug!(url, ?err, "attachment probe failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PreflightReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

pub struct Preflight<'a> {
    store: &'a dyn ContentStore,
    probe: &'a dyn AssetProbe,
    concurrency: usize,
}

impl<'a> Preflight<'a> {
    pub fn new(store: &'a dyn ContentStore, probe: &'a dyn AssetProbe, concurrency: usize) -> Self {
        Self {
            store,
            probe,
            concurrency: concurrency.max(1),
        }
    }

    #[instrument(skip_all, fields(guid = %batch.guid))]
    pub async fn validate(&self, batch: &Batch) -> Result<PreflightReport> {
        let mut report = PreflightReport::default();
        let carried: HashSet<i64> = batch.posts.iter().map(|p| p.id).collect();

        for post in &batch.posts {
            if !self.parent_exists(post, &carried).await? {
                report.errors.push(format!(
                    "Post ID {} is missing its parent post (ID {}). Parent post does not exist on production and is not part of this batch",
                    post.id, post.parent
                ));
            }
        }

        let urls: Vec<&str> = batch
            .attachments
            .iter()
            .flat_map(|a| a.sizes.iter().map(String::as_str))
            .collect();
        let probe = self.probe;
        // Unordered so a slow URL only holds its own slot; order is restored after.
        let mut results: Vec<(usize, &str, bool)> = stream::iter(urls.into_iter().enumerate())
            .map(move |(index, url)| async move { (index, url, probe.exists(url).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);
        for (_, url, ok) in results {
            if !ok {
                report.warnings.push(format!(
                    "Attachment {url} is missing on content stage and will not be deployed to production."
                ));
            }
        }

        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "preflight finished"
        );
        Ok(report)
    }

    /// A post without a parent always passes. Otherwise the parent must be in
    /// this store (by GUID) or carried in the same batch (by ID).
    async fn parent_exists(&self, post: &Post, carried: &HashSet<i64>) -> Result<bool> {
        if !post.has_parent() {
            return Ok(true);
        }
        if let Some(guid) = post.parent_guid.as_deref().filter(|g| !g.is_empty()) {
            if self.store.get_post_by_guid(guid).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(carried.contains(&post.parent))
    }
}
