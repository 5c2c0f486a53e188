//! Receiver-side upsert of incoming batches, keyed by GUID.
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, instrument};

use crate::envelope;
use crate::import_job::{ImportLauncher, LaunchOutcome};
use crate::model::{Batch, BatchRecord};
use crate::store::BatchStore;

/// One async mutex per GUID currently being received. Entries are dropped
/// once no receive holds them.
#[derive(Default)]
struct GuidLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GuidLocks {
    fn acquire(&self, guid: &str) -> GuidLease<'_> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = map.entry(guid.to_string()).or_default().clone();
        GuidLease {
            locks: self,
            guid: guid.to_string(),
            handle,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Share of a GUID's mutex. Released on drop, including when the owning
/// future is cancelled while waiting.
struct GuidLease<'a> {
    locks: &'a GuidLocks,
    guid: String,
    handle: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for GuidLease<'_> {
    fn drop(&mut self) {
        let mut map = self
            .locks
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Release this share while the map is locked.
        drop(std::mem::take(&mut self.handle));
        if map.get(&self.guid).is_some_and(|h| Arc::strong_count(h) == 1) {
            map.remove(&self.guid);
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn BatchStore>,
    launcher: Arc<dyn ImportLauncher>,
    locks: GuidLocks,
}

impl Reconciler {
    pub fn new(store: Arc<dyn BatchStore>, launcher: Arc<dyn ImportLauncher>) -> Self {
        Self {
            store,
            launcher,
            locks: GuidLocks::default(),
        }
    }

    /// Store `batch` under its GUID and hand it to the Import Job. Returns the
    /// local batch ID, which stays the same across repeated receives.
    #[instrument(skip_all, fields(guid = %batch.guid))]
    pub async fn receive(&self, batch: &Batch) -> Result<i64> {
        let lease = self.locks.acquire(&batch.guid);
        let stored = {
            let _guard = lease.handle.lock().await;
            self.upsert(batch).await
        };
        drop(lease);
        let batch_id = stored?;

        match self.launcher.launch(batch_id) {
            LaunchOutcome::Started { pid } => {
                info!(batch_id, ?pid, "import job started");
            }
            LaunchOutcome::Failed(reason) => {
                error!(batch_id, %reason, "failed to start import job");
            }
        }
        Ok(batch_id)
    }

    async fn upsert(&self, batch: &Batch) -> Result<i64> {
        let content = envelope::encode(batch).context("failed to encode batch")?;
        let existing = self.store.get_batch_by_guid(&batch.guid).await?;
        let mut record = BatchRecord {
            id: 0,
            guid: batch.guid.clone(),
            title: batch.title.clone(),
            creator_id: batch.creator_id,
            content,
            modified: Utc::now(),
        };

        match existing {
            Some(existing) => {
                record.id = existing.id;
                self.store.update_batch(&record).await?;
                info!(batch_id = record.id, "updated existing batch");
                Ok(record.id)
            }
            None => {
                let id = self.store.insert_batch(&record).await?;
                info!(batch_id = id, "stored new batch");
                Ok(id)
            }
        }
    }
}
