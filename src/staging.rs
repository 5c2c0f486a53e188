//! Sender-side batch rows: which root posts a batch holds, and turning a row
//! into an outgoing request.
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::assembler::Assembler;
use crate::dispatch::{Action, Request};
use crate::envelope;
use crate::model::{Batch, BatchRecord};
use crate::store::BatchStore;

/// Sender rows keep their root post IDs as a JSON array.
pub fn root_post_ids(content: &str) -> Result<Vec<i64>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(content).context("batch content is not a list of post ids")
}

#[instrument(skip_all)]
pub async fn create_batch(
    store: &dyn BatchStore,
    title: &str,
    creator_id: i64,
    post_ids: &[i64],
) -> Result<BatchRecord> {
    let mut record = BatchRecord {
        id: 0,
        guid: Uuid::new_v4().to_string(),
        title: title.to_string(),
        creator_id,
        content: serde_json::to_string(post_ids)?,
        modified: Utc::now(),
    };
    record.id = store.insert_batch(&record).await?;
    info!(batch_id = record.id, guid = %record.guid, posts = post_ids.len(), "created batch");
    Ok(record)
}

/// Replace the title and root posts of an existing sender row.
#[instrument(skip_all)]
pub async fn edit_batch(
    store: &dyn BatchStore,
    id: i64,
    title: Option<&str>,
    post_ids: Option<&[i64]>,
) -> Result<BatchRecord> {
    let mut record = store
        .get_batch_by_id(id)
        .await?
        .ok_or_else(|| anyhow!("batch {} not found", id))?;
    if let Some(title) = title {
        record.title = title.to_string();
    }
    if let Some(post_ids) = post_ids {
        record.content = serde_json::to_string(post_ids)?;
    }
    record.modified = Utc::now();
    store.update_batch(&record).await?;
    Ok(record)
}

/// Load a sender row. With `lazy` only the row's own fields are filled in;
/// otherwise the full content graph is assembled into it.
#[instrument(skip_all)]
pub async fn load_batch(
    store: &dyn BatchStore,
    assembler: &Assembler<'_>,
    id: i64,
    lazy: bool,
) -> Result<Option<Batch>> {
    let Some(record) = store.get_batch_by_id(id).await? else {
        return Ok(None);
    };
    let mut batch = Batch::from_record(&record);
    if !lazy {
        let roots = root_post_ids(&record.content)
            .with_context(|| format!("batch {} has unreadable content", id))?;
        assembler.populate(&mut batch, &roots).await?;
    }
    Ok(Some(batch))
}

pub fn build_request(action: Action, batch: &Batch) -> Result<Request> {
    let payload = envelope::encode(batch).context("failed to encode batch")?;
    Ok(Request::new(action, payload))
}
