//! Transfer envelope: a versioned JSON document wrapped in base64 so it
//! survives text-only transports unchanged.
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Batch;

pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not a valid batch document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid batch: {0}")]
    Invalid(&'static str),
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    batch: &'a Batch,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    batch: Batch,
}

pub fn encode(batch: &Batch) -> Result<String, EnvelopeError> {
    let json = serde_json::to_vec(&EnvelopeRef {
        version: ENVELOPE_VERSION,
        batch,
    })?;
    Ok(general_purpose::STANDARD.encode(json))
}

/// Decode a payload into a batch. The returned batch has no local ID.
pub fn decode(payload: &str) -> Result<Batch, EnvelopeError> {
    let bytes = general_purpose::STANDARD.decode(payload.trim())?;
    let envelope: Envelope = serde_json::from_slice(&bytes)?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(envelope.version));
    }
    if envelope.batch.guid.trim().is_empty() {
        return Err(EnvelopeError::Invalid("batch guid must be non-empty"));
    }
    Ok(envelope.batch)
}
