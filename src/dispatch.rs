//! Transport boundary: one request in, one result map out. Every branch
//! answers with a [`Response`]; nothing is raised past this point.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::envelope;
use crate::model::Batch;
use crate::preflight::{AssetProbe, Preflight};
use crate::reconciler::Reconciler;
use crate::store::ContentStore;

/// Body key carrying the encoded envelope.
pub const PAYLOAD_KEY: &str = "payload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Preflight,
    Send,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Preflight => "preflight",
            Action::Send => "send",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preflight" => Some(Action::Preflight),
            "send" => Some(Action::Send),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Request {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub body: Map<String, Value>,
}

impl Request {
    pub fn new(action: Action, payload: String) -> Self {
        let mut body = Map::new();
        body.insert(PAYLOAD_KEY.to_string(), Value::String(payload));
        Self {
            action: Some(action.as_str().to_string()),
            body,
        }
    }
}

/// Result map of the wire contract. Empty lists are left out when serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warning: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub info: Vec<String>,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: vec![message.into()],
            ..Default::default()
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: vec![message.into()],
            ..Default::default()
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            info: vec![message.into()],
            ..Default::default()
        }
    }
}

/// Production-side request handler.
pub struct Receiver {
    host: String,
    store: Arc<dyn ContentStore>,
    probe: Arc<dyn AssetProbe>,
    probe_concurrency: usize,
    reconciler: Reconciler,
}

impl Receiver {
    pub fn new(
        host: impl Into<String>,
        store: Arc<dyn ContentStore>,
        probe: Arc<dyn AssetProbe>,
        probe_concurrency: usize,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            host: host.into(),
            store,
            probe,
            probe_concurrency,
            reconciler,
        }
    }

    #[instrument(skip_all, fields(action = request.action.as_deref().unwrap_or("")))]
    pub async fn handle(&self, request: &Request) -> Response {
        let Some(raw) = request.action.as_deref() else {
            warn!("request without action");
            return Response::error(format!("{}: No action provided!", self.host));
        };
        let Some(action) = Action::parse(raw) else {
            warn!(action = raw, "unknown action");
            return Response::error(format!("{}: Invalid action provided!", self.host));
        };

        let batch = match decode_body(&request.body) {
            Ok(batch) => batch,
            Err(reason) => {
                warn!(%reason, "rejected malformed payload");
                return Response::error(format!(
                    "{}: Malformed batch payload: {}",
                    self.host, reason
                ));
            }
        };

        match action {
            Action::Preflight => self.preflight(&batch).await,
            Action::Send => self.send(&batch).await,
        }
    }

    async fn preflight(&self, batch: &Batch) -> Response {
        let checker = Preflight::new(
            self.store.as_ref(),
            self.probe.as_ref(),
            self.probe_concurrency,
        );
        match checker.validate(batch).await {
            Ok(report) if report.is_clean() => Response::success("Pre-flight successful!"),
            Ok(report) => Response {
                error: report.errors,
                warning: report.warnings,
                ..Default::default()
            },
            Err(err) => {
                error!(?err, "preflight failed");
                Response::error(format!("{}: Pre-flight failed: {:#}", self.host, err))
            }
        }
    }

    async fn send(&self, batch: &Batch) -> Response {
        match self.reconciler.receive(batch).await {
            Ok(batch_id) => {
                info!(batch_id, "batch received");
                Response::info(format!(
                    "Batch has been successfully sent! Batch ID: {batch_id}"
                ))
            }
            Err(err) => {
                error!(?err, "failed to store batch");
                Response::error(format!("{}: Failed to store batch: {:#}", self.host, err))
            }
        }
    }
}

fn decode_body(body: &Map<String, Value>) -> Result<Batch, String> {
    let payload = body
        .get(PAYLOAD_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing '{PAYLOAD_KEY}'"))?;
    envelope::decode(payload).map_err(|err| err.to_string())
}
