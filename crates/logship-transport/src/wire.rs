//! Wire format of `POST {endpoint}/v1/logs`
//!
//! Request:
//!
//! ```json
//! {"batchId": "<uuid>", "logs": [{"handle": 17, "type": "event", ...}]}
//! ```
//!
//! Response: `2xx` with an empty body, or with per-record results:
//!
//! ```json
//! {"results": [{"handle": 17, "status": 202}, {"handle": 18, "status": 400}]}
//! ```
//!
//! A result outside `2xx` rejects that record only; it is classified like an
//! HTTP status of the whole request would be.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use logship_core::domain::{Log, RecordHandle, TransportError};
use logship_core::ports::{Batch, RecordRejection, SendResult};

/// Request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnvelope<'a> {
    pub batch_id: Uuid,
    pub logs: Vec<WireLog<'a>>,
}

/// One log inside the request body, tagged with its store handle
#[derive(Debug, Serialize)]
pub struct WireLog<'a> {
    pub handle: RecordHandle,
    #[serde(flatten)]
    pub log: &'a Log,
}

impl<'a> BatchEnvelope<'a> {
    pub fn from_batch(batch: &'a Batch) -> Self {
        Self {
            batch_id: batch.id,
            logs: batch
                .records
                .iter()
                .map(|r| WireLog {
                    handle: r.handle,
                    log: &r.log,
                })
                .collect(),
        }
    }
}

/// Response body
#[derive(Debug, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub results: Vec<RecordResult>,
}

/// Per-record status reported by the collector
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RecordResult {
    pub handle: RecordHandle,
    pub status: u16,
}

impl BatchResponse {
    /// Parses a success response body; an empty body means "all accepted"
    pub fn parse(body: &[u8]) -> Result<Self, TransportError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    /// Turns per-record results into a [`SendResult`] for `batch`.
    ///
    /// Results for handles not in the batch are ignored; records without a
    /// result count as accepted.
    pub fn into_send_result(self, batch: &Batch) -> SendResult {
        let rejections: Vec<RecordRejection> = self
            .results
            .into_iter()
            .filter(|r| !(200..300).contains(&r.status))
            .filter(|r| batch.records.iter().any(|rec| rec.handle == r.handle))
            .map(|r| RecordRejection {
                handle: r.handle,
                error: TransportError::http(r.status),
            })
            .collect();

        if rejections.is_empty() {
            SendResult::Success
        } else {
            SendResult::Partial(rejections)
        }
    }
}
