//! # Sync Messages
//!
//! Requests sent from a [`SyncClient`](crate::SyncClient) to a [`SyncActor`](crate::SyncActor),
//! and the inbound broker envelope they are derived from.

use crate::entity::SourceId;
use crate::error::{FrameworkError, SyncError};
use crate::outcome::{SyncOutcome, SyncStats};
use serde_json::Value;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by actors.
pub type Response<T> = oneshot::Sender<Result<T, FrameworkError>>;

/// Internal message type sent to a synchronizer actor.
#[derive(Debug)]
pub enum SyncRequest {
    /// Materialize or refresh the mirror of one source record.
    Sync {
        id: SourceId,
        respond_to: Response<SyncOutcome>,
    },
    /// Report the actor's counters.
    Stats { respond_to: Response<SyncStats> },
}

/// The inbound envelope `{ "id": ... }`.
///
/// Only the identifier is trusted; every other field is ignored and domain data is re-read from
/// the source store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMessage {
    pub id: SourceId,
}

impl SyncMessage {
    /// Extracts the source identifier from a decoded payload.
    ///
    /// Accepts a positive integer or a string of ASCII digits. Anything else (missing, `null`,
    /// zero, negative, fractional, non-numeric, or a payload that is not an object) is a
    /// [`SyncError::Validation`].
    pub fn from_payload(payload: &Value) -> Result<Self, SyncError> {
        let raw = payload
            .get("id")
            .ok_or_else(|| SyncError::Validation("missing id".into()))?;

        let id = match raw {
            Value::Number(n) => n.as_u64(),
            Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse::<u64>().ok()
            }
            _ => None,
        }
        .filter(|id| *id > 0)
        .ok_or_else(|| SyncError::Validation(format!("invalid id: {raw}")))?;

        Ok(Self { id: SourceId(id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_integer_and_digit_string() {
        assert_eq!(
            SyncMessage::from_payload(&json!({ "id": 42 })).unwrap().id,
            SourceId(42)
        );
        assert_eq!(
            SyncMessage::from_payload(&json!({ "id": "42", "extra": true }))
                .unwrap()
                .id,
            SourceId(42)
        );
    }

    #[test]
    fn rejects_unusable_ids() {
        for payload in [
            json!({}),
            json!({ "id": null }),
            json!({ "id": 0 }),
            json!({ "id": -3 }),
            json!({ "id": 1.5 }),
            json!({ "id": "abc" }),
            json!({ "id": "" }),
            json!({ "id": "-1" }),
            json!([1, 2]),
            json!("42"),
        ] {
            let err = SyncMessage::from_payload(&payload).unwrap_err();
            assert!(matches!(err, SyncError::Validation(_)), "{payload}");
        }
    }
}
