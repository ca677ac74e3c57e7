use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope for a published event: identity and time metadata around the payload.
///
/// `event_id` is a UUIDv7, so ids sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    /// Wrap `payload` with a fresh id, stamped now.
    pub fn new(payload: E) -> Self {
        Self::with_metadata(Uuid::now_v7(), Utc::now(), payload)
    }

    pub fn with_metadata(event_id: Uuid, occurred_at: DateTime<Utc>, payload: E) -> Self {
        Self {
            event_id,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
