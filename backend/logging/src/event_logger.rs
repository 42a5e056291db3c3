//! Relay Event Logger
//!
//! Structured audit events for every step of the relay, emitted through
//! `tracing` under the `relay_events` target so they land in the NDJSON log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    InboundMessage {
        chat_user_id: String,
        text: String,
    },
    ContactResolved {
        chat_user_id: String,
        contact_id: u64,
        created: bool,
    },
    LeadResolved {
        contact_id: u64,
        lead_id: u64,
        created: bool,
    },
    NoteAdded {
        lead_id: u64,
    },
    ReplyRelayed {
        chat_user_id: String,
        contact_id: Option<u64>,
        lead_id: Option<u64>,
    },
    ReplySkipped {
        reason: String,
    },
}

#[derive(Debug, Serialize)]
pub struct RelayEventEntry {
    pub delivery_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: RelayEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Build the log entry for an event, redacting free text.
    pub fn entry(delivery_id: &str, mut event: RelayEvent) -> RelayEventEntry {
        if let RelayEvent::InboundMessage { text, .. } = &mut event {
            *text = redact_sensitive_data(text);
        }
        RelayEventEntry {
            delivery_id: delivery_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }

    /// Logs a relay event under the `relay_events` target.
    pub fn log_event(delivery_id: &str, event: RelayEvent) {
        let entry = Self::entry(delivery_id, event);
        match serde_json::to_string(&entry) {
            Ok(json) => info!(target: "relay_events", event = %json, "Relay event"),
            Err(_) => info!(target: "relay_events", event = ?entry, "Relay event"),
        }
    }
}
