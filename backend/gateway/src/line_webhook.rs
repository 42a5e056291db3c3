//! Inbound LINE webhook: verify, acknowledge, then sync each text message
//! into Kommo as contact, open lead, and note.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use linebridge_channels::{verify_signature, LineEvent, LineWebhook, SIGNATURE_HEADER};
use linebridge_core::CrmApi;
use linebridge_crm::{lead_name, note_text, resolve_or_create_contact, resolve_or_create_lead};
use linebridge_logging::{EventLogger, RelayEvent};

use crate::server::GatewayState;

/// Handler for `POST {line.webhookPath}`.
///
/// Answers as soon as the body is verified and parsed; CRM work runs as a
/// background task so LINE's short delivery timeout is never hit.
pub async fn handle_line_webhook(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !verify_signature(state.settings.channel_secret.as_deref(), signature, &body) {
        warn!("[LINE] Rejected webhook with invalid signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error": "invalid signature" })),
        );
    }

    let hook: LineWebhook = match serde_json::from_slice(&body) {
        Ok(hook) => hook,
        Err(e) => {
            warn!("[LINE] Unparseable webhook body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "invalid payload" })),
            );
        }
    };

    let delivery_id = Uuid::new_v4().to_string();
    info!(delivery_id = %delivery_id, events = hook.events.len(), "[LINE] Webhook received");

    if !hook.events.is_empty() {
        let task_state = state.clone();
        state.tasks.spawn("line_delivery", async move {
            process_delivery(&task_state, hook, &delivery_id).await;
            Ok(())
        });
    }

    (StatusCode::OK, Json(json!({ "ok": true })))
}

/// Events of one delivery are handled in order.
pub async fn process_delivery(state: &GatewayState, hook: LineWebhook, delivery_id: &str) {
    for event in &hook.events {
        process_event(state, event, delivery_id).await;
    }
}

async fn process_event(state: &GatewayState, event: &LineEvent, delivery_id: &str) {
    let Some(text) = event.text().filter(|t| !t.trim().is_empty()) else {
        debug!(kind = %event.kind_label(), "[LINE] Skipping non-text event");
        return;
    };
    let Some(user) = event.chat_user_id() else {
        warn!("[LINE] Text event without a source id; skipping");
        return;
    };
    if let Some(event_id) = &event.webhook_event_id {
        if !state.recent_events.first_seen(event_id).await {
            info!(event_id = %event_id, redelivery = event.is_redelivery(), "[LINE] Skipping duplicate event");
            return;
        }
    }

    EventLogger::log_event(
        delivery_id,
        RelayEvent::InboundMessage {
            chat_user_id: user.to_string(),
            text: text.to_string(),
        },
    );

    let Some(crm) = state.crm.as_deref() else {
        warn!("[LINE] Kommo is not configured; message from {} not synced", user);
        return;
    };

    // Serialize all CRM work for this user so concurrent messages share one contact.
    let _guard = state.locks.lock(&user).await;

    let profile = state.messaging.get_profile(&user).await;
    let display_name = profile.as_ref().and_then(|p| p.name());

    let contact = match resolve_or_create_contact(crm, &user, display_name).await {
        Ok(outcome) => {
            EventLogger::log_event(
                delivery_id,
                RelayEvent::ContactResolved {
                    chat_user_id: user.to_string(),
                    contact_id: outcome.contact.id,
                    created: outcome.created,
                },
            );
            outcome.contact
        }
        Err(e) => {
            error!("[LINE] Could not resolve a contact for {}: {}", user, e);
            return;
        }
    };

    let name = lead_name(text, display_name, &user, state.settings.lead_name_max_chars);
    let lead = match resolve_or_create_lead(crm, contact.id, &name, state.settings.pipeline_id).await {
        Ok(outcome) => {
            EventLogger::log_event(
                delivery_id,
                RelayEvent::LeadResolved {
                    contact_id: contact.id,
                    lead_id: outcome.lead.id,
                    created: outcome.created,
                },
            );
            outcome.lead
        }
        Err(e) => {
            error!(contact_id = contact.id, "[LINE] Could not resolve a lead: {}", e);
            return;
        }
    };

    add_note(crm, lead.id, &note_text(display_name, &user, event.sent_at(), text), delivery_id).await;
}

async fn add_note(crm: &dyn CrmApi, lead_id: u64, text: &str, delivery_id: &str) {
    match crm.create_note(lead_id, text).await {
        Ok(()) => EventLogger::log_event(delivery_id, RelayEvent::NoteAdded { lead_id }),
        Err(e) => error!(lead_id, "[LINE] Could not add note: {}", e),
    }
}
