//! Outbound Kommo webhook: relay operator replies back to the LINE user.
//!
//! Kommo disables webhooks that answer with an error, so every path
//! returns 200 with a JSON body, including preflight and unparseable input.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, RawQuery, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method},
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use linebridge_core::{ChatUserId, CrmApi, CrmContact};
use linebridge_crm::{identity::chat_user_id_for, NOTE_PREFIX};
use linebridge_logging::{EventLogger, RelayEvent};

use crate::extract::ReplyFields;
use crate::form::FormFields;
use crate::server::GatewayState;

/// Why a webhook produced no LINE message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoText,
    BlankText,
    /// A note the inbound side wrote, echoed back by Kommo.
    Echo,
    NoEntityId,
    CrmDisabled,
    ContactNotFound,
    NoIdentifier,
    MessagingDisabled,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NoText => "no_text",
            SkipReason::BlankText => "blank_text",
            SkipReason::Echo => "echo",
            SkipReason::NoEntityId => "no_entity_id",
            SkipReason::CrmDisabled => "crm_disabled",
            SkipReason::ContactNotFound => "contact_not_found",
            SkipReason::NoIdentifier => "no_identifier",
            SkipReason::MessagingDisabled => "messaging_disabled",
        }
    }
}

/// A reply that can be pushed.
#[derive(Debug)]
struct Recipient {
    chat_user_id: ChatUserId,
    contact_id: u64,
    text: String,
}

/// Handler for any method on `{kommo.webhookPath}` and the `/crm/webhook` alias.
pub async fn handle_kommo_webhook(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Json<Value> {
    if method == Method::OPTIONS {
        return Json(json!({ "ok": true }));
    }

    let body = body.unwrap_or_else(|e| {
        warn!("[Kommo] Could not read webhook body: {}", e);
        Bytes::new()
    });
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let fields = FormFields::parse(content_type, &body, query.as_deref());
    let reply = ReplyFields::extract(&fields);
    let delivery_id = Uuid::new_v4().to_string();

    match resolve_recipient(&state, &reply).await {
        Ok(recipient) => {
            let line_user_id = recipient.chat_user_id.to_string();
            spawn_push(&state, recipient, reply.lead_id, delivery_id);
            Json(json!({ "ok": true, "sent": true, "lineUserId": line_user_id }))
        }
        Err(reason) => {
            info!(
                reason = reason.as_str(),
                fields = fields.len(),
                contact_id = ?reply.contact_id,
                lead_id = ?reply.lead_id,
                "[Kommo] Nothing to relay"
            );
            EventLogger::log_event(
                &delivery_id,
                RelayEvent::ReplySkipped {
                    reason: reason.as_str().to_string(),
                },
            );
            Json(json!({
                "ok": true,
                "sent": false,
                "skipped": true,
                "reason": reason.as_str(),
            }))
        }
    }
}

async fn resolve_recipient(state: &GatewayState, reply: &ReplyFields) -> Result<Recipient, SkipReason> {
    let raw = reply.text.as_deref().ok_or(SkipReason::NoText)?;
    let text = raw.trim();
    if text.is_empty() {
        return Err(SkipReason::BlankText);
    }
    if text.starts_with(NOTE_PREFIX) {
        return Err(SkipReason::Echo);
    }
    if reply.contact_id.is_none() && reply.lead_id.is_none() {
        return Err(SkipReason::NoEntityId);
    }
    let crm = state.crm.as_deref().ok_or(SkipReason::CrmDisabled)?;
    let contact = find_contact(crm, reply).await.ok_or(SkipReason::ContactNotFound)?;
    let chat_user_id = chat_user_id_for(&contact).ok_or(SkipReason::NoIdentifier)?;
    if !state.messaging.enabled() {
        return Err(SkipReason::MessagingDisabled);
    }
    Ok(Recipient {
        chat_user_id,
        contact_id: contact.id,
        text: text.to_string(),
    })
}

/// Contact by id; otherwise, or when that fails, the lead's first contact.
async fn find_contact(crm: &dyn CrmApi, reply: &ReplyFields) -> Option<CrmContact> {
    if let Some(id) = reply.contact_id {
        match crm.get_contact(id).await {
            Ok(contact) => return Some(contact),
            Err(e) => warn!(contact_id = id, "[Kommo] Contact lookup failed: {}", e),
        }
    }

    let lead_id = reply.lead_id?;
    let lead = match crm.get_lead(lead_id, true).await {
        Ok(lead) => lead,
        Err(e) => {
            warn!(lead_id, "[Kommo] Lead lookup failed: {}", e);
            return None;
        }
    };
    let Some(&contact_id) = lead.contact_ids.first() else {
        warn!(lead_id, "[Kommo] Lead has no linked contact");
        return None;
    };
    match crm.get_contact(contact_id).await {
        Ok(contact) => Some(contact),
        Err(e) => {
            warn!(contact_id, "[Kommo] Contact lookup failed: {}", e);
            None
        }
    }
}

/// Push without holding up the webhook response.
fn spawn_push(state: &Arc<GatewayState>, recipient: Recipient, lead_id: Option<u64>, delivery_id: String) {
    let messaging = state.messaging.clone();
    state.tasks.spawn("line_push", async move {
        messaging
            .push_message(&recipient.chat_user_id, &recipient.text)
            .await?;
        EventLogger::log_event(
            &delivery_id,
            RelayEvent::ReplyRelayed {
                chat_user_id: recipient.chat_user_id.to_string(),
                contact_id: Some(recipient.contact_id),
                lead_id,
            },
        );
        Ok(())
    });
}
