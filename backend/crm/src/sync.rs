//! Resolve-or-create for the CRM side of an inbound LINE message.
//!
//! Search failures are treated as "nothing found" so a flaky search never
//! stops a message from reaching the CRM; only create failures are errors.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use linebridge_core::{BridgeError, ChatUserId, ContactPatch, CrmApi, CrmContact, CrmLead, LeadQuery, NewContact, NewLead};

use crate::identity::{chat_user_id_for, contact_name, identity_tag, identity_tags, mentions, refers_to, MARKER_TAG};

/// First line of every note the bridge writes. Also used to recognise
/// those notes when Kommo echoes them back through its webhook.
pub const NOTE_PREFIX: &str = "[LINE]";

const CONTACT_SEARCH_LIMIT: u32 = 25;
const LEAD_SEARCH_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct ContactOutcome {
    pub contact: CrmContact,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct LeadOutcome {
    pub lead: CrmLead,
    pub created: bool,
}

/// Best match among search results: an exact identity match first, then an
/// unclaimed contact that merely mentions the id. A contact that already
/// belongs to another LINE id is never picked.
fn pick_contact(results: Vec<CrmContact>, id: &ChatUserId) -> Option<CrmContact> {
    if let Some(exact) = results.iter().position(|c| refers_to(c, id)) {
        return results.into_iter().nth(exact);
    }
    results
        .into_iter()
        .find(|c| mentions(c, id) && chat_user_id_for(c).is_none())
}

/// Add identity tags the contact is missing. A failed patch is logged and
/// the contact is used as it was.
async fn backfill_identity(crm: &dyn CrmApi, mut contact: CrmContact, id: &ChatUserId) -> CrmContact {
    if contact.has_tag(&identity_tag(id)) {
        return contact;
    }
    let missing: Vec<String> = identity_tags(id)
        .into_iter()
        .filter(|t| !contact.has_tag(t))
        .collect();
    let patch = ContactPatch {
        name: None,
        tags_to_add: missing.clone(),
    };
    match crm.patch_contact(contact.id, patch).await {
        Ok(_) => {
            info!(contact_id = contact.id, "[Sync] Backfilled identity tags for {}", id);
            contact.tags.extend(missing);
        }
        Err(e) => warn!(contact_id = contact.id, "[Sync] Could not backfill identity tags: {}", e),
    }
    contact
}

/// Find the contact for a LINE user, creating it when none exists.
pub async fn resolve_or_create_contact(
    crm: &dyn CrmApi,
    id: &ChatUserId,
    display_name: Option<&str>,
) -> Result<ContactOutcome, BridgeError> {
    let found = match crm.list_contacts(id.as_str(), CONTACT_SEARCH_LIMIT).await {
        Ok(results) => pick_contact(results, id),
        Err(e) => {
            warn!("[Sync] Contact search for {} failed, creating instead: {}", id, e);
            None
        }
    };

    if let Some(contact) = found {
        debug!(contact_id = contact.id, "[Sync] Found existing contact for {}", id);
        let contact = backfill_identity(crm, contact, id).await;
        return Ok(ContactOutcome {
            contact,
            created: false,
        });
    }

    let contact = crm
        .create_contact(NewContact {
            name: contact_name(display_name, id),
            tags: identity_tags(id),
        })
        .await?;
    info!(contact_id = contact.id, "[Sync] Created contact for {}", id);
    Ok(ContactOutcome {
        contact,
        created: true,
    })
}

/// Reuse the contact's newest open lead, or create one named `name`.
pub async fn resolve_or_create_lead(
    crm: &dyn CrmApi,
    contact_id: u64,
    name: &str,
    pipeline_id: Option<u64>,
) -> Result<LeadOutcome, BridgeError> {
    let query = LeadQuery {
        contact_id,
        limit: LEAD_SEARCH_LIMIT,
        newest_first: true,
    };
    let open = match crm.list_leads(query).await {
        Ok(leads) => leads.into_iter().find(CrmLead::is_open),
        Err(e) => {
            warn!(contact_id, "[Sync] Lead lookup failed, creating instead: {}", e);
            None
        }
    };

    if let Some(lead) = open {
        debug!(contact_id, lead_id = lead.id, "[Sync] Reusing open lead");
        return Ok(LeadOutcome {
            lead,
            created: false,
        });
    }

    let lead = crm
        .create_lead(NewLead {
            name: name.to_string(),
            contact_id,
            tags: vec![MARKER_TAG.to_string()],
            pipeline_id,
        })
        .await?;
    info!(contact_id, lead_id = lead.id, "[Sync] Created lead");
    Ok(LeadOutcome {
        lead,
        created: true,
    })
}

/// Lead name from the first message, else the display name, else the id.
/// Whitespace is collapsed and the result capped at `max_chars`.
pub fn lead_name(text: &str, display_name: Option<&str>, id: &ChatUserId, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let name = if !collapsed.is_empty() {
        collapsed
    } else {
        match display_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => format!("LINE {id}"),
        }
    };
    name.chars().take(max_chars.max(1)).collect()
}

/// Note body: prefix line naming the sender, the send time, then the text.
pub fn note_text(display_name: Option<&str>, id: &ChatUserId, at: DateTime<Utc>, text: &str) -> String {
    let sender = match display_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{NOTE_PREFIX} {name} ({id})"),
        None => format!("{NOTE_PREFIX} {id}"),
    };
    format!("{sender}\n{}\n\n{text}", at.to_rfc3339_opts(SecondsFormat::Secs, true))
}
