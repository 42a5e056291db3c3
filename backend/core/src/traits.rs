use async_trait::async_trait;

use crate::error::BridgeError;
use crate::types::{
    ChatUserId, ContactPatch, CrmContact, CrmLead, LeadQuery, LineProfile, NewContact, NewLead,
};

/// Outbound side of the messaging platform (LINE).
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Whether credentials are present. A disabled client never sends.
    fn enabled(&self) -> bool {
        true
    }

    /// Best-effort profile lookup. Failures are logged and yield `None`.
    async fn get_profile(&self, user: &ChatUserId) -> Option<LineProfile>;

    /// Push a single text message to a user, group, or room.
    async fn push_message(&self, to: &ChatUserId, text: &str) -> Result<(), BridgeError>;
}

/// The subset of the Kommo REST API the bridge relies on.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// Free-text contact search. An empty result is `Ok(vec![])`.
    async fn list_contacts(&self, query: &str, limit: u32) -> Result<Vec<CrmContact>, BridgeError>;

    async fn create_contact(&self, contact: NewContact) -> Result<CrmContact, BridgeError>;

    async fn patch_contact(&self, id: u64, patch: ContactPatch) -> Result<CrmContact, BridgeError>;

    async fn list_leads(&self, query: LeadQuery) -> Result<Vec<CrmLead>, BridgeError>;

    async fn create_lead(&self, lead: NewLead) -> Result<CrmLead, BridgeError>;

    async fn create_note(&self, lead_id: u64, text: &str) -> Result<(), BridgeError>;

    async fn get_contact(&self, id: u64) -> Result<CrmContact, BridgeError>;

    async fn get_lead(&self, id: u64, with_contacts: bool) -> Result<CrmLead, BridgeError>;
}

/// Source of a bearer token for CRM requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a token that is valid for at least the next request.
    async fn get_valid_token(&self) -> Result<String, BridgeError>;
}
