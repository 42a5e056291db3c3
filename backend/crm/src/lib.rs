//! Kommo CRM side of the bridge.
//!
//! - `kommo`: REST client implementing [`CrmApi`](linebridge_core::CrmApi)
//! - `token`: bearer token providers (static and OAuth client-credentials)
//! - `identity`: mapping between LINE ids and CRM contacts
//! - `sync`: resolve-or-create for contacts and open leads
//! - `mock`: in-memory CRM used by tests

pub mod identity;
pub mod kommo;
pub mod mock;
pub mod sync;
pub mod token;

pub use kommo::KommoClient;
pub use mock::{CrmCall, MockCrm};
pub use sync::{
    lead_name, note_text, resolve_or_create_contact, resolve_or_create_lead, ContactOutcome,
    LeadOutcome, NOTE_PREFIX,
};
pub use token::{OAuthTokenProvider, StaticTokenProvider};
