pub mod error;
pub mod traits;
pub mod types;

pub use error::BridgeError;
pub use traits::{CrmApi, MessagingApi, TokenProvider};
pub use types::{
    ChatUserId, ContactPatch, CrmContact, CrmLead, LeadQuery, LineProfile, NewContact, NewLead,
    STATUS_LOST, STATUS_WON,
};
