//! LINE Messaging API support for the bridge.
//!
//! - `signature`: `x-line-signature` HMAC verification over the raw body
//! - `webhook`: inbound webhook wire types
//! - `line`: REST client for profile lookup and push messages
//! - `mock`: recording messaging client used by tests

pub mod line;
pub mod mock;
pub mod signature;
pub mod webhook;

pub use line::LineClient;
pub use mock::MockMessaging;
pub use signature::{sign, verify_signature, SIGNATURE_HEADER};
pub use webhook::{LineEvent, LineMessage, LineSource, LineWebhook};
