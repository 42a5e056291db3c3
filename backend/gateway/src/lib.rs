//! LINE/Kommo bridge HTTP gateway.
//!
//! - `POST /line/webhook`: inbound LINE messages become Kommo contacts, leads, and notes
//! - `ANY /kommo/webhook` (alias `/crm/webhook`): operator replies go back to LINE
//! - `GET /status`: health

pub mod dedupe;
pub mod extract;
pub mod form;
pub mod health_api;
pub mod kommo_webhook;
pub mod line_webhook;
pub mod locks;
pub mod server;
pub mod tasks;

#[cfg(test)]
mod test_support;

pub use server::{build_router, start_server, GatewayState, RelaySettings};
