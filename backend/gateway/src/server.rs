//! Gateway HTTP server: shared state, routing, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    http::{header::HeaderName, HeaderValue},
    routing::{any, get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, instrument};

use linebridge_config::BridgeConfig;
use linebridge_core::{CrmApi, MessagingApi};

use crate::dedupe::RecentEvents;
use crate::locks::IdentityLocks;
use crate::tasks::BackgroundTasks;
use crate::{health_api, kommo_webhook, line_webhook};

/// Alternate path for the Kommo webhook, kept for older widget installs.
pub const CRM_WEBHOOK_ALIAS: &str = "/crm/webhook";

/// The subset of configuration the handlers read.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub channel_secret: Option<String>,
    pub line_webhook_path: String,
    pub kommo_webhook_path: String,
    pub lead_name_max_chars: usize,
    pub pipeline_id: Option<u64>,
    pub dedupe_window: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            channel_secret: config.line.channel_secret.clone(),
            line_webhook_path: config.line.webhook_path.clone(),
            kommo_webhook_path: config.kommo.webhook_path.clone(),
            lead_name_max_chars: config.relay.lead_name_max_chars,
            pipeline_id: config.kommo.pipeline_id,
            dedupe_window: Duration::from_secs(config.relay.dedupe_window_secs),
        }
    }
}

/// Application state shared across routes.
pub struct GatewayState {
    pub settings: RelaySettings,
    /// `None` when Kommo is not configured.
    pub crm: Option<Arc<dyn CrmApi>>,
    pub messaging: Arc<dyn MessagingApi>,
    pub tasks: BackgroundTasks,
    pub locks: IdentityLocks,
    pub recent_events: RecentEvents,
}

impl GatewayState {
    pub fn new(
        settings: RelaySettings,
        crm: Option<Arc<dyn CrmApi>>,
        messaging: Arc<dyn MessagingApi>,
    ) -> Self {
        let recent_events = RecentEvents::new(settings.dedupe_window);
        Self {
            settings,
            crm,
            messaging,
            tasks: BackgroundTasks::new(),
            locks: IdentityLocks::new(),
            recent_events,
        }
    }
}

/// Every response from the Kommo route carries permissive CORS headers,
/// since the webhook may be called from a widget running in the browser.
fn kommo_routes(state: &GatewayState) -> Router<Arc<GatewayState>> {
    let path = state.settings.kommo_webhook_path.as_str();
    let mut router = Router::new().route(path, any(kommo_webhook::handle_kommo_webhook));
    if path != CRM_WEBHOOK_ALIAS && state.settings.line_webhook_path != CRM_WEBHOOK_ALIAS {
        router = router.route(CRM_WEBHOOK_ALIAS, any(kommo_webhook::handle_kommo_webhook));
    }

    let cors = [
        ("access-control-allow-origin", "*"),
        ("access-control-allow-methods", "GET,POST,OPTIONS"),
        ("access-control-allow-headers", "*"),
    ];
    for (name, value) in cors {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }
    router
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/status", get(health_api::get_status))
        .route(
            &state.settings.line_webhook_path,
            post(line_webhook::handle_line_webhook),
        )
        .merge(kommo_routes(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM, then wait for background work to finish.
#[instrument(skip(state))]
pub async fn start_server(addr: &str, state: Arc<GatewayState>) -> Result<()> {
    let app = build_router(state.clone());
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        line = %state.settings.line_webhook_path,
        kommo = %state.settings.kommo_webhook_path,
        "Gateway HTTP server listening on {}",
        addr
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(pending = state.tasks.pending(), "Waiting for background tasks");
    state.tasks.drain().await;
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
