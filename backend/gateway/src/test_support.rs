use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use linebridge_channels::{sign, MockMessaging, SIGNATURE_HEADER};
use linebridge_config::BridgeConfig;
use linebridge_core::{CrmApi, MessagingApi};
use linebridge_crm::MockCrm;

use crate::server::{build_router, GatewayState, RelaySettings};

pub const SECRET: &str = "test-channel-secret";

/// A gateway wired to in-memory fakes.
pub struct Harness {
    pub state: Arc<GatewayState>,
    pub crm: Arc<MockCrm>,
    pub line: Arc<MockMessaging>,
    router: Router,
}

impl Harness {
    pub fn new(crm: MockCrm, line: MockMessaging) -> Self {
        Self::build(Some(SECRET), Some(crm), line)
    }

    pub fn without_secret(crm: MockCrm, line: MockMessaging) -> Self {
        Self::build(None, Some(crm), line)
    }

    pub fn without_crm(line: MockMessaging) -> Self {
        Self::build(Some(SECRET), None, line)
    }

    fn build(secret: Option<&str>, crm: Option<MockCrm>, line: MockMessaging) -> Self {
        let mut config = BridgeConfig::default();
        config.line.channel_secret = secret.map(str::to_string);

        let configured = crm.is_some();
        let crm = Arc::new(crm.unwrap_or_default());
        let line = Arc::new(line);
        let state = Arc::new(GatewayState::new(
            RelaySettings::from_config(&config),
            configured.then(|| crm.clone() as Arc<dyn CrmApi>),
            line.clone() as Arc<dyn MessagingApi>,
        ));
        Self {
            router: build_router(state.clone()),
            state,
            crm,
            line,
        }
    }

    /// Drive one request through the router; the body is parsed as JSON.
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    /// Wait for all detached work spawned by handlers.
    pub async fn settle(&self) {
        self.state.tasks.drain().await;
    }
}

pub fn line_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut req = Request::post("/line/webhook").header("content-type", "application/json");
    if let Some(sig) = signature {
        req = req.header(SIGNATURE_HEADER, sig);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

pub fn signed_line_request(body: &str) -> Request<Body> {
    line_request(body, Some(&sign(SECRET, body.as_bytes())))
}

pub fn kommo_request(method: &str, path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}
