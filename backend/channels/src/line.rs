/// LINE Messaging API client: profile lookup and push messages.
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use linebridge_core::{BridgeError, ChatUserId, LineProfile, MessagingApi};
use linebridge_logging::truncate_for_log;

const SERVICE: &str = "line";

/// LINE rejects text messages longer than this many characters.
pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

pub struct LineClient {
    http: Client,
    base_url: String,
    access_token: Option<String>,
}

impl LineClient {
    /// `http` should carry the bridge's outbound timeout.
    pub fn new(http: Client, access_token: Option<String>) -> Self {
        Self {
            http,
            base_url: "https://api.line.me".to_string(),
            access_token: access_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Cut `text` to LINE's limit on a character boundary.
pub fn clamp_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[async_trait]
impl MessagingApi for LineClient {
    fn enabled(&self) -> bool {
        self.access_token.is_some()
    }

    async fn get_profile(&self, user: &ChatUserId) -> Option<LineProfile> {
        let Some(token) = &self.access_token else {
            warn!("[LINE] No channel access token; skipping profile lookup");
            return None;
        };
        let url = format!("{}/v2/bot/profile/{}", self.base_url, user);

        let res = match self.http.get(&url).bearer_auth(token).send().await {
            Ok(res) => res,
            Err(e) => {
                error!("[LINE] Profile request for {} failed: {}", user, e);
                return None;
            }
        };

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                body = %truncate_for_log(&body),
                "[LINE] Profile lookup for {} failed",
                user
            );
            return None;
        }

        match res.json::<LineProfile>().await {
            Ok(profile) => {
                debug!("[LINE] Fetched profile for {}", user);
                Some(profile)
            }
            Err(e) => {
                error!("[LINE] Could not decode profile for {}: {}", user, e);
                None
            }
        }
    }

    async fn push_message(&self, to: &ChatUserId, text: &str) -> Result<(), BridgeError> {
        let Some(token) = &self.access_token else {
            warn!("[LINE] No channel access token; dropping push to {}", to);
            return Err(BridgeError::NotConfigured("LINE channel access token".into()));
        };

        let body = PushRequest {
            to: to.as_str(),
            messages: [TextMessage {
                kind: "text",
                text: clamp_text(text),
            }],
        };

        let res = self
            .http
            .post(format!("{}/v2/bot/message/push", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = truncate_for_log(&res.text().await.unwrap_or_default());
            error!(status = status.as_u16(), body = %body, "[LINE] Push to {} failed", to);
            return Err(BridgeError::Http {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        info!("[LINE] Pushed message to {}", to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        let short = "hello";
        assert_eq!(clamp_text(short), short);

        let long = "あ".repeat(MAX_TEXT_CHARS + 10);
        let clamped = clamp_text(&long);
        assert_eq!(clamped.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn push_body_shape() {
        let body = PushRequest {
            to: "U123",
            messages: [TextMessage {
                kind: "text",
                text: "Thanks!",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"to": "U123", "messages": [{"type": "text", "text": "Thanks!"}]})
        );
    }

    #[tokio::test]
    async fn missing_token_disables_client() {
        let client = LineClient::new(Client::new(), Some(String::new()));
        assert!(!client.enabled());
        let user = ChatUserId::new("U1").unwrap();
        assert!(client.get_profile(&user).await.is_none());
        let err = client.push_message(&user, "hi").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn profile_and_push_reach_the_api() {
        let seen: Arc<Mutex<Vec<(String, Value)>>> = Arc::default();
        let push_seen = seen.clone();
        let router = Router::new()
            .route(
                "/v2/bot/profile/U1",
                get(|headers: HeaderMap| async move {
                    if bearer(&headers) != "Bearer tok" {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    Ok(Json(json!({"userId": "U1", "displayName": "Alice"})))
                }),
            )
            .route(
                "/v2/bot/message/push",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = push_seen.clone();
                    async move {
                        seen.lock().unwrap().push((bearer(&headers), body));
                        Json(json!({}))
                    }
                }),
            );
        let client = LineClient::new(Client::new(), Some("tok".into())).with_base_url(serve(router).await);
        let user = ChatUserId::new("U1").unwrap();

        let profile = client.get_profile(&user).await.unwrap();
        assert_eq!(profile.name(), Some("Alice"));

        client.push_message(&user, "Thanks!").await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "Bearer tok");
        assert_eq!(
            seen[0].1,
            json!({"to": "U1", "messages": [{"type": "text", "text": "Thanks!"}]})
        );
    }

    #[tokio::test]
    async fn api_failures() {
        let router = Router::new()
            .route("/v2/bot/profile/U1", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/v2/bot/message/push",
                post(|| async { (StatusCode::BAD_REQUEST, "{\"message\":\"Invalid reply\"}") }),
            );
        let client = LineClient::new(Client::new(), Some("tok".into())).with_base_url(serve(router).await);
        let user = ChatUserId::new("U1").unwrap();

        assert!(client.get_profile(&user).await.is_none());
        match client.push_message(&user, "hi").await.unwrap_err() {
            BridgeError::Http { service, status, body } => {
                assert_eq!(service, "line");
                assert_eq!(status, 400);
                assert!(body.contains("Invalid reply"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
