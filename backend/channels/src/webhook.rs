//! LINE webhook wire types.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use linebridge_core::ChatUserId;

/// Top-level webhook delivery. `events` is required; LINE's console
/// verification request sends it empty.
#[derive(Debug, Clone, Deserialize)]
pub struct LineWebhook {
    #[serde(default)]
    pub destination: Option<String>,
    pub events: Vec<LineEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub message: Option<LineMessage>,
    #[serde(default)]
    pub source: Option<LineSource>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub webhook_event_id: Option<String>,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub delivery_context: Option<DeliveryContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSource {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    #[serde(default)]
    pub is_redelivery: bool,
}

impl LineSource {
    /// Conversation id: user id, else group id, else room id.
    pub fn chat_user_id(&self) -> Option<ChatUserId> {
        [&self.user_id, &self.group_id, &self.room_id]
            .into_iter()
            .flatten()
            .find_map(|id| ChatUserId::new(id.as_str()))
    }

    /// The individual sender, when LINE disclosed one.
    pub fn sender_id(&self) -> Option<ChatUserId> {
        self.user_id.as_deref().and_then(ChatUserId::new)
    }
}

impl LineEvent {
    /// Text of a `message` event carrying a text message; `None` otherwise.
    pub fn text(&self) -> Option<&str> {
        if self.event_type != "message" {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.kind != "text" {
            return None;
        }
        message.text.as_deref()
    }

    pub fn chat_user_id(&self) -> Option<ChatUserId> {
        self.source.as_ref().and_then(LineSource::chat_user_id)
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_context
            .as_ref()
            .map(|d| d.is_redelivery)
            .unwrap_or(false)
    }

    /// When LINE received the event, falling back to now.
    pub fn sent_at(&self) -> DateTime<Utc> {
        self.timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now)
    }

    /// Short description used in skip logs.
    pub fn kind_label(&self) -> String {
        match &self.message {
            Some(m) => format!("{}/{}", self.event_type, m.kind),
            None => self.event_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> LineWebhook {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_text_message_event() {
        let hook = parse(
            r#"{
                "destination": "Uxxxxxxxx",
                "events": [{
                    "type": "message",
                    "timestamp": 1700000000000,
                    "webhookEventId": "01HEVENT",
                    "deliveryContext": {"isRedelivery": true},
                    "replyToken": "r1",
                    "message": {"type": "text", "id": "m1", "text": "Hello"},
                    "source": {"type": "user", "userId": "U123"}
                }]
            }"#,
        );
        let ev = &hook.events[0];
        assert_eq!(ev.text(), Some("Hello"));
        assert_eq!(ev.chat_user_id().unwrap().as_str(), "U123");
        assert_eq!(ev.webhook_event_id.as_deref(), Some("01HEVENT"));
        assert!(ev.is_redelivery());
        assert_eq!(ev.sent_at().timestamp(), 1_700_000_000);
    }

    #[test]
    fn non_text_events_have_no_text() {
        let hook = parse(
            r#"{"events": [
                {"type": "message", "message": {"type": "sticker", "id": "s"}, "source": {"userId": "U1"}},
                {"type": "follow", "source": {"userId": "U1"}},
                {"type": "message", "message": {"type": "image", "id": "i"}}
            ]}"#,
        );
        assert!(hook.events.iter().all(|e| e.text().is_none()));
        assert_eq!(hook.events[0].kind_label(), "message/sticker");
        assert_eq!(hook.events[1].kind_label(), "follow");
    }

    #[test]
    fn chat_id_falls_back_to_group_then_room() {
        let src = LineSource {
            user_id: Some(String::new()),
            group_id: Some("C999".into()),
            room_id: Some("R1".into()),
            ..Default::default()
        };
        assert_eq!(src.chat_user_id().unwrap().as_str(), "C999");
        assert!(src.sender_id().is_none());

        let src = LineSource {
            room_id: Some("R1".into()),
            ..Default::default()
        };
        assert_eq!(src.chat_user_id().unwrap().as_str(), "R1");

        assert!(LineSource::default().chat_user_id().is_none());
    }

    #[test]
    fn missing_events_array_is_rejected() {
        assert!(serde_json::from_str::<LineWebhook>(r#"{"destination":"U"}"#).is_err());
        assert!(serde_json::from_str::<LineWebhook>(r#"{"events":[]}"#).is_ok());
    }
}
