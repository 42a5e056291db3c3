use std::sync::Mutex;

use async_trait::async_trait;

use linebridge_core::{BridgeError, ChatUserId, LineProfile, MessagingApi};

/// A messaging client that records pushes instead of sending them.
pub struct MockMessaging {
    enabled: bool,
    profile: Option<LineProfile>,
    fail_push: bool,
    pushes: Mutex<Vec<(ChatUserId, String)>>,
    profile_lookups: Mutex<Vec<ChatUserId>>,
}

impl Default for MockMessaging {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMessaging {
    pub fn new() -> Self {
        Self {
            enabled: true,
            profile: None,
            fail_push: false,
            pushes: Mutex::new(Vec::new()),
            profile_lookups: Mutex::new(Vec::new()),
        }
    }

    /// Answer every profile lookup with this display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(LineProfile {
            display_name: Some(name.into()),
            ..Default::default()
        });
        self
    }

    /// Behave like a client without an access token.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn pushes(&self) -> Vec<(ChatUserId, String)> {
        self.pushes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn profile_lookups(&self) -> Vec<ChatUserId> {
        self.profile_lookups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl MessagingApi for MockMessaging {
    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn get_profile(&self, user: &ChatUserId) -> Option<LineProfile> {
        self.profile_lookups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user.clone());
        self.profile.clone().map(|p| LineProfile {
            user_id: Some(user.to_string()),
            ..p
        })
    }

    async fn push_message(&self, to: &ChatUserId, text: &str) -> Result<(), BridgeError> {
        if !self.enabled {
            return Err(BridgeError::NotConfigured("LINE channel access token".into()));
        }
        self.pushes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to.clone(), text.to_string()));
        if self.fail_push {
            return Err(BridgeError::Http {
                service: "mock-line",
                status: 500,
                body: "push failed".into(),
            });
        }
        Ok(())
    }
}
