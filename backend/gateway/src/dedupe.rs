//! Redelivery dedupe keyed on LINE's `webhookEventId`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Event ids seen within a sliding window.
#[derive(Clone)]
pub struct RecentEvents {
    window: Duration,
    seen: Arc<Mutex<HashMap<String, Instant>>>,
}

impl RecentEvents {
    /// A zero window disables dedupe.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record `event_id`; `false` when it was already seen inside the window.
    pub async fn first_seen(&self, event_id: &str) -> bool {
        if self.window.is_zero() {
            return true;
        }
        let now = Instant::now();
        let mut seen = self.seen.lock().await;
        seen.retain(|_, at| now.duration_since(*at) < self.window);

        if seen.contains_key(event_id) {
            debug!(event_id, "Duplicate webhook event");
            return false;
        }
        seen.insert(event_id.to_string(), now);
        true
    }
}
