//! Per-identity serialization of CRM work.
//!
//! Two messages from the same LINE user arriving together would otherwise
//! both search, both miss, and both create a contact. Holding the user's
//! lock across search-and-create makes the second one find the first's
//! contact. Scope is this process only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use linebridge_core::ChatUserId;

#[derive(Clone, Default)]
pub struct IdentityLocks {
    locks: Arc<Mutex<HashMap<ChatUserId, Arc<AsyncMutex<()>>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`'s CRM records.
    pub async fn lock(&self, id: &ChatUserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only the map references are idle.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Identities currently held or awaited (plus any not yet pruned).
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
