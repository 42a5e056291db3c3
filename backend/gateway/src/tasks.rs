//! Detached background work.
//!
//! Webhook handlers answer before their side effects finish. Work is spawned
//! here instead of bare `tokio::spawn` so every task has an error boundary
//! and shutdown can wait for what is still running.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, error};

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    set: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` detached. Errors are logged under `name` and go nowhere else.
    pub fn spawn<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        reap(&mut set);
        set.spawn(async move {
            match fut.await {
                Ok(()) => debug!(task = name, "Background task finished"),
                Err(e) => error!(task = name, "Background task failed: {:#}", e),
            }
        });
    }

    /// Tasks still running.
    pub fn pending(&self) -> usize {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        reap(&mut set);
        set.len()
    }

    /// Wait for every outstanding task, including ones spawned while draining.
    pub async fn drain(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.set.lock().unwrap_or_else(|e| e.into_inner()));
            if set.is_empty() {
                return;
            }
            while let Some(done) = set.join_next().await {
                log_join_result(done);
            }
        }
    }
}

/// Collect tasks that already finished so the set only holds live work.
fn reap(set: &mut JoinSet<()>) {
    while let Some(done) = set.try_join_next() {
        log_join_result(done);
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Background task panicked: {}", e);
        }
    }
}
