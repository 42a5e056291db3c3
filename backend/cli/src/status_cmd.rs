//! CLI Status Command
//!
//! Queries `/status` on a running bridge.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

pub async fn run(port: u16, timeout: Duration) -> Result<()> {
    let url = format!("http://127.0.0.1:{port}/status");
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;
    match client.get(&url).send().await {
        Ok(resp) => {
            let body: Value = resp.json().await?;
            println!("\n📊 LINE/Kommo bridge status\n");
            println!("  service: {}", body["service"].as_str().unwrap_or("?"));
            println!("  version: {}", body["version"].as_str().unwrap_or("?"));
            println!("  LINE replies: {}", flag(&body["line"]));
            println!("  Kommo sync:   {}", flag(&body["kommo"]));
            println!("  background tasks: {}", body["pendingTasks"]);
            println!();
        }
        Err(_) => {
            println!("linebridge is not running on port {port}");
        }
    }
    Ok(())
}

fn flag(value: &Value) -> &'static str {
    if value.as_bool().unwrap_or(false) {
        "🟢 enabled"
    } else {
        "🟡 disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gives_up_on_a_silent_server() {
        // Accepts connections (via the backlog) but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run(port, Duration::from_millis(200)),
        )
        .await;
        assert!(matches!(outcome, Ok(Ok(()))));
        drop(listener);
    }

    #[test]
    fn flags() {
        assert_eq!(flag(&Value::Bool(true)), "🟢 enabled");
        assert_eq!(flag(&Value::Null), "🟡 disabled");
    }
}
