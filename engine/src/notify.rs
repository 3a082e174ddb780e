use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::warn;

const HTTP_TIMEOUT_SECS: u64 = 5;

/// Fire-and-forget Slack webhook notifier for supervisor transitions.
/// Delivery failures are logged and never block the control loop.
#[derive(Clone)]
pub struct SlackNotifier {
    hook_url: String,
    http: Client,
}

impl SlackNotifier {
    pub fn new(hook_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        SlackNotifier {
            hook_url: hook_url.into(),
            http,
        }
    }

    pub async fn send(&self, text: &str) {
        let payload = json!({ "text": text });
        match self.http.post(&self.hook_url).json(&payload).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "slack hook refused notification");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(?err, "slack notification failed");
            }
        }
    }
}
