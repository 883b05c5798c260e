//! Webhook event sink
//!
//! Delivers booking events as JSON payloads via HTTP POST.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{BookingEvent, EventSink};

/// Webhook sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let parsed = url::Url::parse(&self.url).map_err(|e| format!("invalid webhook URL: {e}"))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err("webhook URL must use http or https".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// HTTP POST event sink.
pub struct WebhookSink {
    config: WebhookConfig,
    client: Client,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> anyhow::Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &BookingEvent) -> anyhow::Result<()> {
        let mut request = self.client.post(&self.config.url).json(event);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook returned status {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> BookingEvent {
        BookingEvent::AppointmentCreated {
            appointment_id: Uuid::new_v4(),
            location_id: "downtown".to_string(),
            staff_id: "alice".to_string(),
            confirmation_code: "ABCD2345".to_string(),
            starts_at: Utc::now(),
            ends_at: Utc::now(),
            service_ids: vec!["cut".to_string()],
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(WebhookConfig::new("https://example.com/hook").validate().is_ok());
        assert!(WebhookConfig::new("not a url").validate().is_err());
        assert!(WebhookConfig::new("ftp://example.com").validate().is_err());

        let zero_timeout = WebhookConfig {
            timeout_secs: 0,
            ..WebhookConfig::new("https://example.com/hook")
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[tokio::test]
    async fn test_delivery_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookSink::new(WebhookConfig::new(format!("{}/hook", server.uri()))).unwrap();
        sink.deliver(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delivery_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = WebhookSink::new(WebhookConfig::new(server.uri())).unwrap();
        assert!(sink.deliver(&event()).await.is_err());
    }
}
