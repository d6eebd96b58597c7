use log::{error, info, warn};

use crate::constants::IFTTT_ENDPOINT;

/// Fire-and-forget publisher for IFTTT Webhooks events
///
/// Cloning is cheap; the underlying HTTP client is shared.
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebhookPublisher {
    /// Publisher for the IFTTT Webhooks service
    ///
    /// An empty or missing key disables publishing.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_endpoint(api_key, IFTTT_ENDPOINT)
    }

    /// Publisher posting to an alternative endpoint
    pub fn with_endpoint<S: Into<String>>(api_key: Option<String>, endpoint: S) -> Self {
        WebhookPublisher {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    /// POST the event, logging the response status or any transport failure
    ///
    /// Never fails and never retries: a lost event only means a missed
    /// automation trigger.
    pub async fn publish(&self, event_name: &str) {
        info!("Sending POST request to IFTTT for event: \"{}\"", event_name);

        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                warn!("Skipping POST request to IFTTT because no API key was configured!");
                return;
            }
        };

        let url = format!(
            "{}/trigger/{}/with/key/{}",
            self.endpoint, event_name, api_key
        );
        match self.client.post(&url).send().await {
            Ok(response) => {
                info!(
                    "Received response from IFTTT with status code: {}",
                    response.status().as_u16()
                );
            }
            Err(e) => error!("Failed when sending POST request to IFTTT! Details: {}", e),
        }
    }
}
