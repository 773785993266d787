use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use super::check_response;
use crate::notifications::NotificationError;

/// Posts JSON bodies to webhook URLs.
#[derive(Clone)]
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new(timeout: Duration) -> Result<Self, NotificationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn send(&self, url: &str, payload: &Value) -> Result<(), NotificationError> {
        let response = self.client.post(url).json(payload).send().await?;
        check_response(response).await
    }
}
