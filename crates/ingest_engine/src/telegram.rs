use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::runtime::Runtime;
use url::Url;

use crate::notify::{ChatTransport, SendMessage, TransportError};
use crate::runtime::blocking_runtime;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram Bot API `sendMessage` over reqwest.
///
/// The endpoint embeds the bot token, so it is never logged and is stripped
/// from reqwest errors.
pub struct TelegramTransport {
    endpoint: Url,
    client: reqwest::Client,
    runtime: Runtime,
}

impl TelegramTransport {
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self, TransportError> {
        let endpoint = Url::parse(&format!(
            "{}/bot{bot_token}/sendMessage",
            api_base.trim_end_matches('/')
        ))
        .map_err(|err| TransportError::Other(format!("invalid chat api base url: {err}")))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Other(err.without_url().to_string()))?;
        let runtime = blocking_runtime().map_err(|err| TransportError::Other(err.to_string()))?;

        Ok(Self {
            endpoint,
            client,
            runtime,
        })
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json;charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl ChatTransport for TelegramTransport {
    fn post_message(&self, message: &SendMessage<'_>) -> Result<(), TransportError> {
        let body = serde_json::to_vec(message)
            .map_err(|err| TransportError::Other(format!("failed to encode message: {err}")))?;
        self.runtime.block_on(self.post(body))
    }
}
