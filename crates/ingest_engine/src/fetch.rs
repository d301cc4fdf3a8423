use std::time::Duration;

use futures_util::StreamExt;
use ingest_core::PageRequest;
use ingest_logging::ingest_debug;
use serde_json::Value;
use tokio::runtime::Runtime;
use url::Url;

use crate::resource::ResourceSpec;
use crate::runtime::blocking_runtime;
use crate::{FailureKind, FetchError};

const APP_TOKEN_HEADER: &str = "X-App-Token";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Fetches one page of records. Blocks until the page is in or failed.
pub trait PageFetcher {
    fn fetch_page(
        &self,
        resource: &ResourceSpec,
        request: PageRequest,
    ) -> Result<Vec<Value>, FetchError>;
}

/// Socrata fetcher over reqwest.
///
/// The application token only identifies the caller for rate limiting; it is
/// not a secret.
#[derive(Debug)]
pub struct ReqwestPageFetcher {
    base_url: Url,
    app_token: String,
    settings: FetchSettings,
    client: reqwest::Client,
    runtime: Runtime,
}

impl ReqwestPageFetcher {
    pub fn new(
        base_url: &str,
        app_token: impl Into<String>,
        settings: FetchSettings,
    ) -> Result<Self, FetchError> {
        // `Url::join` replaces the last segment unless the base ends with a slash.
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url =
            Url::parse(&base).map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        let runtime = blocking_runtime()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self {
            base_url,
            app_token: app_token.into(),
            settings,
            client,
            runtime,
        })
    }

    pub fn page_url(&self, resource: &ResourceSpec, request: PageRequest) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join(&resource.path)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(resource.query_pairs(request));
        Ok(url)
    }

    async fn fetch_records(&self, url: Url) -> Result<Vec<Value>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(APP_TOKEN_HEADER, &self.app_token)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(self.too_large(content_len));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(self.too_large(next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(other) => Err(FetchError::new(
                FailureKind::UnexpectedBody,
                format!("expected a JSON array, got {}", json_kind(&other)),
            )),
            Err(err) => Err(FetchError::new(FailureKind::UnexpectedBody, err.to_string())),
        }
    }

    fn too_large(&self, actual: u64) -> FetchError {
        FetchError::new(
            FailureKind::TooLarge {
                max_bytes: self.settings.max_bytes,
                actual: Some(actual),
            },
            "response too large",
        )
    }
}

impl PageFetcher for ReqwestPageFetcher {
    fn fetch_page(
        &self,
        resource: &ResourceSpec,
        request: PageRequest,
    ) -> Result<Vec<Value>, FetchError> {
        let url = self.page_url(resource, request)?;
        // Spaces are form-encoded as `+`; show them as `%20` like the portal does.
        ingest_debug!("GET {}", url.as_str().replace('+', "%20"));
        self.runtime.block_on(self.fetch_records(url))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
