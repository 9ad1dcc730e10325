use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::schema::{FieldValues, FormSchema, HttpMethod};

/// Raw outcome of a completed HTTP exchange, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Decoded JSON body. Empty bodies become `Null`, non-JSON bodies a
    /// `String` with the raw text.
    pub body: Value,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
}

/// Issues exactly one request for a form submission.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        schema: &FormSchema,
        values: &FieldValues,
    ) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport resolving relative endpoints against an API base.
pub struct HttpTransport {
    http: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        schema: &FormSchema,
        values: &FieldValues,
    ) -> Result<TransportResponse, TransportError> {
        let url = schema
            .resolve_url(&self.base_url, values)
            .map_err(|e| TransportError::InvalidEndpoint {
                endpoint: schema.endpoint.clone(),
                reason: e.to_string(),
            })?;
        debug!(form = %schema.name, method = %schema.method, %url, "sending form request");

        let request = match schema.method {
            HttpMethod::Post => self.http.post(url).json(values),
            HttpMethod::Get => {
                let path_fields = schema.path_fields();
                let query: Vec<(&str, &str)> = values
                    .iter()
                    .filter(|(name, value)| !value.is_empty() && !path_fields.contains(name))
                    .collect();
                self.http.get(url).query(&query)
            }
        };

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(TransportResponse {
            status,
            body: decode_body(&bytes),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(err.to_string())
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
