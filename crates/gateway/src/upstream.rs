//! Forwarding to the backend services behind the gateway.

use std::time::Duration;

use axum::{http::StatusCode, Json};
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use shared::error::{error_description, ErrorBody, ErrorCode};
use tracing::{error, info, warn};
use url::Url;

use crate::config::Settings;

pub(crate) type ForwardResult =
    Result<(StatusCode, Json<Value>), (StatusCode, Json<ErrorBody>)>;

#[derive(Clone)]
pub struct Upstream {
    http: Client,
    timeout: Duration,
    pub(crate) upload_module: Url,
    pub(crate) create_instance: Url,
    pub(crate) get_vs_value: Url,
    data_registry: Url,
}

impl Upstream {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let parse = |name: &str, raw: &str| {
            Url::parse(raw).map_err(|e| anyhow::anyhow!("invalid {name} '{raw}': {e}"))
        };
        Ok(Self {
            http: Client::new(),
            timeout: settings.upstream_timeout(),
            upload_module: parse("upload_module_url", &settings.upload_module_url)?,
            create_instance: parse("create_instance_url", &settings.create_instance_url)?,
            get_vs_value: parse("get_vs_value_url", &settings.get_vs_value_url)?,
            data_registry: parse("data_registry_url", &settings.data_registry_url)?,
        })
    }

    /// Data-registry URL for `segments`, each percent-encoded as one segment.
    pub(crate) fn registry_url(
        &self,
        segments: &[&str],
    ) -> Result<Url, (StatusCode, Json<ErrorBody>)> {
        let mut url = self.data_registry.clone();
        url.path_segments_mut()
            .map_err(|_| {
                internal(format!(
                    "data registry url '{}' cannot take a path",
                    self.data_registry
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) async fn forward_post<B>(&self, url: &Url, body: &B) -> ForwardResult
    where
        B: Serialize + ?Sized,
    {
        info!(%url, "forwarding POST");
        let response = self
            .http
            .post(url.clone())
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| unavailable(url, e))?;
        handle_response(url, response).await
    }

    pub(crate) async fn forward_get(&self, url: &Url) -> ForwardResult {
        info!(%url, "forwarding GET");
        let response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| unavailable(url, e))?;
        handle_response(url, response).await
    }
}

/// Passes a successful status and body through untouched, including bodies
/// that carry an application-level `error`. Failed statuses keep their code and get an
/// [`ErrorBody`] built from the upstream `error`/`detail`.
async fn handle_response(url: &Url, response: Response) -> ForwardResult {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| unavailable(url, e))?;
    let body: Option<Value> = serde_json::from_slice(&bytes).ok();

    if status.is_success() {
        return match body {
            Some(body) => Ok((status, Json(body))),
            None if bytes.is_empty() => Ok((status, Json(Value::Null))),
            None => {
                warn!(%url, %status, "upstream returned a non-JSON body");
                Err((
                    StatusCode::BAD_GATEWAY,
                    Json(ErrorBody::new(
                        ErrorCode::Upstream,
                        "Upstream service returned an invalid response",
                    )),
                ))
            }
        };
    }

    let message = body
        .as_ref()
        .and_then(error_description)
        .unwrap_or_else(|| "Unknown error".to_string());
    let code = match status {
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        s if s.is_client_error() => ErrorCode::Validation,
        _ => ErrorCode::Upstream,
    };
    warn!(%url, %status, %message, "upstream request failed");
    Err((status, Json(ErrorBody::new(code, message))))
}

fn unavailable(url: &Url, err: reqwest::Error) -> (StatusCode, Json<ErrorBody>) {
    error!(%url, error = %err, "communication error with service");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorBody::new(
            ErrorCode::Unavailable,
            format!("Error communicating with the service: {err}"),
        )),
    )
}

fn internal(message: String) -> (StatusCode, Json<ErrorBody>) {
    error!(%message, "gateway misconfiguration");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(ErrorCode::Internal, message)),
    )
}
