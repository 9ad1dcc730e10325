use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::error::{ErrorBody, ErrorCode};
use shared::protocol::{
    CreateInstanceRequest, GetVsValueRequest, UploadModuleRequest, API_PREFIX,
    CREATE_INSTANCE_PATH, GET_VS_VALUE_PATH, INSTANCES_PATH, MODULES_PATH, UPLOAD_MODULE_PATH,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod upstream;

use config::load_settings;
use upstream::{ForwardResult, Upstream};

#[derive(Clone)]
struct AppState {
    upstream: Upstream,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings()?;
    let upstream = Upstream::from_settings(&settings)?;
    let app = build_router(Arc::new(AppState { upstream }));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn forwarding_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(UPLOAD_MODULE_PATH, post(upload_module))
        .route(CREATE_INSTANCE_PATH, post(create_instance))
        .route(GET_VS_VALUE_PATH, post(get_vs_value))
        .route(MODULES_PATH, get(list_modules))
        .route(&format!("{MODULES_PATH}/:module_name"), get(get_module))
        .route(INSTANCES_PATH, get(list_instances))
        .route(&format!("{INSTANCES_PATH}/:instance_name"), get(get_instance))
}

/// Every forwarding route is served both bare and under [`API_PREFIX`], so a
/// UI on the same origin can call `/api/x` and a direct client `/x`.
fn build_router(state: Arc<AppState>) -> Router {
    let routes = forwarding_routes();
    Router::new()
        .route("/healthz", get(healthz))
        .merge(routes.clone())
        .nest(API_PREFIX, routes)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Checks that the body has the shape of `R` and hands it back unchanged, so
/// keys `R` does not name are still forwarded.
fn accept<R: DeserializeOwned>(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Value, (StatusCode, Json<ErrorBody>)> {
    let Json(body) = payload.map_err(|rejection| {
        (
            rejection.status(),
            Json(ErrorBody::new(ErrorCode::Validation, rejection.body_text())),
        )
    })?;
    if let Err(e) = serde_json::from_value::<R>(body.clone()) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody::new(
                ErrorCode::Validation,
                format!("invalid request body: {e}"),
            )),
        ));
    }
    Ok(body)
}

async fn upload_module(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ForwardResult {
    let body = accept::<UploadModuleRequest>(payload)?;
    let upstream = &state.upstream;
    upstream.forward_post(&upstream.upload_module, &body).await
}

async fn create_instance(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ForwardResult {
    let body = accept::<CreateInstanceRequest>(payload)?;
    let upstream = &state.upstream;
    upstream.forward_post(&upstream.create_instance, &body).await
}

async fn get_vs_value(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ForwardResult {
    let body = accept::<GetVsValueRequest>(payload)?;
    let upstream = &state.upstream;
    upstream.forward_post(&upstream.get_vs_value, &body).await
}

async fn list_modules(State(state): State<Arc<AppState>>) -> ForwardResult {
    let url = state.upstream.registry_url(&["modules"])?;
    state.upstream.forward_get(&url).await
}

async fn get_module(
    State(state): State<Arc<AppState>>,
    Path(module_name): Path<String>,
) -> ForwardResult {
    let url = state.upstream.registry_url(&["modules", &module_name])?;
    state.upstream.forward_get(&url).await
}

async fn list_instances(State(state): State<Arc<AppState>>) -> ForwardResult {
    let url = state.upstream.registry_url(&["instances"])?;
    state.upstream.forward_get(&url).await
}

async fn get_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_name): Path<String>,
) -> ForwardResult {
    let url = state.upstream.registry_url(&["instances", &instance_name])?;
    state.upstream.forward_get(&url).await
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
