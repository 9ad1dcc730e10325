use super::*;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use shared::domain::{InstanceRecord, ModuleRecord};
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
};

#[derive(Clone, Default)]
struct ServerState {
    received: Arc<Mutex<Vec<Value>>>,
}

async fn spawn_server(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn spawn_form_server(reply: Value) -> anyhow::Result<(String, ServerState)> {
    let state = ServerState::default();
    let app = Router::new()
        .route(
            "/create_instance",
            post(
                |State(state): State<ServerState>, Json(body): Json<Value>| async move {
                    state.received.lock().await.push(body);
                    Json(reply)
                },
            ),
        )
        .with_state(state.clone());
    Ok((spawn_server(app).await?, state))
}

fn filled_create_instance(schema: &FormSchema) -> FieldValues {
    let mut values = FieldValues::for_schema(schema);
    values.set(schema, "instance_name", "inst-1").expect("set");
    values.set(schema, "module_name", "resnet").expect("set");
    values
        .set(schema, "github_url", "https://github.com/acme/resnet")
        .expect("set");
    values.set(schema, "file_name", "main.py").expect("set");
    values
}

/// Counts calls and answers each one after `gate` is notified, if set.
struct ScriptedTransport {
    calls: AtomicUsize,
    sent: Mutex<Vec<FieldValues>>,
    gate: Option<Arc<Notify>>,
    reply: Option<Result<TransportResponse, TransportError>>,
}

impl ScriptedTransport {
    fn replying(reply: Result<TransportResponse, TransportError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            sent: Mutex::default(),
            gate: None,
            reply: Some(reply),
        }
    }

    fn gated(gate: Arc<Notify>, reply: Result<TransportResponse, TransportError>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::replying(reply)
        }
    }

    fn never_replying() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            sent: Mutex::default(),
            gate: None,
            reply: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _schema: &FormSchema,
        values: &FieldValues,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().await.push(values.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.reply {
            Some(reply) => reply.clone(),
            None => std::future::pending().await,
        }
    }
}

fn ok_reply() -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status: 200,
        body: json!({ "status": "ok" }),
    })
}

async fn wait_for_pending(controller: &SubmissionController) {
    let mut rx = controller.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|state| state.phase() == Phase::Pending),
    )
    .await
    .expect("pending in time")
    .expect("controller alive");
}

#[tokio::test]
async fn missing_required_field_makes_no_call() {
    let transport = Arc::new(ScriptedTransport::replying(ok_reply()));
    let controller = SubmissionController::new(forms::create_instance(), transport.clone());
    let mut values = filled_create_instance(controller.schema());
    values
        .set(controller.schema(), "module_name", "")
        .expect("set");

    let err = controller.submit(values).await.expect_err("must fail");
    match err {
        SubmitError::Invalid(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors.get("module_name"), Some("required"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.calls(), 0);
    assert_eq!(controller.state(), SubmissionState::Idle);
}

#[tokio::test]
async fn successful_submission_carries_payload_and_clears_input() {
    let (server_url, server) = spawn_form_server(json!({ "status": "ok", "id": 42 }))
        .await
        .expect("spawn server");
    let transport = Arc::new(HttpTransport::new(&server_url).expect("transport"));
    let controller = SubmissionController::new(forms::create_instance(), transport);
    let values = filled_create_instance(controller.schema());

    let state = controller.submit(values.clone()).await.expect("submit");
    match &state {
        SubmissionState::Succeeded { payload, .. } => {
            assert_eq!(payload, &json!({ "status": "ok", "id": 42 }));
        }
        other => panic!("unexpected state: {other:?}"),
    }
    assert_eq!(controller.state(), state);

    let received = server.received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], serde_json::to_value(&values).expect("json"));
    assert!(controller.values().is_blank());
}

#[tokio::test]
async fn error_marker_on_2xx_fails_submission() {
    let (server_url, _server) = spawn_form_server(json!({ "error": "Module already exists" }))
        .await
        .expect("spawn server");
    let transport = Arc::new(HttpTransport::new(&server_url).expect("transport"));
    let controller = SubmissionController::new(forms::create_instance(), transport);

    let state = controller
        .submit(filled_create_instance(controller.schema()))
        .await
        .expect("submit");
    match state {
        SubmissionState::Failed { failure, .. } => {
            assert_eq!(failure.kind, FailureKind::Application);
            assert_eq!(failure.message, "Module already exists");
        }
        other => panic!("unexpected state: {other:?}"),
    }
}

#[tokio::test]
async fn non_2xx_with_error_body_uses_its_message() {
    let app = Router::new().route(
        "/create_instance",
        post(|| async {
            (
                StatusCode::CONFLICT,
                Json(json!({ "error": "Instance name already exists." })),
            )
        }),
    );
    let server_url = spawn_server(app).await.expect("spawn server");
    let transport = Arc::new(HttpTransport::new(&server_url).expect("transport"));
    let controller = SubmissionController::new(forms::create_instance(), transport);

    let state = controller
        .submit(filled_create_instance(controller.schema()))
        .await
        .expect("submit");
    let SubmissionState::Failed { failure, .. } = state else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::Transport);
    assert_eq!(failure.status, Some(409));
    assert_eq!(failure.message, "Instance name already exists.");
}

#[tokio::test]
async fn connection_failure_uses_fallback_message() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let transport = Arc::new(HttpTransport::new(&format!("http://{addr}")).expect("transport"));
    let controller = SubmissionController::new(forms::create_instance(), transport);
    let state = controller
        .submit(filled_create_instance(controller.schema()))
        .await
        .expect("submit");

    let SubmissionState::Failed { failure, .. } = state else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::Transport);
    assert_eq!(failure.message, "Failed to create instance");
    assert!(controller.values().is_blank());
}

#[tokio::test]
async fn second_submit_while_pending_is_rejected() {
    let gate = Arc::new(Notify::new());
    let transport = Arc::new(ScriptedTransport::gated(gate.clone(), ok_reply()));
    let controller = Arc::new(SubmissionController::new(
        forms::create_instance(),
        transport.clone(),
    ));

    let first = {
        let controller = Arc::clone(&controller);
        let values = filled_create_instance(controller.schema());
        tokio::spawn(async move { controller.submit(values).await })
    };
    wait_for_pending(&controller).await;

    let err = controller
        .submit(filled_create_instance(controller.schema()))
        .await
        .expect_err("must be rejected");
    assert!(matches!(err, SubmitError::InFlight { .. }));
    assert_eq!(controller.state().phase(), Phase::Pending);

    gate.notify_one();
    let state = first.await.expect("join").expect("submit");
    assert_eq!(state.phase(), Phase::Succeeded);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn acknowledge_is_idempotent_and_leaves_blank_form() {
    let transport = Arc::new(ScriptedTransport::replying(Err(TransportError::Request(
        "connection reset".into(),
    ))));
    let controller = SubmissionController::new(forms::create_instance(), transport);

    let state = controller
        .submit(filled_create_instance(controller.schema()))
        .await
        .expect("submit");
    assert_eq!(state.phase(), Phase::Failed);

    controller.acknowledge();
    assert_eq!(controller.state(), SubmissionState::Idle);
    controller.acknowledge();
    assert_eq!(controller.state(), SubmissionState::Idle);
    assert_eq!(
        controller.values(),
        FieldValues::for_schema(controller.schema())
    );
}

#[tokio::test]
async fn acknowledge_does_not_interrupt_pending() {
    let gate = Arc::new(Notify::new());
    let transport = Arc::new(ScriptedTransport::gated(gate.clone(), ok_reply()));
    let controller = Arc::new(SubmissionController::new(
        forms::create_instance(),
        transport,
    ));

    let task = {
        let controller = Arc::clone(&controller);
        let values = filled_create_instance(controller.schema());
        tokio::spawn(async move { controller.submit(values).await })
    };
    wait_for_pending(&controller).await;
    controller.acknowledge();
    assert_eq!(controller.state().phase(), Phase::Pending);

    gate.notify_one();
    task.await.expect("join").expect("submit");
    assert_eq!(controller.state().phase(), Phase::Succeeded);
}

#[tokio::test]
async fn request_carries_every_schema_field_trimmed() {
    let schema = FormSchema::new("notes", HttpMethod::Post, "/notes")
        .field(FieldSchema::required("title", "Title"))
        .field(FieldSchema::optional("homepage", "Homepage").with_rule(FieldRule::Url))
        .field(FieldSchema::optional("note", "Note"));
    let transport = Arc::new(ScriptedTransport::replying(ok_reply()));
    let controller = SubmissionController::new(schema, transport.clone());

    let values: FieldValues = [("title", " weekly "), ("homepage", " https://acme.dev ")]
        .into_iter()
        .collect();
    controller.submit(values).await.expect("submit");

    let sent = transport.sent.lock().await;
    assert_eq!(sent.len(), 1);
    let expected: FieldValues = [
        ("homepage", "https://acme.dev"),
        ("note", ""),
        ("title", "weekly"),
    ]
    .into_iter()
    .collect();
    assert_eq!(sent[0], expected);
}

#[tokio::test]
async fn terminal_state_accepts_a_new_submission() {
    let transport = Arc::new(ScriptedTransport::replying(ok_reply()));
    let controller = SubmissionController::new(forms::create_instance(), transport.clone());

    controller
        .submit(filled_create_instance(controller.schema()))
        .await
        .expect("first");
    controller
        .submit(filled_create_instance(controller.schema()))
        .await
        .expect("second");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn abandoned_submission_ignores_late_response() {
    let gate = Arc::new(Notify::new());
    let transport = Arc::new(ScriptedTransport::gated(gate.clone(), ok_reply()));
    let controller = Arc::new(SubmissionController::new(
        forms::create_instance(),
        transport,
    ));

    let task = {
        let controller = Arc::clone(&controller);
        let values = filled_create_instance(controller.schema());
        tokio::spawn(async move { controller.submit(values).await })
    };
    wait_for_pending(&controller).await;

    assert!(controller.abandon());
    assert!(!controller.abandon());
    assert_eq!(controller.state(), SubmissionState::Idle);

    gate.notify_one();
    let err = task.await.expect("join").expect_err("abandoned");
    assert!(matches!(err, SubmitError::Abandoned(_)));
    assert_eq!(controller.state(), SubmissionState::Idle);
}

#[tokio::test]
async fn dropping_submit_future_returns_to_idle() {
    let transport = Arc::new(ScriptedTransport::never_replying());
    let controller = SubmissionController::new(forms::create_instance(), transport);
    let values = filled_create_instance(controller.schema());

    let outcome = tokio::time::timeout(Duration::from_millis(50), controller.submit(values)).await;
    assert!(outcome.is_err(), "submit should still be pending");
    assert_eq!(controller.state(), SubmissionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn explicit_timeout_bounds_pending() {
    let transport = Arc::new(ScriptedTransport::never_replying());
    let controller = SubmissionController::new(forms::get_vs_value(), transport)
        .with_timeout(Duration::from_secs(3));
    let mut values = FieldValues::for_schema(controller.schema());
    values
        .set(controller.schema(), "instance_name", "inst-1")
        .expect("set");
    values
        .set(controller.schema(), "github_url", "https://github.com/acme/vs")
        .expect("set");
    values
        .set(controller.schema(), "file_name", "predict.py")
        .expect("set");

    let state = controller.submit(values).await.expect("submit");
    let SubmissionState::Failed { failure, .. } = state else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(
        failure.message,
        "An error occurred while processing the request."
    );
}

#[tokio::test]
async fn state_stream_reports_terminal_state() {
    let transport = Arc::new(ScriptedTransport::replying(ok_reply()));
    let controller = SubmissionController::new(forms::create_instance(), transport);
    let mut states = controller.states();
    assert_eq!(states.next().await, Some(SubmissionState::Idle));

    controller
        .submit(filled_create_instance(controller.schema()))
        .await
        .expect("submit");
    let next = states.next().await.expect("state");
    assert_eq!(next.phase(), Phase::Succeeded);
}

#[tokio::test]
async fn set_field_edits_current_input() {
    let transport = Arc::new(ScriptedTransport::replying(ok_reply()));
    let controller = SubmissionController::new(forms::get_vs_value(), transport.clone());
    controller.set_field("instance_name", "inst-1").expect("set");
    controller
        .set_field("github_url", "https://github.com/acme/vs")
        .expect("set");
    assert!(controller.set_field("owner", "x").is_err());

    let err = controller.submit_current().await.expect_err("file_name missing");
    assert!(matches!(err, SubmitError::Invalid(_)));
    assert_eq!(controller.values().get("instance_name"), Some("inst-1"));

    controller.set_field("file_name", "predict.py").expect("set");
    controller.submit_current().await.expect("submit");
    assert_eq!(transport.calls(), 1);
    assert!(controller.values().is_blank());
}

fn module(name: &str) -> Value {
    json!({ "id": 1, "name": name, "description": "image model", "status": "ready" })
}

async fn spawn_registry_server() -> anyhow::Result<String> {
    let app = Router::new()
        .route(
            "/modules",
            get(|| async { Json(json!([module("resnet"), module("bert")])) }),
        )
        .route(
            "/modules/:name",
            get(|Path(name): Path<String>| async move {
                if name == "resnet" {
                    Ok(Json(module("resnet")))
                } else {
                    Err((
                        StatusCode::NOT_FOUND,
                        Json(json!({ "detail": "Module not found" })),
                    ))
                }
            }),
        )
        .route(
            "/instances/:name",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "detail": "Instance not found" })),
                )
            }),
        );
    spawn_server(app).await
}

#[tokio::test]
async fn module_catalog_lists_and_searches() {
    let server_url = spawn_registry_server().await.expect("spawn server");
    let transport = Arc::new(HttpTransport::new(&server_url).expect("transport"));
    let view = CatalogView::<ModuleRecord>::new(transport);

    let entries = view.fetch_all().await.expect("list");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].name(), "bert");

    let entries = view.search("resnet").await.expect("search");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status.as_deref(), Some("ready"));
    assert_eq!(view.error(), None);
    assert!(!view.is_loading());
}

#[tokio::test]
async fn empty_search_term_clears_both_catalogs() {
    let server_url = spawn_registry_server().await.expect("spawn server");
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&server_url).expect("transport"));

    let modules = CatalogView::<ModuleRecord>::new(Arc::clone(&transport));
    modules.fetch_all().await.expect("list");
    assert_eq!(modules.entries().len(), 2);

    let err = modules.search("").await.expect_err("not found");
    assert_eq!(err, CatalogError::Failed("Module not found".into()));
    assert!(modules.entries().is_empty());
    assert_eq!(modules.error().as_deref(), Some("Module not found"));

    let instances = CatalogView::<InstanceRecord>::new(transport);
    let err = instances.search("").await.expect_err("not found");
    assert_eq!(err, CatalogError::Failed("Instance not found".into()));
    assert!(instances.entries().is_empty());
    assert_eq!(instances.error().as_deref(), Some("Instance not found"));
}

#[tokio::test]
async fn failed_listing_keeps_previous_entries() {
    let server_url = spawn_registry_server().await.expect("spawn server");
    let transport = Arc::new(HttpTransport::new(&server_url).expect("transport"));
    let view = CatalogView::<InstanceRecord>::new(transport);

    // The registry mock has no `/instances` listing route.
    let err = view.fetch_all().await.expect_err("no listing");
    assert_eq!(err, CatalogError::Failed("Error fetching instances".into()));
    assert_eq!(view.error().as_deref(), Some("Error fetching instances"));
    assert!(view.entries().is_empty());
}

#[tokio::test]
async fn catalog_reports_loading_while_request_is_held() {
    let gate = Arc::new(Notify::new());
    let transport = Arc::new(ScriptedTransport::gated(
        gate.clone(),
        Ok(TransportResponse {
            status: 200,
            body: json!([module("resnet")]),
        }),
    ));
    let view = Arc::new(CatalogView::<ModuleRecord>::new(transport.clone()));
    assert!(!view.is_loading());

    let task = {
        let view = Arc::clone(&view);
        tokio::spawn(async move { view.fetch_all().await })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while !view.is_loading() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("loading in time");

    assert_eq!(view.search("resnet").await, Err(CatalogError::Busy));
    assert_eq!(view.fetch_all().await, Err(CatalogError::Busy));
    assert_eq!(transport.calls(), 1);

    gate.notify_one();
    let entries = task.await.expect("join").expect("list");
    assert_eq!(entries.len(), 1);
    assert!(!view.is_loading());
    assert_eq!(view.entries()[0].name(), "resnet");
}
