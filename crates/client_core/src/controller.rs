//! Lifecycle of one form's submissions.
//!
//! A controller owns the form's current [`FieldValues`] and publishes every
//! phase change on a watch channel. At most one submission is in flight per
//! controller; a second `submit` while Validating or Pending is rejected.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::{stream::BoxStream, StreamExt};
use serde_json::Value;
use shared::error::{error_description, error_marker};
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    schema::{FieldError, FieldValues, FormSchema},
    transport::{Transport, TransportError, TransportResponse},
    validation::{validate, ValidationErrors},
};

/// Upper bound on a Pending phase unless overridden.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport succeeded but the body carried an `error` marker.
    Application,
    /// Connection failure or non-2xx status.
    Transport,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionState {
    Idle,
    Validating,
    Pending {
        submission: SubmissionId,
    },
    Succeeded {
        submission: SubmissionId,
        payload: Value,
    },
    Failed {
        submission: SubmissionId,
        failure: Failure,
    },
}

impl SubmissionState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Validating => Phase::Validating,
            Self::Pending { .. } => Phase::Pending,
            Self::Succeeded { .. } => Phase::Succeeded,
            Self::Failed { .. } => Phase::Failed,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Validating | Self::Pending { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("a submission is already in flight for form '{form}'")]
    InFlight { form: String },
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),
    #[error("submission {0} was abandoned before it completed")]
    Abandoned(SubmissionId),
}

struct ControllerInner {
    values: FieldValues,
    active: Option<SubmissionId>,
}

pub struct SubmissionController {
    schema: Arc<FormSchema>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    inner: Mutex<ControllerInner>,
    state: watch::Sender<SubmissionState>,
}

impl SubmissionController {
    pub fn new(schema: impl Into<Arc<FormSchema>>, transport: Arc<dyn Transport>) -> Self {
        let schema = schema.into();
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            inner: Mutex::new(ControllerInner {
                values: FieldValues::for_schema(&schema),
                active: None,
            }),
            schema,
            transport,
            timeout: DEFAULT_SUBMIT_TIMEOUT,
            state,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Phase changes as a stream, starting with the current state.
    pub fn states(&self) -> BoxStream<'static, SubmissionState> {
        WatchStream::new(self.state.subscribe()).boxed()
    }

    pub fn values(&self) -> FieldValues {
        self.lock_inner().values.clone()
    }

    pub fn set_field(&self, name: &str, value: impl Into<String>) -> Result<(), FieldError> {
        let mut inner = self.lock_inner();
        inner.values.set(&self.schema, name, value)
    }

    /// Submits the controller's current input.
    pub async fn submit_current(&self) -> Result<SubmissionState, SubmitError> {
        let values = self.values();
        self.submit(values).await
    }

    /// Validates `values` and, when valid, issues exactly one request carrying
    /// every schema field, trimmed.
    ///
    /// Returns the terminal state on completion. Dropping the returned future
    /// while Pending abandons the submission and returns the form to Idle.
    pub async fn submit(&self, values: FieldValues) -> Result<SubmissionState, SubmitError> {
        let submission = {
            let mut inner = self.lock_inner();
            if self.state.borrow().is_in_flight() {
                warn!(form = %self.schema.name, "rejecting submit while another is in flight");
                return Err(SubmitError::InFlight {
                    form: self.schema.name.clone(),
                });
            }

            inner.values = values.clone();
            self.state.send_replace(SubmissionState::Validating);
            let errors = validate(&self.schema, &values);
            if !errors.is_empty() {
                debug!(form = %self.schema.name, %errors, "validation failed");
                self.state.send_replace(SubmissionState::Idle);
                return Err(SubmitError::Invalid(errors));
            }

            let submission = SubmissionId::new();
            inner.active = Some(submission);
            self.state.send_replace(SubmissionState::Pending { submission });
            submission
        };
        let request = values.normalized(&self.schema);
        info!(form = %self.schema.name, %submission, "submission pending");

        let mut guard = AbandonOnDrop {
            controller: self,
            submission,
            armed: true,
        };
        let result = match tokio::time::timeout(
            self.timeout,
            self.transport.send(&self.schema, &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        guard.armed = false;

        let next = settle(&self.schema, submission, result);
        let mut inner = self.lock_inner();
        if inner.active != Some(submission) {
            debug!(form = %self.schema.name, %submission, "discarding response of abandoned submission");
            return Err(SubmitError::Abandoned(submission));
        }
        inner.active = None;
        inner.values = FieldValues::for_schema(&self.schema);
        match &next {
            SubmissionState::Failed { failure, .. } => warn!(
                form = %self.schema.name,
                %submission,
                kind = ?failure.kind,
                status = ?failure.status,
                message = %failure.message,
                "submission failed"
            ),
            _ => info!(form = %self.schema.name, %submission, "submission succeeded"),
        }
        self.state.send_replace(next.clone());
        Ok(next)
    }

    /// Returns a terminal state to Idle. No-op in any other phase.
    pub fn acknowledge(&self) {
        let _inner = self.lock_inner();
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                *state = SubmissionState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Gives up on the Pending submission, if any. Its response is ignored
    /// when it arrives. Returns whether a submission was abandoned.
    pub fn abandon(&self) -> bool {
        let mut inner = self.lock_inner();
        self.abandon_locked(&mut inner, None)
    }

    fn abandon_locked(&self, inner: &mut ControllerInner, only: Option<SubmissionId>) -> bool {
        let Some(active) = inner.active else {
            return false;
        };
        if only.is_some_and(|submission| submission != active) {
            return false;
        }
        inner.active = None;
        self.state.send_replace(SubmissionState::Idle);
        info!(form = %self.schema.name, submission = %active, "submission abandoned");
        true
    }

    fn lock_inner(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct AbandonOnDrop<'a> {
    controller: &'a SubmissionController,
    submission: SubmissionId,
    armed: bool,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.controller.lock_inner();
            self.controller
                .abandon_locked(&mut inner, Some(self.submission));
        }
    }
}

/// Maps a finished exchange to the terminal state it produces.
pub fn settle(
    schema: &FormSchema,
    submission: SubmissionId,
    result: Result<TransportResponse, TransportError>,
) -> SubmissionState {
    let failure = match result {
        Ok(response) if response.is_success() => match error_marker(&response.body) {
            Some(message) => Failure {
                kind: FailureKind::Application,
                message,
                status: Some(response.status),
            },
            None => {
                return SubmissionState::Succeeded {
                    submission,
                    payload: response.body,
                }
            }
        },
        Ok(response) => Failure {
            kind: FailureKind::Transport,
            message: error_description(&response.body)
                .unwrap_or_else(|| schema.fallback_message.clone()),
            status: Some(response.status),
        },
        Err(TransportError::Timeout) => Failure {
            kind: FailureKind::Timeout,
            message: schema.fallback_message.clone(),
            status: None,
        },
        Err(err) => {
            debug!(form = %schema.name, error = %err, "transport error");
            Failure {
                kind: FailureKind::Transport,
                message: schema.fallback_message.clone(),
                status: None,
            }
        }
    };
    SubmissionState::Failed {
        submission,
        failure,
    }
}
