//! List and search views over the module and instance registries.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use shared::domain::{InstanceRecord, ModuleRecord};
use thiserror::Error;
use tracing::debug;

use crate::{
    controller::{SubmissionController, SubmissionState, SubmitError},
    forms,
    schema::{FieldValues, FormSchema},
    transport::Transport,
};

/// Record type a catalog view lists.
pub trait CatalogEntry: DeserializeOwned + Clone + Send + Sync + 'static {
    fn list_form() -> FormSchema;
    fn search_form() -> FormSchema;
    fn name(&self) -> &str;
}

impl CatalogEntry for ModuleRecord {
    fn list_form() -> FormSchema {
        forms::list_modules()
    }

    fn search_form() -> FormSchema {
        forms::search_modules()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl CatalogEntry for InstanceRecord {
    fn list_form() -> FormSchema {
        forms::list_instances()
    }

    fn search_form() -> FormSchema {
        forms::search_instances()
    }

    fn name(&self) -> &str {
        &self.instance_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("a catalog request is already in flight")]
    Busy,
    #[error("{0}")]
    Failed(String),
}

/// Current listing plus the last error, as shown on a list page.
///
/// All operations take `&self`, so one view can be shared by the task that
/// runs a request and the code that renders the loading flag.
pub struct CatalogView<T: CatalogEntry> {
    list: SubmissionController,
    search: SubmissionController,
    shown: Mutex<Shown<T>>,
}

struct Shown<T> {
    entries: Vec<T>,
    error: Option<String>,
}

impl<T: CatalogEntry> CatalogView<T> {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            list: SubmissionController::new(T::list_form(), Arc::clone(&transport)),
            search: SubmissionController::new(T::search_form(), transport),
            shown: Mutex::new(Shown {
                entries: Vec::new(),
                error: None,
            }),
        }
    }

    pub fn entries(&self) -> Vec<T> {
        self.lock_shown().entries.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock_shown().error.clone()
    }

    /// True while a list or search request is Validating or Pending.
    pub fn is_loading(&self) -> bool {
        self.list.state().is_in_flight() || self.search.state().is_in_flight()
    }

    /// Replaces the listing with every record. On failure the previous
    /// listing stays and the error is recorded.
    pub async fn fetch_all(&self) -> Result<Vec<T>, CatalogError> {
        if self.is_loading() {
            return Err(CatalogError::Busy);
        }
        let values = FieldValues::for_schema(self.list.schema());
        let outcome = run(&self.list, values).await?;
        self.list.acknowledge();

        let decoded = outcome.and_then(|payload| decode::<Vec<T>>(self.list.schema(), payload));
        let mut shown = self.lock_shown();
        match decoded {
            Ok(entries) => {
                shown.entries = entries;
                shown.error = None;
                Ok(shown.entries.clone())
            }
            Err(message) => {
                shown.error = Some(message.clone());
                Err(CatalogError::Failed(message))
            }
        }
    }

    /// Shows the single record named `term`. Any failure, including a
    /// not-found for an empty term, clears the listing.
    pub async fn search(&self, term: &str) -> Result<Vec<T>, CatalogError> {
        if self.is_loading() {
            return Err(CatalogError::Busy);
        }
        let mut values = FieldValues::for_schema(self.search.schema());
        values
            .set(self.search.schema(), forms::SEARCH_FIELD, term)
            .map_err(|e| CatalogError::Failed(e.to_string()))?;
        let outcome = run(&self.search, values).await?;
        self.search.acknowledge();

        let decoded = outcome.and_then(|payload| decode::<T>(self.search.schema(), payload));
        let mut shown = self.lock_shown();
        match decoded {
            Ok(entry) => {
                shown.entries = vec![entry];
                shown.error = None;
                Ok(shown.entries.clone())
            }
            Err(message) => {
                shown.entries.clear();
                shown.error = Some(message.clone());
                Err(CatalogError::Failed(message))
            }
        }
    }

    fn lock_shown(&self) -> MutexGuard<'_, Shown<T>> {
        self.shown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Submits and flattens the terminal state into payload or message.
async fn run(
    controller: &SubmissionController,
    values: FieldValues,
) -> Result<Result<serde_json::Value, String>, CatalogError> {
    match controller.submit(values).await {
        Ok(SubmissionState::Succeeded { payload, .. }) => Ok(Ok(payload)),
        Ok(SubmissionState::Failed { failure, .. }) => {
            debug!(form = %controller.schema().name, message = %failure.message, "catalog request failed");
            Ok(Err(controller.schema().fallback_message.clone()))
        }
        Ok(_) | Err(SubmitError::Abandoned(_)) => {
            Ok(Err(controller.schema().fallback_message.clone()))
        }
        Err(SubmitError::InFlight { .. }) => Err(CatalogError::Busy),
        Err(SubmitError::Invalid(errors)) => Err(CatalogError::Failed(errors.to_string())),
    }
}

fn decode<D: DeserializeOwned>(form: &FormSchema, payload: serde_json::Value) -> Result<D, String> {
    serde_json::from_value(payload).map_err(|e| {
        debug!(form = %form.name, error = %e, "unexpected catalog payload");
        form.fallback_message.clone()
    })
}
