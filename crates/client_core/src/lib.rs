//! Client side of the VS-DTIC dashboard: form schemas, the submission
//! controller that drives one request per form, and the views built on it.

pub mod catalog;
pub mod controller;
pub mod forms;
pub mod presenter;
pub mod schema;
pub mod transport;
pub mod validation;

pub use catalog::{CatalogEntry, CatalogError, CatalogView};
pub use controller::{
    Failure, FailureKind, Phase, SubmissionController, SubmissionId, SubmissionState, SubmitError,
};
pub use presenter::{AlertPresenter, ModalPresenter, Presentation, ResultPresenter};
pub use schema::{FieldError, FieldRule, FieldSchema, FieldValues, FollowUp, FormSchema, HttpMethod};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
pub use validation::{validate, ValidationErrors};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
