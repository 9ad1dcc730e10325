//! Rendering strategies for submission outcomes.
//!
//! The controller never renders anything itself; a screen picks one of these
//! presenters and feeds it every state it observes.

use std::fmt;

use crate::{
    controller::{FailureKind, SubmissionState},
    schema::FormSchema,
    validation::{ValidationErrors, REQUIRED_MESSAGE},
};

/// What a presenter wants shown for a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub heading: Option<String>,
    pub lines: Vec<String>,
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = self.heading.iter().chain(self.lines.iter());
        if let Some(first) = lines.next() {
            f.write_str(first)?;
        }
        for line in lines {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

pub trait ResultPresenter: Send + Sync {
    /// Returns `None` when nothing should be on screen for `state`.
    fn present(&self, form: &FormSchema, state: &SubmissionState) -> Option<Presentation>;
}

/// One line per outcome, like a browser alert.
pub struct AlertPresenter;

impl ResultPresenter for AlertPresenter {
    fn present(&self, form: &FormSchema, state: &SubmissionState) -> Option<Presentation> {
        let line = match state {
            SubmissionState::Succeeded { .. } => form.success_message.clone(),
            SubmissionState::Failed { failure, .. } => failure.message.clone(),
            _ => return None,
        };
        Some(Presentation {
            heading: None,
            lines: vec![line],
        })
    }
}

/// Heading, message and follow-up link, plus a progress line while pending.
pub struct ModalPresenter;

impl ResultPresenter for ModalPresenter {
    fn present(&self, form: &FormSchema, state: &SubmissionState) -> Option<Presentation> {
        match state {
            SubmissionState::Idle | SubmissionState::Validating => None,
            SubmissionState::Pending { .. } => Some(Presentation {
                heading: None,
                lines: vec!["Submitting...".to_string()],
            }),
            SubmissionState::Succeeded { .. } => {
                let mut lines = vec![form.success_message.clone()];
                if let Some(follow_up) = &form.follow_up {
                    lines.push(format!(
                        "You can check it on the {} page ({}).",
                        follow_up.label, follow_up.href
                    ));
                }
                Some(Presentation {
                    heading: Some("Success!".to_string()),
                    lines,
                })
            }
            SubmissionState::Failed { failure, .. } => {
                let heading = match failure.kind {
                    FailureKind::Timeout => "Timed out",
                    FailureKind::Application | FailureKind::Transport => "Error",
                };
                Some(Presentation {
                    heading: Some(heading.to_string()),
                    lines: vec![failure.message.clone()],
                })
            }
        }
    }
}

/// Inline per-field messages in schema order, e.g. "Module name is required".
pub fn field_error_lines(form: &FormSchema, errors: &ValidationErrors) -> Vec<String> {
    let mut lines: Vec<String> = form
        .fields
        .iter()
        .filter_map(|field| {
            let message = errors.get(&field.name)?;
            Some(if message == REQUIRED_MESSAGE {
                format!("{} is required", field.label)
            } else {
                format!("{} {message}", field.label)
            })
        })
        .collect();

    // Keys the schema does not know have no label.
    lines.extend(
        errors
            .iter()
            .filter(|(name, _)| form.field_schema(name).is_none())
            .map(|(name, message)| format!("{name}: {message}")),
    );
    lines
}
