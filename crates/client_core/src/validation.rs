use std::{collections::BTreeMap, fmt};

use crate::schema::{FieldValues, FormSchema};

pub const REQUIRED_MESSAGE: &str = "required";
pub const UNKNOWN_FIELD_MESSAGE: &str = "unknown field";

/// Field name to error message for every field that failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }

    fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.errors.insert(field.to_string(), message.into());
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.errors {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Checks `values` against `schema` without side effects.
///
/// Required fields that are missing or blank after trimming report
/// [`REQUIRED_MESSAGE`]. Non-blank values are checked against their rule, and
/// keys the schema does not declare report [`UNKNOWN_FIELD_MESSAGE`].
pub fn validate(schema: &FormSchema, values: &FieldValues) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    for field in &schema.fields {
        let value = values.get(&field.name).unwrap_or_default();
        if value.trim().is_empty() {
            if field.required {
                errors.insert(&field.name, REQUIRED_MESSAGE);
            }
            continue;
        }
        if let Some(message) = field.rule.as_ref().and_then(|rule| rule.check(value.trim())) {
            errors.insert(&field.name, message);
        }
    }

    for (name, _) in values.iter() {
        if schema.field_schema(name).is_none() {
            errors.insert(name, UNKNOWN_FIELD_MESSAGE);
        }
    }

    errors
}
