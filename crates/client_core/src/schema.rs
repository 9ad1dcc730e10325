//! Static description of a form: its fields, where it submits, and the texts
//! shown for each outcome.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use thiserror::Error;
use url::{form_urlencoded, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// Extra check applied to a non-empty value.
#[derive(Clone, Copy)]
pub enum FieldRule {
    /// Absolute `http` or `https` URL.
    Url,
    MaxLength(usize),
    Custom {
        check: fn(&str) -> bool,
        message: &'static str,
    },
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url => f.write_str("Url"),
            Self::MaxLength(max) => f.debug_tuple("MaxLength").field(max).finish(),
            Self::Custom { message, .. } => {
                f.debug_struct("Custom").field("message", message).finish()
            }
        }
    }
}

impl FieldRule {
    /// Returns the error message when `value` breaks the rule.
    pub fn check(&self, value: &str) -> Option<String> {
        match self {
            Self::Url => match Url::parse(value) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => None,
                _ => Some("must be an http(s) URL".to_string()),
            },
            Self::MaxLength(max) => (value.chars().count() > *max)
                .then(|| format!("must be at most {max} characters")),
            Self::Custom { check, message } => (!check(value)).then(|| message.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: String,
    pub label: String,
    pub required: bool,
    pub rule: Option<FieldRule>,
}

impl FieldSchema {
    pub fn required(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            required: true,
            rule: None,
        }
    }

    pub fn optional(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, label)
        }
    }

    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rule = Some(rule);
        self
    }
}

/// Link shown next to a successful result, e.g. the list page to check on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct FormSchema {
    pub name: String,
    pub method: HttpMethod,
    /// Absolute URL or path relative to the API base. Whole path segments of
    /// the form `{field}` are replaced by that field's value.
    pub endpoint: String,
    pub fields: Vec<FieldSchema>,
    pub success_message: String,
    pub fallback_message: String,
    pub follow_up: Option<FollowUp>,
}

const DEFAULT_SUCCESS_MESSAGE: &str = "Request processed successfully!";
const DEFAULT_FALLBACK_MESSAGE: &str = "An error occurred while processing the request.";

impl FormSchema {
    pub fn new(name: impl Into<String>, method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            endpoint: endpoint.into(),
            fields: Vec::new(),
            success_message: DEFAULT_SUCCESS_MESSAGE.to_string(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            follow_up: None,
        }
    }

    /// Appends a field. Panics on a duplicate name since schemas are static.
    pub fn field(mut self, field: FieldSchema) -> Self {
        assert!(
            self.field_schema(&field.name).is_none(),
            "duplicate field '{}' in form '{}'",
            field.name,
            self.name
        );
        self.fields.push(field);
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = message.into();
        self
    }

    pub fn fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn follow_up(mut self, label: impl Into<String>, href: impl Into<String>) -> Self {
        self.follow_up = Some(FollowUp {
            label: label.into(),
            href: href.into(),
        });
        self
    }

    pub fn field_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Names of the fields consumed by `{field}` path placeholders.
    pub fn path_fields(&self) -> Vec<&str> {
        self.endpoint
            .split('/')
            .filter_map(placeholder)
            .filter(|name| self.field_schema(name).is_some())
            .collect()
    }

    /// Substitutes path placeholders with percent-encoded values.
    pub fn expand_endpoint(&self, values: &FieldValues) -> String {
        self.endpoint
            .split('/')
            .map(|segment| match placeholder(segment) {
                Some(name) => encode_segment(values.get(name).unwrap_or_default()),
                None => segment.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Resolves the expanded endpoint against `base`. Absolute endpoints are
    /// used unchanged; relative paths are appended to the base path.
    pub fn resolve_url(&self, base: &Url, values: &FieldValues) -> Result<Url, url::ParseError> {
        let expanded = self.expand_endpoint(values);
        match Url::parse(&expanded) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let root = base.as_str().trim_end_matches('/');
                let path = expanded.trim_start_matches('/');
                Url::parse(&format!("{root}/{path}"))
            }
            Err(err) => Err(err),
        }
    }
}

fn placeholder(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

fn encode_segment(raw: &str) -> String {
    // byte_serialize turns spaces into '+', which is literal in a path.
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("form '{form}' has no field named '{field}'")]
    UnknownField { form: String, field: String },
}

/// Current raw input of a form, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldValues {
    entries: BTreeMap<String, String>,
}

impl FieldValues {
    /// One empty entry per field of `schema`.
    pub fn for_schema(schema: &FormSchema) -> Self {
        Self {
            entries: schema
                .field_names()
                .map(|name| (name.to_string(), String::new()))
                .collect(),
        }
    }

    /// Sets a field that `schema` declares.
    pub fn set(
        &mut self,
        schema: &FormSchema,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), FieldError> {
        if schema.field_schema(name).is_none() {
            return Err(FieldError::UnknownField {
                form: schema.name.clone(),
                field: name.to_string(),
            });
        }
        self.entries.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Exactly the fields of `schema`, each trimmed, missing ones empty.
    /// This is the shape that goes on the wire.
    pub fn normalized(&self, schema: &FormSchema) -> Self {
        Self {
            entries: schema
                .field_names()
                .map(|name| {
                    let value = self.get(name).unwrap_or_default().trim();
                    (name.to_string(), value.to_string())
                })
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn is_blank(&self) -> bool {
        self.entries.values().all(|value| value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FieldValues
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
