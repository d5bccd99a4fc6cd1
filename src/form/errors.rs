use std::collections::BTreeMap;
use std::sync::Arc;

use super::model::{FormError, SubmitResult};

/// Ordered list of form errors with whole-value replacement on every change.
///
/// Each mutation swaps in a fresh `Arc<[FormError]>`, so observers can detect
/// changes with `Arc::ptr_eq`.
#[derive(Clone, Debug)]
pub struct ErrorStore {
    errors: Arc<[FormError]>,
}

impl Default for ErrorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorStore {
    pub fn new() -> Self {
        Self {
            errors: Arc::from(Vec::new()),
        }
    }

    pub fn errors(&self) -> Arc<[FormError]> {
        self.errors.clone()
    }

    pub fn as_slice(&self) -> &[FormError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_invalid(&self, field: &str) -> bool {
        self.errors
            .iter()
            .any(|error| error.field_name() == Some(field))
    }

    pub fn errors_for(&self, field: &str, include_children: bool) -> Vec<FormError> {
        self.errors
            .iter()
            .filter(|error| {
                let Some(name) = error.field_name() else {
                    return false;
                };
                name == field || (include_children && is_child_path(name, field))
            })
            .cloned()
            .collect()
    }

    pub fn add_error(&mut self, error: FormError) {
        let mut next = self.errors.to_vec();
        next.push(error);
        self.errors = Arc::from(next);
    }

    pub fn clear_errors(&mut self, field: Option<&str>) -> bool {
        let next = match field {
            None => Vec::new(),
            Some(field) => self
                .errors
                .iter()
                .filter(|error| error.field_name() != Some(field))
                .cloned()
                .collect(),
        };
        if next.len() == self.errors.len() {
            return false;
        }
        self.errors = Arc::from(next);
        true
    }

    pub fn replace(&mut self, errors: Vec<FormError>) {
        self.errors = Arc::from(errors);
    }
}

fn is_child_path(candidate: &str, parent: &str) -> bool {
    candidate
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('.'))
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorPathMap {
    paths: BTreeMap<String, String>,
}

impl ErrorPathMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a parent type's table; entries added afterwards win.
    pub fn inherit(parent: ErrorPathMap) -> Self {
        parent
    }

    pub fn map(mut self, internal: impl Into<String>, public: impl Into<String>) -> Self {
        self.paths.insert(internal.into(), public.into());
        self
    }

    pub fn extend(&mut self, other: ErrorPathMap) {
        self.paths.extend(other.paths);
    }

    pub fn translate<'a>(&'a self, path: &'a str) -> &'a str {
        self.paths.get(path).map(String::as_str).unwrap_or(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

pub fn translate_error_paths(result: SubmitResult, paths: &ErrorPathMap) -> SubmitResult {
    if paths.is_empty() {
        return result;
    }
    match result {
        SubmitResult::Invalid { errors } => SubmitResult::Invalid {
            errors: errors
                .into_iter()
                .map(|error| FormError {
                    field: error
                        .field
                        .as_deref()
                        .map(|field| paths.translate(field).to_owned()),
                    ..error
                })
                .collect(),
        },
        other => other,
    }
}
