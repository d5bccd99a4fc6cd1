use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ErrorPathMap;

pub type FieldMap = serde_json::Map<String, Value>;

/// Future returned by [`FormModel::submit`]. `None` means the model declined
/// to submit.
pub type SubmitFuture = BoxFuture<'static, Option<SubmitResult>>;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FormError {
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FormError {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::default()
        }
    }

    pub fn form() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn is_form_level(&self) -> bool {
        self.field.is_none()
    }
}

#[derive(Clone)]
pub struct SubmitFailure(Arc<dyn std::error::Error + Send + Sync>);

impl SubmitFailure {
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(error))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(FailureMessage(message.into())))
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl Debug for SubmitFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SubmitFailure").field(&self.0).finish()
    }
}

impl Display for SubmitFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for SubmitFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

#[derive(Debug)]
struct FailureMessage(String);

impl Display for FailureMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FailureMessage {}

#[derive(Clone, Debug)]
pub enum SubmitResult {
    Ok {
        data: Option<Value>,
        meta: Option<Value>,
    },
    Invalid {
        errors: Vec<FormError>,
    },
    Error(SubmitFailure),
}

impl SubmitResult {
    pub fn ok() -> Self {
        Self::Ok {
            data: None,
            meta: None,
        }
    }

    pub fn ok_with(data: Value) -> Self {
        Self::Ok {
            data: Some(data),
            meta: None,
        }
    }

    pub fn invalid(errors: impl IntoIterator<Item = FormError>) -> Self {
        Self::Invalid {
            errors: errors.into_iter().collect(),
        }
    }

    pub fn error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Error(SubmitFailure::new(error))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn errors(&self) -> &[FormError] {
        match self {
            Self::Invalid { errors } => errors,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldWriteError {
    Unknown,
    Type(String),
}

/// Usually implemented with `#[derive(FormFields)]`.
pub trait FieldRecord {
    fn read_field(&self, field: &str) -> Option<Value>;
    fn write_field(&mut self, field: &str, value: Value) -> Result<(), FieldWriteError>;
}

impl FieldRecord for FieldMap {
    fn read_field(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }

    fn write_field(&mut self, field: &str, value: Value) -> Result<(), FieldWriteError> {
        self.insert(field.to_owned(), value);
        Ok(())
    }
}

pub trait ProxyModel {
    fn get_value(&self, field: &str) -> Option<Value>;
    fn assign(&mut self, data: FieldMap);
}

pub enum DataSource<'a> {
    Plain(&'a dyn FieldRecord),
    Proxy(&'a dyn ProxyModel),
}

pub enum DataSourceMut<'a> {
    Plain(&'a mut dyn FieldRecord),
    Proxy(&'a mut dyn ProxyModel),
}

pub trait ErrorPaths {
    fn declared_error_paths() -> ErrorPathMap;
}

/// The data-holding object a [`FormSession`](super::FormSession) is bound to.
///
/// The model owns both the values and the submit procedure; validation
/// happens inside `submit`.
pub trait FormModel: Send + Sync + 'static {
    /// Starts a submit. The returned future must not borrow the model, so
    /// clone whatever data the submission needs.
    fn submit(&mut self) -> SubmitFuture;

    fn reset(&mut self) {}

    fn data_source(&self) -> DataSource<'_>;

    fn data_source_mut(&mut self) -> DataSourceMut<'_>;

    /// Mapping applied to invalid results before they reach the session.
    /// Empty by default. Models deriving `FormFields` with `error_path`
    /// attributes must return `Self::declared_error_paths()` here, the
    /// derive does not wire it up.
    fn error_paths(&self) -> ErrorPathMap {
        ErrorPathMap::new()
    }
}
