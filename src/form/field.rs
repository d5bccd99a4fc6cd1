use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::callback::FieldChangeCallback;
use super::model::{FormError, FormModel};
use super::session::{FormSession, SessionError, SessionResult};

#[derive(Clone, Debug)]
pub struct FieldHandle {
    pub name: Option<String>,
    pub value: Option<Value>,
    pub on_change: FieldChangeCallback,
    pub errors: Vec<FormError>,
}

impl FieldHandle {
    pub fn detached() -> Self {
        Self {
            name: None,
            value: None,
            on_change: FieldChangeCallback::noop(),
            errors: Vec::new(),
        }
    }

    pub fn value_as<T>(&self) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.value
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn is_invalid(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl<M> FormSession<M>
where
    M: FormModel,
{
    pub fn field(&self, name: &str) -> SessionResult<FieldHandle> {
        Ok(FieldHandle {
            name: Some(name.to_owned()),
            value: self.get_field_value(name)?,
            on_change: self.on_change_for(name)?,
            errors: self.errors_for(name, false)?,
        })
    }
}

pub struct FieldTransform<T, U> {
    from_value: Arc<dyn Fn(T) -> U + Send + Sync>,
    to_value: Arc<dyn Fn(U) -> T + Send + Sync>,
}

impl<T, U> Clone for FieldTransform<T, U> {
    fn clone(&self) -> Self {
        Self {
            from_value: self.from_value.clone(),
            to_value: self.to_value.clone(),
        }
    }
}

impl<T, U> FieldTransform<T, U> {
    pub fn new(
        from_value: impl Fn(T) -> U + Send + Sync + 'static,
        to_value: impl Fn(U) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            from_value: Arc::new(from_value),
            to_value: Arc::new(to_value),
        }
    }

    pub fn from_value(&self, value: T) -> U {
        (self.from_value)(value)
    }

    pub fn to_value(&self, raw: U) -> T {
        (self.to_value)(raw)
    }
}

impl<T, U> FieldTransform<T, U>
where
    T: Serialize + DeserializeOwned,
{
    pub fn display(&self, value: &Value) -> Option<U> {
        serde_json::from_value::<T>(value.clone())
            .ok()
            .map(|value| self.from_value(value))
    }

    pub fn to_model(&self, raw: U) -> SessionResult<Value> {
        serde_json::to_value(self.to_value(raw))
            .map_err(|error| SessionError::ValueEncoding(error.to_string()))
    }
}

/// Decimal field edited as text. Blank or unparsable text clears the value.
pub fn decimal_text() -> FieldTransform<Option<Decimal>, String> {
    FieldTransform::new(
        |value: Option<Decimal>| value.map(|decimal| decimal.to_string()).unwrap_or_default(),
        |raw: String| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Decimal::from_str(trimmed).ok()
            }
        },
    )
}

impl FieldChangeCallback {
    pub fn commit_with<T, U>(&self, transform: &FieldTransform<T, U>, raw: U) -> SessionResult<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.commit(transform.to_model(raw)?)
    }

    pub fn partial_with<T, U>(&self, transform: &FieldTransform<T, U>, raw: U) -> SessionResult<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.partial(transform.to_model(raw)?)
    }
}
