use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use super::model::FormModel;
use super::session::{FormSession, SessionResult, read_lock, write_lock};

pub(super) type ChangeFn = Arc<dyn Fn(Value) -> SessionResult<()> + Send + Sync>;

/// Change handler with a committing entry point and a partial one.
///
/// `commit` is for final values and may trigger an auto submit; `partial`
/// only updates the value, for controls that stream intermediate input.
/// Clones share identity, see [`FieldChangeCallback::ptr_eq`].
#[derive(Clone)]
pub struct FieldChangeCallback {
    commit: ChangeFn,
    partial: ChangeFn,
}

impl FieldChangeCallback {
    pub fn new(
        commit: impl Fn(Value) -> SessionResult<()> + Send + Sync + 'static,
        partial: impl Fn(Value) -> SessionResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            commit: Arc::new(commit),
            partial: Arc::new(partial),
        }
    }

    pub fn from_handler(
        handler: impl Fn(Value, bool) -> SessionResult<()> + Send + Sync + 'static,
    ) -> Self {
        let handler = Arc::new(handler);
        let partial_handler = handler.clone();
        Self::new(
            move |value| handler(value, false),
            move |value| partial_handler(value, true),
        )
    }

    pub fn noop() -> Self {
        Self::new(|_| Ok(()), |_| Ok(()))
    }

    pub fn commit(&self, value: Value) -> SessionResult<()> {
        (self.commit)(value)
    }

    pub fn partial(&self, value: Value) -> SessionResult<()> {
        (self.partial)(value)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.commit, &other.commit) && Arc::ptr_eq(&self.partial, &other.partial)
    }
}

impl Debug for FieldChangeCallback {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldChangeCallback")
            .field("commit", &Arc::as_ptr(&self.commit))
            .field("partial", &Arc::as_ptr(&self.partial))
            .finish()
    }
}

/// Anything that can receive a field value. Plain closures have no partial
/// form, so their partial calls commit.
pub trait ChangeCallback {
    fn call(&self, value: Value) -> SessionResult<()>;

    fn call_partial(&self, value: Value) -> SessionResult<()> {
        self.call(value)
    }
}

impl ChangeCallback for FieldChangeCallback {
    fn call(&self, value: Value) -> SessionResult<()> {
        self.commit(value)
    }

    fn call_partial(&self, value: Value) -> SessionResult<()> {
        self.partial(value)
    }
}

impl<F> ChangeCallback for F
where
    F: Fn(Value) -> SessionResult<()>,
{
    fn call(&self, value: Value) -> SessionResult<()> {
        self(value)
    }
}

pub fn invoke_field_change_callback<C>(
    callback: Option<&C>,
    value: Value,
    partial: bool,
) -> SessionResult<()>
where
    C: ChangeCallback + ?Sized,
{
    let Some(callback) = callback else {
        return Ok(());
    };
    if partial {
        callback.call_partial(value)
    } else {
        callback.call(value)
    }
}

#[derive(Default)]
pub(super) struct CallbackCache {
    callbacks: BTreeMap<String, FieldChangeCallback>,
}

impl CallbackCache {
    pub(super) fn get(&self, field: &str) -> Option<FieldChangeCallback> {
        self.callbacks.get(field).cloned()
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub(super) fn clear(&mut self) {
        self.callbacks.clear();
    }
}

impl<M> FormSession<M>
where
    M: FormModel,
{
    /// Returns the change callback for `field`. Repeated calls hand out the
    /// same callback until the session is rebound or disposed.
    pub fn on_change_for(&self, field: &str) -> SessionResult<FieldChangeCallback> {
        self.ensure_live()?;
        let cached = read_lock(&self.callbacks, "reading change callbacks")?.get(field);
        if let Some(callback) = cached {
            return Ok(callback);
        }

        let mut cache = write_lock(&self.callbacks, "caching change callback")?;
        let callback = cache
            .callbacks
            .entry(field.to_owned())
            .or_insert_with(|| {
                trace!(session = %self.id, field, "creating change callback");
                self.make_change_callback(field)
            })
            .clone();
        Ok(callback)
    }

    #[cfg(test)]
    pub(super) fn cached_callback_count(&self) -> SessionResult<usize> {
        Ok(read_lock(&self.callbacks, "counting change callbacks")?.len())
    }

    fn make_change_callback(&self, field: &str) -> FieldChangeCallback {
        let commit_session = self.downgrade();
        let partial_session = self.downgrade();
        let commit_field = field.to_owned();
        let partial_field = field.to_owned();
        FieldChangeCallback::new(
            move |value| {
                let session = commit_session.upgrade()?;
                session.write_field(&commit_field, value)?;
                session.commit()
            },
            move |value| {
                let session = partial_session.upgrade()?;
                session.write_field(&partial_field, value)
            },
        )
    }
}
