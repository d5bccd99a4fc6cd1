use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::thread::{self, ThreadId};

use futures::task::Spawn;
use serde_json::Value;
use tracing::debug;

use super::callback::CallbackCache;
use super::data_source::{get_field_value, set_field_data};
use super::errors::ErrorStore;
use super::model::{FieldMap, FormError, FormModel, SubmitResult};

static SESSION_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn next() -> Self {
        Self(SESSION_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form-session-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Submitting,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FormOptions {
    pub auto_submit: bool,
    pub reset_on_success: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionError {
    StatePoisoned(&'static str),
    FieldType { field: String, message: String },
    ValueEncoding(String),
    MissingSpawner,
    SpawnFailed(String),
    Disposed,
    HookReentry,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::StatePoisoned(context) => {
                write!(f, "form session lock poisoned while {context}")
            }
            SessionError::FieldType { field, message } => {
                write!(f, "value rejected by field `{field}`: {message}")
            }
            SessionError::ValueEncoding(error) => {
                write!(f, "failed to encode field value: {error}")
            }
            SessionError::MissingSpawner => {
                f.write_str("auto submit requires a spawner to run commits on")
            }
            SessionError::SpawnFailed(error) => {
                write!(f, "failed to spawn commit submit: {error}")
            }
            SessionError::Disposed => f.write_str("form session has been disposed"),
            SessionError::HookReentry => {
                f.write_str("submit hooks cannot write to the session they run on")
            }
        }
    }
}

impl std::error::Error for SessionError {}

pub type SessionResult<T> = Result<T, SessionError>;

pub(super) type BeforeSubmitFn<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;
pub(super) type AfterSubmitFn<M> = Arc<dyn Fn(&SubmitResult, &M) + Send + Sync>;
pub(super) type SubscriberFn = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;
pub(super) type SharedSpawner = Arc<dyn Spawn + Send + Sync>;

pub(super) struct SessionHooks<M> {
    pub(super) before_submit: Option<BeforeSubmitFn<M>>,
    pub(super) after_submit: Option<AfterSubmitFn<M>>,
    pub(super) spawner: Option<SharedSpawner>,
}

pub(super) struct SessionState {
    pub(super) modified: bool,
    pub(super) in_flight: u32,
    pub(super) errors: ErrorStore,
    pub(super) initial_data: Option<Arc<FieldMap>>,
    pub(super) disposed: bool,
    pub(super) hook_threads: Vec<ThreadId>,
}

impl SessionState {
    pub(super) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            modified: self.modified,
            submitting: self.in_flight > 0,
            invalid: !self.errors.is_empty(),
            errors: self.errors.errors(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub modified: bool,
    pub submitting: bool,
    pub invalid: bool,
    pub errors: Arc<[FormError]>,
}

#[derive(Default)]
pub(super) struct SubscriberList {
    next_id: u64,
    entries: Vec<(u64, SubscriberFn)>,
}

/// Keeps a [`FormSession::subscribe`] callback registered until dropped.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<RwLock<SubscriberList>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        let mut subscribers = match subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.entries.retain(|(id, _)| *id != self.id);
    }
}

/// Clones share the same session.
pub struct FormSession<M>
where
    M: FormModel,
{
    pub(super) id: SessionId,
    pub(super) options: FormOptions,
    pub(super) model: Arc<RwLock<M>>,
    pub(super) state: Arc<RwLock<SessionState>>,
    pub(super) hooks: Arc<SessionHooks<M>>,
    pub(super) callbacks: Arc<RwLock<CallbackCache>>,
    pub(super) subscribers: Arc<RwLock<SubscriberList>>,
}

impl<M> Clone for FormSession<M>
where
    M: FormModel,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            options: self.options,
            model: self.model.clone(),
            state: self.state.clone(),
            hooks: self.hooks.clone(),
            callbacks: self.callbacks.clone(),
            subscribers: self.subscribers.clone(),
        }
    }
}

pub struct FormSessionBuilder<M>
where
    M: FormModel,
{
    model: M,
    options: FormOptions,
    initial_data: Option<Arc<FieldMap>>,
    before_submit: Option<BeforeSubmitFn<M>>,
    after_submit: Option<AfterSubmitFn<M>>,
    spawner: Option<SharedSpawner>,
}

impl<M> FormSessionBuilder<M>
where
    M: FormModel,
{
    pub fn options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    pub fn initial_data(mut self, data: impl Into<Arc<FieldMap>>) -> Self {
        self.initial_data = Some(data.into());
        self
    }

    /// Guard run before every submit; returning `false` aborts it.
    ///
    /// The hook sees the model under a read lock. Writes back into the same
    /// session from inside it fail with [`SessionError::HookReentry`].
    pub fn before_submit(mut self, hook: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        self.before_submit = Some(Arc::new(hook));
        self
    }

    /// Runs once for every result produced by the model. Same write
    /// restriction as [`FormSessionBuilder::before_submit`].
    pub fn after_submit(
        mut self,
        hook: impl Fn(&SubmitResult, &M) + Send + Sync + 'static,
    ) -> Self {
        self.after_submit = Some(Arc::new(hook));
        self
    }

    pub fn spawner(mut self, spawner: impl Spawn + Send + Sync + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    pub fn build(self) -> SessionResult<FormSession<M>> {
        if self.options.auto_submit && self.spawner.is_none() {
            return Err(SessionError::MissingSpawner);
        }

        let session = FormSession {
            id: SessionId::next(),
            options: self.options,
            model: Arc::new(RwLock::new(self.model)),
            state: Arc::new(RwLock::new(SessionState {
                modified: false,
                in_flight: 0,
                errors: ErrorStore::new(),
                initial_data: self.initial_data,
                disposed: false,
                hook_threads: Vec::new(),
            })),
            hooks: Arc::new(SessionHooks {
                before_submit: self.before_submit,
                after_submit: self.after_submit,
                spawner: self.spawner,
            }),
            callbacks: Arc::new(RwLock::new(CallbackCache::default())),
            subscribers: Arc::new(RwLock::new(SubscriberList::default())),
        };
        session.reset()?;
        Ok(session)
    }
}

impl<M> FormSession<M>
where
    M: FormModel,
{
    pub fn builder(model: M) -> FormSessionBuilder<M> {
        FormSessionBuilder {
            model,
            options: FormOptions::default(),
            initial_data: None,
            before_submit: None,
            after_submit: None,
            spawner: None,
        }
    }

    pub fn new(model: M, options: FormOptions) -> SessionResult<Self> {
        Self::builder(model).options(options).build()
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn with_model<R>(&self, f: impl FnOnce(&M) -> R) -> SessionResult<R> {
        let model = read_lock(&self.model, "reading model")?;
        Ok(f(&model))
    }

    /// Direct model access. Writes made here bypass the modified flag.
    pub fn with_model_mut<R>(&self, f: impl FnOnce(&mut M) -> R) -> SessionResult<R> {
        let mut model = self.write_model("mutating model")?;
        Ok(f(&mut model))
    }

    pub fn get_field_value(&self, field: &str) -> SessionResult<Option<Value>> {
        let model = read_lock(&self.model, "reading field value")?;
        Ok(get_field_value(&*model, field))
    }

    pub fn set_data(&self, data: FieldMap) -> SessionResult<()> {
        self.ensure_live()?;
        {
            let mut model = self.write_model("writing form data")?;
            set_field_data(&mut *model, data)?;
        }
        self.set_modified(true)
    }

    pub(super) fn write_field(&self, field: &str, value: Value) -> SessionResult<()> {
        let mut data = FieldMap::new();
        data.insert(field.to_owned(), value);
        self.set_data(data)
    }

    pub fn modified(&self) -> SessionResult<bool> {
        Ok(read_lock(&self.state, "reading modified flag")?.modified)
    }

    pub fn set_modified(&self, modified: bool) -> SessionResult<()> {
        {
            let mut state = write_lock(&self.state, "writing modified flag")?;
            if state.modified == modified {
                return Ok(());
            }
            state.modified = modified;
        }
        self.publish()
    }

    pub fn submitting(&self) -> SessionResult<bool> {
        Ok(read_lock(&self.state, "reading submitting flag")?.in_flight > 0)
    }

    pub fn submit_state(&self) -> SessionResult<SubmitState> {
        Ok(if self.submitting()? {
            SubmitState::Submitting
        } else {
            SubmitState::Idle
        })
    }

    pub fn invalid(&self) -> SessionResult<bool> {
        Ok(!read_lock(&self.state, "reading invalid flag")?
            .errors
            .is_empty())
    }

    pub fn errors(&self) -> SessionResult<Arc<[FormError]>> {
        Ok(read_lock(&self.state, "reading errors")?.errors.errors())
    }

    pub fn is_invalid(&self, field: &str) -> SessionResult<bool> {
        Ok(read_lock(&self.state, "checking field validity")?
            .errors
            .is_invalid(field))
    }

    pub fn errors_for(&self, field: &str, include_children: bool) -> SessionResult<Vec<FormError>> {
        Ok(read_lock(&self.state, "reading field errors")?
            .errors
            .errors_for(field, include_children))
    }

    pub fn add_error(&self, error: FormError) -> SessionResult<()> {
        write_lock(&self.state, "adding error")?
            .errors
            .add_error(error);
        self.publish()
    }

    pub fn clear_errors(&self, field: Option<&str>) -> SessionResult<()> {
        let changed = write_lock(&self.state, "clearing errors")?
            .errors
            .clear_errors(field);
        if changed {
            self.publish()?;
        }
        Ok(())
    }

    pub(super) fn replace_errors(&self, errors: Vec<FormError>) -> SessionResult<()> {
        write_lock(&self.state, "replacing errors")?
            .errors
            .replace(errors);
        self.publish()
    }

    pub fn reset(&self) -> SessionResult<()> {
        self.ensure_live()?;
        let initial_data = read_lock(&self.state, "reading initial data")?
            .initial_data
            .clone();
        {
            let mut model = self.write_model("resetting model")?;
            model.reset();
            if let Some(data) = initial_data {
                set_field_data(&mut *model, FieldMap::clone(&data))?;
            }
        }
        {
            let mut state = write_lock(&self.state, "resetting session state")?;
            state.errors.clear_errors(None);
            state.modified = false;
        }
        debug!(session = %self.id, "form session reset");
        self.publish()
    }

    /// Replaces the initial data and resets, unless `data` is the same
    /// allocation as the current initial data. Returns whether a reset ran.
    pub fn set_initial_data(&self, data: Option<Arc<FieldMap>>) -> SessionResult<bool> {
        self.ensure_live()?;
        {
            let mut state = write_lock(&self.state, "replacing initial data")?;
            let unchanged = match (&state.initial_data, &data) {
                (None, None) => true,
                (Some(current), Some(next)) => Arc::ptr_eq(current, next),
                _ => false,
            };
            if unchanged {
                return Ok(false);
            }
            state.initial_data = data;
        }
        self.reset()?;
        Ok(true)
    }

    pub fn rebind(&self, model: M) -> SessionResult<M> {
        self.ensure_live()?;
        let previous = {
            let mut current = self.write_model("rebinding model")?;
            std::mem::replace(&mut *current, model)
        };
        write_lock(&self.callbacks, "invalidating change callbacks")?.clear();
        debug!(session = %self.id, "form session rebound to a new model");
        self.reset()?;
        Ok(previous)
    }

    pub fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        Ok(read_lock(&self.state, "creating session snapshot")?.snapshot())
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionSnapshot) + Send + Sync + 'static,
    ) -> SessionResult<Subscription> {
        let mut subscribers = write_lock(&self.subscribers, "registering subscriber")?;
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, Arc::new(listener)));
        Ok(Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        })
    }

    /// Marks the session dead and releases cached callbacks and subscribers.
    /// Submits still in flight finish without touching session state.
    pub fn dispose(&self) -> SessionResult<()> {
        write_lock(&self.state, "disposing session")?.disposed = true;
        write_lock(&self.callbacks, "releasing change callbacks")?.clear();
        write_lock(&self.subscribers, "releasing subscribers")?
            .entries
            .clear();
        debug!(session = %self.id, "form session disposed");
        Ok(())
    }

    pub fn is_live(&self) -> SessionResult<bool> {
        Ok(!read_lock(&self.state, "checking liveness")?.disposed)
    }

    pub(super) fn ensure_live(&self) -> SessionResult<()> {
        if self.is_live()? {
            Ok(())
        } else {
            Err(SessionError::Disposed)
        }
    }

    pub(super) fn write_model(
        &self,
        context: &'static str,
    ) -> SessionResult<RwLockWriteGuard<'_, M>> {
        let current = thread::current().id();
        if read_lock(&self.state, "checking hook reentry")?
            .hook_threads
            .contains(&current)
        {
            return Err(SessionError::HookReentry);
        }
        write_lock(&self.model, context)
    }

    pub(super) fn enter_hook(&self) -> SessionResult<HookScope<'_, M>> {
        write_lock(&self.state, "entering submit hook")?
            .hook_threads
            .push(thread::current().id());
        Ok(HookScope { session: self })
    }

    pub(super) fn downgrade(&self) -> WeakFormSession<M> {
        WeakFormSession {
            id: self.id,
            options: self.options,
            model: Arc::downgrade(&self.model),
            state: Arc::downgrade(&self.state),
            hooks: Arc::downgrade(&self.hooks),
            callbacks: Arc::downgrade(&self.callbacks),
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub(super) fn publish(&self) -> SessionResult<()> {
        let snapshot = self.snapshot()?;
        let listeners = read_lock(&self.subscribers, "collecting subscribers")?
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(&snapshot);
        }
        Ok(())
    }
}

pub(super) struct HookScope<'a, M>
where
    M: FormModel,
{
    session: &'a FormSession<M>,
}

impl<M> Drop for HookScope<'_, M>
where
    M: FormModel,
{
    fn drop(&mut self) {
        let mut state = match self.session.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = thread::current().id();
        if let Some(index) = state.hook_threads.iter().position(|id| *id == current) {
            state.hook_threads.swap_remove(index);
        }
    }
}

pub(super) struct WeakFormSession<M>
where
    M: FormModel,
{
    id: SessionId,
    options: FormOptions,
    model: Weak<RwLock<M>>,
    state: Weak<RwLock<SessionState>>,
    hooks: Weak<SessionHooks<M>>,
    callbacks: Weak<RwLock<CallbackCache>>,
    subscribers: Weak<RwLock<SubscriberList>>,
}

impl<M> WeakFormSession<M>
where
    M: FormModel,
{
    pub(super) fn upgrade(&self) -> SessionResult<FormSession<M>> {
        let (Some(model), Some(state), Some(hooks), Some(callbacks), Some(subscribers)) = (
            self.model.upgrade(),
            self.state.upgrade(),
            self.hooks.upgrade(),
            self.callbacks.upgrade(),
            self.subscribers.upgrade(),
        ) else {
            return Err(SessionError::Disposed);
        };
        Ok(FormSession {
            id: self.id,
            options: self.options,
            model,
            state,
            hooks,
            callbacks,
            subscribers,
        })
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> SessionResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| SessionError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> SessionResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| SessionError::StatePoisoned(context))
}
