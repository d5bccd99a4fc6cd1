use std::future::Future;

use futures::task::SpawnExt;
use tracing::{debug, warn};

use super::errors::translate_error_paths;
use super::model::{FormModel, SubmitResult};
use super::session::{FormSession, SessionError, SessionResult, read_lock, write_lock};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubmitOptions {
    pub if_modified: bool,
}

impl SubmitOptions {
    pub fn if_modified() -> Self {
        Self { if_modified: true }
    }
}

pub trait SubmitEvent {
    fn prevent_default(&mut self);
    fn stop_propagation(&mut self);
}

struct SubmittingGuard<'a, M>
where
    M: FormModel,
{
    session: &'a FormSession<M>,
}

impl<'a, M> SubmittingGuard<'a, M>
where
    M: FormModel,
{
    fn enter(session: &'a FormSession<M>) -> SessionResult<Self> {
        write_lock(&session.state, "entering submitting state")?.in_flight += 1;
        session.publish()?;
        Ok(Self { session })
    }
}

impl<M> Drop for SubmittingGuard<'_, M>
where
    M: FormModel,
{
    fn drop(&mut self) {
        let live = {
            let mut state = match self.session.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.in_flight = state.in_flight.saturating_sub(1);
            !state.disposed
        };
        if live && self.session.publish().is_err() {
            warn!(session = %self.session.id, "failed to publish end of submit");
        }
    }
}

impl<M> FormSession<M>
where
    M: FormModel,
{
    /// Runs the model's submit and applies its result.
    ///
    /// Returns `Ok(None)` when the submit was skipped (`if_modified` with no
    /// changes, or `before_submit` returned `false`) or the model declined.
    /// Overlapping calls are not serialized; use [`FormSession::submitting`]
    /// to keep triggers disabled while one is in flight. Hooks must not
    /// write to this session, see [`SessionError::HookReentry`].
    pub async fn submit(&self, options: SubmitOptions) -> SessionResult<Option<SubmitResult>> {
        self.ensure_live()?;
        if options.if_modified && !self.modified()? {
            debug!(session = %self.id, "submit skipped, session not modified");
            return Ok(None);
        }

        if let Some(before_submit) = self.hooks.before_submit.clone() {
            let proceed = {
                let _hook = self.enter_hook()?;
                let model = read_lock(&self.model, "running before-submit hook")?;
                before_submit(&model)
            };
            if !proceed {
                debug!(session = %self.id, "submit rejected by before-submit hook");
                return Ok(None);
            }
        }

        let _submitting = SubmittingGuard::enter(self)?;
        self.clear_errors(None)?;

        debug!(session = %self.id, "submitting form model");
        let pending = self.write_model("starting model submit")?.submit();
        let Some(result) = pending.await else {
            debug!(session = %self.id, "model declined submit");
            return Ok(None);
        };

        let result = {
            let model = read_lock(&self.model, "translating error paths")?;
            translate_error_paths(result, &model.error_paths())
        };
        self.apply_submit_result(&result)?;

        if let Some(after_submit) = self.hooks.after_submit.clone() {
            let _hook = self.enter_hook()?;
            let model = read_lock(&self.model, "running after-submit hook")?;
            after_submit(&result, &model);
        }

        Ok(Some(result))
    }

    pub fn submit_with_event<'a>(
        &'a self,
        event: &mut dyn SubmitEvent,
        options: SubmitOptions,
    ) -> impl Future<Output = SessionResult<Option<SubmitResult>>> + Send + use<'a, M> {
        event.prevent_default();
        event.stop_propagation();
        self.submit(options)
    }

    /// Starts a background submit when auto submit is on and the session is
    /// modified. The submit result is not reported back to the caller.
    pub fn commit(&self) -> SessionResult<()> {
        if !self.options.auto_submit || !self.modified()? {
            return Ok(());
        }
        let Some(spawner) = self.hooks.spawner.clone() else {
            return Err(SessionError::MissingSpawner);
        };

        let session = self.clone();
        spawner
            .spawn(async move {
                if let Err(error) = session.submit(SubmitOptions::default()).await {
                    warn!(session = %session.id, %error, "auto submit failed");
                }
            })
            .map_err(|error| {
                warn!(session = %self.id, %error, "could not spawn auto submit");
                SessionError::SpawnFailed(error.to_string())
            })
    }

    fn apply_submit_result(&self, result: &SubmitResult) -> SessionResult<()> {
        let live = self.is_live()?;
        if !live {
            warn!(session = %self.id, "submit finished after dispose, result not applied");
        }

        match result {
            SubmitResult::Ok { .. } => {
                debug!(session = %self.id, "submit succeeded");
                if live {
                    self.set_modified(false)?;
                }
                if self.options.reset_on_success {
                    self.write_model("resetting model after submit")?.reset();
                }
            }
            SubmitResult::Invalid { errors } => {
                debug!(session = %self.id, count = errors.len(), "submit returned field errors");
                if live {
                    self.replace_errors(errors.clone())?;
                }
            }
            SubmitResult::Error(error) => {
                debug!(session = %self.id, %error, "submit failed");
            }
        }
        Ok(())
    }
}
