use std::pin::pin;
use std::sync::Arc;

use futures::future::{Either, poll_fn, select};
use futures_timer::Delay;

use crate::id::NodeId;
use crate::value::ModelValue;

use super::controller::Form;
use super::engine::{EngineState, FormState};
use super::error::{BoxError, FormError, FormResult};
use super::node::FormNode;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Submitting,
    AwaitingValidators,
}

/// Broadcast to a submitting form and every form below it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitEvent {
    Begun,
    Ended,
}

pub type SubmitListener = Arc<dyn Fn(SubmitEvent) + Send + Sync>;

impl Form {
    pub fn on_submit_event(
        &self,
        listener: impl Fn(SubmitEvent) + Send + Sync + 'static,
    ) -> FormResult<()> {
        let mut state = self.engine.write_lock("adding submit listener")?;
        state.form_mut(self.id)?.listeners.push(Arc::new(listener));
        Ok(())
    }

    pub fn submit_state(&self) -> FormResult<SubmitState> {
        let state = self.engine.read_lock("reading submit state")?;
        Ok(state.form(self.id)?.submit_state)
    }

    /// True while this form, or a form it is nested in, is submitting.
    pub fn is_submitting(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading submit state")?;
        Ok(state.form(self.id)?.is_submitting())
    }

    /// Validates the form tree and hands its values to `handler`.
    ///
    /// The form stays disabled until the returned future completes or is
    /// dropped. Pending async validators are awaited first, bounded by
    /// [`FormOptions::validation_timeout`](super::FormOptions) when set. A
    /// handler returning `Ok(Some(errors))` has `errors` applied as custom
    /// error messages.
    pub async fn submit<F, Fut>(&self, handler: F) -> FormResult<()>
    where
        F: FnOnce(ModelValue) -> Fut,
        Fut: Future<Output = Result<Option<ModelValue>, BoxError>>,
    {
        self.begin_submit()?;
        let _guard = SubmitGuard { form: self };

        self.clear_custom_errors()?;
        self.transition(SubmitState::AwaitingValidators)?;
        self.await_validators().await?;
        if !self.is_valid()? {
            log::debug!("submit of {} stopped: form is invalid", self.id);
            return Err(FormError::FormInvalid);
        }

        self.transition(SubmitState::Submitting)?;
        let values = self.get_model_values()?;
        if let Some(errors) = handler(values).await.map_err(FormError::Handler)? {
            self.apply_custom_errors(&errors)?;
        }
        Ok(())
    }

    fn begin_submit(&self) -> FormResult<()> {
        let (natives, listeners) = {
            let mut state = self.engine.write_lock("preparing submit")?;
            let form = state.form_mut(self.id)?;
            if form.is_submitting() {
                return Err(FormError::SubmitInProgress);
            }
            transition_submit_state(form, SubmitState::Submitting)?;
            form.disabled_before_submit = Some(form.disabled);
            form.disabled = true;

            let mut natives = Vec::new();
            let mut listeners = Vec::new();
            for id in forms_below(&state, self.id) {
                let form = state.form_mut(id)?;
                form.submitted = true;
                if id != self.id {
                    form.enclosing_submits += 1;
                }
                natives.extend(form.native.clone());
                listeners.extend(form.listeners.iter().cloned());
            }
            (natives, listeners)
        };

        for native in natives {
            native.set_submitted(true);
        }
        for listener in listeners {
            listener(SubmitEvent::Begun);
        }
        Ok(())
    }

    fn end_submit(&self) -> FormResult<()> {
        let listeners = {
            let mut state = self.engine.write_lock("completing submit")?;
            let forms = forms_below(&state, self.id);
            let form = state.form_mut(self.id)?;
            transition_submit_state(form, SubmitState::Idle)?;
            if let Some(disabled) = form.disabled_before_submit.take() {
                form.disabled = disabled;
            }

            let mut listeners = Vec::new();
            for id in forms {
                let form = state.form_mut(id)?;
                if id != self.id {
                    form.enclosing_submits = form.enclosing_submits.saturating_sub(1);
                }
                listeners.extend(form.listeners.iter().cloned());
            }
            listeners
        };

        for listener in listeners {
            listener(SubmitEvent::Ended);
        }
        Ok(())
    }

    fn transition(&self, next: SubmitState) -> FormResult<()> {
        let mut state = self.engine.write_lock("moving submit state")?;
        transition_submit_state(state.form_mut(self.id)?, next)
    }

    async fn await_validators(&self) -> FormResult<()> {
        let timeout = {
            let state = self.engine.read_lock("reading validation timeout")?;
            state.form(self.id)?.options.validation_timeout
        };
        let engine = self.engine.clone();
        let root = self.id;
        let converge = poll_fn(move |cx| engine.drive(root, cx));

        let Some(limit) = timeout else {
            return converge.await;
        };
        match select(pin!(converge), pin!(Delay::new(limit))).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => {
                log::debug!("validators under {} still pending after {limit:?}", self.id);
                Err(FormError::ValidationTimeout(limit))
            }
        }
    }
}

/// Ends the submit cycle when the submit future finishes or is dropped.
struct SubmitGuard<'a> {
    form: &'a Form,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.form.end_submit() {
            log::warn!("failed to end submit of {}: {error}", self.form.id);
        }
    }
}

fn forms_below(state: &EngineState, root: NodeId) -> Vec<NodeId> {
    state
        .subtree(root)
        .into_iter()
        .filter(|id| state.form(*id).is_ok())
        .collect()
}

pub(super) fn transition_submit_state(state: &mut FormState, next: SubmitState) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Submitting)
            | (SubmitState::Submitting, SubmitState::AwaitingValidators)
            | (SubmitState::AwaitingValidators, SubmitState::Submitting)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}
