use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::task::noop_waker_ref;

use crate::id::NodeId;
use crate::value::ModelValue;

use super::control::Control;
use super::error::FormResult;

/// Validation key set by custom error messages.
pub const CUSTOM_ERROR_KEY: &str = "custom";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Validity {
    Valid,
    Invalid,
    Pending,
}

impl Validity {
    pub fn from_outcome(valid: bool) -> Self {
        if valid {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }
}

/// What a validator sees while it runs.
pub struct ValidationScope<'a> {
    pub(crate) control: &'a Control,
    pub(crate) model: &'a ModelValue,
    pub(crate) view: &'a ModelValue,
}

impl<'a> ValidationScope<'a> {
    pub fn control(&self) -> &'a Control {
        self.control
    }

    pub fn model_value(&self) -> &'a ModelValue {
        self.model
    }

    pub fn view_value(&self) -> &'a ModelValue {
        self.view
    }
}

type ParserFn = dyn Fn(ModelValue) -> ModelValue + Send + Sync;
type FormatterFn = dyn Fn(ModelValue) -> ModelValue + Send + Sync;
type ValidatorFn = dyn Fn(&ValidationScope<'_>) -> bool + Send + Sync;
type AsyncValidatorFn = dyn Fn(&ModelValue, &ModelValue) -> BoxFuture<'static, bool> + Send + Sync;
type ConfigureFn = dyn Fn(&Control, &str) -> FormResult<Validator> + Send + Sync;

/// Converts a view value into a model value. Parsers run in installation order.
#[derive(Clone)]
pub struct Parser(Arc<ParserFn>);

impl Parser {
    pub fn new(parse: impl Fn(ModelValue) -> ModelValue + Send + Sync + 'static) -> Self {
        Self(Arc::new(parse))
    }

    pub fn parse(&self, view: ModelValue) -> ModelValue {
        (self.0)(view)
    }

    /// Identity comparison: clones of one parser are the same parser.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Converts a model value into a view value. Formatters run in installation order.
#[derive(Clone)]
pub struct Formatter(Arc<FormatterFn>);

impl Formatter {
    pub fn new(format: impl Fn(ModelValue) -> ModelValue + Send + Sync + 'static) -> Self {
        Self(Arc::new(format))
    }

    pub fn format(&self, model: ModelValue) -> ModelValue {
        (self.0)(model)
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A synchronous validation predicate.
#[derive(Clone)]
pub struct Validator(Arc<ValidatorFn>);

impl Validator {
    /// Predicate over `(model_value, view_value)`.
    pub fn new(check: impl Fn(&ModelValue, &ModelValue) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(move |scope: &ValidationScope<'_>| {
            check(scope.model, scope.view)
        }))
    }

    /// Predicate with access to the control being validated.
    pub fn with_scope(
        check: impl Fn(&ValidationScope<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(check))
    }

    pub fn check(&self, scope: &ValidationScope<'_>) -> bool {
        (self.0)(scope)
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A validator whose verdict arrives later.
#[derive(Clone)]
pub struct AsyncValidator(Arc<AsyncValidatorFn>);

impl AsyncValidator {
    pub fn new(
        start: impl Fn(&ModelValue, &ModelValue) -> BoxFuture<'static, bool>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self(Arc::new(start))
    }

    pub fn start(&self, model: &ModelValue, view: &ModelValue) -> BoxFuture<'static, bool> {
        (self.0)(model, view)
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A validator built against the control it is installed on.
///
/// The factory runs once per validator name when the control is configured
/// and receives the control and the name it is installed under.
#[derive(Clone)]
pub struct ConfigurableValidator(Arc<ConfigureFn>);

impl ConfigurableValidator {
    pub fn new(
        configure: impl Fn(&Control, &str) -> FormResult<Validator> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(configure))
    }

    pub fn configure(&self, control: &Control, key: &str) -> FormResult<Validator> {
        (self.0)(control, key)
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

macro_rules! opaque_debug {
    ($($type:ty),*) => {
        $(
            impl fmt::Debug for $type {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(concat!(stringify!($type), "(..)"))
                }
            }
        )*
    };
}

opaque_debug!(Parser, Formatter, Validator, AsyncValidator, ConfigurableValidator);

/// An async validator that has started but not finished.
pub(crate) struct PendingValidation {
    pub(crate) control: NodeId,
    pub(crate) key: String,
    pub(crate) ticket: u64,
    pub(crate) future: BoxFuture<'static, bool>,
}

impl Control {
    /// Runs every installed validator against the current values.
    ///
    /// Async validators only start when all synchronous validators pass.
    /// Results from a previous run that are still pending are discarded.
    pub fn validate(&self) -> FormResult<bool> {
        let (model, view, validators, async_validators) = {
            let state = self.engine.read_lock("reading control for validation")?;
            let control = state.control(self.id)?;
            (
                state.model_of(self.id)?.unwrap_or_default(),
                control.view_value.clone(),
                control.validators.clone(),
                control.async_validators.clone(),
            )
        };

        let scope = ValidationScope {
            control: self,
            model: &model,
            view: &view,
        };
        let mut results = BTreeMap::new();
        for (key, validator) in &validators {
            results.insert(key.clone(), validator.check(&scope));
        }

        let mut started = Vec::new();
        if results.values().all(|valid| *valid) {
            let mut cx = Context::from_waker(noop_waker_ref());
            for (key, validator) in &async_validators {
                let mut future = validator.start(&model, &view);
                match future.as_mut().poll(&mut cx) {
                    Poll::Ready(valid) => {
                        results.insert(key.clone(), valid);
                    }
                    Poll::Pending => started.push((key.clone(), future)),
                }
            }
        }

        let ticket = {
            let mut state = self.engine.write_lock("recording validation result")?;
            let control = state.control_mut(self.id)?;
            control.ticket += 1;
            control.validity.retain(|key, _| key == CUSTOM_ERROR_KEY);
            for (key, valid) in results {
                control.validity.insert(key, Validity::from_outcome(valid));
            }
            for (key, _) in &started {
                control.validity.insert(key.clone(), Validity::Pending);
            }
            control.ticket
        };

        let pending = started
            .into_iter()
            .map(|(key, future)| PendingValidation {
                control: self.id,
                key,
                ticket,
                future,
            })
            .collect();
        self.engine.replace_pending(self.id, pending)?;
        self.is_valid()
    }

    /// Queues a validation run for the next settle.
    pub fn schedule_validation(&self) -> FormResult<()> {
        let control = self.clone();
        self.engine.defer(move |engine| {
            if !engine.contains(control.id)? {
                return Ok(());
            }
            control.validate().map(|_| ())
        })
    }

    /// Overwrites one key's validity outside a validation run.
    pub(crate) fn set_validity(&self, key: &str, valid: bool) -> FormResult<()> {
        let mut state = self.engine.write_lock("setting validity")?;
        let control = state.control_mut(self.id)?;
        control
            .validity
            .insert(key.to_owned(), Validity::from_outcome(valid));
        Ok(())
    }

    pub fn is_valid(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading control validity")?;
        Ok(state.control(self.id)?.is_valid())
    }

    pub fn is_pending(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading control pending state")?;
        Ok(state
            .control(self.id)?
            .validity
            .values()
            .any(|validity| *validity == Validity::Pending))
    }

    pub fn validity(&self, key: &str) -> FormResult<Option<Validity>> {
        let state = self.engine.read_lock("reading validity")?;
        Ok(state.control(self.id)?.validity.get(key).copied())
    }
}
