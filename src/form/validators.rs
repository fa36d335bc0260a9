//! Ready-made validators.

use crate::config::{Config, VALIDATORS};

use super::control::Control;
use super::error::{FormError, FormResult};
use super::node::FormNode;
use super::validation::{ConfigurableValidator, ValidationScope, Validator};

/// Fails while the view value is null, empty text or an empty collection.
pub fn required() -> Validator {
    Validator::new(|_, view| !view.is_empty())
}

/// Empty values pass; pair with [`required`] to reject them.
pub fn min_length(min: usize) -> Validator {
    Validator::new(move |_, view| view.is_empty() || view.len().is_none_or(|len| len >= min))
}

pub fn max_length(max: usize) -> Validator {
    Validator::new(move |_, view| view.len().is_none_or(|len| len <= max))
}

/// Requires the control's view value to equal the view value of the sibling
/// control `independent`.
///
/// The comparison runs on the next settle and sets the validity key out of
/// band, so the validator itself always reports success. The first run also
/// installs a validator on `independent` that re-validates this control
/// whenever `independent` changes.
pub fn match_control(independent: impl Into<String>) -> ConfigurableValidator {
    let independent = independent.into();
    ConfigurableValidator::new(move |_control, key| {
        let independent = independent.clone();
        let key = key.to_owned();
        Ok(Validator::with_scope(move |scope| {
            check_match(scope, &independent, &key)
        }))
    })
}

fn check_match(scope: &ValidationScope<'_>, independent: &str, key: &str) -> bool {
    let dependent = scope.control();
    let Ok(name) = dependent.name() else {
        return false;
    };
    if name == independent {
        log::warn!("control `{name}` cannot match itself");
        return true;
    }

    let other = match dependent.form().and_then(|form| form.get_control(independent)) {
        Ok(Some(other)) => other,
        Ok(None) | Err(_) => {
            log::debug!("`{name}` cannot match `{independent}`: no such control");
            return false;
        }
    };

    if let Err(error) = watch_independent(&other, key, &name) {
        log::debug!("failed to watch `{independent}` for `{name}`: {error}");
    }

    let dependent = dependent.clone();
    let key = key.to_owned();
    let scheduled = dependent
        .engine
        .clone()
        .defer(move |_| compare_views(&dependent, &other, &key));
    if let Err(error) = scheduled {
        log::debug!("failed to schedule match for `{name}`: {error}");
    }
    true
}

/// Installs, once, a pass-through validator on `independent` that re-validates `dependent`.
fn watch_independent(independent: &Control, key: &str, dependent: &str) -> FormResult<()> {
    let watch_key = format!("{key}:{dependent}");
    if independent.has_validator(&watch_key)? {
        return Ok(());
    }

    let dependent = dependent.to_owned();
    let watcher = Validator::with_scope(move |scope| {
        let sibling = scope
            .control()
            .form()
            .and_then(|form| form.get_control(&dependent));
        if let Ok(Some(sibling)) = sibling {
            if let Err(error) = sibling.schedule_validation() {
                log::debug!("failed to re-validate `{dependent}`: {error}");
            }
        }
        true
    });
    independent.configure(Config::map().with(VALIDATORS, Config::map().with(watch_key, watcher)))
}

fn compare_views(dependent: &Control, independent: &Control, key: &str) -> FormResult<()> {
    let compare = || -> FormResult<()> {
        let equal = dependent.view_value()? == independent.view_value()?;
        dependent.set_validity(key, equal)
    };
    // Either side may have been unregistered before the queue drained.
    match compare() {
        Err(FormError::Detached(_)) => Ok(()),
        other => other,
    }
}
