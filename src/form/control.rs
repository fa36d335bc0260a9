use std::collections::BTreeMap;

use crate::config::{AsyncValidatorEntry, Config, ControlPlan, ValidatorEntry, merge_deep};
use crate::id::NodeId;
use crate::value::ModelValue;

use super::controller::Form;
use super::display::NodeFlags;
use super::engine::Engine;
use super::error::{FormError, FormResult};
use super::node::{FormNode, NodeKind, NodeRegistry};
use super::validation::{CUSTOM_ERROR_KEY, ConfigurableValidator, Validator, Validity};

/// Handle of one registered control.
///
/// Clones share the same node. Every accessor fails with
/// [`FormError::Detached`] once the control is unregistered.
#[derive(Clone, Debug)]
pub struct Control {
    pub(crate) engine: Engine,
    pub(crate) id: NodeId,
}

impl Control {
    pub(crate) fn new(engine: Engine, id: NodeId) -> Self {
        Self { engine, id }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The form this control registered with.
    pub fn form(&self) -> FormResult<Form> {
        let state = self.engine.read_lock("reading control parent")?;
        Ok(Form::new(self.engine.clone(), state.control(self.id)?.parent))
    }

    pub fn get_control_id(&self) -> FormResult<String> {
        let state = self.engine.read_lock("reading control id")?;
        Ok(state.control(self.id)?.control_id.clone())
    }

    pub fn has_validator(&self, name: &str) -> FormResult<bool> {
        let state = self.engine.read_lock("reading validators")?;
        let control = state.control(self.id)?;
        Ok(control.validators.contains_key(name) || control.async_validators.contains_key(name))
    }

    pub fn view_value(&self) -> FormResult<ModelValue> {
        let state = self.engine.read_lock("reading view value")?;
        Ok(state.control(self.id)?.view_value.clone())
    }

    /// Records a user edit.
    ///
    /// Controls configured with `update_on = "blur"` keep the edit buffered
    /// until [`Control::touch`]; others commit it right away.
    pub fn set_view_value(&self, view: impl Into<ModelValue>) -> FormResult<()> {
        let view = view.into();
        {
            let mut state = self.engine.write_lock("buffering view value")?;
            let control = state.control_mut(self.id)?;
            if control.updates_on_blur() {
                control.view_value = view.clone();
                control.buffered_view = Some(view);
                return Ok(());
            }
        }
        self.commit_view_value(view)
    }

    /// Marks the control touched and commits any buffered edit.
    pub fn touch(&self) -> FormResult<()> {
        let buffered = {
            let mut state = self.engine.write_lock("touching control")?;
            let control = state.control_mut(self.id)?;
            control.touched = true;
            control.buffered_view.take()
        };
        match buffered {
            Some(view) => self.commit_view_value(view),
            None => Ok(()),
        }
    }

    fn commit_view_value(&self, view: ModelValue) -> FormResult<()> {
        let parsers = {
            let mut state = self.engine.write_lock("committing view value")?;
            let control = state.control_mut(self.id)?;
            control.view_value = view.clone();
            control.buffered_view = None;
            control.parsers.clone()
        };
        let model = parsers
            .iter()
            .fold(view, |value, parser| parser.parse(value));
        {
            let mut state = self.engine.write_lock("writing parsed model value")?;
            let control = state.control_mut(self.id)?;
            control.dirty = true;
            let (parent, name) = (control.parent, control.name.clone());
            state.form_mut(parent)?.model.insert(name, model);
            state.mark_dirty(parent);
        }
        self.validate().map(|_| ())
    }

    /// Formats the form's current model value into the view and re-validates.
    pub(crate) fn render_from_model(&self) -> FormResult<()> {
        let (model, formatters) = {
            let state = self.engine.read_lock("reading model for render")?;
            (
                state.model_of(self.id)?.unwrap_or_default(),
                state.control(self.id)?.formatters.clone(),
            )
        };
        let view = formatters
            .iter()
            .fold(model, |value, formatter| formatter.format(value));
        {
            let mut state = self.engine.write_lock("rendering view value")?;
            let control = state.control_mut(self.id)?;
            control.view_value = view;
            control.buffered_view = None;
        }
        self.validate().map(|_| ())
    }

    pub fn is_touched(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading touched flag")?;
        Ok(state.control(self.id)?.touched)
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading dirty flag")?;
        Ok(state.control(self.id)?.dirty)
    }

    /// Invalid validation keys, if the form's display policy lets them show.
    ///
    /// `None` while the control is valid or pending, or while no flag the
    /// policy asks for is set on the control or its form chain.
    pub fn get_errors(&self) -> FormResult<Option<BTreeMap<String, bool>>> {
        let state = self.engine.read_lock("reading control errors")?;
        let control = state.control(self.id)?;
        let invalid: BTreeMap<String, bool> = control
            .validity
            .iter()
            .filter(|(_, validity)| **validity == Validity::Invalid)
            .map(|(key, _)| (key.clone(), true))
            .collect();
        if invalid.is_empty() {
            return Ok(None);
        }

        if let Some(policy) = state.display_policy(control.parent) {
            let own = NodeFlags {
                touched: control.touched,
                submitted: false,
                dirty: control.dirty,
            };
            if !policy.allows(&[own, state.form_flags(control.parent)]) {
                return Ok(None);
            }
        }
        Ok(Some(invalid))
    }

    /// Configured `(key, message)` pairs in installation order.
    pub fn get_error_messages(&self) -> FormResult<Vec<(String, String)>> {
        let state = self.engine.read_lock("reading error messages")?;
        Ok(state.control(self.id)?.error_messages.clone())
    }

    pub fn get_custom_error_message(&self) -> FormResult<Option<String>> {
        let state = self.engine.read_lock("reading custom error")?;
        Ok(state.control(self.id)?.custom_error.clone())
    }

    pub fn set_custom_error_message(&self, message: impl Into<String>) -> FormResult<()> {
        let mut state = self.engine.write_lock("setting custom error")?;
        let control = state.control_mut(self.id)?;
        control.custom_error = Some(message.into());
        control
            .validity
            .insert(CUSTOM_ERROR_KEY.to_owned(), Validity::Invalid);
        Ok(())
    }

    pub fn clear_custom_error_message(&self) -> FormResult<()> {
        let mut state = self.engine.write_lock("clearing custom error")?;
        let control = state.control_mut(self.id)?;
        if control.validity.get(CUSTOM_ERROR_KEY) == Some(&Validity::Invalid) {
            control.validity.remove(CUSTOM_ERROR_KEY);
            control.custom_error = None;
        }
        Ok(())
    }

    /// Disabled locally or through any enclosing form or group.
    pub fn is_disabled(&self) -> FormResult<bool> {
        self.engine
            .read_lock("reading disabled state")?
            .is_disabled(self.id)
    }

    pub fn enable(&self) -> FormResult<()> {
        self.set_disabled(false)
    }

    pub fn disable(&self) -> FormResult<()> {
        self.set_disabled(true)
    }

    fn set_disabled(&self, disabled: bool) -> FormResult<()> {
        let mut state = self.engine.write_lock("toggling control")?;
        state.control_mut(self.id)?.disabled = disabled;
        Ok(())
    }

    /// Unregisters the control from its form.
    pub fn destroy(&self) -> FormResult<()> {
        self.form()?.unregister_control(self).map(|_| ())
    }

    fn resolve_configurables(
        &self,
        plan: &ControlPlan,
    ) -> FormResult<Vec<(String, ConfigurableValidator, Validator)>> {
        let known = {
            let state = self.engine.read_lock("reading configurable validators")?;
            state.control(self.id)?.configurables.clone()
        };
        let mut resolved = Vec::new();
        for (name, entry) in &plan.validators {
            let ValidatorEntry::Configurable(factory) = entry else {
                continue;
            };
            if known.get(name).is_some_and(|installed| installed.same(factory)) {
                continue;
            }
            let validator = factory.configure(self, name)?;
            resolved.push((name.clone(), factory.clone(), validator));
        }
        Ok(resolved)
    }
}

impl FormNode for Control {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> FormResult<String> {
        let state = self.engine.read_lock("reading control name")?;
        Ok(state.control(self.id)?.name.clone())
    }

    /// Deep-merges `config` over the control's earlier configuration and
    /// applies the result, then re-validates once.
    fn configure(&self, config: Config) -> FormResult<()> {
        let (merged, debug, name) = {
            let state = self.engine.read_lock("reading control configuration")?;
            let control = state.control(self.id)?;
            (
                merge_deep(control.local_config.clone(), config),
                state.debug_enabled(control.parent),
                control.name.clone(),
            )
        };
        let plan = ControlPlan::from_config(&merged)?;
        let resolved = self.resolve_configurables(&plan)?;

        {
            let mut state = self.engine.write_lock("applying control configuration")?;
            let control = state.control_mut(self.id)?;

            for error in plan.errors {
                if !control.error_messages.contains(&error) {
                    control.error_messages.push(error);
                }
            }
            for parser in plan.parsers {
                if !control.parsers.iter().any(|installed| installed.same(&parser)) {
                    control.parsers.push(parser);
                }
            }
            for formatter in plan.formatters {
                if !control
                    .formatters
                    .iter()
                    .any(|installed| installed.same(&formatter))
                {
                    control.formatters.push(formatter);
                }
            }

            for (name, entry) in plan.validators {
                match entry {
                    ValidatorEntry::Install(validator) => {
                        control.configurables.remove(&name);
                        if !control
                            .validators
                            .get(&name)
                            .is_some_and(|installed| installed.same(&validator))
                        {
                            control.validators.insert(name, validator);
                        }
                    }
                    ValidatorEntry::Configurable(_) => {}
                    ValidatorEntry::Remove => {
                        control.validators.remove(&name);
                        control.configurables.remove(&name);
                        control.validity.remove(&name);
                    }
                }
            }
            for (name, factory, validator) in resolved {
                control.validators.insert(name.clone(), validator);
                control.configurables.insert(name, factory);
            }

            for (name, entry) in plan.async_validators {
                match entry {
                    AsyncValidatorEntry::Install(validator) => {
                        if !control
                            .async_validators
                            .get(&name)
                            .is_some_and(|installed| installed.same(&validator))
                        {
                            control.async_validators.insert(name, validator);
                        }
                    }
                    AsyncValidatorEntry::Remove => {
                        control.async_validators.remove(&name);
                        control.validity.remove(&name);
                    }
                }
            }

            control.model_options = plan.model_options;
            control.local_config = merged.clone().compact();
        }

        if debug {
            log::debug!("configured control `{name}` with {merged:?}");
        }
        self.validate().map(|_| ())
    }

    /// Untouched and pristine again. A supplied value is written through the
    /// form on the next settle.
    fn reset(&self, value: Option<ModelValue>) -> FormResult<()> {
        {
            let mut state = self.engine.write_lock("resetting control")?;
            let control = state.control_mut(self.id)?;
            control.touched = false;
            control.dirty = false;
            control.buffered_view = None;
        }
        self.set_model_value(value)?;
        self.validate().map(|_| ())
    }

    fn model_value(&self) -> FormResult<Option<ModelValue>> {
        self.engine.read_lock("reading model value")?.model_of(self.id)
    }

    fn set_model_value(&self, value: Option<ModelValue>) -> FormResult<()> {
        let Some(value) = value else {
            return Ok(());
        };
        self.form()?.schedule_model_write(self.name()?, value)
    }

    /// Text sets the custom error, null clears it.
    fn apply_custom_errors(&self, errors: &ModelValue) -> FormResult<()> {
        match errors {
            ModelValue::Text(message) => self.set_custom_error_message(message.clone()),
            ModelValue::Null => self.clear_custom_error_message(),
            other => Err(FormError::InvalidErrorMessageType(other.type_name())),
        }
    }

    fn clear_custom_errors(&self) -> FormResult<()> {
        self.clear_custom_error_message()
    }
}

impl NodeRegistry for Control {}
