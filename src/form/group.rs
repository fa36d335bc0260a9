use crate::config::{Config, merge_positional};
use crate::id::NodeId;
use crate::value::ModelValue;

use super::controller::{Form, FormOptions};
use super::engine::Engine;
use super::error::{FormError, FormResult};
use super::node::{FormNode, NodeKind, NodeRegistry};

/// Handle of a group of repeated sub-forms, addressed by position.
#[derive(Clone, Debug)]
pub struct FormGroup {
    pub(crate) engine: Engine,
    pub(crate) id: NodeId,
}

impl FormGroup {
    pub(crate) fn new(engine: Engine, id: NodeId) -> Self {
        Self { engine, id }
    }

    pub fn forms(&self) -> FormResult<Vec<Form>> {
        let state = self.engine.read_lock("listing group forms")?;
        Ok(state
            .group(self.id)?
            .members
            .iter()
            .map(|id| Form::new(self.engine.clone(), *id))
            .collect())
    }

    /// Values waiting for a child form that has not registered yet.
    pub fn overflow_len(&self) -> FormResult<usize> {
        let state = self.engine.read_lock("reading group overflow")?;
        Ok(state.group(self.id)?.overflow.len())
    }

    pub fn get_model_values(&self) -> FormResult<ModelValue> {
        self.forms()?
            .iter()
            .map(Form::get_model_values)
            .collect::<FormResult<Vec<_>>>()
            .map(ModelValue::List)
    }

    /// Hands each value to the child form at the same position. Values past
    /// the last child are kept for forms that register later. `Null` is ignored.
    pub fn set_model_values(&self, values: ModelValue) -> FormResult<()> {
        let values = match values {
            ModelValue::Null => return Ok(()),
            ModelValue::List(values) => values,
            other => {
                return Err(FormError::InvalidModelValuesType {
                    expected: "list",
                    found: other.type_name(),
                });
            }
        };

        let forms = self.forms()?;
        let mut values = values.into_iter();
        for form in &forms {
            match values.next() {
                Some(value) => form.set_model_values(value)?,
                None => break,
            }
        }

        let overflow: Vec<ModelValue> = values.collect();
        if !overflow.is_empty() {
            log::debug!("caching {} group values for later forms", overflow.len());
        }
        let mut state = self.engine.write_lock("caching group overflow")?;
        let group = state.group_mut(self.id)?;
        group.overflow.clear();
        group.overflow.extend(overflow);
        Ok(())
    }

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
        let mut state = self.engine.write_lock("toggling form group")?;
        state.group_mut(self.id)?.disabled = disabled;
        Ok(())
    }

    pub fn is_valid(&self) -> FormResult<bool> {
        for form in self.forms()? {
            if !form.is_valid()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn unregister_form(&self, form: &Form) -> FormResult<bool> {
        {
            let state = self.engine.read_lock("checking group membership")?;
            if !state.group(self.id)?.members.contains(&form.id) {
                return Ok(false);
            }
        }
        self.engine.detach(form.id)?;
        log::debug!("unregistered form {} from group", form.id);
        Ok(true)
    }

    pub fn destroy(&self) -> FormResult<()> {
        let name = self.name()?;
        self.engine.detach(self.id)?;
        log::debug!("destroyed form group `{name}`");
        Ok(())
    }

    fn list<'a>(&self, value: &'a ModelValue) -> FormResult<&'a [ModelValue]> {
        value
            .as_list()
            .ok_or_else(|| FormError::InvalidCustomErrorsType {
                kind: NodeKind::FormGroup,
                expected: "list",
                found: value.type_name(),
            })
    }
}

impl FormNode for FormGroup {
    fn kind(&self) -> NodeKind {
        NodeKind::FormGroup
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> FormResult<String> {
        let state = self.engine.read_lock("reading group name")?;
        Ok(state.group(self.id)?.name.clone())
    }

    /// Positional configuration: entry `n` configures the `n`th child form,
    /// now or when it registers.
    fn configure(&self, config: Config) -> FormResult<()> {
        let Config::List(items) = config else {
            return Err(FormError::InvalidConfigType {
                expected: "list",
                found: config.type_name(),
            });
        };
        {
            let mut state = self.engine.write_lock("caching group configuration")?;
            let group = state.group_mut(self.id)?;
            group.config = merge_positional(std::mem::take(&mut group.config), items.clone());
        }

        for (form, item) in self.forms()?.iter().zip(items) {
            form.configure(item)?;
        }
        Ok(())
    }

    fn reset(&self, values: Option<ModelValue>) -> FormResult<()> {
        let values = match values {
            None | Some(ModelValue::Null) => Vec::new(),
            Some(ModelValue::List(values)) => values,
            Some(other) => {
                return Err(FormError::InvalidModelValuesType {
                    expected: "list",
                    found: other.type_name(),
                });
            }
        };
        let mut values = values.into_iter();
        for form in self.forms()? {
            form.reset(values.next())?;
        }
        Ok(())
    }

    fn model_value(&self) -> FormResult<Option<ModelValue>> {
        self.get_model_values().map(Some)
    }

    fn set_model_value(&self, value: Option<ModelValue>) -> FormResult<()> {
        match value {
            Some(value) => self.set_model_values(value),
            None => Ok(()),
        }
    }

    fn apply_custom_errors(&self, errors: &ModelValue) -> FormResult<()> {
        let errors = self.list(errors)?;
        for (form, errors) in self.forms()?.iter().zip(errors) {
            if !errors.is_null() {
                form.apply_custom_errors(errors)?;
            }
        }
        Ok(())
    }

    fn clear_custom_errors(&self) -> FormResult<()> {
        for form in self.forms()? {
            form.clear_custom_errors()?;
        }
        Ok(())
    }
}

impl NodeRegistry for FormGroup {
    /// Child forms are positional, so names are not checked for collisions.
    fn register_form(&self, name: Option<&str>, options: FormOptions) -> FormResult<Form> {
        let (id, name, position) = {
            let mut state = self.engine.write_lock("registering group form")?;
            state.group(self.id)?;
            let (id, name) = state.insert_form(name, Some(self.id), options);
            let members = &mut state.group_mut(self.id)?.members;
            members.push(id);
            (id, name, members.len() - 1)
        };
        log::debug!("registered form `{name}` in group at {position}");

        let (cached, fragment) = {
            let mut state = self.engine.write_lock("reading group caches")?;
            let group = state.group_mut(self.id)?;
            (group.config.get(position).cloned(), group.overflow.pop_front())
        };
        let form = Form::new(self.engine.clone(), id);
        if let Some(cached) = cached {
            form.configure(cached)?;
        }
        if let Some(fragment) = fragment {
            form.set_model_values(fragment)?;
        }
        Ok(form)
    }
}
