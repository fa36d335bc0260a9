use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, merge_deep, merge_positional};
use crate::id::NodeId;
use crate::value::{FormValues, ModelValue};

use super::binding::{BoundModel, ModelBinding, NativeForm};
use super::control::Control;
use super::display::ErrorDisplayPolicy;
use super::engine::{BindingState, ControlState, Engine, GroupState, Node};
use super::error::{FormError, FormResult};
use super::group::FormGroup;
use super::node::{FormNode, Member, NodeKind, NodeRegistry};
use super::validation::Validity;

#[derive(Clone, Debug, Default)]
pub struct FormOptions {
    /// Flags that make errors visible. Inherited by nested forms that set none.
    pub show_errors_on: Option<ErrorDisplayPolicy>,
    /// Logs every control configuration.
    pub debug: bool,
    /// Upper bound for waiting on async validators during submit.
    pub validation_timeout: Option<Duration>,
}

impl FormOptions {
    pub fn show_errors_on(mut self, policy: ErrorDisplayPolicy) -> Self {
        self.show_errors_on = Some(policy);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = Some(timeout);
        self
    }
}

/// Handle of a form: the registry of controls, bindings, nested forms and groups.
#[derive(Clone, Debug)]
pub struct Form {
    pub(crate) engine: Engine,
    pub(crate) id: NodeId,
}

impl Form {
    pub(crate) fn new(engine: Engine, id: NodeId) -> Self {
        Self { engine, id }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The form or group this form registered with, if any.
    pub fn parent(&self) -> FormResult<Option<Member>> {
        let parent = self.engine.read_lock("reading form parent")?.form(self.id)?.parent;
        parent
            .map(|parent| Member::resolve(&self.engine, parent))
            .transpose()
    }

    pub fn members(&self) -> FormResult<Vec<Member>> {
        let members = {
            let state = self.engine.read_lock("listing form members")?;
            state.form(self.id)?.members.clone()
        };
        members
            .into_iter()
            .map(|id| Member::resolve(&self.engine, id))
            .collect()
    }

    fn members_named(&self, name: &str) -> FormResult<Vec<Member>> {
        let ids: Vec<NodeId> = {
            let state = self.engine.read_lock("finding members by name")?;
            state
                .named_members(self.id)?
                .into_iter()
                .filter(|(_, member)| member == name)
                .map(|(id, _)| id)
                .collect()
        };
        ids.into_iter()
            .map(|id| Member::resolve(&self.engine, id))
            .collect()
    }

    fn member_id(
        &self,
        name: &str,
        filter: impl Fn(&Node) -> bool,
    ) -> FormResult<Option<NodeId>> {
        let state = self.engine.read_lock("looking up member")?;
        Ok(state.find_member(self.id, name, filter)?.map(|(id, _)| id))
    }

    pub fn get_control(&self, name: &str) -> FormResult<Option<Control>> {
        Ok(self
            .member_id(name, |node| matches!(node, Node::Control(_)))?
            .map(|id| Control::new(self.engine.clone(), id)))
    }

    pub fn get_form(&self, name: &str) -> FormResult<Option<Form>> {
        Ok(self
            .member_id(name, |node| matches!(node, Node::Form(_)))?
            .map(|id| Form::new(self.engine.clone(), id)))
    }

    pub fn get_group(&self, name: &str) -> FormResult<Option<FormGroup>> {
        Ok(self
            .member_id(name, |node| matches!(node, Node::Group(_)))?
            .map(|id| FormGroup::new(self.engine.clone(), id)))
    }

    /// Member values keyed by name. Members without a value are left out.
    pub fn get_model_values(&self) -> FormResult<ModelValue> {
        let mut values = BTreeMap::new();
        for member in self.members()? {
            if let Some(value) = member.model_value()? {
                values.insert(member.name()?, value);
            }
        }
        Ok(ModelValue::Map(values))
    }

    /// Distributes a map of values to the members of the same name.
    ///
    /// Nested forms and groups receive their fragment immediately. Control
    /// values, and values for names nobody registered yet, are written to the
    /// model map on the next [`Engine::settle`]. `Null` is ignored.
    pub fn set_model_values(&self, values: ModelValue) -> FormResult<()> {
        let entries = match values {
            ModelValue::Null => return Ok(()),
            ModelValue::Map(entries) => entries,
            other => {
                return Err(FormError::InvalidModelValuesType {
                    expected: "map",
                    found: other.type_name(),
                });
            }
        };

        {
            let mut state = self.engine.write_lock("storing model snapshot")?;
            state.form_mut(self.id)?.snapshot = entries.clone();
        }

        for (name, value) in entries {
            let container = {
                let state = self.engine.read_lock("routing model values")?;
                state.find_member(self.id, &name, |node| node.kind() != NodeKind::Control)?
            };
            match container {
                Some((id, _)) => Member::resolve(&self.engine, id)?.set_model_value(Some(value))?,
                None => self.schedule_model_write(name, value)?,
            }
        }
        Ok(())
    }

    pub fn model_values_as<T: FormValues>(&self) -> FormResult<T> {
        let values = self.get_model_values()?;
        T::from_model_values(&values).ok_or(FormError::InvalidModelValuesType {
            expected: std::any::type_name::<T>(),
            found: values.type_name(),
        })
    }

    pub fn set_model_values_from<T: FormValues>(&self, values: &T) -> FormResult<()> {
        self.set_model_values(values.to_model_values())
    }

    /// Queues a write of `name` into the model map.
    pub(crate) fn schedule_model_write(&self, name: String, value: ModelValue) -> FormResult<()> {
        let form = self.clone();
        self.engine.defer(move |engine| {
            if !engine.contains(form.id)? {
                return Ok(());
            }
            form.commit_model_value(&name, value)
        })
    }

    /// Stores `value` under `name` and pushes it to every member bound to that name.
    fn commit_model_value(&self, name: &str, value: ModelValue) -> FormResult<()> {
        let (controls, bindings) = {
            let mut state = self.engine.write_lock("committing model value")?;
            state
                .form_mut(self.id)?
                .model
                .insert(name.to_owned(), value.clone());

            let mut controls = Vec::new();
            let mut bindings = Vec::new();
            for id in &state.form(self.id)?.members {
                match state.node(*id)? {
                    Node::Control(control) if control.name == name => controls.push(*id),
                    Node::Binding(binding) if binding.name == name => {
                        bindings.push(Arc::clone(&binding.binding));
                    }
                    _ => {}
                }
            }
            (controls, bindings)
        };

        for binding in bindings {
            binding.set_model_value(value.clone());
        }
        for id in controls {
            Control::new(self.engine.clone(), id).render_from_model()?;
        }
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

    pub(crate) fn set_disabled(&self, disabled: bool) -> FormResult<()> {
        let mut state = self.engine.write_lock("toggling form")?;
        state.form_mut(self.id)?.disabled = disabled;
        Ok(())
    }

    /// Every control below this form is valid.
    pub fn is_valid(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading form validity")?;
        Ok(state
            .subtree(self.id)
            .into_iter()
            .filter_map(|id| state.control(id).ok())
            .all(ControlState::is_valid))
    }

    pub fn is_pending(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading form pending state")?;
        Ok(state
            .subtree(self.id)
            .into_iter()
            .filter_map(|id| state.control(id).ok())
            .any(|control| control.validity.values().any(|v| *v == Validity::Pending)))
    }

    pub fn is_submitted(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading submitted flag")?;
        Ok(state.form(self.id)?.submitted)
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        let state = self.engine.read_lock("reading dirty flag")?;
        Ok(state.form(self.id)?.dirty)
    }

    /// Attaches the host's form object. Only one may be bound.
    pub fn bind_native_form(&self, native: Arc<dyn NativeForm>) -> FormResult<()> {
        let mut state = self.engine.write_lock("binding native form")?;
        let form = state.form_mut(self.id)?;
        if form.native.is_some() {
            return Err(FormError::NativeFormAlreadyBound(form.name.clone()));
        }
        form.native = Some(native);
        Ok(())
    }

    pub(crate) fn native(&self) -> FormResult<Option<Arc<dyn NativeForm>>> {
        let state = self.engine.read_lock("reading native form")?;
        Ok(state.form(self.id)?.native.clone())
    }

    pub fn unregister_control(&self, control: &Control) -> FormResult<bool> {
        self.unregister_member(control.id, "control")
    }

    pub fn unregister_form(&self, form: &Form) -> FormResult<bool> {
        self.unregister_member(form.id, "form")
    }

    pub fn unregister_group(&self, group: &FormGroup) -> FormResult<bool> {
        self.unregister_member(group.id, "form group")
    }

    /// Returns `false` when `id` is not a member of this form.
    fn unregister_member(&self, id: NodeId, label: &str) -> FormResult<bool> {
        let name = {
            let state = self.engine.read_lock("checking membership")?;
            if !state.form(self.id)?.members.contains(&id) {
                return Ok(false);
            }
            state.node(id)?.name().to_owned()
        };
        let removed = self.engine.detach(id)?;
        log::debug!("unregistered {label} `{name}` ({} nodes)", removed.len());
        Ok(true)
    }

    /// Removes this form and everything below it from the engine.
    pub fn destroy(&self) -> FormResult<()> {
        let name = self.name()?;
        self.engine.detach(self.id)?;
        log::debug!("destroyed form `{name}`");
        Ok(())
    }

    fn check_name_free(&self, name: &str, incoming: NodeKind) -> FormResult<()> {
        let existing = {
            let state = self.engine.read_lock("checking member names")?;
            state.find_member(self.id, name, |node| {
                incoming != NodeKind::Control || node.kind() != NodeKind::Control
            })?
        };
        match existing {
            Some((_, existing)) => Err(FormError::NameCollision {
                name: name.to_owned(),
                existing,
                incoming,
            }),
            None => Ok(()),
        }
    }

    fn cached_config(&self, name: &str) -> FormResult<(Option<Config>, Option<ModelValue>)> {
        let state = self.engine.read_lock("reading cached configuration")?;
        let form = state.form(self.id)?;
        Ok((form.config.get(name).cloned(), form.snapshot.get(name).cloned()))
    }
}

impl FormNode for Form {
    fn kind(&self) -> NodeKind {
        NodeKind::Form
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> FormResult<String> {
        let state = self.engine.read_lock("reading form name")?;
        Ok(state.form(self.id)?.name.clone())
    }

    /// Configures members by name.
    ///
    /// The map is merged into the form's cache first, so members that
    /// register later still receive their entry.
    fn configure(&self, config: Config) -> FormResult<()> {
        let Config::Map(entries) = config else {
            return Err(FormError::InvalidConfigType {
                expected: "map",
                found: config.type_name(),
            });
        };
        {
            let mut state = self.engine.write_lock("caching form configuration")?;
            let form = state.form_mut(self.id)?;
            let mut cached = match std::mem::take(&mut form.config) {
                Config::Map(cached) => cached,
                _ => BTreeMap::new(),
            };
            for (name, fragment) in &entries {
                // Group entries are positional and merge slot by slot.
                let merged = match (cached.remove(name), fragment.clone()) {
                    (Some(Config::List(existing)), Config::List(incoming)) => {
                        Config::List(merge_positional(existing, incoming))
                    }
                    (Some(existing), incoming) => merge_deep(existing, incoming),
                    (None, incoming) => incoming,
                };
                cached.insert(name.clone(), merged);
            }
            form.config = Config::Map(cached);
        }

        for (name, fragment) in entries {
            let members = self.members_named(&name)?;
            if members.is_empty() {
                log::debug!("caching configuration for unregistered `{name}`");
            }
            for member in members {
                match member {
                    Member::Binding(_) => {
                        log::debug!("model binding `{name}` takes no configuration");
                    }
                    member => member.configure(fragment.clone())?,
                }
            }
        }
        Ok(())
    }

    /// Resets every member with its fragment of `values`, then clears the
    /// submitted and dirty flags.
    fn reset(&self, values: Option<ModelValue>) -> FormResult<()> {
        let values = match values {
            None | Some(ModelValue::Null) => BTreeMap::new(),
            Some(ModelValue::Map(values)) => values,
            Some(other) => {
                return Err(FormError::InvalidModelValuesType {
                    expected: "map",
                    found: other.type_name(),
                });
            }
        };
        for member in self.members()? {
            let fragment = values.get(&member.name()?).cloned();
            member.reset(fragment)?;
        }
        {
            let mut state = self.engine.write_lock("resetting form flags")?;
            let form = state.form_mut(self.id)?;
            form.submitted = false;
            form.dirty = false;
        }
        if let Some(native) = self.native()? {
            native.set_submitted(false);
            native.set_pristine();
            native.set_untouched();
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

    /// Applies `{name: message}` maps, recursing into nested forms and groups.
    fn apply_custom_errors(&self, errors: &ModelValue) -> FormResult<()> {
        let Some(entries) = errors.as_map() else {
            return Err(FormError::InvalidCustomErrorsType {
                kind: NodeKind::Form,
                expected: "map",
                found: errors.type_name(),
            });
        };
        for (name, error) in entries {
            let members = self.members_named(name)?;
            if members.is_empty() {
                log::debug!("no member `{name}` for custom error");
            }
            for member in members {
                match member {
                    Member::Binding(_) => {
                        log::debug!("model binding `{name}` cannot show custom errors");
                    }
                    member => member.apply_custom_errors(error)?,
                }
            }
        }
        Ok(())
    }

    fn clear_custom_errors(&self) -> FormResult<()> {
        for member in self.members()? {
            member.clear_custom_errors()?;
        }
        Ok(())
    }
}

impl NodeRegistry for Form {
    /// Controls may share a name with other controls, never with a form or group.
    fn register_control(&self, name: &str) -> FormResult<Control> {
        self.check_name_free(name, NodeKind::Control)?;
        let (id, control_id) = {
            let mut state = self.engine.write_lock("registering control")?;
            state.form(self.id)?;
            let control_id = state.ids.control_id(name);
            let id = state.ids.node();
            state.nodes.insert(
                id,
                Node::Control(ControlState::new(name, control_id.clone(), self.id)),
            );
            state.form_mut(self.id)?.members.push(id);
            (id, control_id)
        };
        log::debug!("registered control `{name}` as `{control_id}`");

        let control = Control::new(self.engine.clone(), id);
        control.render_from_model()?;
        if let (Some(cached), _) = self.cached_config(name)? {
            control.configure(cached)?;
        }
        Ok(control)
    }

    fn register_form(&self, name: Option<&str>, options: FormOptions) -> FormResult<Form> {
        let name = match name {
            Some(name) => name.to_owned(),
            None => self.engine.write_lock("naming form")?.ids.form_name(),
        };
        self.check_name_free(&name, NodeKind::Form)?;
        let (id, name) = {
            let mut state = self.engine.write_lock("registering form")?;
            state.form(self.id)?;
            let (id, name) = state.insert_form(Some(&name), Some(self.id), options);
            state.form_mut(self.id)?.members.push(id);
            (id, name)
        };
        log::debug!("registered form `{name}`");

        let child = Form::new(self.engine.clone(), id);
        let (cached, fragment) = self.cached_config(&name)?;
        if let Some(cached) = cached {
            child.configure(cached)?;
        }
        child.set_model_values(fragment.unwrap_or_default())?;
        Ok(child)
    }

    fn register_group(&self, name: &str) -> FormResult<FormGroup> {
        self.check_name_free(name, NodeKind::FormGroup)?;
        let id = {
            let mut state = self.engine.write_lock("registering form group")?;
            state.form(self.id)?;
            let id = state.ids.node();
            state
                .nodes
                .insert(id, Node::Group(GroupState::new(name, self.id)));
            state.form_mut(self.id)?.members.push(id);
            id
        };
        log::debug!("registered form group `{name}`");

        let group = FormGroup::new(self.engine.clone(), id);
        let (cached, fragment) = self.cached_config(name)?;
        if let Some(cached) = cached {
            group.configure(cached)?;
        }
        if let Some(fragment) = fragment {
            group.set_model_values(fragment)?;
        }
        Ok(group)
    }

    /// Adds an externally bound input as a control-kind member.
    fn register_ng_model(&self, binding: Arc<dyn ModelBinding>) -> FormResult<BoundModel> {
        let name = binding.name();
        self.check_name_free(&name, NodeKind::Control)?;
        let id = {
            let mut state = self.engine.write_lock("registering model binding")?;
            state.form(self.id)?;
            let id = state.ids.node();
            state.nodes.insert(
                id,
                Node::Binding(BindingState {
                    name: name.clone(),
                    parent: self.id,
                    binding,
                }),
            );
            state.form_mut(self.id)?.members.push(id);
            id
        };
        log::debug!("registered model binding `{name}`");
        Ok(BoundModel::new(self.engine.clone(), id))
    }
}
