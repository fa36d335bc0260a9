use std::sync::Arc;

use crate::config::Config;
use crate::id::NodeId;
use crate::value::ModelValue;

use super::binding::{BoundModel, ModelBinding};
use super::control::Control;
use super::controller::{Form, FormOptions};
use super::engine::{Engine, Node};
use super::error::{FormError, FormResult};
use super::group::FormGroup;

/// Discriminant of every node an engine can hold.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NodeKind {
    Control,
    Form,
    FormGroup,
}

/// Operations every node kind answers.
pub trait FormNode {
    fn kind(&self) -> NodeKind;

    fn id(&self) -> NodeId;

    fn name(&self) -> FormResult<String>;

    fn configure(&self, config: Config) -> FormResult<()>;

    fn reset(&self, value: Option<ModelValue>) -> FormResult<()>;

    /// `None` when the node has never been given a value.
    fn model_value(&self) -> FormResult<Option<ModelValue>>;

    /// `None` writes are ignored.
    fn set_model_value(&self, value: Option<ModelValue>) -> FormResult<()>;

    fn apply_custom_errors(&self, errors: &ModelValue) -> FormResult<()>;

    fn clear_custom_errors(&self) -> FormResult<()>;
}

/// Registration operations. Kinds that cannot hold children keep the
/// defaults, which fail with [`FormError::Unsupported`].
pub trait NodeRegistry: FormNode {
    fn register_control(&self, name: &str) -> FormResult<Control> {
        let _ = name;
        Err(self.unsupported("register_control"))
    }

    fn register_form(&self, name: Option<&str>, options: FormOptions) -> FormResult<Form> {
        let _ = (name, options);
        Err(self.unsupported("register_form"))
    }

    fn register_group(&self, name: &str) -> FormResult<FormGroup> {
        let _ = name;
        Err(self.unsupported("register_group"))
    }

    fn register_ng_model(&self, binding: Arc<dyn ModelBinding>) -> FormResult<BoundModel> {
        let _ = binding;
        Err(self.unsupported("register_ng_model"))
    }

    fn unsupported(&self, operation: &'static str) -> FormError {
        FormError::Unsupported {
            operation,
            kind: self.kind(),
        }
    }
}

/// A registered member of a form or group, whatever its kind.
#[derive(Clone, Debug)]
pub enum Member {
    Control(Control),
    Binding(BoundModel),
    Form(Form),
    Group(FormGroup),
}

impl Member {
    pub(crate) fn resolve(engine: &Engine, id: NodeId) -> FormResult<Self> {
        let state = engine.read_lock("resolving member")?;
        let engine = engine.clone();
        Ok(match state.node(id)? {
            Node::Control(_) => Member::Control(Control::new(engine, id)),
            Node::Binding(_) => Member::Binding(BoundModel::new(engine, id)),
            Node::Form(_) => Member::Form(Form::new(engine, id)),
            Node::Group(_) => Member::Group(FormGroup::new(engine, id)),
        })
    }

    fn node(&self) -> &dyn FormNode {
        match self {
            Member::Control(control) => control,
            Member::Binding(binding) => binding,
            Member::Form(form) => form,
            Member::Group(group) => group,
        }
    }
}

impl FormNode for Member {
    fn kind(&self) -> NodeKind {
        self.node().kind()
    }

    fn id(&self) -> NodeId {
        self.node().id()
    }

    fn name(&self) -> FormResult<String> {
        self.node().name()
    }

    fn configure(&self, config: Config) -> FormResult<()> {
        self.node().configure(config)
    }

    fn reset(&self, value: Option<ModelValue>) -> FormResult<()> {
        self.node().reset(value)
    }

    fn model_value(&self) -> FormResult<Option<ModelValue>> {
        self.node().model_value()
    }

    fn set_model_value(&self, value: Option<ModelValue>) -> FormResult<()> {
        self.node().set_model_value(value)
    }

    fn apply_custom_errors(&self, errors: &ModelValue) -> FormResult<()> {
        self.node().apply_custom_errors(errors)
    }

    fn clear_custom_errors(&self) -> FormResult<()> {
        self.node().clear_custom_errors()
    }
}
