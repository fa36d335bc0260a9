use std::sync::Arc;

use crate::config::Config;
use crate::id::NodeId;
use crate::value::ModelValue;

use super::controller::Form;
use super::engine::Engine;
use super::error::FormResult;
use super::node::{FormNode, NodeKind, NodeRegistry};

/// A host-side input bound to a model value without a full [`Control`](super::Control).
pub trait ModelBinding: Send + Sync + 'static {
    fn name(&self) -> String;

    fn model_value(&self) -> Option<ModelValue>;

    fn set_model_value(&self, value: ModelValue);
}

/// The host's own form object, kept in step with submit and reset.
pub trait NativeForm: Send + Sync + 'static {
    fn set_submitted(&self, submitted: bool);

    fn set_pristine(&self) {}

    fn set_untouched(&self) {}
}

/// Handle of a [`ModelBinding`] registered with a form.
#[derive(Clone, Debug)]
pub struct BoundModel {
    engine: Engine,
    id: NodeId,
}

impl BoundModel {
    pub(crate) fn new(engine: Engine, id: NodeId) -> Self {
        Self { engine, id }
    }

    pub fn form(&self) -> FormResult<Form> {
        let state = self.engine.read_lock("reading binding parent")?;
        Ok(Form::new(self.engine.clone(), state.binding(self.id)?.parent))
    }

    pub fn unregister(&self) -> FormResult<()> {
        let name = self.name()?;
        self.engine.detach(self.id)?;
        log::debug!("unregistered model binding `{name}`");
        Ok(())
    }

    fn binding(&self) -> FormResult<Arc<dyn ModelBinding>> {
        let state = self.engine.read_lock("reading model binding")?;
        Ok(Arc::clone(&state.binding(self.id)?.binding))
    }
}

impl FormNode for BoundModel {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> FormResult<String> {
        let state = self.engine.read_lock("reading binding name")?;
        Ok(state.binding(self.id)?.name.clone())
    }

    fn configure(&self, _config: Config) -> FormResult<()> {
        Err(self.unsupported("configure"))
    }

    fn reset(&self, value: Option<ModelValue>) -> FormResult<()> {
        self.set_model_value(value)
    }

    fn model_value(&self) -> FormResult<Option<ModelValue>> {
        Ok(self.binding()?.model_value())
    }

    fn set_model_value(&self, value: Option<ModelValue>) -> FormResult<()> {
        let Some(value) = value else {
            return Ok(());
        };
        self.form()?.schedule_model_write(self.name()?, value)
    }

    fn apply_custom_errors(&self, _errors: &ModelValue) -> FormResult<()> {
        Err(self.unsupported("apply_custom_errors"))
    }

    fn clear_custom_errors(&self) -> FormResult<()> {
        Ok(())
    }
}

impl NodeRegistry for BoundModel {}
