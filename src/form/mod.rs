mod binding;
mod control;
mod controller;
mod display;
mod engine;
mod error;
mod group;
mod node;
mod submit;
mod validation;
pub mod validators;

#[cfg(test)]
mod tests;

pub use binding::{BoundModel, ModelBinding, NativeForm};
pub use control::Control;
pub use controller::{Form, FormOptions};
pub use display::{DisplayFlag, ErrorDisplayPolicy, NodeFlags};
pub use engine::Engine;
pub use error::{BoxError, FormError, FormResult};
pub use group::FormGroup;
pub use node::{FormNode, Member, NodeKind, NodeRegistry};
pub use submit::{SubmitEvent, SubmitListener, SubmitState};
pub use validation::{
    AsyncValidator, CUSTOM_ERROR_KEY, ConfigurableValidator, Formatter, Parser, ValidationScope,
    Validator, Validity,
};
