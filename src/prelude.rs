pub use crate::config::{Config, ControlConfig};
pub use crate::form::validators::{match_control, max_length, min_length, required};
pub use crate::form::{
    AsyncValidator, BoundModel, ConfigurableValidator, Control, Engine, ErrorDisplayPolicy, Form,
    FormError, FormGroup, FormNode, FormOptions, FormResult, Formatter, Member, ModelBinding,
    NativeForm, NodeKind, NodeRegistry, Parser, SubmitEvent, Validator, Validity,
};
pub use crate::value::{FormValues, ModelField, ModelValue};
pub use formation_derive::FormValues;
