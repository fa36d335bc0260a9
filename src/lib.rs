extern crate self as formation;

pub mod config;
pub mod form;
pub mod id;
pub mod prelude;
pub mod value;

pub use config::{Config, ControlConfig, merge_deep};
pub use form::{
    Control, Engine, Form, FormError, FormGroup, FormNode, FormOptions, FormResult, NodeRegistry,
};
pub use formation_derive::FormValues;
pub use value::{FormValues, ModelField, ModelValue};
