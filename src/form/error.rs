use std::time::Duration;

use crate::id::NodeId;

use super::node::NodeKind;
use super::submit::SubmitState;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("form node {0} is no longer registered")]
    Detached(NodeId),
    #[error("expected a {expected:?} node, found a {found:?}")]
    UnexpectedKind { expected: NodeKind, found: NodeKind },
    #[error("{kind:?} does not implement `{operation}`")]
    Unsupported {
        operation: &'static str,
        kind: NodeKind,
    },

    #[error("configuration must be a {expected}, found {found}")]
    InvalidConfigType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("error messages must be [key, message] pairs, found {0}")]
    InvalidErrorTuple(String),
    #[error("parsers must be functions, found {0}")]
    InvalidParserType(&'static str),
    #[error("formatters must be functions, found {0}")]
    InvalidFormatterType(&'static str),
    #[error("validator `{name}` must be a validator function or false, found {found}")]
    InvalidValidatorType { name: String, found: &'static str },
    #[error("unknown error display flag `{0}`")]
    InvalidDisplayPolicy(String),

    #[error("`{name}` is already registered as a {existing:?}, cannot register a {incoming:?}")]
    NameCollision {
        name: String,
        existing: NodeKind,
        incoming: NodeKind,
    },
    #[error("form `{0}` is already bound to a native form")]
    NativeFormAlreadyBound(String),

    #[error("model values must be a {expected}, found {found}")]
    InvalidModelValuesType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("custom error messages must be text, found {0}")]
    InvalidErrorMessageType(&'static str),
    #[error("custom errors for a {kind:?} must be a {expected}, found {found}")]
    InvalidCustomErrorsType {
        kind: NodeKind,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form submit is already in progress")]
    SubmitInProgress,
    #[error("form is invalid")]
    FormInvalid,
    #[error("validators still pending after {0:?}")]
    ValidationTimeout(Duration),
    #[error("submit handler failed: {0}")]
    Handler(#[source] BoxError),
}

pub type FormResult<T> = Result<T, FormError>;
