//! Dynamic configuration trees and the control configuration builder.
//!
//! Configuration stays dynamic so that form-level and control-level entries
//! can be deep-merged and cached under names that have not registered yet.
//! Shapes are checked when a control applies its merged configuration.

mod merge;

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::form::{
    AsyncValidator, ConfigurableValidator, FormError, FormResult, Formatter, Parser, Validator,
};

pub use merge::merge_deep;
pub(crate) use merge::merge_positional;

pub const ERRORS: &str = "errors";
pub const PARSERS: &str = "parsers";
pub const FORMATTERS: &str = "formatters";
pub const VALIDATORS: &str = "validators";
pub const ASYNC_VALIDATORS: &str = "async_validators";
pub const MODEL_OPTIONS: &str = "model_options";

#[derive(Clone, Debug, Default)]
pub enum Config {
    #[default]
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
    List(Vec<Config>),
    Map(BTreeMap<String, Config>),
    Parser(Parser),
    Formatter(Formatter),
    Validator(Validator),
    AsyncValidator(AsyncValidator),
    Configurable(ConfigurableValidator),
}

impl Config {
    pub fn map() -> Self {
        Config::Map(BTreeMap::new())
    }

    pub fn list(items: impl IntoIterator<Item = Config>) -> Self {
        Config::List(items.into_iter().collect())
    }

    /// Adds `key` to a map; anything that is not a map starts over as one.
    pub fn with(self, key: impl Into<String>, value: impl Into<Config>) -> Self {
        let mut entries = match self {
            Config::Map(entries) => entries,
            _ => BTreeMap::new(),
        };
        entries.insert(key.into(), value.into());
        Config::Map(entries)
    }

    pub fn get(&self, key: &str) -> Option<&Config> {
        match self {
            Config::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Structural equality, with functions compared by reference.
    pub(crate) fn same(&self, other: &Config) -> bool {
        match (self, other) {
            (Config::Null, Config::Null) => true,
            (Config::Bool(a), Config::Bool(b)) => a == b,
            (Config::Number(a), Config::Number(b)) => a == b,
            (Config::Text(a), Config::Text(b)) => a == b,
            (Config::List(a), Config::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.same(b))
            }
            (Config::Map(a), Config::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, a), (kb, b))| ka == kb && a.same(b))
            }
            (Config::Parser(a), Config::Parser(b)) => a.same(b),
            (Config::Formatter(a), Config::Formatter(b)) => a.same(b),
            (Config::Validator(a), Config::Validator(b)) => a.same(b),
            (Config::AsyncValidator(a), Config::AsyncValidator(b)) => a.same(b),
            (Config::Configurable(a), Config::Configurable(b)) => a.same(b),
            _ => false,
        }
    }

    /// Drops repeated entries from the error, parser and formatter lists of a
    /// control configuration, keeping the first of each.
    pub(crate) fn compact(self) -> Self {
        let Config::Map(mut entries) = self else {
            return self;
        };
        for key in [ERRORS, PARSERS, FORMATTERS] {
            if let Some(Config::List(items)) = entries.get_mut(key) {
                let mut kept: Vec<Config> = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    if !kept.iter().any(|existing| existing.same(&item)) {
                        kept.push(item);
                    }
                }
                *items = kept;
            }
        }
        Config::Map(entries)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Config::Null => "null",
            Config::Bool(_) => "bool",
            Config::Number(_) => "number",
            Config::Text(_) => "text",
            Config::List(_) => "list",
            Config::Map(_) => "map",
            Config::Parser(_) => "parser",
            Config::Formatter(_) => "formatter",
            Config::Validator(_) => "validator",
            Config::AsyncValidator(_) => "async validator",
            Config::Configurable(_) => "configurable validator",
        }
    }
}

impl From<bool> for Config {
    fn from(value: bool) -> Self {
        Config::Bool(value)
    }
}

impl From<&str> for Config {
    fn from(value: &str) -> Self {
        Config::Text(value.to_owned())
    }
}

impl From<String> for Config {
    fn from(value: String) -> Self {
        Config::Text(value)
    }
}

impl From<i64> for Config {
    fn from(value: i64) -> Self {
        Config::Number(Decimal::from(value))
    }
}

impl From<i32> for Config {
    fn from(value: i32) -> Self {
        Config::Number(Decimal::from(value))
    }
}

impl From<Decimal> for Config {
    fn from(value: Decimal) -> Self {
        Config::Number(value)
    }
}

impl From<Vec<Config>> for Config {
    fn from(value: Vec<Config>) -> Self {
        Config::List(value)
    }
}

impl From<Parser> for Config {
    fn from(value: Parser) -> Self {
        Config::Parser(value)
    }
}

impl From<Formatter> for Config {
    fn from(value: Formatter) -> Self {
        Config::Formatter(value)
    }
}

impl From<Validator> for Config {
    fn from(value: Validator) -> Self {
        Config::Validator(value)
    }
}

impl From<AsyncValidator> for Config {
    fn from(value: AsyncValidator) -> Self {
        Config::AsyncValidator(value)
    }
}

impl From<ConfigurableValidator> for Config {
    fn from(value: ConfigurableValidator) -> Self {
        Config::Configurable(value)
    }
}

/// Typed builder for one control's configuration.
#[derive(Clone, Debug, Default)]
pub struct ControlConfig {
    errors: Vec<Config>,
    parsers: Vec<Config>,
    formatters: Vec<Config>,
    validators: BTreeMap<String, Config>,
    async_validators: BTreeMap<String, Config>,
    model_options: BTreeMap<String, Config>,
}

impl ControlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message shown while validation key `key` fails.
    pub fn error(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.push(Config::list([
            Config::Text(key.into()),
            Config::Text(message.into()),
        ]));
        self
    }

    pub fn parser(mut self, parser: Parser) -> Self {
        self.parsers.push(parser.into());
        self
    }

    pub fn formatter(mut self, formatter: Formatter) -> Self {
        self.formatters.push(formatter.into());
        self
    }

    pub fn validator(mut self, name: impl Into<String>, validator: Validator) -> Self {
        self.validators.insert(name.into(), validator.into());
        self
    }

    pub fn configurable(
        mut self,
        name: impl Into<String>,
        validator: ConfigurableValidator,
    ) -> Self {
        self.validators.insert(name.into(), validator.into());
        self
    }

    pub fn remove_validator(mut self, name: impl Into<String>) -> Self {
        self.validators.insert(name.into(), Config::Bool(false));
        self
    }

    pub fn async_validator(mut self, name: impl Into<String>, validator: AsyncValidator) -> Self {
        self.async_validators.insert(name.into(), validator.into());
        self
    }

    pub fn remove_async_validator(mut self, name: impl Into<String>) -> Self {
        self.async_validators
            .insert(name.into(), Config::Bool(false));
        self
    }

    /// Binding options; `update_on = "blur"` defers edits until the control is touched.
    pub fn model_option(mut self, key: impl Into<String>, value: impl Into<Config>) -> Self {
        self.model_options.insert(key.into(), value.into());
        self
    }
}

impl From<ControlConfig> for Config {
    fn from(value: ControlConfig) -> Self {
        let mut entries = BTreeMap::new();
        if !value.errors.is_empty() {
            entries.insert(ERRORS.to_owned(), Config::List(value.errors));
        }
        if !value.parsers.is_empty() {
            entries.insert(PARSERS.to_owned(), Config::List(value.parsers));
        }
        if !value.formatters.is_empty() {
            entries.insert(FORMATTERS.to_owned(), Config::List(value.formatters));
        }
        if !value.validators.is_empty() {
            entries.insert(VALIDATORS.to_owned(), Config::Map(value.validators));
        }
        if !value.async_validators.is_empty() {
            entries.insert(ASYNC_VALIDATORS.to_owned(), Config::Map(value.async_validators));
        }
        if !value.model_options.is_empty() {
            entries.insert(MODEL_OPTIONS.to_owned(), Config::Map(value.model_options));
        }
        Config::Map(entries)
    }
}

pub(crate) enum ValidatorEntry {
    Install(Validator),
    Configurable(ConfigurableValidator),
    Remove,
}

pub(crate) enum AsyncValidatorEntry {
    Install(AsyncValidator),
    Remove,
}

/// A control configuration whose shape has been checked.
#[derive(Default)]
pub(crate) struct ControlPlan {
    pub(crate) errors: Vec<(String, String)>,
    pub(crate) parsers: Vec<Parser>,
    pub(crate) formatters: Vec<Formatter>,
    pub(crate) validators: Vec<(String, ValidatorEntry)>,
    pub(crate) async_validators: Vec<(String, AsyncValidatorEntry)>,
    pub(crate) model_options: BTreeMap<String, Config>,
}

impl ControlPlan {
    pub(crate) fn from_config(config: &Config) -> FormResult<Self> {
        let Config::Map(entries) = config else {
            return Err(FormError::InvalidConfigType {
                expected: "map",
                found: config.type_name(),
            });
        };

        let mut plan = ControlPlan::default();
        if let Some(errors) = entries.get(ERRORS) {
            for entry in list_entries(errors)? {
                plan.errors.push(error_tuple(entry)?);
            }
        }
        if let Some(parsers) = entries.get(PARSERS) {
            for entry in list_entries(parsers)? {
                match entry {
                    Config::Parser(parser) => plan.parsers.push(parser.clone()),
                    other => return Err(FormError::InvalidParserType(other.type_name())),
                }
            }
        }
        if let Some(formatters) = entries.get(FORMATTERS) {
            for entry in list_entries(formatters)? {
                match entry {
                    Config::Formatter(formatter) => plan.formatters.push(formatter.clone()),
                    other => return Err(FormError::InvalidFormatterType(other.type_name())),
                }
            }
        }
        if let Some(validators) = entries.get(VALIDATORS) {
            for (name, entry) in map_entries(validators)? {
                let entry = match entry {
                    Config::Validator(validator) => ValidatorEntry::Install(validator.clone()),
                    Config::Configurable(validator) => {
                        ValidatorEntry::Configurable(validator.clone())
                    }
                    Config::Bool(false) => ValidatorEntry::Remove,
                    other => return Err(invalid_validator(name, other)),
                };
                plan.validators.push((name.clone(), entry));
            }
        }
        if let Some(validators) = entries.get(ASYNC_VALIDATORS) {
            for (name, entry) in map_entries(validators)? {
                let entry = match entry {
                    Config::AsyncValidator(validator) => {
                        AsyncValidatorEntry::Install(validator.clone())
                    }
                    Config::Bool(false) => AsyncValidatorEntry::Remove,
                    other => return Err(invalid_validator(name, other)),
                };
                plan.async_validators.push((name.clone(), entry));
            }
        }
        if let Some(options) = entries.get(MODEL_OPTIONS) {
            plan.model_options = map_entries(options)?.clone();
        }
        Ok(plan)
    }
}

fn list_entries(config: &Config) -> FormResult<&[Config]> {
    match config {
        Config::List(items) => Ok(items),
        other => Err(FormError::InvalidConfigType {
            expected: "list",
            found: other.type_name(),
        }),
    }
}

fn map_entries(config: &Config) -> FormResult<&BTreeMap<String, Config>> {
    match config {
        Config::Map(entries) => Ok(entries),
        other => Err(FormError::InvalidConfigType {
            expected: "map",
            found: other.type_name(),
        }),
    }
}

fn error_tuple(entry: &Config) -> FormResult<(String, String)> {
    match entry {
        Config::List(pair) => match pair.as_slice() {
            [Config::Text(key), Config::Text(message)] => Ok((key.clone(), message.clone())),
            _ => Err(FormError::InvalidErrorTuple(format!(
                "a list of {} entries",
                pair.len()
            ))),
        },
        other => Err(FormError::InvalidErrorTuple(other.type_name().to_owned())),
    }
}

fn invalid_validator(name: &str, found: &Config) -> FormError {
    FormError::InvalidValidatorType {
        name: name.to_owned(),
        found: found.type_name(),
    }
}
