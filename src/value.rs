use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// A value flowing between controls and the forms that aggregate them.
///
/// Nested forms report `Map`s, form groups report `List`s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ModelValue {
    #[default]
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
    List(Vec<ModelValue>),
    Map(BTreeMap<String, ModelValue>),
}

impl ModelValue {
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ModelValue)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn list(items: impl IntoIterator<Item = ModelValue>) -> Self {
        Self::List(items.into_iter().collect())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ModelValue::Null => "null",
            ModelValue::Bool(_) => "bool",
            ModelValue::Number(_) => "number",
            ModelValue::Text(_) => "text",
            ModelValue::List(_) => "list",
            ModelValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ModelValue::Null)
    }

    /// Null, empty text and empty collections count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            ModelValue::Null => true,
            ModelValue::Text(text) => text.is_empty(),
            ModelValue::List(items) => items.is_empty(),
            ModelValue::Map(entries) => entries.is_empty(),
            ModelValue::Bool(_) | ModelValue::Number(_) => false,
        }
    }

    /// Character count for text, item count for collections.
    pub fn len(&self) -> Option<usize> {
        match self {
            ModelValue::Text(text) => Some(text.chars().count()),
            ModelValue::List(items) => Some(items.len()),
            ModelValue::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ModelValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ModelValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            ModelValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ModelValue]> {
        match self {
            ModelValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ModelValue>> {
        match self {
            ModelValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ModelValue> {
        self.as_map().and_then(|entries| entries.get(key))
    }
}

impl From<&str> for ModelValue {
    fn from(value: &str) -> Self {
        ModelValue::Text(value.to_owned())
    }
}

impl From<String> for ModelValue {
    fn from(value: String) -> Self {
        ModelValue::Text(value)
    }
}

impl From<bool> for ModelValue {
    fn from(value: bool) -> Self {
        ModelValue::Bool(value)
    }
}

impl From<Decimal> for ModelValue {
    fn from(value: Decimal) -> Self {
        ModelValue::Number(value)
    }
}

impl From<i64> for ModelValue {
    fn from(value: i64) -> Self {
        ModelValue::Number(Decimal::from(value))
    }
}

impl From<i32> for ModelValue {
    fn from(value: i32) -> Self {
        ModelValue::Number(Decimal::from(value))
    }
}

impl From<Vec<ModelValue>> for ModelValue {
    fn from(value: Vec<ModelValue>) -> Self {
        ModelValue::List(value)
    }
}

impl From<BTreeMap<String, ModelValue>> for ModelValue {
    fn from(value: BTreeMap<String, ModelValue>) -> Self {
        ModelValue::Map(value)
    }
}

/// A struct whose fields map one-to-one onto a form's model values.
///
/// Usually derived with `#[derive(FormValues)]`.
pub trait FormValues: Sized {
    fn to_model_values(&self) -> ModelValue;
    fn from_model_values(value: &ModelValue) -> Option<Self>;
}

/// A single field type that converts to and from a [`ModelValue`].
pub trait ModelField: Sized {
    fn to_model_value(&self) -> ModelValue;
    fn from_model_value(value: &ModelValue) -> Option<Self>;
}

impl ModelField for ModelValue {
    fn to_model_value(&self) -> ModelValue {
        self.clone()
    }

    fn from_model_value(value: &ModelValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl ModelField for String {
    fn to_model_value(&self) -> ModelValue {
        ModelValue::Text(self.clone())
    }

    fn from_model_value(value: &ModelValue) -> Option<Self> {
        value.as_text().map(str::to_owned)
    }
}

impl ModelField for bool {
    fn to_model_value(&self) -> ModelValue {
        ModelValue::Bool(*self)
    }

    fn from_model_value(value: &ModelValue) -> Option<Self> {
        value.as_bool()
    }
}

impl ModelField for Decimal {
    fn to_model_value(&self) -> ModelValue {
        ModelValue::Number(*self)
    }

    fn from_model_value(value: &ModelValue) -> Option<Self> {
        value.as_number()
    }
}

impl ModelField for i64 {
    fn to_model_value(&self) -> ModelValue {
        ModelValue::Number(Decimal::from(*self))
    }

    fn from_model_value(value: &ModelValue) -> Option<Self> {
        value.as_number().and_then(|number| {
            if number.fract().is_zero() {
                number.to_i64()
            } else {
                None
            }
        })
    }
}

impl<T: ModelField> ModelField for Option<T> {
    fn to_model_value(&self) -> ModelValue {
        self.as_ref()
            .map_or(ModelValue::Null, ModelField::to_model_value)
    }

    fn from_model_value(value: &ModelValue) -> Option<Self> {
        if value.is_null() {
            return Some(None);
        }
        T::from_model_value(value).map(Some)
    }
}

impl<T: ModelField> ModelField for Vec<T> {
    fn to_model_value(&self) -> ModelValue {
        ModelValue::List(self.iter().map(ModelField::to_model_value).collect())
    }

    fn from_model_value(value: &ModelValue) -> Option<Self> {
        value.as_list()?.iter().map(T::from_model_value).collect()
    }
}
