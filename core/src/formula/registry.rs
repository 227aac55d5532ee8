//! Variable declarations, caller bindings and name resolution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, EvalErrorKind};
use crate::formula::evaluator::{Value, ValueKind};
use crate::models::{DataType, Variable};

/// Trait for providing bound input values during evaluation.
pub trait VariableProvider {
    fn get(&self, name: &str) -> Option<Value>;
}

impl<F> VariableProvider for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn get(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

/// Concrete input values for one evaluation, keyed by variable name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Binding(HashMap<String, Value>);

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Parse `{"name": number | boolean, ...}`.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl VariableProvider for Binding {
    fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).copied()
    }
}

impl VariableProvider for HashMap<String, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        HashMap::get(self, name).copied()
    }
}

impl From<HashMap<String, Value>> for Binding {
    fn from(values: HashMap<String, Value>) -> Self {
        Self(values)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Binding {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Lookup table over a plan's declared variables.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry<'a> {
    variables: HashMap<&'a str, &'a Variable>,
}

impl<'a> VariableRegistry<'a> {
    /// Index `variables` by name; the first declaration of a name wins.
    pub fn new(variables: &'a [Variable]) -> Self {
        let mut map = HashMap::with_capacity(variables.len());
        for variable in variables {
            map.entry(variable.name.as_str()).or_insert(variable);
        }
        Self { variables: map }
    }

    pub fn get(&self, name: &str) -> Option<&'a Variable> {
        self.variables.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Resolve a name: step results computed so far, then caller bindings,
    /// then the declared default. A missing value is an error, never zero.
    pub fn resolve<V: VariableProvider + ?Sized>(
        &self,
        name: &str,
        results: &HashMap<String, Value>,
        bindings: &V,
    ) -> Result<Value, EvalErrorKind> {
        if let Some(value) = results.get(name) {
            return Ok(*value);
        }

        let declared = self.get(name);

        if let Some(value) = bindings.get(name) {
            if let Some(variable) = declared {
                check_binding(variable, value)?;
            }
            return finite(value);
        }

        match declared.and_then(|v| v.default_value.map(|d| (v, d))) {
            Some((variable, default)) if variable.data_type == DataType::Boolean => {
                Ok(Value::Boolean(default != 0.0))
            }
            Some((_, default)) => finite(Value::Number(default)),
            None => Err(EvalErrorKind::UnresolvedName(name.to_string())),
        }
    }
}

fn finite(value: Value) -> Result<Value, EvalErrorKind> {
    match value {
        Value::Number(n) if !n.is_finite() => Err(EvalErrorKind::NonFinite),
        value => Ok(value),
    }
}

fn check_binding(variable: &Variable, value: Value) -> Result<(), EvalErrorKind> {
    let mismatch = matches!(
        (variable.data_type, value.kind()),
        (DataType::Number, ValueKind::Boolean) | (DataType::Boolean, ValueKind::Number)
    );
    if mismatch {
        Err(EvalErrorKind::BindingType {
            name: variable.name.clone(),
            declared: variable.data_type,
            found: value.kind(),
        })
    } else {
        Ok(())
    }
}
