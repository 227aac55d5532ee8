use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::DocumentError;
use crate::formula::ast::Operation;

/// Where a variable's value comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableSource {
    #[default]
    Constant,
    Employee,
    Sales,
    Transaction,
}

impl VariableSource {
    /// External sources pull their value from a record through `path`.
    pub fn is_external(&self) -> bool {
        !matches!(self, VariableSource::Constant)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Number,
    Boolean,
    Date,
    Text,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Text => "text",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: VariableSource,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<f64>,
    /// Dotted accessor into the external record, e.g. `sales.monthly_total`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub category: String,
}

impl Variable {
    /// A fixed numeric constant.
    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            source: VariableSource::Constant,
            data_type: DataType::Number,
            default_value: Some(value),
            path: None,
            category: String::new(),
        }
    }

    /// A numeric input pulled from an external record.
    pub fn input(name: impl Into<String>, source: VariableSource, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            source,
            data_type: DataType::Number,
            default_value: None,
            path: Some(path.into()),
            category: String::new(),
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_default(mut self, value: f64) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationStep {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub operation: Operation,
    /// Name under which the step's value is published to other steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl CalculationStep {
    pub fn new(id: impl Into<String>, operation: Operation) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            operation,
            result: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn publishing(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A complete compensation formula: inputs, ordered steps and the output name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaPlan {
    pub variables: Vec<Variable>,
    pub steps: Vec<CalculationStep>,
    pub output_variable: String,
}

impl FormulaPlan {
    pub fn new(output_variable: impl Into<String>) -> Self {
        Self {
            variables: Vec::new(),
            steps: Vec::new(),
            output_variable: output_variable.into(),
        }
    }

    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_step(mut self, step: CalculationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Load a plan from its JSON interchange form.
    ///
    /// The top-level keys `steps`, `variables` and `outputVariable` are
    /// checked before the body is deserialized.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let document: Json = serde_json::from_str(json)?;
        Self::from_value(document)
    }

    pub fn from_value(document: Json) -> Result<Self, DocumentError> {
        let object = document.as_object().ok_or(DocumentError::NotAnObject)?;

        for key in ["steps", "variables"] {
            match object.get(key) {
                None => return Err(DocumentError::MissingKey(key)),
                Some(Json::Array(_)) => {}
                Some(_) => {
                    return Err(DocumentError::WrongType {
                        key,
                        expected: "an array",
                    })
                }
            }
        }
        match object.get("outputVariable") {
            None => return Err(DocumentError::MissingKey("outputVariable")),
            Some(Json::String(name)) if name.trim().is_empty() => {
                return Err(DocumentError::EmptyOutput)
            }
            Some(Json::String(_)) => {}
            Some(_) => {
                return Err(DocumentError::WrongType {
                    key: "outputVariable",
                    expected: "a string",
                })
            }
        }

        Ok(serde_json::from_value(document)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn step(&self, id: &str) -> Option<&CalculationStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// The first step publishing `result`.
    pub fn producer_of(&self, result: &str) -> Option<&CalculationStep> {
        self.steps
            .iter()
            .find(|s| s.result.as_deref() == Some(result))
    }

    pub fn output_step(&self) -> Option<&CalculationStep> {
        self.producer_of(&self.output_variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ast::{Operand, OperatorTag};
    use serde_json::json;

    fn doubled_plan() -> Json {
        json!({
            "variables": [
                {"name": "x", "source": "employee", "dataType": "number", "path": "employee.base"}
            ],
            "steps": [
                {
                    "id": "s1",
                    "name": "Double",
                    "operation": {"type": "multiply", "parameters": ["x", 2]},
                    "result": "doubled"
                }
            ],
            "outputVariable": "doubled"
        })
    }

    #[test]
    fn test_load_plan() {
        let plan = FormulaPlan::from_value(doubled_plan()).unwrap();
        assert_eq!(plan.variables.len(), 1);
        assert_eq!(plan.variables[0].source, VariableSource::Employee);
        assert_eq!(plan.output_step().map(|s| s.id.as_str()), Some("s1"));

        let op = &plan.steps[0].operation;
        assert_eq!(op.operator, OperatorTag::Multiply);
        assert_eq!(op.parameters[0], Operand::Name("x".to_string()));
        assert_eq!(op.parameters[1], Operand::Number(2.0));
    }

    #[test]
    fn test_missing_keys_rejected() {
        for key in ["steps", "variables", "outputVariable"] {
            let mut doc = doubled_plan();
            doc.as_object_mut().unwrap().remove(key);
            let err = FormulaPlan::from_value(doc).unwrap_err();
            assert!(matches!(err, DocumentError::MissingKey(k) if k == key));
        }
    }

    #[test]
    fn test_wrong_types_rejected() {
        let mut doc = doubled_plan();
        doc["steps"] = json!({});
        assert!(matches!(
            FormulaPlan::from_value(doc),
            Err(DocumentError::WrongType { key: "steps", .. })
        ));

        let mut doc = doubled_plan();
        doc["outputVariable"] = json!("  ");
        assert!(matches!(
            FormulaPlan::from_value(doc),
            Err(DocumentError::EmptyOutput)
        ));

        assert!(matches!(
            FormulaPlan::from_json("[]"),
            Err(DocumentError::NotAnObject)
        ));
        assert!(matches!(
            FormulaPlan::from_json("{"),
            Err(DocumentError::Json(_))
        ));
    }

    #[test]
    fn test_json_round_trip_preserves_plan() {
        let plan = FormulaPlan::from_value(doubled_plan()).unwrap();
        let reloaded = FormulaPlan::from_json(&plan.to_json().unwrap()).unwrap();
        assert_eq!(plan, reloaded);
    }

    #[test]
    fn test_external_sources() {
        assert!(!VariableSource::Constant.is_external());
        assert!(VariableSource::Sales.is_external());
        assert_eq!(DataType::Boolean.to_string(), "boolean");
    }
}
