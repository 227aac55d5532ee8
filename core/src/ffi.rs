//! Host-facing API exported through uniffi.
//!
//! Plans cross the boundary as JSON text; values and reports as records.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::EngineConfig;
use crate::error::{ConfigError, DocumentError, FormulaError, RunError};
use crate::formula::evaluator::{self, supported_operators, Value};
use crate::formula::parser::parse;
use crate::formula::validator::{validate_with_config, ValidationIssue};
use crate::models::FormulaPlan;

#[derive(Debug, Clone, Copy, PartialEq, uniffi::Enum)]
pub enum FormulaValue {
    Number { value: f64 },
    Boolean { value: bool },
}

impl From<Value> for FormulaValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(value) => FormulaValue::Number { value },
            Value::Boolean(value) => FormulaValue::Boolean { value },
        }
    }
}

impl From<FormulaValue> for Value {
    fn from(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Number { value } => Value::Number(value),
            FormulaValue::Boolean { value } => Value::Boolean(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct PlanIssue {
    pub step_id: Option<String>,
    pub variable_name: Option<String>,
    pub kind: String,
    pub message: String,
}

impl From<ValidationIssue> for PlanIssue {
    fn from(issue: ValidationIssue) -> Self {
        Self {
            step_id: issue.step_id,
            variable_name: issue.variable_name,
            kind: issue.kind.code().to_string(),
            message: issue.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct PlanReport {
    pub valid: bool,
    pub errors: Vec<PlanIssue>,
    pub warnings: Vec<PlanIssue>,
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct OperatorDescriptor {
    pub name: String,
    pub signature: String,
    pub description: String,
    pub min_operands: u32,
    /// `None` for variadic operators.
    pub max_operands: Option<u32>,
}

#[derive(Debug, Error, uniffi::Error)]
pub enum ComputeError {
    #[error("invalid plan document: {detail}")]
    InvalidDocument { detail: String },

    #[error("invalid plan: {detail}")]
    InvalidPlan { detail: String },

    #[error("{detail}")]
    Evaluation {
        step_id: Option<String>,
        operator: Option<String>,
        detail: String,
    },

    #[error("invalid expression: {detail}")]
    Expression { detail: String },

    #[error("{detail}")]
    InvalidConfig { detail: String },
}

impl From<ConfigError> for ComputeError {
    fn from(err: ConfigError) -> Self {
        ComputeError::InvalidConfig {
            detail: err.to_string(),
        }
    }
}

impl From<DocumentError> for ComputeError {
    fn from(err: DocumentError) -> Self {
        ComputeError::InvalidDocument {
            detail: err.to_string(),
        }
    }
}

impl From<FormulaError> for ComputeError {
    fn from(err: FormulaError) -> Self {
        ComputeError::Expression {
            detail: err.to_string(),
        }
    }
}

impl From<RunError> for ComputeError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Invalid { .. } => ComputeError::InvalidPlan {
                detail: err.to_string(),
            },
            RunError::Evaluation(eval) => ComputeError::Evaluation {
                detail: eval.to_string(),
                step_id: eval.step_id,
                operator: eval.operator.map(|op| op.name().to_string()),
            },
        }
    }
}

/// Validate a plan document and report every problem found.
#[uniffi::export]
pub fn validate_plan_json(plan_json: String) -> Result<PlanReport, ComputeError> {
    validate_plan(&plan_json, &EngineConfig::default())
}

/// Like [`validate_plan_json`], with an `EngineConfig` given as JSON.
#[uniffi::export]
pub fn validate_plan_json_with_config(
    plan_json: String,
    config_json: String,
) -> Result<PlanReport, ComputeError> {
    validate_plan(&plan_json, &EngineConfig::from_json(&config_json)?)
}

/// Compute a plan's output for one set of bound values.
#[uniffi::export]
pub fn run_plan_json(
    plan_json: String,
    bindings: HashMap<String, FormulaValue>,
) -> Result<FormulaValue, ComputeError> {
    run_plan(&plan_json, bindings, EngineConfig::default())
}

#[uniffi::export]
pub fn run_plan_json_with_config(
    plan_json: String,
    bindings: HashMap<String, FormulaValue>,
    config_json: String,
) -> Result<FormulaValue, ComputeError> {
    run_plan(&plan_json, bindings, EngineConfig::from_json(&config_json)?)
}

fn validate_plan(plan_json: &str, config: &EngineConfig) -> Result<PlanReport, ComputeError> {
    let plan = FormulaPlan::from_json(plan_json)?;
    let report = validate_with_config(&plan, config);
    Ok(PlanReport {
        valid: report.is_valid(),
        errors: report.errors.into_iter().map(PlanIssue::from).collect(),
        warnings: report.warnings.into_iter().map(PlanIssue::from).collect(),
    })
}

fn run_plan(
    plan_json: &str,
    bindings: HashMap<String, FormulaValue>,
    config: EngineConfig,
) -> Result<FormulaValue, ComputeError> {
    let plan = FormulaPlan::from_json(plan_json)?;
    let bindings: HashMap<String, Value> = bindings
        .into_iter()
        .map(|(name, value)| (name, value.into()))
        .collect();
    Ok(evaluator::run_with_config(&plan, &bindings, config)?.into())
}

#[uniffi::export]
pub fn list_operators() -> Vec<OperatorDescriptor> {
    supported_operators(&EngineConfig::default())
        .into_iter()
        .map(|info| OperatorDescriptor {
            name: info.name.to_string(),
            signature: info.signature.to_string(),
            description: info.description.to_string(),
            min_operands: info.arity.min() as u32,
            max_operands: info.arity.max().map(|n| n as u32),
        })
        .collect()
}

/// Parse an operation written as text and return its canonical form.
#[uniffi::export]
pub fn normalize_expression(text: String) -> Result<String, ComputeError> {
    Ok(parse(&text)?.to_string())
}
