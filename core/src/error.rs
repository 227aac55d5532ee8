use std::fmt;

use thiserror::Error;

use crate::formula::ast::{Arity, OperatorTag};
use crate::formula::evaluator::ValueKind;
use crate::formula::validator::ValidationIssue;
use crate::models::DataType;

/// Error type for parsing the text notation of operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("parse error at position {position}: {message}")]
    ParseError { position: usize, message: String },

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("invalid argument count for {operator}: expected {expected}, got {got}")]
    InvalidArgCount {
        operator: OperatorTag,
        expected: Arity,
        got: usize,
    },

    #[error("empty expression")]
    EmptyExpression,
}

/// Rejections of a plan document before it reaches the validator.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("malformed plan document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plan document must be a JSON object")]
    NotAnObject,

    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("key `{key}` must be {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("`outputVariable` must not be empty")]
    EmptyOutput,
}

#[derive(Error, Debug)]
#[error("invalid engine configuration: {0}")]
pub struct ConfigError(#[from] serde_json::Error);

/// What went wrong while evaluating an operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    #[error("unresolved name `{0}`")]
    UnresolvedName(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },

    #[error("`{name}` is bound to a {found} but declared as {declared}")]
    BindingType {
        name: String,
        declared: DataType,
        found: ValueKind,
    },

    #[error("result is not a finite number")]
    NonFinite,

    #[error("expected {expected} operands, got {got}")]
    Arity { expected: Arity, got: usize },
}

/// A fatal evaluation error, tagged with the failing step and operator.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub step_id: Option<String>,
    pub operator: Option<OperatorTag>,
    pub kind: EvalErrorKind,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind) -> Self {
        Self {
            step_id: None,
            operator: None,
            kind,
        }
    }

    pub fn in_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(step_id) = &self.step_id {
            write!(f, "step `{step_id}`: ")?;
        }
        if let Some(operator) = self.operator {
            write!(f, "{operator}: ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Failure of a full plan run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("plan failed validation: {}", summarize(.issues))]
    Invalid { issues: Vec<ValidationIssue> },

    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    match issues {
        [] => "no errors reported".to_string(),
        [only] => only.message.clone(),
        [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("no step with id `{0}`")]
    UnknownStep(String),

    #[error("no variable named `{0}`")]
    UnknownVariable(String),

    #[error("index {index} is out of bounds for {len} steps")]
    IndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("refusing to save plan `{plan_id}`: {}", summarize(.issues))]
    Invalid {
        plan_id: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("no plan stored under `{0}`")]
    NotFound(String),

    #[error(transparent)]
    Edit(#[from] EditError),
}
