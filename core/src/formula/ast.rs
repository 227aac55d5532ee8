//! Expression tree for calculation steps.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::EngineConfig;
use crate::error::FormulaError;

/// Operators a step may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperatorTag {
    Add,
    Subtract,
    Multiply,
    Divide,
    Percent,
    Round,
    Abs,
    Max,
    Min,
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    And,
    Or,
    Not,
    If,
}

impl OperatorTag {
    pub const ALL: [OperatorTag; 19] = [
        OperatorTag::Add,
        OperatorTag::Subtract,
        OperatorTag::Multiply,
        OperatorTag::Divide,
        OperatorTag::Percent,
        OperatorTag::Round,
        OperatorTag::Abs,
        OperatorTag::Max,
        OperatorTag::Min,
        OperatorTag::Equal,
        OperatorTag::NotEqual,
        OperatorTag::GreaterThan,
        OperatorTag::LessThan,
        OperatorTag::GreaterThanOrEqual,
        OperatorTag::LessThanOrEqual,
        OperatorTag::And,
        OperatorTag::Or,
        OperatorTag::Not,
        OperatorTag::If,
    ];

    /// The tag as it appears in plan documents and the text notation.
    pub fn name(&self) -> &'static str {
        match self {
            OperatorTag::Add => "add",
            OperatorTag::Subtract => "subtract",
            OperatorTag::Multiply => "multiply",
            OperatorTag::Divide => "divide",
            OperatorTag::Percent => "percent",
            OperatorTag::Round => "round",
            OperatorTag::Abs => "abs",
            OperatorTag::Max => "max",
            OperatorTag::Min => "min",
            OperatorTag::Equal => "equal",
            OperatorTag::NotEqual => "notEqual",
            OperatorTag::GreaterThan => "greaterThan",
            OperatorTag::LessThan => "lessThan",
            OperatorTag::GreaterThanOrEqual => "greaterThanOrEqual",
            OperatorTag::LessThanOrEqual => "lessThanOrEqual",
            OperatorTag::And => "and",
            OperatorTag::Or => "or",
            OperatorTag::Not => "not",
            OperatorTag::If => "if",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    pub fn arity(&self, config: &EngineConfig) -> Arity {
        match self {
            OperatorTag::Add | OperatorTag::Multiply | OperatorTag::And | OperatorTag::Or => {
                Arity::AtLeast(2)
            }
            OperatorTag::Subtract
            | OperatorTag::Divide
            | OperatorTag::Percent
            | OperatorTag::Equal
            | OperatorTag::NotEqual
            | OperatorTag::GreaterThan
            | OperatorTag::LessThan
            | OperatorTag::GreaterThanOrEqual
            | OperatorTag::LessThanOrEqual => Arity::Exact(2),
            OperatorTag::Round | OperatorTag::Abs | OperatorTag::Not => Arity::Exact(1),
            OperatorTag::Max | OperatorTag::Min => {
                if config.single_operand_extrema {
                    Arity::AtLeast(1)
                } else {
                    Arity::AtLeast(2)
                }
            }
            OperatorTag::If => Arity::Exact(3),
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            OperatorTag::Add => "add(a, b, ...)",
            OperatorTag::Subtract => "subtract(a, b)",
            OperatorTag::Multiply => "multiply(a, b, ...)",
            OperatorTag::Divide => "divide(a, b)",
            OperatorTag::Percent => "percent(value, percentage)",
            OperatorTag::Round => "round(x)",
            OperatorTag::Abs => "abs(x)",
            OperatorTag::Max => "max(a, ...)",
            OperatorTag::Min => "min(a, ...)",
            OperatorTag::Equal => "equal(a, b)",
            OperatorTag::NotEqual => "notEqual(a, b)",
            OperatorTag::GreaterThan => "greaterThan(a, b)",
            OperatorTag::LessThan => "lessThan(a, b)",
            OperatorTag::GreaterThanOrEqual => "greaterThanOrEqual(a, b)",
            OperatorTag::LessThanOrEqual => "lessThanOrEqual(a, b)",
            OperatorTag::And => "and(a, b, ...)",
            OperatorTag::Or => "or(a, b, ...)",
            OperatorTag::Not => "not(a)",
            OperatorTag::If => "if(cond, a, b)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OperatorTag::Add => "Sum of all operands",
            OperatorTag::Subtract => "a minus b",
            OperatorTag::Multiply => "Product of all operands",
            OperatorTag::Divide => "a divided by b; dividing by zero is an error",
            OperatorTag::Percent => "percentage percent of value",
            OperatorTag::Round => "Rounds x to the nearest integer, halves away from zero",
            OperatorTag::Abs => "Absolute value of x",
            OperatorTag::Max => "Largest operand",
            OperatorTag::Min => "Smallest operand",
            OperatorTag::Equal => "True when a equals b",
            OperatorTag::NotEqual => "True when a differs from b",
            OperatorTag::GreaterThan => "True when a > b",
            OperatorTag::LessThan => "True when a < b",
            OperatorTag::GreaterThanOrEqual => "True when a >= b",
            OperatorTag::LessThanOrEqual => "True when a <= b",
            OperatorTag::And => "True when every operand is true",
            OperatorTag::Or => "True when any operand is true",
            OperatorTag::Not => "Negates a boolean",
            OperatorTag::If => "a when cond is true, otherwise b",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            OperatorTag::Equal
                | OperatorTag::NotEqual
                | OperatorTag::GreaterThan
                | OperatorTag::LessThan
                | OperatorTag::GreaterThanOrEqual
                | OperatorTag::LessThanOrEqual
        )
    }
}

impl fmt::Display for OperatorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Permitted operand counts for an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }

    pub fn min(&self) -> usize {
        match *self {
            Arity::Exact(n) | Arity::AtLeast(n) => n,
        }
    }

    pub fn max(&self) -> Option<usize> {
        match *self {
            Arity::Exact(n) => Some(n),
            Arity::AtLeast(_) => None,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// An operand of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Numeric literal
    Number(f64),
    /// Reference to a variable or to another step's result
    Name(String),
    /// Nested operation, evaluated before its parent
    Nested(Box<Operation>),
}

impl Operand {
    pub fn number(n: f64) -> Self {
        Operand::Number(n)
    }

    pub fn name(name: impl Into<String>) -> Self {
        Operand::Name(name.into())
    }

    pub fn nested(operation: Operation) -> Self {
        Operand::Nested(Box::new(operation))
    }

    /// Interpret a string operand from a plan document.
    ///
    /// Strings holding a finite number become numeric literals; anything else
    /// is a name reference.
    pub fn from_text(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(n) if n.is_finite() && !text.trim().is_empty() => Operand::Number(n),
            _ => Operand::Name(text.to_string()),
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl From<f64> for Operand {
    fn from(n: f64) -> Self {
        Operand::Number(n)
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Name(name.to_string())
    }
}

impl From<Operation> for Operand {
    fn from(operation: Operation) -> Self {
        Operand::nested(operation)
    }
}

impl Serialize for Operand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Operand::Number(n) => serializer.serialize_f64(*n),
            Operand::Name(name) => serializer.serialize_str(name),
            Operand::Nested(operation) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("operation", operation)?;
                map.end()
            }
        }
    }
}

/// Operand shapes accepted in plan documents.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawOperand {
    Number(f64),
    Text(String),
    // `{ id, name, operation }` as written by the visual builder; id and name
    // are editor labels and are not kept.
    Wrapped { operation: Operation },
    Bare(Operation),
}

impl<'de> Deserialize<'de> for Operand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawOperand::deserialize(deserializer)? {
            RawOperand::Number(n) => Operand::Number(n),
            RawOperand::Text(text) => Operand::from_text(&text),
            RawOperand::Wrapped { operation } | RawOperand::Bare(operation) => {
                Operand::nested(operation)
            }
        })
    }
}

/// An operator applied to an ordered list of operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub operator: OperatorTag,
    #[serde(default)]
    pub parameters: Vec<Operand>,
}

impl Operation {
    pub fn new(operator: OperatorTag, parameters: Vec<Operand>) -> Self {
        Self {
            operator,
            parameters,
        }
    }

    /// Nesting depth; a flat operation has depth 1.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((op, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            pending.extend(op.nested().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// Directly nested operations, in operand order.
    pub fn nested(&self) -> impl Iterator<Item = &Operation> {
        self.parameters.iter().filter_map(|p| match p {
            Operand::Nested(op) => Some(op.as_ref()),
            _ => None,
        })
    }

    /// Visit this operation and every nested one, parents first and
    /// siblings in operand order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Operation)) {
        let mut pending = vec![self];
        while let Some(op) = pending.pop() {
            visit(op);
            let start = pending.len();
            pending.extend(op.nested());
            pending[start..].reverse();
        }
    }

    /// Check this node's operand count (nested operations are not checked).
    pub fn check_arity(&self, config: &EngineConfig) -> Result<(), FormulaError> {
        let expected = self.operator.arity(config);
        if expected.accepts(self.parameters.len()) {
            Ok(())
        } else {
            Err(FormulaError::InvalidArgCount {
                operator: self.operator,
                expected,
                got: self.parameters.len(),
            })
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(n) => write!(f, "{n}"),
            Operand::Name(name) if is_identifier(name) => f.write_str(name),
            Operand::Name(name) => write!(f, "\"{name}\""),
            Operand::Nested(op) => write!(f, "{op}"),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operator)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}
