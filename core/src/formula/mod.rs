//! Formula engine for compensation plans.
//!
//! A plan declares input variables and an ordered list of calculation steps.
//! Each step applies one operator to operands that are numbers, names of
//! variables or earlier results, or nested operations, and publishes its
//! value under a result name. The plan's output is the result named by
//! `outputVariable`.
//!
//! # Operators
//!
//! - Arithmetic: `add`, `subtract`, `multiply`, `divide`, `percent`, `round`, `abs`, `max`, `min`
//! - Comparison: `equal`, `notEqual`, `greaterThan`, `lessThan`, `greaterThanOrEqual`,
//!   `lessThanOrEqual`
//! - Boolean: `and`, `or`, `not`
//! - Conditional: `if(condition, whenTrue, whenFalse)`
//!
//! # Example
//!
//! ```
//! use payroll_compute::formula::{parse, run, validate, Binding};
//! use payroll_compute::models::{CalculationStep, FormulaPlan, Variable, VariableSource};
//!
//! let plan = FormulaPlan::new("doubled")
//!     .with_variable(Variable::input("x", VariableSource::Employee, "employee.base"))
//!     .with_step(
//!         CalculationStep::new("s1", parse("multiply(x, 2)").expect("valid operation"))
//!             .publishing("doubled"),
//!     );
//!
//! assert!(validate(&plan).is_valid());
//!
//! let result = run(&plan, &Binding::new().with("x", 10.0)).expect("should compute");
//! assert_eq!(result.as_number(), Ok(20.0));
//! ```

pub mod ast;
pub mod cycles;
pub mod dependency;
pub mod edit;
pub mod evaluator;
pub mod parser;
pub mod registry;
pub mod validator;

pub use ast::{Arity, Operand, Operation, OperatorTag};
pub use cycles::find_cycles;
pub use dependency::{build_step_graph, extract_references, DependencyGraph};
pub use edit::PlanEdit;
pub use evaluator::{
    evaluate, evaluate_with_config, run, run_batch, run_batch_with_config, run_with_config,
    supported_operators, Evaluation, Evaluator, OperatorInfo, StepValue, Value,
};
pub use parser::parse;
pub use registry::{Binding, VariableProvider, VariableRegistry};
pub use validator::{validate, validate_with_config, IssueKind, ValidationIssue, ValidationResult};

use crate::config::EngineConfig;
use crate::error::FormulaError;

/// Check an operation written as text: it must parse and every operator in
/// it must receive an acceptable number of operands.
pub fn validate_expression(text: &str, config: &EngineConfig) -> Result<Operation, FormulaError> {
    let operation = parse(text)?;
    let mut result = Ok(());
    operation.walk(&mut |op| {
        if result.is_ok() {
            result = op.check_arity(config);
        }
    });
    result.map(|()| operation)
}
