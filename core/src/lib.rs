pub mod config;
pub mod error;
pub mod ffi;
pub mod formula;
pub mod models;
pub mod store;

uniffi::setup_scaffolding!();

pub use config::{ConditionalMode, EngineConfig};
pub use error::{
    ConfigError, DocumentError, EditError, EvalError, EvalErrorKind, FormulaError, RunError,
    StoreError,
};
pub use formula::{
    run, run_batch, validate, Binding, Evaluator, Operand, Operation, OperatorTag, PlanEdit,
    ValidationResult, Value, VariableProvider,
};
pub use models::{CalculationStep, DataType, FormulaPlan, Variable, VariableSource};
pub use store::{MemoryPlanStore, PlanSnapshot, PlanStore};
