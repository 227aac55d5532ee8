use std::collections::{HashMap, HashSet};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::config::{ConditionalMode, EngineConfig};
use crate::error::{EvalError, EvalErrorKind, RunError};
use crate::formula::ast::{Arity, Operand, Operation, OperatorTag};
use crate::formula::dependency::build_step_graph;
use crate::formula::registry::{VariableProvider, VariableRegistry};
use crate::formula::validator::{validate_with_config, IssueKind, ValidationIssue};
use crate::models::{CalculationStep, FormulaPlan};

/// Result of evaluating an operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Boolean,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Number => f.write_str("number"),
            ValueKind::Boolean => f.write_str("boolean"),
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Boolean(_) => ValueKind::Boolean,
        }
    }

    /// The numeric value; booleans are not coerced.
    pub fn as_number(&self) -> Result<f64, EvalErrorKind> {
        match *self {
            Value::Number(n) if n.is_finite() => Ok(n),
            Value::Number(_) => Err(EvalErrorKind::NonFinite),
            Value::Boolean(_) => Err(EvalErrorKind::TypeMismatch {
                expected: ValueKind::Number,
                found: ValueKind::Boolean,
            }),
        }
    }

    /// The boolean value; numbers are not treated as truthy.
    pub fn as_bool(&self) -> Result<bool, EvalErrorKind> {
        match *self {
            Value::Boolean(b) => Ok(b),
            Value::Number(_) => Err(EvalErrorKind::TypeMismatch {
                expected: ValueKind::Boolean,
                found: ValueKind::Number,
            }),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Name resolution and operator application for one evaluation.
struct Scope<'e, V: ?Sized> {
    registry: &'e VariableRegistry<'e>,
    bindings: &'e V,
    results: HashMap<String, Value>,
    config: &'e EngineConfig,
}

impl<V: VariableProvider + ?Sized> Scope<'_, V> {
    fn operand(&self, operand: &Operand) -> Result<Value, EvalError> {
        match operand {
            Operand::Number(n) => finite(*n).map_err(EvalError::new),
            Operand::Name(name) => self
                .registry
                .resolve(name, &self.results, self.bindings)
                .map_err(EvalError::new),
            Operand::Nested(op) => self.operation(op),
        }
    }

    fn operation(&self, op: &Operation) -> Result<Value, EvalError> {
        let operator = op.operator;
        let within = |mut err: EvalError| {
            if err.operator.is_none() {
                err.operator = Some(operator);
            }
            err
        };
        let fail = |kind: EvalErrorKind| EvalError {
            step_id: None,
            operator: Some(operator),
            kind,
        };

        let expected = operator.arity(self.config);
        if !expected.accepts(op.parameters.len()) {
            return Err(fail(EvalErrorKind::Arity {
                expected,
                got: op.parameters.len(),
            }));
        }

        if operator == OperatorTag::If && self.config.conditional == ConditionalMode::Lazy {
            let condition = self.operand(&op.parameters[0]).map_err(within)?;
            let branch = if condition.as_bool().map_err(fail)? {
                &op.parameters[1]
            } else {
                &op.parameters[2]
            };
            return self.operand(branch).map_err(within);
        }

        let args = op
            .parameters
            .iter()
            .map(|p| self.operand(p).map_err(within))
            .collect::<Result<Vec<_>, _>>()?;

        apply(operator, &args, self.config).map_err(fail)
    }
}

fn numbers(args: &[Value]) -> Result<Vec<f64>, EvalErrorKind> {
    args.iter().map(Value::as_number).collect()
}

fn booleans(args: &[Value]) -> Result<Vec<bool>, EvalErrorKind> {
    args.iter().map(Value::as_bool).collect()
}

fn finite(n: f64) -> Result<Value, EvalErrorKind> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(EvalErrorKind::NonFinite)
    }
}

/// Apply `operator` to already-evaluated operands. Arity has been checked.
fn apply(
    operator: OperatorTag,
    args: &[Value],
    config: &EngineConfig,
) -> Result<Value, EvalErrorKind> {
    match operator {
        OperatorTag::Add => finite(numbers(args)?.into_iter().sum()),
        OperatorTag::Multiply => finite(numbers(args)?.into_iter().product()),
        OperatorTag::Subtract => {
            let (a, b) = (args[0].as_number()?, args[1].as_number()?);
            finite(a - b)
        }
        OperatorTag::Divide => {
            let (a, b) = (args[0].as_number()?, args[1].as_number()?);
            if b == 0.0 {
                Err(EvalErrorKind::DivisionByZero)
            } else {
                finite(a / b)
            }
        }
        OperatorTag::Percent => {
            let (value, percentage) = (args[0].as_number()?, args[1].as_number()?);
            finite(value * (percentage / 100.0))
        }
        OperatorTag::Round => Ok(Value::Number(args[0].as_number()?.round())),
        OperatorTag::Abs => Ok(Value::Number(args[0].as_number()?.abs())),
        OperatorTag::Max => Ok(Value::Number(
            numbers(args)?.into_iter().fold(f64::NEG_INFINITY, f64::max),
        )),
        OperatorTag::Min => Ok(Value::Number(
            numbers(args)?.into_iter().fold(f64::INFINITY, f64::min),
        )),
        OperatorTag::Equal => equals(&args[0], &args[1], config).map(Value::Boolean),
        OperatorTag::NotEqual => equals(&args[0], &args[1], config).map(|eq| Value::Boolean(!eq)),
        OperatorTag::GreaterThan => compare(args, |a, b| a > b),
        OperatorTag::LessThan => compare(args, |a, b| a < b),
        OperatorTag::GreaterThanOrEqual => compare(args, |a, b| a >= b),
        OperatorTag::LessThanOrEqual => compare(args, |a, b| a <= b),
        OperatorTag::And => Ok(Value::Boolean(booleans(args)?.into_iter().all(|b| b))),
        OperatorTag::Or => Ok(Value::Boolean(booleans(args)?.into_iter().any(|b| b))),
        OperatorTag::Not => Ok(Value::Boolean(!args[0].as_bool()?)),
        OperatorTag::If => {
            if args[0].as_bool()? {
                Ok(args[1])
            } else {
                Ok(args[2])
            }
        }
    }
}

fn compare(args: &[Value], cmp: impl Fn(f64, f64) -> bool) -> Result<Value, EvalErrorKind> {
    let (a, b) = (args[0].as_number()?, args[1].as_number()?);
    Ok(Value::Boolean(cmp(a, b)))
}

fn equals(left: &Value, right: &Value, config: &EngineConfig) -> Result<bool, EvalErrorKind> {
    match (left, right) {
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a == b),
        (Value::Number(_), _) => {
            let (a, b) = (left.as_number()?, right.as_number()?);
            Ok((a - b).abs() <= config.equality_tolerance)
        }
        (Value::Boolean(_), Value::Number(_)) => Err(EvalErrorKind::TypeMismatch {
            expected: ValueKind::Boolean,
            found: ValueKind::Number,
        }),
    }
}

/// Evaluate a single operation against bound values.
pub fn evaluate<V: VariableProvider + ?Sized>(
    operation: &Operation,
    vars: &V,
) -> Result<Value, EvalError> {
    evaluate_with_config(operation, vars, &EngineConfig::default())
}

pub fn evaluate_with_config<V: VariableProvider + ?Sized>(
    operation: &Operation,
    vars: &V,
    config: &EngineConfig,
) -> Result<Value, EvalError> {
    let registry = VariableRegistry::default();
    let scope = Scope {
        registry: &registry,
        bindings: vars,
        results: HashMap::new(),
        config,
    };
    scope.operation(operation)
}

fn invalid(kind: IssueKind, message: &str) -> RunError {
    RunError::Invalid {
        issues: vec![ValidationIssue::plan(kind, message)],
    }
}

fn unorderable() -> RunError {
    invalid(IssueKind::CircularDependency, "steps could not be ordered")
}

/// Value a step produced during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepValue {
    pub step_id: String,
    pub result: String,
    pub value: Value,
}

/// Output of a run together with every evaluated step, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub output: Value,
    pub steps: Vec<StepValue>,
}

/// A validated plan ready to be run against any number of bindings.
///
/// Only steps the output depends on are evaluated, each exactly once and
/// after all of its dependencies.
#[derive(Debug)]
pub struct Evaluator<'p> {
    registry: VariableRegistry<'p>,
    order: Vec<&'p CalculationStep>,
    output: &'p str,
    config: EngineConfig,
}

impl<'p> Evaluator<'p> {
    pub fn new(plan: &'p FormulaPlan) -> Result<Self, RunError> {
        Self::with_config(plan, EngineConfig::default())
    }

    #[instrument(skip_all, fields(output = %plan.output_variable))]
    pub fn with_config(plan: &'p FormulaPlan, config: EngineConfig) -> Result<Self, RunError> {
        let report = validate_with_config(plan, &config);
        if !report.is_valid() {
            warn!(errors = report.errors.len(), "refusing to evaluate invalid plan");
            return Err(RunError::Invalid {
                issues: report.errors,
            });
        }

        let output_step = plan.output_step().ok_or_else(|| {
            invalid(IssueKind::MissingOutput, "no step publishes the output variable")
        })?;
        let graph = build_step_graph(&plan.steps);
        let needed: HashSet<&str> = graph.closure(&output_step.id);
        let steps: HashMap<&str, &'p CalculationStep> =
            plan.steps.iter().map(|step| (step.id.as_str(), step)).collect();
        let order = graph
            .topological_order()
            .ok_or_else(unorderable)?
            .into_iter()
            .filter(|id| needed.contains(id.as_str()))
            .filter_map(|id| steps.get(id.as_str()).copied())
            .collect::<Vec<_>>();

        debug!(steps = order.len(), "prepared evaluation order");

        Ok(Self {
            registry: VariableRegistry::new(&plan.variables),
            order,
            output: &plan.output_variable,
            config,
        })
    }

    /// Step ids in the order they are evaluated.
    pub fn order(&self) -> impl Iterator<Item = &'p str> + '_ {
        self.order.iter().map(|&step| step.id.as_str())
    }

    pub fn run<V: VariableProvider + ?Sized>(&self, bindings: &V) -> Result<Value, EvalError> {
        self.run_detailed(bindings).map(|evaluation| evaluation.output)
    }

    pub fn run_detailed<V: VariableProvider + ?Sized>(
        &self,
        bindings: &V,
    ) -> Result<Evaluation, EvalError> {
        let mut scope = Scope {
            registry: &self.registry,
            bindings,
            results: HashMap::with_capacity(self.order.len()),
            config: &self.config,
        };
        let mut steps = Vec::with_capacity(self.order.len());

        for step in &self.order {
            let value = scope
                .operation(&step.operation)
                .map_err(|err| err.in_step(&step.id))?;
            // Steps reachable from the output always publish a result.
            let Some(result) = step.result.as_deref() else {
                continue;
            };
            trace!(step = %step.id, result, %value, "step evaluated");
            scope.results.insert(result.to_string(), value);
            steps.push(StepValue {
                step_id: step.id.clone(),
                result: result.to_string(),
                value,
            });
        }

        let output = scope
            .results
            .get(self.output)
            .copied()
            .ok_or_else(|| EvalError::new(EvalErrorKind::UnresolvedName(self.output.to_string())))?;

        Ok(Evaluation { output, steps })
    }
}

/// Validate `plan` and compute its output for one binding.
pub fn run<V: VariableProvider + ?Sized>(
    plan: &FormulaPlan,
    bindings: &V,
) -> Result<Value, RunError> {
    run_with_config(plan, bindings, EngineConfig::default())
}

#[instrument(skip_all, fields(output = %plan.output_variable))]
pub fn run_with_config<V: VariableProvider + ?Sized>(
    plan: &FormulaPlan,
    bindings: &V,
    config: EngineConfig,
) -> Result<Value, RunError> {
    let evaluator = Evaluator::with_config(plan, config)?;
    let value = evaluator.run(bindings)?;
    debug!(%value, "plan evaluated");
    Ok(value)
}

/// Evaluate many bindings in parallel. Each entry succeeds or fails on its own.
pub fn run_batch<V: VariableProvider + Sync>(
    plan: &FormulaPlan,
    bindings: &[V],
) -> Vec<Result<Value, RunError>> {
    run_batch_with_config(plan, bindings, EngineConfig::default())
}

#[instrument(skip_all, fields(output = %plan.output_variable, size = bindings.len()))]
pub fn run_batch_with_config<V: VariableProvider + Sync>(
    plan: &FormulaPlan,
    bindings: &[V],
    config: EngineConfig,
) -> Vec<Result<Value, RunError>> {
    let evaluator = match Evaluator::with_config(plan, config) {
        Ok(evaluator) => evaluator,
        Err(err) => return vec![Err(err); bindings.len()],
    };

    let results: Vec<_> = bindings
        .par_iter()
        .map(|binding| evaluator.run(binding).map_err(RunError::from))
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!(failed, "batch entries failed to evaluate");
    }
    results
}

/// Information about a supported operator.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorInfo {
    pub operator: OperatorTag,
    pub name: &'static str,
    pub signature: &'static str,
    pub description: &'static str,
    pub arity: Arity,
}

/// Every operator with its signature and arity under `config`.
pub fn supported_operators(config: &EngineConfig) -> Vec<OperatorInfo> {
    OperatorTag::ALL
        .into_iter()
        .map(|operator| OperatorInfo {
            operator,
            name: operator.name(),
            signature: operator.signature(),
            description: operator.description(),
            arity: operator.arity(config),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;
    use crate::formula::registry::Binding;
    use crate::models::{Variable, VariableSource};

    fn eval(text: &str, binding: &Binding) -> Result<Value, EvalError> {
        evaluate(&parse(text).unwrap(), binding)
    }

    fn number(text: &str, binding: &Binding) -> f64 {
        match eval(text, binding).unwrap() {
            Value::Number(n) => n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let vars = Binding::new().with("a", 10.0).with("b", 4.0);

        assert!((number("add(a, b, 1)", &vars) - 15.0).abs() < f64::EPSILON);
        assert!((number("subtract(a, b)", &vars) - 6.0).abs() < f64::EPSILON);
        assert!((number("multiply(a, b, 0.5)", &vars) - 20.0).abs() < f64::EPSILON);
        assert!((number("divide(a, b)", &vars) - 2.5).abs() < f64::EPSILON);
        assert!((number("percent(a, 15)", &vars) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_unary_and_extrema() {
        let vars = Binding::new().with("a", -2.5);

        assert!((number("round(a)", &vars) - (-3.0)).abs() < f64::EPSILON);
        assert!((number("round(2.5)", &vars) - 3.0).abs() < f64::EPSILON);
        assert!((number("abs(a)", &vars) - 2.5).abs() < f64::EPSILON);
        assert!((number("max(a, 3, 1)", &vars) - 3.0).abs() < f64::EPSILON);
        assert!((number("min(a, 3, 1)", &vars) - (-2.5)).abs() < f64::EPSILON);
        assert!((number("max(a)", &vars) - (-2.5)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_evaluate_division_by_zero() {
        let result = eval("divide(10, 0)", &Binding::new());
        assert!(matches!(
            result,
            Err(EvalError {
                kind: EvalErrorKind::DivisionByZero,
                operator: Some(OperatorTag::Divide),
                ..
            })
        ));
    }

    #[test]
    fn test_evaluate_comparison() {
        let vars = Binding::new().with("a", 10.0).with("b", 5.0);

        assert_eq!(eval("greaterThan(a, b)", &vars), Ok(Value::Boolean(true)));
        assert_eq!(eval("lessThan(a, b)", &vars), Ok(Value::Boolean(false)));
        assert_eq!(eval("greaterThanOrEqual(a, 10)", &vars), Ok(Value::Boolean(true)));
        assert_eq!(eval("lessThanOrEqual(b, 4)", &vars), Ok(Value::Boolean(false)));
        assert_eq!(eval("equal(a, 10)", &vars), Ok(Value::Boolean(true)));
        assert_eq!(eval("notEqual(a, b)", &vars), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_equality_is_exact_by_default() {
        let vars = Binding::new().with("tiny", 1e-17).with("sum", 0.1 + 0.2);
        assert_eq!(eval("equal(tiny, 0)", &vars), Ok(Value::Boolean(false)));
        assert_eq!(eval("equal(sum, 0.3)", &vars), Ok(Value::Boolean(false)));

        let config = EngineConfig {
            equality_tolerance: 1e-9,
            ..EngineConfig::default()
        };
        let op = parse("equal(sum, 0.3)").unwrap();
        assert_eq!(
            evaluate_with_config(&op, &vars, &config),
            Ok(Value::Boolean(true))
        );
    }

    #[test]
    fn test_evaluate_logical() {
        let vars = Binding::new().with("t", true).with("f", false);

        assert_eq!(eval("and(t, f)", &vars), Ok(Value::Boolean(false)));
        assert_eq!(eval("and(t, t, t)", &vars), Ok(Value::Boolean(true)));
        assert_eq!(eval("or(f, t)", &vars), Ok(Value::Boolean(true)));
        assert_eq!(eval("not(f)", &vars), Ok(Value::Boolean(true)));
        assert_eq!(eval("equal(t, f)", &vars), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_no_truthy_coercion() {
        let vars = Binding::new().with("n", 1.0).with("t", true);

        assert!(matches!(
            eval("if(n, 1, 2)", &vars),
            Err(EvalError {
                kind: EvalErrorKind::TypeMismatch {
                    expected: ValueKind::Boolean,
                    found: ValueKind::Number
                },
                ..
            })
        ));
        assert!(eval("and(n, t)", &vars).is_err());
        assert!(eval("add(n, t)", &vars).is_err());
        assert!(eval("equal(t, n)", &vars).is_err());
    }

    #[test]
    fn test_if_lazy_and_eager() {
        let vars = Binding::new().with("x", 0.0);
        let op = parse("if(equal(x, 0), 0, divide(100, x))").unwrap();

        assert_eq!(evaluate(&op, &vars), Ok(Value::Number(0.0)));

        let eager = EngineConfig {
            conditional: ConditionalMode::Eager,
            ..EngineConfig::default()
        };
        assert!(matches!(
            evaluate_with_config(&op, &vars, &eager),
            Err(EvalError {
                kind: EvalErrorKind::DivisionByZero,
                ..
            })
        ));
    }

    #[test]
    fn test_unresolved_name_reports_operator() {
        let result = eval("add(1, missing)", &Binding::new());
        assert_eq!(
            result,
            Err(EvalError {
                step_id: None,
                operator: Some(OperatorTag::Add),
                kind: EvalErrorKind::UnresolvedName("missing".to_string()),
            })
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let vars = Binding::new().with("big", f64::MAX);
        assert!(matches!(
            eval("multiply(big, 10)", &vars),
            Err(EvalError {
                kind: EvalErrorKind::NonFinite,
                ..
            })
        ));

        let vars = Binding::new().with("nan", f64::NAN);
        assert!(eval("max(nan, 1)", &vars).is_err());
    }

    #[test]
    fn test_conditional_rejects_non_finite_branch() {
        let op = parse("if(t, x, 0)").unwrap();
        for config in [EngineConfig::default(), EngineConfig::strict()] {
            for bad in [f64::NAN, f64::INFINITY] {
                let vars = Binding::new().with("t", true).with("x", bad);
                assert!(matches!(
                    evaluate_with_config(&op, &vars, &config),
                    Err(EvalError {
                        kind: EvalErrorKind::NonFinite,
                        operator: Some(OperatorTag::If),
                        ..
                    })
                ));
            }
        }

        let op = Operation::new(
            OperatorTag::If,
            vec!["t".into(), f64::NAN.into(), 0.0.into()],
        );
        assert!(evaluate(&op, &Binding::new().with("t", true)).is_err());
    }

    #[test]
    fn test_unorderable_steps_reported_as_cycle() {
        match unorderable() {
            RunError::Invalid { issues } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].kind, IssueKind::CircularDependency);
                assert!(issues[0].step_id.is_none());
            }
            other => panic!("expected invalid plan, got {other:?}"),
        }
    }

    #[test]
    fn test_arity_checked_when_unvalidated() {
        let op = Operation::new(OperatorTag::Subtract, vec![1.0.into()]);
        assert!(matches!(
            evaluate(&op, &Binding::new()),
            Err(EvalError {
                kind: EvalErrorKind::Arity { got: 1, .. },
                ..
            })
        ));
    }

    fn commission_plan() -> FormulaPlan {
        FormulaPlan::new("total")
            .with_variable(Variable::input("base", VariableSource::Employee, "employee.salary"))
            .with_variable(Variable::input("sales", VariableSource::Sales, "sales.total"))
            .with_variable(Variable::constant("rate", 5.0))
            .with_step(
                CalculationStep::new("s_total", parse("add(base, commission)").unwrap())
                    .publishing("total"),
            )
            .with_step(
                CalculationStep::new("s_commission", parse("percent(sales, rate)").unwrap())
                    .publishing("commission"),
            )
            .with_step(
                CalculationStep::new("s_unused", parse("divide(base, 0)").unwrap())
                    .publishing("unused"),
            )
    }

    #[test]
    fn test_run_orders_dependencies() {
        let plan = commission_plan();
        let evaluator = Evaluator::new(&plan).unwrap();
        assert_eq!(
            evaluator.order().collect::<Vec<_>>(),
            vec!["s_commission", "s_total"]
        );

        let binding = Binding::new().with("base", 3000.0).with("sales", 10000.0);
        let evaluation = evaluator.run_detailed(&binding).unwrap();
        assert_eq!(evaluation.output, Value::Number(3500.0));
        assert_eq!(evaluation.steps.len(), 2);
        assert_eq!(evaluation.steps[0].result, "commission");
        assert_eq!(evaluation.steps[0].value, Value::Number(500.0));
    }

    #[test]
    fn test_run_error_tagged_with_step() {
        let plan = commission_plan();
        let result = run(&plan, &Binding::new().with("base", 3000.0));
        match result {
            Err(RunError::Evaluation(err)) => {
                assert_eq!(err.step_id.as_deref(), Some("s_commission"));
                assert_eq!(err.operator, Some(OperatorTag::Percent));
                assert_eq!(err.kind, EvalErrorKind::UnresolvedName("sales".to_string()));
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn test_run_batch_isolates_failures() {
        let plan = commission_plan();
        let bindings = vec![
            Binding::new().with("base", 1000.0).with("sales", 2000.0),
            Binding::new().with("base", 1000.0),
            Binding::new().with("base", 2000.0).with("sales", 0.0),
        ];
        let results = run_batch(&plan, &bindings);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Ok(Value::Number(1100.0)));
        assert!(matches!(results[1], Err(RunError::Evaluation(_))));
        assert_eq!(results[2], Ok(Value::Number(2000.0)));
    }

    #[test]
    fn test_run_batch_invalid_plan() {
        let plan = FormulaPlan::new("missing");
        let results = run_batch(&plan, &[Binding::new(), Binding::new()]);
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(RunError::Invalid { .. }))));
    }

    #[test]
    fn test_supported_operators() {
        let operators = supported_operators(&EngineConfig::default());
        assert_eq!(operators.len(), OperatorTag::ALL.len());
        let divide = operators
            .iter()
            .find(|info| info.name == "divide")
            .unwrap();
        assert_eq!(divide.arity, Arity::Exact(2));
        assert_eq!(divide.signature, "divide(a, b)");
    }
}
