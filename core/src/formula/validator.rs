//! Structural checks over a whole plan.
//!
//! Validation never fails: every problem found is collected into a
//! [`ValidationResult`] so a caller can show them all at once. Errors block
//! evaluation; warnings are advisory.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::formula::cycles::find_cycles;
use crate::formula::dependency::{build_step_graph, extract_references};
use crate::models::FormulaPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    DuplicateVariable,
    DuplicateStepId,
    DuplicateResult,
    UnknownReference,
    InvalidArity,
    MissingOutput,
    CircularDependency,
    MissingPath,
    NestingTooDeep,
    UnusedVariable,
    UnusedStep,
    ShadowedVariable,
    MissingResult,
}

impl IssueKind {
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::DuplicateVariable => "duplicateVariable",
            IssueKind::DuplicateStepId => "duplicateStepId",
            IssueKind::DuplicateResult => "duplicateResult",
            IssueKind::UnknownReference => "unknownReference",
            IssueKind::InvalidArity => "invalidArity",
            IssueKind::MissingOutput => "missingOutput",
            IssueKind::CircularDependency => "circularDependency",
            IssueKind::MissingPath => "missingPath",
            IssueKind::NestingTooDeep => "nestingTooDeep",
            IssueKind::UnusedVariable => "unusedVariable",
            IssueKind::UnusedStep => "unusedStep",
            IssueKind::ShadowedVariable => "shadowedVariable",
            IssueKind::MissingResult => "missingResult",
        }
    }
}

/// A single problem, attached to a step, a variable, or the plan as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn plan(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            step_id: None,
            variable_name: None,
            kind,
            message: message.into(),
        }
    }

    pub fn step(step_id: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            step_id: Some(step_id.into()),
            ..Self::plan(kind, message)
        }
    }

    pub fn variable(name: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            variable_name: Some(name.into()),
            ..Self::plan(kind, message)
        }
    }

    fn naming(mut self, name: &str) -> Self {
        self.variable_name = Some(name.to_string());
        self
    }

    pub fn is_plan_level(&self) -> bool {
        self.step_id.is_none() && self.variable_name.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors attached to `step_id`.
    pub fn errors_for_step<'a>(
        &'a self,
        step_id: &'a str,
    ) -> impl Iterator<Item = &'a ValidationIssue> {
        self.errors
            .iter()
            .filter(move |issue| issue.step_id.as_deref() == Some(step_id))
    }

    pub fn has_error(&self, kind: IssueKind) -> bool {
        self.errors.iter().any(|issue| issue.kind == kind)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn validate(plan: &FormulaPlan) -> ValidationResult {
    validate_with_config(plan, &EngineConfig::default())
}

#[instrument(skip_all, fields(steps = plan.steps.len(), variables = plan.variables.len()))]
pub fn validate_with_config(plan: &FormulaPlan, config: &EngineConfig) -> ValidationResult {
    let mut report = ValidationResult::default();

    check_variables(plan, &mut report);
    let results = check_steps(plan, &mut report);
    check_references(plan, &results, &mut report);
    check_operations(plan, config, &mut report);
    check_output(plan, &results, &mut report);
    check_cycles(plan, &mut report);
    check_usage(plan, &mut report);

    if report.is_valid() {
        debug!(warnings = report.warnings.len(), "plan is valid");
    } else {
        warn!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "plan failed validation"
        );
    }
    report
}

fn check_variables(plan: &FormulaPlan, report: &mut ValidationResult) {
    let mut seen = HashSet::new();
    for variable in &plan.variables {
        if !seen.insert(variable.name.as_str()) {
            report.errors.push(ValidationIssue::variable(
                &variable.name,
                IssueKind::DuplicateVariable,
                format!("variable `{}` is declared more than once", variable.name),
            ));
        }
        let has_path = variable.path.as_deref().is_some_and(|p| !p.trim().is_empty());
        if variable.source.is_external() && !has_path {
            report.errors.push(ValidationIssue::variable(
                &variable.name,
                IssueKind::MissingPath,
                format!(
                    "variable `{}` reads from an external record but has no path",
                    variable.name
                ),
            ));
        }
    }
}

/// Checks step ids and results; returns every published result name.
fn check_steps<'p>(plan: &'p FormulaPlan, report: &mut ValidationResult) -> HashSet<&'p str> {
    let mut ids = HashSet::new();
    let mut results: HashMap<&str, &str> = HashMap::new();

    for step in &plan.steps {
        if !ids.insert(step.id.as_str()) {
            report.errors.push(ValidationIssue::step(
                &step.id,
                IssueKind::DuplicateStepId,
                format!("step id `{}` is used more than once", step.id),
            ));
        }

        let Some(result) = step.result.as_deref() else {
            report.warnings.push(ValidationIssue::step(
                &step.id,
                IssueKind::MissingResult,
                format!("step `{}` publishes no result and can never be used", step.id),
            ));
            continue;
        };

        if let Some(first) = results.get(result) {
            report.errors.push(
                ValidationIssue::step(
                    &step.id,
                    IssueKind::DuplicateResult,
                    format!("result `{result}` is already published by step `{first}`"),
                )
                .naming(result),
            );
        } else {
            results.insert(result, step.id.as_str());
        }

        if plan.variable(result).is_some() {
            report.warnings.push(
                ValidationIssue::step(
                    &step.id,
                    IssueKind::ShadowedVariable,
                    format!("result `{result}` shadows the variable of the same name"),
                )
                .naming(result),
            );
        }
    }

    results.into_keys().collect()
}

fn check_references(plan: &FormulaPlan, results: &HashSet<&str>, report: &mut ValidationResult) {
    let variables: HashSet<&str> = plan.variables.iter().map(|v| v.name.as_str()).collect();

    for step in &plan.steps {
        for name in extract_references(step) {
            if !variables.contains(name) && !results.contains(name) {
                report.errors.push(
                    ValidationIssue::step(
                        &step.id,
                        IssueKind::UnknownReference,
                        format!(
                            "step `{}` references `{name}`, which is neither a variable \
                             nor a step result",
                            step.id
                        ),
                    )
                    .naming(name),
                );
            }
        }
    }
}

fn check_operations(plan: &FormulaPlan, config: &EngineConfig, report: &mut ValidationResult) {
    for step in &plan.steps {
        let depth = step.operation.depth();
        if depth > config.max_nesting_depth {
            report.errors.push(ValidationIssue::step(
                &step.id,
                IssueKind::NestingTooDeep,
                format!(
                    "step `{}` nests {depth} operations deep; the limit is {}",
                    step.id, config.max_nesting_depth
                ),
            ));
        }

        step.operation.walk(&mut |op| {
            if let Err(err) = op.check_arity(config) {
                report.errors.push(ValidationIssue::step(
                    &step.id,
                    IssueKind::InvalidArity,
                    format!("step `{}`: {err}", step.id),
                ));
            }
        });
    }
}

fn check_output(plan: &FormulaPlan, results: &HashSet<&str>, report: &mut ValidationResult) {
    let output = plan.output_variable.trim();
    if output.is_empty() {
        report.errors.push(ValidationIssue::plan(
            IssueKind::MissingOutput,
            "no output variable is set",
        ));
    } else if !results.contains(plan.output_variable.as_str()) {
        report.errors.push(ValidationIssue::plan(
            IssueKind::MissingOutput,
            format!(
                "output variable `{}` is not published by any step",
                plan.output_variable
            ),
        ));
    }
}

fn check_cycles(plan: &FormulaPlan, report: &mut ValidationResult) {
    let graph = build_step_graph(&plan.steps);
    for cycle in find_cycles(&graph) {
        let chain = describe_cycle(&cycle);
        warn!(cycle = %chain, "circular step dependency");
        for step_id in &cycle {
            report.errors.push(ValidationIssue::step(
                step_id,
                IssueKind::CircularDependency,
                format!("step `{step_id}` is part of a circular dependency: {chain}"),
            ));
        }
    }
}

/// `A -> B -> A`, eliding the middle of long cycles.
fn describe_cycle(cycle: &[String]) -> String {
    const SHOWN: usize = 8;
    let Some(start) = cycle.first() else {
        return String::new();
    };
    if cycle.len() <= SHOWN {
        return format!("{} -> {start}", cycle.join(" -> "));
    }
    let head = cycle[..SHOWN / 2].join(" -> ");
    let tail = cycle[cycle.len() - SHOWN / 2..].join(" -> ");
    let hidden = cycle.len() - SHOWN;
    format!("{head} -> ... {hidden} more ... -> {tail} -> {start}")
}

fn check_usage(plan: &FormulaPlan, report: &mut ValidationResult) {
    let referenced: HashSet<&str> = plan
        .steps
        .iter()
        .flat_map(|step| extract_references(step))
        .collect();

    for variable in &plan.variables {
        if !referenced.contains(variable.name.as_str()) {
            report.warnings.push(ValidationIssue::variable(
                &variable.name,
                IssueKind::UnusedVariable,
                format!("variable `{}` is never referenced", variable.name),
            ));
        }
    }

    for step in &plan.steps {
        let Some(result) = step.result.as_deref() else {
            continue;
        };
        if result != plan.output_variable && !referenced.contains(result) {
            report.warnings.push(ValidationIssue::step(
                &step.id,
                IssueKind::UnusedStep,
                format!("result `{result}` of step `{}` is never used", step.id),
            ));
        }
    }
}
