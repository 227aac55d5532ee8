//! Edits to a plan, applied as values.
//!
//! Applying an edit never touches the original plan; the caller receives a
//! new plan and validates that.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EditError;
use crate::models::{CalculationStep, FormulaPlan, Variable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlanEdit {
    AddVariable { variable: Variable },
    ReplaceVariable { name: String, variable: Variable },
    RemoveVariable { name: String },
    AddStep { step: CalculationStep },
    /// Insert at `index`; `index == steps.len()` appends.
    InsertStep { index: usize, step: CalculationStep },
    ReplaceStep { id: String, step: CalculationStep },
    RemoveStep { id: String },
    MoveStep { id: String, index: usize },
    SetOutput { name: String },
}

impl FormulaPlan {
    pub fn apply(&self, edit: &PlanEdit) -> Result<FormulaPlan, EditError> {
        let mut plan = self.clone();
        match edit {
            PlanEdit::AddVariable { variable } => plan.variables.push(variable.clone()),
            PlanEdit::ReplaceVariable { name, variable } => {
                let slot = plan
                    .variables
                    .iter_mut()
                    .find(|v| &v.name == name)
                    .ok_or_else(|| EditError::UnknownVariable(name.clone()))?;
                *slot = variable.clone();
            }
            PlanEdit::RemoveVariable { name } => {
                let index = variable_index(&plan, name)?;
                plan.variables.remove(index);
            }
            PlanEdit::AddStep { step } => plan.steps.push(step.clone()),
            PlanEdit::InsertStep { index, step } => {
                let len = plan.steps.len();
                if *index > len {
                    return Err(EditError::IndexOutOfBounds { index: *index, len });
                }
                plan.steps.insert(*index, step.clone());
            }
            PlanEdit::ReplaceStep { id, step } => {
                let index = step_index(&plan, id)?;
                plan.steps[index] = step.clone();
            }
            PlanEdit::RemoveStep { id } => {
                let index = step_index(&plan, id)?;
                plan.steps.remove(index);
            }
            PlanEdit::MoveStep { id, index } => {
                let from = step_index(&plan, id)?;
                let len = plan.steps.len();
                if *index >= len {
                    return Err(EditError::IndexOutOfBounds { index: *index, len });
                }
                let step = plan.steps.remove(from);
                plan.steps.insert(*index, step);
            }
            PlanEdit::SetOutput { name } => plan.output_variable = name.clone(),
        }
        debug!(?edit, "applied plan edit");
        Ok(plan)
    }

    /// Apply edits in order; the first failing edit aborts the whole batch.
    pub fn apply_all<'e>(
        &self,
        edits: impl IntoIterator<Item = &'e PlanEdit>,
    ) -> Result<FormulaPlan, EditError> {
        edits
            .into_iter()
            .try_fold(self.clone(), |plan, edit| plan.apply(edit))
    }
}

fn step_index(plan: &FormulaPlan, id: &str) -> Result<usize, EditError> {
    plan.steps
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| EditError::UnknownStep(id.to_string()))
}

fn variable_index(plan: &FormulaPlan, name: &str) -> Result<usize, EditError> {
    plan.variables
        .iter()
        .position(|v| v.name == name)
        .ok_or_else(|| EditError::UnknownVariable(name.to_string()))
}
