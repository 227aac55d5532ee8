//! Versioned plan storage.
//!
//! Readers take an [`Arc`]-shared snapshot, so a payroll batch keeps working
//! against one consistent plan while administrators keep saving new versions.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{RunError, StoreError};
use crate::formula::edit::PlanEdit;
use crate::formula::evaluator::{run_batch_with_config, Value};
use crate::formula::registry::VariableProvider;
use crate::formula::validator::validate_with_config;
use crate::models::FormulaPlan;

/// An immutable plan at a given version.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSnapshot {
    pub version: u64,
    pub plan: Arc<FormulaPlan>,
}

pub trait PlanStore: Send + Sync {
    /// Validate and store `plan`; invalid plans are rejected.
    fn save(&self, plan_id: &str, plan: FormulaPlan) -> Result<PlanSnapshot, StoreError>;

    fn snapshot(&self, plan_id: &str) -> Option<PlanSnapshot>;

    fn remove(&self, plan_id: &str) -> Option<PlanSnapshot>;

    fn plan_ids(&self) -> Vec<String>;
}

/// In-memory [`PlanStore`]. Versions start at 1 and grow with every save.
#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    plans: DashMap<String, PlanSnapshot>,
    config: EngineConfig,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            plans: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    fn check(&self, plan_id: &str, plan: &FormulaPlan) -> Result<(), StoreError> {
        let report = validate_with_config(plan, &self.config);
        if report.is_valid() {
            Ok(())
        } else {
            warn!(plan_id, errors = report.errors.len(), "rejected invalid plan");
            Err(StoreError::Invalid {
                plan_id: plan_id.to_string(),
                issues: report.errors,
            })
        }
    }

    /// Apply `edits` to the stored plan and save the result as a new version.
    ///
    /// The edited plan is validated before it replaces the current one.
    #[instrument(skip(self, edits))]
    pub fn apply(&self, plan_id: &str, edits: &[PlanEdit]) -> Result<PlanSnapshot, StoreError> {
        let mut entry = self
            .plans
            .get_mut(plan_id)
            .ok_or_else(|| StoreError::NotFound(plan_id.to_string()))?;

        let edited = entry.plan.apply_all(edits)?;
        self.check(plan_id, &edited)?;

        let version = entry.version + 1;
        *entry = PlanSnapshot {
            version,
            plan: Arc::new(edited),
        };
        info!(version, edits = edits.len(), "plan edited");
        Ok(entry.value().clone())
    }

    /// Evaluate every binding against one snapshot of `plan_id`.
    #[instrument(skip(self, bindings), fields(size = bindings.len()))]
    pub fn run_batch<V: VariableProvider + Sync>(
        &self,
        plan_id: &str,
        bindings: &[V],
    ) -> Result<(u64, Vec<Result<Value, RunError>>), StoreError> {
        let snapshot = self
            .snapshot(plan_id)
            .ok_or_else(|| StoreError::NotFound(plan_id.to_string()))?;
        debug!(version = snapshot.version, "running batch");

        let results = run_batch_with_config(&snapshot.plan, bindings, self.config.clone());
        Ok((snapshot.version, results))
    }
}

impl PlanStore for MemoryPlanStore {
    #[instrument(skip(self, plan))]
    fn save(&self, plan_id: &str, plan: FormulaPlan) -> Result<PlanSnapshot, StoreError> {
        self.check(plan_id, &plan)?;

        let plan = Arc::new(plan);
        let snapshot = match self.plans.entry(plan_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let snapshot = PlanSnapshot {
                    version: entry.get().version + 1,
                    plan,
                };
                entry.insert(snapshot.clone());
                snapshot
            }
            Entry::Vacant(entry) => {
                let snapshot = PlanSnapshot { version: 1, plan };
                entry.insert(snapshot.clone());
                snapshot
            }
        };

        info!(version = snapshot.version, "plan saved");
        Ok(snapshot)
    }

    fn snapshot(&self, plan_id: &str) -> Option<PlanSnapshot> {
        self.plans.get(plan_id).map(|entry| entry.value().clone())
    }

    fn remove(&self, plan_id: &str) -> Option<PlanSnapshot> {
        self.plans.remove(plan_id).map(|(_, snapshot)| snapshot)
    }

    fn plan_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plans.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }
}
