//! Dependencies between calculation steps.
//!
//! A step depends on another step when one of its operands names the other
//! step's published result. When several steps publish the same result, the
//! consumer depends on all of them.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::trace;

use crate::formula::ast::{Operand, Operation};
use crate::models::CalculationStep;

/// Every name referenced anywhere in `step`'s operation, nested operands included.
pub fn extract_references(step: &CalculationStep) -> BTreeSet<&str> {
    operation_references(&step.operation)
}

pub fn operation_references(operation: &Operation) -> BTreeSet<&str> {
    let mut names = BTreeSet::new();
    operation.walk(&mut |op| {
        names.extend(op.parameters.iter().filter_map(Operand::as_name));
    });
    names
}

/// Directed graph from each step to the steps it depends on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    /// Step ids in plan order, without duplicates.
    nodes: Vec<String>,
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Steps that `id` reads from, in plan order.
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// `root` and every step it transitively depends on.
    pub fn closure(&self, root: &str) -> HashSet<&str> {
        let mut seen = HashSet::new();
        let Some((root, _)) = self.edges.get_key_value(root) else {
            return seen;
        };

        let mut stack = vec![root.as_str()];
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.dependencies(id).iter().map(String::as_str));
            }
        }
        seen
    }

    /// Order in which every step comes after its dependencies, or `None` when
    /// the graph has a cycle. Ties keep plan order.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut pending: Vec<usize> = self
            .nodes
            .iter()
            .map(|id| self.dependencies(id).len())
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, id) in self.nodes.iter().enumerate() {
            for dep in self.dependencies(id) {
                if let Some(&d) = index.get(dep.as_str()) {
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> =
            (0..self.nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.pop_first() {
            order.push(self.nodes[next].clone());
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        (order.len() == self.nodes.len()).then_some(order)
    }
}

/// Build the step graph. Names that no step publishes add no edges.
pub fn build_step_graph(steps: &[CalculationStep]) -> DependencyGraph {
    let mut producers: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        if let Some(result) = step.result.as_deref() {
            producers.entry(result).or_default().push(step.id.as_str());
        }
    }

    let mut graph = DependencyGraph::default();
    for step in steps {
        if !graph.edges.contains_key(&step.id) {
            graph.nodes.push(step.id.clone());
        }
        let deps = graph.edges.entry(step.id.clone()).or_default();

        for name in extract_references(step) {
            for &producer in producers.get(name).into_iter().flatten() {
                if !deps.iter().any(|d| d == producer) {
                    deps.push(producer.to_string());
                }
            }
        }
    }

    trace!(
        nodes = graph.nodes.len(),
        edges = graph.edge_count(),
        "built step dependency graph"
    );
    graph
}
