//! Circular dependency detection over the step graph.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::formula::dependency::DependencyGraph;

/// Find circular dependencies between steps.
///
/// Every node is explored, so cycles unreachable from the output are found
/// too. Each cycle is listed from the step where it was entered, without
/// repeating that step at the end: `A -> B -> A` is reported as `[A, B]`.
#[instrument(skip_all, fields(nodes = graph.nodes().len()))]
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();
    let mut cycles = Vec::new();

    for node in graph.nodes() {
        if !visited.contains(node.as_str()) {
            visit(graph, node, &mut visited, &mut on_stack, &mut path, &mut cycles);
        }
    }

    if !cycles.is_empty() {
        debug!(count = cycles.len(), "circular step dependencies found");
    }
    cycles
}

/// Depth-first search from `root` with an explicit stack of
/// `(step, next dependency index)` frames, so long chains cannot overflow.
fn visit<'g>(
    graph: &'g DependencyGraph,
    root: &'g str,
    visited: &mut HashSet<&'g str>,
    on_stack: &mut HashSet<&'g str>,
    path: &mut Vec<&'g str>,
    cycles: &mut Vec<Vec<String>>,
) {
    let mut frames: Vec<(&'g str, usize)> = vec![(root, 0)];
    visited.insert(root);
    on_stack.insert(root);
    path.push(root);

    while let Some((node, next)) = frames.last_mut() {
        let Some(dep) = graph.dependencies(*node).get(*next) else {
            on_stack.remove(*node);
            path.pop();
            frames.pop();
            continue;
        };
        *next += 1;

        let dep = dep.as_str();
        if !visited.contains(dep) {
            visited.insert(dep);
            on_stack.insert(dep);
            path.push(dep);
            frames.push((dep, 0));
        } else if on_stack.contains(dep) {
            if let Some(start) = path.iter().position(|&n| n == dep) {
                cycles.push(path[start..].iter().map(|n| n.to_string()).collect());
            }
        }
    }
}

/// Whether any step is part of a cycle.
pub fn has_cycle(graph: &DependencyGraph) -> bool {
    graph.topological_order().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::dependency::build_step_graph;
    use crate::formula::ast::{Operation, OperatorTag};
    use crate::formula::parser::parse;
    use crate::models::CalculationStep;

    fn graph(steps: &[(&str, &str, &str)]) -> DependencyGraph {
        let steps: Vec<_> = steps
            .iter()
            .map(|(id, text, result)| {
                CalculationStep::new(*id, parse(text).unwrap()).publishing(*result)
            })
            .collect();
        build_step_graph(&steps)
    }

    #[test]
    fn test_two_step_cycle_reported_once() {
        let g = graph(&[("A", "add(y, 1)", "x"), ("B", "add(x, 1)", "y")]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles, vec![vec!["A".to_string(), "B".to_string()]]);
        assert!(has_cycle(&g));
    }

    #[test]
    fn test_self_reference() {
        let g = graph(&[("A", "add(x, 1)", "x")]);
        assert_eq!(find_cycles(&g), vec![vec!["A".to_string()]]);
    }

    #[test]
    fn test_three_step_cycle() {
        let g = graph(&[
            ("A", "add(c, 1)", "a"),
            ("B", "add(a, 1)", "b"),
            ("C", "add(b, 1)", "c"),
        ]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["A", "C", "B"]);
    }

    #[test]
    fn test_acyclic() {
        let g = graph(&[
            ("A", "add(1, 1)", "a"),
            ("B", "add(a, a)", "b"),
            ("C", "add(a, b)", "c"),
        ]);
        assert!(find_cycles(&g).is_empty());
        assert!(!has_cycle(&g));

        let g = graph(&[("A", "add(x, 1)", "a")]);
        assert!(find_cycles(&g).is_empty());
    }

    #[test]
    fn test_cycle_off_the_output_path() {
        let g = graph(&[
            ("out", "add(base, 1)", "net"),
            ("P", "add(q, 1)", "p"),
            ("Q", "add(p, 1)", "q"),
        ]);
        assert_eq!(find_cycles(&g).len(), 1);
    }

    #[test]
    fn test_long_chain_listed_in_reverse() {
        let len = 200_000;
        let steps: Vec<_> = (0..len)
            .rev()
            .map(|i| {
                let source = if i == 0 {
                    "x".to_string()
                } else {
                    format!("r{}", i - 1)
                };
                let op = Operation::new(
                    OperatorTag::Add,
                    vec![source.as_str().into(), 1.0.into()],
                );
                CalculationStep::new(format!("s{i}"), op).publishing(format!("r{i}"))
            })
            .collect();

        let g = build_step_graph(&steps);
        assert!(find_cycles(&g).is_empty());

        let mut steps = steps;
        let last = format!("r{}", len - 1);
        steps[len - 1].operation =
            Operation::new(OperatorTag::Add, vec![last.as_str().into(), 1.0.into()]);
        let cycles = find_cycles(&build_step_graph(&steps));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), len);
    }
}
