//! Dependency graph and topological ordering.

use flowcore::{Edge, GraphError, Step, StepId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Validated step set with a precomputed execution order.
///
/// Construction rejects duplicate ids, unknown or self dependencies and
/// cycles, so a built graph always has a complete order.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    steps: Arc<[Step]>,
    edges: Arc<[Edge]>,
    incoming: Vec<Vec<Edge>>,
    order: Vec<usize>,
}

impl ExecutionGraph {
    pub fn new(steps: Vec<Step>) -> Result<Self, GraphError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
        for (idx, step) in steps.iter().enumerate() {
            if step.id.is_empty() {
                return Err(GraphError::EmptyStepId);
            }
            if index.insert(step.id.as_str(), idx).is_some() {
                return Err(GraphError::DuplicateStep(step.id.clone()));
            }
        }

        let mut incoming = Vec::with_capacity(steps.len());
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
        let mut in_degree = vec![0usize; steps.len()];

        for (idx, step) in steps.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut edges = Vec::with_capacity(step.depends_on.len());
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(GraphError::SelfDependency(step.id.clone()));
                }
                let dep_idx = *index.get(dep.as_str()).ok_or_else(|| {
                    GraphError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                if !seen.insert(dep_idx) {
                    tracing::debug!("Step {} lists dependency {} twice", step.id, dep);
                    continue;
                }
                dependents[dep_idx].push(idx);
                in_degree[idx] += 1;
                edges.push(Edge::new(dep.clone(), step.id.clone()));
            }
            incoming.push(edges);
        }

        let order = kahn_order(&dependents, in_degree);
        if order.len() != steps.len() {
            return Err(GraphError::CycleDetected {
                steps: cyclic_steps(&steps, &dependents),
            });
        }

        let edges: Vec<Edge> = incoming.iter().flatten().cloned().collect();

        Ok(Self {
            steps: Arc::from(steps),
            edges: Arc::from(edges),
            incoming,
            order,
        })
    }

    pub fn steps(&self) -> &Arc<[Step]> {
        &self.steps
    }

    pub fn edges(&self) -> &Arc<[Edge]> {
        &self.edges
    }

    /// Step indices in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Dependency edges leading into the step at `index`, in declaration order.
    pub fn incoming(&self, index: usize) -> &[Edge] {
        self.incoming.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn sorted_ids(&self) -> Vec<StepId> {
        self.order
            .iter()
            .map(|&idx| self.steps[idx].id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Kahn's algorithm. Ready steps are taken in declaration order so equal
/// inputs always produce the same order.
fn kahn_order(dependents: &[Vec<usize>], mut in_degree: Vec<usize>) -> Vec<usize> {
    let mut ready: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(idx, _)| idx)
        .collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(idx) = ready.pop_front() {
        order.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    order
}

/// Ids of every step that sits on a cycle, in declaration order.
fn cyclic_steps(steps: &[Step], dependents: &[Vec<usize>]) -> Vec<StepId> {
    let mut graph = DiGraph::<usize, ()>::with_capacity(steps.len(), 0);
    let nodes: Vec<_> = (0..steps.len()).map(|idx| graph.add_node(idx)).collect();
    for (idx, targets) in dependents.iter().enumerate() {
        for &target in targets {
            graph.add_edge(nodes[idx], nodes[target], ());
        }
    }

    let mut members: Vec<usize> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .flatten()
        .map(|node| graph[node])
        .collect();
    members.sort_unstable();
    members.into_iter().map(|idx| steps[idx].id.clone()).collect()
}
