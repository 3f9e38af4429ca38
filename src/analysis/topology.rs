//! Static view of the declared dependencies between variables.
//!
//! Edges point from a dependency to the variable whose formula reads it, for
//! every formula version. The resolver never needs this graph: it is for
//! auditing a ruleset (what must be supplied, what an input affects, in
//! which order things can be computed).
//!
//! A static cycle is not necessarily an error at run time. A formula may read
//! itself (or a variable that reads it) at an earlier period, which
//! terminates. Only a repeated `(variable, period)` key is a real cycle.
use crate::compute::ComputationError;
use crate::store::{Registry, VariableId};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use std::collections::BTreeSet;

pub type DependencyGraph = DiGraph<VariableId, ()>;

/// Node `i` of the returned graph is variable `VariableId(i)`.
pub fn dependency_graph(registry: &Registry) -> DependencyGraph {
    let mut graph = DiGraph::with_capacity(registry.len(), 0);
    for (id, _) in registry.iter() {
        graph.add_node(id);
    }
    for (id, variable) in registry.iter() {
        for dependency in variable.formulas.iter().flat_map(|v| v.dependencies.iter()) {
            // Dependencies were checked when the registry was finished.
            if let Ok(source) = registry.id_of(dependency) {
                graph.update_edge(node(source), node(id), ());
            }
        }
    }
    graph
}

#[inline(always)]
fn node(id: VariableId) -> NodeIndex {
    NodeIndex::new(id.index())
}

/// Every variable after all of its dependencies.
///
/// Fails with `CycleDetected` naming the first statically cyclic group found.
pub fn evaluation_order(registry: &Registry) -> Result<Vec<VariableId>, ComputationError> {
    let graph = dependency_graph(registry);
    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|n| graph[n]).collect()),
        Err(_) => {
            let cycle = static_cycles(registry).into_iter().next().unwrap_or_default();
            Err(ComputationError::CycleDetected { cycle })
        }
    }
}

/// Groups of variables that (transitively) declare each other as
/// dependencies, including formulas that read themselves. Names within a
/// group are sorted.
pub fn static_cycles(registry: &Registry) -> Vec<Vec<String>> {
    let graph = dependency_graph(registry);
    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1 || graph.contains_edge(component[0], component[0]))
        .map(|component| {
            let names: BTreeSet<&str> = component.iter().map(|&n| registry.get(graph[n]).name.as_str()).collect();
            names.into_iter().map(str::to_string).collect()
        })
        .collect();
    cycles.sort();
    cycles
}

/// Everything `name` may read, directly or transitively.
pub fn upstream_of(registry: &Registry, name: &str) -> Result<BTreeSet<VariableId>, ComputationError> {
    let start = registry.id_of(name)?;
    let graph = dependency_graph(registry);
    let reversed = Reversed(&graph);
    let mut dfs = Dfs::new(reversed, node(start));
    let mut upstream = BTreeSet::new();
    while let Some(n) = dfs.next(reversed) {
        upstream.insert(graph[n]);
    }
    upstream.remove(&start);
    Ok(upstream)
}

/// Everything that may read `name`, directly or transitively.
pub fn downstream_of(registry: &Registry, name: &str) -> Result<BTreeSet<VariableId>, ComputationError> {
    let start = registry.id_of(name)?;
    let graph = dependency_graph(registry);
    let mut dfs = Dfs::new(&graph, node(start));
    let mut downstream = BTreeSet::new();
    while let Some(n) = dfs.next(&graph) {
        downstream.insert(graph[n]);
    }
    downstream.remove(&start);
    Ok(downstream)
}

/// The input variables a caller may need to supply to compute `name`,
/// sorted by name.
pub fn input_requirements(registry: &Registry, name: &str) -> Result<Vec<String>, ComputationError> {
    let mut inputs: Vec<String> = upstream_of(registry, name)?
        .into_iter()
        .map(|id| registry.get(id))
        .filter(|variable| variable.is_input())
        .map(|variable| variable.name.clone())
        .collect();
    inputs.sort();
    Ok(inputs)
}
