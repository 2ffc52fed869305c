//! Dependency Topology
//!
//! Directed graph over item ids (edge `j → i` when `i` references `S_j`),
//! with two independent acyclicity checks that must agree:
//!
//! 1. Position-variable formula: assert `π_j < π_i` per edge and check
//!    satisfiability — SAT is equivalent to acyclicity.
//! 2. Kahn worklist: fewer than `|I|` emitted items means a cycle.
//!
//! The worklist is a min-heap keyed by `origin_index`, which makes the
//! emission order the unique canonical topological order. Also computes
//! dependency layers (longest-path depth) and weakly-connected components
//! for downstream consumers.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::errors::{CanvassError, Result};
use crate::features::smt::domain::{Atom, Formula, LinExpr};
use crate::features::smt::infrastructure::{SolverContext, SolverResult};

use super::static_builder::StaticModel;

/// Topology of a questionnaire's dependency graph.
#[derive(Debug, Clone)]
pub struct Topology {
    graph: DiGraph<String, ()>,
    node_of: FxHashMap<String, NodeIndex>,
    /// Canonical topological order
    order: Vec<String>,
    /// Longest-path depth from any source
    layers: BTreeMap<String, usize>,
    /// Weakly-connected components, each sorted
    components: Vec<BTreeSet<String>>,
    component_of: FxHashMap<String, usize>,
}

/// Aggregate topology statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyStats {
    pub total_items: usize,
    pub total_dependencies: usize,
    pub component_count: usize,
    pub isolated_items: usize,
    pub max_layer: usize,
}

impl Topology {
    /// Build the topology; a cycle aborts with the offending path.
    pub fn build(model: &StaticModel, config: &AnalysisConfig) -> Result<Topology> {
        let mut graph = DiGraph::new();
        let mut node_of = FxHashMap::default();

        for item in &model.items {
            let idx = graph.add_node(item.id.clone());
            node_of.insert(item.id.clone(), idx);
        }
        for (from, to) in model.edges() {
            let from_idx = node_of[&from];
            let to_idx = node_of[&to];
            graph.add_edge(from_idx, to_idx, ());
        }

        // Check 1: position-variable formula, π_j < π_i per edge j → i,
        // bounded to 0 ≤ π < |I|
        let solver_acyclic = Self::check_positions(model, config);

        // Check 2: Kahn worklist keyed by origin_index
        let (order, emitted_all) = Self::kahn_order(model, &graph, &node_of);

        match solver_acyclic {
            Some(acyclic) if acyclic != emitted_all => {
                // The worklist result is authoritative
                warn!(
                    solver = acyclic,
                    worklist = emitted_all,
                    "cycle detection methods disagree; trusting worklist"
                );
            }
            None => {
                warn!("position-variable cycle check returned unknown");
            }
            _ => {}
        }

        if !emitted_all {
            let emitted: BTreeSet<String> = order.iter().cloned().collect();
            let path = Self::extract_cycle(model, &emitted);
            return Err(CanvassError::CycleDetected(path));
        }

        let layers = Self::compute_layers(model, &order);
        let (components, component_of) = Self::compute_components(&graph, &node_of);

        info!(
            items = order.len(),
            components = components.len(),
            "topology computed"
        );

        Ok(Topology {
            graph,
            node_of,
            order,
            layers,
            components,
            component_of,
        })
    }

    fn check_positions(model: &StaticModel, config: &AnalysisConfig) -> Option<bool> {
        let mut ctx = SolverContext::new(config.solver.clone(), config.cancel.clone());
        let count = model.items.len() as i64;
        for item in &model.items {
            let pi = LinExpr::var(position_var(&item.id));
            ctx.assert_formula(Formula::Atom(Atom::ge(&pi, &LinExpr::constant(0))));
            ctx.assert_formula(Formula::Atom(Atom::lt(&pi, &LinExpr::constant(count))));
        }
        for (from, to) in model.edges() {
            let pi_from = LinExpr::var(position_var(&from));
            let pi_to = LinExpr::var(position_var(&to));
            ctx.assert_formula(Formula::Atom(Atom::lt(&pi_from, &pi_to)));
        }
        match ctx.check() {
            SolverResult::Sat(_) => Some(true),
            SolverResult::Unsat => Some(false),
            SolverResult::Unknown => None,
        }
    }

    fn kahn_order(
        model: &StaticModel,
        graph: &DiGraph<String, ()>,
        node_of: &FxHashMap<String, NodeIndex>,
    ) -> (Vec<String>, bool) {
        let origin: FxHashMap<&str, usize> = model
            .items
            .iter()
            .map(|item| (item.id.as_str(), item.origin_index))
            .collect();

        let mut in_degree: FxHashMap<NodeIndex, usize> = FxHashMap::default();
        for item in &model.items {
            let idx = node_of[&item.id];
            in_degree.insert(idx, graph.neighbors_directed(idx, Direction::Incoming).count());
        }

        // Min-heap on (origin_index, id): the available item appearing
        // first in the file is always chosen
        let mut heap: BinaryHeap<Reverse<(usize, String)>> = BinaryHeap::new();
        for item in &model.items {
            if in_degree[&node_of[&item.id]] == 0 {
                heap.push(Reverse((item.origin_index, item.id.clone())));
            }
        }

        let mut order = Vec::with_capacity(model.items.len());
        while let Some(Reverse((_, id))) = heap.pop() {
            let idx = node_of[&id];
            order.push(id);
            for neighbor in graph.neighbors_directed(idx, Direction::Outgoing) {
                let degree = in_degree.get_mut(&neighbor).expect("known node");
                *degree -= 1;
                if *degree == 0 {
                    let neighbor_id = &graph[neighbor];
                    heap.push(Reverse((origin[neighbor_id.as_str()], neighbor_id.clone())));
                }
            }
        }

        let complete = order.len() == model.items.len();
        (order, complete)
    }

    /// DFS from an unemitted vertex to produce one concrete cycle path,
    /// closed by repeating its first element.
    fn extract_cycle(model: &StaticModel, emitted: &BTreeSet<String>) -> Vec<String> {
        let deps: BTreeMap<&str, &BTreeSet<String>> = model
            .items
            .iter()
            .map(|item| (item.id.as_str(), &item.deps))
            .collect();

        for start in model.items.iter().filter(|i| !emitted.contains(&i.id)) {
            // Iterative DFS along dependency edges, carrying the trail
            let mut stack: Vec<(String, Vec<String>)> = vec![(start.id.clone(), Vec::new())];
            while let Some((node, trail)) = stack.pop() {
                if let Some(pos) = trail.iter().position(|n| n == &node) {
                    let mut cycle: Vec<String> = trail[pos..].to_vec();
                    cycle.push(node);
                    return cycle;
                }
                let mut next_trail = trail.clone();
                next_trail.push(node.clone());
                if let Some(node_deps) = deps.get(node.as_str()) {
                    for dep in node_deps.iter().rev() {
                        stack.push((dep.clone(), next_trail.clone()));
                    }
                }
            }
        }

        // Unreachable when the worklist reported a cycle
        Vec::new()
    }

    fn compute_layers(model: &StaticModel, order: &[String]) -> BTreeMap<String, usize> {
        let deps: BTreeMap<&str, &BTreeSet<String>> = model
            .items
            .iter()
            .map(|item| (item.id.as_str(), &item.deps))
            .collect();

        let mut layers = BTreeMap::new();
        for id in order {
            let layer = deps
                .get(id.as_str())
                .map(|dep_set| {
                    dep_set
                        .iter()
                        .filter_map(|d| layers.get(d).copied())
                        .map(|l: usize| l + 1)
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            layers.insert(id.clone(), layer);
        }
        layers
    }

    fn compute_components(
        graph: &DiGraph<String, ()>,
        node_of: &FxHashMap<String, NodeIndex>,
    ) -> (Vec<BTreeSet<String>>, FxHashMap<String, usize>) {
        let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut components = Vec::new();
        let mut component_of = FxHashMap::default();

        // Deterministic start order: node insertion order
        let mut ids: Vec<(&String, &NodeIndex)> = node_of.iter().collect();
        ids.sort_by_key(|(_, idx)| idx.index());

        for (_, &start) in ids {
            if visited.contains(&start) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut queue = VecDeque::new();
            queue.push_back(start);
            while let Some(idx) = queue.pop_front() {
                if !visited.insert(idx) {
                    continue;
                }
                component.insert(graph[idx].clone());
                for neighbor in graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .chain(graph.neighbors_directed(idx, Direction::Incoming))
                {
                    if !visited.contains(&neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
            let index = components.len();
            for id in &component {
                component_of.insert(id.clone(), index);
            }
            components.push(component);
        }

        (components, component_of)
    }

    /// Canonical topological order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// `Pred*(i)`: canonical-order predecessors of `id` inside its
    /// weakly-connected component. Items in disjoint components contribute
    /// nothing to accumulated reachability.
    pub fn accumulated_predecessors(&self, id: &str) -> Vec<String> {
        let component = match self.component_of.get(id) {
            Some(&c) => c,
            None => return Vec::new(),
        };
        self.order
            .iter()
            .take_while(|other| other.as_str() != id)
            .filter(|other| self.component_of.get(other.as_str()) == Some(&component))
            .cloned()
            .collect()
    }

    /// Direct dependencies of `id`.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        match self.node_of.get(id) {
            Some(&idx) => {
                let mut deps: Vec<String> = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|n| self.graph[n].clone())
                    .collect();
                deps.sort();
                deps
            }
            None => Vec::new(),
        }
    }

    /// Longest-path depth of `id` from any source.
    pub fn layer(&self, id: &str) -> Option<usize> {
        self.layers.get(id).copied()
    }

    pub fn components(&self) -> &[BTreeSet<String>] {
        &self.components
    }

    pub fn stats(&self) -> TopologyStats {
        TopologyStats {
            total_items: self.order.len(),
            total_dependencies: self.graph.edge_count(),
            component_count: self.components.len(),
            isolated_items: self.components.iter().filter(|c| c.len() == 1).count(),
            max_layer: self.layers.values().copied().max().unwrap_or(0),
        }
    }
}

fn position_var(id: &str) -> String {
    format!("pos.{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::questionnaire::load_from_str;

    fn topology(yaml: &str) -> Result<Topology> {
        let questionnaire = load_from_str(yaml)?;
        let config = AnalysisConfig::default();
        let model = StaticModel::build(&questionnaire, &config)?;
        Topology::build(&model, &config)
    }

    const CHAIN: &str = r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_a, kind: Question, input: { control: Editbox, min: 0, max: 9 } }
        - id: q_b
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "q_a.outcome > 1" } ]
        - id: q_c
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "q_b.outcome > 1" } ]
"#;

    #[test]
    fn test_chain_order() {
        let topo = topology(CHAIN).unwrap();
        assert_eq!(topo.order(), ["q_a", "q_b", "q_c"]);
        assert_eq!(topo.layer("q_a"), Some(0));
        assert_eq!(topo.layer("q_b"), Some(1));
        assert_eq!(topo.layer("q_c"), Some(2));
    }

    #[test]
    fn test_order_respects_origin_index_tiebreak() {
        let topo = topology(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: zz, kind: Question, input: { control: Editbox, min: 0, max: 9 } }
        - { id: aa, kind: Question, input: { control: Editbox, min: 0, max: 9 } }
        - id: mid
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "zz.outcome > 1" } ]
"#,
        )
        .unwrap();
        // zz and aa are both immediately available; zz appears first in the
        // file, so the canonical order keeps it first
        assert_eq!(topo.order(), ["zz", "aa", "mid"]);
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let result = topology(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - id: a
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "c.outcome > 1" } ]
        - id: b2
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "a.outcome > 1" } ]
        - id: c
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "b2.outcome > 1" } ]
"#,
        );
        match result {
            Err(CanvassError::CycleDetected(path)) => {
                assert!(path.len() >= 3);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_components_split() {
        let topo = topology(
            r#"
questionnaire:
  title: T
  blocks:
    - id: b
      items:
        - { id: q_a, kind: Question, input: { control: Editbox, min: 0, max: 9 } }
        - id: q_b
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "q_a.outcome > 1" } ]
        - { id: q_lone, kind: Question, input: { control: Editbox, min: 0, max: 9 } }
"#,
        )
        .unwrap();
        assert_eq!(topo.components().len(), 2);
        assert_eq!(topo.stats().isolated_items, 1);

        // q_lone is topologically before nothing relevant: disjoint
        // component items contribute no accumulated predecessors
        assert_eq!(topo.accumulated_predecessors("q_b"), vec!["q_a".to_string()]);
        assert!(topo.accumulated_predecessors("q_lone").is_empty());
    }

    #[test]
    fn test_dependencies_listed() {
        let topo = topology(CHAIN).unwrap();
        assert_eq!(topo.dependencies("q_b"), vec!["q_a".to_string()]);
        assert!(topo.dependencies("q_a").is_empty());
    }
}
