//! Module dependency graph.
//!
//! Provides the `ModuleGraph` type, which represents module dependencies
//! as a directed acyclic graph (DAG). Used by the registry to determine
//! the order in which modules are initialized, receive events and are
//! finalized.

use crate::error::AnalysisError;
use crate::module_id::ModuleId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// A directed acyclic graph of module dependencies.
///
/// Nodes are `ModuleId`s. If module A depends on module B, B comes
/// before A in the execution order. Node insertion order is remembered
/// and used to break ties, so the resolved order is deterministic.
///
/// # Examples
///
/// ```rust
/// use zzparse::graph::ModuleGraph;
/// use zzparse::ModuleId;
///
/// let mut graph = ModuleGraph::new();
/// let combatants = ModuleId::from_str("combatants");
/// let iron_fur = ModuleId::from_str("iron_fur");
///
/// // iron_fur depends on combatants
/// graph.add_edge(iron_fur.clone(), combatants.clone());
///
/// let order = graph.topological_sort().unwrap();
/// assert_eq!(order, vec![combatants, iron_fur]);
/// ```
pub struct ModuleGraph {
    graph: DiGraph<ModuleId, ()>,
    node_map: HashMap<ModuleId, NodeIndex>,
}

impl ModuleGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add a node to the graph if it doesn't exist.
    ///
    /// If the node already exists, returns the existing node index.
    pub fn add_node(&mut self, module_id: ModuleId) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&module_id) {
            idx
        } else {
            let idx = self.graph.add_node(module_id.clone());
            self.node_map.insert(module_id, idx);
            idx
        }
    }

    /// Add an edge representing a dependency.
    ///
    /// `from` depends on `to` (`to` runs before `from`).
    /// Both nodes are added to the graph if they don't exist.
    pub fn add_edge(&mut self, from: ModuleId, to: ModuleId) {
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        self.graph.add_edge(to_idx, from_idx, ());
    }

    /// Detect cycles in the graph.
    ///
    /// Uses depth-first search. On failure the error carries the closed
    /// cycle path, e.g. `[A, B, A]`, and no module outside the cycle.
    pub fn detect_cycles(&self) -> Result<(), AnalysisError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node_idx in self.graph.node_indices() {
            if !visited.contains(&node_idx) {
                let mut cycle_path = Vec::new();
                if let Some(cycle) =
                    self.dfs_cycle_detect(node_idx, &mut visited, &mut rec_stack, &mut cycle_path)
                {
                    return Err(cycle);
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle_detect(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        rec_stack: &mut HashSet<NodeIndex>,
        cycle_path: &mut Vec<ModuleId>,
    ) -> Option<AnalysisError> {
        visited.insert(node);
        rec_stack.insert(node);
        cycle_path.push(self.graph[node].clone());

        for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
            if !visited.contains(&neighbor) {
                if let Some(cycle) = self.dfs_cycle_detect(neighbor, visited, rec_stack, cycle_path)
                {
                    return Some(cycle);
                }
            } else if rec_stack.contains(&neighbor) {
                let neighbor_id = self.graph[neighbor].clone();
                let start = cycle_path
                    .iter()
                    .position(|id| id == &neighbor_id)
                    .unwrap_or(0);
                let mut path = cycle_path[start..].to_vec();
                path.push(neighbor_id);
                return Some(AnalysisError::CyclicDependency { path });
            }
        }

        rec_stack.remove(&node);
        cycle_path.pop();
        None
    }

    /// Get a topological order of all nodes, dependencies first.
    ///
    /// Among modules whose dependencies are all satisfied, the one added
    /// to the graph first comes first.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::CyclicDependency`] if the graph has a cycle.
    pub fn topological_sort(&self) -> Result<Vec<ModuleId>, AnalysisError> {
        self.detect_cycles()?;

        let mut pending: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let incoming = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count();
                (idx, incoming)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(self.graph[idx].clone());
            for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }

        Ok(order)
    }

    /// Collect the given targets and everything they transitively depend on.
    ///
    /// Unknown targets are ignored.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzparse::graph::ModuleGraph;
    /// use zzparse::ModuleId;
    ///
    /// let mut graph = ModuleGraph::new();
    /// let combatants = ModuleId::from_str("combatants");
    /// let iron_fur = ModuleId::from_str("iron_fur");
    /// let casts = ModuleId::from_str("cast_efficiency");
    ///
    /// graph.add_edge(iron_fur.clone(), combatants.clone());
    /// graph.add_edge(casts.clone(), combatants.clone());
    ///
    /// let needed = graph.dependency_closure(&[iron_fur.clone()]);
    /// assert!(needed.contains(&iron_fur));
    /// assert!(needed.contains(&combatants));
    /// assert!(!needed.contains(&casts));
    /// ```
    pub fn dependency_closure(&self, targets: &[ModuleId]) -> HashSet<ModuleId> {
        let mut visited = HashSet::new();
        let mut stack: Vec<ModuleId> = targets.to_vec();

        while let Some(module_id) = stack.pop() {
            let Some(&node_idx) = self.node_map.get(&module_id) else {
                continue;
            };
            if !visited.insert(module_id) {
                continue;
            }
            // Edges go from dependency to dependent, so dependencies are
            // the incoming neighbors.
            for dep_idx in self.graph.neighbors_directed(node_idx, Direction::Incoming) {
                let dep_id = &self.graph[dep_idx];
                if !visited.contains(dep_id) {
                    stack.push(dep_id.clone());
                }
            }
        }

        visited
    }
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModuleId {
        ModuleId::from_str(s)
    }

    #[test]
    fn test_graph_duplicate_nodes() {
        let mut graph = ModuleGraph::new();
        let idx1 = graph.add_node(id("a"));
        let idx2 = graph.add_node(id("a"));
        assert_eq!(idx1, idx2);
        assert_eq!(graph.topological_sort().unwrap(), vec![id("a")]);
    }

    #[test]
    fn test_graph_no_cycle() {
        let mut graph = ModuleGraph::new();
        graph.add_edge(id("b"), id("a"));
        graph.add_edge(id("c"), id("b"));
        assert!(graph.detect_cycles().is_ok());
    }

    #[test]
    fn test_cycle_path_two_nodes() {
        let mut graph = ModuleGraph::new();
        graph.add_edge(id("a"), id("b"));
        graph.add_edge(id("b"), id("a"));

        match graph.detect_cycles() {
            Err(AnalysisError::CyclicDependency { path }) => {
                assert_eq!(path.len(), 3);
                assert_eq!(path[0], path[2]);
                assert!(path.contains(&id("a")));
                assert!(path.contains(&id("b")));
            }
            other => panic!("Expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_path_self_dependency() {
        let mut graph = ModuleGraph::new();
        graph.add_edge(id("a"), id("a"));

        match graph.detect_cycles() {
            Err(AnalysisError::CyclicDependency { path }) => {
                assert_eq!(path, vec![id("a"), id("a")]);
            }
            other => panic!("Expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_path_excludes_non_cycle_nodes() {
        let mut graph = ModuleGraph::new();
        // x <- y <- a <- b <- c <- a
        graph.add_edge(id("y"), id("x"));
        graph.add_edge(id("a"), id("y"));
        graph.add_edge(id("b"), id("a"));
        graph.add_edge(id("c"), id("b"));
        graph.add_edge(id("a"), id("c"));

        match graph.detect_cycles() {
            Err(AnalysisError::CyclicDependency { path }) => {
                assert!(!path.contains(&id("x")));
                assert!(!path.contains(&id("y")));
                assert!(path.contains(&id("a")));
                assert!(path.contains(&id("b")));
                assert!(path.contains(&id("c")));
                assert_eq!(path[0], path[path.len() - 1]);
            }
            other => panic!("Expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_topological_sort_respects_dependencies() {
        let mut graph = ModuleGraph::new();
        graph.add_edge(id("damage_taken"), id("buffs"));
        graph.add_edge(id("mitigation"), id("damage_taken"));
        graph.add_edge(id("mitigation"), id("buffs"));

        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec![id("buffs"), id("damage_taken"), id("mitigation")]);
    }

    #[test]
    fn test_topological_sort_ties_follow_insertion_order() {
        let mut graph = ModuleGraph::new();
        for name in ["casts", "buffs", "abilities", "healing"] {
            graph.add_node(id(name));
        }
        graph.add_edge(id("casts"), id("healing"));

        let order = graph.topological_sort().unwrap();
        assert_eq!(
            order,
            vec![id("buffs"), id("abilities"), id("healing"), id("casts")]
        );
    }

    #[test]
    fn test_topological_sort_is_deterministic() {
        let build = || {
            let mut graph = ModuleGraph::new();
            for name in ["e", "d", "c", "b", "a"] {
                graph.add_node(id(name));
            }
            graph.add_edge(id("a"), id("c"));
            graph.add_edge(id("b"), id("c"));
            graph.add_edge(id("e"), id("a"));
            graph
        };
        let first = build().topological_sort().unwrap();
        for _ in 0..10 {
            assert_eq!(build().topological_sort().unwrap(), first);
        }
        assert_eq!(first, vec![id("d"), id("c"), id("b"), id("a"), id("e")]);
    }

    #[test]
    fn test_topological_sort_rejects_cycle() {
        let mut graph = ModuleGraph::new();
        graph.add_edge(id("a"), id("b"));
        graph.add_edge(id("b"), id("a"));
        assert!(matches!(
            graph.topological_sort(),
            Err(AnalysisError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_dependency_closure_shared_dependency() {
        let mut graph = ModuleGraph::new();
        graph.add_edge(id("mid1"), id("base"));
        graph.add_edge(id("mid2"), id("base"));
        graph.add_edge(id("top1"), id("mid1"));
        graph.add_edge(id("top2"), id("mid2"));

        let closure = graph.dependency_closure(&[id("top1")]);
        assert_eq!(closure.len(), 3);
        assert!(closure.contains(&id("base")));
        assert!(!closure.contains(&id("mid2")));
    }

    #[test]
    fn test_dependency_closure_unknown_target() {
        let graph = ModuleGraph::new();
        assert!(graph.dependency_closure(&[id("ghost")]).is_empty());
    }
}
