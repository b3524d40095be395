// src/resolver/graph.rs

//! Install and uninstall ordering
//!
//! Builds a graph over the packages of one batch, breaks cycles, and runs a
//! stable topological sort. Edges always point from a dependent to one of
//! its dependencies.

use crate::depdb::DependencyDb;
use crate::error::Result;
use crate::package::{Descriptor, PackageDescriptor, PackageKey};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Something that can be placed in an install order
pub trait OrderNode {
    fn order_key(&self) -> PackageKey;

    /// Packages this node requires to be installed first
    fn order_dependencies(&self) -> Vec<PackageKey>;
}

impl OrderNode for PackageDescriptor {
    fn order_key(&self) -> PackageKey {
        self.key()
    }

    fn order_dependencies(&self) -> Vec<PackageKey> {
        let channel = &self.id().channel;
        self.dependencies()
            .required_packages()
            .map(|dep| dep.target_key(channel))
            .collect()
    }
}

/// Ordering graph over one batch of packages
#[derive(Debug, Default)]
pub struct OrderGraph {
    /// Nodes in insertion order
    nodes: Vec<PackageKey>,
    index: HashMap<PackageKey, usize>,
    /// Outgoing edges (dependent -> dependencies), in declaration order
    edges: Vec<Vec<usize>>,
}

impl OrderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph over `items` using their declared required dependencies
    pub fn from_nodes<T: OrderNode>(items: &[T]) -> Self {
        let mut graph = Self::new();
        for item in items {
            graph.add_node(item.order_key());
        }
        for item in items {
            let from = item.order_key();
            for to in item.order_dependencies() {
                if graph.contains(&to) {
                    graph.add_edge(&from, &to);
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, key: PackageKey) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.nodes.len();
        self.index.insert(key.clone(), i);
        self.nodes.push(key);
        self.edges.push(Vec::new());
        i
    }

    pub fn contains(&self, key: &PackageKey) -> bool {
        self.index.contains_key(key)
    }

    /// Add `from -> to`; self edges and duplicates are ignored
    pub fn add_edge(&mut self, from: &PackageKey, to: &PackageKey) {
        let (Some(&f), Some(&t)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };
        if f != t && !self.edges[f].contains(&t) {
            self.edges[f].push(t);
        }
    }

    pub fn has_edge(&self, from: &PackageKey, to: &PackageKey) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&f), Some(&t)) => self.edges[f].contains(&t),
            _ => false,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    /// Remove edges until the graph is acyclic; returns the removed edges
    ///
    /// Edges are examined in node then declaration order, and the first edge
    /// whose target can reach back to its source is removed.
    pub fn break_cycles(&mut self) -> Vec<(PackageKey, PackageKey)> {
        let mut removed = Vec::new();
        while let Some((from, pos)) = self.first_cycle_edge() {
            let to = self.edges[from].remove(pos);
            warn!(
                "Dependency cycle: ignoring {} -> {} for ordering",
                self.nodes[from], self.nodes[to]
            );
            removed.push((self.nodes[from].clone(), self.nodes[to].clone()));
        }
        removed
    }

    fn first_cycle_edge(&self) -> Option<(usize, usize)> {
        for from in 0..self.nodes.len() {
            for (pos, &to) in self.edges[from].iter().enumerate() {
                let mut visited = HashSet::new();
                if self.reaches(to, from, &mut visited) {
                    return Some((from, pos));
                }
            }
        }
        None
    }

    fn reaches(&self, from: usize, target: usize, visited: &mut HashSet<usize>) -> bool {
        if from == target {
            return true;
        }
        if !visited.insert(from) {
            return false;
        }
        self.edges[from]
            .iter()
            .any(|&next| self.reaches(next, target, visited))
    }

    /// Stable Kahn sort with dependencies first
    ///
    /// Among ready nodes the one inserted earliest goes first. Call
    /// [`break_cycles`](Self::break_cycles) beforehand; nodes left on a cycle
    /// are appended in insertion order.
    pub fn dependencies_first(&self) -> Vec<PackageKey> {
        let n = self.nodes.len();
        let mut pending: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (from, targets) in self.edges.iter().enumerate() {
            for &to in targets {
                dependents[to].push(from);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while let Some(i) = ready.pop_first() {
            emitted[i] = true;
            order.push(i);
            for &d in &dependents[i] {
                pending[d] -= 1;
                if pending[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        order.extend((0..n).filter(|&i| !emitted[i]));
        order.into_iter().map(|i| self.nodes[i].clone()).collect()
    }

    /// Stable Kahn sort with dependents first
    pub fn dependents_first(&self) -> Vec<PackageKey> {
        let mut reversed = OrderGraph::new();
        for key in &self.nodes {
            reversed.add_node(key.clone());
        }
        for (from, targets) in self.edges.iter().enumerate() {
            for &to in targets {
                reversed.add_edge(&self.nodes[to], &self.nodes[from]);
            }
        }
        reversed.dependencies_first()
    }
}

/// Order a batch so every package follows its required dependencies
pub fn sort_for_install<T: OrderNode>(items: Vec<T>) -> Vec<T> {
    let mut graph = OrderGraph::from_nodes(&items);
    graph.break_cycles();
    let order = graph.dependencies_first();
    debug!("Install order: {:?}", order);
    arrange(items, &order)
}

/// Order packages for removal so dependents go before what they depend on
///
/// Uses the reverse-dependency database, so indirect dependencies through
/// packages outside the batch are honoured.
pub fn sort_for_uninstall(keys: Vec<PackageKey>, db: &DependencyDb) -> Result<Vec<PackageKey>> {
    let mut graph = OrderGraph::new();
    for key in &keys {
        graph.add_node(key.clone());
    }
    for a in &keys {
        for b in &keys {
            if a != b && db.depends_on(a, b)? {
                graph.add_edge(a, b);
            }
        }
    }
    graph.break_cycles();
    let order = graph.dependents_first();
    debug!("Uninstall order: {:?}", order);
    Ok(order)
}

fn arrange<T: OrderNode>(items: Vec<T>, order: &[PackageKey]) -> Vec<T> {
    let position: HashMap<&PackageKey, usize> =
        order.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let mut keyed: Vec<(usize, T)> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let pos = position.get(&item.order_key()).copied().unwrap_or(order.len() + i);
            (pos, item)
        })
        .collect();
    keyed.sort_by_key(|(pos, _)| *pos);
    keyed.into_iter().map(|(_, item)| item).collect()
}
