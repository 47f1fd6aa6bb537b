//! Service dependency graph: topology, cycle detection, and name resolution.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{GraphError, GraphResult};
use crate::topology::ServiceDescriptor;

/// A single node in the dependency graph.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub health: f64,
    pub is_failed: bool,
    pub failed_at_tick: i64,
    pub recovery_timer: i64,
    /// Baseline health snapshotted at the start of the current tick.
    pub initial_health: f64,
}

impl Service {
    fn new(name: String, health: f64) -> Self {
        let health = health.clamp(0.0, 1.0);
        Self {
            name,
            health,
            is_failed: false,
            failed_at_tick: -1,
            recovery_timer: -1,
            initial_health: health,
        }
    }
}

/// Immutable dependency topology plus mutable per-node runtime state.
///
/// Node insertion order is preserved in `order`, which backs deterministic
/// iteration and the "dictionary-insertion" fallback order used when no
/// topological linearisation exists.
#[derive(Debug)]
pub struct ServiceGraph {
    services: HashMap<String, Service>,
    order: Vec<String>,
    deps: HashMap<String, HashSet<String>>,
    rdeps: HashMap<String, HashSet<String>>,
    case_fold_index: HashMap<String, String>,
    topo_order: Option<Vec<String>>,
    cycles: Vec<Vec<String>>,
}

impl ServiceGraph {
    /// Build a graph from topology descriptors.
    ///
    /// Duplicate names are a construction error. Health values outside
    /// `[0, 1]` are clamped silently. Dependencies referencing unknown
    /// names are preserved but ignored by every algorithm.
    pub fn build(descriptors: Vec<ServiceDescriptor>) -> GraphResult<Self> {
        let mut services = HashMap::with_capacity(descriptors.len());
        let mut order = Vec::with_capacity(descriptors.len());
        let mut deps = HashMap::with_capacity(descriptors.len());
        let mut case_fold_index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if services.contains_key(&descriptor.name) {
                return Err(GraphError::DuplicateService(descriptor.name));
            }
            case_fold_index.insert(descriptor.name.to_lowercase(), descriptor.name.clone());
            order.push(descriptor.name.clone());
            deps.insert(
                descriptor.name.clone(),
                descriptor.depends_on.into_iter().collect(),
            );
            services.insert(
                descriptor.name.clone(),
                Service::new(descriptor.name, descriptor.health),
            );
        }

        let rdeps = build_reverse_adjacency(&services, &deps);
        let (topo_order, cycles) = analyze_topology(&order, &services, &deps, &rdeps);

        Ok(Self {
            services,
            order,
            deps,
            rdeps,
            case_fold_index,
            topo_order,
            cycles,
        })
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Node names in insertion order.
    pub fn node_order(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Dependencies of `name` that exist in the graph (dangling names omitted
    /// at call sites via [`ServiceGraph::get`] lookups, not here — the raw
    /// set may still contain dangling names per the construction contract).
    pub fn deps(&self, name: &str) -> impl Iterator<Item = &str> {
        self.deps
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Names of services that directly depend on `name`.
    pub fn rdeps(&self, name: &str) -> impl Iterator<Item = &str> {
        self.rdeps
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// A valid topological linearisation, if the graph is acyclic.
    pub fn topo_order(&self) -> Option<&[String]> {
        self.topo_order.as_deref()
    }

    /// Simple cycles discovered at construction time, deduplicated by
    /// sorted-set identity. Empty iff `topo_order` is `Some`.
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Resolve a user-supplied token to a canonical service name.
    ///
    /// Strips trailing punctuation in `? . ! , ; :`, trims whitespace,
    /// tries an exact match, then falls back to a case-folded lookup.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        let cleaned = token.trim().trim_end_matches(['?', '.', '!', ',', ';', ':']).trim();
        if let Some(service) = self.services.get(cleaned) {
            return Some(service.name.as_str());
        }
        self.case_fold_index
            .get(&cleaned.to_lowercase())
            .map(String::as_str)
    }

    /// All nodes currently below `threshold`.
    pub fn failed_set(&self, threshold: f64) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| {
                self.services
                    .get(name.as_str())
                    .is_some_and(|s| s.health < threshold)
            })
            .map(String::as_str)
            .collect()
    }

    /// Breadth-first walk over reverse adjacency from `start`, excluding
    /// `start` itself.
    pub fn blast_radius(&self, start: &str) -> HashSet<String> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.to_string());
        let mut impacted = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start.to_string());

        while let Some(current) = queue.pop_front() {
            for dependent in self.rdeps(&current) {
                if visited.insert(dependent.to_string()) {
                    impacted.insert(dependent.to_string());
                    queue.push_back(dependent.to_string());
                }
            }
        }
        impacted
    }
}

fn build_reverse_adjacency(
    services: &HashMap<String, Service>,
    deps: &HashMap<String, HashSet<String>>,
) -> HashMap<String, HashSet<String>> {
    let mut rdeps: HashMap<String, HashSet<String>> = HashMap::new();
    for (name, dependencies) in deps {
        for dep in dependencies {
            if services.contains_key(dep) {
                rdeps.entry(dep.clone()).or_default().insert(name.clone());
            }
        }
    }
    rdeps
}

/// Kahn's algorithm for a topological order; falls back to cycle discovery
/// when the graph is not a DAG.
fn analyze_topology(
    order: &[String],
    services: &HashMap<String, Service>,
    deps: &HashMap<String, HashSet<String>>,
    rdeps: &HashMap<String, HashSet<String>>,
) -> (Option<Vec<String>>, Vec<Vec<String>>) {
    let mut in_degree: HashMap<&str, usize> = order.iter().map(|n| (n.as_str(), 0)).collect();
    for (name, dependencies) in deps {
        let valid = dependencies.iter().filter(|d| services.contains_key(*d)).count();
        in_degree.insert(name.as_str(), valid);
    }

    let mut queue: VecDeque<&str> = order
        .iter()
        .filter(|n| in_degree.get(n.as_str()).copied().unwrap_or(0) == 0)
        .map(String::as_str)
        .collect();

    let mut sorted = Vec::with_capacity(order.len());
    while let Some(name) = queue.pop_front() {
        sorted.push(name.to_string());
        if let Some(dependents) = rdeps.get(name) {
            let mut dependents: Vec<&str> = dependents.iter().map(String::as_str).collect();
            dependents.sort_unstable();
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if sorted.len() == order.len() {
        (Some(sorted), Vec::new())
    } else {
        (None, find_cycles(order, deps, services))
    }
}

/// DFS with a recursion stack; whenever a neighbor is found on the stack,
/// the stack slice from its first occurrence to the end is recorded as a
/// cycle, canonicalised by sorted-set identity to deduplicate.
fn find_cycles(
    order: &[String],
    deps: &HashMap<String, HashSet<String>>,
    services: &HashMap<String, Service>,
) -> Vec<Vec<String>> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cycles: Vec<Vec<String>> = Vec::new();
    let mut seen_signatures: HashSet<Vec<String>> = HashSet::new();

    for start in order {
        if visited.contains(start.as_str()) {
            continue;
        }
        let mut stack: Vec<&str> = Vec::new();
        visit(start, deps, services, &mut visited, &mut stack, &mut cycles, &mut seen_signatures);
    }
    cycles
}

fn visit<'a>(
    node: &'a str,
    deps: &'a HashMap<String, HashSet<String>>,
    services: &HashMap<String, Service>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
    seen_signatures: &mut HashSet<Vec<String>>,
) {
    visited.insert(node);
    stack.push(node);

    let mut neighbors: Vec<&str> = deps
        .get(node)
        .into_iter()
        .flat_map(|set| set.iter().map(String::as_str))
        .filter(|n| services.contains_key(*n))
        .collect();
    neighbors.sort_unstable();

    for neighbor in neighbors {
        if let Some(pos) = stack.iter().position(|n| *n == neighbor) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(neighbor.to_string());
            let mut signature = cycle.clone();
            signature.sort_unstable();
            if seen_signatures.insert(signature) {
                cycles.push(cycle);
            }
        } else if !visited.contains(neighbor) {
            visit(neighbor, deps, services, visited, stack, cycles, seen_signatures);
        }
    }

    stack.pop();
}
