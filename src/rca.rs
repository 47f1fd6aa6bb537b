//! Reverse root-cause analysis and blast-radius computation.

use std::collections::HashSet;

use crate::graph::ServiceGraph;

/// One root cause and the set of nodes transitively dependent on it.
pub struct RootCause {
    pub name: String,
    pub blast_radius: HashSet<String>,
}

/// Result of an RCA pass over the current failure set.
pub struct RcaReport {
    /// Root causes, sorted by descending blast-radius size (ties preserve
    /// discovery order) — the same order as `priority_order`.
    pub roots: Vec<RootCause>,
    /// Root names in discovery order (as found scanning the failure set),
    /// before prioritization. Distinct from `priority_order` whenever two
    /// or more roots exist and their blast radii differ in size.
    pub discovery_order: Vec<String>,
    /// Root names sorted by descending blast-radius size; ties preserve
    /// discovery order. `priority()[0]` is the remediation recommendation.
    pub priority_order: Vec<String>,
    /// Set when no node in the failure set has all-healthy dependencies,
    /// i.e. failures form a cycle; the engine falls back to the
    /// lowest-health node.
    pub fallback_used: bool,
}

impl RcaReport {
    pub fn top_priority(&self) -> Option<&str> {
        self.priority_order.first().map(String::as_str)
    }
}

/// Identifies root-cause failed nodes and computes blast radii.
pub struct RcaEngine;

impl RcaEngine {
    pub fn new() -> Self {
        Self
    }

    /// `failed` is the full current failure set (not only newly-failed
    /// nodes), so pre-existing failures appear as upstream causes.
    ///
    /// A node is a root iff none of its in-graph dependencies is currently
    /// failed. If the failure set is nonempty but no root exists (a cycle
    /// of failed nodes), the fallback root is the lowest-health node in
    /// the failure set, tie-broken by insertion order.
    pub fn analyze(&self, graph: &ServiceGraph, failed: &[&str]) -> RcaReport {
        let failed_set: HashSet<&str> = failed.iter().copied().collect();

        let mut roots: Vec<&str> = failed
            .iter()
            .copied()
            .filter(|name| {
                graph
                    .deps(name)
                    .filter(|dep| graph.contains(dep))
                    .all(|dep| !failed_set.contains(dep))
            })
            .collect();

        let mut fallback_used = false;
        if roots.is_empty() && !failed.is_empty() {
            fallback_used = true;
            // Insertion order: node_order is insertion order, failed slice
            // was already built in that order, so the first minimum wins.
            let fallback = failed
                .iter()
                .copied()
                .min_by(|a, b| {
                    let ha = graph.get(a).map(|s| s.health).unwrap_or(f64::INFINITY);
                    let hb = graph.get(b).map(|s| s.health).unwrap_or(f64::INFINITY);
                    ha.partial_cmp(&hb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("failed is nonempty");
            roots.push(fallback);
        }

        let discovery_order: Vec<String> = roots.iter().map(|name| name.to_string()).collect();

        let mut root_causes: Vec<RootCause> = roots
            .iter()
            .map(|name| RootCause {
                name: name.to_string(),
                blast_radius: graph.blast_radius(name),
            })
            .collect();

        // Stable sort by descending blast-radius size preserves discovery
        // order among ties.
        root_causes.sort_by(|a, b| b.blast_radius.len().cmp(&a.blast_radius.len()));

        let priority_order = root_causes.iter().map(|r| r.name.clone()).collect();

        RcaReport {
            roots: root_causes,
            discovery_order,
            priority_order,
            fallback_used,
        }
    }
}

impl Default for RcaEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::ServiceDescriptor;

    fn build(descriptors: Vec<(&str, &[&str], f64)>) -> ServiceGraph {
        ServiceGraph::build(
            descriptors
                .into_iter()
                .map(|(name, deps, health)| ServiceDescriptor {
                    name: name.to_string(),
                    depends_on: deps.iter().map(|s| s.to_string()).collect(),
                    health,
                })
                .collect(),
        )
        .unwrap()
    }

    fn fail(graph: &mut ServiceGraph, name: &str) {
        graph.get_mut(name).unwrap().is_failed = true;
    }

    #[test]
    fn independent_failure_has_no_blast_radius() {
        let mut graph = build(vec![("X", &[], 0.4)]);
        fail(&mut graph, "X");
        let report = RcaEngine::new().analyze(&graph, &["X"]);
        assert_eq!(report.roots.len(), 1);
        assert_eq!(report.roots[0].name, "X");
        assert!(report.roots[0].blast_radius.is_empty());
        assert!(!report.fallback_used);
    }

    #[test]
    fn cascade_failure_attributes_root_with_blast_radius() {
        let mut graph = build(vec![("A", &[], 0.3), ("B", &["A"], 0.5)]);
        fail(&mut graph, "A");
        fail(&mut graph, "B");
        let report = RcaEngine::new().analyze(&graph, &["A", "B"]);
        assert_eq!(report.roots.len(), 1);
        assert_eq!(report.roots[0].name, "A");
        assert!(report.roots[0].blast_radius.contains("B"));
        assert_eq!(report.top_priority(), Some("A"));
    }

    #[test]
    fn cycle_of_failures_falls_back_to_lowest_health() {
        let mut graph = build(vec![("A", &["B"], 0.5), ("B", &["A"], 0.2)]);
        fail(&mut graph, "A");
        fail(&mut graph, "B");
        let report = RcaEngine::new().analyze(&graph, &["A", "B"]);
        assert!(report.fallback_used);
        assert_eq!(report.roots.len(), 1);
        assert_eq!(report.roots[0].name, "B");
    }

    #[test]
    fn priority_sorts_by_descending_blast_radius() {
        let mut graph = build(vec![
            ("A", &[], 0.3),
            ("B", &["A"], 0.9),
            ("X", &[], 0.3),
        ]);
        fail(&mut graph, "A");
        fail(&mut graph, "X");
        let report = RcaEngine::new().analyze(&graph, &["A", "X"]);
        assert_eq!(report.priority_order, vec!["A".to_string(), "X".to_string()]);
    }

    #[test]
    fn discovery_order_is_independent_of_priority_order() {
        let mut graph = build(vec![
            ("A", &[], 0.3),
            ("B", &["A"], 0.9),
            ("X", &[], 0.3),
        ]);
        fail(&mut graph, "A");
        fail(&mut graph, "X");
        // Scan order is X, A; A's larger blast radius still wins priority.
        let report = RcaEngine::new().analyze(&graph, &["X", "A"]);
        assert_eq!(report.discovery_order, vec!["X".to_string(), "A".to_string()]);
        assert_eq!(report.priority_order, vec!["A".to_string(), "X".to_string()]);
    }
}
