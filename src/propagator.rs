//! Per-tick fixed-point degradation propagation from dependencies to dependents.

use crate::graph::ServiceGraph;

const CONVERGENCE_EPSILON: f64 = 1e-3;

/// Computes a fixed point of
///
/// `health(s) = max(0, initial_health(s) - sum(alpha * (threshold - health(d))
/// for d in deps(s) if health(d) < threshold))`
///
/// `initial_health` is the tick's baseline snapshot and never updated across
/// sweeps; `health(d)` on the right-hand side is the iteratively refined
/// current value. Nodes with no dependencies are untouched.
pub struct HealthPropagator;

impl HealthPropagator {
    pub fn new() -> Self {
        Self
    }

    /// Sweeps all nodes, repeating until no node's health moves by more than
    /// `1e-3` in a sweep, or `|nodes|` sweeps have run (whichever comes
    /// first). The cap guarantees termination even across cycles, where the
    /// result is an approximation.
    pub fn propagate(&self, graph: &mut ServiceGraph, threshold: f64, alpha: f64) {
        let order: Vec<String> = graph.node_order().to_vec();
        if order.is_empty() {
            return;
        }

        for _ in 0..order.len() {
            let mut changed = false;

            for name in &order {
                let dep_names: Vec<String> = graph.deps(name).map(str::to_string).collect();
                if dep_names.is_empty() {
                    continue;
                }

                let mut degradation = 0.0;
                for dep in &dep_names {
                    if let Some(dep_service) = graph.get(dep) {
                        if dep_service.health < threshold {
                            degradation += alpha * (threshold - dep_service.health);
                        }
                    }
                }

                if degradation <= 0.0 {
                    continue;
                }

                let service = graph.get_mut(name).expect("name came from node_order");
                let new_health = (service.initial_health - degradation).max(0.0);
                if (new_health - service.health).abs() > CONVERGENCE_EPSILON {
                    service.health = new_health;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }
}

impl Default for HealthPropagator {
    fn default() -> Self {
        Self::new()
    }
}
