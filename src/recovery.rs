//! Cooldown-based recovery and upstream ripple recovery.

use std::collections::{HashSet, VecDeque};

use crate::graph::ServiceGraph;

/// One recovered dependent, reported for logging.
pub struct RippleStep {
    pub service: String,
    pub old_health: f64,
    pub new_health: f64,
}

/// Result of running the scheduler for one tick.
pub struct RecoveryOutcome {
    /// Nodes healed this tick, in the order they were healed.
    pub healed: Vec<String>,
    /// Upstream ripple recovery steps triggered by each heal, keyed by the
    /// healed node that triggered them.
    pub ripples: Vec<(String, Vec<RippleStep>)>,
}

/// Decrements cooldown timers and heals nodes that reach zero, then ripples
/// partial recovery to dependents whose own dependencies are all healthy.
///
/// Inactive (no `cooldown` configured) unless constructed with one.
pub struct RecoveryScheduler {
    cooldown: u32,
    heal_to: f64,
}

impl RecoveryScheduler {
    pub fn new(cooldown: u32, heal_to: f64) -> Self {
        Self { cooldown, heal_to }
    }

    pub fn cooldown(&self) -> u32 {
        self.cooldown
    }

    /// Decrement active timers, heal nodes reaching zero, and ripple
    /// recovery upstream. Must run before [`crate::propagator::HealthPropagator`]
    /// within a tick so healed nodes serve as healthy dependencies already.
    pub fn run(&self, graph: &mut ServiceGraph, threshold: f64) -> RecoveryOutcome {
        let names: Vec<String> = graph.node_order().to_vec();
        let mut to_heal = Vec::new();

        for name in &names {
            let service = graph.get_mut(name).expect("name from node_order");
            if service.is_failed && service.recovery_timer > 0 {
                service.recovery_timer -= 1;
            }
            if service.recovery_timer == 0 {
                to_heal.push(name.clone());
            }
        }

        let mut healed = Vec::new();
        let mut ripples = Vec::new();

        for name in to_heal {
            let service = graph.get_mut(&name).expect("name from node_order");
            service.health = self.heal_to;
            service.is_failed = false;
            service.recovery_timer = -1;
            healed.push(name.clone());

            let ripple = self.propagate_recovery(graph, &name, threshold);
            if !ripple.is_empty() {
                ripples.push((name, ripple));
            }
        }

        RecoveryOutcome { healed, ripples }
    }

    /// Breadth-first walk over reverse adjacency from `healed`. Each
    /// dependent is visited at most once: if every one of its dependencies
    /// is currently at or above `threshold` and its own health is below
    /// `heal_to`, it gains `0.5 * (heal_to - health)` (clamped to 1.0); if
    /// that reaches `threshold`, its failure state clears. Traversal
    /// continues through the dependent regardless of whether it was bumped.
    fn propagate_recovery(
        &self,
        graph: &mut ServiceGraph,
        healed: &str,
        threshold: f64,
    ) -> Vec<RippleStep> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(healed.to_string());
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(healed.to_string());

        let mut steps = Vec::new();

        while let Some(current) = queue.pop_front() {
            let dependents: Vec<String> = graph.rdeps(&current).map(str::to_string).collect();

            for dependent in dependents {
                if !visited.insert(dependent.clone()) {
                    continue;
                }

                let all_deps_healthy = graph
                    .deps(&dependent)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
                    .iter()
                    .all(|dep| graph.get(dep).map_or(true, |s| s.health >= threshold));

                let current_health = graph.get(&dependent).map(|s| s.health).unwrap_or(0.0);

                if all_deps_healthy && current_health < self.heal_to {
                    let improvement = (self.heal_to - current_health) * 0.5;
                    let new_health = (current_health + improvement).min(1.0);

                    let service = graph.get_mut(&dependent).expect("dependent exists");
                    service.health = new_health;
                    if new_health >= threshold {
                        service.is_failed = false;
                        service.recovery_timer = -1;
                    }

                    steps.push(RippleStep {
                        service: dependent.clone(),
                        old_health: current_health,
                        new_health,
                    });
                }

                queue.push_back(dependent);
            }
        }

        steps
    }
}
