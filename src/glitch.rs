//! Deterministic pseudo-random perturbation of one eligible node per tick.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::graph::ServiceGraph;

/// A single glitch draw, returned for logging and ledger append.
pub struct GlitchOutcome {
    pub service: String,
    pub old_health: f64,
    pub new_health: f64,
}

/// Injects exactly one random degradation per tick into an eligible node.
///
/// All randomness is drawn from a single injected [`ChaCha8Rng`] in a fixed
/// order (victim selection, then delta), so that two runs with identical
/// inputs and seed produce identical glitch sequences.
pub struct GlitchSource;

impl GlitchSource {
    pub fn new() -> Self {
        Self
    }

    /// Select uniformly at random a node whose health is `>= threshold`,
    /// then degrade it by a delta drawn uniformly from `[0.2, 0.5]`, clamped
    /// at zero. Returns `None` if no node is eligible.
    pub fn apply(
        &self,
        graph: &mut ServiceGraph,
        threshold: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<GlitchOutcome> {
        let eligible: Vec<String> = graph
            .node_order()
            .iter()
            .filter(|name| graph.get(name).is_some_and(|s| s.health >= threshold))
            .cloned()
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let index = rng.gen_range(0..eligible.len());
        let victim = &eligible[index];
        let delta = rng.gen_range(0.2..=0.5);

        let service = graph.get_mut(victim).expect("victim selected from graph");
        let old_health = service.health;
        let new_health = (old_health - delta).max(0.0);
        service.health = new_health;

        Some(GlitchOutcome {
            service: victim.clone(),
            old_health,
            new_health,
        })
    }
}

impl Default for GlitchSource {
    fn default() -> Self {
        Self::new()
    }
}
