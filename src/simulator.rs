//! Orchestrates the per-tick pipeline: snapshot, glitch, recovery,
//! propagation, classification, and RCA.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::SimulationConfig;
use crate::glitch::GlitchSource;
use crate::graph::ServiceGraph;
use crate::ledger::{DegradationSample, EventLedger, Incident};
use crate::log::RunLog;
use crate::propagator::HealthPropagator;
use crate::rca::RcaEngine;
use crate::recovery::RecoveryScheduler;

/// Owns the tick counter, RNG, and ledger; drives one run to completion.
pub struct Simulator {
    graph: ServiceGraph,
    config: SimulationConfig,
    rng: ChaCha8Rng,
    tick: u32,
    ledger: EventLedger,
    glitch_source: GlitchSource,
    propagator: HealthPropagator,
    rca_engine: RcaEngine,
    recovery_scheduler: Option<RecoveryScheduler>,
}

impl Simulator {
    pub fn new(graph: ServiceGraph, config: SimulationConfig) -> Self {
        let recovery_scheduler = match (config.cooldown, config.heal_to) {
            (Some(cooldown), Some(heal_to)) => Some(RecoveryScheduler::new(cooldown, heal_to)),
            _ => None,
        };

        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            graph,
            config,
            tick: 0,
            ledger: EventLedger::new(),
            glitch_source: GlitchSource::new(),
            propagator: HealthPropagator::new(),
            rca_engine: RcaEngine::new(),
            recovery_scheduler,
        }
    }

    pub fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Run the configured number of ticks, writing a line-oriented trace to
    /// `log`. Logs a boot banner, one cycle warning per detected cycle, a
    /// per-tick header, and an end banner.
    pub fn run(&mut self, log: &mut RunLog) {
        let start = chrono::Utc::now().to_rfc3339();
        log.line("# Cascading Failure Simulation Log");
        log.line(&format!(
            "# Run: {} ticks, threshold={}, seed={}",
            self.config.ticks, self.config.threshold, self.config.seed
        ));
        log.line(&format!("# Start: {start}"));

        if self.graph.topo_order().is_none() {
            for cycle in self.graph.cycles().to_vec() {
                log.line(&format!(
                    "[WARN] Cycle detected: {} (RCA may be approximate)",
                    cycle.join(" -> ")
                ));
            }
        }

        log.line(&format!("[BOOT] Loaded {} services.", self.graph.len()));

        for tick in 1..=self.config.ticks {
            self.tick = tick;
            log.line(&format!("[TICK {tick}]"));
            self.run_tick(log);
        }

        let end = chrono::Utc::now().to_rfc3339();
        log.line(&format!("# End: {end}"));
    }

    fn run_tick(&mut self, log: &mut RunLog) {
        self.snapshot();

        if let Some(outcome) = self
            .glitch_source
            .apply(&mut self.graph, self.config.threshold, &mut self.rng)
        {
            log.line(&format!(
                "[GLITCH] {} health {:.2} -> {:.2} (random glitch)",
                outcome.service, outcome.old_health, outcome.new_health
            ));
            self.ledger.record_glitch(
                self.tick,
                &outcome.service,
                outcome.old_health,
                outcome.new_health,
            );
        }

        if let Some(scheduler) = &self.recovery_scheduler {
            let outcome = scheduler.run(&mut self.graph, self.config.threshold);
            for healed in &outcome.healed {
                let health = self.graph.get(healed).map(|s| s.health).unwrap_or(0.0);
                log.line(&format!("[HEAL] {healed} -> health {health:.2} at T={}", self.tick));
            }
            for (healed, steps) in &outcome.ripples {
                if steps.is_empty() {
                    continue;
                }
                log.line(&format!("[RECOVERY] Upstream recovery after {healed} heal:"));
                for step in steps {
                    log.line(&format!(
                        "           - {} {:.2} -> {:.2}",
                        step.service, step.old_health, step.new_health
                    ));
                }
            }
        }

        self.propagator
            .propagate(&mut self.graph, self.config.threshold, self.config.alpha);

        let failed: Vec<String> = self
            .graph
            .failed_set(self.config.threshold)
            .into_iter()
            .map(str::to_string)
            .collect();

        if failed.is_empty() {
            let min_name = self
                .graph
                .node_order()
                .iter()
                .min_by(|a, b| {
                    let ha = self.graph.get(a).unwrap().health;
                    let hb = self.graph.get(b).unwrap().health;
                    ha.partial_cmp(&hb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned();
            if let Some(name) = min_name {
                let health = self.graph.get(&name).unwrap().health;
                log.line(&format!(
                    "[INFO] All services healthy (min health={health:.2} on {name})"
                ));
            }
            return;
        }

        let newly_failed: Vec<String> = failed
            .iter()
            .filter(|name| !self.graph.get(name).unwrap().is_failed)
            .cloned()
            .collect();

        for name in &newly_failed {
            let cooldown_timer = self
                .recovery_scheduler
                .as_ref()
                .map(|s| s.cooldown() as i64)
                .unwrap_or(-1);

            let service = self.graph.get_mut(name).unwrap();
            service.is_failed = true;
            service.failed_at_tick = self.tick as i64;
            service.recovery_timer = cooldown_timer;
            let health = service.health;

            log.line(&format!(
                "[ALERT] {name} fell below threshold ({health:.2} < {})",
                self.config.threshold
            ));
            self.ledger.record_failure(self.tick, name, health);
        }

        if !newly_failed.is_empty() {
            self.run_rca(log, &failed);
        }
    }

    fn snapshot(&mut self) {
        let names: Vec<String> = self.graph.node_order().to_vec();
        for name in names {
            let (health, is_failed) = {
                let service = self.graph.get_mut(&name).unwrap();
                service.initial_health = service.health;
                (service.health, service.is_failed)
            };
            self.ledger.record_sample(
                &name,
                DegradationSample {
                    tick: self.tick,
                    health,
                    is_failed,
                },
            );
        }
    }

    fn run_rca(&mut self, log: &mut RunLog, failed: &[String]) {
        let failed_refs: Vec<&str> = failed.iter().map(String::as_str).collect();
        let report = self.rca_engine.analyze(&self.graph, &failed_refs);

        if report.fallback_used {
            log.line("[INFO] No clear root cause; prioritizing lowest health service.");
        }

        for root in &report.roots {
            if !root.blast_radius.is_empty() {
                let mut impacted: Vec<&String> = root.blast_radius.iter().collect();
                impacted.sort();
                log.line(&format!(
                    "[BLAST] due to {} -> impacted: {:?}",
                    root.name, impacted
                ));
            }
        }

        log.line(&format!(
            "[PRIORITY] roots={{{}}}, order={:?}",
            report.discovery_order.join(", "),
            report.priority_order
        ));

        if let Some(top) = report.top_priority() {
            log.line(&format!("[SUGGESTION] Remediate {top} first"));

            self.ledger.record_incident(Incident {
                tick: self.tick,
                roots: report.discovery_order.clone(),
                impacted: report
                    .roots
                    .iter()
                    .map(|r| (r.name.clone(), r.blast_radius.clone()))
                    .collect(),
                priority: top.to_string(),
            });
        }
    }
}
