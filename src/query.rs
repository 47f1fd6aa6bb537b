//! Post-hoc diagnostic queries over the run's graph and event ledger, plus
//! the natural-language grammar that drives the CLI's `--query`/interactive
//! surface.

use crate::error::QueryError;
use crate::graph::ServiceGraph;
use crate::ledger::{Event, EventLedger};

/// A recognised query, already resolved against the current graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    WhyFailing(String),
    LastNTicks(u32),
    TopImpacted,
}

/// Parse a free-text question into a [`Query`].
///
/// Recognises, case-insensitively and tolerant of surrounding whitespace:
/// - `why is <service> failing?` / `why is <service> down?`
/// - `what happened?` / `what happened in the last <N> ticks?` (N defaults
///   to 10 when omitted)
/// - `top-impacted` / `top impacted`
///
/// Name resolution for `why is ... failing` is deferred to
/// [`ServiceGraph::resolve`] at evaluation time rather than performed here,
/// so the parser never duplicates the graph's case-folding rules.
pub fn parse(text: &str) -> Result<Query, QueryError> {
    let lower = text.trim().to_lowercase();

    if lower.starts_with("why is") || lower.starts_with("why's") {
        let rest = lower
            .trim_start_matches("why is")
            .trim_start_matches("why's")
            .trim();
        let service_part = rest
            .trim_end_matches('?')
            .trim_end()
            .trim_end_matches("failing")
            .trim_end_matches("down")
            .trim();
        if service_part.is_empty() {
            return Err(QueryError::Unparseable);
        }
        // Recover the original-case substring so resolve() can still match
        // exact names as well as case-folded ones.
        let offset = text.to_lowercase().find(service_part).unwrap_or(0);
        let original = &text.trim()[offset..offset + service_part.len()];
        return Ok(Query::WhyFailing(original.to_string()));
    }

    if lower.starts_with("what happened") {
        let n = extract_tick_count(&lower).unwrap_or(10);
        return Ok(Query::LastNTicks(n));
    }

    if lower == "top-impacted" || lower == "top impacted" || lower.starts_with("top-impacted") || lower.starts_with("top impacted") {
        return Ok(Query::TopImpacted);
    }

    Err(QueryError::Unparseable)
}

fn extract_tick_count(lower: &str) -> Option<u32> {
    let idx = lower.find("last")?;
    lower[idx + 4..]
        .split_whitespace()
        .find_map(|token| token.trim_end_matches(|c: char| !c.is_ascii_digit()).parse().ok())
}

/// Evaluates queries against a completed (or in-progress) run.
pub struct QueryEngine<'a> {
    graph: &'a ServiceGraph,
    ledger: &'a EventLedger,
    threshold: f64,
    /// The simulation's current (or final) tick, `T` in SPEC_FULL §4.6 —
    /// the window for `last_n_ticks` is anchored here, not on the most
    /// recent recorded event.
    current_tick: u32,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        graph: &'a ServiceGraph,
        ledger: &'a EventLedger,
        threshold: f64,
        current_tick: u32,
    ) -> Self {
        Self {
            graph,
            ledger,
            threshold,
            current_tick,
        }
    }

    pub fn evaluate(&self, query: &Query) -> Result<String, QueryError> {
        match query {
            Query::WhyFailing(name) => self.why_failing(name),
            Query::LastNTicks(n) => Ok(self.last_n_ticks(*n)),
            Query::TopImpacted => Ok(self.top_impacted()),
        }
    }

    /// Resolve `name`, then classify: healthy if at or above threshold;
    /// else independent failure (no dependency below threshold, glitch
    /// event attached if any) or cascade failure (failed dependencies
    /// listed with health and failure tick). The direct reverse-adjacency
    /// set is always appended as the blast radius.
    fn why_failing(&self, name: &str) -> Result<String, QueryError> {
        let canonical = self
            .graph
            .resolve(name)
            .ok_or_else(|| QueryError::UnknownService(name.to_string()))?;
        let service = self.graph.get(canonical).expect("resolve returned a known name");

        let mut blast_radius: Vec<&str> = self.graph.rdeps(canonical).collect();
        blast_radius.sort_unstable();
        let blast = if blast_radius.is_empty() {
            "none".to_string()
        } else {
            blast_radius.join(", ")
        };

        if service.health >= self.threshold {
            return Ok(format!(
                "{canonical} is healthy (health={:.2}). blast radius: {blast}.",
                service.health
            ));
        }

        let failed_deps: Vec<(&str, f64, i64)> = self
            .graph
            .deps(canonical)
            .filter_map(|dep| self.graph.get(dep).map(|s| (dep, s)))
            .filter(|(_, s)| s.health < self.threshold)
            .map(|(dep, s)| (dep, s.health, s.failed_at_tick))
            .collect();

        if failed_deps.is_empty() {
            let glitch = match self.ledger.last_glitch_for(canonical) {
                Some((tick, old, new)) => {
                    format!(" last glitch at tick {tick} ({old:.2} -> {new:.2}).")
                }
                None => " no glitch on record.".to_string(),
            };
            return Ok(format!(
                "{canonical} is an independent failure (health={:.2}).{glitch} blast radius: {blast}.",
                service.health
            ));
        }

        let deps_report = failed_deps
            .iter()
            .map(|(dep, health, tick)| format!("{dep} (health={health:.2}, failed at tick {tick})"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "{canonical} is a cascade failure (health={:.2}) caused by: {deps_report}. blast radius: {blast}.",
            service.health
        ))
    }

    /// Render ticks `[max(1, T-n+1), T]`, `T` being the current/final tick:
    /// per-tick glitch/failure events and incident root-cause summaries,
    /// followed by a trailing totals block.
    fn last_n_ticks(&self, n: u32) -> String {
        let end_tick = self.current_tick;
        let start_tick = end_tick.saturating_sub(n.saturating_sub(1)).max(1);

        let mut out = format!("[QUERY] Last {n} ticks ({start_tick} to {end_tick})\n");
        let mut total_glitches = 0u32;
        let mut total_failures = 0u32;

        for tick in start_tick..=end_tick {
            let glitches: Vec<&Event> = self
                .ledger
                .events()
                .iter()
                .filter(|e| matches!(e, Event::Glitch { tick: t, .. } if *t == tick))
                .collect();
            let failures: Vec<&Event> = self
                .ledger
                .events()
                .iter()
                .filter(|e| matches!(e, Event::Failure { tick: t, .. } if *t == tick))
                .collect();
            let incidents: Vec<&crate::ledger::Incident> = self
                .ledger
                .incidents()
                .iter()
                .filter(|i| i.tick == tick)
                .collect();

            if glitches.is_empty() && failures.is_empty() && incidents.is_empty() {
                continue;
            }

            out.push_str(&format!("[TICK {tick}]\n"));
            for event in &glitches {
                if let Event::Glitch { service, old_health, new_health, .. } = event {
                    out.push_str(&format!(
                        "  [GLITCH] {service} ({old_health:.2} -> {new_health:.2})\n"
                    ));
                }
            }
            for event in &failures {
                if let Event::Failure { service, health, .. } = event {
                    out.push_str(&format!("  [FAILURE] {service} (health={health:.2})\n"));
                }
            }
            for incident in &incidents {
                out.push_str(&format!("  [ROOT CAUSE] {}\n", incident.roots.join(", ")));
            }

            total_glitches += glitches.len() as u32;
            total_failures += failures.len() as u32;
        }

        out.push_str("[STATISTICS]\n");
        out.push_str(&format!("  Total Glitches: {total_glitches}\n"));
        out.push_str(&format!("  Total Failures: {total_failures}\n"));

        out.trim_end().to_string()
    }

    /// Rank every node by `(failures desc, degradation desc)` and show the
    /// top ten in a fixed-width table. `failures` counts history samples
    /// with `is_failed`; `degradation` is the drop from the first recorded
    /// sample's health to the node's current health; `avg` is the mean
    /// sampled health.
    fn top_impacted(&self) -> String {
        let mut rows: Vec<(&str, u32, f64, f64)> = self
            .graph
            .node_order()
            .iter()
            .filter_map(|name| {
                let samples = self.ledger.history(name);
                if samples.is_empty() {
                    return None;
                }
                let failures = samples.iter().filter(|s| s.is_failed).count() as u32;
                let current_health = self.graph.get(name).map(|s| s.health).unwrap_or(0.0);
                let degradation = samples[0].health - current_health;
                let avg = samples.iter().map(|s| s.health).sum::<f64>() / samples.len() as f64;
                Some((name.as_str(), failures, degradation, avg))
            })
            .collect();

        if rows.is_empty() {
            return "No history recorded.".to_string();
        }

        rows.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut out = format!(
            "{:<20} {:>10} {:>12} {:>8}\n",
            "service", "failures", "degradation", "avg"
        );
        for (name, failures, degradation, avg) in rows.into_iter().take(10) {
            out.push_str(&format!(
                "{name:<20} {failures:>10} {degradation:>12.2} {avg:>8.2}\n"
            ));
        }
        out.trim_end().to_string()
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

    #[test]
    fn parses_why_is_failing_question() {
        assert_eq!(
            parse("Why is Payments failing?").unwrap(),
            Query::WhyFailing("Payments".to_string())
        );
    }

    #[test]
    fn parses_what_happened_with_explicit_tick_count() {
        assert_eq!(
            parse("what happened in the last 5 ticks?").unwrap(),
            Query::LastNTicks(5)
        );
    }

    #[test]
    fn parses_what_happened_with_default_tick_count() {
        assert_eq!(parse("what happened?").unwrap(), Query::LastNTicks(10));
    }

    #[test]
    fn parses_top_impacted_variants() {
        assert_eq!(parse("top-impacted").unwrap(), Query::TopImpacted);
        assert_eq!(parse("top impacted").unwrap(), Query::TopImpacted);
    }

    #[test]
    fn unrecognised_text_is_unparseable() {
        assert_eq!(parse("what is the weather"), Err(QueryError::Unparseable));
    }

    #[test]
    fn why_failing_resolves_case_insensitively_via_graph() {
        let graph = build(vec![("Payments", &[], 1.0)]);
        let ledger = EventLedger::new();
        let engine = QueryEngine::new(&graph, &ledger, 0.7, 1);
        let result = engine.evaluate(&Query::WhyFailing("PAYMENTS".to_string())).unwrap();
        assert!(result.contains("Payments"));
        assert!(result.contains("healthy"));
    }

    #[test]
    fn why_failing_unknown_service_errors() {
        let graph = build(vec![("A", &[], 1.0)]);
        let ledger = EventLedger::new();
        let engine = QueryEngine::new(&graph, &ledger, 0.7, 1);
        assert_eq!(
            engine.evaluate(&Query::WhyFailing("ghost".to_string())),
            Err(QueryError::UnknownService("ghost".to_string()))
        );
    }

    #[test]
    fn why_failing_independent_failure_attaches_glitch_and_blast_radius() {
        let graph = build(vec![("X", &[], 0.3), ("Y", &["X"], 0.9)]);
        let mut ledger = EventLedger::new();
        ledger.record_glitch(1, "X", 0.9, 0.3);
        let engine = QueryEngine::new(&graph, &ledger, 0.7, 1);
        let result = engine.evaluate(&Query::WhyFailing("X".to_string())).unwrap();
        assert!(result.contains("independent failure"));
        assert!(result.contains("0.90 -> 0.30"));
        assert!(result.contains("blast radius: Y"));
    }

    #[test]
    fn why_failing_cascade_lists_failed_dependencies() {
        let graph = build(vec![("A", &[], 0.3), ("B", &["A"], 0.3)]);
        let ledger = EventLedger::new();
        let engine = QueryEngine::new(&graph, &ledger, 0.7, 1);
        let result = engine.evaluate(&Query::WhyFailing("B".to_string())).unwrap();
        assert!(result.contains("cascade failure"));
        assert!(result.contains("A (health=0.30"));
    }

    #[test]
    fn top_impacted_ranks_by_failures_then_degradation() {
        let graph = build(vec![("A", &[], 0.2), ("B", &[], 0.5)]);
        let mut ledger = EventLedger::new();
        for tick in 1..=3 {
            ledger.record_sample(
                "A",
                crate::ledger::DegradationSample {
                    tick,
                    health: 1.0,
                    is_failed: tick > 1,
                },
            );
        }
        ledger.record_sample(
            "B",
            crate::ledger::DegradationSample {
                tick: 1,
                health: 1.0,
                is_failed: false,
            },
        );
        let engine = QueryEngine::new(&graph, &ledger, 0.7, 1);
        let result = engine.evaluate(&Query::TopImpacted).unwrap();
        let lines: Vec<&str> = result.lines().collect();
        assert!(lines[1].starts_with("A "));
    }

    #[test]
    fn last_n_ticks_windows_against_current_tick_not_last_event() {
        let graph = build(vec![("A", &[], 1.0)]);
        let mut ledger = EventLedger::new();
        ledger.record_glitch(5, "A", 1.0, 0.5);
        // current_tick is 20, so "last 2 ticks" is [19, 20], excluding the
        // tick-5 glitch even though it is the most recent recorded event.
        let engine = QueryEngine::new(&graph, &ledger, 0.7, 20);
        let result = engine.evaluate(&Query::LastNTicks(2)).unwrap();
        assert!(result.contains("(19 to 20)"));
        assert!(!result.contains("GLITCH"));
        assert!(result.contains("Total Glitches: 0"));
    }

    #[test]
    fn last_n_ticks_emits_incidents_and_totals() {
        let graph = build(vec![("A", &[], 0.3)]);
        let mut ledger = EventLedger::new();
        ledger.record_glitch(4, "A", 1.0, 0.3);
        ledger.record_failure(4, "A", 0.3);
        ledger.record_incident(crate::ledger::Incident {
            tick: 4,
            roots: vec!["A".to_string()],
            impacted: vec![("A".to_string(), std::collections::HashSet::new())],
            priority: "A".to_string(),
        });
        let engine = QueryEngine::new(&graph, &ledger, 0.7, 4);
        let result = engine.evaluate(&Query::LastNTicks(5)).unwrap();
        assert!(result.contains("[TICK 4]"));
        assert!(result.contains("[GLITCH] A (1.00 -> 0.30)"));
        assert!(result.contains("[FAILURE] A (health=0.30)"));
        assert!(result.contains("[ROOT CAUSE] A"));
        assert!(result.contains("Total Glitches: 1"));
        assert!(result.contains("Total Failures: 1"));
    }
}
