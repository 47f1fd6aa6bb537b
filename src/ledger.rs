//! Append-only record of glitches, failures, incidents, and health history.

use std::collections::HashSet;

/// A glitch or failure transition, in insertion order.
#[derive(Debug, Clone)]
pub enum Event {
    Glitch {
        tick: u32,
        service: String,
        old_health: f64,
        new_health: f64,
    },
    Failure {
        tick: u32,
        service: String,
        health: f64,
    },
}

impl Event {
    pub fn tick(&self) -> u32 {
        match self {
            Event::Glitch { tick, .. } => *tick,
            Event::Failure { tick, .. } => *tick,
        }
    }
}

/// One RCA result, written once per tick in which new failures occurred.
#[derive(Debug, Clone)]
pub struct Incident {
    pub tick: u32,
    pub roots: Vec<String>,
    pub impacted: Vec<(String, HashSet<String>)>,
    pub priority: String,
}

/// One node's health sample, taken at tick start before mutation.
#[derive(Debug, Clone, Copy)]
pub struct DegradationSample {
    pub tick: u32,
    pub health: f64,
    pub is_failed: bool,
}

/// Append-only event, incident, and per-node history store for a run.
#[derive(Debug, Default)]
pub struct EventLedger {
    events: Vec<Event>,
    incidents: Vec<Incident>,
    history: std::collections::HashMap<String, Vec<DegradationSample>>,
}

impl EventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_glitch(&mut self, tick: u32, service: &str, old_health: f64, new_health: f64) {
        self.events.push(Event::Glitch {
            tick,
            service: service.to_string(),
            old_health,
            new_health,
        });
    }

    pub fn record_failure(&mut self, tick: u32, service: &str, health: f64) {
        self.events.push(Event::Failure {
            tick,
            service: service.to_string(),
            health,
        });
    }

    pub fn record_incident(&mut self, incident: Incident) {
        self.incidents.push(incident);
    }

    pub fn record_sample(&mut self, service: &str, sample: DegradationSample) {
        self.history.entry(service.to_string()).or_default().push(sample);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn history(&self, service: &str) -> &[DegradationSample] {
        self.history.get(service).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tracked_services(&self) -> impl Iterator<Item = &str> {
        self.history.keys().map(String::as_str)
    }

    /// Most recent glitch event recorded for `service`, if any.
    pub fn last_glitch_for(&self, service: &str) -> Option<(u32, f64, f64)> {
        self.events.iter().rev().find_map(|event| match event {
            Event::Glitch {
                tick,
                service: s,
                old_health,
                new_health,
            } if s == service => Some((*tick, *old_health, *new_health)),
            _ => None,
        })
    }
}
