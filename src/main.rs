use std::io::{self, Write as _};
use std::path::PathBuf;

use anyhow::Context;
use cascade_sim::config::SimulationConfig;
use cascade_sim::log::RunLog;
use cascade_sim::query::{self, Query, QueryEngine};
use cascade_sim::simulator::Simulator;
use cascade_sim::{topology, QueryError};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "cascade-sim", about = "Cascading failure simulation engine")]
struct Cli {
    /// Service topology file (JSON).
    #[arg(long, default_value = "services.json")]
    input: PathBuf,

    /// Simulation configuration file (YAML).
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run one query after the simulation and print the result.
    #[arg(long)]
    query: Option<String>,

    /// Enter interactive query mode after the simulation.
    #[arg(short, long)]
    interactive: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match SimulationConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load configuration: {err}");
            eprintln!("error: failed to load configuration from {}: {err}", cli.config.display());
            std::process::exit(1);
        }
    };

    let graph = match topology::load(&cli.input) {
        Ok(graph) => graph,
        Err(err) => {
            error!("failed to load topology: {err}");
            eprintln!("error: failed to load topology from {}: {err}", cli.input.display());
            std::process::exit(1);
        }
    };

    info!(
        "loaded {} services, running {} ticks (threshold={}, seed={})",
        graph.len(),
        config.ticks,
        config.threshold,
        config.seed
    );

    let runs_root = PathBuf::from("runs");
    let mut log = RunLog::create(&runs_root).context("failed to open run log")?;
    info!("writing run log to {}", log.path().display());

    let mut simulator = Simulator::new(graph, config);
    simulator.run(&mut log);

    if let Some(text) = &cli.query {
        run_query(&simulator, text);
    }

    if cli.interactive {
        run_interactive(&simulator)?;
    }

    Ok(())
}

fn run_query(simulator: &Simulator, text: &str) {
    let engine = QueryEngine::new(
        simulator.graph(),
        simulator.ledger(),
        simulator.config().threshold,
        simulator.tick(),
    );
    match query::parse(text).and_then(|q| engine.evaluate(&q)) {
        Ok(answer) => println!("{answer}"),
        Err(QueryError::Unparseable) => println!("{}", QueryError::Unparseable),
        Err(err) => println!("[ERROR] {err}"),
    }
}

fn run_interactive(simulator: &Simulator) -> anyhow::Result<()> {
    let engine = QueryEngine::new(
        simulator.graph(),
        simulator.ledger(),
        simulator.config().threshold,
        simulator.tick(),
    );
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" | "q" => break,
            "help" => {
                println!("Try: 'why is <service> failing?', 'what happened in the last N ticks?', 'top-impacted'");
                continue;
            }
            _ => {}
        }

        let answer: Query = match query::parse(line) {
            Ok(query) => query,
            Err(_) => {
                println!("{}", QueryError::Unparseable);
                continue;
            }
        };

        match engine.evaluate(&answer) {
            Ok(answer) => println!("{answer}"),
            Err(err) => println!("[ERROR] {err}"),
        }
    }

    Ok(())
}
