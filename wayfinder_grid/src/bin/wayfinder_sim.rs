// Headless scenario runner for the navigation core.
//
// Builds a named `GridWorld` scenario, drives one agent toward the
// scenario's goal with `Harness`, and prints what happened. Logging goes
// through `tracing`; set `RUST_LOG` (e.g. `RUST_LOG=wayfinder_nav=debug`) to
// see plan admissions, recovery tiers and failures.
//
// Usage:
//   wayfinder-sim [OPTIONS]
//     --scenario <NAME>   corridor | door | pit | sealed | buried (default: corridor)
//     --config <PATH>     JSON file with NavConfig overrides
//     --ticks <N>         Tick budget (default: the scenario's own)
//     --list              Print scenario names and exit

use std::process::exit;

use tracing_subscriber::EnvFilter;
use wayfinder_grid::Harness;
use wayfinder_grid::scenario::{self, AGENT};
use wayfinder_nav::{AgentBody, NavConfig};

struct Args {
    scenario: String,
    config: Option<String>,
    ticks: Option<u32>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args();
    let Some(scenario) = scenario::build(&args.scenario) else {
        eprintln!(
            "Unknown scenario {:?}; expected one of {}",
            args.scenario,
            scenario::NAMES.join(", ")
        );
        exit(1);
    };
    let config = match args.config.as_deref().map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            exit(1);
        }
    };

    let goal = scenario.goal;
    let max_ticks = args.ticks.unwrap_or(scenario.max_ticks);
    let mut harness = match Harness::new(scenario.world, config) {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("Invalid navigation config: {e}");
            exit(1);
        }
    };

    tracing::info!(scenario = scenario.name, %goal, max_ticks, "running");
    let report = harness.walk_to(AGENT, goal, max_ticks);
    let stats = harness.navigator().stats();
    let end = harness.world.position(AGENT);

    println!("scenario:    {}", scenario.name);
    println!("arrived:     {} after {} ticks", report.arrived, report.ticks);
    match end {
        Some(at) => println!("final:       {at}"),
        None => println!("final:       (agent gone)"),
    }
    println!("distress:    {}", report.distress);
    println!(
        "world edits: {} broken, {} placed",
        harness.world.broken.len(),
        harness.world.placed.len()
    );
    println!(
        "plans:       {} requested, {} skipped, {} searched, {} installed, {} stale, {} failed",
        stats.requests, stats.skipped, stats.searches, stats.installed, stats.stale, stats.failed
    );
    println!(
        "recoveries:  {} started, {} succeeded",
        stats.recoveries_started, stats.recoveries_succeeded
    );
    if !report.arrived {
        exit(2);
    }
}

fn load_config(path: &str) -> Result<NavConfig, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
    NavConfig::from_json(&text).map_err(|e| format!("{path}: {e}"))
}

/// Parse command-line arguments with plain `std::env::args()` matching.
fn parse_args() -> Args {
    let mut parsed = Args {
        scenario: "corridor".to_string(),
        config: None,
        ticks: None,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                i += 1;
                parsed.scenario = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--scenario requires a name");
                    exit(1);
                });
            }
            "--config" => {
                i += 1;
                parsed.config = args.get(i).cloned().or_else(|| {
                    eprintln!("--config requires a path");
                    exit(1);
                });
            }
            "--ticks" => {
                i += 1;
                parsed.ticks = args.get(i).and_then(|s| s.parse().ok()).or_else(|| {
                    eprintln!("--ticks requires a number");
                    exit(1);
                });
            }
            "--list" => {
                for name in scenario::NAMES {
                    println!("{name}");
                }
                exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                exit(1);
            }
        }
        i += 1;
    }

    parsed
}
