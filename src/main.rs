//! MCC CLI - Run a seeded coevolution experiment from JSON configuration.

use std::fs;
use std::path::PathBuf;

use mcc::{ExperimentConfig, run_experiment, schema::AlgorithmSummary};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json>", args[0]);
        eprintln!();
        eprintln!("Seed agents against random targets, then coevolve both populations.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to experiment configuration file");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });
    let config = ExperimentConfig::from_json(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    println!("Minimal Criteria Coevolution");
    println!("============================");
    println!(
        "Agents: {} ({} seeds), targets: {} ({} seeds)",
        config.agents.algorithm.population_size,
        config.agents.seed_count,
        config.targets.algorithm.population_size,
        config.targets.seed_count
    );
    match config.random_seed {
        Some(seed) => println!("Random seed: {}", seed),
        None => println!("Random seed: entropy"),
    }
    println!();

    let report = run_experiment(&config).unwrap_or_else(|e| {
        eprintln!("Experiment failed: {}", e);
        std::process::exit(1);
    });

    println!(
        "Seeding: {} agents, {} evaluations, {} restarts, seeds viable: {}",
        report.seed_agents, report.seeding_evaluations, report.seeding_restarts, report.seeds_viable
    );
    println!(
        "Stopped after {} generations ({:?}) in {:.2}s",
        report.result.generations, report.result.stop_reason, report.result.elapsed_seconds
    );
    println!();
    print_summary("Agents", &report.result.first);
    print_summary("Targets", &report.result.second);

    if let Some(dir) = &config.log_directory {
        let path = dir.join("summary.json");
        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    eprintln!("Error writing {}: {}", path.display(), e);
                }
            }
            Err(e) => eprintln!("Error serializing summary: {}", e),
        }
    }
}

fn print_summary(name: &str, summary: &AlgorithmSummary) {
    println!("{}:", name);
    println!(
        "  Population: {} ({} viable) in {} species",
        summary.population_size, summary.viable_count, summary.specie_count
    );
    println!(
        "  Fitness: champion {:.4}, mean {:.4}",
        summary.champion_fitness, summary.mean_fitness
    );
    println!(
        "  Complexity: mean {:.2} [{:.2}, {:.2}]",
        summary.mean_complexity, summary.min_complexity, summary.max_complexity
    );
    println!(
        "  Evaluations: {} ({:.1}/s), offspring: {}",
        summary.total_evaluations, summary.evaluations_per_second, summary.total_offspring
    );
}

fn print_example_config() {
    let config = ExperimentConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example config: {}", e),
    }
}
