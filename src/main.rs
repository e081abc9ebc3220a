use evoforge::config::Config;
use evoforge::export::write_brain_to_json;
use evoforge::simulation::Simulation;
use std::path::Path;
use std::process;

/// Logs a short leaderboard of the final population.
///
/// # Arguments
/// * `simulation` - The session whose current generation is reported
/// * `top` - Number of individuals to list
fn report_leaders(simulation: &Simulation, top: usize) {
    let mut ranked: Vec<_> = simulation.population().iter().collect();
    ranked.sort_by(|a, b| {
        b.fitness
            .partial_cmp(&a.fitness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    log::info!("Top {} agents of generation {}:", top, simulation.generation());
    for (i, individual) in ranked.iter().take(top).enumerate() {
        println!(
            "[Rank {}] Fitness: {:.4} | Novelty: {:.4} | Position: {:?}",
            i + 1,
            individual.fitness,
            individual.novelty,
            individual.position
        );
    }
}

fn main() {
    env_logger::init();
    log::info!("Booting evoforge...");

    // 1. Load and Validate Configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = match Config::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration from '{}': {}", config_path, e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration loaded and validated.");

    // 2. Build the session
    let ticks = config.simulation.ticks;
    let champion_path = config.export.champion_path.clone();
    let mut simulation = match Simulation::new(config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to initialize simulation: {}", e);
            process::exit(1);
        }
    };

    // 3. Run
    log::info!("--- Running {} ticks ---", ticks);
    let generations = match simulation.run(ticks) {
        Ok(g) => g,
        Err(e) => {
            log::error!("Simulation aborted at tick {}: {}", simulation.tick_count(), e);
            process::exit(1);
        }
    };
    if let Some(best) = generations.iter().max_by(|a, b| {
        a.best_fitness
            .partial_cmp(&b.best_fitness)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        log::info!(
            "Best generation: {} (fitness {:.4}) out of {}",
            best.generation,
            best.best_fitness,
            generations.len()
        );
    }
    report_leaders(&simulation, 5);

    // 4. Export the champion brain
    let (Some(path), Some(champion)) = (champion_path, simulation.champion()) else {
        return;
    };
    match write_brain_to_json(&champion.brain, Path::new(&path)) {
        Ok(()) => log::info!("Champion brain exported to '{}'.", path),
        Err(e) => {
            log::error!("Failed to export champion brain: {}", e);
            process::exit(1);
        }
    }
}
