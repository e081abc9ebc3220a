use evoforge::brain::AgentBrain;
use evoforge::config::Config;
use evoforge::evolution::{evolve_population, Individual};
use evoforge::export::{read_brain_from_json, write_brain_to_json};
use evoforge::novelty::compute_novelty_score;
use evoforge::sandbox::{HostContext, Sandbox, SandboxError};
use evoforge::serializer::InputSerializer;
use evoforge::simulation::Simulation;
use evoforge::world::{init_grid_world, spawn_object, Cell};
use tempfile::tempdir;

#[test]
fn test_manual_pipeline_round() {
    let serializer = InputSerializer::new(9, 8, 2);
    let mut world = init_grid_world(5);
    assert!(spawn_object(&mut world, 2, 1, Cell::Food));

    let mut population: Vec<Individual> = (0..4)
        .map(|_| Individual::new(AgentBrain::new(serializer.feature_len(), 6, 5)))
        .collect();

    let mut history: Vec<Vec<f64>> = Vec::new();
    for (i, individual) in population.iter_mut().enumerate() {
        let features = serializer.serialize(&world.vision_window(2, 2, 1), "hello", &[0.5, 0.25]);
        assert_eq!(features.len(), 19);

        let output = individual.brain.process_input(&features).unwrap();
        assert!(output.iter().all(|&v| v >= 0.0));
        individual.brain.self_modify();

        individual.novelty = compute_novelty_score(&output, &history, 0.5);
        individual.fitness = i as f64;
        history.push(output);
    }
    assert_eq!(population[0].novelty, 1.0);

    let best = population[3].clone();
    let next = evolve_population(&population, 1, 0.1).unwrap();
    assert_eq!(next.len(), population.len());
    assert_eq!(next[0], best);
}

#[test]
fn test_session_then_export_champion() {
    let mut config = Config::default();
    config.evolution.population_size = 8;
    config.evolution.generation_ticks = 10;
    config.simulation.seed = Some(99);
    config.sandbox.mutation_program = Some("novelty 0.5 min".to_string());

    let mut simulation = Simulation::new(config).unwrap();
    let reports = simulation.run(25).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(simulation.population().len(), 8);

    let champion = simulation.champion().unwrap().brain.clone();
    let dir = tempdir().unwrap();
    let path = dir.path().join("champion.json");
    write_brain_to_json(&champion, &path).unwrap();

    let mut restored = read_brain_from_json(&path).unwrap();
    let mut original = champion.clone();
    original.reset_context();
    assert_eq!(restored, original);

    let input = vec![0.3; restored.topology().input_size];
    assert_eq!(
        restored.process_input(&input).unwrap(),
        original.process_input(&input).unwrap()
    );
}

#[test]
fn test_sandbox_rejects_ambient_capabilities() {
    let sandbox = Sandbox::default();
    let context = HostContext::new().with("fitness", 1.0);
    for source in ["std_process_exit", "import os", "fetch(\"http://x\")", ""] {
        assert!(
            matches!(sandbox.execute(source, &context), Err(SandboxError::Parse(_))),
            "accepted {:?}",
            source
        );
    }
}
