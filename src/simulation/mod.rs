pub mod controller;

use crate::brain::AgentBrain;
use crate::config::{Config, ConfigError};
use crate::evolution::{EvolutionEngine, EvolutionError, GenerationReport, Individual};
use crate::novelty::NoveltyScorer;
use crate::sandbox::{CompiledProgram, HostContext, Sandbox, SandboxError};
use crate::serializer::{InputSerializer, Observation};
use crate::world::{update_world, Cell, GridError, GridWorld, WorldPolicy};
use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::{rng, Rng, SeedableRng};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};
use thiserror::Error;

/// Host variables a mutation program may read.
pub const MUTATION_PROGRAM_VARIABLES: &[&str] = &["fitness", "novelty", "tick", "generation"];

/// Reward for stepping onto food; stepping onto a hazard costs the same.
const FOOD_REWARD: f64 = 1.0;
const HAZARD_PENALTY: f64 = 1.0;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Mutation program rejected: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("Evolution cycle failed: {0}")]
    Evolution(#[from] EvolutionError),
    #[error("World setup failed: {0}")]
    World(#[from] GridError),
}

/// Movement chosen from a brain's output vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stay,
    North,
    East,
    South,
    West,
}

impl Action {
    const ALL: [Action; 5] = [
        Action::Stay,
        Action::North,
        Action::East,
        Action::South,
        Action::West,
    ];

    /// Argmax over the first five outputs; ties resolve to the lowest index.
    pub fn from_output(output: &[f64]) -> Self {
        output
            .iter()
            .take(Self::ALL.len())
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
                Some((_, best_v)) if best_v >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| Self::ALL[i])
            .unwrap_or(Action::Stay)
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Action::Stay => (0, 0),
            Action::North => (0, -1),
            Action::East => (1, 0),
            Action::South => (0, 1),
            Action::West => (-1, 0),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub food_eaten: usize,
    pub hazards_hit: usize,
    pub blocked_moves: usize,
    /// Individuals whose forward pass failed and reused their previous action
    pub inference_failures: usize,
    /// Individuals whose sandboxed mutation proposal was discarded
    pub discarded_mutations: usize,
    pub mean_novelty: f64,
    pub generation: Option<GenerationReport>,
}

/// Scalar channels of an observation: progress through the current
/// generation, position normalized by the grid side and fitness clamped to [0, 1].
fn observation_scalars(
    tick: u64,
    generation_ticks: u64,
    (x, y): (i32, i32),
    size: usize,
    fitness: f64,
) -> Vec<f64> {
    let side = size.max(1) as f64;
    vec![
        (tick % generation_ticks.max(1)) as f64 / generation_ticks.max(1) as f64,
        x as f64 / side,
        y as f64 / side,
        fitness.clamp(0.0, 1.0),
    ]
}

struct InferenceOutcome {
    action: Action,
    inference_failed: bool,
    mutation_discarded: bool,
}

/// A simulation session: the world, the population living in it and the
/// machinery that scores and evolves that population tick by tick.
pub struct Simulation {
    config: Config,
    world: GridWorld,
    population: Vec<Individual>,
    serializer: InputSerializer,
    novelty: NoveltyScorer,
    engine: EvolutionEngine,
    sandbox: Sandbox,
    mutation_program: Option<CompiledProgram>,
    policy: WorldPolicy,
    message: String,
    tick: u64,
    generation: u64,
    rng: SmallRng,
}

impl Simulation {
    /// Seeds a world and a random population from a validated configuration.
    pub fn new(config: Config) -> Result<Self, SimulationError> {
        config.validate()?;

        let mut rng = match config.simulation.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rng()),
        };

        let mut world = GridWorld::try_new(config.world.size)?;
        world.scatter(Cell::Wall, config.world.initial_walls, &mut rng);
        world.scatter(Cell::Hazard, config.world.initial_hazards, &mut rng);
        world.scatter(Cell::Food, config.world.initial_food, &mut rng);

        let serializer = InputSerializer::from_config(&config.serializer);
        let sandbox = Sandbox::from_config(&config.sandbox);
        let mutation_program = config
            .sandbox
            .mutation_program
            .as_deref()
            .map(|source| sandbox.compile(source, MUTATION_PROGRAM_VARIABLES))
            .transpose()?;

        let mut free_cells = world.empty_cells();
        let population = (0..config.evolution.population_size)
            .map(|_| {
                let brain = AgentBrain::with_rng(
                    serializer.feature_len(),
                    config.brain.hidden_size,
                    config.brain.output_size,
                    &mut rng,
                );
                let mut individual = Individual::new(brain);
                // validate() guarantees enough free cells for every agent
                if !free_cells.is_empty() {
                    individual.position = free_cells.swap_remove(rng.random_range(0..free_cells.len()));
                }
                individual
            })
            .collect();

        info!(
            "Simulation initialized: {}x{} world, {} agents, {} inputs per brain",
            config.world.size,
            config.world.size,
            config.evolution.population_size,
            serializer.feature_len()
        );

        Ok(Self {
            world,
            population,
            novelty: NoveltyScorer::from_config(&config.novelty),
            engine: EvolutionEngine::from_config(&config.evolution),
            policy: WorldPolicy {
                food_regrowth: config.world.food_regrowth,
            },
            message: config.simulation.message.clone(),
            serializer,
            sandbox,
            mutation_program,
            tick: 0,
            generation: 0,
            rng,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut GridWorld {
        &mut self.world
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut [Individual] {
        &mut self.population
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn novelty_archive_len(&self) -> usize {
        self.novelty.len()
    }

    /// Text every agent observes from the next tick on.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Fittest individual of the current generation.
    pub fn champion(&self) -> Option<&Individual> {
        self.population.iter().max_by(|a, b| {
            a.fitness
                .partial_cmp(&b.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Advances the session by one tick, running an evolution cycle when the
    /// generation length is reached.
    pub fn tick(&mut self) -> Result<TickReport, SimulationError> {
        let outcomes = self.infer_actions();

        let mut report = TickReport {
            tick: self.tick + 1,
            ..TickReport::default()
        };

        for (individual, outcome) in self.population.iter_mut().zip(&outcomes) {
            report.inference_failures += outcome.inference_failed as usize;
            report.discarded_mutations += outcome.mutation_discarded as usize;

            // Staying put never re-triggers the cell the agent already stands on.
            if outcome.action == Action::Stay {
                continue;
            }
            let (dx, dy) = outcome.action.delta();
            let (x, y) = individual.position;
            let target = (x + dx, y + dy);
            match self.world.get(target.0, target.1) {
                None | Some(Cell::Wall) => report.blocked_moves += 1,
                Some(Cell::Food) => {
                    if self.world.try_remove(target.0, target.1).is_ok() {
                        individual.fitness += FOOD_REWARD;
                        report.food_eaten += 1;
                    }
                    individual.position = target;
                }
                Some(Cell::Hazard) => {
                    individual.fitness -= HAZARD_PENALTY;
                    report.hazards_hit += 1;
                    individual.position = target;
                }
                Some(Cell::Empty) => individual.position = target,
            }
        }

        // Score everyone against the archive as it stood before this tick.
        let mut novelty_sum = 0.0;
        for individual in &mut self.population {
            individual.novelty = self.novelty.score(&individual.last_output);
            novelty_sum += individual.novelty;
        }
        for individual in &self.population {
            self.novelty.record(individual.last_output.clone());
        }
        if !self.population.is_empty() {
            report.mean_novelty = novelty_sum / self.population.len() as f64;
        }

        update_world(&mut self.world, &self.policy, &mut self.rng);
        self.tick += 1;

        if self.tick % self.config.evolution.generation_ticks == 0 {
            self.generation += 1;
            let generation_report =
                self.engine
                    .advance(self.generation, &mut self.population, &mut self.rng)?;
            report.generation = Some(generation_report);
        }

        debug!(
            "Tick {}: food={} hazards={} blocked={} inference_failures={} discarded_mutations={} mean_novelty={:.4}",
            report.tick,
            report.food_eaten,
            report.hazards_hit,
            report.blocked_moves,
            report.inference_failures,
            report.discarded_mutations,
            report.mean_novelty
        );
        Ok(report)
    }

    /// Runs `ticks` ticks and returns the reports of the generations completed meanwhile.
    pub fn run(&mut self, ticks: u64) -> Result<Vec<GenerationReport>, SimulationError> {
        let mut generations = Vec::new();
        for _ in 0..ticks {
            if let Some(report) = self.tick()?.generation {
                generations.push(report);
            }
        }
        Ok(generations)
    }

    /// Serializes observations, runs every brain and applies self-modification.
    /// Brains are independent so this phase runs in parallel; nothing here
    /// mutates the world.
    fn infer_actions(&mut self) -> Vec<InferenceOutcome> {
        let world = &self.world;
        let serializer = &self.serializer;
        let sandbox = &self.sandbox;
        let mutation_program = self.mutation_program.as_ref();
        let message = self.message.as_str();
        let radius = self.config.world.vision_radius;
        let weight_limit = self.config.brain.weight_limit;
        let tick = self.tick;
        let generation = self.generation;
        let generation_ticks = self.config.evolution.generation_ticks;
        let size = world.size();

        self.population
            .par_iter_mut()
            .enumerate()
            .map(|(idx, individual)| {
                let (x, y) = individual.position;
                let observation = Observation {
                    vision: world.vision_window(x, y, radius),
                    text: message.to_string(),
                    scalars: observation_scalars(
                        tick,
                        generation_ticks,
                        individual.position,
                        size,
                        individual.fitness,
                    ),
                };
                let features = serializer.serialize_observation(&observation);

                let inference_failed = match individual.brain.process_input(&features) {
                    Ok(output) => {
                        individual.last_output = output;
                        false
                    }
                    Err(e) => {
                        warn!("Agent {}: {}. Reusing previous action.", idx, e);
                        true
                    }
                };
                let action = Action::from_output(&individual.last_output);

                let scale = match mutation_program {
                    None => Some(1.0),
                    Some(program) => {
                        let context = HostContext::new()
                            .with("fitness", individual.fitness)
                            .with("novelty", individual.novelty)
                            .with("tick", tick as f64)
                            .with("generation", generation as f64);
                        match sandbox.run(program, &context) {
                            Ok(scale) => Some(scale),
                            Err(e) => {
                                debug!("Agent {}: discarding proposed mutation: {}", idx, e);
                                None
                            }
                        }
                    }
                };
                if let Some(scale) = scale {
                    individual.brain.self_modify_scaled(scale);
                    if let Some(limit) = weight_limit {
                        individual.brain.clamp_parameters(limit);
                    }
                }

                InferenceOutcome {
                    action,
                    inference_failed,
                    mutation_discarded: scale.is_none(),
                }
            })
            .collect()
    }
}
