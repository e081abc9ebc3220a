pub mod selection;

use crate::brain::{AgentBrain, BrainError};
use crate::config::EvolutionConfig;
use log::{debug, info, warn};
use rand::prelude::*;
use rand::rng;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvolutionError {
    #[error("Total selection weight {total} is not positive; roulette selection is degenerate")]
    DegenerateSelection { total: f64 },
    #[error("Elite count {elite_count} exceeds population size {population_size}")]
    EliteCountExceedsPopulation {
        elite_count: usize,
        population_size: usize,
    },
    #[error("Brain operation failed during breeding: {0}")]
    Brain(#[from] BrainError),
}

/// An agent of the current generation: its brain plus the scores recomputed every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub brain: AgentBrain,
    /// Reward accumulated since this individual was born
    pub fitness: f64,
    /// Novelty of the individual's most recent behaviour
    pub novelty: f64,
    /// Grid position of the agent
    pub position: (i32, i32),
    /// Output of the last successful forward pass, reused when inference fails
    pub last_output: Vec<f64>,
}

impl Individual {
    pub fn new(brain: AgentBrain) -> Self {
        Self {
            brain,
            fitness: 0.0,
            novelty: 0.0,
            position: (0, 0),
            last_output: Vec::new(),
        }
    }

    /// Key the engine ranks and samples on.
    pub fn selection_key(&self, novelty_weight: f64) -> f64 {
        self.fitness + novelty_weight * self.novelty
    }
}

/// Summary of one evolution cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationReport {
    pub generation: u64,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub best_novelty: f64,
    /// Whether parent selection fell back to uniform sampling
    pub degenerate_selection: bool,
}

impl GenerationReport {
    pub fn summarize(generation: u64, population: &[Individual], degenerate_selection: bool) -> Self {
        let best_fitness = population
            .iter()
            .map(|ind| ind.fitness)
            .fold(f64::NEG_INFINITY, f64::max);
        let best_novelty = population
            .iter()
            .map(|ind| ind.novelty)
            .fold(f64::NEG_INFINITY, f64::max);
        let mean_fitness = if population.is_empty() {
            0.0
        } else {
            population.iter().map(|ind| ind.fitness).sum::<f64>() / population.len() as f64
        };
        Self {
            generation,
            best_fitness,
            mean_fitness,
            best_novelty,
            degenerate_selection,
        }
    }
}

/// Selection, crossover and mutation over a population of brains.
#[derive(Debug, Clone)]
pub struct EvolutionEngine {
    elite_count: usize,
    mutation_rate: f64,
    novelty_weight: f64,
}

/// Produces the next generation with fitness-only ranking.
///
/// Convenience over [`EvolutionEngine::evolve`] using the thread-local RNG.
pub fn evolve_population(
    population: &[Individual],
    elite_count: usize,
    mutation_rate: f64,
) -> Result<Vec<Individual>, EvolutionError> {
    EvolutionEngine::new(elite_count, mutation_rate, 0.0)
        .evolve(population, &mut rng())
        .map(|(next, _)| next)
}

impl EvolutionEngine {
    pub fn new(elite_count: usize, mutation_rate: f64, novelty_weight: f64) -> Self {
        Self {
            elite_count,
            mutation_rate,
            novelty_weight,
        }
    }

    pub fn from_config(config: &EvolutionConfig) -> Self {
        Self::new(
            config.elite_count,
            config.mutation_rate,
            config.novelty_weight,
        )
    }

    /// Runs one evolution cycle.
    ///
    /// # Returns
    /// * the new population, always the same size as `population`
    /// * whether parent selection had to fall back to uniform sampling
    ///
    /// # Errors
    /// * `EliteCountExceedsPopulation` if more elites are requested than exist
    /// * `Brain` if two parents have different topologies
    pub fn evolve<R: Rng + ?Sized>(
        &self,
        population: &[Individual],
        rng: &mut R,
    ) -> Result<(Vec<Individual>, bool), EvolutionError> {
        if self.elite_count > population.len() {
            return Err(EvolutionError::EliteCountExceedsPopulation {
                elite_count: self.elite_count,
                population_size: population.len(),
            });
        }
        if population.is_empty() {
            return Ok((Vec::new(), false));
        }

        // Stable sort keeps tied individuals in their original order.
        let mut ranked: Vec<&Individual> = population.iter().collect();
        ranked.sort_by(|a, b| {
            b.selection_key(self.novelty_weight)
                .partial_cmp(&a.selection_key(self.novelty_weight))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut next_generation: Vec<Individual> = Vec::with_capacity(population.len());
        next_generation.extend(ranked.iter().take(self.elite_count).map(|&ind| ind.clone()));

        let offspring_count = population.len() - self.elite_count;
        if offspring_count == 0 {
            return Ok((next_generation, false));
        }

        let weights: Vec<f64> = ranked
            .iter()
            .map(|ind| ind.selection_key(self.novelty_weight))
            .collect();
        let (parent_indices, degenerate) =
            match selection::roulette_select(&weights, offspring_count, rng) {
                Ok(indices) => (indices, false),
                Err(e) => {
                    warn!("{}. Falling back to uniform parent selection.", e);
                    (
                        selection::uniform_select(ranked.len(), offspring_count, rng),
                        true,
                    )
                }
            };
        let parents: Vec<&Individual> = parent_indices.iter().map(|&i| ranked[i]).collect();

        while next_generation.len() < population.len() {
            // parents is non-empty because offspring_count > 0
            let (Some(parent1), Some(parent2)) = (parents.choose(rng), parents.choose(rng)) else {
                break;
            };
            let mut child = AgentBrain::crossover(&parent1.brain, &parent2.brain)?;
            child.mutate_with_rng(self.mutation_rate, rng);

            let mut young_blood = Individual::new(child);
            young_blood.position = parent1.position;
            next_generation.push(young_blood);
        }

        debug!(
            "Bred {} offspring from {} selected parents (elites kept: {})",
            offspring_count,
            parents.len(),
            self.elite_count
        );
        Ok((next_generation, degenerate))
    }

    /// Evolves `population` in place and reports on the generation it replaced.
    pub fn advance<R: Rng + ?Sized>(
        &self,
        generation: u64,
        population: &mut Vec<Individual>,
        rng: &mut R,
    ) -> Result<GenerationReport, EvolutionError> {
        let (next_generation, degenerate) = self.evolve(population, rng)?;
        let report = GenerationReport::summarize(generation, population, degenerate);
        info!(
            "Gen {}: Best Fitness={:.4} | Mean Fitness={:.4} | Best Novelty={:.4} | Degenerate Selection={}",
            report.generation,
            report.best_fitness,
            report.mean_fitness,
            report.best_novelty,
            report.degenerate_selection
        );
        *population = next_generation;
        Ok(report)
    }
}
