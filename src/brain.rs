//! Two-layer feedforward brain with a short context memory of hidden activations.
//!
//! The context step stands in for sequence attention: the mean of the last
//! [`CONTEXT_CAPACITY`] hidden vectors is added back onto the current hidden
//! layer before the output projection. The output therefore depends on prior
//! calls, not only on the current input.

use rand::rng;
use rand::Rng;
use std::collections::VecDeque;
use thiserror::Error;

/// Number of hidden activations kept in context memory.
pub const CONTEXT_CAPACITY: usize = 5;
/// Magnitude of the perturbation applied by `self_modify`.
pub const SELF_MODIFY_SCALE: f64 = 0.01;
/// Magnitude of the perturbation applied by `mutate`.
pub const MUTATION_SCALE: f64 = 0.1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrainError {
    #[error("Input has {found} values, brain expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Cannot combine brains of topology {left:?} and {right:?}")]
    TopologyMismatch { left: Topology, right: Topology },
}

/// Layer sizes of a brain; crossover requires equal topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentBrain {
    pub(crate) input_size: usize,
    pub(crate) hidden_size: usize,
    pub(crate) output_size: usize,
    /// `hidden_size` rows of `input_size` weights
    pub(crate) weights1: Vec<Vec<f64>>,
    pub(crate) biases1: Vec<f64>,
    /// `output_size` rows of `hidden_size` weights
    pub(crate) weights2: Vec<Vec<f64>>,
    pub(crate) biases2: Vec<f64>,
    context_memory: VecDeque<Vec<f64>>,
}

impl AgentBrain {
    /// Creates a brain with every weight and bias drawn uniformly from [-1, 1].
    pub fn new(input_size: usize, hidden_size: usize, output_size: usize) -> Self {
        Self::with_rng(input_size, hidden_size, output_size, &mut rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(
        input_size: usize,
        hidden_size: usize,
        output_size: usize,
        rng: &mut R,
    ) -> Self {
        let mut matrix = |rows: usize, cols: usize| -> Vec<Vec<f64>> {
            (0..rows)
                .map(|_| (0..cols).map(|_| rng.random_range(-1.0..=1.0)).collect())
                .collect()
        };
        let weights1 = matrix(hidden_size, input_size);
        let weights2 = matrix(output_size, hidden_size);
        let biases1 = (0..hidden_size).map(|_| rng.random_range(-1.0..=1.0)).collect();
        let biases2 = (0..output_size).map(|_| rng.random_range(-1.0..=1.0)).collect();

        Self {
            input_size,
            hidden_size,
            output_size,
            weights1,
            biases1,
            weights2,
            biases2,
            context_memory: VecDeque::with_capacity(CONTEXT_CAPACITY + 1),
        }
    }

    /// Rebuilds a brain from raw parameters. Shapes are assumed to have been
    /// checked by the caller.
    pub(crate) fn from_parts(
        topology: Topology,
        weights1: Vec<Vec<f64>>,
        biases1: Vec<f64>,
        weights2: Vec<Vec<f64>>,
        biases2: Vec<f64>,
    ) -> Self {
        Self {
            input_size: topology.input_size,
            hidden_size: topology.hidden_size,
            output_size: topology.output_size,
            weights1,
            biases1,
            weights2,
            biases2,
            context_memory: VecDeque::with_capacity(CONTEXT_CAPACITY + 1),
        }
    }

    pub fn topology(&self) -> Topology {
        Topology {
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            output_size: self.output_size,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.hidden_size * (self.input_size + 1) + self.output_size * (self.hidden_size + 1)
    }

    pub fn context_len(&self) -> usize {
        self.context_memory.len()
    }

    pub fn reset_context(&mut self) {
        self.context_memory.clear();
    }

    /// Runs one forward pass and records the hidden activation in context memory.
    pub fn process_input(&mut self, input: &[f64]) -> Result<Vec<f64>, BrainError> {
        if input.len() != self.input_size {
            return Err(BrainError::DimensionMismatch {
                expected: self.input_size,
                found: input.len(),
            });
        }

        let hidden = dense_relu(&self.weights1, &self.biases1, input);

        self.context_memory.push_back(hidden.clone());
        while self.context_memory.len() > CONTEXT_CAPACITY {
            self.context_memory.pop_front();
        }

        let context = self.context_mean();
        let combined = add_zero_extended(&hidden, &context);

        Ok(dense_relu(&self.weights2, &self.biases2, &combined))
    }

    fn context_mean(&self) -> Vec<f64> {
        let width = self.context_memory.iter().map(Vec::len).max().unwrap_or(0);
        let mut mean = vec![0.0; width];
        for entry in &self.context_memory {
            for (acc, v) in mean.iter_mut().zip(entry) {
                *acc += v;
            }
        }
        let n = self.context_memory.len().max(1) as f64;
        mean.iter_mut().for_each(|v| *v /= n);
        mean
    }

    /// Nudges every parameter by an independent uniform draw in [-0.01, 0.01].
    pub fn self_modify(&mut self) {
        self.self_modify_scaled(1.0);
    }

    /// `self_modify` with the perturbation magnitude multiplied by `scale`.
    pub fn self_modify_scaled(&mut self, scale: f64) {
        let mut rng = rng();
        let amplitude = SELF_MODIFY_SCALE * scale.abs();
        if amplitude == 0.0 {
            return;
        }
        self.for_each_parameter(|p| *p += rng.random_range(-amplitude..=amplitude));
    }

    /// With probability `rate` per parameter, adds a uniform draw in [-0.1, 0.1].
    pub fn mutate(&mut self, rate: f64) {
        self.mutate_with_rng(rate, &mut rng());
    }

    pub fn mutate_with_rng<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        self.for_each_parameter(|p| {
            if rng.random::<f64>() < rate {
                *p += rng.random_range(-MUTATION_SCALE..=MUTATION_SCALE);
            }
        });
    }

    /// Bounds every parameter to [-limit, limit].
    pub fn clamp_parameters(&mut self, limit: f64) {
        self.for_each_parameter(|p| *p = p.clamp(-limit, limit));
    }

    /// Child whose every parameter is the mean of the two parents' parameters.
    pub fn crossover(parent_a: &AgentBrain, parent_b: &AgentBrain) -> Result<AgentBrain, BrainError> {
        if parent_a.topology() != parent_b.topology() {
            return Err(BrainError::TopologyMismatch {
                left: parent_a.topology(),
                right: parent_b.topology(),
            });
        }

        let mean_vec = |a: &[f64], b: &[f64]| -> Vec<f64> {
            a.iter().zip(b).map(|(x, y)| (x + y) / 2.0).collect()
        };
        let mean_matrix = |a: &[Vec<f64>], b: &[Vec<f64>]| -> Vec<Vec<f64>> {
            a.iter().zip(b).map(|(ra, rb)| mean_vec(ra, rb)).collect()
        };

        Ok(AgentBrain::from_parts(
            parent_a.topology(),
            mean_matrix(&parent_a.weights1, &parent_b.weights1),
            mean_vec(&parent_a.biases1, &parent_b.biases1),
            mean_matrix(&parent_a.weights2, &parent_b.weights2),
            mean_vec(&parent_a.biases2, &parent_b.biases2),
        ))
    }

    fn for_each_parameter<F: FnMut(&mut f64)>(&mut self, mut f: F) {
        self.weights1.iter_mut().flatten().for_each(&mut f);
        self.biases1.iter_mut().for_each(&mut f);
        self.weights2.iter_mut().flatten().for_each(&mut f);
        self.biases2.iter_mut().for_each(&mut f);
    }

    pub(crate) fn parameters(&self) -> impl Iterator<Item = f64> + '_ {
        self.weights1
            .iter()
            .flatten()
            .chain(&self.biases1)
            .chain(self.weights2.iter().flatten())
            .chain(&self.biases2)
            .copied()
    }
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn dense_relu(weights: &[Vec<f64>], biases: &[f64], input: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .zip(biases)
        .map(|(row, bias)| relu(row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + bias))
        .collect()
}

fn add_zero_extended(a: &[f64], b: &[f64]) -> Vec<f64> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0.0) + b.get(i).copied().unwrap_or(0.0))
        .collect()
}
