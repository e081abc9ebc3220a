//! Neuro-evolution of grid-world agents.
//!
//! The pipeline runs once per tick: observations are flattened by the
//! [`serializer`], fed through each agent's [`brain`], scored for fitness in the
//! [`world`] and for [`novelty`] against past behaviour, and every few ticks the
//! [`evolution`] engine breeds the next population. Agent-supplied code runs in
//! the [`sandbox`]. [`simulation`] ties the pieces into a session.

pub mod brain;
pub mod config;
pub mod evolution;
pub mod export;
pub mod novelty;
pub mod sandbox;
pub mod serializer;
pub mod simulation;
pub mod world;

pub use brain::AgentBrain;
pub use evolution::{evolve_population, Individual};
pub use novelty::compute_novelty_score;
pub use serializer::InputSerializer;
pub use world::{init_grid_world, GridWorld};
