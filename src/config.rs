use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration of a simulation run, loaded from `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub world: WorldConfig,
    pub serializer: SerializerConfig,
    pub brain: BrainConfig,
    pub evolution: EvolutionConfig,
    pub novelty: NoveltyConfig,
    pub sandbox: SandboxConfig,
    pub simulation: SimulationConfig,
    pub export: ExportConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct WorldConfig {
    /// Side length of the square grid
    pub size: usize,
    pub initial_food: usize,
    pub initial_walls: usize,
    pub initial_hazards: usize,
    /// Probability per tick that one food item regrows on a random empty cell.
    /// Zero keeps the world static between agent actions.
    pub food_regrowth: f64,
    /// Radius of the square vision window around each agent
    pub vision_radius: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            size: 10,
            initial_food: 12,
            initial_walls: 6,
            initial_hazards: 4,
            food_regrowth: 0.0,
            vision_radius: 2,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct SerializerConfig {
    pub vision_capacity: usize,
    pub text_capacity: usize,
    pub scalar_capacity: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            vision_capacity: 25,
            text_capacity: 16,
            scalar_capacity: 4,
        }
    }
}

impl SerializerConfig {
    pub fn feature_len(&self) -> usize {
        self.vision_capacity + self.text_capacity + self.scalar_capacity
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct BrainConfig {
    pub hidden_size: usize,
    pub output_size: usize,
    /// Bound applied to every parameter after self-modification, `None` lets weights drift
    pub weight_limit: Option<f64>,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            hidden_size: 16,
            output_size: 5,
            weight_limit: Some(5.0),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub elite_count: usize,
    pub mutation_rate: f64,
    /// Number of simulation ticks between two evolution cycles
    pub generation_ticks: u64,
    /// Weight of the novelty score in the selection key, 0 selects on fitness alone
    pub novelty_weight: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            elite_count: 2,
            mutation_rate: 0.1,
            generation_ticks: 50,
            novelty_weight: 0.0,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyMode {
    /// Minimum distance if it exceeds the threshold, zero otherwise
    Threshold,
    /// Raw minimum distance
    Continuous,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct NoveltyConfig {
    pub threshold: f64,
    pub mode: NoveltyMode,
    pub archive_capacity: usize,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            mode: NoveltyMode::Threshold,
            archive_capacity: 128,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    pub timeout_ms: u64,
    pub fuel: u64,
    pub stack_capacity: usize,
    pub max_program_len: usize,
    /// Program returning the self-modification scale of an agent, `None` always applies 1.0
    pub mutation_program: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5,
            fuel: 10_000,
            stack_capacity: 64,
            max_program_len: 256,
            mutation_program: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    pub ticks: u64,
    pub tick_period_ms: u64,
    pub hyperspeed_period_ms: u64,
    pub message: String,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ticks: 500,
            tick_period_ms: 1000,
            hyperspeed_period_ms: 10,
            message: String::new(),
            seed: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub champion_path: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            champion_path: Some("champion.json".to_string()),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.world.size == 0 {
            return invalid("world.size must be greater than 0");
        }
        let Some(cells) = i32::try_from(self.world.size)
            .ok()
            .and_then(|_| self.world.size.checked_mul(self.world.size))
        else {
            return invalid("world.size is too large");
        };
        let occupants = self
            .world
            .initial_food
            .checked_add(self.world.initial_walls)
            .and_then(|n| n.checked_add(self.world.initial_hazards))
            .and_then(|n| n.checked_add(self.evolution.population_size));
        if !matches!(occupants, Some(n) if n <= cells) {
            return invalid("world is too small for its initial objects and agents");
        }
        if !(0.0..=1.0).contains(&self.world.food_regrowth) {
            return invalid("world.food_regrowth must be within [0, 1]");
        }
        let Some(window) = self
            .world
            .vision_radius
            .checked_mul(2)
            .and_then(|n| n.checked_add(1))
            .filter(|&side| i32::try_from(side).is_ok())
            .and_then(|side| side.checked_mul(side))
        else {
            return invalid("world.vision_radius is too large");
        };
        if window > self.serializer.vision_capacity {
            log::warn!(
                "Vision window of {} cells exceeds vision_capacity {}; it will be truncated",
                window,
                self.serializer.vision_capacity
            );
        }
        if self.serializer.feature_len() == 0 {
            return invalid("serializer capacities must not all be zero");
        }
        if self.brain.hidden_size == 0 || self.brain.output_size == 0 {
            return invalid("brain sizes must be greater than 0");
        }
        if let Some(limit) = self.brain.weight_limit {
            if limit <= 0.0 || !limit.is_finite() {
                return invalid("brain.weight_limit must be a positive finite number");
            }
        }
        if self.evolution.population_size == 0 {
            return invalid("evolution.population_size must be greater than 0");
        }
        if self.evolution.elite_count > self.evolution.population_size {
            return invalid("evolution.elite_count cannot exceed population_size");
        }
        if !(0.0..=1.0).contains(&self.evolution.mutation_rate) {
            return invalid("evolution.mutation_rate must be within [0, 1]");
        }
        if self.evolution.generation_ticks == 0 {
            return invalid("evolution.generation_ticks must be greater than 0");
        }
        if self.evolution.novelty_weight < 0.0 {
            return invalid("evolution.novelty_weight cannot be negative");
        }
        if self.novelty.threshold < 0.0 {
            return invalid("novelty.threshold cannot be negative");
        }
        if self.sandbox.fuel == 0 || self.sandbox.stack_capacity == 0 {
            return invalid("sandbox fuel and stack_capacity must be greater than 0");
        }
        if self.simulation.tick_period_ms == 0 || self.simulation.hyperspeed_period_ms == 0 {
            return invalid("tick periods must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = Config::from_toml_str(
            r#"
            [evolution]
            population_size = 8
            elite_count = 1

            [novelty]
            mode = "continuous"
            "#,
        )
        .unwrap();
        assert_eq!(config.evolution.population_size, 8);
        assert_eq!(config.evolution.elite_count, 1);
        assert_eq!(config.evolution.mutation_rate, 0.1);
        assert_eq!(config.novelty.mode, NoveltyMode::Continuous);
        assert_eq!(config.world.size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[world]\nsize = 12\n\n[sandbox]\nmutation_program = \"1 fitness +\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.world.size, 12);
        assert_eq!(config.sandbox.mutation_program.as_deref(), Some("1 fitness +"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Config::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = Config::from_toml_str("[world\nsize = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_elite_overflow() {
        let mut config = Config::default();
        config.evolution.elite_count = config.evolution.population_size + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_overcrowded_world() {
        let mut config = Config::default();
        config.world.size = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_absurd_sizes_without_overflow() {
        for toml in [
            "[world]\nsize = 9223372036854775807",
            "[world]\nsize = 4294967296",
            "[world]\nvision_radius = 9223372036854775807",
            "[world]\ninitial_food = 9223372036854775807\ninitial_walls = 9223372036854775807",
        ] {
            let config = Config::from_toml_str(toml).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "accepted {:?}",
                toml
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_mutation_rate() {
        let mut config = Config::default();
        config.evolution.mutation_rate = 1.5;
        assert!(config.validate().is_err());
    }
}
