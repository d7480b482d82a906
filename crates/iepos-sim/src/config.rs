//! Simulator configuration
//!
//! Serde defaults, overlaid by an optional TOML file and then by
//! `IEPOS_`-prefixed environment variables, e.g.
//! `IEPOS_TOPOLOGY__NUM_NODES=31` or `IEPOS_ALGORITHM__FITNESS=pattern`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use iepos_agent::{AgentConfig, FitnessKind, LocalSearchKind};
use iepos_common::{Phase, Plan, DEFAULT_HISTORY_SIZE, DEFAULT_NUM_ITERATIONS};
use serde::{Deserialize, Serialize};

/// Simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub topology: TopologySettings,
    pub algorithm: AlgorithmSettings,
    pub dataset: DatasetSettings,
    pub phases: PhaseSettings,
    pub runtime: RuntimeSettings,
    /// Per-state cost signal; zeros when absent
    pub cost_signal: Option<Vec<f64>>,
}

impl SimConfig {
    /// Load configuration from `.env`, an optional file and the environment
    ///
    /// Without an explicit path, `iepos.toml` in the working directory is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => config::File::with_name("iepos").required(false),
        };

        let cfg: SimConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("IEPOS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cost_signal"),
            )
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.topology.num_nodes == 0 {
            bail!("topology.num_nodes must be at least 1");
        }
        if self.topology.branching == 0 {
            bail!("topology.branching must be at least 1");
        }
        if self.dataset.num_plans == 0 {
            bail!("dataset.num_plans must be at least 1");
        }
        if self.dataset.plan_size == 0 {
            bail!("dataset.plan_size must be at least 1");
        }
        if self.dataset.source == DatasetSource::Files && self.dataset.directory.is_none() {
            bail!("dataset.directory is required for the files source");
        }
        if let Some(signal) = &self.cost_signal {
            if signal.len() != self.dataset.plan_size {
                bail!(
                    "cost_signal has {} states, dataset.plan_size is {}",
                    signal.len(),
                    self.dataset.plan_size
                );
            }
        }
        self.algorithm.agent_config().validate()?;
        Ok(())
    }

    pub fn cost_signal(&self) -> Plan {
        match &self.cost_signal {
            Some(values) => Plan::from_values(values.clone()),
            None => Plan::zeros(self.dataset.plan_size),
        }
    }
}

/// Tree shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologySettings {
    pub num_nodes: usize,
    /// Children per inner node of the balanced tree
    pub branching: usize,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            num_nodes: 15,
            branching: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    #[default]
    Iepos,
    /// Exhaustive optimum, small trees only
    Exhaustive,
}

/// Protocol and policy choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmSettings {
    pub protocol: ProtocolKind,
    pub fitness: FitnessKind,
    pub local_search: LocalSearchKind,
    pub num_iterations: usize,
    pub history_size: usize,
    pub ramp_up_rate: Option<f64>,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::default(),
            fitness: FitnessKind::default(),
            local_search: LocalSearchKind::default(),
            num_iterations: DEFAULT_NUM_ITERATIONS,
            history_size: DEFAULT_HISTORY_SIZE,
            ramp_up_rate: None,
        }
    }
}

impl AlgorithmSettings {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            num_iterations: self.num_iterations,
            history_size: self.history_size,
            ramp_up_rate: self.ramp_up_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSource {
    /// Seeded Gaussian plans
    #[default]
    Noise,
    /// One plan file per node
    Files,
}

/// Plan menus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub source: DatasetSource,
    pub num_plans: usize,
    pub plan_size: usize,
    pub mean: f64,
    pub std: f64,
    pub seed: u64,
    pub directory: Option<PathBuf>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            source: DatasetSource::default(),
            num_plans: 10,
            plan_size: 24,
            mean: 0.0,
            std: 1.0,
            seed: 0,
            directory: None,
        }
    }
}

/// Planning periods to run, one after another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSettings {
    pub start: NaiveDate,
    pub count: usize,
    pub step_days: i64,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            count: 1,
            step_days: 1,
        }
    }
}

impl PhaseSettings {
    /// Midnight UTC of every configured day
    pub fn phases(&self) -> Vec<Phase> {
        (0..self.count)
            .map(|k| {
                let date = self.start + Duration::days(self.step_days * k as i64);
                Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// One tokio task per node
    #[default]
    Tasks,
    /// Single-threaded in-process delivery
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub mode: RuntimeMode,
    /// Random delivery order in local mode
    pub shuffle_seed: Option<u64>,
    /// Abort an iteration when no node reports for this long
    pub stall_timeout_ms: Option<u64>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::default(),
            shuffle_seed: None,
            stall_timeout_ms: Some(30_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.topology.num_nodes, 15);
        assert_eq!(config.algorithm.protocol, ProtocolKind::Iepos);
        assert_eq!(config.algorithm.num_iterations, 20);
        assert_eq!(config.cost_signal(), Plan::zeros(24));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_phases() {
        let settings = PhaseSettings {
            start: NaiveDate::from_ymd_opt(2024, 3, 30).unwrap(),
            count: 3,
            step_days: 1,
        };
        let phases = settings.phases();
        assert_eq!(phases.len(), 3);
        assert_eq!(phases[2].month(), 4);
        assert_eq!(phases[2].day(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = SimConfig::default();
        config.cost_signal = Some(vec![1.0, 2.0]);
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.dataset.source = DatasetSource::Files;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.algorithm.num_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file_and_environment() {
        let dir = std::env::temp_dir().join(format!("iepos-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sim.toml");
        std::fs::write(
            &path,
            r#"
cost_signal = [1.0, 0.0, 1.0]

[topology]
num_nodes = 7

[algorithm]
fitness = "pattern"
local_search = "greedy"

[dataset]
plan_size = 3

[phases]
start = "2024-03-01"
count = 2
"#,
        )
        .unwrap();

        std::env::set_var("IEPOS_ALGORITHM__NUM_ITERATIONS", "4");
        let config = SimConfig::load(Some(&path)).unwrap();
        std::env::remove_var("IEPOS_ALGORITHM__NUM_ITERATIONS");

        assert_eq!(config.topology.num_nodes, 7);
        assert_eq!(config.topology.branching, 2);
        assert_eq!(config.algorithm.fitness, FitnessKind::Pattern);
        assert_eq!(config.algorithm.local_search, LocalSearchKind::Greedy);
        assert_eq!(config.algorithm.num_iterations, 4);
        assert_eq!(config.cost_signal(), Plan::from_values(vec![1.0, 0.0, 1.0]));
        assert_eq!(config.phases.phases().len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
