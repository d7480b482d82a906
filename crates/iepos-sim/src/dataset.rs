//! Plan datasets
//!
//! - [`NoiseDataset`]: Gaussian plans, seeded per node, same menu every phase
//! - [`FileDataset`]: plan files on disk, one per node
//!
//! Plan file format, one plan per line:
//!
//! ```text
//! # discomfort:value,value,...
//! 0.25:1.0,0.5,0.0
//! 0.5:0.0,1.0,0.5
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use iepos_agent::dataset::validate_menu;
use iepos_agent::PlanSource;
use iepos_common::{IeposError, NodeId, Phase, Plan, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::config::DatasetSettings;

/// Gaussian menus; each node's seed is drawn from the master seed in node order
#[derive(Debug, Clone)]
pub struct NoiseDataset {
    num_plans: usize,
    plan_size: usize,
    noise: Normal<f64>,
    seeds: Vec<u64>,
}

impl NoiseDataset {
    /// Fails unless `std` is finite and non-negative
    pub fn new(num_nodes: usize, settings: &DatasetSettings) -> Result<Self> {
        let invalid = |reason: String| {
            IeposError::Dataset(format!("noise N({}, {}): {}", settings.mean, settings.std, reason))
        };
        if settings.std < 0.0 {
            return Err(invalid("negative standard deviation".to_string()));
        }
        let noise = Normal::new(settings.mean, settings.std).map_err(|e| invalid(e.to_string()))?;

        let mut master = StdRng::seed_from_u64(settings.seed);
        Ok(Self {
            num_plans: settings.num_plans,
            plan_size: settings.plan_size,
            noise,
            seeds: (0..num_nodes).map(|_| master.gen()).collect(),
        })
    }
}

impl PlanSource for NoiseDataset {
    fn plans(&self, node: NodeId, _phase: Phase) -> Result<Vec<Plan>> {
        let seed = self
            .seeds
            .get(node.index())
            .ok_or_else(|| IeposError::Dataset(format!("{} is outside the dataset", node)))?;

        let mut rng = StdRng::seed_from_u64(*seed);
        let plans = (0..self.num_plans)
            .map(|_| {
                let values = (0..self.plan_size).map(|_| self.noise.sample(&mut rng)).collect();
                Plan::from_values(values)
            })
            .collect();
        Ok(plans)
    }

    fn plan_size(&self) -> usize {
        self.plan_size
    }
}

/// Menus read from `<directory>/<node index>.plans`
///
/// A phase-specific `<directory>/<YYYY-MM-DD>/<node index>.plans` takes
/// precedence when it exists.
#[derive(Debug, Clone)]
pub struct FileDataset {
    directory: PathBuf,
    plan_size: usize,
}

impl FileDataset {
    pub fn new(directory: impl Into<PathBuf>, plan_size: usize) -> Self {
        Self {
            directory: directory.into(),
            plan_size,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, node: NodeId, phase: Phase) -> PathBuf {
        let file = format!("{}.plans", node.index());
        let dated = self
            .directory
            .join(phase.format("%Y-%m-%d").to_string())
            .join(&file);
        if dated.is_file() {
            dated
        } else {
            self.directory.join(file)
        }
    }
}

impl PlanSource for FileDataset {
    fn plans(&self, node: NodeId, phase: Phase) -> Result<Vec<Plan>> {
        let path = self.path_for(node, phase);
        let content = fs::read_to_string(&path)
            .map_err(|e| IeposError::Dataset(format!("{}: {}", path.display(), e)))?;

        let plans = parse_plans(&content)
            .map_err(|e| IeposError::Dataset(format!("{}: {}", path.display(), e)))?;
        if plans.is_empty() {
            return Err(IeposError::Dataset(format!("{}: no plans", path.display())));
        }
        validate_menu(&plans, self.plan_size)?;

        debug!(node = %node, plans = plans.len(), path = %path.display(), "Loaded plan file");
        Ok(plans)
    }

    fn plan_size(&self) -> usize {
        self.plan_size
    }
}

/// Parse every plan line of a plan file
pub fn parse_plans(content: &str) -> std::result::Result<Vec<Plan>, String> {
    content
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| parse_plan(line).map_err(|e| format!("line {}: {}", n, e)))
        .collect()
}

/// Parse a single `discomfort:v1,v2,...` line
pub fn parse_plan(line: &str) -> std::result::Result<Plan, String> {
    let (discomfort, values) = line
        .split_once(':')
        .ok_or_else(|| "expected discomfort:values".to_string())?;

    let discomfort: f64 = discomfort
        .trim()
        .parse()
        .map_err(|e| format!("bad discomfort {:?}: {}", discomfort.trim(), e))?;
    let values = values
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("bad value {:?}: {}", v.trim(), e))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Plan::from_values(values).with_discomfort(discomfort))
}
