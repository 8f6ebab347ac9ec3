use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::annealing::EPSILON;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Rlda,
    Spherical,
}

/// How non-toponym tokens are allowed to move between regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Non-toponyms may take any region.
    Unconstrained,
    /// Non-toponyms may only take regions some toponym in the same document
    /// is compatible with.
    FullyConstrained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentParameters {
    pub alpha: f64,                  // Document-region prior
    pub beta: f64,                   // Word-region prior
    pub kappa: f64,                  // von Mises-Fisher concentration (spherical only)
    pub random_seed: u64,            // 0 seeds from OS entropy
    pub burn_in_iterations: usize,   // Sweeps per temperature step
    pub initial_temperature: f64,
    pub temperature_decrement: f64,
    pub target_temperature: f64,
    pub samples: usize,              // Posterior samples collected after burn-in
    pub lag: usize,                  // Sweeps between samples
    pub regions: usize,              // Region count for the spherical model
    pub degrees_per_region: f64,     // Grid cell size when deriving a filter from coordinates
    pub constraint: Constraint,
    pub resample_coordinates: bool,  // Sample toponym coordinates jointly with regions
    pub region_birth: bool,          // Let the spherical model open new regions
    pub crp_alpha: f64,              // Concentration of the region-opening prior
    pub model: ModelType,
}

// Longer temperature walks are treated as a misconfigured decrement.
const MAX_TEMPERATURE_STEPS: f64 = 1e6;

impl Default for ExperimentParameters {
    fn default() -> Self {
        ExperimentParameters {
            alpha: 1.0,
            beta: 0.1,
            kappa: 20.0,
            random_seed: 1,
            burn_in_iterations: 100,
            initial_temperature: 1.0,
            temperature_decrement: 0.1,
            target_temperature: 1.0,
            samples: 100,
            lag: 10,
            regions: 50,
            degrees_per_region: 3.0,
            constraint: Constraint::Unconstrained,
            resample_coordinates: false,
            region_birth: false,
            crp_alpha: 20.0,
            model: ModelType::Rlda,
        }
    }
}

impl ExperimentParameters {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let params: ExperimentParameters = serde_json::from_str(&text)?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True when the start and target temperatures coincide, i.e. no annealing.
    pub fn is_flat_schedule(&self) -> bool {
        (self.initial_temperature - self.target_temperature).abs() < EPSILON
    }

    /// Outer iterations of the burn-in, one per temperature step. `None` when
    /// the decrement is too small for the distance to cover.
    pub fn outer_iterations(&self) -> Option<usize> {
        if self.is_flat_schedule() {
            return Some(1);
        }
        let steps = ((self.initial_temperature - self.target_temperature).abs() / self.temperature_decrement).round();
        if steps.is_finite() && steps < MAX_TEMPERATURE_STEPS {
            Some(steps as usize + 1)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.target_temperature > 0.0) {
            return Err(Error::Config(format!(
                "target temperature must be positive, got {}",
                self.target_temperature
            )));
        }
        if !(self.initial_temperature > 0.0) {
            return Err(Error::Config(format!(
                "initial temperature must be positive, got {}",
                self.initial_temperature
            )));
        }
        if !self.is_flat_schedule() && !(self.temperature_decrement > 0.0) {
            return Err(Error::Config(format!(
                "temperature decrement must be positive when annealing, got {}",
                self.temperature_decrement
            )));
        }
        if self.outer_iterations().is_none() {
            return Err(Error::Config(format!(
                "temperature decrement {} is too small to anneal from {} to {}",
                self.temperature_decrement, self.initial_temperature, self.target_temperature
            )));
        }
        if self.lag == 0 {
            return Err(Error::Config("lag must be at least 1".to_string()));
        }
        if self.samples.checked_mul(self.lag).is_none() {
            return Err(Error::Config(format!(
                "samples ({}) times lag ({}) overflows the sweep count",
                self.samples, self.lag
            )));
        }
        if self.burn_in_iterations == 0 {
            return Err(Error::Config("burn-in iterations must be at least 1".to_string()));
        }
        if !(self.alpha > 0.0) || !(self.beta > 0.0) {
            return Err(Error::Config(format!(
                "alpha and beta must be positive, got alpha={} beta={}",
                self.alpha, self.beta
            )));
        }
        if !(self.kappa >= 0.0) {
            return Err(Error::Config(format!("kappa must be non-negative, got {}", self.kappa)));
        }
        if !(self.degrees_per_region > 0.0) {
            return Err(Error::Config(format!(
                "degrees per region must be positive, got {}",
                self.degrees_per_region
            )));
        }
        if self.model == ModelType::Spherical && self.regions == 0 {
            return Err(Error::Config("spherical model needs at least one region".to_string()));
        }
        if self.region_birth {
            if self.model != ModelType::Spherical {
                return Err(Error::Config("region birth needs the spherical model".to_string()));
            }
            if self.constraint != Constraint::Unconstrained {
                return Err(Error::Config("region birth cannot be fully constrained".to_string()));
            }
            if !(self.crp_alpha > 0.0) {
                return Err(Error::Config(format!("crp_alpha must be positive, got {}", self.crp_alpha)));
            }
        }
        Ok(())
    }
}
