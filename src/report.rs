use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use counter::Counter;
use serde::Serialize;

use crate::accumulator::AveragedCounts;
use crate::config::{ExperimentParameters, ModelType};
use crate::error::Result;
use crate::regions::Region;
use crate::region_model::RegionModel;
use crate::spherical::SphericalRegionModel;

/// Everything a training run produced, ready to be written as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub model: ModelType,
    pub parameters: ExperimentParameters,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tokens: usize,
    pub active_tokens: usize,
    pub regions: usize,
    pub sample_count: usize,
    pub assignments: Vec<Option<usize>>, // None for stopwords
    pub region_usage: Vec<(usize, usize)>, // (region, tokens), most used first
    pub posterior: AveragedCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate_indices: Option<Vec<Option<usize>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_directions: Option<Vec<Option<(f64, f64)>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<Vec<Region>>,
}

fn region_usage(assignments: &[Option<usize>]) -> Vec<(usize, usize)> {
    let usage: Counter<usize> = assignments.iter().flatten().copied().collect();
    usage.most_common_ordered()
}

impl TrainingReport {
    pub fn from_region_model(
        model: &RegionModel,
        parameters: &ExperimentParameters,
        started_at: DateTime<Utc>,
    ) -> Self {
        TrainingReport {
            model: ModelType::Rlda,
            parameters: parameters.clone(),
            started_at,
            finished_at: Utc::now(),
            tokens: model.corpus().len(),
            active_tokens: model.corpus().active_tokens(),
            regions: model.regions(),
            sample_count: model.sample_count(),
            assignments: model.assignments().to_vec(),
            region_usage: region_usage(model.assignments()),
            posterior: model.posterior_counts(),
            coordinate_indices: None,
            region_directions: None,
            grid: None,
        }
    }

    pub fn from_spherical_model(
        model: &SphericalRegionModel,
        parameters: &ExperimentParameters,
        started_at: DateTime<Utc>,
    ) -> Self {
        TrainingReport {
            model: ModelType::Spherical,
            parameters: parameters.clone(),
            started_at,
            finished_at: Utc::now(),
            tokens: model.corpus().len(),
            active_tokens: model.corpus().active_tokens(),
            regions: model.regions(),
            sample_count: model.sample_count(),
            assignments: model.assignments().to_vec(),
            region_usage: region_usage(model.assignments()),
            posterior: model.posterior_counts(),
            coordinate_indices: Some(model.coordinate_indices().to_vec()),
            region_directions: Some(model.region_directions()),
            grid: None,
        }
    }

    /// Attaches the cells of the grid the candidacy filter was built from.
    pub fn with_grid(mut self, regions: &[Region]) -> Self {
        self.grid = Some(regions.to_vec());
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn print_summary(&self) {
        let elapsed = self.finished_at - self.started_at;
        println!("Training summary ({:?} model)", self.model);
        println!("   Tokens: {} ({} active)", self.tokens, self.active_tokens);
        println!("   Regions: {}", self.regions);
        println!("   Posterior samples: {}", self.sample_count);
        println!("   Elapsed: {:.3}s", elapsed.num_milliseconds() as f64 / 1000.0);
        println!("   Most used regions:");
        for (region, tokens) in self.region_usage.iter().take(10) {
            let direction = self
                .region_directions
                .as_ref()
                .and_then(|directions| directions.get(*region).copied().flatten());
            match direction {
                Some((lat, long)) => {
                    println!("   {:<6} {:>6} tokens  ({:.2}, {:.2})", region, tokens, lat, long)
                }
                None => println!("   {:<6} {:>6} tokens", region, tokens),
            }
        }
    }
}
