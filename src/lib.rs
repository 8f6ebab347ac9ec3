//! Toponym resolution by region-topic modeling.

pub mod accumulator;
pub mod annealing;
pub mod config;
pub mod corpus;
pub mod counts;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod region_model;
pub mod regions;
pub mod report;
pub mod sampling;
pub mod spherical;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub use accumulator::{AveragedCounts, CountSnapshot, SampleAccumulator};
pub use annealing::{Annealer, AnnealingSchedule, Phase, RegionAnnealer, Tempering};
pub use config::{Constraint, ExperimentParameters, ModelType};
pub use corpus::{CandidacyFilter, CoordinateLexicon, TokenCorpus};
pub use decoder::MaximumPosteriorDecoder;
pub use error::{Error, Result};
pub use region_model::RegionModel;
pub use regions::{Region, RegionGrid};
pub use report::TrainingReport;
pub use spherical::SphericalRegionModel;

/// Seed 0 draws the seed from OS entropy.
pub(crate) fn seeded_rng(seed: u64) -> ChaCha8Rng {
    if seed == 0 {
        ChaCha8Rng::from_entropy()
    } else {
        ChaCha8Rng::seed_from_u64(seed)
    }
}
