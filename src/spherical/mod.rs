pub mod geometry;
mod model;

pub use model::SphericalRegionModel;
