use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::corpus::{CandidacyFilter, CoordinateLexicon};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub id: usize,
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Region {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_latitude + self.max_latitude) / 2.0,
            (self.min_longitude + self.max_longitude) / 2.0,
        )
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}

/// Grid of square cells. Cells are only materialized when a coordinate
/// falls in them; region ids follow creation order.
#[derive(Debug, Clone)]
pub struct RegionGrid {
    degrees_per_region: f64,
    width: usize,  // cells along longitude
    height: usize, // cells along latitude
    cells: HashMap<(usize, usize), usize>,
    regions: Vec<Region>,
}

impl RegionGrid {
    pub fn new(degrees_per_region: f64) -> Result<Self> {
        if !(degrees_per_region > 0.0) || degrees_per_region > 180.0 {
            return Err(Error::Config(format!(
                "degrees per region must be in (0, 180], got {}",
                degrees_per_region
            )));
        }
        Ok(RegionGrid {
            degrees_per_region,
            width: (360.0 / degrees_per_region).ceil() as usize,
            height: (180.0 / degrees_per_region).ceil() as usize,
            cells: HashMap::new(),
            regions: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn cell_index(&self, latitude: f64, longitude: f64) -> (usize, usize) {
        let row = ((latitude + 90.0) / self.degrees_per_region).floor() as usize;
        let column = ((longitude + 180.0) / self.degrees_per_region).floor() as usize;
        (row.min(self.height - 1), column.min(self.width - 1))
    }

    /// Id of the region containing the point, if that cell exists yet.
    pub fn lookup(&self, latitude: f64, longitude: f64) -> Option<usize> {
        self.cells.get(&self.cell_index(latitude, longitude)).copied()
    }

    /// Id of the region containing the point, creating the cell if needed.
    pub fn region_for(&mut self, latitude: f64, longitude: f64) -> usize {
        let (row, column) = self.cell_index(latitude, longitude);
        if let Some(&id) = self.cells.get(&(row, column)) {
            return id;
        }
        let id = self.regions.len();
        let step = self.degrees_per_region;
        let min_latitude = row as f64 * step - 90.0;
        let min_longitude = column as f64 * step - 180.0;
        self.regions.push(Region {
            id,
            min_latitude,
            max_latitude: (min_latitude + step).min(90.0),
            min_longitude,
            max_longitude: (min_longitude + step).min(180.0),
        });
        self.cells.insert((row, column), id);
        id
    }

    /// Builds a grid from every coordinate in `lexicon` and the W×R filter
    /// marking, for each word, the cells its candidates fall in.
    pub fn candidacy_filter(
        degrees_per_region: f64,
        lexicon: &CoordinateLexicon,
        words: usize,
    ) -> Result<(RegionGrid, CandidacyFilter)> {
        let mut grid = RegionGrid::new(degrees_per_region)?;
        let rows: Vec<(usize, Vec<usize>)> = lexicon
            .iter()
            .filter(|(word, _)| *word < words)
            .map(|(word, coords)| {
                let regions = coords
                    .iter()
                    .map(|&(lat, long)| grid.region_for(lat, long))
                    .collect();
                (word, regions)
            })
            .collect();
        debug!(regions = grid.len(), "built region grid from gazetteer");
        let filter = CandidacyFilter::from_rows(words, grid.len(), rows)?;
        Ok((grid, filter))
    }
}
