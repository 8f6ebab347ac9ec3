use crate::accumulator::{AveragedCounts, CountSnapshot};

/// Read access to the three region count arrays, integer or averaged.
pub trait CountView {
    fn region(&self, region: usize) -> f64;
    fn word_by_region(&self, word: usize, region: usize) -> f64;
    fn region_by_document(&self, document: usize, region: usize) -> f64;
}

/// Sufficient statistics of the region assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCounts {
    regions: usize,
    pub region: Vec<u32>,             // R
    pub word_by_region: Vec<u32>,     // W×R, indexed word * R + region
    pub region_by_document: Vec<u32>, // D×R, indexed document * R + region
}

impl RegionCounts {
    pub fn new(regions: usize, words: usize, documents: usize) -> Self {
        RegionCounts {
            regions,
            region: vec![0; regions],
            word_by_region: vec![0; words * regions],
            region_by_document: vec![0; documents * regions],
        }
    }

    pub fn regions(&self) -> usize {
        self.regions
    }

    pub fn add(&mut self, word: usize, document: usize, region: usize) {
        self.region[region] += 1;
        self.word_by_region[word * self.regions + region] += 1;
        self.region_by_document[document * self.regions + region] += 1;
    }

    /// Re-lays every array for `regions` columns; new regions start empty.
    pub fn grow(&mut self, regions: usize) {
        if regions <= self.regions {
            return;
        }
        self.region.resize(regions, 0);
        widen_rows(&mut self.word_by_region, self.regions, regions);
        widen_rows(&mut self.region_by_document, self.regions, regions);
        self.regions = regions;
    }

    pub fn remove(&mut self, word: usize, document: usize, region: usize) {
        self.region[region] -= 1;
        self.word_by_region[word * self.regions + region] -= 1;
        self.region_by_document[document * self.regions + region] -= 1;
    }

    pub fn total(&self) -> u64 {
        self.region.iter().map(|&c| c as u64).sum()
    }

    pub fn document_total(&self, document: usize) -> u64 {
        let offset = document * self.regions;
        self.region_by_document[offset..offset + self.regions]
            .iter()
            .map(|&c| c as u64)
            .sum()
    }

    pub fn snapshot<'a>(&'a self, region_means: &'a [[f64; 3]]) -> CountSnapshot<'a> {
        CountSnapshot {
            regions: self.regions,
            region_counts: &self.region,
            word_by_region_counts: &self.word_by_region,
            region_by_document_counts: &self.region_by_document,
            region_means,
        }
    }
}

impl CountView for RegionCounts {
    fn region(&self, region: usize) -> f64 {
        self.region[region] as f64
    }

    fn word_by_region(&self, word: usize, region: usize) -> f64 {
        self.word_by_region[word * self.regions + region] as f64
    }

    fn region_by_document(&self, document: usize, region: usize) -> f64 {
        self.region_by_document[document * self.regions + region] as f64
    }
}

impl CountView for AveragedCounts {
    fn region(&self, region: usize) -> f64 {
        self.region_counts[region]
    }

    fn word_by_region(&self, word: usize, region: usize) -> f64 {
        self.word_by_region_counts[word * self.regions + region]
    }

    fn region_by_document(&self, document: usize, region: usize) -> f64 {
        self.region_by_document_counts[document * self.regions + region]
    }
}

/// Re-lays a row-major array from `old_width` to `new_width` columns,
/// padding each row with defaults.
pub(crate) fn widen_rows<T: Copy + Default>(data: &mut Vec<T>, old_width: usize, new_width: usize) {
    if old_width == 0 || new_width <= old_width {
        return;
    }
    let rows = data.len() / old_width;
    let mut widened = vec![T::default(); rows * new_width];
    for (source, target) in data.chunks(old_width).zip(widened.chunks_mut(new_width)) {
        target[..old_width].copy_from_slice(source);
    }
    *data = widened;
}

/// Dirichlet smoothing constants of the region-topic posterior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Priors {
    pub alpha: f64,
    pub beta: f64,
    pub beta_w: f64, // beta * W
}

impl Priors {
    pub fn new(alpha: f64, beta: f64, vocabulary_size: usize) -> Self {
        Priors {
            alpha,
            beta,
            beta_w: beta * vocabulary_size as f64,
        }
    }

    /// Unnormalized collapsed-Gibbs weight of `region` for a word in a document.
    pub fn weight<V: CountView>(&self, view: &V, word: usize, document: usize, region: usize) -> f64 {
        (view.word_by_region(word, region) + self.beta) / (view.region(region) + self.beta_w)
            * (view.region_by_document(document, region) + self.alpha)
    }
}
