use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::counts::widen_rows;

/// Borrowed view of a model's count arrays at the end of a sweep.
#[derive(Debug, Clone, Copy)]
pub struct CountSnapshot<'a> {
    pub regions: usize, // Row width of the two-tier arrays
    pub region_counts: &'a [u32],
    pub word_by_region_counts: &'a [u32],
    pub region_by_document_counts: &'a [u32],
    pub region_means: &'a [[f64; 3]], // Empty for the scalar model
}

/// Count arrays as reals: either a running sum of snapshots or, once
/// collection finishes, the posterior mean.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedCounts {
    pub regions: usize,
    pub region_counts: Vec<f64>,
    pub word_by_region_counts: Vec<f64>,
    pub region_by_document_counts: Vec<f64>,
    pub region_means: Vec<[f64; 3]>,
}

impl AveragedCounts {
    /// Raw counts of a single snapshot, used when no samples were collected.
    pub fn from_snapshot(snapshot: &CountSnapshot<'_>) -> Self {
        let mut counts = AveragedCounts::default();
        counts.add(snapshot);
        counts
    }

    fn add(&mut self, snapshot: &CountSnapshot<'_>) {
        // Regions may have been opened since the last snapshot; re-lay the
        // two-tier sums at the new row width before adding.
        if snapshot.regions > self.regions {
            if self.regions > 0 {
                widen_rows(&mut self.word_by_region_counts, self.regions, snapshot.regions);
                widen_rows(&mut self.region_by_document_counts, self.regions, snapshot.regions);
            }
            self.regions = snapshot.regions;
        }
        add_counts(&mut self.region_counts, snapshot.region_counts);
        add_counts(&mut self.word_by_region_counts, snapshot.word_by_region_counts);
        add_counts(&mut self.region_by_document_counts, snapshot.region_by_document_counts);

        if self.region_means.len() < snapshot.region_means.len() {
            self.region_means.resize(snapshot.region_means.len(), [0.0; 3]);
        }
        for (target, source) in self.region_means.iter_mut().zip(snapshot.region_means) {
            for k in 0..3 {
                target[k] += source[k];
            }
        }
    }

    fn divide(&mut self, n: f64) {
        for v in self
            .region_counts
            .iter_mut()
            .chain(self.word_by_region_counts.iter_mut())
            .chain(self.region_by_document_counts.iter_mut())
        {
            *v /= n;
        }
        // Component-wise only; means stay unnormalized until they are read.
        for mean in self.region_means.iter_mut() {
            for component in mean.iter_mut() {
                *component /= n;
            }
        }
    }
}

// Shapes are taken from the snapshot at first use and grow with it.
fn add_counts(target: &mut Vec<f64>, source: &[u32]) {
    if target.len() < source.len() {
        target.resize(source.len(), 0.0);
    }
    for (t, &s) in target.iter_mut().zip(source) {
        *t += s as f64;
    }
}

/// Collects count snapshots during the sampling phase and averages them.
#[derive(Debug, Clone)]
pub struct SampleAccumulator {
    samples: usize,
    lag: usize,
    sample_count: usize,
    finished: bool,
    sums: Option<AveragedCounts>,
}

impl SampleAccumulator {
    pub fn new(samples: usize, lag: usize) -> Self {
        SampleAccumulator {
            samples,
            lag: lag.max(1),
            sample_count: 0,
            finished: false,
            sums: None,
        }
    }

    /// Adds `snapshot` to the running sum if `sampling` is set and
    /// `inner_iter` falls on a lag boundary. The sample that completes the
    /// collection divides the sums by the sample count, once.
    ///
    /// # Panics
    ///
    /// Panics if called again after collection has finished; a second
    /// division would corrupt the averages.
    pub fn collect(&mut self, sampling: bool, inner_iter: usize, snapshot: &CountSnapshot<'_>) {
        assert!(
            !self.finished,
            "collect_samples called after sample collection finished"
        );
        if !sampling || inner_iter % self.lag != 0 {
            return;
        }

        let sums = self.sums.get_or_insert_with(AveragedCounts::default);
        sums.add(snapshot);
        self.sample_count += 1;
        debug!(sample = self.sample_count, of = self.samples, "collected sample");

        if self.sample_count == self.samples {
            self.finished = true;
            sums.divide(self.sample_count as f64);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Posterior means, available once collection has finished.
    pub fn averages(&self) -> Option<&AveragedCounts> {
        if self.finished {
            self.sums.as_ref()
        } else {
            None
        }
    }

    pub fn into_averages(self) -> Option<AveragedCounts> {
        if self.finished {
            self.sums
        } else {
            None
        }
    }
}
