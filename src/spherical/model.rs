use std::collections::BTreeSet;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::geometry::{self, geographic_to_cartesian};
use crate::accumulator::AveragedCounts;
use crate::annealing::{Annealer, RegionAnnealer};
use crate::config::{Constraint, ExperimentParameters};
use crate::corpus::{CandidacyFilter, CoordinateLexicon, TokenCorpus};
use crate::counts::{CountView, Priors, RegionCounts};
use crate::decoder::MaximumPosteriorDecoder;
use crate::error::{Error, Result};
use crate::region_model::{fill_posterior, fill_support};
use crate::sampling;

// Region arrays grow by this fraction once fewer than
// EXPANSION / (1 + EXPANSION) of their slots are free.
const EXPANSION: f64 = 0.25;

/// Region-topic sampler whose regions also carry a direction on the sphere.
///
/// Toponym tokens are scored with an extra von Mises-Fisher term
/// `exp(κ⟨x, μ_r⟩)`, where `x` is the unit vector of the token's gazetteer
/// coordinate and `μ_r` the normalized sum of the coordinates currently
/// assigned to region `r`.
///
/// Regions come either from a fixed candidacy filter or, with region birth,
/// from a Chinese-restaurant prior that opens a new region whenever a
/// toponym picks the empty slot.
pub struct SphericalRegionModel {
    corpus: TokenCorpus,
    region_support: RegionSupport,
    active_regions: Vec<bool>,
    constraint: Constraint,
    coordinates: Vec<Vec<[f64; 3]>>, // Unit vectors of each word's candidates
    coordinate_indices: Vec<Option<usize>>,
    resample_coordinates: bool,
    kappa: f64,
    max_candidates: usize,
    priors: Priors,
    params: ExperimentParameters,
    counts: RegionCounts,
    region_means: Vec<[f64; 3]>, // Unnormalized
    assignments: Vec<Option<usize>>,
    averaged: Option<AveragedCounts>,
    sample_count: usize,
    rng: ChaCha8Rng,
    initialized: bool,
    support: Vec<f64>,
    probs: Vec<f64>,
    joint_support: Vec<f64>,
}

enum RegionSupport {
    Filter(CandidacyFilter),
    Birth(RegionBirth),
}

// Regions below `in_use` have been opened; `empty` holds the opened ones
// that currently hold no token.
#[derive(Debug, Clone)]
struct RegionBirth {
    crp_alpha: f64,
    in_use: usize,
    empty: BTreeSet<usize>,
}

impl RegionBirth {
    fn new(crp_alpha: f64) -> Self {
        RegionBirth {
            crp_alpha,
            in_use: 0,
            empty: BTreeSet::new(),
        }
    }

    /// The one unoccupied region offered to a token: the lowest emptied
    /// region, else the next unopened one.
    fn open_slot(&self) -> usize {
        self.empty.iter().next().copied().unwrap_or(self.in_use)
    }

    fn is_occupied(&self, region: usize) -> bool {
        region < self.in_use && !self.empty.contains(&region)
    }

    fn occupy(&mut self, region: usize) {
        if self.empty.remove(&region) {
            return;
        }
        if region >= self.in_use {
            self.empty.extend(self.in_use..region);
            self.in_use = region + 1;
        }
    }

    fn vacate(&mut self, region: usize) {
        self.empty.insert(region);
        while self.in_use > 0 && self.empty.remove(&(self.in_use - 1)) {
            self.in_use -= 1;
        }
    }

    // Occupancy mask, plus `open_weight` on the open slot. Tokens that may
    // not open a region still get it when nothing is occupied.
    fn fill_support(&self, support: &mut [f64], open_weight: Option<f64>) {
        for (r, slot) in support.iter_mut().enumerate() {
            *slot = if self.is_occupied(r) { 1.0 } else { 0.0 };
        }
        match open_weight {
            Some(weight) => support[self.open_slot()] = weight,
            None if self.in_use == 0 => support[self.open_slot()] = 1.0,
            None => {}
        }
    }
}

impl SphericalRegionModel {
    /// Model over the fixed regions of `filter`.
    ///
    /// `coordinate_indices[i]` is the observed gazetteer candidate of token
    /// `i`. Every active toponym needs one unless coordinates are resampled,
    /// in which case missing indices are drawn at initialization.
    pub fn new(
        corpus: TokenCorpus,
        filter: CandidacyFilter,
        lexicon: &CoordinateLexicon,
        coordinate_indices: Vec<Option<usize>>,
        params: &ExperimentParameters,
    ) -> Result<Self> {
        params.validate()?;
        if params.region_birth {
            return Err(Error::Config(
                "region birth opens its own regions; use SphericalRegionModel::with_region_birth".to_string(),
            ));
        }
        filter.check_against(&corpus)?;
        let regions = filter.regions();
        let active_regions = filter.active_regions_by_document(&corpus);
        Self::build(
            corpus,
            RegionSupport::Filter(filter),
            active_regions,
            regions,
            lexicon,
            coordinate_indices,
            params,
        )
    }

    /// Model that starts with no regions and opens them as toponyms need
    /// them. `params.regions` is only the initial array capacity.
    pub fn with_region_birth(
        corpus: TokenCorpus,
        lexicon: &CoordinateLexicon,
        coordinate_indices: Vec<Option<usize>>,
        params: &ExperimentParameters,
    ) -> Result<Self> {
        params.validate()?;
        if !params.region_birth {
            return Err(Error::Config("with_region_birth needs region_birth set".to_string()));
        }
        Self::build(
            corpus,
            RegionSupport::Birth(RegionBirth::new(params.crp_alpha)),
            Vec::new(),
            params.regions,
            lexicon,
            coordinate_indices,
            params,
        )
    }

    fn build(
        corpus: TokenCorpus,
        region_support: RegionSupport,
        active_regions: Vec<bool>,
        regions: usize,
        lexicon: &CoordinateLexicon,
        coordinate_indices: Vec<Option<usize>>,
        params: &ExperimentParameters,
    ) -> Result<Self> {
        if coordinate_indices.len() != corpus.len() {
            return Err(Error::Corpus(format!(
                "{} coordinate indices for {} tokens",
                coordinate_indices.len(),
                corpus.len()
            )));
        }

        let coordinates: Vec<Vec<[f64; 3]>> = (0..corpus.vocabulary_size())
            .map(|word| {
                lexicon
                    .candidates(word)
                    .iter()
                    .map(|&(lat, long)| geographic_to_cartesian(lat, long))
                    .collect()
            })
            .collect();

        for i in corpus.toponym_tokens() {
            let word = corpus.word(i);
            let candidates = coordinates[word].len();
            if candidates == 0 {
                return Err(Error::Corpus(format!(
                    "toponym token {} (word {}) has no gazetteer coordinates",
                    i, word
                )));
            }
            match coordinate_indices[i] {
                Some(c) if c >= candidates => {
                    return Err(Error::Corpus(format!(
                        "coordinate index {} of token {} out of range ({} candidates)",
                        c, i, candidates
                    )));
                }
                None if !params.resample_coordinates => {
                    return Err(Error::Corpus(format!(
                        "toponym token {} has no observed coordinate; enable resample_coordinates",
                        i
                    )));
                }
                _ => {}
            }
        }

        let max_candidates = coordinates.iter().map(Vec::len).max().unwrap_or(0).max(1);

        Ok(SphericalRegionModel {
            priors: Priors::new(params.alpha, params.beta, corpus.vocabulary_size()),
            counts: RegionCounts::new(regions, corpus.vocabulary_size(), corpus.document_count()),
            assignments: vec![None; corpus.len()],
            constraint: params.constraint,
            resample_coordinates: params.resample_coordinates,
            kappa: params.kappa,
            params: params.clone(),
            rng: crate::seeded_rng(params.random_seed),
            region_means: vec![[0.0; 3]; regions],
            corpus,
            region_support,
            active_regions,
            coordinates,
            coordinate_indices,
            max_candidates,
            averaged: None,
            sample_count: 0,
            initialized: false,
            support: vec![0.0; regions],
            probs: vec![0.0; regions * max_candidates],
            joint_support: vec![0.0; regions * max_candidates],
        })
    }

    /// Regions tokens may currently take: the filter's regions, or the
    /// opened ones under region birth.
    pub fn regions(&self) -> usize {
        match &self.region_support {
            RegionSupport::Filter(filter) => filter.regions(),
            RegionSupport::Birth(birth) => birth.in_use,
        }
    }

    /// Allocated region slots; at least [`SphericalRegionModel::regions`].
    pub fn capacity(&self) -> usize {
        self.counts.regions()
    }

    pub fn corpus(&self) -> &TokenCorpus {
        &self.corpus
    }

    pub fn counts(&self) -> &RegionCounts {
        &self.counts
    }

    pub fn assignments(&self) -> &[Option<usize>] {
        &self.assignments
    }

    pub fn coordinate_indices(&self) -> &[Option<usize>] {
        &self.coordinate_indices
    }

    /// Current unnormalized region mean vectors.
    pub fn region_means(&self) -> &[[f64; 3]] {
        &self.region_means
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn posterior_counts(&self) -> AveragedCounts {
        match &self.averaged {
            Some(averaged) => averaged.clone(),
            None => AveragedCounts::from_snapshot(&self.counts.snapshot(&self.region_means)),
        }
    }

    /// Latitude/longitude of each region's posterior-mean direction; `None`
    /// for regions that never held a toponym.
    pub fn region_directions(&self) -> Vec<Option<(f64, f64)>> {
        self.posterior_counts()
            .region_means
            .iter()
            .map(geometry::cartesian_to_geographic)
            .collect()
    }

    /// Toponyms first, so that under region birth the regions they open are
    /// there for the other words to join.
    ///
    /// # Panics
    ///
    /// Panics if the model was already initialized.
    pub fn random_initialize(&mut self) {
        assert!(!self.initialized, "random_initialize called twice");
        info!(
            tokens = self.corpus.len(),
            words = self.corpus.vocabulary_size(),
            regions = self.regions(),
            documents = self.corpus.document_count(),
            "randomly initializing"
        );

        for toponyms in [true, false] {
            for i in 0..self.corpus.len() {
                if self.corpus.is_stopword(i) || self.corpus.is_toponym(i) != toponyms {
                    continue;
                }
                match &self.region_support {
                    RegionSupport::Filter(filter) => fill_support(
                        &mut self.support,
                        &self.corpus,
                        filter,
                        &self.active_regions,
                        self.constraint,
                        i,
                    ),
                    // Each opened region weighs 1 against crp_alpha for a new one.
                    RegionSupport::Birth(birth) => {
                        birth.fill_support(&mut self.support, toponyms.then_some(birth.crp_alpha))
                    }
                }
                let mass: f64 = self.support.iter().sum();
                let u: f64 = self.rng.gen();
                let region = sampling::draw(&self.support, mass, &self.support, u);
                let word = self.corpus.word(i);

                if toponyms {
                    let candidates = self.coordinates[word].len();
                    let c = match self.coordinate_indices[i] {
                        Some(c) => c,
                        None => self.rng.gen_range(0..candidates),
                    };
                    self.coordinate_indices[i] = Some(c);
                    add_vector(&mut self.region_means[region], &self.coordinates[word][c], 1.0);
                }
                self.assignments[i] = Some(region);
                self.counts.add(word, self.corpus.document(i), region);
                self.claim(region);
            }
        }
        self.initialized = true;
    }

    /// # Panics
    ///
    /// Panics if [`SphericalRegionModel::random_initialize`] has not run.
    pub fn train_with<A: Annealer>(&mut self, annealer: &mut A) {
        assert!(self.initialized, "train called before random_initialize");

        while annealer.next_iter() {
            for i in 0..self.corpus.len() {
                if self.corpus.is_stopword(i) {
                    continue;
                }
                let word = self.corpus.word(i);
                let document = self.corpus.document(i);
                let Some(current) = self.assignments[i] else {
                    continue;
                };
                let regions = self.capacity();

                self.counts.remove(word, document, current);
                if self.corpus.is_toponym(i) {
                    let observed = self.coordinate_indices[i].unwrap_or(0);
                    add_vector(&mut self.region_means[current], &self.coordinates[word][observed], -1.0);
                }
                self.release(current);
                self.fill_token_support(i);

                if self.corpus.is_toponym(i) {
                    let observed = self.coordinate_indices[i].unwrap_or(0);
                    let (first, count) = self.candidate_range(word, observed);
                    let len = regions * count;
                    let open = self.open_slot();
                    fill_toponym_posterior(
                        &mut self.probs[..len],
                        &mut self.joint_support[..len],
                        &self.support,
                        &self.priors,
                        &self.counts,
                        &self.region_means,
                        &self.coordinates[word][first..first + count],
                        open,
                        word,
                        document,
                        self.kappa,
                    );
                    let total = annealer.anneal_probs(&mut self.probs[..len]);
                    let u: f64 = self.rng.gen();
                    let k = sampling::draw(&self.probs[..len], total, &self.joint_support[..len], u);
                    let (region, c) = (k / count, first + k % count);

                    add_vector(&mut self.region_means[region], &self.coordinates[word][c], 1.0);
                    self.coordinate_indices[i] = Some(c);
                    self.counts.add(word, document, region);
                    self.assignments[i] = Some(region);
                    self.claim(region);
                } else {
                    let probs = &mut self.probs[..regions];
                    fill_posterior(probs, &self.support, &self.priors, &self.counts, word, document);
                    let total = annealer.anneal_probs(probs);
                    let u: f64 = self.rng.gen();
                    let region = sampling::draw(probs, total, &self.support, u);

                    self.counts.add(word, document, region);
                    self.assignments[i] = Some(region);
                    self.claim(region);
                }
            }

            annealer.collect_samples(&self.counts.snapshot(&self.region_means));
        }
    }

    pub fn train(&mut self) {
        self.random_initialize();
        info!(
            tokens = self.corpus.len(),
            regions = self.regions(),
            kappa = self.kappa,
            "beginning training"
        );
        let mut annealer = RegionAnnealer::from_parameters(&self.params);
        self.train_with(&mut annealer);
        self.sample_count = annealer.sample_count();
        self.averaged = annealer.into_averaged_counts();
        if let RegionSupport::Birth(birth) = &self.region_support {
            info!(regions = birth.in_use, capacity = self.capacity(), "regions after training");
        }
    }

    /// Maximum-posterior region (and, when coordinates are resampled,
    /// gazetteer candidate) for every active token under the posterior-mean
    /// counts and region directions. No region is opened while decoding.
    ///
    /// # Panics
    ///
    /// Panics if [`SphericalRegionModel::random_initialize`] has not run.
    pub fn decode(&mut self) {
        assert!(self.initialized, "decode called before random_initialize");
        info!("decoding maximum posterior regions");

        let posterior = self.posterior_counts();
        let regions = posterior.regions;
        let mut decoder = MaximumPosteriorDecoder::new();
        while decoder.next_iter() {
            for i in 0..self.corpus.len() {
                if self.corpus.is_stopword(i) {
                    continue;
                }
                let word = self.corpus.word(i);
                let document = self.corpus.document(i);
                match &self.region_support {
                    RegionSupport::Filter(filter) => fill_support(
                        &mut self.support,
                        &self.corpus,
                        filter,
                        &self.active_regions,
                        self.constraint,
                        i,
                    ),
                    RegionSupport::Birth(_) => {
                        for (r, slot) in self.support[..regions].iter_mut().enumerate() {
                            *slot = if posterior.region(r) > 0.0 { 1.0 } else { 0.0 };
                        }
                    }
                }
                let support = &self.support[..regions];

                if self.corpus.is_toponym(i) {
                    let observed = self.coordinate_indices[i].unwrap_or(0);
                    let (first, count) = self.candidate_range(word, observed);
                    let len = regions * count;
                    fill_toponym_posterior(
                        &mut self.probs[..len],
                        &mut self.joint_support[..len],
                        support,
                        &self.priors,
                        &posterior,
                        &posterior.region_means,
                        &self.coordinates[word][first..first + count],
                        None,
                        word,
                        document,
                        self.kappa,
                    );
                    let total = decoder.anneal_probs(&mut self.probs[..len]);
                    let k = sampling::draw(&self.probs[..len], total, &self.joint_support[..len], 0.0);
                    self.assignments[i] = Some(k / count);
                    self.coordinate_indices[i] = Some(first + k % count);
                } else {
                    let probs = &mut self.probs[..regions];
                    fill_posterior(probs, support, &self.priors, &posterior, word, document);
                    let total = decoder.anneal_probs(probs);
                    self.assignments[i] = Some(sampling::draw(probs, total, support, 0.0));
                }
            }
        }
    }

    // Candidates scored for a toponym: all of them when resampling, otherwise
    // just the observed one.
    fn candidate_range(&self, word: usize, observed: usize) -> (usize, usize) {
        if self.resample_coordinates {
            (0, self.coordinates[word].len())
        } else {
            (observed, 1)
        }
    }

    fn fill_token_support(&mut self, i: usize) {
        match &self.region_support {
            RegionSupport::Filter(filter) => fill_support(
                &mut self.support,
                &self.corpus,
                filter,
                &self.active_regions,
                self.constraint,
                i,
            ),
            RegionSupport::Birth(birth) => {
                let open = self.corpus.is_toponym(i).then_some(1.0);
                birth.fill_support(&mut self.support, open)
            }
        }
    }

    // Empty slot and its concentration, offered to toponyms under region birth.
    fn open_slot(&self) -> Option<(usize, f64)> {
        match &self.region_support {
            RegionSupport::Birth(birth) => Some((birth.open_slot(), birth.crp_alpha)),
            RegionSupport::Filter(_) => None,
        }
    }

    // Closes `region` if the token just removed was its last one.
    fn release(&mut self, region: usize) {
        if let RegionSupport::Birth(birth) = &mut self.region_support {
            if self.counts.region[region] == 0 {
                self.region_means[region] = [0.0; 3];
                birth.vacate(region);
            }
        }
    }

    // Marks `region` occupied and keeps at least one unopened slot spare.
    fn claim(&mut self, region: usize) {
        let RegionSupport::Birth(birth) = &mut self.region_support else {
            return;
        };
        birth.occupy(region);

        let capacity = self.counts.regions();
        let free = (capacity - birth.in_use) as f64;
        if free < EXPANSION / (1.0 + EXPANSION) * capacity as f64 {
            let grown = ((capacity as f64 * (1.0 + EXPANSION)).ceil() as usize).max(capacity + 1);
            debug!(from = capacity, to = grown, "growing region arrays");
            self.counts.grow(grown);
            self.region_means.resize(grown, [0.0; 3]);
            self.support.resize(grown, 0.0);
            self.probs.resize(grown * self.max_candidates, 0.0);
            self.joint_support.resize(grown * self.max_candidates, 0.0);
        }
    }
}

fn add_vector(target: &mut [f64; 3], x: &[f64; 3], scale: f64) {
    for k in 0..3 {
        target[k] += scale * x[k];
    }
}

// Dense regions × candidates layout: entry r * C + c scores region r with
// candidate c. The open slot, if any, scores crp_alpha spread evenly over
// the candidates in place of the directional term.
#[allow(clippy::too_many_arguments)]
fn fill_toponym_posterior<V: CountView>(
    probs: &mut [f64],
    joint_support: &mut [f64],
    support: &[f64],
    priors: &Priors,
    view: &V,
    region_means: &[[f64; 3]],
    candidates: &[[f64; 3]],
    open_slot: Option<(usize, f64)>,
    word: usize,
    document: usize,
    kappa: f64,
) {
    let count = candidates.len();
    for (r, &s) in support.iter().enumerate() {
        let row = r * count..(r + 1) * count;
        joint_support[row.clone()].iter_mut().for_each(|j| *j = s);
        if s <= 0.0 {
            probs[row].iter_mut().for_each(|p| *p = 0.0);
            continue;
        }
        let weight = priors.weight(view, word, document, r) * s;
        match open_slot {
            Some((open, crp_alpha)) if open == r => {
                let share = weight * crp_alpha / count as f64;
                probs[row].iter_mut().for_each(|p| *p = share);
            }
            _ => {
                let direction = region_means.get(r).and_then(geometry::normalize);
                for (p, x) in probs[row].iter_mut().zip(candidates) {
                    *p = weight * geometry::vmf_kernel(x, direction.as_ref(), kappa);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{CountSnapshot, SampleAccumulator};
    use crate::config::ModelType;

    // Word 0 is a toponym with candidates near Austin and near Sydney; word 1
    // a toponym near Austin only; word 2 an ordinary word.
    fn lexicon() -> CoordinateLexicon {
        let mut lexicon = CoordinateLexicon::new(3);
        lexicon.insert(0, 30.0, -97.0).unwrap();
        lexicon.insert(0, -33.9, 151.2).unwrap();
        lexicon.insert(1, 31.0, -96.0).unwrap();
        lexicon
    }

    fn corpus() -> TokenCorpus {
        TokenCorpus::new(
            vec![0, 1, 2, 1, 0, 2, 1],
            vec![0, 0, 0, 1, 1, 1, 1],
            vec![1, 1, 0, 1, 1, 0, 1],
            vec![0, 0, 0, 0, 0, 0, 0],
        )
        .unwrap()
    }

    fn params(resample: bool) -> ExperimentParameters {
        ExperimentParameters {
            burn_in_iterations: 10,
            samples: 4,
            lag: 2,
            kappa: 10.0,
            random_seed: 9,
            resample_coordinates: resample,
            model: ModelType::Spherical,
            regions: 2,
            ..Default::default()
        }
    }

    fn birth_params(crp_alpha: f64) -> ExperimentParameters {
        ExperimentParameters {
            region_birth: true,
            crp_alpha,
            regions: 1,
            ..params(true)
        }
    }

    fn assert_means_track_assignments(model: &SphericalRegionModel) {
        let mut expected = vec![[0.0; 3]; model.capacity()];
        for i in model.corpus().toponym_tokens() {
            let region = model.assignments()[i].unwrap();
            let c = model.coordinate_indices()[i].unwrap();
            let x = model.coordinates[model.corpus().word(i)][c];
            add_vector(&mut expected[region], &x, 1.0);
        }
        for (mean, want) in model.region_means().iter().zip(&expected) {
            for k in 0..3 {
                assert!((mean[k] - want[k]).abs() < 1e-9);
            }
        }
    }

    fn assert_regions_consistent(model: &SphericalRegionModel) {
        let RegionSupport::Birth(birth) = &model.region_support else {
            panic!("model has no region birth");
        };
        assert!(birth.in_use < model.capacity());
        for r in 0..model.capacity() {
            let occupied = model.counts().region[r] > 0;
            assert_eq!(birth.is_occupied(r), occupied, "region {}", r);
        }
    }

    // Runs a fixed number of sweeps at temperature 1 and collects every one.
    struct Sweeps {
        remaining: usize,
        sweep: usize,
        accumulator: SampleAccumulator,
    }

    impl Annealer for Sweeps {
        fn next_iter(&mut self) -> bool {
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            self.sweep += 1;
            true
        }

        fn anneal_probs(&self, probs: &mut [f64]) -> f64 {
            probs.iter().sum()
        }

        fn collect_samples(&mut self, snapshot: &CountSnapshot<'_>) {
            self.accumulator.collect(true, self.sweep, snapshot);
        }
    }

    #[test]
    fn test_missing_coordinate_requires_resampling() {
        let filter = CandidacyFilter::permissive(3, 2);
        let err = SphericalRegionModel::new(corpus(), filter, &lexicon(), vec![None; 7], &params(false))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Corpus(_)));
    }

    #[test]
    fn test_out_of_range_coordinate_rejected() {
        let filter = CandidacyFilter::permissive(3, 2);
        let mut indices = vec![Some(0), Some(0), None, Some(0), Some(0), None, Some(0)];
        indices[0] = Some(2);
        let err = SphericalRegionModel::new(corpus(), filter, &lexicon(), indices, &params(false))
            .err()
            .unwrap();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_constructor_matches_region_mode() {
        let filter = CandidacyFilter::permissive(3, 2);
        let err = SphericalRegionModel::new(corpus(), filter, &lexicon(), vec![None; 7], &birth_params(1.0))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));

        let err = SphericalRegionModel::with_region_birth(corpus(), &lexicon(), vec![None; 7], &params(true))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_means_and_counts_conserved_while_training() {
        let p = params(true);
        let filter = CandidacyFilter::permissive(3, 2);
        let mut model = SphericalRegionModel::new(corpus(), filter, &lexicon(), vec![None; 7], &p).unwrap();
        model.random_initialize();
        assert_means_track_assignments(&model);

        for _ in 0..5 {
            let mut annealer = RegionAnnealer::from_parameters(&ExperimentParameters {
                samples: 0,
                ..p.clone()
            });
            model.train_with(&mut annealer);
            assert_means_track_assignments(&model);
            assert_eq!(model.counts().total() as usize, model.corpus().active_tokens());
        }
    }

    #[test]
    fn test_observed_coordinates_stay_fixed() {
        let p = params(false);
        let filter = CandidacyFilter::permissive(3, 2);
        let indices = vec![Some(1), Some(0), None, Some(0), Some(0), None, Some(0)];
        let mut model =
            SphericalRegionModel::new(corpus(), filter, &lexicon(), indices.clone(), &p).unwrap();
        model.train();
        model.decode();
        assert_eq!(model.coordinate_indices(), indices.as_slice());
        assert_eq!(model.sample_count(), 4);
    }

    #[test]
    fn test_decode_respects_filter_and_is_deterministic() {
        let p = params(true);
        let filter =
            CandidacyFilter::from_rows(3, 3, vec![(0, vec![0, 1]), (1, vec![0, 1])]).unwrap();
        let mut model = SphericalRegionModel::new(corpus(), filter, &lexicon(), vec![None; 7], &p).unwrap();
        model.train();
        model.decode();
        let first = model.assignments().to_vec();
        for i in model.corpus().toponym_tokens() {
            assert_ne!(first[i], Some(2));
        }
        model.decode();
        assert_eq!(model.assignments(), first.as_slice());
        assert_eq!(model.region_directions().len(), 3);
    }

    #[test]
    fn test_posterior_means_average_componentwise() {
        let p = params(true);
        let filter = CandidacyFilter::permissive(3, 2);
        let mut model = SphericalRegionModel::new(corpus(), filter, &lexicon(), vec![None; 7], &p).unwrap();
        model.train();
        let posterior = model.posterior_counts();
        // Five toponym tokens of unit length each: averaged sums keep their scale.
        let total_length: f64 = posterior.region_means.iter().map(geometry::l2_norm).sum();
        assert!(total_length > 1.0);
        assert!(total_length <= 5.0 + 1e-9);
    }

    #[test]
    fn test_region_birth_bookkeeping() {
        let p = birth_params(5.0);
        let mut model = SphericalRegionModel::with_region_birth(corpus(), &lexicon(), vec![None; 7], &p).unwrap();
        model.random_initialize();
        assert!(model.regions() >= 1);
        assert!(model.capacity() > 1);
        assert_regions_consistent(&model);
        assert_means_track_assignments(&model);

        for _ in 0..3 {
            let mut annealer = RegionAnnealer::from_parameters(&ExperimentParameters {
                samples: 0,
                ..p.clone()
            });
            model.train_with(&mut annealer);
            assert_regions_consistent(&model);
            assert_means_track_assignments(&model);
            assert_eq!(model.counts().total() as usize, model.corpus().active_tokens());
        }

        model.decode();
        for assignment in model.assignments() {
            assert!(assignment.unwrap() < model.capacity());
        }
    }

    #[test]
    fn test_regions_open_mid_training_and_samples_follow() {
        // Four toponyms far apart, one per document.
        let mut lexicon = CoordinateLexicon::new(4);
        lexicon.insert(0, 30.3, -97.7).unwrap();
        lexicon.insert(1, -33.9, 151.2).unwrap();
        lexicon.insert(2, 51.5, -0.1).unwrap();
        lexicon.insert(3, 35.7, 139.7).unwrap();
        let corpus = TokenCorpus::new(vec![0, 1, 2, 3], vec![0, 1, 2, 3], vec![1; 4], vec![0; 4]).unwrap();
        let p = ExperimentParameters {
            kappa: 0.0,
            ..birth_params(1e-9)
        };
        let mut model = SphericalRegionModel::with_region_birth(corpus, &lexicon, vec![None; 4], &p).unwrap();

        // A vanishing concentration keeps every toponym in the first region.
        model.random_initialize();
        assert_eq!(model.regions(), 1);
        let mut sweeps = Sweeps {
            remaining: 1,
            sweep: 0,
            accumulator: SampleAccumulator::new(2, 1),
        };
        model.train_with(&mut sweeps);
        assert_eq!(model.regions(), 1);
        let early_capacity = model.capacity();

        // A huge one sends each toponym that leaves a shared region to a new one.
        if let RegionSupport::Birth(birth) = &mut model.region_support {
            birth.crp_alpha = 1e9;
        }
        sweeps.remaining = 1;
        model.train_with(&mut sweeps);
        assert!(model.regions() > 1);
        assert!(model.capacity() > early_capacity);
        assert_regions_consistent(&model);
        assert_means_track_assignments(&model);

        let averages = sweeps.accumulator.into_averages().unwrap();
        assert_eq!(averages.regions, model.capacity());
        assert_eq!(averages.region_counts.len(), model.capacity());
        assert_eq!(averages.word_by_region_counts.len(), 4 * model.capacity());
        let total: f64 = averages.region_counts.iter().sum();
        assert!((total - 4.0).abs() < 1e-9);
        // Each word keeps one token's worth of mass across the re-laid rows.
        for word in 0..4 {
            let mass: f64 = (0..averages.regions).map(|r| averages.word_by_region(word, r)).sum();
            assert!((mass - 1.0).abs() < 1e-9, "word {} has mass {}", word, mass);
        }
    }
}
