use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::accumulator::AveragedCounts;
use crate::annealing::{Annealer, RegionAnnealer};
use crate::config::{Constraint, ExperimentParameters};
use crate::corpus::{CandidacyFilter, TokenCorpus};
use crate::counts::{CountView, Priors, RegionCounts};
use crate::decoder::MaximumPosteriorDecoder;
use crate::error::Result;
use crate::sampling;

pub struct RegionModel {
    corpus: TokenCorpus,
    filter: CandidacyFilter,
    active_regions: Vec<bool>, // D×R, only consulted when fully constrained
    constraint: Constraint,
    priors: Priors,
    params: ExperimentParameters,
    counts: RegionCounts,
    assignments: Vec<Option<usize>>,
    averaged: Option<AveragedCounts>,
    sample_count: usize,
    rng: ChaCha8Rng,
    initialized: bool,
    probs: Vec<f64>,
    support: Vec<f64>,
}

impl RegionModel {
    pub fn new(corpus: TokenCorpus, filter: CandidacyFilter, params: &ExperimentParameters) -> Result<Self> {
        params.validate()?;
        filter.check_against(&corpus)?;

        let regions = filter.regions();
        let active_regions = filter.active_regions_by_document(&corpus);
        let counts = RegionCounts::new(regions, corpus.vocabulary_size(), corpus.document_count());
        let assignments = vec![None; corpus.len()];

        Ok(RegionModel {
            priors: Priors::new(params.alpha, params.beta, corpus.vocabulary_size()),
            constraint: params.constraint,
            params: params.clone(),
            rng: crate::seeded_rng(params.random_seed),
            corpus,
            filter,
            active_regions,
            counts,
            assignments,
            averaged: None,
            sample_count: 0,
            initialized: false,
            probs: vec![0.0; regions],
            support: vec![0.0; regions],
        })
    }

    pub fn regions(&self) -> usize {
        self.filter.regions()
    }

    pub fn corpus(&self) -> &TokenCorpus {
        &self.corpus
    }

    pub fn filter(&self) -> &CandidacyFilter {
        &self.filter
    }

    pub fn counts(&self) -> &RegionCounts {
        &self.counts
    }

    pub fn assignments(&self) -> &[Option<usize>] {
        &self.assignments
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Posterior-mean counts if samples were collected, otherwise the raw
    /// counts of the final sweep.
    pub fn posterior_counts(&self) -> AveragedCounts {
        match &self.averaged {
            Some(averaged) => averaged.clone(),
            None => AveragedCounts::from_snapshot(&self.counts.snapshot(&[])),
        }
    }

    /// Assigns every active token a region drawn uniformly from the regions
    /// it may take. Must run exactly once, before training.
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

        for i in 0..self.corpus.len() {
            if self.corpus.is_stopword(i) {
                continue;
            }
            fill_support(
                &mut self.support,
                &self.corpus,
                &self.filter,
                &self.active_regions,
                self.constraint,
                i,
            );
            let mass: f64 = self.support.iter().sum();
            let u: f64 = self.rng.gen();
            let region = sampling::draw(&self.support, mass, &self.support, u);

            self.assignments[i] = Some(region);
            self.counts
                .add(self.corpus.word(i), self.corpus.document(i), region);
        }
        self.initialized = true;
    }

    /// Runs collapsed Gibbs sweeps for as long as `annealer` allows,
    /// offering the counts to its accumulator after every sweep.
    ///
    /// # Panics
    ///
    /// Panics if [`RegionModel::random_initialize`] has not run.
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

                self.counts.remove(word, document, current);

                fill_support(
                    &mut self.support,
                    &self.corpus,
                    &self.filter,
                    &self.active_regions,
                    self.constraint,
                    i,
                );
                fill_posterior(&mut self.probs, &self.support, &self.priors, &self.counts, word, document);
                let total = annealer.anneal_probs(&mut self.probs);
                let u: f64 = self.rng.gen();
                let region = sampling::draw(&self.probs, total, &self.support, u);

                self.counts.add(word, document, region);
                self.assignments[i] = Some(region);
            }

            annealer.collect_samples(&self.counts.snapshot(&[]));
        }
    }

    /// Random initialization followed by training under the annealer the
    /// parameters describe. Keeps the posterior means if any were collected.
    pub fn train(&mut self) {
        self.random_initialize();
        info!(
            tokens = self.corpus.len(),
            regions = self.regions(),
            "beginning training"
        );
        let mut annealer = RegionAnnealer::from_parameters(&self.params);
        self.train_with(&mut annealer);
        self.sample_count = annealer.sample_count();
        self.averaged = annealer.into_averaged_counts();
    }

    /// Sets every active token to its maximum-posterior region under the
    /// posterior-mean counts. Deterministic: no random draw is involved.
    ///
    /// # Panics
    ///
    /// Panics if [`RegionModel::random_initialize`] has not run.
    pub fn decode(&mut self) {
        assert!(self.initialized, "decode called before random_initialize");
        info!("decoding maximum posterior regions");

        let posterior = self.posterior_counts();
        let mut decoder = MaximumPosteriorDecoder::new();
        while decoder.next_iter() {
            for i in 0..self.corpus.len() {
                if self.corpus.is_stopword(i) {
                    continue;
                }
                let word = self.corpus.word(i);
                let document = self.corpus.document(i);

                fill_support(
                    &mut self.support,
                    &self.corpus,
                    &self.filter,
                    &self.active_regions,
                    self.constraint,
                    i,
                );
                fill_posterior(&mut self.probs, &self.support, &self.priors, &posterior, word, document);
                let total = decoder.anneal_probs(&mut self.probs);
                self.assignments[i] = Some(sampling::draw(&self.probs, total, &self.support, 0.0));
            }
        }
    }
}

/// Writes the 0/1 prior mask of regions token `i` may take into `support`.
pub(crate) fn fill_support(
    support: &mut [f64],
    corpus: &TokenCorpus,
    filter: &CandidacyFilter,
    active_regions: &[bool],
    constraint: Constraint,
    i: usize,
) {
    let regions = support.len();
    let offset = corpus.document(i) * regions;
    let active = match constraint {
        Constraint::FullyConstrained => {
            let row = &active_regions[offset..offset + regions];
            // A document without toponyms has no active region to restrict to.
            row.iter().any(|&a| a).then_some(row)
        }
        Constraint::Unconstrained => None,
    };

    if corpus.is_toponym(i) {
        let row = filter.row(corpus.word(i));
        for (r, slot) in support.iter_mut().enumerate() {
            *slot = row[r] as f64;
        }
        if let Some(active) = active {
            let restricted = support.iter().zip(active).any(|(&s, &a)| s > 0.0 && a);
            if restricted {
                for (slot, &a) in support.iter_mut().zip(active) {
                    if !a {
                        *slot = 0.0;
                    }
                }
            }
        }
    } else {
        match active {
            Some(active) => {
                for (slot, &a) in support.iter_mut().zip(active) {
                    *slot = if a { 1.0 } else { 0.0 };
                }
            }
            None => support.iter_mut().for_each(|s| *s = 1.0),
        }
    }
}

pub(crate) fn fill_posterior<V: CountView>(
    probs: &mut [f64],
    support: &[f64],
    priors: &Priors,
    view: &V,
    word: usize,
    document: usize,
) {
    for (r, (p, &s)) in probs.iter_mut().zip(support).enumerate() {
        *p = if s > 0.0 {
            priors.weight(view, word, document, r) * s
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annealing::Tempering;

    // Two documents; word 0 is a toponym compatible with regions 0 and 1
    // only, word 1 an ordinary word.
    fn toy_model(params: &ExperimentParameters) -> RegionModel {
        let corpus = TokenCorpus::new(
            vec![0, 1, 0, 1],
            vec![0, 0, 1, 1],
            vec![1, 0, 1, 0],
            vec![0, 0, 0, 0],
        )
        .unwrap();
        let filter = CandidacyFilter::from_rows(2, 3, vec![(0, vec![0, 1])]).unwrap();
        RegionModel::new(corpus, filter, params).unwrap()
    }

    fn assert_conserved(model: &RegionModel) {
        let counts = model.counts();
        assert_eq!(counts.total() as usize, model.corpus().active_tokens());
        for (d, &n) in model.corpus().active_tokens_per_document().iter().enumerate() {
            assert_eq!(counts.document_total(d) as usize, n);
        }
    }

    #[test]
    fn test_random_initialize_respects_filter() {
        let mut model = toy_model(&ExperimentParameters::default());
        model.random_initialize();
        assert_conserved(&model);
        for i in model.corpus().toponym_tokens() {
            let region = model.assignments()[i].unwrap();
            assert!(model.filter().is_compatible(0, region));
        }
    }

    #[test]
    fn test_counts_conserved_across_sweeps() {
        let params = ExperimentParameters {
            burn_in_iterations: 1,
            samples: 0,
            random_seed: 11,
            ..Default::default()
        };
        let mut model = toy_model(&params);
        model.random_initialize();
        for _ in 0..25 {
            let mut annealer = RegionAnnealer::with_tempering(&params, Tempering::Simulated);
            model.train_with(&mut annealer);
            assert_conserved(&model);
            for i in model.corpus().toponym_tokens() {
                assert_ne!(model.assignments()[i], Some(2));
            }
        }
    }

    #[test]
    fn test_stopwords_are_never_assigned() {
        let corpus = TokenCorpus::new(vec![0, 1, 9], vec![0, 0, 0], vec![0, 0, 0], vec![0, 0, 1]).unwrap();
        let filter = CandidacyFilter::permissive(2, 2);
        let params = ExperimentParameters {
            burn_in_iterations: 3,
            samples: 2,
            lag: 1,
            ..Default::default()
        };
        let mut model = RegionModel::new(corpus, filter, &params).unwrap();
        model.train();
        model.decode();
        assert_eq!(model.assignments()[2], None);
        assert_eq!(model.counts().total(), 2);
        assert_eq!(model.sample_count(), 2);
        let posterior = model.posterior_counts();
        assert!((posterior.region_counts.iter().sum::<f64>() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let params = ExperimentParameters {
            burn_in_iterations: 5,
            samples: 3,
            lag: 2,
            random_seed: 3,
            ..Default::default()
        };
        let mut model = toy_model(&params);
        model.train();
        model.decode();
        let first = model.assignments().to_vec();
        model.decode();
        assert_eq!(model.assignments(), first.as_slice());
    }

    #[test]
    fn test_fully_constrained_keeps_words_in_active_regions() {
        let params = ExperimentParameters {
            burn_in_iterations: 10,
            samples: 0,
            constraint: Constraint::FullyConstrained,
            random_seed: 5,
            ..Default::default()
        };
        let corpus = TokenCorpus::new(
            vec![0, 1, 1, 0, 1],
            vec![0, 0, 0, 1, 1],
            vec![1, 0, 0, 1, 0],
            vec![0, 0, 0, 0, 0],
        )
        .unwrap();
        let filter = CandidacyFilter::from_rows(2, 4, vec![(0, vec![2])]).unwrap();
        let mut model = RegionModel::new(corpus, filter, &params).unwrap();
        model.train();
        model.decode();
        for region in model.assignments() {
            assert_eq!(*region, Some(2));
        }
    }

    #[test]
    fn test_fill_support_without_active_regions_allows_all() {
        let corpus = TokenCorpus::new(vec![0], vec![0], vec![0], vec![0]).unwrap();
        let filter = CandidacyFilter::permissive(1, 3);
        let active = vec![false; 3];
        let mut support = vec![0.0; 3];
        fill_support(&mut support, &corpus, &filter, &active, Constraint::FullyConstrained, 0);
        assert_eq!(support, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    #[should_panic(expected = "before random_initialize")]
    fn test_train_requires_initialization() {
        let params = ExperimentParameters::default();
        let mut model = toy_model(&params);
        let mut annealer = RegionAnnealer::from_parameters(&params);
        model.train_with(&mut annealer);
    }
}
