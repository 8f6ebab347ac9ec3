use tracing::{debug, info};

use crate::accumulator::{AveragedCounts, CountSnapshot, SampleAccumulator};
use crate::config::ExperimentParameters;

/// Tolerance for treating floating-point temperatures as equal.
pub const EPSILON: f64 = 1e-6;

/// Drives a sampler's training loop.
pub trait Annealer {
    /// Advances the schedule; false once there are no sweeps left.
    fn next_iter(&mut self) -> bool;

    /// Reshapes an unnormalized probability vector in place and returns the
    /// total mass callers must scale their uniform draw by.
    fn anneal_probs(&self, probs: &mut [f64]) -> f64;

    /// Offers the counts at the end of a sweep to the sample accumulator.
    fn collect_samples(&mut self, snapshot: &CountSnapshot<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BurnIn,
    Sampling,
    Done,
}

#[derive(Debug, Clone)]
pub struct AnnealingSchedule {
    initial_temperature: f64,
    temperature_decrement: f64,
    target_temperature: f64,
    temperature: f64,
    temperature_reciprocal: f64,
    inner_iter: usize,
    outer_iter: usize,
    inner_iterations_max: usize,
    outer_iterations_max: usize,
    samples: usize,
    lag: usize,
    sample_iteration: bool,
    phase: Phase,
}

impl AnnealingSchedule {
    pub fn new(params: &ExperimentParameters) -> Self {
        let initial = params.initial_temperature;
        let target = params.target_temperature;
        // Validated parameters always have a step count.
        let outer_iterations_max = params.outer_iterations().unwrap_or(usize::MAX);

        let mut schedule = AnnealingSchedule {
            initial_temperature: initial,
            temperature_decrement: params.temperature_decrement,
            target_temperature: target,
            temperature: initial,
            temperature_reciprocal: 1.0 / initial,
            inner_iter: 0,
            outer_iter: 0,
            inner_iterations_max: params.burn_in_iterations,
            outer_iterations_max,
            samples: params.samples,
            lag: params.lag,
            sample_iteration: false,
            phase: Phase::BurnIn,
        };
        schedule.stabilize_temperature();
        schedule
    }

    /// Snaps the annealing exponent to exactly 1 when it has drifted to
    /// within [`EPSILON`] of it, so the no-annealing fast path is taken.
    pub fn stabilize_temperature(&mut self) -> bool {
        if (self.temperature_reciprocal - 1.0).abs() < EPSILON {
            self.temperature_reciprocal = 1.0;
            true
        } else {
            false
        }
    }

    /// Counts one sweep. `finished_collection` reports whether the sample
    /// accumulator already holds every requested sample.
    pub fn next_iter(&mut self, finished_collection: bool) -> bool {
        if self.phase == Phase::Done {
            return false;
        }
        if self.outer_iter == self.outer_iterations_max {
            return self.end_of_outer_loop(finished_collection);
        }
        if self.inner_iter == self.inner_iterations_max {
            self.outer_iter += 1;
            if self.outer_iter == self.outer_iterations_max {
                return self.end_of_outer_loop(finished_collection);
            }
            self.inner_iter = 0;
            self.step_temperature();
            debug!(
                outer_iter = self.outer_iter,
                temperature = self.temperature,
                "outer iteration"
            );
        }
        self.inner_iter += 1;
        true
    }

    fn end_of_outer_loop(&mut self, finished_collection: bool) -> bool {
        if self.samples != 0 && !finished_collection && !self.sample_iteration {
            info!(samples = self.samples, lag = self.lag, "burn-in complete, beginning sampling");
            self.outer_iter = 0;
            self.inner_iter = 1;
            self.temperature = self.target_temperature;
            self.temperature_reciprocal = 1.0 / self.target_temperature;
            self.inner_iterations_max = self.samples.saturating_mul(self.lag);
            self.outer_iterations_max = 1;
            self.sample_iteration = true;
            self.phase = Phase::Sampling;
            true
        } else {
            info!("annealing schedule complete");
            self.phase = Phase::Done;
            false
        }
    }

    // Moves one decrement towards the target without passing it, so the
    // temperature can never reach zero.
    fn step_temperature(&mut self) {
        if self.initial_temperature >= self.target_temperature {
            self.temperature =
                (self.temperature - self.temperature_decrement).max(self.target_temperature);
        } else {
            self.temperature =
                (self.temperature + self.temperature_decrement).min(self.target_temperature);
        }
        self.temperature_reciprocal = 1.0 / self.temperature;
        self.stabilize_temperature();
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn temperature_reciprocal(&self) -> f64 {
        self.temperature_reciprocal
    }

    pub fn inner_iter(&self) -> usize {
        self.inner_iter
    }

    pub fn inner_iterations_max(&self) -> usize {
        self.inner_iterations_max
    }

    pub fn outer_iterations_max(&self) -> usize {
        self.outer_iterations_max
    }

    pub fn is_sample_iteration(&self) -> bool {
        self.sample_iteration
    }
}

/// How a posterior vector is reshaped at the current temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tempering {
    /// Normalize, raise to `1 / temperature`, renormalize. Returns 1.
    Simulated,
    /// Leave the vector alone and return its raw sum. Chosen when the
    /// initial and target temperatures coincide.
    Flat,
}

impl Tempering {
    pub fn anneal_probs(self, temperature_reciprocal: f64, probs: &mut [f64]) -> f64 {
        let sum: f64 = probs.iter().sum();
        match self {
            Tempering::Flat => sum,
            Tempering::Simulated => {
                if !(sum > 0.0) || !sum.is_finite() {
                    return 0.0;
                }
                let sumw = if temperature_reciprocal != 1.0 {
                    let mut sumw = 0.0;
                    for p in probs.iter_mut() {
                        *p = (*p / sum).powf(temperature_reciprocal);
                        sumw += *p;
                    }
                    sumw
                } else {
                    sum
                };
                if !(sumw > 0.0) || !sumw.is_finite() {
                    return 0.0;
                }
                for p in probs.iter_mut() {
                    *p /= sumw;
                }
                1.0
            }
        }
    }
}

/// The training-time annealer: schedule, tempering rule and accumulator.
#[derive(Debug, Clone)]
pub struct RegionAnnealer {
    schedule: AnnealingSchedule,
    tempering: Tempering,
    accumulator: SampleAccumulator,
}

impl RegionAnnealer {
    /// Picks [`Tempering::Flat`] when the schedule has nothing to anneal.
    pub fn from_parameters(params: &ExperimentParameters) -> Self {
        if params.is_flat_schedule() {
            Self::with_tempering(params, Tempering::Flat)
        } else {
            Self::with_tempering(params, Tempering::Simulated)
        }
    }

    pub fn with_tempering(params: &ExperimentParameters, tempering: Tempering) -> Self {
        RegionAnnealer {
            schedule: AnnealingSchedule::new(params),
            tempering,
            accumulator: SampleAccumulator::new(params.samples, params.lag),
        }
    }

    pub fn schedule(&self) -> &AnnealingSchedule {
        &self.schedule
    }

    pub fn tempering(&self) -> Tempering {
        self.tempering
    }

    pub fn sample_count(&self) -> usize {
        self.accumulator.sample_count()
    }

    pub fn averaged_counts(&self) -> Option<&AveragedCounts> {
        self.accumulator.averages()
    }

    pub fn into_averaged_counts(self) -> Option<AveragedCounts> {
        self.accumulator.into_averages()
    }
}

impl Annealer for RegionAnnealer {
    fn next_iter(&mut self) -> bool {
        let finished = self.accumulator.is_finished();
        self.schedule.next_iter(finished)
    }

    fn anneal_probs(&self, probs: &mut [f64]) -> f64 {
        self.tempering
            .anneal_probs(self.schedule.temperature_reciprocal(), probs)
    }

    fn collect_samples(&mut self, snapshot: &CountSnapshot<'_>) {
        self.accumulator.collect(
            self.schedule.is_sample_iteration(),
            self.schedule.inner_iter(),
            snapshot,
        );
    }
}
