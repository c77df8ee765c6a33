use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use thiserror::Error;
use indicatif::ProgressBar;
use crate::distr::*;
use crate::model::*;
use crate::graph::JunctionTreeError;
use crate::infer::{self, InferenceAlgorithm, InferenceError, Factor};

#[derive(Debug, Clone, Error)]
pub enum LearningError {

    #[error("Invalid learning options: {0}")]
    InvalidOptions(String),

    #[error("No trial could be used at iteration {0}")]
    NoUsableTrials(usize),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Estimation(#[from] EstimationError),

    #[error(transparent)]
    JunctionTree(#[from] JunctionTreeError)

}

/// Options of the parameter learning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningOptions {

    #[serde(rename = "MAX_ITERATIONS")]
    pub max_iterations : usize,

    /// Learning stops once the largest parameter change of an iteration is at most this value.
    #[serde(rename = "TOLERANCE")]
    pub tolerance : f64,

    #[serde(rename = "INFERENCE_ALGORITHM")]
    pub inference_algorithm : String

}

impl Default for LearningOptions {

    fn default() -> Self {
        Self { max_iterations : 1000, tolerance : 1e-4, inference_algorithm : String::from("enumeration") }
    }

}

impl LearningOptions {

    pub fn from_json(content : &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    fn validate(&self) -> Result<(), LearningError> {
        if !self.tolerance.is_finite() || self.tolerance < 0. {
            return Err(LearningError::InvalidOptions(format!("tolerance {}", self.tolerance)));
        }
        Ok(())
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningStatus {
    Converged,
    MaxIterationsReached
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningState {

    Idle,

    /// Running the informed iteration (starting at one).
    Iterating(usize),

    Finished(LearningStatus)

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningReport {

    pub status : LearningStatus,

    pub iterations : usize,

    /// Largest parameter change of each iteration.
    pub deltas : Vec<f64>,

    /// Trials skipped at least once because their evidence could not be set or explained.
    pub skipped : Vec<usize>

}

/// Receives the progress of a learning run.
pub trait ProgressSink {

    fn start(&mut self, max_iterations : usize);

    fn advance(&mut self, iteration : usize, delta : f64);

    fn finish(&mut self, report : &LearningReport);

}

impl ProgressSink for () {

    fn start(&mut self, _max_iterations : usize) { }

    fn advance(&mut self, _iteration : usize, _delta : f64) { }

    fn finish(&mut self, _report : &LearningReport) { }

}

impl ProgressSink for ProgressBar {

    fn start(&mut self, max_iterations : usize) {
        self.set_length(max_iterations as u64);
        self.set_position(0);
    }

    fn advance(&mut self, iteration : usize, delta : f64) {
        self.set_position(iteration as u64);
        self.set_message(format!("max change {:.3e}", delta));
    }

    fn finish(&mut self, report : &LearningReport) {
        self.finish_with_message(format!("{:?} after {} iterations", report.status, report.iterations));
    }

}

pub trait LearningAlgorithm {

    fn name(&self) -> &str;

    /// Learns the parameters of every template distribution of the model from the trials
    /// of the evidence provider. The model evidence is the same before and after the call;
    /// when learning fails the distributions are also left as they were.
    fn execute(
        &mut self,
        model : &mut Network,
        evidence : &dyn EvidenceProvider,
        options : &LearningOptions,
        progress : &mut dyn ProgressSink
    ) -> Result<LearningReport, LearningError>;

}

/// Expectation-maximization. The E-step asks the inference algorithm for the posterior
/// over the family of every variable instance of every trial and accumulates its expected
/// sufficient statistics (one set per variable and template slice); the M-step replaces
/// each template distribution by its maximum likelihood estimate.
#[derive(Debug, Clone)]
pub struct ExpectMax {

    state : LearningState

}

impl Default for ExpectMax {

    fn default() -> Self {
        Self { state : LearningState::Idle }
    }

}

impl ExpectMax {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LearningState {
        self.state
    }

    fn iterate(
        &mut self,
        model : &mut Network,
        evidence : &dyn EvidenceProvider,
        options : &LearningOptions,
        inference : &mut dyn InferenceAlgorithm,
        progress : &mut dyn ProgressSink
    ) -> Result<LearningReport, LearningError> {
        let n_vars = model.variables().len();
        let n_slices = model.n_slices();
        let mut stats = Vec::with_capacity(n_vars);
        for var in 0..n_vars {
            let mut per_slice = Vec::with_capacity(n_slices);
            for s in 0..n_slices {
                per_slice.push(SufficientStatistics::for_distribution(model.distribution(var, s)?));
            }
            stats.push(per_slice);
        }

        progress.start(options.max_iterations);
        let mut deltas = Vec::new();
        let mut skipped = BTreeSet::new();
        let mut status = LearningStatus::MaxIterationsReached;
        for it in 1..=options.max_iterations {
            self.state = LearningState::Iterating(it);
            for s in stats.iter_mut().flatten() {
                s.reset();
            }

            let mut used = 0;
            for trial in 0..evidence.number_of_trials() {
                let factors = match expect_trial(model, evidence, trial, inference) {
                    Ok(factors) => factors,
                    Err(e) => {
                        log::warn!("Skipping trial {} at iteration {}: {}", trial, it, e);
                        skipped.insert(trial);
                        continue;
                    }
                };
                for (var, t, factor) in factors {
                    let family = model.family(var, t)?.shifted(t as i32);
                    stats[var][t.min(n_slices - 1)].accumulate(&family, factor.joint())?;
                }
                used += 1;
            }
            if used == 0 {
                return Err(LearningError::NoUsableTrials(it));
            }

            let mut delta : f64 = 0.;
            for (var, per_slice) in stats.iter().enumerate() {
                for (s, st) in per_slice.iter().enumerate() {
                    delta = delta.max(st.update(model.distribution_mut(var, s)?)?);
                }
            }
            log::debug!("EM iteration {}: {} trials, max parameter change {}", it, used, delta);
            deltas.push(delta);
            progress.advance(it, delta);
            if delta <= options.tolerance {
                status = LearningStatus::Converged;
                break;
            }
        }

        let report = LearningReport {
            status,
            iterations : deltas.len(),
            deltas,
            skipped : skipped.into_iter().collect()
        };
        progress.finish(&report);
        Ok(report)
    }

}

/// Sets the evidence of a trial and collects the posterior over the family of every
/// variable instance.
fn expect_trial(
    model : &mut Network,
    evidence : &dyn EvidenceProvider,
    trial : usize,
    inference : &mut dyn InferenceAlgorithm
) -> Result<Vec<(VariableId, usize, Factor)>, LearningError> {
    evidence.set_all_evidence(model, trial, false)?;
    inference.evidence_set(model)?;
    let length = evidence.trial_length(trial)?;
    let n_vars = model.variables().len();
    let mut factors = Vec::with_capacity(n_vars * length);
    for t in 0..length {
        for var in 0..n_vars {
            factors.push((var, t, inference.factor_for_sufficient_statistics(model, var, t)?));
        }
    }
    Ok(factors)
}

impl LearningAlgorithm for ExpectMax {

    fn name(&self) -> &str {
        "EM"
    }

    fn execute(
        &mut self,
        model : &mut Network,
        evidence : &dyn EvidenceProvider,
        options : &LearningOptions,
        progress : &mut dyn ProgressSink
    ) -> Result<LearningReport, LearningError> {
        options.validate()?;
        let mut inference = infer::by_name(&options.inference_algorithm)?;
        model.junction_tree()?;
        self.state = LearningState::Idle;

        model.store_state();
        let res = self.iterate(model, evidence, options, inference.as_mut(), progress);
        if res.is_ok() {
            model.restore_state(true);
        } else {
            self.state = LearningState::Idle;
            model.rollback_state(true);
        }
        let done = inference.parameter_learning_done(model);
        let report = res?;
        done?;

        self.state = LearningState::Finished(report.status);
        match report.status {
            LearningStatus::Converged => log::info!(
                "{} converged after {} iterations using {}",
                self.name(),
                report.iterations,
                inference.name()
            ),
            LearningStatus::MaxIterationsReached => log::warn!(
                "{} stopped after {} iterations without converging (last change {:?})",
                self.name(),
                report.iterations,
                report.deltas.last()
            )
        }
        Ok(report)
    }

}

#[test]
fn options_fall_back_to_defaults() {
    let opts = LearningOptions::from_json(r#"{ "MAX_ITERATIONS" : 10 }"#).unwrap();
    assert_eq!(opts.max_iterations, 10);
    assert_eq!(opts.tolerance, 1e-4);
    assert_eq!(opts.inference_algorithm, "enumeration");
    assert!(LearningOptions { tolerance : -1., ..LearningOptions::default() }.validate().is_err());
}

#[test]
fn complete_data_converges_in_two_iterations() {
    let mut net = Network::new(1);
    let a = net.add_variable("a", VarType::Discrete(2)).unwrap();
    let b = net.add_variable("b", VarType::Discrete(2)).unwrap();
    net.add_edge(a, b, 0).unwrap();
    let mut trials = TrialSet::new();
    for (va, vb) in [(0, 0), (0, 0), (0, 1), (1, 1)].iter() {
        let mut trial = Trial::new(1);
        trial.observe(a, 0, Value::State(*va)).unwrap();
        trial.observe(b, 0, Value::State(*vb)).unwrap();
        trials.push(trial);
    }
    let mut em = ExpectMax::new();
    let report = em.execute(&mut net, &trials, &LearningOptions::default(), &mut ()).unwrap();
    assert_eq!(report.status, LearningStatus::Converged);
    assert_eq!(report.iterations, 2);
    assert_eq!(em.state(), LearningState::Finished(LearningStatus::Converged));
    let pa = net.distribution(a, 0).unwrap().probability(|_| Some(Value::State(0)) ).unwrap();
    assert!((pa - 0.75).abs() < 1e-12);
    assert!(net.evidence().is_empty());
}

#[test]
fn unusable_trials_abort_learning() {
    let mut net = Network::new(1);
    net.add_variable("x", VarType::Continuous).unwrap();
    let trials = TrialSet::from(vec![Trial::new(1)]);
    let res = ExpectMax::new().execute(&mut net, &trials, &LearningOptions::default(), &mut ());
    assert!(matches!(res, Err(LearningError::NoUsableTrials(1))));
}

#[cfg(test)]
fn binary_pair() -> (Network, VariableId, VariableId) {
    let mut net = Network::new(1);
    let a = net.add_variable("a", VarType::Discrete(2)).unwrap();
    let b = net.add_variable("b", VarType::Discrete(2)).unwrap();
    net.add_edge(a, b, 0).unwrap();
    (net, a, b)
}

#[test]
fn unparseable_trials_are_skipped() {
    let (mut net, a, b) = binary_pair();
    let mut trials = TrialSet::new();
    for (va, vb) in [(0, 0), (1, 5), (1, 1)].iter() {
        let mut trial = Trial::new(1);
        trial.observe(a, 0, Value::State(*va)).unwrap();
        trial.observe(b, 0, Value::State(*vb)).unwrap();
        trials.push(trial);
    }
    let report = ExpectMax::new().execute(&mut net, &trials, &LearningOptions::default(), &mut ()).unwrap();
    assert_eq!(report.status, LearningStatus::Converged);
    assert_eq!(report.skipped, vec![1]);
    let pa = net.distribution(a, 0).unwrap().probability(|_| Some(Value::State(0)) ).unwrap();
    assert!((pa - 0.5).abs() < 1e-12);
}

/// Serves a fixed number of evidence requests, then fails every request.
#[cfg(test)]
struct Expiring {
    trials : TrialSet,
    remaining : std::cell::Cell<usize>
}

#[cfg(test)]
impl EvidenceProvider for Expiring {

    fn number_of_trials(&self) -> usize {
        self.trials.number_of_trials()
    }

    fn trial_length(&self, trial : usize) -> Result<usize, EvidenceError> {
        self.trials.trial_length(trial)
    }

    fn set_all_evidence(&self, model : &mut Network, trial : usize, announce : bool) -> Result<(), EvidenceError> {
        let left = self.remaining.get();
        if left == 0 {
            return Err(EvidenceError::UnknownTrial(trial));
        }
        self.remaining.set(left - 1);
        self.trials.set_all_evidence(model, trial, announce)
    }

}

#[test]
fn failed_learning_rolls_back_parameters() {
    let (mut net, a, b) = binary_pair();
    let mut trials = TrialSet::new();
    for (va, vb) in [(0, 0), (0, 0), (0, 1), (1, 1)].iter() {
        let mut trial = Trial::new(1);
        trial.observe(a, 0, Value::State(*va)).unwrap();
        trial.observe(b, 0, Value::State(*vb)).unwrap();
        trials.push(trial);
    }
    net.set_evidence(TransientVariable::new(a, 0), Value::State(1), false).unwrap();
    let before_a = net.distribution(a, 0).unwrap().clone();
    let before_b = net.distribution(b, 0).unwrap().clone();

    // The first iteration sees every trial and moves the parameters; the second sees none.
    let provider = Expiring { trials, remaining : std::cell::Cell::new(4) };
    let mut em = ExpectMax::new();
    let res = em.execute(&mut net, &provider, &LearningOptions::default(), &mut ());
    assert!(matches!(res, Err(LearningError::NoUsableTrials(2))));
    assert_eq!(em.state(), LearningState::Idle);
    assert_eq!(net.distribution(a, 0).unwrap(), &before_a);
    assert_eq!(net.distribution(b, 0).unwrap(), &before_b);
    assert_eq!(net.evidence().len(), 1);
    assert_eq!(net.value(&TransientVariable::new(a, 0)), Some(Value::State(1)));
}
