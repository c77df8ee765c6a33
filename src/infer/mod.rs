use thiserror::Error;
use crate::distr::*;
use crate::model::*;
use crate::graph::JunctionTreeError;

/// Exact posterior by enumeration of the hidden discrete configurations.
pub mod enumerate;

pub use enumerate::*;

#[derive(Debug, Clone, Error)]
pub enum InferenceError {

    #[error("Unknown inference algorithm {0}")]
    UnknownAlgorithm(String),

    #[error("Continuous variable {0} must be observed")]
    Unobserved(TransientVariable),

    #[error("{0} hidden configurations exceed the limit of {1}")]
    TooManyConfigurations(usize, usize),

    #[error("Evidence has zero probability under the current parameters")]
    ImpossibleEvidence,

    #[error("Posterior requested before evidence was set")]
    NotReady,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    JunctionTree(#[from] JunctionTreeError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Combination(#[from] CombinationError)

}

/// Posterior joint distribution over a set of variable instances, in moment form: a
/// mixture with an empty tail whose weights are the posterior probabilities of the
/// discrete configurations. Observed continuous instances carry zero variance.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {

    dependencies : Vec<TransientVariable>,

    joint : LinearGaussianMix

}

impl Factor {

    pub fn new(dependencies : Vec<TransientVariable>, joint : LinearGaussianMix) -> Result<Self, CombinationError> {
        if !joint.tail().is_empty() {
            return Err(CombinationError::Unsupported(format!("factor conditioned on {:?}", joint.tail())));
        }
        let covered = dependencies.iter()
            .all(|d| joint.discrete().contains(d) || joint.head().contains(d) );
        if !covered || dependencies.len() != joint.discrete().len() + joint.head().len() {
            return Err(CombinationError::Shape {
                expected : dependencies.len(),
                found : joint.discrete().len() + joint.head().len()
            });
        }
        Ok(Self { dependencies, joint })
    }

    pub fn dependencies(&self) -> &[TransientVariable] {
        &self.dependencies[..]
    }

    pub fn joint(&self) -> &LinearGaussianMix {
        &self.joint
    }

    /// Posterior probability of a configuration of the discrete dependencies.
    pub fn weight(&self, states : &[usize]) -> f64 {
        self.joint.weights().prob(states)
    }

}

/// Contract between the learning loop and an inference algorithm. The algorithm is told
/// when the network evidence changes, and is then asked for the posterior over the family
/// of each variable instance.
pub trait InferenceAlgorithm {

    fn name(&self) -> &str;

    /// Recomputes the posterior for the current network evidence.
    fn evidence_set(&mut self, model : &mut Network) -> Result<(), InferenceError>;

    /// Called once parameter learning has finished, after the evidence was restored.
    fn parameter_learning_done(&mut self, model : &mut Network) -> Result<(), InferenceError>;

    /// Posterior over the family of var (parents and var itself) at the informed absolute time.
    fn factor_for_sufficient_statistics(
        &mut self,
        model : &Network,
        var : VariableId,
        time : usize
    ) -> Result<Factor, InferenceError>;

}

/// Builds an inference algorithm from its name.
pub fn by_name(name : &str) -> Result<Box<dyn InferenceAlgorithm>, InferenceError> {
    match name.to_lowercase().as_str() {
        "enumeration" => Ok(Box::new(Enumeration::default())),
        _ => Err(InferenceError::UnknownAlgorithm(name.to_string()))
    }
}

#[test]
fn algorithms_are_found_by_name() {
    assert_eq!(by_name("Enumeration").unwrap().name(), "enumeration");
    assert!(by_name("gibbs").is_err());
}
