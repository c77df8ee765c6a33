use nalgebra::*;
use thiserror::Error;
use serde::{Serialize, Deserialize};
use std::fmt::{self, Display};
use rand::Rng;
use rand::distributions::WeightedIndex;
use crate::model::TransientVariable;
use crate::model::evidence::Value;

/// Discrete potentials and conditional probability tables over named discrete domains.
pub mod table;

pub use table::*;

/// Linear-Gaussian regressions (single component).
pub mod linear;

pub use linear::*;

/// Discrete-switched mixtures of linear-Gaussian components, and their combination algebra.
pub mod mixture;

pub use mixture::*;

pub mod sigmoid;

pub use sigmoid::*;

/// Expected sufficient statistics and maximum-likelihood updates.
pub mod stats;

pub use stats::*;

/// Every dimension of a distribution is a time-stamped instance of a network variable.
/// Distributions attached to a variable use relative time (the child at 0, a parent k slices
/// in the past at -k), and are shifted to absolute time when instantiated over a trial.
pub type Dim = TransientVariable;

/// Divisors below this value make the quotient zero; coefficients below it are
/// considered absent.
pub const EPSILON : f64 = 1e-8;

#[derive(Debug, Clone, Error)]
pub enum CombinationError {

    #[error("Expected {expected} entries, but found {found}")]
    Shape { expected : usize, found : usize },

    #[error("Dimension {dim} has {left} states at the left operand but {right} states at the right operand")]
    CardinalityMismatch { dim : Dim, left : usize, right : usize },

    #[error("Dimension {0} is not part of the distribution domain")]
    UnknownDim(Dim),

    #[error("Dimension {0} is already part of the distribution domain")]
    DuplicateDim(Dim),

    #[error("Dimension {0} has no states")]
    NoStates(Dim),

    #[error("Singular covariance matrix")]
    Singular,

    #[error("Distributions over {left:?} and {right:?} depend on each other")]
    Cyclic { left : Vec<Dim>, right : Vec<Dim> },

    #[error("Both operands have dimensions {0:?} at their heads")]
    OverlappingHeads(Vec<Dim>),

    #[error("Distribution depends on tail dimension {0}")]
    TailDependency(Dim),

    #[error("Operation not supported for {0}")]
    Unsupported(String)

}

#[derive(Debug, Clone, Error)]
pub enum EvaluationError {

    #[error("Singular covariance matrix")]
    Singular,

    #[error("No value for dimension {0}")]
    MissingValue(Dim),

    #[error("Value for dimension {0} has the wrong type")]
    TypeMismatch(Dim),

    #[error("State {state} out of range for dimension {dim} ({card} states)")]
    StateOutOfRange { dim : Dim, state : usize, card : usize },

    #[error("Distribution has no mass")]
    Degenerate,

    #[error("Operation not supported for {0}")]
    Unsupported(String)

}

/// Domain growth operations. Historically encoded as an integer: a positive n adds
/// a discrete dimension with n states, -1 adds a continuous (tail) dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Discrete(Dim, usize),
    Tail(Dim)
}

impl Extension {

    pub fn from_code(dim : Dim, code : i32) -> Option<Self> {
        match code {
            -1 => Some(Extension::Tail(dim)),
            n if n > 0 => Some(Extension::Discrete(dim, n as usize)),
            _ => None
        }
    }

}

/// The family of a variable: its discrete parents (the switch), itself and its continuous
/// parents (the tail). Discrete parents always precede continuous parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {

    pub switch : DiscreteDomain,

    pub child : Dim,

    /// Number of states of a discrete child; None for continuous children.
    pub states : Option<usize>,

    pub tail : Vec<Dim>

}

impl Family {

    pub fn shifted(&self, by : i32) -> Self {
        Self {
            switch : self.switch.shifted(by),
            child : self.child.shifted(by),
            states : self.states,
            tail : self.tail.iter().map(|d| d.shifted(by) ).collect()
        }
    }

    /// All dimensions: discrete parents, child, continuous parents.
    pub fn dims(&self) -> Vec<Dim> {
        let mut dims = self.switch.dims().to_vec();
        dims.push(self.child);
        dims.extend(self.tail.iter().cloned());
        dims
    }

}

/// Closed set of distributions the network algebra knows how to handle. Each variant owns
/// its parameters and its named domain. Operations between non-table variants are carried
/// out over mixtures (see into_mixture) and the result is narrowed back to the simplest
/// variant able to represent it (see from_mixture).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionalDistribution {

    /// Discrete child (last dimension) given discrete parents.
    Table(Table),

    /// Continuous child without parents.
    Gaussian(LinearGaussian),

    /// Continuous child given continuous parents.
    LinearGaussian(LinearGaussian),

    /// Continuous child given discrete parents.
    GaussianMix(LinearGaussianMix),

    /// Continuous child given discrete and continuous parents.
    LinearGaussianMix(LinearGaussianMix),

    /// Discrete child given continuous parents.
    MultinomialSigmoid(MultinomialSigmoid),

    /// Discrete child given discrete and continuous parents.
    MultinomialSigmoidMix(MultinomialSigmoid)

}

fn states_of<F>(dims : &[Dim], cards : &[usize], value : &F) -> Result<Vec<usize>, EvaluationError>
where
    F : Fn(&Dim) -> Option<Value>
{
    let mut states = Vec::with_capacity(dims.len());
    for (d, c) in dims.iter().zip(cards.iter()) {
        match value(d) {
            Some(Value::State(s)) if s < *c => states.push(s),
            Some(Value::State(s)) => return Err(EvaluationError::StateOutOfRange { dim : *d, state : s, card : *c }),
            Some(Value::Real(_)) => return Err(EvaluationError::TypeMismatch(*d)),
            None => return Err(EvaluationError::MissingValue(*d))
        }
    }
    Ok(states)
}

fn reals_of<F>(dims : &[Dim], value : &F) -> Result<DVector<f64>, EvaluationError>
where
    F : Fn(&Dim) -> Option<Value>
{
    let mut x = DVector::zeros(dims.len());
    for (i, d) in dims.iter().enumerate() {
        match value(d) {
            Some(Value::Real(v)) => x[i] = v,
            Some(Value::State(_)) => return Err(EvaluationError::TypeMismatch(*d)),
            None => return Err(EvaluationError::MissingValue(*d))
        }
    }
    Ok(x)
}

impl ConditionalDistribution {

    /// Builds the default distribution for a variable family: uniform tables, standard normal
    /// regressions with zero coefficients, or softmax regressions with zero weights.
    pub fn for_family(family : Family) -> Self {
        let Family { switch, child, states, tail } = family;
        match states {
            Some(n) => if tail.is_empty() {
                ConditionalDistribution::Table(Table::uniform_conditional(switch.with(child, n)))
            } else if switch.is_empty() {
                ConditionalDistribution::MultinomialSigmoid(MultinomialSigmoid::new(switch, child, n, tail))
            } else {
                ConditionalDistribution::MultinomialSigmoidMix(MultinomialSigmoid::new(switch, child, n, tail))
            },
            None => match (switch.is_empty(), tail.is_empty()) {
                (true, true) => ConditionalDistribution::Gaussian(LinearGaussian::standard(child, tail)),
                (true, false) => ConditionalDistribution::LinearGaussian(LinearGaussian::standard(child, tail)),
                (false, true) => ConditionalDistribution::GaussianMix(LinearGaussianMix::standard(switch, child, tail)),
                (false, false) => ConditionalDistribution::LinearGaussianMix(LinearGaussianMix::standard(switch, child, tail))
            }
        }
    }

    /// Family of a distribution attached to a variable. Returns None for intermediate results
    /// of the algebra that do not describe a single child.
    pub fn family(&self) -> Option<Family> {
        match self {
            ConditionalDistribution::Table(t) => {
                let dom = t.domain();
                let n = dom.len().checked_sub(1)?;
                Some(Family {
                    switch : dom.without(&dom.dims()[n]),
                    child : dom.dims()[n],
                    states : Some(dom.cards()[n]),
                    tail : Vec::new()
                })
            },
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => {
                if lg.head().len() != 1 {
                    return None;
                }
                Some(Family { switch : DiscreteDomain::empty(), child : lg.head()[0], states : None, tail : lg.tail().to_vec() })
            },
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => {
                if m.head().len() != 1 {
                    return None;
                }
                Some(Family { switch : m.discrete().clone(), child : m.head()[0], states : None, tail : m.tail().to_vec() })
            },
            ConditionalDistribution::MultinomialSigmoid(s) | ConditionalDistribution::MultinomialSigmoidMix(s) => {
                Some(Family { switch : s.switch().clone(), child : s.child(), states : Some(s.states()), tail : s.tail().to_vec() })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConditionalDistribution::Table(_) => "Table",
            ConditionalDistribution::Gaussian(_) => "Gaussian",
            ConditionalDistribution::LinearGaussian(_) => "LinearGaussian",
            ConditionalDistribution::GaussianMix(_) => "GaussianMix",
            ConditionalDistribution::LinearGaussianMix(_) => "LinearGaussianMix",
            ConditionalDistribution::MultinomialSigmoid(_) => "MultinomialSigmoid",
            ConditionalDistribution::MultinomialSigmoidMix(_) => "MultinomialSigmoidMix"
        }
    }

    /// All discrete dimensions (including a discrete child).
    pub fn discrete(&self) -> DiscreteDomain {
        match self {
            ConditionalDistribution::Table(t) => t.domain().clone(),
            ConditionalDistribution::Gaussian(_) | ConditionalDistribution::LinearGaussian(_) => DiscreteDomain::empty(),
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => m.discrete().clone(),
            ConditionalDistribution::MultinomialSigmoid(s) | ConditionalDistribution::MultinomialSigmoidMix(s) => {
                s.switch().with(s.child(), s.states())
            }
        }
    }

    /// Continuous dimensions the distribution is over.
    pub fn head(&self) -> &[Dim] {
        match self {
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => lg.head(),
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => m.head(),
            _ => &[]
        }
    }

    /// Continuous dimensions the distribution is conditioned on.
    pub fn tail(&self) -> &[Dim] {
        match self {
            ConditionalDistribution::Table(_) => &[],
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => lg.tail(),
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => m.tail(),
            ConditionalDistribution::MultinomialSigmoid(s) | ConditionalDistribution::MultinomialSigmoidMix(s) => s.tail()
        }
    }

    pub fn shifted(&self, by : i32) -> Self {
        match self {
            ConditionalDistribution::Table(t) => ConditionalDistribution::Table(t.shifted(by)),
            ConditionalDistribution::Gaussian(lg) => ConditionalDistribution::Gaussian(lg.shifted(by)),
            ConditionalDistribution::LinearGaussian(lg) => ConditionalDistribution::LinearGaussian(lg.shifted(by)),
            ConditionalDistribution::GaussianMix(m) => ConditionalDistribution::GaussianMix(m.shifted(by)),
            ConditionalDistribution::LinearGaussianMix(m) => ConditionalDistribution::LinearGaussianMix(m.shifted(by)),
            ConditionalDistribution::MultinomialSigmoid(s) => ConditionalDistribution::MultinomialSigmoid(s.shifted(by)),
            ConditionalDistribution::MultinomialSigmoidMix(s) => ConditionalDistribution::MultinomialSigmoidMix(s.shifted(by))
        }
    }

    pub fn is_mixture(&self) -> bool {
        match self {
            ConditionalDistribution::GaussianMix(_) |
            ConditionalDistribution::LinearGaussianMix(_) |
            ConditionalDistribution::MultinomialSigmoidMix(_) => true,
            _ => false
        }
    }

    /// Promotes the distribution to a mixture: tables become mixtures with an empty head,
    /// single Gaussians become one-component mixtures. Softmax distributions have no exact
    /// mixture representation.
    pub fn into_mixture(self) -> Result<LinearGaussianMix, CombinationError> {
        match self {
            ConditionalDistribution::Table(t) => {
                let n = t.domain().size();
                Ok(LinearGaussianMix::from_parts(t, Vec::new(), Vec::new(), vec![Component::standard(0, 0); n]))
            },
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => Ok(lg.into_mixture()),
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => Ok(m),
            other => Err(CombinationError::Unsupported(other.name().to_string()))
        }
    }

    pub fn to_mixture(&self) -> Result<LinearGaussianMix, CombinationError> {
        self.clone().into_mixture()
    }

    /// Narrowest variant able to represent the mixture.
    pub fn from_mixture(mix : LinearGaussianMix) -> Self {
        if mix.head().is_empty() {
            let (weights, _, _, _) = mix.into_parts();
            return ConditionalDistribution::Table(weights);
        }
        if mix.discrete().is_empty() {
            let (_, head, tail, mut comps) = mix.into_parts();
            let lg = LinearGaussian::from_parts(head, tail, comps.remove(0));
            if lg.tail().is_empty() {
                ConditionalDistribution::Gaussian(lg)
            } else {
                ConditionalDistribution::LinearGaussian(lg)
            }
        } else if mix.tail().is_empty() {
            ConditionalDistribution::GaussianMix(mix)
        } else {
            ConditionalDistribution::LinearGaussianMix(mix)
        }
    }

    /// Re-labels a distribution with the narrowest variant able to represent it (e.g. a
    /// mixture whose discrete domain was summed out becomes a Gaussian).
    pub fn classify(self) -> Self {
        match self {
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => {
                Self::from_mixture(lg.into_mixture())
            },
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => {
                Self::from_mixture(m)
            },
            ConditionalDistribution::MultinomialSigmoid(s) | ConditionalDistribution::MultinomialSigmoidMix(s) => {
                if s.is_mixture() {
                    ConditionalDistribution::MultinomialSigmoidMix(s)
                } else {
                    ConditionalDistribution::MultinomialSigmoid(s)
                }
            },
            table => table
        }
    }

    /// Product of two distributions.
    pub fn combine(&self, other : &Self) -> Result<Self, CombinationError> {
        match (self, other) {
            (ConditionalDistribution::Table(a), ConditionalDistribution::Table(b)) => {
                Ok(ConditionalDistribution::Table(a.combine(b)?))
            },
            _ => {
                let a = self.to_mixture()?;
                let b = other.to_mixture()?;
                Ok(Self::from_mixture(a.combine(&b)?))
            }
        }
    }

    /// Quotient of two tables (zero where the divisor vanishes).
    pub fn divide(&self, other : &Self) -> Result<Self, CombinationError> {
        match (self, other) {
            (ConditionalDistribution::Table(a), ConditionalDistribution::Table(b)) => {
                Ok(ConditionalDistribution::Table(a.divide(b)?))
            },
            (ConditionalDistribution::Table(_), b) => Err(CombinationError::Unsupported(b.name().to_string())),
            (a, _) => Err(CombinationError::Unsupported(a.name().to_string()))
        }
    }

    pub fn marginalize(&self, dim : &Dim) -> Result<Self, CombinationError> {
        match self {
            ConditionalDistribution::Table(t) => Ok(ConditionalDistribution::Table(t.marginalize(dim)?)),
            _ => Ok(Self::from_mixture(self.to_mixture()?.marginalize(dim)?))
        }
    }

    pub fn marginalize_all(&self, dims : &[Dim]) -> Result<Self, CombinationError> {
        match self {
            ConditionalDistribution::Table(t) => Ok(ConditionalDistribution::Table(t.marginalize_all(dims)?)),
            _ => Ok(Self::from_mixture(self.to_mixture()?.marginalize_all(dims)?))
        }
    }

    /// The distribution of the informed dimensions conditional on the remaining ones, such
    /// that marginalize_all(dims).combine(complement(dims)) recovers the distribution.
    pub fn complement(&self, dims : &[Dim]) -> Result<Self, CombinationError> {
        match self {
            ConditionalDistribution::Table(t) => Ok(ConditionalDistribution::Table(t.complement(dims)?)),
            _ => Ok(Self::from_mixture(self.to_mixture()?.complement(dims)?))
        }
    }

    pub fn extend(&self, ext : Extension) -> Result<Self, CombinationError> {
        match (self, ext) {
            (ConditionalDistribution::Table(t), Extension::Discrete(d, n)) => {
                Ok(ConditionalDistribution::Table(t.extend(d, n)?))
            },
            (_, Extension::Discrete(d, n)) => {
                Ok(Self::from_mixture(self.to_mixture()?.extend_discrete(d, n)?))
            },
            (_, Extension::Tail(d)) => {
                Ok(Self::from_mixture(self.to_mixture()?.extend_tail(d)?))
            }
        }
    }

    /// Makes tables sum to one over their last dimension for every parent configuration.
    pub fn normalize(&mut self) {
        if let ConditionalDistribution::Table(t) = self {
            t.normalize_conditional();
        }
    }

    /// Probability (or density) of a realization. The closure returns the value of each
    /// dimension of the domain.
    pub fn probability<F>(&self, value : F) -> Result<f64, EvaluationError>
    where
        F : Fn(&Dim) -> Option<Value>
    {
        match self {
            ConditionalDistribution::Table(t) => {
                let states = states_of(t.domain().dims(), t.domain().cards(), &value)?;
                Ok(t.prob(&states[..]))
            },
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => {
                let x = reals_of(lg.head(), &value)?;
                let t = reals_of(lg.tail(), &value)?;
                lg.component().density(&x, &t)
            },
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => {
                let states = states_of(m.discrete().dims(), m.discrete().cards(), &value)?;
                let x = reals_of(m.head(), &value)?;
                let t = reals_of(m.tail(), &value)?;
                m.density(&states[..], &x, &t)
            },
            ConditionalDistribution::MultinomialSigmoid(s) | ConditionalDistribution::MultinomialSigmoidMix(s) => {
                let sw = states_of(s.switch().dims(), s.switch().cards(), &value)?;
                let child = states_of(&[s.child()], &[s.states()], &value)?;
                let t = reals_of(s.tail(), &value)?;
                Ok(s.probabilities(&sw[..], &t)[child[0]])
            }
        }
    }

    pub fn log_probability<F>(&self, value : F) -> Result<f64, EvaluationError>
    where
        F : Fn(&Dim) -> Option<Value>
    {
        match self {
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => {
                let x = reals_of(lg.head(), &value)?;
                let t = reals_of(lg.tail(), &value)?;
                lg.component().log_density(&x, &t)
            },
            _ => self.probability(value).map(|p| p.ln() )
        }
    }

    /// Draws the child conditional on the parent values returned by the closure.
    pub fn sample<R, F>(&self, rng : &mut R, value : F) -> Result<Value, EvaluationError>
    where
        R : Rng,
        F : Fn(&Dim) -> Option<Value>
    {
        let fam = self.family().ok_or_else(|| EvaluationError::Unsupported(self.name().to_string()) )?;
        match self {
            ConditionalDistribution::Table(t) => {
                let parents = states_of(fam.switch.dims(), fam.switch.cards(), &value)?;
                let dist = WeightedIndex::new(t.row(&parents[..]).iter())
                    .map_err(|_| EvaluationError::Degenerate )?;
                Ok(Value::State(rng.sample(dist)))
            },
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => {
                let t = reals_of(lg.tail(), &value)?;
                Ok(Value::Real(lg.component().sample(rng, &t)[0]))
            },
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => {
                let sw = states_of(fam.switch.dims(), fam.switch.cards(), &value)?;
                let t = reals_of(m.tail(), &value)?;
                Ok(Value::Real(m.component(&sw[..]).sample(rng, &t)[0]))
            },
            ConditionalDistribution::MultinomialSigmoid(s) | ConditionalDistribution::MultinomialSigmoidMix(s) => {
                let sw = states_of(fam.switch.dims(), fam.switch.cards(), &value)?;
                let t = reals_of(s.tail(), &value)?;
                Ok(Value::State(s.sample(rng, &sw[..], &t)?))
            }
        }
    }

}

impl Display for ConditionalDistribution {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionalDistribution::Table(t) => Display::fmt(t, f),
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => Display::fmt(lg, f),
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => Display::fmt(m, f),
            ConditionalDistribution::MultinomialSigmoid(s) | ConditionalDistribution::MultinomialSigmoidMix(s) => Display::fmt(s, f)
        }
    }

}

#[test]
fn factory_follows_parent_types() {
    let child = Dim::new(2, 0);
    let switch = DiscreteDomain::new(vec![Dim::new(0, 0)], vec![2]).unwrap();
    let fam = |switch : DiscreteDomain, states, tail| Family { switch, child, states, tail };
    assert_eq!(ConditionalDistribution::for_family(fam(switch.clone(), Some(3), vec![])).name(), "Table");
    assert_eq!(ConditionalDistribution::for_family(fam(DiscreteDomain::empty(), None, vec![])).name(), "Gaussian");
    assert_eq!(ConditionalDistribution::for_family(fam(DiscreteDomain::empty(), None, vec![Dim::new(1, 0)])).name(), "LinearGaussian");
    assert_eq!(ConditionalDistribution::for_family(fam(switch.clone(), None, vec![])).name(), "GaussianMix");
    assert_eq!(ConditionalDistribution::for_family(fam(switch.clone(), None, vec![Dim::new(1, 0)])).name(), "LinearGaussianMix");
    assert_eq!(ConditionalDistribution::for_family(fam(DiscreteDomain::empty(), Some(2), vec![Dim::new(1, 0)])).name(), "MultinomialSigmoid");
    assert_eq!(ConditionalDistribution::for_family(fam(switch, Some(2), vec![Dim::new(1, 0)])).name(), "MultinomialSigmoidMix");
}

#[test]
fn family_round_trips_through_factory() {
    let fam = Family {
        switch : DiscreteDomain::new(vec![Dim::new(0, -1)], vec![3]).unwrap(),
        child : Dim::new(1, 0),
        states : None,
        tail : vec![Dim::new(2, 0)]
    };
    let cpd = ConditionalDistribution::for_family(fam.clone());
    assert_eq!(cpd.family(), Some(fam));
}

#[test]
fn extension_codes() {
    let d = Dim::new(0, 0);
    assert_eq!(Extension::from_code(d, -1), Some(Extension::Tail(d)));
    assert_eq!(Extension::from_code(d, 3), Some(Extension::Discrete(d, 3)));
    assert_eq!(Extension::from_code(d, 0), None);
}

#[test]
fn classification_narrows_variants() {
    let lg = LinearGaussian::standard(Dim::new(0, 0), Vec::new());
    assert_eq!(ConditionalDistribution::LinearGaussian(lg).classify().name(), "Gaussian");
    let mix = LinearGaussianMix::standard(DiscreteDomain::empty(), Dim::new(0, 0), vec![Dim::new(1, 0)]);
    assert_eq!(ConditionalDistribution::GaussianMix(mix).classify().name(), "LinearGaussian");
}

#[test]
fn normalize_makes_rows_conditional() {
    let dom = DiscreteDomain::new(vec![Dim::new(0, 0), Dim::new(1, 0)], vec![2, 2]).unwrap();
    let t = Table::new(dom, nalgebra::DVector::from_vec(vec![1., 3., 0., 0.])).unwrap();
    let mut cpd = ConditionalDistribution::Table(t);
    cpd.normalize();
    match cpd {
        ConditionalDistribution::Table(t) => {
            assert_eq!(t.row(&[0]), &[0.25, 0.75]);
            assert_eq!(t.row(&[1]), &[0.5, 0.5]);
        },
        other => panic!("Expected Table, found {}", other)
    }
}
