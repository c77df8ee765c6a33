use nalgebra::{DVector, DMatrix};
use super::*;
use serde::{Serialize, Deserialize};
use std::fmt::{self, Display};
use rand::Rng;
use rand::distributions::WeightedIndex;

/// Distribution of a discrete child with continuous parents: the state probabilities are the
/// softmax of a linear function of the continuous parents,
///
/// p(child = k | d, x) = exp(w_dk [x; 1]) / sum_j exp(w_dj [x; 1])
///
/// with one weight matrix (states x (tail + 1)) per configuration d of the discrete
/// parents (the "switch"). Without discrete parents, there is a single matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultinomialSigmoid {

    switch : DiscreteDomain,

    child : Dim,

    states : usize,

    tail : Vec<Dim>,

    weights : Vec<DMatrix<f64>>

}

impl MultinomialSigmoid {

    /// Zero weights (uniform state probabilities) for every switch configuration.
    pub fn new(switch : DiscreteDomain, child : Dim, states : usize, tail : Vec<Dim>) -> Self {
        let weights = (0..switch.size())
            .map(|_| DMatrix::zeros(states, tail.len() + 1) )
            .collect();
        Self { switch, child, states, tail, weights }
    }

    pub fn switch(&self) -> &DiscreteDomain {
        &self.switch
    }

    pub fn child(&self) -> Dim {
        self.child
    }

    pub fn states(&self) -> usize {
        self.states
    }

    pub fn tail(&self) -> &[Dim] {
        &self.tail[..]
    }

    pub fn weights(&self, switch : &[usize]) -> &DMatrix<f64> {
        &self.weights[self.switch.index(switch)]
    }

    pub fn set_weights(&mut self, switch : &[usize], w : DMatrix<f64>) -> Result<(), CombinationError> {
        if w.nrows() != self.states || w.ncols() != self.tail.len() + 1 {
            return Err(CombinationError::Shape { expected : self.states * (self.tail.len() + 1), found : w.len() });
        }
        let ix = self.switch.index(switch);
        self.weights[ix] = w;
        Ok(())
    }

    pub(crate) fn weights_at_mut(&mut self, index : usize) -> &mut DMatrix<f64> {
        &mut self.weights[index]
    }

    pub fn is_mixture(&self) -> bool {
        !self.switch.is_empty()
    }

    pub fn shifted(&self, by : i32) -> Self {
        Self {
            switch : self.switch.shifted(by),
            child : self.child.shifted(by),
            states : self.states,
            tail : self.tail.iter().map(|d| d.shifted(by) ).collect(),
            weights : self.weights.clone()
        }
    }

    /// State probabilities for the informed switch configuration and tail realization.
    pub fn probabilities(&self, switch : &[usize], tail : &DVector<f64>) -> DVector<f64> {
        let z = augment(tail);
        softmax(&(self.weights(switch) * z))
    }

    pub fn sample<R>(&self, rng : &mut R, switch : &[usize], tail : &DVector<f64>) -> Result<usize, EvaluationError>
    where
        R : Rng
    {
        let p = self.probabilities(switch, tail);
        let dist = WeightedIndex::new(p.iter()).map_err(|_| EvaluationError::Degenerate )?;
        Ok(rng.sample(dist))
    }

}

/// Appends the constant regressor to a realization of the continuous parents.
pub(crate) fn augment(x : &DVector<f64>) -> DVector<f64> {
    let n = x.nrows();
    x.clone().insert_row(n, 1.)
}

pub(crate) fn softmax(eta : &DVector<f64>) -> DVector<f64> {
    let m = eta.max();
    let e = eta.map(|v| (v - m).exp() );
    let s = e.sum();
    e.unscale(s)
}

impl Display for MultinomialSigmoid {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MultinomialSigmoid({:?}; {}|{})", self.switch.cards(), self.states, self.tail.len())
    }

}

#[test]
fn zero_weights_are_uniform() {
    let s = MultinomialSigmoid::new(DiscreteDomain::empty(), Dim::new(0, 0), 4, vec![Dim::new(1, 0)]);
    let p = s.probabilities(&[], &DVector::from_element(1, 3.0));
    assert!(p.iter().all(|v| (v - 0.25).abs() < 1e-12 ));
}

#[test]
fn softmax_is_shift_invariant() {
    let a = softmax(&DVector::from_vec(vec![1.0, 2.0, 3.0]));
    let b = softmax(&DVector::from_vec(vec![101.0, 102.0, 103.0]));
    assert!((a - b).amax() < 1e-12);
}
