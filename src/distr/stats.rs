use nalgebra::{DVector, DMatrix};
use super::*;
use super::sigmoid::{augment, softmax};
use thiserror::Error;

/// Variances estimated below this value are clamped to it.
pub const MIN_VARIANCE : f64 = 1e-6;

const SOFTMAX_STEPS : usize = 100;

const SOFTMAX_RATE : f64 = 0.5;

const SOFTMAX_RIDGE : f64 = 1e-3;

#[derive(Debug, Clone, Error)]
pub enum EstimationError {

    #[error("Factor does not carry dimension {0}")]
    MissingDim(Dim),

    #[error("Statistics do not match the layout of distribution {0}")]
    Layout(String),

    #[error("Normal equations are singular")]
    Singular

}

/// Weighted second-order moments of z = [tail; 1] and the child x, for one configuration
/// of the discrete parents.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionStats {

    pub weight : f64,

    pub szz : DMatrix<f64>,

    pub sxz : DVector<f64>,

    pub sxx : f64

}

impl RegressionStats {

    fn new(n_tail : usize) -> Self {
        Self {
            weight : 0.,
            szz : DMatrix::zeros(n_tail + 1, n_tail + 1),
            sxz : DVector::zeros(n_tail + 1),
            sxx : 0.
        }
    }

    /// Adds the expected moments of a Gaussian over [tail; child] with the informed mean and
    /// covariance, weighted by w.
    fn add(&mut self, w : f64, mean : &DVector<f64>, cov : &DMatrix<f64>) {
        let t = mean.nrows() - 1;
        let mut mz = DVector::from_element(t + 1, 1.);
        mz.rows_mut(0, t).copy_from(&mean.rows(0, t));
        let mut czz = DMatrix::zeros(t + 1, t + 1);
        czz.slice_mut((0, 0), (t, t)).copy_from(&cov.slice((0, 0), (t, t)));
        let mut cxz = DVector::zeros(t + 1);
        cxz.rows_mut(0, t).copy_from(&cov.slice((t, 0), (1, t)).transpose());
        let mx = mean[t];
        self.weight += w;
        self.szz += w * (czz + &mz * mz.transpose());
        self.sxz += w * (cxz + mx * &mz);
        self.sxx += w * (cov[(t, t)] + mx * mx);
    }

    /// Least-squares regression of x on z: returns the fitted component and the new variance.
    fn solve(&self) -> Result<Component, EstimationError> {
        let inv = invert_scale(&self.szz).map_err(|_| EstimationError::Singular )?;
        let beta = inv * &self.sxz;
        let t = beta.nrows() - 1;
        let var = ((self.sxx - beta.dot(&self.sxz)) / self.weight).max(MIN_VARIANCE);
        Ok(Component {
            intercept : DVector::from_element(1, beta[t]),
            coef : DMatrix::from_iterator(1, t, beta.rows(0, t).iter().cloned()),
            cov : DMatrix::from_element(1, 1, var)
        })
    }

}

/// A single expected observation of a discrete child given continuous parents.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxSample {

    pub z : DVector<f64>,

    pub state : usize,

    pub weight : f64

}

/// Expected sufficient statistics for one conditional distribution, accumulated over trials
/// (E-step) and consumed by update (M-step). The layout follows the distribution's own
/// (relative-time) domain.
#[derive(Debug, Clone, PartialEq)]
pub enum SufficientStatistics {

    /// Expected counts over the family domain (parents, then child).
    Counts(Table),

    /// Regression moments per configuration of the discrete parents.
    Regression(Vec<RegressionStats>),

    /// Expected observations per configuration of the discrete parents.
    Softmax(Vec<Vec<SoftmaxSample>>)

}

impl SufficientStatistics {

    /// Empty statistics shaped after the informed distribution.
    pub fn for_distribution(cpd : &ConditionalDistribution) -> Self {
        match cpd {
            ConditionalDistribution::Table(t) => {
                SufficientStatistics::Counts(Table::constant(t.domain().clone(), 0.))
            },
            ConditionalDistribution::MultinomialSigmoid(s) | ConditionalDistribution::MultinomialSigmoidMix(s) => {
                SufficientStatistics::Softmax(vec![Vec::new(); s.switch().size()])
            },
            ConditionalDistribution::Gaussian(lg) | ConditionalDistribution::LinearGaussian(lg) => {
                SufficientStatistics::Regression(vec![RegressionStats::new(lg.tail().len())])
            },
            ConditionalDistribution::GaussianMix(m) | ConditionalDistribution::LinearGaussianMix(m) => {
                let n = m.components().len();
                SufficientStatistics::Regression((0..n).map(|_| RegressionStats::new(m.tail().len()) ).collect())
            }
        }
    }

    pub fn reset(&mut self) {
        match self {
            SufficientStatistics::Counts(t) => {
                *t = Table::constant(t.domain().clone(), 0.);
            },
            SufficientStatistics::Regression(stats) => {
                for s in stats.iter_mut() {
                    *s = RegressionStats::new(s.sxz.nrows() - 1);
                }
            },
            SufficientStatistics::Softmax(samples) => {
                samples.iter_mut().for_each(|s| s.clear() );
            }
        }
    }

    /// Total weight accumulated so far.
    pub fn weight(&self) -> f64 {
        match self {
            SufficientStatistics::Counts(t) => t.sum(),
            SufficientStatistics::Regression(stats) => stats.iter().map(|s| s.weight ).sum(),
            SufficientStatistics::Softmax(samples) => samples.iter().flatten().map(|s| s.weight ).sum()
        }
    }

    /// Accumulates a joint distribution (moment form: empty tail) over the family of a
    /// variable. The family is informed at the absolute time of the joint.
    pub fn accumulate(&mut self, family : &Family, joint : &LinearGaussianMix) -> Result<(), EstimationError> {
        let dom = joint.discrete();
        let switch_pos = family.switch.dims().iter()
            .map(|d| dom.position(d).ok_or(EstimationError::MissingDim(*d)) )
            .collect::<Result<Vec<_>, _>>()?;
        let head_pos = |d : &Dim| joint.head().iter().position(|h| h == d ).ok_or(EstimationError::MissingDim(*d)) ;
        match self {
            SufficientStatistics::Counts(counts) => {
                let child_pos = dom.position(&family.child).ok_or(EstimationError::MissingDim(family.child))?;
                let mut states = vec![0; switch_pos.len() + 1];
                for (ix, conf) in dom.configurations().enumerate() {
                    let w = joint.weights().prob_at(ix);
                    if w <= 0. {
                        continue;
                    }
                    for (s, p) in states.iter_mut().zip(switch_pos.iter()) {
                        *s = conf[*p];
                    }
                    states[switch_pos.len()] = conf[child_pos];
                    let prev = counts.prob(&states[..]);
                    counts.set_prob(&states[..], prev + w);
                }
            },
            SufficientStatistics::Regression(stats) => {
                let mut pos = family.tail.iter().map(|d| head_pos(d) ).collect::<Result<Vec<_>, _>>()?;
                pos.push(head_pos(&family.child)?);
                for (ix, conf) in dom.configurations().enumerate() {
                    let w = joint.weights().prob_at(ix);
                    if w <= 0. {
                        continue;
                    }
                    let sw : Vec<usize> = switch_pos.iter().map(|p| conf[*p] ).collect();
                    let comp = &joint.components()[ix];
                    let mean = comp.intercept.select_rows(pos.iter());
                    let cov = comp.cov.select_rows(pos.iter()).select_columns(pos.iter());
                    stats[family.switch.index(&sw[..])].add(w, &mean, &cov);
                }
            },
            SufficientStatistics::Softmax(samples) => {
                let child_pos = dom.position(&family.child).ok_or(EstimationError::MissingDim(family.child))?;
                let pos = family.tail.iter().map(|d| head_pos(d) ).collect::<Result<Vec<_>, _>>()?;
                for (ix, conf) in dom.configurations().enumerate() {
                    let w = joint.weights().prob_at(ix);
                    if w <= 0. {
                        continue;
                    }
                    let sw : Vec<usize> = switch_pos.iter().map(|p| conf[*p] ).collect();
                    let x = joint.components()[ix].intercept.select_rows(pos.iter());
                    samples[family.switch.index(&sw[..])].push(SoftmaxSample { z : augment(&x), state : conf[child_pos], weight : w });
                }
            }
        }
        Ok(())
    }

    /// Re-estimates the parameters of the distribution from the accumulated statistics
    /// (maximum likelihood), returning the largest absolute parameter change. Configurations
    /// that received no weight keep their current parameters.
    pub fn update(&self, cpd : &mut ConditionalDistribution) -> Result<f64, EstimationError> {
        let layout_err = |cpd : &ConditionalDistribution| EstimationError::Layout(format!("{}", cpd)) ;
        match (self, cpd) {
            (SufficientStatistics::Counts(counts), ConditionalDistribution::Table(table)) => {
                update_table(counts, table)
            },
            (SufficientStatistics::Regression(stats), ConditionalDistribution::Gaussian(lg)) |
            (SufficientStatistics::Regression(stats), ConditionalDistribution::LinearGaussian(lg)) => {
                if stats.len() != 1 {
                    return Err(EstimationError::Layout(format!("{}", lg)));
                }
                update_component(&stats[0], lg.component_mut())
            },
            (SufficientStatistics::Regression(stats), ConditionalDistribution::GaussianMix(mix)) |
            (SufficientStatistics::Regression(stats), ConditionalDistribution::LinearGaussianMix(mix)) => {
                if stats.len() != mix.components().len() {
                    return Err(EstimationError::Layout(format!("{}", mix)));
                }
                let mut delta : f64 = 0.;
                for (s, c) in stats.iter().zip(mix.components_mut().iter_mut()) {
                    delta = delta.max(update_component(s, c)?);
                }
                Ok(delta)
            },
            (SufficientStatistics::Softmax(samples), ConditionalDistribution::MultinomialSigmoid(sig)) |
            (SufficientStatistics::Softmax(samples), ConditionalDistribution::MultinomialSigmoidMix(sig)) => {
                if samples.len() != sig.switch().size() {
                    return Err(EstimationError::Layout(format!("{}", sig)));
                }
                let mut delta : f64 = 0.;
                for (ix, s) in samples.iter().enumerate() {
                    delta = delta.max(update_softmax(s, sig.weights_at_mut(ix)));
                }
                Ok(delta)
            },
            (_, cpd) => Err(layout_err(cpd))
        }
    }

}

fn update_table(counts : &Table, table : &mut Table) -> Result<f64, EstimationError> {
    if counts.domain() != table.domain() {
        return Err(EstimationError::Layout(format!("{}", table)));
    }
    let n = table.domain().cards().last().cloned().unwrap_or(1);
    let mut delta : f64 = 0.;
    let mut probs = table.probs().clone();
    for (row, count) in probs.as_mut_slice().chunks_mut(n).zip(counts.probs().as_slice().chunks(n)) {
        let total : f64 = count.iter().sum();
        if total <= EPSILON {
            continue;
        }
        for (p, c) in row.iter_mut().zip(count.iter()) {
            let new = c / total;
            delta = delta.max((new - *p).abs());
            *p = new;
        }
    }
    let updated = Table::new(table.domain().clone(), probs)
        .map_err(|e| EstimationError::Layout(e.to_string()) )?;
    *table = updated;
    Ok(delta)
}

fn update_component(stats : &RegressionStats, comp : &mut Component) -> Result<f64, EstimationError> {
    if stats.weight <= EPSILON {
        return Ok(0.);
    }
    let new = stats.solve()?;
    let delta = new.distance(comp);
    *comp = new;
    Ok(delta)
}

/// Regularized gradient ascent on the expected log-likelihood of a softmax regression.
fn update_softmax(samples : &[SoftmaxSample], w : &mut DMatrix<f64>) -> f64 {
    let total : f64 = samples.iter().map(|s| s.weight ).sum();
    if total <= EPSILON {
        return 0.;
    }
    let old = w.clone();
    for _ in 0..SOFTMAX_STEPS {
        let mut grad = -SOFTMAX_RIDGE * &*w;
        for s in samples.iter() {
            let mut err = -softmax(&(&*w * &s.z));
            err[s.state] += 1.;
            grad += s.weight * err * s.z.transpose();
        }
        *w += (SOFTMAX_RATE / total) * grad;
    }
    (&*w - old).amax()
}

#[test]
fn regression_recovers_line() {
    // x = 1 + 2 t, observed exactly at t = 0, 1, 2 (plus noise of variance 0.5 around each point)
    let mut stats = RegressionStats::new(1);
    for t in 0..3 {
        let mean = DVector::from_vec(vec![t as f64, 1. + 2. * t as f64]);
        let cov = DMatrix::from_row_slice(2, 2, &[0., 0., 0., 0.5]);
        stats.add(1., &mean, &cov);
    }
    let comp = stats.solve().unwrap();
    assert!((comp.intercept[0] - 1.).abs() < 1e-9);
    assert!((comp.coef[(0, 0)] - 2.).abs() < 1e-9);
    assert!((comp.cov[(0, 0)] - 0.5).abs() < 1e-9);
}

#[test]
fn softmax_moves_toward_observed_state() {
    let mut w = DMatrix::zeros(2, 1);
    let samples = vec![
        SoftmaxSample { z : DVector::from_element(1, 1.), state : 1, weight : 3. },
        SoftmaxSample { z : DVector::from_element(1, 1.), state : 0, weight : 1. }
    ];
    let delta = update_softmax(&samples[..], &mut w);
    assert!(delta > 0.);
    let p = softmax(&(&w * DVector::from_element(1, 1.)));
    assert!((p[1] - 0.75).abs() < 0.05);
}
