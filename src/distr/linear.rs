use nalgebra::{DVector, DMatrix, Cholesky};
use super::*;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::fmt::{self, Display};
use rand::Rng;

/// Parameters of a single linear-Gaussian regression x_head = intercept + coef * x_tail + e,
/// with e ~ N(0, cov). The intercept has one entry per head dimension; coef has one row
/// per head dimension and one column per tail dimension; cov is square over the head.
/// A component with an empty tail is a plain (multivariate) normal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {

    pub intercept : DVector<f64>,

    pub coef : DMatrix<f64>,

    pub cov : DMatrix<f64>

}

impl Component {

    /// Fails unless coef has one row and cov one row and column per intercept entry.
    pub fn new(intercept : DVector<f64>, coef : DMatrix<f64>, cov : DMatrix<f64>) -> Result<Self, CombinationError> {
        let n = intercept.nrows();
        if coef.nrows() != n {
            return Err(CombinationError::Shape { expected : n, found : coef.nrows() });
        }
        if cov.nrows() != n || cov.ncols() != n {
            return Err(CombinationError::Shape { expected : n * n, found : cov.nrows() * cov.ncols() });
        }
        Ok(Self { intercept, coef, cov })
    }

    /// Zero intercept and coefficients, identity covariance.
    pub fn standard(n_head : usize, n_tail : usize) -> Self {
        Self {
            intercept : DVector::zeros(n_head),
            coef : DMatrix::zeros(n_head, n_tail),
            cov : DMatrix::identity(n_head, n_head)
        }
    }

    /// Scalar normal with the informed mean and variance.
    pub fn univariate(mean : f64, var : f64) -> Self {
        Self {
            intercept : DVector::from_element(1, mean),
            coef : DMatrix::zeros(1, 0),
            cov : DMatrix::from_element(1, 1, var)
        }
    }

    pub fn n_head(&self) -> usize {
        self.intercept.nrows()
    }

    pub fn n_tail(&self) -> usize {
        self.coef.ncols()
    }

    /// Expected value of the head conditional on the tail realization.
    pub fn mean_given(&self, tail : &DVector<f64>) -> DVector<f64> {
        if self.n_tail() == 0 {
            self.intercept.clone()
        } else {
            &self.intercept + &self.coef * tail
        }
    }

    pub fn log_density(&self, x : &DVector<f64>, tail : &DVector<f64>) -> Result<f64, EvaluationError> {
        let err = x - self.mean_given(tail);
        let chol = Cholesky::new(self.cov.clone()).ok_or(EvaluationError::Singular)?;
        let l = chol.l();
        let log_det : f64 = l.diagonal().iter().map(|d| 2. * d.ln() ).sum();
        let z = chol.solve(&err);
        let k = x.nrows() as f64;
        Ok(-0.5 * (k * (2. * PI).ln() + log_det + err.dot(&z)))
    }

    pub fn density(&self, x : &DVector<f64>, tail : &DVector<f64>) -> Result<f64, EvaluationError> {
        self.log_density(x, tail).map(|lp| lp.exp() )
    }

    /// Draws a head realization conditional on the tail realization. Covariances that are
    /// not positive-definite (e.g. point masses) fall back to their clamped diagonal.
    pub fn sample<R>(&self, rng : &mut R, tail : &DVector<f64>) -> DVector<f64>
    where
        R : Rng
    {
        let n = self.n_head();
        let e = DVector::from_fn(n, |_, _| rng.sample::<f64, _>(rand_distr::StandardNormal) );
        let noise = match Cholesky::new(self.cov.clone()) {
            Some(chol) => chol.l() * e,
            None => self.cov.diagonal().map(|v| v.max(0.).sqrt() ).component_mul(&e)
        };
        self.mean_given(tail) + noise
    }

    pub(crate) fn remove_head(&self, ix : usize) -> Self {
        Self {
            intercept : self.intercept.clone().remove_row(ix),
            coef : self.coef.clone().remove_row(ix),
            cov : self.cov.clone().remove_row(ix).remove_column(ix)
        }
    }

    pub(crate) fn remove_tail(&self, ix : usize) -> Self {
        Self {
            intercept : self.intercept.clone(),
            coef : self.coef.clone().remove_column(ix),
            cov : self.cov.clone()
        }
    }

    pub(crate) fn push_tail(&self) -> Self {
        let nc = self.coef.ncols();
        Self {
            intercept : self.intercept.clone(),
            coef : self.coef.clone().insert_column(nc, 0.),
            cov : self.cov.clone()
        }
    }

    /// Gaussian conditioning. Splits the head into the kept rows (returned as the new head)
    /// and the conditioning rows, which are appended to the end of the tail. For a
    /// partition (r, s) of the head: K = cov_rs cov_ss^-1; the conditional has intercept
    /// b_r - K b_s, tail coefficients [A_r - K A_s, K] and covariance cov_rr - K cov_sr.
    pub(crate) fn condition(&self, keep : &[usize], given : &[usize]) -> Result<Self, CombinationError> {
        let b_r = self.intercept.select_rows(keep.iter());
        let b_s = self.intercept.select_rows(given.iter());
        let a_r = self.coef.select_rows(keep.iter());
        let a_s = self.coef.select_rows(given.iter());
        let cov_r = self.cov.select_rows(keep.iter());
        let cov_rr = cov_r.select_columns(keep.iter());
        let cov_rs = cov_r.select_columns(given.iter());
        let cov_ss = self.cov.select_rows(given.iter()).select_columns(given.iter());
        let cov_ss_inv = invert_scale(&cov_ss)?;
        let k = &cov_rs * cov_ss_inv;
        let intercept = b_r - &k * b_s;
        let coef_tail = a_r - &k * a_s;
        let mut coef = DMatrix::zeros(keep.len(), coef_tail.ncols() + given.len());
        coef.columns_mut(0, coef_tail.ncols()).copy_from(&coef_tail);
        coef.columns_mut(coef_tail.ncols(), given.len()).copy_from(&k);
        let cov = cov_rr - &k * cov_rs.transpose();
        Ok(Self { intercept, coef, cov })
    }

    /// Largest absolute difference between the parameters of two components of the same shape.
    pub fn distance(&self, other : &Self) -> f64 {
        let di = (&self.intercept - &other.intercept).amax();
        let dc = if self.coef.len() > 0 { (&self.coef - &other.coef).amax() } else { 0.0 };
        let dv = (&self.cov - &other.cov).amax();
        di.max(dc).max(dv)
    }

}

/// Inverts a (possibly semi-definite) scale matrix, falling back to the pseudo-inverse
/// when the matrix is singular.
pub fn invert_scale(s : &DMatrix<f64>) -> Result<DMatrix<f64>, CombinationError> {
    if s.nrows() == 0 {
        return Ok(s.clone());
    }
    match s.clone().try_inverse() {
        Some(inv) => Ok(inv),
        None => s.clone().pseudo_inverse(EPSILON).map_err(|_| CombinationError::Singular )
    }
}

/// Continuous distribution without discrete dependencies: a normal over its head
/// dimensions whose mean is a linear function of the tail dimensions. With an
/// empty tail, this is the distribution held by the Gaussian variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearGaussian {

    head : Vec<Dim>,

    tail : Vec<Dim>,

    comp : Component

}

impl LinearGaussian {

    pub fn new(head : Vec<Dim>, tail : Vec<Dim>, comp : Component) -> Result<Self, CombinationError> {
        if comp.n_head() != head.len() {
            return Err(CombinationError::Shape { expected : head.len(), found : comp.n_head() });
        }
        if comp.n_tail() != tail.len() {
            return Err(CombinationError::Shape { expected : tail.len(), found : comp.n_tail() });
        }
        Ok(Self { head, tail, comp })
    }

    pub(crate) fn from_parts(head : Vec<Dim>, tail : Vec<Dim>, comp : Component) -> Self {
        Self { head, tail, comp }
    }

    /// Standard normal for a single child, with zero coefficients on the tail.
    pub fn standard(child : Dim, tail : Vec<Dim>) -> Self {
        let comp = Component::standard(1, tail.len());
        Self { head : vec![child], tail, comp }
    }

    pub fn head(&self) -> &[Dim] {
        &self.head[..]
    }

    pub fn tail(&self) -> &[Dim] {
        &self.tail[..]
    }

    pub fn component(&self) -> &Component {
        &self.comp
    }

    pub fn component_mut(&mut self) -> &mut Component {
        &mut self.comp
    }

    pub fn shifted(&self, by : i32) -> Self {
        Self {
            head : self.head.iter().map(|d| d.shifted(by) ).collect(),
            tail : self.tail.iter().map(|d| d.shifted(by) ).collect(),
            comp : self.comp.clone()
        }
    }

    /// One-component mixture over the empty discrete domain.
    pub fn into_mixture(self) -> LinearGaussianMix {
        LinearGaussianMix::from_parts(Table::unit(), self.head, self.tail, vec![self.comp])
    }

}

impl Display for LinearGaussian {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinearGaussian({}|{})", self.head.len(), self.tail.len())
    }

}

#[test]
fn conditioning_bivariate() {
    // x0 ~ N(1, 2); x1 | x0 ~ N(0.5 x0, 1)
    // Joint cov: [[2, 1], [1, 1.5]]; mean [1, 0.5]
    let joint = Component::new(
        DVector::from_vec(vec![1.0, 0.5]),
        DMatrix::zeros(2, 0),
        DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 1.5])
    ).unwrap();
    let cond = joint.condition(&[1], &[0]).unwrap();
    assert!((cond.coef[(0, 0)] - 0.5).abs() < 1e-12);
    assert!(cond.intercept[0].abs() < 1e-12);
    assert!((cond.cov[(0, 0)] - 1.0).abs() < 1e-12);
}

#[test]
fn standard_density() {
    let comp = Component::univariate(0.0, 1.0);
    let d = comp.density(&DVector::from_element(1, 0.0), &DVector::zeros(0)).unwrap();
    assert!((d - 1. / (2. * PI).sqrt()).abs() < 1e-12);
}

#[test]
fn component_shapes_are_checked() {
    let bad_coef = Component::new(DVector::zeros(2), DMatrix::zeros(1, 3), DMatrix::identity(2, 2));
    assert!(matches!(bad_coef, Err(CombinationError::Shape { expected : 2, found : 1 })));
    assert!(Component::new(DVector::zeros(2), DMatrix::zeros(2, 3), DMatrix::identity(3, 3)).is_err());
    assert!(Component::new(DVector::zeros(2), DMatrix::zeros(2, 3), DMatrix::identity(2, 2)).is_ok());
}
