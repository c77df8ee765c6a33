use nalgebra::DVector;
use super::*;
use serde::{Serialize, Deserialize};
use std::fmt::{self, Display};

/// The discrete part of a distribution domain: an ordered list of named dimensions, each
/// with its number of states. Configurations (one state per dimension) are laid out
/// row-major, with the last dimension varying fastest, so a configuration maps to
/// a single linear index into any table or component vector built over this domain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscreteDomain {

    dims : Vec<Dim>,

    cards : Vec<usize>

}

impl DiscreteDomain {

    /// Fails when the lengths differ or a dimension has no states.
    pub fn new(dims : Vec<Dim>, cards : Vec<usize>) -> Result<Self, CombinationError> {
        if dims.len() != cards.len() {
            return Err(CombinationError::Shape { expected : dims.len(), found : cards.len() });
        }
        if let Some(p) = cards.iter().position(|c| *c == 0 ) {
            return Err(CombinationError::NoStates(dims[p]));
        }
        Ok(Self { dims, cards })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims[..]
    }

    pub fn cards(&self) -> &[usize] {
        &self.cards[..]
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Number of configurations (one for the empty domain).
    pub fn size(&self) -> usize {
        self.cards.iter().product()
    }

    pub fn position(&self, dim : &Dim) -> Option<usize> {
        self.dims.iter().position(|d| d == dim )
    }

    pub fn contains(&self, dim : &Dim) -> bool {
        self.position(dim).is_some()
    }

    pub fn card_of(&self, dim : &Dim) -> Option<usize> {
        self.position(dim).map(|p| self.cards[p] )
    }

    pub fn index(&self, states : &[usize]) -> usize {
        debug_assert!(states.len() == self.cards.len());
        states.iter().zip(self.cards.iter())
            .fold(0, |ix, (s, c)| ix * c + s )
    }

    pub fn states(&self, mut index : usize) -> Vec<usize> {
        let mut states = vec![0; self.cards.len()];
        for (s, c) in states.iter_mut().zip(self.cards.iter()).rev() {
            *s = index % c;
            index /= c;
        }
        states
    }

    /// Iterates over all configurations in linear index order.
    pub fn configurations(&self) -> Configurations {
        Configurations { cards : self.cards.clone(), curr : Some(vec![0; self.cards.len()]) }
    }

    pub fn with(&self, dim : Dim, card : usize) -> Self {
        let mut out = self.clone();
        out.dims.push(dim);
        out.cards.push(card);
        out
    }

    pub fn without(&self, dim : &Dim) -> Self {
        let mut out = self.clone();
        if let Some(p) = self.position(dim) {
            out.dims.remove(p);
            out.cards.remove(p);
        }
        out
    }

    pub fn shifted(&self, by : i32) -> Self {
        Self { dims : self.dims.iter().map(|d| d.shifted(by) ).collect(), cards : self.cards.clone() }
    }

    /// Aligns two domains. The merged domain lists the left dimensions first, followed
    /// by the right dimensions absent from the left. Each merged dimension records where
    /// (if anywhere) it lives in each operand.
    pub fn merge(left : &Self, right : &Self) -> Result<(Self, Vec<DimMapping>), CombinationError> {
        let mut merged = left.clone();
        for (d, c) in right.dims.iter().zip(right.cards.iter()) {
            match left.card_of(d) {
                Some(lc) if lc != *c => {
                    return Err(CombinationError::CardinalityMismatch { dim : *d, left : lc, right : *c });
                },
                Some(_) => { },
                None => {
                    merged.dims.push(*d);
                    merged.cards.push(*c);
                }
            }
        }
        let maps = merged.dims.iter().zip(merged.cards.iter())
            .map(|(d, c)| DimMapping { dim : *d, card : *c, left : left.position(d), right : right.position(d) })
            .collect();
        Ok((merged, maps))
    }

}

/// Records, for one dimension of a merged domain, which dimension index it came from
/// in each of the two operands (None when the operand does not carry it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimMapping {

    pub dim : Dim,

    pub card : usize,

    pub left : Option<usize>,

    pub right : Option<usize>

}

impl DimMapping {

    /// Projects a merged configuration into the left (or right) operand configuration.
    pub fn project(maps : &[DimMapping], merged : &[usize], n_dims : usize, left : bool) -> Vec<usize> {
        let mut states = vec![0; n_dims];
        for (m, s) in maps.iter().zip(merged.iter()) {
            let src = if left { m.left } else { m.right };
            if let Some(ix) = src {
                states[ix] = *s;
            }
        }
        states
    }

}

/// Odometer over the configurations of a discrete domain.
pub struct Configurations {

    cards : Vec<usize>,

    curr : Option<Vec<usize>>

}

impl Iterator for Configurations {

    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let out = self.curr.take()?;
        let mut next = out.clone();
        let mut carry = true;
        for (s, c) in next.iter_mut().zip(self.cards.iter()).rev() {
            *s += 1;
            if *s < *c {
                carry = false;
                break;
            }
            *s = 0;
        }
        if !carry {
            self.curr = Some(next);
        }
        Some(out)
    }

}

/// Discrete potential (or conditional probability table) over a named discrete domain.
/// When used as the distribution of a discrete variable, the child is the last dimension
/// and the table sums to one over it for every configuration of the preceding (parent)
/// dimensions. When used as an intermediate result of the algebra (a product or a
/// marginal of several tables), no normalization is implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {

    domain : DiscreteDomain,

    probs : DVector<f64>

}

impl Table {

    pub fn new(domain : DiscreteDomain, probs : DVector<f64>) -> Result<Self, CombinationError> {
        if probs.nrows() != domain.size() {
            return Err(CombinationError::Shape { expected : domain.size(), found : probs.nrows() });
        }
        Ok(Self { domain, probs })
    }

    /// Table with every entry at the informed value.
    pub fn constant(domain : DiscreteDomain, value : f64) -> Self {
        let probs = DVector::from_element(domain.size(), value);
        Self { domain, probs }
    }

    /// The neutral element of combine(.): a scalar one over the empty domain.
    pub fn unit() -> Self {
        Self::constant(DiscreteDomain::empty(), 1.)
    }

    /// Conditional table that is uniform over its last dimension.
    pub fn uniform_conditional(domain : DiscreteDomain) -> Self {
        let n = domain.cards().last().cloned().unwrap_or(1);
        Self::constant(domain, 1. / n as f64)
    }

    pub fn domain(&self) -> &DiscreteDomain {
        &self.domain
    }

    pub fn probs(&self) -> &DVector<f64> {
        &self.probs
    }

    pub fn prob(&self, states : &[usize]) -> f64 {
        self.probs[self.domain.index(states)]
    }

    pub fn prob_at(&self, index : usize) -> f64 {
        self.probs[index]
    }

    pub fn set_prob(&mut self, states : &[usize], p : f64) {
        let ix = self.domain.index(states);
        self.probs[ix] = p;
    }

    pub fn sum(&self) -> f64 {
        self.probs.sum()
    }

    pub fn shifted(&self, by : i32) -> Self {
        Self { domain : self.domain.shifted(by), probs : self.probs.clone() }
    }

    fn pointwise<F>(&self, other : &Self, op : F) -> Result<Self, CombinationError>
    where
        F : Fn(f64, f64) -> f64
    {
        let (merged, maps) = DiscreteDomain::merge(&self.domain, &other.domain)?;
        let mut probs = DVector::zeros(merged.size());
        for (ix, states) in merged.configurations().enumerate() {
            let a = DimMapping::project(&maps[..], &states[..], self.domain.len(), true);
            let b = DimMapping::project(&maps[..], &states[..], other.domain.len(), false);
            probs[ix] = op(self.prob(&a[..]), other.prob(&b[..]));
        }
        Ok(Self { domain : merged, probs })
    }

    /// Pointwise product over the union of both domains.
    pub fn combine(&self, other : &Self) -> Result<Self, CombinationError> {
        self.pointwise(other, |a, b| a * b )
    }

    /// Pointwise division over the union of both domains. Entries where the divisor is
    /// below EPSILON are set to zero.
    pub fn divide(&self, other : &Self) -> Result<Self, CombinationError> {
        self.pointwise(other, |a, b| if b.abs() < EPSILON { 0.0 } else { a / b } )
    }

    /// Sums the informed dimension out.
    pub fn marginalize(&self, dim : &Dim) -> Result<Self, CombinationError> {
        let pos = self.domain.position(dim).ok_or(CombinationError::UnknownDim(*dim))?;
        let domain = self.domain.without(dim);
        let mut probs = DVector::zeros(domain.size());
        for (ix, mut states) in self.domain.configurations().enumerate() {
            states.remove(pos);
            probs[domain.index(&states[..])] += self.probs[ix];
        }
        Ok(Self { domain, probs })
    }

    pub fn marginalize_all(&self, dims : &[Dim]) -> Result<Self, CombinationError> {
        let mut out = self.clone();
        for d in dims {
            out = out.marginalize(d)?;
        }
        Ok(out)
    }

    /// Marginal over the informed dimensions, laid out in the informed order.
    pub fn project(&self, dims : &[Dim]) -> Result<Self, CombinationError> {
        let others : Vec<Dim> = self.domain.dims().iter()
            .filter(|d| !dims.contains(d) )
            .cloned()
            .collect();
        let marg = self.marginalize_all(&others[..])?;
        marg.reorder(dims)
    }

    /// Re-lays the table over a permutation of its own dimensions.
    pub fn reorder(&self, dims : &[Dim]) -> Result<Self, CombinationError> {
        if dims.len() != self.domain.len() {
            return Err(CombinationError::Shape { expected : self.domain.len(), found : dims.len() });
        }
        let mut cards = Vec::with_capacity(dims.len());
        let mut src_pos = Vec::with_capacity(dims.len());
        for d in dims {
            let p = self.domain.position(d).ok_or(CombinationError::UnknownDim(*d))?;
            src_pos.push(p);
            cards.push(self.domain.cards()[p]);
        }
        let domain = DiscreteDomain { dims : dims.to_vec(), cards };
        let mut probs = DVector::zeros(domain.size());
        let mut src = vec![0; dims.len()];
        for (ix, states) in domain.configurations().enumerate() {
            for (s, p) in states.iter().zip(src_pos.iter()) {
                src[*p] = *s;
            }
            probs[ix] = self.prob(&src[..]);
        }
        Ok(Self { domain, probs })
    }

    /// Returns the table conditional on all dimensions except the informed ones:
    /// self / marginal(self, dims).
    pub fn complement(&self, dims : &[Dim]) -> Result<Self, CombinationError> {
        let marg = self.marginalize_all(dims)?;
        let cond = self.divide(&marg)?;
        cond.reorder(self.domain.dims())
    }

    /// Appends a new dimension with n states; the table is replicated over it.
    pub fn extend(&self, dim : Dim, n : usize) -> Result<Self, CombinationError> {
        if self.domain.contains(&dim) {
            return Err(CombinationError::DuplicateDim(dim));
        }
        let domain = self.domain.with(dim, n);
        let probs = DVector::from_iterator(
            domain.size(),
            self.probs.iter().flat_map(|p| std::iter::repeat(*p).take(n) )
        );
        Ok(Self { domain, probs })
    }

    /// Normalizes over the last dimension, for every configuration of the others. Rows
    /// with no mass are made uniform.
    pub fn normalize_conditional(&mut self) {
        let n = match self.domain.cards().last() {
            Some(n) => *n,
            None => return
        };
        for row in self.probs.as_mut_slice().chunks_mut(n) {
            normalize_row(row);
        }
    }

    /// Conditional distribution of the last dimension given the parent configuration.
    pub fn row(&self, parents : &[usize]) -> &[f64] {
        let n = self.domain.cards().last().cloned().unwrap_or(1);
        let mut states = parents.to_vec();
        states.push(0);
        let start = self.domain.index(&states[..]);
        &self.probs.as_slice()[start..start+n]
    }

}

fn normalize_row(row : &mut [f64]) {
    let s : f64 = row.iter().sum();
    if s > EPSILON {
        row.iter_mut().for_each(|p| *p /= s );
    } else {
        let n = row.len() as f64;
        row.iter_mut().for_each(|p| *p = 1. / n );
    }
}

impl Display for Table {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({:?})", self.domain.cards())
    }

}

#[cfg(test)]
fn dim(var : usize) -> Dim {
    Dim::new(var, 0)
}

#[test]
fn configurations_follow_linear_index() {
    let dom = DiscreteDomain::new(vec![dim(0), dim(1)], vec![2, 3]).unwrap();
    for (ix, states) in dom.configurations().enumerate() {
        assert_eq!(dom.index(&states[..]), ix);
        assert_eq!(dom.states(ix), states);
    }
    assert_eq!(dom.configurations().count(), 6);
    assert_eq!(DiscreteDomain::empty().configurations().count(), 1);
}

#[test]
fn combine_aligns_shared_dims() {
    let a = Table::new(
        DiscreteDomain::new(vec![dim(0)], vec![2]).unwrap(),
        DVector::from_vec(vec![0.3, 0.7])
    ).unwrap();
    let b = Table::new(
        DiscreteDomain::new(vec![dim(0), dim(1)], vec![2, 2]).unwrap(),
        DVector::from_vec(vec![0.9, 0.1, 0.2, 0.8])
    ).unwrap();
    let ab = a.combine(&b).unwrap();
    assert_eq!(ab.domain().dims(), &[dim(0), dim(1)]);
    assert!((ab.prob(&[1, 1]) - 0.56).abs() < 1e-12);
    let marg = ab.marginalize(&dim(1)).unwrap();
    assert!((marg.prob(&[0]) - 0.3).abs() < 1e-12);
}

#[test]
fn divide_by_zero_yields_zero() {
    let a = Table::constant(DiscreteDomain::new(vec![dim(0)], vec![2]).unwrap(), 1.);
    let b = Table::new(DiscreteDomain::new(vec![dim(0)], vec![2]).unwrap(), DVector::from_vec(vec![0.0, 0.5])).unwrap();
    let q = a.divide(&b).unwrap();
    assert_eq!(q.prob(&[0]), 0.0);
    assert!((q.prob(&[1]) - 2.0).abs() < 1e-12);
}

#[test]
fn cardinality_mismatch_fails() {
    let a = Table::constant(DiscreteDomain::new(vec![dim(0)], vec![2]).unwrap(), 1.);
    let b = Table::constant(DiscreteDomain::new(vec![dim(0)], vec![3]).unwrap(), 1.);
    assert!(a.combine(&b).is_err());
}

#[test]
fn malformed_domains_are_refused() {
    assert!(matches!(DiscreteDomain::new(vec![dim(0), dim(1)], vec![2]), Err(CombinationError::Shape { .. })));
    assert!(matches!(DiscreteDomain::new(vec![dim(0)], vec![0]), Err(CombinationError::NoStates(_))));
}
