use nalgebra::{DVector, DMatrix};
use super::*;
use serde::{Serialize, Deserialize};
use std::fmt::{self, Display};

/// A mixture of linear-Gaussian components, selected by a discrete "switch" domain:
///
/// p(d, x_head | x_tail) = w(d) N(x_head; b_d + A_d x_tail, S_d)
///
/// The weights w(d) are held as a table over the discrete domain, and there is one
/// component per discrete configuration (in the table linear index order). This is the
/// most general member of the hybrid family: a table is a mixture with an empty head, a
/// Gaussian is a one-component mixture with an empty tail, and so on (see
/// ConditionalDistribution::from_mixture). When the mixture is the distribution of a
/// continuous variable, the weights are all one (the discrete parents are conditioning
/// dimensions), the head holds the variable and the tail holds its continuous parents.
///
/// Combination follows the chain rule for linear-Gaussian models, so it is only
/// well-defined when one operand does not condition on the head of the other. When both
/// operands depend on each other's head, the procedure tries to break the dependency by
/// splitting the head of one operand into a marginal and a conditional complement; if no
/// such split exists the operands encode a cyclic dependency and the combination fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearGaussianMix {

    weights : Table,

    head : Vec<Dim>,

    tail : Vec<Dim>,

    components : Vec<Component>

}

fn disjoint(a : &[Dim], b : &[Dim]) -> bool {
    !a.iter().any(|d| b.contains(d) )
}

impl LinearGaussianMix {

    pub fn new(
        weights : Table,
        head : Vec<Dim>,
        tail : Vec<Dim>,
        components : Vec<Component>
    ) -> Result<Self, CombinationError> {
        if components.len() != weights.domain().size() {
            return Err(CombinationError::Shape { expected : weights.domain().size(), found : components.len() });
        }
        for c in components.iter() {
            if c.n_head() != head.len() {
                return Err(CombinationError::Shape { expected : head.len(), found : c.n_head() });
            }
            if c.n_tail() != tail.len() {
                return Err(CombinationError::Shape { expected : tail.len(), found : c.n_tail() });
            }
        }
        Ok(Self { weights, head, tail, components })
    }

    pub(crate) fn from_parts(weights : Table, head : Vec<Dim>, tail : Vec<Dim>, components : Vec<Component>) -> Self {
        Self { weights, head, tail, components }
    }

    pub fn into_parts(self) -> (Table, Vec<Dim>, Vec<Dim>, Vec<Component>) {
        (self.weights, self.head, self.tail, self.components)
    }

    /// Conditional distribution of a single continuous child given discrete and continuous
    /// parents, with standard normal components and unit weights.
    pub fn standard(discrete : DiscreteDomain, child : Dim, tail : Vec<Dim>) -> Self {
        let n = discrete.size();
        let components = (0..n).map(|_| Component::standard(1, tail.len()) ).collect();
        Self { weights : Table::constant(discrete, 1.), head : vec![child], tail, components }
    }

    pub fn discrete(&self) -> &DiscreteDomain {
        self.weights.domain()
    }

    pub fn weights(&self) -> &Table {
        &self.weights
    }

    pub fn head(&self) -> &[Dim] {
        &self.head[..]
    }

    pub fn tail(&self) -> &[Dim] {
        &self.tail[..]
    }

    pub fn components(&self) -> &[Component] {
        &self.components[..]
    }

    pub fn components_mut(&mut self) -> &mut [Component] {
        &mut self.components[..]
    }

    pub fn component(&self, states : &[usize]) -> &Component {
        &self.components[self.discrete().index(states)]
    }

    pub fn shifted(&self, by : i32) -> Self {
        Self {
            weights : self.weights.shifted(by),
            head : self.head.iter().map(|d| d.shifted(by) ).collect(),
            tail : self.tail.iter().map(|d| d.shifted(by) ).collect(),
            components : self.components.clone()
        }
    }

    /// Weighted density at a full realization of the domain.
    pub fn density(&self, states : &[usize], head : &DVector<f64>, tail : &DVector<f64>) -> Result<f64, EvaluationError> {
        let w = self.weights.prob(states);
        if self.head.is_empty() {
            return Ok(w);
        }
        Ok(w * self.component(states).density(head, tail)?)
    }

    /// Adds a discrete dimension with n states. Weights and components are replicated over it.
    pub fn extend_discrete(&self, dim : Dim, n : usize) -> Result<Self, CombinationError> {
        if self.head.contains(&dim) || self.tail.contains(&dim) {
            return Err(CombinationError::DuplicateDim(dim));
        }
        let weights = self.weights.extend(dim, n)?;
        let components = self.components.iter()
            .flat_map(|c| std::iter::repeat(c.clone()).take(n) )
            .collect();
        Ok(Self { weights, head : self.head.clone(), tail : self.tail.clone(), components })
    }

    /// Adds a continuous conditioning dimension, with zero coefficients in every component.
    pub fn extend_tail(&self, dim : Dim) -> Result<Self, CombinationError> {
        if self.head.contains(&dim) || self.tail.contains(&dim) || self.discrete().contains(&dim) {
            return Err(CombinationError::DuplicateDim(dim));
        }
        let mut tail = self.tail.clone();
        tail.push(dim);
        let components = self.components.iter().map(|c| c.push_tail() ).collect();
        Ok(Self { weights : self.weights.clone(), head : self.head.clone(), tail, components })
    }

    /// Removes a dimension. Discrete dimensions are summed out (components collapsed by
    /// moment matching); head dimensions are integrated out exactly; tail dimensions can
    /// only be dropped when no component depends on them.
    pub fn marginalize(&self, dim : &Dim) -> Result<Self, CombinationError> {
        if self.discrete().contains(dim) {
            return self.collapse(dim);
        }
        if let Some(p) = self.head.iter().position(|d| d == dim ) {
            let mut head = self.head.clone();
            head.remove(p);
            if head.is_empty() {
                let components = self.components.iter()
                    .map(|_| Component::standard(0, 0) )
                    .collect();
                return Ok(Self { weights : self.weights.clone(), head, tail : Vec::new(), components });
            }
            let components = self.components.iter().map(|c| c.remove_head(p) ).collect();
            return Ok(Self { weights : self.weights.clone(), head, tail : self.tail.clone(), components });
        }
        if let Some(p) = self.tail.iter().position(|d| d == dim ) {
            if !self.tail_is_free(p) {
                return Err(CombinationError::TailDependency(*dim));
            }
            let mut tail = self.tail.clone();
            tail.remove(p);
            let components = self.components.iter().map(|c| c.remove_tail(p) ).collect();
            return Ok(Self { weights : self.weights.clone(), head : self.head.clone(), tail, components });
        }
        Err(CombinationError::UnknownDim(*dim))
    }

    pub fn marginalize_all(&self, dims : &[Dim]) -> Result<Self, CombinationError> {
        let mut out = self.clone();
        for d in dims {
            out = out.marginalize(d)?;
        }
        Ok(out)
    }

    fn tail_is_free(&self, p : usize) -> bool {
        self.components.iter().all(|c| c.coef.column(p).amax() < EPSILON )
    }

    /// Drops every tail dimension on which no component depends.
    pub fn prune_tail(&self) -> Self {
        let mut out = self.clone();
        for p in (0..self.tail.len()).rev() {
            if out.tail_is_free(p) {
                out.tail.remove(p);
                out.components = out.components.iter().map(|c| c.remove_tail(p) ).collect();
            }
        }
        out
    }

    /// Sums a discrete dimension out. The components sharing a configuration of the
    /// remaining dimensions are collapsed into their weighted moments (exact when the
    /// collapsed components are identical, as after extend_discrete).
    fn collapse(&self, dim : &Dim) -> Result<Self, CombinationError> {
        let pos = self.discrete().position(dim).ok_or(CombinationError::UnknownDim(*dim))?;
        let weights = self.weights.marginalize(dim)?;
        let dom = weights.domain().clone();
        let mut groups : Vec<Vec<usize>> = vec![Vec::new(); dom.size()];
        for (ix, mut states) in self.discrete().configurations().enumerate() {
            states.remove(pos);
            groups[dom.index(&states[..])].push(ix);
        }
        let (nh, nt) = (self.head.len(), self.tail.len());
        let mut components = Vec::with_capacity(groups.len());
        for group in groups.iter() {
            let total : f64 = group.iter().map(|ix| self.weights.prob_at(*ix) ).sum();
            let w : Vec<f64> = if total > EPSILON {
                group.iter().map(|ix| self.weights.prob_at(*ix) / total ).collect()
            } else {
                vec![1. / group.len() as f64; group.len()]
            };
            let mut intercept = DVector::zeros(nh);
            let mut coef = DMatrix::zeros(nh, nt);
            for (wi, ix) in w.iter().zip(group.iter()) {
                intercept += *wi * &self.components[*ix].intercept;
                coef += *wi * &self.components[*ix].coef;
            }
            let mut cov = DMatrix::zeros(nh, nh);
            for (wi, ix) in w.iter().zip(group.iter()) {
                let c = &self.components[*ix];
                let dev = &c.intercept - &intercept;
                cov += *wi * (&c.cov + &dev * dev.transpose());
            }
            components.push(Component { intercept, coef, cov });
        }
        Ok(Self { weights, head : self.head.clone(), tail : self.tail.clone(), components })
    }

    /// The conditional distribution of the informed head dimensions given the remaining
    /// head dimensions (appended to the tail), with unit weights. Together with
    /// marginalize_all(dims), this splits the mixture in a marginal and a complement
    /// whose combination recovers it.
    pub fn complement(&self, dims : &[Dim]) -> Result<Self, CombinationError> {
        let mut keep = Vec::new();
        let mut given = Vec::new();
        for (ix, d) in self.head.iter().enumerate() {
            if dims.contains(d) {
                keep.push(ix);
            } else {
                given.push(ix);
            }
        }
        for d in dims {
            if !self.head.contains(d) {
                return Err(CombinationError::UnknownDim(*d));
            }
        }
        let head : Vec<Dim> = keep.iter().map(|ix| self.head[*ix] ).collect();
        let mut tail = self.tail.clone();
        tail.extend(given.iter().map(|ix| self.head[*ix] ));
        let components = self.components.iter()
            .map(|c| c.condition(&keep[..], &given[..]) )
            .collect::<Result<Vec<_>, _>>()?;
        let weights = Table::constant(self.discrete().clone(), 1.);
        Ok(Self { weights, head, tail, components })
    }

    /// Product of two mixtures (see the type documentation).
    pub fn combine(&self, other : &Self) -> Result<Self, CombinationError> {
        if disjoint(&other.head, &self.tail) {
            return Self::direct(self, other);
        }
        if disjoint(&self.head, &other.tail) {
            return Self::direct(other, self);
        }
        let a = self.prune_tail();
        let b = other.prune_tail();
        if disjoint(&b.head, &a.tail) {
            return Self::direct(&a, &b);
        }
        if disjoint(&a.head, &b.tail) {
            return Self::direct(&b, &a);
        }
        if let Some(res) = Self::decompose(&a, &b) {
            return res;
        }
        if let Some(res) = Self::decompose(&b, &a) {
            return res;
        }
        Err(CombinationError::Cyclic { left : a.head.clone(), right : b.head.clone() })
    }

    /// Splits the head of a into D12 (the part b does not condition on) and the rest. If the
    /// marginal of a over the rest no longer depends on the head of b, a = marginal x complement
    /// and the product is recomputed as (marginal x b) x complement. Returns None when the
    /// split does not remove the dependency.
    fn decompose(a : &Self, b : &Self) -> Option<Result<Self, CombinationError>> {
        let d12 : Vec<Dim> = a.head.iter()
            .filter(|d| !b.tail.contains(d) )
            .cloned()
            .collect();
        if d12.is_empty() || d12.len() == a.head.len() {
            return None;
        }
        let marginal = match a.marginalize_all(&d12[..]) {
            Ok(m) => m.prune_tail(),
            Err(e) => return Some(Err(e))
        };
        if !disjoint(&b.head, &marginal.tail) {
            return None;
        }
        let compl = match a.complement(&d12[..]) {
            Ok(c) => c,
            Err(e) => return Some(Err(e))
        };
        log::trace!("Decomposed {:?} into marginal {:?} and complement {:?}", a.head, marginal.head, compl.head);
        Some(marginal.combine(b).and_then(|m| m.combine(&compl) ))
    }

    /// Chain-rule product p(H_a | T) p(H_b | H_a, T), valid when b's head is not in a's tail.
    fn direct(a : &Self, b : &Self) -> Result<Self, CombinationError> {
        let overlap : Vec<Dim> = a.head.iter().filter(|d| b.head.contains(d) ).cloned().collect();
        if !overlap.is_empty() {
            return Err(CombinationError::OverlappingHeads(overlap));
        }

        // Bring both operands to the union discrete domain.
        let mut a_ext = a.clone();
        for (d, c) in b.discrete().dims().iter().zip(b.discrete().cards().iter()) {
            match a.discrete().card_of(d) {
                Some(ca) if ca != *c => {
                    return Err(CombinationError::CardinalityMismatch { dim : *d, left : ca, right : *c });
                },
                Some(_) => { },
                None => a_ext = a_ext.extend_discrete(*d, *c)?
            }
        }
        let mut b_ext = b.clone();
        for (d, c) in a.discrete().dims().iter().zip(a.discrete().cards().iter()) {
            if !b.discrete().contains(d) {
                b_ext = b_ext.extend_discrete(*d, *c)?;
            }
        }

        // The joint tail holds every conditioning dimension not explained by a's head.
        for d in b.tail.iter() {
            if !a.head.contains(d) && !a_ext.tail.contains(d) {
                a_ext = a_ext.extend_tail(*d)?;
            }
        }
        for d in a_ext.tail.clone() {
            if !b_ext.tail.contains(&d) {
                b_ext = b_ext.extend_tail(d)?;
            }
        }

        let weights = a_ext.weights.combine(&b_ext.weights)?;
        let (dom, maps) = DiscreteDomain::merge(a_ext.discrete(), b_ext.discrete())?;
        let from_head : Vec<Option<usize>> = a.head.iter()
            .map(|d| b_ext.tail.iter().position(|t| t == d ) )
            .collect();
        let from_tail : Vec<usize> = a_ext.tail.iter()
            .map(|d| b_ext.tail.iter().position(|t| t == d ).ok_or(CombinationError::UnknownDim(*d)) )
            .collect::<Result<Vec<_>, _>>()?;
        let mut components = Vec::with_capacity(dom.size());
        for states in dom.configurations() {
            let sb = DimMapping::project(&maps[..], &states[..], b_ext.discrete().len(), false);
            let ca = a_ext.component(&states[..]);
            let cb = b_ext.component(&sb[..]);
            components.push(chain(ca, cb, &from_head[..], &from_tail[..]));
        }
        let mut head = a.head.clone();
        head.extend(b.head.iter().cloned());
        Ok(Self { weights, head, tail : a_ext.tail, components })
    }

}

/// Joint parameters of [x_a; x_b] given the tail, where x_a = b_a + A_a t + e_a and
/// x_b = b_b + B_h x_a + B_t t + e_b. from_head maps each head dimension of a to its column
/// in cb (if cb depends on it); from_tail maps each tail dimension of ca to its column in cb.
fn chain(ca : &Component, cb : &Component, from_head : &[Option<usize>], from_tail : &[usize]) -> Component {
    let (ha, hb, t) = (ca.n_head(), cb.n_head(), ca.n_tail());
    let mut b_h = DMatrix::zeros(hb, ha);
    for (j, p) in from_head.iter().enumerate() {
        if let Some(p) = p {
            b_h.set_column(j, &cb.coef.column(*p));
        }
    }
    let mut b_t = DMatrix::zeros(hb, t);
    for (j, p) in from_tail.iter().enumerate() {
        b_t.set_column(j, &cb.coef.column(*p));
    }
    let mut intercept = DVector::zeros(ha + hb);
    intercept.rows_mut(0, ha).copy_from(&ca.intercept);
    intercept.rows_mut(ha, hb).copy_from(&(&cb.intercept + &b_h * &ca.intercept));
    let mut coef = DMatrix::zeros(ha + hb, t);
    coef.rows_mut(0, ha).copy_from(&ca.coef);
    coef.rows_mut(ha, hb).copy_from(&(&b_h * &ca.coef + b_t));
    let cross = &b_h * &ca.cov;
    let mut cov = DMatrix::zeros(ha + hb, ha + hb);
    cov.slice_mut((0, 0), (ha, ha)).copy_from(&ca.cov);
    cov.slice_mut((ha, 0), (hb, ha)).copy_from(&cross);
    cov.slice_mut((0, ha), (ha, hb)).copy_from(&cross.transpose());
    cov.slice_mut((ha, ha), (hb, hb)).copy_from(&(&cross * b_h.transpose() + &cb.cov));
    Component { intercept, coef, cov }
}

impl Display for LinearGaussianMix {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LinearGaussianMix({:?}; {}|{})",
            self.discrete().cards(),
            self.head.len(),
            self.tail.len()
        )
    }

}

#[cfg(test)]
fn dim(var : usize) -> Dim {
    Dim::new(var, 0)
}

#[cfg(test)]
fn univariate(head : Dim, tail : Vec<Dim>, intercept : f64, coef : &[f64], var : f64) -> LinearGaussianMix {
    let comp = Component::new(
        DVector::from_element(1, intercept),
        DMatrix::from_row_slice(1, coef.len(), coef),
        DMatrix::from_element(1, 1, var)
    ).unwrap();
    LinearGaussianMix::new(Table::unit(), vec![head], tail, vec![comp]).unwrap()
}

#[test]
fn chain_rule_joint_moments() {
    // x0 ~ N(1, 2); x1 | x0 ~ N(3 + 0.5 x0, 1)
    let a = univariate(dim(0), vec![], 1.0, &[], 2.0);
    let b = univariate(dim(1), vec![dim(0)], 3.0, &[0.5], 1.0);
    let ab = a.combine(&b).unwrap();
    assert_eq!(ab.head(), &[dim(0), dim(1)]);
    assert!(ab.tail().is_empty());
    let c = &ab.components()[0];
    assert!((c.intercept[1] - 3.5).abs() < 1e-12);
    assert!((c.cov[(0, 1)] - 1.0).abs() < 1e-12);
    assert!((c.cov[(1, 1)] - 1.5).abs() < 1e-12);

    // Operand order does not matter for a valid chain.
    let ba = b.combine(&a).unwrap();
    assert_eq!(ba.head(), &[dim(0), dim(1)]);
}

#[test]
fn mutual_dependency_is_decomposed() {
    // a = p(x1, x2 | x3) with x1 independent of x3; b = p(x3 | x1)
    let a = LinearGaussianMix::new(
        Table::unit(),
        vec![dim(1), dim(2)],
        vec![dim(3)],
        vec![Component::new(
            DVector::zeros(2),
            DMatrix::from_row_slice(2, 1, &[0.0, 0.5]),
            DMatrix::identity(2, 2)
        ).unwrap()]
    ).unwrap();
    let b = univariate(dim(3), vec![dim(1)], 0.0, &[2.0], 1.0);
    let joint = a.combine(&b).unwrap();
    assert!(joint.tail().is_empty());
    let pos = |d : Dim| joint.head().iter().position(|h| *h == d ).unwrap();
    let c = &joint.components()[0];
    let (p1, p2, p3) = (pos(dim(1)), pos(dim(2)), pos(dim(3)));
    assert!((c.cov[(p1, p1)] - 1.0).abs() < 1e-9);
    assert!((c.cov[(p3, p3)] - 5.0).abs() < 1e-9);
    assert!((c.cov[(p1, p3)] - 2.0).abs() < 1e-9);
    assert!((c.cov[(p2, p3)] - 2.5).abs() < 1e-9);
    assert!((c.cov[(p2, p2)] - 2.25).abs() < 1e-9);
    assert!((c.cov[(p1, p2)] - 1.0).abs() < 1e-9);
}

#[test]
fn cyclic_dependency_fails() {
    let a = univariate(dim(0), vec![dim(1)], 0.0, &[1.0], 1.0);
    let b = univariate(dim(1), vec![dim(0)], 0.0, &[1.0], 1.0);
    match a.combine(&b) {
        Err(CombinationError::Cyclic { .. }) => { },
        other => panic!("Expected cyclic dependency, found {:?}", other)
    }
}

#[test]
fn tail_with_dependency_cannot_be_marginalized() {
    let a = univariate(dim(0), vec![dim(1)], 0.0, &[1.0], 1.0);
    assert!(a.marginalize(&dim(1)).is_err());
    let free = univariate(dim(0), vec![dim(1)], 0.0, &[0.0], 1.0);
    assert!(free.marginalize(&dim(1)).unwrap().tail().is_empty());
}
