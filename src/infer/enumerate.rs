use nalgebra::{DVector, DMatrix};
use super::*;

/// Largest number of hidden configurations Enumeration accepts by default.
pub const MAX_CONFIGURATIONS : usize = 1 << 16;

/// Exact inference for networks whose continuous variables are all observed. Every joint
/// configuration of the hidden discrete instances of the trial is weighted by the product
/// of the conditional distributions of all instances, which gives the posterior over the
/// hidden instances. The cost is exponential in the number of hidden instances, so this
/// is only practical for small networks and short trials.
#[derive(Debug, Clone)]
pub struct Enumeration {

    limit : usize,

    evidence : Evidence,

    /// Posterior over the hidden discrete instances. None until evidence is set.
    posterior : Option<Table>

}

impl Default for Enumeration {

    fn default() -> Self {
        Self::with_limit(MAX_CONFIGURATIONS)
    }

}

impl Enumeration {

    pub fn with_limit(limit : usize) -> Self {
        Self { limit, evidence : Evidence::new(), posterior : None }
    }

    /// Joint posterior over the hidden discrete instances.
    pub fn posterior(&self) -> Option<&Table> {
        self.posterior.as_ref()
    }

    /// Posterior over the states of a single discrete instance. Observed instances have all
    /// their mass at the observed state.
    pub fn marginal(&self, model : &Network, tv : TransientVariable) -> Result<DVector<f64>, InferenceError> {
        let post = self.posterior.as_ref().ok_or(InferenceError::NotReady)?;
        let n = model.variables().get(tv.var)
            .and_then(|v| v.kind().states() )
            .ok_or(EvaluationError::TypeMismatch(tv))?;
        if let Some(v) = self.evidence.get(&tv) {
            let s = v.state().ok_or(EvaluationError::TypeMismatch(tv))?;
            let mut p = DVector::zeros(n);
            p[s] = 1.;
            return Ok(p);
        }
        let marg = post.project(&[tv])?;
        Ok(marg.probs().clone())
    }

    fn state_of(&self, post : &Table, conf : &[usize], d : &Dim) -> Result<usize, InferenceError> {
        match self.evidence.get(d) {
            Some(v) => v.state().ok_or(InferenceError::Evaluation(EvaluationError::TypeMismatch(*d))),
            None => post.domain().position(d)
                .map(|p| conf[p] )
                .ok_or(InferenceError::Evaluation(EvaluationError::MissingValue(*d)))
        }
    }

}

/// Numerically stable normalization of log-weights.
fn normalize_log(lw : &[f64]) -> Option<DVector<f64>> {
    let m = lw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return None;
    }
    let w = DVector::from_iterator(lw.len(), lw.iter().map(|l| (l - m).exp() ));
    let z = w.sum();
    if z <= 0. || !z.is_finite() {
        return None;
    }
    Some(w.unscale(z))
}

impl InferenceAlgorithm for Enumeration {

    fn name(&self) -> &str {
        "enumeration"
    }

    fn evidence_set(&mut self, model : &mut Network) -> Result<(), InferenceError> {
        self.posterior = None;
        model.junction_tree()?;
        self.evidence = model.evidence().clone();
        let horizon = model.horizon();

        let mut hidden = Vec::new();
        let mut cards = Vec::new();
        let mut cpds = Vec::new();
        for t in 0..horizon {
            for v in model.variables() {
                let tv = TransientVariable::new(v.id(), t as i32);
                if !self.evidence.contains_key(&tv) {
                    match v.kind() {
                        VarType::Discrete(n) => {
                            hidden.push(tv);
                            cards.push(n);
                        },
                        VarType::Continuous => return Err(InferenceError::Unobserved(tv))
                    }
                }
                cpds.push(model.distribution_at(v.id(), t)?);
            }
        }

        let size = cards.iter().fold(1usize, |n, c| n.saturating_mul(*c) );
        if size > self.limit {
            return Err(InferenceError::TooManyConfigurations(size, self.limit));
        }
        let domain = DiscreteDomain::new(hidden, cards)?;
        let mut lw = Vec::with_capacity(size);
        for conf in domain.configurations() {
            let evidence = &self.evidence;
            let lookup = |d : &Dim| {
                evidence.get(d).cloned()
                    .or_else(|| domain.position(d).map(|p| Value::State(conf[p]) ) )
            };
            let mut l = 0.;
            for cpd in cpds.iter() {
                l += cpd.log_probability(&lookup)?;
            }
            lw.push(l);
        }
        let probs = normalize_log(&lw[..]).ok_or(InferenceError::ImpossibleEvidence)?;
        log::trace!("Enumerated {} hidden configurations over {} slices", size, horizon);
        self.posterior = Some(Table::new(domain, probs)?);
        Ok(())
    }

    fn parameter_learning_done(&mut self, _model : &mut Network) -> Result<(), InferenceError> {
        self.posterior = None;
        self.evidence.clear();
        Ok(())
    }

    fn factor_for_sufficient_statistics(
        &mut self,
        model : &Network,
        var : VariableId,
        time : usize
    ) -> Result<Factor, InferenceError> {
        let post = self.posterior.as_ref().ok_or(InferenceError::NotReady)?;
        let family = model.family(var, time)?.shifted(time as i32);

        let mut dims = family.switch.dims().to_vec();
        let mut cards = family.switch.cards().to_vec();
        let mut head = family.tail.clone();
        match family.states {
            Some(n) => {
                dims.push(family.child);
                cards.push(n);
            },
            None => head.push(family.child)
        }
        let discrete = DiscreteDomain::new(dims, cards)?;

        let mut weights = Table::constant(discrete.clone(), 0.);
        let mut states = vec![0; discrete.len()];
        for (ix, conf) in post.domain().configurations().enumerate() {
            let p = post.prob_at(ix);
            if p <= 0. {
                continue;
            }
            for (s, d) in states.iter_mut().zip(discrete.dims().iter()) {
                *s = self.state_of(post, &conf[..], d)?;
            }
            let prev = weights.prob(&states[..]);
            weights.set_prob(&states[..], prev + p);
        }

        let mut x = DVector::zeros(head.len());
        for (i, d) in head.iter().enumerate() {
            x[i] = self.evidence.get(d)
                .and_then(|v| v.real() )
                .ok_or(InferenceError::Unobserved(*d))?;
        }
        let comp = Component::new(x, DMatrix::zeros(head.len(), 0), DMatrix::zeros(head.len(), head.len()))?;
        let joint = LinearGaussianMix::new(weights, head, Vec::new(), vec![comp; discrete.size()])?;
        Ok(Factor::new(family.dims(), joint)?)
    }

}

#[cfg(test)]
fn two_node(parent : VarType, child : VarType) -> Network {
    let mut net = Network::new(1);
    let a = net.add_variable("a", parent).unwrap();
    let b = net.add_variable("b", child).unwrap();
    net.add_edge(a, b, 0).unwrap();
    net
}

#[test]
fn hidden_parent_posterior_follows_bayes_rule() {
    let mut net = two_node(VarType::Discrete(2), VarType::Discrete(2));
    let cpt = Table::new(
        DiscreteDomain::new(vec![Dim::new(0, 0), Dim::new(1, 0)], vec![2, 2]).unwrap(),
        DVector::from_vec(vec![0.9, 0.1, 0.2, 0.8])
    ).unwrap();
    net.set_distribution(1, 0, ConditionalDistribution::Table(cpt)).unwrap();
    net.set_evidence(TransientVariable::new(1, 0), Value::State(1), false).unwrap();
    let mut alg = Enumeration::default();
    alg.evidence_set(&mut net).unwrap();
    let p = alg.marginal(&net, TransientVariable::new(0, 0)).unwrap();
    assert!((p[0] - 0.1 / 0.9).abs() < 1e-12);
    assert!((p[1] - 0.8 / 0.9).abs() < 1e-12);

    let factor = alg.factor_for_sufficient_statistics(&net, 1, 0).unwrap();
    assert_eq!(factor.dependencies(), &[Dim::new(0, 0), Dim::new(1, 0)]);
    assert!((factor.weight(&[1, 1]) - 0.8 / 0.9).abs() < 1e-12);
    assert_eq!(factor.weight(&[0, 0]), 0.);
}

#[test]
fn continuous_instances_must_be_observed() {
    let mut net = two_node(VarType::Discrete(2), VarType::Continuous);
    net.set_horizon(1);
    let mut alg = Enumeration::default();
    match alg.evidence_set(&mut net) {
        Err(InferenceError::Unobserved(tv)) => assert_eq!(tv, TransientVariable::new(1, 0)),
        other => panic!("Expected unobserved variable, found {:?}", other)
    }
    net.set_evidence(TransientVariable::new(1, 0), Value::Real(0.3), false).unwrap();
    alg.evidence_set(&mut net).unwrap();
    let factor = alg.factor_for_sufficient_statistics(&net, 1, 0).unwrap();
    assert_eq!(factor.joint().head(), &[Dim::new(1, 0)]);
    assert!(factor.joint().components().iter().all(|c| c.intercept[0] == 0.3 && c.cov[(0, 0)] == 0. ));
}

#[test]
fn configuration_limit_is_enforced() {
    let mut net = Network::new(2);
    let x = net.add_variable("x", VarType::Discrete(4)).unwrap();
    net.add_edge(x, x, 1).unwrap();
    net.set_horizon(3);
    let mut alg = Enumeration::with_limit(16);
    assert!(matches!(alg.evidence_set(&mut net), Err(InferenceError::TooManyConfigurations(64, 16))));
    assert!(alg.factor_for_sufficient_statistics(&net, x, 0).is_err());
}
