use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeFiltered;
use petgraph::algo::{has_path_connecting, toposort};
use serde::{Serialize, Deserialize};
use std::fmt::{self, Display};
use std::collections::BTreeMap;
use thiserror::Error;
use rand::Rng;
use crate::distr::*;
use crate::graph::{JunctionTreeTemplate, JunctionTreeError};

/// Trial data and the evidence provider contract.
pub mod evidence;

pub use evidence::*;

/// Dense index of a variable inside its network.
pub type VariableId = usize;

/// A variable instance at a given time slice. Inside a conditional distribution the time
/// is relative to the child (zero for the child, negative for lagged parents); everywhere
/// else it is the absolute time slice of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransientVariable {

    pub var : VariableId,

    pub time : i32

}

impl TransientVariable {

    pub fn new(var : VariableId, time : i32) -> Self {
        Self { var, time }
    }

    pub fn shifted(&self, by : i32) -> Self {
        Self { var : self.var, time : self.time + by }
    }

}

impl Display for TransientVariable {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}[{}]", self.var, self.time)
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarType {

    /// Discrete variable with the informed number of states.
    Discrete(usize),

    Continuous

}

impl VarType {

    pub fn is_discrete(&self) -> bool {
        match self {
            VarType::Discrete(_) => true,
            VarType::Continuous => false
        }
    }

    pub fn states(&self) -> Option<usize> {
        match self {
            VarType::Discrete(n) => Some(*n),
            VarType::Continuous => None
        }
    }

}

/// A dependency between variables: the variable at the other end, and how many time
/// slices separate the parent instance from the child instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {

    pub var : VariableId,

    pub offset : usize

}

#[derive(Debug, Clone, Error)]
pub enum ModelError {

    #[error("Unknown variable {0}")]
    UnknownVariable(VariableId),

    #[error("Variable name {0} already used")]
    DuplicateName(String),

    #[error("Discrete variable {0} must have at least one state")]
    InvalidStates(String),

    #[error("Edge from {parent} to {child} with offset {offset} already exists")]
    DuplicateEdge { parent : VariableId, child : VariableId, offset : usize },

    #[error("Edge from {parent} to {child} creates a cycle within a time slice")]
    Cycle { parent : VariableId, child : VariableId },

    #[error("Offset {offset} not representable with {n_slices} template slices")]
    OffsetOutOfRange { offset : usize, n_slices : usize },

    #[error("Distribution {found} does not match the family of variable {var} at slice {slice}")]
    FamilyMismatch { var : VariableId, slice : usize, found : String },

    #[error(transparent)]
    Evaluation(#[from] EvaluationError)

}

/// A variable of a dynamic network, together with one conditional distribution per
/// template slice. Template slice s only sees the parents with offset <= s; every time
/// slice past the last template uses the last template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomVariable {

    id : VariableId,

    name : String,

    kind : VarType,

    parents : Vec<Edge>,

    children : Vec<Edge>,

    distributions : Vec<ConditionalDistribution>

}

impl RandomVariable {

    pub fn id(&self) -> VariableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name[..]
    }

    pub fn kind(&self) -> VarType {
        self.kind
    }

    pub fn is_discrete(&self) -> bool {
        self.kind.is_discrete()
    }

    pub fn parents(&self) -> &[Edge] {
        &self.parents[..]
    }

    pub fn children(&self) -> &[Edge] {
        &self.children[..]
    }

    pub fn distributions(&self) -> &[ConditionalDistribution] {
        &self.distributions[..]
    }

    /// Template distribution for the informed slice (clamped to the last template).
    pub fn distribution(&self, slice : usize) -> &ConditionalDistribution {
        &self.distributions[slice.min(self.distributions.len() - 1)]
    }

}

/// Evidence and template parameters saved by Network::store_state.
#[derive(Debug, Clone)]
struct StoredState {

    evidence : Evidence,

    horizon : usize,

    distributions : Vec<Vec<ConditionalDistribution>>

}

/// The structural view of a dynamic network consumed by junction tree compilation.
pub trait Topology {

    fn variables(&self) -> &[RandomVariable];

    /// Number of template slices.
    fn n_slices(&self) -> usize;

    /// Number of variable instances at or before template slice s with a child after s.
    fn interface_size(&self, slice : usize) -> usize {
        let mut n = 0;
        for v in self.variables() {
            for w in 0..=slice {
                if v.children().iter().any(|e| w + e.offset > slice ) {
                    n += 1;
                }
            }
        }
        n
    }

    fn variable(&self, id : VariableId) -> Option<&RandomVariable> {
        self.variables().get(id)
    }

}

/// A dynamic Bayesian network: variables, their (possibly lagged) dependencies, the
/// current evidence and the compiled junction tree. Structural edits mark the junction
/// tree stale; it is recompiled on the next call to junction_tree().
pub struct Network {

    variables : Vec<RandomVariable>,

    /// One node per variable (node index equals the variable id); edges weighted by offset.
    graph : DiGraph<VariableId, usize>,

    n_slices : usize,

    evidence : Evidence,

    /// Number of time slices the current evidence refers to.
    horizon : usize,

    stored : Vec<StoredState>,

    observers : Vec<Box<dyn FnMut(&EvidenceChange)>>,

    junction : JunctionTreeTemplate

}

impl fmt::Debug for Network {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("variables", &self.variables)
            .field("n_slices", &self.n_slices)
            .field("evidence", &self.evidence)
            .finish()
    }

}

impl Topology for Network {

    fn variables(&self) -> &[RandomVariable] {
        &self.variables[..]
    }

    fn n_slices(&self) -> usize {
        self.n_slices
    }

}

impl Network {

    /// Builds an empty network with the informed number of template slices (at least one).
    pub fn new(n_slices : usize) -> Self {
        Self {
            variables : Vec::new(),
            graph : DiGraph::new(),
            n_slices : n_slices.max(1),
            evidence : Evidence::new(),
            horizon : 0,
            stored : Vec::new(),
            observers : Vec::new(),
            junction : JunctionTreeTemplate::default()
        }
    }

    pub fn add_variable(&mut self, name : &str, kind : VarType) -> Result<VariableId, ModelError> {
        if self.variables.iter().any(|v| v.name == name ) {
            return Err(ModelError::DuplicateName(name.to_string()));
        }
        if kind == VarType::Discrete(0) {
            return Err(ModelError::InvalidStates(name.to_string()));
        }
        let id = self.variables.len();
        let ix = self.graph.add_node(id);
        debug_assert!(ix.index() == id);
        self.variables.push(RandomVariable {
            id,
            name : name.to_string(),
            kind,
            parents : Vec::new(),
            children : Vec::new(),
            distributions : Vec::new()
        });
        self.reset_distributions(id);
        self.junction.set_stale(true);
        Ok(id)
    }

    /// Adds a dependency of child at time t on parent at time t - offset. Edges within a
    /// time slice (offset zero) must keep the slice acyclic.
    pub fn add_edge(&mut self, parent : VariableId, child : VariableId, offset : usize) -> Result<(), ModelError> {
        self.check(parent)?;
        self.check(child)?;
        if offset >= self.n_slices {
            return Err(ModelError::OffsetOutOfRange { offset, n_slices : self.n_slices });
        }
        if self.variables[child].parents.contains(&Edge { var : parent, offset }) {
            return Err(ModelError::DuplicateEdge { parent, child, offset });
        }
        if offset == 0 {
            let present = EdgeFiltered::from_fn(&self.graph, |e| *e.weight() == 0 );
            if has_path_connecting(&present, NodeIndex::new(child), NodeIndex::new(parent), None) {
                return Err(ModelError::Cycle { parent, child });
            }
        }
        self.graph.add_edge(NodeIndex::new(parent), NodeIndex::new(child), offset);
        self.variables[child].parents.push(Edge { var : parent, offset });
        self.variables[parent].children.push(Edge { var : child, offset });
        self.reset_distributions(child);
        self.junction.set_stale(true);
        Ok(())
    }

    /// Changes the number of template slices. Distributions are reset to their defaults.
    pub fn set_slices(&mut self, n_slices : usize) -> Result<(), ModelError> {
        let n_slices = n_slices.max(1);
        if let Some(e) = self.variables.iter().flat_map(|v| v.parents.iter() ).find(|e| e.offset >= n_slices ) {
            return Err(ModelError::OffsetOutOfRange { offset : e.offset, n_slices });
        }
        self.n_slices = n_slices;
        for id in 0..self.variables.len() {
            self.reset_distributions(id);
        }
        self.junction.set_stale(true);
        Ok(())
    }

    fn check(&self, var : VariableId) -> Result<(), ModelError> {
        if var < self.variables.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownVariable(var))
        }
    }

    fn reset_distributions(&mut self, var : VariableId) {
        let distrs : Vec<_> = (0..self.n_slices)
            .map(|s| ConditionalDistribution::for_family(self.family_of(var, s)) )
            .collect();
        self.variables[var].distributions = distrs;
    }

    fn family_of(&self, var : VariableId, slice : usize) -> Family {
        let v = &self.variables[var];
        let visible = v.parents.iter().filter(|e| e.offset <= slice );
        let mut switch = DiscreteDomain::empty();
        let mut tail = Vec::new();
        for e in visible {
            let d = Dim::new(e.var, -(e.offset as i32));
            match self.variables[e.var].kind {
                VarType::Discrete(n) => switch = switch.with(d, n),
                VarType::Continuous => tail.push(d)
            }
        }
        Family {
            switch,
            child : Dim::new(var, 0),
            states : v.kind.states(),
            tail
        }
    }

    /// The family of a variable at a template slice, in relative time.
    pub fn family(&self, var : VariableId, slice : usize) -> Result<Family, ModelError> {
        self.check(var)?;
        Ok(self.family_of(var, slice.min(self.n_slices - 1)))
    }

    pub fn distribution(&self, var : VariableId, slice : usize) -> Result<&ConditionalDistribution, ModelError> {
        self.check(var)?;
        Ok(self.variables[var].distribution(slice))
    }

    pub fn distribution_mut(&mut self, var : VariableId, slice : usize) -> Result<&mut ConditionalDistribution, ModelError> {
        self.check(var)?;
        let v = &mut self.variables[var];
        let s = slice.min(v.distributions.len() - 1);
        Ok(&mut v.distributions[s])
    }

    /// The distribution of a variable instance, over absolute time.
    pub fn distribution_at(&self, var : VariableId, time : usize) -> Result<ConditionalDistribution, ModelError> {
        Ok(self.distribution(var, time)?.shifted(time as i32))
    }

    /// Replaces a template distribution. The distribution must describe the same family.
    pub fn set_distribution(&mut self, var : VariableId, slice : usize, distr : ConditionalDistribution) -> Result<(), ModelError> {
        let fam = self.family(var, slice)?;
        if distr.family().as_ref() != Some(&fam) {
            return Err(ModelError::FamilyMismatch { var, slice, found : distr.to_string() });
        }
        *self.distribution_mut(var, slice)? = distr;
        Ok(())
    }

    /// Compiled junction tree, recompiled first if the network changed since the last call.
    pub fn junction_tree(&mut self) -> Result<&JunctionTreeTemplate, JunctionTreeError> {
        if self.junction.is_stale() {
            let mut template = std::mem::take(&mut self.junction);
            let res = template.compile(&*self);
            self.junction = template;
            res?;
        }
        Ok(&self.junction)
    }

    /// The junction tree as it currently is, possibly stale.
    pub fn junction_template(&self) -> &JunctionTreeTemplate {
        &self.junction
    }

    pub fn junction_template_mut(&mut self) -> &mut JunctionTreeTemplate {
        &mut self.junction
    }

    pub fn evidence(&self) -> &Evidence {
        &self.evidence
    }

    pub fn value(&self, tv : &TransientVariable) -> Option<Value> {
        self.evidence.get(tv).cloned()
    }

    /// Sets the observed value of a variable instance, coercing it to the variable type.
    pub fn set_evidence(&mut self, tv : TransientVariable, value : Value, announce : bool) -> Result<(), EvidenceError> {
        let kind = self.variables.get(tv.var).ok_or(EvidenceError::UnknownVariable(tv.var))?.kind;
        let coerced = value.coerce(&kind).ok_or(EvidenceError::Parse { var : tv, value })?;
        self.evidence.insert(tv, coerced);
        if announce {
            self.notify(&EvidenceChange::Set(tv, coerced));
        }
        Ok(())
    }

    /// Number of time slices of the current trial: the informed horizon, extended to cover
    /// every observed instance.
    pub fn horizon(&self) -> usize {
        let observed = self.evidence.keys().map(|tv| tv.time.max(0) as usize + 1 ).max().unwrap_or(0);
        self.horizon.max(observed)
    }

    pub fn set_horizon(&mut self, horizon : usize) {
        self.horizon = horizon;
    }

    pub fn clear_evidence(&mut self, announce : bool) {
        self.evidence.clear();
        if announce {
            self.notify(&EvidenceChange::Cleared);
        }
    }

    /// Saves the current evidence and template distributions. The evidence is brought back
    /// by restore_state; rollback_state brings back both.
    pub fn store_state(&mut self) {
        self.stored.push(StoredState {
            evidence : self.evidence.clone(),
            horizon : self.horizon,
            distributions : self.variables.iter().map(|v| v.distributions.clone() ).collect()
        });
    }

    /// Brings back the last stored evidence, keeping the current distributions. Returns
    /// false if nothing was stored.
    pub fn restore_state(&mut self, announce : bool) -> bool {
        self.pop_state(announce, false)
    }

    /// Brings back the last stored evidence and distributions. Returns false if nothing
    /// was stored.
    pub fn rollback_state(&mut self, announce : bool) -> bool {
        self.pop_state(announce, true)
    }

    fn pop_state(&mut self, announce : bool, parameters : bool) -> bool {
        match self.stored.pop() {
            Some(state) => {
                self.evidence = state.evidence;
                self.horizon = state.horizon;
                if parameters {
                    for (v, distrs) in self.variables.iter_mut().zip(state.distributions) {
                        v.distributions = distrs;
                    }
                }
                if announce {
                    self.notify(&EvidenceChange::Cleared);
                    let changes : Vec<_> = self.evidence.iter()
                        .map(|(tv, v)| EvidenceChange::Set(*tv, *v) )
                        .collect();
                    for ch in changes.iter() {
                        self.notify(ch);
                    }
                }
                true
            },
            None => false
        }
    }

    /// Registers a closure called on every announced evidence change.
    pub fn subscribe<F>(&mut self, observer : F)
    where
        F : FnMut(&EvidenceChange) + 'static
    {
        self.observers.push(Box::new(observer));
    }

    fn notify(&mut self, change : &EvidenceChange) {
        for obs in self.observers.iter_mut() {
            obs(change);
        }
    }

    /// Variables ordered such that parents within the same slice come before their children.
    pub fn slice_order(&self) -> Result<Vec<VariableId>, ModelError> {
        let present = self.graph.filter_map(
            |_, n| Some(*n),
            |_, e| if *e == 0 { Some(*e) } else { None }
        );
        toposort(&present, None)
            .map(|order| order.iter().map(|ix| present[*ix] ).collect() )
            .map_err(|c| {
                let v = present[c.node_id()];
                ModelError::Cycle { parent : v, child : v }
            })
    }

    /// Forward-samples a fully observed trial with the informed number of time slices.
    pub fn sample_trial<R>(&self, rng : &mut R, length : usize) -> Result<Trial, ModelError>
    where
        R : Rng
    {
        let order = self.slice_order()?;
        let mut values : BTreeMap<TransientVariable, Value> = BTreeMap::new();
        let mut trial = Trial::new(length);
        for t in 0..length {
            for var in order.iter() {
                let cpd = self.distribution_at(*var, t)?;
                let v = cpd.sample(rng, |d| values.get(d).cloned() )?;
                values.insert(TransientVariable::new(*var, t as i32), v);
                trial.observe(*var, t, v).map_err(|_| ModelError::UnknownVariable(*var) )?;
            }
        }
        Ok(trial)
    }

}

#[cfg(test)]
fn chain() -> Network {
    let mut net = Network::new(1);
    let x = net.add_variable("x", VarType::Discrete(2)).unwrap();
    let y = net.add_variable("y", VarType::Continuous).unwrap();
    let z = net.add_variable("z", VarType::Continuous).unwrap();
    net.add_edge(x, y, 0).unwrap();
    net.add_edge(y, z, 0).unwrap();
    net
}

#[test]
fn families_order_discrete_parents_first() {
    let mut net = chain();
    let w = net.add_variable("w", VarType::Discrete(3)).unwrap();
    net.add_edge(2, w, 0).unwrap();
    net.add_edge(0, w, 0).unwrap();
    let fam = net.family(w, 0).unwrap();
    assert_eq!(fam.switch.dims(), &[Dim::new(0, 0)]);
    assert_eq!(fam.tail, vec![Dim::new(2, 0)]);
    assert_eq!(net.distribution(w, 0).unwrap().name(), "MultinomialSigmoidMix");
    assert_eq!(net.distribution(1, 0).unwrap().name(), "GaussianMix");
}

#[test]
fn present_cycles_are_refused() {
    let mut net = chain();
    assert!(net.add_edge(2, 0, 0).is_err());
    assert!(net.add_edge(1, 1, 0).is_err());
    assert!(net.add_edge(2, 0, 1).is_err());
    net.set_slices(2).unwrap();
    assert!(net.add_edge(2, 0, 1).is_ok());
}

#[test]
fn edits_mark_junction_tree_stale() {
    let mut net = chain();
    assert!(net.junction_tree().is_ok());
    assert!(!net.junction_template().is_stale());
    net.add_variable("u", VarType::Continuous).unwrap();
    assert!(net.junction_template().is_stale());
}

#[test]
fn evidence_is_announced_and_restored() {
    use std::rc::Rc;
    use std::cell::RefCell;
    let mut net = chain();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    net.subscribe(move |ch| sink.borrow_mut().push(ch.clone()) );
    net.set_evidence(TransientVariable::new(0, 0), Value::Real(1.0), true).unwrap();
    net.store_state();
    net.set_evidence(TransientVariable::new(1, 0), Value::Real(0.5), false).unwrap();
    assert!(net.set_evidence(TransientVariable::new(0, 0), Value::Real(0.5), false).is_err());
    assert_eq!(seen.borrow().len(), 1);
    assert!(net.restore_state(false));
    assert_eq!(net.evidence().len(), 1);
    assert_eq!(net.value(&TransientVariable::new(0, 0)), Some(Value::State(1)));
}

#[test]
fn rollback_restores_distributions() {
    let mut net = chain();
    let before = net.distribution(0, 0).unwrap().clone();
    net.store_state();
    if let ConditionalDistribution::Table(t) = net.distribution_mut(0, 0).unwrap() {
        t.set_prob(&[0], 0.9);
    }
    assert!(net.distribution(0, 0).unwrap() != &before);
    net.store_state();
    assert!(net.restore_state(false));
    assert!(net.distribution(0, 0).unwrap() != &before);
    assert!(net.rollback_state(false));
    assert_eq!(net.distribution(0, 0).unwrap(), &before);
    assert!(!net.rollback_state(false));
}
