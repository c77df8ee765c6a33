use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use thiserror::Error;
use super::*;

/// Realization of a single variable instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    State(usize),
    Real(f64)
}

impl Value {

    /// Converts the value to the representation of the informed variable type. Integral reals
    /// within range are accepted as states; states are accepted as reals.
    pub fn coerce(self, kind : &VarType) -> Option<Value> {
        match (self, kind) {
            (Value::State(s), VarType::Discrete(n)) if s < *n => Some(Value::State(s)),
            (Value::Real(x), VarType::Discrete(n)) => {
                if x.fract() == 0.0 && x >= 0.0 && (x as usize) < *n {
                    Some(Value::State(x as usize))
                } else {
                    None
                }
            },
            (Value::State(s), VarType::Continuous) => Some(Value::Real(s as f64)),
            (Value::Real(x), VarType::Continuous) if x.is_finite() => Some(Value::Real(x)),
            _ => None
        }
    }

    pub fn state(&self) -> Option<usize> {
        match self {
            Value::State(s) => Some(*s),
            Value::Real(_) => None
        }
    }

    pub fn real(&self) -> Option<f64> {
        match self {
            Value::Real(x) => Some(*x),
            Value::State(_) => None
        }
    }

}

impl Display for Value {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::State(s) => write!(f, "state {}", s),
            Value::Real(x) => write!(f, "{}", x)
        }
    }

}

#[derive(Debug, Clone, Error)]
pub enum EvidenceError {

    #[error("Value {value} cannot be coerced to the type of {var}")]
    Parse { var : TransientVariable, value : Value },

    #[error("Unknown variable {0}")]
    UnknownVariable(VariableId),

    #[error("Trial {0} does not exist")]
    UnknownTrial(usize),

    #[error("Observation at time {time} outside trial of length {length}")]
    OutOfTrial { time : usize, length : usize }

}

/// Observed values of the network variable instances.
pub type Evidence = BTreeMap<TransientVariable, Value>;

/// Notification sent to network observers when evidence is announced.
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceChange {
    Set(TransientVariable, Value),
    Cleared
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {

    pub var : VariableId,

    pub time : usize,

    pub value : Value

}

/// The recorded evidence of one trial: a number of time slices and the values
/// observed within them. Variable instances without an observation are hidden.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trial {

    length : usize,

    observations : Vec<Observation>

}

impl Trial {

    pub fn new(length : usize) -> Self {
        Self { length, observations : Vec::new() }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations[..]
    }

    pub fn observe(&mut self, var : VariableId, time : usize, value : Value) -> Result<(), EvidenceError> {
        if time >= self.length {
            return Err(EvidenceError::OutOfTrial { time, length : self.length });
        }
        self.observations.push(Observation { var, time, value });
        Ok(())
    }

    /// Removes the observations of a variable, turning it hidden over the whole trial.
    pub fn hide(&mut self, var : VariableId) {
        self.observations.retain(|o| o.var != var );
    }

}

/// Access to the evidence of a set of trials.
pub trait EvidenceProvider {

    fn number_of_trials(&self) -> usize;

    /// Number of time slices of the informed trial.
    fn trial_length(&self, trial : usize) -> Result<usize, EvidenceError>;

    /// Replaces the network evidence by the evidence of the informed trial. Observers are
    /// only notified when announce is true.
    fn set_all_evidence(&self, model : &mut Network, trial : usize, announce : bool) -> Result<(), EvidenceError>;

}

/// In-memory evidence provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialSet {

    trials : Vec<Trial>

}

impl TrialSet {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trial : Trial) {
        self.trials.push(trial);
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials[..]
    }

    pub fn trials_mut(&mut self) -> &mut [Trial] {
        &mut self.trials[..]
    }

    pub fn from_json(content : &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

}

impl From<Vec<Trial>> for TrialSet {

    fn from(trials : Vec<Trial>) -> Self {
        Self { trials }
    }

}

impl EvidenceProvider for TrialSet {

    fn number_of_trials(&self) -> usize {
        self.trials.len()
    }

    fn trial_length(&self, trial : usize) -> Result<usize, EvidenceError> {
        self.trials.get(trial).map(|t| t.length ).ok_or(EvidenceError::UnknownTrial(trial))
    }

    fn set_all_evidence(&self, model : &mut Network, trial : usize, announce : bool) -> Result<(), EvidenceError> {
        let t = self.trials.get(trial).ok_or(EvidenceError::UnknownTrial(trial))?;
        model.clear_evidence(announce);
        model.set_horizon(t.length);
        for obs in t.observations.iter() {
            model.set_evidence(TransientVariable::new(obs.var, obs.time as i32), obs.value, announce)?;
        }
        Ok(())
    }

}

#[test]
fn coercion_rules() {
    let disc = VarType::Discrete(3);
    assert_eq!(Value::Real(2.0).coerce(&disc), Some(Value::State(2)));
    assert_eq!(Value::Real(2.5).coerce(&disc), None);
    assert_eq!(Value::State(3).coerce(&disc), None);
    assert_eq!(Value::State(1).coerce(&VarType::Continuous), Some(Value::Real(1.0)));
    assert_eq!(Value::Real(f64::NAN).coerce(&VarType::Continuous), None);
}

#[test]
fn trial_set_serializes() {
    let mut trial = Trial::new(2);
    trial.observe(0, 1, Value::State(1)).unwrap();
    assert!(trial.observe(0, 2, Value::State(1)).is_err());
    let set = TrialSet::from(vec![trial]);
    let json = set.to_json().unwrap();
    assert_eq!(TrialSet::from_json(&json).unwrap(), set);
}
