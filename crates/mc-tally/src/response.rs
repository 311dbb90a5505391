//! Response functions applied to a raw score before binning.

use mc_core::{Error, ParticleState, Result};
use serde::{Deserialize, Serialize};

/// Scalar weighting of a particle at an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseKind {
    /// Identity (1 everywhere).
    Unit,
    /// Multiply by the particle energy.
    Energy,
    /// 1 if `lower <= E < upper`, else 0.
    EnergyWindow {
        /// Lower energy (inclusive).
        lower: f64,
        /// Upper energy (exclusive).
        upper: f64,
    },
    /// Constant factor.
    Constant {
        /// Factor applied to every score.
        value: f64,
    },
}

/// A named response function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFunction {
    /// Name used in summaries and the tally store.
    pub name: String,
    /// Evaluation rule.
    pub kind: ResponseKind,
}

impl ResponseFunction {
    /// Named response function.
    pub fn new(name: impl Into<String>, kind: ResponseKind) -> Self {
        Self { name: name.into(), kind }
    }

    /// The identity response.
    pub fn unit() -> Self {
        Self::new("default", ResponseKind::Unit)
    }

    /// Evaluate against `particle`.
    #[inline]
    pub fn evaluate(&self, particle: &ParticleState) -> f64 {
        match self.kind {
            ResponseKind::Unit => 1.0,
            ResponseKind::Energy => particle.energy,
            ResponseKind::EnergyWindow { lower, upper } => {
                if particle.energy >= lower && particle.energy < upper { 1.0 } else { 0.0 }
            }
            ResponseKind::Constant { value } => value,
        }
    }

    fn validate(&self) -> Result<()> {
        match self.kind {
            ResponseKind::EnergyWindow { lower, upper } if !(lower < upper) => {
                Err(Error::Validation(format!(
                    "response '{}': energy window [{lower}, {upper}) is empty",
                    self.name
                )))
            }
            ResponseKind::Constant { value } if !value.is_finite() => Err(Error::Validation(
                format!("response '{}': constant must be finite", self.name),
            )),
            _ => Ok(()),
        }
    }
}

/// Ordered, non-empty list of response functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFunctionSet {
    functions: Vec<ResponseFunction>,
}

impl Default for ResponseFunctionSet {
    fn default() -> Self {
        Self { functions: vec![ResponseFunction::unit()] }
    }
}

impl ResponseFunctionSet {
    /// Build from an ordered list (must be non-empty).
    pub fn new(functions: Vec<ResponseFunction>) -> Result<Self> {
        if functions.is_empty() {
            return Err(Error::Validation("at least one response function is required".into()));
        }
        for f in &functions {
            f.validate()?;
        }
        Ok(Self { functions })
    }

    /// Number of response functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Always false: the set is non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Response function `index`.
    pub fn get(&self, index: usize) -> Option<&ResponseFunction> {
        self.functions.get(index)
    }

    /// Iterate in persisted order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResponseFunction> {
        self.functions.iter()
    }

    /// Names in persisted order.
    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::ParticleType;

    #[test]
    fn test_default_is_single_unit() {
        let set = ResponseFunctionSet::default();
        assert_eq!(set.len(), 1);
        assert_eq!(set.names(), vec!["default".to_string()]);
        let p = ParticleState::new(0, ParticleType::Photon).with_energy(3.0);
        assert_eq!(set.get(0).unwrap().evaluate(&p), 1.0);
    }

    #[test]
    fn test_evaluate_kinds() {
        let p = ParticleState::new(0, ParticleType::Neutron).with_energy(2.0);
        let set = ResponseFunctionSet::new(vec![
            ResponseFunction::unit(),
            ResponseFunction::new("energy", ResponseKind::Energy),
            ResponseFunction::new("fast", ResponseKind::EnergyWindow { lower: 1.0, upper: 20.0 }),
            ResponseFunction::new(
                "thermal",
                ResponseKind::EnergyWindow { lower: 0.0, upper: 1e-6 },
            ),
            ResponseFunction::new("half", ResponseKind::Constant { value: 0.5 }),
        ])
        .unwrap();
        let out: Vec<f64> = set.iter().map(|f| f.evaluate(&p)).collect();
        assert_eq!(out, vec![1.0, 2.0, 1.0, 0.0, 0.5]);
    }

    #[test]
    fn test_rejects_empty_and_malformed() {
        assert!(ResponseFunctionSet::new(vec![]).is_err());
        let bad = ResponseFunction::new("w", ResponseKind::EnergyWindow { lower: 2.0, upper: 1.0 });
        assert!(ResponseFunctionSet::new(vec![bad]).is_err());
    }
}
