//! Rates of continuous-time Markov chains and the discrete-time chains
//! derived from them.
//!
//! The exit rate of a state is the sum of its outgoing rates, self loops
//! included. [`embedded`] gives the jump chain; [`uniformised_dtmc`] the
//! discrete-time chain `P = I + Q/q`.

use std::collections::BTreeSet;
use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::distribution::Distribution;
use crate::error::{ModelError, Result};
use crate::model::{Model, Transitions};
use crate::types::{ModelType, Valuation, VarList};
use crate::view::{AlteredDistributions, View, ViewCore};

/// Uniformisation rates are this factor above the maximal exit rate.
pub const UNIFORMISATION_FACTOR: f64 = 1.02;

pub fn exit_rate<M: Model + ?Sized>(model: &M, state: usize) -> f64 {
    model.transitions(state, 0).map(|(_, w)| w).sum()
}

/// Sum of the rates leaving `state` for other states.
pub fn off_diagonal_rate<M: Model + ?Sized>(model: &M, state: usize) -> f64 {
    model
        .transitions(state, 0)
        .filter(|&(t, _)| t != state)
        .map(|(_, w)| w)
        .sum()
}

/// Maximal exit rate over `subset` (all states if `None`); `-∞` if empty.
pub fn max_exit_rate<M: Model + ?Sized>(model: &M, subset: Option<&StateSet>) -> f64 {
    let rate = |s| exit_rate(model, s);
    match subset {
        None => (0..model.num_states()).map(rate).fold(f64::NEG_INFINITY, f64::max),
        Some(set) => set.iter().map(rate).fold(f64::NEG_INFINITY, f64::max),
    }
}

pub fn default_uniformisation_rate<M: Model + ?Sized>(model: &M, subset: Option<&StateSet>) -> f64 {
    UNIFORMISATION_FACTOR * max_exit_rate(model, subset)
}

fn require_ctmc(model: &dyn Model, operation: &'static str) -> Result<()> {
    if model.model_type() != ModelType::Ctmc {
        return Err(ModelError::Unsupported {
            model_type: model.model_type().to_string(),
            operation,
        });
    }
    Ok(())
}

/// The CTMC with every self loop set to `q - Σ off-diagonal rates`, so that
/// every state has exit rate `q`.
pub fn uniformised(model: Rc<dyn Model>, q: f64) -> Result<AlteredDistributions> {
    require_ctmc(model.as_ref(), "uniformise")?;
    debug!("uniformised(q = {})", q);
    let inner = Rc::clone(&model);
    Ok(AlteredDistributions::new(model, move |state, _| {
        let mut distribution = Distribution::from_transitions(inner.transitions(state, 0));
        let diagonal = q - off_diagonal_rate(inner.as_ref(), state);
        distribution.set(state, diagonal.max(0.0)).ok()?;
        Some(distribution)
    }))
}

/// How a [`DerivedDtmc`] reads its CTMC.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Derivation {
    /// Rates divided by the exit rate; states with exit rate 0 loop.
    Embedded,
    /// Rates divided by `q`, remaining mass on the self loop.
    Uniformised(f64),
}

/// A DTMC computed on demand from a CTMC.
#[derive(Clone)]
pub struct DerivedDtmc {
    core: ViewCore,
    model: Rc<dyn Model>,
    derivation: Option<Derivation>,
}

/// The embedded (jump) DTMC of a CTMC.
pub fn embedded(model: Rc<dyn Model>) -> Result<DerivedDtmc> {
    require_ctmc(model.as_ref(), "build embedded DTMC")?;
    Ok(DerivedDtmc {
        core: ViewCore::default(),
        model,
        derivation: Some(Derivation::Embedded),
    })
}

/// The uniformised DTMC `I + Q/q` of a CTMC.
pub fn uniformised_dtmc(model: Rc<dyn Model>, q: f64) -> Result<DerivedDtmc> {
    require_ctmc(model.as_ref(), "build uniformised DTMC")?;
    Ok(DerivedDtmc {
        core: ViewCore::default(),
        model,
        derivation: Some(Derivation::Uniformised(q)),
    })
}

impl DerivedDtmc {
    /// `None` once deadlocks have been fixed: the underlying model is then a
    /// DTMC already.
    pub fn derivation(&self) -> Option<Derivation> {
        self.derivation
    }

    fn derived(&self, state: usize, derivation: Derivation) -> Distribution {
        let model = self.model.as_ref();
        match derivation {
            Derivation::Embedded => {
                let rate = exit_rate(model, state);
                if rate == 0.0 {
                    return Distribution::dirac(state);
                }
                let mut distribution = Distribution::from_transitions(model.transitions(state, 0));
                distribution.scale(rate);
                distribution
            }
            Derivation::Uniformised(q) => {
                let mut distribution = Distribution::from_transitions(model.transitions(state, 0));
                distribution.scale(q);
                let d = off_diagonal_rate(model, state);
                if d < q {
                    // positive, so never rejected
                    distribution.set(state, 1.0 - d / q).ok();
                }
                distribution
            }
        }
    }
}

impl View for DerivedDtmc {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn apply_deadlock_fix(&mut self) {
        self.model = crate::view::fixed_copy(self);
        self.derivation = None;
    }
}

impl Model for DerivedDtmc {
    fn model_type(&self) -> ModelType {
        ModelType::Dtmc
    }

    fn num_states(&self) -> usize {
        self.model.num_states()
    }

    fn initial_states(&self) -> StateSet {
        self.model.initial_states()
    }

    fn is_initial_state(&self, state: usize) -> bool {
        self.model.is_initial_state(state)
    }

    fn deadlock_states(&self) -> StateSet {
        crate::view::deadlock_states(self)
    }

    fn labels(&self) -> BTreeSet<String> {
        self.core.labels(self.model.labels())
    }

    fn label_states(&self, name: &str) -> Option<StateSet> {
        self.core.label_states(name, || self.model.label_states(name))
    }

    fn num_choices(&self, _state: usize) -> usize {
        1
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        match self.derivation {
            Some(derivation) => Box::new(self.derived(state, derivation).into_iter()),
            None => self.model.transitions(state, choice),
        }
    }

    fn var_list(&self) -> Option<&VarList> {
        self.model.var_list()
    }

    fn state_valuation(&self, state: usize) -> Option<Valuation> {
        self.model.state_valuation(state)
    }

    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet> {
        crate::view::find_deadlocks(self, fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_STOCHASTIC_TOLERANCE;
    use crate::simple::{MutableModel, SimpleModel};
    use test_log::test;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    /// 0 -> {1: 2, 2: 2}, 1 -> {0: 1, 1: 3}, 2 absorbing
    fn ctmc() -> Rc<dyn Model> {
        let mut m = SimpleModel::new(ModelType::Ctmc, 3);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 1, 2.0).unwrap();
        m.set_probability(0, 2, 2.0).unwrap();
        m.set_probability(1, 0, 1.0).unwrap();
        m.set_probability(1, 1, 3.0).unwrap();
        Rc::new(m)
    }

    #[test]
    fn test_exit_rates() {
        let m = ctmc();
        assert_eq!(exit_rate(m.as_ref(), 0), 4.0);
        assert_eq!(exit_rate(m.as_ref(), 1), 4.0);
        assert_eq!(exit_rate(m.as_ref(), 2), 0.0);
        assert_eq!(off_diagonal_rate(m.as_ref(), 1), 1.0);
        assert_eq!(max_exit_rate(m.as_ref(), None), 4.0);
        assert_eq!(max_exit_rate(m.as_ref(), Some(&StateSet::singleton(2))), 0.0);
        assert_eq!(max_exit_rate(m.as_ref(), Some(&StateSet::empty())), f64::NEG_INFINITY);
        assert!(approx_eq(default_uniformisation_rate(m.as_ref(), None), 4.08));
    }

    #[test]
    fn test_embedded() {
        let e = embedded(ctmc()).unwrap();
        assert_eq!(e.model_type(), ModelType::Dtmc);
        assert_eq!(e.transitions(0, 0).collect::<Vec<_>>(), vec![(1, 0.5), (2, 0.5)]);
        assert_eq!(e.transitions(1, 0).collect::<Vec<_>>(), vec![(0, 0.25), (1, 0.75)]);
        assert_eq!(e.transitions(2, 0).collect::<Vec<_>>(), vec![(2, 1.0)]);
        assert!(e.check_stochastic(DEFAULT_STOCHASTIC_TOLERANCE).is_ok());
    }

    #[test]
    fn test_uniformised_dtmc() {
        let u = uniformised_dtmc(ctmc(), 8.0).unwrap();
        let row: Vec<_> = u.transitions(0, 0).collect();
        assert_eq!(row, vec![(0, 0.5), (1, 0.25), (2, 0.25)]);
        let row: Vec<_> = u.transitions(1, 0).collect();
        assert_eq!(row, vec![(0, 0.125), (1, 0.875)]);
        assert_eq!(u.transitions(2, 0).collect::<Vec<_>>(), vec![(2, 1.0)]);
        assert!(u.check_stochastic(1e-12).is_ok());
    }

    #[test]
    fn test_uniformised_ctmc() {
        let u = uniformised(ctmc(), 5.0).unwrap();
        assert_eq!(u.model_type(), ModelType::Ctmc);
        for s in 0..3 {
            assert!(approx_eq(exit_rate(&u, s), 5.0));
        }
    }

    #[test]
    fn test_requires_ctmc() {
        let dtmc: Rc<dyn Model> = Rc::new(SimpleModel::new(ModelType::Dtmc, 1));
        assert!(matches!(embedded(dtmc), Err(ModelError::Unsupported { .. })));
    }
}
