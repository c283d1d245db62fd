use std::collections::BTreeSet;
use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::distribution::Distribution;
use crate::equivalence::EquivalenceRelation;
use crate::error::{ModelError, Result};
use crate::model::{Model, Transitions};
use crate::reach::PredecessorRelation;
use crate::transformation::{ModelTransformation, StateMapping};
use crate::types::{ModelType, Valuation, VarList};

use super::{Restricted, Restriction, View, ViewCore};

/// The quotient of a model by an equivalence relation.
///
/// Every class is represented by its lowest member, which collects the
/// transitions of all members, with targets redirected to their
/// representatives and merged. Non-representatives keep their index but
/// lose all transitions; use [`Quotient::transform`] with
/// `remove_non_representatives` to drop them.
///
/// With `normalize`, a merged Markov chain distribution whose sum exceeds 1
/// is divided by its sum. Sums of at most 1 are left unscaled.
#[derive(Clone)]
pub struct Quotient {
    core: ViewCore,
    model: Rc<dyn Model>,
    relation: Rc<EquivalenceRelation>,
    normalize: bool,
    has_transition_to_non_representative: Rc<StateSet>,
}

impl Quotient {
    pub fn new(model: Rc<dyn Model>, relation: &EquivalenceRelation, normalize: bool) -> Result<Self> {
        if relation.num_states() != model.num_states() {
            return Err(ModelError::InvalidEquivalence(format!(
                "relation over {} states for a model with {} states",
                relation.num_states(),
                model.num_states()
            )));
        }
        debug!(
            "Quotient::new({} states, {} classes, normalize = {})",
            model.num_states(),
            relation.num_classes(),
            normalize
        );
        let has_transition_to_non_representative =
            PredecessorRelation::new(model.as_ref()).pre(relation.non_representatives());
        Ok(Self {
            core: ViewCore::default(),
            model,
            relation: Rc::new(relation.clone()),
            normalize,
            has_transition_to_non_representative: Rc::new(has_transition_to_non_representative),
        })
    }

    /// The quotient transformation. Original states map to their
    /// representatives. With `remove_non_representatives`, the quotient is
    /// further restricted to the representatives.
    pub fn transform(
        model: Rc<dyn Model>,
        relation: &EquivalenceRelation,
        normalize: bool,
        remove_non_representatives: bool,
    ) -> Result<ModelTransformation> {
        let quotient: Rc<dyn Model> = Rc::new(Quotient::new(Rc::clone(&model), relation, normalize)?);
        let mapping: StateMapping = (0..model.num_states())
            .map(|s| Some(relation.representative(s)))
            .collect::<Vec<_>>()
            .into();
        let transformation = ModelTransformation::new(model, Rc::clone(&quotient), mapping);
        if !remove_non_representatives {
            return Ok(transformation);
        }
        let restriction = Restricted::transform(
            quotient,
            &relation.representatives(),
            Restriction::TransitiveClosureSafe,
        );
        Ok(restriction.compose(&transformation))
    }

    pub fn relation(&self) -> &EquivalenceRelation {
        &self.relation
    }

    /// Original states with a transition into a non-representative.
    pub fn has_transition_to_non_representative(&self) -> &StateSet {
        &self.has_transition_to_non_representative
    }

    /// Transitions of `choice` of `state` in the underlying model, with
    /// targets redirected to representatives where needed.
    fn redirected(&self, state: usize, choice: usize) -> Transitions<'_> {
        let transitions = self.model.transitions(state, choice);
        if self.has_transition_to_non_representative.contains(state) {
            let relation = &self.relation;
            Box::new(transitions.map(move |(t, w)| (relation.representative(t), w)))
        } else {
            transitions
        }
    }

    /// Member state and its choice behind `choice` of representative `state`.
    fn member_choice(&self, state: usize, choice: usize) -> Option<(usize, usize)> {
        let mut remaining = choice;
        for member in self.relation.class_or_singleton(state).iter() {
            let k = self.model.num_choices(member);
            if remaining < k {
                return Some((member, remaining));
            }
            remaining -= k;
        }
        None
    }
}

impl View for Quotient {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn apply_deadlock_fix(&mut self) {
        self.model = super::fixed_copy(self);
        self.relation = Rc::new(EquivalenceRelation::identity(self.model.num_states()));
        self.normalize = false;
        self.has_transition_to_non_representative = Rc::new(StateSet::empty());
    }
}

impl Model for Quotient {
    fn model_type(&self) -> ModelType {
        self.model.model_type()
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
        super::deadlock_states(self)
    }

    fn labels(&self) -> BTreeSet<String> {
        self.core.labels(self.model.labels())
    }

    fn label_states(&self, name: &str) -> Option<StateSet> {
        self.core.label_states(name, || self.model.label_states(name))
    }

    fn num_choices(&self, state: usize) -> usize {
        if !self.model_type().is_nondeterministic() {
            return 1;
        }
        if !self.relation.is_representative(state) {
            return 0;
        }
        self.relation
            .class_or_singleton(state)
            .iter()
            .map(|member| self.model.num_choices(member))
            .sum()
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        if !self.relation.is_representative(state) {
            return Box::new(std::iter::empty());
        }
        if self.model_type().is_nondeterministic() {
            return match self.member_choice(state, choice) {
                Some((member, member_choice)) => {
                    Box::new(Distribution::from_transitions(self.redirected(member, member_choice)).into_iter())
                }
                None => panic!("choice {} of state {} out of bounds", choice, state),
            };
        }
        match self.relation.class(state) {
            None if !self.has_transition_to_non_representative.contains(state) => self.model.transitions(state, 0),
            None => Box::new(Distribution::from_transitions(self.redirected(state, 0)).into_iter()),
            Some(class) => {
                let mut distribution =
                    Distribution::from_transitions(class.iter().flat_map(|member| self.redirected(member, 0)));
                if self.normalize {
                    let sum = distribution.sum();
                    if sum > 1.0 {
                        distribution.scale(sum);
                    }
                }
                Box::new(distribution.into_iter())
            }
        }
    }

    fn action(&self, state: usize, choice: usize) -> Option<String> {
        if !self.model_type().is_nondeterministic() {
            return self.model.action(state, choice);
        }
        let (member, member_choice) = self.member_choice(state, choice)?;
        self.model.action(member, member_choice)
    }

    fn var_list(&self) -> Option<&VarList> {
        self.model.var_list()
    }

    fn state_valuation(&self, state: usize) -> Option<Valuation> {
        self.model.state_valuation(state)
    }

    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet> {
        super::find_deadlocks(self, fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{MutableModel, SimpleModel};
    use test_log::test;

    fn set(states: &[usize]) -> StateSet {
        states.iter().copied().collect()
    }

    /// 0 -> {1: 0.5, 2: 0.5}, 1 -> {3: 1}, 2 -> {3: 0.6, 0: 0.4}, 3 -> {3: 1}
    fn model() -> Rc<dyn Model> {
        let mut m = SimpleModel::new(ModelType::Dtmc, 4);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 1, 0.5).unwrap();
        m.set_probability(0, 2, 0.5).unwrap();
        m.set_probability(1, 3, 1.0).unwrap();
        m.set_probability(2, 3, 0.6).unwrap();
        m.set_probability(2, 0, 0.4).unwrap();
        m.set_probability(3, 3, 1.0).unwrap();
        Rc::new(m)
    }

    #[test]
    fn test_redirect_and_merge() {
        let relation = EquivalenceRelation::new([set(&[1, 2])], 4).unwrap();
        let q = Quotient::new(model(), &relation, false).unwrap();
        assert_eq!(q.has_transition_to_non_representative(), &set(&[0]));
        // 0 -> {1: 0.5} + {1: 0.5}
        assert_eq!(q.transitions(0, 0).collect::<Vec<_>>(), vec![(1, 1.0)]);
        // class {1, 2}: {3: 1} + {3: 0.6, 0: 0.4}, not normalized
        let merged: Vec<_> = q.transitions(1, 0).collect();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], (0, 0.4));
        assert!((merged[1].1 - 1.6).abs() < 1e-12);
        // non-representative is a deadlock
        assert_eq!(q.transitions(2, 0).count(), 0);
        assert!(q.deadlock_states().contains(2));
    }

    #[test]
    fn test_normalization_only_above_one() {
        let relation = EquivalenceRelation::new([set(&[1, 2])], 4).unwrap();
        let q = Quotient::new(model(), &relation, true).unwrap();
        let merged: Vec<_> = q.transitions(1, 0).collect();
        assert!((merged[0].1 - 0.4 / 2.0).abs() < 1e-12);
        assert!((merged[1].1 - 1.6 / 2.0).abs() < 1e-12);

        // a merged sum below 1 stays unscaled
        let mut m = SimpleModel::new(ModelType::Dtmc, 3);
        m.set_probability(0, 2, 0.3).unwrap();
        m.set_probability(1, 2, 0.2).unwrap();
        let relation = EquivalenceRelation::new([set(&[0, 1])], 3).unwrap();
        let q = Quotient::new(Rc::new(m), &relation, true).unwrap();
        let merged: Vec<_> = q.transitions(0, 0).collect();
        assert_eq!(merged.len(), 1);
        assert!((merged[0].1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_identity_relation() {
        let m = model();
        let q = Quotient::new(Rc::clone(&m), &EquivalenceRelation::identity(4), true).unwrap();
        for s in 0..4 {
            assert_eq!(q.transitions(s, 0).collect::<Vec<_>>(), m.transitions(s, 0).collect::<Vec<_>>());
        }
        assert!(q.has_transition_to_non_representative().is_empty());
    }

    #[test]
    fn test_size_mismatch() {
        assert!(matches!(
            Quotient::new(model(), &EquivalenceRelation::identity(3), false),
            Err(ModelError::InvalidEquivalence(_))
        ));
    }

    #[test]
    fn test_transform_removing_non_representatives() {
        let relation = EquivalenceRelation::new([set(&[1, 2])], 4).unwrap();
        let t = Quotient::transform(model(), &relation, true, true).unwrap();
        let q = t.transformed();
        assert_eq!(q.num_states(), 3);
        assert_eq!(t.map_to_transformed(2).unwrap(), Some(1));
        assert_eq!(t.map_to_transformed(3).unwrap(), Some(2));
        assert_eq!(q.transitions(0, 0).collect::<Vec<_>>(), vec![(1, 1.0)]);
        let values = t.project_to_original(&[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(values, vec![0.1, 0.2, 0.2, 0.3]);
    }

    #[test]
    fn test_mdp_collects_member_choices() {
        let mut m = SimpleModel::new(ModelType::Mdp, 3);
        m.add_choice_with_action(0, Distribution::dirac(2), "a").unwrap();
        m.add_choice_with_action(1, Distribution::dirac(0), "b").unwrap();
        m.add_choice_with_action(1, Distribution::dirac(1), "c").unwrap();
        m.add_choice(2, Distribution::dirac(2)).unwrap();
        let relation = EquivalenceRelation::new([set(&[0, 1])], 3).unwrap();
        let q = Quotient::new(Rc::new(m), &relation, false).unwrap();
        assert_eq!(q.num_choices(0), 3);
        assert_eq!(q.num_choices(1), 0);
        assert_eq!(q.transitions(0, 2).collect::<Vec<_>>(), vec![(0, 1.0)]);
        assert_eq!(q.action(0, 1).as_deref(), Some("b"));
    }
}
