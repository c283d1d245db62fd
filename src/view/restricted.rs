use std::collections::BTreeSet;
use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::error::Result;
use crate::model::{Model, Transitions};
use crate::reach::{post_star, PredecessorRelation};
use crate::transformation::{ModelTransformation, StateMapping};
use crate::types::{ModelType, Valuation, VarList};

use super::{View, ViewCore};

/// How the kept set of a [`Restricted`] view is chosen.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Restriction {
    /// Keep exactly the given states; drop every choice with a successor
    /// outside of them.
    Strict,
    /// Close the given states under forward reachability first.
    #[default]
    TransitiveClosure,
    /// Close under backward reachability, then under forward reachability.
    TransitiveClosureSafe,
}

impl Restriction {
    /// The kept set for `include`.
    pub fn state_set(self, model: &dyn Model, include: &StateSet) -> StateSet {
        match self {
            Restriction::Strict => include.clone(),
            Restriction::TransitiveClosure => post_star(model, include),
            Restriction::TransitiveClosureSafe => {
                let backward = PredecessorRelation::new(model).pre_star(include);
                post_star(model, &backward)
            }
        }
    }
}

/// The sub-model on a subset of states, renumbered densely in increasing
/// original order.
#[derive(Clone)]
pub struct Restricted {
    core: ViewCore,
    model: Rc<dyn Model>,
    restriction: Restriction,
    states: Rc<StateSet>,
    to_original: Rc<[usize]>,
    to_restricted: Rc<[Option<usize>]>,
    /// Original states with a transition into a renumbered state.
    redirect: Rc<StateSet>,
    /// With [`Restriction::Strict`], the original choices kept per state.
    kept_choices: Option<Rc<[Vec<usize>]>>,
}

impl Restricted {
    /// # Panics
    ///
    /// Panics if `include` has a member that is not a state of `model`.
    pub fn new(model: Rc<dyn Model>, include: &StateSet, restriction: Restriction) -> Self {
        assert!(
            include.length() <= model.num_states(),
            "state {} out of bounds ({} states)",
            include.length().saturating_sub(1),
            model.num_states()
        );
        let states = restriction.state_set(model.as_ref(), include);
        debug!(
            "Restricted::new({:?}): keeping {} of {} states",
            restriction,
            states.len(),
            model.num_states()
        );

        let mut to_original = Vec::with_capacity(states.len());
        let mut to_restricted = vec![None; model.num_states()];
        let mut renumbered = StateSet::new(model.num_states());
        for (index, state) in states.iter().enumerate() {
            to_restricted[state] = Some(index);
            to_original.push(state);
            if index != state {
                renumbered.insert(state);
            }
        }
        let redirect = PredecessorRelation::new(model.as_ref()).pre(&renumbered);

        let kept_choices = (restriction == Restriction::Strict).then(|| {
            to_original
                .iter()
                .map(|&s| {
                    (0..model.num_choices(s))
                        .filter(|&c| model.all_successors_in_set(s, c, &states))
                        .collect::<Vec<_>>()
                })
                .collect::<Rc<[_]>>()
        });

        Self {
            core: ViewCore::default(),
            model,
            restriction,
            states: Rc::new(states),
            to_original: to_original.into(),
            to_restricted: to_restricted.into(),
            redirect: Rc::new(redirect),
            kept_choices,
        }
    }

    /// Restricts `model` and records the mapping. The states of interest
    /// are the images of `include`.
    pub fn transform(model: Rc<dyn Model>, include: &StateSet, restriction: Restriction) -> ModelTransformation {
        let restricted = Restricted::new(Rc::clone(&model), include, restriction);
        let of_interest = restricted.map_states_to_restricted(include);
        let mapping = StateMapping::Table(Rc::clone(&restricted.to_restricted));
        let transformed: Rc<dyn Model> = Rc::new(restricted);
        ModelTransformation::new(model, transformed, mapping).with_states_of_interest_unchecked(of_interest)
    }

    pub fn restriction(&self) -> Restriction {
        self.restriction
    }

    /// Kept states, as original indices.
    pub fn kept_states(&self) -> &StateSet {
        &self.states
    }

    pub fn map_state_to_original(&self, state: usize) -> Option<usize> {
        self.to_original.get(state).copied()
    }

    pub fn map_state_to_restricted(&self, original: usize) -> Option<usize> {
        self.to_restricted.get(original).copied().flatten()
    }

    pub fn map_states_to_original(&self, states: &StateSet) -> StateSet {
        states.iter().filter_map(|s| self.map_state_to_original(s)).collect()
    }

    /// Images of the kept members of `originals`.
    pub fn map_states_to_restricted(&self, originals: &StateSet) -> StateSet {
        let mut result = StateSet::new(self.to_original.len());
        result.extend(originals.iter().filter_map(|s| self.map_state_to_restricted(s)));
        result
    }

    /// Original choice behind `choice` of restricted `state`, if kept.
    pub fn map_choice_to_original(&self, state: usize, choice: usize) -> Option<usize> {
        match &self.kept_choices {
            Some(kept) => kept[state].get(choice).copied(),
            None => Some(choice),
        }
    }
}

impl View for Restricted {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn apply_deadlock_fix(&mut self) {
        self.model = super::fixed_copy(self);
        let n = self.model.num_states();
        let (to_original, to_restricted) = super::identity_tables(n);
        self.states = Rc::new(StateSet::full(n));
        self.to_original = to_original;
        self.to_restricted = to_restricted;
        self.redirect = Rc::new(StateSet::empty());
        self.kept_choices = None;
        self.restriction = Restriction::TransitiveClosureSafe;
    }
}

impl Model for Restricted {
    fn model_type(&self) -> ModelType {
        self.model.model_type()
    }

    fn num_states(&self) -> usize {
        self.to_original.len()
    }

    fn initial_states(&self) -> StateSet {
        self.map_states_to_restricted(&self.model.initial_states())
    }

    fn is_initial_state(&self, state: usize) -> bool {
        self.model.is_initial_state(self.to_original[state])
    }

    fn deadlock_states(&self) -> StateSet {
        super::deadlock_states(self)
    }

    fn labels(&self) -> BTreeSet<String> {
        self.core.labels(self.model.labels())
    }

    fn label_states(&self, name: &str) -> Option<StateSet> {
        self.core.label_states(name, || {
            self.model
                .label_states(name)
                .map(|states| self.map_states_to_restricted(&states))
        })
    }

    fn num_choices(&self, state: usize) -> usize {
        match &self.kept_choices {
            Some(_) if !self.model_type().is_nondeterministic() => 1,
            Some(kept) => kept[state].len(),
            None => self.model.num_choices(self.to_original[state]),
        }
    }

    fn transitions(&self, state: usize, choice: usize) -> Transitions<'_> {
        let original = self.to_original[state];
        let original_choice = match &self.kept_choices {
            // a dropped Markov chain choice leaves an empty distribution
            Some(kept) if !self.model_type().is_nondeterministic() => match kept[state].first() {
                Some(&c) => c,
                None => return Box::new(std::iter::empty()),
            },
            Some(kept) => kept[state][choice],
            None => choice,
        };
        let transitions = self.model.transitions(original, original_choice);
        if self.redirect.contains(original) {
            let to_restricted = &self.to_restricted;
            Box::new(transitions.filter_map(move |(t, w)| to_restricted[t].map(|r| (r, w))))
        } else {
            transitions
        }
    }

    fn action(&self, state: usize, choice: usize) -> Option<String> {
        let original_choice = self.map_choice_to_original(state, choice)?;
        self.model.action(self.to_original[state], original_choice)
    }

    fn var_list(&self) -> Option<&VarList> {
        self.model.var_list()
    }

    fn state_valuation(&self, state: usize) -> Option<Valuation> {
        self.model.state_valuation(self.to_original[state])
    }

    fn find_deadlocks(&mut self, fix: bool) -> Result<StateSet> {
        super::find_deadlocks(self, fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution;
    use crate::error::ModelError;
    use crate::simple::{MutableModel, SimpleModel};
    use test_log::test;

    /// 0 -> {1: 0.1, 2: 0.9}, 1 -> {1: 0.8, 2: 0.2}, 2 -> {2: 1}, 3 deadlock.
    fn original() -> Rc<dyn Model> {
        let mut m = SimpleModel::new(ModelType::Dtmc, 4);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 1, 0.1).unwrap();
        m.set_probability(0, 2, 0.9).unwrap();
        m.set_probability(1, 2, 0.2).unwrap();
        m.set_probability(1, 1, 0.8).unwrap();
        m.set_probability(2, 2, 1.0).unwrap();
        m.add_label("goal", [2].into_iter().collect()).unwrap();
        Rc::new(m)
    }

    fn set(states: &[usize]) -> StateSet {
        states.iter().copied().collect()
    }

    #[test]
    fn test_transitive_closure() {
        let r = Restricted::new(original(), &set(&[1]), Restriction::TransitiveClosure);
        assert_eq!(r.num_states(), 2);
        assert_eq!(r.map_state_to_original(0), Some(1));
        assert_eq!(r.map_state_to_original(1), Some(2));
        assert_eq!(r.map_state_to_restricted(0), None);
        assert_eq!(r.transitions(0, 0).collect::<Vec<_>>(), vec![(0, 0.8), (1, 0.2)]);
        assert_eq!(r.transitions(1, 0).collect::<Vec<_>>(), vec![(1, 1.0)]);
        assert_eq!(r.label_states("goal"), Some(set(&[1])));
        assert!(r.initial_states().is_empty());
    }

    #[test]
    #[should_panic(expected = "state 6 out of bounds (4 states)")]
    fn test_include_outside_the_model() {
        Restricted::new(original(), &set(&[1, 6]), Restriction::Strict);
    }

    #[test]
    fn test_include_up_to_the_last_state() {
        let r = Restricted::new(original(), &set(&[3]), Restriction::Strict);
        assert_eq!(r.num_states(), 1);
        assert_eq!(r.map_state_to_original(0), Some(3));
    }

    #[test]
    fn test_transitive_closure_safe_adds_predecessors() {
        let r = Restricted::new(original(), &set(&[1]), Restriction::TransitiveClosureSafe);
        assert_eq!(r.kept_states(), &set(&[0, 1, 2]));
        assert_eq!(r.initial_states(), set(&[0]));
        assert_eq!(r.transitions(0, 0).collect::<Vec<_>>(), vec![(1, 0.1), (2, 0.9)]);
    }

    #[test]
    fn test_strict_drops_leaving_choices() {
        // 0 -> 1 -> 0, 2 -> 1
        let mut m = SimpleModel::new(ModelType::Dtmc, 3);
        m.set_probability(0, 1, 1.0).unwrap();
        m.set_probability(1, 0, 1.0).unwrap();
        m.set_probability(2, 1, 1.0).unwrap();
        let r = Restricted::new(Rc::new(m), &set(&[1, 2]), Restriction::Strict);
        assert_eq!(r.num_states(), 2);
        assert_eq!(r.num_choices(0), 1);
        assert_eq!(r.transitions(0, 0).count(), 0);
        assert!(r.is_deadlock_state(0));
        assert_eq!(r.transitions(1, 0).collect::<Vec<_>>(), vec![(0, 1.0)]);
    }

    #[test]
    fn test_strict_mdp_renumbers_choices() {
        let mut m = SimpleModel::new(ModelType::Mdp, 2);
        m.add_choice_with_action(0, Distribution::dirac(1), "out").unwrap();
        m.add_choice_with_action(0, Distribution::dirac(0), "stay").unwrap();
        m.add_choice(1, Distribution::dirac(1)).unwrap();
        let r = Restricted::new(Rc::new(m), &set(&[0]), Restriction::Strict);
        assert_eq!(r.num_choices(0), 1);
        assert_eq!(r.transitions(0, 0).collect::<Vec<_>>(), vec![(0, 1.0)]);
        assert_eq!(r.action(0, 0).as_deref(), Some("stay"));
        assert_eq!(r.map_choice_to_original(0, 0), Some(1));
    }

    #[test]
    fn test_mapping_round_trip() {
        let r = Restricted::new(original(), &set(&[1]), Restriction::TransitiveClosure);
        let x = set(&[0, 1, 2, 3]);
        let kept = r.kept_states().clone();
        assert_eq!(r.map_states_to_original(&r.map_states_to_restricted(&x)), x.intersection(&kept));
    }

    #[test]
    fn test_transform() {
        let t = Restricted::transform(original(), &set(&[1]), Restriction::TransitiveClosure);
        assert_eq!(t.states_of_interest(), Some(&set(&[0])));
        assert_eq!(t.map_to_transformed(2).unwrap(), Some(1));
        assert_eq!(t.map_to_transformed(0).unwrap(), None);
        let projected = t.project_to_original(&[0.5f64, 1.0]).unwrap();
        assert!(projected[0].is_nan());
        assert_eq!(&projected[1..3], &[0.5, 1.0]);
    }

    #[test]
    fn test_fix_deadlocks_is_copy_on_write() {
        let mut r = Restricted::new(original(), &set(&[2, 3]), Restriction::Strict);
        let before = r.clone();
        assert_eq!(r.find_deadlocks(true).unwrap(), set(&[1]));
        assert_eq!(r.transitions(1, 0).collect::<Vec<_>>(), vec![(1, 1.0)]);
        assert_eq!(r.transitions(0, 0).collect::<Vec<_>>(), vec![(0, 1.0)]);
        assert_eq!(r.label_states("goal"), Some(set(&[0])));
        // the clone taken before is untouched
        assert_eq!(before.transitions(1, 0).count(), 0);
        assert!(matches!(r.find_deadlocks(true), Err(ModelError::DeadlocksAlreadyFixed)));
        assert!(r.check_for_deadlocks(None).is_ok());
    }
}
