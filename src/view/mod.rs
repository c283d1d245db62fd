//! Lazy model views.
//!
//! A view is a [`Model`] computed on demand from one or more underlying
//! models plus a mapping. Building one costs O(1) or one linear pass; no
//! view copies the transition function. Views stack: a view over a view
//! adds one level of delegation per query.
//!
//! | View | Changes | Setup |
//! |------|---------|-------|
//! | [`Restricted`] | keeps a subset of states, renumbered densely | reachability pass |
//! | [`DisjointUnion`] | concatenates two state spaces | O(1) |
//! | [`AlteredDistributions`] | replaces selected distributions | O(1) |
//! | [`AdditionalStates`] | appends fresh deadlock states | O(1) |
//! | [`Quotient`] | merges equivalence classes into representatives | one pass |
//! | [`DroppedChoices`] | hides MDP choices | one pass |
//!
//! [`choices_to_states`] and [`selected_choices_to_states`] compose these
//! to give every MDP choice an intermediate state of its own.
//!
//! # Deadlocks
//!
//! Views are immutable except for one transition: [`Model::find_deadlocks`]
//! with `fix = true` clones the view, wraps the clone in
//! [`AlteredDistributions::fix_deadlocks`] and makes that the new underlying
//! model with an identity mapping. Other holders of the unfixed view (or of
//! a clone made earlier) are not affected. A second fix fails with
//! [`ModelError::DeadlocksAlreadyFixed`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use pmc_rs::model::Model;
//! use pmc_rs::simple::SimpleModel;
//! use pmc_rs::types::ModelType;
//! use pmc_rs::view::{DisjointUnion, Restricted, Restriction};
//!
//! let mut m = SimpleModel::new(ModelType::Dtmc, 3);
//! m.set_probability(0, 1, 1.0).unwrap();
//! m.set_probability(1, 2, 1.0).unwrap();
//! m.set_probability(2, 2, 1.0).unwrap();
//! let m: Rc<dyn Model> = Rc::new(m);
//!
//! let tail = Restricted::new(m.clone(), &[1, 2].into_iter().collect(), Restriction::Strict);
//! let union = DisjointUnion::new(m, Rc::new(tail)).unwrap();
//! assert_eq!(union.num_states(), 5);
//! assert_eq!(union.transitions(3, 0).collect::<Vec<_>>(), vec![(4, 1.0)]);
//! ```

mod additional;
mod altered;
mod choices;
mod dropped;
mod quotient;
mod restricted;
mod union;

pub use additional::AdditionalStates;
pub use altered::{AlteredDistributions, Alteration};
pub use choices::{choices_to_states, selected_choices_to_states};
pub use dropped::DroppedChoices;
pub use quotient::Quotient;
pub use restricted::{Restricted, Restriction};
pub use union::DisjointUnion;

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::error::{ModelError, Result};
use crate::model::{structural_deadlocks, Model};

/// Bookkeeping shared by all views: labels added to the view itself, the
/// recorded deadlock states and whether they have been fixed.
#[derive(Debug, Clone, Default)]
pub struct ViewCore {
    labels: BTreeMap<String, StateSet>,
    deadlocks: StateSet,
    fixed_deadlocks: bool,
}

impl ViewCore {
    pub fn add_label(&mut self, name: &str, states: StateSet) {
        self.labels.insert(name.to_string(), states);
    }

    /// Own labels merged with those of the underlying model(s).
    pub fn labels(&self, underlying: BTreeSet<String>) -> BTreeSet<String> {
        let mut result = underlying;
        result.extend(self.labels.keys().cloned());
        result
    }

    /// Own labels take precedence over underlying ones of the same name.
    pub fn label_states(&self, name: &str, underlying: impl FnOnce() -> Option<StateSet>) -> Option<StateSet> {
        match self.labels.get(name) {
            Some(states) => Some(states.clone()),
            None => underlying(),
        }
    }

    pub fn recorded_deadlocks(&self) -> &StateSet {
        &self.deadlocks
    }

    pub fn fixed_deadlocks(&self) -> bool {
        self.fixed_deadlocks
    }
}

/// A model computed from other models.
pub trait View: Model + Clone + 'static {
    fn core(&self) -> &ViewCore;

    fn core_mut(&mut self) -> &mut ViewCore;

    /// Replaces the underlying model(s) by a deadlock-fixed copy of this view
    /// and resets the mapping to the identity.
    fn apply_deadlock_fix(&mut self);

    fn add_label(&mut self, name: &str, states: StateSet) -> Result<()> {
        if states.length() > self.num_states() {
            return Err(ModelError::StateOutOfBounds {
                state: states.length() - 1,
                num_states: self.num_states(),
            });
        }
        self.core_mut().add_label(name, states);
        Ok(())
    }
}

/// A deadlock-trapping view over a shallow copy of `view`.
pub(crate) fn fixed_copy<V: View>(view: &V) -> Rc<dyn Model> {
    let copy: Rc<dyn Model> = Rc::new(view.clone());
    Rc::new(AlteredDistributions::fix_deadlocks(copy))
}

/// Recorded deadlocks together with the current structural ones.
pub(crate) fn deadlock_states<V: View>(view: &V) -> StateSet {
    view.core().deadlocks.union(&structural_deadlocks(view))
}

/// Shared implementation of [`Model::find_deadlocks`] for views.
pub(crate) fn find_deadlocks<V: View>(view: &mut V, fix: bool) -> Result<StateSet> {
    let found = structural_deadlocks(view);
    debug!("view find_deadlocks(fix = {}): {} deadlock states", fix, found.len());
    if fix {
        if view.core().fixed_deadlocks {
            return Err(ModelError::DeadlocksAlreadyFixed);
        }
        if !found.is_empty() {
            view.apply_deadlock_fix();
        }
        view.core_mut().fixed_deadlocks = true;
    }
    let core = view.core_mut();
    core.deadlocks.union_with(&found);
    Ok(core.deadlocks.clone())
}

/// Identity lookup tables of length `n`.
pub(crate) fn identity_tables(n: usize) -> (Rc<[usize]>, Rc<[Option<usize>]>) {
    ((0..n).collect(), (0..n).map(Some).collect())
}
