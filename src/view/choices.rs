//! Splitting MDP choices into states of their own.
//!
//! Every choice `c` of a state `s` is routed through an intermediate state
//! that has `c`'s distribution as its only choice. The intermediate states
//! come from one [`DroppedChoices`] replica per choice index, glued behind
//! the original states with [`DisjointUnion`]; replica `c` lives at offset
//! `(c + 1) * n`.

use std::rc::Rc;

use log::debug;

use crate::bitset::StateSet;
use crate::distribution::Distribution;
use crate::error::{ModelError, Result};
use crate::model::Model;

use super::{AlteredDistributions, DisjointUnion, DroppedChoices, Restricted, Restriction};

/// Routes every choice of an MDP through a fresh state.
///
/// Choice `c` of an original state `s` becomes a deterministic move to
/// `s + (c + 1) * n`, whose single choice is the old distribution of `c`
/// (targets back in `0..n`). Intermediate states for choice indices a
/// state does not have are deadlocks.
pub fn choices_to_states(model: Rc<dyn Model>) -> Result<AlteredDistributions> {
    if !model.model_type().is_nondeterministic() {
        return Err(ModelError::Unsupported {
            model_type: model.model_type().to_string(),
            operation: "choices to states",
        });
    }
    let n = model.num_states();
    let max_choices = model.max_num_choices();
    debug!("choices_to_states({} states, up to {} choices)", n, max_choices);

    let mut replicas: Vec<Rc<dyn Model>> = Vec::with_capacity(max_choices + 1);
    replicas.push(Rc::clone(&model));
    for kept in 0..max_choices {
        replicas.push(Rc::new(DroppedChoices::new(Rc::clone(&model), move |_, c| c != kept)));
    }
    let union = DisjointUnion::union(replicas)?;

    let inner = Rc::clone(&union);
    Ok(AlteredDistributions::new(union, move |state, choice| {
        if state < n {
            Some(Distribution::dirac(state + n * (choice + 1)))
        } else {
            Some(Distribution::from_transitions(
                inner.transitions(state, choice).map(|(t, w)| (t % n, w)),
            ))
        }
    })
    .with_actions())
}

/// Like [`choices_to_states`], but only the choices for which `selected`
/// holds are split. The result keeps the original states and the
/// intermediate states reachable from them.
pub fn selected_choices_to_states(
    model: Rc<dyn Model>,
    selected: impl Fn(usize, usize) -> bool + 'static,
) -> Result<Restricted> {
    let n = model.num_states();
    let split = choices_to_states(Rc::clone(&model))?;
    let original = Rc::clone(&model);
    let altered = AlteredDistributions::new(Rc::new(split), move |state, choice| {
        if state >= n || selected(state, choice) {
            None
        } else {
            Some(Distribution::from_transitions(original.transitions(state, choice)))
        }
    })
    .with_actions();
    Ok(Restricted::new(
        Rc::new(altered),
        &StateSet::full(n),
        Restriction::TransitiveClosure,
    ))
}
