//! Strongly connected components and bottom components.
//!
//! [`SccComputer`] runs Tarjan's algorithm with an explicit stack of frames
//! instead of recursion, so deep chains do not overflow the call stack.
//! Components are handed to a consumer as soon as they are closed, which
//! happens in reverse topological order, as an ascending slice of states.
//! Nothing per component is allocated in proportion to the model size.
//!
//! A component is *bottom* (a BSCC) if no transition leaves it. A state
//! without any transition forms a bottom component on its own.

use log::{debug, info, trace};

use crate::bitset::StateSet;
use crate::error::Result;
use crate::model::Model;
use crate::reach::reachable_states;

const UNVISITED: usize = usize::MAX;

/// Frame on the exploration stack.
struct Frame {
    state: usize,
    successors: Vec<usize>,
    next: usize,
}

/// SCC search over (a subset of) the states of a model.
pub struct SccComputer<'a, M: Model + ?Sized> {
    model: &'a M,
    restriction: StateSet,
}

impl<'a, M: Model + ?Sized> SccComputer<'a, M> {
    /// Searches the states reachable from the initial states.
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            restriction: reachable_states(model),
        }
    }

    /// Searches `states` only, without computing the reachable states first.
    pub fn over(model: &'a M, states: StateSet) -> Self {
        Self {
            model,
            restriction: states,
        }
    }

    /// Searches `states` only; transitions leaving them are ignored by the
    /// search but still make a component non-bottom.
    pub fn with_restriction(mut self, states: StateSet) -> Self {
        self.restriction = states;
        self
    }

    pub fn restriction(&self) -> &StateSet {
        &self.restriction
    }

    /// Calls `consumer` on the members of every SCC, in increasing order. An
    /// error from the consumer stops the search and is returned.
    pub fn for_each_scc(&self, mut consumer: impl FnMut(&[usize]) -> Result<()>) -> Result<()> {
        let n = self.model.num_states();
        debug!("for_each_scc over {} of {} states", self.restriction.len(), n);

        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0; n];
        let mut on_stack = StateSet::new(n);
        let mut stack: Vec<usize> = Vec::new();
        let mut frames: Vec<Frame> = Vec::new();
        let mut members: Vec<usize> = Vec::new();
        let mut counter = 0;
        let mut found = 0;

        for root in self.restriction.iter() {
            if index[root] != UNVISITED {
                continue;
            }
            frames.push(self.open(root, &mut index, &mut lowlink, &mut counter));
            stack.push(root);
            on_stack.insert(root);

            while let Some(frame) = frames.last_mut() {
                let state = frame.state;
                if let Some(&succ) = frame.successors.get(frame.next) {
                    frame.next += 1;
                    if index[succ] == UNVISITED {
                        frames.push(self.open(succ, &mut index, &mut lowlink, &mut counter));
                        stack.push(succ);
                        on_stack.insert(succ);
                    } else if on_stack.contains(succ) {
                        lowlink[state] = lowlink[state].min(index[succ]);
                    }
                    continue;
                }

                frames.pop();
                if lowlink[state] == index[state] {
                    members.clear();
                    while let Some(member) = stack.pop() {
                        on_stack.remove(member);
                        members.push(member);
                        if member == state {
                            break;
                        }
                    }
                    members.sort_unstable();
                    trace!("SCC {}: {:?}", found, members);
                    found += 1;
                    consumer(&members)?;
                }
                if let Some(parent) = frames.last() {
                    lowlink[parent.state] = lowlink[parent.state].min(lowlink[state]);
                }
            }
        }

        info!("found {} SCCs", found);
        Ok(())
    }

    /// Calls `consumer` on the members of every bottom SCC.
    pub fn for_each_bscc(&self, mut consumer: impl FnMut(&[usize]) -> Result<()>) -> Result<()> {
        let mut in_component = StateSet::new(self.model.num_states());
        self.for_each_scc(|members| {
            in_component.extend(members.iter().copied());
            let bottom = self.is_bottom(members, &in_component);
            for &s in members {
                in_component.remove(s);
            }
            if bottom {
                consumer(members)
            } else {
                Ok(())
            }
        })
    }

    /// Collects every SCC. Prefer [`for_each_scc`](Self::for_each_scc) on
    /// large models.
    pub fn compute_sccs(&self) -> Result<Vec<StateSet>> {
        let mut sccs = Vec::new();
        self.for_each_scc(|members| {
            sccs.push(members.iter().copied().collect());
            Ok(())
        })?;
        Ok(sccs)
    }

    pub fn compute_bsccs(&self) -> Result<Vec<StateSet>> {
        let mut bsccs = Vec::new();
        self.for_each_bscc(|members| {
            bsccs.push(members.iter().copied().collect());
            Ok(())
        })?;
        info!("found {} BSCCs", bsccs.len());
        Ok(bsccs)
    }

    /// Returns true if no transition of `members` leaves `component`, the
    /// set holding them.
    pub fn is_bottom(&self, members: &[usize], component: &StateSet) -> bool {
        members.iter().all(|&s| {
            (0..self.model.num_choices(s)).all(|c| self.model.all_successors_in_set(s, c, component))
        })
    }

    fn open(&self, state: usize, index: &mut [usize], lowlink: &mut [usize], counter: &mut usize) -> Frame {
        index[state] = *counter;
        lowlink[state] = *counter;
        *counter += 1;
        let mut successors = self.model.successors(state);
        successors.retain(|&t| self.restriction.contains(t));
        Frame {
            state,
            successors,
            next: 0,
        }
    }
}
