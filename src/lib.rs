//! # pmc-rs: Explicit-state probabilistic models in Rust
//!
//! **`pmc-rs`** is the model layer of an explicit-state probabilistic model checker.
//! It stores Markov chains (DTMCs, CTMCs) and Markov decision processes (MDPs),
//! derives new models from existing ones without copying them, and provides the
//! numeric kernels that iterative solvers are built from.
//!
//! ## What is a model here?
//!
//! A model is a finite set of states `0..n`, a set of initial states, named labels,
//! and for every state a list of *choices*, each a sparse distribution over successor
//! states. Markov chains have exactly one choice per state; for a CTMC the weights are
//! rates rather than probabilities. Everything is read through the [`Model`][crate::model::Model]
//! trait, so solvers work the same on stored models and on views.
//!
//! ## Key Features
//!
//! - **Two representations**: the mutable [`SimpleModel`][crate::simple::SimpleModel] for building, and the
//!   compact, immutable [`SparseModel`][crate::sparse::SparseModel] (CSR arrays) for solving.
//! - **Lazy views**: restriction, disjoint union, altered distributions, appended states, quotients and
//!   dropped choices are computed on demand from shared underlying models (see [`view`]).
//! - **Transformations**: a [`ModelTransformation`][crate::transformation::ModelTransformation] remembers how
//!   states map between a model and a view of it, so results can be projected back.
//! - **Kernels**: matrix-vector products, Jacobi and Gauss-Seidel steps, min/max over MDP choices and the
//!   Prob0/Prob1 graph steps, with array-loop fast paths on sparse models.
//! - **Steady state**: SCC/BSCC decomposition and a steady-state solver for DTMCs and CTMCs.
//!
//! ## Basic Usage
//!
//! ```rust
//! use pmc_rs::model::Model;
//! use pmc_rs::simple::{MutableModel, SimpleModel};
//! use pmc_rs::sparse::SparseModel;
//! use pmc_rs::types::ModelType;
//!
//! // 1. Build a DTMC
//! let mut m = SimpleModel::new(ModelType::Dtmc, 3);
//! m.add_initial_state(0).unwrap();
//! m.set_probability(0, 1, 0.5).unwrap();
//! m.set_probability(0, 2, 0.5).unwrap();
//! m.set_probability(1, 1, 1.0).unwrap();
//! m.set_probability(2, 2, 1.0).unwrap();
//!
//! // 2. Freeze it into the sparse representation
//! let sparse = SparseModel::from_model(&m);
//! assert_eq!(sparse.info_string(), "3 states (1 initial), 4 transitions");
//!
//! // 3. One matrix-vector step
//! let mut result = vec![0.0; 3];
//! sparse.mv_mult(&[0.0, 1.0, 0.0], &mut result, None, false);
//! assert_eq!(result, vec![0.5, 1.0, 0.0]);
//! ```
//!
//! ## Core Components
//!
//! - **[`model`]**: The [`Model`][crate::model::Model] contract and its provided kernels.
//! - **[`view`]**: Lazy model views and their copy-on-write deadlock fixing.
//! - **[`steady`]**: Steady-state probabilities, built on [`scc`] and [`linear`].
//! - **[`export`]** and **[`dot`]**: Text exports and Graphviz output.
//!
//! The crate is single-threaded: views share their underlying models through `Rc`.

pub mod bitset;
pub mod ctmc;
pub mod distribution;
pub mod dot;
pub mod equivalence;
pub mod error;
pub mod export;
pub mod kernels;
pub mod linear;
pub mod model;
pub mod reach;
pub mod scc;
pub mod simple;
pub mod sparse;
pub mod steady;
pub mod transformation;
pub mod types;
pub mod view;
