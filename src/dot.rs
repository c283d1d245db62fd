//! Model to DOT (Graphviz) conversion.
//!
//! States are boxes named by their index. In a Markov chain every
//! transition is one labelled edge:
//!
//! ```text
//! digraph DTMC {
//! node [shape=box];
//! 0 -> 1 [ label="0.5" ];
//! }
//! ```
//!
//! MDP choices get an intermediate point node `n<state>_<choice>`: the edge
//! from the state to it is labelled with the choice index (and action), the
//! edges leaving it with the weights.
//!
//! # Examples
//!
//! ```
//! use pmc_rs::dot::to_dot;
//! use pmc_rs::simple::SimpleModel;
//! use pmc_rs::types::ModelType;
//!
//! let mut m = SimpleModel::new(ModelType::Dtmc, 2);
//! m.set_probability(0, 1, 1.0).unwrap();
//!
//! let dot = to_dot(&m).unwrap();
//! // Write to file and render with: dot -Tpng output.dot -o output.png
//! assert!(dot.contains("0 -> 1 [ label=\"1\" ];"));
//! ```

use std::fmt::Write as _;

use crate::bitset::StateSet;
use crate::export::format_weight;
use crate::model::Model;

/// Configuration options for DOT output generation.
///
/// ```
/// use pmc_rs::dot::{to_dot_with_config, DotConfig};
/// use pmc_rs::simple::{MutableModel, SimpleModel};
/// use pmc_rs::types::ModelType;
///
/// let mut m = SimpleModel::new(ModelType::Dtmc, 1);
/// m.add_initial_state(0).unwrap();
/// let config = DotConfig {
///     node_shape: "circle",
///     mark_initial: true,
///     ..DotConfig::default()
/// };
/// let dot = to_dot_with_config(&m, &config).unwrap();
/// assert!(dot.contains("0 [style=filled fillcolor=\"#cccccc\"]"));
/// ```
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Graph name (default: the model type, e.g. "DTMC")
    pub graph_name: Option<String>,
    /// Shape for state nodes (default: "box")
    pub node_shape: &'static str,
    /// Whether to fill initial states (default: false)
    pub mark_initial: bool,
    /// Extra states to fill (default: none)
    pub marked: Option<StateSet>,
    /// Significant digits of edge labels (default: shortest exact form)
    pub precision: Option<usize>,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            graph_name: None,
            node_shape: "box",
            mark_initial: false,
            marked: None,
            precision: None,
        }
    }
}

impl DotConfig {
    pub fn with_graph_name(mut self, name: impl Into<String>) -> Self {
        self.graph_name = Some(name.into());
        self
    }

    pub fn with_marked(mut self, marked: StateSet) -> Self {
        self.marked = Some(marked);
        self
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }
}

/// Converts a model to DOT format with the default configuration.
pub fn to_dot<M: Model + ?Sized>(model: &M) -> Result<String, std::fmt::Error> {
    to_dot_with_config(model, &DotConfig::default())
}

/// Converts a model to DOT format with custom configuration.
pub fn to_dot_with_config<M: Model + ?Sized>(model: &M, config: &DotConfig) -> Result<String, std::fmt::Error> {
    let mut dot = String::new();
    match &config.graph_name {
        Some(name) => writeln!(dot, "digraph {} {{", name)?,
        None => writeln!(dot, "digraph {} {{", model.model_type())?,
    }
    writeln!(dot, "node [shape={}];", config.node_shape)?;

    let nondet = model.model_type().is_nondeterministic();
    for state in 0..model.num_states() {
        let marked = (config.mark_initial && model.is_initial_state(state))
            || config.marked.as_ref().is_some_and(|m| m.contains(state));
        if marked {
            writeln!(dot, "{} [style=filled fillcolor=\"#cccccc\"]", state)?;
        }
        for choice in 0..model.num_choices(state) {
            if !nondet {
                for (target, weight) in model.transitions(state, choice) {
                    let label = format_weight(weight, config.precision);
                    writeln!(dot, "{} -> {} [ label=\"{}\" ];", state, target, label)?;
                }
                continue;
            }
            let point = format!("n{}_{}", state, choice);
            write!(dot, "{} -> {} [ arrowhead=none,label=\"{}", state, point, choice)?;
            if let Some(action) = model.action(state, choice) {
                write!(dot, ":{}", action)?;
            }
            writeln!(dot, "\" ];")?;
            writeln!(dot, "{} [ shape=point,height=0.1,label=\"\" ];", point)?;
            for (target, weight) in model.transitions(state, choice) {
                let label = format_weight(weight, config.precision);
                writeln!(dot, "{} -> {} [ label=\"{}\" ];", point, target, label)?;
            }
        }
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution;
    use crate::simple::{MutableModel, SimpleModel};
    use crate::types::ModelType;
    use test_log::test;

    #[test]
    fn test_to_dot_markov_chain() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 2);
        m.set_probability(0, 0, 0.5).unwrap();
        m.set_probability(0, 1, 0.5).unwrap();
        m.set_probability(1, 1, 1.0).unwrap();
        let dot = to_dot(&m).unwrap();
        let expected = "digraph DTMC {\nnode [shape=box];\n0 -> 0 [ label=\"0.5\" ];\n0 -> 1 [ label=\"0.5\" ];\n1 -> 1 [ label=\"1\" ];\n}\n";
        assert_eq!(dot, expected);
    }

    #[test]
    fn test_to_dot_mdp() {
        let mut m = SimpleModel::new(ModelType::Mdp, 2);
        m.add_choice_with_action(0, Distribution::dirac(1), "go").unwrap();
        let dot = to_dot(&m).unwrap();
        assert!(dot.starts_with("digraph MDP {"));
        assert!(dot.contains("0 -> n0_0 [ arrowhead=none,label=\"0:go\" ];"));
        assert!(dot.contains("n0_0 -> 1 [ label=\"1\" ];"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_to_dot_with_config() {
        let mut m = SimpleModel::new(ModelType::Ctmc, 2);
        m.set_probability(0, 1, 1.0 / 3.0).unwrap();
        let config = DotConfig::default()
            .with_graph_name("rates")
            .with_marked(StateSet::singleton(1))
            .with_precision(2);
        let dot = to_dot_with_config(&m, &config).unwrap();
        assert!(dot.starts_with("digraph rates {"));
        assert!(dot.contains("0 -> 1 [ label=\"0.33\" ];"));
        assert!(dot.contains("1 [style=filled fillcolor=\"#cccccc\"]"));
    }

    /// Helper test to write DOT file for manual inspection (disabled by default)
    #[test]
    #[ignore]
    fn test_write_dot_file() {
        let mut m = SimpleModel::new(ModelType::Dtmc, 3);
        m.set_probability(0, 1, 0.5).unwrap();
        m.set_probability(0, 2, 0.5).unwrap();
        m.set_probability(1, 0, 1.0).unwrap();
        m.set_probability(2, 2, 1.0).unwrap();

        let dot = to_dot(&m).unwrap();
        std::fs::write("test_output.dot", &dot).unwrap();
        println!("DOT output:\n{}", dot);
    }
}
