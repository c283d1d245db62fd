//! Text exports of explicit models.
//!
//! Two formats are supported:
//!
//! - **`.tra`**: a header line, then one line per transition. Markov chains
//!   write `<states> <transitions>` and `<src> <dst> <weight>`; MDPs write
//!   `<states> <choices> <transitions>` and `<src> <choice> <dst> <weight>`,
//!   followed by the action name if the choice has one.
//! - **Modeling language**: a single module `M` with one variable
//!   `x : [0..n-1]` and one guarded command per state and choice, e.g.
//!   `[]x=0->0.5:(x'=1)+0.5:(x'=2);`.
//!
//! Within a choice, transitions are written in increasing target order.
//! Choices without transitions produce no line or command.
//!
//! # Examples
//!
//! ```
//! use pmc_rs::export::{tra_string, ExportConfig};
//! use pmc_rs::simple::SimpleModel;
//! use pmc_rs::types::ModelType;
//!
//! let mut m = SimpleModel::new(ModelType::Dtmc, 2);
//! m.set_probability(0, 1, 1.0).unwrap();
//! m.set_probability(1, 1, 1.0).unwrap();
//! let tra = tra_string(&m, &ExportConfig::default()).unwrap();
//! assert_eq!(tra, "2 2\n0 1 1\n1 1 1\n");
//! ```

use std::fmt::Write;
use std::path::Path;

use log::debug;

use crate::distribution::Distribution;
use crate::error::Result;
use crate::model::Model;

/// Options shared by the text exports.
#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    /// Significant digits of weights; `None` writes the shortest exact form.
    pub precision: Option<usize>,
}

impl ExportConfig {
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }
}

/// Formats `weight` with at most `precision` significant digits, dropping
/// trailing zeros: `1.0` is written as `1`.
pub fn format_weight(weight: f64, precision: Option<usize>) -> String {
    match precision {
        Some(p) if weight.is_finite() => {
            let rounded = format!("{:.*e}", p.max(1) - 1, weight);
            let rounded: f64 = rounded.parse().unwrap_or(weight);
            format!("{}", rounded)
        }
        _ => format!("{}", weight),
    }
}

/// Transitions of `(state, choice)`, merged and sorted by target.
fn sorted<M: Model + ?Sized>(model: &M, state: usize, choice: usize) -> Distribution {
    Distribution::from_transitions(model.transitions(state, choice))
}

pub fn write_tra<M: Model + ?Sized>(model: &M, out: &mut impl Write, config: &ExportConfig) -> std::fmt::Result {
    let n = model.num_states();
    let nondet = model.model_type().is_nondeterministic();
    if nondet {
        writeln!(out, "{} {} {}", n, model.total_num_choices(), model.total_num_transitions())?;
    } else {
        writeln!(out, "{} {}", n, model.total_num_transitions())?;
    }
    for state in 0..n {
        for choice in 0..model.num_choices(state) {
            let action = if nondet { model.action(state, choice) } else { None };
            for (target, weight) in sorted(model, state, choice).iter() {
                let weight = format_weight(weight, config.precision);
                if nondet {
                    write!(out, "{} {} {} {}", state, choice, target, weight)?;
                } else {
                    write!(out, "{} {} {}", state, target, weight)?;
                }
                match &action {
                    Some(a) => writeln!(out, " {}", a)?,
                    None => writeln!(out)?,
                }
            }
        }
    }
    Ok(())
}

pub fn tra_string<M: Model + ?Sized>(model: &M, config: &ExportConfig) -> Result<String> {
    let mut s = String::new();
    write_tra(model, &mut s, config)?;
    Ok(s)
}

pub fn export_tra<M: Model + ?Sized>(model: &M, path: impl AsRef<Path>, config: &ExportConfig) -> Result<()> {
    let path = path.as_ref();
    debug!("exporting {} to {}", model.info_string(), path.display());
    std::fs::write(path, tra_string(model, config)?)?;
    Ok(())
}

pub fn write_language<M: Model + ?Sized>(
    model: &M,
    out: &mut impl Write,
    config: &ExportConfig,
) -> std::fmt::Result {
    let n = model.num_states();
    writeln!(out, "{}", model.model_type().keyword())?;
    writeln!(out, "module M")?;
    writeln!(out, "x : [0..{}];", n.saturating_sub(1))?;
    for state in 0..n {
        for choice in 0..model.num_choices(state) {
            let distribution = sorted(model, state, choice);
            if distribution.is_empty() {
                continue;
            }
            match model.action(state, choice) {
                Some(a) if model.model_type().is_nondeterministic() => write!(out, "[{}]", a)?,
                _ => write!(out, "[]")?,
            }
            write!(out, "x={}->", state)?;
            for (i, (target, weight)) in distribution.iter().enumerate() {
                if i > 0 {
                    write!(out, "+")?;
                }
                write!(out, "{}:(x'={})", format_weight(weight, config.precision), target)?;
            }
            writeln!(out, ";")?;
        }
    }
    writeln!(out, "endmodule")
}

pub fn language_string<M: Model + ?Sized>(model: &M, config: &ExportConfig) -> Result<String> {
    let mut s = String::new();
    write_language(model, &mut s, config)?;
    Ok(s)
}

pub fn export_language<M: Model + ?Sized>(model: &M, path: impl AsRef<Path>, config: &ExportConfig) -> Result<()> {
    let path = path.as_ref();
    debug!("exporting {} as a module to {}", model.info_string(), path.display());
    std::fs::write(path, language_string(model, config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::simple::{MutableModel, SimpleModel};
    use crate::types::ModelType;
    use test_log::test;

    fn dtmc() -> SimpleModel {
        let mut m = SimpleModel::new(ModelType::Dtmc, 3);
        m.add_initial_state(0).unwrap();
        m.set_probability(0, 2, 0.7).unwrap();
        m.set_probability(0, 1, 0.3).unwrap();
        m.set_probability(1, 1, 1.0).unwrap();
        m
    }

    #[test]
    fn test_format_weight() {
        assert_eq!(format_weight(1.0, None), "1");
        assert_eq!(format_weight(0.25, None), "0.25");
        assert_eq!(format_weight(1.0 / 3.0, Some(3)), "0.333");
        assert_eq!(format_weight(2.0 / 3.0, Some(2)), "0.67");
        assert_eq!(format_weight(0.5, Some(6)), "0.5");
        assert_eq!(format_weight(1234.5, Some(2)), "1200");
    }

    #[test]
    fn test_tra_markov_chain() {
        let tra = tra_string(&dtmc(), &ExportConfig::default()).unwrap();
        assert_eq!(tra, "3 3\n0 1 0.3\n0 2 0.7\n1 1 1\n");
    }

    #[test]
    fn test_tra_mdp() {
        let mut m = SimpleModel::new(ModelType::Mdp, 2);
        m.add_choice_with_action(0, [(1, 0.5), (0, 0.5)].into_iter().collect(), "a")
            .unwrap();
        m.add_choice(0, Distribution::dirac(1)).unwrap();
        m.add_choice(1, Distribution::dirac(1)).unwrap();
        let tra = tra_string(&m, &ExportConfig::default()).unwrap();
        assert_eq!(tra, "2 3 4\n0 0 0 0.5 a\n0 0 1 0.5 a\n0 1 1 1\n1 0 1 1\n");
    }

    #[test]
    fn test_language() {
        let text = language_string(&dtmc(), &ExportConfig::default()).unwrap();
        let expected = "dtmc\nmodule M\nx : [0..2];\n[]x=0->0.3:(x'=1)+0.7:(x'=2);\n[]x=1->1:(x'=1);\nendmodule\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_language_mdp_actions() {
        let mut m = SimpleModel::new(ModelType::Mdp, 1);
        m.add_choice_with_action(0, Distribution::dirac(0), "loop").unwrap();
        let text = language_string(&m, &ExportConfig::default()).unwrap();
        assert!(text.starts_with("mdp\n"));
        assert!(text.contains("[loop]x=0->1:(x'=0);\n"));
    }

    #[test]
    fn test_export_to_missing_directory() {
        let result = export_tra(&dtmc(), "/nonexistent/dir/model.tra", &ExportConfig::default());
        assert!(matches!(result, Err(ModelError::Io(_))));
    }
}
