//! Small value types describing a model: its kind, its variable schema and
//! the variable valuation of a state.
//!
//! None of these carry semantics for the numeric core; valuations and the
//! variable list only travel along with a model so that exports and debug
//! output can name states.
use std::fmt;

/// The kind of stochastic model.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ModelType {
    /// Discrete-time Markov chain.
    Dtmc,
    /// Continuous-time Markov chain (weights are rates).
    Ctmc,
    /// Markov decision process.
    Mdp,
}

impl ModelType {
    /// The keyword opening a model description in the modeling language.
    pub fn keyword(self) -> &'static str {
        match self {
            ModelType::Dtmc => "dtmc",
            ModelType::Ctmc => "ctmc",
            ModelType::Mdp => "mdp",
        }
    }

    /// Returns true if states may have several choices.
    pub fn is_nondeterministic(self) -> bool {
        self == ModelType::Mdp
    }

    /// Returns true if weights are rates rather than probabilities.
    pub fn is_continuous_time(self) -> bool {
        self == ModelType::Ctmc
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::Dtmc => "DTMC",
            ModelType::Ctmc => "CTMC",
            ModelType::Mdp => "MDP",
        };
        write!(f, "{}", name)
    }
}

/// A bounded integer state variable.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Variable {
    pub name: String,
    pub low: i64,
    pub high: i64,
}

impl Variable {
    /// Creates a variable with range `low..=high`.
    ///
    /// # Panics
    ///
    /// Panics if `low > high`.
    pub fn new(name: impl Into<String>, low: i64, high: i64) -> Self {
        assert!(low <= high, "Variable range must be non-empty");
        Self {
            name: name.into(),
            low,
            high,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : [{}..{}]", self.name, self.low, self.high)
    }
}

/// The variable schema of a model.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct VarList {
    vars: Vec<Variable>,
}

impl VarList {
    pub fn new(vars: Vec<Variable>) -> Self {
        Self { vars }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&Variable> {
        self.vars.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }
}

/// Values of the state variables in one state, in [`VarList`] order.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Valuation(pub Vec<i64>);

impl Valuation {
    pub fn values(&self) -> &[i64] {
        &self.0
    }
}

impl fmt::Display for Valuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<i64>> for Valuation {
    fn from(values: Vec<i64>) -> Self {
        Valuation(values)
    }
}
