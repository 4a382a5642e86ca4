use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::errors::EvalError;

/// Current value of every state variable, keyed by variable name.
///
/// A `BTreeMap` keeps iteration (and therefore debug output and trajectories)
/// deterministic.
pub type State = BTreeMap<String, f64>;

/// Helper values computed for a single evaluation call.
pub type HelperValues = HashMap<String, f64>;

/// Type alias for a compiled right-hand side.
///
/// This represents a function that:
/// - Takes the current state, the current time and the helper values computed so far
/// - Returns the numeric value of the right-hand side or an evaluation error
/// - Is both Send and Sync so a compiled system can be shared across threads
pub type CompiledFn = Arc<dyn Fn(&State, f64, &HelperValues) -> Result<f64, EvalError> + Send + Sync>;

/// One user-supplied equation.
///
/// `text` is the form that gets compiled. The optional `latex` and `ascii_math`
/// forms are carried along untouched for input widgets that want to redisplay
/// what the user typed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EquationInput {
    pub text: String,
    pub latex: Option<String>,
    pub ascii_math: Option<String>,
}

impl EquationInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_latex(mut self, latex: impl Into<String>) -> Self {
        self.latex = Some(latex.into());
        self
    }

    pub fn with_ascii_math(mut self, ascii_math: impl Into<String>) -> Self {
        self.ascii_math = Some(ascii_math.into());
        self
    }
}

impl From<&str> for EquationInput {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for EquationInput {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
