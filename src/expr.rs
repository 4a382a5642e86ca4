//! Opaque interface to the arithmetic-expression service.
//!
//! The equation compiler never looks inside a compiled right-hand side. It only needs
//! an engine that turns a sanitized algebraic string into a handle, and a handle that
//! can be evaluated against a [`Scope`]. The bundled implementation lives in
//! [`backends::evalexpr`](crate::backends::evalexpr); any other engine can be plugged
//! in through [`SystemBuilder::engine`](crate::builder::SystemBuilder::engine).

use std::f64::consts;
use std::fmt;
use std::sync::Arc;

use crate::errors::{EvalError, ParseError};
use crate::types::{HelperValues, State};

/// Named constants available in every scope.
pub const BUILTIN_CONSTANTS: [(&str, f64); 2] = [("pi", consts::PI), ("e", consts::E)];

/// Function names the preprocessor must not treat as implicit multiplication.
pub const KNOWN_FUNCTIONS: [&str; 20] = [
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "sqrt", "abs",
    "ln", "log", "pow", "min", "max", "floor", "ceil", "round",
];

/// Result of evaluating a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    /// A numeric result; `NaN` and infinities are valid numbers here
    Number(f64),
    /// Anything else the engine can produce (booleans, tuples, strings ...),
    /// rendered for error messages
    Other(String),
}

/// Read-only view of everything an expression may refer to.
///
/// Lookup precedence is `t`, then helpers, then state, then built-in constants.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub state: &'a State,
    pub t: f64,
    pub helpers: &'a HelperValues,
}

impl<'a> Scope<'a> {
    pub fn new(state: &'a State, t: f64, helpers: &'a HelperValues) -> Self {
        Self { state, t, helpers }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        if name == "t" {
            return Some(self.t);
        }
        self.helpers
            .get(name)
            .or_else(|| self.state.get(name))
            .copied()
            .or_else(|| builtin_constant(name))
    }
}

/// A compiled right-hand side.
pub trait CompiledExpression: fmt::Debug + Send + Sync {
    /// The expression text as it was handed to the engine.
    fn source(&self) -> &str;

    /// Free identifiers the expression reads, sorted and without duplicates.
    fn identifiers(&self) -> &[String];

    /// Evaluates the expression against `scope`.
    fn evaluate(&self, scope: &Scope<'_>) -> Result<Evaluated, EvalError>;
}

/// An arithmetic-expression compiler.
pub trait ExpressionEngine: fmt::Debug + Send + Sync {
    /// Compiles a sanitized algebraic string into an evaluable handle.
    fn compile(&self, expression: &str) -> Result<Arc<dyn CompiledExpression>, ParseError>;

    /// Whether `name` is a function the engine understands.
    fn is_function(&self, name: &str) -> bool {
        KNOWN_FUNCTIONS.contains(&name)
    }
}

pub fn builtin_constant(name: &str) -> Option<f64> {
    BUILTIN_CONSTANTS
        .iter()
        .find(|(constant, _)| *constant == name)
        .map(|(_, value)| *value)
}
