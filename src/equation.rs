//! Classification and compilation of scalar equations.
//!
//! A scalar equation is either a state derivative (`dx/dt = ...`, in either
//! orientation) or a helper assignment (`name = ...`). Both are compiled into a
//! [`CompiledFn`] exactly once; helpers additionally record the set of free
//! identifiers their right-hand side reads, so the evaluator can order them.
//!
//! # Example
//!
//! ```
//! use evalexpr_flow::backends::evalexpr::EvalexprEngine;
//! use evalexpr_flow::equation::{CompiledEquation, EquationKind};
//! use evalexpr_flow::types::{HelperValues, State};
//!
//! let eq = CompiledEquation::compile("sigma (y - x) = dx/dt", &EvalexprEngine).unwrap();
//! assert_eq!(eq.kind, EquationKind::Variable);
//! assert_eq!(eq.name, "x");
//!
//! let state = State::from([("x".to_string(), 1.0), ("y".to_string(), 3.0)]);
//! let helpers = HelperValues::from([("sigma".to_string(), 10.0)]);
//! assert_eq!(eq.eval(&state, 0.0, &helpers).unwrap(), 20.0);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use colored::Colorize;
use itertools::Itertools;
use regex::Regex;

use crate::errors::{EvalError, ParseError};
use crate::expr::{Evaluated, ExpressionEngine, Scope};
use crate::preprocess::{canonicalize, normalize, spaced_function_application};
use crate::types::{CompiledFn, HelperValues, State};

static DERIVATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(?d([A-Za-z_]\w*)\)?/\(?d[tT]\)?$").expect("derivative pattern is valid")
});

static HELPER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("helper name pattern is valid"));

/// What a scalar equation defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquationKind {
    /// The time derivative of a state variable
    Variable,
    /// A derived quantity, recomputed from state, time and other helpers
    Helper,
}

/// A classified scalar equation with its compiled right-hand side.
#[derive(Clone)]
pub struct CompiledEquation {
    pub kind: EquationKind,
    /// Variable name (without the `d.../dt` decoration) or helper name
    pub name: String,
    /// The normalized right-hand side that was compiled
    pub source: String,
    /// Free identifiers of the right-hand side, excluding function names. Constants
    /// like `pi` stay in the set so a helper of the same name is ordered first. Empty
    /// for variables, which never take part in helper ordering.
    pub dependencies: BTreeSet<String>,
    fun: CompiledFn,
}

impl fmt::Debug for CompiledEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledEquation")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for CompiledEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EquationKind::Variable => {
                write!(f, "{} = {}", format!("d{}/dt", self.name).cyan(), self.source)
            }
            EquationKind::Helper => write!(
                f,
                "{} = {}  {}",
                self.name.green(),
                self.source,
                format!("[{}]", self.dependencies.iter().join(", ")).dimmed()
            ),
        }
    }
}

impl CompiledEquation {
    /// Classifies and compiles one scalar equation.
    ///
    /// The equation is normalized first, so decorated derivative forms and implicit
    /// multiplication are accepted.
    ///
    /// # Errors
    /// - `ParseError::MalformedEquation` if the normalized text is not exactly one
    ///   `=` between two non-empty sides, or a helper's left-hand side is not a name,
    ///   or a function is applied without parentheses (`sin x`)
    /// - `ParseError::Compile` if the engine rejects the right-hand side
    pub fn compile(equation: &str, engine: &dyn ExpressionEngine) -> Result<Self, ParseError> {
        let malformed = || ParseError::MalformedEquation(equation.trim().to_string());
        if spaced_function_application(&canonicalize(equation), |name| engine.is_function(name))
            .is_some()
        {
            return Err(malformed());
        }
        let normalized = normalize(equation, |name| engine.is_function(name));

        let mut sides = normalized.split('=');
        let (lhs, rhs) = match (sides.next(), sides.next(), sides.next()) {
            (Some(lhs), Some(rhs), None) if !lhs.is_empty() && !rhs.is_empty() => (lhs, rhs),
            _ => return Err(malformed()),
        };
        let (lhs, rhs) = if !DERIVATIVE.is_match(lhs) && DERIVATIVE.is_match(rhs) {
            (rhs, lhs)
        } else {
            (lhs, rhs)
        };

        let (kind, name) = match DERIVATIVE.captures(lhs) {
            Some(captures) => (EquationKind::Variable, captures[1].to_string()),
            None if HELPER_NAME.is_match(lhs) => (EquationKind::Helper, lhs.to_string()),
            None => return Err(malformed()),
        };

        let expression = engine.compile(rhs)?;
        let dependencies = match kind {
            EquationKind::Helper => expression
                .identifiers()
                .iter()
                .filter(|identifier| !engine.is_function(identifier))
                .cloned()
                .collect(),
            EquationKind::Variable => BTreeSet::new(),
        };

        let label = name.clone();
        let fun: CompiledFn = Arc::new(move |state: &State, t: f64, helpers: &HelperValues| {
            match expression.evaluate(&Scope::new(state, t, helpers))? {
                Evaluated::Number(value) => Ok(value),
                Evaluated::Other(value) => Err(EvalError::NonScalar {
                    name: label.clone(),
                    value,
                }),
            }
        });

        Ok(Self {
            kind,
            name,
            source: rhs.to_string(),
            dependencies,
            fun,
        })
    }

    /// Evaluates the right-hand side against the given state, time and helper scope.
    pub fn eval(&self, state: &State, t: f64, helpers: &HelperValues) -> Result<f64, EvalError> {
        (self.fun)(state, t, helpers)
    }

    /// The compiled function itself.
    pub fn fun(&self) -> &CompiledFn {
        &self.fun
    }

    pub fn is_variable(&self) -> bool {
        self.kind == EquationKind::Variable
    }

    pub fn is_helper(&self) -> bool {
        self.kind == EquationKind::Helper
    }
}
