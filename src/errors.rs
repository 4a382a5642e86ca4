//! Error types for the evalexpr-flow crate.
//!
//! This module defines the error types raised while turning equation text into a
//! system and while evaluating that system. The main error types are:
//!
//! - `ParseError`: Errors while expanding, classifying or compiling equations
//! - `EvalError`: Errors while evaluating helpers and derivatives against a state
//! - `SystemError`: High-level errors returned by the `System` facade
//!
//! None of these are recovered from inside the crate; they always propagate to the
//! caller that triggered them.

use evalexpr::{DefaultNumericTypes, EvalexprError};
use thiserror::Error;

/// Errors that can occur while turning equation text into compiled equations.
///
/// These are raised at construction (or recompilation) time. A system is never
/// partially built: the first `ParseError` aborts the whole compilation.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The equation does not split into exactly two non-empty sides around `=`
    #[error("malformed equation: {0}")]
    MalformedEquation(String),
    /// Vector literals in one equation have different numbers of components
    #[error("mismatched vector dimensions in equation: {0}")]
    DimensionMismatch(String),
    /// A variable or helper was defined twice while redeclaration is rejected
    #[error("`{0}` is defined more than once")]
    Redeclared(String),
    /// The expression service rejected a right-hand side
    #[error("failed to compile expression `{expression}`")]
    Compile {
        expression: String,
        #[source]
        source: EvalexprError<DefaultNumericTypes>,
    },
}

/// Errors that can occur while evaluating a compiled system.
#[derive(Error, Debug)]
pub enum EvalError {
    /// The requested name is neither a helper nor a variable
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    /// Helper evaluation re-entered a helper that was still being evaluated
    #[error("cyclic dependency detected at helper `{0}`")]
    CyclicDependency(String),
    /// A compiled function produced something other than a number
    #[error("`{name}` evaluated to non-scalar value: {value}")]
    NonScalar { name: String, value: String },
    /// The expression service failed while evaluating an expression
    #[error("failed to evaluate expression `{expression}`")]
    Evaluate {
        expression: String,
        #[source]
        source: EvalexprError<DefaultNumericTypes>,
    },
}

/// High-level errors returned by the [`System`](crate::system::System) facade.
///
/// Wraps the compile-time and evaluation-time errors and adds the checks the facade
/// performs itself.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Error while building the compiled equation set
    #[error("failed to compile equation system")]
    Parse(#[from] ParseError),
    /// Error while evaluating the system
    #[error("failed to evaluate equation system")]
    Eval(#[from] EvalError),
    /// Error when an ordered state vector does not match the number of variables
    #[error("Invalid state length: expected {expected}, got {got}")]
    InvalidStateLength { expected: usize, got: usize },
    /// Error when a trajectory is requested with a step that is not a positive number
    #[error("Invalid time step: {0}")]
    InvalidTimeStep(f64),
}
