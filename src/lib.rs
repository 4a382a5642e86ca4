//! Steppable dynamical systems from free-form equation text.
//!
//! This crate turns a list of textual equations into a system that a fixed-step
//! integrator can drive. It expands vector shorthand, normalizes notation,
//! classifies each equation as a state derivative or a helper, compiles right-hand
//! sides with the [evalexpr](https://github.com/ISibboI/evalexpr) crate and
//! evaluates helpers in dependency order, rejecting cycles.
//!
//! # Features
//!
//! - Derivatives on either side of `=`, in decorated forms like `(d(x))/(dt)`
//! - Vector equations `d((x,y,z))/dt = ((...))` and vector aliases `r = ((x,y,z))`
//! - Implicit multiplication (`sigma(y - x)`, `beta z`, `2x`) and unicode minus signs
//! - Helper quantities with cycle detection
//! - Pluggable integrators and expression engines
//! - Optional `ndarray` / `nalgebra` state vectors
//!
//! # Example
//!
//! ```rust
//! use evalexpr_flow::prelude::*;
//!
//! let mut system = SystemBuilder::new(["dx/dt = -k x", "k = 2"])
//!     .initial_state(State::from([("x".to_string(), 1.0)]))
//!     .build()
//!     .unwrap();
//!
//! // x' = -2x, one Euler step of 0.1
//! let next = system.step(0.1).unwrap();
//! assert!((next["x"] - 0.8).abs() < 1e-12);
//! ```

pub use builder::SystemBuilder;
pub use integrator::Euler;
pub use system::System;

pub mod prelude {
    pub use crate::backends::vector::StateVector;
    pub use crate::builder::{AliasResolution, Redeclaration, SystemBuilder, SystemOptions};
    pub use crate::errors::{EvalError, ParseError, SystemError};
    pub use crate::integrator::{Euler, Integrator};
    pub use crate::system::{CompiledSystem, System};
    pub use crate::types::{EquationInput, State};
}

/// Expression engines and state vector conversions
pub mod backends;
/// Configuration and construction of systems
pub mod builder;
/// Classification and compilation of scalar equations
pub mod equation;
/// Error types for the various failure modes
pub mod errors;
/// Dependency-ordered helper evaluation
pub mod evaluator;
/// Vector shorthand expansion
pub mod expand;
/// Interface to the arithmetic-expression engine
pub mod expr;
/// Fixed-step integrators
pub mod integrator;
/// Notation normalization
pub mod preprocess;
/// Compiled equation sets and the system facade
pub mod system;
/// Shared type aliases
pub mod types;
