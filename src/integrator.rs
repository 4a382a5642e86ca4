//! Fixed-step time integrators.

use std::fmt;

use tracing::warn;

use crate::errors::EvalError;
use crate::system::System;
use crate::types::State;

/// Trait for stepping strategies.
///
/// Implementations compute the state at `t + dt` from the system's current state
/// and time and return it as a new [`State`]. They must not read partially updated
/// values: every variable is advanced from the same pre-step state. The system
/// replaces its state with the result and advances its own time.
pub trait Integrator: fmt::Debug + Send + Sync {
    fn step(&self, system: &System, dt: f64) -> Result<State, EvalError>;
}

/// Forward Euler (explicit, 1st order).
///
/// Evaluates all derivatives once against one shared helper scope, then sets
/// `next[x] = x + dt * dx/dt` for every variable.
#[derive(Clone, Copy, Debug, Default)]
pub struct Euler;

impl Integrator for Euler {
    fn step(&self, system: &System, dt: f64) -> Result<State, EvalError> {
        let derivatives = system.compiled().derivatives(system.state_ref(), system.time())?;
        let mut next = system.state();

        for (name, derivative) in derivatives {
            let current = match next.get(&name) {
                Some(value) => *value,
                None => {
                    warn!(variable = %name, "variable has no value in state, starting from 0");
                    0.0
                }
            };
            next.insert(name, current + dt * derivative);
        }

        Ok(next)
    }
}
