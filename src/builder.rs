//! Configuration and construction of a [`System`].
//!
//! [`SystemBuilder`] collects the equation inputs together with everything a
//! running system needs besides its equations: initial state, start time,
//! integration strategy, expression engine and the compile-time policies in
//! [`SystemOptions`].
//!
//! # Example
//!
//! ```
//! use evalexpr_flow::builder::{Redeclaration, SystemBuilder};
//! use evalexpr_flow::types::State;
//!
//! let system = SystemBuilder::new(["dx/dt = -k x", "k = 2"])
//!     .initial_state(State::from([("x".to_string(), 1.0)]))
//!     .start_time(0.5)
//!     .redeclaration(Redeclaration::Reject)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(system.time(), 0.5);
//! assert_eq!(system.evaluate_var("x").unwrap(), -2.0);
//! ```

use std::sync::Arc;

use crate::backends::evalexpr::EvalexprEngine;
use crate::errors::SystemError;
use crate::expr::ExpressionEngine;
use crate::integrator::{Euler, Integrator};
use crate::system::System;
use crate::types::{EquationInput, State};

/// What happens when two equations define the same variable or helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redeclaration {
    /// The last definition wins
    #[default]
    Overwrite,
    /// A second definition fails compilation with `ParseError::Redeclared`
    Reject,
}

/// How vector aliases (`r = ((x, y, z))`) are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasResolution {
    /// An alias is visible only to equations that come after its declaration
    #[default]
    DeclarationOrder,
    /// All aliases are registered before any equation is expanded
    TwoPass,
}

/// Compile-time policies of a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemOptions {
    pub redeclaration: Redeclaration,
    pub alias_resolution: AliasResolution,
}

/// Builder for [`System`].
#[derive(Debug)]
pub struct SystemBuilder {
    equations: Vec<EquationInput>,
    initial_state: State,
    start_time: f64,
    integrator: Arc<dyn Integrator>,
    engine: Arc<dyn ExpressionEngine>,
    options: SystemOptions,
}

impl SystemBuilder {
    /// Starts a builder from equation inputs. Plain strings convert into inputs
    /// without display forms.
    pub fn new<I>(equations: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<EquationInput>,
    {
        Self {
            equations: equations.into_iter().map(Into::into).collect(),
            initial_state: State::new(),
            start_time: 0.0,
            integrator: Arc::new(Euler),
            engine: Arc::new(EvalexprEngine),
            options: SystemOptions::default(),
        }
    }

    /// State the system starts from, and returns to on [`System::reset`].
    pub fn initial_state(mut self, state: State) -> Self {
        self.initial_state = state;
        self
    }

    /// Time the system starts from, and returns to on [`System::reset`].
    pub fn start_time(mut self, t: f64) -> Self {
        self.start_time = t;
        self
    }

    /// Stepping strategy. Defaults to [`Euler`].
    pub fn integrator(mut self, integrator: impl Integrator + 'static) -> Self {
        self.integrator = Arc::new(integrator);
        self
    }

    /// Expression engine. Defaults to [`EvalexprEngine`].
    pub fn engine(mut self, engine: Arc<dyn ExpressionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn options(mut self, options: SystemOptions) -> Self {
        self.options = options;
        self
    }

    pub fn redeclaration(mut self, redeclaration: Redeclaration) -> Self {
        self.options.redeclaration = redeclaration;
        self
    }

    pub fn alias_resolution(mut self, alias_resolution: AliasResolution) -> Self {
        self.options.alias_resolution = alias_resolution;
        self
    }

    /// Compiles the equations and builds the system.
    ///
    /// # Errors
    /// Returns `SystemError::Parse` if any equation fails to expand, classify or
    /// compile. Nothing is built in that case.
    pub fn build(self) -> Result<System, SystemError> {
        System::from_parts(
            self.equations,
            self.initial_state,
            self.start_time,
            self.integrator,
            self.engine,
            self.options,
        )
    }
}
