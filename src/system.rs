//! Compiled equation sets and the steppable system facade.
//!
//! [`CompiledSystem`] is the immutable result of compiling a list of equations:
//! variable functions, helper functions with their dependency sets, and the vector
//! alias table. [`System`] owns one of those together with the evolving state and
//! time, and exposes the query and mutation contract used by integrators and UIs.
//!
//! # Example
//!
//! ```
//! use evalexpr_flow::System;
//! use evalexpr_flow::types::State;
//!
//! let mut system = System::new([
//!     "d((x,y,z))/dt = ((sigma(y - x), x(rho - z) - y, x y - beta z))",
//!     "sigma = 10",
//!     "rho = 28",
//!     "beta = 8/3",
//! ])
//! .unwrap();
//! system.set_state(State::from([
//!     ("x".to_string(), 1.0),
//!     ("y".to_string(), 1.0),
//!     ("z".to_string(), 1.0),
//! ]), None);
//!
//! assert_eq!(system.variables(), vec!["x", "y", "z"]);
//! let next = system.step(0.01).unwrap();
//! assert!((next["y"] - 1.26).abs() < 1e-12);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use colored::Colorize;
use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::backends::vector::StateVector;
use crate::builder::{AliasResolution, Redeclaration, SystemBuilder, SystemOptions};
use crate::equation::{CompiledEquation, EquationKind};
use crate::errors::{EvalError, ParseError, SystemError};
use crate::evaluator;
use crate::expand::VectorExpander;
use crate::expr::ExpressionEngine;
use crate::integrator::Integrator;
use crate::preprocess::canonicalize;
use crate::types::{EquationInput, HelperValues, State};

/// The compiled form of an equation list. Immutable once built.
#[derive(Debug, Clone)]
pub struct CompiledSystem {
    equations: Vec<EquationInput>,
    variables: BTreeMap<String, CompiledEquation>,
    helpers: BTreeMap<String, CompiledEquation>,
    aliases: BTreeMap<String, Vec<String>>,
}

impl CompiledSystem {
    /// Expands, classifies and compiles every equation.
    ///
    /// Compilation is all-or-nothing: the first failing equation aborts it. Blank
    /// inputs are skipped.
    ///
    /// # Errors
    /// Returns the first `ParseError` raised by expansion or compilation, or
    /// `ParseError::Redeclared` under [`Redeclaration::Reject`].
    pub fn compile(
        equations: Vec<EquationInput>,
        engine: &dyn ExpressionEngine,
        options: &SystemOptions,
    ) -> Result<Self, ParseError> {
        let canonical: Vec<String> = equations
            .iter()
            .map(|input| canonicalize(&input.text))
            .filter(|text| !text.trim().is_empty())
            .collect();

        let mut expander = VectorExpander::new();
        if options.alias_resolution == AliasResolution::TwoPass {
            for equation in &canonical {
                expander.register_alias(equation);
            }
        }

        let mut variables = BTreeMap::new();
        let mut helpers = BTreeMap::new();
        for equation in &canonical {
            for scalar in expander.expand(equation)? {
                let compiled = CompiledEquation::compile(&scalar, engine)?;
                debug!(
                    kind = ?compiled.kind,
                    name = %compiled.name,
                    dependencies = ?compiled.dependencies,
                    "classified equation"
                );

                let target = match compiled.kind {
                    EquationKind::Variable => &mut variables,
                    EquationKind::Helper => &mut helpers,
                };
                let name = compiled.name.clone();
                if target.insert(name.clone(), compiled).is_some()
                    && options.redeclaration == Redeclaration::Reject
                {
                    return Err(ParseError::Redeclared(name));
                }
            }
        }

        debug!(
            variables = variables.len(),
            helpers = helpers.len(),
            aliases = expander.aliases().len(),
            "compiled equation system"
        );

        Ok(Self {
            equations,
            variables,
            helpers,
            aliases: expander.into_aliases(),
        })
    }

    /// Variable names, sorted.
    pub fn variables(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    pub fn variable_equations(&self) -> &BTreeMap<String, CompiledEquation> {
        &self.variables
    }

    pub fn helpers(&self) -> &BTreeMap<String, CompiledEquation> {
        &self.helpers
    }

    pub fn aliases(&self) -> &BTreeMap<String, Vec<String>> {
        &self.aliases
    }

    /// The inputs this system was compiled from.
    pub fn equations(&self) -> &[EquationInput] {
        &self.equations
    }

    /// Computes every helper value for `state` at time `t`.
    pub fn evaluate_helpers(&self, state: &State, t: f64) -> Result<HelperValues, EvalError> {
        evaluator::evaluate_helpers(&self.helpers, state, t)
    }

    /// Evaluates one helper, or the derivative of one variable.
    ///
    /// Helpers are looked up before variables.
    ///
    /// # Errors
    /// Returns `EvalError::UnknownVariable` if `name` is neither.
    pub fn evaluate_var(&self, name: &str, state: &State, t: f64) -> Result<f64, EvalError> {
        if self.helpers.contains_key(name) {
            let helpers = self.evaluate_helpers(state, t)?;
            return helpers
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::UnknownVariable(name.to_string()));
        }

        match self.variables.get(name) {
            Some(variable) => {
                let helpers = self.evaluate_helpers(state, t)?;
                variable.eval(state, t, &helpers)
            }
            None => Err(EvalError::UnknownVariable(name.to_string())),
        }
    }

    /// Derivative of every variable, keyed by variable name, against one shared
    /// helper scope.
    pub fn derivatives(&self, state: &State, t: f64) -> Result<BTreeMap<String, f64>, EvalError> {
        let helpers = self.evaluate_helpers(state, t)?;
        self.derivatives_with(state, t, &helpers)
    }

    /// Helper values together with variable derivatives, keyed by name. A variable
    /// derivative replaces a helper of the same name.
    pub fn evaluate_all(&self, state: &State, t: f64) -> Result<BTreeMap<String, f64>, EvalError> {
        let helpers = self.evaluate_helpers(state, t)?;
        let derivatives = self.derivatives_with(state, t, &helpers)?;

        let mut all: BTreeMap<String, f64> = helpers.into_iter().collect();
        all.extend(derivatives);
        Ok(all)
    }

    fn derivatives_with(
        &self,
        state: &State,
        t: f64,
        helpers: &HelperValues,
    ) -> Result<BTreeMap<String, f64>, EvalError> {
        self.variables
            .iter()
            .map(|(name, variable)| Ok((name.clone(), variable.eval(state, t, helpers)?)))
            .collect()
    }
}

impl fmt::Display for CompiledSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "Variables".cyan().bold())?;
        for equation in self.variables.values() {
            writeln!(f, "    {equation}")?;
        }
        if !self.helpers.is_empty() {
            writeln!(f, "{}", "Helpers".cyan().bold())?;
            for equation in self.helpers.values() {
                writeln!(f, "    {equation}")?;
            }
        }
        if !self.aliases.is_empty() {
            writeln!(f, "{}", "Aliases".cyan().bold())?;
            for (alias, components) in &self.aliases {
                writeln!(f, "    {} = (({}))", alias.yellow(), components.iter().join(", "))?;
            }
        }
        Ok(())
    }
}

/// A compiled equation set together with its evolving state and time.
///
/// A `System` is driven by one caller at a time: queries read the current state and
/// time, [`step`](Self::step) replaces the state with the integrator's result and
/// advances time. Recompiling swaps the compiled equations wholesale.
#[derive(Debug, Clone)]
pub struct System {
    compiled: Arc<CompiledSystem>,
    engine: Arc<dyn ExpressionEngine>,
    options: SystemOptions,
    integrator: Arc<dyn Integrator>,
    state: State,
    t: f64,
    initial_state: State,
    start_time: f64,
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compiled)?;
        writeln!(f, "{}", "State".cyan().bold())?;
        writeln!(f, "    {} = {}", "t".green(), self.t)?;
        for (name, value) in &self.state {
            writeln!(f, "    {} = {}", name.green(), value)?;
        }
        Ok(())
    }
}

impl System {
    /// Compiles `equations` with the default engine, integrator and options,
    /// starting from an empty state at `t = 0`.
    ///
    /// # Errors
    /// Returns `SystemError::Parse` if any equation fails to compile.
    pub fn new<I>(equations: I) -> Result<Self, SystemError>
    where
        I: IntoIterator,
        I::Item: Into<EquationInput>,
    {
        SystemBuilder::new(equations).build()
    }

    pub fn builder<I>(equations: I) -> SystemBuilder
    where
        I: IntoIterator,
        I::Item: Into<EquationInput>,
    {
        SystemBuilder::new(equations)
    }

    pub(crate) fn from_parts(
        equations: Vec<EquationInput>,
        initial_state: State,
        start_time: f64,
        integrator: Arc<dyn Integrator>,
        engine: Arc<dyn ExpressionEngine>,
        options: SystemOptions,
    ) -> Result<Self, SystemError> {
        let compiled = CompiledSystem::compile(equations, engine.as_ref(), &options)?;
        Ok(Self {
            compiled: Arc::new(compiled),
            engine,
            options,
            integrator,
            state: initial_state.clone(),
            t: start_time,
            initial_state,
            start_time,
        })
    }

    pub fn compiled(&self) -> &CompiledSystem {
        &self.compiled
    }

    pub fn options(&self) -> SystemOptions {
        self.options
    }

    /// Variable names, sorted.
    pub fn variables(&self) -> Vec<String> {
        self.compiled.variables()
    }

    /// The inputs the current equations were compiled from.
    pub fn equations(&self) -> &[EquationInput] {
        self.compiled.equations()
    }

    /// An independent copy of the current state.
    pub fn state(&self) -> State {
        self.state.clone()
    }

    /// Borrows the current state without copying it.
    pub fn state_ref(&self) -> &State {
        &self.state
    }

    /// Replaces the state wholesale and, if given, the time.
    pub fn set_state(&mut self, state: State, t: Option<f64>) {
        self.state = state;
        if let Some(t) = t {
            self.t = t;
        }
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn set_time(&mut self, t: f64) {
        self.t = t;
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Sets the time [`reset`](Self::reset) returns to. The current time is unchanged.
    pub fn set_start_time(&mut self, t: f64) {
        self.start_time = t;
    }

    /// Restores the initial state and start time.
    pub fn reset(&mut self) {
        self.state = self.initial_state.clone();
        self.t = self.start_time;
    }

    /// Swaps the stepping strategy. The compiled equations are kept.
    pub fn set_integrator(&mut self, integrator: impl Integrator + 'static) {
        self.integrator = Arc::new(integrator);
    }

    /// Evaluates one helper, or the derivative of one variable, at the current
    /// state and time.
    pub fn evaluate_var(&self, name: &str) -> Result<f64, SystemError> {
        Ok(self.compiled.evaluate_var(name, &self.state, self.t)?)
    }

    /// Helper values and variable derivatives at the current state and time.
    pub fn evaluate_all(&self) -> Result<BTreeMap<String, f64>, SystemError> {
        Ok(self.compiled.evaluate_all(&self.state, self.t)?)
    }

    /// Variable derivatives at the current state and time.
    pub fn derivatives(&self) -> Result<BTreeMap<String, f64>, SystemError> {
        Ok(self.compiled.derivatives(&self.state, self.t)?)
    }

    /// Advances the system by `dt` with the configured integrator.
    ///
    /// The state is replaced by the integrator's result, not merged with it, and
    /// `t` advances by `dt`. On error the system is left unchanged.
    pub fn step(&mut self, dt: f64) -> Result<State, SystemError> {
        trace!(t = self.t, dt, "step");
        let next = self.integrator.step(self, dt)?;
        self.state = next.clone();
        self.t += dt;
        Ok(next)
    }

    /// Steps while `t < until` and returns every post-step state.
    ///
    /// # Errors
    /// - `SystemError::InvalidTimeStep` if `dt` is not a positive finite number
    /// - The first step error; states computed before it are discarded, but the
    ///   system keeps the progress it made
    pub fn integrate(&mut self, until: f64, dt: f64) -> Result<Vec<State>, SystemError> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SystemError::InvalidTimeStep(dt));
        }

        let mut trajectory = Vec::new();
        while self.t < until {
            trajectory.push(self.step(dt)?);
        }
        Ok(trajectory)
    }

    /// Recompiles the system from new equations.
    ///
    /// The new equations replace the old ones only if all of them compile; on error
    /// the system keeps its previous equations. State and time are kept either way.
    pub fn recompile<I>(&mut self, equations: I) -> Result<(), SystemError>
    where
        I: IntoIterator,
        I::Item: Into<EquationInput>,
    {
        let equations = equations.into_iter().map(Into::into).collect();
        let compiled = CompiledSystem::compile(equations, self.engine.as_ref(), &self.options)?;
        self.compiled = Arc::new(compiled);
        Ok(())
    }

    /// The current state in [`variables`](Self::variables) order. Variables with no
    /// value in the state read as `0`.
    pub fn state_vector<V: StateVector>(&self) -> V {
        let values = self
            .compiled
            .variables
            .keys()
            .map(|name| self.state.get(name).copied().unwrap_or(0.0))
            .collect();
        V::from_values(values)
    }

    /// Replaces the state with values given in [`variables`](Self::variables) order.
    ///
    /// # Errors
    /// Returns `SystemError::InvalidStateLength` if the vector length does not
    /// match the number of variables.
    pub fn set_state_vector<V: StateVector>(&mut self, values: &V) -> Result<(), SystemError> {
        let expected = self.compiled.variables.len();
        if values.len() != expected {
            return Err(SystemError::InvalidStateLength {
                expected,
                got: values.len(),
            });
        }

        self.state = self
            .compiled
            .variables
            .keys()
            .cloned()
            .zip(values.to_values())
            .collect();
        Ok(())
    }

    /// Evaluates derivatives for many states at the current time in parallel.
    ///
    /// Results are in the same order as `states`.
    pub fn evaluate_batch(&self, states: &[State]) -> Result<Vec<BTreeMap<String, f64>>, SystemError> {
        let compiled = self.compiled.as_ref();
        let t = self.t;
        Ok(states
            .par_iter()
            .map(|state| compiled.derivatives(state, t))
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(values: &[(&str, f64)]) -> State {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn system_with(equations: &[&str], values: &[(&str, f64)]) -> Result<System, SystemError> {
        let mut system = System::new(equations.iter().copied())?;
        system.set_state(state(values), None);
        Ok(system)
    }

    #[test]
    fn test_variables_are_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let system = System::new(["dz/dt = x", "a = x", "dx/dt = y", "dy/dt = z"])?;
        assert_eq!(system.variables(), vec!["x", "y", "z"]);
        Ok(())
    }

    #[test]
    fn test_helper_chain() -> Result<(), Box<dyn std::error::Error>> {
        let equations = ["a = x + y", "b = a", "c = b", "dy/dt = -c", "dx/dt = y"];
        let forward = system_with(&equations, &[("x", 1.0), ("y", 2.0)])?;
        assert_eq!(forward.evaluate_var("y")?, -3.0);
        assert_eq!(forward.evaluate_var("c")?, 3.0);

        let reversed: Vec<&str> = equations.iter().rev().copied().collect();
        let reversed = system_with(&reversed, &[("x", 1.0), ("y", 2.0)])?;
        assert_eq!(reversed.evaluate_var("y")?, -3.0);
        Ok(())
    }

    #[test]
    fn test_evaluate_all_combines_helpers_and_derivatives() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["k = 2", "dx/dt = -k x"], &[("x", 3.0)])?;
        let all = system.evaluate_all()?;
        assert_eq!(all.len(), 2);
        assert_eq!(all["k"], 2.0);
        assert_eq!(all["x"], -6.0);
        assert!(!all.contains_key("dx/dt"));

        let derivatives = system.derivatives()?;
        assert_eq!(derivatives.keys().collect::<Vec<_>>(), vec!["x"]);
        Ok(())
    }

    #[test]
    fn test_helpers_shadow_variables_in_lookup() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["dx/dt = 1", "x = 7"], &[("x", 0.0)])?;
        assert_eq!(system.evaluate_var("x")?, 7.0);
        assert_eq!(system.derivatives()?["x"], 1.0);
        Ok(())
    }

    #[test]
    fn test_vector_forms_are_equivalent() -> Result<(), Box<dyn std::error::Error>> {
        let values = [("x", 1.0), ("y", 2.0), ("z", 3.0)];
        let expected = BTreeMap::from([
            ("x".to_string(), 2.0),
            ("y".to_string(), -1.0),
            ("z".to_string(), 3.0),
        ]);

        let forms: [&[&str]; 5] = [
            &["d((x,y,z))/dt = ((y,-x,x+y))"],
            &["d[[x,y,z]]/dt = [[y,-x,x+y]]"],
            &["((y,-x,x+y)) = d((x,y,z))/dt"],
            &["r = ((x,y,z))", "dr/dt = ((y,-x,x+y))"],
            &["dx/dt = y", "dy/dt = -x", "dz/dt = x+y"],
        ];
        for equations in forms {
            let system = system_with(equations, &values)?;
            assert_eq!(system.variables(), vec!["x", "y", "z"], "{equations:?}");
            assert_eq!(system.evaluate_all()?, expected, "{equations:?}");
        }
        Ok(())
    }

    #[test]
    fn test_alias_is_not_a_helper() -> Result<(), Box<dyn std::error::Error>> {
        let system = System::new(["r = ((x,y))", "dr/dt = ((y,-x))"])?;
        assert!(system.compiled().helpers().is_empty());
        assert_eq!(system.compiled().aliases()["r"], vec!["x", "y"]);
        assert!(matches!(
            system.evaluate_var("r"),
            Err(SystemError::Eval(EvalError::UnknownVariable(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_alias_must_precede_use_by_default() -> Result<(), Box<dyn std::error::Error>> {
        let system = System::new(["dr/dt = ((y,-x))", "r = ((x,y))"])?;
        assert_eq!(system.variables(), vec!["r_1", "r_2"]);

        let system = System::builder(["dr/dt = ((y,-x))", "r = ((x,y))"])
            .alias_resolution(AliasResolution::TwoPass)
            .build()?;
        assert_eq!(system.variables(), vec!["x", "y"]);
        Ok(())
    }

    #[test]
    fn test_time_dependence() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = System::new(["dx/dt = t"])?;
        system.set_state(state(&[("x", 0.0)]), Some(3.0));
        assert_eq!(system.time(), 3.0);
        assert_eq!(system.evaluate_var("x")?, 3.0);
        Ok(())
    }

    #[test]
    fn test_time_dependence_across_states() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = System::new(["dx/dt = t", "dy/dt = x"])?;
        system.set_state(state(&[("x", 0.0), ("y", 0.0)]), Some(2.0));
        let first = system.evaluate_all()?;
        assert_eq!(first, state(&[("x", 2.0), ("y", 0.0)]));

        system.set_state(first, Some(3.0));
        assert_eq!(system.evaluate_all()?, state(&[("x", 3.0), ("y", 2.0)]));
        Ok(())
    }

    #[test]
    fn test_helper_named_like_constant_is_ordered_first() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["b = e * 2", "e = x + 1", "dx/dt = b"], &[("x", 1.0)])?;
        assert_eq!(system.evaluate_var("b")?, 4.0);
        assert_eq!(system.evaluate_var("x")?, 4.0);

        let system = system_with(&["b = pi * 2", "dx/dt = b"], &[])?;
        assert_eq!(system.evaluate_var("b")?, 2.0 * std::f64::consts::PI);
        Ok(())
    }

    #[test]
    fn test_single_argument_log_is_natural() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["dx/dt = log(x)"], &[("x", std::f64::consts::E)])?;
        assert!((system.evaluate_var("x")? - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_fraction_coefficient() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["dx/dt = -(1)/(2)x"], &[("x", 1.0)])?;
        assert_eq!(system.evaluate_var("x")?, -0.5);
        Ok(())
    }

    #[test]
    fn test_unicode_minus() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["dx/dt = \u{2212}x"], &[("x", 2.0)])?;
        assert_eq!(system.evaluate_var("x")?, -2.0);
        Ok(())
    }

    #[test]
    fn test_builtin_constants() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["dx/dt = 2 pi"], &[("x", 0.0)])?;
        assert_eq!(system.evaluate_var("x")?, 2.0 * std::f64::consts::PI);
        Ok(())
    }

    #[test]
    fn test_cyclic_helpers() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["a = b", "b = a", "dx/dt = a"], &[("x", 0.0)])?;
        assert!(matches!(
            system.evaluate_var("x"),
            Err(SystemError::Eval(EvalError::CyclicDependency(_)))
        ));
        assert!(matches!(
            system.evaluate_all(),
            Err(SystemError::Eval(EvalError::CyclicDependency(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_variable() -> Result<(), Box<dyn std::error::Error>> {
        let system = System::new(["dx/dt = 1"])?;
        assert!(matches!(
            system.evaluate_var("nope"),
            Err(SystemError::Eval(EvalError::UnknownVariable(name))) if name == "nope"
        ));
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(matches!(
            System::new(["d((x,y,z))/dt = ((y,-x))"]),
            Err(SystemError::Parse(ParseError::DimensionMismatch(_)))
        ));
    }

    #[test]
    fn test_malformed_equation_names_input() {
        match System::new(["dx/dt = y", "x + y"]) {
            Err(SystemError::Parse(ParseError::MalformedEquation(text))) => {
                assert_eq!(text, "x + y")
            }
            other => panic!("expected malformed equation, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_inputs_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let system = System::new(["dx/dt = 1", "   ", ""])?;
        assert_eq!(system.variables(), vec!["x"]);
        Ok(())
    }

    #[test]
    fn test_redeclaration_overwrites_by_default() -> Result<(), Box<dyn std::error::Error>> {
        let system = System::new(["dx/dt = 1", "dx/dt = 2", "k = 1", "k = 3"])?;
        assert_eq!(system.evaluate_var("x")?, 2.0);
        assert_eq!(system.evaluate_var("k")?, 3.0);
        Ok(())
    }

    #[test]
    fn test_state_copy_is_independent() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["dx/dt = 1"], &[("x", 1.0)])?;
        let mut copy = system.state();
        copy.insert("x".to_string(), 100.0);
        assert_eq!(system.state()["x"], 1.0);
        Ok(())
    }

    #[test]
    fn test_set_state_replaces_wholesale() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = system_with(&["dx/dt = 1", "dy/dt = 1"], &[("x", 1.0), ("y", 2.0)])?;
        system.set_state(state(&[("x", 5.0)]), None);
        assert_eq!(system.state(), state(&[("x", 5.0)]));
        Ok(())
    }

    #[test]
    fn test_step_replaces_state_and_advances_time() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = system_with(&["dx/dt = 2"], &[("x", 1.0), ("unused", 9.0)])?;
        system.set_time(1.0);
        let next = system.step(0.5)?;
        assert_eq!(next["x"], 2.0);
        assert_eq!(system.state(), next);
        assert_eq!(system.time(), 1.5);
        Ok(())
    }

    #[test]
    fn test_failed_step_leaves_system_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = system_with(&["dx/dt = missing"], &[("x", 1.0)])?;
        assert!(system.step(0.1).is_err());
        assert_eq!(system.state()["x"], 1.0);
        assert_eq!(system.time(), 0.0);
        Ok(())
    }

    #[test]
    fn test_integrate() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = system_with(&["dx/dt = 1"], &[("x", 0.0)])?;
        let trajectory = system.integrate(1.0, 0.25)?;
        assert_eq!(trajectory.len(), 4);
        assert_eq!(trajectory[3]["x"], 1.0);
        assert_eq!(system.time(), 1.0);

        assert!(matches!(
            system.integrate(2.0, 0.0),
            Err(SystemError::InvalidTimeStep(_))
        ));
        Ok(())
    }

    #[test]
    fn test_reset() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = System::builder(["dx/dt = 1"])
            .initial_state(state(&[("x", 1.0)]))
            .start_time(2.0)
            .build()?;
        system.step(0.5)?;
        system.reset();
        assert_eq!(system.state(), state(&[("x", 1.0)]));
        assert_eq!(system.time(), 2.0);
        Ok(())
    }

    #[test]
    fn test_recompile_swaps_equations() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = system_with(&["dx/dt = 1"], &[("x", 1.0)])?;
        system.set_time(4.0);
        system.recompile(["dx/dt = 2", "dy/dt = x"])?;
        assert_eq!(system.variables(), vec!["x", "y"]);
        assert_eq!(system.evaluate_var("x")?, 2.0);
        assert_eq!(system.time(), 4.0);
        assert_eq!(system.state()["x"], 1.0);
        Ok(())
    }

    #[test]
    fn test_failed_recompile_keeps_old_equations() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = system_with(&["dx/dt = 1"], &[("x", 1.0)])?;
        assert!(system.recompile(["dx/dt = 2", "broken"]).is_err());
        assert_eq!(system.variables(), vec!["x"]);
        assert_eq!(system.evaluate_var("x")?, 1.0);
        Ok(())
    }

    #[test]
    fn test_state_vector() -> Result<(), Box<dyn std::error::Error>> {
        let mut system = system_with(&["dy/dt = 1", "dx/dt = 1"], &[("y", 2.0)])?;
        assert_eq!(system.state_vector::<Vec<f64>>(), vec![0.0, 2.0]);

        system.set_state_vector(&vec![3.0, 4.0])?;
        assert_eq!(system.state(), state(&[("x", 3.0), ("y", 4.0)]));

        assert!(matches!(
            system.set_state_vector(&vec![1.0]),
            Err(SystemError::InvalidStateLength { expected: 2, got: 1 })
        ));
        Ok(())
    }

    #[test]
    fn test_evaluate_batch() -> Result<(), Box<dyn std::error::Error>> {
        let system = System::new(["dx/dt = -y", "dy/dt = x"])?;
        let states: Vec<State> = (0..16)
            .map(|i| state(&[("x", i as f64), ("y", 1.0)]))
            .collect();
        let results = system.evaluate_batch(&states)?;
        assert_eq!(results.len(), 16);
        for (i, derivatives) in results.iter().enumerate() {
            assert_eq!(derivatives["x"], -1.0);
            assert_eq!(derivatives["y"], i as f64);
        }
        Ok(())
    }

    #[test]
    fn test_display_lists_equations() -> Result<(), Box<dyn std::error::Error>> {
        let system = system_with(&["r = ((x,y))", "dr/dt = ((sigma y, -x))", "sigma = 10"], &[("x", 1.0)])?;
        let text = system.to_string();
        for needle in ["Variables", "Helpers", "Aliases", "sigma", "State"] {
            assert!(text.contains(needle), "{needle} missing from {text}");
        }
        Ok(())
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        const EQUATIONS: [&str; 8] = [
            "dx/dt = sigma*(y-x)",
            "dy/dt = x*(rho-z)-y",
            "dz/dt = x*y-beta*z",
            "rho = base + 18",
            "base = 10",
            "sigma = base",
            "beta = (8)/(3)",
            "energy = x^2 + y^2 + z^2",
        ];

        proptest! {
            #[test]
            fn equation_order_does_not_matter(
                order in Just(EQUATIONS.to_vec()).prop_shuffle(),
                x in -10.0_f64..10.0,
                y in -10.0_f64..10.0,
                z in 0.0_f64..40.0,
            ) {
                let values = [("x", x), ("y", y), ("z", z)];
                let reference = system_with(&EQUATIONS, &values).unwrap().evaluate_all().unwrap();
                let shuffled = system_with(&order, &values).unwrap().evaluate_all().unwrap();
                prop_assert_eq!(reference, shuffled);
            }

            #[test]
            fn juxtaposition_is_multiplication(
                sigma in -5.0_f64..5.0,
                x in -5.0_f64..5.0,
                y in -5.0_f64..5.0,
            ) {
                let values = [("x", x), ("y", y)];
                let helpers = format!("sigma = {sigma}");
                let implicit = system_with(&["dx/dt = sigma(y - x)", helpers.as_str()], &values).unwrap();
                let explicit = system_with(&["dx/dt = sigma*(y-x)", helpers.as_str()], &values).unwrap();
                prop_assert_eq!(
                    implicit.evaluate_var("x").unwrap(),
                    explicit.evaluate_var("x").unwrap()
                );
            }
        }
    }
}
