//! Dependency-ordered helper evaluation.
//!
//! Helpers may read state variables, `t` and other helpers. Every call computes
//! all helper values from scratch: each helper's helper dependencies are evaluated
//! before the helper itself, each helper is evaluated at most once, and a
//! dependency that is reached again while it is still being evaluated is reported
//! as a cycle.
//!
//! The traversal uses an explicit stack rather than recursion, so long helper
//! chains cannot overflow the call stack.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::equation::CompiledEquation;
use crate::errors::EvalError;
use crate::types::{HelperValues, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Evaluates every helper against `state` and `t`.
///
/// Dependencies that are not helpers (state variables, `t`, unknown names) are left
/// to the compiled functions to resolve from their scope.
///
/// # Errors
/// - `EvalError::CyclicDependency` naming the helper at which a cycle was found
/// - Any error raised by a helper's compiled function
pub fn evaluate_helpers(
    helpers: &BTreeMap<String, CompiledEquation>,
    state: &State,
    t: f64,
) -> Result<HelperValues, EvalError> {
    let mut values = HelperValues::with_capacity(helpers.len());
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(helpers.len());

    for root in helpers.keys() {
        if marks.contains_key(root.as_str()) {
            continue;
        }

        // (helper, dependencies already pushed)
        let mut stack: Vec<(&str, bool)> = vec![(root.as_str(), false)];
        while let Some((name, expanded)) = stack.pop() {
            let Some(helper) = helpers.get(name) else {
                continue;
            };

            if expanded {
                let value = helper.eval(state, t, &values)?;
                trace!(helper = name, value, "evaluated helper");
                values.insert(name.to_string(), value);
                marks.insert(name, Mark::Done);
                continue;
            }

            match marks.get(name) {
                Some(Mark::Done) => continue,
                Some(Mark::InProgress) => return Err(EvalError::CyclicDependency(name.to_string())),
                None => {}
            }

            marks.insert(name, Mark::InProgress);
            stack.push((name, true));
            for dependency in helper.dependencies.iter().rev() {
                let Some((key, _)) = helpers.get_key_value(dependency) else {
                    continue;
                };
                match marks.get(key.as_str()) {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        return Err(EvalError::CyclicDependency(key.clone()));
                    }
                    None => stack.push((key.as_str(), false)),
                }
            }
        }
    }

    Ok(values)
}
