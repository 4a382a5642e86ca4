//! Vector shorthand expansion.
//!
//! Users may write several scalar equations at once with double-bracket vector
//! literals, either `((a, b, c))` or `[[a, b, c]]`:
//!
//! ```text
//! d((x,y,z))/dt = ((y, -x, x+y))     three derivative equations
//! r = ((x,y,z))                      records the vector alias r -> [x, y, z]
//! dr/dt = ((y, -x, x+y))             derivative of a previously declared alias
//! ```
//!
//! [`VectorExpander::expand`] rewrites one such equation into the equivalent list of
//! scalar equations. Alias declarations are consumed by the expander and produce no
//! scalar equations of their own.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use tracing::debug;

use crate::errors::ParseError;

static DERIVATIVE_OF_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^d\s*([A-Za-z_]\w*)\s*/\s*d\s*[tT]$").expect("derivative pattern is valid")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("identifier pattern is valid"));

/// A vector literal found in an equation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorLiteral {
    /// Byte offset of the opening `((` or `[[`
    pub start: usize,
    /// Byte offset just past the closing `))` or `]]`
    pub end: usize,
    /// Trimmed component expressions, split on top-level commas
    pub components: Vec<String>,
}

impl VectorLiteral {
    pub fn dimension(&self) -> usize {
        self.components.len()
    }
}

/// Expands vector equations into scalar equations, remembering vector aliases
/// across calls.
#[derive(Debug, Clone, Default)]
pub struct VectorExpander {
    aliases: BTreeMap<String, Vec<String>>,
}

impl VectorExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vector aliases recorded so far, e.g. `r -> [x, y, z]`.
    pub fn aliases(&self) -> &BTreeMap<String, Vec<String>> {
        &self.aliases
    }

    pub fn into_aliases(self) -> BTreeMap<String, Vec<String>> {
        self.aliases
    }

    /// Expands one equation into zero or more scalar equations.
    ///
    /// The shapes are checked in this order:
    ///
    /// 1. `d<alias>/dt = <vector>`: one derivative equation per alias component. An
    ///    alias that has not been declared yet expands to `<alias>_1 ... <alias>_N`.
    /// 2. An alias declaration `name = <vector>`: recorded, no output.
    /// 3. Any other equation containing vector literals: one equation per component
    ///    index, substituting the i-th component into every literal.
    /// 4. No vector syntax: the equation is returned unchanged.
    ///
    /// # Errors
    /// Returns `ParseError::DimensionMismatch` if the vector literals of one equation
    /// (or an alias and its derivative) have different numbers of components.
    ///
    /// # Example
    /// ```
    /// # use evalexpr_flow::expand::VectorExpander;
    /// let mut expander = VectorExpander::new();
    /// assert!(expander.expand("r = ((x, y))").unwrap().is_empty());
    /// assert_eq!(
    ///     expander.expand("dr/dt = ((y, -x))").unwrap(),
    ///     vec!["dx/dt = y".to_string(), "dy/dt = -x".to_string()]
    /// );
    /// ```
    pub fn expand(&mut self, equation: &str) -> Result<Vec<String>, ParseError> {
        if let Some((alias, vector_part)) = derivative_of_alias(equation) {
            let components = self.expand(vector_part)?;
            return self.expand_alias_derivative(&alias, components, equation);
        }

        let literals = find_vector_literals(equation);
        if literals.is_empty() {
            return Ok(vec![equation.to_string()]);
        }

        let dimension = literals[0].dimension();
        if literals.iter().any(|literal| literal.dimension() != dimension) {
            return Err(ParseError::DimensionMismatch(equation.to_string()));
        }

        if self.record_alias(equation, &literals) {
            return Ok(Vec::new());
        }

        let scalars: Vec<String> = (0..dimension)
            .map(|i| substitute_component(equation, &literals, i))
            .collect();
        debug!(equation, expanded = ?scalars, "expanded vector equation");
        Ok(scalars)
    }

    /// Records `equation` if it is an alias declaration, without expanding anything.
    ///
    /// Used to register every alias up front when alias resolution should not depend
    /// on declaration order.
    pub fn register_alias(&mut self, equation: &str) -> bool {
        if derivative_of_alias(equation).is_some() {
            return false;
        }
        let literals = find_vector_literals(equation);
        self.record_alias(equation, &literals)
    }

    fn record_alias(&mut self, equation: &str, literals: &[VectorLiteral]) -> bool {
        let Some((name, literal)) = alias_declaration(equation, literals) else {
            return false;
        };
        let components: Vec<String> = literal
            .components
            .iter()
            .map(|component| component.chars().filter(|c| !c.is_whitespace()).collect())
            .collect();
        debug!(alias = name, components = %components.iter().join(", "), "recorded vector alias");
        self.aliases.insert(name.to_string(), components);
        true
    }

    fn expand_alias_derivative(
        &self,
        alias: &str,
        components: Vec<String>,
        equation: &str,
    ) -> Result<Vec<String>, ParseError> {
        let names: Vec<String> = match self.aliases.get(alias) {
            Some(names) if names.len() != components.len() => {
                return Err(ParseError::DimensionMismatch(equation.to_string()));
            }
            Some(names) => names.clone(),
            None => (1..=components.len())
                .map(|i| format!("{alias}_{i}"))
                .collect(),
        };

        let scalars: Vec<String> = names
            .iter()
            .zip(components)
            .map(|(name, rhs)| format!("d{}/dt = {}", name, rhs.trim()))
            .collect();
        debug!(alias, expanded = ?scalars, "expanded alias derivative");
        Ok(scalars)
    }
}

/// Matches `d<name>/dt = <vector expression>` in either orientation.
fn derivative_of_alias(equation: &str) -> Option<(String, &str)> {
    let (lhs, rhs) = equation.split_once('=')?;
    let (lhs, rhs) = (lhs.trim(), rhs.trim());

    [(lhs, rhs), (rhs, lhs)]
        .into_iter()
        .find_map(|(derivative, vector)| {
            let captures = DERIVATIVE_OF_NAME.captures(derivative)?;
            is_vector_expression(vector).then(|| (captures[1].to_string(), vector))
        })
}

fn is_vector_expression(text: &str) -> bool {
    ((text.starts_with("((") && text.ends_with("))"))
        || (text.starts_with("[[") && text.ends_with("]]")))
        && !find_vector_literals(text).is_empty()
}

/// Matches `name = <single vector literal>`.
fn alias_declaration<'a>(
    equation: &'a str,
    literals: &'a [VectorLiteral],
) -> Option<(&'a str, &'a VectorLiteral)> {
    let [literal] = literals else {
        return None;
    };
    let (lhs, _) = equation.split_once('=')?;
    let equals = lhs.len();
    let name = lhs.trim();

    let is_alias = IDENTIFIER.is_match(name)
        && literal.start > equals
        && equation[equals + 1..literal.start].trim().is_empty()
        && equation[literal.end..].trim().is_empty();
    is_alias.then_some((name, literal))
}

fn substitute_component(equation: &str, literals: &[VectorLiteral], index: usize) -> String {
    let mut out = String::with_capacity(equation.len());
    let mut cursor = 0;
    for literal in literals {
        out.push_str(&equation[cursor..literal.start]);
        out.push_str(&literal.components[index]);
        cursor = literal.end;
    }
    out.push_str(&equation[cursor..]);
    out
}

/// Finds every `((...))` / `[[...]]` vector literal in `text`.
///
/// A literal needs at least one top-level comma; `((a+b))` is just a doubly
/// parenthesized expression. Components are split on top-level commas only, so
/// nested groups like `((sin(x), max(y, 1)))` keep their inner commas.
pub fn find_vector_literals(text: &str) -> Vec<VectorLiteral> {
    let bytes = text.as_bytes();
    let mut literals = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        let close = match (bytes[i], bytes[i + 1]) {
            (b'(', b'(') => b')',
            (b'[', b'[') => b']',
            _ => {
                i += 1;
                continue;
            }
        };
        match parse_literal(text, i, close) {
            Some(literal) => {
                i = literal.end;
                literals.push(literal);
            }
            None => i += 1,
        }
    }

    literals
}

fn parse_literal(text: &str, start: usize, close: u8) -> Option<VectorLiteral> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut component_start = start + 2;
    let mut components = Vec::new();

    for j in start + 2..bytes.len() {
        match bytes[j] {
            b'(' | b'[' => depth += 1,
            b')' | b']' if depth > 0 => depth -= 1,
            b')' | b']' => {
                if bytes[j] != close || bytes.get(j + 1) != Some(&close) {
                    return None;
                }
                components.push(text[component_start..j].trim().to_string());
                return (components.len() > 1).then_some(VectorLiteral {
                    start,
                    end: j + 2,
                    components,
                });
            }
            b',' if depth == 0 => {
                components.push(text[component_start..j].trim().to_string());
                component_start = j + 1;
            }
            _ => {}
        }
    }

    None
}
