//! Expression engine backed by the [evalexpr](https://github.com/ISibboI/evalexpr) crate.
//!
//! Right-hand sides are parsed once into an evalexpr operator tree and evaluated by
//! walking that tree against a fresh `HashMapContext` holding the identifiers the
//! expression reads.
//!
//! Before parsing, the expression is translated into evalexpr's dialect:
//!
//! - Numeric literals are written as floats, so `8/3` divides as floats instead of
//!   truncating as integers.
//! - Function names such as `sin` or `pow` are qualified with evalexpr's `math::`
//!   namespace. `min`, `max`, `floor`, `ceil` and `round` are unqualified built-ins.

use std::collections::HashSet;
use std::sync::Arc;

use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, Node,
    Operator, Value,
};
use itertools::Itertools;

use crate::errors::{EvalError, ParseError};
use crate::expr::{CompiledExpression, Evaluated, ExpressionEngine, Scope};
use crate::preprocess::{tokenize, Token};

/// The default [`ExpressionEngine`].
///
/// # Example
/// ```
/// # use evalexpr_flow::backends::evalexpr::EvalexprEngine;
/// # use evalexpr_flow::expr::{Evaluated, ExpressionEngine, Scope};
/// # use evalexpr_flow::types::{HelperValues, State};
/// let expression = EvalexprEngine.compile("8/3 + sin(x)").unwrap();
///
/// let state = State::from([("x".to_string(), 0.0)]);
/// let helpers = HelperValues::new();
/// let value = expression.evaluate(&Scope::new(&state, 0.0, &helpers)).unwrap();
/// assert_eq!(value, Evaluated::Number(8.0 / 3.0));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalexprEngine;

impl ExpressionEngine for EvalexprEngine {
    fn compile(&self, expression: &str) -> Result<Arc<dyn CompiledExpression>, ParseError> {
        Ok(Arc::new(EvalexprExpression::new(expression)?))
    }
}

/// A right-hand side parsed into an evalexpr operator tree.
#[derive(Debug)]
pub struct EvalexprExpression {
    source: String,
    translated: String,
    node: Node,
    identifiers: Vec<String>,
}

impl EvalexprExpression {
    pub fn new(expression: &str) -> Result<Self, ParseError> {
        let translated = translate(expression);
        let node = build_operator_tree::<DefaultNumericTypes>(&translated).map_err(|source| {
            ParseError::Compile {
                expression: expression.to_string(),
                source,
            }
        })?;
        let identifiers = extract_identifiers(&node);

        Ok(Self {
            source: expression.to_string(),
            translated,
            node,
            identifiers,
        })
    }

    /// The expression as handed to evalexpr.
    pub fn translated(&self) -> &str {
        &self.translated
    }
}

impl CompiledExpression for EvalexprExpression {
    fn source(&self) -> &str {
        &self.source
    }

    fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    fn evaluate(&self, scope: &Scope<'_>) -> Result<Evaluated, EvalError> {
        let evaluate_error = |source| EvalError::Evaluate {
            expression: self.source.clone(),
            source,
        };

        let mut context = HashMapContext::<DefaultNumericTypes>::new();
        for identifier in &self.identifiers {
            if let Some(value) = scope.get(identifier) {
                context
                    .set_value(identifier.clone(), Value::Float(value))
                    .map_err(evaluate_error)?;
            }
        }

        let value = self
            .node
            .eval_with_context(&context)
            .map_err(evaluate_error)?;

        Ok(match value {
            Value::Float(number) => Evaluated::Number(number),
            Value::Int(number) => Evaluated::Number(number as f64),
            other => Evaluated::Other(other.to_string()),
        })
    }
}

/// Rewrites an expression into evalexpr's dialect.
pub fn translate(expression: &str) -> String {
    let tokens = tokenize(expression);
    let mut out = String::with_capacity(expression.len() + 16);

    for (i, token) in tokens.iter().enumerate() {
        match *token {
            Token::Number(literal) => out.push_str(&float_literal(literal)),
            Token::Ident("log") if is_call(&tokens[i + 1..]) => {
                if has_single_argument(&tokens[i + 1..]) {
                    out.push_str("math::ln");
                } else {
                    out.push_str("math::log");
                }
            }
            Token::Ident(name) if is_call(&tokens[i + 1..]) => out.push_str(qualified(name)),
            Token::Ident(text) | Token::Space(text) => out.push_str(text),
            Token::Symbol(c) => out.push(c),
        }
    }

    out
}

fn is_call(rest: &[Token<'_>]) -> bool {
    rest.iter()
        .find(|token| !matches!(token, Token::Space(_)))
        .is_some_and(|token| *token == Token::Symbol('('))
}

/// Whether the call opening at the start of `rest` has no top-level comma.
fn has_single_argument(rest: &[Token<'_>]) -> bool {
    let mut depth = 0usize;
    for token in rest {
        match token {
            Token::Symbol('(') => depth += 1,
            Token::Symbol(')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return true;
                }
            }
            Token::Symbol(',') if depth == 1 => return false,
            _ => {}
        }
    }
    true
}

fn qualified(name: &str) -> &str {
    match name {
        "sin" => "math::sin",
        "cos" => "math::cos",
        "tan" => "math::tan",
        "asin" => "math::asin",
        "acos" => "math::acos",
        "atan" => "math::atan",
        "sinh" => "math::sinh",
        "cosh" => "math::cosh",
        "tanh" => "math::tanh",
        "exp" => "math::exp",
        "sqrt" => "math::sqrt",
        "abs" => "math::abs",
        "ln" => "math::ln",
        "pow" => "math::pow",
        other => other,
    }
}

fn float_literal(literal: &str) -> String {
    let mut text = match literal.parse::<f64>() {
        Ok(value) if value.is_finite() => value.to_string(),
        _ => return literal.to_string(),
    };
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Extracts the sorted, de-duplicated identifiers an operator tree reads.
pub fn extract_identifiers(node: &Node) -> Vec<String> {
    let mut identifiers = HashSet::new();
    extract_identifiers_from_node(node, &mut identifiers);
    identifiers.into_iter().sorted().collect()
}

/// Recursively collects variable reads from an expression tree node.
///
/// # Arguments
/// * `node` - Current node in the expression tree
/// * `identifiers` - Set to store found variable names
fn extract_identifiers_from_node(node: &Node, identifiers: &mut HashSet<String>) {
    match node.operator() {
        Operator::VariableIdentifierRead { identifier } => {
            identifiers.insert(identifier.to_string());
        }
        _ => {
            for child in node.children() {
                extract_identifiers_from_node(child, identifiers);
            }
        }
    }
}
