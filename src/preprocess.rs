//! Text normalization applied to equations before they are expanded and compiled.
//!
//! Normalization happens in two layers:
//!
//! - [`canonicalize`] performs the textual rewrites that must happen before vector
//!   expansion: unicode minus signs, alternate derivative notations and log
//!   subscripts. Whitespace is preserved.
//! - [`normalize`] additionally inserts implicit multiplication and strips all
//!   whitespace, producing the canonical scalar-equation string the classifier
//!   splits on `=`.
//!
//! Both are idempotent.

use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

/// Unicode dashes users (and math input widgets) produce in place of `-`.
const MINUS_VARIANTS: [char; 3] = ['\u{2013}', '\u{2014}', '\u{2212}'];

/// Denominator of a derivative: `dt`, `d t` or `(d t)`.
const DERIVATIVE_DENOMINATOR: &str = r"(?:\(\s*d\s*[tT]\s*\)|d\s*[tT]\b)";

/// `(d y)/(d t)`, `(d(y))/(dt)`, `(dy)/dt`
static PARENTHESIZED_DERIVATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\(\s*d\s*\(?\s*([A-Za-z_]\w*)\s*\)?\s*\)\s*/\s*{DERIVATIVE_DENOMINATOR}"
    ))
    .expect("derivative pattern is valid")
});

/// `d(y)/dt`, `d(y)/(d t)`
static INNER_PARENTHESIZED_DERIVATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\bd\s*\(\s*([A-Za-z_]\w*)\s*\)\s*/\s*{DERIVATIVE_DENOMINATOR}"
    ))
    .expect("derivative pattern is valid")
});

/// `d y/d t`, `dy / dt`
static SPACED_DERIVATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\bd\s*([A-Za-z_]\w*)\s*/\s*{DERIVATIVE_DENOMINATOR}"
    ))
    .expect("derivative pattern is valid")
});

/// `log_b` prefix of a log with a subscripted base.
static LOG_SUBSCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blog\s*_\s*([A-Za-z0-9.]+)\s*").expect("log pattern is valid"));

/// Lexical token of an expression.
///
/// The scanner is deliberately shallow: it only distinguishes what the implicit
/// multiplication rules and the engine dialect translation need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Ident(&'a str),
    Number(&'a str),
    Space(&'a str),
    Symbol(char),
}

pub(crate) fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            let end = consume_while(&mut chars, start, char::is_whitespace);
            tokens.push(Token::Space(&input[start..end]));
        } else if c.is_alphabetic() || c == '_' {
            let end = consume_while(&mut chars, start, |c| c.is_alphanumeric() || c == '_');
            tokens.push(Token::Ident(&input[start..end]));
        } else if c.is_ascii_digit() || (c == '.' && is_digit_at(input, start + 1)) {
            let end = number_end(input, start);
            while chars.peek().is_some_and(|&(i, _)| i < end) {
                chars.next();
            }
            tokens.push(Token::Number(&input[start..end]));
        } else {
            chars.next();
            tokens.push(Token::Symbol(c));
        }
    }

    tokens
}

fn consume_while(
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
    predicate: impl Fn(char) -> bool,
) -> usize {
    let mut end = start;
    while let Some(&(i, c)) = chars.peek() {
        if !predicate(c) {
            break;
        }
        end = i + c.len_utf8();
        chars.next();
    }
    end
}

fn is_digit_at(input: &str, index: usize) -> bool {
    input.as_bytes().get(index).is_some_and(u8::is_ascii_digit)
}

/// End of a numeric literal: digits, an optional fraction and an optional exponent.
fn number_end(input: &str, start: usize) -> usize {
    let bytes = input.as_bytes();
    let skip_digits = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = skip_digits(start);
    if bytes.get(end) == Some(&b'.') {
        end = skip_digits(end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        if is_digit_at(input, exponent) {
            end = skip_digits(exponent);
        }
    }
    end
}

/// Rewrites that must happen before vector expansion. Whitespace is preserved.
pub fn canonicalize(raw: &str) -> String {
    let text: String = raw
        .chars()
        .map(|c| if MINUS_VARIANTS.contains(&c) { '-' } else { c })
        .collect();

    let text = PARENTHESIZED_DERIVATIVE.replace_all(&text, "d${1}/dt");
    let text = INNER_PARENTHESIZED_DERIVATIVE.replace_all(&text, "d${1}/dt");
    let text = SPACED_DERIVATIVE.replace_all(&text, "d${1}/dt");

    rewrite_log_subscripts(&text)
}

/// Produces the canonical scalar-equation string: canonical notation, explicit
/// multiplication and no whitespace.
pub fn normalize(equation: &str, is_function: impl Fn(&str) -> bool) -> String {
    let canonical = canonicalize(equation);
    insert_implicit_multiplication(&canonical, is_function)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Inserts `*` where multiplication is written by juxtaposition.
///
/// - `x y` becomes `x*y` (identifiers separated only by whitespace)
/// - `sigma(y-x)` becomes `sigma*(y-x)` unless `sigma` is a function name
/// - `2x` and `2(x+1)` become `2*x` and `2*(x+1)`
/// - `2 3` becomes `2*3`
/// - `(a)b`, `(a)2` and `(a)(b)` become `(a)*b`, `(a)*2` and `(a)*(b)`
pub fn insert_implicit_multiplication(expr: &str, is_function: impl Fn(&str) -> bool) -> String {
    let mut out = String::with_capacity(expr.len() + 8);
    let mut previous: Option<Token<'_>> = None;
    let mut pending_space: Option<&str> = None;

    for token in tokenize(expr) {
        if let Token::Space(space) = token {
            pending_space = Some(space);
            continue;
        }

        let spaced = pending_space.is_some();
        let multiply = previous
            .is_some_and(|prev| is_juxtaposition(prev, token, spaced, &is_function));
        if multiply {
            out.push('*');
        } else if let Some(space) = pending_space {
            out.push_str(space);
        }
        pending_space = None;

        match token {
            Token::Ident(s) | Token::Number(s) | Token::Space(s) => out.push_str(s),
            Token::Symbol(c) => out.push(c),
        }
        previous = Some(token);
    }

    if let Some(space) = pending_space {
        out.push_str(space);
    }
    out
}

fn is_juxtaposition(
    previous: Token<'_>,
    next: Token<'_>,
    spaced: bool,
    is_function: &impl Fn(&str) -> bool,
) -> bool {
    match (previous, next) {
        (Token::Ident(name), Token::Ident(_) | Token::Number(_)) => spaced && !is_function(name),
        (Token::Ident(name), Token::Symbol('(')) => !is_function(name),
        (Token::Number(_), Token::Number(_)) => spaced,
        (Token::Number(_), Token::Ident(_) | Token::Symbol('(')) => true,
        (Token::Symbol(')'), Token::Ident(_) | Token::Number(_) | Token::Symbol('(')) => true,
        _ => false,
    }
}

/// Finds a function name applied to an operand without parentheses, as in `sin x`.
///
/// Returns the function name. Stripping whitespace would otherwise fuse the two
/// into a single identifier.
pub fn spaced_function_application<'a>(
    expr: &'a str,
    is_function: impl Fn(&str) -> bool,
) -> Option<&'a str> {
    tokenize(expr)
        .into_iter()
        .tuple_windows()
        .find_map(|window| match window {
            (Token::Ident(name), Token::Space(_), Token::Ident(_) | Token::Number(_))
                if is_function(name) =>
            {
                Some(name)
            }
            _ => None,
        })
}

/// `log_b(x)` and `log_b x` become `log(x, b)`.
fn rewrite_log_subscripts(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(captures) = LOG_SUBSCRIPT.captures(rest) {
        let (Some(prefix), Some(base)) = (captures.get(0), captures.get(1)) else {
            break;
        };
        let after = &rest[prefix.end()..];
        match take_argument(after) {
            Some((argument, consumed)) => {
                out.push_str(&rest[..prefix.start()]);
                out.push_str(&format!("log({}, {})", argument, base.as_str()));
                rest = &after[consumed..];
            }
            None => {
                out.push_str(&rest[..prefix.end()]);
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Takes a parenthesized group or a single token from the start of `input`.
///
/// Returns the argument text and the number of bytes consumed.
fn take_argument(input: &str) -> Option<(&str, usize)> {
    if input.starts_with('(') {
        let mut depth = 0usize;
        for (i, c) in input.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((&input[1..i], i + 1));
                    }
                }
                _ => {}
            }
        }
        return None;
    }

    let end = input
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '.'))
        .map_or(input.len(), |(i, _)| i);
    (end > 0).then(|| (&input[..end], end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::KNOWN_FUNCTIONS;

    fn is_function(name: &str) -> bool {
        KNOWN_FUNCTIONS.contains(&name)
    }

    #[test]
    fn test_unicode_minus() {
        assert_eq!(canonicalize("dx/dt = \u{2212}x \u{2013} y \u{2014} 1"), "dx/dt = -x - y - 1");
    }

    #[test]
    fn test_derivative_notations() {
        assert_eq!(canonicalize("(d y)/(d t) = x"), "dy/dt = x");
        assert_eq!(canonicalize("(d(y))/(dt) = x"), "dy/dt = x");
        assert_eq!(canonicalize("(dy)/(dt)=x"), "dy/dt=x");
        assert_eq!(canonicalize("d(y)/dt = x"), "dy/dt = x");
        assert_eq!(canonicalize("d y / d t = x"), "dy/dt = x");
        assert_eq!(canonicalize("x = (d y)/(d t)"), "x = dy/dt");
    }

    #[test]
    fn test_vector_derivative_untouched() {
        assert_eq!(
            canonicalize("d((x,y,z))/dt = ((y,-x,x+y))"),
            "d((x,y,z))/dt = ((y,-x,x+y))"
        );
    }

    #[test]
    fn test_log_subscripts() {
        assert_eq!(canonicalize("dx/dt = log_e(x)"), "dx/dt = log(x, e)");
        assert_eq!(canonicalize("dx/dt = log_10 x + 1"), "dx/dt = log(x, 10) + 1");
        assert_eq!(canonicalize("dx/dt = log_2(x*(y+1))"), "dx/dt = log(x*(y+1), 2)");
    }

    #[test]
    fn test_implicit_multiplication_identifiers() {
        assert_eq!(insert_implicit_multiplication("x y-beta z", is_function), "x*y-beta*z");
        assert_eq!(insert_implicit_multiplication("sigma(y-x)", is_function), "sigma*(y-x)");
        assert_eq!(insert_implicit_multiplication("sin(x)", is_function), "sin(x)");
        assert_eq!(insert_implicit_multiplication("x (rho-z)", is_function), "x*(rho-z)");
    }

    #[test]
    fn test_implicit_multiplication_numbers_and_groups() {
        assert_eq!(insert_implicit_multiplication("2x", is_function), "2*x");
        assert_eq!(insert_implicit_multiplication("-(1)/(2)x", is_function), "-(1)/(2)*x");
        assert_eq!(insert_implicit_multiplication("(x+1)(x-1)", is_function), "(x+1)*(x-1)");
        assert_eq!(insert_implicit_multiplication("1.5e-3 x", is_function), "1.5e-3*x");
        assert_eq!(insert_implicit_multiplication("2 3", is_function), "2*3");
        assert_eq!(insert_implicit_multiplication("2 3 x", is_function), "2*3*x");
    }

    #[test]
    fn test_normalize_strips_whitespace() {
        assert_eq!(normalize("dz/dt = x y - beta z", is_function), "dz/dt=x*y-beta*z");
        assert_eq!(normalize("(d x)/(d t) = sigma (y - x)", is_function), "dx/dt=sigma*(y-x)");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize("dy/dt = x(rho - z) - y", is_function);
        assert_eq!(normalize(&once, is_function), once);
    }

    #[test]
    fn test_spaced_function_application() {
        assert_eq!(spaced_function_application("sin x", is_function), Some("sin"));
        assert_eq!(spaced_function_application("y + sqrt 2", is_function), Some("sqrt"));
        assert_eq!(spaced_function_application("sin (x)", is_function), None);
        assert_eq!(spaced_function_application("sin(x) y", is_function), None);
        assert_eq!(spaced_function_application("sigma y", is_function), None);
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("x_1 + 2.5e3"),
            vec![
                Token::Ident("x_1"),
                Token::Space(" "),
                Token::Symbol('+'),
                Token::Space(" "),
                Token::Number("2.5e3"),
            ]
        );
    }
}
