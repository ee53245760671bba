//! Constructors for syntax trees in the shape the external parser produces.
//!
//! ```
//! use ecmachine::syntax::build::*;
//!
//! // function f(x) { return x + 1; } f(2);
//! let program = sequence([
//!     function_declaration("f", &["x"], return_statement(binary("+", name("x"), num(1.0)))),
//!     application(name("f"), [num(2.0)]),
//! ]);
//! assert!(program.is_pair());
//! ```

use super::SyntaxTree;
use crate::value::Raw;

pub fn list(items: impl IntoIterator<Item = SyntaxTree>) -> SyntaxTree {
    SyntaxTree::list(items)
}

fn tagged(tag: &str, parts: impl IntoIterator<Item = SyntaxTree>) -> SyntaxTree {
    list(std::iter::once(SyntaxTree::atom(tag)).chain(parts))
}

pub fn num(n: f64) -> SyntaxTree {
    SyntaxTree::atom(n)
}

pub fn boolean(b: bool) -> SyntaxTree {
    SyntaxTree::atom(b)
}

pub fn string(s: &str) -> SyntaxTree {
    SyntaxTree::atom(s)
}

pub fn undefined() -> SyntaxTree {
    SyntaxTree::Atom(Raw::Undefined)
}

pub fn name(symbol: &str) -> SyntaxTree {
    tagged("name", [SyntaxTree::atom(symbol)])
}

pub fn application(function: SyntaxTree, args: impl IntoIterator<Item = SyntaxTree>) -> SyntaxTree {
    tagged("application", [function, list(args)])
}

/// Operator combinations are applications of the operator's name.
pub fn binary(operator: &str, left: SyntaxTree, right: SyntaxTree) -> SyntaxTree {
    application(name(operator), [left, right])
}

pub fn unary(operator: &str, operand: SyntaxTree) -> SyntaxTree {
    application(name(operator), [operand])
}

pub fn constant_declaration(symbol: &str, value: SyntaxTree) -> SyntaxTree {
    tagged("constant_declaration", [name(symbol), value])
}

pub fn variable_declaration(symbol: &str, value: SyntaxTree) -> SyntaxTree {
    tagged("variable_declaration", [name(symbol), value])
}

pub fn assignment(symbol: &str, value: SyntaxTree) -> SyntaxTree {
    tagged("assignment", [name(symbol), value])
}

pub fn conditional_expression(
    predicate: SyntaxTree,
    consequent: SyntaxTree,
    alternative: SyntaxTree,
) -> SyntaxTree {
    tagged("conditional_expression", [predicate, consequent, alternative])
}

pub fn conditional_statement(
    predicate: SyntaxTree,
    consequent: SyntaxTree,
    alternative: SyntaxTree,
) -> SyntaxTree {
    tagged("conditional_statement", [predicate, consequent, alternative])
}

pub fn function_definition(params: &[&str], body: SyntaxTree) -> SyntaxTree {
    tagged("function_definition", [list(params.iter().map(|p| name(p))), body])
}

/// `function f(...) { ... }` is a constant declaration of a function value.
pub fn function_declaration(symbol: &str, params: &[&str], body: SyntaxTree) -> SyntaxTree {
    constant_declaration(symbol, function_definition(params, body))
}

pub fn sequence(statements: impl IntoIterator<Item = SyntaxTree>) -> SyntaxTree {
    tagged("sequence", [list(statements)])
}

pub fn return_statement(expression: SyntaxTree) -> SyntaxTree {
    tagged("return_statement", [expression])
}

pub fn block(body: SyntaxTree) -> SyntaxTree {
    tagged("block", [body])
}

/// `&&` and `||`.
pub fn boolean_operation(operator: &str, first: SyntaxTree, second: SyntaxTree) -> SyntaxTree {
    tagged("boolean_operation", [name(operator), list([first, second])])
}
