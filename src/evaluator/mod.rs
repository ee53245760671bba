//! The explicit-control evaluator.
//!
//! The evaluator is not Rust code walking a tree: it is a controller
//! program ([`controller::evaluator_controller`]) run by the register
//! machine, with the address-aware operations in [`ops`] as its only
//! primitives. Recursion in the evaluated program is recursion on the
//! machine's stack.

use crate::machine::{make_machine, Machine, MachineConfig};
use crate::syntax::SyntaxTree;
use crate::value::{Pointer, Value};
use crate::Result;

pub mod controller;
pub mod expression;
pub mod ops;

pub use expression::ExpressionKind;

/// Evaluator registers in allocation order. The collector visits roots in
/// this order, followed by the stack.
pub const EVALUATOR_REGISTERS: [&str; 13] = [
    "exp", "env", "val", "continue", "fun", "argl", "unev", "a", "b", "c", "d", "e", "res",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArityError {
    #[error("too many arguments: expected {expected}, got {got}")]
    TooMany { expected: usize, got: usize },
    #[error("too few arguments: expected {expected}, got {got}")]
    TooFew { expected: usize, got: usize },
}

/// Errors in the evaluated program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unbound name: {name}")]
    UnboundName { name: String },
    #[error("name used before its declaration: {name}")]
    UseBeforeDeclaration { name: String },
    #[error("cannot assign to constant {name}")]
    AssignToConstant { name: String },
    #[error("{name} is declared more than once in the same scope")]
    DuplicateDeclaration { name: String },
    #[error(transparent)]
    Arity(#[from] ArityError),
    #[error("unknown expression type: {0}")]
    UnknownExpressionType(String),
    #[error("unknown function type: {0}")]
    UnknownFunctionType(String),
    #[error("conditional predicate is not a boolean: {0}")]
    NonBooleanPredicate(String),
}

/// A machine with the evaluator registers, operations and controller,
/// configured but with no program installed yet.
pub fn make_evaluator_machine(config: &MachineConfig) -> Result<Machine> {
    let mut machine = make_machine(
        EVALUATOR_REGISTERS,
        ops::evaluator_operations(),
        &controller::evaluator_controller(),
    )?;
    machine.configure(config);
    Ok(machine)
}

/// Installs `tree` in `machine`, runs it, and returns the contents of `val`.
pub fn run(machine: &mut Machine, tree: &SyntaxTree) -> Result<Pointer> {
    machine.install_parsetree(tree)?;
    machine.start()?;
    match machine.get_register_contents("val")? {
        Value::Ptr(p) => Ok(p.clone()),
        // only an empty program leaves `val` untouched
        _ => Ok(Pointer::Undefined),
    }
}

/// Evaluates a program on a fresh machine.
pub fn evaluate(tree: &SyntaxTree, config: &MachineConfig) -> Result<Pointer> {
    let mut machine = make_evaluator_machine(config)?;
    run(&mut machine, tree)
}

/// Renders a result for people: scalars as themselves, function values by
/// kind, other pairs as `[head, tail]`.
pub fn describe(machine: &Machine, value: &Pointer) -> String {
    let Some(address) = value.pair_address() else {
        return match value {
            Pointer::Str(s) => format!("{:?}", &**s),
            other => other.to_string(),
        };
    };
    let heap = machine.heap();
    let (Ok(head), Ok(tail)) = (heap.head(address), heap.tail(address)) else {
        return value.to_string();
    };
    match head.as_str() {
        Some("primitive") => format!("<primitive function {}>", tail),
        Some("compound") => "<compound function>".to_string(),
        _ => format!("[{}, {}]", describe(machine, &head), describe(machine, &tail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::build::*;

    fn eval(tree: SyntaxTree) -> Result<Pointer> {
        evaluate(&tree, &MachineConfig::default())
    }

    #[test]
    fn literal_program() {
        assert_eq!(eval(num(5.0)).unwrap(), Pointer::Number(5.0));
    }

    #[test]
    fn primitive_application() {
        assert_eq!(eval(binary("*", num(6.0), num(7.0))).unwrap(), Pointer::Number(42.0));
    }

    #[test]
    fn declaration_then_use() {
        let program = sequence([constant_declaration("x", num(4.0)), name("x")]);
        assert_eq!(eval(program).unwrap(), Pointer::Number(4.0));
    }

    #[test]
    fn use_before_declaration_is_fatal() {
        let program = sequence([name("x"), constant_declaration("x", num(4.0))]);
        assert_eq!(
            eval(program).unwrap_err(),
            EvalError::UseBeforeDeclaration { name: "x".into() }.into()
        );
    }

    #[test]
    fn function_values_are_described_by_kind() {
        let mut machine = make_evaluator_machine(&MachineConfig::default()).unwrap();
        let value = run(&mut machine, &function_definition(&["x"], return_statement(name("x")))).unwrap();
        assert_eq!(describe(&machine, &value), "<compound function>");

        let mut machine = make_evaluator_machine(&MachineConfig::default()).unwrap();
        let value = run(&mut machine, &name("+")).unwrap();
        assert_eq!(describe(&machine, &value), "<primitive function +>");
    }

    #[test]
    fn strings_are_described_quoted() {
        let machine = Machine::new();
        assert_eq!(describe(&machine, &Pointer::str("hi")), "\"hi\"");
        assert_eq!(describe(&machine, &Pointer::Number(2.5)), "2.5");
    }
}
