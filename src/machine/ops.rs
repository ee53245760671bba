//! The operation table and the operations every machine starts with.
//!
//! Operations come in two calling conventions. Value primitives see their
//! operands unwrapped into [`Raw`] host values and have their result
//! wrapped again; they never touch the heaps. Address-aware operations get
//! the typed pointers untouched together with a [`Memory`] handle, which is
//! how heap accessors and allocators reach the pair and program heaps.

use std::collections::HashMap;
use std::rc::Rc;

use super::memory::Memory;
use crate::value::{Pointer, Raw};

pub type PrimitiveFn = dyn Fn(&[Raw]) -> Result<Raw, OperandError>;
pub type AddressFn = dyn Fn(&mut Memory<'_>, &mut [Pointer]) -> crate::Result<Pointer>;

#[derive(Clone)]
pub enum Operation {
    Primitive(Rc<PrimitiveFn>),
    AddressAware(Rc<AddressFn>),
}

impl Operation {
    pub fn primitive(f: impl Fn(&[Raw]) -> Result<Raw, OperandError> + 'static) -> Self {
        Operation::Primitive(Rc::new(f))
    }

    pub fn address_aware(f: impl Fn(&mut Memory<'_>, &mut [Pointer]) -> crate::Result<Pointer> + 'static) -> Self {
        Operation::AddressAware(Rc::new(f))
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Primitive(_) => write!(f, "<primitive>"),
            Operation::AddressAware(_) => write!(f, "<address-aware>"),
        }
    }
}

pub type OperationTable = HashMap<String, Rc<Operation>>;

/// A value primitive rejected its operands.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperandError {
    #[error("expected {expected} operand(s), got {got}")]
    Arity { expected: usize, got: usize },
    #[error("expected {expected}, got {got}")]
    Type { expected: &'static str, got: String },
}

fn describe(raw: &Raw) -> String {
    match raw {
        Raw::Null | Raw::Undefined => raw.type_name().to_string(),
        other => format!("{} {}", other.type_name(), serde_json::Value::from(other.clone())),
    }
}

fn exactly(args: &[Raw], n: usize) -> Result<(), OperandError> {
    if args.len() == n {
        Ok(())
    } else {
        Err(OperandError::Arity { expected: n, got: args.len() })
    }
}

fn number(raw: &Raw) -> Result<f64, OperandError> {
    match raw {
        Raw::Number(n) => Ok(*n),
        other => Err(OperandError::Type { expected: "number", got: describe(other) }),
    }
}

fn numbers2(args: &[Raw]) -> Result<(f64, f64), OperandError> {
    exactly(args, 2)?;
    Ok((number(&args[0])?, number(&args[1])?))
}

fn arithmetic(f: fn(f64, f64) -> f64) -> Operation {
    Operation::primitive(move |args| {
        let (a, b) = numbers2(args)?;
        Ok(Raw::Number(f(a, b)))
    })
}

/// Numbers compare numerically, strings lexicographically.
fn comparison(f: fn(std::cmp::Ordering) -> bool) -> Operation {
    Operation::primitive(move |args| {
        exactly(args, 2)?;
        let ordering = match (&args[0], &args[1]) {
            (Raw::Str(a), Raw::Str(b)) => Some(a.cmp(b)),
            (a, b) => number(a)?.partial_cmp(&number(b)?),
        };
        Ok(Raw::Bool(ordering.is_some_and(f)))
    })
}

fn add(args: &[Raw]) -> Result<Raw, OperandError> {
    exactly(args, 2)?;
    match (&args[0], &args[1]) {
        (Raw::Number(a), Raw::Number(b)) => Ok(Raw::Number(a + b)),
        (Raw::Str(a), Raw::Str(b)) => Ok(Raw::from(format!("{}{}", a, b))),
        (Raw::Number(_) | Raw::Str(_), other) | (other, _) => Err(OperandError::Type {
            expected: "two numbers or two strings",
            got: describe(other),
        }),
    }
}

fn subtract(args: &[Raw]) -> Result<Raw, OperandError> {
    match args {
        [a] => Ok(Raw::Number(-number(a)?)),
        [a, b] => Ok(Raw::Number(number(a)? - number(b)?)),
        _ => Err(OperandError::Arity { expected: 2, got: args.len() }),
    }
}

fn not(args: &[Raw]) -> Result<Raw, OperandError> {
    exactly(args, 1)?;
    match &args[0] {
        Raw::Bool(b) => Ok(Raw::Bool(!b)),
        other => Err(OperandError::Type { expected: "bool", got: describe(other) }),
    }
}

fn pointer_predicate(name: &'static str, f: fn(&Pointer) -> bool) -> Operation {
    Operation::address_aware(move |_, args| match args {
        [p] => Ok(Pointer::Bool(f(p))),
        _ => Err(super::MachineError::Operation {
            op: name.into(),
            source: OperandError::Arity { expected: 1, got: args.len() },
        }
        .into()),
    })
}

fn pointer_equality(negate: bool) -> Operation {
    Operation::address_aware(move |_, args| match args {
        [a, b] => Ok(Pointer::Bool((a == b) != negate)),
        _ => Err(super::MachineError::Operation {
            op: if negate { "!==" } else { "===" }.into(),
            source: OperandError::Arity { expected: 2, got: args.len() },
        }
        .into()),
    })
}

/// Value primitives used by the evaluator's global frame and by hand-written
/// register machines.
pub fn primitive_operations() -> Vec<(&'static str, Operation)> {
    vec![
        ("+", Operation::primitive(add)),
        ("-", Operation::primitive(subtract)),
        ("*", arithmetic(|a, b| a * b)),
        ("/", arithmetic(|a, b| a / b)),
        ("%", arithmetic(|a, b| a % b)),
        ("rem", arithmetic(|a, b| a % b)),
        ("=", Operation::primitive(|args| {
            let (a, b) = numbers2(args)?;
            Ok(Raw::Bool(a == b))
        })),
        ("<", comparison(|o| o.is_lt())),
        (">", comparison(|o| o.is_gt())),
        ("<=", comparison(|o| o.is_le())),
        (">=", comparison(|o| o.is_ge())),
        ("!", Operation::primitive(not)),
    ]
}

/// Identity and type tests. These compare tagged pointers directly, so pair
/// and program references may be passed to them.
pub fn predicate_operations() -> Vec<(&'static str, Operation)> {
    vec![
        ("===", pointer_equality(false)),
        ("!==", pointer_equality(true)),
        ("is_number", pointer_predicate("is_number", |p| matches!(p, Pointer::Number(_)))),
        ("is_string", pointer_predicate("is_string", |p| matches!(p, Pointer::Str(_)))),
        ("is_boolean", pointer_predicate("is_boolean", |p| matches!(p, Pointer::Bool(_)))),
        ("is_undefined", pointer_predicate("is_undefined", |p| matches!(p, Pointer::Undefined))),
        ("is_null", pointer_predicate("is_null", |p| matches!(p, Pointer::Null))),
        ("is_pair", pointer_predicate("is_pair", |p| matches!(p, Pointer::Pair(_)))),
        ("is_program_pair", pointer_predicate("is_program_pair", |p| matches!(p, Pointer::Prog(_)))),
    ]
}

/// Builds an operation table holding the primitives, the predicates and the
/// built-in memory operations.
pub fn standard_operations() -> OperationTable {
    primitive_operations()
        .into_iter()
        .chain(predicate_operations())
        .chain(super::memory::memory_operations())
        .map(|(name, op)| (name.to_string(), Rc::new(op)))
        .collect()
}
