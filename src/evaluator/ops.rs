//! Address-aware operations the evaluator controller is assembled against.
//!
//! Syntax selectors read the program heap; environment and function
//! constructors allocate on the pair heap. Every constructor reserves all
//! the pairs it needs up front, passing its operands as pending roots, so
//! a collection can only happen before it starts reading them.
//!
//! Runtime structures:
//!
//! ```text
//! environment  (frame . enclosing)          ending in null
//! frame        (names . bindings)           both proper lists, same length
//! binding      (value . flag)               flag: true mutable, false constant,
//!                                           null declared but not yet initialized
//! primitive    ("primitive" . op-name)
//! compound     ("compound" params body env) params and body are program pairs
//! return value ("return_value" . value)
//! ```

use crate::machine::memory::{arity, Memory};
use crate::machine::{MachineError, OperandError, Operation};
use crate::value::Pointer;
use crate::{Error, Result};

use super::expression::ExpressionKind;
use super::{ArityError, EvalError};

/// Functions of the global frame, bound to the operation of the same name.
pub const PRIMITIVE_FUNCTIONS: [&str; 12] = [
    "+", "-", "*", "/", "%", "===", "!==", "<", ">", "<=", ">=", "!",
];

const PRIMITIVE: &str = "primitive";
const COMPOUND: &str = "compound";
const RETURN_VALUE: &str = "return_value";

/// Pairs needed for a frame of `n` bindings plus its environment link.
fn frame_size(n: usize) -> usize {
    3 * n + 2
}

fn symbol_name(symbol: &Pointer) -> String {
    symbol.as_str().map(str::to_string).unwrap_or_else(|| symbol.to_string())
}

fn is_tagged(memory: &Memory<'_>, p: &Pointer, tag: &str) -> Result<bool> {
    Ok(match p {
        Pointer::Pair(_) => memory.head(p)?.as_str() == Some(tag),
        _ => false,
    })
}

/// Symbol of a `("name", symbol)` node.
fn symbol_of(memory: &Memory<'_>, name_node: &Pointer) -> Result<Pointer> {
    memory.program_list_ref(name_node, 1)
}

fn declaration_symbol(memory: &Memory<'_>, declaration: &Pointer) -> Result<Pointer> {
    symbol_of(memory, &memory.program_list_ref(declaration, 1)?)
}

/// Names declared directly in a body, in order. Only the statements of a
/// top-level sequence are scanned; nested blocks and function bodies get
/// frames of their own. Declaring a name twice in one body is an error.
pub(crate) fn declared_names(memory: &Memory<'_>, body: &Pointer) -> Result<Vec<Pointer>> {
    let statements = match ExpressionKind::classify(memory.program(), body) {
        Some(ExpressionKind::Sequence) => memory.program_list_to_vec(memory.program_list_ref(body, 1)?)?,
        _ => vec![body.clone()],
    };
    let mut names = Vec::new();
    for statement in &statements {
        if matches!(
            ExpressionKind::classify(memory.program(), statement),
            Some(ExpressionKind::ConstantDeclaration | ExpressionKind::VariableDeclaration)
        ) {
            let symbol = declaration_symbol(memory, statement)?;
            if names.contains(&symbol) {
                return Err(EvalError::DuplicateDeclaration { name: symbol_name(&symbol) }.into());
            }
            names.push(symbol);
        }
    }
    Ok(names)
}

/// Allocates `(frame . enclosing)` from reserved space.
fn push_frame(
    memory: &mut Memory<'_>,
    bindings: Vec<(Pointer, Pointer, Pointer)>,
    enclosing: Pointer,
) -> Result<Pointer> {
    let mut names = Vec::with_capacity(bindings.len());
    let mut cells = Vec::with_capacity(bindings.len());
    for (name, value, flag) in bindings {
        names.push(name);
        cells.push(memory.alloc_reserved(value, flag)?);
    }
    let names = memory.build_list(names)?;
    let cells = memory.build_list(cells)?;
    let frame = memory.alloc_reserved(names, cells)?;
    memory.alloc_reserved(frame, enclosing)
}

fn make_global_environment(memory: &mut Memory<'_>) -> Result<Pointer> {
    let constants = [
        ("undefined", Pointer::Undefined),
        ("NaN", Pointer::Number(f64::NAN)),
        ("Infinity", Pointer::Number(f64::INFINITY)),
    ];
    let count = PRIMITIVE_FUNCTIONS.len() + constants.len();
    memory.reserve(PRIMITIVE_FUNCTIONS.len() + frame_size(count), &mut [])?;

    let mut bindings = Vec::with_capacity(count);
    for name in PRIMITIVE_FUNCTIONS {
        let function = memory.alloc_reserved(Pointer::str(PRIMITIVE), Pointer::str(name))?;
        bindings.push((Pointer::str(name), function, Pointer::Bool(false)));
    }
    for (name, value) in constants {
        bindings.push((Pointer::str(name), value, Pointer::Bool(false)));
    }
    push_frame(memory, bindings, Pointer::Null)
}

/// `args`: body, env. Binds the body's declarations, uninitialized.
fn extend_block_environment(memory: &mut Memory<'_>, args: &mut [Pointer]) -> Result<Pointer> {
    arity("extend_block_environment", args, 2)?;
    let names = declared_names(memory, &args[0])?;
    memory.reserve(frame_size(names.len()), args)?;
    let bindings = names
        .into_iter()
        .map(|name| (name, Pointer::Undefined, Pointer::Null))
        .collect();
    push_frame(memory, bindings, args[1].clone())
}

/// `args`: compound function, argument list.
fn extend_environment(memory: &mut Memory<'_>, args: &mut [Pointer]) -> Result<Pointer> {
    arity("extend_environment", args, 2)?;
    let params = memory.list_ref(&args[0], 1)?;
    let body = memory.list_ref(&args[0], 2)?;

    let mut names = Vec::new();
    for node in memory.program_list_to_vec(params)? {
        let symbol = symbol_of(memory, &node)?;
        if names.contains(&symbol) {
            return Err(EvalError::DuplicateDeclaration { name: symbol_name(&symbol) }.into());
        }
        names.push(symbol);
    }
    let expected = names.len();
    let got = memory.list_to_vec(args[1].clone())?.len();
    if got > expected {
        return Err(EvalError::Arity(ArityError::TooMany { expected, got }).into());
    }
    if got < expected {
        return Err(EvalError::Arity(ArityError::TooFew { expected, got }).into());
    }
    let locals: Vec<Pointer> = declared_names(memory, &body)?
        .into_iter()
        .filter(|local| !names.contains(local))
        .collect();

    memory.reserve(frame_size(names.len() + locals.len()), args)?;
    let values = memory.list_to_vec(args[1].clone())?;
    let closure = memory.list_ref(&args[0], 3)?;
    let bindings = names
        .into_iter()
        .zip(values)
        .map(|(name, value)| (name, value, Pointer::Bool(true)))
        .chain(locals.into_iter().map(|name| (name, Pointer::Undefined, Pointer::Null)))
        .collect();
    push_frame(memory, bindings, closure)
}

/// `args`: parameter list, body, env.
fn make_compound_function(memory: &mut Memory<'_>, args: &mut [Pointer]) -> Result<Pointer> {
    arity("make_compound_function", args, 3)?;
    memory.reserve(4, args)?;
    let mut items = vec![Pointer::str(COMPOUND)];
    items.extend(args.iter().cloned());
    memory.build_list(items)
}

/// `args`: value, argument list. Appends in place and returns the list.
fn adjoin_arg(memory: &mut Memory<'_>, args: &mut [Pointer]) -> Result<Pointer> {
    arity("adjoin_arg", args, 2)?;
    memory.reserve(1, args)?;
    let cell = memory.alloc_reserved(args[0].clone(), Pointer::Null)?;
    if matches!(args[1], Pointer::Null) {
        return Ok(cell);
    }
    let mut last = args[1].clone();
    loop {
        let next = memory.tail(&last)?;
        if matches!(next, Pointer::Null) {
            break;
        }
        last = next;
    }
    memory.set_tail(&last, cell)?;
    Ok(args[1].clone())
}

/// A wrong argument count is reported like one for a compound function.
fn apply_primitive_function(memory: &mut Memory<'_>, args: &mut [Pointer]) -> Result<Pointer> {
    arity("apply_primitive_function", args, 2)?;
    let name = symbol_name(&memory.tail(&args[0])?);
    let mut arguments = memory.list_to_vec(args[1].clone())?;
    match memory.apply(&name, &mut arguments) {
        Err(Error::Machine(MachineError::Operation {
            source: OperandError::Arity { expected, got },
            ..
        })) => Err(EvalError::Arity(if got > expected {
            ArityError::TooMany { expected, got }
        } else {
            ArityError::TooFew { expected, got }
        })
        .into()),
        result => result,
    }
}

fn selector(name: &'static str, index: usize) -> (&'static str, Operation) {
    (
        name,
        Operation::address_aware(move |memory, args| {
            arity(name, args, 1)?;
            memory.program_list_ref(&args[0], index)
        }),
    )
}

fn predicate(name: &'static str, tag: &'static str) -> (&'static str, Operation) {
    (
        name,
        Operation::address_aware(move |memory, args| {
            arity(name, args, 1)?;
            Ok(Pointer::Bool(is_tagged(memory, &args[0], tag)?))
        }),
    )
}

fn signal(name: &'static str, error: fn(&Memory<'_>, &Pointer) -> EvalError) -> (&'static str, Operation) {
    (
        name,
        Operation::address_aware(move |memory, args| {
            arity(name, args, 1)?;
            Err(error(memory, &args[0]).into())
        }),
    )
}

fn describe_expression(memory: &Memory<'_>, exp: &Pointer) -> String {
    match memory.program_head(exp) {
        Ok(tag) => tag.to_string(),
        Err(_) => exp.to_string(),
    }
}

/// Every operation the evaluator controller uses beyond the standard table.
pub fn evaluator_operations() -> Vec<(String, Operation)> {
    let ops = vec![
        (
            "expression_kind",
            Operation::address_aware(|memory, args| {
                arity("expression_kind", args, 1)?;
                let kind = ExpressionKind::classify(memory.program(), &args[0]);
                Ok(Pointer::str(kind.map_or("unknown", ExpressionKind::name)))
            }),
        ),
        selector("name_symbol", 1),
        (
            "declaration_symbol",
            Operation::address_aware(|memory, args| {
                arity("declaration_symbol", args, 1)?;
                declaration_symbol(memory, &args[0])
            }),
        ),
        selector("declaration_value", 2),
        selector("conditional_predicate", 1),
        selector("conditional_consequent", 2),
        selector("conditional_alternative", 3),
        selector("function_definition_parameters", 1),
        selector("function_definition_body", 2),
        selector("sequence_statements", 1),
        selector("function_expression", 1),
        selector("arg_expressions", 2),
        selector("return_expression", 1),
        selector("block_body", 1),
        (
            "boolean_first",
            Operation::address_aware(|memory, args| {
                arity("boolean_first", args, 1)?;
                let operands = memory.program_list_ref(&args[0], 2)?;
                memory.program_list_ref(&operands, 0)
            }),
        ),
        (
            "boolean_second",
            Operation::address_aware(|memory, args| {
                arity("boolean_second", args, 1)?;
                let operands = memory.program_list_ref(&args[0], 2)?;
                memory.program_list_ref(&operands, 1)
            }),
        ),
        (
            "boolean_short_circuit_value",
            Operation::address_aware(|memory, args| {
                arity("boolean_short_circuit_value", args, 1)?;
                let operator = symbol_of(memory, &memory.program_list_ref(&args[0], 1)?)?;
                match operator.as_str() {
                    Some("&&") => Ok(Pointer::Bool(false)),
                    Some("||") => Ok(Pointer::Bool(true)),
                    _ => Err(EvalError::UnknownExpressionType(format!("boolean_operation {}", operator)).into()),
                }
            }),
        ),
        (
            "make_global_environment",
            Operation::address_aware(|memory, args| {
                arity("make_global_environment", args, 0)?;
                make_global_environment(memory)
            }),
        ),
        ("extend_block_environment", Operation::address_aware(extend_block_environment)),
        ("extend_environment", Operation::address_aware(extend_environment)),
        ("make_compound_function", Operation::address_aware(make_compound_function)),
        ("adjoin_arg", Operation::address_aware(adjoin_arg)),
        ("apply_primitive_function", Operation::address_aware(apply_primitive_function)),
        predicate("is_primitive_function", PRIMITIVE),
        predicate("is_compound_function", COMPOUND),
        predicate("is_return_value", RETURN_VALUE),
        (
            "function_body",
            Operation::address_aware(|memory, args| {
                arity("function_body", args, 1)?;
                memory.list_ref(&args[0], 2)
            }),
        ),
        (
            "make_return_value",
            Operation::address_aware(|memory, args| {
                arity("make_return_value", args, 1)?;
                memory.reserve(1, args)?;
                memory.alloc_reserved(Pointer::str(RETURN_VALUE), args[0].clone())
            }),
        ),
        (
            "return_value_content",
            Operation::address_aware(|memory, args| {
                arity("return_value_content", args, 1)?;
                memory.tail(&args[0])
            }),
        ),
        signal("signal_unbound_name", |_, name| EvalError::UnboundName {
            name: symbol_name(name),
        }),
        signal("signal_use_before_declaration", |_, name| {
            EvalError::UseBeforeDeclaration { name: symbol_name(name) }
        }),
        signal("signal_assign_to_constant", |_, name| EvalError::AssignToConstant {
            name: symbol_name(name),
        }),
        signal("signal_unknown_expression_type", |memory, exp| {
            EvalError::UnknownExpressionType(describe_expression(memory, exp))
        }),
        signal("signal_unknown_function_type", |_, fun| {
            EvalError::UnknownFunctionType(fun.to_string())
        }),
        signal("signal_non_boolean_predicate", |_, value| {
            EvalError::NonBooleanPredicate(format!("{} {}", value.type_name(), value))
        }),
    ];
    ops.into_iter().map(|(name, op)| (name.to_string(), op)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;
    use crate::syntax::build::*;

    fn machine_with(tree: crate::syntax::SyntaxTree) -> (Machine, Pointer) {
        let mut machine = Machine::new();
        machine.install_operations(evaluator_operations());
        let root = machine.install_parsetree(&tree).unwrap();
        (machine, root)
    }

    #[test]
    fn declarations_are_scanned_in_order() {
        let (mut machine, root) = machine_with(sequence([
            constant_declaration("a", num(1.0)),
            binary("+", num(1.0), num(2.0)),
            variable_declaration("b", num(2.0)),
            block(constant_declaration("a", num(0.0))),
        ]));
        let memory = machine.memory();
        assert_eq!(
            declared_names(&memory, &root).unwrap(),
            vec![Pointer::str("a"), Pointer::str("b")]
        );
    }

    #[test]
    fn repeated_declaration_in_one_body_is_rejected() {
        let (mut machine, root) = machine_with(sequence([
            constant_declaration("a", num(1.0)),
            variable_declaration("a", num(2.0)),
        ]));
        assert_eq!(
            declared_names(&machine.memory(), &root).unwrap_err(),
            EvalError::DuplicateDeclaration { name: "a".into() }.into()
        );
    }

    #[test]
    fn single_declaration_body_is_scanned() {
        let (mut machine, root) = machine_with(constant_declaration("x", num(1.0)));
        assert_eq!(declared_names(&machine.memory(), &root).unwrap(), vec![Pointer::str("x")]);
    }

    #[test]
    fn global_environment_binds_primitives_immutably() {
        let mut machine = Machine::new();
        let mut memory = machine.memory();
        let env = make_global_environment(&mut memory).unwrap();
        let frame = memory.head(&env).unwrap();
        let names = memory.list_to_vec(memory.head(&frame).unwrap()).unwrap();
        let bindings = memory.list_to_vec(memory.tail(&frame).unwrap()).unwrap();
        assert_eq!(names.len(), 15);
        assert_eq!(names[0], Pointer::str("+"));
        let plus = memory.head(&bindings[0]).unwrap();
        assert!(is_tagged(&memory, &plus, PRIMITIVE).unwrap());
        assert_eq!(memory.tail(&bindings[0]).unwrap(), Pointer::Bool(false));
        assert_eq!(memory.tail(&env).unwrap(), Pointer::Null);
    }

    #[test]
    fn adjoin_arg_appends_in_place() {
        let mut machine = Machine::new();
        let mut memory = machine.memory();
        let mut args = [Pointer::Number(1.0), Pointer::Null];
        let list = adjoin_arg(&mut memory, &mut args).unwrap();
        let mut args = [Pointer::Number(2.0), list.clone()];
        let same = adjoin_arg(&mut memory, &mut args).unwrap();
        assert_eq!(same, list);
        assert_eq!(
            memory.list_to_vec(list).unwrap(),
            vec![Pointer::Number(1.0), Pointer::Number(2.0)]
        );
    }

    #[test]
    fn extend_environment_checks_argument_count() {
        let (mut machine, root) = machine_with(function_definition(&["x", "y"], return_statement(name("x"))));
        let mut memory = machine.memory();
        let params = memory.program_list_ref(&root, 1).unwrap();
        let body = memory.program_list_ref(&root, 2).unwrap();
        let mut parts = [params, body, Pointer::Null];
        let fun = make_compound_function(&mut memory, &mut parts).unwrap();

        let mut one = [Pointer::Number(1.0), Pointer::Null];
        let argl = adjoin_arg(&mut memory, &mut one).unwrap();
        let err = extend_environment(&mut memory, &mut [fun.clone(), argl.clone()]).unwrap_err();
        assert_eq!(err, EvalError::Arity(ArityError::TooFew { expected: 2, got: 1 }).into());

        let mut more = [Pointer::Number(2.0), argl.clone()];
        adjoin_arg(&mut memory, &mut more).unwrap();
        let mut more = [Pointer::Number(3.0), argl.clone()];
        adjoin_arg(&mut memory, &mut more).unwrap();
        let err = extend_environment(&mut memory, &mut [fun, argl]).unwrap_err();
        assert_eq!(err, EvalError::Arity(ArityError::TooMany { expected: 2, got: 3 }).into());
    }

    #[test]
    fn extend_environment_binds_parameters_and_locals() {
        let (mut machine, root) = machine_with(function_definition(
            &["x"],
            sequence([
                constant_declaration("y", num(1.0)),
                return_statement(name("x")),
            ]),
        ));
        let mut memory = machine.memory();
        let params = memory.program_list_ref(&root, 1).unwrap();
        let body = memory.program_list_ref(&root, 2).unwrap();
        let fun = make_compound_function(&mut memory, &mut [params, body, Pointer::Null]).unwrap();
        let argl = adjoin_arg(&mut memory, &mut [Pointer::Number(9.0), Pointer::Null]).unwrap();

        let env = extend_environment(&mut memory, &mut [fun, argl]).unwrap();
        let frame = memory.head(&env).unwrap();
        let names = memory.list_to_vec(memory.head(&frame).unwrap()).unwrap();
        let bindings = memory.list_to_vec(memory.tail(&frame).unwrap()).unwrap();
        assert_eq!(names, vec![Pointer::str("x"), Pointer::str("y")]);
        assert_eq!(memory.head(&bindings[0]).unwrap(), Pointer::Number(9.0));
        assert_eq!(memory.tail(&bindings[0]).unwrap(), Pointer::Bool(true));
        assert_eq!(memory.tail(&bindings[1]).unwrap(), Pointer::Null);
    }
}
