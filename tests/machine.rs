use ecmachine::controller;
use ecmachine::machine::controller::*;
use ecmachine::machine::{make_machine, Machine, MachineError, Operation};
use ecmachine::value::{Pointer, Raw, Value};
use ecmachine::Error;

fn gcd_controller() -> Vec<ControllerEntry> {
    controller![
        "test_b",
        test([op("="), reg("b"), constant(0)]),
        branch("gcd_done"),
        assign("t", [op("rem"), reg("a"), reg("b")]),
        assign("a", [reg("b")]),
        assign("b", [reg("t")]),
        go_to(label("test_b")),
        "gcd_done",
    ]
}

fn fib_controller() -> Vec<ControllerEntry> {
    controller![
        assign("continue", [label("fib_done")]),
        "fib_loop",
        test([op("<"), reg("n"), constant(2)]),
        branch("immediate_answer"),
        save("continue"),
        assign("continue", [label("afterfib_n_1")]),
        save("n"),
        assign("n", [op("-"), reg("n"), constant(1)]),
        go_to(label("fib_loop")),
        "afterfib_n_1",
        restore("n"),
        restore("continue"),
        assign("n", [op("-"), reg("n"), constant(2)]),
        save("continue"),
        assign("continue", [label("afterfib_n_2")]),
        save("val"),
        go_to(label("fib_loop")),
        "afterfib_n_2",
        assign("n", [reg("val")]),
        restore("val"),
        restore("continue"),
        assign("val", [op("+"), reg("val"), reg("n")]),
        go_to(reg("continue")),
        "immediate_answer",
        assign("val", [reg("n")]),
        go_to(reg("continue")),
        "fib_done",
    ]
}

fn number(machine: &Machine, register: &str) -> f64 {
    match machine.get_register_contents(register).unwrap() {
        Value::Ptr(Pointer::Number(n)) => *n,
        other => panic!("{register} holds {other}"),
    }
}

fn gcd(a: f64, b: f64) -> f64 {
    let mut machine = make_machine(["a", "b", "t"], [], &gcd_controller()).unwrap();
    machine.set_register_contents("a", Pointer::Number(a)).unwrap();
    machine.set_register_contents("b", Pointer::Number(b)).unwrap();
    machine.start().unwrap();
    number(&machine, "a")
}

#[test]
fn gcd_machine() {
    assert_eq!(gcd(206.0, 40.0), 2.0);
    assert_eq!(gcd(100.0, 90.0), 10.0);
    assert_eq!(gcd(7.0, 0.0), 7.0);
}

#[test]
fn gcd_machine_from_json() {
    let source = r#"[
        "test_b",
        {"kind": "test", "operands": [{"op": "="}, {"reg": "b"}, {"constant": 0}]},
        {"kind": "branch", "operands": [{"label": "gcd_done"}]},
        {"kind": "assign", "operands": [{"reg": "t"}, {"op": "rem"}, {"reg": "a"}, {"reg": "b"}]},
        {"kind": "assign", "operands": [{"reg": "a"}, {"reg": "b"}]},
        {"kind": "assign", "operands": [{"reg": "b"}, {"reg": "t"}]},
        {"kind": "goto", "operands": [{"label": "test_b"}]},
        "gcd_done"
    ]"#;
    let program: Vec<ControllerEntry> = serde_json::from_str(source).unwrap();
    assert_eq!(program, gcd_controller());

    let mut machine = make_machine(["a", "b", "t"], [], &program).unwrap();
    machine.set_register_contents("a", Pointer::Number(206.0)).unwrap();
    machine.set_register_contents("b", Pointer::Number(40.0)).unwrap();
    machine.start().unwrap();
    assert_eq!(number(&machine, "a"), 2.0);
}

#[test]
fn recursive_fibonacci_machine() {
    let mut machine = make_machine(["continue", "n", "val"], [], &fib_controller()).unwrap();
    machine.set_register_contents("n", Pointer::Number(10.0)).unwrap();
    machine.start().unwrap();
    assert_eq!(number(&machine, "val"), 55.0);

    let stats = machine.statistics();
    assert_eq!(machine.stack().depth(), 0);
    assert!(stats.stack_pushes > 0);
    assert!(stats.max_stack_depth >= 2 * 9);
    assert_eq!(stats.gc.pairs_allocated, 0);
}

#[test]
fn machines_can_be_rerun() {
    let mut machine = make_machine(["continue", "n", "val"], [], &fib_controller()).unwrap();
    for (n, expected) in [(1.0, 1.0), (2.0, 1.0), (7.0, 13.0)] {
        machine.set_register_contents("n", Pointer::Number(n)).unwrap();
        machine.start().unwrap();
        assert_eq!(number(&machine, "val"), expected);
    }
}

#[test]
fn machines_format_for_debugging() {
    let machine = make_machine(["a", "b", "t"], [], &gcd_controller()).unwrap();
    let text = format!("{machine:?}");
    assert!(text.starts_with("Machine"), "{text}");
    assert!(text.contains("PairHeap"), "{text}");
}

#[test]
fn controllers_print_as_instructions() {
    let text: Vec<String> = gcd_controller().iter().map(ToString::to_string).collect();
    assert_eq!(text[0], "test_b:");
    assert_eq!(text[1], "  (test (op =) (reg b) (constant 0))");
    assert_eq!(text[3], "  (assign t (op rem) (reg a) (reg b))");
}

#[test]
fn extra_operations_are_installed() {
    let double = Operation::primitive(|args| match args {
        [Raw::Number(n)] => Ok(Raw::Number(n * 2.0)),
        _ => Err(ecmachine::machine::OperandError::Arity { expected: 1, got: args.len() }),
    });
    let mut machine = make_machine(
        ["x"],
        [("double".to_string(), double)],
        &controller![assign("x", [op("double"), constant(21)])],
    )
    .unwrap();
    machine.start().unwrap();
    assert_eq!(number(&machine, "x"), 42.0);
}

// --- Assembly errors ---

#[test]
fn unknown_label_is_rejected() {
    let err = make_machine(["a"], [], &controller![go_to(label("nowhere"))]).unwrap_err();
    assert_eq!(err, Error::Machine(MachineError::UnknownLabel { label: "nowhere".into() }));
}

#[test]
fn duplicate_label_is_rejected() {
    let err = make_machine(["a"], [], &controller!["here", "here"]).unwrap_err();
    assert_eq!(err, Error::Machine(MachineError::DuplicateLabel { label: "here".into() }));
}

#[test]
fn unknown_operation_is_rejected() {
    let err = make_machine(["a"], [], &controller![assign("a", [op("frobnicate")])]).unwrap_err();
    assert_eq!(err, Error::Machine(MachineError::UnknownOperation { name: "frobnicate".into() }));
}

#[test]
fn unknown_register_is_rejected() {
    let err = make_machine(["a"], [], &controller![assign("b", [constant(1)])]).unwrap_err();
    assert_eq!(err, Error::Machine(MachineError::UnknownRegister { name: "b".into() }));
}

#[test]
fn unknown_instruction_kind_is_malformed() {
    let program: Vec<ControllerEntry> =
        serde_json::from_str(r#"[{"kind": "jump", "operands": [{"label": "x"}]}, "x"]"#).unwrap();
    let err = make_machine(["a"], [], &program).unwrap_err();
    assert!(matches!(err, Error::Machine(MachineError::MalformedInstruction { index: 0, .. })));
}

// --- Run-time errors ---

#[test]
fn operand_type_errors_name_the_operation() {
    let mut machine = make_machine(
        ["a"],
        [],
        &controller![assign("a", [op("*"), constant("x"), constant(2)])],
    )
    .unwrap();
    let err = machine.start().unwrap_err();
    assert!(matches!(err, Error::Machine(MachineError::Operation { ref op, .. }) if op == "*"));
}
