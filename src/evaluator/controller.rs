//! The explicit-control evaluator, written as a register-machine program.
//!
//! Register use:
//!
//! - `exp`, `env`, `val`, `continue`, `fun`, `argl`, `unev`: as in the
//!   classic explicit-control evaluator
//! - `a`, `b`, `d`: arguments of the `find_binding` subroutine (name,
//!   environment, return label)
//! - `c`, `e`: scratch
//! - `res`: the binding found by `find_binding`
//!
//! `continue` is saved on entry to every compound call and restored on
//! return, so recursion depth is bounded only by the stack.

use crate::machine::controller::*;
use crate::value::Raw;

use super::expression::ExpressionKind;

/// Dispatch: one test per syntactic form, in classification order.
fn eval_dispatch() -> Vec<ControllerEntry> {
    let mut seq = crate::controller![
        "eval_dispatch",
        assign("e", [op("expression_kind"), reg("exp")]),
    ];
    for kind in ExpressionKind::ALL {
        seq.push(test([op("==="), reg("e"), constant(kind.name())]));
        seq.push(branch(kind.handler()));
    }
    seq.push(go_to(label("unknown_expression_type")));
    seq
}

/// Looks `a` up in environment `b`, leaving its `(value . flag)` cell in
/// `res`, and jumps to `d`.
fn find_binding() -> Vec<ControllerEntry> {
    crate::controller![
        "find_binding",
        test([op("is_null"), reg("b")]),
        branch("unbound_name"),
        assign("c", [op("head"), reg("b")]),
        assign("res", [op("tail"), reg("c")]),
        assign("c", [op("head"), reg("c")]),
        "find_binding_scan",
        test([op("is_null"), reg("c")]),
        branch("find_binding_next_frame"),
        assign("e", [op("head"), reg("c")]),
        test([op("==="), reg("e"), reg("a")]),
        branch("find_binding_found"),
        assign("c", [op("tail"), reg("c")]),
        assign("res", [op("tail"), reg("res")]),
        go_to(label("find_binding_scan")),
        "find_binding_next_frame",
        assign("b", [op("tail"), reg("b")]),
        go_to(label("find_binding")),
        "find_binding_found",
        assign("res", [op("head"), reg("res")]),
        go_to(reg("d")),
    ]
}

fn simple_forms() -> Vec<ControllerEntry> {
    crate::controller![
        "ev_self_eval",
        assign("val", [reg("exp")]),
        go_to(reg("continue")),

        "ev_name",
        assign("a", [op("name_symbol"), reg("exp")]),
        assign("b", [reg("env")]),
        assign("d", [label("ev_name_found")]),
        go_to(label("find_binding")),
        "ev_name_found",
        assign("e", [op("tail"), reg("res")]),
        test([op("is_null"), reg("e")]),
        branch("use_before_declaration"),
        assign("val", [op("head"), reg("res")]),
        go_to(reg("continue")),

        "ev_function_definition",
        assign("unev", [op("function_definition_parameters"), reg("exp")]),
        assign("exp", [op("function_definition_body"), reg("exp")]),
        assign("val", [op("make_compound_function"), reg("unev"), reg("exp"), reg("env")]),
        go_to(reg("continue")),

        "ev_block",
        assign("exp", [op("block_body"), reg("exp")]),
        assign("env", [op("extend_block_environment"), reg("exp"), reg("env")]),
        go_to(label("eval_dispatch")),

        "ev_return",
        save("continue"),
        assign("exp", [op("return_expression"), reg("exp")]),
        assign("continue", [label("ev_return_wrap")]),
        go_to(label("eval_dispatch")),
        "ev_return_wrap",
        restore("continue"),
        assign("val", [op("make_return_value"), reg("val")]),
        go_to(reg("continue")),
    ]
}

/// Both declaration forms evaluate the value, then initialize the binding
/// the enclosing scan-out created. `unev` carries the mutability flag.
fn declarations_and_assignment() -> Vec<ControllerEntry> {
    crate::controller![
        "ev_constant_declaration",
        assign("unev", [constant(false)]),
        go_to(label("ev_declaration")),
        "ev_variable_declaration",
        assign("unev", [constant(true)]),
        "ev_declaration",
        save("exp"),
        save("env"),
        save("unev"),
        save("continue"),
        assign("exp", [op("declaration_value"), reg("exp")]),
        assign("continue", [label("ev_declaration_bind")]),
        go_to(label("eval_dispatch")),
        "ev_declaration_bind",
        restore("continue"),
        restore("unev"),
        restore("env"),
        restore("exp"),
        assign("a", [op("declaration_symbol"), reg("exp")]),
        assign("b", [reg("env")]),
        assign("d", [label("ev_declaration_found")]),
        go_to(label("find_binding")),
        "ev_declaration_found",
        perform([op("set_head"), reg("res"), reg("val")]),
        perform([op("set_tail"), reg("res"), reg("unev")]),
        assign("val", [constant(Raw::Undefined)]),
        go_to(reg("continue")),

        "ev_assignment",
        save("exp"),
        save("env"),
        save("continue"),
        assign("exp", [op("declaration_value"), reg("exp")]),
        assign("continue", [label("ev_assignment_bind")]),
        go_to(label("eval_dispatch")),
        "ev_assignment_bind",
        restore("continue"),
        restore("env"),
        restore("exp"),
        assign("a", [op("declaration_symbol"), reg("exp")]),
        assign("b", [reg("env")]),
        assign("d", [label("ev_assignment_found")]),
        go_to(label("find_binding")),
        "ev_assignment_found",
        assign("e", [op("tail"), reg("res")]),
        test([op("is_null"), reg("e")]),
        branch("use_before_declaration"),
        test([op("==="), reg("e"), constant(false)]),
        branch("assign_to_constant"),
        perform([op("set_head"), reg("res"), reg("val")]),
        go_to(reg("continue")),
    ]
}

fn conditionals() -> Vec<ControllerEntry> {
    crate::controller![
        "ev_conditional",
        save("exp"),
        save("env"),
        save("continue"),
        assign("continue", [label("ev_conditional_decide")]),
        assign("exp", [op("conditional_predicate"), reg("exp")]),
        go_to(label("eval_dispatch")),
        "ev_conditional_decide",
        restore("continue"),
        restore("env"),
        restore("exp"),
        test([op("is_boolean"), reg("val")]),
        branch("ev_conditional_choose"),
        go_to(label("non_boolean_predicate")),
        "ev_conditional_choose",
        test([op("==="), reg("val"), constant(true)]),
        branch("ev_conditional_consequent"),
        assign("exp", [op("conditional_alternative"), reg("exp")]),
        go_to(label("eval_dispatch")),
        "ev_conditional_consequent",
        assign("exp", [op("conditional_consequent"), reg("exp")]),
        go_to(label("eval_dispatch")),

        "ev_boolean_operation",
        save("exp"),
        save("env"),
        save("continue"),
        assign("continue", [label("ev_boolean_decide")]),
        assign("exp", [op("boolean_first"), reg("exp")]),
        go_to(label("eval_dispatch")),
        "ev_boolean_decide",
        restore("continue"),
        restore("env"),
        restore("exp"),
        test([op("is_boolean"), reg("val")]),
        branch("ev_boolean_check"),
        go_to(label("non_boolean_predicate")),
        "ev_boolean_check",
        assign("a", [op("boolean_short_circuit_value"), reg("exp")]),
        test([op("==="), reg("val"), reg("a")]),
        branch("ev_boolean_short_circuit"),
        assign("exp", [op("boolean_second"), reg("exp")]),
        go_to(label("eval_dispatch")),
        "ev_boolean_short_circuit",
        go_to(reg("continue")),
    ]
}

/// Statements run left to right. A return value stops the sequence and is
/// handed up unchanged; the last statement is evaluated in tail position.
fn sequences() -> Vec<ControllerEntry> {
    crate::controller![
        "ev_sequence",
        assign("unev", [op("sequence_statements"), reg("exp")]),
        test([op("is_null"), reg("unev")]),
        branch("ev_sequence_empty"),
        save("continue"),
        "ev_sequence_loop",
        assign("exp", [op("program_head"), reg("unev")]),
        assign("a", [op("program_tail"), reg("unev")]),
        test([op("is_null"), reg("a")]),
        branch("ev_sequence_last"),
        save("unev"),
        save("env"),
        assign("continue", [label("ev_sequence_next")]),
        go_to(label("eval_dispatch")),
        "ev_sequence_next",
        restore("env"),
        restore("unev"),
        test([op("is_return_value"), reg("val")]),
        branch("ev_sequence_return"),
        assign("unev", [op("program_tail"), reg("unev")]),
        go_to(label("ev_sequence_loop")),
        "ev_sequence_last",
        restore("continue"),
        go_to(label("eval_dispatch")),
        "ev_sequence_return",
        restore("continue"),
        go_to(reg("continue")),
        "ev_sequence_empty",
        assign("val", [constant(Raw::Undefined)]),
        go_to(reg("continue")),
    ]
}

/// Operator first, then operands left to right into `argl`; `continue`
/// stays on the stack until the call returns.
fn application() -> Vec<ControllerEntry> {
    crate::controller![
        "ev_application",
        save("continue"),
        save("env"),
        assign("unev", [op("arg_expressions"), reg("exp")]),
        save("unev"),
        assign("exp", [op("function_expression"), reg("exp")]),
        assign("continue", [label("ev_appl_did_function_expression")]),
        go_to(label("eval_dispatch")),
        "ev_appl_did_function_expression",
        restore("unev"),
        restore("env"),
        assign("argl", [constant(Raw::Null)]),
        assign("fun", [reg("val")]),
        test([op("is_null"), reg("unev")]),
        branch("apply_dispatch"),
        save("fun"),
        "ev_appl_argument_expression_loop",
        save("argl"),
        assign("exp", [op("program_head"), reg("unev")]),
        assign("a", [op("program_tail"), reg("unev")]),
        test([op("is_null"), reg("a")]),
        branch("ev_appl_last_arg"),
        save("env"),
        save("unev"),
        assign("continue", [label("ev_appl_accumulate_arg")]),
        go_to(label("eval_dispatch")),
        "ev_appl_accumulate_arg",
        restore("unev"),
        restore("env"),
        restore("argl"),
        assign("argl", [op("adjoin_arg"), reg("val"), reg("argl")]),
        assign("unev", [op("program_tail"), reg("unev")]),
        go_to(label("ev_appl_argument_expression_loop")),
        "ev_appl_last_arg",
        assign("continue", [label("ev_appl_accum_last_arg")]),
        go_to(label("eval_dispatch")),
        "ev_appl_accum_last_arg",
        restore("argl"),
        assign("argl", [op("adjoin_arg"), reg("val"), reg("argl")]),
        restore("fun"),

        "apply_dispatch",
        test([op("is_primitive_function"), reg("fun")]),
        branch("primitive_apply"),
        test([op("is_compound_function"), reg("fun")]),
        branch("compound_apply"),
        go_to(label("unknown_function_type")),

        "primitive_apply",
        assign("val", [op("apply_primitive_function"), reg("fun"), reg("argl")]),
        restore("continue"),
        go_to(reg("continue")),

        "compound_apply",
        assign("env", [op("extend_environment"), reg("fun"), reg("argl")]),
        assign("exp", [op("function_body"), reg("fun")]),
        assign("continue", [label("compound_return")]),
        go_to(label("eval_dispatch")),
        "compound_return",
        test([op("is_return_value"), reg("val")]),
        branch("compound_return_value"),
        assign("val", [constant(Raw::Undefined)]),
        restore("continue"),
        go_to(reg("continue")),
        "compound_return_value",
        assign("val", [op("return_value_content"), reg("val")]),
        restore("continue"),
        go_to(reg("continue")),
    ]
}

/// Every fatal label performs an operation that fails with the matching
/// error, so none of them falls through.
fn errors() -> Vec<ControllerEntry> {
    crate::controller![
        "unbound_name",
        perform([op("signal_unbound_name"), reg("a")]),
        "use_before_declaration",
        perform([op("signal_use_before_declaration"), reg("a")]),
        "assign_to_constant",
        perform([op("signal_assign_to_constant"), reg("a")]),
        "non_boolean_predicate",
        perform([op("signal_non_boolean_predicate"), reg("val")]),
        "unknown_expression_type",
        perform([op("signal_unknown_expression_type"), reg("exp")]),
        "unknown_function_type",
        perform([op("signal_unknown_function_type"), reg("fun")]),
        go_to(label("evaluation_done")),
    ]
}

/// The complete evaluator controller.
pub fn evaluator_controller() -> Vec<ControllerEntry> {
    let mut program = crate::controller![
        perform([op("initialize_stack")]),
        assign("exp", [op("program_root")]),
        assign("env", [op("make_global_environment")]),
        assign("env", [op("extend_block_environment"), reg("exp"), reg("env")]),
        assign("continue", [label("top_level_done")]),
    ];
    program.extend(eval_dispatch());
    program.extend(find_binding());
    program.extend(simple_forms());
    program.extend(declarations_and_assignment());
    program.extend(conditionals());
    program.extend(sequences());
    program.extend(application());
    program.extend(crate::controller![
        "top_level_done",
        test([op("is_return_value"), reg("val")]),
        branch("top_level_return"),
        go_to(label("evaluation_done")),
        "top_level_return",
        assign("val", [op("return_value_content"), reg("val")]),
        go_to(label("evaluation_done")),
    ]);
    program.extend(errors());
    program.push(ControllerEntry::from("evaluation_done"));
    program
}
