//! The register-machine simulator.
//!
//! A [`Machine`] owns its registers, one stack, the two heaps and an
//! operation table. A controller program is assembled against those once;
//! [`Machine::start`] then runs fetch-execute over the bound instructions
//! until the program counter walks off the end.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::heap::{GcStats, PairHeap, ProgramHeap, DEFAULT_CAPACITY};
use crate::syntax::SyntaxTree;
use crate::value::{Pointer, Value};
use crate::Result;

pub mod assembler;
pub mod controller;
pub mod memory;
pub mod ops;

use assembler::{Apply, Executable, Input, Source};
pub use controller::{ControllerEntry, Instruction, Operand};
pub use memory::Memory;
pub use ops::{standard_operations, OperandError, Operation, OperationTable};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MachineError {
    #[error("unknown label: {label}")]
    UnknownLabel { label: String },
    #[error("label defined twice: {label}")]
    DuplicateLabel { label: String },
    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },
    #[error("malformed instruction #{index} {text}: {reason}")]
    MalformedInstruction { index: usize, text: String, reason: String },
    #[error("unknown register: {name}")]
    UnknownRegister { name: String },
    #[error("register already allocated: {name}")]
    DuplicateRegister { name: String },
    #[error("empty stack: cannot restore {register}")]
    StackUnderflow { register: String },
    #[error("register {register} does not hold a label (holds {contents})")]
    NotALabel { register: String, contents: String },
    #[error("operation {op}: register {register} does not hold a value (holds {contents})")]
    NotAPointer { op: String, register: String, contents: String },
    #[error("test operation {op} returned {got}, not a boolean")]
    NonBooleanTest { op: String, got: String },
    #[error("operation {op}: {source}")]
    Operation { op: String, source: OperandError },
    #[error("no program installed")]
    ProgramNotInstalled,
    #[error("a program is already installed")]
    ProgramAlreadyInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) struct Register {
    pub(crate) name: String,
    pub(crate) contents: Value,
}

/// The control stack shared by every `save` and `restore`.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    pub(crate) items: Vec<Value>,
    pushes: u64,
    max_depth: usize,
}

impl Stack {
    pub fn push(&mut self, value: Value) {
        self.items.push(value);
        self.pushes += 1;
        self.max_depth = self.max_depth.max(self.items.len());
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.items.pop()
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn reset_statistics(&mut self) {
        self.pushes = 0;
        self.max_depth = self.items.len();
    }
}

/// Settings applied to a machine before it runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Pairs per semi-space of the pair heap.
    pub heap_capacity: usize,
    /// Log every executed instruction at trace level.
    pub trace: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            heap_capacity: DEFAULT_CAPACITY,
            trace: false,
        }
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub instructions: u64,
    pub stack_pushes: u64,
    pub max_stack_depth: usize,
    pub gc: GcStats,
}

#[derive(Debug)]
pub struct Machine {
    registers: Vec<Register>,
    names: HashMap<String, RegisterId>,
    stack: Stack,
    heap: PairHeap,
    program: ProgramHeap,
    operations: OperationTable,
    instructions: Rc<[Executable]>,
    texts: Vec<Instruction>,
    pc: usize,
    flag: bool,
    trace: bool,
    executed: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}

impl Machine {
    /// An empty machine: no registers, no program, the standard operations.
    pub fn new() -> Self {
        Machine {
            registers: Vec::new(),
            names: HashMap::new(),
            stack: Stack::default(),
            heap: PairHeap::default(),
            program: ProgramHeap::new(),
            operations: standard_operations(),
            instructions: Rc::from(Vec::new()),
            texts: Vec::new(),
            pc: 0,
            flag: false,
            trace: false,
            executed: 0,
        }
    }

    pub fn configure(&mut self, config: &MachineConfig) {
        self.set_heap_capacity(config.heap_capacity);
        self.set_trace(config.trace);
    }

    // ── Registers ────────────────────────────────────────────────────

    pub fn allocate_register(&mut self, name: &str) -> Result<RegisterId> {
        if self.names.contains_key(name) {
            return Err(MachineError::DuplicateRegister { name: name.to_string() }.into());
        }
        let id = RegisterId(self.registers.len());
        self.registers.push(Register {
            name: name.to_string(),
            contents: Value::Unassigned,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    fn lookup_register(&self, name: &str) -> Result<RegisterId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| MachineError::UnknownRegister { name: name.to_string() }.into())
    }

    pub fn get_register_contents(&self, name: &str) -> Result<&Value> {
        let id = self.lookup_register(name)?;
        Ok(&self.registers[id.0].contents)
    }

    pub fn set_register_contents(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let id = self.lookup_register(name)?;
        self.registers[id.0].contents = value.into();
        Ok(())
    }

    /// Register names in allocation order, which is also the order the
    /// collector visits them as roots.
    pub fn register_names(&self) -> impl Iterator<Item = &str> {
        self.registers.iter().map(|r| r.name.as_str())
    }

    // ── Setup ────────────────────────────────────────────────────────

    /// Adds operations to the table. Instructions already assembled keep
    /// the operations they were bound to.
    pub fn install_operations(&mut self, operations: impl IntoIterator<Item = (String, Operation)>) {
        for (name, op) in operations {
            self.operations.insert(name, Rc::new(op));
        }
    }

    pub fn install_instruction_sequence(&mut self, controller: &[ControllerEntry]) -> Result<()> {
        let assembled = assembler::assemble(controller, &self.names, &self.operations)?;
        self.instructions = Rc::from(assembled.instructions);
        self.texts = assembled.texts;
        Ok(())
    }

    /// Loads the syntax tree into the program heap. A machine takes one
    /// program for its whole life.
    pub fn install_parsetree(&mut self, tree: &SyntaxTree) -> Result<Pointer> {
        if self.program.root().is_some() {
            return Err(MachineError::ProgramAlreadyInstalled.into());
        }
        let root = self.program.install(tree);
        log::debug!("installed program: {} program pairs", self.program.len());
        Ok(root)
    }

    pub fn set_heap_capacity(&mut self, capacity: usize) {
        self.heap.set_capacity(capacity);
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn heap(&self) -> &PairHeap {
        &self.heap
    }

    pub fn program(&self) -> &ProgramHeap {
        &self.program
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            instructions: self.executed,
            stack_pushes: self.stack.pushes,
            max_stack_depth: self.stack.max_depth,
            gc: self.heap.stats().clone(),
        }
    }

    /// A heap handle over this machine's state, as address-aware operations
    /// see it.
    pub fn memory(&mut self) -> Memory<'_> {
        Memory {
            heap: &mut self.heap,
            program: &self.program,
            registers: &mut self.registers,
            stack: &mut self.stack,
            operations: &self.operations,
        }
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Runs the installed controller from its first instruction until the
    /// program counter passes the last one.
    ///
    /// The pair heap starts empty on every run, so the stack and every
    /// register holding a pair reference are cleared first.
    pub fn start(&mut self) -> Result<()> {
        self.heap.reset();
        self.stack.clear();
        self.stack.reset_statistics();
        for register in &mut self.registers {
            if register.contents.holds_pair() {
                register.contents = Value::Unassigned;
            }
        }
        self.pc = 0;
        self.flag = false;
        self.executed = 0;

        let program = Rc::clone(&self.instructions);
        log::debug!(
            "start: {} instructions, {} registers, heap capacity {}",
            program.len(),
            self.registers.len(),
            self.heap.capacity()
        );

        while let Some(instruction) = program.get(self.pc) {
            if self.trace {
                log::trace!("{:>5} {}", self.pc, self.texts[self.pc]);
            }
            if let Err(e) = self.execute(instruction) {
                log::debug!("halted at #{} {}: {}", self.pc, self.texts[self.pc], e);
                return Err(e);
            }
            self.executed += 1;
        }

        log::debug!(
            "done: {} instructions, {} collections",
            self.executed,
            self.heap.stats().collections
        );
        Ok(())
    }

    fn execute(&mut self, instruction: &Executable) -> Result<()> {
        match instruction {
            Executable::Assign { target, source } => {
                let value = match source {
                    Source::Register(id) => self.registers[id.0].contents.clone(),
                    Source::Constant(p) => Value::Ptr(p.clone()),
                    Source::Label(label) => Value::Label(*label),
                    Source::Apply(apply) => Value::Ptr(self.apply(apply)?),
                };
                self.registers[target.0].contents = value;
                self.pc += 1;
            }
            Executable::Test(apply) => {
                match self.apply(apply)? {
                    Pointer::Bool(b) => self.flag = b,
                    other => {
                        return Err(MachineError::NonBooleanTest {
                            op: apply.name.clone(),
                            got: other.to_string(),
                        }
                        .into());
                    }
                }
                self.pc += 1;
            }
            Executable::Branch(label) => {
                if self.flag {
                    self.pc = label.0;
                } else {
                    self.pc += 1;
                }
            }
            Executable::Goto(label) => self.pc = label.0,
            Executable::GotoRegister(id) => {
                let register = &self.registers[id.0];
                match register.contents {
                    Value::Label(label) => self.pc = label.0,
                    ref other => {
                        return Err(MachineError::NotALabel {
                            register: register.name.clone(),
                            contents: other.to_string(),
                        }
                        .into());
                    }
                }
            }
            Executable::Save(id) => {
                self.stack.push(self.registers[id.0].contents.clone());
                self.pc += 1;
            }
            Executable::Restore(id) => {
                let value = self.stack.pop().ok_or_else(|| MachineError::StackUnderflow {
                    register: self.registers[id.0].name.clone(),
                })?;
                self.registers[id.0].contents = value;
                self.pc += 1;
            }
            Executable::Perform(apply) => {
                self.apply(apply)?;
                self.pc += 1;
            }
        }
        Ok(())
    }

    fn apply(&mut self, apply: &Apply) -> Result<Pointer> {
        let mut args = Vec::with_capacity(apply.inputs.len());
        for input in &apply.inputs {
            args.push(match input {
                Input::Constant(p) => p.clone(),
                Input::Register(id) => {
                    let register = &self.registers[id.0];
                    match &register.contents {
                        Value::Ptr(p) => p.clone(),
                        other => {
                            return Err(MachineError::NotAPointer {
                                op: apply.name.clone(),
                                register: register.name.clone(),
                                contents: other.to_string(),
                            }
                            .into());
                        }
                    }
                }
            });
        }
        self.memory().call(&apply.name, &apply.op, &mut args)
    }
}

/// Builds a machine with the given registers, the standard operations plus
/// `operations`, and the assembled controller.
pub fn make_machine<'a>(
    register_names: impl IntoIterator<Item = &'a str>,
    operations: impl IntoIterator<Item = (String, Operation)>,
    controller: &[ControllerEntry],
) -> Result<Machine> {
    let mut machine = Machine::new();
    for name in register_names {
        machine.allocate_register(name)?;
    }
    machine.install_operations(operations);
    machine.install_instruction_sequence(controller)?;
    Ok(machine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::controller::*;
    use crate::value::Raw;

    fn run(registers: &[&str], controller: Vec<ControllerEntry>) -> Result<Machine> {
        let mut machine = make_machine(registers.iter().copied(), [], &controller)?;
        machine.start()?;
        Ok(machine)
    }

    fn number(machine: &Machine, register: &str) -> f64 {
        match machine.get_register_contents(register).unwrap() {
            Value::Ptr(Pointer::Number(n)) => *n,
            other => panic!("{register} holds {other}"),
        }
    }

    #[test]
    fn registers_start_unassigned() {
        let machine = make_machine(["a"], [], &[]).unwrap();
        assert_eq!(machine.get_register_contents("a").unwrap(), &Value::Unassigned);
    }

    #[test]
    fn duplicate_and_unknown_registers() {
        let mut machine = Machine::new();
        machine.allocate_register("a").unwrap();
        assert!(matches!(
            machine.allocate_register("a"),
            Err(crate::Error::Machine(MachineError::DuplicateRegister { .. }))
        ));
        assert!(matches!(
            machine.set_register_contents("b", Pointer::Null),
            Err(crate::Error::Machine(MachineError::UnknownRegister { .. }))
        ));
    }

    #[test]
    fn assign_and_goto_reach_the_end() {
        let machine = run(
            &["a", "b"],
            crate::controller![
                assign("a", [constant(1)]),
                go_to(label("skip")),
                assign("a", [constant(99)]),
                "skip",
                assign("b", [op("+"), reg("a"), constant(41)]),
            ],
        )
        .unwrap();
        assert_eq!(number(&machine, "a"), 1.0);
        assert_eq!(number(&machine, "b"), 42.0);
        assert_eq!(machine.statistics().instructions, 3);
    }

    #[test]
    fn labels_are_storable_program_counters() {
        let machine = run(
            &["continue", "x"],
            crate::controller![
                assign("continue", [label("back")]),
                go_to(label("sub")),
                "back",
                go_to(label("done")),
                "sub",
                assign("x", [constant(7)]),
                go_to(reg("continue")),
                "done",
            ],
        )
        .unwrap();
        assert_eq!(number(&machine, "x"), 7.0);
    }

    #[test]
    fn restore_on_empty_stack_underflows() {
        let err = run(&["a"], crate::controller![restore("a")]).unwrap_err();
        assert_eq!(
            err,
            MachineError::StackUnderflow { register: "a".into() }.into()
        );
    }

    #[test]
    fn goto_through_a_non_label_fails() {
        let err = run(&["a"], crate::controller![assign("a", [constant(1)]), go_to(reg("a"))]).unwrap_err();
        assert!(matches!(err, crate::Error::Machine(MachineError::NotALabel { .. })));
    }

    #[test]
    fn test_requires_a_boolean() {
        let err = run(&["a"], crate::controller![test([op("+"), constant(1), constant(1)])]).unwrap_err();
        assert!(matches!(err, crate::Error::Machine(MachineError::NonBooleanTest { .. })));
    }

    #[test]
    fn unassigned_operand_is_rejected() {
        let err = run(&["a", "b"], crate::controller![assign("a", [op("+"), reg("b"), constant(1)])]).unwrap_err();
        assert!(matches!(err, crate::Error::Machine(MachineError::NotAPointer { .. })));
    }

    #[test]
    fn pair_operations_allocate_on_the_heap() {
        let machine = run(
            &["p", "h"],
            crate::controller![
                assign("p", [op("pair"), constant(1), constant(Raw::Null)]),
                assign("p", [op("pair"), constant(2), reg("p")]),
                assign("h", [op("tail"), reg("p")]),
                assign("h", [op("head"), reg("h")]),
            ],
        )
        .unwrap();
        assert_eq!(number(&machine, "h"), 1.0);
        assert_eq!(machine.heap().free(), 2);
    }

    #[test]
    fn start_clears_pair_references() {
        let mut machine = make_machine(
            ["p", "n"],
            [],
            &crate::controller![assign("p", [op("pair"), constant(1), constant(2)])],
        )
        .unwrap();
        machine.start().unwrap();
        assert!(machine.get_register_contents("p").unwrap().holds_pair());
        machine.set_register_contents("n", Pointer::Number(5.0)).unwrap();

        machine.install_instruction_sequence(&[]).unwrap();
        machine.start().unwrap();
        assert_eq!(machine.get_register_contents("p").unwrap(), &Value::Unassigned);
        assert_eq!(number(&machine, "n"), 5.0);
    }

    #[test]
    fn heap_exhaustion_surfaces_from_start() {
        let mut machine = make_machine(
            ["p"],
            [],
            &crate::controller![
                assign("p", [constant(Raw::Null)]),
                "loop",
                assign("p", [op("pair"), constant(0), reg("p")]),
                go_to(label("loop")),
            ],
        )
        .unwrap();
        machine.set_heap_capacity(8);
        let err = machine.start().unwrap_err();
        assert_eq!(
            err,
            crate::heap::HeapError::HeapExhausted { capacity: 8, live: 8 }.into()
        );
        assert_eq!(machine.statistics().gc.collections, 1);
    }

    #[test]
    fn installing_twice_is_rejected() {
        let mut machine = Machine::new();
        machine.install_parsetree(&SyntaxTree::atom(1)).unwrap();
        assert_eq!(
            machine.install_parsetree(&SyntaxTree::atom(2)).unwrap_err(),
            MachineError::ProgramAlreadyInstalled.into()
        );
    }

    #[test]
    fn config_loads_from_json_with_defaults() {
        let config: MachineConfig = serde_json::from_str(r#"{"heap_capacity": 64}"#).unwrap();
        assert_eq!(config.heap_capacity, 64);
        assert!(!config.trace);
        assert!(serde_json::from_str::<MachineConfig>(r#"{"heap": 1}"#).is_err());
    }
}
