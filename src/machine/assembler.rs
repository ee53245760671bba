//! Controller assembly.
//!
//! Pass 1 walks the symbolic program once, binding each label to the index
//! of the instruction that follows it. Pass 2 binds every instruction to
//! the machine: register names become register ids, label names become
//! program counters and operation names become the operation captured from
//! the table at this moment. Operations installed later are not seen by
//! instructions assembled earlier.

use std::collections::HashMap;
use std::rc::Rc;

use super::controller::{ControllerEntry, Instruction, Operand};
use super::ops::{Operation, OperationTable};
use super::{MachineError, RegisterId};
use crate::value::{Label, Pointer};

/// Where an instruction input comes from.
#[derive(Debug, Clone)]
pub(crate) enum Input {
    Register(RegisterId),
    Constant(Pointer),
}

/// An operation application with its operation already looked up.
#[derive(Debug, Clone)]
pub(crate) struct Apply {
    pub(crate) name: String,
    pub(crate) op: Rc<Operation>,
    pub(crate) inputs: Vec<Input>,
}

#[derive(Debug, Clone)]
pub(crate) enum Source {
    Register(RegisterId),
    Constant(Pointer),
    Label(Label),
    Apply(Apply),
}

/// A bound instruction, ready for the fetch-execute loop.
#[derive(Debug, Clone)]
pub(crate) enum Executable {
    Assign { target: RegisterId, source: Source },
    Test(Apply),
    Branch(Label),
    Goto(Label),
    GotoRegister(RegisterId),
    Save(RegisterId),
    Restore(RegisterId),
    Perform(Apply),
}

/// Label name to program counter, filled by the first pass.
#[derive(Debug, Default)]
pub(crate) struct Labels {
    labels: HashMap<String, Label>,
}

impl Labels {
    fn define(&mut self, name: &str, at: usize) -> Result<(), MachineError> {
        if self.labels.contains_key(name) {
            return Err(MachineError::DuplicateLabel { label: name.to_string() });
        }
        self.labels.insert(name.to_string(), Label(at));
        Ok(())
    }

    pub(crate) fn resolve(&self, name: &str) -> Result<Label, MachineError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| MachineError::UnknownLabel { label: name.to_string() })
    }
}

/// Everything the second pass resolves names against.
pub(crate) struct Binding<'a> {
    pub(crate) registers: &'a HashMap<String, RegisterId>,
    pub(crate) operations: &'a OperationTable,
    pub(crate) labels: &'a Labels,
}

#[derive(Debug)]
pub(crate) struct Assembled {
    pub(crate) instructions: Vec<Executable>,
    pub(crate) texts: Vec<Instruction>,
}

/// Pass 1: splits the program into its instructions and the label table.
/// A label is bound to the position of the next instruction, so several
/// labels in a row share a target and a trailing label points past the end.
pub(crate) fn extract_labels(controller: &[ControllerEntry]) -> Result<(Vec<Instruction>, Labels), MachineError> {
    let mut texts = Vec::new();
    let mut labels = Labels::default();
    for entry in controller {
        match entry {
            ControllerEntry::Label(name) => labels.define(name, texts.len())?,
            ControllerEntry::Instruction(instruction) => texts.push(instruction.clone()),
        }
    }
    Ok((texts, labels))
}

pub(crate) fn assemble(
    controller: &[ControllerEntry],
    registers: &HashMap<String, RegisterId>,
    operations: &OperationTable,
) -> Result<Assembled, MachineError> {
    let (texts, labels) = extract_labels(controller)?;
    let binding = Binding { registers, operations, labels: &labels };
    let instructions = texts
        .iter()
        .enumerate()
        .map(|(index, text)| binding.bind(index, text))
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!("assembled {} instructions, {} labels", instructions.len(), labels.labels.len());
    Ok(Assembled { instructions, texts })
}

impl Binding<'_> {
    /// Pass 2 for one instruction.
    fn bind(&self, index: usize, text: &Instruction) -> Result<Executable, MachineError> {
        let malformed = |reason: &str| MachineError::MalformedInstruction {
            index,
            text: text.to_string(),
            reason: reason.to_string(),
        };
        let ops = text.operands.as_slice();

        match text.kind.as_str() {
            "assign" => match ops {
                [Operand::Reg(target), source @ ..] => Ok(Executable::Assign {
                    target: self.register(target)?,
                    source: self.source(source).ok_or_else(|| {
                        malformed("assign takes a register, constant, label or operation")
                    })??,
                }),
                _ => Err(malformed("assign needs a target register")),
            },
            "test" => Ok(Executable::Test(
                self.apply(ops).ok_or_else(|| malformed("test takes an operation"))??,
            )),
            "perform" => Ok(Executable::Perform(
                self.apply(ops).ok_or_else(|| malformed("perform takes an operation"))??,
            )),
            "branch" => match ops {
                [Operand::Label(name)] => Ok(Executable::Branch(self.labels.resolve(name)?)),
                _ => Err(malformed("branch takes a label")),
            },
            "goto" | "go_to" => match ops {
                [Operand::Label(name)] => Ok(Executable::Goto(self.labels.resolve(name)?)),
                [Operand::Reg(name)] => Ok(Executable::GotoRegister(self.register(name)?)),
                _ => Err(malformed("goto takes a label or a register")),
            },
            "save" => match ops {
                [Operand::Reg(name)] => Ok(Executable::Save(self.register(name)?)),
                _ => Err(malformed("save takes a register")),
            },
            "restore" => match ops {
                [Operand::Reg(name)] => Ok(Executable::Restore(self.register(name)?)),
                _ => Err(malformed("restore takes a register")),
            },
            _ => Err(malformed("unknown instruction kind")),
        }
    }

    fn register(&self, name: &str) -> Result<RegisterId, MachineError> {
        self.registers
            .get(name)
            .copied()
            .ok_or_else(|| MachineError::UnknownRegister { name: name.to_string() })
    }

    /// `None` when the operands have the wrong shape for a value source.
    fn source(&self, ops: &[Operand]) -> Option<Result<Source, MachineError>> {
        match ops {
            [Operand::Reg(name)] => Some(self.register(name).map(Source::Register)),
            [Operand::Constant(raw)] => Some(Ok(Source::Constant(Pointer::wrap(raw.clone())))),
            [Operand::Label(name)] => Some(self.labels.resolve(name).map(Source::Label)),
            [Operand::Op(_), ..] => self.apply(ops).map(|apply| apply.map(Source::Apply)),
            _ => None,
        }
    }

    /// `None` when the operands are not an operation followed by registers
    /// and constants.
    fn apply(&self, ops: &[Operand]) -> Option<Result<Apply, MachineError>> {
        let [Operand::Op(name), inputs @ ..] = ops else {
            return None;
        };
        let mut bound = Vec::with_capacity(inputs.len());
        for input in inputs {
            bound.push(match input {
                Operand::Reg(register) => match self.register(register) {
                    Ok(id) => Input::Register(id),
                    Err(e) => return Some(Err(e)),
                },
                Operand::Constant(raw) => Input::Constant(Pointer::wrap(raw.clone())),
                Operand::Label(_) | Operand::Op(_) => return None,
            });
        }
        let op = match self.operations.get(name) {
            Some(op) => Rc::clone(op),
            None => return Some(Err(MachineError::UnknownOperation { name: name.clone() })),
        };
        Some(Ok(Apply { name: name.clone(), op, inputs: bound }))
    }
}
