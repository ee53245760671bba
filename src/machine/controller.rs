//! Symbolic controller programs.
//!
//! A controller is a flat list of entries: a bare string defines a label at
//! that position, anything else is an instruction. Programs are plain data
//! so they can be written with the builders below, with [`controller!`], or
//! loaded from JSON:
//!
//! ```json
//! ["test_b",
//!  {"kind": "test", "operands": [{"op": "="}, {"reg": "b"}, {"constant": 0}]},
//!  {"kind": "branch", "operands": [{"label": "gcd_done"}]}]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{Pointer, Raw};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControllerEntry {
    Label(String),
    Instruction(Instruction),
}

/// One symbolic instruction. `kind` is one of `assign`, `test`, `branch`,
/// `goto`, `save`, `restore` or `perform`; the assembler checks the operand
/// shape for each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: String,
    #[serde(default)]
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Reg(String),
    Constant(Raw),
    Label(String),
    Op(String),
}

impl From<&str> for ControllerEntry {
    fn from(label: &str) -> Self {
        ControllerEntry::Label(label.to_string())
    }
}

impl From<Instruction> for ControllerEntry {
    fn from(instruction: Instruction) -> Self {
        ControllerEntry::Instruction(instruction)
    }
}

/// Builds a `Vec<ControllerEntry>`, turning string literals into labels.
///
/// ```
/// use ecmachine::controller;
/// use ecmachine::machine::controller::*;
///
/// let program = controller![
///     "loop",
///     test([op("="), reg("n"), constant(0)]),
///     branch("done"),
///     assign("n", [op("-"), reg("n"), constant(1)]),
///     go_to(label("loop")),
///     "done",
/// ];
/// assert_eq!(program.len(), 6);
/// ```
#[macro_export]
macro_rules! controller {
    ($($entry:expr),* $(,)?) => {
        vec![$($crate::machine::controller::ControllerEntry::from($entry)),*]
    };
}

// ── Builders ─────────────────────────────────────────────────────────

fn instruction(kind: &str, operands: impl IntoIterator<Item = Operand>) -> ControllerEntry {
    ControllerEntry::Instruction(Instruction {
        kind: kind.to_string(),
        operands: operands.into_iter().collect(),
    })
}

pub fn reg(name: &str) -> Operand {
    Operand::Reg(name.to_string())
}

pub fn constant(value: impl Into<Raw>) -> Operand {
    Operand::Constant(value.into())
}

pub fn label(name: &str) -> Operand {
    Operand::Label(name.to_string())
}

pub fn op(name: &str) -> Operand {
    Operand::Op(name.to_string())
}

/// `source` is a single register, constant or label, or an operation
/// followed by its inputs.
pub fn assign(target: &str, source: impl IntoIterator<Item = Operand>) -> ControllerEntry {
    instruction("assign", std::iter::once(reg(target)).chain(source))
}

pub fn test(expression: impl IntoIterator<Item = Operand>) -> ControllerEntry {
    instruction("test", expression)
}

pub fn branch(target: &str) -> ControllerEntry {
    instruction("branch", [label(target)])
}

/// Jump to a label, or to the program counter stored in a register.
pub fn go_to(destination: Operand) -> ControllerEntry {
    instruction("goto", [destination])
}

pub fn save(register: &str) -> ControllerEntry {
    instruction("save", [reg(register)])
}

pub fn restore(register: &str) -> ControllerEntry {
    instruction("restore", [reg(register)])
}

pub fn perform(expression: impl IntoIterator<Item = Operand>) -> ControllerEntry {
    instruction("perform", expression)
}

// ── Display ──────────────────────────────────────────────────────────

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(name) => write!(f, "(reg {})", name),
            Operand::Constant(raw) => match raw {
                Raw::Str(s) => write!(f, "(constant {:?})", &**s),
                other => write!(f, "(constant {})", Pointer::wrap(other.clone())),
            },
            Operand::Label(name) => write!(f, "(label {})", name),
            Operand::Op(name) => write!(f, "(op {})", name),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.kind)?;
        for (i, operand) in self.operands.iter().enumerate() {
            // the assign target and the save/restore register print bare
            match operand {
                Operand::Reg(name) if i == 0 && matches!(self.kind.as_str(), "assign" | "save" | "restore") => {
                    write!(f, " {}", name)?
                }
                other => write!(f, " {}", other)?,
            }
        }
        write!(f, ")")
    }
}

impl fmt::Display for ControllerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerEntry::Label(name) => write!(f, "{}:", name),
            ControllerEntry::Instruction(instruction) => write!(f, "  {}", instruction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_displays_in_symbolic_form() {
        let entry = assign("val", [op("+"), reg("a"), constant(1)]);
        assert_eq!(entry.to_string(), "  (assign val (op +) (reg a) (constant 1))");
    }

    #[test]
    fn goto_through_register_displays_operand() {
        assert_eq!(go_to(reg("continue")).to_string(), "  (goto (reg continue))");
        assert_eq!(save("n").to_string(), "  (save n)");
    }

    #[test]
    fn string_constants_are_quoted() {
        let entry = test([op("==="), reg("e"), constant("name")]);
        assert_eq!(entry.to_string(), "  (test (op ===) (reg e) (constant \"name\"))");
    }

    #[test]
    fn undefined_constants_survive_json() {
        let entry = assign("val", [constant(Raw::Undefined)]);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#"{"constant":{"undefined":true}}"#), "{json}");
        let back: ControllerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn macro_turns_strings_into_labels() {
        let program = crate::controller!["here", go_to(label("here"))];
        assert_eq!(program[0], ControllerEntry::Label("here".into()));
        assert!(matches!(program[1], ControllerEntry::Instruction(_)));
    }

    #[test]
    fn entries_load_from_json() {
        let program: Vec<ControllerEntry> = serde_json::from_str(
            r#"["start",
                {"kind": "assign", "operands": [{"reg": "a"}, {"constant": 3}]},
                {"kind": "goto", "operands": [{"label": "start"}]}]"#,
        )
        .unwrap();
        assert_eq!(
            program,
            vec![
                ControllerEntry::from("start"),
                assign("a", [constant(3)]),
                go_to(label("start")),
            ]
        );
    }
}
