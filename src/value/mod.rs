use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

// ── Addresses and program counters ───────────────────────────────────

/// Index into one of the two heaps. Which heap is decided by the pointer tag
/// carrying the address, never by the address itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub(crate) usize);

impl Address {
    pub fn new(index: usize) -> Self {
        Address(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A storable program counter: the position of an instruction in the
/// assembled instruction array. Jumping to it resumes execution there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) usize);

impl Label {
    pub fn index(self) -> usize {
        self.0
    }
}

// ── Raw host values ──────────────────────────────────────────────────

/// An untagged host value, as consumed and produced by value-primitive
/// operations and as found in the leaves of a syntax tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum Raw {
    Number(f64),
    Bool(bool),
    Str(Rc<str>),
    Null,
    Undefined,
}

impl Raw {
    pub fn type_name(&self) -> &'static str {
        match self {
            Raw::Number(_) => "number",
            Raw::Bool(_) => "bool",
            Raw::Str(_) => "string",
            Raw::Null => "null",
            Raw::Undefined => "undefined",
        }
    }
}

impl From<f64> for Raw {
    fn from(n: f64) -> Self {
        Raw::Number(n)
    }
}

impl From<i32> for Raw {
    fn from(n: i32) -> Self {
        Raw::Number(n as f64)
    }
}

impl From<bool> for Raw {
    fn from(b: bool) -> Self {
        Raw::Bool(b)
    }
}

impl From<&str> for Raw {
    fn from(s: &str) -> Self {
        Raw::Str(Rc::from(s))
    }
}

impl From<String> for Raw {
    fn from(s: String) -> Self {
        Raw::Str(Rc::from(s))
    }
}

impl TryFrom<&serde_json::Value> for Raw {
    type Error = ValueError;

    fn try_from(value: &serde_json::Value) -> Result<Self, ValueError> {
        match value {
            serde_json::Value::Null => Ok(Raw::Null),
            serde_json::Value::Bool(b) => Ok(Raw::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Raw::Number)
                .ok_or_else(|| ValueError::InvalidValue(n.to_string())),
            serde_json::Value::String(s) => Ok(Raw::from(s.as_str())),
            serde_json::Value::Object(fields)
                if fields.len() == 1 && fields.get("undefined") == Some(&serde_json::Value::Bool(true)) =>
            {
                Ok(Raw::Undefined)
            }
            other => Err(ValueError::InvalidValue(other.to_string())),
        }
    }
}

impl TryFrom<serde_json::Value> for Raw {
    type Error = ValueError;

    fn try_from(value: serde_json::Value) -> Result<Self, ValueError> {
        Raw::try_from(&value)
    }
}

/// JSON has no `undefined`; it is written as `{"undefined": true}` so it
/// reads back as itself rather than as `null`.
impl From<Raw> for serde_json::Value {
    fn from(raw: Raw) -> Self {
        match raw {
            Raw::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Raw::Bool(b) => serde_json::Value::Bool(b),
            Raw::Str(s) => serde_json::Value::String(s.to_string()),
            Raw::Null => serde_json::Value::Null,
            Raw::Undefined => serde_json::json!({ "undefined": true }),
        }
    }
}

// ── Typed pointers ───────────────────────────────────────────────────

/// The tagged value held by every register, stack slot and heap cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Pointer {
    Number(f64),
    Bool(bool),
    Str(Rc<str>),
    Null,
    Undefined,
    /// Address in the mutable, collected pair heap.
    Pair(Address),
    /// Address in the immutable program heap.
    Prog(Address),
}

impl Pointer {
    /// Tags a raw host value. Heap references are only ever made by the heaps.
    pub fn wrap(raw: Raw) -> Pointer {
        match raw {
            Raw::Number(n) => Pointer::Number(n),
            Raw::Bool(b) => Pointer::Bool(b),
            Raw::Str(s) => Pointer::Str(s),
            Raw::Null => Pointer::Null,
            Raw::Undefined => Pointer::Undefined,
        }
    }

    /// Classifies a JSON scalar. Arrays and objects are not values.
    pub fn wrap_json(value: &serde_json::Value) -> Result<Pointer, ValueError> {
        Raw::try_from(value).map(Pointer::wrap)
    }

    /// Strips the tag for a value primitive. Heap references must be
    /// dereferenced through their heap instead.
    pub fn unwrap(&self) -> Result<Raw, ValueError> {
        match self {
            Pointer::Number(n) => Ok(Raw::Number(*n)),
            Pointer::Bool(b) => Ok(Raw::Bool(*b)),
            Pointer::Str(s) => Ok(Raw::Str(s.clone())),
            Pointer::Null => Ok(Raw::Null),
            Pointer::Undefined => Ok(Raw::Undefined),
            Pointer::Pair(_) | Pointer::Prog(_) => Err(ValueError::NotAScalar(self.to_string())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Pointer::Number(_) => "number",
            Pointer::Bool(_) => "bool",
            Pointer::Str(_) => "string",
            Pointer::Null => "null",
            Pointer::Undefined => "undefined",
            Pointer::Pair(_) => "pair",
            Pointer::Prog(_) => "program",
        }
    }

    pub fn pair_address(&self) -> Option<Address> {
        match self {
            Pointer::Pair(a) => Some(*a),
            _ => None,
        }
    }

    pub fn program_address(&self) -> Option<Address> {
        match self {
            Pointer::Prog(a) => Some(*a),
            _ => None,
        }
    }

    pub fn str(s: &str) -> Pointer {
        Pointer::Str(Rc::from(s))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Pointer::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Pointer::Pair(a) => serde_json::json!({ "pair": a.index() }),
            Pointer::Prog(a) => serde_json::json!({ "program": a.index() }),
            // unwrap only fails for the two heap tags handled above
            other => other
                .unwrap()
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<Raw> for Pointer {
    fn from(raw: Raw) -> Self {
        Pointer::wrap(raw)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::Number(n) => {
                if n.is_nan() {
                    write!(f, "NaN")
                } else if n.is_infinite() {
                    write!(f, "{}Infinity", if *n < 0.0 { "-" } else { "" })
                } else if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Pointer::Bool(b) => write!(f, "{}", b),
            Pointer::Str(s) => write!(f, "{}", s),
            Pointer::Null => write!(f, "null"),
            Pointer::Undefined => write!(f, "undefined"),
            Pointer::Pair(a) => write!(f, "<pair {}>", a),
            Pointer::Prog(a) => write!(f, "<program {}>", a),
        }
    }
}

// ── Register contents ────────────────────────────────────────────────

/// What a register or stack slot can hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Initial register content, distinct from every valid value.
    #[default]
    Unassigned,
    Ptr(Pointer),
    Label(Label),
}

impl Value {
    pub fn pointer(&self) -> Option<&Pointer> {
        match self {
            Value::Ptr(p) => Some(p),
            _ => None,
        }
    }

    /// Collector roots are the pointer-holding slots.
    pub fn pointer_mut(&mut self) -> Option<&mut Pointer> {
        match self {
            Value::Ptr(p) => Some(p),
            _ => None,
        }
    }

    pub fn holds_pair(&self) -> bool {
        matches!(self, Value::Ptr(Pointer::Pair(_)))
    }
}

impl From<Pointer> for Value {
    fn from(p: Pointer) -> Self {
        Value::Ptr(p)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unassigned => write!(f, "*unassigned*"),
            Value::Ptr(p) => write!(f, "{}", p),
            Value::Label(l) => write!(f, "<label #{}>", l.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("{0} cannot be unwrapped into a scalar")]
    NotAScalar(String),
    #[error("expected a pair, got {0}")]
    NotAPair(String),
    #[error("expected a program pair, got {0}")]
    NotAProgramPair(String),
}
