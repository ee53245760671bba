//! A register-machine simulator with a typed-pointer cons heap, a copying
//! garbage collector and an explicit-control evaluator running on top.
//!
//! ```
//! use ecmachine::{evaluate, MachineConfig};
//! use ecmachine::syntax::build::*;
//! use ecmachine::value::Pointer;
//!
//! let program = binary("+", num(1.0), num(1.0));
//! let result = evaluate(&program, &MachineConfig::default()).unwrap();
//! assert_eq!(result, Pointer::Number(2.0));
//! ```

pub mod error;
pub mod evaluator;
pub mod heap;
pub mod machine;
pub mod syntax;
pub mod value;

pub use error::{Error, Result};
pub use evaluator::{describe, evaluate, make_evaluator_machine};
pub use machine::{make_machine, Machine, MachineConfig};
