use crate::evaluator::EvalError;
use crate::heap::HeapError;
use crate::machine::MachineError;
use crate::value::ValueError;

/// Every way a machine can fail. All of them are fatal to the current run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    Machine(#[from] MachineError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, Error>;
