//! Heap access for address-aware operations.
//!
//! A [`Memory`] borrows the parts of a running machine an operation may
//! touch. Allocation goes through [`Memory::reserve`], which runs the
//! collector with the registers, the stack and the operation's own pending
//! operands as roots. Any pointer an operation holds across a `reserve`
//! call must be passed in `pending`, or it may be left dangling.

use super::ops::{Operation, OperationTable};
use super::{MachineError, Register, Stack};
use crate::heap::{HeapError, PairHeap, ProgramHeap};
use crate::value::{Address, Pointer, Value, ValueError};
use crate::Result;

pub struct Memory<'m> {
    pub(crate) heap: &'m mut PairHeap,
    pub(crate) program: &'m ProgramHeap,
    pub(crate) registers: &'m mut [Register],
    pub(crate) stack: &'m mut Stack,
    pub(crate) operations: &'m OperationTable,
}

fn pair_address(p: &Pointer) -> Result<Address> {
    p.pair_address()
        .ok_or_else(|| ValueError::NotAPair(p.to_string()).into())
}

fn program_address(p: &Pointer) -> Result<Address> {
    p.program_address()
        .ok_or_else(|| ValueError::NotAProgramPair(p.to_string()).into())
}

impl<'m> Memory<'m> {
    // ── Pair heap ────────────────────────────────────────────────────

    pub fn heap(&self) -> &PairHeap {
        self.heap
    }

    pub fn head(&self, p: &Pointer) -> Result<Pointer> {
        Ok(self.heap.head(pair_address(p)?)?)
    }

    pub fn tail(&self, p: &Pointer) -> Result<Pointer> {
        Ok(self.heap.tail(pair_address(p)?)?)
    }

    pub fn set_head(&mut self, p: &Pointer, value: Pointer) -> Result<()> {
        Ok(self.heap.set_head(pair_address(p)?, value)?)
    }

    pub fn set_tail(&mut self, p: &Pointer, value: Pointer) -> Result<()> {
        Ok(self.heap.set_tail(pair_address(p)?, value)?)
    }

    /// Makes sure `n` pairs can be allocated without collecting.
    ///
    /// Collects when fewer than `n` slots are free; `pending` is relocated
    /// along with the registers and the stack. Fails with `HeapExhausted`
    /// when the live data leaves too little room even after a cycle.
    pub fn reserve(&mut self, n: usize, pending: &mut [Pointer]) -> Result<()> {
        if self.heap.available() >= n {
            return Ok(());
        }
        let roots = self
            .registers
            .iter_mut()
            .filter_map(|r| r.contents.pointer_mut())
            .chain(self.stack.items.iter_mut().filter_map(Value::pointer_mut))
            .chain(pending.iter_mut());
        self.heap.collect(roots)?;

        if self.heap.available() < n {
            log::debug!(
                "cannot reserve {} pairs: {} of {} still live",
                n,
                self.heap.free(),
                self.heap.capacity()
            );
            return Err(HeapError::HeapExhausted {
                capacity: self.heap.capacity(),
                live: self.heap.free(),
            }
            .into());
        }
        Ok(())
    }

    /// Allocates one pair, collecting first if the heap is full.
    pub fn alloc_pair(&mut self, head: Pointer, tail: Pointer) -> Result<Pointer> {
        let mut pending = [head, tail];
        self.reserve(1, &mut pending)?;
        let [head, tail] = pending;
        Ok(self.heap.alloc(head, tail)?)
    }

    /// Allocates one pair out of space set aside by an earlier `reserve`.
    /// Never collects, so pointers held by the caller stay valid.
    pub fn alloc_reserved(&mut self, head: Pointer, tail: Pointer) -> Result<Pointer> {
        Ok(self.heap.alloc(head, tail)?)
    }

    /// Builds a proper list out of reserved space (`items.len()` pairs).
    pub fn build_list(&mut self, items: Vec<Pointer>) -> Result<Pointer> {
        let mut list = Pointer::Null;
        for item in items.into_iter().rev() {
            list = self.alloc_reserved(item, list)?;
        }
        Ok(list)
    }

    pub fn list_to_vec(&self, mut list: Pointer) -> Result<Vec<Pointer>> {
        let mut items = Vec::new();
        while !matches!(list, Pointer::Null) {
            items.push(self.head(&list)?);
            list = self.tail(&list)?;
        }
        Ok(items)
    }

    /// `n`-th element of a pair-heap list.
    pub fn list_ref(&self, list: &Pointer, n: usize) -> Result<Pointer> {
        let mut cursor = list.clone();
        for _ in 0..n {
            cursor = self.tail(&cursor)?;
        }
        self.head(&cursor)
    }

    // ── Program heap ─────────────────────────────────────────────────

    pub fn program(&self) -> &ProgramHeap {
        self.program
    }

    pub fn program_head(&self, p: &Pointer) -> Result<Pointer> {
        Ok(self.program.head(program_address(p)?)?)
    }

    pub fn program_tail(&self, p: &Pointer) -> Result<Pointer> {
        Ok(self.program.tail(program_address(p)?)?)
    }

    pub fn program_list_to_vec(&self, mut list: Pointer) -> Result<Vec<Pointer>> {
        let mut items = Vec::new();
        while !matches!(list, Pointer::Null) {
            items.push(self.program_head(&list)?);
            list = self.program_tail(&list)?;
        }
        Ok(items)
    }

    pub fn program_list_ref(&self, list: &Pointer, n: usize) -> Result<Pointer> {
        let mut cursor = list.clone();
        for _ in 0..n {
            cursor = self.program_tail(&cursor)?;
        }
        self.program_head(&cursor)
    }

    // ── Machine ──────────────────────────────────────────────────────

    pub fn initialize_stack(&mut self) {
        self.stack.clear();
    }

    /// Applies an operation from the table by name, with either calling
    /// convention.
    pub fn apply(&mut self, name: &str, args: &mut [Pointer]) -> Result<Pointer> {
        let op = self
            .operations
            .get(name)
            .cloned()
            .ok_or_else(|| MachineError::UnknownOperation { name: name.to_string() })?;
        self.call(name, &op, args)
    }

    pub(crate) fn call(&mut self, name: &str, op: &Operation, args: &mut [Pointer]) -> Result<Pointer> {
        match op {
            Operation::Primitive(f) => {
                let raws = args.iter().map(Pointer::unwrap).collect::<std::result::Result<Vec<_>, _>>()?;
                let raw = f(&raws).map_err(|source| MachineError::Operation {
                    op: name.to_string(),
                    source,
                })?;
                Ok(Pointer::wrap(raw))
            }
            Operation::AddressAware(f) => f(self, args),
        }
    }
}

pub(crate) fn arity(name: &str, args: &[Pointer], n: usize) -> Result<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(MachineError::Operation {
            op: name.to_string(),
            source: super::OperandError::Arity { expected: n, got: args.len() },
        }
        .into())
    }
}

/// Heap accessors every machine is built with.
pub fn memory_operations() -> Vec<(&'static str, Operation)> {
    vec![
        ("pair", Operation::address_aware(|memory, args| {
            arity("pair", args, 2)?;
            memory.alloc_pair(args[0].clone(), args[1].clone())
        })),
        ("head", Operation::address_aware(|memory, args| {
            arity("head", args, 1)?;
            memory.head(&args[0])
        })),
        ("tail", Operation::address_aware(|memory, args| {
            arity("tail", args, 1)?;
            memory.tail(&args[0])
        })),
        ("set_head", Operation::address_aware(|memory, args| {
            arity("set_head", args, 2)?;
            memory.set_head(&args[0], args[1].clone())?;
            Ok(Pointer::Undefined)
        })),
        ("set_tail", Operation::address_aware(|memory, args| {
            arity("set_tail", args, 2)?;
            memory.set_tail(&args[0], args[1].clone())?;
            Ok(Pointer::Undefined)
        })),
        ("program_head", Operation::address_aware(|memory, args| {
            arity("program_head", args, 1)?;
            memory.program_head(&args[0])
        })),
        ("program_tail", Operation::address_aware(|memory, args| {
            arity("program_tail", args, 1)?;
            memory.program_tail(&args[0])
        })),
        ("program_root", Operation::address_aware(|memory, args| {
            arity("program_root", args, 0)?;
            memory
                .program
                .root()
                .cloned()
                .ok_or_else(|| MachineError::ProgramNotInstalled.into())
        })),
        ("initialize_stack", Operation::address_aware(|memory, args| {
            arity("initialize_stack", args, 0)?;
            memory.initialize_stack();
            Ok(Pointer::Undefined)
        })),
    ]
}
