//! The two cons heaps.
//!
//! The pair heap holds everything the evaluator allocates at run time
//! (environments, argument lists, function values). It is a pair of parallel
//! `heads`/`tails` arrays with a bump free pointer, and is compacted by the
//! copying collector in [`gc`] when it fills up.
//!
//! The program heap holds the installed syntax tree. It is filled once,
//! never moved and never scanned by the collector.

use std::fmt;

use crate::syntax::SyntaxTree;
use crate::value::{Address, Pointer};

pub mod gc;
pub use gc::GcStats;

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Pair,
    Program,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Pair => write!(f, "pair heap"),
            Space::Program => write!(f, "program heap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HeapError {
    #[error("heap fault: {address} is outside the {space} (limit {limit})")]
    HeapFault { space: Space, address: Address, limit: usize },
    #[error("heap exhausted: {live} live pairs fill the capacity of {capacity}")]
    HeapExhausted { capacity: usize, live: usize },
}

/// Head field of a pair-heap slot. A relocated pair leaves a broken heart
/// behind, recording where its contents went.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Value(Pointer),
    BrokenHeart(Address),
}

/// One semi-space: `heads[a]` and `tails[a]` form the pair at address `a`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Region {
    pub(crate) heads: Vec<Cell>,
    pub(crate) tails: Vec<Pointer>,
}

impl Region {
    fn with_capacity(capacity: usize) -> Self {
        Region {
            heads: vec![Cell::Value(Pointer::Undefined); capacity],
            tails: vec![Pointer::Undefined; capacity],
        }
    }
}

// ── Pair heap ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PairHeap {
    pub(crate) active: Region,
    pub(crate) spare: Region,
    pub(crate) free: usize,
    capacity: usize,
    pub(crate) stats: GcStats,
}

impl PairHeap {
    pub fn new(capacity: usize) -> Self {
        PairHeap {
            active: Region::with_capacity(capacity),
            spare: Region::with_capacity(capacity),
            free: 0,
            capacity,
            stats: GcStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Next unused address; also the number of pairs in use.
    pub fn free(&self) -> usize {
        self.free
    }

    pub fn available(&self) -> usize {
        self.capacity - self.free
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Resizes both semi-spaces. Discards every pair.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.active = Region::with_capacity(capacity);
        self.spare = Region::with_capacity(capacity);
        self.capacity = capacity;
        self.free = 0;
    }

    /// Forgets every pair by rewinding the free pointer, and starts the
    /// statistics over.
    pub fn reset(&mut self) {
        self.free = 0;
        self.stats = GcStats::default();
    }

    /// Writes a pair at the free pointer. The caller is responsible for
    /// collecting first when the heap is full; this only reports it.
    pub fn alloc(&mut self, head: Pointer, tail: Pointer) -> Result<Pointer, HeapError> {
        if self.free == self.capacity {
            return Err(HeapError::HeapExhausted {
                capacity: self.capacity,
                live: self.free,
            });
        }
        let address = Address(self.free);
        self.active.heads[address.0] = Cell::Value(head);
        self.active.tails[address.0] = tail;
        self.free += 1;
        self.stats.pairs_allocated += 1;
        self.stats.high_water = self.stats.high_water.max(self.free);
        Ok(Pointer::Pair(address))
    }

    fn check(&self, address: Address) -> Result<usize, HeapError> {
        if address.0 < self.free {
            Ok(address.0)
        } else {
            Err(HeapError::HeapFault {
                space: Space::Pair,
                address,
                limit: self.free,
            })
        }
    }

    pub fn head(&self, address: Address) -> Result<Pointer, HeapError> {
        match &self.active.heads[self.check(address)?] {
            Cell::Value(p) => Ok(p.clone()),
            // forwarding markers only exist in the region being evacuated
            Cell::BrokenHeart(_) => Err(HeapError::HeapFault {
                space: Space::Pair,
                address,
                limit: self.free,
            }),
        }
    }

    pub fn tail(&self, address: Address) -> Result<Pointer, HeapError> {
        Ok(self.active.tails[self.check(address)?].clone())
    }

    pub fn set_head(&mut self, address: Address, value: Pointer) -> Result<(), HeapError> {
        let index = self.check(address)?;
        self.active.heads[index] = Cell::Value(value);
        Ok(())
    }

    pub fn set_tail(&mut self, address: Address, value: Pointer) -> Result<(), HeapError> {
        let index = self.check(address)?;
        self.active.tails[index] = value;
        Ok(())
    }
}

impl Default for PairHeap {
    fn default() -> Self {
        PairHeap::new(DEFAULT_CAPACITY)
    }
}

// ── Program heap ─────────────────────────────────────────────────────

/// Append-only store for the installed syntax tree.
#[derive(Debug, Default)]
pub struct ProgramHeap {
    heads: Vec<Pointer>,
    tails: Vec<Pointer>,
    root: Option<Pointer>,
}

impl ProgramHeap {
    pub fn new() -> Self {
        ProgramHeap::default()
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Pointer to the top of the installed tree, if any.
    pub fn root(&self) -> Option<&Pointer> {
        self.root.as_ref()
    }

    pub fn alloc(&mut self, head: Pointer, tail: Pointer) -> Pointer {
        let address = Address(self.heads.len());
        self.heads.push(head);
        self.tails.push(tail);
        Pointer::Prog(address)
    }

    /// Flattens a tree into indexed pairs: atoms become wrapped pointers,
    /// interior nodes become program references.
    pub fn install(&mut self, tree: &SyntaxTree) -> Pointer {
        let mut pending = Vec::new();
        let root = self.place(tree, &mut pending);
        while let Some((index, head, tail)) = pending.pop() {
            self.heads[index] = self.place(head, &mut pending);
            self.tails[index] = self.place(tail, &mut pending);
        }
        self.root = Some(root.clone());
        root
    }

    fn place<'t>(
        &mut self,
        node: &'t SyntaxTree,
        pending: &mut Vec<(usize, &'t SyntaxTree, &'t SyntaxTree)>,
    ) -> Pointer {
        match node {
            SyntaxTree::Atom(raw) => Pointer::wrap(raw.clone()),
            SyntaxTree::Pair(head, tail) => {
                let reference = self.alloc(Pointer::Undefined, Pointer::Undefined);
                pending.push((self.heads.len() - 1, &**head, &**tail));
                reference
            }
        }
    }

    fn check(&self, address: Address) -> Result<usize, HeapError> {
        if address.0 < self.heads.len() {
            Ok(address.0)
        } else {
            Err(HeapError::HeapFault {
                space: Space::Program,
                address,
                limit: self.heads.len(),
            })
        }
    }

    pub fn head(&self, address: Address) -> Result<Pointer, HeapError> {
        Ok(self.heads[self.check(address)?].clone())
    }

    pub fn tail(&self, address: Address) -> Result<Pointer, HeapError> {
        Ok(self.tails[self.check(address)?].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::build::*;

    #[test]
    fn alloc_returns_increasing_addresses() {
        let mut heap = PairHeap::new(4);
        let a = heap.alloc(Pointer::Number(1.0), Pointer::Null).unwrap();
        let b = heap.alloc(Pointer::Number(2.0), a.clone()).unwrap();
        assert_eq!(a, Pointer::Pair(Address(0)));
        assert_eq!(b, Pointer::Pair(Address(1)));
        assert_eq!(heap.tail(Address(1)).unwrap(), a);
        assert_eq!(heap.free(), 2);
    }

    #[test]
    fn alloc_reports_a_full_heap() {
        let mut heap = PairHeap::new(1);
        heap.alloc(Pointer::Null, Pointer::Null).unwrap();
        let err = heap.alloc(Pointer::Null, Pointer::Null).unwrap_err();
        assert_eq!(err, HeapError::HeapExhausted { capacity: 1, live: 1 });
    }

    #[test]
    fn access_past_free_is_a_fault() {
        let mut heap = PairHeap::new(8);
        heap.alloc(Pointer::Null, Pointer::Null).unwrap();
        assert!(matches!(
            heap.head(Address(1)),
            Err(HeapError::HeapFault { space: Space::Pair, .. })
        ));
        assert!(heap.set_tail(Address(5), Pointer::Null).is_err());
    }

    #[test]
    fn set_head_and_tail_mutate_in_place() {
        let mut heap = PairHeap::new(2);
        let p = heap.alloc(Pointer::Null, Pointer::Null).unwrap().pair_address().unwrap();
        heap.set_head(p, Pointer::Bool(true)).unwrap();
        heap.set_tail(p, Pointer::str("x")).unwrap();
        assert_eq!(heap.head(p).unwrap(), Pointer::Bool(true));
        assert_eq!(heap.tail(p).unwrap(), Pointer::str("x"));
    }

    #[test]
    fn install_flattens_nested_lists() {
        let mut program = ProgramHeap::new();
        let root = program.install(&name("x"));
        let root = root.program_address().unwrap();
        assert_eq!(program.head(root).unwrap(), Pointer::str("name"));
        let rest = program.tail(root).unwrap().program_address().unwrap();
        assert_eq!(program.head(rest).unwrap(), Pointer::str("x"));
        assert_eq!(program.tail(rest).unwrap(), Pointer::Null);
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn install_of_an_atom_allocates_nothing() {
        let mut program = ProgramHeap::new();
        assert_eq!(program.install(&num(1.0)), Pointer::Number(1.0));
        assert!(program.is_empty());
        assert_eq!(program.root(), Some(&Pointer::Number(1.0)));
    }

    #[test]
    fn program_heap_is_bounds_checked() {
        let program = ProgramHeap::new();
        assert!(matches!(
            program.head(Address(0)),
            Err(HeapError::HeapFault { space: Space::Program, .. })
        ));
    }
}
