//! Stop-and-copy collection over the pair heap.
//!
//! Cheney's algorithm: roots are evacuated first, then the new region is
//! scanned breadth-first, relocating the head and tail of every copied pair
//! until the scan pointer catches up with the new free pointer. Each
//! evacuated pair leaves a broken heart in the old region so later
//! references to it are forwarded instead of copied twice.

use std::mem;

use serde::Serialize;

use super::{Cell, HeapError, PairHeap, Region, Space};
use crate::value::{Address, Pointer};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub collections: u64,
    pub pairs_copied: u64,
    pub pairs_allocated: u64,
    /// Pairs in use right after the most recent cycle.
    pub live_after_last: usize,
    /// Highest free pointer seen.
    pub high_water: usize,
}

impl PairHeap {
    /// Runs one full collection cycle.
    ///
    /// Every pair reachable from `roots` survives and every root is rewritten
    /// to the pair's new address. Returns the number of live pairs.
    pub fn collect<'r>(
        &mut self,
        roots: impl IntoIterator<Item = &'r mut Pointer>,
    ) -> Result<usize, HeapError> {
        let limit = self.free;
        let from = &mut self.active;
        let to = &mut self.spare;
        let mut new_free = 0;

        for root in roots {
            relocate(from, to, limit, &mut new_free, root)?;
        }

        let mut scan = 0;
        while scan < new_free {
            let mut head = match mem::replace(&mut to.heads[scan], Cell::Value(Pointer::Undefined)) {
                Cell::Value(p) => p,
                Cell::BrokenHeart(_) => {
                    return Err(HeapError::HeapFault {
                        space: Space::Pair,
                        address: Address(scan),
                        limit: new_free,
                    });
                }
            };
            relocate(from, to, limit, &mut new_free, &mut head)?;
            to.heads[scan] = Cell::Value(head);

            let mut tail = mem::replace(&mut to.tails[scan], Pointer::Undefined);
            relocate(from, to, limit, &mut new_free, &mut tail)?;
            to.tails[scan] = tail;

            scan += 1;
        }

        mem::swap(&mut self.active, &mut self.spare);
        self.free = new_free;
        self.stats.collections += 1;
        self.stats.pairs_copied += new_free as u64;
        self.stats.live_after_last = new_free;

        log::debug!(
            "gc cycle {}: {} of {} pairs live (capacity {})",
            self.stats.collections,
            new_free,
            limit,
            self.capacity()
        );
        debug_assert!(self.check_integrity().is_ok());

        Ok(new_free)
    }

    /// Checks that every pair below the free pointer holds plain values and
    /// that every pair reference inside the heap points below the free pointer.
    pub fn check_integrity(&self) -> Result<(), HeapError> {
        let fault = |address| HeapError::HeapFault {
            space: Space::Pair,
            address,
            limit: self.free,
        };
        for index in 0..self.free {
            let head = match &self.active.heads[index] {
                Cell::Value(p) => p,
                Cell::BrokenHeart(_) => return Err(fault(Address(index))),
            };
            for field in [head, &self.active.tails[index]] {
                if let Pointer::Pair(a) = field {
                    if a.0 >= self.free {
                        return Err(fault(*a));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Forwards one pointer field into the new region, copying its pair on
/// first sight.
fn relocate(
    from: &mut Region,
    to: &mut Region,
    limit: usize,
    new_free: &mut usize,
    field: &mut Pointer,
) -> Result<(), HeapError> {
    let Pointer::Pair(old) = *field else {
        return Ok(());
    };
    if old.0 >= limit {
        return Err(HeapError::HeapFault {
            space: Space::Pair,
            address: old,
            limit,
        });
    }

    let new = match mem::replace(&mut from.heads[old.0], Cell::BrokenHeart(Address(*new_free))) {
        Cell::BrokenHeart(forwarded) => {
            from.heads[old.0] = Cell::BrokenHeart(forwarded);
            forwarded
        }
        Cell::Value(head) => {
            let new = Address(*new_free);
            to.heads[new.0] = Cell::Value(head);
            to.tails[new.0] = mem::replace(&mut from.tails[old.0], Pointer::Undefined);
            *new_free += 1;
            new
        }
    };
    *field = Pointer::Pair(new);
    Ok(())
}
