use bitvec::prelude::*;
use log::warn;

/// Number of network ordinals, one per bit of a machine word.
pub const MAX_NETWORKS: usize = usize::BITS as usize;

/// Hands out network ordinals lowest-first. Ordinals double as the `N` in
/// the `p2pN-S` interface names, so reuse of the smallest free slot is
/// part of the contract.
#[derive(Debug, Clone)]
pub struct OrdinalAllocator {
    bitmap: BitArray<[usize; 1], Lsb0>,
}

impl OrdinalAllocator {
    pub fn empty() -> Self {
        Self {
            bitmap: BitArray::ZERO,
        }
    }

    pub fn allocate(&mut self) -> Option<usize> {
        let pos = self.bitmap.first_zero()?;
        self.bitmap.set(pos, true);
        Some(pos)
    }

    /// Marks an ordinal read back from durable state. Returns false if the
    /// ordinal is out of range or already taken.
    pub fn mark(&mut self, ordinal: usize) -> bool {
        if ordinal >= MAX_NETWORKS || self.bitmap[ordinal] {
            return false;
        }
        self.bitmap.set(ordinal, true);
        true
    }

    /// Releasing an ordinal that is not held is a no-op and returns false.
    pub fn release(&mut self, ordinal: usize) -> bool {
        if ordinal >= MAX_NETWORKS || !self.bitmap[ordinal] {
            warn!("Ignoring release of unallocated network ordinal {ordinal}");
            return false;
        }
        self.bitmap.set(ordinal, false);
        true
    }

    #[cfg(test)]
    fn is_allocated(&self, ordinal: usize) -> bool {
        ordinal < MAX_NETWORKS && self.bitmap[ordinal]
    }

    pub fn count(&self) -> usize {
        self.bitmap.count_ones()
    }
}
