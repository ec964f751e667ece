//! walk.rs - Heap walker (§4.3)
//!
//! Sentinel-aware wrappers around `block::next_addr`/`block::prev_addr` that
//! terminate at the epilog/prolog instead of reading past them. Forward and
//! backward traversal both live here so the checker can cross-verify I2
//! (`block_next(block_prev(b)) == b`) in both directions.

use crate::block;

/// `b == epilog` ⇒ `None`; else the address of the block physically after
/// `b`.
///
/// # Safety
/// `b` must be a valid block header address and `epilog` must be the
/// arena's current epilog address.
pub unsafe fn block_next(epilog: usize, b: usize) -> Option<usize> {
    if b == epilog {
        None
    } else {
        Some(unsafe { block::next_addr(b) })
    }
}

/// `b == prolog` ⇒ `None`; else the address of the block physically before
/// `b`.
///
/// # Safety
/// `b` must be a valid block header address and `prolog` must be the
/// arena's current prolog address.
pub unsafe fn block_prev(prolog: usize, b: usize) -> Option<usize> {
    if b == prolog {
        None
    } else {
        Some(unsafe { block::prev_addr(b) })
    }
}

/// Iterates every live block from `prolog` to `epilog` inclusive, forward.
pub struct ForwardIter {
    cur: Option<usize>,
    epilog: usize,
}

impl ForwardIter {
    /// # Safety
    /// `prolog` and `epilog` must be the arena's current sentinel addresses.
    pub unsafe fn new(prolog: usize, epilog: usize) -> Self {
        Self {
            cur: Some(prolog),
            epilog,
        }
    }
}

impl Iterator for ForwardIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let b = self.cur?;
        self.cur = unsafe { block_next(self.epilog, b) };
        Some(b)
    }
}
