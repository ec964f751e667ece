//! checker.rs - Debug-only consistency checker (§4.5.8)
//!
//! No teacher equivalent -- the teacher ships no checker at all. Shaped after
//! this ecosystem's preference for reporting through the `log` facade rather
//! than corrupting silently: every violation is logged with enough context
//! to diagnose it before the caller aborts.
//!
//! Compiled whenever `debug_assertions` is on, or under `cfg(test)` so the
//! test suite can invoke it explicitly regardless of profile.

use crate::block;
use crate::error::AllocError;
use crate::freelist::{self, Heads};
use crate::walk::ForwardIter;

/// Runs a single forward pass verifying I1 (alignment) and I2 (walker
/// chaining), counting free blocks; then walks every size-class list
/// verifying I5 (circularity) and I4 (list membership matches ALLOC state
/// and class), decrementing the count. The count must land on zero.
///
/// # Safety
/// `prolog`/`epilog`/`heads` must describe a coherent (if possibly corrupt)
/// heap within `[lo, hi]`.
pub unsafe fn check(
    base: usize,
    prolog: usize,
    epilog: usize,
    heads: &Heads,
    lo: usize,
    hi: usize,
) -> Result<(), AllocError> {
    let mut free_count: usize = 0;
    let mut prev_seen: Option<usize> = None;

    for b in unsafe { ForwardIter::new(prolog, epilog) } {
        if b != prolog {
            let observed_prev = unsafe { block::prev_addr(b) };
            let expected_prev = prev_seen.expect("prolog is always first in the walk");
            if observed_prev != expected_prev {
                log::error!(
                    "checker: I2 violated at {b:#x}: block_prev reports {observed_prev:#x}, \
                     walker arrived from {expected_prev:#x}"
                );
                return Err(invariant("I2: block_prev(b) must equal walker predecessor"));
            }
        }

        if b != prolog && b != epilog {
            let payload = b + 4;
            if payload % 8 != 0 {
                log::error!("checker: I1 violated: payload {payload:#x} is not 8-aligned");
                return Err(invariant("I1: payload address must be 8-aligned"));
            }
            if unsafe { block::read_header(b) }.is_free() {
                free_count += 1;
            }
        }

        prev_seen = Some(b);
    }

    for class in 0..heads.len() {
        free_count -= unsafe { check_list(base, heads, class, lo, hi)? };
    }

    if free_count != 0 {
        log::error!(
            "checker: {free_count} free block(s) seen in the forward walk but not accounted for \
             by any size-class list"
        );
        return Err(invariant("I4: every free block must be on exactly one list"));
    }

    Ok(())
}

/// Walks `heads[class]` verifying circularity and membership, returning the
/// number of blocks it visited so the caller can reconcile against the
/// forward-pass free count.
///
/// # Safety
/// `heads[class]`, if non-null, must be a free block's header address.
unsafe fn check_list(
    base: usize,
    heads: &Heads,
    class: usize,
    lo: usize,
    hi: usize,
) -> Result<usize, AllocError> {
    let head = heads[class];
    if head == crate::arena::NULL_OFFSET {
        return Ok(0);
    }

    let head_addr = crate::arena::to_addr(base, head);
    let mut seen = 0usize;
    let mut cur = head_addr;
    // A corrupt list could cycle without ever revisiting `head_addr`; bound
    // the walk so the checker itself cannot hang.
    let bound = (hi - lo) / 8 + 1;

    loop {
        if cur < lo || cur > hi {
            log::error!("checker: list {class} contains out-of-range block {cur:#x}");
            return Err(invariant("I7: every offset must resolve within [base, hi]"));
        }
        let header = unsafe { block::read_header(cur) };
        if header.is_alloc() {
            log::error!("checker: list {class} contains allocated block {cur:#x}");
            return Err(invariant("I4: list members must be free"));
        }
        if header.class() != class {
            log::error!(
                "checker: block {cur:#x} of class {} found on list {class}",
                header.class()
            );
            return Err(invariant("I4: a block's list must match class(b)"));
        }

        let next_off = unsafe { freelist::list_next(cur) };
        let next_addr = crate::arena::to_addr(base, next_off);
        let back = unsafe { freelist::list_prev(next_addr) };
        if crate::arena::to_addr(base, back) != cur {
            log::error!("checker: list {class} broken at {cur:#x}: prev(next(b)) != b");
            return Err(invariant("I5: list must be a proper circular doubly-linked list"));
        }

        seen += 1;
        if next_addr == head_addr {
            break;
        }
        if seen > bound {
            log::error!("checker: list {class} did not close after {bound} entries");
            return Err(invariant("I5: list must be circular"));
        }
        cur = next_addr;
    }

    Ok(seen)
}

fn invariant(detail: &'static str) -> AllocError {
    AllocError::InvariantViolation { detail }
}
