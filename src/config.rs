//! config.rs - Tunables for the segregated-fit allocator
//!
//! Mirrors the teacher's `memory/config.rs` in spirit: a single module of named
//! constants instead of literals scattered through the engine, but the values
//! here describe the allocator's own layout rather than a Raspberry Pi address
//! map.

/// Hard cap on arena size (bytes), ~100 MiB. Matches the reference harness this
/// design was distilled from; an allocation that would grow the arena past this
/// fails with `AllocError::ArenaExhausted` rather than growing further.
pub const LIMIT: usize = 0x640_0000;

/// Word size in bytes. Headers and footers are one word wide.
pub const WORD_SIZE: usize = 4;

/// A block's header-plus-footer overhead when both are present.
pub const DWORD_SIZE: usize = 8;

/// Smallest payload the allocator will ever hand out. Must be at least large
/// enough to hold `prev_off`/`next_off` (two `u32`s) for a free block's
/// intra-list links.
pub const MIN_PAYLOAD: usize = 8;

/// Size of a sentinel header (prolog/epilog carry no payload or footer).
pub const SENTINEL_SIZE: usize = 4;

/// How many further list entries `searchlist` examines past the first fit
/// before committing to a best-fit candidate. Exposed as a tunable rather than
/// derived; a companion variant of the design this crate follows used 5.
pub const LOOKAHEAD: usize = 10;

/// Number of segregated size classes.
pub const NUM_CLASSES: usize = 13;

/// Index of the catch-all class (1001+ byte payloads, and the fallback search
/// target when a size-specific list misses).
pub const CATCH_ALL_CLASS: usize = NUM_CLASSES - 1;

/// Lowest class index for which `searchlist` uses bounded best-fit instead of
/// taking the list head immediately. Classes below this hold uniform or
/// near-uniform block sizes, so the first entry already fits.
pub const BEST_FIT_THRESHOLD: usize = 7;

/// Upper bound (inclusive) on the 8-aligned payload size stored in each class,
/// per §3's size-class table. The last entry is a sentinel catch-all bound.
const CLASS_BOUNDS: [usize; NUM_CLASSES] = [
    8, 16, 24, 36, 40, 48, 56, 72, 104, 304, 504, 1000, usize::MAX,
];

/// Maps an already-normalized (8-aligned) payload size to its size class.
///
/// The two fixed classes (0, 1) are footer-less; see `block::mark`.
pub fn class_of(payload_size: usize) -> usize {
    for (class, &bound) in CLASS_BOUNDS.iter().enumerate() {
        if payload_size <= bound {
            return class;
        }
    }
    CATCH_ALL_CLASS
}

/// True for the two classes that elide their footer (§3, §4.2).
pub fn is_fixed_class(class: usize) -> bool {
    class == 0 || class == 1
}

/// Normalizes a raw allocation request into an 8-aligned payload size, per
/// §4.5.1 step 1. Returns `None` for requests of 0 (the caller must reject
/// these rather than allocate a degenerate block).
pub fn normalize_size(requested: usize) -> Option<usize> {
    if requested == 0 {
        return None;
    }
    if requested <= 12 {
        Some(8)
    } else if requested <= 20 {
        Some(16)
    } else {
        Some((requested + (DWORD_SIZE - 1)) & !(DWORD_SIZE - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_boundaries() {
        assert_eq!(class_of(8), 0);
        assert_eq!(class_of(16), 1);
        assert_eq!(class_of(24), 2);
        assert_eq!(class_of(36), 3);
        assert_eq!(class_of(40), 4);
        assert_eq!(class_of(1000), 11);
        assert_eq!(class_of(1008), 12);
        assert_eq!(class_of(usize::MAX), 12);
    }

    #[test]
    fn normalize_remaps_small_requests() {
        assert_eq!(normalize_size(0), None);
        assert_eq!(normalize_size(1), Some(8));
        assert_eq!(normalize_size(12), Some(8));
        assert_eq!(normalize_size(13), Some(16));
        assert_eq!(normalize_size(20), Some(16));
        assert_eq!(normalize_size(21), Some(24));
        assert_eq!(normalize_size(25), Some(32));
    }
}
