//! error.rs - Allocator diagnostics (§4.7, §7)
//!
//! The public allocation API stays `GlobalAlloc`-compatible (raw pointers,
//! null on failure); `AllocError` exists alongside it for logging and for
//! host harnesses that want to know *why* a null came back.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// `extend` failed, or growing the arena would exceed `config::LIMIT`.
    ArenaExhausted,
    /// Requested size normalized to something the engine can't service
    /// (zero, or overflow during `calloc`'s `count * size`).
    InvalidSize,
    /// `count * size` overflowed in `calloc`.
    Overflow,
    /// The consistency checker found a violated invariant. Only ever
    /// constructed by `checker::check`, which itself only compiles under
    /// `debug_assertions` or `cfg(test)` (§4.5.8).
    InvariantViolation { detail: &'static str },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::ArenaExhausted => write!(f, "arena exhausted (at config::LIMIT)"),
            AllocError::InvalidSize => write!(f, "invalid allocation size"),
            AllocError::Overflow => write!(f, "size computation overflowed"),
            AllocError::InvariantViolation { detail } => {
                write!(f, "heap invariant violated: {detail}")
            }
        }
    }
}

impl core::error::Error for AllocError {}
