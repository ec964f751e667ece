//! block.rs - Block metadata codec (§4.2)
//!
//! Generalizes the teacher's `FreeListNode`/footer read-write logic (a
//! `usize`-sized Rust struct header written with `ptr::write`) down to the
//! packed 4-byte bitfield header this design calls for: one raw `u32` word
//! carries size, allocation state, and the two previous-block-class hint
//! bits that let classes 0 and 1 go without a footer.

use crate::config;
use bitflags::bitflags;

bitflags! {
    /// The low 3 bits of a block header. The remaining 29 bits (masked by
    /// `SIZE_MASK`) hold the payload size.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct HeaderFlags: u32 {
        /// 1 if allocated, 0 if free.
        const ALLOC = 0b001;
        /// 1 iff the physical predecessor is a footer-less fixed-class block.
        const PFIXED = 0b010;
        /// Valid only when PFIXED is set: 0 ⇒ predecessor is class 0 (16-byte
        /// total block), 1 ⇒ predecessor is class 1 (24-byte total block).
        const SZCLASS = 0b100;
    }
}

pub const SIZE_MASK: u32 = !0b111;

/// A decoded block header. Headers are 4 bytes wide and stored at
/// `payload_address - 4`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Header(u32);

impl Header {
    pub fn new(size: usize, flags: HeaderFlags) -> Self {
        debug_assert_eq!(size & 0b111, 0, "block sizes are always 8-aligned");
        Self((size as u32 & SIZE_MASK) | flags.bits())
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    pub fn flags(self) -> HeaderFlags {
        HeaderFlags::from_bits_truncate(self.0 & !SIZE_MASK)
    }

    pub fn is_alloc(self) -> bool {
        self.flags().contains(HeaderFlags::ALLOC)
    }

    pub fn is_free(self) -> bool {
        !self.is_alloc()
    }

    pub fn class(self) -> usize {
        config::class_of(self.size())
    }

    /// Returns a copy with `size` replaced, flags preserved.
    pub fn with_size(self, size: usize) -> Self {
        Self::new(size, self.flags())
    }

    /// Returns a copy with the ALLOC bit set to `alloc`.
    pub fn with_alloc(self, alloc: bool) -> Self {
        let mut flags = self.flags();
        flags.set(HeaderFlags::ALLOC, alloc);
        Self::new(self.size(), flags)
    }

    /// Returns a copy with PFIXED/SZCLASS cleared (successor has a footer).
    pub fn without_pfixed_hint(self) -> Self {
        let mut flags = self.flags();
        flags.remove(HeaderFlags::PFIXED | HeaderFlags::SZCLASS);
        Self(self.0 & SIZE_MASK | flags.bits())
    }

    /// Returns a copy with PFIXED set and SZCLASS reflecting `fixed_class`
    /// (must be 0 or 1).
    pub fn with_pfixed_hint(self, fixed_class: usize) -> Self {
        let mut flags = self.flags();
        flags.insert(HeaderFlags::PFIXED);
        flags.set(HeaderFlags::SZCLASS, fixed_class == 1);
        Self(self.0 & SIZE_MASK | flags.bits())
    }

    /// Just the PFIXED/SZCLASS bits, used to carry a block's own "my
    /// predecessor is class N" hint across a resize that doesn't change
    /// that predecessor relationship (split, coalesce, carve).
    pub fn predecessor_hint(self) -> HeaderFlags {
        self.flags() & (HeaderFlags::PFIXED | HeaderFlags::SZCLASS)
    }
}

/// Reads the raw 32-bit word at `addr`.
///
/// # Safety
/// `addr` must be within the arena and 4-byte aligned.
#[inline]
pub unsafe fn read_word(addr: usize) -> u32 {
    unsafe { (addr as *const u32).read() }
}

/// Writes the raw 32-bit word at `addr`.
///
/// # Safety
/// `addr` must be within the arena and 4-byte aligned.
#[inline]
pub unsafe fn write_word(addr: usize, value: u32) {
    unsafe { (addr as *mut u32).write(value) }
}

/// Reads the header at `addr`.
///
/// # Safety
/// `addr` must be a valid block header address within the arena.
#[inline]
pub unsafe fn read_header(addr: usize) -> Header {
    Header::from_raw(unsafe { read_word(addr) })
}

/// Writes `header` at `addr`.
///
/// # Safety
/// `addr` must be a valid block header address within the arena.
#[inline]
pub unsafe fn write_header(addr: usize, header: Header) {
    unsafe { write_word(addr, header.raw()) }
}

/// The offset from a footer-less block's header to its successor's header,
/// keyed by which fixed class the block belongs to (0 ⇒ 16, 1 ⇒ 24), per
/// §3/§4.2.
pub fn fixed_class_span(fixed_class: usize) -> usize {
    match fixed_class {
        0 => 16,
        1 => 24,
        _ => unreachable!("I6: PFIXED only ever encodes class 0 or 1"),
    }
}

/// `b + size(b) + 8`, the formula that locates the block immediately after
/// `b`, valid for any block whose header has already been written (including
/// `b == prolog`; callers wishing sentinel-aware null termination should use
/// `walk::block_next`).
///
/// # Safety
/// `b` must be a valid block header address with a correctly written size.
#[inline]
pub unsafe fn next_addr(b: usize) -> usize {
    let h = unsafe { read_header(b) };
    b + h.size() + config::DWORD_SIZE
}

/// Locates the block immediately before `b` using either the PFIXED hint
/// bits or the footer word immediately preceding `b`'s header, per §4.2.
/// Valid for any non-prolog block; callers walking the full heap should use
/// `walk::block_prev` for sentinel-aware termination.
///
/// # Safety
/// `b` must be a valid, non-prolog block header address.
#[inline]
pub unsafe fn prev_addr(b: usize) -> usize {
    let h = unsafe { read_header(b) };
    let flags = h.flags();
    if flags.contains(HeaderFlags::PFIXED) {
        let fixed_class = if flags.contains(HeaderFlags::SZCLASS) { 1 } else { 0 };
        b - fixed_class_span(fixed_class)
    } else {
        let footer = unsafe { read_word(b - config::WORD_SIZE) };
        let prev_size = (footer & SIZE_MASK) as usize;
        b - (prev_size + config::DWORD_SIZE)
    }
}

/// Writes bookkeeping after `b`'s header has been fully set (size, ALLOC,
/// and `b`'s own predecessor hint bits), per §4.2's `mark` operation:
/// either stamps the successor's PFIXED/SZCLASS hint bits (footer-less
/// classes), or writes `b`'s footer and clears those hint bits on the
/// successor. Either way touches only the successor's hint bits, never its
/// size or ALLOC bit.
///
/// # Safety
/// `b`'s header must already carry its final size; `next_addr(b)` must be a
/// valid header address (a real block or the epilog).
pub unsafe fn mark(b: usize) {
    let h = unsafe { read_header(b) };
    let succ = unsafe { next_addr(b) };
    if config::is_fixed_class(h.class()) {
        let succ_header = unsafe { read_header(succ) };
        unsafe { write_header(succ, succ_header.with_pfixed_hint(h.class())) };
    } else {
        let footer_addr = b + config::WORD_SIZE + h.size();
        unsafe { write_word(footer_addr, h.raw()) };
        let succ_header = unsafe { read_header(succ) };
        unsafe { write_header(succ, succ_header.without_pfixed_hint()) };
    }
}
