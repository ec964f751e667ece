//! placement.rs - Placement engine (§4.5)
//!
//! Generalizes the teacher's `FreeList::{allocate, deallocate}` (single list,
//! split on oversize, footer-assisted backward coalesce) to the segregated,
//! boundary-tag-eliding design of §3/§4: `searchlist`'s bounded best-fit with
//! lookahead, `carve`'s split, and free's three-way coalesce.

use crate::arena::{self, ArenaProvider};
use crate::block::{self, Header, HeaderFlags};
use crate::config;
use crate::error::AllocError;
use crate::freelist::{self, Heads};

/// Owns one allocator's entire state: the arena, the sentinel addresses, and
/// the 13 free-list heads. Per §9's design note, this is an explicit context
/// rather than a singleton; the crate's `#[global_allocator]` wrapper holds
/// exactly one of these behind a `spin::Mutex`.
pub struct AllocatorContext<A: ArenaProvider> {
    arena: A,
    base: usize,
    prolog: usize,
    epilog: usize,
    heads: Heads,
}

impl<A: ArenaProvider> AllocatorContext<A> {
    pub const fn new(arena: A) -> Self {
        Self {
            arena,
            base: 0,
            prolog: 0,
            epilog: 0,
            heads: [arena::NULL_OFFSET; config::NUM_CLASSES],
        }
    }

    /// Arms the allocator: installs prolog+epilog in the first 16 bytes of
    /// the arena (§6). Re-arming re-zeros the list heads and re-establishes
    /// the sentinels; any payloads from a prior init are logically
    /// invalidated.
    pub fn init(&mut self) -> Result<(), AllocError> {
        let start = self.arena.extend(16).ok_or(AllocError::ArenaExhausted)?;
        self.base = start;

        // Layout of the first 16 bytes: [pad 4][prolog header 4]
        // [bootstrap footer mirror 4][epilog header 4]. The mirror word lets
        // block_prev on the very first real block (which will overwrite the
        // epilog slot) resolve back to the prolog via the normal footer path,
        // since the prolog/epilog sentinels are too small to carry PFIXED
        // hints of their own.
        let pad = self.base;
        self.prolog = self.base + 4;
        let footer_mirror = self.base + 8;
        self.epilog = self.base + 12;

        unsafe {
            block::write_word(pad, 0);
            let prolog_header = Header::new(0, HeaderFlags::ALLOC);
            block::write_header(self.prolog, prolog_header);
            block::write_word(footer_mirror, prolog_header.raw());
            block::write_header(self.epilog, Header::new(0, HeaderFlags::ALLOC));
        }

        self.heads = freelist::new_heads();
        log::debug!("heap initialized: base={:#x}", self.base);
        Ok(())
    }

    fn lo(&self) -> usize {
        self.base
    }

    fn hi(&self) -> usize {
        self.arena.hi()
    }

    /// §4.5.1: allocate.
    pub fn allocate(&mut self, requested: usize) -> Result<usize, AllocError> {
        self.run_checked(|this| this.allocate_inner(requested))
    }

    fn allocate_inner(&mut self, requested: usize) -> Result<usize, AllocError> {
        let size = config::normalize_size(requested).ok_or(AllocError::InvalidSize)?;
        let class = config::class_of(size);

        if let Some(victim) = unsafe { self.searchlist(class, size) } {
            return Ok(unsafe { self.commit_victim(victim, size) });
        }
        if class != config::CATCH_ALL_CLASS {
            if let Some(victim) = unsafe { self.searchlist(config::CATCH_ALL_CLASS, size) } {
                return Ok(unsafe { self.commit_victim(victim, size) });
            }
        }
        unsafe { self.extend_and_allocate(size) }
    }

    /// §4.5.1 step 4: grow the arena by `size + 8` bytes and carve the new
    /// block straight out of the extension.
    ///
    /// # Safety
    /// Must only be called with `self` fully initialized.
    unsafe fn extend_and_allocate(&mut self, size: usize) -> Result<usize, AllocError> {
        let needed = size + config::DWORD_SIZE;
        if self.arena.size() + needed > config::LIMIT {
            log::warn!("arena exhausted: {needed} more bytes would exceed config::LIMIT");
            return Err(AllocError::ArenaExhausted);
        }

        let old_epilog = self.epilog;
        let inherited = unsafe { block::read_header(old_epilog) }.predecessor_hint();

        self.arena.extend(needed).ok_or(AllocError::ArenaExhausted)?;
        log::debug!("arena extended by {needed} bytes, now {} bytes", self.arena.size());

        let new_block = old_epilog;
        let mut flags = inherited;
        flags.insert(HeaderFlags::ALLOC);
        unsafe { block::write_header(new_block, Header::new(size, flags)) };

        let new_epilog = new_block + size + config::DWORD_SIZE;
        unsafe { block::write_header(new_epilog, Header::new(0, HeaderFlags::ALLOC)) };
        self.epilog = new_epilog;

        unsafe { block::mark(new_block) };
        Ok(new_block + 4)
    }

    /// §4.5.2: `searchlist`. Returns the header address of a victim already
    /// removed from its list, or `None` on a miss.
    ///
    /// # Safety
    /// `class` must be a valid index into `self.heads`.
    unsafe fn searchlist(&mut self, class: usize, request: usize) -> Option<usize> {
        let head = self.heads[class];
        if head == arena::NULL_OFFSET {
            return None;
        }
        let head_addr = arena::to_addr(self.base, head);

        if class < config::BEST_FIT_THRESHOLD {
            unsafe { freelist::delete(self.base, &mut self.heads, class, head_addr) };
            return Some(head_addr);
        }

        let mut best_addr = None;
        let mut best_size = usize::MAX;
        let mut since_first_fit: Option<usize> = None;
        let mut cur = head_addr;

        loop {
            let size = unsafe { block::read_header(cur) }.size();
            if size >= request && size < best_size {
                best_addr = Some(cur);
                best_size = size;
                if since_first_fit.is_none() {
                    since_first_fit = Some(0);
                }
            }
            if let Some(n) = since_first_fit {
                if n >= config::LOOKAHEAD {
                    break;
                }
                since_first_fit = Some(n + 1);
            }

            let next_off = unsafe { freelist::list_next(cur) };
            let next_addr = arena::to_addr(self.base, next_off);
            if next_addr == head_addr {
                break;
            }
            cur = next_addr;
        }

        let victim = best_addr?;
        unsafe { freelist::delete(self.base, &mut self.heads, class, victim) };
        Some(victim)
    }

    /// Carves `request` bytes out of a free block already removed from its
    /// list, splitting off a free remainder when the leftover is large
    /// enough to host one (§4.5.2/§4.5.3), else handing over the whole
    /// block (§4.5.4).
    ///
    /// # Safety
    /// `victim` must be a free block's header address, not on any list.
    unsafe fn commit_victim(&mut self, victim: usize, request: usize) -> usize {
        let victim_header = unsafe { block::read_header(victim) };
        let victim_size = victim_header.size();
        let preserved = victim_header.predecessor_hint();

        if victim_size >= request + config::MIN_PAYLOAD + config::DWORD_SIZE {
            unsafe { self.carve(victim, victim_size, preserved, request) }
        } else {
            let mut flags = preserved;
            flags.insert(HeaderFlags::ALLOC);
            unsafe { block::write_header(victim, Header::new(victim_size, flags)) };
            unsafe { block::mark(victim) };
            victim + 4
        }
    }

    /// §4.5.3: split a victim of `victim_size` bytes into a `request`-byte
    /// allocated low part and a free high remainder, per-block hint bits
    /// preserved and propagated.
    ///
    /// # Safety
    /// `victim` must not be on any list; `victim_size` must be its current
    /// (pre-split) payload size.
    unsafe fn carve(
        &mut self,
        victim: usize,
        victim_size: usize,
        low_hint: HeaderFlags,
        request: usize,
    ) -> usize {
        let low = victim;
        let mut low_flags = low_hint;
        low_flags.insert(HeaderFlags::ALLOC);
        unsafe { block::write_header(low, Header::new(request, low_flags)) };

        // high's header must exist (size + ALLOC=0) before mark(low) runs:
        // mark's footer-less branch reads the successor's header to OR in
        // hint bits, and would otherwise read whatever bytes happened to be
        // at that address.
        let high = unsafe { block::next_addr(low) };
        let high_size = victim_size - request - config::DWORD_SIZE;
        unsafe { block::write_header(high, Header::new(high_size, HeaderFlags::empty())) };

        unsafe { block::mark(low) };
        unsafe { block::mark(high) };
        unsafe { freelist::add(self.base, &mut self.heads, high) };

        low + 4
    }

    /// §4.5.5: free.
    pub fn free(&mut self, addr: usize) {
        if addr == 0 {
            return;
        }
        let _ = self.run_checked(|this| {
            unsafe { this.free_inner(addr) };
            Ok(())
        });
    }

    /// # Safety
    /// `addr` must be a pointer previously returned by `allocate`/
    /// `reallocate` and not yet freed.
    unsafe fn free_inner(&mut self, addr: usize) {
        let b = addr - 4;
        let p = unsafe { block::prev_addr(b) };
        let s = unsafe { block::next_addr(b) };
        let header = unsafe { block::read_header(b) };
        unsafe { block::write_header(b, header.with_alloc(false)) };

        let p_free = p != self.prolog && unsafe { block::read_header(p) }.is_free();
        let s_free = s != self.epilog && unsafe { block::read_header(s) }.is_free();

        match (p_free, s_free) {
            (false, false) => unsafe { freelist::add(self.base, &mut self.heads, b) },
            (false, true) => {
                unsafe { freelist::remove(self.base, &mut self.heads, s) };
                let new_size = header.size() + unsafe { block::read_header(s) }.size()
                    + config::DWORD_SIZE;
                let hint = header.predecessor_hint();
                unsafe { block::write_header(b, Header::new(new_size, hint)) };
                unsafe { block::mark(b) };
                unsafe { freelist::add(self.base, &mut self.heads, b) };
            }
            (true, false) => {
                unsafe { freelist::remove(self.base, &mut self.heads, p) };
                let p_header = unsafe { block::read_header(p) };
                let new_size = p_header.size() + header.size() + config::DWORD_SIZE;
                let hint = p_header.predecessor_hint();
                unsafe { block::write_header(p, Header::new(new_size, hint)) };
                unsafe { block::mark(p) };
                unsafe { freelist::add(self.base, &mut self.heads, p) };
            }
            (true, true) => {
                unsafe { freelist::remove(self.base, &mut self.heads, p) };
                unsafe { freelist::remove(self.base, &mut self.heads, s) };
                let p_header = unsafe { block::read_header(p) };
                let s_size = unsafe { block::read_header(s) }.size();
                let new_size = p_header.size() + header.size() + s_size + 2 * config::DWORD_SIZE;
                let hint = p_header.predecessor_hint();
                unsafe { block::write_header(p, Header::new(new_size, hint)) };
                unsafe { block::mark(p) };
                unsafe { freelist::add(self.base, &mut self.heads, p) };
            }
        }
    }

    /// §4.5.6: reallocate.
    pub fn reallocate(&mut self, addr: usize, requested: usize) -> Result<usize, AllocError> {
        if requested == 0 {
            self.free(addr);
            return Ok(0);
        }
        if addr == 0 {
            return self.allocate(requested);
        }
        self.run_checked(|this| this.reallocate_inner(addr, requested))
    }

    fn reallocate_inner(&mut self, addr: usize, requested: usize) -> Result<usize, AllocError> {
        let newsize = config::normalize_size(requested).ok_or(AllocError::InvalidSize)?;
        let b = addr - 4;
        let header = unsafe { block::read_header(b) };
        let oldsize = header.size();

        if newsize == oldsize {
            return Ok(addr);
        }
        if newsize < oldsize {
            return Ok(addr);
        }

        let p = unsafe { block::prev_addr(b) };
        let s = unsafe { block::next_addr(b) };
        let p_free = p != self.prolog && unsafe { block::read_header(p) }.is_free();
        let s_free = s != self.epilog && unsafe { block::read_header(s) }.is_free();
        let s_size = if s_free { unsafe { block::read_header(s) }.size() } else { 0 };
        let p_size = if p_free { unsafe { block::read_header(p) }.size() } else { 0 };

        let succ_only_fits = s_free && oldsize + s_size + config::DWORD_SIZE >= newsize;
        let both_fit =
            s_free && p_free && p_size + oldsize + s_size + 2 * config::DWORD_SIZE >= newsize;
        let pred_only_fits = p_free && p_size + oldsize + config::DWORD_SIZE >= newsize;

        if succ_only_fits {
            unsafe { freelist::remove(self.base, &mut self.heads, s) };
            let combined = oldsize + s_size + config::DWORD_SIZE;
            let hint = header.predecessor_hint();
            return Ok(unsafe { self.commit_resized(b, combined, hint, newsize) });
        }

        if both_fit {
            unsafe { freelist::remove(self.base, &mut self.heads, p) };
            unsafe { freelist::remove(self.base, &mut self.heads, s) };
            let p_header = unsafe { block::read_header(p) };
            let combined = p_size + oldsize + s_size + 2 * config::DWORD_SIZE;
            let hint = p_header.predecessor_hint();
            let copy_len = core::cmp::min(oldsize, newsize);
            unsafe { core::ptr::copy(addr as *const u8, (p + 4) as *mut u8, copy_len) };
            return Ok(unsafe { self.commit_resized(p, combined, hint, newsize) });
        }

        if pred_only_fits {
            unsafe { freelist::remove(self.base, &mut self.heads, p) };
            let p_header = unsafe { block::read_header(p) };
            let combined = p_size + oldsize + config::DWORD_SIZE;
            let hint = p_header.predecessor_hint();
            let copy_len = core::cmp::min(oldsize, newsize);
            unsafe { core::ptr::copy(addr as *const u8, (p + 4) as *mut u8, copy_len) };
            return Ok(unsafe { self.commit_resized(p, combined, hint, newsize) });
        }

        let new_addr = self.allocate_inner(requested)?;
        let copy_len = core::cmp::min(oldsize, newsize);
        unsafe { core::ptr::copy(addr as *const u8, new_addr as *mut u8, copy_len) };
        unsafe { self.free_inner(addr) };
        Ok(new_addr)
    }

    /// Commits an in-place-grown block (already absorbed its free
    /// neighbor(s), not yet on any list) to `request` bytes, splitting off
    /// the leftover when it's large enough to host a block of its own.
    ///
    /// # Safety
    /// `addr` must be a block header not currently on any list, with
    /// `combined_size` matching the bytes physically available to it.
    unsafe fn commit_resized(
        &mut self,
        addr: usize,
        combined_size: usize,
        hint: HeaderFlags,
        request: usize,
    ) -> usize {
        if combined_size >= request + config::MIN_PAYLOAD + config::DWORD_SIZE {
            unsafe { self.carve(addr, combined_size, hint, request) }
        } else {
            let mut flags = hint;
            flags.insert(HeaderFlags::ALLOC);
            unsafe { block::write_header(addr, Header::new(combined_size, flags)) };
            unsafe { block::mark(addr) };
            addr + 4
        }
    }

    /// §4.5.7: zero-allocate.
    pub fn calloc(&mut self, count: usize, size: usize) -> Result<usize, AllocError> {
        let total = count.checked_mul(size).ok_or(AllocError::Overflow)?;
        let addr = self.allocate(total)?;
        unsafe { core::ptr::write_bytes(addr as *mut u8, 0, total) };
        Ok(addr)
    }

    /// Runs the debug-only consistency checker before and after `f`,
    /// matching the contract that every public operation brackets itself
    /// with a checker pass (§4.5.8).
    fn run_checked<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, AllocError>,
    ) -> Result<T, AllocError> {
        #[cfg(debug_assertions)]
        self.assert_consistent("before operation");
        let result = f(self);
        #[cfg(debug_assertions)]
        self.assert_consistent("after operation");
        result
    }

    #[cfg(debug_assertions)]
    fn assert_consistent(&self, when: &str) {
        let result = unsafe {
            crate::checker::check(self.base, self.prolog, self.epilog, &self.heads, self.lo(), self.hi())
        };
        if let Err(e) = result {
            log::error!("heap corrupted ({when}): {e}");
            panic!("heap corrupted ({when}): {e}");
        }
    }

    /// Runs the consistency checker unconditionally, for use by tests that
    /// want to assert at the point of corruption regardless of build
    /// profile (§8).
    #[cfg(test)]
    pub fn check(&self) -> Result<(), AllocError> {
        unsafe {
            crate::checker::check(self.base, self.prolog, self.epilog, &self.heads, self.lo(), self.hi())
        }
    }
}
