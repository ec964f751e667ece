//! freelist.rs - Segregated free-list index (§4.4)
//!
//! Generalizes the teacher's single sorted `FreeList`/`FreeListNode` linked
//! list into 13 offset-linked circular lists, one per size class. A free
//! block's payload holds its own `prev_off`/`next_off` (no separate node
//! struct the way the teacher allocates one); list heads are stored as
//! offsets, with `arena::NULL_OFFSET` meaning "empty".

use crate::arena::{self, NULL_OFFSET};
use crate::block;
use crate::config::NUM_CLASSES;

pub type Heads = [u32; NUM_CLASSES];

pub fn new_heads() -> Heads {
    [NULL_OFFSET; NUM_CLASSES]
}

/// # Safety
/// `addr` must be the header address of a free block within the arena.
unsafe fn get_prev(addr: usize) -> u32 {
    unsafe { block::read_word(addr + 4) }
}

/// # Safety
/// `addr` must be the header address of a free block within the arena.
unsafe fn get_next(addr: usize) -> u32 {
    unsafe { block::read_word(addr + 8) }
}

/// # Safety
/// `addr` must be the header address of a free block within the arena.
unsafe fn set_prev(addr: usize, off: u32) {
    unsafe { block::write_word(addr + 4, off) }
}

/// # Safety
/// `addr` must be the header address of a free block within the arena.
unsafe fn set_next(addr: usize, off: u32) {
    unsafe { block::write_word(addr + 8, off) }
}

/// Splices `block_addr` into `heads[class]`, LIFO (new block becomes head).
///
/// # Safety
/// `block_addr` must be a free block's header address, not currently on any
/// list.
pub unsafe fn insert(base: usize, heads: &mut Heads, class: usize, block_addr: usize) {
    let off = arena::to_off(base, block_addr);
    let head = heads[class];
    if head == NULL_OFFSET {
        unsafe {
            set_prev(block_addr, off);
            set_next(block_addr, off);
        }
    } else {
        let head_addr = arena::to_addr(base, head);
        let tail_off = unsafe { get_prev(head_addr) };
        let tail_addr = arena::to_addr(base, tail_off);
        unsafe {
            set_next(tail_addr, off);
            set_prev(block_addr, tail_off);
            set_next(block_addr, head);
            set_prev(head_addr, off);
        }
    }
    heads[class] = off;
}

/// Removes `block_addr` from `heads[class]`.
///
/// # Safety
/// `block_addr` must currently be on `heads[class]`.
pub unsafe fn delete(base: usize, heads: &mut Heads, class: usize, block_addr: usize) {
    let off = arena::to_off(base, block_addr);
    let prev_off = unsafe { get_prev(block_addr) };
    let next_off = unsafe { get_next(block_addr) };
    if prev_off == off && next_off == off {
        heads[class] = NULL_OFFSET;
        return;
    }
    let prev_addr = arena::to_addr(base, prev_off);
    let next_addr = arena::to_addr(base, next_off);
    unsafe {
        set_next(prev_addr, next_off);
        set_prev(next_addr, prev_off);
    }
    if heads[class] == off {
        heads[class] = next_off;
    }
}

/// `insert(b, lists[class(b)])`.
///
/// # Safety
/// `b` must be a free block's header address with a correctly written size,
/// not currently on any list.
pub unsafe fn add(base: usize, heads: &mut Heads, b: usize) {
    let class = unsafe { block::read_header(b) }.class();
    unsafe { insert(base, heads, class, b) };
}

/// `delete(b, lists[class(b)])`.
///
/// # Safety
/// `b` must currently be on `lists[class(b)]`.
pub unsafe fn remove(base: usize, heads: &mut Heads, b: usize) {
    let class = unsafe { block::read_header(b) }.class();
    unsafe { delete(base, heads, class, b) };
}

/// Offset of the block following `block_addr` within its own list (not the
/// physical heap).
///
/// # Safety
/// `block_addr` must be on a free list.
pub unsafe fn list_next(block_addr: usize) -> u32 {
    unsafe { get_next(block_addr) }
}

/// Offset of the block preceding `block_addr` within its own list.
///
/// # Safety
/// `block_addr` must be on a free list.
pub unsafe fn list_prev(block_addr: usize) -> u32 {
    unsafe { get_prev(block_addr) }
}
