//! Shared, reference-counted byte buffers.
//!
//! Every work item addresses its buffers by untyped byte range, exactly
//! as the original's `void *buf` arithmetic does. Since items are
//! scheduled well before they run (the progress engine may dispatch a
//! `Send` long after the call that scheduled it returns), the core
//! cannot borrow a caller's slice across that gap — it needs shared
//! ownership instead. [`SharedBuffer`] is the caller-held handle;
//! [`BufHandle`] is the `(offset, len)` view into it that work items
//! actually carry, the Rust analogue of the original's raw pointer
//! arithmetic into a single allocation.

use std::cell::RefCell;
use std::rc::Rc;

/// A caller-owned buffer that the engine can read from or write into
/// across the lifetime of a collective call.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    /// Wraps an existing byte vector.
    pub fn new(bytes: Vec<u8>) -> Self {
        SharedBuffer { bytes: Rc::new(RefCell::new(bytes)) }
    }

    /// Allocates a zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        SharedBuffer::new(vec![0u8; len])
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot copy of the current contents, for inspection by a
    /// caller once a collective has completed.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }

    /// A view over the whole buffer.
    pub fn handle(&self) -> BufHandle {
        let len = self.len();
        BufHandle { bytes: Rc::clone(&self.bytes), offset: 0, len }
    }

    /// A view over `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> BufHandle {
        self.handle().sub(offset, len)
    }
}

/// A `(offset, len)` view into a [`SharedBuffer`]'s storage.
///
/// Cheap to clone; clones share the same underlying allocation. This is
/// the type work items (`Send`, `Recv`, `Reduce`, `Copy`) carry for
/// their buffers.
#[derive(Debug, Clone)]
pub struct BufHandle {
    bytes: Rc<RefCell<Vec<u8>>>,
    offset: usize,
    len: usize,
}

impl BufHandle {
    /// Wraps a freshly allocated, zero-filled buffer as a standalone
    /// handle (not associated with a caller-visible [`SharedBuffer`]).
    pub fn zeroed(len: usize) -> Self {
        BufHandle { bytes: Rc::new(RefCell::new(vec![0u8; len])), offset: 0, len }
    }

    /// Number of bytes this view covers.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this view covers zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A sub-view `len` bytes long, `rel_offset` bytes into this view.
    pub fn sub(&self, rel_offset: usize, len: usize) -> BufHandle {
        assert!(rel_offset + len <= self.len, "buffer sub-view out of range");
        BufHandle { bytes: Rc::clone(&self.bytes), offset: self.offset + rel_offset, len }
    }

    /// Runs `f` over an immutable view of this handle's bytes.
    pub fn with_slice<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let bytes = self.bytes.borrow();
        f(&bytes[self.offset..self.offset + self.len])
    }

    /// Runs `f` over a mutable view of this handle's bytes.
    pub fn with_slice_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut bytes = self.bytes.borrow_mut();
        f(&mut bytes[self.offset..self.offset + self.len])
    }
}

/// Copies `nbytes` from `src` into `dst`.
///
/// Goes through an intermediate copy rather than borrowing both views
/// directly, so that this works even when `src` and `dst` are views
/// into the same underlying [`SharedBuffer`] (the scatter planner's
/// root-relative reorder does exactly this).
pub(crate) fn copy_bytes(src: &BufHandle, dst: &BufHandle, nbytes: usize) {
    let staged = src.with_slice(|s| s[..nbytes].to_vec());
    dst.with_slice_mut(|d| d[..nbytes].copy_from_slice(&staged));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_share_storage() {
        let buf = SharedBuffer::new(vec![1, 2, 3, 4]);
        let a = buf.slice(0, 2);
        let b = buf.slice(2, 2);
        a.with_slice_mut(|s| s[0] = 9);
        assert_eq!(buf.snapshot(), vec![9, 2, 3, 4]);
        assert_eq!(b.with_slice(|s| s.to_vec()), vec![3, 4]);
    }

    #[test]
    fn copy_within_same_buffer_does_not_panic() {
        let buf = SharedBuffer::new(vec![1, 2, 3, 4]);
        let src = buf.slice(0, 2);
        let dst = buf.slice(2, 2);
        copy_bytes(&src, &dst, 2);
        assert_eq!(buf.snapshot(), vec![1, 2, 1, 2]);
    }
}
