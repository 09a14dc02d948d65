//! Bump allocator over one preallocated block.
//!
//! Allocations hand out [`Span`]s (offset + length into the block) rather
//! than pointers; bytes are reached through [`Arena::bytes`] /
//! [`Arena::bytes_mut`]. The block is word-backed, so any span starting at a
//! multiple of 4 can be viewed as `u32` words.
//!
//! `reset` rewinds the cursor in O(1). Spans issued before a reset must not
//! be used afterwards; only [`Arena::calloc`] guarantees zeroed memory.

use crate::errors::{PipeDbError, Result};
use bytemuck::Pod;
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    #[inline]
    pub fn end(&self) -> usize { self.offset + self.len }
    #[inline]
    pub fn range(&self) -> Range<usize> { self.offset..self.end() }
}

pub struct Arena {
    block: Box<[u32]>,
    top: usize,
}

impl Arena {
    /// Capacity is rounded up to a whole number of 32-bit words.
    pub fn with_capacity(cap: usize) -> Self {
        let words = cap.div_ceil(4);
        Self { block: vec![0u32; words].into_boxed_slice(), top: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize { self.block.len() * 4 }
    #[inline]
    pub fn used(&self) -> usize { self.top }
    #[inline]
    pub fn remaining(&self) -> usize { self.capacity() - self.top }

    /// Reserve `size` bytes at the cursor. Contents are whatever the block held.
    pub fn alloc(&mut self, size: usize) -> Result<Span> {
        let end = self
            .top
            .checked_add(size)
            .filter(|&end| end <= self.capacity())
            .ok_or(PipeDbError::OutOfSpace { requested: size, remaining: self.remaining() })?;
        let span = Span { offset: self.top, len: size };
        self.top = end;
        Ok(span)
    }

    pub fn calloc(&mut self, size: usize) -> Result<Span> {
        let span = self.alloc(size)?;
        self.bytes_mut(span).fill(0);
        Ok(span)
    }

    pub fn reset(&mut self) { self.top = 0; }

    /// Move the cursor back to `mark`, discarding everything allocated after it.
    pub(crate) fn rewind_to(&mut self, mark: usize) {
        debug_assert!(mark <= self.top);
        self.top = mark.min(self.top);
    }

    pub fn copy_bytes(&mut self, src: &[u8]) -> Result<Span> {
        let span = self.alloc(src.len())?;
        self.bytes_mut(span).copy_from_slice(src);
        Ok(span)
    }

    pub fn copy_value<T: Pod>(&mut self, value: &T) -> Result<Span> {
        self.copy_bytes(bytemuck::bytes_of(value))
    }

    pub fn copy_slice<T: Pod>(&mut self, src: &[T]) -> Result<Span> {
        self.copy_bytes(bytemuck::cast_slice(src))
    }

    /// Copy `s` followed by a NUL. Returns the span (including the NUL) and
    /// the string length without it.
    pub fn copy_str(&mut self, s: &str) -> Result<(Span, usize)> {
        let span = self.alloc(s.len() + 1)?;
        let dst = self.bytes_mut(span);
        dst[..s.len()].copy_from_slice(s.as_bytes());
        dst[s.len()] = 0;
        Ok((span, s.len()))
    }

    /// Read a whole file straight into the arena.
    pub fn read_file(&mut self, path: impl AsRef<Path>) -> Result<Span> {
        let mut f = File::open(path.as_ref())?;
        let len = f.metadata()?.len() as usize;
        let span = self.alloc(len)?;
        f.read_exact(self.bytes_mut(span))?;
        Ok(span)
    }

    #[inline]
    pub fn bytes(&self, span: Span) -> &[u8] {
        debug_assert!(span.end() <= self.top, "stale span");
        &bytemuck::cast_slice::<u32, u8>(&self.block)[span.range()]
    }

    #[inline]
    pub fn bytes_mut(&mut self, span: Span) -> &mut [u8] {
        debug_assert!(span.end() <= self.top, "stale span");
        &mut bytemuck::cast_slice_mut::<u32, u8>(&mut self.block)[span.range()]
    }

    /// String stored at `span`, without a trailing NUL.
    pub fn str(&self, span: Span) -> Result<&str> {
        let bytes = self.bytes(span);
        let bytes = bytes.strip_suffix(&[0u8]).unwrap_or(bytes);
        std::str::from_utf8(bytes).map_err(|e| PipeDbError::parse(format!("arena string: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_pre_advance_offset() {
        let mut a = Arena::with_capacity(64);
        let s1 = a.alloc(10).unwrap();
        let s2 = a.alloc(6).unwrap();
        assert_eq!(s1, Span { offset: 0, len: 10 });
        assert_eq!(s2.offset, 10);
        assert_eq!(a.used(), 16);
        assert_eq!(a.remaining(), 48);
    }

    #[test]
    fn out_of_space_is_reported_and_cursor_kept() {
        let mut a = Arena::with_capacity(16);
        a.alloc(12).unwrap();
        match a.alloc(5) {
            Err(PipeDbError::OutOfSpace { requested, remaining }) => {
                assert_eq!(requested, 5);
                assert_eq!(remaining, 4);
            }
            other => panic!("expected OutOfSpace, got {other:?}"),
        }
        assert_eq!(a.used(), 12);
        assert!(a.alloc(4).is_ok());
        assert!(a.alloc(usize::MAX).is_err());
    }

    #[test]
    fn capacity_rounds_to_words() {
        assert_eq!(Arena::with_capacity(5).capacity(), 8);
    }

    #[test]
    fn calloc_after_reset_never_shows_old_bytes() {
        let mut a = Arena::with_capacity(32);
        a.copy_bytes(&[0xFF; 32]).unwrap();
        a.reset();
        assert_eq!(a.used(), 0);
        let s = a.calloc(32).unwrap();
        assert!(a.bytes(s).iter().all(|&b| b == 0));
    }

    #[test]
    fn typed_copies() {
        let mut a = Arena::with_capacity(64);
        let v = a.copy_value(&0x0102_0304u32).unwrap();
        assert_eq!(a.bytes(v), &0x0102_0304u32.to_ne_bytes());
        let s = a.copy_slice(&[1u16, 2, 3]).unwrap();
        assert_eq!(s.len, 6);
        let (cs, len) = a.copy_str("vert").unwrap();
        assert_eq!(len, 4);
        assert_eq!(cs.len, 5);
        assert_eq!(a.bytes(cs)[4], 0);
        assert_eq!(a.str(cs).unwrap(), "vert");
    }

    #[test]
    fn read_file_into_arena() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("m.json");
        std::fs::write(&p, b"{\"name\":\"x\"}").unwrap();
        let mut a = Arena::with_capacity(64);
        let s = a.read_file(&p).unwrap();
        assert_eq!(a.bytes(s), b"{\"name\":\"x\"}");
        assert!(a.read_file(dir.path().join("missing")).is_err());
    }

    #[test]
    fn rewind_discards_tail() {
        let mut a = Arena::with_capacity(32);
        a.alloc(8).unwrap();
        let mark = a.used();
        a.alloc(16).unwrap();
        a.rewind_to(mark);
        assert_eq!(a.used(), 8);
    }
}
