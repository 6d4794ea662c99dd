// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exclusive ownership of a span's heap buffer.

use super::view::{Span, SpanMut};
use crate::stream::ReadExt;
use bytemuck::Pod;
use std::fmt;
use std::io::{self, Read};
use std::mem::size_of;

/// Owns the heap buffer behind a span.
///
/// The ownership contract is: cloning performs a deep copy into a fresh
/// allocation, [`move_from`](Self::move_from) transfers the buffer and
/// empties the source, and dropping frees whatever is currently owned.
/// An empty owner holds no buffer and reports a null data pointer.
pub struct SpanOwner<T> {
    buffer: Option<Box<[T]>>,
}

impl<T> SpanOwner<T> {
    /// Creates an owner holding no buffer.
    pub const fn new() -> Self {
        Self { buffer: None }
    }

    /// Returns `true` if a buffer is currently owned.
    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Returns the number of owned elements.
    pub fn size(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len())
    }

    /// Returns the number of owned bytes.
    pub fn byte_size(&self) -> usize {
        self.size() * size_of::<T>()
    }

    /// Returns the address of the owned buffer, or null when empty.
    pub fn as_ptr(&self) -> *const T {
        self.buffer
            .as_ref()
            .map_or(std::ptr::null(), |b| b.as_ptr())
    }

    /// Returns the owned elements as a slice (empty when nothing is owned).
    pub fn as_slice(&self) -> &[T] {
        self.buffer.as_deref().unwrap_or(&[])
    }

    /// Returns the owned elements as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }

    /// Returns a read-only span over the owned buffer.
    pub fn span(&self) -> Span<'_, T> {
        Span::new(self.as_slice())
    }

    /// Returns a mutable span over the owned buffer.
    pub fn span_mut(&mut self) -> SpanMut<'_, T> {
        SpanMut::new(self.as_mut_slice())
    }

    /// Takes over the buffer of `other`, freeing the current one first.
    ///
    /// `other` is left empty. No element is copied.
    pub fn move_from(&mut self, other: &mut SpanOwner<T>) {
        self.buffer = other.buffer.take();
    }

    /// Gives up ownership without freeing; the caller now owns the buffer.
    pub fn release(&mut self) -> Option<Box<[T]>> {
        self.buffer.take()
    }

    /// Frees the owned buffer, if any.
    pub fn clear(&mut self) {
        self.buffer = None;
    }
}

impl<T: Clone> SpanOwner<T> {
    /// Allocates a fresh buffer holding a copy of `span`.
    pub fn allocate_from_span(span: Span<'_, T>) -> Self {
        Self {
            buffer: Some(span.as_slice().into()),
        }
    }
}

impl<T: Pod> SpanOwner<T> {
    /// Allocates a zero-initialised buffer of `count` elements.
    pub fn allocate(count: usize) -> Self {
        Self {
            buffer: Some(vec![T::zeroed(); count].into_boxed_slice()),
        }
    }

    /// Allocates `count` elements and fills them with raw bytes from `reader`.
    ///
    /// The buffer is only allocated once all of its bytes have been read.
    ///
    /// # Errors
    /// Propagates the reader's error, including `UnexpectedEof` when the
    /// stream ends before the buffer is full, and `InvalidInput` if the byte
    /// size overflows `usize`.
    pub fn allocate_from_stream<R: Read + ?Sized>(reader: &mut R, count: usize) -> io::Result<Self> {
        let length = count.checked_mul(size_of::<T>()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{count} elements do not fit in memory"),
            )
        })?;
        let bytes = reader.read_bytes(length)?;
        let mut owner = Self::allocate(count);
        if let Some(buffer) = owner.buffer.as_deref_mut() {
            bytemuck::cast_slice_mut(buffer).copy_from_slice(&bytes);
        }
        Ok(owner)
    }
}

impl<T: Clone> Clone for SpanOwner<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
        }
    }
}

impl<T> Default for SpanOwner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for SpanOwner<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            buffer: Some(data.into_boxed_slice()),
        }
    }
}

impl<T> From<Box<[T]>> for SpanOwner<T> {
    fn from(data: Box<[T]>) -> Self {
        Self { buffer: Some(data) }
    }
}

impl<T> fmt::Debug for SpanOwner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanOwner")
            .field("data", &self.as_ptr())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_a_deep_copy() {
        let mut a = SpanOwner::from(vec![1u8, 2, 3]);
        let b = a.clone();
        assert_ne!(a.as_ptr(), b.as_ptr(), "clone must not alias");
        assert_eq!(a.as_slice(), b.as_slice());

        a.span_mut().set(0, 9).unwrap();
        assert_eq!(b.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn clone_of_empty_is_empty() {
        let a: SpanOwner<u8> = SpanOwner::new();
        let b = a.clone();
        assert!(!b.is_allocated());
        assert!(b.as_ptr().is_null());
        assert_eq!(b.span().size(), 0);
    }

    #[test]
    fn move_from_transfers_the_exact_buffer() {
        let mut a = SpanOwner::from(vec![7u32; 4]);
        let mut b = SpanOwner::allocate(2);
        let original = a.as_ptr();

        b.move_from(&mut a);

        assert!(!a.is_allocated());
        assert!(b.is_allocated());
        assert_eq!(b.as_ptr(), original);
        assert_eq!(b.size(), 4);
    }

    #[test]
    fn release_and_clear() {
        let mut a = SpanOwner::from(vec![1i16, 2]);
        let released = a.release().expect("buffer should be released");
        assert_eq!(&*released, &[1, 2]);
        assert!(!a.is_allocated());

        let mut b = SpanOwner::<u8>::allocate(8);
        assert_eq!(b.byte_size(), 8);
        b.clear();
        assert!(!b.is_allocated());
        assert_eq!(b.size(), 0);
    }

    #[test]
    fn allocate_from_span_and_stream() {
        let source = [4u8, 5, 6];
        let copy = SpanOwner::allocate_from_span(Span::new(&source));
        assert_eq!(copy.as_slice(), &source);
        assert_ne!(copy.as_ptr(), source.as_ptr());

        let mut stream: &[u8] = &[0x01, 0x00, 0x02, 0x00, 0xFF];
        let words = SpanOwner::<u16>::allocate_from_stream(&mut stream, 2).unwrap();
        assert_eq!(words.as_slice(), &[u16::from_le_bytes([1, 0]), u16::from_le_bytes([2, 0])]);
        assert_eq!(stream, &[0xFF]);

        let mut short: &[u8] = &[1];
        let err = SpanOwner::<u8>::allocate_from_stream(&mut short, 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_stream_count_fails_without_allocating() {
        let mut short: &[u8] = &[0; 8];
        let err = SpanOwner::<u8>::allocate_from_stream(&mut short, 0x7FFF_FFFF).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut empty: &[u8] = &[];
        let err = SpanOwner::<u32>::allocate_from_stream(&mut empty, usize::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
