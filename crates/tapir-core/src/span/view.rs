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

//! Borrowed, bounds-checked views: [`Span`] and [`SpanMut`].

use super::error::{AccessMode, BoundsViolation, SpanError};
use bytemuck::Pod;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::io::Cursor;
use std::mem::size_of;
use std::ops::{Index, IndexMut};

/// Converts an element count into a byte delta.
///
/// Counts whose byte size does not fit an `isize` saturate, which every
/// bounds check then rejects.
pub(crate) fn byte_delta<T>(count: usize) -> isize {
    count
        .checked_mul(size_of::<T>())
        .and_then(|bytes| isize::try_from(bytes).ok())
        .unwrap_or(isize::MAX)
}

/// The core bounds predicate shared by every span type.
///
/// `index` and `delta` are checked on their own before the combined end
/// position is computed, so corrupt values (huge indices, deltas reaching
/// below the start of the span) can never wrap around into an accepted range.
pub(crate) fn invalid_bounds(size: usize, element_size: usize, index: usize, delta: isize) -> bool {
    let byte_size = size * element_size;
    if index > size {
        return true;
    }
    if delta > 0 && delta.unsigned_abs() > byte_size {
        return true;
    }
    match (index * element_size).checked_add_signed(delta) {
        Some(end) => end > byte_size,
        None => true,
    }
}

/// A non-owning, bounds-checked view over a contiguous run of `T`.
///
/// `Span` is `Copy` and compares by identity (start address and length), not
/// by content. Every accessor validates the requested range and reports a
/// [`SpanError`] instead of reading past the end; the `Index` operator panics
/// with the same diagnostic.
pub struct Span<'a, T> {
    data: &'a [T],
}

impl<T> Clone for Span<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Span<'_, T> {}

impl<T> Default for Span<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, T> Span<'a, T> {
    /// Creates a span over the given slice.
    pub const fn new(data: &'a [T]) -> Self {
        Self { data }
    }

    /// Creates a span of zero elements.
    pub const fn empty() -> Self {
        Self { data: &[] }
    }

    /// Returns the number of elements.
    pub const fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of bytes covered by the span.
    pub const fn byte_size(&self) -> usize {
        self.data.len() * size_of::<T>()
    }

    /// Returns `true` if the span has no elements.
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the underlying slice.
    pub const fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the start address of the span.
    pub const fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    /// Returns `true` if accessing `delta` bytes from element `index` would
    /// leave the span.
    ///
    /// Reaching exactly the end with a zero-byte delta is valid; negative
    /// deltas are allowed as long as they stay inside the span.
    pub fn check_invalid_bounds(&self, index: usize, delta: isize) -> bool {
        invalid_bounds(self.size(), size_of::<T>(), index, delta)
    }

    /// Validates an access, producing a full diagnostic on failure.
    pub fn validate(&self, index: usize, delta: isize, mode: AccessMode) -> Result<(), SpanError> {
        if self.check_invalid_bounds(index, delta) {
            return Err(SpanError::OutOfBounds(BoundsViolation {
                mode,
                index,
                delta,
                byte_size: self.byte_size(),
                element_size: size_of::<T>(),
                name: None,
                source_byte_offset: None,
            }));
        }
        Ok(())
    }

    /// Returns a reference to the element at `index`.
    pub fn get(&self, index: usize) -> Result<&'a T, SpanError> {
        self.validate(index, byte_delta::<T>(1), AccessMode::Read)?;
        Ok(&self.data[index])
    }

    /// Returns the elements in `index..index + length` after validating the
    /// whole range once.
    ///
    /// `None` means "up to the end of the span". Intended for tight loops that
    /// cannot afford a check per element.
    pub fn data_at(&self, index: usize, length: Option<usize>) -> Result<&'a [T], SpanError> {
        let length = length.unwrap_or_else(|| self.size().saturating_sub(index));
        self.validate(index, byte_delta::<T>(length), AccessMode::Read)?;
        Ok(&self.data[index..index + length])
    }

    /// Derives a span over `index..index + length` (`None` = to the end).
    pub fn subspan(&self, index: usize, length: Option<usize>) -> Result<Span<'a, T>, SpanError> {
        let length = length.unwrap_or_else(|| self.size().saturating_sub(index));
        self.validate(index, byte_delta::<T>(length), AccessMode::Seek)?;
        Ok(Span::new(&self.data[index..index + length]))
    }

    /// Returns the distance in elements from the start of `other` to the
    /// start of this span.
    pub fn offset_from(&self, other: &Span<'_, T>) -> isize {
        let stride = size_of::<T>().max(1) as isize;
        (self.as_ptr() as isize - other.as_ptr() as isize) / stride
    }
}

impl<'a, T: Pod> Span<'a, T> {
    /// Derives a sub-range and views its bytes as elements of type `U`.
    ///
    /// `index` and `length` are counted in elements of `T`. The byte size of
    /// the range must be a multiple of `size_of::<U>()` and suitably aligned.
    pub fn subspan_as<U: Pod>(
        &self,
        index: usize,
        length: Option<usize>,
    ) -> Result<Span<'a, U>, SpanError> {
        let sub = self.subspan(index, length)?;
        bytemuck::try_cast_slice(sub.data)
            .map(Span::new)
            .map_err(|e| SpanError::Reinterpret {
                byte_size: sub.byte_size(),
                element_size: size_of::<U>(),
                type_name: std::any::type_name::<U>(),
                reason: format!("{e:?}"),
            })
    }

    /// Views the whole span as elements of type `U`.
    pub fn reinterpret<U: Pod>(&self) -> Result<Span<'a, U>, SpanError> {
        self.subspan_as(0, None)
    }

    /// Views the whole span as raw bytes. This can never fail.
    pub fn as_bytes(&self) -> Span<'a, u8> {
        Span::new(bytemuck::cast_slice(self.data))
    }
}

macro_rules! byte_readers {
    ($($(#[$doc:meta])* $name:ident => $ty:ty, $width:literal, $decode:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&self, index: usize) -> Result<$ty, SpanError> {
                Ok(<$ty>::$decode(self.array_at::<$width>(index)?))
            }
        )*
    };
}

impl<'a> Span<'a, u8> {
    fn array_at<const N: usize>(&self, index: usize) -> Result<[u8; N], SpanError> {
        self.validate(index, N as isize, AccessMode::Read)?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[index..index + N]);
        Ok(bytes)
    }

    byte_readers! {
        /// Reads a signed byte.
        get_int8_at => i8, 1, from_le_bytes;
        /// Reads an unsigned byte.
        get_uint8_at => u8, 1, from_le_bytes;
        /// Reads a little-endian `i16`.
        get_int16_le_at => i16, 2, from_le_bytes;
        /// Reads a big-endian `i16`.
        get_int16_be_at => i16, 2, from_be_bytes;
        /// Reads a little-endian `u16`.
        get_uint16_le_at => u16, 2, from_le_bytes;
        /// Reads a big-endian `u16`.
        get_uint16_be_at => u16, 2, from_be_bytes;
        /// Reads a little-endian `i32`.
        get_int32_le_at => i32, 4, from_le_bytes;
        /// Reads a big-endian `i32`.
        get_int32_be_at => i32, 4, from_be_bytes;
        /// Reads a little-endian `u32`.
        get_uint32_le_at => u32, 4, from_le_bytes;
        /// Reads a big-endian `u32`.
        get_uint32_be_at => u32, 4, from_be_bytes;
    }

    /// Reads a little-endian 24-bit unsigned integer.
    pub fn get_uint24_le_at(&self, index: usize) -> Result<u32, SpanError> {
        let [b0, b1, b2] = self.array_at::<3>(index)?;
        Ok(u32::from_le_bytes([b0, b1, b2, 0]))
    }

    /// Reads a big-endian 24-bit unsigned integer.
    pub fn get_uint24_be_at(&self, index: usize) -> Result<u32, SpanError> {
        let [b0, b1, b2] = self.array_at::<3>(index)?;
        Ok(u32::from_be_bytes([0, b0, b1, b2]))
    }

    /// Extracts text starting at `index`.
    ///
    /// With `None` the text runs up to the first NUL byte or the end of the
    /// span, whichever comes first. Invalid UTF-8 is replaced, not rejected.
    pub fn get_string_at(&self, index: usize, length: Option<usize>) -> Result<Cow<'a, str>, SpanError> {
        let bytes = match length {
            Some(_) => self.data_at(index, length)?,
            None => {
                let rest = self.data_at(index, None)?;
                let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
                &rest[..end]
            }
        };
        Ok(String::from_utf8_lossy(bytes))
    }

    /// Returns a readable, seekable stream over `index..index + length`.
    pub fn to_stream(&self, index: usize, length: Option<usize>) -> Result<Cursor<&'a [u8]>, SpanError> {
        Ok(Cursor::new(self.data_at(index, length)?))
    }
}

impl<T> Index<usize> for Span<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T> PartialEq for Span<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.as_ptr(), other.as_ptr()) && self.size() == other.size()
    }
}

impl<T> Eq for Span<'_, T> {}

impl<T> PartialOrd for Span<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Span<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.as_ptr() as usize, self.size()).cmp(&(other.as_ptr() as usize, other.size()))
    }
}

impl<T> fmt::Debug for Span<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("data", &self.as_ptr())
            .field("size", &self.size())
            .finish()
    }
}

impl<'a, T> From<&'a [T]> for Span<'a, T> {
    fn from(data: &'a [T]) -> Self {
        Self::new(data)
    }
}

/// The mutable counterpart of [`Span`].
///
/// Writes are validated exactly like reads and report [`AccessMode::Write`].
pub struct SpanMut<'a, T> {
    data: &'a mut [T],
}

impl<'a, T> SpanMut<'a, T> {
    /// Creates a mutable span over the given slice.
    pub fn new(data: &'a mut [T]) -> Self {
        Self { data }
    }

    /// Returns the number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of bytes covered by the span.
    pub fn byte_size(&self) -> usize {
        self.data.len() * size_of::<T>()
    }

    /// Returns a read-only view of the same memory.
    pub fn as_span(&self) -> Span<'_, T> {
        Span::new(self.data)
    }

    /// Returns the underlying slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut *self.data
    }

    /// Returns a mutable reference to the element at `index`.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, SpanError> {
        self.as_span()
            .validate(index, byte_delta::<T>(1), AccessMode::Write)?;
        Ok(&mut self.data[index])
    }

    /// Overwrites the element at `index`.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), SpanError> {
        *self.get_mut(index)? = value;
        Ok(())
    }

    /// Derives a mutable span over `index..index + length` (`None` = to the end).
    pub fn subspan_mut(
        &mut self,
        index: usize,
        length: Option<usize>,
    ) -> Result<SpanMut<'_, T>, SpanError> {
        let length = length.unwrap_or_else(|| self.size().saturating_sub(index));
        self.as_span()
            .validate(index, byte_delta::<T>(length), AccessMode::Seek)?;
        Ok(SpanMut::new(&mut self.data[index..index + length]))
    }

    /// Copies `source` into this span starting at element `index`.
    pub fn copy_from(&mut self, index: usize, source: Span<'_, T>) -> Result<(), SpanError>
    where
        T: Copy,
    {
        self.as_span()
            .validate(index, byte_delta::<T>(source.size()), AccessMode::Write)?;
        self.data[index..index + source.size()].copy_from_slice(source.as_slice());
        Ok(())
    }
}

impl<T> Index<usize> for SpanMut<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        if let Err(e) = self
            .as_span()
            .validate(index, byte_delta::<T>(1), AccessMode::Read)
        {
            panic!("{e}");
        }
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for SpanMut<'_, T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.get_mut(index) {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T> fmt::Debug for SpanMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanMut")
            .field("data", &self.data.as_ptr())
            .field("size", &self.size())
            .finish()
    }
}
