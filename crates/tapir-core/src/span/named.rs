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

//! Spans that remember where they came from.

use super::error::{AccessMode, SpanError};
use super::view::Span;
use bytemuck::Pod;
use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;
use std::mem::size_of;

/// A [`Span`] carrying a diagnostic name and its absolute byte offset in the
/// original backing buffer.
///
/// Sub-views propagate the offset (`parent + index * size_of::<T>()`) unless
/// the caller overrides it, so an error found after repeated slicing still
/// reports a position meaningful against the source file.
pub struct NamedSpan<'a, T> {
    span: Span<'a, T>,
    name: &'a str,
    source_byte_offset: usize,
}

impl<T> Clone for NamedSpan<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NamedSpan<'_, T> {}

impl<'a, T> NamedSpan<'a, T> {
    /// Creates a named span starting at offset zero of its source.
    pub fn new(data: &'a [T], name: &'a str) -> Self {
        Self::with_source_offset(data, name, 0)
    }

    /// Creates a named span whose first element sits at `source_byte_offset`
    /// in the original buffer.
    pub fn with_source_offset(data: &'a [T], name: &'a str, source_byte_offset: usize) -> Self {
        Self {
            span: Span::new(data),
            name,
            source_byte_offset,
        }
    }

    /// Returns the diagnostic name.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Returns the absolute offset of the first element in the original buffer.
    pub fn source_byte_offset(&self) -> usize {
        self.source_byte_offset
    }

    /// Returns the anonymous view over the same memory.
    pub fn span(&self) -> Span<'a, T> {
        self.span
    }

    /// Returns the number of elements.
    pub fn size(&self) -> usize {
        self.span.size()
    }

    /// Returns the number of bytes covered by the span.
    pub fn byte_size(&self) -> usize {
        self.span.byte_size()
    }

    fn annotate(&self, err: SpanError) -> SpanError {
        err.with_origin(self.name, self.source_byte_offset)
    }

    /// Validates an access, producing a diagnostic that includes the name and
    /// the absolute offset.
    pub fn validate(&self, index: usize, delta: isize, mode: AccessMode) -> Result<(), SpanError> {
        self.span
            .validate(index, delta, mode)
            .map_err(|e| self.annotate(e))
    }

    /// Returns a reference to the element at `index`.
    pub fn get(&self, index: usize) -> Result<&'a T, SpanError> {
        self.span.get(index).map_err(|e| self.annotate(e))
    }

    /// Returns the elements in `index..index + length` (`None` = to the end).
    pub fn data_at(&self, index: usize, length: Option<usize>) -> Result<&'a [T], SpanError> {
        self.span
            .data_at(index, length)
            .map_err(|e| self.annotate(e))
    }

    /// Derives a named sub-view, propagating the source offset.
    pub fn subspan(&self, index: usize, length: Option<usize>) -> Result<NamedSpan<'a, T>, SpanError> {
        self.subspan_with_offset(index, length, None)
    }

    /// Derives a named sub-view with an explicit source offset.
    ///
    /// `None` keeps the propagated offset.
    pub fn subspan_with_offset(
        &self,
        index: usize,
        length: Option<usize>,
        source_byte_offset: Option<usize>,
    ) -> Result<NamedSpan<'a, T>, SpanError> {
        let sub = self
            .span
            .subspan(index, length)
            .map_err(|e| self.annotate(e))?;
        let offset = source_byte_offset
            .unwrap_or_else(|| self.source_byte_offset + index * size_of::<T>());
        Ok(NamedSpan {
            span: sub,
            name: self.name,
            source_byte_offset: offset,
        })
    }
}

impl<'a, T: Pod> NamedSpan<'a, T> {
    /// Derives a named sub-view reinterpreted as elements of type `U`.
    pub fn subspan_as<U: Pod>(
        &self,
        index: usize,
        length: Option<usize>,
    ) -> Result<NamedSpan<'a, U>, SpanError> {
        let sub = self
            .span
            .subspan_as::<U>(index, length)
            .map_err(|e| self.annotate(e))?;
        Ok(NamedSpan {
            span: sub,
            name: self.name,
            source_byte_offset: self.source_byte_offset + index * size_of::<T>(),
        })
    }
}

macro_rules! forward_byte_readers {
    ($($name:ident => $ty:ty;)*) => {
        $(
            #[allow(missing_docs)]
            pub fn $name(&self, index: usize) -> Result<$ty, SpanError> {
                self.span.$name(index).map_err(|e| self.annotate(e))
            }
        )*
    };
}

impl<'a> NamedSpan<'a, u8> {
    forward_byte_readers! {
        get_int8_at => i8;
        get_uint8_at => u8;
        get_int16_le_at => i16;
        get_int16_be_at => i16;
        get_uint16_le_at => u16;
        get_uint16_be_at => u16;
        get_uint24_le_at => u32;
        get_uint24_be_at => u32;
        get_int32_le_at => i32;
        get_int32_be_at => i32;
        get_uint32_le_at => u32;
        get_uint32_be_at => u32;
    }

    /// See [`Span::get_string_at`].
    pub fn get_string_at(&self, index: usize, length: Option<usize>) -> Result<Cow<'a, str>, SpanError> {
        self.span
            .get_string_at(index, length)
            .map_err(|e| self.annotate(e))
    }

    /// See [`Span::to_stream`].
    pub fn to_stream(&self, index: usize, length: Option<usize>) -> Result<Cursor<&'a [u8]>, SpanError> {
        self.span
            .to_stream(index, length)
            .map_err(|e| self.annotate(e))
    }
}

impl<T> fmt::Debug for NamedSpan<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedSpan")
            .field("name", &self.name)
            .field("source_byte_offset", &self.source_byte_offset)
            .field("span", &self.span)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_subspans_propagate_offsets() {
        let file = [0u8; 64];
        let root = NamedSpan::new(&file[..], "room.bin");
        let chunk = root.subspan(16, Some(32)).unwrap();
        let entry = chunk.subspan(8, None).unwrap();
        assert_eq!(chunk.source_byte_offset(), 16);
        assert_eq!(entry.source_byte_offset(), 24);
        assert_eq!(entry.size(), 24);
        assert_eq!(entry.name(), "room.bin");
    }

    #[test]
    fn explicit_offset_override() {
        let file = [0u8; 16];
        let root = NamedSpan::new(&file[..], "blob");
        let sub = root.subspan_with_offset(4, Some(4), Some(1000)).unwrap();
        assert_eq!(sub.source_byte_offset(), 1000);
    }

    #[test]
    fn violation_names_absolute_position() {
        let file = [0u8; 64];
        let root = NamedSpan::new(&file[..], "room.bin");
        let entry = root.subspan(16, Some(8)).unwrap();
        let err = entry.get_uint32_le_at(6).unwrap_err();
        let violation = err.violation().expect("should be out of bounds");
        assert_eq!(violation.name.as_deref(), Some("room.bin"));
        assert_eq!(violation.source_byte_offset, Some(16));
        assert_eq!(
            err.to_string(),
            "Access violation reading room.bin: 6 + 4 > 8 (abs: 22 + 4 > 24)"
        );
    }

    #[test]
    fn reinterpreted_named_subspan() {
        let words = [1u32, 2, 3, 4];
        let root = NamedSpan::new(&words[..], "table");
        let bytes = root.subspan_as::<u8>(2, None).unwrap();
        assert_eq!(bytes.source_byte_offset(), 8);
        assert_eq!(bytes.size(), 8);
    }
}
