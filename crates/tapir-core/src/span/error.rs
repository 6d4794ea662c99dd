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

//! Diagnostics produced when a span access is rejected.

use std::fmt;
use thiserror::Error;

/// The kind of access that was being attempted when a bounds check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Reading one or more elements.
    Read,
    /// Writing one or more elements.
    Write,
    /// Deriving a sub-view without touching any element.
    Seek,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "reading"),
            AccessMode::Write => write!(f, "writing"),
            AccessMode::Seek => write!(f, "seeking"),
        }
    }
}

/// Everything known about a rejected access.
///
/// `index` is expressed in elements of the span, `delta` in bytes relative to
/// that element. Named spans additionally record their name and the absolute
/// byte offset of their first element inside the original backing buffer, so
/// a violation deep inside nested sub-views still points at a meaningful
/// position in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundsViolation {
    /// What kind of access failed.
    pub mode: AccessMode,
    /// The element index the access started at.
    pub index: usize,
    /// The byte delta requested from `index`.
    pub delta: isize,
    /// The size of the span in bytes.
    pub byte_size: usize,
    /// The size of one span element in bytes.
    pub element_size: usize,
    /// The name of the span, for named spans.
    pub name: Option<String>,
    /// The absolute offset of the span in its backing buffer, for named spans.
    pub source_byte_offset: Option<usize>,
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte_index = self.index.saturating_mul(self.element_size);
        write!(
            f,
            "Access violation {} {}: {} + {} > {}",
            self.mode,
            self.name.as_deref().unwrap_or("span"),
            byte_index,
            self.delta,
            self.byte_size
        )?;
        if let Some(offset) = self.source_byte_offset {
            write!(
                f,
                " (abs: {} + {} > {})",
                offset.saturating_add(byte_index),
                self.delta,
                offset.saturating_add(self.byte_size)
            )?;
        }
        Ok(())
    }
}

/// An error produced by a span accessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanError {
    /// The requested range is not contained in the span.
    #[error("{0}")]
    OutOfBounds(BoundsViolation),
    /// The byte range cannot be viewed as the requested element type.
    #[error("cannot reinterpret {byte_size} bytes as `{type_name}` ({element_size} bytes per element): {reason}")]
    Reinterpret {
        /// The size of the source range in bytes.
        byte_size: usize,
        /// The size of one target element in bytes.
        element_size: usize,
        /// The name of the target element type.
        type_name: &'static str,
        /// Why the cast was refused (length or alignment).
        reason: String,
    },
}

impl SpanError {
    /// Attaches a span name and source offset to an out-of-bounds error.
    ///
    /// Other errors are returned unchanged. An already named violation keeps
    /// its innermost name.
    pub fn with_origin(self, name: &str, source_byte_offset: usize) -> Self {
        match self {
            SpanError::OutOfBounds(mut violation) => {
                if violation.name.is_none() {
                    violation.name = Some(name.to_owned());
                    violation.source_byte_offset = Some(source_byte_offset);
                }
                SpanError::OutOfBounds(violation)
            }
            other => other,
        }
    }

    /// Returns the bounds violation details, if this is an out-of-bounds error.
    pub fn violation(&self) -> Option<&BoundsViolation> {
        match self {
            SpanError::OutOfBounds(violation) => Some(violation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation() -> BoundsViolation {
        BoundsViolation {
            mode: AccessMode::Read,
            index: 6,
            delta: 1,
            byte_size: 6,
            element_size: 1,
            name: None,
            source_byte_offset: None,
        }
    }

    #[test]
    fn anonymous_violation_display() {
        let err = SpanError::OutOfBounds(violation());
        assert_eq!(format!("{err}"), "Access violation reading span: 6 + 1 > 6");
    }

    #[test]
    fn named_violation_reports_absolute_offset() {
        let err = SpanError::OutOfBounds(violation()).with_origin("room.bin", 0x100);
        assert_eq!(
            format!("{err}"),
            "Access violation reading room.bin: 6 + 1 > 6 (abs: 262 + 1 > 262)"
        );
    }

    #[test]
    fn innermost_name_wins() {
        let err = SpanError::OutOfBounds(violation())
            .with_origin("inner", 4)
            .with_origin("outer", 0);
        let v = err.violation().expect("should stay out-of-bounds");
        assert_eq!(v.name.as_deref(), Some("inner"));
        assert_eq!(v.source_byte_offset, Some(4));
    }
}
