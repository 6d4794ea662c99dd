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

//! Bounds-checked typed memory spans.
//!
//! Every binary format the engine reads goes through these views. They never
//! read past their end: an invalid access yields a [`SpanError`] describing
//! the access mode, the attempted index and byte delta and the known size
//! (plus, for a [`NamedSpan`], the absolute position in the source buffer).
//!
//! - [`Span`] / [`SpanMut`]: borrowed views with endian-aware accessors.
//! - [`NamedSpan`]: a view that keeps a diagnostic name and source offset.
//! - [`SpanOwner`]: exclusive ownership of the buffer behind a span.

mod error;
mod named;
mod owner;
mod view;

pub use error::{AccessMode, BoundsViolation, SpanError};
pub use named::NamedSpan;
pub use owner::SpanOwner;
pub use view::{Span, SpanMut};
