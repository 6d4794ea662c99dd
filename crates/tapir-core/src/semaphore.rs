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

//! A cooperative "busy" counter.
//!
//! This is not an OS synchronisation primitive. Processes run one at a time,
//! so the counter only records how many logical owners currently hold the
//! gate (for instance a character engaged in an exclusive action) and lets
//! others poll until it drops back to zero.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A named, non-blocking, reference-counted gate.
///
/// The counter must be back at zero when the semaphore is dropped.
pub struct Semaphore {
    name: String,
    counter: Rc<Cell<u32>>,
}

impl Semaphore {
    /// Creates a released semaphore.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counter: Rc::new(Cell::new(0)),
        }
    }

    /// Returns the diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of outstanding guards.
    pub fn counter(&self) -> u32 {
        self.counter.get()
    }

    /// Returns `true` when no guard is outstanding.
    pub fn is_released(&self) -> bool {
        self.counter.get() == 0
    }

    /// Marks the gate busy until the returned guard is dropped.
    pub fn acquire(&self) -> SemaphoreGuard {
        self.counter.set(self.counter.get() + 1);
        SemaphoreGuard {
            counter: Rc::clone(&self.counter),
        }
    }

    /// Returns a read-only observer, e.g. for a task waiting on the gate.
    pub fn watch(&self) -> SemaphoreWatch {
        SemaphoreWatch {
            name: self.name.clone(),
            counter: Rc::clone(&self.counter),
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        let count = self.counter.get();
        if count != 0 {
            log::error!(
                "Semaphore '{}' destroyed while still held ({count} outstanding guards)",
                self.name
            );
            debug_assert!(count == 0, "semaphore '{}' leaked", self.name);
        }
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("name", &self.name)
            .field("counter", &self.counter.get())
            .finish()
    }
}

/// Holds a [`Semaphore`] busy for as long as it lives.
#[must_use = "the semaphore is released as soon as the guard is dropped"]
pub struct SemaphoreGuard {
    counter: Rc<Cell<u32>>,
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        self.counter.set(self.counter.get().saturating_sub(1));
    }
}

impl fmt::Debug for SemaphoreGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphoreGuard")
            .field("counter", &self.counter.get())
            .finish()
    }
}

/// Observes a [`Semaphore`] without holding it.
#[derive(Clone)]
pub struct SemaphoreWatch {
    name: String,
    counter: Rc<Cell<u32>>,
}

impl SemaphoreWatch {
    /// Returns the observed semaphore's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the observed semaphore has no outstanding guard.
    pub fn is_released(&self) -> bool {
        self.counter.get() == 0
    }
}

impl fmt::Debug for SemaphoreWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphoreWatch")
            .field("name", &self.name)
            .field("counter", &self.counter.get())
            .finish()
    }
}
