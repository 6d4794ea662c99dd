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

//! Millisecond clocks consumed by timed tasks.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonically increasing millisecond time source.
///
/// Values wrap around after `u32::MAX` milliseconds (about 49 days).
pub trait Clock {
    /// Returns the current time in milliseconds.
    fn millis(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn millis(&self) -> u32 {
        (**self).millis()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn millis(&self) -> u32 {
        (**self).millis()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn millis(&self) -> u32 {
        (**self).millis()
    }
}

/// A clock that only moves when told to.
///
/// Hosts that drive the simulation with a fixed step, and tests, use this.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u32>,
}

impl ManualClock {
    /// Creates a manual clock reading `start` milliseconds.
    pub fn new(start: u32) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: u32) {
        self.now.set(self.now.get().wrapping_add(millis));
    }

    /// Sets the clock to an absolute reading.
    pub fn set(&self, millis: u32) {
        self.now.set(millis);
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u32 {
        self.now.get()
    }
}

/// Wall-clock time since creation, excluding any time spent paused.
#[derive(Debug, Clone)]
pub struct GameClock {
    start: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl GameClock {
    /// Creates a running clock reading zero.
    /// ## Returns
    /// A new GameClock started now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    /// Stops time from advancing. Pausing twice is a no-op.
    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    /// Resumes a paused clock; the paused interval is not counted.
    pub fn resume(&mut self) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += at.elapsed();
        }
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Returns the running (unpaused) time since creation.
    pub fn elapsed(&self) -> Duration {
        let end = self.paused_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.start)
            .saturating_sub(self.paused_total)
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for GameClock {
    fn millis(&self) -> u32 {
        self.elapsed().as_millis() as u32
    }
}
