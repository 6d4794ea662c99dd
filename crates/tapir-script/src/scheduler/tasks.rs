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

//! Generic host-side tasks.

use super::task::{Task, TaskContext, TaskReturn};
use crate::error::ScriptError;
use crate::state::TaskState;
use tapir_core::SemaphoreWatch;

/// Suspends its process for a fixed number of milliseconds.
///
/// The start time is taken from the clock the first time the task runs,
/// so a delay created early but started late still lasts its full duration.
/// Elapsed time is measured with wrapping arithmetic, so a delay spanning
/// the clock wrap still ends on time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayTask {
    duration: u32,
    start_time: Option<u32>,
}

impl DelayTask {
    /// Creates a delay of `duration` milliseconds.
    pub fn new(duration: u32) -> Self {
        Self {
            duration,
            start_time: None,
        }
    }

    pub(crate) fn from_state(duration: u32, end_time: Option<u32>) -> Self {
        Self {
            duration,
            start_time: end_time.map(|end| end.wrapping_sub(duration)),
        }
    }

    /// Returns the requested duration in milliseconds.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Returns the clock reading the delay ends at, once the task has started.
    ///
    /// The value wraps like the clock does.
    pub fn end_time(&self) -> Option<u32> {
        self.start_time
            .map(|start| start.wrapping_add(self.duration))
    }
}

impl Task for DelayTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskReturn, ScriptError> {
        let now = ctx.clock.millis();
        let start = *self.start_time.get_or_insert(now);
        if now.wrapping_sub(start) >= self.duration {
            Ok(TaskReturn::Finish(0))
        } else {
            Ok(TaskReturn::Yield)
        }
    }

    fn describe(&self) -> String {
        match self.end_time() {
            Some(end) => format!("Delay {}ms (ends at {end})", self.duration),
            None => format!("Delay {}ms (not started)", self.duration),
        }
    }

    fn save_state(&self) -> Option<TaskState> {
        Some(TaskState::Delay {
            duration: self.duration,
            end_time: self.end_time(),
        })
    }
}

/// Yields every tick while some other process with the given name exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitForProcessTask {
    name: String,
}

impl WaitForProcessTask {
    /// Waits for the process called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Task for WaitForProcessTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskReturn, ScriptError> {
        if ctx.scheduler.has_other_process_with_name(&self.name) {
            Ok(TaskReturn::Yield)
        } else {
            Ok(TaskReturn::Finish(0))
        }
    }

    fn describe(&self) -> String {
        format!("WaitForProcess '{}'", self.name)
    }

    fn save_state(&self) -> Option<TaskState> {
        Some(TaskState::WaitForProcess {
            name: self.name.clone(),
        })
    }
}

/// Yields every tick until a semaphore is released.
///
/// Semaphores are host objects, so this task cannot be saved.
#[derive(Debug, Clone)]
pub struct WaitForSemaphoreTask {
    watch: SemaphoreWatch,
}

impl WaitForSemaphoreTask {
    /// Waits on the semaphore observed by `watch`.
    pub fn new(watch: SemaphoreWatch) -> Self {
        Self { watch }
    }
}

impl Task for WaitForSemaphoreTask {
    fn run(&mut self, _ctx: &mut TaskContext<'_>) -> Result<TaskReturn, ScriptError> {
        if self.watch.is_released() {
            Ok(TaskReturn::Finish(0))
        } else {
            Ok(TaskReturn::Yield)
        }
    }

    fn describe(&self) -> String {
        format!("WaitForSemaphore '{}'", self.watch.name())
    }
}
