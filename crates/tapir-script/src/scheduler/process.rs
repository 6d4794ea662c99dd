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

//! Processes: cooperative threads holding a stack of tasks.

use super::task::{Environment, Task, TaskContext, TaskReturn};
use super::Scheduler;
use crate::error::ScriptError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The character slot a process is associated with.
///
/// Slots exist for bulk cancellation: killing everything a character was
/// doing. `None` doubles as the wildcard in kill requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Character {
    /// Not bound to a character.
    #[default]
    None,
    /// The first playable character.
    First,
    /// The second playable character.
    Second,
}

impl Character {
    /// Maps a slot number (0, 1, 2) to a character.
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Character::None),
            1 => Some(Character::First),
            2 => Some(Character::Second),
            _ => None,
        }
    }

    /// Returns the slot number.
    pub fn index(self) -> i32 {
        match self {
            Character::None => 0,
            Character::First => 1,
            Character::Second => 2,
        }
    }

    /// Returns `true` if a kill request for `filter` covers this character.
    pub fn matches(self, filter: Character) -> bool {
        filter == Character::None || self == filter
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Character::None => write!(f, "none"),
            Character::First => write!(f, "first"),
            Character::Second => write!(f, "second"),
        }
    }
}

/// A unique process identifier, assigned in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a process reported after one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process still has tasks and must run again next tick.
    Running,
    /// The task stack emptied; the process must be destroyed.
    Finished,
}

/// One logical thread of execution.
pub struct Process {
    pid: ProcessId,
    character: Character,
    name: String,
    tasks: Vec<Box<dyn Task>>,
    last_return_value: i32,
}

impl Process {
    pub(crate) fn new(pid: ProcessId, character: Character, name: String, task: Box<dyn Task>) -> Self {
        Self {
            pid,
            character,
            name,
            tasks: vec![task],
            last_return_value: 0,
        }
    }

    pub(crate) fn from_parts(
        pid: ProcessId,
        character: Character,
        name: String,
        tasks: Vec<Box<dyn Task>>,
        last_return_value: i32,
    ) -> Self {
        Self {
            pid,
            character,
            name,
            tasks,
            last_return_value,
        }
    }

    /// Returns the process id.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Returns the character slot.
    pub fn character(&self) -> Character {
        self.character
    }

    /// Returns the diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value the most recently finished task returned.
    pub fn last_return_value(&self) -> i32 {
        self.last_return_value
    }

    /// Returns the task stack, bottom first.
    pub fn tasks(&self) -> &[Box<dyn Task>] {
        &self.tasks
    }

    /// Runs the top task until the process yields or its stack empties.
    ///
    /// A task waiting on a child pushes it and the child runs immediately, in
    /// this same step. A finished task is popped and its parent resumes in
    /// this same step with the return value available.
    pub(crate) fn step(
        &mut self,
        scheduler: &mut Scheduler,
        env: &mut Environment<'_>,
    ) -> Result<ProcessStatus, ScriptError> {
        loop {
            let Some(task) = self.tasks.last_mut() else {
                return Ok(ProcessStatus::Finished);
            };
            let mut ctx = TaskContext {
                scheduler: &mut *scheduler,
                script: &mut *env.script,
                kernels: env.kernels,
                clock: env.clock,
                config: env.config,
                pid: self.pid,
                character: self.character,
                name: &self.name,
                return_value: self.last_return_value,
            };
            match task.run(&mut ctx)? {
                TaskReturn::Yield => return Ok(ProcessStatus::Running),
                TaskReturn::Wait(child) => {
                    log::trace!("Process {} waits on {}", self.pid, child.describe());
                    self.tasks.push(child);
                }
                TaskReturn::Finish(value) => {
                    self.tasks.pop();
                    self.last_return_value = value;
                }
            }
        }
    }

    /// Writes the process header and one line per task.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "  pid {} [{}] '{}' returned {} ({} tasks)",
            self.pid,
            self.character,
            self.name,
            self.last_return_value,
            self.tasks.len()
        )?;
        for (depth, task) in self.tasks.iter().enumerate().rev() {
            writeln!(out, "    #{depth}: {}", task.describe())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("character", &self.character)
            .field("name", &self.name)
            .field("tasks", &self.tasks.len())
            .field("last_return_value", &self.last_return_value)
            .finish()
    }
}
