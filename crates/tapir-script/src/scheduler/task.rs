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

//! The task abstraction: one suspendable frame of work inside a process.

use super::process::{Character, ProcessId};
use super::Scheduler;
use crate::config::ScriptConfig;
use crate::error::ScriptError;
use crate::script::{KernelTable, Script};
use crate::state::TaskState;
use tapir_core::Clock;

/// How a task left its `run` call.
pub enum TaskReturn {
    /// Suspend until the next tick; the task stays on top of its process.
    Yield,
    /// Push `child` on the same process and run it right away. The waiting
    /// task resumes once the child finishes, with the child's return value
    /// available as [`TaskContext::return_value`].
    Wait(Box<dyn Task>),
    /// Pop this task, handing `value` to whatever lies beneath it.
    Finish(i32),
}

impl std::fmt::Debug for TaskReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskReturn::Yield => write!(f, "Yield"),
            TaskReturn::Wait(child) => write!(f, "Wait({})", child.describe()),
            TaskReturn::Finish(value) => write!(f, "Finish({value})"),
        }
    }
}

/// A resumable unit of work.
///
/// Implementations are explicit state machines: everything needed to resume
/// after a [`TaskReturn::Yield`] or [`TaskReturn::Wait`] lives in the task
/// itself, never on the native call stack. `run` is called again from the
/// top every time the task is resumed.
pub trait Task {
    /// Advances the task until its next suspension point.
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskReturn, ScriptError>;

    /// One human readable line for debug dumps.
    fn describe(&self) -> String;

    /// Returns the resume point and live locals as plain data, if this task
    /// can be saved.
    fn save_state(&self) -> Option<TaskState> {
        None
    }
}

/// Everything a task may touch while it runs.
pub struct TaskContext<'a> {
    /// The scheduler, for spawning and killing processes.
    pub scheduler: &'a mut Scheduler,
    /// The loaded program and its variable memory.
    pub script: &'a mut Script,
    /// The kernel dispatch table.
    pub kernels: &'a KernelTable,
    /// The time source.
    pub clock: &'a dyn Clock,
    /// Interpreter limits.
    pub config: &'a ScriptConfig,
    /// The process running the task.
    pub pid: ProcessId,
    /// The character slot of that process.
    pub character: Character,
    /// The name of that process.
    pub name: &'a str,
    /// The value returned by the most recently finished task of the process.
    pub return_value: i32,
}

/// The shared collaborators handed to [`Scheduler::run`].
pub struct Environment<'e> {
    /// The loaded program.
    pub script: &'e mut Script,
    /// The kernel dispatch table.
    pub kernels: &'e KernelTable,
    /// The time source.
    pub clock: &'e dyn Clock,
    /// Interpreter limits.
    pub config: &'e ScriptConfig,
}
