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

//! # Tapir Script
//!
//! A stack-based bytecode interpreter for compiled game scripts, running
//! inside a cooperative, double-buffered process scheduler.
//!
//! A host loads a [`Script`], registers its game kernels in a
//! [`KernelTable`], spawns processes by procedure name and calls
//! [`ScriptEngine::tick`] once per frame.

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod script;
pub mod state;

pub use config::ScriptConfig;
pub use engine::ScriptEngine;
pub use error::{SaveError, ScriptError};
pub use scheduler::{
    Character, DelayTask, Environment, Process, ProcessId, ProcessStatus, Scheduler, Task,
    TaskContext, TaskReturn, WaitForProcessTask, WaitForSemaphoreTask,
};
pub use script::{
    builtin, Instruction, Kernel, KernelCall, KernelOutcome, KernelTable, ProgramWriter, Script,
    ScriptOp, ScriptTask, StackEntry, MAX_VARIABLE_MEMORY,
};
pub use state::{EngineState, ProcessState, ResumeState, SchedulerState, TaskState};
