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

//! Plain-data snapshots of in-flight tasks and processes.
//!
//! Every built-in task can describe its resume point and the locals live at
//! that point, so a whole scheduler can be written to a save game and
//! rebuilt later. Host-defined tasks opt in through [`Task::save_state`].

use crate::error::SaveError;
use crate::scheduler::{
    Character, DelayTask, Process, ProcessId, Task, WaitForProcessTask,
};
use crate::script::{ScriptTask, StackEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The resume point of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// A script interpreter frame.
    Script {
        /// The operand and return-address stack, bottom first.
        stack: Vec<StackEntry>,
        /// The next instruction to execute.
        pc: u32,
        /// What must be pushed before executing `pc`.
        resume: ResumeState,
    },
    /// A timed delay.
    Delay {
        /// The requested duration in milliseconds.
        duration: u32,
        /// The clock reading the delay ends at, once started. Wraps with the clock.
        end_time: Option<u32>,
    },
    /// A wait for another process to disappear.
    WaitForProcess {
        /// The awaited process name.
        name: String,
    },
}

/// What a script task pushes when it resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeState {
    /// Nothing; continue at `pc`.
    Continue,
    /// The return value of the child task that just finished.
    PushResult,
    /// A fixed value (yielding kernels, fork children).
    PushValue(i32),
}

impl TaskState {
    /// Rebuilds the live task.
    pub fn into_task(self) -> Box<dyn Task> {
        match self {
            TaskState::Script { stack, pc, resume } => {
                Box::new(ScriptTask::from_state(stack, pc, resume))
            }
            TaskState::Delay { duration, end_time } => {
                Box::new(DelayTask::from_state(duration, end_time))
            }
            TaskState::WaitForProcess { name } => Box::new(WaitForProcessTask::new(name)),
        }
    }
}

/// One process: identity plus its task stack, bottom first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    /// The process id.
    pub pid: ProcessId,
    /// The character slot.
    pub character: Character,
    /// The diagnostic name.
    pub name: String,
    /// The most recent task return value.
    pub last_return_value: i32,
    /// The task stack, bottom first.
    pub tasks: Vec<TaskState>,
}

impl ProcessState {
    pub(crate) fn capture(process: &Process) -> Result<Self, SaveError> {
        let tasks = process
            .tasks()
            .iter()
            .map(|task| {
                task.save_state().ok_or_else(|| SaveError::UnsaveableTask {
                    pid: process.pid(),
                    name: process.name().to_owned(),
                    task: task.describe(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            pid: process.pid(),
            character: process.character(),
            name: process.name().to_owned(),
            last_return_value: process.last_return_value(),
            tasks,
        })
    }

    pub(crate) fn into_process(self) -> Process {
        let tasks = self.tasks.into_iter().map(TaskState::into_task).collect();
        Process::from_parts(
            self.pid,
            self.character,
            self.name,
            tasks,
            self.last_return_value,
        )
    }
}

/// Everything the scheduler needs to resume between two ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerState {
    /// Processes queued for the next tick, in run order.
    pub next: Vec<ProcessState>,
    /// Backed-up processes.
    pub backup: Vec<ProcessState>,
    /// The next pid to assign.
    pub next_pid: u32,
}

impl SchedulerState {
    /// Checks that every pid is unique and that `next_pid` can only hand
    /// out fresh ones.
    pub(crate) fn validate(&self) -> Result<(), SaveError> {
        let mut seen = HashSet::new();
        for process in self.next.iter().chain(&self.backup) {
            if !seen.insert(process.pid) {
                return Err(SaveError::DuplicatePid { pid: process.pid });
            }
        }
        let highest = seen.iter().map(|pid| pid.0).max().unwrap_or(0);
        if self.next_pid <= highest || self.next_pid == u32::MAX {
            return Err(SaveError::InvalidNextPid {
                next_pid: self.next_pid,
                highest,
            });
        }
        Ok(())
    }
}

/// A complete engine snapshot: scheduler plus variable memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    /// The scheduler snapshot.
    pub scheduler: SchedulerState,
    /// The program's variable memory, one word per variable.
    pub variables: Vec<i32>,
}

impl EngineState {
    /// Encodes the snapshot with bincode.
    pub fn encode(&self) -> Result<Vec<u8>, SaveError> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    /// Decodes a snapshot produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, SaveError> {
        let (state, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_encoding() {
        let state = EngineState {
            scheduler: SchedulerState {
                next: vec![ProcessState {
                    pid: ProcessId(4),
                    character: Character::Second,
                    name: "door/open".into(),
                    last_return_value: -1,
                    tasks: vec![
                        TaskState::Script {
                            stack: vec![StackEntry::ReturnAddress(None), StackEntry::Value(12)],
                            pc: 7,
                            resume: ResumeState::PushResult,
                        },
                        TaskState::Delay {
                            duration: 250,
                            end_time: Some(1250),
                        },
                    ],
                }],
                backup: Vec::new(),
                next_pid: 5,
            },
            variables: vec![0, 42, -7],
        };

        let bytes = state.encode().unwrap();
        let decoded = EngineState::decode(&bytes).unwrap();

        assert_eq!(decoded, state);
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        let err = EngineState::decode(&[]).unwrap_err();
        assert!(matches!(err, SaveError::Decode(_)), "got {err}");
    }
}
