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

//! Cooperative, double-buffered process scheduling.
//!
//! Each call to [`Scheduler::run`] is one tick. Processes that keep running
//! are queued for the next tick in the order they ran; processes spawned
//! during a tick are appended behind them and first run on the following
//! tick. There is no preemption and no priority.

mod process;
mod task;
mod tasks;

pub use process::{Character, Process, ProcessId, ProcessStatus};
pub use task::{Environment, Task, TaskContext, TaskReturn};
pub use tasks::{DelayTask, WaitForProcessTask, WaitForSemaphoreTask};

use crate::error::{SaveError, ScriptError};
use crate::state::{ProcessState, SchedulerState};
use std::fmt;

/// Identity of the process being stepped; its slot in `current` is empty
/// while it runs.
#[derive(Debug)]
struct RunningProcess {
    pid: ProcessId,
    character: Character,
    name: String,
}

/// Owns every live process and decides which of them run each tick.
#[derive(Debug)]
pub struct Scheduler {
    /// The processes of the tick in progress. Slots become `None` once their
    /// process has been stepped or killed.
    current: Vec<Option<Process>>,
    next: Vec<Process>,
    backup: Vec<Process>,
    next_pid: u32,
    /// Slot of `current` being stepped; `None` between ticks.
    current_index: Option<usize>,
    running: Option<RunningProcess>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            current: Vec::new(),
            next: Vec::new(),
            backup: Vec::new(),
            next_pid: 1,
            current_index: None,
            running: None,
        }
    }

    /// Returns `true` while [`run`](Self::run) is stepping processes.
    pub fn is_ticking(&self) -> bool {
        self.current_index.is_some()
    }

    /// Processes queued for the next tick, in run order.
    pub fn pending(&self) -> impl Iterator<Item = &Process> {
        self.next.iter()
    }

    /// Processes set aside by [`backup_context`](Self::backup_context).
    pub fn backed_up(&self) -> impl Iterator<Item = &Process> {
        self.backup.iter()
    }

    /// Number of processes that will run next tick.
    pub fn process_count(&self) -> usize {
        self.next.len()
    }

    /// Spawns a process running `task`.
    ///
    /// The process is queued for the next tick; it never runs inside the
    /// current one.
    ///
    /// # Panics
    /// If every pid below `u32::MAX` has already been handed out.
    pub fn create_process(
        &mut self,
        character: Character,
        name: impl Into<String>,
        task: Box<dyn Task>,
    ) -> ProcessId {
        let Some(following) = self.next_pid.checked_add(1) else {
            panic!("Scheduler ran out of process ids");
        };
        let pid = ProcessId(self.next_pid);
        self.next_pid = following;
        let name = name.into();
        log::debug!("Spawning process {pid} '{name}' for {character}: {}", task.describe());
        self.next.push(Process::new(pid, character, name, task));
        pid
    }

    /// Advances every queued process by one step.
    ///
    /// # Panics
    /// If called while a tick is already in progress.
    ///
    /// # Errors
    /// The first fatal error raised by a process stops the tick. The failing
    /// process and every process that had not run yet are kept in the queue
    /// so the state can still be inspected.
    pub fn run(&mut self, env: &mut Environment<'_>) -> Result<(), ScriptError> {
        assert!(
            self.current_index.is_none() && self.current.is_empty(),
            "Scheduler::run must not be re-entered"
        );
        self.current.extend(self.next.drain(..).map(Some));
        log::trace!("Tick with {} processes", self.current.len());

        let mut result = Ok(());
        let mut index = 0;
        while index < self.current.len() {
            self.current_index = Some(index);
            if let Some(mut process) = self.current[index].take() {
                self.running = Some(RunningProcess {
                    pid: process.pid(),
                    character: process.character(),
                    name: process.name().to_owned(),
                });
                let status = process.step(self, env);
                self.running = None;
                match status {
                    Ok(ProcessStatus::Running) => self.next.push(process),
                    Ok(ProcessStatus::Finished) => log::debug!(
                        "Process {} '{}' finished with {}",
                        process.pid(),
                        process.name(),
                        process.last_return_value()
                    ),
                    Err(err) => {
                        self.next.push(process);
                        result = Err(err);
                        break;
                    }
                }
            }
            index += 1;
        }

        self.next.extend(self.current.drain(..).flatten());
        self.current_index = None;
        result
    }

    /// Kills every process bound to `character`, or every process at all
    /// for [`Character::None`].
    ///
    /// During a tick only processes that have not run yet are removed from
    /// the tick in progress; the process currently executing is never
    /// killed by this call. Returns the number of processes killed.
    pub fn kill_all_processes_for(&mut self, character: Character) -> usize {
        let before = self.next.len();
        self.next.retain(|p| !p.character().matches(character));
        let mut killed = before - self.next.len();

        if let Some(index) = self.current_index {
            for slot in self.current.iter_mut().skip(index + 1) {
                if slot.as_ref().is_some_and(|p| p.character().matches(character)) {
                    *slot = None;
                    killed += 1;
                }
            }
        }
        log::debug!("Killed {killed} processes for {character}");
        killed
    }

    /// Kills the first queued process called `name`.
    ///
    /// Returns `false` if no such process exists; that is not an error.
    pub fn kill_process_by_name(&mut self, name: &str) -> bool {
        match self.next.iter().position(|p| p.name() == name) {
            Some(position) => {
                let process = self.next.remove(position);
                log::debug!("Killed process {} '{name}'", process.pid());
                true
            }
            None => false,
        }
    }

    /// Returns `true` if a queued process, the running one, or one still
    /// waiting its turn in the tick in progress is called `name`.
    pub fn has_process_with_name(&self, name: &str) -> bool {
        self.running.as_ref().is_some_and(|p| p.name == name)
            || self.has_other_process_with_name(name)
    }

    /// Like [`has_process_with_name`](Self::has_process_with_name), minus the
    /// running process.
    pub(crate) fn has_other_process_with_name(&self, name: &str) -> bool {
        self.current.iter().flatten().any(|p| p.name() == name)
            || self.next.iter().any(|p| p.name() == name)
    }

    /// Sets every queued process aside, e.g. while a menu runs its own
    /// scripts. Successive backups accumulate.
    ///
    /// # Panics
    /// If called during a tick.
    pub fn backup_context(&mut self) {
        assert!(
            self.current_index.is_none() && self.current.is_empty(),
            "Scheduler::backup_context called during a tick"
        );
        log::info!("Backing up {} processes", self.next.len());
        self.backup.append(&mut self.next);
    }

    /// Requeues every backed-up process ahead of the processes queued since.
    ///
    /// # Panics
    /// If called during a tick.
    pub fn restore_context(&mut self) {
        assert!(
            self.current_index.is_none() && self.current.is_empty(),
            "Scheduler::restore_context called during a tick"
        );
        log::info!("Restoring {} processes", self.backup.len());
        let mut restored = std::mem::take(&mut self.backup);
        restored.append(&mut self.next);
        self.next = restored;
    }

    /// Captures the queued and backed-up processes as plain data.
    ///
    /// # Errors
    /// [`SaveError::TickInProgress`] during a tick, and
    /// [`SaveError::UnsaveableTask`] if any task cannot describe itself as
    /// data.
    pub fn save_state(&self) -> Result<SchedulerState, SaveError> {
        if self.current_index.is_some() || !self.current.is_empty() {
            return Err(SaveError::TickInProgress);
        }
        let save_list = |list: &[Process]| -> Result<Vec<ProcessState>, SaveError> {
            list.iter().map(ProcessState::capture).collect()
        };
        Ok(SchedulerState {
            next: save_list(&self.next)?,
            backup: save_list(&self.backup)?,
            next_pid: self.next_pid,
        })
    }

    /// Replaces every process with the ones described by `state`.
    ///
    /// Nothing is replaced if the state is rejected.
    ///
    /// # Errors
    /// [`SaveError::TickInProgress`] during a tick,
    /// [`SaveError::DuplicatePid`] if two saved processes share a pid, and
    /// [`SaveError::InvalidNextPid`] if the saved pid counter could hand out
    /// a pid already in use.
    pub fn restore_state(&mut self, state: SchedulerState) -> Result<(), SaveError> {
        if self.current_index.is_some() || !self.current.is_empty() {
            return Err(SaveError::TickInProgress);
        }
        state.validate()?;
        self.next = state.next.into_iter().map(ProcessState::into_process).collect();
        self.backup = state
            .backup
            .into_iter()
            .map(ProcessState::into_process)
            .collect();
        self.next_pid = state.next_pid;
        log::info!(
            "Restored {} processes ({} backed up)",
            self.next.len(),
            self.backup.len()
        );
        Ok(())
    }

    /// Writes every process of the current, next and backup lists with one
    /// line per task. During a tick the running process is listed first,
    /// without its tasks.
    pub fn debug_dump(&self, out: &mut impl fmt::Write) -> fmt::Result {
        if let Some(running) = &self.running {
            writeln!(
                out,
                "running: pid {} [{}] '{}'",
                running.pid, running.character, running.name
            )?;
        }
        let pending: Vec<&Process> = self.current.iter().flatten().collect();
        writeln!(out, "current ({}):", pending.len())?;
        for process in pending {
            process.dump(out)?;
        }
        writeln!(out, "next ({}):", self.next.len())?;
        for process in &self.next {
            process.dump(out)?;
        }
        writeln!(out, "backup ({}):", self.backup.len())?;
        for process in &self.backup {
            process.dump(out)?;
        }
        Ok(())
    }
}
