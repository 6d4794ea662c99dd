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

//! Kernel calls: native operations invoked from bytecode.
//!
//! The table is plain data mapping an integer selector to a handler. Games
//! ship hundreds of selectors whose numbering differs per program version,
//! so hosts build their own table; [`KernelTable::with_builtins`] only
//! provides the generic scheduling kernels at the selectors listed in
//! [`builtin`].

use super::task::StackEntry;
use crate::error::ScriptError;
use crate::scheduler::{
    Character, DelayTask, ProcessId, Task, TaskContext, WaitForProcessTask,
};
use std::collections::HashMap;
use std::fmt;

/// How a kernel call ended.
pub enum KernelOutcome {
    /// Push the value and keep executing in the same tick.
    Complete(i32),
    /// Run `task` on top of the calling process; its return value is pushed
    /// when the script resumes.
    Wait(Box<dyn Task>),
    /// Suspend the script until the next tick, then push the value.
    Yield(i32),
    /// Split the calling script in two. A new process continues from the same
    /// point seeing `1`; the caller continues seeing `0`.
    Fork,
}

impl fmt::Debug for KernelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelOutcome::Complete(value) => write!(f, "Complete({value})"),
            KernelOutcome::Wait(task) => write!(f, "Wait({})", task.describe()),
            KernelOutcome::Yield(value) => write!(f, "Yield({value})"),
            KernelOutcome::Fork => write!(f, "Fork"),
        }
    }
}

/// The arguments and environment of one kernel call.
///
/// Arguments are peeked, not popped: argument `i` is the entry `i` slots
/// below the top of the caller's stack. The compiled code pops them itself.
pub struct KernelCall<'c, 'a> {
    stack: &'c [StackEntry],
    pc: u32,
    ctx: &'c mut TaskContext<'a>,
}

impl<'c, 'a> KernelCall<'c, 'a> {
    pub(crate) fn new(stack: &'c [StackEntry], pc: u32, ctx: &'c mut TaskContext<'a>) -> Self {
        Self { stack, pc, ctx }
    }

    /// Returns the index of the calling instruction.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Returns the raw argument `index`.
    pub fn arg(&self, index: usize) -> Result<StackEntry, ScriptError> {
        let depth = self.stack.len();
        depth
            .checked_sub(index + 1)
            .map(|slot| self.stack[slot])
            .ok_or(ScriptError::ArgumentOutOfRange {
                pc: self.pc,
                index,
                depth,
            })
    }

    /// Returns argument `index` as an integer.
    pub fn int_arg(&self, index: usize) -> Result<i32, ScriptError> {
        match self.arg(index)? {
            StackEntry::Value(value) => Ok(value),
            other => Err(self.mismatch("value", other)),
        }
    }

    /// Returns argument `index` as a string.
    pub fn string_arg(&self, index: usize) -> Result<String, ScriptError> {
        match self.arg(index)? {
            StackEntry::String(offset) => Ok(self.ctx.script.string_at(offset)?.into_owned()),
            other => Err(self.mismatch("string", other)),
        }
    }

    /// Returns argument `index` as a variable slot.
    pub fn variable_arg(&self, index: usize) -> Result<u32, ScriptError> {
        match self.arg(index)? {
            StackEntry::Variable(slot) => Ok(slot),
            other => Err(self.mismatch("variable", other)),
        }
    }

    fn mismatch(&self, expected: &'static str, found: StackEntry) -> ScriptError {
        ScriptError::StackTypeMismatch {
            pc: self.pc,
            expected,
            found: found.to_string(),
        }
    }

    /// Returns the calling process's context: scheduler, script, clock.
    pub fn context(&mut self) -> &mut TaskContext<'a> {
        &mut *self.ctx
    }

    /// Returns the calling process id.
    pub fn pid(&self) -> ProcessId {
        self.ctx.pid
    }

    /// Returns the calling process's character slot.
    pub fn character(&self) -> Character {
        self.ctx.character
    }

    /// Returns the calling process's name.
    pub fn process_name(&self) -> &str {
        self.ctx.name
    }

    /// Returns the current clock reading in milliseconds.
    pub fn millis(&self) -> u32 {
        self.ctx.clock.millis()
    }
}

type KernelFn = dyn Fn(&mut KernelCall<'_, '_>) -> Result<KernelOutcome, ScriptError>;

/// A named kernel handler.
pub struct Kernel {
    name: &'static str,
    handler: Box<KernelFn>,
}

impl Kernel {
    /// Returns the kernel's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn invoke(&self, call: &mut KernelCall<'_, '_>) -> Result<KernelOutcome, ScriptError> {
        (self.handler)(call)
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel").field("name", &self.name).finish()
    }
}

/// Selector → handler table consulted by the `KernelCall` instruction.
#[derive(Debug, Default)]
pub struct KernelTable {
    kernels: HashMap<i32, Kernel>,
}

/// Selectors used by [`KernelTable::with_builtins`].
pub mod builtin {
    /// `nop()` → 0.
    pub const NOP: i32 = 0;
    /// `delay(millis)` → 0 once the time has passed.
    pub const DELAY: i32 = 1;
    /// `fork()` → 1 in the new process, 0 in the caller.
    pub const FORK: i32 = 2;
    /// `create_process(name)` → new pid, or 0 if no such procedure.
    pub const CREATE_PROCESS: i32 = 3;
    /// `kill_processes(character)` → number killed; 0 kills every character.
    pub const KILL_PROCESSES: i32 = 4;
    /// `wait_for_process(name)` → 0 once no process has that name.
    pub const WAIT_FOR_PROCESS: i32 = 5;
    /// `yield_tick()` → 0 on the next tick.
    pub const YIELD_TICK: i32 = 6;
}

impl KernelTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table holding the generic kernels.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register_builtins();
        table
    }

    /// Registers `handler` under `selector`, replacing any previous kernel.
    ///
    /// Returns the replaced kernel's name.
    pub fn register<F>(&mut self, selector: i32, name: &'static str, handler: F) -> Option<&'static str>
    where
        F: Fn(&mut KernelCall<'_, '_>) -> Result<KernelOutcome, ScriptError> + 'static,
    {
        let kernel = Kernel {
            name,
            handler: Box::new(handler),
        };
        let replaced = self.kernels.insert(selector, kernel).map(|k| k.name);
        if let Some(previous) = replaced {
            log::warn!("Kernel selector {selector} rebound from '{previous}' to '{name}'");
        }
        replaced
    }

    /// Looks up a kernel.
    pub fn get(&self, selector: i32) -> Option<&Kernel> {
        self.kernels.get(&selector)
    }

    /// Finds the selector a kernel name is registered under.
    pub fn selector_of(&self, name: &str) -> Option<i32> {
        self.kernels
            .iter()
            .find(|(_, kernel)| kernel.name == name)
            .map(|(&selector, _)| selector)
    }

    /// Returns the number of registered kernels.
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Returns `true` if no kernel is registered.
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Registers the generic kernels at their [`builtin`] selectors.
    pub fn register_builtins(&mut self) {
        self.register(builtin::NOP, "nop", |_| Ok(KernelOutcome::Complete(0)));
        self.register(builtin::DELAY, "delay", kernel_delay);
        self.register(builtin::FORK, "fork", |_| Ok(KernelOutcome::Fork));
        self.register(builtin::CREATE_PROCESS, "create_process", kernel_create_process);
        self.register(builtin::KILL_PROCESSES, "kill_processes", kernel_kill_processes);
        self.register(builtin::WAIT_FOR_PROCESS, "wait_for_process", |call| {
            let name = call.string_arg(0)?;
            Ok(KernelOutcome::Wait(Box::new(WaitForProcessTask::new(name))))
        });
        self.register(builtin::YIELD_TICK, "yield_tick", |_| Ok(KernelOutcome::Yield(0)));
    }
}

fn kernel_delay(call: &mut KernelCall<'_, '_>) -> Result<KernelOutcome, ScriptError> {
    let millis = call.int_arg(0)?.max(0) as u32;
    Ok(KernelOutcome::Wait(Box::new(DelayTask::new(millis))))
}

fn kernel_create_process(call: &mut KernelCall<'_, '_>) -> Result<KernelOutcome, ScriptError> {
    let procedure = call.string_arg(0)?;
    let character = call.character();
    let ctx = call.context();
    let pid = ctx
        .script
        .create_process(ctx.scheduler, character, &procedure, true)?;
    Ok(KernelOutcome::Complete(pid.map_or(0, |pid| pid.0 as i32)))
}

fn kernel_kill_processes(call: &mut KernelCall<'_, '_>) -> Result<KernelOutcome, ScriptError> {
    let slot = call.int_arg(0)?;
    let character = Character::from_index(slot).ok_or_else(|| ScriptError::KernelFailed {
        kernel: "kill_processes",
        message: format!("no character slot {slot}"),
    })?;
    let killed = call.context().scheduler.kill_all_processes_for(character);
    Ok(KernelOutcome::Complete(killed as i32))
}
