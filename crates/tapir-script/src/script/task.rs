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

//! The bytecode interpreter, run as a cooperative task.

use super::kernel::{KernelCall, KernelOutcome};
use super::op::{Instruction, ScriptOp};
use crate::config::ScriptConfig;
use crate::error::ScriptError;
use crate::scheduler::{Task, TaskContext, TaskReturn};
use crate::state::{ResumeState, TaskState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the interpreter stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackEntry {
    /// An integer.
    Value(i32),
    /// A reference to a variable slot.
    Variable(u32),
    /// A byte offset into the string blob.
    String(u32),
    /// Where to continue after `Return`; `None` marks the outermost frame.
    ReturnAddress(Option<u32>),
}

impl fmt::Display for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackEntry::Value(value) => write!(f, "value {value}"),
            StackEntry::Variable(slot) => write!(f, "variable #{slot}"),
            StackEntry::String(offset) => write!(f, "string @{offset}"),
            StackEntry::ReturnAddress(Some(pc)) => write!(f, "return address {pc}"),
            StackEntry::ReturnAddress(None) => write!(f, "return address (none)"),
        }
    }
}

/// A script thread: a call stack of procedure frames sharing one operand
/// stack, executed until it has to suspend.
///
/// A kernel that suspends leaves a [`ResumeState`] behind; the next `run`
/// first pushes the pending result and then continues at `pc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTask {
    stack: Vec<StackEntry>,
    pc: u32,
    resume: ResumeState,
}

impl ScriptTask {
    /// Starts a thread at instruction `entry`.
    pub fn new(entry: u32) -> Self {
        Self {
            stack: vec![StackEntry::ReturnAddress(None)],
            pc: entry,
            resume: ResumeState::Continue,
        }
    }

    pub(crate) fn from_state(stack: Vec<StackEntry>, pc: u32, resume: ResumeState) -> Self {
        Self { stack, pc, resume }
    }

    /// Returns the next instruction to execute.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Returns the stack, bottom first.
    pub fn stack(&self) -> &[StackEntry] {
        &self.stack
    }

    fn push(&mut self, at: u32, entry: StackEntry, config: &ScriptConfig) -> Result<(), ScriptError> {
        if self.stack.len() >= config.max_stack_depth {
            return Err(ScriptError::StackOverflow {
                pc: at,
                limit: config.max_stack_depth,
            });
        }
        self.stack.push(entry);
        Ok(())
    }

    fn pop(&mut self, at: u32) -> Result<StackEntry, ScriptError> {
        self.stack.pop().ok_or(ScriptError::StackUnderflow { pc: at })
    }

    fn pop_int(&mut self, at: u32) -> Result<i32, ScriptError> {
        match self.pop(at)? {
            StackEntry::Value(value) => Ok(value),
            other => Err(mismatch(at, "value", other)),
        }
    }

    fn pop_variable(&mut self, at: u32) -> Result<u32, ScriptError> {
        match self.pop(at)? {
            StackEntry::Variable(slot) => Ok(slot),
            other => Err(mismatch(at, "variable", other)),
        }
    }

    fn pop_return_address(&mut self, at: u32) -> Result<Option<u32>, ScriptError> {
        match self.pop(at)? {
            StackEntry::ReturnAddress(pc) => Ok(pc),
            other => Err(mismatch(at, "return address", other)),
        }
    }

    /// The first popped operand is the left-hand side.
    fn binary(
        &mut self,
        at: u32,
        config: &ScriptConfig,
        op: impl FnOnce(i32, i32) -> i32,
    ) -> Result<(), ScriptError> {
        let lhs = self.pop_int(at)?;
        let rhs = self.pop_int(at)?;
        self.push(at, StackEntry::Value(op(lhs, rhs)), config)
    }

    fn jump_to(&mut self, at: u32, target: i64, count: usize) -> Result<(), ScriptError> {
        match u32::try_from(target) {
            Ok(pc) if (pc as usize) < count => {
                self.pc = pc;
                Ok(())
            }
            _ => Err(ScriptError::InvalidJump { pc: at, target }),
        }
    }

    /// Executes one instruction. `Some` means the task must leave `run`.
    fn execute(
        &mut self,
        at: u32,
        instruction: Instruction,
        ctx: &mut TaskContext<'_>,
    ) -> Result<Option<TaskReturn>, ScriptError> {
        let op = instruction.op().ok_or(ScriptError::InvalidInstruction {
            pc: at,
            opcode: instruction.opcode,
        })?;
        let arg = instruction.arg;
        let config = ctx.config;
        let count = ctx.script.instruction_count();

        match op {
            ScriptOp::Nop => {}
            ScriptOp::Dup => {
                let top = *self.stack.last().ok_or(ScriptError::StackUnderflow { pc: at })?;
                self.push(at, top, config)?;
            }
            ScriptOp::PushAddr => {
                if arg < 0 || arg % 4 != 0 {
                    return Err(invalid_operand(at, op, arg));
                }
                self.push(at, StackEntry::Variable(arg as u32 / 4), config)?;
            }
            ScriptOp::PushValue => self.push(at, StackEntry::Value(arg), config)?,
            ScriptOp::Deref => {
                let slot = self.pop_variable(at)?;
                let value = ctx.script.variable_at(slot)?;
                self.push(at, StackEntry::Value(value), config)?;
            }
            ScriptOp::PopN => {
                if arg < 0 {
                    return Err(invalid_operand(at, op, arg));
                }
                for _ in 0..arg {
                    self.pop(at)?;
                }
            }
            ScriptOp::Store => {
                let value = self.pop_int(at)?;
                let slot = self.pop_variable(at)?;
                ctx.script.set_variable_at(slot, value)?;
                self.push(at, StackEntry::Value(value), config)?;
            }
            ScriptOp::LoadString | ScriptOp::LoadString2 => {
                if arg < 0 {
                    return Err(invalid_operand(at, op, arg));
                }
                ctx.script.validate_string(arg as u32)?;
                self.push(at, StackEntry::String(arg as u32), config)?;
            }
            ScriptOp::ScriptCall => {
                let return_to = self.pc;
                self.jump_to(at, i64::from(arg) - 1, count)?;
                self.push(at, StackEntry::ReturnAddress(Some(return_to)), config)?;
            }
            ScriptOp::KernelCall => return self.kernel_call(at, arg, ctx),
            ScriptOp::JumpIfFalse => {
                if self.pop_int(at)? == 0 {
                    self.jump_to(at, i64::from(at) + i64::from(arg), count)?;
                }
            }
            ScriptOp::JumpIfTrue => {
                if self.pop_int(at)? != 0 {
                    self.jump_to(at, i64::from(at) + i64::from(arg), count)?;
                }
            }
            ScriptOp::Jump => self.jump_to(at, i64::from(at) + i64::from(arg), count)?,
            ScriptOp::Negate => {
                let value = self.pop_int(at)?;
                self.push(at, StackEntry::Value(value.wrapping_neg()), config)?;
            }
            ScriptOp::BooleanNot => {
                let value = self.pop_int(at)?;
                self.push(at, StackEntry::Value((value == 0) as i32), config)?;
            }
            ScriptOp::Mul => self.binary(at, config, i32::wrapping_mul)?,
            ScriptOp::Add => self.binary(at, config, i32::wrapping_add)?,
            ScriptOp::Sub => self.binary(at, config, i32::wrapping_sub)?,
            ScriptOp::Less => self.binary(at, config, |l, r| (l < r) as i32)?,
            ScriptOp::Greater => self.binary(at, config, |l, r| (l > r) as i32)?,
            ScriptOp::LessEquals => self.binary(at, config, |l, r| (l <= r) as i32)?,
            ScriptOp::GreaterEquals => self.binary(at, config, |l, r| (l >= r) as i32)?,
            ScriptOp::Equals => self.binary(at, config, |l, r| (l == r) as i32)?,
            ScriptOp::NotEquals => self.binary(at, config, |l, r| (l != r) as i32)?,
            ScriptOp::BitAnd => self.binary(at, config, |l, r| l & r)?,
            ScriptOp::BitOr => self.binary(at, config, |l, r| l | r)?,
            ScriptOp::Return => {
                let value = self.pop_int(at)?;
                match self.pop_return_address(at)? {
                    None => return Ok(Some(TaskReturn::Finish(value))),
                    Some(return_to) => {
                        self.push(at, StackEntry::Value(value), config)?;
                        self.pc = return_to;
                    }
                }
            }
            ScriptOp::Crash5
            | ScriptOp::Crash8
            | ScriptOp::Crash9
            | ScriptOp::Crash12
            | ScriptOp::Crash21
            | ScriptOp::Crash22
            | ScriptOp::Crash33
            | ScriptOp::Crash34
            | ScriptOp::Crash35
            | ScriptOp::Crash36 => {
                return Err(ScriptError::CrashInstruction {
                    pc: at,
                    opcode: instruction.opcode,
                })
            }
        }
        Ok(None)
    }

    fn kernel_call(
        &mut self,
        at: u32,
        selector: i32,
        ctx: &mut TaskContext<'_>,
    ) -> Result<Option<TaskReturn>, ScriptError> {
        let kernels = ctx.kernels;
        let config = ctx.config;
        let kernel = kernels
            .get(selector)
            .ok_or(ScriptError::UnknownKernel { pc: at, selector })?;
        if config.trace_kernel_calls {
            log::debug!("Process {} calls kernel '{}' at {at}", ctx.pid, kernel.name());
        } else {
            log::trace!("Process {} calls kernel '{}' at {at}", ctx.pid, kernel.name());
        }

        let outcome = kernel.invoke(&mut KernelCall::new(&self.stack, at, ctx))?;
        match outcome {
            KernelOutcome::Complete(value) => {
                self.push(at, StackEntry::Value(value), config)?;
                Ok(None)
            }
            KernelOutcome::Wait(task) => {
                self.resume = ResumeState::PushResult;
                Ok(Some(TaskReturn::Wait(task)))
            }
            KernelOutcome::Yield(value) => {
                self.resume = ResumeState::PushValue(value);
                Ok(Some(TaskReturn::Yield))
            }
            KernelOutcome::Fork => {
                let mut child = self.clone();
                child.resume = ResumeState::PushValue(1);
                let pid = ctx
                    .scheduler
                    .create_process(ctx.character, ctx.name, Box::new(child));
                log::debug!("Process {} forked into {pid} at {at}", ctx.pid);
                self.push(at, StackEntry::Value(0), config)?;
                Ok(None)
            }
        }
    }
}

fn mismatch(at: u32, expected: &'static str, found: StackEntry) -> ScriptError {
    ScriptError::StackTypeMismatch {
        pc: at,
        expected,
        found: found.to_string(),
    }
}

fn invalid_operand(at: u32, op: ScriptOp, operand: i32) -> ScriptError {
    ScriptError::InvalidOperand {
        pc: at,
        op: op.name(),
        operand,
    }
}

impl Task for ScriptTask {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskReturn, ScriptError> {
        let resume_at = self.pc;
        match std::mem::replace(&mut self.resume, ResumeState::Continue) {
            ResumeState::Continue => {}
            ResumeState::PushResult => {
                self.push(resume_at, StackEntry::Value(ctx.return_value), ctx.config)?
            }
            ResumeState::PushValue(value) => {
                self.push(resume_at, StackEntry::Value(value), ctx.config)?
            }
        }

        let mut executed: u32 = 0;
        loop {
            if let Some(budget) = ctx.config.instruction_budget {
                if executed >= budget {
                    return Err(ScriptError::InstructionBudgetExceeded {
                        pid: ctx.pid,
                        pc: self.pc,
                        budget,
                    });
                }
            }
            executed = executed.saturating_add(1);

            let at = self.pc;
            let instruction = ctx.script.instruction(at)?;
            self.pc = at + 1;
            if let Some(ret) = self.execute(at, instruction, ctx)? {
                return Ok(ret);
            }
        }
    }

    fn describe(&self) -> String {
        format!("ScriptTask @ pc {} (stack depth {})", self.pc, self.stack.len())
    }

    fn save_state(&self) -> Option<TaskState> {
        Some(TaskState::Script {
            stack: self.stack.clone(),
            pc: self.pc,
            resume: self.resume,
        })
    }
}
