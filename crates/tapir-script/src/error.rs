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

//! Error types of the scripting layer.
//!
//! Every variant of [`ScriptError`] is fatal for the running session: the
//! program image is trusted compiled data, so a violation means the file is
//! corrupt or the interpreter is broken. Hosts are expected to stop.

use crate::scheduler::ProcessId;
use tapir_core::SpanError;
use thiserror::Error;

/// A fatal error raised while loading or executing a script program.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The program stream could not be read.
    #[error("failed to read program: {0}")]
    Io(#[from] std::io::Error),
    /// A span access was rejected.
    #[error(transparent)]
    Span(#[from] SpanError),
    /// The program image violates its format.
    #[error("corrupt program: {0}")]
    CorruptProgram(String),
    /// A variable name is not declared by the program.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    /// A required procedure is not declared by the program.
    #[error("unknown required procedure '{0}'")]
    UnknownProcedure(String),
    /// The instruction pointer left the instruction stream.
    #[error("instruction pointer {pc} out of range ({count} instructions)")]
    InstructionOutOfRange {
        /// The offending instruction index.
        pc: u32,
        /// The number of instructions in the program.
        count: usize,
    },
    /// An opcode outside the instruction set.
    #[error("invalid instruction {opcode} at {pc}")]
    InvalidInstruction {
        /// Index of the instruction.
        pc: u32,
        /// The raw opcode.
        opcode: i32,
    },
    /// One of the always-fatal crash opcodes was executed.
    #[error("crash instruction {opcode} executed at {pc}")]
    CrashInstruction {
        /// Index of the instruction.
        pc: u32,
        /// The raw opcode.
        opcode: i32,
    },
    /// A pop was attempted on an empty stack.
    #[error("stack underflow at {pc}")]
    StackUnderflow {
        /// Index of the instruction.
        pc: u32,
    },
    /// The popped entry has the wrong kind.
    #[error("expected {expected} on the stack at {pc}, found {found}")]
    StackTypeMismatch {
        /// Index of the instruction.
        pc: u32,
        /// The kind the instruction needs.
        expected: &'static str,
        /// A description of the entry actually found.
        found: String,
    },
    /// The stack grew beyond the configured limit.
    #[error("stack overflow at {pc} (limit {limit} entries)")]
    StackOverflow {
        /// Index of the instruction.
        pc: u32,
        /// The configured maximum depth.
        limit: usize,
    },
    /// A kernel asked for an argument below the bottom of the stack.
    #[error("kernel argument {index} out of range at {pc} (stack depth {depth})")]
    ArgumentOutOfRange {
        /// Index of the instruction.
        pc: u32,
        /// The requested argument.
        index: usize,
        /// The stack depth at the call.
        depth: usize,
    },
    /// An operand that must be a non-negative count or aligned offset is not.
    #[error("invalid operand {operand} for {op} at {pc}")]
    InvalidOperand {
        /// Index of the instruction.
        pc: u32,
        /// The instruction name.
        op: &'static str,
        /// The raw operand.
        operand: i32,
    },
    /// A jump or call target outside the instruction stream.
    #[error("jump from {pc} to invalid target {target}")]
    InvalidJump {
        /// Index of the instruction.
        pc: u32,
        /// The computed target.
        target: i64,
    },
    /// No kernel is registered under the selector.
    #[error("unknown kernel {selector} called at {pc}")]
    UnknownKernel {
        /// Index of the instruction.
        pc: u32,
        /// The kernel selector.
        selector: i32,
    },
    /// A kernel rejected its arguments.
    #[error("kernel '{kernel}' failed: {message}")]
    KernelFailed {
        /// The kernel name.
        kernel: &'static str,
        /// What went wrong.
        message: String,
    },
    /// A task ran more instructions in one step than allowed.
    #[error("process {pid} exceeded its instruction budget of {budget} at {pc}")]
    InstructionBudgetExceeded {
        /// The offending process.
        pid: ProcessId,
        /// Index of the instruction.
        pc: u32,
        /// The configured budget.
        budget: u32,
    },
    /// The configuration text could not be parsed.
    #[error("invalid script configuration: {0}")]
    Config(#[from] ron::error::SpannedError),
}

/// An error raised while saving or restoring scheduler state.
#[derive(Debug, Error)]
pub enum SaveError {
    /// A task cannot describe its resume point as plain data.
    #[error("process {pid} ('{name}') holds a task that cannot be saved: {task}")]
    UnsaveableTask {
        /// The owning process.
        pid: ProcessId,
        /// The owning process's name.
        name: String,
        /// The task's description.
        task: String,
    },
    /// State was requested while a tick is being executed.
    #[error("cannot save or restore while a tick is in progress")]
    TickInProgress,
    /// Two saved processes share a pid.
    #[error("saved state holds more than one process with pid {pid}")]
    DuplicatePid {
        /// The repeated pid.
        pid: ProcessId,
    },
    /// The saved pid counter is zero, exhausted, or not above every saved pid.
    #[error("saved next pid {next_pid} is invalid (highest saved pid is {highest})")]
    InvalidNextPid {
        /// The saved counter.
        next_pid: u32,
        /// The highest pid among the saved processes, or 0 if there are none.
        highest: u32,
    },
    /// The saved variable memory does not match the loaded program.
    #[error("saved state has {found} variables but the program declares {expected}")]
    VariableCountMismatch {
        /// Variables in the loaded program.
        expected: usize,
        /// Variables in the saved state.
        found: usize,
    },
    /// Encoding failed.
    #[error("failed to encode state: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// Decoding failed.
    #[error("failed to decode state: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
