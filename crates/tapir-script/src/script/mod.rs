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

//! Compiled script programs and the interpreter that runs them.

mod kernel;
mod op;
mod task;
mod writer;

pub use kernel::{builtin, Kernel, KernelCall, KernelOutcome, KernelTable};
pub use op::{Instruction, ScriptOp};
pub use task::{ScriptTask, StackEntry};
pub use writer::ProgramWriter;

use crate::error::{SaveError, ScriptError};
use crate::scheduler::{Character, ProcessId, Scheduler};
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tapir_core::{AccessMode, NamedSpan, ReadExt, SpanOwner};

/// A loaded program image plus its mutable variable memory.
///
/// The instruction stream, procedure table and string blob never change
/// after loading. Variables are shared by every process and mutate freely.
pub struct Script {
    name: String,
    instructions: Vec<Instruction>,
    variables: SpanOwner<i32>,
    variable_names: HashMap<String, u32>,
    procedures: HashMap<String, u32>,
    strings: SpanOwner<u8>,
}

/// Largest variable memory a program image may declare, in bytes.
pub const MAX_VARIABLE_MEMORY: usize = 4 << 20;

fn corrupt(message: impl Into<String>) -> ScriptError {
    ScriptError::CorruptProgram(message.into())
}

fn read_procedure_table<R: Read + ?Sized>(
    reader: &mut R,
    prefix: Option<&str>,
    procedures: &mut HashMap<String, u32>,
) -> Result<(), ScriptError> {
    let count = reader.read_u32_le()?;
    for _ in 0..count {
        let name = reader.read_varstring()?;
        let offset = reader.read_u32_le()?;
        reader.read_u32_le()?; // unused
        if offset == 0 {
            return Err(corrupt(format!("procedure '{name}' has offset 0")));
        }
        let key = match prefix {
            Some(behavior) => format!("{behavior}/{name}"),
            None => name,
        };
        procedures.insert(key, offset - 1);
    }
    Ok(())
}

impl Script {
    /// Parses a program image.
    ///
    /// # Errors
    /// Truncated streams, a string blob without terminating NUL, misaligned
    /// variable offsets, behaviour blocks declaring variables and procedure
    /// offsets outside the instruction stream are all rejected.
    pub fn load<R: Read + ?Sized>(name: impl Into<String>, reader: &mut R) -> Result<Self, ScriptError> {
        let name = name.into();
        let string_size = reader.read_u32_le()? as usize;
        let memory_size = reader.read_u32_le()? as usize;

        let strings = SpanOwner::<u8>::allocate_from_stream(reader, string_size)?;
        if strings.as_slice().last().is_some_and(|&last| last != 0) {
            return Err(corrupt("string blob is not NUL-terminated"));
        }

        if memory_size % 4 != 0 {
            return Err(corrupt(format!(
                "variable memory size {memory_size} is not a multiple of 4"
            )));
        }
        if memory_size > MAX_VARIABLE_MEMORY {
            return Err(corrupt(format!(
                "variable memory size {memory_size} exceeds {MAX_VARIABLE_MEMORY} bytes"
            )));
        }
        let variables = SpanOwner::<i32>::allocate(memory_size / 4);

        let mut variable_names = HashMap::new();
        let variable_count = reader.read_u32_le()?;
        for _ in 0..variable_count {
            let variable = reader.read_varstring()?;
            let offset = reader.read_u32_le()? as usize;
            if offset % 4 != 0 || offset / 4 >= variables.size() {
                return Err(corrupt(format!(
                    "variable '{variable}' has invalid offset {offset}"
                )));
            }
            variable_names.insert(variable, (offset / 4) as u32);
        }

        let mut procedures = HashMap::new();
        read_procedure_table(reader, None, &mut procedures)?;

        let behavior_count = reader.read_u32_le()?;
        for _ in 0..behavior_count {
            let behavior = reader.read_varstring()?;
            let behavior_variables = reader.read_u32_le()?;
            if behavior_variables != 0 {
                return Err(corrupt(format!(
                    "behavior '{behavior}' declares {behavior_variables} variables"
                )));
            }
            read_procedure_table(reader, Some(&behavior), &mut procedures)?;
        }

        let instruction_count = reader.read_u32_le()?;
        let mut instructions = Vec::new();
        for _ in 0..instruction_count {
            let opcode = reader.read_i32_le()?;
            let arg = reader.read_i32_le()?;
            instructions.push(Instruction { opcode, arg });
        }

        if let Some((procedure, offset)) = procedures
            .iter()
            .find(|(_, offset)| **offset as usize >= instructions.len())
        {
            return Err(corrupt(format!(
                "procedure '{procedure}' starts at {offset}, past the last instruction"
            )));
        }

        log::info!(
            "Loaded program '{name}': {} instructions, {} variables, {} procedures, {} string bytes",
            instructions.len(),
            variables.size(),
            procedures.len(),
            strings.size()
        );
        Ok(Self {
            name,
            instructions,
            variables,
            variable_names,
            procedures,
            strings,
        })
    }

    /// Parses a program image held in memory.
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self, ScriptError> {
        let mut stream = NamedSpan::new(bytes, name).to_stream(0, None)?;
        let script = Self::load(name, &mut stream)?;
        let trailing = bytes.len() as u64 - stream.position();
        if trailing != 0 {
            log::warn!("Program '{name}' has {trailing} trailing bytes");
        }
        Ok(script)
    }

    /// Reads and parses a program file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&path.display().to_string(), &bytes)
    }

    /// Returns the program name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of instructions.
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Fetches the instruction at `pc`.
    pub fn instruction(&self, pc: u32) -> Result<Instruction, ScriptError> {
        self.instructions
            .get(pc as usize)
            .copied()
            .ok_or(ScriptError::InstructionOutOfRange {
                pc,
                count: self.instructions.len(),
            })
    }

    /// Returns the zero-based entry point of a procedure.
    pub fn procedure(&self, name: &str) -> Option<u32> {
        self.procedures.get(name).copied()
    }

    /// Iterates over every procedure name and entry point.
    pub fn procedures(&self) -> impl Iterator<Item = (&str, u32)> {
        self.procedures.iter().map(|(name, &pc)| (name.as_str(), pc))
    }

    /// Resolves a variable name to its slot.
    pub fn variable_index(&self, name: &str) -> Result<u32, ScriptError> {
        self.variable_names
            .get(name)
            .copied()
            .ok_or_else(|| ScriptError::UnknownVariable(name.to_owned()))
    }

    /// Reads a variable by name.
    pub fn variable(&self, name: &str) -> Result<i32, ScriptError> {
        self.variable_at(self.variable_index(name)?)
    }

    /// Returns a mutable reference to a variable.
    pub fn variable_mut(&mut self, name: &str) -> Result<&mut i32, ScriptError> {
        let index = self.variable_index(name)?;
        self.variables
            .as_mut_slice()
            .get_mut(index as usize)
            .ok_or_else(|| ScriptError::UnknownVariable(name.to_owned()))
    }

    /// Writes a variable by name.
    pub fn set_variable(&mut self, name: &str, value: i32) -> Result<(), ScriptError> {
        let index = self.variable_index(name)?;
        self.set_variable_at(index, value)
    }

    /// Reads the variable in slot `index`.
    pub fn variable_at(&self, index: u32) -> Result<i32, ScriptError> {
        let span = NamedSpan::new(self.variables.as_slice(), "variables");
        Ok(*span.get(index as usize)?)
    }

    /// Writes the variable in slot `index`.
    pub fn set_variable_at(&mut self, index: u32, value: i32) -> Result<(), ScriptError> {
        self.variables
            .span_mut()
            .set(index as usize, value)
            .map_err(|e| e.with_origin("variables", 0))?;
        Ok(())
    }

    /// Returns the whole variable memory.
    pub fn variables(&self) -> &[i32] {
        self.variables.as_slice()
    }

    /// Overwrites the whole variable memory, e.g. from a save game.
    pub fn restore_variables(&mut self, values: &[i32]) -> Result<(), SaveError> {
        if values.len() != self.variables.size() {
            return Err(SaveError::VariableCountMismatch {
                expected: self.variables.size(),
                found: values.len(),
            });
        }
        self.variables.as_mut_slice().copy_from_slice(values);
        Ok(())
    }

    /// Checks that `offset` points inside the string blob.
    pub fn validate_string(&self, offset: u32) -> Result<(), ScriptError> {
        NamedSpan::new(self.strings.as_slice(), "strings").validate(
            offset as usize,
            1,
            AccessMode::Read,
        )?;
        Ok(())
    }

    /// Returns the NUL-terminated string starting at byte `offset`.
    pub fn string_at(&self, offset: u32) -> Result<Cow<'_, str>, ScriptError> {
        self.validate_string(offset)?;
        let span = NamedSpan::new(self.strings.as_slice(), "strings");
        Ok(span.get_string_at(offset as usize, None)?)
    }

    /// Spawns a process running `procedure` from its entry point.
    ///
    /// A missing procedure is an error unless `allow_missing` is set, in
    /// which case no process is created and `None` is returned.
    pub fn create_process(
        &self,
        scheduler: &mut Scheduler,
        character: Character,
        procedure: &str,
        allow_missing: bool,
    ) -> Result<Option<ProcessId>, ScriptError> {
        let Some(entry) = self.procedure(procedure) else {
            if allow_missing {
                log::warn!("Optional procedure '{procedure}' is missing");
                return Ok(None);
            }
            return Err(ScriptError::UnknownProcedure(procedure.to_owned()));
        };
        let task = ScriptTask::new(entry);
        Ok(Some(scheduler.create_process(character, procedure, Box::new(task))))
    }

    /// Spawns the `action` procedure of `behavior`.
    pub fn create_behavior_process(
        &self,
        scheduler: &mut Scheduler,
        character: Character,
        behavior: &str,
        action: &str,
        allow_missing: bool,
    ) -> Result<Option<ProcessId>, ScriptError> {
        self.create_process(
            scheduler,
            character,
            &format!("{behavior}/{action}"),
            allow_missing,
        )
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("instructions", &self.instructions.len())
            .field("variables", &self.variables.size())
            .field("procedures", &self.procedures.len())
            .field("strings", &self.strings.size())
            .finish()
    }
}
