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

//! Assembles program images in the format [`Script::load`] reads.
//!
//! Used by tools and tests that need small hand-written programs.

use super::op::{Instruction, ScriptOp};
use super::Script;
use crate::error::ScriptError;
use std::io::{self, Write};
use tapir_core::WriteExt;

/// An in-memory program under construction.
#[derive(Debug, Clone, Default)]
pub struct ProgramWriter {
    strings: Vec<u8>,
    variables: Vec<String>,
    procedures: Vec<(String, u32)>,
    behaviors: Vec<(String, Vec<(String, u32)>)>,
    instructions: Vec<Instruction>,
}

impl ProgramWriter {
    /// Creates an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable and returns its byte offset, the operand of
    /// [`ScriptOp::PushAddr`].
    pub fn variable(&mut self, name: impl Into<String>) -> i32 {
        self.variables.push(name.into());
        ((self.variables.len() - 1) * 4) as i32
    }

    /// Appends a NUL-terminated string and returns its byte offset.
    pub fn string(&mut self, text: &str) -> i32 {
        let offset = self.strings.len() as i32;
        self.strings.extend_from_slice(text.as_bytes());
        self.strings.push(0);
        offset
    }

    /// Starts procedure `name` at the next instruction and returns its
    /// zero-based entry point.
    pub fn procedure(&mut self, name: impl Into<String>) -> u32 {
        let entry = self.position();
        self.procedures.push((name.into(), entry));
        entry
    }

    /// Starts procedure `action` of `behavior` at the next instruction.
    pub fn behavior_procedure(&mut self, behavior: &str, action: impl Into<String>) -> u32 {
        let entry = self.position();
        let action = (action.into(), entry);
        match self.behaviors.iter_mut().find(|(name, _)| name == behavior) {
            Some((_, procedures)) => procedures.push(action),
            None => self.behaviors.push((behavior.to_owned(), vec![action])),
        }
        entry
    }

    /// Returns the index the next instruction will get.
    pub fn position(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Appends an instruction and returns its index.
    pub fn emit(&mut self, op: ScriptOp, arg: i32) -> u32 {
        self.emit_raw(op.opcode(), arg)
    }

    /// Appends an instruction with an arbitrary opcode.
    pub fn emit_raw(&mut self, opcode: i32, arg: i32) -> u32 {
        let index = self.position();
        self.instructions.push(Instruction { opcode, arg });
        index
    }

    /// Rewrites the operand of an already emitted instruction, e.g. a
    /// forward jump.
    pub fn patch(&mut self, index: u32, arg: i32) {
        if let Some(instruction) = self.instructions.get_mut(index as usize) {
            instruction.arg = arg;
        }
    }

    /// Serialises the program.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_u32_le(self.strings.len() as u32)?;
        out.write_u32_le((self.variables.len() * 4) as u32)?;
        out.write_all(&self.strings)?;

        out.write_u32_le(self.variables.len() as u32)?;
        for (slot, name) in self.variables.iter().enumerate() {
            out.write_varstring(name.as_bytes())?;
            out.write_u32_le((slot * 4) as u32)?;
        }

        write_procedures(out, &self.procedures)?;
        out.write_u32_le(self.behaviors.len() as u32)?;
        for (behavior, procedures) in &self.behaviors {
            out.write_varstring(behavior.as_bytes())?;
            out.write_u32_le(0)?;
            write_procedures(out, procedures)?;
        }

        out.write_u32_le(self.instructions.len() as u32)?;
        for instruction in &self.instructions {
            out.write_i32_le(instruction.opcode)?;
            out.write_i32_le(instruction.arg)?;
        }
        Ok(())
    }

    /// Returns the serialised program.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Serialises and loads the program.
    pub fn build(&self, name: &str) -> Result<Script, ScriptError> {
        Script::from_bytes(name, &self.to_bytes()?)
    }
}

fn write_procedures<W: Write + ?Sized>(out: &mut W, procedures: &[(String, u32)]) -> io::Result<()> {
    out.write_u32_le(procedures.len() as u32)?;
    for (name, entry) in procedures {
        out.write_varstring(name.as_bytes())?;
        out.write_u32_le(entry + 1)?;
        out.write_u32_le(0)?;
    }
    Ok(())
}
