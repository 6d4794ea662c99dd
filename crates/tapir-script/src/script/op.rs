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

//! The instruction set.

use std::fmt;

macro_rules! script_ops {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)*) => {
        /// A decoded opcode.
        ///
        /// The numbering is fixed by the compiled program format; several
        /// values exist only as always-fatal "crash" instructions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ScriptOp {
            $($(#[$doc])* $name = $value,)*
        }

        impl ScriptOp {
            /// Decodes a raw opcode; `None` for values outside the set.
            pub fn from_opcode(opcode: i32) -> Option<Self> {
                match opcode {
                    $($value => Some(ScriptOp::$name),)*
                    _ => None,
                }
            }

            /// Returns the mnemonic.
            pub fn name(self) -> &'static str {
                match self {
                    $(ScriptOp::$name => stringify!($name),)*
                }
            }
        }
    };
}

script_ops! {
    /// Does nothing.
    Nop = 0,
    /// Pushes a copy of the top entry.
    Dup = 1,
    /// Pushes a variable reference; the operand is a 4-aligned byte offset.
    PushAddr = 2,
    /// Pushes the operand.
    PushValue = 3,
    /// Replaces a variable reference with the variable's value.
    Deref = 4,
    #[allow(missing_docs)]
    Crash5 = 5,
    /// Pops `operand` entries.
    PopN = 6,
    /// Pops a value and a variable reference, stores, pushes the value back.
    Store = 7,
    #[allow(missing_docs)]
    Crash8 = 8,
    #[allow(missing_docs)]
    Crash9 = 9,
    /// Pushes a reference to the string at byte offset `operand`.
    LoadString = 10,
    /// Same as `LoadString`.
    LoadString2 = 11,
    #[allow(missing_docs)]
    Crash12 = 12,
    /// Calls the procedure at one-based instruction offset `operand`.
    ScriptCall = 13,
    /// Invokes the kernel with selector `operand`.
    KernelCall = 14,
    /// Pops a value and jumps by `operand` if it is zero.
    JumpIfFalse = 15,
    /// Pops a value and jumps by `operand` if it is not zero.
    JumpIfTrue = 16,
    /// Jumps by `operand`.
    Jump = 17,
    /// Wrapping negation.
    Negate = 18,
    /// Logical not: 1 for zero, 0 otherwise.
    BooleanNot = 19,
    /// Wrapping multiplication.
    Mul = 20,
    #[allow(missing_docs)]
    Crash21 = 21,
    #[allow(missing_docs)]
    Crash22 = 22,
    /// Wrapping addition.
    Add = 23,
    /// Wrapping subtraction.
    Sub = 24,
    #[allow(missing_docs)]
    Less = 25,
    #[allow(missing_docs)]
    Greater = 26,
    #[allow(missing_docs)]
    LessEquals = 27,
    #[allow(missing_docs)]
    GreaterEquals = 28,
    #[allow(missing_docs)]
    Equals = 29,
    #[allow(missing_docs)]
    NotEquals = 30,
    #[allow(missing_docs)]
    BitAnd = 31,
    #[allow(missing_docs)]
    BitOr = 32,
    #[allow(missing_docs)]
    Crash33 = 33,
    #[allow(missing_docs)]
    Crash34 = 34,
    #[allow(missing_docs)]
    Crash35 = 35,
    #[allow(missing_docs)]
    Crash36 = 36,
    /// Returns from the current procedure.
    Return = 37,
}

impl ScriptOp {
    /// Returns the raw opcode.
    pub fn opcode(self) -> i32 {
        self as i32
    }

    /// Returns `true` for the always-fatal crash instructions.
    pub fn is_crash(self) -> bool {
        matches!(
            self,
            ScriptOp::Crash5
                | ScriptOp::Crash8
                | ScriptOp::Crash9
                | ScriptOp::Crash12
                | ScriptOp::Crash21
                | ScriptOp::Crash22
                | ScriptOp::Crash33
                | ScriptOp::Crash34
                | ScriptOp::Crash35
                | ScriptOp::Crash36
        )
    }
}

impl fmt::Display for ScriptOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One raw instruction as stored in the program image.
///
/// Opcodes are decoded when executed, so images containing crash or unknown
/// opcodes in unreachable code still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// The raw opcode.
    pub opcode: i32,
    /// The operand.
    pub arg: i32,
}

impl Instruction {
    /// Builds an instruction from a known opcode.
    pub fn new(op: ScriptOp, arg: i32) -> Self {
        Self {
            opcode: op.opcode(),
            arg,
        }
    }

    /// Decodes the opcode.
    pub fn op(&self) -> Option<ScriptOp> {
        ScriptOp::from_opcode(self.opcode)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Some(op) => write!(f, "{op} {}", self.arg),
            None => write!(f, "<invalid {}> {}", self.opcode, self.arg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_is_dense() {
        for opcode in 0..=37 {
            let op = ScriptOp::from_opcode(opcode).expect("every value up to 37 is defined");
            assert_eq!(op.opcode(), opcode);
        }
        assert_eq!(ScriptOp::from_opcode(38), None);
        assert_eq!(ScriptOp::from_opcode(-1), None);
    }

    #[test]
    fn crash_opcodes() {
        let crashes: Vec<i32> = (0..=37)
            .filter_map(ScriptOp::from_opcode)
            .filter(|op| op.is_crash())
            .map(ScriptOp::opcode)
            .collect();
        assert_eq!(crashes, vec![5, 8, 9, 12, 21, 22, 33, 34, 35, 36]);
    }

    #[test]
    fn display_uses_mnemonics() {
        assert_eq!(Instruction::new(ScriptOp::PushValue, 3).to_string(), "PushValue 3");
        assert_eq!(Instruction { opcode: 99, arg: 0 }.to_string(), "<invalid 99> 0");
    }
}
