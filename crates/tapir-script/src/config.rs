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

//! Interpreter configuration.

use crate::error::ScriptError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Limits and diagnostics applied to every script task.
///
/// Loadable from RON; missing fields keep their defaults:
///
/// ```ron
/// (max_stack_depth: 1024, instruction_budget: Some(100000))
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Maximum number of stack entries a single script task may hold.
    pub max_stack_depth: usize,
    /// Maximum number of instructions a task may execute in one step before
    /// it must suspend. `None` disables the check.
    pub instruction_budget: Option<u32>,
    /// Log every kernel call at debug level.
    pub trace_kernel_calls: bool,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: 4096,
            instruction_budget: None,
            trace_kernel_calls: false,
        }
    }
}

impl ScriptConfig {
    /// Parses a configuration from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ScriptError> {
        Ok(ron::from_str(text)?)
    }

    /// Reads and parses a RON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }
}
