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

//! The facade a game loop drives: one program, one scheduler, one clock.

use crate::config::ScriptConfig;
use crate::error::{SaveError, ScriptError};
use crate::scheduler::{Character, Environment, ProcessId, Scheduler};
use crate::script::{KernelTable, Script};
use crate::state::EngineState;
use tapir_core::Clock;

/// Owns a loaded [`Script`], its [`Scheduler`], the kernel table and the
/// clock, and advances them one tick at a time.
pub struct ScriptEngine {
    script: Script,
    scheduler: Scheduler,
    kernels: KernelTable,
    clock: Box<dyn Clock>,
    config: ScriptConfig,
    ticks: u64,
}

impl ScriptEngine {
    /// Creates an engine with the default configuration.
    pub fn new(script: Script, kernels: KernelTable, clock: impl Clock + 'static) -> Self {
        Self {
            script,
            scheduler: Scheduler::new(),
            kernels,
            clock: Box::new(clock),
            config: ScriptConfig::default(),
            ticks: 0,
        }
    }

    /// Replaces the interpreter configuration.
    pub fn with_config(mut self, config: ScriptConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the program.
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Returns the program mutably, e.g. to set variables from game logic.
    pub fn script_mut(&mut self) -> &mut Script {
        &mut self.script
    }

    /// Returns the scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns the scheduler mutably.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Returns the kernel table mutably, for registering game kernels.
    pub fn kernels_mut(&mut self) -> &mut KernelTable {
        &mut self.kernels
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Returns the clock reading in milliseconds.
    pub fn millis(&self) -> u32 {
        self.clock.millis()
    }

    /// Returns the number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Spawns a process running `procedure`. See [`Script::create_process`].
    pub fn create_process(
        &mut self,
        character: Character,
        procedure: &str,
        allow_missing: bool,
    ) -> Result<Option<ProcessId>, ScriptError> {
        self.script
            .create_process(&mut self.scheduler, character, procedure, allow_missing)
    }

    /// Runs one scheduler tick.
    pub fn tick(&mut self) -> Result<(), ScriptError> {
        let mut env = Environment {
            script: &mut self.script,
            kernels: &self.kernels,
            clock: &*self.clock,
            config: &self.config,
        };
        self.scheduler.run(&mut env)?;
        self.ticks += 1;
        Ok(())
    }

    /// Captures the scheduler and variable memory.
    pub fn save_state(&self) -> Result<EngineState, SaveError> {
        Ok(EngineState {
            scheduler: self.scheduler.save_state()?,
            variables: self.script.variables().to_vec(),
        })
    }

    /// Captures and encodes the engine state.
    pub fn save(&self) -> Result<Vec<u8>, SaveError> {
        self.save_state()?.encode()
    }

    /// Replaces every process and all variable memory with `state`.
    ///
    /// # Errors
    /// [`SaveError::VariableCountMismatch`] if the state was saved from a
    /// different program; nothing is changed in that case.
    pub fn restore_state(&mut self, state: EngineState) -> Result<(), SaveError> {
        let expected = self.script.variables().len();
        if state.variables.len() != expected {
            return Err(SaveError::VariableCountMismatch {
                expected,
                found: state.variables.len(),
            });
        }
        self.scheduler.restore_state(state.scheduler)?;
        self.script.restore_variables(&state.variables)
    }

    /// Decodes and restores a state produced by [`save`](Self::save).
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), SaveError> {
        let state = EngineState::decode(bytes)?;
        self.restore_state(state)
    }

    /// Renders the scheduler's process dump.
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.scheduler.debug_dump(&mut out);
        out
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("script", &self.script)
            .field("scheduler", &self.scheduler)
            .field("kernels", &self.kernels.len())
            .field("config", &self.config)
            .field("ticks", &self.ticks)
            .finish()
    }
}
