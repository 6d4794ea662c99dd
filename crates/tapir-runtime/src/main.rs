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

//! Loads a compiled program, spawns one procedure and ticks the engine until
//! every process has finished or the tick limit is reached.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tapir_core::{Clock, GameClock, ManualClock};
use tapir_script::{Character, KernelTable, Script, ScriptConfig, ScriptEngine};

#[derive(Debug, Parser)]
#[command(version, about = "Run a compiled Tapir script program")]
struct Args {
    /// Compiled program image.
    program: PathBuf,

    /// Procedure to spawn (`behavior/action` for behaviour procedures).
    #[arg(short, long, default_value = "main")]
    entry: String,

    /// Character slot of the spawned process (0 = none, 1, 2).
    #[arg(long, default_value_t = 0)]
    character: i32,

    /// Stop after this many ticks; 0 runs until no process is left.
    #[arg(short, long, default_value_t = 0)]
    ticks: u64,

    /// Milliseconds per tick.
    #[arg(long, default_value_t = 16)]
    tick_rate: u32,

    /// Advance a simulated clock by the tick rate instead of sleeping.
    #[arg(long)]
    fast: bool,

    /// RON file with interpreter settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the process dump after every tick.
    #[arg(long)]
    dump: bool,
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
    run(Args::parse())
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ScriptConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ScriptConfig::default(),
    };
    let Some(character) = Character::from_index(args.character) else {
        bail!("no character slot {}", args.character);
    };
    let script = Script::load_file(&args.program)
        .with_context(|| format!("failed to load program {}", args.program.display()))?;

    let manual = Rc::new(ManualClock::new(0));
    let clock: Box<dyn Clock> = if args.fast {
        Box::new(Rc::clone(&manual))
    } else {
        Box::new(GameClock::new())
    };
    let mut engine =
        ScriptEngine::new(script, KernelTable::with_builtins(), clock).with_config(config);

    engine
        .create_process(character, &args.entry, false)
        .with_context(|| format!("failed to spawn '{}'", args.entry))?;

    let tick_rate = Duration::from_millis(u64::from(args.tick_rate));
    while engine.scheduler().process_count() > 0 {
        if args.ticks != 0 && engine.ticks() >= args.ticks {
            log::info!("Tick limit {} reached", args.ticks);
            break;
        }
        engine
            .tick()
            .with_context(|| format!("tick {} failed", engine.ticks()))?;
        if args.dump {
            print!("{}", engine.debug_dump());
        }
        if args.fast {
            manual.advance(args.tick_rate);
        } else {
            std::thread::sleep(tick_rate);
        }
    }

    log::info!("Stopped after {} ticks at {} ms", engine.ticks(), engine.millis());
    print!("{}", engine.debug_dump());
    Ok(())
}
