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

//! Integration tests for the bytecode interpreter and the built-in kernels.

use std::cell::RefCell;
use std::rc::Rc;
use tapir_core::ManualClock;
use tapir_script::{
    builtin, Character, DelayTask, KernelOutcome, KernelTable, ProcessId, ProgramWriter, Scheduler,
    Script, ScriptConfig, ScriptEngine, ScriptError, ScriptOp, ScriptTask, StackEntry, Task,
    TaskContext, TaskReturn,
};

const WAIT_KERNEL: i32 = 100;

/// Helper: runs a bare script task once outside any scheduler tick.
fn run_once(
    task: &mut ScriptTask,
    script: &mut Script,
    kernels: &KernelTable,
    config: &ScriptConfig,
    return_value: i32,
) -> Result<TaskReturn, ScriptError> {
    let mut scheduler = Scheduler::new();
    let clock = ManualClock::new(0);
    let mut ctx = TaskContext {
        scheduler: &mut scheduler,
        script,
        kernels,
        clock: &clock,
        config,
        pid: ProcessId(1),
        character: Character::None,
        name: "test",
        return_value,
    };
    task.run(&mut ctx)
}

/// Helper: assembles `ops` as procedure "main" and runs it to its first
/// suspension point.
fn evaluate(ops: &[(ScriptOp, i32)]) -> Result<TaskReturn, ScriptError> {
    let mut writer = ProgramWriter::new();
    let entry = writer.procedure("main");
    for &(op, arg) in ops {
        writer.emit(op, arg);
    }
    let mut script = writer.build("eval")?;
    let mut task = ScriptTask::new(entry);
    run_once(
        &mut task,
        &mut script,
        &KernelTable::with_builtins(),
        &ScriptConfig::default(),
        0,
    )
}

fn finished_with(result: Result<TaskReturn, ScriptError>) -> i32 {
    match result {
        Ok(TaskReturn::Finish(value)) => value,
        other => panic!("expected the task to finish, got {other:?}"),
    }
}

/// Helper: an engine over `writer` with the built-in kernels and a shared
/// manual clock.
fn engine(writer: &ProgramWriter) -> (ScriptEngine, Rc<ManualClock>) {
    let clock = Rc::new(ManualClock::new(0));
    let script = writer.build("test").unwrap();
    let engine = ScriptEngine::new(script, KernelTable::with_builtins(), Rc::clone(&clock));
    (engine, clock)
}

// ─────────────────────────────────────────────────────────────────────────────
// Arithmetic and control flow
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_add_and_return_in_one_step() {
    let result = evaluate(&[
        (ScriptOp::PushValue, 3),
        (ScriptOp::PushValue, 4),
        (ScriptOp::Add, 0),
        (ScriptOp::Return, 0),
    ]);
    assert_eq!(finished_with(result), 7);
}

#[test]
fn test_first_popped_operand_is_the_left_hand_side() {
    let sub = evaluate(&[
        (ScriptOp::PushValue, 10),
        (ScriptOp::PushValue, 3),
        (ScriptOp::Sub, 0),
        (ScriptOp::Return, 0),
    ]);
    assert_eq!(finished_with(sub), -7, "3 - 10");

    let less = evaluate(&[
        (ScriptOp::PushValue, 1),
        (ScriptOp::PushValue, 2),
        (ScriptOp::Less, 0),
        (ScriptOp::Return, 0),
    ]);
    assert_eq!(finished_with(less), 0, "2 < 1 is false");
}

#[test]
fn test_arithmetic_wraps() {
    let result = evaluate(&[
        (ScriptOp::PushValue, 1),
        (ScriptOp::PushValue, i32::MAX),
        (ScriptOp::Add, 0),
        (ScriptOp::Negate, 0),
        (ScriptOp::Return, 0),
    ]);
    assert_eq!(finished_with(result), i32::MIN.wrapping_neg());
}

#[test]
fn test_boolean_and_bitwise_ops() {
    let not = evaluate(&[(ScriptOp::PushValue, 0), (ScriptOp::BooleanNot, 0), (ScriptOp::Return, 0)]);
    assert_eq!(finished_with(not), 1);

    let mixed = evaluate(&[
        (ScriptOp::PushValue, 0b0110),
        (ScriptOp::PushValue, 0b0011),
        (ScriptOp::BitAnd, 0),
        (ScriptOp::PushValue, 0b1000),
        (ScriptOp::BitOr, 0),
        (ScriptOp::Return, 0),
    ]);
    assert_eq!(finished_with(mixed), 0b1010);
}

#[test]
fn test_conditional_jump_is_relative_to_itself() {
    let result = evaluate(&[
        (ScriptOp::PushValue, 0),
        (ScriptOp::JumpIfFalse, 3),
        (ScriptOp::PushValue, 111),
        (ScriptOp::Return, 0),
        (ScriptOp::PushValue, 222),
        (ScriptOp::Return, 0),
    ]);
    assert_eq!(finished_with(result), 222);
}

#[test]
fn test_backward_jump_loop() {
    // counter = 3; while counter != 0 { counter -= 1 }; return 9
    let mut writer = ProgramWriter::new();
    let counter = writer.variable("counter");
    let entry = writer.procedure("main");
    writer.emit(ScriptOp::PushAddr, counter);
    writer.emit(ScriptOp::PushValue, 3);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::PopN, 1);
    let top = writer.emit(ScriptOp::PushAddr, counter);
    writer.emit(ScriptOp::Deref, 0);
    let exit = writer.emit(ScriptOp::JumpIfFalse, 0);
    writer.emit(ScriptOp::PushAddr, counter);
    writer.emit(ScriptOp::PushValue, 1);
    writer.emit(ScriptOp::PushAddr, counter);
    writer.emit(ScriptOp::Deref, 0);
    writer.emit(ScriptOp::Sub, 0);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::PopN, 1);
    let back = writer.emit(ScriptOp::Jump, 0);
    writer.patch(back, top as i32 - back as i32);
    let done = writer.emit(ScriptOp::PushValue, 9);
    writer.patch(exit, done as i32 - exit as i32);
    writer.emit(ScriptOp::Return, 0);
    let mut script = writer.build("loop").unwrap();

    let result = run_once(
        &mut ScriptTask::new(entry),
        &mut script,
        &KernelTable::new(),
        &ScriptConfig::default(),
        0,
    );

    assert_eq!(finished_with(result), 9);
    assert_eq!(script.variable("counter").unwrap(), 0);
}

#[test]
fn test_script_call_and_return() {
    let mut writer = ProgramWriter::new();
    let main = writer.procedure("main");
    let call = writer.emit(ScriptOp::ScriptCall, 0);
    writer.emit(ScriptOp::Return, 0);
    let callee = writer.procedure("answer");
    writer.emit(ScriptOp::PushValue, 21);
    writer.emit(ScriptOp::PushValue, 2);
    writer.emit(ScriptOp::Mul, 0);
    writer.emit(ScriptOp::Return, 0);
    writer.patch(call, callee as i32 + 1);
    let mut script = writer.build("call").unwrap();

    let result = run_once(
        &mut ScriptTask::new(main),
        &mut script,
        &KernelTable::new(),
        &ScriptConfig::default(),
        0,
    );

    assert_eq!(finished_with(result), 42);
}

#[test]
fn test_store_pushes_value_back() {
    let mut writer = ProgramWriter::new();
    let x = writer.variable("x");
    let y = writer.variable("y");
    let entry = writer.procedure("main");
    // x = y = 5
    writer.emit(ScriptOp::PushAddr, x);
    writer.emit(ScriptOp::PushAddr, y);
    writer.emit(ScriptOp::PushValue, 5);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::Return, 0);
    let mut script = writer.build("store").unwrap();

    let result = run_once(
        &mut ScriptTask::new(entry),
        &mut script,
        &KernelTable::new(),
        &ScriptConfig::default(),
        0,
    );

    assert_eq!(finished_with(result), 5);
    assert_eq!(script.variable("x").unwrap(), 5);
    assert_eq!(script.variable("y").unwrap(), 5);
}

// ─────────────────────────────────────────────────────────────────────────────
// Fatal conditions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_crash_opcodes_are_fatal() {
    for op in [ScriptOp::Crash5, ScriptOp::Crash12, ScriptOp::Crash36] {
        let err = evaluate(&[(op, 0)]).unwrap_err();
        assert!(
            matches!(err, ScriptError::CrashInstruction { pc: 0, opcode } if opcode == op.opcode()),
            "got {err}"
        );
    }
}

#[test]
fn test_unknown_opcode_is_invalid() {
    let mut writer = ProgramWriter::new();
    let entry = writer.procedure("main");
    writer.emit_raw(99, 0);
    let mut script = writer.build("invalid").unwrap();

    let err = run_once(
        &mut ScriptTask::new(entry),
        &mut script,
        &KernelTable::new(),
        &ScriptConfig::default(),
        0,
    )
    .unwrap_err();

    assert!(matches!(err, ScriptError::InvalidInstruction { opcode: 99, .. }), "got {err}");
}

#[test]
fn test_stack_discipline_violations() {
    let underflow = evaluate(&[(ScriptOp::PopN, 2)]).unwrap_err();
    assert!(matches!(underflow, ScriptError::StackUnderflow { pc: 0 }), "got {underflow}");

    let mismatch = evaluate(&[(ScriptOp::PushValue, 1), (ScriptOp::Deref, 0)]).unwrap_err();
    assert!(
        matches!(mismatch, ScriptError::StackTypeMismatch { expected: "variable", .. }),
        "got {mismatch}"
    );

    let misaligned = evaluate(&[(ScriptOp::PushAddr, 2)]).unwrap_err();
    assert!(matches!(misaligned, ScriptError::InvalidOperand { .. }), "got {misaligned}");
}

#[test]
fn test_out_of_range_variable_and_string() {
    let variable = evaluate(&[(ScriptOp::PushAddr, 400), (ScriptOp::Deref, 0)]).unwrap_err();
    assert!(matches!(variable, ScriptError::Span(_)), "got {variable}");
    assert!(variable.to_string().contains("variables"), "got {variable}");

    let string = evaluate(&[(ScriptOp::LoadString, 0)]).unwrap_err();
    assert!(matches!(string, ScriptError::Span(_)), "got {string}");
}

#[test]
fn test_running_off_the_end() {
    let err = evaluate(&[(ScriptOp::Nop, 0)]).unwrap_err();
    assert!(
        matches!(err, ScriptError::InstructionOutOfRange { pc: 1, count: 1 }),
        "got {err}"
    );

    let jump = evaluate(&[(ScriptOp::Jump, -5)]).unwrap_err();
    assert!(matches!(jump, ScriptError::InvalidJump { target: -5, .. }), "got {jump}");
}

#[test]
fn test_unknown_kernel() {
    let err = evaluate(&[(ScriptOp::KernelCall, 4242)]).unwrap_err();
    assert!(matches!(err, ScriptError::UnknownKernel { selector: 4242, .. }), "got {err}");
}

#[test]
fn test_instruction_budget_stops_infinite_loops() {
    let mut writer = ProgramWriter::new();
    let entry = writer.procedure("spin");
    writer.emit(ScriptOp::Jump, 0);
    let mut script = writer.build("spin").unwrap();
    let config = ScriptConfig {
        instruction_budget: Some(100),
        ..ScriptConfig::default()
    };

    let err = run_once(&mut ScriptTask::new(entry), &mut script, &KernelTable::new(), &config, 0)
        .unwrap_err();

    assert!(
        matches!(err, ScriptError::InstructionBudgetExceeded { budget: 100, .. }),
        "got {err}"
    );
}

#[test]
fn test_stack_depth_limit() {
    let mut writer = ProgramWriter::new();
    let entry = writer.procedure("grow");
    writer.emit(ScriptOp::PushValue, 1);
    writer.emit(ScriptOp::Jump, -1);
    let mut script = writer.build("grow").unwrap();
    let config = ScriptConfig {
        max_stack_depth: 16,
        ..ScriptConfig::default()
    };

    let mut task = ScriptTask::new(entry);
    let err = run_once(&mut task, &mut script, &KernelTable::new(), &config, 0).unwrap_err();

    assert!(matches!(err, ScriptError::StackOverflow { limit: 16, .. }), "got {err}");
    assert_eq!(task.stack().len(), 16);
}

// ─────────────────────────────────────────────────────────────────────────────
// Kernel calls
// ─────────────────────────────────────────────────────────────────────────────

/// A child task finishing immediately with a fixed value.
struct Constant(i32);

impl Task for Constant {
    fn run(&mut self, _ctx: &mut TaskContext<'_>) -> Result<TaskReturn, ScriptError> {
        Ok(TaskReturn::Finish(self.0))
    }

    fn describe(&self) -> String {
        format!("Constant {}", self.0)
    }
}

#[test]
fn test_waiting_kernel_resumes_with_child_result() {
    // Arrange: push 3; <wait kernel>; Add; Return
    let mut writer = ProgramWriter::new();
    let entry = writer.procedure("main");
    writer.emit(ScriptOp::PushValue, 3);
    writer.emit(ScriptOp::KernelCall, WAIT_KERNEL);
    writer.emit(ScriptOp::Add, 0);
    writer.emit(ScriptOp::Return, 0);
    let mut script = writer.build("wait").unwrap();
    let mut kernels = KernelTable::new();
    kernels.register(WAIT_KERNEL, "wait", |_| {
        Ok(KernelOutcome::Wait(Box::new(Constant(40))))
    });
    let config = ScriptConfig::default();
    let mut task = ScriptTask::new(entry);

    // Act
    let first = run_once(&mut task, &mut script, &kernels, &config, 0).unwrap();
    let second = run_once(&mut task, &mut script, &kernels, &config, 40);

    // Assert
    assert!(matches!(first, TaskReturn::Wait(_)), "got {first:?}");
    assert_eq!(task.pc(), 2, "the task resumes after the kernel call");
    assert_eq!(finished_with(second), 43);
}

#[test]
fn test_kernel_arguments_are_peeked() {
    // Arrange: record("hello", 9), then stop to inspect the stack.
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut writer = ProgramWriter::new();
    let greeting = writer.string("hello");
    let entry = writer.procedure("main");
    writer.emit(ScriptOp::LoadString, greeting);
    writer.emit(ScriptOp::PushValue, 9);
    writer.emit(ScriptOp::KernelCall, 7);
    writer.emit(ScriptOp::KernelCall, builtin::YIELD_TICK);
    let mut script = writer.build("args").unwrap();
    let mut kernels = KernelTable::with_builtins();
    let sink = Rc::clone(&seen);
    kernels.register(7, "record", move |call| {
        let number = call.int_arg(0)?;
        let text = call.string_arg(1)?;
        sink.borrow_mut().push(format!("{text} {number}"));
        Ok(KernelOutcome::Complete(number * 2))
    });
    let mut task = ScriptTask::new(entry);

    // Act
    let result = run_once(&mut task, &mut script, &kernels, &ScriptConfig::default(), 0).unwrap();

    // Assert
    assert!(matches!(result, TaskReturn::Yield), "got {result:?}");
    assert_eq!(*seen.borrow(), ["hello 9"]);
    assert_eq!(
        task.stack(),
        [
            StackEntry::ReturnAddress(None),
            StackEntry::String(greeting as u32),
            StackEntry::Value(9),
            StackEntry::Value(18),
        ],
        "arguments stay on the stack below the result"
    );
}

#[test]
fn test_kernel_argument_errors() {
    let mut writer = ProgramWriter::new();
    let entry = writer.procedure("main");
    writer.emit(ScriptOp::PushValue, 1);
    writer.emit(ScriptOp::KernelCall, 1);
    let mut script = writer.build("args").unwrap();
    let mut kernels = KernelTable::new();
    kernels.register(1, "too_deep", |call| Ok(KernelOutcome::Complete(call.int_arg(5)?)));
    kernels.register(2, "wrong_kind", |call| {
        call.string_arg(0)?;
        Ok(KernelOutcome::Complete(0))
    });

    let too_deep = run_once(&mut ScriptTask::new(entry), &mut script, &kernels, &ScriptConfig::default(), 0)
        .unwrap_err();
    script = {
        let mut writer = ProgramWriter::new();
        writer.procedure("main");
        writer.emit(ScriptOp::PushValue, 1);
        writer.emit(ScriptOp::KernelCall, 2);
        writer.build("args").unwrap()
    };
    let wrong_kind = run_once(&mut ScriptTask::new(entry), &mut script, &kernels, &ScriptConfig::default(), 0)
        .unwrap_err();

    assert!(
        matches!(too_deep, ScriptError::ArgumentOutOfRange { index: 5, depth: 2, .. }),
        "got {too_deep}"
    );
    assert!(
        matches!(wrong_kind, ScriptError::StackTypeMismatch { expected: "string", .. }),
        "got {wrong_kind}"
    );
}

#[test]
fn test_delay_kernel_suspends_across_ticks() {
    // Arrange: delay(100); done = 1
    let mut writer = ProgramWriter::new();
    let done = writer.variable("done");
    writer.procedure("main");
    writer.emit(ScriptOp::PushValue, 100);
    writer.emit(ScriptOp::KernelCall, builtin::DELAY);
    writer.emit(ScriptOp::PopN, 2);
    writer.emit(ScriptOp::PushAddr, done);
    writer.emit(ScriptOp::PushValue, 1);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::Return, 0);
    let (mut engine, clock) = engine(&writer);
    engine.create_process(Character::First, "main", false).unwrap();

    // Act & Assert
    engine.tick().unwrap();
    assert_eq!(engine.script().variable("done").unwrap(), 0);
    assert!(engine.debug_dump().contains("Delay 100ms (ends at 100)"));

    clock.advance(100);
    engine.tick().unwrap();
    assert_eq!(engine.script().variable("done").unwrap(), 1);
    assert_eq!(engine.scheduler().process_count(), 0);
}

#[test]
fn test_fork_splits_the_script() {
    // Arrange: if fork() { child = 1 } else { parent = 1 }
    let mut writer = ProgramWriter::new();
    let parent = writer.variable("parent");
    let child = writer.variable("child");
    writer.procedure("main");
    writer.emit(ScriptOp::KernelCall, builtin::FORK);
    let branch = writer.emit(ScriptOp::JumpIfTrue, 0);
    writer.emit(ScriptOp::PushAddr, parent);
    writer.emit(ScriptOp::PushValue, 1);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::Return, 0);
    let child_branch = writer.emit(ScriptOp::PushAddr, child);
    writer.patch(branch, child_branch as i32 - branch as i32);
    writer.emit(ScriptOp::PushValue, 1);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::Return, 0);
    let (mut engine, _clock) = engine(&writer);
    engine.create_process(Character::Second, "main", false).unwrap();

    // Act
    engine.tick().unwrap();
    let after_first = (
        engine.script().variable("parent").unwrap(),
        engine.script().variable("child").unwrap(),
    );
    let forked: Vec<_> = engine
        .scheduler()
        .pending()
        .map(|p| (p.name().to_owned(), p.character()))
        .collect();
    engine.tick().unwrap();

    // Assert
    assert_eq!(after_first, (1, 0), "the parent continues in the same tick");
    assert_eq!(forked, [("main".to_owned(), Character::Second)]);
    assert_eq!(engine.script().variable("child").unwrap(), 1, "the child runs next tick");
    assert_eq!(engine.scheduler().process_count(), 0);
}

#[test]
fn test_create_and_wait_for_process() {
    // Arrange: main spawns "worker", waits for it, then sets done.
    let mut writer = ProgramWriter::new();
    let done = writer.variable("done");
    let worker_name = writer.string("worker");
    writer.procedure("main");
    writer.emit(ScriptOp::LoadString, worker_name);
    writer.emit(ScriptOp::KernelCall, builtin::CREATE_PROCESS);
    writer.emit(ScriptOp::PopN, 2);
    writer.emit(ScriptOp::LoadString, worker_name);
    writer.emit(ScriptOp::KernelCall, builtin::WAIT_FOR_PROCESS);
    writer.emit(ScriptOp::PopN, 2);
    writer.emit(ScriptOp::PushAddr, done);
    writer.emit(ScriptOp::PushValue, 1);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::Return, 0);
    writer.procedure("worker");
    writer.emit(ScriptOp::PushValue, 50);
    writer.emit(ScriptOp::KernelCall, builtin::DELAY);
    writer.emit(ScriptOp::PopN, 1);
    writer.emit(ScriptOp::Return, 0);
    let (mut engine, clock) = engine(&writer);
    engine.create_process(Character::None, "main", false).unwrap();

    // Act: the worker cannot finish before the clock moves.
    for _ in 0..5 {
        engine.tick().unwrap();
    }
    let done_before = engine.script().variable("done").unwrap();
    let names: Vec<String> = engine.scheduler().pending().map(|p| p.name().to_owned()).collect();
    clock.advance(50);
    for _ in 0..2 {
        engine.tick().unwrap();
    }

    // Assert
    assert_eq!(done_before, 0);
    assert_eq!(names, ["worker", "main"], "the worker was queued while main was running");
    assert_eq!(engine.script().variable("done").unwrap(), 1);
    assert_eq!(engine.scheduler().process_count(), 0);
}

#[test]
fn test_yield_tick_resumes_next_tick() {
    let mut writer = ProgramWriter::new();
    let ticks = writer.variable("ticks");
    writer.procedure("main");
    writer.emit(ScriptOp::KernelCall, builtin::YIELD_TICK);
    writer.emit(ScriptOp::PopN, 1);
    writer.emit(ScriptOp::PushAddr, ticks);
    writer.emit(ScriptOp::PushValue, 1);
    writer.emit(ScriptOp::Store, 0);
    writer.emit(ScriptOp::Return, 0);
    let (mut engine, _clock) = engine(&writer);
    engine.create_process(Character::None, "main", false).unwrap();

    engine.tick().unwrap();
    assert_eq!(engine.script().variable("ticks").unwrap(), 0);
    engine.tick().unwrap();
    assert_eq!(engine.script().variable("ticks").unwrap(), 1);
    assert_eq!(engine.ticks(), 2);
}

#[test]
fn test_kill_processes_kernel() {
    let mut writer = ProgramWriter::new();
    writer.procedure("idle");
    writer.emit(ScriptOp::KernelCall, builtin::YIELD_TICK);
    writer.emit(ScriptOp::Jump, -1);
    writer.procedure("reaper");
    writer.emit(ScriptOp::PushValue, Character::First.index());
    writer.emit(ScriptOp::KernelCall, builtin::KILL_PROCESSES);
    writer.emit(ScriptOp::PopN, 1);
    writer.emit(ScriptOp::Return, 0);
    let (mut engine, _clock) = engine(&writer);
    engine.create_process(Character::First, "idle", false).unwrap();
    engine.create_process(Character::Second, "idle", false).unwrap();
    engine.create_process(Character::None, "reaper", false).unwrap();

    engine.tick().unwrap();

    let left: Vec<Character> = engine.scheduler().pending().map(|p| p.character()).collect();
    assert_eq!(left, [Character::Second]);
}

#[test]
fn test_delay_task_in_a_script_process() {
    // A host can stack native tasks on top of script processes too.
    let mut writer = ProgramWriter::new();
    writer.procedure("main");
    writer.emit(ScriptOp::Return, 0);
    let (mut engine, clock) = engine(&writer);
    engine
        .scheduler_mut()
        .create_process(Character::None, "pause", Box::new(DelayTask::new(30)));

    engine.tick().unwrap();
    clock.advance(30);
    engine.tick().unwrap();

    assert_eq!(engine.scheduler().process_count(), 0);
}
