//! Test doubles: a scripting engine whose chunks are host closures, and a
//! command factory that records what it was asked to run.

use crate::builtin::{Cd, Exit, Pwd};
use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Factory};
use crate::context::ExecContext;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::script::engine::ScriptEngine;
use crate::script::value::{Function, Value};
use crate::script::{Bridge, Runtime};
use crate::shell::Shell;
use crate::stream::{Input, Output};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

/// Everything the fake engine did, shared with the test.
#[derive(Default)]
pub(crate) struct FakeState {
    globals: RefCell<HashMap<String, Value>>,
    chunks: RefCell<Vec<Function>>,
    output: RefCell<Option<Output>>,
    input: RefCell<Option<Input>>,
    /// One entry per redirection change: "out" / "in" when installed,
    /// "-out" / "-in" when set back to the host default.
    pub redirects: RefCell<Vec<&'static str>>,
}

impl FakeState {
    /// Register `function` and return the chunk that loads it.
    pub(crate) fn register(&self, function: Function) -> Vec<u8> {
        let mut chunks = self.chunks.borrow_mut();
        chunks.push(function);
        format!("chunk:{}", chunks.len() - 1).into_bytes()
    }

    pub(crate) fn is_redirected(&self) -> bool {
        self.output.borrow().is_some() || self.input.borrow().is_some()
    }
}

pub(crate) struct FakeEngine {
    state: Rc<FakeState>,
}

impl FakeEngine {
    pub(crate) fn new() -> (Self, Rc<FakeState>) {
        let state = Rc::new(FakeState::default());
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }
}

impl ScriptEngine for FakeEngine {
    fn global(&self, name: &str) -> Value {
        self.state
            .globals
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn set_global(&self, name: &str, value: Value) {
        self.state.globals.borrow_mut().insert(name.to_string(), value);
    }

    fn load(&self, name: &str, chunk: &[u8]) -> Result<Function> {
        let index = std::str::from_utf8(chunk)
            .ok()
            .and_then(|text| text.strip_prefix("chunk:"))
            .and_then(|index| index.parse::<usize>().ok())
            .ok_or_else(|| Error::Load(format!("{name}: not a chunk")))?;
        self.state
            .chunks
            .borrow()
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Load(format!("{name}: unknown chunk {index}")))
    }

    fn dump(&self, function: &Function) -> Result<Vec<u8>> {
        Ok(self.state.register(function.clone()))
    }

    fn set_output(&self, output: Option<Output>) -> io::Result<Option<Output>> {
        self.state
            .redirects
            .borrow_mut()
            .push(if output.is_some() { "out" } else { "-out" });
        Ok(self.state.output.replace(output))
    }

    fn set_input(&self, input: Option<Input>) -> io::Result<Option<Input>> {
        self.state
            .redirects
            .borrow_mut()
            .push(if input.is_some() { "in" } else { "-in" });
        Ok(self.state.input.replace(input))
    }
}

/// Records each command it runs and answers with a fixed exit level.
///
/// Like `echo`, it writes its arguments to stdout.
struct RecordingFactory {
    names: &'static [&'static str],
    spawned: Rc<RefCell<Vec<Vec<String>>>>,
    code: ExitCode,
}

struct RecordedCommand {
    spawned: Rc<RefCell<Vec<Vec<String>>>>,
    code: ExitCode,
}

impl CommandFactory for RecordingFactory {
    fn try_create(
        &self,
        _ctx: &ExecContext,
        name: &str,
        _args: &[String],
    ) -> Option<Box<dyn ExecutableCommand>> {
        self.names.contains(&name).then(|| {
            Box::new(RecordedCommand {
                spawned: Rc::clone(&self.spawned),
                code: self.code,
            }) as Box<dyn ExecutableCommand>
        })
    }
}

impl ExecutableCommand for RecordedCommand {
    fn execute(self: Box<Self>, ctx: &mut ExecContext) -> Result<ExitCode> {
        self.spawned.borrow_mut().push(ctx.args.clone());
        writeln!(ctx.stdout, "{}", ctx.args[1..].join(" "))?;
        Ok(self.code)
    }
}

pub(crate) struct TestShell {
    pub ctx: ExecContext,
    pub runtime: Rc<Runtime>,
    pub engine: Rc<FakeState>,
    pub spawned: Rc<RefCell<Vec<Vec<String>>>>,
}

/// A shell whose `echo`, `ls` and `prog` are recorded and exit with `code`,
/// with a fake scripting runtime attached.
pub(crate) fn recording_shell(code: ExitCode) -> TestShell {
    recording_shell_with(code, Bridge::new())
}

pub(crate) fn recording_shell_with(code: ExitCode, bridge: Bridge) -> TestShell {
    let spawned = Rc::new(RefCell::new(Vec::new()));
    let shell = Shell::new(vec![
        Box::new(RecordingFactory {
            names: &["echo", "ls", "prog"],
            spawned: Rc::clone(&spawned),
            code,
        }),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Exit>::default()),
    ]);
    let root = ExecContext::new(Rc::new(shell), Environment::empty(std::env::temp_dir()));
    let (engine, state) = FakeEngine::new();
    let runtime = Runtime::new(Box::new(engine), &root, bridge);
    let mut ctx = root;
    ctx.set_runtime(&runtime);
    TestShell {
        ctx,
        runtime,
        engine: state,
        spawned,
    }
}

/// A runtime attached to a shell with no commands at all.
pub(crate) fn test_runtime() -> Rc<Runtime> {
    let root = ExecContext::new(
        Rc::new(Shell::new(Vec::new())),
        Environment::empty(std::env::temp_dir()),
    );
    let (engine, _state) = FakeEngine::new();
    Runtime::new(Box::new(engine), &root, Bridge::new())
}
