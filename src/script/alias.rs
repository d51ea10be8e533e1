//! Script aliases: compiled chunks run as shell commands.

use crate::command::ExitCode;
use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::script::Runtime;
use crate::script::engine::ScriptEngine;
use crate::script::value::{Function, Table, Value, to_argv};
use crate::stream::{Input, Output};
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// A precompiled script chunk registered as a command.
///
/// The chunk is loaded afresh on every call, so one alias can run any number
/// of times and from nested invocations.
#[derive(Clone)]
pub struct AliasCommand {
    chunk: Arc<[u8]>,
}

impl AliasCommand {
    pub fn new(chunk: Vec<u8>) -> Self {
        Self {
            chunk: chunk.into(),
        }
    }

    /// Compile `function` into an alias.
    pub fn from_function(rt: &Runtime, function: &Function) -> Result<Self> {
        rt.dump(function).map(Self::new)
    }

    pub fn chunk(&self) -> &[u8] {
        &self.chunk
    }

    /// Run the chunk for `ctx` and turn what it returns into an exit level.
    ///
    /// The script receives one table: argv at 0..N and the raw arguments as
    /// `rawargs`. It may return
    /// - a table: a replacement argv, spawned in a copy of the context;
    /// - an integer: the exit level;
    /// - a non-empty string: a command line, interpreted in a copy of the context;
    /// - anything else: exit level 0.
    pub fn call(&self, ctx: &mut ExecContext) -> Result<ExitCode> {
        let name = ctx.args.first().cloned().unwrap_or_else(|| "alias".into());
        let runtime = ctx
            .runtime()
            .ok_or_else(|| Error::Script(format!("{name}: no scripting runtime attached")))?;

        let result = {
            let _bound = runtime.slot().bind(ctx);
            let _redirect = Redirect::install(runtime.engine(), ctx)?;
            let function = runtime.load(&name, &self.chunk)?;

            let argv = Table::from_args(&ctx.args);
            argv.raw_set("rawargs", Table::from_args(&ctx.raw_args));
            let mut results = runtime.call(&function, vec![Value::Table(argv)], 1)?;
            results.pop().unwrap_or_default()
        };

        match result {
            Value::Table(table) => {
                let argv = to_argv(&table)?;
                debug!(%name, ?argv, "alias replaced its argv");
                let mut child = ctx.try_clone()?;
                child.set_args(argv);
                child.spawn()
            }
            Value::Integer(level) => Ok(ExitCode::try_from(level).unwrap_or(255)),
            Value::String(line) if !line.is_empty() => {
                debug!(%name, %line, "alias returned a command line");
                let mut child = ctx.try_clone()?;
                child.interpret(&line)
            }
            _ => Ok(0),
        }
    }
}

impl fmt::Debug for AliasCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AliasCommand({} bytes)", self.chunk.len())
    }
}

/// Points the engine's default streams at the context's for one call.
struct Redirect<'a> {
    engine: &'a dyn ScriptEngine,
    output: Option<Option<Output>>,
    input: Option<Option<Input>>,
}

impl<'a> Redirect<'a> {
    fn install(engine: &'a dyn ScriptEngine, ctx: &ExecContext) -> io::Result<Self> {
        let mut redirect = Redirect {
            engine,
            output: None,
            input: None,
        };
        if !ctx.stdout.is_default() {
            redirect.output = Some(engine.set_output(Some(ctx.stdout.try_clone()?))?);
        }
        if !ctx.stdin.is_default() {
            redirect.input = Some(engine.set_input(Some(ctx.stdin.try_clone()?))?);
        }
        Ok(redirect)
    }
}

impl Drop for Redirect<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.output.take() {
            if let Err(e) = self.engine.set_output(previous) {
                warn!("cannot restore script output: {e}");
            }
        }
        if let Some(previous) = self.input.take() {
            if let Err(e) = self.engine.set_input(previous) {
                warn!("cannot restore script input: {e}");
            }
        }
    }
}
