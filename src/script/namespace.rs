//! The `sh` global and its `sh.alias`, `sh.env` and `sh.option` objects.
//!
//! Host functions act on the context the runtime is serving (see
//! [`Runtime::current_context`]) and report failures as `(nil, message)`.

use crate::alias::Alias;
use crate::builtin;
use crate::command::ExitCode;
use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::external;
use crate::script::Runtime;
use crate::script::alias::AliasCommand;
use crate::script::capsule::HandleCapsule;
use crate::script::value::{Function, Handle, HostObject, Table, Value, failure, to_argv};
use crate::shell::capture;
use crate::stream::Output;
use crate::wildcard;
use chrono::{DateTime, Datelike, Local, Timelike};
use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type HostFn = fn(&Runtime, Vec<Value>) -> Result<Vec<Value>>;

enum Member {
    Value(Value),
    /// Backed by host state; reads and writes go to the accessors.
    Property {
        get: fn(&Runtime) -> Value,
        set: fn(&Runtime, Value) -> Result<()>,
    },
}

/// The `sh` global.
///
/// Unknown members read as nil and refuse writes.
pub struct ShNamespace {
    members: Mutex<HashMap<String, Member>>,
}

impl ShNamespace {
    pub fn new() -> Self {
        let functions: [(&'static str, HostFn); 18] = [
            ("setalias", set_alias),
            ("getalias", get_alias),
            ("getenv", get_env),
            ("setenv", set_env),
            ("exec", exec),
            ("eval", eval),
            ("rawexec", raw_exec),
            ("raweval", raw_eval),
            ("write", write_stdout),
            ("writerr", write_stderr),
            ("getwd", getwd),
            ("chdir", chdir),
            ("which", which),
            ("pathjoin", path_join),
            ("glob", glob),
            ("stat", stat),
            ("access", access),
            ("create_object", create_object),
        ];
        let mut members: HashMap<String, Member> = functions
            .into_iter()
            .map(|(name, body)| (name.to_string(), Member::Value(host_fn(name, body))))
            .collect();

        members.insert(
            "alias".into(),
            Member::Value(Value::Handle(Arc::new(AliasNamespace))),
        );
        members.insert("env".into(), Member::Value(Value::Handle(Arc::new(EnvNamespace))));
        members.insert(
            "option".into(),
            Member::Value(Value::Handle(Arc::new(OptionNamespace))),
        );
        members.insert(
            "argsfilter".into(),
            Member::Property {
                get: |rt: &Runtime| rt.bridge().hooks.args_filter().get(),
                set: |rt: &Runtime, value: Value| {
                    rt.bridge().hooks.args_filter().set(value);
                    Ok(())
                },
            },
        );
        members.insert(
            "on_command_not_found".into(),
            Member::Property {
                get: |rt: &Runtime| rt.bridge().hooks.command_not_found().get(),
                set: |rt: &Runtime, value: Value| {
                    rt.bridge().hooks.command_not_found().set(value);
                    Ok(())
                },
            },
        );
        members.insert(
            "silentmode".into(),
            Member::Property {
                get: |rt: &Runtime| Value::Bool(rt.bridge().silent()),
                set: |rt: &Runtime, value: Value| {
                    rt.bridge().set_silent(value.is_truthy());
                    Ok(())
                },
            },
        );
        members.insert(
            "version".into(),
            Member::Value(env!("CARGO_PKG_VERSION").into()),
        );
        let exe = std::env::current_exe()
            .ok()
            .map(|path| path.display().to_string());
        members.insert("exe".into(), Member::Value(exe.into()));

        Self {
            members: Mutex::new(members),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ShNamespace {
    fn default() -> Self {
        Self::new()
    }
}

impl HostObject for ShNamespace {
    fn type_name(&self) -> &'static str {
        "sh"
    }

    fn index(&self, rt: &Runtime, key: &str) -> Result<Value> {
        let get = match self.lock().get(key) {
            Some(Member::Value(value)) => return Ok(value.clone()),
            Some(Member::Property { get, .. }) => *get,
            None => return Ok(Value::Nil),
        };
        Ok(get(rt))
    }

    fn new_index(&self, rt: &Runtime, key: &str, value: Value) -> Result<()> {
        let set = match self.lock().get_mut(key) {
            Some(Member::Value(current)) => {
                *current = value;
                return Ok(());
            }
            Some(Member::Property { set, .. }) => *set,
            None => return Err(Error::Script(format!("sh.{key}: reserved variable"))),
        };
        set(rt, value)
    }
}

fn host_fn(name: &'static str, body: HostFn) -> Value {
    Value::Function(Function::new(name, move |rt, args| {
        Ok(body(rt, args).unwrap_or_else(failure))
    }))
}

fn text_arg(args: &[Value], index: usize) -> Result<String> {
    args.get(index).unwrap_or(&Value::Nil).to_text()
}

/// `(level, nil)` or `(level, message)`.
fn exit_pair(status: Result<ExitCode>) -> Vec<Value> {
    match status {
        Ok(level) => vec![level.into(), Value::Nil],
        Err(err) => vec![err.exit_code().into(), err.to_string().into()],
    }
}

fn output_text(output: Vec<u8>) -> Result<String> {
    String::from_utf8(output).map_err(|e| Error::Decode(format!("command output ({e})")))
}

/// `sh.alias`: the shell's alias table.
struct AliasNamespace;

impl HostObject for AliasNamespace {
    fn type_name(&self) -> &'static str {
        "sh.alias"
    }

    fn index(&self, rt: &Runtime, key: &str) -> Result<Value> {
        lookup_alias(rt, key)
    }

    fn new_index(&self, rt: &Runtime, key: &str, value: Value) -> Result<()> {
        store_alias(rt, key, value)
    }
}

/// Script aliases come back as callables, macros as their text.
fn lookup_alias(rt: &Runtime, name: &str) -> Result<Value> {
    let ctx = rt.current_context();
    Ok(match ctx.shell().alias(name) {
        None => Value::Nil,
        Some(Alias::Macro(text)) => Value::String(text),
        Some(Alias::Script(command)) => Value::Function(rt.load(name, command.chunk())?),
    })
}

fn store_alias(rt: &Runtime, name: &str, value: Value) -> Result<()> {
    let alias = match value {
        Value::Nil => None,
        Value::Function(function) => Some(Alias::Script(AliasCommand::from_function(
            rt, &function,
        )?)),
        Value::String(_) | Value::Bytes(_) => Some(Alias::Macro(value.to_text()?)),
        other => {
            return Err(Error::Script(format!(
                "{name}: cannot alias a {}",
                other.type_name()
            )));
        }
    };
    debug!(%name, removed = alias.is_none(), "alias updated from script");
    rt.current_context().shell().set_alias(name, alias);
    Ok(())
}

/// `sh.env`: variables of the current context. Storing nil or `""` unsets.
struct EnvNamespace;

impl HostObject for EnvNamespace {
    fn type_name(&self) -> &'static str {
        "sh.env"
    }

    fn index(&self, rt: &Runtime, key: &str) -> Result<Value> {
        Ok(rt.current_context().env().get_var(key).into())
    }

    fn new_index(&self, rt: &Runtime, key: &str, value: Value) -> Result<()> {
        store_env(rt, key, value)
    }
}

/// `sh.option`: shell switches. Only `glob` exists.
struct OptionNamespace;

impl HostObject for OptionNamespace {
    fn type_name(&self) -> &'static str {
        "sh.option"
    }

    fn index(&self, rt: &Runtime, key: &str) -> Result<Value> {
        Ok(match key {
            "glob" => Value::Bool(rt.current_context().shell().expands_wildcards()),
            _ => Value::Nil,
        })
    }

    fn new_index(&self, rt: &Runtime, key: &str, value: Value) -> Result<()> {
        match key {
            "glob" => {
                rt.current_context()
                    .shell()
                    .set_expands_wildcards(value.is_truthy());
                Ok(())
            }
            _ => Err(Error::Script(format!("{key}: no such option"))),
        }
    }
}

fn store_env(rt: &Runtime, name: &str, value: Value) -> Result<()> {
    let text = if value.is_nil() {
        String::new()
    } else {
        value.to_text()?
    };
    let ctx = rt.current_context();
    let mut env = ctx.env_mut();
    if text.is_empty() {
        env.unset_var(name);
    } else {
        env.set_var(name, text);
    }
    Ok(())
}

fn set_alias(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let name = text_arg(&args, 0)?;
    let value = args.into_iter().nth(1).unwrap_or_default();
    store_alias(rt, &name, value)?;
    Ok(vec![Value::Bool(true)])
}

fn get_alias(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let name = text_arg(&args, 0)?;
    Ok(vec![lookup_alias(rt, &name)?])
}

fn get_env(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let name = text_arg(&args, 0)?;
    Ok(vec![rt.current_context().env().get_var(&name).into()])
}

fn set_env(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let name = text_arg(&args, 0)?;
    let value = args.into_iter().nth(1).unwrap_or_default();
    store_env(rt, &name, value)?;
    Ok(vec![Value::Bool(true)])
}

/// `sh.exec(argv)` spawns in a copy of the context; `sh.exec(line)`
/// interprets the line in the context itself.
fn exec(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let mut ctx = rt.current_context();
    let status = match args.into_iter().next().unwrap_or_default() {
        Value::Table(table) => to_argv(&table).and_then(|argv| {
            let mut child = ctx.try_clone()?;
            child.set_args(argv);
            child.spawn()
        }),
        other => other.to_text().and_then(|line| ctx.interpret(&line)),
    };
    Ok(exit_pair(status))
}

/// Interpret a line and return what it printed, trimmed at both ends.
///
/// A failing last statement still returns whatever was printed.
fn eval(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let line = text_arg(&args, 0)?;
    let captured = capture(&rt.current_context(), |child| child.interpret(&line))?;
    match captured.status {
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(err) => debug!(%err, "eval: last statement failed"),
        Ok(_) => {}
    }
    let text = output_text(captured.output)?;
    Ok(vec![text.trim_matches(['\r', '\n', '\t', ' ']).into()])
}

/// Strings and argv tables, flattened into one argument vector.
fn flatten_argv(args: &[Value]) -> Result<Vec<String>> {
    let mut argv = Vec::new();
    for arg in args {
        match arg {
            Value::Table(table) => argv.extend(to_argv(table)?),
            other => argv.push(other.to_text()?),
        }
    }
    Ok(argv)
}

/// Run an executable, bypassing aliases and builtins.
fn run_raw(ctx: &ExecContext, argv: &[String]) -> Result<ExitCode> {
    let Some((name, rest)) = argv.split_first() else {
        return Err(Error::Spawn {
            name: "rawexec".into(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "no program given"),
        });
    };
    let program = external::which(ctx, name).ok_or_else(|| Error::NotFound(name.clone()))?;
    external::run_process(ctx, &program, rest)
}

fn raw_exec(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let argv = flatten_argv(&args)?;
    Ok(exit_pair(run_raw(&rt.current_context(), &argv)))
}

fn raw_eval(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let argv = flatten_argv(&args)?;
    let captured = capture(&rt.current_context(), |child| run_raw(child, &argv))?;
    captured.status?;
    let text = output_text(captured.output)?;
    Ok(vec![text.trim_end_matches(['\n', '\r']).into()])
}

fn write_joined(mut out: Output, args: &[Value]) -> Result<Vec<Value>> {
    let texts = args.iter().map(Value::to_text).collect::<Result<Vec<_>>>()?;
    out.write_all(texts.join("\t").as_bytes())?;
    out.flush()?;
    Ok(vec![Value::Bool(true)])
}

fn write_stdout(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    write_joined(rt.current_context().stdout, &args)
}

fn write_stderr(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    write_joined(rt.current_context().stderr, &args)
}

fn getwd(rt: &Runtime, _args: Vec<Value>) -> Result<Vec<Value>> {
    let ctx = rt.current_context();
    let dir = ctx.env().current_dir.display().to_string();
    Ok(vec![dir.into()])
}

fn chdir(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let target = text_arg(&args, 0)?;
    let ctx = rt.current_context();
    let dir = builtin::change_dir(&ctx, &target).map_err(|e| io::Error::other(format!("{e:#}")))?;
    ctx.env_mut().current_dir = dir;
    Ok(vec![Value::Bool(true)])
}

fn which(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let name = text_arg(&args, 0)?;
    match external::which(&rt.current_context(), &name) {
        Some(path) => Ok(vec![path.display().to_string().into()]),
        None => Ok(failure(format!("{name}: path not found"))),
    }
}

fn path_join(_rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let mut path = PathBuf::new();
    for part in &args {
        path.push(part.to_text()?);
    }
    Ok(vec![path.display().to_string().into()])
}

/// Expand each pattern under the working directory; one sorted list.
///
/// Stops at the first argument that is empty or not text.
fn glob(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let dir = rt.current_context().env().current_dir.clone();
    let mut found = Vec::new();
    for pattern in args.iter().map_while(|arg| arg.to_text().ok()) {
        if pattern.is_empty() {
            break;
        }
        found.extend(wildcard::expand(&dir, &pattern));
    }
    found.sort();
    Ok(vec![Table::from_seq(found).into()])
}

/// `{name, size, isdir, mtime = {year, month, day, hour, minute, second}}`.
fn stat(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let name = text_arg(&args, 0)?;
    let path = rt.current_context().env().current_dir.join(&name);
    let meta = fs::metadata(&path).map_err(|e| io::Error::new(e.kind(), format!("{name}: {e}")))?;

    let info = Table::new();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(name);
    info.raw_set("name", file_name);
    info.raw_set("size", i64::try_from(meta.len()).unwrap_or(i64::MAX));
    info.raw_set("isdir", meta.is_dir());

    let modified: DateTime<Local> = meta.modified()?.into();
    let mtime = Table::new();
    mtime.raw_set("year", modified.year());
    mtime.raw_set("month", i64::from(modified.month()));
    mtime.raw_set("day", i64::from(modified.day()));
    mtime.raw_set("hour", i64::from(modified.hour()));
    mtime.raw_set("minute", i64::from(modified.minute()));
    mtime.raw_set("second", i64::from(modified.second()));
    info.raw_set("mtime", mtime);
    Ok(vec![info.into()])
}

/// `access(path, mode)` with mode bits 1 (execute), 2 (write) and 4 (read);
/// mode 0 only asks whether the path exists. Every requested bit must hold.
fn access(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let name = text_arg(&args, 0)?;
    let mode = match args.get(1) {
        Some(Value::Integer(mode)) => *mode,
        other => {
            let got = other.map_or("nil", Value::type_name);
            return Err(Error::Script(format!("access: mode must be an integer, got {got}")));
        }
    };
    let path = rt.current_context().env().current_dir.join(&name);
    let allowed = match fs::metadata(&path) {
        Ok(meta) => permits(&meta, mode),
        Err(_) => false,
    };
    Ok(vec![Value::Bool(allowed)])
}

#[cfg(unix)]
fn permits(meta: &Metadata, mode: i64) -> bool {
    use std::os::unix::fs::PermissionsExt;
    let bits = meta.permissions().mode();
    [(1, 0o100), (2, 0o200), (4, 0o400)]
        .into_iter()
        .all(|(request, owner)| mode & request == 0 || bits & owner != 0)
}

#[cfg(not(unix))]
fn permits(meta: &Metadata, mode: i64) -> bool {
    mode & 1 == 0 && (mode & 2 == 0 || !meta.permissions().readonly())
}

fn create_object(rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
    let name = text_arg(&args, 0)?;
    let provider = rt
        .bridge()
        .automation()
        .ok_or_else(|| Error::Automation("no automation provider".into()))?;
    let object = provider.create_object(&name)?;
    let handle: Handle = HandleCapsule::new(object);
    Ok(vec![Value::Handle(handle)])
}
