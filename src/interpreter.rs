use crate::cancel::Cancel;
use crate::command::{CommandFactory, ExitCode};
use crate::context::ExecContext;
use crate::env::Environment;
use crate::error::Error;
use crate::script::{Bridge, Runtime, ScriptEngine};
use crate::shell::{self, Shell};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::rc::Rc;
use tracing::debug;

/// A shell front end: one root context plus an optional scripting runtime.
///
/// The interpreter keeps an [`Environment`] shared by every command it runs
/// and resolves command names through aliases, then the [`CommandFactory`]
/// list it was built with. See [`Default`] for the built-in factories included
/// out of the box.
///
/// Example
/// ```
/// use script_shell::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run("echo", &["hello", "world"]).unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    root: ExecContext,
    runtime: Option<Rc<Runtime>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self::with_environment(commands, Environment::new())
    }

    pub fn with_environment(commands: Vec<Box<dyn CommandFactory>>, env: Environment) -> Self {
        Self {
            root: ExecContext::new(Rc::new(Shell::new(commands)), env),
            runtime: None,
        }
    }

    /// Attach a scripting engine. Scripts get the `sh` and `share` globals
    /// and can install aliases and hooks on this interpreter's shell.
    pub fn attach_runtime(&mut self, engine: Box<dyn ScriptEngine>, bridge: Bridge) -> Rc<Runtime> {
        let runtime = Runtime::new(engine, &self.root, bridge);
        self.root.set_runtime(&runtime);
        self.runtime = Some(Rc::clone(&runtime));
        runtime
    }

    pub fn runtime(&self) -> Option<&Rc<Runtime>> {
        self.runtime.as_ref()
    }

    pub fn context(&self) -> &ExecContext {
        &self.root
    }

    /// Use `cancel` for everything run from now on.
    pub fn set_cancel(&mut self, cancel: Cancel) {
        self.root.cancel = cancel;
    }

    pub fn should_exit(&self) -> bool {
        self.root.env().should_exit
    }

    /// Run a single command invocation by name with arguments.
    ///
    /// Returns the command's exit code or an error if the command cannot be
    /// found or fails to execute.
    pub fn run(&mut self, name: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        let mut ctx = self.root.clone();
        ctx.set_args(
            std::iter::once(name)
                .chain(args.iter().copied())
                .map(String::from)
                .collect(),
        );
        Ok(ctx.spawn()?)
    }

    /// Interpret one command line.
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<ExitCode> {
        Ok(self.root.interpret(line)?)
    }

    /// Read-eval-print loop until `exit` or end of input.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;

        while !self.should_exit() {
            match rl.readline("$ ") {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str())?;
                    match self.root.interpret(&line) {
                        Ok(code) => debug!(code, "line finished"),
                        Err(err) => self.report(&err),
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    fn report(&self, err: &Error) {
        shell::report(&self.root.stderr, err);
    }
}

impl Default for Interpreter {
    /// An interpreter over [`Shell::default`]: `pwd`, `cd`, `echo`, `exit`
    /// and executables found on `PATH`.
    fn default() -> Self {
        Self {
            root: ExecContext::new(Rc::new(Shell::default()), Environment::new()),
            runtime: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use crate::builtin::{Cd, Echo, Exit, Pwd};
    use crate::command::Factory;
    use crate::script::testing::FakeEngine;
    use crate::script::{AliasCommand, Function, Table, Value};

    fn builtins_only() -> Interpreter {
        Interpreter::with_environment(
            vec![
                Box::new(Factory::<Pwd>::default()),
                Box::new(Factory::<Cd>::default()),
                Box::new(Factory::<Echo>::default()),
                Box::new(Factory::<Exit>::default()),
            ],
            Environment::empty(std::env::temp_dir()),
        )
    }

    #[test]
    fn test_run_builtin() {
        let mut sh = builtins_only();
        assert_eq!(sh.run("echo", &["-n", ""]).unwrap(), 0);
        assert!(sh.run("nosuchcommand", &[]).is_err());
    }

    #[test]
    fn test_lines_share_environment() {
        let mut sh = builtins_only();
        sh.execute_line("GREETING=hi").unwrap();
        assert_eq!(sh.context().env().get_var("GREETING").as_deref(), Some("hi"));
        assert!(!sh.should_exit());
        assert_eq!(sh.execute_line("exit 4").unwrap(), 4);
        assert!(sh.should_exit());
    }

    #[test]
    fn test_cancelled_interpreter_runs_nothing() {
        let mut sh = builtins_only();
        let cancel = Cancel::new();
        cancel.cancel();
        sh.set_cancel(cancel);
        assert!(matches!(
            sh.execute_line("exit 1").unwrap_err().downcast_ref::<Error>(),
            Some(Error::Cancelled)
        ));
        assert!(!sh.should_exit());
    }

    #[test]
    fn test_attached_runtime_drives_aliases() {
        let mut sh = builtins_only();
        let (engine, _state) = FakeEngine::new();
        let runtime = sh.attach_runtime(Box::new(engine), Bridge::new());
        assert!(sh.context().runtime().is_some());

        let body = Function::new("quit", |_, _| Ok(vec![Table::from_seq(["exit", "9"]).into()]));
        let alias = AliasCommand::from_function(&runtime, &body).unwrap();
        sh.context().shell().set_alias("quit", Some(Alias::Script(alias)));

        assert_eq!(sh.execute_line("quit").unwrap(), 9);
        assert!(sh.should_exit());
        assert!(matches!(runtime.engine().global("sh"), Value::Handle(_)));
    }
}
