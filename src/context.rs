use crate::cancel::Cancel;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::Result;
use crate::script::Runtime;
use crate::shell::Shell;
use crate::stream::{Input, Output};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

/// Everything one command invocation runs with.
///
/// `Clone` shares the stdio descriptors and the environment; it is what the
/// shell uses to hand a context down to a child command. [`ExecContext::try_clone`]
/// duplicates the descriptors instead and can fail when the process runs out
/// of them.
#[derive(Clone)]
pub struct ExecContext {
    shell: Rc<Shell>,
    env: Rc<RefCell<Environment>>,
    /// Expanded argument vector; `args[0]` is the command name.
    pub args: Vec<String>,
    /// The same arguments as typed, quotes included.
    pub raw_args: Vec<String>,
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
    pub cancel: Cancel,
    runtime: Option<Weak<Runtime>>,
}

impl ExecContext {
    /// A context on the host's own stdio with no arguments.
    pub fn new(shell: Rc<Shell>, env: Environment) -> Self {
        Self {
            shell,
            env: Rc::new(RefCell::new(env)),
            args: Vec::new(),
            raw_args: Vec::new(),
            stdin: Input::Inherit,
            stdout: Output::Stdout,
            stderr: Output::Stderr,
            cancel: Cancel::new(),
            runtime: None,
        }
    }

    pub fn shell(&self) -> &Rc<Shell> {
        &self.shell
    }

    pub fn env(&self) -> Ref<'_, Environment> {
        self.env.borrow()
    }

    pub fn env_mut(&self) -> RefMut<'_, Environment> {
        self.env.borrow_mut()
    }

    /// Replace argv, keeping the raw form in step.
    pub fn set_args(&mut self, args: Vec<String>) {
        self.raw_args = args.clone();
        self.args = args;
    }

    /// The scripting runtime this context was started from, if it is still alive.
    pub fn runtime(&self) -> Option<Rc<Runtime>> {
        self.runtime.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_runtime(&mut self, runtime: &Rc<Runtime>) {
        self.runtime = Some(Rc::downgrade(runtime));
    }

    pub(crate) fn set_runtime_weak(&mut self, runtime: Weak<Runtime>) {
        self.runtime = Some(runtime);
    }

    /// Duplicate this context with independent stdio descriptors.
    ///
    /// The environment stays shared, as it is for every command of one shell.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            shell: Rc::clone(&self.shell),
            env: Rc::clone(&self.env),
            args: self.args.clone(),
            raw_args: self.raw_args.clone(),
            stdin: self.stdin.try_clone()?,
            stdout: self.stdout.try_clone()?,
            stderr: self.stderr.try_clone()?,
            cancel: self.cancel.clone(),
            runtime: self.runtime.clone(),
        })
    }

    /// Run `args` as one command: alias, builtin or executable.
    pub fn spawn(&mut self) -> Result<ExitCode> {
        let shell = Rc::clone(&self.shell);
        shell.spawn(self)
    }

    /// Interpret `text` as a command line in this context.
    pub fn interpret(&mut self, text: &str) -> Result<ExitCode> {
        let shell = Rc::clone(&self.shell);
        shell.interpret(self, text)
    }
}
