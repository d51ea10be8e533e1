//! Command resolution and execution.
//!
//! A [`Shell`] owns the command factories, the alias table and the host hooks.
//! It is shared (`Rc`) by every [`ExecContext`] created for it, so anything
//! holding a context can spawn commands or interpret command lines.

use crate::alias::{Alias, AliasInvocation};
use crate::builtin::{Cd, Echo, Exit, Pwd};
use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Factory};
use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::external::ExternalCommand;
use crate::lexer::{self, Word, WordPart};
use crate::parser::{self, AstNode, RedirectKind};
use crate::stream::{Input, Output};
use crate::wildcard;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::thread;
use tracing::debug;

/// Rewrites the argument vector of every simple command before it is resolved.
pub type ArgsHook = Rc<dyn Fn(&ExecContext, Vec<String>) -> Result<Vec<String>>>;

/// Called when no alias, builtin or executable matches.
///
/// Receives the [`Error::NotFound`] the shell would report; returning `Ok`
/// marks the command as handled.
pub type NotFoundHook = Rc<dyn Fn(&ExecContext, Error) -> Result<()>>;

struct Hooks {
    args_filter: ArgsHook,
    command_not_found: NotFoundHook,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            args_filter: Rc::new(|_: &ExecContext, args: Vec<String>| Ok(args)),
            command_not_found: Rc::new(|_: &ExecContext, err: Error| Err(err)),
        }
    }
}

pub struct Shell {
    factories: Vec<Box<dyn CommandFactory>>,
    aliases: RefCell<HashMap<String, Alias>>,
    suppressed: RefCell<HashSet<String>>,
    hooks: RefCell<Hooks>,
    expand_wildcards: Cell<bool>,
}

impl Shell {
    /// Create a shell that resolves command names through `factories`, in order.
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            factories,
            aliases: RefCell::default(),
            suppressed: RefCell::default(),
            hooks: RefCell::default(),
            expand_wildcards: Cell::new(false),
        }
    }

    /// Look up an alias by name, case-insensitively.
    pub fn alias(&self, name: &str) -> Option<Alias> {
        self.aliases.borrow().get(&name.to_lowercase()).cloned()
    }

    /// Install, replace or (with `None`) remove an alias. Returns the previous entry.
    pub fn set_alias(&self, name: &str, alias: Option<Alias>) -> Option<Alias> {
        let key = name.to_lowercase();
        let mut aliases = self.aliases.borrow_mut();
        match alias {
            Some(alias) => aliases.insert(key, alias),
            None => aliases.remove(&key),
        }
    }

    /// Hide `name` from alias lookup until the returned guard is dropped.
    pub(crate) fn suppress_alias(self: &Rc<Self>, name: &str) -> AliasSuppression {
        let name = name.to_lowercase();
        self.suppressed.borrow_mut().insert(name.clone());
        AliasSuppression {
            shell: Rc::clone(self),
            name,
        }
    }

    pub fn args_filter(&self) -> ArgsHook {
        Rc::clone(&self.hooks.borrow().args_filter)
    }

    /// Replace the argument filter, returning the one it replaces.
    pub fn set_args_filter(&self, hook: ArgsHook) -> ArgsHook {
        std::mem::replace(&mut self.hooks.borrow_mut().args_filter, hook)
    }

    pub fn command_not_found(&self) -> NotFoundHook {
        Rc::clone(&self.hooks.borrow().command_not_found)
    }

    /// Replace the command-not-found handler, returning the one it replaces.
    pub fn set_command_not_found(&self, hook: NotFoundHook) -> NotFoundHook {
        std::mem::replace(&mut self.hooks.borrow_mut().command_not_found, hook)
    }

    /// Whether unquoted words with wildcards expand to the matching paths.
    pub fn expands_wildcards(&self) -> bool {
        self.expand_wildcards.get()
    }

    pub fn set_expands_wildcards(&self, on: bool) {
        self.expand_wildcards.set(on);
    }

    /// Run `ctx.args` as one command: alias, then each factory, then the
    /// command-not-found hook.
    pub fn spawn(&self, ctx: &mut ExecContext) -> Result<ExitCode> {
        ctx.cancel.check()?;
        let Some(name) = ctx.args.first().cloned() else {
            return Ok(0);
        };

        if let Some(command) = self.resolve_alias(&name) {
            debug!(%name, "running alias");
            return command.execute(ctx);
        }

        let args = ctx.args[1..].to_vec();
        for factory in &self.factories {
            if let Some(command) = factory.try_create(ctx, &name, &args) {
                return command.execute(ctx);
            }
        }

        let hook = self.command_not_found();
        hook(ctx, Error::NotFound(name)).map(|()| 0)
    }

    fn resolve_alias(&self, name: &str) -> Option<Box<dyn ExecutableCommand>> {
        let key = name.to_lowercase();
        if self.suppressed.borrow().contains(&key) {
            return None;
        }
        let alias = self.aliases.borrow().get(&key).cloned()?;
        Some(Box::new(AliasInvocation::new(key, alias)))
    }

    /// Parse and run a command line.
    ///
    /// Failures of all but the last statement are reported on the context's
    /// stderr; the last statement's failure is returned.
    pub fn interpret(&self, ctx: &mut ExecContext, text: &str) -> Result<ExitCode> {
        ctx.cancel.check()?;
        let tokens = lexer::split_into_tokens(text).map_err(|e| Error::Syntax(e.to_string()))?;
        let ast = parser::construct_ast(tokens).map_err(|e| Error::Syntax(e.to_string()))?;
        self.execute_ast(ctx, &ast)
    }

    fn execute_ast(&self, ctx: &mut ExecContext, node: &AstNode) -> Result<ExitCode> {
        match node {
            AstNode::Sequence(statements) => {
                let mut last = 0;
                for (i, statement) in statements.iter().enumerate() {
                    match self.execute_ast(ctx, statement) {
                        Ok(code) => last = code,
                        Err(Error::Cancelled) => return Err(Error::Cancelled),
                        Err(err) if i + 1 < statements.len() => {
                            report(&ctx.stderr, &err);
                            last = err.exit_code();
                        }
                        Err(err) => return Err(err),
                    }
                    if ctx.env().should_exit {
                        break;
                    }
                }
                Ok(last)
            }
            AstNode::Pipeline(commands) => self.run_pipeline(ctx, commands),
            AstNode::Command { .. } => self.run_command(ctx, node),
            other => Err(Error::Syntax(format!("unexpected node {other:?}"))),
        }
    }

    /// Stages run one after another; each stage's output is captured and fed to
    /// the next one as in-memory input.
    fn run_pipeline(&self, ctx: &mut ExecContext, commands: &[AstNode]) -> Result<ExitCode> {
        let mut input = ctx.stdin.clone();
        let Some((last, stages)) = commands.split_last() else {
            return Ok(0);
        };

        for node in stages {
            let mut stage = ctx.clone();
            stage.stdin = input;
            let captured = capture(&stage, |child| self.execute_ast(child, node))?;
            match captured.status {
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => report(&ctx.stderr, &err),
                Ok(_) => {}
            }
            input = Input::memory(captured.output);
        }

        let mut stage = ctx.clone();
        stage.stdin = input;
        self.execute_ast(&mut stage, last)
    }

    fn run_command(&self, ctx: &mut ExecContext, node: &AstNode) -> Result<ExitCode> {
        let AstNode::Command {
            argv,
            assignments,
            redirects,
        } = node
        else {
            return Err(Error::Syntax(format!("expected a command, got {node:?}")));
        };
        ctx.cancel.check()?;

        for assignment in assignments {
            if let AstNode::Assignment { name, value } = assignment {
                let value = self.expand_word(ctx, value)?;
                ctx.env_mut().set_var(name.clone(), value);
            }
        }

        let mut args = Vec::with_capacity(argv.len());
        let mut raw_args = Vec::with_capacity(argv.len());
        for word in argv {
            let value = self.expand_word(ctx, word)?;
            // An unquoted substitution that expands to nothing is not an argument.
            let substitution_only = word
                .parts
                .iter()
                .all(|part| !matches!(part, WordPart::Literal(_)));
            if value.is_empty() && substitution_only {
                continue;
            }
            if self.expands_wildcards() && is_unquoted(&word.raw) && wildcard::has_wildcard(&value) {
                let dir = ctx.env().current_dir.clone();
                for path in wildcard::expand(&dir, &value) {
                    raw_args.push(path.clone());
                    args.push(path);
                }
                continue;
            }
            args.push(value);
            raw_args.push(word.raw.clone());
        }

        let mut child = ctx.clone();
        self.apply_redirects(&mut child, redirects)?;
        if args.is_empty() {
            return Ok(0);
        }

        let filter = self.args_filter();
        let filtered = filter(&child, args.clone())?;
        if filtered == args {
            child.args = args;
            child.raw_args = raw_args;
        } else {
            debug!(?filtered, "argument filter rewrote the command");
            child.set_args(filtered);
        }
        self.spawn(&mut child)
    }

    fn apply_redirects(&self, ctx: &mut ExecContext, redirects: &[AstNode]) -> Result<()> {
        for redirect in redirects {
            let AstNode::Redirect { kind, target } = redirect else {
                continue;
            };
            let target = self.expand_word(ctx, target)?;
            let path = ctx.env().current_dir.join(&target);
            let opened = match kind {
                RedirectKind::Input => File::open(&path).map(|f| ctx.stdin = Input::file(f)),
                RedirectKind::Output => File::create(&path).map(|f| ctx.stdout = Output::file(f)),
                RedirectKind::Append => OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map(|f| ctx.stdout = Output::file(f)),
            };
            opened.map_err(|e| io::Error::new(e.kind(), format!("{target}: {e}")))?;
        }
        Ok(())
    }

    fn expand_word(&self, ctx: &ExecContext, word: &Word) -> Result<String> {
        let mut out = String::new();
        for part in &word.parts {
            match part {
                WordPart::Literal(text) => out.push_str(text),
                WordPart::ParamSubst(name) => {
                    let value = ctx.env().get_var(name);
                    if let Some(value) = value {
                        out.push_str(&value);
                    }
                }
                WordPart::CmdSubst(text) => {
                    let captured = capture(ctx, |child| self.interpret(child, text))?;
                    match captured.status {
                        Err(Error::Cancelled) => return Err(Error::Cancelled),
                        Err(err) => report(&ctx.stderr, &err),
                        Ok(_) => {}
                    }
                    let output = String::from_utf8_lossy(&captured.output);
                    out.push_str(output.trim_end_matches(['\n', '\r']));
                }
            }
        }
        Ok(out)
    }
}

fn is_unquoted(raw: &str) -> bool {
    !raw.contains(['\'', '"', '\\'])
}

impl Default for Shell {
    /// Builtins first, then executables found on `PATH`.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<ExternalCommand>::default()),
        ])
    }
}

/// Keeps an alias name out of lookup while the alias runs.
pub(crate) struct AliasSuppression {
    shell: Rc<Shell>,
    name: String,
}

impl Drop for AliasSuppression {
    fn drop(&mut self) {
        self.shell.suppressed.borrow_mut().remove(&self.name);
    }
}

/// What a command produced while its stdout was captured.
pub(crate) struct Captured {
    pub status: Result<ExitCode>,
    pub output: Vec<u8>,
}

/// Run `f` on a copy of `ctx` whose stdout is an OS pipe, collecting
/// everything written to it.
///
/// The pipe is drained on a separate thread so writers never block on a full
/// pipe buffer. The copy is dropped before the drain is joined, so the last
/// write end closes once `f` and any processes it started are done.
pub(crate) fn capture(
    ctx: &ExecContext,
    f: impl FnOnce(&mut ExecContext) -> Result<ExitCode>,
) -> Result<Captured> {
    let (mut reader, writer) = io::pipe()?;
    let drain = thread::spawn(move || -> io::Result<Vec<u8>> {
        let mut output = Vec::new();
        reader.read_to_end(&mut output)?;
        Ok(output)
    });

    let mut child = ctx.clone();
    child.stdout = Output::pipe(writer);
    let status = f(&mut child);
    drop(child);

    let output = drain
        .join()
        .map_err(|_| io::Error::other("output capture thread panicked"))??;
    Ok(Captured { status, output })
}

/// Print a failed statement's error the way the shell reports it.
pub(crate) fn report(stderr: &Output, err: &Error) {
    let mut stderr = stderr.clone();
    // Nowhere left to report a failing stderr.
    let _ = writeln!(stderr, "{err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_ctx() -> ExecContext {
        ExecContext::new(Rc::new(Shell::default()), Environment::new())
    }

    fn run(ctx: &ExecContext, line: &str) -> (Result<ExitCode>, String) {
        let captured = capture(ctx, |child| child.interpret(line)).unwrap();
        (
            captured.status,
            String::from_utf8(captured.output).unwrap(),
        )
    }

    fn unique_temp_dir(tag: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "shell_tests_{}_{}_{}",
            std::process::id(),
            tag,
            nanos
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_sequence_runs_every_statement() {
        let ctx = test_ctx();
        let (status, out) = run(&ctx, "echo one; echo two");
        assert_eq!(status.unwrap(), 0);
        assert_eq!(out, "one\ntwo\n");
    }

    #[test]
    fn test_assignment_then_expansion() {
        let ctx = test_ctx();
        let (status, out) = run(&ctx, "GREETING=hi; echo $GREETING ${GREETING}!");
        assert_eq!(status.unwrap(), 0);
        assert_eq!(out, "hi hi!\n");
        assert_eq!(ctx.env().get_var("GREETING"), Some("hi".to_string()));
    }

    #[test]
    fn test_command_substitution_trims_newlines() {
        let ctx = test_ctx();
        let (_, out) = run(&ctx, "echo [$(echo inner; echo more)]");
        assert_eq!(out, "[inner\nmore]\n");
    }

    #[test]
    fn test_empty_substitution_drops_argument() {
        let ctx = test_ctx();
        let (_, out) = run(&ctx, "echo a $NO_SUCH_VARIABLE_HERE b ''");
        assert_eq!(out, "a b \n");
    }

    #[test]
    #[cfg(unix)]
    fn test_pipeline_feeds_next_stage() {
        let ctx = test_ctx();
        let (status, out) = run(&ctx, "echo hello | /bin/sh -c 'tr a-z A-Z'");
        assert_eq!(status.unwrap(), 0);
        assert_eq!(out, "HELLO\n");
    }

    #[test]
    fn test_redirect_output_and_append() {
        let dir = unique_temp_dir("redirect");
        let ctx = test_ctx();
        ctx.env_mut().current_dir = dir.clone();

        let (status, out) = run(&ctx, "echo first > out.txt; echo second >> out.txt");
        assert_eq!(status.unwrap(), 0);
        assert_eq!(out, "");
        let written = std::fs::read_to_string(dir.join("out.txt")).unwrap();
        assert_eq!(written, "first\nsecond\n");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_redirect_input_fails() {
        let dir = unique_temp_dir("missing");
        let ctx = test_ctx();
        ctx.env_mut().current_dir = dir.clone();
        let (status, _) = run(&ctx, "echo x < nope.txt");
        assert!(matches!(status, Err(Error::Io(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_not_found_uses_hook() {
        let ctx = test_ctx();
        let (status, _) = run(&ctx, "definitely-not-a-command-xyz");
        assert!(matches!(status, Err(Error::NotFound(name)) if name == "definitely-not-a-command-xyz"));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_by_hook = Rc::clone(&seen);
        ctx.shell().set_command_not_found(Rc::new(move |ctx: &ExecContext, _err: Error| {
            seen_by_hook.borrow_mut().push(ctx.args.clone());
            Ok(())
        }));
        let (status, _) = run(&ctx, "definitely-not-a-command-xyz a");
        assert_eq!(status.unwrap(), 0);
        assert_eq!(
            *seen.borrow(),
            vec![vec!["definitely-not-a-command-xyz".to_string(), "a".to_string()]]
        );
    }

    #[test]
    fn test_args_filter_rewrites_argv() {
        let ctx = test_ctx();
        let previous = ctx.shell().set_args_filter(Rc::new(|_: &ExecContext, mut args: Vec<String>| {
            args.push("extra".to_string());
            Ok(args)
        }));
        let (_, out) = run(&ctx, "echo base");
        assert_eq!(out, "base extra\n");

        ctx.shell().set_args_filter(previous);
        let (_, out) = run(&ctx, "echo base");
        assert_eq!(out, "base\n");
    }

    #[test]
    fn test_macro_alias_fills_placeholders() {
        let ctx = test_ctx();
        ctx.shell()
            .set_alias("Greet", Some(Alias::Macro("echo hello $1 ($*)".into())));
        let (status, out) = run(&ctx, "greet bob 'and alice'");
        assert_eq!(status.unwrap(), 0);
        assert_eq!(out, "hello bob (bob and alice)\n");
    }

    #[test]
    fn test_alias_hides_itself_while_running() {
        let ctx = test_ctx();
        ctx.shell().set_alias("echo", Some(Alias::Macro("echo -n".into())));
        let (status, out) = run(&ctx, "echo x; echo y");
        assert_eq!(status.unwrap(), 0);
        assert_eq!(out, "xy");
        assert!(ctx.shell().suppressed.borrow().is_empty());
    }

    #[test]
    fn test_failed_statement_is_reported_and_sequence_continues() {
        let ctx = test_ctx();
        let (status, out) = run(&ctx, "definitely-not-a-command-xyz; echo after");
        assert_eq!(status.unwrap(), 0);
        assert_eq!(out, "after\n");
    }

    #[test]
    fn test_cancelled_context_runs_nothing() {
        let ctx = test_ctx();
        ctx.cancel.cancel();
        let (status, out) = run(&ctx, "echo never");
        assert!(matches!(status, Err(Error::Cancelled)));
        assert_eq!(out, "");
    }

    #[test]
    fn test_wildcards_expand_only_when_enabled() {
        let dir = unique_temp_dir("wildcards");
        for name in ["b.rs", "a.rs", "notes.md"] {
            std::fs::write(dir.join(name), "").unwrap();
        }
        let ctx = test_ctx();
        ctx.env_mut().current_dir = dir.clone();

        let (_, out) = run(&ctx, "echo *.rs");
        assert_eq!(out, "*.rs\n");

        ctx.shell().set_expands_wildcards(true);
        let (_, out) = run(&ctx, "echo *.rs '*.rs' *.none");
        assert_eq!(out, "a.rs b.rs *.rs *.none\n");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_syntax_error() {
        let ctx = test_ctx();
        let (status, _) = run(&ctx, "echo 'open");
        assert!(matches!(status, Err(Error::Syntax(_))));
    }
}
