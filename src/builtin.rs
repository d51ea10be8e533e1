use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Factory};
use crate::context::ExecContext;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command with the context's streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, ctx: &mut ExecContext) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, ctx: &mut ExecContext) -> crate::Result<ExitCode> {
        match T::execute(*self, ctx) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(ctx.stderr, "{}: {e:#}", T::name())?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, ctx: &mut ExecContext) -> crate::Result<ExitCode> {
        if self.is_error {
            writeln!(ctx.stderr, "{}", self.output)?;
            Ok(1)
        } else {
            writeln!(ctx.stdout, "{}", self.output)?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _ctx: &ExecContext,
        name: &str,
        args: &[String],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Some(match T::from_args(&[name], &args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, ctx: &mut ExecContext) -> Result<ExitCode> {
        let dir = ctx.env().current_dir.clone();
        writeln!(ctx.stdout, "{}", dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, ctx: &mut ExecContext) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) if !t.is_empty() => t,
            _ => ctx
                .env()
                .get_var("HOME")
                .context("no target and HOME not set")?,
        };
        let canonical = change_dir(ctx, &target)?;
        ctx.env_mut().current_dir = canonical;
        Ok(0)
    }
}

/// Resolve `target` against the context's working directory and check it is a directory.
pub(crate) fn change_dir(ctx: &ExecContext, target: &str) -> Result<PathBuf> {
    let new_dir = ctx.env().current_dir.join(target);
    let canonical = fs::canonicalize(&new_dir)
        .with_context(|| format!("can't canonicalize {}", new_dir.display()))?;
    anyhow::ensure!(canonical.is_dir(), "{} is not a directory", canonical.display());
    Ok(canonical)
}

#[derive(FromArgs)]
/// Ask the shell to stop once the current line is done.
pub struct Exit {
    #[argh(positional)]
    /// exit level to report; defaults to 0.
    pub code: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, ctx: &mut ExecContext) -> Result<ExitCode> {
        ctx.env_mut().should_exit = true;
        Ok(self.code.unwrap_or(0))
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, ctx: &mut ExecContext) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(ctx.stdout, "{}", s)?;
        } else {
            writeln!(ctx.stdout, "{}", s)?;
        }
        ctx.stdout.flush()?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::shell::{Shell, capture};
    use std::rc::Rc;

    fn test_ctx() -> ExecContext {
        ExecContext::new(Rc::new(Shell::default()), Environment::new())
    }

    fn run_builtin<T: BuiltinCommand + 'static>(
        ctx: &ExecContext,
        args: &[&str],
    ) -> (ExitCode, String) {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let command = Factory::<T>::default()
            .try_create(ctx, T::name(), &args)
            .expect("factory must recognize its own name");
        let captured = capture(ctx, |child| command.execute(child)).unwrap();
        (
            captured.status.unwrap(),
            String::from_utf8(captured.output).unwrap(),
        )
    }

    #[test]
    fn test_factory_ignores_other_names() {
        let ctx = test_ctx();
        assert!(Factory::<Echo>::default().try_create(&ctx, "pwd", &[]).is_none());
    }

    #[test]
    fn test_echo() {
        let ctx = test_ctx();
        assert_eq!(run_builtin::<Echo>(&ctx, &["a", "b"]), (0, "a b\n".into()));
        assert_eq!(run_builtin::<Echo>(&ctx, &["-n", "a"]), (0, "a".into()));
    }

    #[test]
    fn test_pwd_and_cd() {
        let ctx = test_ctx();
        let tmp = fs::canonicalize(std::env::temp_dir()).unwrap();
        ctx.env_mut().current_dir = tmp.clone();

        let (code, out) = run_builtin::<Pwd>(&ctx, &[]);
        assert_eq!(code, 0);
        assert_eq!(out, format!("{}\n", tmp.display()));

        let (code, _) = run_builtin::<Cd>(&ctx, &[".."]);
        assert_eq!(code, 0);
        assert_eq!(ctx.env().current_dir, tmp.parent().unwrap());
    }

    #[test]
    fn test_cd_to_missing_directory_fails() {
        let ctx = test_ctx();
        let before = ctx.env().current_dir.clone();
        let (code, _) = run_builtin::<Cd>(&ctx, &["/definitely/not/here"]);
        assert_eq!(code, 1);
        assert_eq!(ctx.env().current_dir, before);
    }

    #[test]
    fn test_exit_sets_flag() {
        let ctx = test_ctx();
        let (code, _) = run_builtin::<Exit>(&ctx, &["3"]);
        assert_eq!(code, 3);
        assert!(ctx.env().should_exit);
    }

    #[test]
    fn test_invalid_args_report_error() {
        let ctx = test_ctx();
        let (code, out) = run_builtin::<Pwd>(&ctx, &["--bogus"]);
        assert_eq!(code, 1);
        assert_eq!(out, "");
    }
}
