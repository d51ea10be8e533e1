use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Factory};
use crate::context::ExecContext;
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// How often a running child is checked for exit and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Command that is not a builtin.
pub struct ExternalCommand {
    path: PathBuf,
}

impl ExternalCommand {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        ctx: &ExecContext,
        name: &str,
        _args: &[String],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let path = which(ctx, name)?;
        Some(Box::new(ExternalCommand::new(path)))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(self: Box<Self>, ctx: &mut ExecContext) -> Result<ExitCode> {
        let args = ctx.args.get(1..).unwrap_or_default().to_vec();
        run_process(ctx, &self.path, &args)
    }
}

/// Resolve `name` against the context's `PATH` and working directory.
pub fn which(ctx: &ExecContext, name: &str) -> Option<PathBuf> {
    let env = ctx.env();
    let search_paths = env.get_var("PATH").unwrap_or_default();
    find_command_path(OsStr::new(&search_paths), &env.current_dir, Path::new(name))
        .map(Cow::into_owned)
}

/// Start `program` with the context's environment, working directory and
/// stdio, and wait for it.
///
/// Cancellation is checked before the process starts and while it runs; a
/// cancelled child is killed and the call fails with [`Error::Cancelled`].
pub fn run_process(ctx: &ExecContext, program: &Path, args: &[String]) -> Result<ExitCode> {
    ctx.cancel.check()?;

    let spawn_error = |source| Error::Spawn {
        name: program.display().to_string(),
        source,
    };
    let stdin = ctx.stdin.stdio().map_err(spawn_error)?;
    let mut command = std::process::Command::new(program);
    {
        let env = ctx.env();
        command
            .args(args)
            .env_clear()
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir);
    }
    command
        .stdin(stdin.unwrap_or_else(Stdio::piped))
        .stdout(ctx.stdout.stdio().map_err(spawn_error)?)
        .stderr(ctx.stderr.stdio().map_err(spawn_error)?);

    let mut child = command.spawn().map_err(spawn_error)?;
    // Drop our copies of the child's descriptors so pipe readers see EOF when it exits.
    drop(command);
    debug!(program = %program.display(), pid = child.id(), "started process");

    let feeder = child.stdin.take().map(|mut pipe| {
        let bytes = ctx.stdin.take_remaining();
        thread::spawn(move || {
            // The child may exit without reading everything.
            let _ = pipe.write_all(&bytes);
        })
    });

    let status = wait_cancellable(ctx, &mut child);
    if let Some(feeder) = feeder {
        let _ = feeder.join();
    }
    let status = status?;
    Ok(status.code().unwrap_or_else(|| terminated_by_signal(status)))
}

fn wait_cancellable(ctx: &ExecContext, child: &mut Child) -> Result<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if ctx.cancel.is_cancelled() {
            debug!(pid = child.id(), "killing cancelled process");
            // The child may have exited on its own in the meantime.
            let _ = child.kill();
            child.wait()?;
            return Err(Error::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - `./foo` on Unix or any relative path on other platforms: returns
///   `current_dir/foo` if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): resolved against `current_dir`.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result had to be built.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    current_dir: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir {
        let local = current_dir.join(path);
        if local.is_file() {
            return Some(Cow::Owned(local));
        }
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => {
            let local = current_dir.join(path);
            find_by_path(&local).map(|p| Cow::Owned(p.to_owned()))
        }
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}
