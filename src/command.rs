use crate::context::ExecContext;
use crate::error::Result;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Object-safe trait for any command that can be executed by the shell.
///
/// Builtins get it through a blanket impl; external programs and aliases
/// implement it directly. The context carries argv, stdio, environment and the
/// cancellation token for this one invocation.
pub trait ExecutableCommand {
    /// Executes the command.
    fn execute(self: Box<Self>, ctx: &mut ExecContext) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
/// Implementations can use the context's environment to resolve executables
/// (e.g., using PATH).
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        ctx: &ExecContext,
        name: &str,
        args: &[String],
    ) -> Option<Box<dyn ExecutableCommand>>;
}

/// Factory for the commands defined in this crate, selected by type.
pub struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}
