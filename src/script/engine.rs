use crate::error::Result;
use crate::script::value::{Function, Value};
use crate::stream::{Input, Output};
use std::io;

/// The embedded scripting language, as the bridge uses it.
///
/// An engine owns the script globals and turns compiled chunks into callable
/// [`Function`]s. Member access on handles goes through
/// [`HostObject`](crate::script::HostObject); calls go through
/// [`Function::call`].
pub trait ScriptEngine {
    fn global(&self, name: &str) -> Value;

    fn set_global(&self, name: &str, value: Value);

    /// Load a precompiled chunk. `name` is used in error messages.
    fn load(&self, name: &str, chunk: &[u8]) -> Result<Function>;

    /// Serialize a script function so it can be loaded again later.
    fn dump(&self, function: &Function) -> Result<Vec<u8>>;

    /// Send the language's default output somewhere else; `None` restores the
    /// host's stdout. Returns the redirection it replaces.
    fn set_output(&self, output: Option<Output>) -> io::Result<Option<Output>>;

    /// Read the language's default input from somewhere else; `None` restores
    /// the host's stdin. Returns the redirection it replaces.
    fn set_input(&self, input: Option<Input>) -> io::Result<Option<Input>>;
}
