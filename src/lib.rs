//! A command shell whose commands, hooks and shared state can be driven by an
//! embedded scripting runtime.
//!
//! The shell side is small: a lexer and parser for command lines, builtins
//! parsed with `argh`, and a launcher for executables found on `PATH`. Every
//! command runs with an [`ExecContext`] that carries its arguments, stdio,
//! environment and cancellation token.
//!
//! The [`script`] module connects a scripting engine to that shell. Scripts
//! can register commands (aliases), filter arguments, handle unknown commands,
//! drive external automation objects and publish state other runtimes can see.
//!
//! The main entry point is [`Interpreter`].

mod alias;
mod builtin;
pub mod cancel;
pub mod command;
pub mod context;
pub mod env;
pub mod error;
pub mod external;
mod interpreter;
mod lexer;
mod parser;
pub mod script;
pub mod shell;
pub mod stream;
pub mod wildcard;

pub use alias::{Alias, expand_macro};
pub use context::ExecContext;
pub use error::{Error, Result};
pub use interpreter::Interpreter;
