use crate::command::ExitCode;
use std::io;
use thiserror::Error;

/// Errors produced by the shell and by the script bridge.
#[derive(Debug, Error)]
pub enum Error {
    /// A script string or byte string could not be read as text.
    #[error("cannot decode {0} as text")]
    Decode(String),

    /// A dispatch verb was called without an external-object receiver.
    #[error("{0}: the receiver is null")]
    NullReceiver(&'static str),

    /// A dispatch verb was called on a capsule whose object was already released.
    #[error("{0}: the object has been released")]
    ReleasedHandle(&'static str),

    /// No alias, builtin or executable matched the command name.
    #[error("{0}: command not found")]
    NotFound(String),

    /// The operating system refused to start a process.
    #[error("{name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The invocation was cancelled or its deadline passed.
    #[error("cancelled")]
    Cancelled,

    /// The command line could not be tokenized or parsed.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A compiled chunk could not be loaded, or a callable could not be dumped.
    #[error("load error: {0}")]
    Load(String),

    /// A script body raised an error.
    #[error("{0}")]
    Script(String),

    /// The automation provider reported a failure.
    #[error("automation: {0}")]
    Automation(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Exit level a failed command reports to its caller.
    ///
    /// A script that raised produced no level of its own, so it reports 0 and the
    /// error travels alongside it. Everything else is an ordinary command failure.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Script(_) => 0,
            _ => 255,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
