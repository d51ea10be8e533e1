//! Standard stream handles attached to an execution context.
//!
//! Handles are cheap to clone (they share the underlying descriptor). Use
//! `try_clone` when an independent descriptor is needed, e.g. when a context is
//! duplicated for a replacement command.

use std::fs::File;
use std::io::{self, Cursor, PipeReader, PipeWriter, Read, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

/// Where a command reads its standard input from.
#[derive(Debug, Clone)]
pub enum Input {
    /// The host process's own stdin.
    Inherit,
    File(Arc<File>),
    Pipe(Arc<PipeReader>),
    /// In-memory bytes, e.g. the captured output of a previous pipeline stage.
    Memory(Arc<Mutex<Cursor<Vec<u8>>>>),
}

impl Input {
    /// Create an input that yields `bytes` and then end-of-file.
    pub fn memory(bytes: impl Into<Vec<u8>>) -> Self {
        Input::Memory(Arc::new(Mutex::new(Cursor::new(bytes.into()))))
    }

    pub fn file(file: File) -> Self {
        Input::File(Arc::new(file))
    }

    /// True when this is the host process's stdin.
    pub fn is_default(&self) -> bool {
        matches!(self, Input::Inherit)
    }

    /// Duplicate the handle so the copy owns its own descriptor.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            Input::Inherit => Input::Inherit,
            Input::File(f) => Input::File(Arc::new(f.try_clone()?)),
            Input::Pipe(p) => Input::Pipe(Arc::new(p.try_clone()?)),
            Input::Memory(m) => Input::Memory(Arc::clone(m)),
        })
    }

    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    ///
    /// Returns `None` for in-memory input; the caller must pipe the bytes in.
    pub fn stdio(&self) -> io::Result<Option<Stdio>> {
        Ok(match self {
            Input::Inherit => Some(Stdio::inherit()),
            Input::File(f) => Some(Stdio::from(f.try_clone()?)),
            Input::Pipe(p) => Some(Stdio::from(p.try_clone()?)),
            Input::Memory(_) => None,
        })
    }

    /// Drain whatever an in-memory input has not yielded yet.
    pub(crate) fn take_remaining(&self) -> Vec<u8> {
        match self {
            Input::Memory(m) => {
                let mut cursor = m.lock().unwrap_or_else(PoisonError::into_inner);
                let mut rest = Vec::new();
                // Reading from a cursor cannot fail.
                let _ = cursor.read_to_end(&mut rest);
                rest
            }
            _ => Vec::new(),
        }
    }
}

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Input::Inherit => io::stdin().read(buf),
            Input::File(f) => (&**f).read(buf),
            Input::Pipe(p) => (&**p).read(buf),
            Input::Memory(m) => m.lock().unwrap_or_else(PoisonError::into_inner).read(buf),
        }
    }
}

/// Where a command writes one of its output streams.
#[derive(Debug, Clone)]
pub enum Output {
    /// The host process's own stdout.
    Stdout,
    /// The host process's own stderr.
    Stderr,
    File(Arc<File>),
    Pipe(Arc<PipeWriter>),
}

impl Output {
    pub fn file(file: File) -> Self {
        Output::File(Arc::new(file))
    }

    pub fn pipe(writer: PipeWriter) -> Self {
        Output::Pipe(Arc::new(writer))
    }

    /// True when this is one of the host process's own output streams.
    pub fn is_default(&self) -> bool {
        matches!(self, Output::Stdout | Output::Stderr)
    }

    /// Duplicate the handle so the copy owns its own descriptor.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            Output::Stdout => Output::Stdout,
            Output::Stderr => Output::Stderr,
            Output::File(f) => Output::File(Arc::new(f.try_clone()?)),
            Output::Pipe(p) => Output::Pipe(Arc::new(p.try_clone()?)),
        })
    }

    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    pub fn stdio(&self) -> io::Result<Stdio> {
        Ok(match self {
            Output::Stdout => Stdio::from(io::stdout()),
            Output::Stderr => Stdio::from(io::stderr()),
            Output::File(f) => Stdio::from(f.try_clone()?),
            Output::Pipe(p) => Stdio::from(p.try_clone()?),
        })
    }
}

impl Write for Output {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout => io::stdout().write(data),
            Output::Stderr => io::stderr().write(data),
            Output::File(f) => (&**f).write(data),
            Output::Pipe(p) => (&**p).write(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout => io::stdout().flush(),
            Output::Stderr => io::stderr().flush(),
            Output::File(f) => (&**f).flush(),
            Output::Pipe(p) => (&**p).flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_input_is_shared_between_clones() {
        let mut first = Input::memory("hello world");
        let second = first.clone();

        let mut head = [0u8; 5];
        first.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"hello");
        assert_eq!(second.take_remaining(), b" world");
        assert!(first.take_remaining().is_empty());
    }

    #[test]
    fn defaults_are_the_host_streams() {
        assert!(Input::Inherit.is_default());
        assert!(!Input::memory(Vec::new()).is_default());
        assert!(Output::Stdout.is_default());
        assert!(Output::Stderr.is_default());

        let (_reader, writer) = io::pipe().unwrap();
        assert!(!Output::pipe(writer).is_default());
    }

    #[test]
    fn pipe_output_reaches_reader() {
        let (mut reader, writer) = io::pipe().unwrap();
        let mut out = Output::pipe(writer);
        let mut dup = out.try_clone().unwrap();
        out.write_all(b"one ").unwrap();
        dup.write_all(b"two").unwrap();
        drop(out);
        drop(dup);

        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "one two");
    }
}
