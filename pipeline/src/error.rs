//! Error type for the copy pipeline.
//!
//! Each variant corresponds to one failure class the supervisor can report.
//! Loop failures (`Read`, `Write`) carry the `io::Error` captured by the
//! thread that hit them; the supervisor receives it as the thread's join
//! result.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CopyError {
    /// The input file could not be opened.
    OpenInput(io::Error),
    /// The output file could not be created.
    CreateOutput(io::Error),
    /// A slot buffer of the given size could not be allocated.
    Allocation(usize),
    /// A thread could not be spawned, or the progress signal handler could
    /// not be installed.
    Os(io::Error),
    /// The reader's read failed mid-copy.
    Read(io::Error),
    /// The writer's write failed mid-copy.
    Write(io::Error),
    /// A loop observed a state other than its "before first" state on entry.
    StartupRace(&'static str),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyError::OpenInput(err) => write!(f, "cannot open input: {err}"),
            CopyError::CreateOutput(err) => write!(f, "cannot create output: {err}"),
            CopyError::Allocation(size) => write!(f, "cannot allocate a {size}-byte buffer"),
            CopyError::Os(err) => write!(f, "OS error: {err}"),
            CopyError::Read(err) => write!(f, "read failed: {err}"),
            CopyError::Write(err) => write!(f, "write failed: {err}"),
            CopyError::StartupRace(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CopyError {}

impl CopyError {
    /// Process exit code for this failure class, using the sysexits.h
    /// numbering.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            CopyError::OpenInput(_) | CopyError::Read(_) => 66, // EX_NOINPUT
            CopyError::CreateOutput(_) => 73,                   // EX_CANTCREAT
            CopyError::Allocation(_) | CopyError::Os(_) => 71,  // EX_OSERR
            CopyError::Write(_) => 74,                          // EX_IOERR
            CopyError::StartupRace(_) => 70,                    // EX_SOFTWARE
        }
    }
}
