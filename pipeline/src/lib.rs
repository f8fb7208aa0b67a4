pub mod error;
pub mod format;
pub mod pipeline;
pub mod progress;
pub mod reader;
pub mod slot;
pub mod supervisor;
pub mod writer;

// Re-export the error type for convenience
pub use error::CopyError;

// Re-export pipeline types for convenience
pub use pipeline::{Pipeline, ReaderState, WriterState, DEFAULT_CHUNK_SIZE};

// Re-export slot types for convenience
pub use slot::{DrainGuard, FillGuard, Slot};

// Re-export progress types for convenience
pub use progress::{progress_line, ProgressReporter, ProgressSnapshot, PROGRESS_SIGNALS};

// Re-export supervisor types for convenience
pub use supervisor::{CopyConfig, CopySummary};
