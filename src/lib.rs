//! Crash-safe file replacement for batch exporters.
//!
//! Output is staged in a sibling temp file, checked by the session's
//! validators and only then renamed over the target. Failed or abandoned
//! writes never touch the target.

pub mod cli;
pub mod config;
pub mod writer;

pub use config::WriterConfig;
pub use writer::{
    AtomicWriter, DryRun, Encoding, ErrorPolicy, OpenMode, OpenOptions, SessionState,
    Validator, WriteSession, WriterError,
};
