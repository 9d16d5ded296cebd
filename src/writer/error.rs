use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("unsupported open mode '{mode}': expected a write ('w') or append ('a') mode")]
    InvalidMode { mode: String },

    #[error("unable to find an available temporary filename for {target} after {attempts} attempts")]
    TempFileCreation { target: PathBuf, attempts: usize },

    #[error("{path}: file is too small: current: {size}, minimum allowed: {min_size}")]
    FileTooSmall {
        path: PathBuf,
        size: u64,
        min_size: u64,
    },

    #[error(
        "{path}: file size changed more than {limit_pct}%: {old_size} -> {new_size} ({change_pct:+.1})"
    )]
    SizeChangeTooBig {
        path: PathBuf,
        old_size: u64,
        new_size: u64,
        change_pct: f64,
        limit_pct: f64,
    },

    #[error("{path}: file changed more than {limit} lines: {old_lines} -> {new_lines} ({delta})")]
    LineCountChangeTooBig {
        path: PathBuf,
        old_lines: u64,
        new_lines: u64,
        delta: u64,
        limit: u64,
    },

    #[error("{name} must be {expected}, got {value}")]
    InvalidLimit {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("cannot encode {ch:?} at position {position} as {encoding}")]
    Encode {
        ch: char,
        position: usize,
        encoding: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WriterError {
    /// True for any rejection raised by a validator.
    pub fn is_file_change(&self) -> bool {
        matches!(
            self,
            Self::FileTooSmall { .. }
                | Self::SizeChangeTooBig { .. }
                | Self::LineCountChangeTooBig { .. }
        )
    }

    /// True for rejections based on the byte size of the new file.
    pub fn is_size_change(&self) -> bool {
        matches!(self, Self::FileTooSmall { .. } | Self::SizeChangeTooBig { .. })
    }
}
