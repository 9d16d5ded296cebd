use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::error::WriterError;
use crate::config::WriterConfig;

/// A check run against the finished temp file before it replaces the target.
///
/// `target` may not exist yet; `temp` is always fully written and closed.
pub trait Validator: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn validate(&self, target: &Path, temp: &Path) -> Result<(), WriterError>;
}

/// Rejects files smaller than `min_size` bytes. A floor of 0 disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumSizeValidator {
    min_size: u64,
}

impl MinimumSizeValidator {
    pub fn new(min_size: u64) -> Self {
        Self { min_size }
    }
}

impl Validator for MinimumSizeValidator {
    fn name(&self) -> &'static str {
        "minimum-size"
    }

    fn validate(&self, target: &Path, temp: &Path) -> Result<(), WriterError> {
        if self.min_size == 0 {
            log::info!(
                "{}: no minimum size configured, skipping check",
                target.display()
            );
            return Ok(());
        }

        let size = std::fs::metadata(temp)?.len();
        if size < self.min_size {
            return Err(WriterError::FileTooSmall {
                path: target.to_path_buf(),
                size,
                min_size: self.min_size,
            });
        }
        Ok(())
    }
}

/// Rejects a new file whose byte size differs from the current target by
/// more than a percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarSizeValidator {
    max_pct_change: Option<f64>,
    disabled: bool,
}

impl SimilarSizeValidator {
    /// `max_pct_change` is scaled by the configured multiplier. Negative or
    /// non-finite limits are rejected.
    pub fn new(max_pct_change: f64, config: &WriterConfig) -> Result<Self, WriterError> {
        if !max_pct_change.is_finite() || max_pct_change < 0.0 {
            return Err(WriterError::InvalidLimit {
                name: "max_pct_change",
                value: max_pct_change,
                expected: "a finite non-negative percentage",
            });
        }
        config.validate()?;

        let effective = max_pct_change * config.limit_multiplier;
        if config.limit_multiplier != 1.0 {
            log::warn!(
                "limit_multiplier is set to {}; change limit will be {}% rather than the requested {}%",
                config.limit_multiplier,
                effective,
                max_pct_change
            );
        }
        log::debug!("Similar size change limit set to {}%", effective);
        Ok(Self {
            max_pct_change: Some(effective),
            disabled: config.similar_size_disabled,
        })
    }

    #[cfg(test)]
    fn unlimited(config: &WriterConfig) -> Self {
        Self {
            max_pct_change: None,
            disabled: config.similar_size_disabled,
        }
    }

    pub fn max_pct_change(&self) -> Option<f64> {
        self.max_pct_change
    }
}

impl Validator for SimilarSizeValidator {
    fn name(&self) -> &'static str {
        "similar-size"
    }

    fn validate(&self, target: &Path, temp: &Path) -> Result<(), WriterError> {
        if self.disabled {
            log::warn!(
                "similar_size_disabled is set; no similar file size comparison done for {}",
                target.display()
            );
            return Ok(());
        }
        let Some(limit_pct) = self.max_pct_change else {
            log::info!("{}: no size change limit configured", target.display());
            return Ok(());
        };

        let Some(old_size) = existing_size(target)? else {
            return Ok(());
        };
        // Any change from zero is an infinite percentage; treat as a new file.
        if old_size == 0 {
            return Ok(());
        }

        let new_size = std::fs::metadata(temp)?.len();
        let change_pct = 100.0 * (new_size as f64 / old_size as f64 - 1.0);
        if change_pct.abs() > limit_pct {
            return Err(WriterError::SizeChangeTooBig {
                path: target.to_path_buf(),
                old_size,
                new_size,
                change_pct,
                limit_pct,
            });
        }
        Ok(())
    }
}

/// Rejects a new file whose line count differs from the current target by
/// more than an absolute number of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimilarLineCountValidator {
    max_line_change: Option<u64>,
}

impl SimilarLineCountValidator {
    pub fn new(max_line_change: u64) -> Self {
        log::debug!("Similar line count change limit set to {}", max_line_change);
        Self {
            max_line_change: Some(max_line_change),
        }
    }

    #[cfg(test)]
    fn unlimited() -> Self {
        Self::default()
    }
}

impl Validator for SimilarLineCountValidator {
    fn name(&self) -> &'static str {
        "similar-line-count"
    }

    fn validate(&self, target: &Path, temp: &Path) -> Result<(), WriterError> {
        let Some(limit) = self.max_line_change else {
            log::info!("{}: no line count change limit configured", target.display());
            return Ok(());
        };

        let old_lines = count_lines(target)?;
        let new_lines = count_lines(temp)?;
        let delta = old_lines.abs_diff(new_lines);
        if delta > limit {
            return Err(WriterError::LineCountChangeTooBig {
                path: target.to_path_buf(),
                old_lines,
                new_lines,
                delta,
                limit,
            });
        }
        Ok(())
    }
}

fn existing_size(path: &Path) -> io::Result<Option<u64>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Newline count plus one; a missing file has 0 lines.
pub(crate) fn count_lines(path: &Path) -> io::Result<u64> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut reader = BufReader::new(file);
    let mut buf = [0u8; 8192];
    let mut newlines = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        newlines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }
    Ok(newlines + 1)
}
