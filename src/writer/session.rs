use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::encoding::{Encoding, ErrorPolicy};
use super::error::WriterError;
use super::tmpname;
use super::validate::{
    MinimumSizeValidator, SimilarLineCountValidator, SimilarSizeValidator, Validator,
};
use crate::config::WriterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Write,
    Append,
}

impl OpenMode {
    /// Parse a mode string such as `"w"`, `"wb"` or `"a+"`.
    pub fn parse(mode: &str) -> Result<Self, WriterError> {
        let invalid = || WriterError::InvalidMode {
            mode: mode.to_string(),
        };
        let mut chars = mode.chars();
        let parsed = match chars.next() {
            Some('w') => OpenMode::Write,
            Some('a') => OpenMode::Append,
            _ => return Err(invalid()),
        };
        if chars.any(|c| !matches!(c, 'b' | 't' | '+')) {
            return Err(invalid());
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    mode: OpenMode,
    encoding: Encoding,
    errors: ErrorPolicy,
    replace_equal: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mode(mode: &str) -> Result<Self, WriterError> {
        Ok(Self::new().mode(OpenMode::parse(mode)?))
    }

    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn errors(mut self, errors: ErrorPolicy) -> Self {
        self.errors = errors;
        self
    }

    /// Replace the target even when the new content is byte-identical.
    pub fn replace_equal(mut self, replace_equal: bool) -> Self {
        self.replace_equal = replace_equal;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    ClosedReplaced,
    ClosedDiscarded,
    ClosedFailed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self != SessionState::Open
    }
}

/// Result of [`WriteSession::close_dry_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DryRun {
    pub would_replace: bool,
}

/// Factory for write sessions sharing one process-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct AtomicWriter {
    config: WriterConfig,
}

impl AtomicWriter {
    /// Fails if the configuration carries an unusable limit multiplier.
    pub fn new(config: WriterConfig) -> Result<Self, WriterError> {
        config.validate()?;
        if config.checks_disabled {
            log::warn!("checks_disabled is set; no output validation will be done");
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Start a session for `target`. The temp file is created immediately;
    /// in append mode it is seeded with the target's current content.
    pub fn open(
        &self,
        target: impl AsRef<Path>,
        options: &OpenOptions,
    ) -> Result<WriteSession, WriterError> {
        let target = target.as_ref().to_path_buf();
        let temp = tmpname::make_temp_path(&target)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)?;
        let mut file = BufWriter::new(file);

        if options.mode == OpenMode::Append {
            if let Err(e) = copy_existing(&target, &mut file) {
                drop(file);
                let _ = fs::remove_file(&temp);
                return Err(e.into());
            }
        }

        log::debug!(
            "Opened {} for {:?} via {}",
            target.display(),
            options.mode,
            temp.display()
        );

        Ok(WriteSession {
            target,
            temp,
            options: options.clone(),
            config: self.config.clone(),
            validators: Vec::new(),
            checks_enabled: true,
            file: Some(file),
            state: SessionState::Open,
            dry_run: None,
        })
    }

    /// Run `f` against a fresh session, closing it on `Ok` and aborting it
    /// on `Err`. An aborted session never touches the target.
    pub fn write_with<T, E, F>(
        &self,
        target: impl AsRef<Path>,
        options: &OpenOptions,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut WriteSession) -> Result<T, E>,
        E: From<WriterError>,
    {
        let mut session = self.open(target, options)?;
        match f(&mut session) {
            Ok(value) => {
                session.close()?;
                Ok(value)
            }
            Err(e) => {
                session.abort();
                Err(e)
            }
        }
    }
}

/// One open write against a target path.
///
/// Dropping a session that is still open aborts it, same as
/// [`WriteSession::abort`].
#[derive(Debug)]
pub struct WriteSession {
    target: PathBuf,
    temp: PathBuf,
    options: OpenOptions,
    config: WriterConfig,
    validators: Vec<Box<dyn Validator>>,
    checks_enabled: bool,
    file: Option<BufWriter<File>>,
    state: SessionState,
    dry_run: Option<DryRun>,
}

impl WriteSession {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> OpenMode {
        self.options.mode
    }

    /// Whether close promoted the temp file over the target.
    pub fn replaced_file(&self) -> bool {
        self.state == SessionState::ClosedReplaced
    }

    pub fn set_min_size(&mut self, min_size: u64) {
        self.add_validator(Box::new(MinimumSizeValidator::new(min_size)));
    }

    pub fn set_max_pct_change(&mut self, max_pct_change: f64) -> Result<(), WriterError> {
        let validator = SimilarSizeValidator::new(max_pct_change, &self.config)?;
        self.add_validator(Box::new(validator));
        Ok(())
    }

    pub fn set_max_line_change(&mut self, max_line_change: u64) {
        self.add_validator(Box::new(SimilarLineCountValidator::new(max_line_change)));
    }

    /// Validators run in the order they were added.
    pub fn add_validator(&mut self, validator: Box<dyn Validator>) {
        self.validators.push(validator);
    }

    /// Skip validation for this session only.
    pub fn disable_checks(&mut self) {
        log::warn!(
            "Output checks disabled for {}; it will be replaced without validation",
            self.target.display()
        );
        self.checks_enabled = false;
    }

    /// Encode `text` with the session's encoding and write it.
    pub fn write_text(&mut self, text: &str) -> Result<(), WriterError> {
        let mut bytes = Vec::with_capacity(text.len());
        self.options
            .encoding
            .encode_into(text, self.options.errors, &mut bytes)?;
        self.write_all(&bytes)?;
        Ok(())
    }

    /// Finish the session: validate, then replace the target or discard
    /// identical output. Calling it again after any outcome is a no-op.
    pub fn close(&mut self) -> Result<SessionState, WriterError> {
        self.close_with(finish_file)
    }

    fn close_with(
        &mut self,
        finish: impl FnOnce(BufWriter<File>) -> io::Result<()>,
    ) -> Result<SessionState, WriterError> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        self.close_handle(finish)?;

        let outcome = self
            .validate_and_compare()
            .and_then(|replace| self.promote(replace));
        match outcome {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                self.state = SessionState::ClosedFailed;
                Err(e)
            }
        }
    }

    /// Like [`close`](Self::close) but never touches the target: reports
    /// whether it would have been replaced and removes the temp file.
    pub fn close_dry_run(&mut self) -> Result<DryRun, WriterError> {
        if self.state.is_terminal() {
            return Ok(self.dry_run.unwrap_or(DryRun {
                would_replace: self.replaced_file(),
            }));
        }
        self.close_handle(finish_file)?;

        let outcome = self.validate_and_compare().and_then(|replace| {
            fs::remove_file(&self.temp)?;
            Ok(DryRun {
                would_replace: replace,
            })
        });
        match outcome {
            Ok(dry_run) => {
                self.state = SessionState::ClosedDiscarded;
                self.dry_run = Some(dry_run);
                Ok(dry_run)
            }
            Err(e) => {
                self.state = SessionState::ClosedFailed;
                Err(e)
            }
        }
    }

    /// Close the handle without validating or promoting. The temp file is
    /// left behind and the target is untouched.
    pub fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        // BufWriter flushes on drop; errors are ignored.
        self.file = None;
        self.state = SessionState::ClosedFailed;
        log::warn!(
            "Write to {} aborted; partial output left in {}",
            self.target.display(),
            self.temp.display()
        );
    }

    fn handle(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file.as_mut().ok_or_else(|| {
            io::Error::other(format!(
                "write session for {} is closed",
                self.target.display()
            ))
        })
    }

    fn close_handle(
        &mut self,
        finish: impl FnOnce(BufWriter<File>) -> io::Result<()>,
    ) -> Result<(), WriterError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        if let Err(e) = finish(file) {
            self.state = SessionState::ClosedFailed;
            log::warn!(
                "Closing output for {} failed; temp file left at {}",
                self.target.display(),
                self.temp.display()
            );
            return Err(e.into());
        }
        Ok(())
    }

    /// Run validators, then report whether the target should be replaced.
    /// The target is only read when identical output is to be discarded.
    fn validate_and_compare(&self) -> Result<bool, WriterError> {
        if let Err(e) = self.run_validators() {
            log::warn!(
                "Output for {} rejected; temp file left at {} for inspection",
                self.target.display(),
                self.temp.display()
            );
            return Err(e);
        }
        if self.options.replace_equal {
            return Ok(true);
        }
        Ok(!files_equal(&self.temp, &self.target)?)
    }

    fn run_validators(&self) -> Result<(), WriterError> {
        if self.config.checks_disabled {
            log::warn!(
                "checks_disabled is set; {} is not validated",
                self.target.display()
            );
            return Ok(());
        }
        if !self.checks_enabled {
            log::warn!(
                "Checks disabled by caller; {} is not validated",
                self.target.display()
            );
            return Ok(());
        }
        for validator in &self.validators {
            log::debug!(
                "Running {} check for {}",
                validator.name(),
                self.target.display()
            );
            validator.validate(&self.target, &self.temp)?;
        }
        Ok(())
    }

    fn promote(&self, replace: bool) -> Result<SessionState, WriterError> {
        if !replace {
            fs::remove_file(&self.temp)?;
            log::debug!("{} unchanged, discarded new output", self.target.display());
            return Ok(SessionState::ClosedDiscarded);
        }
        fs::rename(&self.temp, &self.target)?;
        log::debug!("Replaced {}", self.target.display());
        Ok(SessionState::ClosedReplaced)
    }
}

impl Write for WriteSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle()?.flush()
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if self.state == SessionState::Open {
            self.abort();
        }
    }
}

fn finish_file(file: BufWriter<File>) -> io::Result<()> {
    file.into_inner()
        .map_err(|e| e.into_error())?
        .sync_all()
}

fn copy_existing(target: &Path, dest: &mut impl Write) -> io::Result<()> {
    match File::open(target) {
        Ok(mut src) => {
            io::copy(&mut src, dest)?;
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Byte-for-byte comparison; a missing `b` is never equal.
fn files_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let b_meta = match fs::metadata(b) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if fs::metadata(a)?.len() != b_meta.len() {
        return Ok(false);
    }

    let mut ra = BufReader::new(File::open(a)?);
    let mut rb = BufReader::new(File::open(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = fill(&mut ra, &mut buf_a)?;
        let m = fill(&mut rb, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!(OpenMode::parse("w").unwrap(), OpenMode::Write);
        assert_eq!(OpenMode::parse("wb").unwrap(), OpenMode::Write);
        assert_eq!(OpenMode::parse("a+").unwrap(), OpenMode::Append);
        assert_eq!(OpenMode::parse("ab").unwrap(), OpenMode::Append);

        for bad in ["r", "r+", "rb", "x", "", "wr", "wx"] {
            assert!(
                matches!(
                    OpenMode::parse(bad),
                    Err(WriterError::InvalidMode { .. })
                ),
                "mode {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_open_creates_temp_immediately() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");

        let mut session = AtomicWriter::default()
            .open(&target, &OpenOptions::new())
            .unwrap();
        assert!(session.temp_path().exists());
        assert!(!target.exists());
        assert_eq!(session.state(), SessionState::Open);

        session.close().unwrap();
        assert!(!session.temp_path().exists());
    }

    #[test]
    fn test_write_after_close_fails() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");

        let mut session = AtomicWriter::default()
            .open(&target, &OpenOptions::new())
            .unwrap();
        session.write_all(b"done").unwrap();
        session.close().unwrap();
        assert!(session.write_all(b"more").is_err());
        assert_eq!(fs::read(&target).unwrap(), b"done");
    }

    #[test]
    fn test_abort_leaves_temp_behind() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");

        let mut session = AtomicWriter::default()
            .open(&target, &OpenOptions::new())
            .unwrap();
        session.write_all(b"partial").unwrap();
        session.abort();

        assert_eq!(session.state(), SessionState::ClosedFailed);
        assert!(!target.exists());
        assert_eq!(fs::read(session.temp_path()).unwrap(), b"partial");
        // close after abort is a no-op
        assert_eq!(session.close().unwrap(), SessionState::ClosedFailed);
        assert!(!target.exists());
    }

    #[test]
    fn test_drop_aborts_open_session() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");
        fs::write(&target, "original").unwrap();

        let temp_path = {
            let mut session = AtomicWriter::default()
                .open(&target, &OpenOptions::new())
                .unwrap();
            session.write_all(b"garbage").unwrap();
            session.temp_path().to_path_buf()
        };

        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(temp_path.exists());
        assert_eq!(dir_entries(temp.path()).len(), 2);
    }

    #[test]
    fn test_files_equal() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, vec![7u8; 20_000]).unwrap();

        assert!(!files_equal(&a, &b).unwrap());

        fs::write(&b, vec![7u8; 20_000]).unwrap();
        assert!(files_equal(&a, &b).unwrap());

        let mut other = vec![7u8; 20_000];
        other[19_999] = 8;
        fs::write(&b, other).unwrap();
        assert!(!files_equal(&a, &b).unwrap());

        fs::write(&b, vec![7u8; 19_999]).unwrap();
        assert!(!files_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_dry_run_reports_without_replacing() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");
        fs::write(&target, "old").unwrap();
        let writer = AtomicWriter::default();

        let mut session = writer.open(&target, &OpenOptions::new()).unwrap();
        session.write_all(b"new").unwrap();
        let dry_run = session.close_dry_run().unwrap();
        assert!(dry_run.would_replace);
        assert_eq!(session.state(), SessionState::ClosedDiscarded);
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert_eq!(dir_entries(temp.path()), vec!["out.txt".to_string()]);

        let mut session = writer.open(&target, &OpenOptions::new()).unwrap();
        session.write_all(b"old").unwrap();
        assert!(!session.close_dry_run().unwrap().would_replace);
    }

    #[test]
    fn test_repeated_dry_run_keeps_result() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");
        fs::write(&target, "old").unwrap();

        let mut session = AtomicWriter::default()
            .open(&target, &OpenOptions::new())
            .unwrap();
        session.write_all(b"new").unwrap();
        assert!(session.close_dry_run().unwrap().would_replace);
        assert!(session.close_dry_run().unwrap().would_replace);
        assert_eq!(session.close().unwrap(), SessionState::ClosedDiscarded);
        assert!(!session.replaced_file());
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
    }

    #[test]
    fn test_replace_equal_skips_compare() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");
        fs::write(&target, "same").unwrap();
        let writer = AtomicWriter::default();
        let options = OpenOptions::new().replace_equal(true);

        let mut session = writer.open(&target, &options).unwrap();
        session.write_all(b"same").unwrap();
        assert!(session.close_dry_run().unwrap().would_replace);

        let mut session = writer.open(&target, &options).unwrap();
        session.write_all(b"same").unwrap();
        assert_eq!(session.close().unwrap(), SessionState::ClosedReplaced);
    }

    #[test]
    fn test_new_rejects_bad_config() {
        for multiplier in [f64::NAN, 0.0, -2.0, f64::INFINITY] {
            let config = WriterConfig {
                limit_multiplier: multiplier,
                ..WriterConfig::default()
            };
            assert!(matches!(
                AtomicWriter::new(config),
                Err(WriterError::InvalidLimit {
                    name: "limit_multiplier",
                    ..
                })
            ));
        }
        assert!(AtomicWriter::new(WriterConfig::default()).is_ok());
    }

    #[test]
    fn test_set_max_pct_change_rejects_bad_limits() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");

        let mut session = AtomicWriter::default()
            .open(&target, &OpenOptions::new())
            .unwrap();
        for limit in [f64::NAN, -1.0, f64::INFINITY] {
            assert!(matches!(
                session.set_max_pct_change(limit),
                Err(WriterError::InvalidLimit {
                    name: "max_pct_change",
                    ..
                })
            ));
        }
        assert!(session.set_max_pct_change(0.0).is_ok());
        session.abort();
    }

    #[test]
    fn test_failed_handle_close_keeps_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");
        fs::write(&target, "original").unwrap();

        let mut session = AtomicWriter::default()
            .open(&target, &OpenOptions::new())
            .unwrap();
        session.write_all(b"new").unwrap();
        let err = session
            .close_with(|_| Err(io::Error::other("disk full")))
            .unwrap_err();

        assert!(matches!(err, WriterError::Io(_)));
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(session.state(), SessionState::ClosedFailed);
        assert!(session.temp_path().exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert_eq!(session.close().unwrap(), SessionState::ClosedFailed);
        assert!(session.write_all(b"more").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_equal_never_reads_fifo_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("pipe");
        let status = std::process::Command::new("mkfifo")
            .arg(&target)
            .status()
            .unwrap();
        assert!(status.success());

        let mut session = AtomicWriter::default()
            .open(&target, &OpenOptions::new().replace_equal(true))
            .unwrap();
        session.write_all(b"data").unwrap();
        assert_eq!(session.close().unwrap(), SessionState::ClosedReplaced);
        assert!(fs::metadata(&target).unwrap().is_file());
        assert_eq!(fs::read(&target).unwrap(), b"data");
    }

    #[test]
    fn test_per_session_disable_skips_validators() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");

        let mut session = AtomicWriter::default()
            .open(&target, &OpenOptions::new())
            .unwrap();
        session.set_min_size(1_000);
        session.disable_checks();
        session.write_all(b"tiny").unwrap();
        assert_eq!(session.close().unwrap(), SessionState::ClosedReplaced);
        assert_eq!(fs::read(&target).unwrap(), b"tiny");
    }
}
