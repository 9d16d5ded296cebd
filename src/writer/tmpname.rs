use rand::Rng;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::error::WriterError;

const SUFFIX_LEN: usize = 5;
const MAX_ATTEMPTS: usize = 10;
const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Pick an unused scratch path next to `target`: `<target>.<suffix>`.
///
/// Only checks for existence; the caller creates the file.
pub fn make_temp_path(target: &Path) -> Result<PathBuf, WriterError> {
    pick_temp_path(target, |candidate| candidate.exists())
}

fn pick_temp_path(
    target: &Path,
    taken: impl Fn(&Path) -> bool,
) -> Result<PathBuf, WriterError> {
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_ATTEMPTS {
        let candidate = with_suffix(target, &random_suffix(&mut rng));
        if !taken(&candidate) {
            return Ok(candidate);
        }
        log::debug!("Temporary name {} is taken, retrying", candidate.display());
    }

    Err(WriterError::TempFileCreation {
        target: target.to_path_buf(),
        attempts: MAX_ATTEMPTS,
    })
}

fn random_suffix(rng: &mut impl Rng) -> String {
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())] as char)
        .collect()
}

fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_temp_path_is_sibling() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("export.xml");

        let tmp = make_temp_path(&target).unwrap();
        assert_eq!(tmp.parent(), target.parent());

        let name = tmp.file_name().unwrap().to_str().unwrap();
        let suffix = name.strip_prefix("export.xml.").unwrap();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        assert!(!tmp.exists());
    }

    #[test]
    fn test_temp_path_does_not_create_file() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");

        make_temp_path(&target).unwrap();
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_exhausted_attempts() {
        let target = Path::new("/var/cache/export/users.csv");
        let err = pick_temp_path(target, |_| true).unwrap_err();
        match err {
            WriterError::TempFileCreation { target: t, attempts } => {
                assert_eq!(t, target);
                assert_eq!(attempts, MAX_ATTEMPTS);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_retries_on_collision() {
        let calls = std::cell::Cell::new(0);
        let tmp = pick_temp_path(Path::new("out.txt"), |_| {
            calls.set(calls.get() + 1);
            calls.get() < 3
        })
        .unwrap();
        assert_eq!(calls.get(), 3);
        assert!(tmp.to_str().unwrap().starts_with("out.txt."));
    }

    #[test]
    fn test_suffixes_vary() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.txt");

        let a = make_temp_path(&target).unwrap();
        let b = make_temp_path(&target).unwrap();
        let c = make_temp_path(&target).unwrap();
        // 36^5 possibilities; three identical draws would mean a broken generator
        assert!(!(a == b && b == c));
    }
}
