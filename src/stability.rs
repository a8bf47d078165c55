//! Stability detector: a file is "stable" once two samples, taken
//! `stability_retry_delay` apart, agree on size and modification time and
//! the file is non-empty.

use std::path::Path;
use std::time::Duration;

use crate::error::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub size: u64,
    pub modified: Option<std::time::SystemTime>,
}

fn sample(path: &Path) -> Result<Sample, StageError> {
    let meta = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StageError::NotFound(path.display().to_string())
        } else {
            StageError::Unstable(format!("{}: {e}", path.display()))
        }
    })?;
    Ok(Sample { size: meta.len(), modified: meta.modified().ok() })
}

/// Take two samples `delay` apart; stable iff they agree and the file is
/// non-empty. Returns `Ok(false)` (not an error) when the file is simply
/// still changing, so the caller can re-enqueue for another attempt.
pub fn check_stable(path: &Path, delay: Duration) -> Result<bool, StageError> {
    let first = sample(path)?;
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
    let second = sample(path)?;
    Ok(first == second && second.size > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_file_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"hello").unwrap();
        assert!(check_stable(&path, Duration::from_millis(0)).unwrap());
    }

    #[test]
    fn empty_file_is_not_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();
        assert!(!check_stable(&path, Duration::from_millis(0)).unwrap());
    }

    #[test]
    fn missing_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        let err = check_stable(&path, Duration::from_millis(0)).unwrap_err();
        assert!(matches!(err, StageError::NotFound(_)));
    }
}
