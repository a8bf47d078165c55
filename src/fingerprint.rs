//! Content fingerprinter: adaptive streaming MD5, sized to the file so a
//! 4 KB rule file and a 4 GB package get read with proportionate buffers.

use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::StageError;

const TEN_MB: u64 = 10 * 1024 * 1024;
const ONE_GB: u64 = 1024 * 1024 * 1024;
const SMALL_CHUNK: usize = 64 * 1024;
const LARGE_CHUNK: usize = 1024 * 1024;

/// The canonical MD5 of zero bytes, returned directly for empty files
/// without opening a hasher.
pub const EMPTY_DIGEST: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// Hash `path`, calling `progress(percent, path)` at chunk boundaries for
/// files large enough to stream (the in-memory band reports only 0 and 100).
pub fn fingerprint_file(
    path: &Path,
    size_hint: u64,
    mut progress: impl FnMut(u8, &str),
) -> Result<String, StageError> {
    if size_hint == 0 {
        return Ok(EMPTY_DIGEST.to_string());
    }

    let path_str = path.display().to_string();
    let mut file = std::fs::File::open(path)
        .map_err(|e| StageError::HashFailed(path_str.clone(), e.to_string()))?;

    if size_hint <= TEN_MB {
        progress(0, &path_str);
        let mut buf = Vec::with_capacity(size_hint as usize);
        file.read_to_end(&mut buf).map_err(|e| StageError::HashFailed(path_str.clone(), e.to_string()))?;
        let digest = Md5::digest(&buf);
        progress(100, &path_str);
        return Ok(hex(&digest));
    }

    let chunk_size = if size_hint <= ONE_GB { SMALL_CHUNK } else { LARGE_CHUNK };
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; chunk_size];
    let mut read_total = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(|e| StageError::HashFailed(path_str.clone(), e.to_string()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        read_total += n as u64;
        let percent = ((read_total as f64 / size_hint as f64) * 100.0).min(100.0) as u8;
        progress(percent, &path_str);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Fingerprint every `(path, size)` pair, bounded by `concurrency` workers.
/// Absent an explicit cap, the caller should pass
/// `min(items.len(), available_parallelism)`.
pub fn fingerprint_batch(
    items: &[(std::path::PathBuf, u64)],
    concurrency: usize,
    on_progress: impl Fn(u8, &str) + Send + Sync,
) -> Vec<Result<String, StageError>> {
    let concurrency = concurrency.max(1);
    let (work_tx, work_rx) = crossbeam_channel::unbounded::<usize>();
    for i in 0..items.len() {
        work_tx.send(i).unwrap();
    }
    drop(work_tx);

    let results: Vec<Mutex<Option<Result<String, StageError>>>> =
        items.iter().map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        for _ in 0..concurrency.min(items.len().max(1)) {
            let work_rx = work_rx.clone();
            let results = &results;
            let on_progress = &on_progress;
            scope.spawn(move || {
                for idx in work_rx.iter() {
                    let (path, size) = &items[idx];
                    let res = fingerprint_file(path, *size, |p, s| on_progress(p, s));
                    *results[idx].lock().unwrap() = Some(res);
                }
            });
        }
    });

    results.into_iter().map(|m| m.into_inner().unwrap().unwrap()).collect()
}

use std::sync::Mutex;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_canonical_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();
        let digest = fingerprint_file(&path, 0, |_, _| {}).unwrap();
        assert_eq!(digest, EMPTY_DIGEST);
    }

    #[test]
    fn small_file_hashes_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"hello world").unwrap();
        let digest = fingerprint_file(&path, 11, |_, _| {}).unwrap();
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn batch_hashes_every_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut items = Vec::new();
        for i in 0..4 {
            let path = dir.path().join(format!("f{i}.bin"));
            std::fs::write(&path, format!("payload-{i}")).unwrap();
            let size = std::fs::metadata(&path).unwrap().len();
            items.push((path, size));
        }
        let results = fingerprint_batch(&items, 2, |_, _| {});
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
