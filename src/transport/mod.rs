//! Transport layer: uploads sealed packages to a remote destination over
//! FTP, FTPS or SFTP. Every protocol is reduced to the same small adapter
//! trait so the retrying facade in [`transfer_package`] is protocol-agnostic.

mod ftp;
mod sftp;

use std::path::Path;

use chrono::Utc;

use crate::config::{Protocol, TransportOptions};
use crate::error::{TransportError, TransportErrorCode};
use crate::model::TransportResult;

/// A connected remote endpoint capable of creating directories and uploading
/// a single local file. Boxed as a trait object so the facade doesn't need
/// to know which protocol backs a given run.
pub trait TransportAdapter: Send {
    /// Idempotently create `remote_dir` and every missing ancestor.
    fn ensure_remote_dir_all(&mut self, remote_dir: &str) -> Result<(), TransportError>;

    /// Upload `local_path` to `remote_path`, overwriting any existing file.
    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<(), TransportError>;

    /// Best-effort teardown; errors are logged, never propagated.
    fn disconnect(&mut self);
}

/// Connect according to `opts.protocol`, producing a boxed adapter.
pub fn connect(opts: &TransportOptions) -> Result<Box<dyn TransportAdapter>, TransportError> {
    match opts.protocol {
        Protocol::Sftp => sftp::SftpTransport::connect(opts).map(|a| Box::new(a) as _),
        Protocol::Ftp => ftp::FtpTransport::connect(opts, false).map(|a| Box::new(a) as _),
        Protocol::Ftps => ftp::FtpTransport::connect(opts, true).map(|a| Box::new(a) as _),
    }
}

fn remote_join(remote_dir: &str, file_name: &str) -> String {
    if remote_dir.ends_with('/') {
        format!("{remote_dir}{file_name}")
    } else {
        format!("{remote_dir}/{file_name}")
    }
}

/// Upload one local package, retrying transient failures up to
/// `opts.retry_count` times. A fresh connection is established for every
/// retry attempt, since a half-broken control channel is rarely worth
/// reusing.
pub fn transfer_package(
    opts: &TransportOptions,
    local_path: &Path,
    remote_file_name: &str,
) -> TransportResult {
    let started_at = Utc::now();

    if !opts.enabled {
        return TransportResult {
            success: false,
            local_path: local_path.to_path_buf(),
            remote_path: remote_join(&opts.remote_path, remote_file_name),
            retries: 0,
            error: Some(
                TransportError::new(opts.protocol, TransportErrorCode::Disabled, "transport disabled").to_string(),
            ),
            started_at,
            ended_at: Utc::now(),
        };
    }

    if !local_path.exists() {
        return TransportResult {
            success: false,
            local_path: local_path.to_path_buf(),
            remote_path: remote_join(&opts.remote_path, remote_file_name),
            retries: 0,
            error: Some(
                TransportError::new(
                    opts.protocol,
                    TransportErrorCode::LocalFileNotFound,
                    format!("{} does not exist", local_path.display()),
                )
                .to_string(),
            ),
            started_at,
            ended_at: Utc::now(),
        };
    }

    let remote_path = remote_join(&opts.remote_path, remote_file_name);
    // One initial attempt plus up to `retry_count` retries, so `retries` in
    // the returned result can actually reach `retry_count` on total failure.
    let attempts = opts.retry_count.max(1) + 1;
    let mut retries = 0u32;
    let mut last_error: Option<TransportError> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            retries = attempt;
        }
        match attempt_upload(opts, local_path, &remote_path) {
            Ok(()) => {
                return TransportResult {
                    success: true,
                    local_path: local_path.to_path_buf(),
                    remote_path,
                    retries,
                    error: None,
                    started_at,
                    ended_at: Utc::now(),
                };
            }
            Err(e) => {
                let give_up = !e.is_retriable() || attempt + 1 >= attempts;
                last_error = Some(e);
                if give_up {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(crate::util::get_backoff_ms()));
            }
        }
    }

    TransportResult {
        success: false,
        local_path: local_path.to_path_buf(),
        remote_path,
        retries,
        error: last_error.map(|e| e.to_string()),
        started_at,
        ended_at: Utc::now(),
    }
}

fn attempt_upload(
    opts: &TransportOptions,
    local_path: &Path,
    remote_path: &str,
) -> Result<(), TransportError> {
    let mut adapter = connect(opts)?;
    let outcome = (|| -> Result<(), TransportError> {
        adapter.ensure_remote_dir_all(&opts.remote_path)?;
        adapter.upload_file(local_path, remote_path)
    })();
    adapter.disconnect();
    outcome
}
