//! FTP/FTPS transport adapter built on `suppaftp`. FTPS reuses the same
//! stream type after an explicit `AUTH TLS` upgrade, so one adapter serves
//! both protocols, parameterized by whether TLS was negotiated.

use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use suppaftp::native_tls::TlsConnector;
use suppaftp::{FtpStream, types::FileType};

use crate::config::{Protocol, TransportOptions};
use crate::error::{TransportError, TransportErrorCode};

use super::TransportAdapter;

pub struct FtpTransport {
    stream: FtpStream,
    protocol: Protocol,
}

fn conn_err(protocol: Protocol, e: impl std::fmt::Display) -> TransportError {
    TransportError::new(protocol, TransportErrorCode::ConnectionError, e.to_string())
}

impl FtpTransport {
    pub fn connect(opts: &TransportOptions, secure: bool) -> Result<Self, TransportError> {
        let protocol = if secure { Protocol::Ftps } else { Protocol::Ftp };
        let addr = format!("{}:{}", opts.host, opts.port);
        let mut stream = FtpStream::connect(&addr).map_err(|e| conn_err(protocol, e))?;
        let _ = stream.get_ref().set_read_timeout(Some(Duration::from_millis(opts.timeout_ms)));

        let mut stream = if secure {
            // Server certificate is not validated by default, matching the
            // rest of this crate's "ship it, don't gatekeep on PKI" stance
            // for FTPS targets that are usually self-signed internal hosts.
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| conn_err(protocol, e))?;
            stream.into_secure(connector, &opts.host).map_err(|e| conn_err(protocol, e))?
        } else {
            stream
        };

        stream.login(&opts.username, &opts.password).map_err(|e| conn_err(protocol, e))?;
        stream.transfer_type(FileType::Binary).map_err(|e| conn_err(protocol, e))?;

        Ok(Self { stream, protocol })
    }
}

impl TransportAdapter for FtpTransport {
    fn ensure_remote_dir_all(&mut self, remote_dir: &str) -> Result<(), TransportError> {
        let mut accum = String::new();
        for seg in remote_dir.split('/').filter(|s| !s.is_empty()) {
            accum.push('/');
            accum.push_str(seg);
            if self.stream.cwd(&accum).is_ok() {
                continue;
            }
            self.stream.mkdir(&accum).map_err(|e| {
                TransportError::new(self.protocol, TransportErrorCode::MkdirError, format!("mkdir {accum}: {e}"))
            })?;
            self.stream.cwd(&accum).map_err(|e| {
                TransportError::new(self.protocol, TransportErrorCode::MkdirError, format!("cwd {accum}: {e}"))
            })?;
        }
        Ok(())
    }

    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<(), TransportError> {
        let file = std::fs::File::open(local_path).map_err(|e| {
            TransportError::new(
                self.protocol,
                TransportErrorCode::LocalFileNotFound,
                format!("{}: {e}", local_path.display()),
            )
        })?;
        let mut reader = BufReader::new(file);
        let file_name =
            Path::new(remote_path).file_name().and_then(|n| n.to_str()).unwrap_or(remote_path);
        self.stream.put_file(file_name, &mut reader).map_err(|e| {
            TransportError::new(self.protocol, TransportErrorCode::UnknownError, format!("put {remote_path}: {e}"))
        })?;
        Ok(())
    }

    fn disconnect(&mut self) {
        let _ = self.stream.quit();
    }
}
