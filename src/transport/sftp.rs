//! SFTP transport adapter built on `ssh2`: a single session + SFTP channel
//! per connection, key auth tried against the usual `~/.ssh` identities,
//! idempotent recursive mkdir walking path components one at a time.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::config::{Protocol, TransportOptions};
use crate::error::{TransportError, TransportErrorCode};

use super::TransportAdapter;

pub struct SftpTransport {
    session: ssh2::Session,
    sftp: ssh2::Sftp,
}

fn create_tcp_connection(addr: &str, timeout_ms: u64) -> Result<TcpStream, TransportError> {
    let mut addrs = addr.to_socket_addrs().map_err(|e| {
        TransportError::new(Protocol::Sftp, TransportErrorCode::ConnectionError, format!("resolving {addr}: {e}"))
    })?;
    let sock = addrs.next().ok_or_else(|| {
        TransportError::new(Protocol::Sftp, TransportErrorCode::ConnectionError, format!("no address for {addr}"))
    })?;
    let timeout = Duration::from_millis(timeout_ms.max(1));
    let tcp = TcpStream::connect_timeout(&sock, timeout).map_err(|e| {
        TransportError::new(Protocol::Sftp, TransportErrorCode::ConnectionError, format!("connecting to {addr}: {e}"))
    })?;
    let _ = tcp.set_read_timeout(Some(timeout));
    let _ = tcp.set_write_timeout(Some(timeout));
    Ok(tcp)
}

fn try_key_authentication(sess: &mut ssh2::Session, username: &str, password: &str) -> bool {
    if sess.authenticated() {
        return true;
    }
    if let Some(home) = dirs_home() {
        for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
            let p = home.join(".ssh").join(name);
            if p.exists() {
                let _ = sess.userauth_pubkey_file(username, None, &p, None);
                if sess.authenticated() {
                    return true;
                }
            }
        }
    }
    if !password.is_empty() {
        let _ = sess.userauth_password(username, password);
        if sess.authenticated() {
            return true;
        }
    }
    false
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

impl SftpTransport {
    pub fn connect(opts: &TransportOptions) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", opts.host, opts.port);
        let tcp = create_tcp_connection(&addr, opts.timeout_ms)?;
        let mut session = ssh2::Session::new().map_err(|e| {
            TransportError::new(Protocol::Sftp, TransportErrorCode::ConnectionError, format!("session init: {e}"))
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| {
            TransportError::new(Protocol::Sftp, TransportErrorCode::ConnectionError, format!("handshake: {e}"))
        })?;

        if !try_key_authentication(&mut session, &opts.username, &opts.password) {
            return Err(TransportError::new(
                Protocol::Sftp,
                TransportErrorCode::ConnectionError,
                format!("authentication failed for {}@{}", opts.username, opts.host),
            ));
        }

        let sftp = session.sftp().map_err(|e| {
            TransportError::new(Protocol::Sftp, TransportErrorCode::ConnectionError, format!("sftp init: {e}"))
        })?;

        Ok(Self { session, sftp })
    }
}

impl TransportAdapter for SftpTransport {
    fn ensure_remote_dir_all(&mut self, remote_dir: &str) -> Result<(), TransportError> {
        let mut accum = PathBuf::new();
        for comp in Path::new(remote_dir).components() {
            match comp {
                Component::RootDir => accum.push(Path::new("/")),
                Component::Prefix(_) | Component::CurDir | Component::ParentDir => {}
                Component::Normal(seg) => accum.push(seg),
            }
            let p = accum.as_path();
            if p.as_os_str().is_empty() {
                continue;
            }
            match self.sftp.stat(p) {
                Ok(st) => {
                    if st.is_file() {
                        return Err(TransportError::new(
                            Protocol::Sftp,
                            TransportErrorCode::MkdirError,
                            format!("{} exists as a file", p.display()),
                        ));
                    }
                }
                Err(_) => {
                    if let Err(e) = self.sftp.mkdir(p, 0o755) {
                        match self.sftp.stat(p) {
                            Ok(st2) if !st2.is_file() => {}
                            _ => {
                                return Err(TransportError::new(
                                    Protocol::Sftp,
                                    TransportErrorCode::MkdirError,
                                    format!("mkdir {}: {e}", p.display()),
                                ));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<(), TransportError> {
        let mut src = std::fs::File::open(local_path).map_err(|e| {
            TransportError::new(
                Protocol::Sftp,
                TransportErrorCode::LocalFileNotFound,
                format!("{}: {e}", local_path.display()),
            )
        })?;
        let mut dst = self.sftp.create(Path::new(remote_path)).map_err(|e| {
            TransportError::new(Protocol::Sftp, TransportErrorCode::UnknownError, format!("create {remote_path}: {e}"))
        })?;
        let mut buf = vec![0u8; 256 * 1024];
        loop {
            let n = src.read(&mut buf).map_err(|e| {
                TransportError::new(Protocol::Sftp, TransportErrorCode::UnknownError, format!("read: {e}"))
            })?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n]).map_err(|e| {
                TransportError::new(Protocol::Sftp, TransportErrorCode::UnknownError, format!("write: {e}"))
            })?;
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        let _ = self.session.disconnect(None, "done", None);
    }
}
