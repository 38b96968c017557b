//! NAS storage backend over SSH/SFTP.
//!
//! Uses `ssh2` (libssh2 bindings), which is blocking; every upload runs inside
//! [`spawn_blocking`](tokio::task::spawn_blocking) with the async upload
//! stream bridged through [`SyncIoBridge`]. A blocking task can't be
//! aborted, so dropping the upload future cancels a [`CancellationToken`]
//! that the copy loop checks between chunks; the session is then torn down.
//!
//! The remote directory handling (create missing directories, refuse to
//! overwrite, stream the copy) is written against the small [`RemoteFs`]
//! trait so that it can run against something other than a live SFTP server.

use crate::backend::{StorageBackend, UploadStream};
use crate::error::{ErrorKind, Result};
use crate::models::{DEFAULT_SSH_PORT, HostKeyPolicy, StorageConfig, StorageType};
use crate::path::{normalize_remote, remote_join, remote_parent, validate as validate_path};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use ssh2::{CheckResult, ErrorCode, KnownHostFileKind, OpenFlags, OpenType, Session, Sftp};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;
/// `LIBSSH2_FX_PERMISSION_DENIED`
const SFTP_PERMISSION_DENIED: i32 = 3;
/// `LIBSSH2_FX_FILE_ALREADY_EXISTS`
const SFTP_FILE_ALREADY_EXISTS: i32 = 11;
const DIRECTORY_MODE: i32 = 0o755;
const FILE_MODE: i32 = 0o644;

/// What a remote path points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteKind {
    File,
    Directory,
    /// Symlink, socket, device...
    Other,
}

/// The handful of remote filesystem operations an upload needs.
///
/// Paths are always forward-slash strings, already normalised.
pub trait RemoteFs {
    /// `Ok(None)` when nothing exists at `path`.
    fn metadata(&self, path: &str) -> Result<Option<RemoteKind>>;
    /// Create a single directory; the parent must exist.
    fn create_dir(&self, path: &str) -> Result<()>;
    /// Create a new file for writing, failing if it already exists.
    fn create_new(&self, path: &str) -> Result<Box<dyn Write + '_>>;
}

impl RemoteFs for Sftp {
    fn metadata(&self, path: &str) -> Result<Option<RemoteKind>> {
        match self.stat(Path::new(path)) {
            Ok(stat) if stat.is_dir() => Ok(Some(RemoteKind::Directory)),
            Ok(stat) if stat.is_file() => Ok(Some(RemoteKind::File)),
            Ok(_) => Ok(Some(RemoteKind::Other)),
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) => Ok(None),
            Err(e) => Err(e).or_raise(|| ErrorKind::Remote { operation: "stat", path: path.to_string() }),
        }
    }

    fn create_dir(&self, path: &str) -> Result<()> {
        match self.mkdir(Path::new(path), DIRECTORY_MODE) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_PERMISSION_DENIED)) => {
                exn::bail!(ErrorKind::PermissionDenied(path.into()))
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::Remote { operation: "mkdir", path: path.to_string() }),
        }
    }

    fn create_new(&self, path: &str) -> Result<Box<dyn Write + '_>> {
        let flags = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCLUSIVE;
        match self.open_mode(Path::new(path), flags, FILE_MODE, OpenType::File) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_FILE_ALREADY_EXISTS)) => {
                exn::bail!(ErrorKind::AlreadyExists(path.into()))
            },
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_PERMISSION_DENIED)) => {
                exn::bail!(ErrorKind::PermissionDenied(path.into()))
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::Remote { operation: "create", path: path.to_string() }),
        }
    }
}

/// Create `dir` and any missing ancestors, one component at a time.
fn create_dir_all(fs: &dyn RemoteFs, dir: &str) -> Result<()> {
    if dir == "." || dir == "/" {
        return Ok(());
    }
    match fs.metadata(dir)? {
        Some(RemoteKind::Directory) => return Ok(()),
        Some(_) => exn::bail!(ErrorKind::NotADirectory(dir.into())),
        None => {},
    }
    let mut current = if dir.starts_with('/') { String::from("/") } else { String::new() };
    for segment in dir.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() && current != "/" {
            current.push('/');
        }
        current.push_str(segment);
        match fs.metadata(&current)? {
            Some(RemoteKind::Directory) => {},
            Some(_) => exn::bail!(ErrorKind::NotADirectory(current.into())),
            None => {
                tracing::trace!(path = %current, "Creating remote directory");
                fs.create_dir(&current)?;
            },
        }
    }
    Ok(())
}

/// Stops yielding data once `cancel` fires.
struct CancellableReader<'a, R: Read + ?Sized> {
    inner: &'a mut R,
    cancel: &'a CancellationToken,
}
impl<R: Read + ?Sized> Read for CancellableReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // Not `Interrupted`: `io::copy` retries those.
        if self.cancel.is_cancelled() {
            return Err(std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "upload cancelled"));
        }
        self.inner.read(buf)
    }
}

/// Copy `reader` to `file_name` under the remote `base` directory.
///
/// The remote directory tree is created as needed; an existing destination
/// file is never touched. Once `cancel` fires the copy stops at the next
/// chunk, leaving whatever was already written.
pub(crate) fn upload_to(
    fs: &dyn RemoteFs,
    reader: &mut dyn Read,
    base: &str,
    file_name: &str,
    cancel: &CancellationToken,
) -> Result<u64> {
    let relative = validate_path(file_name)?;
    let destination = remote_join(&normalize_remote(base), &relative);
    create_dir_all(fs, remote_parent(&destination))?;
    if fs.metadata(&destination)?.is_some() {
        exn::bail!(ErrorKind::AlreadyExists(destination.into()));
    }
    let mut file = fs.create_new(&destination)?;
    let mut reader = CancellableReader { inner: reader, cancel };
    let written = match std::io::copy(&mut reader, &mut file) {
        Ok(written) => written,
        Err(_) if cancel.is_cancelled() => {
            tracing::debug!(path = %destination, "NAS upload cancelled mid-copy");
            exn::bail!(ErrorKind::Cancelled(destination));
        },
        Err(e) => return Err(e).or_raise(|| ErrorKind::Remote { operation: "write", path: destination.clone() }),
    };
    file.flush().or_raise(|| ErrorKind::Remote { operation: "flush", path: destination.clone() })?;
    tracing::debug!(path = %destination, bytes = written, "Stored upload on NAS");
    Ok(written)
}

/// An authenticated SSH session with its SFTP channel.
///
/// Dropping it closes the channel first and then disconnects the session,
/// on every exit path.
struct NasSession {
    sftp: Option<Sftp>,
    session: Session,
}
impl NasSession {
    fn connect(config: &StorageConfig) -> Result<Self> {
        let host = config.required("host", &config.host)?;
        let username = config.required("username", &config.username)?;
        let password = config.password.as_deref().unwrap_or_default();
        let port = config.port.unwrap_or(DEFAULT_SSH_PORT);
        let address = format!("{host}:{port}");

        let timeout = config.timeout_secs.filter(|secs| *secs > 0).map(Duration::from_secs);
        let tcp = connect_tcp(host, port, timeout).or_raise(|| ErrorKind::Network(address.clone()))?;
        let mut session =
            Session::new().or_raise(|| ErrorKind::BackendError("could not allocate SSH session".to_string()))?;
        session.set_tcp_stream(tcp);
        if let Some(secs) = config.timeout_secs {
            session.set_timeout(u32::try_from(secs.saturating_mul(1000)).unwrap_or(u32::MAX));
        }
        session.handshake().or_raise(|| ErrorKind::Network(address.clone()))?;
        verify_host_key(&session, host, port, &config.host_key_policy)?;
        session
            .userauth_password(username, password)
            .or_raise(|| ErrorKind::Authentication(format!("{username}@{address}")))?;
        if !session.authenticated() {
            exn::bail!(ErrorKind::Authentication(format!("{username}@{address}")));
        }
        let sftp = session.sftp().or_raise(|| ErrorKind::Remote { operation: "open sftp", path: address })?;
        Ok(Self { sftp: Some(sftp), session })
    }

    fn sftp(&self) -> Result<&Sftp> {
        self.sftp.as_ref().ok_or_raise(|| ErrorKind::BackendError("SFTP channel already closed".to_string()))
    }
}
impl Drop for NasSession {
    fn drop(&mut self) {
        drop(self.sftp.take());
        if let Err(e) = self.session.disconnect(None, "upload finished", None) {
            tracing::trace!(error = %e, "Failed to disconnect SSH session cleanly");
        }
    }
}

/// Open the TCP connection, bounded by `timeout` when one is configured.
fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> std::io::Result<TcpStream> {
    let Some(timeout) = timeout else {
        return TcpStream::connect((host, port));
    };
    let mut last_error = None;
    for address in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, format!("{host} resolved to no addresses"))
    }))
}

fn default_known_hosts() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

fn verify_host_key(session: &Session, host: &str, port: u16, policy: &HostKeyPolicy) -> Result<()> {
    let known_hosts = match policy {
        HostKeyPolicy::AcceptAny => {
            tracing::warn!(host, port, "Host key verification is disabled for this NAS");
            return Ok(());
        },
        HostKeyPolicy::Strict { known_hosts: Some(path) } => path.clone(),
        HostKeyPolicy::Strict { known_hosts: None } => {
            default_known_hosts().ok_or_raise(|| ErrorKind::HostKey(format!("{host} (no home directory)")))?
        },
    };
    let (key, _) = session.host_key().ok_or_raise(|| ErrorKind::HostKey(format!("{host} (no key presented)")))?;
    let mut hosts = session.known_hosts().or_raise(|| ErrorKind::HostKey(host.to_string()))?;
    hosts
        .read_file(&known_hosts, KnownHostFileKind::OpenSSH)
        .or_raise(|| ErrorKind::HostKey(format!("{host} (unreadable {})", known_hosts.display())))?;
    match hosts.check_port(host, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::Mismatch => exn::bail!(ErrorKind::HostKey(format!("{host}:{port} (key mismatch)"))),
        CheckResult::NotFound => exn::bail!(ErrorKind::HostKey(format!("{host}:{port} (unknown host)"))),
        CheckResult::Failure => exn::bail!(ErrorKind::HostKey(format!("{host}:{port}"))),
    }
}

/// NAS storage backend (SSH password auth + SFTP).
///
/// Stateless: a new session is established for every upload and torn down
/// afterwards. Nothing is retried.
#[derive(Clone, Copy, Debug, Default)]
pub struct NasBackend;

#[async_trait]
impl StorageBackend for NasBackend {
    fn kind(&self) -> StorageType {
        StorageType::Nas
    }

    #[instrument(skip(self, stream, config), fields(storage = %config.name))]
    async fn upload(&self, stream: UploadStream, file_name: &str, config: &StorageConfig) -> Result<u64> {
        // Fail fast on bad input before opening a connection.
        validate_path(file_name)?;
        let base = config.required("base_path", &config.base_path)?.to_string();
        let config = config.clone();
        let file_name = file_name.to_string();
        // Must be created while still inside the runtime context.
        let mut reader = SyncIoBridge::new(stream);
        run_cancellable(move |cancel| {
            let session = NasSession::connect(&config)?;
            upload_to(session.sftp()?, &mut reader, &base, &file_name, &cancel)
        })
        .await
    }
}

/// Run blocking work on the blocking pool, cancelling its token if this
/// future is dropped before the work finishes.
async fn run_cancellable<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Result<T> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    tokio::task::spawn_blocking(move || work(cancel))
        .await
        .or_raise(|| ErrorKind::BackendError("NAS upload task failed".to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    enum Node {
        Dir,
        File(Vec<u8>),
    }

    /// In-memory stand-in for an SFTP server.
    #[derive(Default)]
    struct MemoryFs {
        nodes: RefCell<BTreeMap<String, Node>>,
        created_dirs: RefCell<Vec<String>>,
    }
    impl MemoryFs {
        fn with_dir(self, path: &str) -> Self {
            self.nodes.borrow_mut().insert(path.to_string(), Node::Dir);
            self
        }

        fn with_file(self, path: &str, data: &[u8]) -> Self {
            self.nodes.borrow_mut().insert(path.to_string(), Node::File(data.to_vec()));
            self
        }

        fn contents(&self, path: &str) -> Option<Vec<u8>> {
            match self.nodes.borrow().get(path) {
                Some(Node::File(data)) => Some(data.clone()),
                _ => None,
            }
        }
    }

    struct MemoryFile<'a> {
        fs: &'a MemoryFs,
        path: String,
    }
    impl Write for MemoryFile<'_> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match self.fs.nodes.borrow_mut().get_mut(&self.path) {
                Some(Node::File(data)) => data.extend_from_slice(buf),
                _ => return Err(std::io::Error::other("file vanished")),
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl RemoteFs for MemoryFs {
        fn metadata(&self, path: &str) -> Result<Option<RemoteKind>> {
            Ok(self.nodes.borrow().get(path).map(|node| match node {
                Node::Dir => RemoteKind::Directory,
                Node::File(_) => RemoteKind::File,
            }))
        }

        fn create_dir(&self, path: &str) -> Result<()> {
            let parent = remote_parent(path);
            if parent != "/" && parent != "." && !matches!(self.nodes.borrow().get(parent), Some(Node::Dir)) {
                exn::bail!(ErrorKind::Remote { operation: "mkdir", path: path.to_string() });
            }
            self.nodes.borrow_mut().insert(path.to_string(), Node::Dir);
            self.created_dirs.borrow_mut().push(path.to_string());
            Ok(())
        }

        fn create_new(&self, path: &str) -> Result<Box<dyn Write + '_>> {
            let mut nodes = self.nodes.borrow_mut();
            if nodes.contains_key(path) {
                exn::bail!(ErrorKind::AlreadyExists(path.into()));
            }
            nodes.insert(path.to_string(), Node::File(Vec::new()));
            Ok(Box::new(MemoryFile { fs: self, path: path.to_string() }))
        }
    }

    #[test]
    fn test_upload_creates_missing_directories() {
        let fs = MemoryFs::default().with_dir("/volume1");
        let mut reader = Cursor::new(b"jpeg bytes".to_vec());
        let written = upload_to(&fs, &mut reader, "/volume1/photos/2024", "a.jpg", &CancellationToken::new()).unwrap();
        assert_eq!(written, 10);
        assert_eq!(fs.contents("/volume1/photos/2024/a.jpg").unwrap(), b"jpeg bytes");
        assert_eq!(*fs.created_dirs.borrow(), vec!["/volume1/photos", "/volume1/photos/2024"]);
    }

    #[test]
    fn test_upload_reuses_existing_directory() {
        let fs = MemoryFs::default().with_dir("/volume1").with_dir("/volume1/photos");
        let mut reader = Cursor::new(b"data".to_vec());
        upload_to(&fs, &mut reader, "/volume1/photos", "a.jpg", &CancellationToken::new()).unwrap();
        assert!(fs.created_dirs.borrow().is_empty());
    }

    #[test]
    fn test_upload_rejects_existing_file() {
        let fs = MemoryFs::default()
            .with_dir("/volume1")
            .with_dir("/volume1/photos")
            .with_file("/volume1/photos/a.jpg", b"original");
        let mut reader = Cursor::new(b"replacement".to_vec());
        let err = upload_to(&fs, &mut reader, "/volume1/photos", "a.jpg", &CancellationToken::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(p) if p == Path::new("/volume1/photos/a.jpg")));
        assert_eq!(fs.contents("/volume1/photos/a.jpg").unwrap(), b"original");
    }

    #[test]
    fn test_upload_rejects_file_in_place_of_directory() {
        let fs = MemoryFs::default().with_dir("/volume1").with_file("/volume1/photos", b"oops");
        let mut reader = Cursor::new(b"data".to_vec());
        let err = upload_to(&fs, &mut reader, "/volume1/photos/2024", "a.jpg", &CancellationToken::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(p) if p == Path::new("/volume1/photos")));
    }

    #[test]
    fn test_upload_normalizes_windows_style_base_path() {
        let fs = MemoryFs::default();
        let mut reader = Cursor::new(b"data".to_vec());
        upload_to(&fs, &mut reader, r"\volume1\photos\", "2024/a.jpg", &CancellationToken::new()).unwrap();
        assert_eq!(fs.contents("/volume1/photos/2024/a.jpg").unwrap(), b"data");
    }

    #[test]
    fn test_upload_rejects_traversal() {
        let fs = MemoryFs::default();
        let mut reader = Cursor::new(b"data".to_vec());
        let cancel = CancellationToken::new();
        let err = upload_to(&fs, &mut reader, "/volume1/photos", "../../etc/passwd", &cancel).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert!(fs.nodes.borrow().is_empty());
    }

    /// Hands out one chunk per read and cancels after the first.
    struct CancelAfterFirstChunk<'a> {
        chunks: Vec<&'static [u8]>,
        cancel: &'a CancellationToken,
    }
    impl Read for CancelAfterFirstChunk<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(chunk);
            self.cancel.cancel();
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_upload_stops_when_cancelled_mid_copy() {
        let fs = MemoryFs::default().with_dir("/volume1");
        let cancel = CancellationToken::new();
        let mut reader = CancelAfterFirstChunk {
            chunks: vec![b"first", b"second", b"third"],
            cancel: &cancel,
        };
        let err = upload_to(&fs, &mut reader, "/volume1", "a.mp4", &cancel).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled(p) if p == "/volume1/a.mp4"));
        assert_eq!(reader.chunks.len(), 2);
        assert_eq!(fs.contents("/volume1/a.mp4").unwrap(), b"first");
    }

    #[test]
    fn test_upload_cancelled_before_start_writes_nothing() {
        let fs = MemoryFs::default().with_dir("/volume1");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut reader = Cursor::new(b"data".to_vec());
        let err = upload_to(&fs, &mut reader, "/volume1", "a.jpg", &cancel).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled(_)));
        assert_eq!(fs.contents("/volume1/a.jpg").unwrap(), b"");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_the_future_cancels_blocking_work() {
        let (observed, cancelled) = std::sync::mpsc::channel();
        let work = run_cancellable(move |cancel| -> Result<()> {
            while !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            let _ = observed.send(());
            exn::bail!(ErrorKind::Cancelled("slow upload".to_string()))
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), work).await.is_err());
        let seen = tokio::task::spawn_blocking(move || cancelled.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(seen.is_ok());
    }

    #[tokio::test]
    async fn test_run_cancellable_returns_result() {
        let value = run_cancellable(|cancel| Ok(cancel.is_cancelled())).await.unwrap();
        assert!(!value);
    }

    #[tokio::test]
    async fn test_upload_requires_host() {
        let config = StorageConfig::new("nas", "nas").with_base_path("/volume1/photos");
        let data: &'static [u8] = b"data";
        let err = NasBackend.upload(Box::new(data), "a.jpg", &config).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidConfig(_)));
    }

    #[rstest]
    #[case(None)]
    #[case(Some(2))]
    #[tokio::test]
    async fn test_upload_unreachable_host_is_network_error(#[case] timeout_secs: Option<u64>) {
        let mut config = StorageConfig::new("nas", "nas").with_base_path("/volume1/photos");
        config.timeout_secs = timeout_secs;
        config.host = Some("127.0.0.1".to_string());
        // Port 1 (tcpmux) is closed on any sane machine.
        config.port = Some(1);
        config.username = Some("admin".to_string());
        let data: &'static [u8] = b"data";
        let err = NasBackend.upload(Box::new(data), "a.jpg", &config).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network(addr) if addr == "127.0.0.1:1"));
    }
}
