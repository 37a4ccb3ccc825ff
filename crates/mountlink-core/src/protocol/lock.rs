//! Session locking
//!
//! Cross-process exclusion for one physical link. Every driver instance
//! that talks to the same device opens the same lock file, so at most one
//! command is in flight on the link at any instant, across threads and
//! processes alike.
//!
//! The file carries an OS file lock (`flock` on Unix, `LockFileEx` on
//! Windows), which the OS drops when the holder dies. The holder writes its
//! pid into the file and truncates it on clean release, so a non-empty file
//! found right after acquisition means the previous holder terminated
//! mid-session.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::fs_std::FileExt;
use tracing::{debug, warn};

use super::ProtocolError;

/// Interval between acquisition attempts while another session is active
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Named lock scoped to a device identity
#[derive(Debug, Clone)]
pub struct SessionLock {
    device_id: String,
    path: PathBuf,
}

impl SessionLock {
    /// Create a lock handle; nothing touches the filesystem until [`acquire`](Self::acquire)
    pub fn new(device_id: &str, lock_dir: &Path) -> Self {
        let file_name = format!("{}.lock", sanitize_device_id(device_id));
        Self {
            device_id: device_id.to_string(),
            path: lock_dir.join(file_name),
        }
    }

    /// Device identity this lock is scoped to
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Path of the backing lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait up to `timeout` for sole access to the link
    pub fn acquire(&self, timeout: Duration) -> Result<SessionGuard, ProtocolError> {
        if let Some(parent) = self.path.parent() {
            ensure_lock_dir(parent)
                .map_err(|e| ProtocolError::LockError(format!("{}: {}", parent.display(), e)))?;
        }

        let started = Instant::now();
        loop {
            match try_acquire(&self.path) {
                Ok(Some(file)) => return SessionGuard::establish(file, self.path.clone()),
                Ok(None) => {
                    if started.elapsed() >= timeout {
                        debug!(
                            device = %self.device_id,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "session acquisition timed out"
                        );
                        return Err(ProtocolError::ExclusionTimeout {
                            device: self.device_id.clone(),
                            waited_ms: timeout.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(ProtocolError::LockError(format!(
                        "{}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }
        }
    }
}

/// Sole ownership of the link; released when dropped
pub struct SessionGuard {
    file: Option<File>,
    path: PathBuf,
    abandoned_by: Option<String>,
}

impl SessionGuard {
    fn establish(mut file: File, path: PathBuf) -> Result<Self, ProtocolError> {
        let lock_err =
            |e: io::Error| ProtocolError::LockError(format!("{}: {}", path.display(), e));

        let mut previous = String::new();
        file.read_to_string(&mut previous).map_err(lock_err)?;
        let previous = previous.trim();
        let abandoned_by = if previous.is_empty() {
            None
        } else {
            warn!(
                lock = %path.display(),
                previous_holder = previous,
                "previous session holder terminated mid-session, lock recovered"
            );
            Some(previous.to_string())
        };

        file.set_len(0).map_err(lock_err)?;
        file.seek(SeekFrom::Start(0)).map_err(lock_err)?;
        write!(file, "{}", std::process::id()).map_err(lock_err)?;

        Ok(Self {
            file: Some(file),
            path,
            abandoned_by,
        })
    }

    /// Check if the lock was taken over from a holder that died mid-session
    pub fn recovered_abandoned(&self) -> bool {
        self.abandoned_by.is_some()
    }

    /// Pid stamp left by the abandoned holder, if any
    pub fn abandoned_by(&self) -> Option<&str> {
        self.abandoned_by.as_deref()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = release(file) {
                warn!(
                    lock = %self.path.display(),
                    error = %e,
                    "failed to release session lock cleanly"
                );
            }
        }
    }
}

/// Keep lock file names portable
fn sanitize_device_id(device_id: &str) -> String {
    let cleaned: String = device_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "device".to_string()
    } else {
        cleaned
    }
}

/// Open the lock file and try a non-blocking exclusive lock
///
/// Each open is its own file description, so threads of one process contend
/// exactly like separate processes do.
fn try_acquire(path: &Path) -> io::Result<Option<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            share_with_all_users(&file, path);
            Ok(Some(file))
        }
        Err(e) if is_contended(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_contended(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    ) || err.raw_os_error() == fs4::lock_contended_error().raw_os_error()
}

/// Clear the pid stamp, then drop the lock
fn release(file: File) -> io::Result<()> {
    let truncated = file.set_len(0);
    let unlocked = FileExt::unlock(&file);
    truncated?;
    unlocked
}

/// Create the lock directory; a directory created here is writable by every user
fn ensure_lock_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Sticky like /tmp: anyone may add lock files, only owners remove them
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o1777))?;
    }
    Ok(())
}

/// Let driver instances run by other accounts open the same lock file
#[cfg(unix)]
fn share_with_all_users(file: &File, path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let shared = match file.metadata() {
        Ok(meta) => meta.permissions().mode() & 0o666 == 0o666,
        Err(_) => false,
    };
    if shared {
        return;
    }
    // Only the file's owner can widen it
    if let Err(e) = file.set_permissions(std::fs::Permissions::from_mode(0o666)) {
        debug!(lock = %path.display(), error = %e, "lock file left with owner permissions");
    }
}

#[cfg(not(unix))]
fn share_with_all_users(_file: &File, _path: &Path) {}
