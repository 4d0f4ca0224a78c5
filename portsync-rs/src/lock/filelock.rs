/**
 * filelock.rs
 * Advisory file lock keyed by path
 *
 * One lock file per claimed port lives in the shared sync directory;
 * whichever process holds the flock on it owns the port. Locks are
 * advisory: every cooperating process must go through this type.
 */

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// An advisory lock on a single file.
///
/// The lock is held for as long as the backing file handle is open;
/// dropping the handle (or the whole `FileLock`) releases it.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: Option<std::fs::File>,
}

impl FileLock {
    /// Create an unacquired lock for `path`. No file is touched until
    /// `acquire` is called.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Path of the backing lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle currently holds the lock
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Acquire the lock, creating the backing file if needed.
    ///
    /// Non-blocking mode returns `Ok(false)` when another holder has the
    /// lock; any other failure (unreadable directory, fd exhaustion) is a
    /// real error. Acquiring an already-held lock is a no-op returning
    /// `Ok(true)`.
    #[cfg(unix)]
    pub fn acquire(&mut self, blocking: bool) -> io::Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;

        let op = if blocking {
            libc::LOCK_EX
        } else {
            libc::LOCK_EX | libc::LOCK_NB
        };

        // flock is advisory and tied to the open file description, so two
        // handles in the same process contend just like two processes do.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(false);
            }
            return Err(err);
        }

        self.file = Some(file);
        Ok(true)
    }

    /// Fallback for targets without flock: the file is created but claims
    /// are only coordinated within this process.
    #[cfg(not(unix))]
    pub fn acquire(&mut self, _blocking: bool) -> io::Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)?;
        self.file = Some(file);
        Ok(true)
    }

    /// Release the lock. No-op if not held.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            #[cfg(unix)]
            unsafe {
                libc::flock(file.as_raw_fd(), libc::LOCK_UN);
            }
            drop(file);
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}
