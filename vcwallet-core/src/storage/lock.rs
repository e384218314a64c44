//! Cross-process lock serializing on-disk mutations of one wallet.
//!
//! The lock is an advisory `flock` (Unix) or `LockFileEx` (Windows) on
//! `<root>/vcwallet/lock`. Threads of one process are serialized by the
//! store's mutation mutex before they get here; this lock keeps a second
//! process, such as a concurrent CLI invocation, from interleaving with an
//! initialize, unlock, reset, or record write.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::error::{StorageResult, StoreError};

/// Handle on the wallet's lock file.
#[derive(Debug)]
pub struct WalletLock {
    path: PathBuf,
    file: File,
}

/// Proof that the wallet lock is held. Released on drop.
#[derive(Debug)]
pub struct WalletLockGuard<'a> {
    lock: &'a WalletLock,
}

impl WalletLock {
    /// Opens the lock file at `path`, creating it and its parent directories
    /// if needed. Opening never takes the lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let open = || -> io::Result<File> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
        };
        let file = open().map_err(|err| lock_error(path, "open", &err))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until this handle holds the lock exclusively.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] if the OS refuses the lock.
    pub fn acquire(&self) -> StorageResult<WalletLockGuard<'_>> {
        sys::lock(&self.file).map_err(|err| lock_error(&self.path, "acquire", &err))?;
        Ok(WalletLockGuard { lock: self })
    }
}

impl Drop for WalletLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = sys::unlock(&self.lock.file) {
            log::warn!("could not release {}: {err}", self.lock.path.display());
        }
    }
}

fn lock_error(path: &Path, action: &str, err: &io::Error) -> StoreError {
    StoreError::Lock(format!("{action} {}: {err}", path.display()))
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::raw::c_int;
    use std::os::unix::io::AsRawFd;

    const LOCK_EX: c_int = 2;
    const LOCK_UN: c_int = 8;

    extern "C" {
        fn flock(fd: c_int, operation: c_int) -> c_int;
    }

    /// `flock` with `EINTR` retried.
    fn flock_retrying(file: &File, operation: c_int) -> io::Result<()> {
        loop {
            // SAFETY: the descriptor stays open for the lifetime of `file`.
            if unsafe { flock(file.as_raw_fd(), operation) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    pub fn lock(file: &File) -> io::Result<()> {
        flock_retrying(file, LOCK_EX)
    }

    pub fn unlock(file: &File) -> io::Result<()> {
        flock_retrying(file, LOCK_UN)
    }
}

#[cfg(windows)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::windows::io::AsRawHandle;

    type Handle = *mut std::ffi::c_void;

    /// `OVERLAPPED`; only the OS reads it.
    #[repr(C)]
    #[derive(Default)]
    #[allow(dead_code)]
    struct Overlapped {
        internal: usize,
        internal_high: usize,
        offset: u32,
        offset_high: u32,
        h_event: Option<std::ptr::NonNull<std::ffi::c_void>>,
    }

    const LOCKFILE_EXCLUSIVE_LOCK: u32 = 0x2;

    extern "system" {
        fn LockFileEx(
            h_file: Handle,
            flags: u32,
            reserved: u32,
            bytes_to_lock_low: u32,
            bytes_to_lock_high: u32,
            overlapped: *mut Overlapped,
        ) -> i32;
        fn UnlockFileEx(
            h_file: Handle,
            reserved: u32,
            bytes_to_unlock_low: u32,
            bytes_to_unlock_high: u32,
            overlapped: *mut Overlapped,
        ) -> i32;
    }

    fn check(result: i32) -> io::Result<()> {
        if result == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub fn lock(file: &File) -> io::Result<()> {
        let mut overlapped = Overlapped::default();
        // SAFETY: the handle is open for the lifetime of `file`, and a zeroed
        // OVERLAPPED is valid for a synchronous handle. Locks the first byte.
        check(unsafe {
            LockFileEx(
                file.as_raw_handle().cast(),
                LOCKFILE_EXCLUSIVE_LOCK,
                0,
                1,
                0,
                &mut overlapped,
            )
        })
    }

    pub fn unlock(file: &File) -> io::Result<()> {
        let mut overlapped = Overlapped::default();
        // SAFETY: as in `lock`.
        check(unsafe { UnlockFileEx(file.as_raw_handle().cast(), 0, 1, 0, &mut overlapped) })
    }
}
