//! Errno-style operation errors.
//!
//! Every failure carries the errno code, the syscall name, and the path(s)
//! involved, so callers can build platform-shaped error objects without
//! re-deriving context.

use std::fmt;
use std::io;

#[derive(Debug, Clone)]
pub struct FsError {
    pub code: &'static str,
    pub syscall: &'static str,
    pub path: Option<String>,
    pub dest: Option<String>,
    pub detail: String,
}

impl FsError {
    pub fn io(syscall: &'static str, path: &str, err: io::Error) -> Self {
        Self {
            code: code_for_kind(err.kind(), err.raw_os_error()),
            syscall,
            path: Some(path.to_string()),
            dest: None,
            detail: err.to_string(),
        }
    }

    pub fn io_pair(syscall: &'static str, from: &str, to: &str, err: io::Error) -> Self {
        Self {
            dest: Some(to.to_string()),
            ..Self::io(syscall, from, err)
        }
    }

    pub fn invalid(syscall: &'static str, path: &str, detail: impl Into<String>) -> Self {
        Self {
            code: "EINVAL",
            syscall,
            path: Some(path.to_string()),
            dest: None,
            detail: detail.into(),
        }
    }

    pub fn unsupported(syscall: &'static str, path: &str, detail: impl Into<String>) -> Self {
        Self {
            code: "ENOSYS",
            syscall,
            path: Some(path.to_string()),
            dest: None,
            detail: detail.into(),
        }
    }

    pub fn internal(syscall: &'static str, detail: impl Into<String>) -> Self {
        Self {
            code: "EIO",
            syscall,
            path: None,
            dest: None,
            detail: detail.into(),
        }
    }

    pub fn bad_descriptor(syscall: &'static str, fd: u64) -> Self {
        Self {
            code: "EBADF",
            syscall,
            path: None,
            dest: None,
            detail: format!("bad file descriptor: {fd}"),
        }
    }

    pub fn access_denied(path: &str, detail: impl Into<String>) -> Self {
        Self {
            code: "EACCES",
            syscall: "access",
            path: Some(path.to_string()),
            dest: None,
            detail: detail.into(),
        }
    }

    pub fn not_found(&self) -> bool {
        self.code == "ENOENT"
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, &self.dest) {
            (Some(path), Some(dest)) => write!(
                f,
                "{}: {} '{}' -> '{}': {}",
                self.code, self.syscall, path, dest, self.detail
            ),
            (Some(path), None) => write!(
                f,
                "{}: {} '{}': {}",
                self.code, self.syscall, path, self.detail
            ),
            _ => write!(f, "{}: {}: {}", self.code, self.syscall, self.detail),
        }
    }
}

impl std::error::Error for FsError {}

/// Map an I/O error to an errno code, preferring the raw OS errno when the
/// platform reported one.
fn code_for_kind(kind: io::ErrorKind, raw: Option<i32>) -> &'static str {
    #[cfg(unix)]
    if let Some(errno) = raw {
        match errno {
            libc::ENOENT => return "ENOENT",
            libc::EACCES => return "EACCES",
            libc::EPERM => return "EPERM",
            libc::EEXIST => return "EEXIST",
            libc::EISDIR => return "EISDIR",
            libc::ENOTDIR => return "ENOTDIR",
            libc::ENOTEMPTY => return "ENOTEMPTY",
            libc::EINVAL => return "EINVAL",
            libc::EBADF => return "EBADF",
            libc::EMFILE => return "EMFILE",
            libc::ENOSPC => return "ENOSPC",
            libc::EXDEV => return "EXDEV",
            libc::ELOOP => return "ELOOP",
            libc::ENAMETOOLONG => return "ENAMETOOLONG",
            _ => {}
        }
    }
    #[cfg(not(unix))]
    let _ = raw;

    match kind {
        io::ErrorKind::NotFound => "ENOENT",
        io::ErrorKind::PermissionDenied => "EACCES",
        io::ErrorKind::AlreadyExists => "EEXIST",
        io::ErrorKind::IsADirectory => "EISDIR",
        io::ErrorKind::NotADirectory => "ENOTDIR",
        io::ErrorKind::DirectoryNotEmpty => "ENOTEMPTY",
        io::ErrorKind::InvalidInput => "EINVAL",
        io::ErrorKind::StorageFull => "ENOSPC",
        _ => "EIO",
    }
}
