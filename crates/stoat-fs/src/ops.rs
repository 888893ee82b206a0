//! Normalized filesystem operation requests and synchronous execution.
//!
//! Every entry point, sync or async, is expressed as an [`FsOp`] value so
//! one executor owns the I/O and error mapping. The async executor in
//! [`crate::async_ops`] reuses the same request type.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::FsError;
use crate::handles;
use crate::meta::{Dirent, FileStat};
use crate::options::{CopyOptions, OpenFlags, RmOptions};

pub const F_OK: u32 = 0;
pub const X_OK: u32 = 1;
pub const W_OK: u32 = 2;
pub const R_OK: u32 = 4;

static MKDTEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A filesystem operation request.
#[derive(Debug, Clone)]
pub enum FsOp {
    ReadFile { path: String },
    WriteFile { path: String, bytes: Vec<u8>, append: bool, mode: Option<u32> },
    Stat { path: String, follow: bool },
    Readdir { path: String, with_file_types: bool },
    Opendir { path: String },
    ReaddirHandle { fd: u64 },
    ClosedirHandle { fd: u64 },
    Mkdir { path: String, recursive: bool, mode: u32 },
    Mkdtemp { prefix: String },
    Rm { path: String, options: RmOptions },
    Rmdir { path: String, recursive: bool },
    Unlink { path: String },
    CopyFile { src: String, dst: String, exclusive: bool },
    Cp { src: String, dst: String, options: CopyOptions },
    Rename { from: String, to: String },
    Open { path: String, flags: OpenFlags, mode: u32 },
    Close { fd: u64 },
    Read { fd: u64, length: usize, position: Option<u64> },
    Write { fd: u64, bytes: Vec<u8>, position: Option<u64> },
    Readv { fd: u64, lengths: Vec<usize>, position: Option<u64> },
    Writev { fd: u64, chunks: Vec<Vec<u8>>, position: Option<u64> },
    ReadFileFd { fd: u64 },
    WriteFileFd { fd: u64, bytes: Vec<u8> },
    Fstat { fd: u64 },
    Ftruncate { fd: u64, len: u64 },
    Fsync { fd: u64 },
    Fdatasync { fd: u64 },
    Fchmod { fd: u64, mode: u32 },
    Fchown { fd: u64, uid: u32, gid: u32 },
    Futimes { fd: u64, atime_ms: f64, mtime_ms: f64 },
    Truncate { path: String, len: u64 },
    Realpath { path: String },
    Access { path: String, mode: u32 },
    Exists { path: String },
    Chmod { path: String, mode: u32 },
    Chown { path: String, uid: u32, gid: u32, follow: bool },
    Utimes { path: String, atime_ms: f64, mtime_ms: f64, follow: bool },
    Link { existing: String, link: String },
    Symlink { target: String, link: String },
    Readlink { path: String },
}

impl FsOp {
    /// Syscall name used in error context and logging.
    pub fn syscall(&self) -> &'static str {
        match self {
            FsOp::ReadFile { .. } | FsOp::ReadFileFd { .. } => "readFile",
            FsOp::WriteFile { append: false, .. } | FsOp::WriteFileFd { .. } => "writeFile",
            FsOp::WriteFile { append: true, .. } => "appendFile",
            FsOp::Stat { follow: true, .. } => "stat",
            FsOp::Stat { follow: false, .. } => "lstat",
            FsOp::Readdir { .. } | FsOp::ReaddirHandle { .. } => "readdir",
            FsOp::Opendir { .. } => "opendir",
            FsOp::ClosedirHandle { .. } => "closedir",
            FsOp::Mkdir { .. } => "mkdir",
            FsOp::Mkdtemp { .. } => "mkdtemp",
            FsOp::Rm { .. } => "rm",
            FsOp::Rmdir { .. } => "rmdir",
            FsOp::Unlink { .. } => "unlink",
            FsOp::CopyFile { .. } => "copyFile",
            FsOp::Cp { .. } => "cp",
            FsOp::Rename { .. } => "rename",
            FsOp::Open { .. } => "open",
            FsOp::Close { .. } => "close",
            FsOp::Read { .. } | FsOp::Readv { .. } => "read",
            FsOp::Write { .. } | FsOp::Writev { .. } => "write",
            FsOp::Fstat { .. } => "fstat",
            FsOp::Ftruncate { .. } => "ftruncate",
            FsOp::Fsync { .. } => "fsync",
            FsOp::Fdatasync { .. } => "fdatasync",
            FsOp::Fchmod { .. } => "fchmod",
            FsOp::Fchown { .. } => "fchown",
            FsOp::Futimes { .. } => "futimes",
            FsOp::Truncate { .. } => "truncate",
            FsOp::Realpath { .. } => "realpath",
            FsOp::Access { .. } => "access",
            FsOp::Exists { .. } => "exists",
            FsOp::Chmod { .. } => "chmod",
            FsOp::Chown { follow: true, .. } => "chown",
            FsOp::Chown { follow: false, .. } => "lchown",
            FsOp::Utimes { follow: true, .. } => "utimes",
            FsOp::Utimes { follow: false, .. } => "lutimes",
            FsOp::Link { .. } => "link",
            FsOp::Symlink { .. } => "symlink",
            FsOp::Readlink { .. } => "readlink",
        }
    }
}

/// A completed operation's payload, free of host value types.
#[derive(Debug, Clone)]
pub enum FsOutput {
    Unit,
    Bool(bool),
    Written(usize),
    Bytes(Vec<u8>),
    Chunks(Vec<Vec<u8>>),
    Path(String),
    Names(Vec<String>),
    Entries(Vec<Dirent>),
    NextEntry(Option<Dirent>),
    Stat(FileStat),
    FileFd(u64),
    DirFd { fd: u64, path: String },
}

pub(crate) fn file_time(ms: f64) -> filetime::FileTime {
    let secs = (ms / 1000.0).floor();
    let nanos = ((ms - secs * 1000.0) * 1_000_000.0) as u32;
    filetime::FileTime::from_unix_time(secs as i64, nanos)
}

fn mkdtemp_candidate(prefix: &str) -> String {
    let seq = MKDTEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    format!("{prefix}{:06x}{:x}", nanos & 0xff_ffff, seq)
}

pub(crate) fn make_temp_dir(prefix: &str) -> Result<String, FsError> {
    for _ in 0..100 {
        let candidate = mkdtemp_candidate(prefix);
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(FsError::io("mkdtemp", &candidate, e)),
        }
    }
    Err(FsError::invalid(
        "mkdtemp",
        prefix,
        "exhausted unique suffix attempts",
    ))
}

fn retryable(code: &str) -> bool {
    matches!(code, "EBUSY" | "EMFILE" | "ENFILE" | "ENOTEMPTY" | "EPERM")
}

fn remove_once(path: &str, options: RmOptions) -> Result<(), FsError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_dir() => {
            if options.recursive {
                std::fs::remove_dir_all(path).map_err(|e| FsError::io("rm", path, e))
            } else {
                std::fs::remove_dir(path).map_err(|e| FsError::io("rm", path, e))
            }
        }
        Ok(_) => std::fs::remove_file(path).map_err(|e| FsError::io("rm", path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound && options.force => Ok(()),
        Err(e) => Err(FsError::io("rm", path, e)),
    }
}

pub(crate) fn remove_with_retries(path: &str, options: RmOptions) -> Result<(), FsError> {
    let mut attempt = 0;
    loop {
        match remove_once(path, options) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < options.max_retries && retryable(err.code) => {
                attempt += 1;
                tracing::debug!(
                    path,
                    code = err.code,
                    attempt,
                    "retrying removal after transient failure"
                );
                std::thread::sleep(Duration::from_millis(
                    options.retry_delay_ms.saturating_mul(u64::from(attempt)),
                ));
            }
            Err(err) => return Err(err),
        }
    }
}

fn destination_ready(dst: &Path, options: CopyOptions) -> io::Result<bool> {
    match std::fs::symlink_metadata(dst) {
        Ok(meta) => {
            if options.exclusive {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "destination already exists",
                ));
            }
            if !options.force {
                if options.error_on_exist {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "destination already exists",
                    ));
                }
                return Ok(false);
            }
            if meta.file_type().is_dir() && !meta.file_type().is_symlink() {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    "destination is a directory",
                ));
            }
            std::fs::remove_file(dst)?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

fn carry_timestamps(src: &Path, dst: &Path, options: CopyOptions) -> io::Result<()> {
    if !options.preserve_timestamps {
        return Ok(());
    }
    let meta = std::fs::metadata(src)?;
    filetime::set_file_times(
        dst,
        filetime::FileTime::from_last_access_time(&meta),
        filetime::FileTime::from_last_modification_time(&meta),
    )
}

#[cfg(unix)]
fn clone_symlink(target: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn clone_symlink(_target: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlink copy is not supported on this platform",
    ))
}

fn copy_tree(src: &Path, dst: &Path, options: CopyOptions) -> io::Result<()> {
    let src_meta = if options.dereference {
        std::fs::metadata(src)?
    } else {
        std::fs::symlink_metadata(src)?
    };

    if src_meta.file_type().is_symlink() && !options.dereference {
        if !destination_ready(dst, options)? {
            return Ok(());
        }
        let target = std::fs::read_link(src)?;
        return clone_symlink(&target, dst);
    }

    if src_meta.is_dir() {
        if !options.recursive {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "source is a directory; recursive copy not requested",
            ));
        }
        if dst.exists() {
            if !dst.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "destination exists and is not a directory",
                ));
            }
        } else {
            std::fs::create_dir_all(dst)?;
        }
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()), options)?;
        }
        return carry_timestamps(src, dst, options);
    }

    if !destination_ready(dst, options)? {
        return Ok(());
    }
    std::fs::copy(src, dst)?;
    carry_timestamps(src, dst, options)
}

pub(crate) fn copy_tree_entry(src: &str, dst: &str, options: CopyOptions) -> Result<(), FsError> {
    copy_tree(Path::new(src), Path::new(dst), options)
        .map_err(|e| FsError::io_pair("cp", src, dst, e))
}

pub(crate) fn check_access(path: &str, mode: u32) -> Result<(), FsError> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;
        let cpath = CString::new(std::ffi::OsStr::new(path).as_bytes())
            .map_err(|_| FsError::invalid("access", path, "path contains a NUL byte"))?;
        let rc = unsafe { libc::access(cpath.as_ptr(), mode as libc::c_int) };
        if rc == 0 {
            Ok(())
        } else {
            Err(FsError::io("access", path, io::Error::last_os_error()))
        }
    }
    #[cfg(not(unix))]
    {
        let meta = std::fs::metadata(path).map_err(|e| FsError::io("access", path, e))?;
        if (mode & W_OK) != 0 && meta.permissions().readonly() {
            return Err(FsError::access_denied(path, "file is read-only"));
        }
        Ok(())
    }
}

pub(crate) fn write_file_sync(
    path: &str,
    bytes: &[u8],
    append: bool,
    mode: Option<u32>,
) -> Result<(), FsError> {
    let syscall: &'static str = if append { "appendFile" } else { "writeFile" };
    let mut options = std::fs::OpenOptions::new();
    options.create(true).write(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path).map_err(|e| FsError::io(syscall, path, e))?;
    io::Write::write_all(&mut file, bytes).map_err(|e| FsError::io(syscall, path, e))
}

pub(crate) fn open_file(path: &str, flags: OpenFlags, mode: u32) -> Result<std::fs::File, FsError> {
    let mut options = std::fs::OpenOptions::new();
    flags.apply(&mut options);
    #[cfg(unix)]
    if flags.create || flags.create_new {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path).map_err(|e| FsError::io("open", path, e))
}

fn make_dir(path: &str, recursive: bool, mode: u32) -> Result<(), FsError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path).map_err(|e| FsError::io("mkdir", path, e))
}

fn set_mode(path: &str, mode: u32) -> Result<(), FsError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| FsError::io("chmod", path, e))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

fn set_owner(path: &str, uid: u32, gid: u32, follow: bool) -> Result<(), FsError> {
    let syscall: &'static str = if follow { "chown" } else { "lchown" };
    #[cfg(unix)]
    {
        let result = if follow {
            std::os::unix::fs::chown(path, Some(uid), Some(gid))
        } else {
            std::os::unix::fs::lchown(path, Some(uid), Some(gid))
        };
        result.map_err(|e| FsError::io(syscall, path, e))
    }
    #[cfg(not(unix))]
    {
        let _ = (uid, gid);
        Err(FsError::unsupported(
            syscall,
            path,
            "ownership changes are not supported on this platform",
        ))
    }
}

fn set_times(path: &str, atime_ms: f64, mtime_ms: f64, follow: bool) -> Result<(), FsError> {
    let syscall: &'static str = if follow { "utimes" } else { "lutimes" };
    let atime = file_time(atime_ms);
    let mtime = file_time(mtime_ms);
    let result = if follow {
        filetime::set_file_times(path, atime, mtime)
    } else {
        filetime::set_symlink_file_times(path, atime, mtime)
    };
    result.map_err(|e| FsError::io(syscall, path, e))
}

/// Execute an operation on the calling thread.
pub fn execute_sync(op: FsOp) -> Result<FsOutput, FsError> {
    match op {
        FsOp::ReadFile { path } => std::fs::read(&path)
            .map(FsOutput::Bytes)
            .map_err(|e| FsError::io("readFile", &path, e)),
        FsOp::WriteFile {
            path,
            bytes,
            append,
            mode,
        } => write_file_sync(&path, &bytes, append, mode).map(|()| FsOutput::Unit),
        FsOp::Stat { path, follow } => {
            let syscall: &'static str = if follow { "stat" } else { "lstat" };
            let meta = if follow {
                std::fs::metadata(&path)
            } else {
                std::fs::symlink_metadata(&path)
            }
            .map_err(|e| FsError::io(syscall, &path, e))?;
            Ok(FsOutput::Stat(FileStat::from_metadata(&meta)))
        }
        FsOp::Readdir {
            path,
            with_file_types,
        } => {
            let reader = std::fs::read_dir(&path).map_err(|e| FsError::io("readdir", &path, e))?;
            let mut names = Vec::new();
            let mut entries = Vec::new();
            for entry in reader {
                let entry = entry.map_err(|e| FsError::io("readdir", &path, e))?;
                if with_file_types {
                    entries.push(
                        Dirent::from_entry(&path, &entry)
                            .map_err(|e| FsError::io("readdir", &path, e))?,
                    );
                } else {
                    names.push(entry.file_name().into_string().map_err(|_| {
                        FsError::invalid("readdir", &path, "entry name is not valid UTF-8")
                    })?);
                }
            }
            if with_file_types {
                Ok(FsOutput::Entries(entries))
            } else {
                Ok(FsOutput::Names(names))
            }
        }
        FsOp::Opendir { path } => {
            let reader = std::fs::read_dir(&path).map_err(|e| FsError::io("opendir", &path, e))?;
            let fd = handles::register_dir(&path, reader);
            Ok(FsOutput::DirFd { fd, path })
        }
        FsOp::ReaddirHandle { fd } => handles::next_dir_entry(fd).map(FsOutput::NextEntry),
        FsOp::ClosedirHandle { fd } => handles::close_dir(fd).map(|()| FsOutput::Unit),
        FsOp::Mkdir {
            path,
            recursive,
            mode,
        } => make_dir(&path, recursive, mode).map(|()| FsOutput::Unit),
        FsOp::Mkdtemp { prefix } => make_temp_dir(&prefix).map(FsOutput::Path),
        FsOp::Rm { path, options } => {
            remove_with_retries(&path, options).map(|()| FsOutput::Unit)
        }
        FsOp::Rmdir { path, recursive } => {
            let result = if recursive {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_dir(&path)
            };
            result
                .map(|()| FsOutput::Unit)
                .map_err(|e| FsError::io("rmdir", &path, e))
        }
        FsOp::Unlink { path } => std::fs::remove_file(&path)
            .map(|()| FsOutput::Unit)
            .map_err(|e| FsError::io("unlink", &path, e)),
        FsOp::CopyFile {
            src,
            dst,
            exclusive,
        } => {
            if exclusive && Path::new(&dst).exists() {
                return Err(FsError::io_pair(
                    "copyFile",
                    &src,
                    &dst,
                    io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
                ));
            }
            std::fs::copy(&src, &dst)
                .map(|_| FsOutput::Unit)
                .map_err(|e| FsError::io_pair("copyFile", &src, &dst, e))
        }
        FsOp::Cp { src, dst, options } => {
            copy_tree_entry(&src, &dst, options).map(|()| FsOutput::Unit)
        }
        FsOp::Rename { from, to } => std::fs::rename(&from, &to)
            .map(|()| FsOutput::Unit)
            .map_err(|e| FsError::io_pair("rename", &from, &to, e)),
        FsOp::Open { path, flags, mode } => {
            let file = open_file(&path, flags, mode)?;
            Ok(FsOutput::FileFd(handles::register_file(file)))
        }
        FsOp::Close { fd } => handles::close_file(fd).map(|()| FsOutput::Unit),
        FsOp::Read {
            fd,
            length,
            position,
        } => handles::read_at(fd, length, position).map(FsOutput::Bytes),
        FsOp::Write {
            fd,
            bytes,
            position,
        } => handles::write_at(fd, &bytes, position).map(FsOutput::Written),
        FsOp::Readv {
            fd,
            lengths,
            position,
        } => handles::read_vectored(fd, &lengths, position).map(FsOutput::Chunks),
        FsOp::Writev {
            fd,
            chunks,
            position,
        } => handles::write_vectored(fd, &chunks, position).map(FsOutput::Written),
        FsOp::ReadFileFd { fd } => handles::read_whole(fd, "readFile").map(FsOutput::Bytes),
        FsOp::WriteFileFd { fd, bytes } => {
            handles::with_file(fd, "writeFile", |file| {
                io::Write::write_all(file, &bytes)
            })
            .map(|()| FsOutput::Unit)
        }
        FsOp::Fstat { fd } => handles::with_file(fd, "fstat", |file| file.metadata())
            .map(|meta| FsOutput::Stat(FileStat::from_metadata(&meta))),
        FsOp::Ftruncate { fd, len } => {
            handles::with_file(fd, "ftruncate", |file| file.set_len(len))
                .map(|()| FsOutput::Unit)
        }
        FsOp::Fsync { fd } => {
            handles::with_file(fd, "fsync", |file| file.sync_all()).map(|()| FsOutput::Unit)
        }
        FsOp::Fdatasync { fd } => {
            handles::with_file(fd, "fdatasync", |file| file.sync_data()).map(|()| FsOutput::Unit)
        }
        FsOp::Fchmod { fd, mode } => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                handles::with_file(fd, "fchmod", |file| {
                    file.set_permissions(std::fs::Permissions::from_mode(mode))
                })
                .map(|()| FsOutput::Unit)
            }
            #[cfg(not(unix))]
            {
                let _ = (fd, mode);
                Ok(FsOutput::Unit)
            }
        }
        FsOp::Fchown { fd, uid, gid } => {
            #[cfg(unix)]
            {
                handles::with_file(fd, "fchown", |file| {
                    std::os::unix::fs::fchown(file, Some(uid), Some(gid))
                })
                .map(|()| FsOutput::Unit)
            }
            #[cfg(not(unix))]
            {
                let _ = (uid, gid);
                Err(FsError::bad_descriptor("fchown", fd))
            }
        }
        FsOp::Futimes {
            fd,
            atime_ms,
            mtime_ms,
        } => handles::with_file(fd, "futimes", |file| {
            filetime::set_file_handle_times(
                file,
                Some(file_time(atime_ms)),
                Some(file_time(mtime_ms)),
            )
        })
        .map(|()| FsOutput::Unit),
        FsOp::Truncate { path, len } => {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|e| FsError::io("truncate", &path, e))?;
            file.set_len(len)
                .map(|()| FsOutput::Unit)
                .map_err(|e| FsError::io("truncate", &path, e))
        }
        FsOp::Realpath { path } => std::fs::canonicalize(&path)
            .map(|p| FsOutput::Path(p.to_string_lossy().into_owned()))
            .map_err(|e| FsError::io("realpath", &path, e)),
        FsOp::Access { path, mode } => check_access(&path, mode).map(|()| FsOutput::Unit),
        FsOp::Exists { path } => {
            // Never errors; any failure to stat reads as "does not exist".
            Ok(FsOutput::Bool(std::fs::symlink_metadata(&path).is_ok()))
        }
        FsOp::Chmod { path, mode } => set_mode(&path, mode).map(|()| FsOutput::Unit),
        FsOp::Chown {
            path,
            uid,
            gid,
            follow,
        } => set_owner(&path, uid, gid, follow).map(|()| FsOutput::Unit),
        FsOp::Utimes {
            path,
            atime_ms,
            mtime_ms,
            follow,
        } => set_times(&path, atime_ms, mtime_ms, follow).map(|()| FsOutput::Unit),
        FsOp::Link { existing, link } => std::fs::hard_link(&existing, &link)
            .map(|()| FsOutput::Unit)
            .map_err(|e| FsError::io_pair("link", &existing, &link, e)),
        FsOp::Symlink { target, link } => {
            #[cfg(unix)]
            {
                std::os::unix::fs::symlink(&target, &link)
                    .map(|()| FsOutput::Unit)
                    .map_err(|e| FsError::io_pair("symlink", &target, &link, e))
            }
            #[cfg(not(unix))]
            {
                let _ = target;
                Err(FsError::unsupported(
                    "symlink",
                    &link,
                    "symlink is not supported on this platform",
                ))
            }
        }
        FsOp::Readlink { path } => std::fs::read_link(&path)
            .map(|p| FsOutput::Path(p.to_string_lossy().into_owned()))
            .map_err(|e| FsError::io("readlink", &path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn p(path: &std::path::Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn write_read_append_round_trip() {
        let dir = tempdir().unwrap();
        let path = p(&dir.path().join("f.txt"));
        execute_sync(FsOp::WriteFile {
            path: path.clone(),
            bytes: b"one".to_vec(),
            append: false,
            mode: None,
        })
        .unwrap();
        execute_sync(FsOp::WriteFile {
            path: path.clone(),
            bytes: b",two".to_vec(),
            append: true,
            mode: None,
        })
        .unwrap();
        match execute_sync(FsOp::ReadFile { path }).unwrap() {
            FsOutput::Bytes(bytes) => assert_eq!(bytes, b"one,two"),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn missing_file_maps_to_enoent() {
        let err = execute_sync(FsOp::ReadFile {
            path: "/definitely/not/here".into(),
        })
        .unwrap_err();
        assert_eq!(err.code, "ENOENT");
        assert_eq!(err.syscall, "readFile");
    }

    #[test]
    fn exists_never_errors() {
        let dir = tempdir().unwrap();
        let present = p(&dir.path().join("here"));
        std::fs::write(&present, b"x").unwrap();
        assert!(matches!(
            execute_sync(FsOp::Exists { path: present }).unwrap(),
            FsOutput::Bool(true)
        ));
        assert!(matches!(
            execute_sync(FsOp::Exists {
                path: "/definitely/not/here".into()
            })
            .unwrap(),
            FsOutput::Bool(false)
        ));
    }

    #[test]
    fn rm_force_swallows_missing_path() {
        let missing = "/definitely/not/here".to_string();
        let err = execute_sync(FsOp::Rm {
            path: missing.clone(),
            options: RmOptions::default(),
        })
        .unwrap_err();
        assert_eq!(err.code, "ENOENT");
        execute_sync(FsOp::Rm {
            path: missing,
            options: RmOptions {
                force: true,
                ..RmOptions::default()
            },
        })
        .unwrap();
    }

    #[test]
    fn mkdtemp_appends_a_suffix() {
        let dir = tempdir().unwrap();
        let prefix = p(&dir.path().join("scratch-"));
        let made = match execute_sync(FsOp::Mkdtemp {
            prefix: prefix.clone(),
        })
        .unwrap()
        {
            FsOutput::Path(path) => path,
            other => panic!("unexpected output: {other:?}"),
        };
        assert!(made.starts_with(&prefix));
        assert!(made.len() > prefix.len());
        assert!(std::fs::metadata(&made).unwrap().is_dir());
    }

    #[test]
    fn open_write_fstat_close() {
        let dir = tempdir().unwrap();
        let path = p(&dir.path().join("h.bin"));
        let fd = match execute_sync(FsOp::Open {
            path,
            flags: OpenFlags::from_flag("w+").unwrap(),
            mode: 0o644,
        })
        .unwrap()
        {
            FsOutput::FileFd(fd) => fd,
            other => panic!("unexpected output: {other:?}"),
        };
        execute_sync(FsOp::Write {
            fd,
            bytes: b"abcde".to_vec(),
            position: None,
        })
        .unwrap();
        match execute_sync(FsOp::Fstat { fd }).unwrap() {
            FsOutput::Stat(stat) => assert_eq!(stat.size, 5),
            other => panic!("unexpected output: {other:?}"),
        }
        execute_sync(FsOp::Close { fd }).unwrap();
        let err = execute_sync(FsOp::Fstat { fd }).unwrap_err();
        assert_eq!(err.code, "EBADF");
    }

    #[test]
    fn readdir_with_file_types() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        match execute_sync(FsOp::Readdir {
            path: p(dir.path()),
            with_file_types: true,
        })
        .unwrap()
        {
            FsOutput::Entries(mut entries) => {
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                assert_eq!(entries.len(), 2);
                assert!(entries[0].is_file);
                assert!(entries[1].is_dir);
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn utimes_sets_mtime() {
        let dir = tempdir().unwrap();
        let path = p(&dir.path().join("t.txt"));
        std::fs::write(&path, b"x").unwrap();
        execute_sync(FsOp::Utimes {
            path: path.clone(),
            atime_ms: 1_700_000_000_000.0,
            mtime_ms: 1_700_000_000_000.0,
            follow: true,
        })
        .unwrap();
        match execute_sync(FsOp::Stat { path, follow: true }).unwrap() {
            FsOutput::Stat(stat) => assert_eq!(stat.mtime_ms, 1_700_000_000_000.0),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_readlink_lstat() {
        let dir = tempdir().unwrap();
        let target = p(&dir.path().join("target"));
        let link = p(&dir.path().join("link"));
        std::fs::write(&target, b"x").unwrap();
        execute_sync(FsOp::Symlink {
            target: target.clone(),
            link: link.clone(),
        })
        .unwrap();
        match execute_sync(FsOp::Readlink { path: link.clone() }).unwrap() {
            FsOutput::Path(read) => assert_eq!(read, target),
            other => panic!("unexpected output: {other:?}"),
        }
        match execute_sync(FsOp::Stat {
            path: link,
            follow: false,
        })
        .unwrap()
        {
            FsOutput::Stat(stat) => assert!(stat.is_symlink),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn cp_respects_force_and_error_on_exist() {
        let dir = tempdir().unwrap();
        let src = p(&dir.path().join("src.txt"));
        let dst = p(&dir.path().join("dst.txt"));
        std::fs::write(&src, b"source").unwrap();
        std::fs::write(&dst, b"existing").unwrap();

        execute_sync(FsOp::Cp {
            src: src.clone(),
            dst: dst.clone(),
            options: CopyOptions {
                force: false,
                ..CopyOptions::default()
            },
        })
        .unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"existing");

        let err = execute_sync(FsOp::Cp {
            src: src.clone(),
            dst: dst.clone(),
            options: CopyOptions {
                force: false,
                error_on_exist: true,
                ..CopyOptions::default()
            },
        })
        .unwrap_err();
        assert_eq!(err.code, "EEXIST");

        execute_sync(FsOp::Cp {
            src,
            dst: dst.clone(),
            options: CopyOptions::default(),
        })
        .unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"source");
    }

    #[test]
    fn cp_recursive_copies_tree() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("tree");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("a.txt"), b"a").unwrap();
        std::fs::write(src.join("nested/b.txt"), b"b").unwrap();
        let dst = dir.path().join("copy");

        let err = execute_sync(FsOp::Cp {
            src: p(&src),
            dst: p(&dst),
            options: CopyOptions::default(),
        })
        .unwrap_err();
        assert_eq!(err.code, "EINVAL");

        execute_sync(FsOp::Cp {
            src: p(&src),
            dst: p(&dst),
            options: CopyOptions {
                recursive: true,
                ..CopyOptions::default()
            },
        })
        .unwrap();
        assert_eq!(std::fs::read(dst.join("nested/b.txt")).unwrap(), b"b");
    }
}
