//! Asynchronous execution of [`FsOp`] requests.
//!
//! Path operations with native async counterparts go through `tokio::fs`;
//! descriptor-registry operations and anything else that must block run on
//! the blocking pool.

use std::io;

use crate::error::FsError;
use crate::handles;
use crate::meta::{Dirent, FileStat};
use crate::ops::{self, FsOp, FsOutput};

async fn blocking<T: Send + 'static>(
    syscall: &'static str,
    f: impl FnOnce() -> Result<T, FsError> + Send + 'static,
) -> Result<T, FsError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FsError::internal(syscall, e.to_string()))?
}

/// Execute an operation without blocking the caller.
pub async fn execute_async(op: FsOp) -> Result<FsOutput, FsError> {
    match op {
        FsOp::ReadFile { path } => tokio::fs::read(&path)
            .await
            .map(FsOutput::Bytes)
            .map_err(|e| FsError::io("readFile", &path, e)),
        FsOp::WriteFile {
            path,
            bytes,
            append,
            mode,
        } => {
            blocking("writeFile", move || {
                ops::write_file_sync(&path, &bytes, append, mode)
            })
            .await
            .map(|()| FsOutput::Unit)
        }
        FsOp::Stat { path, follow } => {
            let syscall: &'static str = if follow { "stat" } else { "lstat" };
            let meta = if follow {
                tokio::fs::metadata(&path).await
            } else {
                tokio::fs::symlink_metadata(&path).await
            }
            .map_err(|e| FsError::io(syscall, &path, e))?;
            Ok(FsOutput::Stat(FileStat::from_metadata(&meta)))
        }
        FsOp::Readdir {
            path,
            with_file_types,
        } => {
            let mut reader = tokio::fs::read_dir(&path)
                .await
                .map_err(|e| FsError::io("readdir", &path, e))?;
            let mut names = Vec::new();
            let mut entries = Vec::new();
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|e| FsError::io("readdir", &path, e))?
            {
                let name = entry.file_name().into_string().map_err(|_| {
                    FsError::invalid("readdir", &path, "entry name is not valid UTF-8")
                })?;
                if with_file_types {
                    let file_type = entry
                        .file_type()
                        .await
                        .map_err(|e| FsError::io("readdir", &path, e))?;
                    entries.push(Dirent {
                        name,
                        parent_path: path.clone(),
                        is_file: file_type.is_file(),
                        is_dir: file_type.is_dir(),
                        is_symlink: file_type.is_symlink(),
                    });
                } else {
                    names.push(name);
                }
            }
            if with_file_types {
                Ok(FsOutput::Entries(entries))
            } else {
                Ok(FsOutput::Names(names))
            }
        }
        FsOp::Opendir { path } => {
            let opened = path.clone();
            let fd = blocking("opendir", move || {
                let reader =
                    std::fs::read_dir(&opened).map_err(|e| FsError::io("opendir", &opened, e))?;
                Ok(handles::register_dir(&opened, reader))
            })
            .await?;
            Ok(FsOutput::DirFd { fd, path })
        }
        FsOp::ReaddirHandle { fd } => blocking("readdir", move || handles::next_dir_entry(fd))
            .await
            .map(FsOutput::NextEntry),
        FsOp::ClosedirHandle { fd } => handles::close_dir(fd).map(|()| FsOutput::Unit),
        FsOp::Mkdir {
            path, recursive, ..
        } if !cfg!(unix) => {
            let result = if recursive {
                tokio::fs::create_dir_all(&path).await
            } else {
                tokio::fs::create_dir(&path).await
            };
            result
                .map(|()| FsOutput::Unit)
                .map_err(|e| FsError::io("mkdir", &path, e))
        }
        op @ FsOp::Mkdir { .. } => blocking("mkdir", move || ops::execute_sync(op)).await,
        FsOp::Mkdtemp { prefix } => blocking("mkdtemp", move || ops::make_temp_dir(&prefix))
            .await
            .map(FsOutput::Path),
        FsOp::Rm { path, options } => {
            // Retry delays sleep; keep them off the async workers.
            blocking("rm", move || ops::remove_with_retries(&path, options))
                .await
                .map(|()| FsOutput::Unit)
        }
        FsOp::Rmdir { path, recursive } => {
            let result = if recursive {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_dir(&path).await
            };
            result
                .map(|()| FsOutput::Unit)
                .map_err(|e| FsError::io("rmdir", &path, e))
        }
        FsOp::Unlink { path } => tokio::fs::remove_file(&path)
            .await
            .map(|()| FsOutput::Unit)
            .map_err(|e| FsError::io("unlink", &path, e)),
        FsOp::CopyFile {
            src,
            dst,
            exclusive,
        } => {
            if exclusive
                && tokio::fs::symlink_metadata(&dst).await.is_ok()
            {
                return Err(FsError::io_pair(
                    "copyFile",
                    &src,
                    &dst,
                    io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
                ));
            }
            tokio::fs::copy(&src, &dst)
                .await
                .map(|_| FsOutput::Unit)
                .map_err(|e| FsError::io_pair("copyFile", &src, &dst, e))
        }
        FsOp::Cp { src, dst, options } => {
            blocking("cp", move || ops::copy_tree_entry(&src, &dst, options))
                .await
                .map(|()| FsOutput::Unit)
        }
        FsOp::Rename { from, to } => tokio::fs::rename(&from, &to)
            .await
            .map(|()| FsOutput::Unit)
            .map_err(|e| FsError::io_pair("rename", &from, &to, e)),
        FsOp::Open { path, flags, mode } => {
            let file = blocking("open", move || ops::open_file(&path, flags, mode)).await?;
            Ok(FsOutput::FileFd(handles::register_file(file)))
        }
        FsOp::Close { fd } => handles::close_file(fd).map(|()| FsOutput::Unit),
        FsOp::Realpath { path } => tokio::fs::canonicalize(&path)
            .await
            .map(|p| FsOutput::Path(p.to_string_lossy().into_owned()))
            .map_err(|e| FsError::io("realpath", &path, e)),
        FsOp::Access { path, mode } => {
            blocking("access", move || ops::check_access(&path, mode))
                .await
                .map(|()| FsOutput::Unit)
        }
        FsOp::Exists { path } => Ok(FsOutput::Bool(
            tokio::fs::symlink_metadata(&path).await.is_ok(),
        )),
        // Descriptor I/O and the remaining path operations share one
        // synchronous implementation.
        op @ (FsOp::Read { .. }
        | FsOp::Write { .. }
        | FsOp::Readv { .. }
        | FsOp::Writev { .. }
        | FsOp::ReadFileFd { .. }
        | FsOp::WriteFileFd { .. }
        | FsOp::Fstat { .. }
        | FsOp::Ftruncate { .. }
        | FsOp::Fsync { .. }
        | FsOp::Fdatasync { .. }
        | FsOp::Fchmod { .. }
        | FsOp::Fchown { .. }
        | FsOp::Futimes { .. }
        | FsOp::Truncate { .. }
        | FsOp::Chmod { .. }
        | FsOp::Chown { .. }
        | FsOp::Utimes { .. }
        | FsOp::Link { .. }
        | FsOp::Symlink { .. }
        | FsOp::Readlink { .. }) => {
            let syscall = op.syscall();
            blocking(syscall, move || ops::execute_sync(op)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn async_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt").to_string_lossy().into_owned();
        execute_async(FsOp::WriteFile {
            path: path.clone(),
            bytes: b"hello".to_vec(),
            append: false,
            mode: None,
        })
        .await
        .unwrap();
        match execute_async(FsOp::ReadFile { path }).await.unwrap() {
            FsOutput::Bytes(bytes) => assert_eq!(bytes, b"hello"),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn async_descriptor_lifecycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.bin").to_string_lossy().into_owned();
        let fd = match execute_async(FsOp::Open {
            path,
            flags: crate::options::OpenFlags::from_flag("w+").unwrap(),
            mode: 0o600,
        })
        .await
        .unwrap()
        {
            FsOutput::FileFd(fd) => fd,
            other => panic!("unexpected output: {other:?}"),
        };
        match execute_async(FsOp::Write {
            fd,
            bytes: b"xy".to_vec(),
            position: None,
        })
        .await
        .unwrap()
        {
            FsOutput::Written(n) => assert_eq!(n, 2),
            other => panic!("unexpected output: {other:?}"),
        }
        execute_async(FsOp::Close { fd }).await.unwrap();
        let err = execute_async(FsOp::Close { fd }).await.unwrap_err();
        assert_eq!(err.code, "EBADF");
    }

    #[tokio::test]
    async fn async_error_keeps_syscall_context() {
        let err = execute_async(FsOp::Stat {
            path: "/definitely/not/here".into(),
            follow: true,
        })
        .await
        .unwrap_err();
        assert_eq!(err.code, "ENOENT");
        assert_eq!(err.syscall, "stat");
    }
}
