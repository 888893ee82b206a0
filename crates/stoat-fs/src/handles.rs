//! Process-wide registries for open file and directory descriptors.
//!
//! Descriptors are plain integers handed across the host boundary; the
//! actual `std::fs::File` and `ReadDir` objects live here. A descriptor
//! removed from its registry is gone: every later operation on it fails
//! with `EBADF`.

use std::collections::HashMap;
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::FsError;
use crate::meta::Dirent;

static NEXT_FILE_FD: AtomicU64 = AtomicU64::new(3);
static FILES: LazyLock<Mutex<HashMap<u64, std::fs::File>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static NEXT_DIR_FD: AtomicU64 = AtomicU64::new(1);
static DIRS: LazyLock<Mutex<HashMap<u64, OpenDir>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

struct OpenDir {
    path: String,
    reader: std::fs::ReadDir,
}

pub(crate) fn register_file(file: std::fs::File) -> u64 {
    let fd = NEXT_FILE_FD.fetch_add(1, Ordering::Relaxed);
    FILES.lock().insert(fd, file);
    fd
}

pub(crate) fn close_file(fd: u64) -> Result<(), FsError> {
    match FILES.lock().remove(&fd) {
        Some(_) => Ok(()),
        None => Err(FsError::bad_descriptor("close", fd)),
    }
}

pub(crate) fn with_file<T>(
    fd: u64,
    syscall: &'static str,
    f: impl FnOnce(&mut std::fs::File) -> io::Result<T>,
) -> Result<T, FsError> {
    let mut files = FILES.lock();
    let file = files
        .get_mut(&fd)
        .ok_or_else(|| FsError::bad_descriptor(syscall, fd))?;
    f(file).map_err(|e| FsError::io(syscall, "<fd>", e))
}

/// Read up to `length` bytes. When `position` is given the file cursor is
/// restored afterwards, matching positioned-read semantics.
pub(crate) fn read_at(fd: u64, length: usize, position: Option<u64>) -> Result<Vec<u8>, FsError> {
    with_file(fd, "read", |file| {
        let saved = match position {
            Some(pos) => {
                let saved = file.stream_position()?;
                file.seek(SeekFrom::Start(pos))?;
                Some(saved)
            }
            None => None,
        };
        let mut buf = vec![0_u8; length];
        let n = file.read(&mut buf)?;
        buf.truncate(n);
        if let Some(saved) = saved {
            file.seek(SeekFrom::Start(saved))?;
        }
        Ok(buf)
    })
}

pub(crate) fn write_at(fd: u64, bytes: &[u8], position: Option<u64>) -> Result<usize, FsError> {
    with_file(fd, "write", |file| {
        let saved = match position {
            Some(pos) => {
                let saved = file.stream_position()?;
                file.seek(SeekFrom::Start(pos))?;
                Some(saved)
            }
            None => None,
        };
        let written = file.write(bytes)?;
        if let Some(saved) = saved {
            file.seek(SeekFrom::Start(saved))?;
        }
        Ok(written)
    })
}

/// Scatter read: fill each chunk in order, stopping at end of file.
pub(crate) fn read_vectored(
    fd: u64,
    lengths: &[usize],
    position: Option<u64>,
) -> Result<Vec<Vec<u8>>, FsError> {
    with_file(fd, "read", |file| {
        let saved = match position {
            Some(pos) => {
                let saved = file.stream_position()?;
                file.seek(SeekFrom::Start(pos))?;
                Some(saved)
            }
            None => None,
        };
        let mut chunks = Vec::with_capacity(lengths.len());
        for &length in lengths {
            let mut buf = vec![0_u8; length];
            let mut filled = 0;
            while filled < length {
                let n = file.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            let done = filled < length;
            chunks.push(buf);
            if done {
                break;
            }
        }
        if let Some(saved) = saved {
            file.seek(SeekFrom::Start(saved))?;
        }
        Ok(chunks)
    })
}

/// Gather write: write all chunks back to back, returning total bytes.
pub(crate) fn write_vectored(
    fd: u64,
    chunks: &[Vec<u8>],
    position: Option<u64>,
) -> Result<usize, FsError> {
    with_file(fd, "write", |file| {
        let saved = match position {
            Some(pos) => {
                let saved = file.stream_position()?;
                file.seek(SeekFrom::Start(pos))?;
                Some(saved)
            }
            None => None,
        };
        let mut total = 0;
        for chunk in chunks {
            file.write_all(chunk)?;
            total += chunk.len();
        }
        if let Some(saved) = saved {
            file.seek(SeekFrom::Start(saved))?;
        }
        Ok(total)
    })
}

pub(crate) fn read_whole(fd: u64, syscall: &'static str) -> Result<Vec<u8>, FsError> {
    with_file(fd, syscall, |file| {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    })
}

pub(crate) fn register_dir(path: &str, reader: std::fs::ReadDir) -> u64 {
    let fd = NEXT_DIR_FD.fetch_add(1, Ordering::Relaxed);
    DIRS.lock().insert(
        fd,
        OpenDir {
            path: path.to_string(),
            reader,
        },
    );
    fd
}

pub(crate) fn close_dir(fd: u64) -> Result<(), FsError> {
    match DIRS.lock().remove(&fd) {
        Some(_) => Ok(()),
        None => Err(FsError::bad_descriptor("closedir", fd)),
    }
}

pub(crate) fn next_dir_entry(fd: u64) -> Result<Option<Dirent>, FsError> {
    let mut dirs = DIRS.lock();
    let open = dirs
        .get_mut(&fd)
        .ok_or_else(|| FsError::bad_descriptor("readdir", fd))?;
    match open.reader.next() {
        Some(Ok(entry)) => Dirent::from_entry(&open.path, &entry)
            .map(Some)
            .map_err(|e| FsError::io("readdir", &open.path, e)),
        Some(Err(e)) => Err(FsError::io("readdir", &open.path, e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn positioned_read_restores_cursor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"abcdef").unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let fd = register_file(file);

        assert_eq!(read_at(fd, 2, None).unwrap(), b"ab");
        assert_eq!(read_at(fd, 2, Some(4)).unwrap(), b"ef");
        // Cursor restored: plain read continues where the first left off.
        assert_eq!(read_at(fd, 2, None).unwrap(), b"cd");

        close_file(fd).unwrap();
        assert_eq!(close_file(fd).unwrap_err().code, "EBADF");
    }

    #[test]
    fn vectored_io_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.txt");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let fd = register_file(file);

        let n = write_vectored(fd, &[b"abc".to_vec(), b"de".to_vec()], Some(0)).unwrap();
        assert_eq!(n, 5);
        let chunks = read_vectored(fd, &[2, 2, 4], Some(0)).unwrap();
        assert_eq!(chunks, vec![b"ab".to_vec(), b"cd".to_vec(), b"e".to_vec()]);
        close_file(fd).unwrap();
    }

    #[test]
    fn dir_descriptor_iterates_then_ends() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("x"), b"").unwrap();
        std::fs::write(dir.path().join("y"), b"").unwrap();
        let reader = std::fs::read_dir(dir.path()).unwrap();
        let fd = register_dir(&dir.path().to_string_lossy(), reader);

        let mut names = Vec::new();
        while let Some(entry) = next_dir_entry(fd).unwrap() {
            names.push(entry.name);
        }
        names.sort();
        assert_eq!(names, ["x", "y"]);
        close_dir(fd).unwrap();
        assert_eq!(next_dir_entry(fd).unwrap_err().code, "EBADF");
    }
}
