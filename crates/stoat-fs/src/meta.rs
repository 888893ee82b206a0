//! Stat and directory-entry payloads.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

/// Snapshot of file metadata, independent of any host value types.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime_ms: f64,
    pub mtime_ms: f64,
    pub ctime_ms: f64,
    pub birthtime_ms: f64,
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub is_fifo: bool,
    pub is_socket: bool,
    pub is_char_device: bool,
    pub is_block_device: bool,
}

impl FileStat {
    /// All-zero stat, used when the target does not exist.
    pub fn zeroed() -> Self {
        Self {
            dev: 0,
            ino: 0,
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            rdev: 0,
            size: 0,
            blksize: 0,
            blocks: 0,
            atime_ms: 0.0,
            mtime_ms: 0.0,
            ctime_ms: 0.0,
            birthtime_ms: 0.0,
            is_file: false,
            is_dir: false,
            is_symlink: false,
            is_fifo: false,
            is_socket: false,
            is_char_device: false,
            is_block_device: false,
        }
    }

    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let (dev, ino, mode, nlink, uid, gid, rdev, blksize, blocks, ctime_ms) = {
            use std::os::unix::fs::MetadataExt;
            (
                metadata.dev(),
                metadata.ino(),
                metadata.mode(),
                metadata.nlink(),
                metadata.uid(),
                metadata.gid(),
                metadata.rdev(),
                metadata.blksize(),
                metadata.blocks(),
                metadata.ctime() as f64 * 1000.0 + metadata.ctime_nsec() as f64 / 1_000_000.0,
            )
        };
        #[cfg(not(unix))]
        let (dev, ino, mode, nlink, uid, gid, rdev, blksize, blocks, ctime_ms) =
            (0, 0, 0, 0, 0, 0, 0, 0, 0, time_ms(metadata.modified()));

        #[cfg(unix)]
        let file_type = {
            use std::os::unix::fs::FileTypeExt;
            let ft = metadata.file_type();
            (
                ft.is_fifo(),
                ft.is_socket(),
                ft.is_char_device(),
                ft.is_block_device(),
            )
        };
        #[cfg(not(unix))]
        let file_type = (false, false, false, false);

        Self {
            dev,
            ino,
            mode,
            nlink,
            uid,
            gid,
            rdev,
            size: metadata.len(),
            blksize,
            blocks,
            atime_ms: time_ms(metadata.accessed()),
            mtime_ms: time_ms(metadata.modified()),
            ctime_ms,
            birthtime_ms: time_ms(metadata.created()),
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
            is_symlink: metadata.file_type().is_symlink(),
            is_fifo: file_type.0,
            is_socket: file_type.1,
            is_char_device: file_type.2,
            is_block_device: file_type.3,
        }
    }
}

/// One directory entry with its file type resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub name: String,
    pub parent_path: String,
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl Dirent {
    pub fn from_entry(parent: &str, entry: &std::fs::DirEntry) -> io::Result<Self> {
        let name = entry.file_name().into_string().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "directory entry name is not valid UTF-8",
            )
        })?;
        let file_type = entry.file_type()?;
        Ok(Self {
            name,
            parent_path: parent.to_string(),
            is_file: file_type.is_file(),
            is_dir: file_type.is_dir(),
            is_symlink: file_type.is_symlink(),
        })
    }
}

fn time_ms(time: io::Result<SystemTime>) -> f64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stat_reflects_file_kind_and_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"12345").unwrap();
        let stat = FileStat::from_metadata(&std::fs::metadata(&path).unwrap());
        assert!(stat.is_file);
        assert!(!stat.is_dir);
        assert_eq!(stat.size, 5);
        assert!(stat.mtime_ms > 0.0);
    }
}
