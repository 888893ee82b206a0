//! The closed set of native completion payloads.
//!
//! Every async filesystem operation completes with exactly one of these
//! cases (or an error). The set is closed on purpose: the dispatcher in
//! [`crate::token`] matches exhaustively, so adding a case without a
//! conversion rule fails to compile instead of silently misdelivering.

use stoat_buffer::Buffer;
use stoat_fs::{Dirent, FileStat, FsError, FsOutput};

/// Encoded read result: text when an encoding was requested, otherwise raw
/// bytes delivered as a native buffer.
#[derive(Debug, Clone)]
pub enum Encoded {
    Text(String),
    Data(Buffer),
}

/// Directory listing: plain names, raw-byte names when the `"buffer"`
/// encoding was requested, or typed entries.
#[derive(Debug, Clone)]
pub enum EntrySet {
    Names(Vec<String>),
    Buffers(Vec<Buffer>),
    Dirents(Vec<Dirent>),
}

/// One completed native result.
#[derive(Debug, Clone)]
pub enum FsVariant {
    Void,
    Int32(i32),
    Bool(bool),
    Size(usize),
    Text(String),
    Stat { stat: FileStat, bigint: bool },
    Encoded(Encoded),
    Entries(EntrySet),
    NextEntry(Option<Dirent>),
    /// A newly opened file; the dispatcher wraps the descriptor.
    Handle(u64),
    /// A newly opened directory; the dispatcher wraps the descriptor.
    Dir { fd: u64, path: String },
}

/// Mismatch between an operation and the payload the executor returned.
/// This is a bridge bug, not a user error; it surfaces as an internal
/// error through the normal error channel.
pub(crate) fn unexpected(op: &'static str, output: &FsOutput) -> FsError {
    FsError::internal(op, format!("unexpected native payload: {output:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_payload_is_internal() {
        let err = unexpected("readFile", &FsOutput::Unit);
        assert_eq!(err.code, "EIO");
        assert!(err.detail.contains("Unit"));
    }
}
