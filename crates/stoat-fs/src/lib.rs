//! Multithreaded filesystem operation core.
//!
//! Operations are expressed as [`ops::FsOp`] requests and executed either
//! on the calling thread ([`ops::execute_sync`]) or on a runtime
//! ([`async_ops::execute_async`]). Results come back as [`ops::FsOutput`]
//! payloads with no host value types, so a single executor serves every
//! embedding. Errors carry errno codes and syscall context ([`FsError`]).

pub mod async_ops;
pub mod error;
mod handles;
pub mod meta;
pub mod ops;
pub mod options;
pub mod watch;

pub use error::FsError;
pub use meta::{Dirent, FileStat};
pub use ops::{F_OK, FsOp, FsOutput, R_OK, W_OK, X_OK, execute_sync};
pub use options::{CopyOptions, OpenFlags, RmOptions};
pub use watch::{PathWatcher, StatPoller, WatchEvent, WatchEventKind, poll_stat, watch_path};

pub use async_ops::execute_async;
