//! Host bindings bridging the script engine to the native filesystem and
//! buffer cores.
//!
//! The engine is single-threaded and lock-entered; the native side is
//! multithreaded. Everything that crosses the boundary goes through two
//! mechanisms:
//!
//! - [`token::CompletionToken`]: a retained callback paired with an
//!   isolate liveness handle, consumed exactly once on whichever thread
//!   finishes the operation.
//! - [`buffer_transfer`]: zero-copy ownership transfer between native
//!   byte buffers and script `ArrayBuffer` views.
//!
//! [`fs_ext::build_fs_module`] and [`buffer_ext::build_buffer_module`]
//! assemble the script-visible module objects for a realm.

pub mod buffer_ext;
pub mod buffer_transfer;
pub mod convert;
pub mod dispatch;
pub mod fs_ext;
pub mod handles;
pub mod token;
pub mod variant;
pub mod watchers;

pub use buffer_ext::{buffer_value, build_buffer_module};
pub use buffer_transfer::{data_to_bytes, export_buffer, value_as_shared_buffer};
pub use convert::{fs_error_value, stat_value, variant_to_value};
pub use fs_ext::build_fs_module;
pub use handles::{dir_value, file_handle_value};
pub use token::CompletionToken;
pub use variant::{Encoded, EntrySet, FsVariant};
