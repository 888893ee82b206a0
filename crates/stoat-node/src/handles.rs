//! Script-visible file and directory handles.
//!
//! A handle wraps a native descriptor in a host object with one internal
//! slot. The slot carries the descriptor and a closed flag; the flag flips
//! when close is first requested, so later operations short-circuit with
//! EBADF instead of racing the native close. Closing an already-closed
//! handle succeeds without touching the native layer.

use std::sync::atomic::{AtomicBool, Ordering};

use stoat_fs::{FsError, FsOp, FsOutput};
use stoat_vm_core::gc::GcRef;
use stoat_vm_core::object::JsObject;
use stoat_vm_core::{IsolateScope, Value, VmError};

use crate::buffer_transfer::data_to_bytes;
use crate::dispatch::{require_callback, run_sync, spawn_fs_op, throw};
use crate::fs_ext;
use crate::token::CompletionToken;
use crate::variant::{FsVariant, unexpected};

pub(crate) struct FileHandleSlot {
    fd: u64,
    closed: AtomicBool,
}

pub(crate) struct DirSlot {
    fd: u64,
    closed: AtomicBool,
}

fn file_slot<'v>(this: &'v Value, op: &'static str) -> Result<&'v FileHandleSlot, VmError> {
    this.as_object()
        .and_then(|obj| obj.internal::<FileHandleSlot>())
        .ok_or_else(|| VmError::type_error(format!("{op} called on a non-FileHandle receiver")))
}

fn dir_slot<'v>(this: &'v Value, op: &'static str) -> Result<&'v DirSlot, VmError> {
    this.as_object()
        .and_then(|obj| obj.internal::<DirSlot>())
        .ok_or_else(|| VmError::type_error(format!("{op} called on a non-Dir receiver")))
}

/// Open descriptor for a guarded method, or the EBADF that the callback
/// should receive once the handle has been closed.
fn open_fd(slot: &FileHandleSlot, op: &'static str) -> Result<u64, FsError> {
    if slot.closed.load(Ordering::SeqCst) {
        Err(FsError::bad_descriptor(op, slot.fd))
    } else {
        Ok(slot.fd)
    }
}

fn prepend_fd(fd: u64, args: &[Value]) -> Vec<Value> {
    let mut with_fd = Vec::with_capacity(args.len() + 1);
    with_fd.push(Value::Number(fd as f64));
    with_fd.extend_from_slice(args);
    with_fd
}

/// Wrap a freshly opened descriptor in a FileHandle object.
pub fn file_handle_value(scope: &IsolateScope<'_>, fd: u64) -> Value {
    let obj = JsObject::with_internal(Box::new(FileHandleSlot {
        fd,
        closed: AtomicBool::new(false),
    }));
    obj.set("fd", Value::Number(fd as f64));
    obj.set_prototype(Some(file_handle_prototype(scope)));
    Value::Object(GcRef::new(obj))
}

fn file_handle_prototype(scope: &IsolateScope<'_>) -> GcRef<JsObject> {
    scope.realm().template_or_init("FileHandle", || {
        let proto = JsObject::new();

        proto.set(
            "close",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "close")?;
                let callback = require_callback("close", args.last())?;
                if slot.closed.swap(true, Ordering::SeqCst) {
                    // Second close is a success no-op.
                    let callback = callback
                        .as_function()
                        .cloned()
                        .ok_or_else(|| VmError::type_error("close: callback must be a function"))?;
                    let token = CompletionToken::new(scope.handle(), callback, "close");
                    token.complete_now(scope, Ok(FsVariant::Void));
                    return Ok(Value::Undefined);
                }
                let fd = slot.fd;
                spawn_fs_op(
                    scope,
                    "close",
                    &callback,
                    Ok(FsOp::Close { fd }),
                    fs_ext::expect_unit("close"),
                )
            })),
        );

        proto.set(
            "read",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "read")?;
                let callback = require_callback("read", args.last())?;
                let setup = open_fd(slot, "read").and_then(|fd| {
                    fs_ext::setup_read(&prepend_fd(fd, &args[..args.len() - 1]))
                });
                match setup {
                    Ok(parsed) => {
                        let op = FsOp::Read {
                            fd: parsed.fd,
                            length: parsed.length,
                            position: parsed.position,
                        };
                        spawn_fs_op(
                            scope,
                            "read",
                            &callback,
                            Ok(op),
                            fs_ext::convert_read(parsed.target, parsed.offset),
                        )
                    }
                    Err(err) => {
                        spawn_fs_op(scope, "read", &callback, Err(err), |_| Ok(FsVariant::Void))
                    }
                }
            })),
        );

        proto.set(
            "write",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "write")?;
                let callback = require_callback("write", args.last())?;
                let setup = open_fd(slot, "write")
                    .and_then(|fd| fs_ext::setup_write(&prepend_fd(fd, &args[..args.len() - 1])));
                spawn_fs_op(scope, "write", &callback, setup, fs_ext::expect_written("write"))
            })),
        );

        proto.set(
            "readFile",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "readFile")?;
                let callback = require_callback("readFile", args.last())?;
                let rest = &args[..args.len() - 1];
                let setup = open_fd(slot, "readFile").and_then(|fd| {
                    let encoding = fs_ext::parse_encoding(rest.first(), "readFile")?;
                    Ok((FsOp::ReadFileFd { fd }, encoding))
                });
                match setup {
                    Ok((op, encoding)) => {
                        spawn_fs_op(scope, "readFile", &callback, Ok(op), move |output| {
                            match output {
                                FsOutput::Bytes(bytes) => Ok(fs_ext::encoded(encoding, bytes)),
                                other => Err(unexpected("readFile", &other)),
                            }
                        })
                    }
                    Err(err) => spawn_fs_op(scope, "readFile", &callback, Err(err), |_| {
                        Ok(FsVariant::Void)
                    }),
                }
            })),
        );

        proto.set(
            "writeFile",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "writeFile")?;
                let callback = require_callback("writeFile", args.last())?;
                let rest = &args[..args.len() - 1];
                let setup = open_fd(slot, "writeFile").and_then(|fd| {
                    let data = rest
                        .first()
                        .ok_or_else(|| FsError::invalid("writeFile", "", "missing data argument"))?;
                    let bytes = match data.as_str() {
                        Some(s) => fs_ext::parse_encoding(rest.get(1), "writeFile")?
                            .unwrap_or_default()
                            .decode(s)
                            .map_err(|e| FsError::invalid("writeFile", "", e.to_string()))?,
                        None => data_to_bytes(data)
                            .map_err(|e| FsError::invalid("writeFile", "", e.to_string()))?,
                    };
                    Ok(FsOp::WriteFileFd { fd, bytes })
                });
                spawn_fs_op(scope, "writeFile", &callback, setup, fs_ext::expect_unit("writeFile"))
            })),
        );

        proto.set(
            "stat",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "stat")?;
                let callback = require_callback("stat", args.last())?;
                let bigint = fs_ext::opt_bool(args[..args.len() - 1].first(), "bigint", false);
                let setup = open_fd(slot, "fstat").map(|fd| FsOp::Fstat { fd });
                spawn_fs_op(scope, "fstat", &callback, setup, fs_ext::expect_stat("fstat", bigint))
            })),
        );

        proto.set(
            "truncate",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "truncate")?;
                let callback = require_callback("truncate", args.last())?;
                let len = args.first().and_then(|v| v.as_i64()).unwrap_or(0).max(0) as u64;
                let setup = open_fd(slot, "ftruncate").map(|fd| FsOp::Ftruncate { fd, len });
                spawn_fs_op(scope, "ftruncate", &callback, setup, fs_ext::expect_unit("ftruncate"))
            })),
        );

        proto.set(
            "chmod",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "chmod")?;
                let callback = require_callback("chmod", args.last())?;
                let setup = open_fd(slot, "fchmod").and_then(|fd| {
                    fs_ext::arg_u32(args, 0, "fchmod").map(|mode| FsOp::Fchmod { fd, mode })
                });
                spawn_fs_op(scope, "fchmod", &callback, setup, fs_ext::expect_unit("fchmod"))
            })),
        );

        proto.set(
            "chown",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "chown")?;
                let callback = require_callback("chown", args.last())?;
                let setup = open_fd(slot, "fchown").and_then(|fd| {
                    let uid = fs_ext::arg_u32(args, 0, "fchown")?;
                    let gid = fs_ext::arg_u32(args, 1, "fchown")?;
                    Ok(FsOp::Fchown { fd, uid, gid })
                });
                spawn_fs_op(scope, "fchown", &callback, setup, fs_ext::expect_unit("fchown"))
            })),
        );

        proto.set(
            "utimes",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "utimes")?;
                let callback = require_callback("utimes", args.last())?;
                let setup = open_fd(slot, "futimes").and_then(|fd| {
                    let atime_ms = fs_ext::arg_time_ms(args, 0, "futimes")?;
                    let mtime_ms = fs_ext::arg_time_ms(args, 1, "futimes")?;
                    Ok(FsOp::Futimes {
                        fd,
                        atime_ms,
                        mtime_ms,
                    })
                });
                spawn_fs_op(scope, "futimes", &callback, setup, fs_ext::expect_unit("futimes"))
            })),
        );

        proto.set(
            "sync",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "sync")?;
                let callback = require_callback("sync", args.last())?;
                let setup = open_fd(slot, "fsync").map(|fd| FsOp::Fsync { fd });
                spawn_fs_op(scope, "fsync", &callback, setup, fs_ext::expect_unit("fsync"))
            })),
        );

        proto.set(
            "datasync",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = file_slot(this, "datasync")?;
                let callback = require_callback("datasync", args.last())?;
                let setup = open_fd(slot, "fdatasync").map(|fd| FsOp::Fdatasync { fd });
                spawn_fs_op(scope, "fdatasync", &callback, setup, fs_ext::expect_unit("fdatasync"))
            })),
        );

        proto
    })
}

/// Wrap an opened directory stream in a Dir object.
pub fn dir_value(scope: &IsolateScope<'_>, fd: u64, path: &str) -> Value {
    let obj = JsObject::with_internal(Box::new(DirSlot {
        fd,
        closed: AtomicBool::new(false),
    }));
    obj.set("path", Value::from(path));
    obj.set_prototype(Some(dir_prototype(scope)));
    Value::Object(GcRef::new(obj))
}

fn dir_prototype(scope: &IsolateScope<'_>) -> GcRef<JsObject> {
    scope.realm().template_or_init("Dir", || {
        let proto = JsObject::new();

        proto.set(
            "read",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = dir_slot(this, "read")?;
                let callback = require_callback("read", args.last())?;
                let setup = if slot.closed.load(Ordering::SeqCst) {
                    Err(FsError::bad_descriptor("readdir", slot.fd))
                } else {
                    Ok(FsOp::ReaddirHandle { fd: slot.fd })
                };
                spawn_fs_op(scope, "readdir", &callback, setup, convert_next_entry)
            })),
        );

        proto.set(
            "readSync",
            Value::Function(scope.create_function(|scope, this, _args| {
                let slot = dir_slot(this, "readSync")?;
                if slot.closed.load(Ordering::SeqCst) {
                    return Err(throw(FsError::bad_descriptor("readdir", slot.fd)));
                }
                run_sync(
                    scope,
                    Ok(FsOp::ReaddirHandle { fd: slot.fd }),
                    convert_next_entry,
                )
            })),
        );

        proto.set(
            "close",
            Value::Function(scope.create_function(|scope, this, args| {
                let slot = dir_slot(this, "close")?;
                let callback = require_callback("close", args.last())?;
                if slot.closed.swap(true, Ordering::SeqCst) {
                    let callback = callback
                        .as_function()
                        .cloned()
                        .ok_or_else(|| VmError::type_error("close: callback must be a function"))?;
                    let token = CompletionToken::new(scope.handle(), callback, "closedir");
                    token.complete_now(scope, Ok(FsVariant::Void));
                    return Ok(Value::Undefined);
                }
                let fd = slot.fd;
                spawn_fs_op(
                    scope,
                    "closedir",
                    &callback,
                    Ok(FsOp::ClosedirHandle { fd }),
                    fs_ext::expect_unit("closedir"),
                )
            })),
        );

        proto.set(
            "closeSync",
            Value::Function(scope.create_function(|scope, this, _args| {
                let slot = dir_slot(this, "closeSync")?;
                if slot.closed.swap(true, Ordering::SeqCst) {
                    return Ok(Value::Undefined);
                }
                run_sync(
                    scope,
                    Ok(FsOp::ClosedirHandle { fd: slot.fd }),
                    fs_ext::expect_unit("closedir"),
                )
            })),
        );

        proto
    })
}

fn convert_next_entry(output: FsOutput) -> Result<FsVariant, FsError> {
    match output {
        FsOutput::NextEntry(entry) => Ok(FsVariant::NextEntry(entry)),
        other => Err(unexpected("readdir", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_vm_core::isolate::{Isolate, IsolateConfig};

    fn call_method(
        scope: &mut IsolateScope<'_>,
        target: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, VmError> {
        let method = target
            .as_object()
            .and_then(|obj| obj.get(name))
            .and_then(|v| v.as_function().cloned())
            .expect("method present");
        scope.call(&method, target, args)
    }

    #[test]
    fn file_handle_exposes_fd_and_methods() {
        let isolate = Isolate::new(IsolateConfig::default());
        let scope = isolate.scope();
        let handle = file_handle_value(&scope, 7);
        let obj = handle.as_object().unwrap();
        assert_eq!(obj.get("fd").unwrap().as_i64(), Some(7));
        for method in ["close", "read", "write", "stat", "truncate", "sync"] {
            assert!(obj.get(method).is_some_and(|v| v.is_function()));
        }
    }

    #[test]
    fn dir_close_sync_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let out = stoat_fs::execute_sync(FsOp::Opendir {
            path: dir.path().to_string_lossy().into_owned(),
        })
        .unwrap();
        let FsOutput::DirFd { fd, path } = out else {
            panic!("expected DirFd");
        };

        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let wrapper = dir_value(&scope, fd, &path);
        call_method(&mut scope, &wrapper, "closeSync", &[]).unwrap();
        // Closing again succeeds without a native descriptor to close.
        call_method(&mut scope, &wrapper, "closeSync", &[]).unwrap();
    }

    #[test]
    fn dir_read_sync_iterates_to_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only.txt"), b"x").unwrap();
        let out = stoat_fs::execute_sync(FsOp::Opendir {
            path: dir.path().to_string_lossy().into_owned(),
        })
        .unwrap();
        let FsOutput::DirFd { fd, path } = out else {
            panic!("expected DirFd");
        };

        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let wrapper = dir_value(&scope, fd, &path);
        let first = call_method(&mut scope, &wrapper, "readSync", &[]).unwrap();
        let name = first
            .as_object()
            .and_then(|obj| obj.get("name"))
            .and_then(|v| v.as_str().map(str::to_string));
        assert_eq!(name.as_deref(), Some("only.txt"));
        let done = call_method(&mut scope, &wrapper, "readSync", &[]).unwrap();
        assert!(done.is_null());
        call_method(&mut scope, &wrapper, "closeSync", &[]).unwrap();
    }

    #[test]
    fn closed_dir_read_sync_reports_ebadf() {
        let dir = tempfile::tempdir().unwrap();
        let out = stoat_fs::execute_sync(FsOp::Opendir {
            path: dir.path().to_string_lossy().into_owned(),
        })
        .unwrap();
        let FsOutput::DirFd { fd, path } = out else {
            panic!("expected DirFd");
        };

        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let wrapper = dir_value(&scope, fd, &path);
        call_method(&mut scope, &wrapper, "closeSync", &[]).unwrap();
        let err = call_method(&mut scope, &wrapper, "readSync", &[]).unwrap_err();
        assert!(err.to_string().contains("EBADF"));
    }
}
