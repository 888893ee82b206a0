//! Filesystem module surface.
//!
//! Every operation comes in a synchronous and a callback form sharing one
//! argument-parsing setup function and one payload-conversion rule. Sync
//! entry points throw on failure; async entry points deliver every
//! failure, argument errors included, through the trailing callback.

use stoat_buffer::{Buffer, StringEncoding};
use stoat_fs::{CopyOptions, FsError, FsOp, FsOutput, OpenFlags, RmOptions};
use stoat_vm_core::gc::GcRef;
use stoat_vm_core::object::JsObject;
use stoat_vm_core::{IsolateScope, Value, VmError};

use crate::buffer_transfer::{data_to_bytes, value_as_shared_buffer};
use crate::dispatch::{require_callback, run_sync, spawn_fs_op, throw};
use crate::variant::{Encoded, EntrySet, FsVariant, unexpected};
use crate::watchers;

type EntryFn = fn(&mut IsolateScope<'_>, &[Value]) -> Result<Value, VmError>;

fn register(scope: &IsolateScope<'_>, module: &JsObject, name: &str, entry: EntryFn) {
    module.set(
        name,
        Value::Function(scope.create_function(move |scope, _this, args| entry(scope, args))),
    );
}

/// Build the `fs` module object for the current realm.
pub fn build_fs_module(scope: &mut IsolateScope<'_>) -> GcRef<JsObject> {
    let module = JsObject::new();

    register(scope, &module, "accessSync", access_sync);
    register(scope, &module, "access", access_async);
    register(scope, &module, "appendFileSync", append_file_sync);
    register(scope, &module, "appendFile", append_file_async);
    register(scope, &module, "chmodSync", chmod_sync);
    register(scope, &module, "chmod", chmod_async);
    register(scope, &module, "chownSync", chown_sync);
    register(scope, &module, "chown", chown_async);
    register(scope, &module, "closeSync", close_sync);
    register(scope, &module, "close", close_async);
    register(scope, &module, "copyFileSync", copy_file_sync);
    register(scope, &module, "copyFile", copy_file_async);
    register(scope, &module, "cpSync", cp_sync);
    register(scope, &module, "cp", cp_async);
    register(scope, &module, "existsSync", exists_sync);
    register(scope, &module, "exists", exists_async);
    register(scope, &module, "fchmodSync", fchmod_sync);
    register(scope, &module, "fchmod", fchmod_async);
    register(scope, &module, "fchownSync", fchown_sync);
    register(scope, &module, "fchown", fchown_async);
    register(scope, &module, "fdatasyncSync", fdatasync_sync);
    register(scope, &module, "fdatasync", fdatasync_async);
    register(scope, &module, "fstatSync", fstat_sync);
    register(scope, &module, "fstat", fstat_async);
    register(scope, &module, "fsyncSync", fsync_sync);
    register(scope, &module, "fsync", fsync_async);
    register(scope, &module, "ftruncateSync", ftruncate_sync);
    register(scope, &module, "ftruncate", ftruncate_async);
    register(scope, &module, "futimesSync", futimes_sync);
    register(scope, &module, "futimes", futimes_async);
    register(scope, &module, "lchmodSync", lchmod_sync);
    register(scope, &module, "lchmod", lchmod_async);
    register(scope, &module, "lchownSync", lchown_sync);
    register(scope, &module, "lchown", lchown_async);
    register(scope, &module, "linkSync", link_sync);
    register(scope, &module, "link", link_async);
    register(scope, &module, "lstatSync", lstat_sync);
    register(scope, &module, "lstat", lstat_async);
    register(scope, &module, "lutimesSync", lutimes_sync);
    register(scope, &module, "lutimes", lutimes_async);
    register(scope, &module, "mkdirSync", mkdir_sync);
    register(scope, &module, "mkdir", mkdir_async);
    register(scope, &module, "mkdtempSync", mkdtemp_sync);
    register(scope, &module, "mkdtemp", mkdtemp_async);
    register(scope, &module, "openSync", open_sync);
    register(scope, &module, "open", open_async);
    register(scope, &module, "opendirSync", opendir_sync);
    register(scope, &module, "opendir", opendir_async);
    register(scope, &module, "readSync", read_sync);
    register(scope, &module, "read", read_async);
    register(scope, &module, "readdirSync", readdir_sync);
    register(scope, &module, "readdir", readdir_async);
    register(scope, &module, "readFileSync", read_file_sync);
    register(scope, &module, "readFile", read_file_async);
    register(scope, &module, "readlinkSync", readlink_sync);
    register(scope, &module, "readlink", readlink_async);
    register(scope, &module, "readvSync", readv_sync);
    register(scope, &module, "readv", readv_async);
    register(scope, &module, "realpathSync", realpath_sync);
    register(scope, &module, "realpath", realpath_async);
    register(scope, &module, "renameSync", rename_sync);
    register(scope, &module, "rename", rename_async);
    register(scope, &module, "rmSync", rm_sync);
    register(scope, &module, "rm", rm_async);
    register(scope, &module, "rmdirSync", rmdir_sync);
    register(scope, &module, "rmdir", rmdir_async);
    register(scope, &module, "statSync", stat_sync);
    register(scope, &module, "stat", stat_async);
    register(scope, &module, "symlinkSync", symlink_sync);
    register(scope, &module, "symlink", symlink_async);
    register(scope, &module, "truncateSync", truncate_sync);
    register(scope, &module, "truncate", truncate_async);
    register(scope, &module, "unlinkSync", unlink_sync);
    register(scope, &module, "unlink", unlink_async);
    register(scope, &module, "utimesSync", utimes_sync);
    register(scope, &module, "utimes", utimes_async);
    register(scope, &module, "writeSync", write_sync);
    register(scope, &module, "write", write_async);
    register(scope, &module, "writeFileSync", write_file_sync);
    register(scope, &module, "writeFile", write_file_async);
    register(scope, &module, "writevSync", writev_sync);
    register(scope, &module, "writev", writev_async);

    register(scope, &module, "watch", watchers::watch_entry);
    register(scope, &module, "watchFile", watchers::watch_file_entry);
    register(scope, &module, "unwatchFile", watchers::unwatch_file_entry);

    module.set("constants", Value::Object(build_constants(scope)));

    GcRef::new(module)
}

fn build_constants(scope: &IsolateScope<'_>) -> GcRef<JsObject> {
    let constants = scope.create_object();
    constants.set("F_OK", Value::Int32(stoat_fs::F_OK as i32));
    constants.set("R_OK", Value::Int32(stoat_fs::R_OK as i32));
    constants.set("W_OK", Value::Int32(stoat_fs::W_OK as i32));
    constants.set("X_OK", Value::Int32(stoat_fs::X_OK as i32));
    constants.set("COPYFILE_EXCL", Value::Int32(1));
    constants.set("O_RDONLY", Value::Int32(0));
    constants.set("O_WRONLY", Value::Int32(0o1));
    constants.set("O_RDWR", Value::Int32(0o2));
    constants.set("O_CREAT", Value::Int32(0o100));
    constants.set("O_EXCL", Value::Int32(0o200));
    constants.set("O_TRUNC", Value::Int32(0o1000));
    constants.set("O_APPEND", Value::Int32(0o2000));
    constants.set("S_IFMT", Value::Int32(0o170000));
    constants.set("S_IFREG", Value::Int32(0o100000));
    constants.set("S_IFDIR", Value::Int32(0o040000));
    constants.set("S_IFLNK", Value::Int32(0o120000));
    constants
}

// ---------------------------------------------------------------------------
// Argument parsing

pub(crate) fn arg_string(args: &[Value], index: usize, op: &'static str) -> Result<String, FsError> {
    args.get(index)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| FsError::invalid(op, "", format!("argument {index} must be a string")))
}

pub(crate) fn arg_fd(args: &[Value], index: usize, op: &'static str) -> Result<u64, FsError> {
    args.get(index)
        .and_then(|v| v.as_i64())
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            FsError::invalid(op, "", format!("argument {index} must be a file descriptor"))
        })
}

pub(crate) fn arg_u64(args: &[Value], index: usize, op: &'static str) -> Result<u64, FsError> {
    args.get(index)
        .and_then(|v| v.as_i64())
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            FsError::invalid(
                op,
                "",
                format!("argument {index} must be a non-negative integer"),
            )
        })
}

pub(crate) fn arg_u32(args: &[Value], index: usize, op: &'static str) -> Result<u32, FsError> {
    arg_u64(args, index, op).and_then(|n| {
        u32::try_from(n)
            .map_err(|_| FsError::invalid(op, "", format!("argument {index} out of range")))
    })
}

/// Accept a Date (milliseconds) or a number of epoch seconds.
pub(crate) fn arg_time_ms(args: &[Value], index: usize, op: &'static str) -> Result<f64, FsError> {
    match args.get(index) {
        Some(Value::Date(ms)) => Ok(*ms),
        Some(v) => v
            .as_number()
            .map(|secs| secs * 1000.0)
            .ok_or_else(|| FsError::invalid(op, "", format!("argument {index} must be a time"))),
        None => Err(FsError::invalid(
            op,
            "",
            format!("argument {index} must be a time"),
        )),
    }
}

fn options_object(value: Option<&Value>) -> Option<GcRef<JsObject>> {
    value.and_then(|v| v.as_object()).cloned()
}

pub(crate) fn opt_bool(options: Option<&Value>, key: &str, default: bool) -> bool {
    options_object(options)
        .and_then(|obj| obj.get(key))
        .map(|v| v.is_truthy())
        .unwrap_or(default)
}

fn opt_u32(options: Option<&Value>, key: &str) -> Option<u32> {
    options_object(options)
        .and_then(|obj| obj.get(key))
        .and_then(|v| v.as_i64())
        .and_then(|n| u32::try_from(n).ok())
}

fn opt_u64(options: Option<&Value>, key: &str) -> Option<u64> {
    options_object(options)
        .and_then(|obj| obj.get(key))
        .and_then(|v| v.as_i64())
        .and_then(|n| u64::try_from(n).ok())
}

/// The literal encoding name, from a bare string or `{ encoding }`.
fn encoding_name(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.as_str().to_string()),
        Some(Value::Object(obj)) => match obj.get("encoding") {
            Some(Value::String(s)) => Some(s.as_str().to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// Encoding from a bare string or an `{ encoding }` options object.
/// `"buffer"`, `null`, and absence all mean raw bytes.
pub(crate) fn parse_encoding(
    value: Option<&Value>,
    op: &'static str,
) -> Result<Option<StringEncoding>, FsError> {
    let name = match value {
        None | Some(Value::Undefined) | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.as_str().to_string(),
        Some(Value::Object(obj)) => match obj.get("encoding") {
            Some(Value::String(s)) => s.as_str().to_string(),
            _ => return Ok(None),
        },
        Some(other) => {
            return Err(FsError::invalid(
                op,
                "",
                format!("invalid options argument of type {}", other.type_name()),
            ));
        }
    };
    if name == "buffer" {
        return Ok(None);
    }
    name.parse::<StringEncoding>()
        .map(Some)
        .map_err(|e| FsError::invalid(op, "", e.to_string()))
}

/// Flag string from a bare string or `{ flag }` options, defaulting per op.
fn parse_flags(
    value: Option<&Value>,
    default: &'static str,
    op: &'static str,
) -> Result<OpenFlags, FsError> {
    let flag = match value {
        Some(Value::String(s)) => s.as_str().to_string(),
        Some(v) if v.as_i64().is_some() => {
            return Ok(OpenFlags::from_bits(v.as_i64().unwrap_or(0)));
        }
        Some(Value::Object(obj)) => match obj.get("flag").or_else(|| obj.get("flags")) {
            Some(Value::String(s)) => s.as_str().to_string(),
            _ => default.to_string(),
        },
        _ => default.to_string(),
    };
    OpenFlags::from_flag(&flag)
        .ok_or_else(|| FsError::invalid(op, "", format!("invalid flag string: {flag:?}")))
}

/// Position argument: `null`, `undefined`, and `-1` mean "current".
fn parse_position(value: Option<&Value>) -> Option<u64> {
    value
        .and_then(|v| v.as_i64())
        .and_then(|n| u64::try_from(n).ok())
}

pub(crate) fn encoded(encoding: Option<StringEncoding>, bytes: Vec<u8>) -> FsVariant {
    match encoding {
        Some(enc) => FsVariant::Encoded(Encoded::Text(enc.encode(&bytes))),
        None => FsVariant::Encoded(Encoded::Data(Buffer::from_vec(bytes))),
    }
}

// ---------------------------------------------------------------------------
// Setup builders shared by sync and async forms

fn setup_read_file(
    args: &[Value],
) -> Result<(FsOp, Option<StringEncoding>), FsError> {
    let path = arg_string(args, 0, "readFile")?;
    let encoding = parse_encoding(args.get(1), "readFile")?;
    Ok((FsOp::ReadFile { path }, encoding))
}

fn setup_write_file(args: &[Value], append: bool) -> Result<FsOp, FsError> {
    let op_name: &'static str = if append { "appendFile" } else { "writeFile" };
    let path = arg_string(args, 0, op_name)?;
    let data = args
        .get(1)
        .ok_or_else(|| FsError::invalid(op_name, &path, "missing data argument"))?;
    let encoding = parse_encoding(args.get(2), op_name)?;
    let bytes = match data.as_str() {
        Some(s) => encoding
            .unwrap_or_default()
            .decode(s)
            .map_err(|e| FsError::invalid(op_name, &path, e.to_string()))?,
        None => data_to_bytes(data).map_err(|e| FsError::invalid(op_name, &path, e.to_string()))?,
    };
    let append = append
        || options_object(args.get(2))
            .and_then(|obj| obj.get("flag"))
            .and_then(|v| v.as_str().map(|s| s.contains('a')))
            .unwrap_or(false);
    let mode = opt_u32(args.get(2), "mode");
    Ok(FsOp::WriteFile {
        path,
        bytes,
        append,
        mode,
    })
}

fn setup_stat(args: &[Value], follow: bool) -> Result<(FsOp, bool), FsError> {
    let op_name: &'static str = if follow { "stat" } else { "lstat" };
    let path = arg_string(args, 0, op_name)?;
    let bigint = opt_bool(args.get(1), "bigint", false);
    Ok((FsOp::Stat { path, follow }, bigint))
}

fn setup_readdir(args: &[Value]) -> Result<(FsOp, bool), FsError> {
    let path = arg_string(args, 0, "readdir")?;
    let with_file_types = opt_bool(args.get(1), "withFileTypes", false);
    // Validate the encoding argument; "buffer" switches name delivery to
    // raw bytes while anything else yields strings.
    let buffer_names = encoding_name(args.get(1)).as_deref() == Some("buffer");
    parse_encoding(args.get(1), "readdir")?;
    Ok((
        FsOp::Readdir {
            path,
            with_file_types,
        },
        buffer_names,
    ))
}

fn convert_readdir(output: FsOutput, buffer_names: bool) -> Result<FsVariant, FsError> {
    match output {
        FsOutput::Names(names) if buffer_names => {
            let names = names
                .into_iter()
                .map(|name| Buffer::from_vec(name.into_bytes()))
                .collect();
            Ok(FsVariant::Entries(EntrySet::Buffers(names)))
        }
        FsOutput::Names(names) => Ok(FsVariant::Entries(EntrySet::Names(names))),
        FsOutput::Entries(entries) => Ok(FsVariant::Entries(EntrySet::Dirents(entries))),
        other => Err(unexpected("readdir", &other)),
    }
}

fn setup_mkdir(args: &[Value]) -> Result<FsOp, FsError> {
    let path = arg_string(args, 0, "mkdir")?;
    Ok(FsOp::Mkdir {
        path,
        recursive: opt_bool(args.get(1), "recursive", false),
        mode: opt_u32(args.get(1), "mode").unwrap_or(0o777),
    })
}

fn setup_rm(args: &[Value]) -> Result<FsOp, FsError> {
    let path = arg_string(args, 0, "rm")?;
    let defaults = RmOptions::default();
    Ok(FsOp::Rm {
        path,
        options: RmOptions {
            recursive: opt_bool(args.get(1), "recursive", false),
            force: opt_bool(args.get(1), "force", false),
            max_retries: opt_u32(args.get(1), "maxRetries").unwrap_or(defaults.max_retries),
            retry_delay_ms: opt_u64(args.get(1), "retryDelay").unwrap_or(defaults.retry_delay_ms),
        },
    })
}

fn setup_copy_file(args: &[Value]) -> Result<FsOp, FsError> {
    let src = arg_string(args, 0, "copyFile")?;
    let dst = arg_string(args, 1, "copyFile")?;
    let mode = args.get(2).and_then(|v| v.as_i64()).unwrap_or(0);
    Ok(FsOp::CopyFile {
        src,
        dst,
        exclusive: mode & 1 != 0,
    })
}

fn setup_cp(args: &[Value]) -> Result<FsOp, FsError> {
    let src = arg_string(args, 0, "cp")?;
    let dst = arg_string(args, 1, "cp")?;
    let defaults = CopyOptions::default();
    Ok(FsOp::Cp {
        src,
        dst,
        options: CopyOptions {
            recursive: opt_bool(args.get(2), "recursive", false),
            force: opt_bool(args.get(2), "force", true),
            error_on_exist: opt_bool(args.get(2), "errorOnExist", false),
            dereference: opt_bool(args.get(2), "dereference", false),
            preserve_timestamps: opt_bool(args.get(2), "preserveTimestamps", false),
            exclusive: defaults.exclusive,
        },
    })
}

fn setup_open(args: &[Value]) -> Result<FsOp, FsError> {
    let path = arg_string(args, 0, "open")?;
    let flags = parse_flags(args.get(1), "r", "open")?;
    let mode = args
        .get(2)
        .and_then(|v| v.as_i64())
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0o666);
    Ok(FsOp::Open { path, flags, mode })
}

pub(crate) struct ReadArgs {
    pub(crate) fd: u64,
    pub(crate) target: Buffer,
    pub(crate) offset: usize,
    pub(crate) length: usize,
    pub(crate) position: Option<u64>,
}

pub(crate) fn setup_read(args: &[Value]) -> Result<ReadArgs, FsError> {
    let fd = arg_fd(args, 0, "read")?;
    let target = args
        .get(1)
        .and_then(value_as_shared_buffer)
        .ok_or_else(|| FsError::invalid("read", "", "argument 1 must be a Buffer"))?;
    let offset = args
        .get(2)
        .and_then(|v| v.as_i64())
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    let length = args
        .get(3)
        .and_then(|v| v.as_i64())
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_else(|| target.len().saturating_sub(offset));
    if offset.checked_add(length).is_none_or(|end| end > target.len()) {
        return Err(FsError::invalid(
            "read",
            "",
            "offset and length are out of buffer bounds",
        ));
    }
    Ok(ReadArgs {
        fd,
        target,
        offset,
        length,
        position: parse_position(args.get(4)),
    })
}

/// Copy read bytes into the shared target and report the count. Runs on
/// the worker; the target allocation is shared by refcount, so writes are
/// safe without the isolate lock.
pub(crate) fn convert_read(
    target: Buffer,
    offset: usize,
) -> impl FnOnce(FsOutput) -> Result<FsVariant, FsError> + Send {
    move |output| match output {
        FsOutput::Bytes(bytes) => {
            target.with_bytes_mut(|dst| {
                dst[offset..offset + bytes.len()].copy_from_slice(&bytes);
            });
            Ok(FsVariant::Size(bytes.len()))
        }
        other => Err(unexpected("read", &other)),
    }
}

pub(crate) fn setup_write(args: &[Value]) -> Result<FsOp, FsError> {
    let fd = arg_fd(args, 0, "write")?;
    let data = args
        .get(1)
        .ok_or_else(|| FsError::invalid("write", "", "missing data argument"))?;
    if let Some(s) = data.as_str() {
        // write(fd, string[, position[, encoding]])
        let position = parse_position(args.get(2));
        let encoding = parse_encoding(args.get(3), "write")?.unwrap_or_default();
        let bytes = encoding
            .decode(s)
            .map_err(|e| FsError::invalid("write", "", e.to_string()))?;
        return Ok(FsOp::Write {
            fd,
            bytes,
            position,
        });
    }
    // write(fd, buffer[, offset[, length[, position]]])
    let bytes = data_to_bytes(data).map_err(|e| FsError::invalid("write", "", e.to_string()))?;
    let offset = args
        .get(2)
        .and_then(|v| v.as_i64())
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    let length = args
        .get(3)
        .and_then(|v| v.as_i64())
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_else(|| bytes.len().saturating_sub(offset));
    if offset.checked_add(length).is_none_or(|end| end > bytes.len()) {
        return Err(FsError::invalid(
            "write",
            "",
            "offset and length are out of buffer bounds",
        ));
    }
    Ok(FsOp::Write {
        fd,
        bytes: bytes[offset..offset + length].to_vec(),
        position: parse_position(args.get(4)),
    })
}

fn setup_readv(args: &[Value]) -> Result<(FsOp, Vec<Buffer>), FsError> {
    let fd = arg_fd(args, 0, "readv")?;
    let targets = buffer_array(args.get(1), "readv")?;
    let lengths = targets.iter().map(Buffer::len).collect();
    Ok((
        FsOp::Readv {
            fd,
            lengths,
            position: parse_position(args.get(2)),
        },
        targets,
    ))
}

fn convert_readv(targets: Vec<Buffer>) -> impl FnOnce(FsOutput) -> Result<FsVariant, FsError> + Send {
    move |output| match output {
        FsOutput::Chunks(chunks) => {
            let mut total = 0;
            for (chunk, target) in chunks.iter().zip(&targets) {
                target.with_bytes_mut(|dst| dst[..chunk.len()].copy_from_slice(chunk));
                total += chunk.len();
            }
            Ok(FsVariant::Size(total))
        }
        other => Err(unexpected("readv", &other)),
    }
}

fn setup_writev(args: &[Value]) -> Result<FsOp, FsError> {
    let fd = arg_fd(args, 0, "writev")?;
    let chunks = buffer_array(args.get(1), "writev")?
        .iter()
        .map(Buffer::to_vec)
        .collect();
    Ok(FsOp::Writev {
        fd,
        chunks,
        position: parse_position(args.get(2)),
    })
}

fn buffer_array(value: Option<&Value>, op: &'static str) -> Result<Vec<Buffer>, FsError> {
    let arr = value
        .and_then(|v| v.as_object())
        .filter(|obj| obj.is_array())
        .ok_or_else(|| FsError::invalid(op, "", "argument 1 must be an array of Buffers"))?;
    arr.elements()
        .iter()
        .map(|element| {
            value_as_shared_buffer(element)
                .ok_or_else(|| FsError::invalid(op, "", "array elements must be Buffers"))
        })
        .collect()
}

fn setup_symlink(args: &[Value]) -> Result<FsOp, FsError> {
    let target = arg_string(args, 0, "symlink")?;
    let link = arg_string(args, 1, "symlink")?;
    // Optional type argument (arg 2) is accepted and ignored; the target
    // kind is derived by the platform.
    Ok(FsOp::Symlink { target, link })
}

fn setup_utimes(args: &[Value], follow: bool) -> Result<FsOp, FsError> {
    let op_name: &'static str = if follow { "utimes" } else { "lutimes" };
    Ok(FsOp::Utimes {
        path: arg_string(args, 0, op_name)?,
        atime_ms: arg_time_ms(args, 1, op_name)?,
        mtime_ms: arg_time_ms(args, 2, op_name)?,
        follow,
    })
}

// ---------------------------------------------------------------------------
// Shared payload conversions

pub(crate) fn expect_unit(op: &'static str) -> impl FnOnce(FsOutput) -> Result<FsVariant, FsError> + Send {
    move |output| match output {
        FsOutput::Unit => Ok(FsVariant::Void),
        other => Err(unexpected(op, &other)),
    }
}

fn expect_path(
    op: &'static str,
    encoding: Option<StringEncoding>,
) -> impl FnOnce(FsOutput) -> Result<FsVariant, FsError> + Send {
    move |output| match output {
        FsOutput::Path(path) => match encoding {
            None | Some(StringEncoding::Utf8) => Ok(FsVariant::Text(path)),
            Some(enc) => Ok(FsVariant::Encoded(Encoded::Text(
                enc.encode(path.as_bytes()),
            ))),
        },
        other => Err(unexpected(op, &other)),
    }
}

pub(crate) fn expect_stat(
    op: &'static str,
    bigint: bool,
) -> impl FnOnce(FsOutput) -> Result<FsVariant, FsError> + Send {
    move |output| match output {
        FsOutput::Stat(stat) => Ok(FsVariant::Stat { stat, bigint }),
        other => Err(unexpected(op, &other)),
    }
}

pub(crate) fn expect_written(op: &'static str) -> impl FnOnce(FsOutput) -> Result<FsVariant, FsError> + Send {
    move |output| match output {
        FsOutput::Written(n) => Ok(FsVariant::Size(n)),
        other => Err(unexpected(op, &other)),
    }
}

// ---------------------------------------------------------------------------
// Entry points
//
// The sync form parses, executes on the calling thread, and throws on
// failure; the async form parses, strips the trailing callback, and hands
// the request to the dispatcher.

fn async_tail<'v>(args: &'v [Value], op: &'static str) -> Result<(&'v [Value], Value), VmError> {
    let callback = require_callback(op, args.last())?;
    Ok((&args[..args.len() - 1], callback))
}

fn read_file_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (op, encoding) = setup_read_file(args).map_err(throw)?;
    run_sync(scope, Ok(op), |output| match output {
        FsOutput::Bytes(bytes) => Ok(encoded(encoding, bytes)),
        other => Err(unexpected("readFile", &other)),
    })
}

fn read_file_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "readFile")?;
    match setup_read_file(args) {
        Ok((op, encoding)) => spawn_fs_op(scope, "readFile", &callback, Ok(op), move |output| {
            match output {
                FsOutput::Bytes(bytes) => Ok(encoded(encoding, bytes)),
                other => Err(unexpected("readFile", &other)),
            }
        }),
        Err(err) => spawn_fs_op(scope, "readFile", &callback, Err(err), |_| Ok(FsVariant::Void)),
    }
}

fn write_file_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_write_file(args, false), expect_unit("writeFile"))
}

fn write_file_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "writeFile")?;
    spawn_fs_op(
        scope,
        "writeFile",
        &callback,
        setup_write_file(args, false),
        expect_unit("writeFile"),
    )
}

fn append_file_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_write_file(args, true), expect_unit("appendFile"))
}

fn append_file_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "appendFile")?;
    spawn_fs_op(
        scope,
        "appendFile",
        &callback,
        setup_write_file(args, true),
        expect_unit("appendFile"),
    )
}

fn stat_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (op, bigint) = setup_stat(args, true).map_err(throw)?;
    let throw_if_no_entry = opt_bool(args.get(1), "throwIfNoEntry", true);
    match stoat_fs::execute_sync(op) {
        Ok(output) => {
            let variant = expect_stat("stat", bigint)(output).map_err(throw)?;
            crate::convert::variant_to_value(scope, variant)
        }
        Err(err) if !throw_if_no_entry && err.not_found() => Ok(Value::Undefined),
        Err(err) => Err(throw(err)),
    }
}

fn stat_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "stat")?;
    match setup_stat(args, true) {
        Ok((op, bigint)) => spawn_fs_op(scope, "stat", &callback, Ok(op), expect_stat("stat", bigint)),
        Err(err) => spawn_fs_op(scope, "stat", &callback, Err(err), |_| Ok(FsVariant::Void)),
    }
}

fn lstat_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (op, bigint) = setup_stat(args, false).map_err(throw)?;
    let throw_if_no_entry = opt_bool(args.get(1), "throwIfNoEntry", true);
    match stoat_fs::execute_sync(op) {
        Ok(output) => {
            let variant = expect_stat("lstat", bigint)(output).map_err(throw)?;
            crate::convert::variant_to_value(scope, variant)
        }
        Err(err) if !throw_if_no_entry && err.not_found() => Ok(Value::Undefined),
        Err(err) => Err(throw(err)),
    }
}

fn lstat_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "lstat")?;
    match setup_stat(args, false) {
        Ok((op, bigint)) => {
            spawn_fs_op(scope, "lstat", &callback, Ok(op), expect_stat("lstat", bigint))
        }
        Err(err) => spawn_fs_op(scope, "lstat", &callback, Err(err), |_| Ok(FsVariant::Void)),
    }
}

fn fstat_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let fd = arg_fd(args, 0, "fstat").map_err(throw)?;
    let bigint = opt_bool(args.get(1), "bigint", false);
    run_sync(scope, Ok(FsOp::Fstat { fd }), expect_stat("fstat", bigint))
}

fn fstat_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "fstat")?;
    let bigint = opt_bool(args.get(1), "bigint", false);
    spawn_fs_op(
        scope,
        "fstat",
        &callback,
        arg_fd(args, 0, "fstat").map(|fd| FsOp::Fstat { fd }),
        expect_stat("fstat", bigint),
    )
}

fn readdir_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (op, buffer_names) = setup_readdir(args).map_err(throw)?;
    run_sync(scope, Ok(op), move |output| {
        convert_readdir(output, buffer_names)
    })
}

fn readdir_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "readdir")?;
    match setup_readdir(args) {
        Ok((op, buffer_names)) => {
            spawn_fs_op(scope, "readdir", &callback, Ok(op), move |output| {
                convert_readdir(output, buffer_names)
            })
        }
        Err(err) => spawn_fs_op(scope, "readdir", &callback, Err(err), |_| Ok(FsVariant::Void)),
    }
}

fn opendir_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "opendir").map_err(throw)?;
    run_sync(scope, Ok(FsOp::Opendir { path }), convert_opendir)
}

fn opendir_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "opendir")?;
    spawn_fs_op(
        scope,
        "opendir",
        &callback,
        arg_string(args, 0, "opendir").map(|path| FsOp::Opendir { path }),
        convert_opendir,
    )
}

fn convert_opendir(output: FsOutput) -> Result<FsVariant, FsError> {
    match output {
        FsOutput::DirFd { fd, path } => Ok(FsVariant::Dir { fd, path }),
        other => Err(unexpected("opendir", &other)),
    }
}

fn mkdir_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_mkdir(args), expect_unit("mkdir"))
}

fn mkdir_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "mkdir")?;
    spawn_fs_op(scope, "mkdir", &callback, setup_mkdir(args), expect_unit("mkdir"))
}

fn mkdtemp_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let prefix = arg_string(args, 0, "mkdtemp").map_err(throw)?;
    let encoding = parse_encoding(args.get(1), "mkdtemp").map_err(throw)?;
    run_sync(
        scope,
        Ok(FsOp::Mkdtemp { prefix }),
        expect_path("mkdtemp", encoding),
    )
}

fn mkdtemp_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "mkdtemp")?;
    let encoding = parse_encoding(args.get(1), "mkdtemp").unwrap_or(None);
    spawn_fs_op(
        scope,
        "mkdtemp",
        &callback,
        arg_string(args, 0, "mkdtemp").map(|prefix| FsOp::Mkdtemp { prefix }),
        expect_path("mkdtemp", encoding),
    )
}

fn rm_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_rm(args), expect_unit("rm"))
}

fn rm_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "rm")?;
    spawn_fs_op(scope, "rm", &callback, setup_rm(args), expect_unit("rm"))
}

fn rmdir_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "rmdir").map_err(throw)?;
    let recursive = opt_bool(args.get(1), "recursive", false);
    run_sync(scope, Ok(FsOp::Rmdir { path, recursive }), expect_unit("rmdir"))
}

fn rmdir_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "rmdir")?;
    let recursive = opt_bool(args.get(1), "recursive", false);
    spawn_fs_op(
        scope,
        "rmdir",
        &callback,
        arg_string(args, 0, "rmdir").map(|path| FsOp::Rmdir { path, recursive }),
        expect_unit("rmdir"),
    )
}

fn unlink_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "unlink").map_err(throw)?;
    run_sync(scope, Ok(FsOp::Unlink { path }), expect_unit("unlink"))
}

fn unlink_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "unlink")?;
    spawn_fs_op(
        scope,
        "unlink",
        &callback,
        arg_string(args, 0, "unlink").map(|path| FsOp::Unlink { path }),
        expect_unit("unlink"),
    )
}

fn copy_file_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_copy_file(args), expect_unit("copyFile"))
}

fn copy_file_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "copyFile")?;
    spawn_fs_op(
        scope,
        "copyFile",
        &callback,
        setup_copy_file(args),
        expect_unit("copyFile"),
    )
}

fn cp_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_cp(args), expect_unit("cp"))
}

fn cp_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "cp")?;
    spawn_fs_op(scope, "cp", &callback, setup_cp(args), expect_unit("cp"))
}

fn rename_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let from = arg_string(args, 0, "rename").map_err(throw)?;
    let to = arg_string(args, 1, "rename").map_err(throw)?;
    run_sync(scope, Ok(FsOp::Rename { from, to }), expect_unit("rename"))
}

fn rename_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "rename")?;
    let setup = arg_string(args, 0, "rename")
        .and_then(|from| arg_string(args, 1, "rename").map(|to| FsOp::Rename { from, to }));
    spawn_fs_op(scope, "rename", &callback, setup, expect_unit("rename"))
}

fn open_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_open(args), |output| match output {
        FsOutput::FileFd(fd) => Ok(FsVariant::Size(fd as usize)),
        other => Err(unexpected("open", &other)),
    })
}

fn open_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "open")?;
    spawn_fs_op(scope, "open", &callback, setup_open(args), |output| {
        match output {
            FsOutput::FileFd(fd) => Ok(FsVariant::Handle(fd)),
            other => Err(unexpected("open", &other)),
        }
    })
}

fn close_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let fd = arg_fd(args, 0, "close").map_err(throw)?;
    run_sync(scope, Ok(FsOp::Close { fd }), expect_unit("close"))
}

fn close_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "close")?;
    spawn_fs_op(
        scope,
        "close",
        &callback,
        arg_fd(args, 0, "close").map(|fd| FsOp::Close { fd }),
        expect_unit("close"),
    )
}

fn read_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let parsed = setup_read(args).map_err(throw)?;
    let op = FsOp::Read {
        fd: parsed.fd,
        length: parsed.length,
        position: parsed.position,
    };
    run_sync(scope, Ok(op), convert_read(parsed.target, parsed.offset))
}

fn read_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "read")?;
    match setup_read(args) {
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
                convert_read(parsed.target, parsed.offset),
            )
        }
        Err(err) => spawn_fs_op(scope, "read", &callback, Err(err), |_| Ok(FsVariant::Void)),
    }
}

fn write_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_write(args), expect_written("write"))
}

fn write_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "write")?;
    spawn_fs_op(scope, "write", &callback, setup_write(args), expect_written("write"))
}

fn readv_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (op, targets) = setup_readv(args).map_err(throw)?;
    run_sync(scope, Ok(op), convert_readv(targets))
}

fn readv_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "readv")?;
    match setup_readv(args) {
        Ok((op, targets)) => spawn_fs_op(scope, "readv", &callback, Ok(op), convert_readv(targets)),
        Err(err) => spawn_fs_op(scope, "readv", &callback, Err(err), |_| Ok(FsVariant::Void)),
    }
}

fn writev_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_writev(args), expect_written("writev"))
}

fn writev_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "writev")?;
    spawn_fs_op(
        scope,
        "writev",
        &callback,
        setup_writev(args),
        expect_written("writev"),
    )
}

fn ftruncate_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let fd = arg_fd(args, 0, "ftruncate").map_err(throw)?;
    let len = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0).max(0) as u64;
    run_sync(scope, Ok(FsOp::Ftruncate { fd, len }), expect_unit("ftruncate"))
}

fn ftruncate_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "ftruncate")?;
    let len = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0).max(0) as u64;
    spawn_fs_op(
        scope,
        "ftruncate",
        &callback,
        arg_fd(args, 0, "ftruncate").map(|fd| FsOp::Ftruncate { fd, len }),
        expect_unit("ftruncate"),
    )
}

fn truncate_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "truncate").map_err(throw)?;
    let len = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0).max(0) as u64;
    run_sync(scope, Ok(FsOp::Truncate { path, len }), expect_unit("truncate"))
}

fn truncate_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "truncate")?;
    let len = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0).max(0) as u64;
    spawn_fs_op(
        scope,
        "truncate",
        &callback,
        arg_string(args, 0, "truncate").map(|path| FsOp::Truncate { path, len }),
        expect_unit("truncate"),
    )
}

fn fsync_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let fd = arg_fd(args, 0, "fsync").map_err(throw)?;
    run_sync(scope, Ok(FsOp::Fsync { fd }), expect_unit("fsync"))
}

fn fsync_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "fsync")?;
    spawn_fs_op(
        scope,
        "fsync",
        &callback,
        arg_fd(args, 0, "fsync").map(|fd| FsOp::Fsync { fd }),
        expect_unit("fsync"),
    )
}

fn fdatasync_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let fd = arg_fd(args, 0, "fdatasync").map_err(throw)?;
    run_sync(scope, Ok(FsOp::Fdatasync { fd }), expect_unit("fdatasync"))
}

fn fdatasync_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "fdatasync")?;
    spawn_fs_op(
        scope,
        "fdatasync",
        &callback,
        arg_fd(args, 0, "fdatasync").map(|fd| FsOp::Fdatasync { fd }),
        expect_unit("fdatasync"),
    )
}

fn fchmod_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let setup = arg_fd(args, 0, "fchmod")
        .and_then(|fd| arg_u32(args, 1, "fchmod").map(|mode| FsOp::Fchmod { fd, mode }));
    run_sync(scope, setup, expect_unit("fchmod"))
}

fn fchmod_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "fchmod")?;
    let setup = arg_fd(args, 0, "fchmod")
        .and_then(|fd| arg_u32(args, 1, "fchmod").map(|mode| FsOp::Fchmod { fd, mode }));
    spawn_fs_op(scope, "fchmod", &callback, setup, expect_unit("fchmod"))
}

fn fchown_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let setup = arg_fd(args, 0, "fchown").and_then(|fd| {
        arg_u32(args, 1, "fchown")
            .and_then(|uid| arg_u32(args, 2, "fchown").map(|gid| FsOp::Fchown { fd, uid, gid }))
    });
    run_sync(scope, setup, expect_unit("fchown"))
}

fn fchown_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "fchown")?;
    let setup = arg_fd(args, 0, "fchown").and_then(|fd| {
        arg_u32(args, 1, "fchown")
            .and_then(|uid| arg_u32(args, 2, "fchown").map(|gid| FsOp::Fchown { fd, uid, gid }))
    });
    spawn_fs_op(scope, "fchown", &callback, setup, expect_unit("fchown"))
}

fn futimes_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let setup = arg_fd(args, 0, "futimes").and_then(|fd| {
        arg_time_ms(args, 1, "futimes").and_then(|atime_ms| {
            arg_time_ms(args, 2, "futimes").map(|mtime_ms| FsOp::Futimes {
                fd,
                atime_ms,
                mtime_ms,
            })
        })
    });
    run_sync(scope, setup, expect_unit("futimes"))
}

fn futimes_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "futimes")?;
    let setup = arg_fd(args, 0, "futimes").and_then(|fd| {
        arg_time_ms(args, 1, "futimes").and_then(|atime_ms| {
            arg_time_ms(args, 2, "futimes").map(|mtime_ms| FsOp::Futimes {
                fd,
                atime_ms,
                mtime_ms,
            })
        })
    });
    spawn_fs_op(scope, "futimes", &callback, setup, expect_unit("futimes"))
}

fn realpath_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "realpath").map_err(throw)?;
    let encoding = parse_encoding(args.get(1), "realpath").map_err(throw)?;
    run_sync(
        scope,
        Ok(FsOp::Realpath { path }),
        expect_path("realpath", encoding),
    )
}

fn realpath_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "realpath")?;
    let encoding = parse_encoding(args.get(1), "realpath").unwrap_or(None);
    spawn_fs_op(
        scope,
        "realpath",
        &callback,
        arg_string(args, 0, "realpath").map(|path| FsOp::Realpath { path }),
        expect_path("realpath", encoding),
    )
}

fn access_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "access").map_err(throw)?;
    let mode = args
        .get(1)
        .and_then(|v| v.as_i64())
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(stoat_fs::F_OK);
    run_sync(scope, Ok(FsOp::Access { path, mode }), expect_unit("access"))
}

fn access_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "access")?;
    let mode = args
        .get(1)
        .and_then(|v| v.as_i64())
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(stoat_fs::F_OK);
    spawn_fs_op(
        scope,
        "access",
        &callback,
        arg_string(args, 0, "access").map(|path| FsOp::Access { path, mode }),
        expect_unit("access"),
    )
}

fn exists_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    // Never throws: a non-string argument simply does not exist.
    let Some(path) = args.get(0).and_then(|v| v.as_str()).map(str::to_string) else {
        return Ok(Value::Bool(false));
    };
    run_sync(scope, Ok(FsOp::Exists { path }), |output| match output {
        FsOutput::Bool(b) => Ok(FsVariant::Bool(b)),
        other => Err(unexpected("exists", &other)),
    })
}

fn exists_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "exists")?;
    let path = args
        .get(0)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_default();
    spawn_fs_op(
        scope,
        "exists",
        &callback,
        Ok(FsOp::Exists { path }),
        |output| match output {
            FsOutput::Bool(b) => Ok(FsVariant::Bool(b)),
            other => Err(unexpected("exists", &other)),
        },
    )
}

fn chmod_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let setup = arg_string(args, 0, "chmod")
        .and_then(|path| arg_u32(args, 1, "chmod").map(|mode| FsOp::Chmod { path, mode }));
    run_sync(scope, setup, expect_unit("chmod"))
}

fn chmod_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "chmod")?;
    let setup = arg_string(args, 0, "chmod")
        .and_then(|path| arg_u32(args, 1, "chmod").map(|mode| FsOp::Chmod { path, mode }));
    spawn_fs_op(scope, "chmod", &callback, setup, expect_unit("chmod"))
}

fn setup_chown(args: &[Value], follow: bool) -> Result<FsOp, FsError> {
    let op_name: &'static str = if follow { "chown" } else { "lchown" };
    Ok(FsOp::Chown {
        path: arg_string(args, 0, op_name)?,
        uid: arg_u32(args, 1, op_name)?,
        gid: arg_u32(args, 2, op_name)?,
        follow,
    })
}

fn chown_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_chown(args, true), expect_unit("chown"))
}

fn chown_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "chown")?;
    spawn_fs_op(scope, "chown", &callback, setup_chown(args, true), expect_unit("chown"))
}

// Symlink-mode changes have no portable counterpart; both forms report
// ENOSYS with the normal delivery discipline.
fn lchmod_unsupported(args: &[Value]) -> FsError {
    let path = args
        .first()
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    FsError::unsupported("lchmod", path, "lchmod is not available on this platform")
}

fn lchmod_sync(_scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    Err(throw(lchmod_unsupported(args)))
}

fn lchmod_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "lchmod")?;
    spawn_fs_op(
        scope,
        "lchmod",
        &callback,
        Err(lchmod_unsupported(args)),
        |_| Ok(FsVariant::Void),
    )
}

fn lchown_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_chown(args, false), expect_unit("lchown"))
}

fn lchown_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "lchown")?;
    spawn_fs_op(
        scope,
        "lchown",
        &callback,
        setup_chown(args, false),
        expect_unit("lchown"),
    )
}

fn utimes_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_utimes(args, true), expect_unit("utimes"))
}

fn utimes_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "utimes")?;
    spawn_fs_op(scope, "utimes", &callback, setup_utimes(args, true), expect_unit("utimes"))
}

fn lutimes_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_utimes(args, false), expect_unit("lutimes"))
}

fn lutimes_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "lutimes")?;
    spawn_fs_op(
        scope,
        "lutimes",
        &callback,
        setup_utimes(args, false),
        expect_unit("lutimes"),
    )
}

fn link_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let setup = arg_string(args, 0, "link")
        .and_then(|existing| arg_string(args, 1, "link").map(|link| FsOp::Link { existing, link }));
    run_sync(scope, setup, expect_unit("link"))
}

fn link_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "link")?;
    let setup = arg_string(args, 0, "link")
        .and_then(|existing| arg_string(args, 1, "link").map(|link| FsOp::Link { existing, link }));
    spawn_fs_op(scope, "link", &callback, setup, expect_unit("link"))
}

fn symlink_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    run_sync(scope, setup_symlink(args), expect_unit("symlink"))
}

fn symlink_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "symlink")?;
    spawn_fs_op(scope, "symlink", &callback, setup_symlink(args), expect_unit("symlink"))
}

fn readlink_sync(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "readlink").map_err(throw)?;
    let encoding = parse_encoding(args.get(1), "readlink").map_err(throw)?;
    run_sync(
        scope,
        Ok(FsOp::Readlink { path }),
        expect_path("readlink", encoding),
    )
}

fn readlink_async(scope: &mut IsolateScope<'_>, args: &[Value]) -> Result<Value, VmError> {
    let (args, callback) = async_tail(args, "readlink")?;
    let encoding = parse_encoding(args.get(1), "readlink").unwrap_or(None);
    spawn_fs_op(
        scope,
        "readlink",
        &callback,
        arg_string(args, 0, "readlink").map(|path| FsOp::Readlink { path }),
        expect_path("readlink", encoding),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_vm_core::isolate::{Isolate, IsolateConfig};

    #[test]
    fn module_exposes_sync_and_async_pairs() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let module = build_fs_module(&mut scope);
        for name in [
            "readFile",
            "readFileSync",
            "writeFile",
            "writeFileSync",
            "stat",
            "statSync",
            "open",
            "openSync",
            "watch",
            "watchFile",
            "unwatchFile",
            "constants",
        ] {
            assert!(module.has(name), "missing export: {name}");
        }
    }

    #[test]
    fn constants_include_access_modes() {
        let isolate = Isolate::new(IsolateConfig::default());
        let scope = isolate.scope();
        let constants = build_constants(&scope);
        assert_eq!(constants.get("R_OK").unwrap().as_number().unwrap(), 4.0);
        assert_eq!(constants.get("W_OK").unwrap().as_number().unwrap(), 2.0);
    }

    #[test]
    fn parse_encoding_accepts_string_and_options() {
        assert_eq!(
            parse_encoding(Some(&Value::from("hex")), "readFile").unwrap(),
            Some(StringEncoding::Hex)
        );
        let options = JsObject::new();
        options.set("encoding", Value::from("base64"));
        assert_eq!(
            parse_encoding(Some(&Value::Object(GcRef::new(options))), "readFile").unwrap(),
            Some(StringEncoding::Base64)
        );
        assert_eq!(
            parse_encoding(Some(&Value::from("buffer")), "readFile").unwrap(),
            None
        );
        assert!(parse_encoding(Some(&Value::from("koi8")), "readFile").is_err());
    }

    #[test]
    fn sync_read_file_decodes_with_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hi").unwrap();

        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let out = read_file_sync(
            &mut scope,
            &[Value::from(path.to_string_lossy().into_owned()), Value::from("utf8")],
        )
        .unwrap();
        assert_eq!(out.as_str(), Some("hi"));
    }

    #[test]
    fn sync_read_file_returns_buffer_without_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, [0xde, 0xad]).unwrap();

        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let out = read_file_sync(
            &mut scope,
            &[Value::from(path.to_string_lossy().into_owned())],
        )
        .unwrap();
        let shared = value_as_shared_buffer(&out).expect("buffer result");
        assert_eq!(shared.to_vec(), [0xde, 0xad]);
    }

    #[test]
    fn readdir_buffer_encoding_wraps_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("entry.txt"), b"x").unwrap();

        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let out = readdir_sync(
            &mut scope,
            &[
                Value::from(dir.path().to_string_lossy().into_owned()),
                Value::from("buffer"),
            ],
        )
        .unwrap();
        let listing = out.as_object().expect("array result");
        assert_eq!(listing.elements().len(), 1);
        let name = value_as_shared_buffer(&listing.elements()[0]).expect("buffer entry");
        assert_eq!(name.to_vec(), b"entry.txt");
    }

    #[test]
    fn readdir_defaults_to_string_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("entry.txt"), b"x").unwrap();

        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let out = readdir_sync(
            &mut scope,
            &[Value::from(dir.path().to_string_lossy().into_owned())],
        )
        .unwrap();
        let listing = out.as_object().expect("array result");
        assert_eq!(listing.elements()[0].as_str(), Some("entry.txt"));
    }

    #[test]
    fn sync_entry_throws_on_native_error() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let err = read_file_sync(&mut scope, &[Value::from("/definitely/not/here")]).unwrap_err();
        assert!(err.to_string().contains("ENOENT"));
    }

    #[test]
    fn exists_sync_never_throws() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let out = exists_sync(&mut scope, &[Value::from("/definitely/not/here")]).unwrap();
        assert_eq!(out.as_bool(), Some(false));
        let out = exists_sync(&mut scope, &[Value::Int32(1)]).unwrap();
        assert_eq!(out.as_bool(), Some(false));
    }

    #[test]
    fn write_string_entry_encodes_before_issuing() {
        let op = setup_write(&[
            Value::Int32(3),
            Value::from("deadbeef"),
            Value::Null,
            Value::from("hex"),
        ])
        .unwrap();
        match op {
            FsOp::Write { bytes, position, .. } => {
                assert_eq!(bytes, [0xde, 0xad, 0xbe, 0xef]);
                assert_eq!(position, None);
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }
}
