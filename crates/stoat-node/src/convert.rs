//! Conversion of native payloads into script values.
//!
//! Prototype templates (error, Stats, Dirent shapes) are cached on the
//! realm the values are built in, so objects created on behalf of a
//! callback pick up the constructors of that callback's realm.

use stoat_fs::{Dirent, FileStat, FsError};
use stoat_vm_core::gc::GcRef;
use stoat_vm_core::object::JsObject;
use stoat_vm_core::{IsolateScope, Value, VmError};

use crate::variant::{Encoded, EntrySet, FsVariant};

const KIND_FILE: i32 = 1;
const KIND_DIR: i32 = 2;
const KIND_SYMLINK: i32 = 4;
const KIND_FIFO: i32 = 8;
const KIND_SOCKET: i32 = 16;
const KIND_CHAR: i32 = 32;
const KIND_BLOCK: i32 = 64;

fn errno_for(code: &str) -> i32 {
    match code {
        "EPERM" => -1,
        "ENOENT" => -2,
        "EIO" => -5,
        "EBADF" => -9,
        "EACCES" => -13,
        "EBUSY" => -16,
        "EEXIST" => -17,
        "EXDEV" => -18,
        "ENOTDIR" => -20,
        "EISDIR" => -21,
        "EINVAL" => -22,
        "EMFILE" => -24,
        "ENOSPC" => -28,
        "ENAMETOOLONG" => -36,
        "ENOSYS" => -38,
        "ENOTEMPTY" => -39,
        "ELOOP" => -40,
        _ => -5,
    }
}

fn error_prototype(scope: &IsolateScope<'_>) -> GcRef<JsObject> {
    scope.realm().template_or_init("ErrnoError", || {
        let proto = JsObject::new();
        proto.set("name", Value::from("Error"));
        proto
    })
}

/// Build an errno-shaped error object from a native failure.
pub fn fs_error_value(scope: &IsolateScope<'_>, err: &FsError) -> Value {
    let obj = JsObject::new();
    obj.set_prototype(Some(error_prototype(scope)));
    obj.set("message", Value::from(err.to_string()));
    obj.set("code", Value::from(err.code));
    obj.set("syscall", Value::from(err.syscall));
    obj.set("errno", Value::Int32(errno_for(err.code)));
    if let Some(path) = &err.path {
        obj.set("path", Value::from(path.as_str()));
    }
    if let Some(dest) = &err.dest {
        obj.set("dest", Value::from(dest.as_str()));
    }
    Value::Object(GcRef::new(obj))
}

/// Build an error object from an engine-side failure.
pub fn vm_error_value(scope: &IsolateScope<'_>, err: &VmError) -> Value {
    let obj = JsObject::new();
    obj.set_prototype(Some(error_prototype(scope)));
    obj.set("message", Value::from(err.to_string()));
    Value::Object(GcRef::new(obj))
}

fn kind_bits_of(this: &Value) -> i32 {
    this.as_object()
        .and_then(|obj| obj.get_own("_typeFlags"))
        .and_then(|v| v.as_number())
        .map(|n| n as i32)
        .unwrap_or(0)
}

fn kind_method(scope: &IsolateScope<'_>, bit: i32) -> Value {
    Value::Function(scope.create_function(move |_scope, this, _args| {
        Ok(Value::Bool(kind_bits_of(this) & bit != 0))
    }))
}

fn stats_prototype(scope: &IsolateScope<'_>) -> GcRef<JsObject> {
    scope.realm().template_or_init("Stats", || {
        let proto = JsObject::new();
        proto.set("isFile", kind_method(scope, KIND_FILE));
        proto.set("isDirectory", kind_method(scope, KIND_DIR));
        proto.set("isSymbolicLink", kind_method(scope, KIND_SYMLINK));
        proto.set("isFIFO", kind_method(scope, KIND_FIFO));
        proto.set("isSocket", kind_method(scope, KIND_SOCKET));
        proto.set("isCharacterDevice", kind_method(scope, KIND_CHAR));
        proto.set("isBlockDevice", kind_method(scope, KIND_BLOCK));
        proto
    })
}

fn dirent_prototype(scope: &IsolateScope<'_>) -> GcRef<JsObject> {
    scope.realm().template_or_init("Dirent", || {
        let proto = JsObject::new();
        proto.set("isFile", kind_method(scope, KIND_FILE));
        proto.set("isDirectory", kind_method(scope, KIND_DIR));
        proto.set("isSymbolicLink", kind_method(scope, KIND_SYMLINK));
        proto
    })
}

fn stat_kind_bits(stat: &FileStat) -> i32 {
    let mut bits = 0;
    if stat.is_file {
        bits |= KIND_FILE;
    }
    if stat.is_dir {
        bits |= KIND_DIR;
    }
    if stat.is_symlink {
        bits |= KIND_SYMLINK;
    }
    if stat.is_fifo {
        bits |= KIND_FIFO;
    }
    if stat.is_socket {
        bits |= KIND_SOCKET;
    }
    if stat.is_char_device {
        bits |= KIND_CHAR;
    }
    if stat.is_block_device {
        bits |= KIND_BLOCK;
    }
    bits
}

/// Expand a stat record field by field. With `bigint` set, every numeric
/// field uses the 64-bit-safe representation instead of a double.
pub fn stat_value(scope: &IsolateScope<'_>, stat: &FileStat, bigint: bool) -> Value {
    let obj = JsObject::new();
    obj.set_prototype(Some(stats_prototype(scope)));

    let numeric = |n: u64| {
        if bigint {
            Value::BigInt(i128::from(n))
        } else {
            Value::Number(n as f64)
        }
    };
    let time = |ms: f64| {
        if bigint {
            Value::BigInt(ms as i128)
        } else {
            Value::Number(ms)
        }
    };

    obj.set("dev", numeric(stat.dev));
    obj.set("ino", numeric(stat.ino));
    obj.set("mode", numeric(u64::from(stat.mode)));
    obj.set("nlink", numeric(stat.nlink));
    obj.set("uid", numeric(u64::from(stat.uid)));
    obj.set("gid", numeric(u64::from(stat.gid)));
    obj.set("rdev", numeric(stat.rdev));
    obj.set("size", numeric(stat.size));
    obj.set("blksize", numeric(stat.blksize));
    obj.set("blocks", numeric(stat.blocks));
    obj.set("atimeMs", time(stat.atime_ms));
    obj.set("mtimeMs", time(stat.mtime_ms));
    obj.set("ctimeMs", time(stat.ctime_ms));
    obj.set("birthtimeMs", time(stat.birthtime_ms));
    obj.set("atime", Value::Date(stat.atime_ms));
    obj.set("mtime", Value::Date(stat.mtime_ms));
    obj.set("ctime", Value::Date(stat.ctime_ms));
    obj.set("birthtime", Value::Date(stat.birthtime_ms));
    obj.set("_typeFlags", Value::Int32(stat_kind_bits(stat)));
    Value::Object(GcRef::new(obj))
}

fn dirent_kind_bits(entry: &Dirent) -> i32 {
    let mut bits = 0;
    if entry.is_file {
        bits |= KIND_FILE;
    }
    if entry.is_dir {
        bits |= KIND_DIR;
    }
    if entry.is_symlink {
        bits |= KIND_SYMLINK;
    }
    bits
}

pub fn dirent_value(scope: &IsolateScope<'_>, entry: &Dirent) -> Value {
    let obj = JsObject::new();
    obj.set_prototype(Some(dirent_prototype(scope)));
    obj.set("name", Value::from(entry.name.as_str()));
    obj.set("parentPath", Value::from(entry.parent_path.as_str()));
    obj.set("_typeFlags", Value::Int32(dirent_kind_bits(entry)));
    Value::Object(GcRef::new(obj))
}

/// The per-case conversion rules. Exhaustive over the closed variant set.
pub fn variant_to_value(
    scope: &mut IsolateScope<'_>,
    variant: FsVariant,
) -> Result<Value, VmError> {
    match variant {
        FsVariant::Void => Ok(Value::Undefined),
        FsVariant::Int32(n) => Ok(Value::Int32(n)),
        FsVariant::Bool(b) => Ok(Value::Bool(b)),
        FsVariant::Size(n) => {
            if n <= i32::MAX as usize {
                Ok(Value::Int32(n as i32))
            } else {
                Ok(Value::Number(n as f64))
            }
        }
        FsVariant::Text(s) => Ok(Value::from(s)),
        FsVariant::Stat { stat, bigint } => Ok(stat_value(scope, &stat, bigint)),
        FsVariant::Encoded(Encoded::Text(s)) => Ok(Value::from(s)),
        FsVariant::Encoded(Encoded::Data(buf)) => Ok(crate::buffer_ext::buffer_value(scope, buf)),
        FsVariant::Entries(EntrySet::Names(names)) => {
            let arr = scope.create_array();
            for name in names {
                arr.push(Value::from(name));
            }
            Ok(Value::Object(arr))
        }
        FsVariant::Entries(EntrySet::Buffers(names)) => {
            let arr = scope.create_array();
            for name in names {
                arr.push(crate::buffer_ext::buffer_value(scope, name));
            }
            Ok(Value::Object(arr))
        }
        FsVariant::Entries(EntrySet::Dirents(entries)) => {
            let arr = scope.create_array();
            for entry in &entries {
                arr.push(dirent_value(scope, entry));
            }
            Ok(Value::Object(arr))
        }
        FsVariant::NextEntry(Some(entry)) => Ok(dirent_value(scope, &entry)),
        FsVariant::NextEntry(None) => Ok(Value::Null),
        FsVariant::Handle(fd) => Ok(crate::handles::file_handle_value(scope, fd)),
        FsVariant::Dir { fd, path } => Ok(crate::handles::dir_value(scope, fd, &path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_vm_core::isolate::{Isolate, IsolateConfig};

    #[test]
    fn error_object_carries_errno_shape() {
        let isolate = Isolate::new(IsolateConfig::default());
        let scope = isolate.scope();
        let err = FsError::io(
            "readFile",
            "/nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let value = fs_error_value(&scope, &err);
        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("code").unwrap().as_str().unwrap(), "ENOENT");
        assert_eq!(obj.get("errno").unwrap().as_number().unwrap(), -2.0);
        assert_eq!(obj.get("syscall").unwrap().as_str().unwrap(), "readFile");
        // From the cached prototype.
        assert_eq!(obj.get("name").unwrap().as_str().unwrap(), "Error");
    }

    #[test]
    fn stat_methods_reflect_kind() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let mut stat = FileStat::zeroed();
        stat.is_dir = true;
        stat.size = 42;
        let value = stat_value(&scope, &stat, false);
        let obj = value.as_object().unwrap().clone();
        assert_eq!(obj.get("size").unwrap().as_number().unwrap(), 42.0);

        let is_dir = obj.get("isDirectory").unwrap().as_function().cloned().unwrap();
        let out = scope.call(&is_dir, &value, &[]).unwrap();
        assert_eq!(out.as_bool(), Some(true));
        let is_file = obj.get("isFile").unwrap().as_function().cloned().unwrap();
        let out = scope.call(&is_file, &value, &[]).unwrap();
        assert_eq!(out.as_bool(), Some(false));
    }

    #[test]
    fn bigint_stats_use_wide_integers() {
        let isolate = Isolate::new(IsolateConfig::default());
        let scope = isolate.scope();
        let mut stat = FileStat::zeroed();
        stat.size = u64::MAX;
        let value = stat_value(&scope, &stat, true);
        let obj = value.as_object().unwrap();
        match obj.get("size").unwrap() {
            Value::BigInt(n) => assert_eq!(n, i128::from(u64::MAX)),
            other => panic!("expected BigInt, got {other:?}"),
        }
    }

    #[test]
    fn prototypes_are_cached_per_realm() {
        let isolate = Isolate::new(IsolateConfig::default());
        let scope = isolate.scope();
        let a = stats_prototype(&scope);
        let b = stats_prototype(&scope);
        assert!(a.ptr_eq(&b));
    }
}
