//! Script-visible Buffer objects and the `buffer` module.
//!
//! A wrapped Buffer is a host object whose internal slot shares ownership
//! of the native allocation; its `buffer` property is a zero-copy
//! `ArrayBuffer` view over the same bytes. Methods live on a per-realm
//! prototype template, so buffers built for a callback pick up that
//! callback realm's template.

use stoat_buffer::{Buffer, BufferError, StringEncoding, atob, btoa};
use stoat_vm_core::gc::GcRef;
use stoat_vm_core::object::JsObject;
use stoat_vm_core::{IsolateScope, Value, VmError};

use crate::buffer_transfer::{export_buffer, value_as_shared_buffer};

fn range_err(err: BufferError) -> VmError {
    VmError::range_error(err.to_string())
}

fn this_buffer(this: &Value, op: &'static str) -> Result<Buffer, VmError> {
    value_as_shared_buffer(this)
        .ok_or_else(|| VmError::type_error(format!("{op} called on a non-Buffer receiver")))
}

fn encoding_arg(value: Option<&Value>) -> Result<StringEncoding, VmError> {
    match value.and_then(|v| v.as_str()) {
        Some(name) => name
            .parse::<StringEncoding>()
            .map_err(|e| VmError::type_error(e.to_string())),
        None => Ok(StringEncoding::Utf8),
    }
}

/// Resolve an index argument, counting negatives from the end.
fn index_arg(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value.and_then(|v| v.as_i64()) {
        Some(n) if n < 0 => len.saturating_sub(n.unsigned_abs() as usize),
        Some(n) => (n as usize).min(len),
        None => default,
    }
}

fn offset_arg(args: &[Value], index: usize) -> Result<usize, VmError> {
    match args.get(index) {
        None | Some(Value::Undefined) => Ok(0),
        Some(v) => v
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| VmError::range_error("offset must be a non-negative integer")),
    }
}

/// Wrap a native allocation in a script Buffer object.
pub fn buffer_value(scope: &IsolateScope<'_>, buf: Buffer) -> Value {
    let obj = JsObject::with_internal(Box::new(buf.clone()));
    obj.set("length", Value::Number(buf.len() as f64));
    obj.set("buffer", Value::array_buffer(export_buffer(buf)));
    obj.set_prototype(Some(buffer_prototype(scope)));
    Value::Object(GcRef::new(obj))
}

macro_rules! read_method {
    ($scope:expr, $proto:expr, $name:literal, $method:ident, $wrap:expr) => {
        $proto.set(
            $name,
            Value::Function($scope.create_function(|_scope, this, args| {
                let buf = this_buffer(this, $name)?;
                let offset = offset_arg(args, 0)?;
                buf.$method(offset).map($wrap).map_err(range_err)
            })),
        );
    };
}

macro_rules! write_method {
    ($scope:expr, $proto:expr, $name:literal, $method:ident, $from:expr) => {
        $proto.set(
            $name,
            Value::Function($scope.create_function(|_scope, this, args| {
                let buf = this_buffer(this, $name)?;
                let value = $from(args.first())
                    .ok_or_else(|| VmError::type_error("value must be a number"))?;
                let offset = offset_arg(args, 1)?;
                buf.$method(offset, value).map_err(range_err)?;
                Ok(Value::Number((offset + size_of_val(&value)) as f64))
            })),
        );
    };
}

fn buffer_prototype(scope: &IsolateScope<'_>) -> GcRef<JsObject> {
    scope.realm().template_or_init("Buffer", || {
        let proto = JsObject::new();

        proto.set(
            "toString",
            Value::Function(scope.create_function(|_scope, this, args| {
                let buf = this_buffer(this, "toString")?;
                let encoding = encoding_arg(args.first())?;
                let start = index_arg(args.get(1), buf.len(), 0);
                let end = index_arg(args.get(2), buf.len(), buf.len());
                buf.to_string_enc(encoding, start, Some(end))
                    .map(Value::from)
                    .map_err(range_err)
            })),
        );

        proto.set(
            "fill",
            Value::Function(scope.create_function(|_scope, this, args| {
                let buf = this_buffer(this, "fill")?;
                let pattern = match args.first() {
                    Some(Value::String(s)) => encoding_arg(args.get(3))?
                        .decode(s.as_str())
                        .map_err(range_err)?,
                    Some(v) if v.as_i64().is_some() => {
                        vec![(v.as_i64().unwrap_or(0) & 0xff) as u8]
                    }
                    Some(v) => value_as_shared_buffer(v)
                        .map(|b| b.to_vec())
                        .ok_or_else(|| {
                            VmError::type_error("fill value must be a string, number, or Buffer")
                        })?,
                    None => vec![0],
                };
                let start = index_arg(args.get(1), buf.len(), 0);
                let end = index_arg(args.get(2), buf.len(), buf.len());
                buf.fill(&pattern, start, Some(end)).map_err(range_err)?;
                Ok(this.clone())
            })),
        );

        proto.set(
            "copy",
            Value::Function(scope.create_function(|_scope, this, args| {
                let buf = this_buffer(this, "copy")?;
                let target = args
                    .first()
                    .and_then(value_as_shared_buffer)
                    .ok_or_else(|| VmError::type_error("copy target must be a Buffer"))?;
                let target_start = index_arg(args.get(1), target.len(), 0);
                let source_start = index_arg(args.get(2), buf.len(), 0);
                let source_end = index_arg(args.get(3), buf.len(), buf.len());
                let copied = buf
                    .copy_to(&target, target_start, source_start, Some(source_end))
                    .map_err(range_err)?;
                Ok(Value::Number(copied as f64))
            })),
        );

        proto.set(
            "equals",
            Value::Function(scope.create_function(|_scope, this, args| {
                let buf = this_buffer(this, "equals")?;
                let other = args
                    .first()
                    .and_then(value_as_shared_buffer)
                    .ok_or_else(|| VmError::type_error("equals argument must be a Buffer"))?;
                let equal =
                    buf.ptr_eq(&other) || buf.with_bytes(|a| other.with_bytes(|b| a == b));
                Ok(Value::Bool(equal))
            })),
        );

        // slice copies; subranges cannot alias the parent allocation here.
        proto.set(
            "slice",
            Value::Function(scope.create_function(|scope, this, args| {
                let buf = this_buffer(this, "slice")?;
                let start = index_arg(args.first(), buf.len(), 0);
                let end = index_arg(args.get(1), buf.len(), buf.len()).max(start);
                let bytes = buf.with_bytes(|data| data[start..end].to_vec());
                Ok(buffer_value(scope, Buffer::from_vec(bytes)))
            })),
        );

        read_method!(scope, proto, "readUInt8", read_u8, |v| Value::Int32(v as i32));
        read_method!(scope, proto, "readInt8", read_i8, |v| Value::Int32(v as i32));
        read_method!(scope, proto, "readUInt16LE", read_u16_le, |v| Value::Int32(v as i32));
        read_method!(scope, proto, "readUInt16BE", read_u16_be, |v| Value::Int32(v as i32));
        read_method!(scope, proto, "readInt16LE", read_i16_le, |v| Value::Int32(v as i32));
        read_method!(scope, proto, "readUInt32LE", read_u32_le, |v| {
            Value::Number(v as f64)
        });
        read_method!(scope, proto, "readUInt32BE", read_u32_be, |v| {
            Value::Number(v as f64)
        });
        read_method!(scope, proto, "readInt32LE", read_i32_le, |v| Value::Int32(v));
        read_method!(scope, proto, "readFloatLE", read_f32_le, |v| {
            Value::Number(v as f64)
        });
        read_method!(scope, proto, "readFloatBE", read_f32_be, |v| {
            Value::Number(v as f64)
        });
        read_method!(scope, proto, "readDoubleLE", read_f64_le, Value::Number);
        read_method!(scope, proto, "readDoubleBE", read_f64_be, Value::Number);
        read_method!(scope, proto, "readBigUInt64LE", read_u64_le, |v| {
            Value::BigInt(v as i128)
        });
        read_method!(scope, proto, "readBigInt64LE", read_i64_le, |v| {
            Value::BigInt(v as i128)
        });

        write_method!(scope, proto, "writeUInt8", write_u8, |v: Option<&Value>| v
            .and_then(|v| v.as_i64())
            .map(|n| (n & 0xff) as u8));
        write_method!(scope, proto, "writeUInt16LE", write_u16_le, |v: Option<&Value>| v
            .and_then(|v| v.as_i64())
            .map(|n| (n & 0xffff) as u16));
        write_method!(scope, proto, "writeUInt32LE", write_u32_le, |v: Option<&Value>| v
            .and_then(|v| v.as_i64())
            .map(|n| n as u32));
        write_method!(scope, proto, "writeInt32LE", write_i32_le, |v: Option<&Value>| v
            .and_then(|v| v.as_i64())
            .map(|n| n as i32));
        write_method!(scope, proto, "writeFloatLE", write_f32_le, |v: Option<&Value>| v
            .and_then(|v| v.as_number())
            .map(|n| n as f32));
        write_method!(scope, proto, "writeDoubleLE", write_f64_le, |v: Option<&Value>| v
            .and_then(|v| v.as_number()));

        proto
    })
}

/// Build the `buffer` module object: the `Buffer` namespace plus the
/// base64 convenience functions.
pub fn build_buffer_module(scope: &mut IsolateScope<'_>) -> GcRef<JsObject> {
    let module = JsObject::new();
    let namespace = scope.create_object();

    namespace.set(
        "alloc",
        Value::Function(scope.create_function(|scope, _this, args| {
            let size = args
                .first()
                .and_then(|v| v.as_i64())
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| VmError::range_error("size must be a non-negative integer"))?;
            let buf = Buffer::alloc(size);
            if let Some(fill) = args.get(1).filter(|v| !v.is_nullish()) {
                let pattern = match fill {
                    Value::String(s) => encoding_arg(args.get(2))?
                        .decode(s.as_str())
                        .map_err(range_err)?,
                    v => vec![(v.as_i64().unwrap_or(0) & 0xff) as u8],
                };
                buf.fill(&pattern, 0, None).map_err(range_err)?;
            }
            Ok(buffer_value(scope, buf))
        })),
    );

    // The allocator zeroes everything; "unsafe" keeps the familiar name.
    namespace.set(
        "allocUnsafe",
        Value::Function(scope.create_function(|scope, _this, args| {
            let size = args
                .first()
                .and_then(|v| v.as_i64())
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| VmError::range_error("size must be a non-negative integer"))?;
            Ok(buffer_value(scope, Buffer::alloc(size)))
        })),
    );

    namespace.set(
        "from",
        Value::Function(scope.create_function(|scope, _this, args| {
            let buf = match args.first() {
                Some(Value::String(s)) => {
                    let encoding = encoding_arg(args.get(1))?;
                    Buffer::from_string(s.as_str(), encoding)
                        .map_err(|e| VmError::type_error(e.to_string()))?
                }
                Some(Value::ArrayBuffer(view)) => Buffer::from_slice(view.as_slice()),
                Some(Value::Object(obj)) if obj.is_array() => {
                    let bytes = obj
                        .elements()
                        .iter()
                        .map(|v| (v.as_i64().unwrap_or(0) & 0xff) as u8)
                        .collect();
                    Buffer::from_vec(bytes)
                }
                Some(v) => value_as_shared_buffer(v)
                    .map(|b| Buffer::from_vec(b.to_vec()))
                    .ok_or_else(|| {
                        VmError::type_error("first argument must be a string, array, or Buffer")
                    })?,
                None => return Err(VmError::type_error("missing argument")),
            };
            Ok(buffer_value(scope, buf))
        })),
    );

    namespace.set(
        "concat",
        Value::Function(scope.create_function(|scope, _this, args| {
            let list = args
                .first()
                .and_then(|v| v.as_object())
                .filter(|obj| obj.is_array())
                .ok_or_else(|| VmError::type_error("list must be an array of Buffers"))?;
            let parts = list
                .elements()
                .iter()
                .map(|element| {
                    value_as_shared_buffer(element)
                        .ok_or_else(|| VmError::type_error("list elements must be Buffers"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let total = args
                .get(1)
                .and_then(|v| v.as_i64())
                .and_then(|n| usize::try_from(n).ok());
            Ok(buffer_value(scope, Buffer::concat(&parts, total)))
        })),
    );

    namespace.set(
        "byteLength",
        Value::Function(scope.create_function(|_scope, _this, args| {
            match args.first() {
                Some(Value::String(s)) => {
                    let encoding = encoding_arg(args.get(1))?;
                    let len = encoding
                        .decode(s.as_str())
                        .map_err(|e| VmError::type_error(e.to_string()))?
                        .len();
                    Ok(Value::Number(len as f64))
                }
                Some(v) => value_as_shared_buffer(v)
                    .map(|b| Value::Number(b.len() as f64))
                    .or_else(|| {
                        v.as_array_buffer()
                            .map(|ab| Value::Number(ab.byte_length() as f64))
                    })
                    .ok_or_else(|| VmError::type_error("unsupported byteLength argument")),
                None => Err(VmError::type_error("missing argument")),
            }
        })),
    );

    namespace.set(
        "isBuffer",
        Value::Function(scope.create_function(|_scope, _this, args| {
            Ok(Value::Bool(
                args.first().is_some_and(|v| value_as_shared_buffer(v).is_some()),
            ))
        })),
    );

    module.set("Buffer", Value::Object(namespace));
    module.set(
        "atob",
        Value::Function(scope.create_function(|_scope, _this, args| {
            let input = args
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| VmError::type_error("atob argument must be a string"))?;
            atob(input)
                .map(Value::from)
                .map_err(|e| VmError::type_error(e.to_string()))
        })),
    );
    module.set(
        "btoa",
        Value::Function(scope.create_function(|_scope, _this, args| {
            let input = args
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| VmError::type_error("btoa argument must be a string"))?;
            btoa(input)
                .map(Value::from)
                .map_err(|e| VmError::type_error(e.to_string()))
        })),
    );

    GcRef::new(module)
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
    ) -> Value {
        let method = target
            .as_object()
            .and_then(|obj| obj.get(name))
            .and_then(|v| v.as_function().cloned())
            .expect("method present");
        scope.call(&method, target, args).expect("method succeeds")
    }

    fn module_fn(module: &JsObject, path: &[&str]) -> Value {
        let mut current = module.get(path[0]).expect("export present");
        for key in &path[1..] {
            current = current
                .as_object()
                .and_then(|obj| obj.get(key))
                .expect("export present");
        }
        current
    }

    #[test]
    fn wrapped_buffer_shares_bytes_with_its_view() {
        let isolate = Isolate::new(IsolateConfig::default());
        let scope = isolate.scope();
        let native = Buffer::from_slice(b"abc");
        let wrapped = buffer_value(&scope, native.clone());

        let view = wrapped
            .as_object()
            .and_then(|obj| obj.get("buffer"))
            .and_then(|v| v.as_array_buffer().cloned())
            .expect("view present");
        native.set(0, b'A').unwrap();
        assert_eq!(view.as_slice(), b"Abc");
    }

    #[test]
    fn to_string_and_fill_round_through_prototype() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let wrapped = buffer_value(&scope, Buffer::alloc(4));
        call_method(&mut scope, &wrapped, "fill", &[Value::from("ab")]);
        let text = call_method(&mut scope, &wrapped, "toString", &[Value::from("utf8")]);
        assert_eq!(text.as_str(), Some("abab"));
    }

    #[test]
    fn numeric_accessors_agree() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let wrapped = buffer_value(&scope, Buffer::alloc(8));
        call_method(
            &mut scope,
            &wrapped,
            "writeUInt32LE",
            &[Value::Number(0xdead_beefu32 as f64), Value::Int32(0)],
        );
        let back = call_method(&mut scope, &wrapped, "readUInt32LE", &[Value::Int32(0)]);
        assert_eq!(back.as_number(), Some(0xdead_beefu32 as f64));
    }

    #[test]
    fn namespace_constructs_and_identifies_buffers() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let module = build_buffer_module(&mut scope);

        let from = module_fn(&module, &["Buffer", "from"]);
        let from = from.as_function().cloned().unwrap();
        let made = scope
            .call(&from, &Value::Undefined, &[Value::from("deadbeef"), Value::from("hex")])
            .unwrap();
        assert_eq!(
            value_as_shared_buffer(&made).unwrap().to_vec(),
            [0xde, 0xad, 0xbe, 0xef]
        );

        let is_buffer = module_fn(&module, &["Buffer", "isBuffer"]);
        let is_buffer = is_buffer.as_function().cloned().unwrap();
        let yes = scope.call(&is_buffer, &Value::Undefined, &[made]).unwrap();
        assert_eq!(yes.as_bool(), Some(true));
        let no = scope
            .call(&is_buffer, &Value::Undefined, &[Value::from("nope")])
            .unwrap();
        assert_eq!(no.as_bool(), Some(false));
    }

    #[test]
    fn utf8_to_base64_round_trips_through_atob() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let module = build_buffer_module(&mut scope);

        let from = module_fn(&module, &["Buffer", "from"])
            .as_function()
            .cloned()
            .unwrap();
        let made = scope
            .call(
                &from,
                &Value::Undefined,
                &[Value::from("hello"), Value::from("utf8")],
            )
            .unwrap();
        let encoded = call_method(&mut scope, &made, "toString", &[Value::from("base64")]);
        assert_eq!(encoded.as_str(), Some("aGVsbG8="));

        let atob_fn = module_fn(&module, &["atob"]).as_function().cloned().unwrap();
        let decoded = scope.call(&atob_fn, &Value::Undefined, &[encoded]).unwrap();
        assert_eq!(decoded.as_str(), Some("hello"));
    }

    #[test]
    fn atob_and_btoa_are_inverses_for_latin1() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let module = build_buffer_module(&mut scope);

        let btoa_fn = module_fn(&module, &["btoa"]).as_function().cloned().unwrap();
        let encoded = scope
            .call(&btoa_fn, &Value::Undefined, &[Value::from("hello")])
            .unwrap();
        let atob_fn = module_fn(&module, &["atob"]).as_function().cloned().unwrap();
        let decoded = scope.call(&atob_fn, &Value::Undefined, &[encoded]).unwrap();
        assert_eq!(decoded.as_str(), Some("hello"));
    }
}
