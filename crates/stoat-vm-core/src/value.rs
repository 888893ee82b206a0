//! Script value representation.

use crate::array_buffer::JsArrayBuffer;
use crate::function::JsFunction;
use crate::gc::GcRef;
use crate::object::JsObject;
use crate::string::JsString;

/// A dynamically-typed script value.
#[derive(Clone, Debug)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Int32(i32),
    Number(f64),
    /// Arbitrary-precision integer; wide enough to carry u64 losslessly.
    BigInt(i128),
    String(JsString),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    Object(GcRef<JsObject>),
    ArrayBuffer(GcRef<JsArrayBuffer>),
    Function(JsFunction),
}

impl Value {
    pub fn string(s: impl Into<JsString>) -> Self {
        Value::String(s.into())
    }

    pub fn object(obj: JsObject) -> Self {
        Value::Object(GcRef::new(obj))
    }

    pub fn array_buffer(buf: JsArrayBuffer) -> Self {
        Value::ArrayBuffer(GcRef::new(buf))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view covering both number representations.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Number(n) => Some(*n),
            Value::Date(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Value::BigInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&GcRef<JsObject>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array_buffer(&self) -> Option<&GcRef<JsArrayBuffer>> {
        match self {
            Value::ArrayBuffer(buf) => Some(buf),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&JsFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int32(n) => *n != 0,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Date(_) | Value::Object(_) | Value::ArrayBuffer(_) | Value::Function(_) => true,
        }
    }

    /// Loose rendering used in error messages and logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int32(_) | Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Object(_) => "object",
            Value::ArrayBuffer(_) => "arraybuffer",
            Value::Function(_) => "function",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(JsString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(JsString::from(s))
    }
}
