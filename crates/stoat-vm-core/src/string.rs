//! Interned-style engine strings.

use std::fmt;
use std::sync::Arc;

/// Immutable engine string. Cheap to clone; contents live in host-native
/// string storage (copied out of any native buffer at conversion time).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct JsString(Arc<str>);

impl JsString {
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.0)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
