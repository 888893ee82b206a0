//! Script objects.
//!
//! `JsObject` covers plain objects, arrays (element storage plus the
//! `is_array` brand) and host objects carrying one internal slot. Interior
//! mutability is lock-based so handles can be retained across threads, but
//! the isolate lock is what actually serializes access.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::gc::GcRef;
use crate::value::Value;

/// One internal slot for host objects (file handles, directory handles,
/// watchers). Set once at construction, downcast at use sites.
pub type InternalSlot = Box<dyn Any + Send + Sync>;

pub struct JsObject {
    prototype: RwLock<Option<GcRef<JsObject>>>,
    properties: RwLock<HashMap<String, Value>>,
    elements: RwLock<Vec<Value>>,
    is_array: bool,
    internal: OnceLock<InternalSlot>,
}

impl JsObject {
    pub fn new() -> Self {
        Self {
            prototype: RwLock::new(None),
            properties: RwLock::new(HashMap::new()),
            elements: RwLock::new(Vec::new()),
            is_array: false,
            internal: OnceLock::new(),
        }
    }

    pub fn array() -> Self {
        Self {
            prototype: RwLock::new(None),
            properties: RwLock::new(HashMap::new()),
            elements: RwLock::new(Vec::new()),
            is_array: true,
            internal: OnceLock::new(),
        }
    }

    /// Host object with one internal slot.
    pub fn with_internal(slot: InternalSlot) -> Self {
        let obj = Self::new();
        let _ = obj.internal.set(slot);
        obj
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.properties.read().get(key) {
            return Some(v.clone());
        }
        let proto = self.prototype.read().clone();
        proto.and_then(|p| p.get(key))
    }

    /// Own property only, no prototype walk.
    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.properties.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.properties.write().insert(key.into(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    pub fn prototype(&self) -> Option<GcRef<JsObject>> {
        self.prototype.read().clone()
    }

    pub fn set_prototype(&self, proto: Option<GcRef<JsObject>>) {
        *self.prototype.write() = proto;
    }

    // Array element storage.

    pub fn push(&self, value: Value) {
        self.elements.write().push(value);
    }

    pub fn element(&self, index: usize) -> Option<Value> {
        self.elements.read().get(index).cloned()
    }

    pub fn set_element(&self, index: usize, value: Value) {
        let mut elements = self.elements.write();
        if elements.len() <= index {
            elements.resize(index + 1, Value::Undefined);
        }
        elements[index] = value;
    }

    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    pub fn elements(&self) -> Vec<Value> {
        self.elements.read().clone()
    }

    /// Downcast the internal slot, if the object carries one of type `T`.
    pub fn internal<T: 'static>(&self) -> Option<&T> {
        self.internal.get().and_then(|slot| slot.downcast_ref())
    }
}

impl Default for JsObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            f.debug_struct("JsObject")
                .field("elements", &self.elements.read().len())
                .finish_non_exhaustive()
        } else {
            f.debug_struct("JsObject")
                .field("keys", &self.properties.read().len())
                .finish_non_exhaustive()
        }
    }
}
