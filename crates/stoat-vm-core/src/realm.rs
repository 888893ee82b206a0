//! Realms: per-context global state.
//!
//! An isolate hosts one or more realms. Constructor templates (error
//! classes, wrapper prototypes) are cached per realm so that objects
//! created on behalf of a callback use the constructors of the realm the
//! callback was created in, never those of whichever realm happens to be
//! current.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::gc::GcRef;
use crate::object::JsObject;

static NEXT_REALM_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

pub struct Realm {
    id: u64,
    global: GcRef<JsObject>,
    templates: RwLock<HashMap<String, GcRef<JsObject>>>,
}

impl Realm {
    pub fn new() -> Self {
        Self {
            id: NEXT_REALM_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            global: GcRef::new(JsObject::new()),
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn global(&self) -> &GcRef<JsObject> {
        &self.global
    }

    /// Fetch a cached template, building it on first use.
    pub fn template_or_init(
        &self,
        name: &str,
        init: impl FnOnce() -> JsObject,
    ) -> GcRef<JsObject> {
        if let Some(tpl) = self.templates.read().get(name) {
            return tpl.clone();
        }
        let mut templates = self.templates.write();
        templates
            .entry(name.to_string())
            .or_insert_with(|| GcRef::new(init()))
            .clone()
    }

    #[cfg(test)]
    pub fn template_count(&self) -> usize {
        self.templates.read().len()
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm").field("id", &self.id).finish()
    }
}
