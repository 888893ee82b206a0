//! Isolate lifecycle and the entry lock.
//!
//! An isolate is single-threaded: at most one thread executes script at a
//! time. Background threads that need to deliver results acquire the entry
//! lock through an [`IsolateHandle`], which also carries the liveness flag.
//! The protocol for deferred delivery is check-liveness, lock, re-check:
//! disposal can race the first check, so the flag is read again under the
//! lock before any script state is touched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::error::VmError;
use crate::function::JsFunction;
use crate::gc::GcRef;
use crate::object::JsObject;
use crate::realm::Realm;
use crate::value::Value;

/// Tunables applied at isolate creation.
#[derive(Debug, Clone)]
pub struct IsolateConfig {
    /// Name used in log records for this isolate.
    pub label: Option<String>,
    /// Maximum nested native-call depth before a callback invocation is
    /// rejected instead of recursing further.
    pub max_call_depth: usize,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_call_depth: 256,
        }
    }
}

struct IsolateState {
    current_realm: GcRef<Realm>,
    call_depth: usize,
}

struct IsolateShared {
    alive: AtomicBool,
    config: IsolateConfig,
    state: Mutex<IsolateState>,
}

/// An owned isolate. Dropping it disposes the isolate, after which all
/// outstanding handles fail to enter.
pub struct Isolate {
    shared: Arc<IsolateShared>,
}

impl Isolate {
    pub fn new(config: IsolateConfig) -> Self {
        let realm = GcRef::new(Realm::new());
        Self {
            shared: Arc::new(IsolateShared {
                alive: AtomicBool::new(true),
                config,
                state: Mutex::new(IsolateState {
                    current_realm: realm,
                    call_depth: 0,
                }),
            }),
        }
    }

    pub fn handle(&self) -> IsolateHandle {
        IsolateHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Enter the isolate from the owning thread.
    pub fn scope(&self) -> IsolateScope<'_> {
        IsolateScope {
            shared: &self.shared,
            state: self.shared.state.lock(),
        }
    }

    /// Mark the isolate dead. Threads already inside finish their current
    /// entry; nothing enters afterwards.
    pub fn dispose(&self) {
        if self.shared.alive.swap(false, Ordering::SeqCst) {
            tracing::debug!(
                label = self.shared.config.label.as_deref().unwrap_or("<unnamed>"),
                "isolate disposed"
            );
        }
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A cloneable, thread-safe reference to an isolate.
#[derive(Clone)]
pub struct IsolateHandle {
    shared: Arc<IsolateShared>,
}

impl IsolateHandle {
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Acquire the entry lock if the isolate is still alive.
    ///
    /// Returns `None` when the isolate was disposed, including when
    /// disposal happened between the liveness check and lock acquisition.
    pub fn enter(&self) -> Option<IsolateScope<'_>> {
        if !self.is_alive() {
            return None;
        }
        let state = self.shared.state.lock();
        if !self.is_alive() {
            return None;
        }
        Some(IsolateScope {
            shared: &self.shared,
            state,
        })
    }
}

impl std::fmt::Debug for IsolateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolateHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Exclusive access to the isolate. Holds the entry lock for its lifetime.
pub struct IsolateScope<'a> {
    shared: &'a Arc<IsolateShared>,
    state: MutexGuard<'a, IsolateState>,
}

impl IsolateScope<'_> {
    /// A thread-safe handle to the isolate this scope belongs to.
    pub fn handle(&self) -> IsolateHandle {
        IsolateHandle {
            shared: Arc::clone(self.shared),
        }
    }

    pub fn realm(&self) -> GcRef<Realm> {
        self.state.current_realm.clone()
    }

    /// Replace the current realm, returning the previous one. Used by
    /// function invocation to run callees in their creation realm.
    pub fn swap_realm(&mut self, realm: GcRef<Realm>) -> GcRef<Realm> {
        std::mem::replace(&mut self.state.current_realm, realm)
    }

    pub fn config(&self) -> &IsolateConfig {
        &self.shared.config
    }

    /// Invoke a function value with depth accounting.
    pub fn call(
        &mut self,
        func: &JsFunction,
        this: &Value,
        args: &[Value],
    ) -> Result<Value, VmError> {
        if self.state.call_depth >= self.shared.config.max_call_depth {
            return Err(VmError::range_error("maximum call depth exceeded"));
        }
        self.state.call_depth += 1;
        let result = func.call(self, this, args);
        self.state.call_depth -= 1;
        result
    }

    /// Create a plain object in the current realm.
    pub fn create_object(&self) -> GcRef<JsObject> {
        GcRef::new(JsObject::new())
    }

    pub fn create_array(&self) -> GcRef<JsObject> {
        GcRef::new(JsObject::array())
    }

    /// Wrap a native closure as a function bound to the current realm.
    pub fn create_function<F>(&self, func: F) -> JsFunction
    where
        F: Fn(&mut IsolateScope<'_>, &Value, &[Value]) -> Result<Value, VmError>
            + Send
            + Sync
            + 'static,
    {
        JsFunction::new(self.realm(), func)
    }
}
