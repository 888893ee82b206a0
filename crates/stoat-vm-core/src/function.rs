//! Callable values.
//!
//! Every function captures the realm that was current when it was created.
//! Invocation always runs inside that realm, regardless of which realm is
//! current at the call site.

use std::fmt;
use std::sync::Arc;

use crate::error::VmError;
use crate::gc::GcRef;
use crate::isolate::IsolateScope;
use crate::realm::Realm;
use crate::value::Value;

type NativeFn =
    dyn Fn(&mut IsolateScope<'_>, &Value, &[Value]) -> Result<Value, VmError> + Send + Sync;

/// A callable script value backed by a native closure.
#[derive(Clone)]
pub struct JsFunction {
    realm: GcRef<Realm>,
    func: Arc<NativeFn>,
}

impl JsFunction {
    pub fn new<F>(realm: GcRef<Realm>, func: F) -> Self
    where
        F: Fn(&mut IsolateScope<'_>, &Value, &[Value]) -> Result<Value, VmError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            realm,
            func: Arc::new(func),
        }
    }

    /// The realm this function was created in.
    pub fn realm(&self) -> &GcRef<Realm> {
        &self.realm
    }

    /// Invoke inside the creation realm. `scope` must belong to the same
    /// isolate; the current realm is switched for the duration of the call
    /// and restored afterwards.
    pub fn call(
        &self,
        scope: &mut IsolateScope<'_>,
        this: &Value,
        args: &[Value],
    ) -> Result<Value, VmError> {
        let saved = scope.swap_realm(self.realm.clone());
        let result = (self.func)(scope, this, args);
        scope.swap_realm(saved);
        result
    }

    /// Identity comparison, used to deduplicate registered listeners.
    pub fn ptr_eq(&self, other: &JsFunction) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsFunction")
    }
}
