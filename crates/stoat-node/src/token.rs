//! Completion tokens.
//!
//! A [`CompletionToken`] pairs a retained callback with a liveness handle
//! to its isolate. It is created on the engine thread right before a
//! native operation is issued, travels to whichever worker thread finishes
//! the operation, and is consumed there — by value, so the callback can
//! run at most once and the payload is destroyed exactly once no matter
//! which path delivery takes.
//!
//! Delivery discipline, in order:
//!   1. Liveness check. A torn-down isolate drops payload and token
//!      without invoking anything.
//!   2. Enter the isolate (exclusive lock; liveness is re-checked under
//!      the lock since teardown can race step 1).
//!   3. Switch to the callback's creation realm before building any
//!      script value. The worker thread has no ambient realm, and the
//!      ambient realm at delivery time would be the wrong one anyway.
//!   4. Invoke the callback with exactly `(error, value)`: `(null, v)` on
//!      success, `(e, null)` on failure. Its return value is ignored.

use stoat_fs::FsError;
use stoat_vm_core::function::JsFunction;
use stoat_vm_core::{IsolateHandle, IsolateScope, Value};

use crate::convert::{fs_error_value, variant_to_value, vm_error_value};
use crate::variant::FsVariant;

pub struct CompletionToken {
    isolate: IsolateHandle,
    callback: JsFunction,
    op: &'static str,
}

impl CompletionToken {
    pub fn new(isolate: IsolateHandle, callback: JsFunction, op: &'static str) -> Self {
        Self {
            isolate,
            callback,
            op,
        }
    }

    /// Deliver a completed outcome from any thread. Consumes the token;
    /// the payload is destroyed whether or not the callback runs.
    pub fn complete(self, outcome: Result<FsVariant, FsError>) {
        if !self.isolate.is_alive() {
            tracing::debug!(op = self.op, "completion dropped: isolate disposed");
            return;
        }
        // The scope must borrow a handle that outlives the consuming
        // dispatch call, so it cannot borrow `self`.
        let isolate = self.isolate.clone();
        let Some(mut scope) = isolate.enter() else {
            tracing::debug!(op = self.op, "completion dropped: isolate disposed");
            return;
        };
        self.dispatch(&mut scope, outcome);
    }

    /// Deliver while already inside the isolate, for failures detected
    /// before the operation was issued. Async entry points report
    /// argument errors this way instead of throwing.
    pub fn complete_now(self, scope: &mut IsolateScope<'_>, outcome: Result<FsVariant, FsError>) {
        self.dispatch(scope, outcome);
    }

    fn dispatch(self, scope: &mut IsolateScope<'_>, outcome: Result<FsVariant, FsError>) {
        let op = self.op;
        // Values are built in the callback's creation realm; restored on
        // every exit path below.
        let ambient = scope.swap_realm(self.callback.realm().clone());

        let (error, value) = match outcome {
            Ok(variant) => match variant_to_value(scope, variant) {
                Ok(value) => (Value::Null, value),
                Err(vm_err) => (vm_error_value(scope, &vm_err), Value::Null),
            },
            Err(fs_err) => (fs_error_value(scope, &fs_err), Value::Null),
        };

        let result = scope.call(&self.callback, &Value::Undefined, &[error, value]);
        scope.swap_realm(ambient);

        if let Err(err) = result {
            tracing::warn!(op, error = %err, "completion callback raised");
        }
    }
}

impl std::fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionToken").field("op", &self.op).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stoat_vm_core::isolate::{Isolate, IsolateConfig};

    fn counting_callback(
        isolate: &Isolate,
        calls: Arc<AtomicUsize>,
        record: Arc<parking_lot::Mutex<Vec<(bool, bool)>>>,
    ) -> JsFunction {
        let scope = isolate.scope();
        scope.create_function(move |_scope, _this, args| {
            calls.fetch_add(1, Ordering::SeqCst);
            let error_set = !args[0].is_null();
            let value_set = !args[1].is_null();
            record.lock().push((error_set, value_set));
            Ok(Value::Undefined)
        })
    }

    #[test]
    fn success_invokes_error_first_callback_once() {
        let isolate = Isolate::new(IsolateConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let record = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let callback = counting_callback(&isolate, Arc::clone(&calls), Arc::clone(&record));

        let token = CompletionToken::new(isolate.handle(), callback, "test");
        token.complete(Ok(FsVariant::Size(7)));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(record.lock().as_slice(), &[(false, true)]);
    }

    #[test]
    fn failure_passes_error_and_null_value() {
        let isolate = Isolate::new(IsolateConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let record = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let callback = counting_callback(&isolate, Arc::clone(&calls), Arc::clone(&record));

        let token = CompletionToken::new(isolate.handle(), callback, "test");
        token.complete(Err(FsError::internal("test", "boom")));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(record.lock().as_slice(), &[(true, false)]);
    }

    #[test]
    fn disposed_isolate_suppresses_delivery() {
        let isolate = Isolate::new(IsolateConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let record = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let callback = counting_callback(&isolate, Arc::clone(&calls), Arc::clone(&record));

        let token = CompletionToken::new(isolate.handle(), callback, "test");
        isolate.dispose();
        token.complete(Ok(FsVariant::Void));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn delivery_runs_in_callback_creation_realm() {
        use stoat_vm_core::gc::GcRef;
        use stoat_vm_core::realm::Realm;

        let isolate = Isolate::new(IsolateConfig::default());
        let home = isolate.scope().realm();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_in_callback = Arc::clone(&seen);
        let callback = isolate.scope().create_function(move |scope, _this, _args| {
            *seen_in_callback.lock() = Some(scope.realm());
            Ok(Value::Undefined)
        });

        // Deliver while a foreign realm is ambient.
        let token = CompletionToken::new(isolate.handle(), callback, "test");
        let mut scope = isolate.scope();
        let foreign = GcRef::new(Realm::new());
        scope.swap_realm(foreign.clone());
        token.complete_now(&mut scope, Ok(FsVariant::Void));

        let seen = seen.lock().clone().unwrap();
        assert!(seen.ptr_eq(&home));
        // Ambient realm restored after delivery.
        assert!(scope.realm().ptr_eq(&foreign));
    }

    #[test]
    fn concurrent_completions_each_run_once() {
        let isolate = Isolate::new(IsolateConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let record = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut workers = Vec::new();
        for _ in 0..32 {
            let callback = counting_callback(&isolate, Arc::clone(&calls), Arc::clone(&record));
            let token = CompletionToken::new(isolate.handle(), callback, "test");
            workers.push(std::thread::spawn(move || {
                token.complete(Ok(FsVariant::Bool(true)));
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 32);
    }
}
