//! Issuing native operations from entry points.
//!
//! Async entry points funnel through [`spawn_fs_op`]: parse arguments,
//! wrap the trailing callback in a [`CompletionToken`], spawn the native
//! operation on the ambient runtime, and return immediately. Failures
//! discovered before the operation is issued (argument shape, missing
//! runtime) are delivered through the callback as well, so an async entry
//! point never throws for anything but a missing callback.

use stoat_fs::{FsError, FsOp, FsOutput};
use stoat_vm_core::{IsolateScope, Value, VmError};

use crate::convert::variant_to_value;
use crate::token::CompletionToken;
use crate::variant::FsVariant;

/// Map a native failure to a thrown script exception (sync paths only).
pub(crate) fn throw(err: FsError) -> VmError {
    VmError::generic(err.to_string())
}

pub(crate) fn require_callback(op: &'static str, value: Option<&Value>) -> Result<Value, VmError> {
    match value {
        Some(v) if v.is_function() => Ok(v.clone()),
        _ => Err(VmError::type_error(format!(
            "{op}: last argument must be a callback function"
        ))),
    }
}

/// Run an operation synchronously and convert its payload.
pub(crate) fn run_sync(
    scope: &mut IsolateScope<'_>,
    setup: Result<FsOp, FsError>,
    convert: impl FnOnce(FsOutput) -> Result<FsVariant, FsError>,
) -> Result<Value, VmError> {
    let op = setup.map_err(throw)?;
    let output = stoat_fs::execute_sync(op).map_err(throw)?;
    let variant = convert(output).map_err(throw)?;
    variant_to_value(scope, variant)
}

/// Issue an operation asynchronously, completing through `callback`.
///
/// Always returns `undefined`; every outcome, including setup failures,
/// goes through the callback.
pub(crate) fn spawn_fs_op(
    scope: &mut IsolateScope<'_>,
    op_name: &'static str,
    callback: &Value,
    setup: Result<FsOp, FsError>,
    convert: impl FnOnce(FsOutput) -> Result<FsVariant, FsError> + Send + 'static,
) -> Result<Value, VmError> {
    let callback = callback
        .as_function()
        .cloned()
        .ok_or_else(|| VmError::type_error(format!("{op_name}: callback must be a function")))?;
    let token = CompletionToken::new(scope.handle(), callback, op_name);

    let op = match setup {
        Ok(op) => op,
        Err(err) => {
            token.complete_now(scope, Err(err));
            return Ok(Value::Undefined);
        }
    };

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            token.complete_now(
                scope,
                Err(FsError::internal(
                    op_name,
                    "no async runtime available for filesystem operation",
                )),
            );
            return Ok(Value::Undefined);
        }
    };

    runtime.spawn(async move {
        let outcome = stoat_fs::execute_async(op).await.and_then(convert);
        token.complete(outcome);
    });
    Ok(Value::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use stoat_vm_core::isolate::{Isolate, IsolateConfig};

    fn callback_recording_error_codes(
        isolate: &Isolate,
        codes: Arc<parking_lot::Mutex<Vec<Option<String>>>>,
        calls: Arc<AtomicUsize>,
    ) -> Value {
        let scope = isolate.scope();
        Value::Function(scope.create_function(move |_scope, _this, args| {
            let code = args[0]
                .as_object()
                .and_then(|o| o.get("code"))
                .and_then(|v| v.as_str().map(str::to_string));
            codes.lock().push(code);
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Undefined)
        }))
    }

    #[test]
    fn setup_error_delivered_through_callback() {
        let isolate = Isolate::new(IsolateConfig::default());
        let codes = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let callback = callback_recording_error_codes(&isolate, Arc::clone(&codes), Arc::clone(&calls));

        let mut scope = isolate.scope();
        let out = spawn_fs_op(
            &mut scope,
            "open",
            &callback,
            Err(FsError::invalid("open", "x", "bad flags")),
            |_| Ok(FsVariant::Void),
        )
        .unwrap();
        assert!(out.is_undefined());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(codes.lock()[0].as_deref(), Some("EINVAL"));
    }

    #[test]
    fn missing_runtime_reports_through_callback() {
        let isolate = Isolate::new(IsolateConfig::default());
        let codes = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let callback = callback_recording_error_codes(&isolate, Arc::clone(&codes), Arc::clone(&calls));

        let mut scope = isolate.scope();
        let out = spawn_fs_op(
            &mut scope,
            "stat",
            &callback,
            Ok(FsOp::Stat {
                path: "/tmp".into(),
                follow: true,
            }),
            |_| Ok(FsVariant::Void),
        )
        .unwrap();
        assert!(out.is_undefined());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(codes.lock()[0].as_deref(), Some("EIO"));
    }

    #[test]
    fn non_function_callback_throws() {
        let isolate = Isolate::new(IsolateConfig::default());
        let mut scope = isolate.scope();
        let err = spawn_fs_op(
            &mut scope,
            "stat",
            &Value::Int32(3),
            Ok(FsOp::Stat {
                path: "/tmp".into(),
                follow: true,
            }),
            |_| Ok(FsVariant::Void),
        )
        .unwrap_err();
        assert!(matches!(err, VmError::Type(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawned_op_completes_through_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, b"payload").unwrap();

        let isolate = Isolate::new(IsolateConfig::default());
        let sizes = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let sizes_in_callback = Arc::clone(&sizes);
        let calls_in_callback = Arc::clone(&calls);
        let callback = {
            let scope = isolate.scope();
            Value::Function(scope.create_function(move |_scope, _this, args| {
                assert!(args[0].is_null());
                let size = args[1]
                    .as_object()
                    .and_then(|o| o.get("size"))
                    .and_then(|v| v.as_number());
                sizes_in_callback.lock().push(size);
                calls_in_callback.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Undefined)
            }))
        };

        {
            let mut scope = isolate.scope();
            spawn_fs_op(
                &mut scope,
                "stat",
                &callback,
                Ok(FsOp::Stat {
                    path: path.to_string_lossy().into_owned(),
                    follow: true,
                }),
                |output| match output {
                    FsOutput::Stat(stat) => Ok(FsVariant::Stat { stat, bigint: false }),
                    other => Err(crate::variant::unexpected("stat", &other)),
                },
            )
            .unwrap();
        }

        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sizes.lock()[0], Some(7.0));
    }
}
