//! Teardown accounting, isolated in its own process so the global
//! allocation counter is not disturbed by unrelated tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stoat_buffer::Buffer;
use stoat_node::build_fs_module;
use stoat_vm_core::isolate::{Isolate, IsolateConfig};
use stoat_vm_core::Value;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_drops_payload_without_leaking_or_calling_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    std::fs::write(&path, vec![7u8; 4096]).unwrap();

    let baseline = Buffer::live_allocations();
    let calls = Arc::new(AtomicUsize::new(0));

    let isolate = Isolate::new(IsolateConfig::default());
    {
        let mut scope = isolate.scope();
        let module = build_fs_module(&mut scope);
        let read_file = module
            .get("readFile")
            .and_then(|v| v.as_function().cloned())
            .unwrap();
        let calls_in_callback = Arc::clone(&calls);
        let callback = Value::Function(scope.create_function(move |_scope, _this, _args| {
            calls_in_callback.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Undefined)
        }));
        // No encoding: the completion payload owns a native buffer.
        scope
            .call(
                &read_file,
                &Value::Undefined,
                &[
                    Value::from(path.to_string_lossy().into_owned()),
                    callback,
                ],
            )
            .unwrap();
    }
    drop(isolate);

    // The worker finishes after teardown; its payload must be destroyed
    // on the drop path, not delivered.
    for _ in 0..200 {
        if Buffer::live_allocations() == baseline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(Buffer::live_allocations(), baseline);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
