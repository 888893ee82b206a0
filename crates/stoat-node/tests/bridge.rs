//! End-to-end exercises of the async completion bridge: module entry
//! points issue native operations from inside an isolate, and callbacks
//! observe the error-first contract from worker-thread deliveries.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use stoat_node::{build_buffer_module, build_fs_module, value_as_shared_buffer};
use stoat_vm_core::function::JsFunction;
use stoat_vm_core::isolate::{Isolate, IsolateConfig};
use stoat_vm_core::{Value, VmError};

/// Snapshot of one callback invocation: `(error, value)`.
type Delivery = (Value, Value);

struct Recorder {
    calls: AtomicUsize,
    deliveries: Mutex<Vec<Delivery>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            deliveries: Mutex::new(Vec::new()),
        })
    }

    fn callback(self: &Arc<Self>, isolate: &Isolate) -> Value {
        let recorder = Arc::clone(self);
        let scope = isolate.scope();
        Value::Function(scope.create_function(move |_scope, _this, args| {
            assert_eq!(args.len(), 2, "callbacks receive exactly (error, value)");
            recorder
                .deliveries
                .lock()
                .push((args[0].clone(), args[1].clone()));
            recorder.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Undefined)
        }))
    }

    async fn wait_for(&self, count: usize) {
        for _ in 0..200 {
            if self.calls.load(Ordering::SeqCst) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!(
            "timed out waiting for {count} deliveries, saw {}",
            self.calls.load(Ordering::SeqCst)
        );
    }

    fn single(&self) -> Delivery {
        let deliveries = self.deliveries.lock();
        assert_eq!(deliveries.len(), 1, "expected exactly one delivery");
        deliveries[0].clone()
    }
}

fn fs_fn(isolate: &Isolate, name: &str) -> JsFunction {
    let mut scope = isolate.scope();
    let module = build_fs_module(&mut scope);
    module
        .get(name)
        .and_then(|v| v.as_function().cloned())
        .unwrap_or_else(|| panic!("fs.{name} missing"))
}

fn call(isolate: &Isolate, func: &JsFunction, args: &[Value]) -> Result<Value, VmError> {
    let mut scope = isolate.scope();
    scope.call(func, &Value::Undefined, args)
}

fn error_code(error: &Value) -> Option<String> {
    error
        .as_object()
        .and_then(|obj| obj.get("code"))
        .and_then(|v| v.as_str().map(str::to_string))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_file_delivers_null_error_and_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.txt");
    std::fs::write(&path, b"hello bridge").unwrap();

    let isolate = Isolate::new(IsolateConfig::default());
    let recorder = Recorder::new();
    let read_file = fs_fn(&isolate, "readFile");
    call(
        &isolate,
        &read_file,
        &[
            Value::from(path.to_string_lossy().into_owned()),
            Value::from("utf8"),
            recorder.callback(&isolate),
        ],
    )
    .unwrap();

    recorder.wait_for(1).await;
    let (error, value) = recorder.single();
    assert!(error.is_null());
    assert_eq!(value.as_str(), Some("hello bridge"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_path_reports_enoent_with_null_value() {
    let isolate = Isolate::new(IsolateConfig::default());
    let recorder = Recorder::new();
    let read_file = fs_fn(&isolate, "readFile");
    call(
        &isolate,
        &read_file,
        &[
            Value::from("/definitely/not/here"),
            recorder.callback(&isolate),
        ],
    )
    .unwrap();

    recorder.wait_for(1).await;
    let (error, value) = recorder.single();
    assert_eq!(error_code(&error).as_deref(), Some("ENOENT"));
    assert!(value.is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn argument_errors_flow_through_the_callback() {
    let isolate = Isolate::new(IsolateConfig::default());
    let recorder = Recorder::new();
    let read_file = fs_fn(&isolate, "readFile");
    // Non-string path: the entry point must not throw, the callback gets
    // the normalized error.
    call(
        &isolate,
        &read_file,
        &[Value::Int32(42), recorder.callback(&isolate)],
    )
    .unwrap();

    recorder.wait_for(1).await;
    let (error, value) = recorder.single();
    assert_eq!(error_code(&error).as_deref(), Some("EINVAL"));
    assert!(value.is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_callback_throws_instead_of_issuing() {
    let isolate = Isolate::new(IsolateConfig::default());
    let read_file = fs_fn(&isolate, "readFile");
    let err = call(&isolate, &read_file, &[Value::from("/tmp/x")]).unwrap_err();
    assert!(err.to_string().contains("callback"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disposed_isolate_suppresses_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.txt");
    std::fs::write(&path, b"data").unwrap();

    let isolate = Isolate::new(IsolateConfig::default());
    let recorder = Recorder::new();
    let read_file = fs_fn(&isolate, "readFile");
    call(
        &isolate,
        &read_file,
        &[
            Value::from(path.to_string_lossy().into_owned()),
            recorder.callback(&isolate),
        ],
    )
    .unwrap();
    drop(isolate);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = Value::from(
        dir.path()
            .join("round.txt")
            .to_string_lossy()
            .into_owned(),
    );

    let isolate = Isolate::new(IsolateConfig::default());
    let write_file = fs_fn(&isolate, "writeFile");
    let written = Recorder::new();
    call(
        &isolate,
        &write_file,
        &[
            path.clone(),
            Value::from("first line"),
            written.callback(&isolate),
        ],
    )
    .unwrap();
    written.wait_for(1).await;
    assert!(written.single().0.is_null());

    let read_file = fs_fn(&isolate, "readFile");
    let read = Recorder::new();
    call(
        &isolate,
        &read_file,
        &[path, Value::from("utf8"), read.callback(&isolate)],
    )
    .unwrap();
    read.wait_for(1).await;
    assert_eq!(read.single().1.as_str(), Some("first line"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn open_yields_a_handle_and_close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handle.txt");
    std::fs::write(&path, b"handle bytes").unwrap();

    let isolate = Isolate::new(IsolateConfig::default());
    let open = fs_fn(&isolate, "open");
    let opened = Recorder::new();
    call(
        &isolate,
        &open,
        &[
            Value::from(path.to_string_lossy().into_owned()),
            Value::from("r"),
            opened.callback(&isolate),
        ],
    )
    .unwrap();
    opened.wait_for(1).await;
    let (error, handle) = opened.single();
    assert!(error.is_null());
    let handle_obj = handle.as_object().expect("handle object");
    assert!(handle_obj.get("fd").is_some());

    let close = handle_obj
        .get("close")
        .and_then(|v| v.as_function().cloned())
        .expect("close method");

    let first = Recorder::new();
    {
        let mut scope = isolate.scope();
        scope
            .call(&close, &handle, &[first.callback(&isolate)])
            .unwrap();
    }
    first.wait_for(1).await;
    assert!(first.single().0.is_null());

    // Second close succeeds without a descriptor to release.
    let second = Recorder::new();
    {
        let mut scope = isolate.scope();
        scope
            .call(&close, &handle, &[second.callback(&isolate)])
            .unwrap();
    }
    second.wait_for(1).await;
    assert!(second.single().0.is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handle_read_fills_a_shared_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("content.bin");
    std::fs::write(&path, b"0123456789").unwrap();

    let isolate = Isolate::new(IsolateConfig::default());
    let open = fs_fn(&isolate, "open");
    let opened = Recorder::new();
    call(
        &isolate,
        &open,
        &[
            Value::from(path.to_string_lossy().into_owned()),
            Value::from("r"),
            opened.callback(&isolate),
        ],
    )
    .unwrap();
    opened.wait_for(1).await;
    let handle = opened.single().1;

    let target = {
        let mut scope = isolate.scope();
        let buffer_module = build_buffer_module(&mut scope);
        let alloc = buffer_module
            .get("Buffer")
            .and_then(|v| v.as_object().and_then(|obj| obj.get("alloc")))
            .and_then(|v| v.as_function().cloned())
            .unwrap();
        scope
            .call(&alloc, &Value::Undefined, &[Value::Int32(4)])
            .unwrap()
    };

    let read = handle
        .as_object()
        .and_then(|obj| obj.get("read"))
        .and_then(|v| v.as_function().cloned())
        .expect("read method");
    let done = Recorder::new();
    {
        let mut scope = isolate.scope();
        scope
            .call(
                &read,
                &handle,
                &[
                    target.clone(),
                    Value::Int32(0),
                    Value::Int32(4),
                    Value::Int32(2),
                    done.callback(&isolate),
                ],
            )
            .unwrap();
    }
    done.wait_for(1).await;
    let (error, bytes_read) = done.single();
    assert!(error.is_null());
    assert_eq!(bytes_read.as_i64(), Some(4));
    let shared = value_as_shared_buffer(&target).unwrap();
    assert_eq!(shared.to_vec(), b"2345");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completions_each_deliver_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target.txt");
    std::fs::write(&path, b"concurrency").unwrap();
    let path = path.to_string_lossy().into_owned();

    let isolate = Isolate::new(IsolateConfig::default());
    let stat = fs_fn(&isolate, "stat");
    let recorders: Vec<_> = (0..32).map(|_| Recorder::new()).collect();
    for recorder in &recorders {
        call(
            &isolate,
            &stat,
            &[Value::from(path.clone()), recorder.callback(&isolate)],
        )
        .unwrap();
    }

    for recorder in &recorders {
        recorder.wait_for(1).await;
    }
    // Give any double delivery a chance to surface before counting.
    tokio::time::sleep(Duration::from_millis(200)).await;
    for recorder in &recorders {
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        let (error, stats) = recorder.single();
        assert!(error.is_null());
        let size = stats
            .as_object()
            .and_then(|obj| obj.get("size"))
            .and_then(|v| v.as_i64());
        assert_eq!(size, Some(11));
    }
}
