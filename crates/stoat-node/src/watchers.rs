//! `fs.watch` and `fs.watchFile`.
//!
//! Watch callbacks fire repeatedly, unlike one-shot completions, so the
//! retained listener is paired with a liveness handle and re-checked on
//! every delivery. Events originate on notifier or poller threads; each
//! delivery takes the isolate lock, switches to the listener's creation
//! realm, invokes the listener, and restores the ambient realm.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::Mutex;

use stoat_fs::{FileStat, PathWatcher, StatPoller, WatchEventKind, watch_path, poll_stat};
use stoat_vm_core::function::JsFunction;
use stoat_vm_core::gc::GcRef;
use stoat_vm_core::object::JsObject;
use stoat_vm_core::{IsolateHandle, IsolateScope, Value, VmError};

use crate::convert::stat_value;
use crate::dispatch::throw;
use crate::fs_ext::{arg_string, opt_bool};

/// Default poll interval for `watchFile`, in milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 5007;

/// A retained listener plus the liveness handle of the isolate it was
/// created in. Safe to invoke from any thread; a disposed isolate turns
/// delivery into a silent drop.
#[derive(Clone)]
struct Listener {
    isolate: IsolateHandle,
    func: JsFunction,
}

impl Listener {
    fn new(scope: &IsolateScope<'_>, func: JsFunction) -> Self {
        Self {
            isolate: scope.handle(),
            func,
        }
    }

    fn same_function(&self, other: &JsFunction) -> bool {
        self.func.ptr_eq(other)
    }

    /// Deliver one notification, building arguments in the listener's
    /// creation realm.
    fn notify(&self, build: impl FnOnce(&mut IsolateScope<'_>) -> Vec<Value>) {
        let Some(mut scope) = self.isolate.enter() else {
            tracing::debug!("watch notification dropped: isolate disposed");
            return;
        };
        let ambient = scope.swap_realm(self.func.realm().clone());
        let args = build(&mut scope);
        let result = scope.call(&self.func, &Value::Undefined, &args);
        scope.swap_realm(ambient);
        if let Err(err) = result {
            tracing::warn!(error = %err, "watch listener raised");
        }
    }
}

// ---------------------------------------------------------------------------
// fs.watch

struct WatcherSlot {
    watcher: Mutex<Option<PathWatcher>>,
}

/// `fs.watch(path[, options][, listener])`. Throws synchronously when the
/// path cannot be watched; events flow to the listener afterwards.
pub(crate) fn watch_entry(
    scope: &mut IsolateScope<'_>,
    args: &[Value],
) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "watch").map_err(throw)?;
    let recursive = opt_bool(args.get(1), "recursive", false);
    // Accepted for compatibility; event-loop liveness is the embedder's,
    // same as ref/unref below.
    let _persistent = opt_bool(args.get(1), "persistent", true);
    let listener = args
        .iter()
        .skip(1)
        .find_map(|v| v.as_function().cloned());

    let delivery = listener.map(|func| Listener::new(scope, func));
    let watcher = watch_path(&path, recursive, move |event| {
        let Some(delivery) = &delivery else { return };
        match event {
            Ok(event) => delivery.notify(|_scope| {
                let kind = match event.kind {
                    WatchEventKind::Rename => "rename",
                    WatchEventKind::Change => "change",
                };
                let filename = match &event.filename {
                    Some(name) => Value::from(name.as_str()),
                    None => Value::Null,
                };
                vec![Value::from(kind), filename]
            }),
            Err(err) => {
                tracing::warn!(error = %err, "watch backend error");
            }
        }
    })
    .map_err(throw)?;

    Ok(watcher_value(scope, watcher))
}

fn watcher_value(scope: &IsolateScope<'_>, watcher: PathWatcher) -> Value {
    let obj = JsObject::with_internal(Box::new(WatcherSlot {
        watcher: Mutex::new(Some(watcher)),
    }));
    obj.set_prototype(Some(watcher_prototype(scope)));
    Value::Object(GcRef::new(obj))
}

fn watcher_prototype(scope: &IsolateScope<'_>) -> GcRef<JsObject> {
    scope.realm().template_or_init("FSWatcher", || {
        let proto = JsObject::new();
        proto.set(
            "close",
            Value::Function(scope.create_function(|_scope, this, _args| {
                let slot = this
                    .as_object()
                    .and_then(|obj| obj.internal::<WatcherSlot>())
                    .ok_or_else(|| {
                        VmError::type_error("close called on a non-FSWatcher receiver")
                    })?;
                // Dropping the watcher stops delivery; later closes find None.
                drop(slot.watcher.lock().take());
                Ok(Value::Undefined)
            })),
        );
        // Event-loop liveness is owned by the embedder; ref/unref only
        // keep the chaining contract.
        proto.set(
            "ref",
            Value::Function(scope.create_function(|_scope, this, _args| Ok(this.clone()))),
        );
        proto.set(
            "unref",
            Value::Function(scope.create_function(|_scope, this, _args| Ok(this.clone()))),
        );
        proto
    })
}

// ---------------------------------------------------------------------------
// fs.watchFile / fs.unwatchFile

struct WatchedFile {
    // Held for its Drop; removal from the registry stops the poll thread.
    _poller: StatPoller,
    listeners: Vec<Listener>,
    bigint: bool,
}

static WATCHED_FILES: LazyLock<Mutex<HashMap<String, WatchedFile>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// `fs.watchFile(path[, options], listener)`. One poller per path; extra
/// listeners attach to the existing poller.
pub(crate) fn watch_file_entry(
    scope: &mut IsolateScope<'_>,
    args: &[Value],
) -> Result<Value, VmError> {
    let path = arg_string(args, 0, "watchFile").map_err(throw)?;
    let func = args
        .last()
        .and_then(|v| v.as_function().cloned())
        .ok_or_else(|| VmError::type_error("watchFile: last argument must be a listener"))?;
    let interval = args
        .get(1)
        .and_then(|v| v.as_object())
        .and_then(|obj| obj.get("interval"))
        .and_then(|v| v.as_i64())
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    let bigint = opt_bool(args.get(1), "bigint", false);
    // Accepted for compatibility; polling runs regardless.
    let _persistent = opt_bool(args.get(1), "persistent", true);
    let listener = Listener::new(scope, func);

    let mut watched = WATCHED_FILES.lock();
    if let Some(entry) = watched.get_mut(&path) {
        entry.listeners.push(listener);
        return Ok(Value::Undefined);
    }

    let poll_path = path.clone();
    let poller = poll_stat(&path, interval, move |current, previous| {
        notify_watch_file(&poll_path, current, previous);
    });
    watched.insert(
        path,
        WatchedFile {
            _poller: poller,
            listeners: vec![listener],
            bigint,
        },
    );
    Ok(Value::Undefined)
}

fn notify_watch_file(path: &str, current: FileStat, previous: FileStat) {
    // Snapshot listeners outside the lock: a listener may call
    // unwatchFile, which takes the registry lock itself.
    let (listeners, bigint) = {
        let watched = WATCHED_FILES.lock();
        match watched.get(path) {
            Some(entry) => (entry.listeners.clone(), entry.bigint),
            None => return,
        }
    };
    for listener in listeners {
        let current = current.clone();
        let previous = previous.clone();
        listener.notify(move |scope| {
            vec![
                stat_value(scope, &current, bigint),
                stat_value(scope, &previous, bigint),
            ]
        });
    }
}

/// `fs.unwatchFile(path[, listener])`. Without a listener, every listener
/// for the path is removed; the poller stops once none remain.
pub(crate) fn unwatch_file_entry(
    scope: &mut IsolateScope<'_>,
    args: &[Value],
) -> Result<Value, VmError> {
    let _ = scope;
    let path = arg_string(args, 0, "unwatchFile").map_err(throw)?;
    let target = args.get(1).and_then(|v| v.as_function());

    let mut watched = WATCHED_FILES.lock();
    let Some(entry) = watched.get_mut(&path) else {
        return Ok(Value::Undefined);
    };
    match target {
        Some(func) => entry.listeners.retain(|l| !l.same_function(func)),
        None => entry.listeners.clear(),
    }
    if entry.listeners.is_empty() {
        watched.remove(&path);
    }
    Ok(Value::Undefined)
}
