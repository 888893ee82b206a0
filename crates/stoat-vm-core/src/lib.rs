//! Minimal single-threaded script-host model.
//!
//! This crate provides the engine-side half of the bridge: a
//! reference-counted value heap ([`value::Value`], [`object::JsObject`]),
//! callables that remember their creation realm ([`function::JsFunction`]),
//! byte buffers with externally-owned backing stores
//! ([`array_buffer::JsArrayBuffer`]), and the isolate itself with its
//! exclusive-access lock and liveness handle ([`isolate::Isolate`]).
//!
//! The host is strictly single-threaded: only one thread may touch script
//! values at a time, enforced by the lock inside [`isolate::IsolateHandle`].
//! Completion code running on worker threads must go through
//! [`isolate::IsolateHandle::enter`] before constructing or mutating any
//! value.

pub mod array_buffer;
pub mod error;
pub mod function;
pub mod gc;
pub mod isolate;
pub mod object;
pub mod realm;
pub mod string;
pub mod value;

pub use error::VmError;
pub use gc::GcRef;
pub use isolate::{Isolate, IsolateConfig, IsolateHandle, IsolateScope};
pub use value::Value;
