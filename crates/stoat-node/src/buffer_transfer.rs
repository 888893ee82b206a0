//! Zero-copy buffer ownership transfer.
//!
//! A native [`Buffer`] and a script `ArrayBuffer` can share one memory
//! region. Outbound, one strong reference to the native allocation is
//! released into a raw token held by the backing store's deleter; when the
//! script side reclaims the view, the deleter reconstructs the owning
//! handle from that exact token — once — and drops it. The data pointer is
//! never read after reconstruction, so there is no window for aliasing.

use stoat_buffer::Buffer;
use stoat_vm_core::array_buffer::{BackingStore, JsArrayBuffer};
use stoat_vm_core::{Value, VmError};

/// Build a script byte view over `buf` without copying.
///
/// The returned view stays valid for as long as the script holds it; the
/// native allocation cannot be freed out from under it because the view's
/// deleter owns a reference. Zero-length buffers transfer like any other.
pub fn export_buffer(buf: Buffer) -> JsArrayBuffer {
    let ptr = buf.data_ptr();
    let len = buf.len();
    // Release one owning reference into the token; the deleter is the
    // only place that may reclaim it.
    let token = buf.into_raw() as usize;
    let deleter = Box::new(move |_ptr: *mut u8, _len: usize| {
        // SAFETY: `token` came from `Buffer::into_raw` above, and backing
        // store deleters run exactly once.
        drop(unsafe { Buffer::from_raw(token as *const ()) });
    });
    // SAFETY: the allocation behind `ptr` is fixed for the Buffer's
    // lifetime, and the token keeps the Buffer alive until the deleter runs.
    let store = unsafe { BackingStore::external(ptr, len, deleter) };
    JsArrayBuffer::from_store(store)
}

/// Copy the bytes of a data-bearing argument (string, ArrayBuffer, or
/// wrapped Buffer object).
pub fn data_to_bytes(value: &Value) -> Result<Vec<u8>, VmError> {
    if let Some(s) = value.as_str() {
        return Ok(s.as_bytes().to_vec());
    }
    if let Some(buf) = value.as_array_buffer() {
        return Ok(buf.as_slice().to_vec());
    }
    if let Some(shared) = value_as_shared_buffer(value) {
        return Ok(shared.to_vec());
    }
    Err(VmError::type_error(
        "expected a string, Buffer, or ArrayBuffer",
    ))
}

/// Borrow the native allocation behind a wrapped Buffer object, sharing
/// ownership instead of copying. Returns `None` for anything else.
pub fn value_as_shared_buffer(value: &Value) -> Option<Buffer> {
    value
        .as_object()
        .and_then(|obj| obj.internal::<Buffer>())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_shares_bytes_without_copy() {
        let native = Buffer::from_slice(b"shared");
        let ptr = native.data_ptr();
        let view = export_buffer(native.clone());
        assert_eq!(view.as_slice(), b"shared");
        // Same memory, not a copy.
        assert_eq!(view.as_slice().as_ptr(), ptr as *const u8);

        // Writes through the native side are visible in the view.
        native.set(0, b'S').unwrap();
        assert_eq!(view.as_slice(), b"Shared");
    }

    #[test]
    fn deleter_releases_the_allocation_exactly_once() {
        let before = Buffer::live_allocations();
        let native = Buffer::from_slice(b"x");
        let view = export_buffer(native.clone());
        assert_eq!(Buffer::live_allocations(), before + 1);

        // The view keeps the allocation alive after the original drops.
        drop(native);
        assert_eq!(Buffer::live_allocations(), before + 1);
        assert_eq!(view.as_slice(), b"x");

        drop(view);
        assert_eq!(Buffer::live_allocations(), before);
    }

    #[test]
    fn zero_length_export_is_valid() {
        let before = Buffer::live_allocations();
        let view = export_buffer(Buffer::alloc(0));
        assert_eq!(view.byte_length(), 0);
        assert!(view.as_slice().is_empty());
        drop(view);
        assert_eq!(Buffer::live_allocations(), before);
    }

    #[test]
    fn data_to_bytes_accepts_each_shape() {
        assert_eq!(data_to_bytes(&Value::from("hi")).unwrap(), b"hi");
        let ab = Value::array_buffer(JsArrayBuffer::from_vec(vec![1, 2]));
        assert_eq!(data_to_bytes(&ab).unwrap(), [1, 2]);
        assert!(data_to_bytes(&Value::Int32(5)).is_err());
    }
}
