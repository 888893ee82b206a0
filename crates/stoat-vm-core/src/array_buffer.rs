//! ArrayBuffer model with external backing stores.
//!
//! A backing store either owns its bytes (script-allocated) or wraps an
//! externally-owned range with a deleter callback. The deleter runs exactly
//! once, when the last strong handle to the buffer drops — this is how a
//! natively-owned allocation is reclaimed after the script side is done
//! with its zero-copy view.

use std::fmt;
use std::ptr::NonNull;
use std::slice;

/// Deleter invoked when an external backing store is reclaimed.
///
/// Receives back the exact raw pointer/length pair the store was built
/// over; the provider reconstructs its owning handle from them.
pub type BackingStoreDeleter = Box<dyn FnOnce(*mut u8, usize) + Send>;

enum Store {
    Owned(Box<[u8]>),
    External {
        ptr: NonNull<u8>,
        len: usize,
        deleter: Option<BackingStoreDeleter>,
    },
}

/// Fixed-length byte storage behind an ArrayBuffer.
pub struct BackingStore {
    store: Store,
}

// SAFETY: backing stores are only read or written while the owning
// isolate's lock is held; handles merely move between threads. The
// external pointer is owned by the native side until the deleter runs.
unsafe impl Send for BackingStore {}
unsafe impl Sync for BackingStore {}

impl BackingStore {
    pub fn owned(byte_length: usize) -> Self {
        Self {
            store: Store::Owned(vec![0_u8; byte_length].into_boxed_slice()),
        }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            store: Store::Owned(bytes.into_boxed_slice()),
        }
    }

    /// Wrap externally-owned memory without copying.
    ///
    /// `ptr` may be dangling when `len == 0`; the deleter is still invoked
    /// on reclamation so the provider can release its (empty) allocation.
    ///
    /// # Safety
    ///
    /// `ptr..ptr+len` must stay valid and unaliased-for-writes by the
    /// provider until the deleter is called.
    pub unsafe fn external(ptr: *mut u8, len: usize, deleter: BackingStoreDeleter) -> Self {
        let ptr = NonNull::new(ptr).unwrap_or(NonNull::dangling());
        Self {
            store: Store::External {
                ptr,
                len,
                deleter: Some(deleter),
            },
        }
    }

    pub fn len(&self) -> usize {
        match &self.store {
            Store::Owned(b) => b.len(),
            Store::External { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data_ptr(&self) -> *mut u8 {
        match &self.store {
            Store::Owned(b) => b.as_ptr() as *mut u8,
            Store::External { ptr, .. } => ptr.as_ptr(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.len() == 0 {
            return &[];
        }
        // Access is serialized by the isolate lock.
        unsafe { slice::from_raw_parts(self.data_ptr(), self.len()) }
    }

    /// Mutable view over the store.
    ///
    /// # Safety
    ///
    /// The caller must hold the isolate lock and ensure no other view of
    /// this store is live for the duration of the borrow. The returned
    /// slice must not outlive the call that uses it.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        if self.len() == 0 {
            return &mut [];
        }
        unsafe { slice::from_raw_parts_mut(self.data_ptr(), self.len()) }
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        if let Store::External { ptr, len, deleter } = &mut self.store {
            // Exactly once: `Option::take` leaves nothing for a second run.
            if let Some(deleter) = deleter.take() {
                deleter(ptr.as_ptr(), *len);
            }
        }
    }
}

/// A script-visible fixed-length byte view.
pub struct JsArrayBuffer {
    store: BackingStore,
}

impl JsArrayBuffer {
    pub fn new(byte_length: usize) -> Self {
        Self {
            store: BackingStore::owned(byte_length),
        }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            store: BackingStore::from_vec(bytes),
        }
    }

    pub fn from_store(store: BackingStore) -> Self {
        Self { store }
    }

    pub fn byte_length(&self) -> usize {
        self.store.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.store.as_slice()
    }

    /// See [`BackingStore::as_mut_slice`] for the safety contract.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        unsafe { self.store.as_mut_slice() }
    }

    /// Copy `bytes` into the buffer at `offset`. Must run under the
    /// isolate lock; the copy is bounds-checked against the view.
    pub fn copy_in(&self, offset: usize, bytes: &[u8]) -> bool {
        let len = self.byte_length();
        if offset > len || bytes.len() > len - offset {
            return false;
        }
        if bytes.is_empty() {
            return true;
        }
        let slice = unsafe { self.store.as_mut_slice() };
        slice[offset..offset + bytes.len()].copy_from_slice(bytes);
        true
    }
}

impl fmt::Debug for JsArrayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsArrayBuffer")
            .field("byte_length", &self.byte_length())
            .finish()
    }
}
