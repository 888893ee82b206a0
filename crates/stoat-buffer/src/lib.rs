//! Reference-counted byte buffers.
//!
//! A [`Buffer`] is a fixed-length byte allocation shared by refcount.
//! Clones are cheap and alias the same bytes; interior access goes through
//! a read-write lock. The allocation itself never moves for the lifetime
//! of the buffer, so [`Buffer::data_ptr`] stays valid until the last
//! reference drops — this is what makes zero-copy hand-off to an external
//! byte-view possible ([`Buffer::into_raw`] / [`Buffer::from_raw`]).

pub mod encoding;
mod error;

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

pub use encoding::StringEncoding;
pub use error::BufferError;

static LIVE_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

struct Inner {
    // Invariant: the boxed slice is mutated in place but never replaced,
    // so the data pointer is stable for the lifetime of the allocation.
    data: RwLock<Box<[u8]>>,
}

impl Inner {
    fn new(bytes: Box<[u8]>) -> Self {
        LIVE_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        Self {
            data: RwLock::new(bytes),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        LIVE_ALLOCATIONS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A shared fixed-length byte buffer.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<Inner>,
}

impl Buffer {
    /// Zero-filled buffer of `size` bytes.
    pub fn alloc(size: usize) -> Self {
        Self::from_vec(vec![0; size])
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Inner::new(bytes.into_boxed_slice())),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    pub fn from_string(input: &str, encoding: StringEncoding) -> Result<Self, BufferError> {
        Ok(Self::from_vec(encoding.decode(input)?))
    }

    /// Concatenate buffers. When `total_length` is given the result is
    /// truncated or zero-padded to that length.
    pub fn concat(parts: &[Buffer], total_length: Option<usize>) -> Self {
        let natural: usize = parts.iter().map(Buffer::len).sum();
        let target = total_length.unwrap_or(natural);
        let mut out = vec![0_u8; target];
        let mut at = 0;
        for part in parts {
            if at >= target {
                break;
            }
            part.with_bytes(|bytes| {
                let take = bytes.len().min(target - at);
                out[at..at + take].copy_from_slice(&bytes[..take]);
                at += take;
            });
        }
        Self::from_vec(out)
    }

    /// Number of buffer allocations currently alive in the process.
    pub fn live_allocations() -> usize {
        LIVE_ALLOCATIONS.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles alias the same allocation.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.inner.data.read())
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.inner.data.write())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.inner.data.read().to_vec()
    }

    /// Pointer to the first byte. Stable until the last reference drops;
    /// the caller is responsible for not aliasing writes with other users.
    pub fn data_ptr(&self) -> *mut u8 {
        self.inner.data.read().as_ptr() as *mut u8
    }

    /// Transfer ownership of one reference to a raw token. The allocation
    /// stays alive until [`Buffer::from_raw`] reclaims the token and the
    /// resulting handle drops.
    pub fn into_raw(self) -> *const () {
        Arc::into_raw(self.inner) as *const ()
    }

    /// Reclaim a token produced by [`Buffer::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` and must not be reclaimed twice.
    pub unsafe fn from_raw(ptr: *const ()) -> Self {
        Self {
            inner: unsafe { Arc::from_raw(ptr as *const Inner) },
        }
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.inner.data.read().get(index).copied()
    }

    pub fn set(&self, index: usize, value: u8) -> Result<(), BufferError> {
        let mut data = self.inner.data.write();
        let length = data.len();
        match data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(BufferError::out_of_range(index, length)),
        }
    }

    fn checked_range(&self, start: usize, end: Option<usize>) -> Result<Range<usize>, BufferError> {
        let length = self.len();
        let end = end.unwrap_or(length);
        if start > end || end > length {
            return Err(BufferError::out_of_range(end, length));
        }
        Ok(start..end)
    }

    /// Fill `[start, end)` by repeating `pattern`.
    pub fn fill(
        &self,
        pattern: &[u8],
        start: usize,
        end: Option<usize>,
    ) -> Result<(), BufferError> {
        let range = self.checked_range(start, end)?;
        if pattern.is_empty() {
            return Ok(());
        }
        let mut data = self.inner.data.write();
        for (i, slot) in data[range].iter_mut().enumerate() {
            *slot = pattern[i % pattern.len()];
        }
        Ok(())
    }

    /// Copy `[source_start, source_end)` of `self` into `target` at
    /// `target_start`, clamped to the space available. Returns the number
    /// of bytes copied.
    pub fn copy_to(
        &self,
        target: &Buffer,
        target_start: usize,
        source_start: usize,
        source_end: Option<usize>,
    ) -> Result<usize, BufferError> {
        let range = self.checked_range(source_start, source_end)?;
        let target_len = target.len();
        if target_start > target_len {
            return Err(BufferError::out_of_range(target_start, target_len));
        }
        let take = range.len().min(target_len - target_start);
        if take == 0 {
            return Ok(0);
        }
        let src = self.inner.data.read()[range.start..range.start + take].to_vec();
        target.with_bytes_mut(|bytes| {
            bytes[target_start..target_start + take].copy_from_slice(&src);
        });
        Ok(take)
    }

    pub fn to_string_enc(
        &self,
        encoding: StringEncoding,
        start: usize,
        end: Option<usize>,
    ) -> Result<String, BufferError> {
        let range = self.checked_range(start, end)?;
        Ok(encoding.encode(&self.inner.data.read()[range]))
    }

    fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N], BufferError> {
        let data = self.inner.data.read();
        let length = data.len();
        data.get(offset..offset + N)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or(BufferError::OutOfRange {
                index: offset,
                length,
            })
    }

    fn write_array<const N: usize>(&self, offset: usize, bytes: [u8; N]) -> Result<(), BufferError> {
        let mut data = self.inner.data.write();
        let length = data.len();
        match data.get_mut(offset..offset + N) {
            Some(slot) => {
                slot.copy_from_slice(&bytes);
                Ok(())
            }
            None => Err(BufferError::OutOfRange {
                index: offset,
                length,
            }),
        }
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, BufferError> {
        Ok(u8::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_i8(&self, offset: usize) -> Result<i8, BufferError> {
        Ok(i8::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_u16_le(&self, offset: usize) -> Result<u16, BufferError> {
        Ok(u16::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_u16_be(&self, offset: usize) -> Result<u16, BufferError> {
        Ok(u16::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_i16_le(&self, offset: usize) -> Result<i16, BufferError> {
        Ok(i16::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_i16_be(&self, offset: usize) -> Result<i16, BufferError> {
        Ok(i16::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_u32_le(&self, offset: usize) -> Result<u32, BufferError> {
        Ok(u32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_u32_be(&self, offset: usize) -> Result<u32, BufferError> {
        Ok(u32::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_i32_le(&self, offset: usize) -> Result<i32, BufferError> {
        Ok(i32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_i32_be(&self, offset: usize) -> Result<i32, BufferError> {
        Ok(i32::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_u64_le(&self, offset: usize) -> Result<u64, BufferError> {
        Ok(u64::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_u64_be(&self, offset: usize) -> Result<u64, BufferError> {
        Ok(u64::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_i64_le(&self, offset: usize) -> Result<i64, BufferError> {
        Ok(i64::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_i64_be(&self, offset: usize) -> Result<i64, BufferError> {
        Ok(i64::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_f32_le(&self, offset: usize) -> Result<f32, BufferError> {
        Ok(f32::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_f32_be(&self, offset: usize) -> Result<f32, BufferError> {
        Ok(f32::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_f64_le(&self, offset: usize) -> Result<f64, BufferError> {
        Ok(f64::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_f64_be(&self, offset: usize) -> Result<f64, BufferError> {
        Ok(f64::from_be_bytes(self.read_array(offset)?))
    }

    pub fn write_u8(&self, offset: usize, value: u8) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_i8(&self, offset: usize, value: i8) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_u16_le(&self, offset: usize, value: u16) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_u16_be(&self, offset: usize, value: u16) -> Result<(), BufferError> {
        self.write_array(offset, value.to_be_bytes())
    }

    pub fn write_i16_le(&self, offset: usize, value: i16) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_i16_be(&self, offset: usize, value: i16) -> Result<(), BufferError> {
        self.write_array(offset, value.to_be_bytes())
    }

    pub fn write_u32_le(&self, offset: usize, value: u32) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_u32_be(&self, offset: usize, value: u32) -> Result<(), BufferError> {
        self.write_array(offset, value.to_be_bytes())
    }

    pub fn write_i32_le(&self, offset: usize, value: i32) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_i32_be(&self, offset: usize, value: i32) -> Result<(), BufferError> {
        self.write_array(offset, value.to_be_bytes())
    }

    pub fn write_u64_le(&self, offset: usize, value: u64) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_u64_be(&self, offset: usize, value: u64) -> Result<(), BufferError> {
        self.write_array(offset, value.to_be_bytes())
    }

    pub fn write_i64_le(&self, offset: usize, value: i64) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_i64_be(&self, offset: usize, value: i64) -> Result<(), BufferError> {
        self.write_array(offset, value.to_be_bytes())
    }

    pub fn write_f32_le(&self, offset: usize, value: f32) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_f32_be(&self, offset: usize, value: f32) -> Result<(), BufferError> {
        self.write_array(offset, value.to_be_bytes())
    }

    pub fn write_f64_le(&self, offset: usize, value: f64) -> Result<(), BufferError> {
        self.write_array(offset, value.to_le_bytes())
    }

    pub fn write_f64_be(&self, offset: usize, value: f64) -> Result<(), BufferError> {
        self.write_array(offset, value.to_be_bytes())
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len()).finish()
    }
}

/// Decode a base64 string to a latin1 string.
pub fn atob(input: &str) -> Result<String, BufferError> {
    let bytes = StringEncoding::Base64.decode(input)?;
    Ok(StringEncoding::Latin1.encode(&bytes))
}

/// Encode a latin1 string as base64. Fails when the input contains code
/// points above U+00FF.
pub fn btoa(input: &str) -> Result<String, BufferError> {
    let mut bytes = Vec::with_capacity(input.len());
    for c in input.chars() {
        let cp = c as u32;
        if cp > 0xff {
            return Err(BufferError::decode(
                "latin1",
                format!("code point U+{cp:04X} out of range"),
            ));
        }
        bytes.push(cp as u8);
    }
    Ok(StringEncoding::Base64.encode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_alias_the_same_bytes() {
        let a = Buffer::from_slice(b"hello");
        let b = a.clone();
        b.set(0, b'y').unwrap();
        assert_eq!(a.to_vec(), b"yello");
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn raw_round_trip_keeps_allocation_alive() {
        let before = Buffer::live_allocations();
        let buf = Buffer::from_slice(b"abc");
        let ptr = buf.data_ptr();
        let token = buf.into_raw();
        assert_eq!(Buffer::live_allocations(), before + 1);
        let back = unsafe { Buffer::from_raw(token) };
        assert_eq!(back.data_ptr(), ptr);
        assert_eq!(back.to_vec(), b"abc");
        drop(back);
        assert_eq!(Buffer::live_allocations(), before);
    }

    #[test]
    fn zero_length_buffer_is_valid() {
        let buf = Buffer::alloc(0);
        assert!(buf.is_empty());
        let token = buf.into_raw();
        let back = unsafe { Buffer::from_raw(token) };
        assert_eq!(back.len(), 0);
        assert_eq!(back.to_string_enc(StringEncoding::Utf8, 0, None).unwrap(), "");
    }

    #[test]
    fn fill_repeats_pattern() {
        let buf = Buffer::alloc(7);
        buf.fill(b"ab", 1, Some(6)).unwrap();
        assert_eq!(buf.to_vec(), [0, b'a', b'b', b'a', b'b', b'a', 0]);
        assert!(buf.fill(b"x", 5, Some(9)).is_err());
    }

    #[test]
    fn concat_with_explicit_length() {
        let a = Buffer::from_slice(b"ab");
        let b = Buffer::from_slice(b"cdef");
        assert_eq!(Buffer::concat(&[a.clone(), b.clone()], None).to_vec(), b"abcdef");
        assert_eq!(Buffer::concat(&[a.clone(), b.clone()], Some(3)).to_vec(), b"abc");
        assert_eq!(Buffer::concat(&[a, b], Some(8)).to_vec(), b"abcdef\0\0");
    }

    #[test]
    fn copy_clamps_to_target_space() {
        let src = Buffer::from_slice(b"abcdef");
        let dst = Buffer::alloc(4);
        let n = src.copy_to(&dst, 1, 2, None).unwrap();
        assert_eq!(n, 3);
        assert_eq!(dst.to_vec(), [0, b'c', b'd', b'e']);
    }

    #[test]
    fn numeric_accessors_round_trip() {
        let buf = Buffer::alloc(8);
        buf.write_u32_be(0, 0xdeadbeef).unwrap();
        assert_eq!(buf.read_u32_be(0).unwrap(), 0xdeadbeef);
        assert_eq!(buf.read_u8(0).unwrap(), 0xde);
        buf.write_f64_le(0, 1.5).unwrap();
        assert_eq!(buf.read_f64_le(0).unwrap(), 1.5);
        assert!(buf.read_u64_le(1).is_err());
    }

    #[test]
    fn atob_btoa() {
        assert_eq!(btoa("hi").unwrap(), "aGk=");
        assert_eq!(atob("aGk=").unwrap(), "hi");
        assert!(btoa("π").is_err());
    }

    #[test]
    fn string_conversions() {
        let buf = Buffer::from_string("deadbeef", StringEncoding::Hex).unwrap();
        assert_eq!(buf.to_vec(), [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            buf.to_string_enc(StringEncoding::Base64, 0, None).unwrap(),
            "3q2+7w=="
        );
    }
}
