//! Reference-counted buffer handles.
//!
//! Decoded frame data is shared between the decoder (which may keep a frame
//! as a prediction reference) and the caller. Unlike `Arc` the handle allows
//! obtaining a mutable reference to the payload while clones exist; users
//! that need exclusive access should consult `get_num_refs()` first.
use std::convert::AsRef;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

struct NABufferData<T> {
    data: T,
    refs: AtomicUsize,
}

/// Reference-counted buffer handle.
pub struct NABufferRef<T> {
    ptr: NonNull<NABufferData<T>>,
}

unsafe impl<T: Send> Send for NABufferRef<T> {}
unsafe impl<T: Sync> Sync for NABufferRef<T> {}

impl<T> NABufferRef<T> {
    /// Wraps a value into a new reference-counted buffer.
    pub fn new(val: T) -> Self {
        let bdata = Box::new(NABufferData { data: val, refs: AtomicUsize::new(1) });
        Self { ptr: NonNull::from(Box::leak(bdata)) }
    }
    /// Reports the number of live references to the buffer.
    pub fn get_num_refs(&self) -> usize {
        unsafe { self.ptr.as_ref() }.refs.load(Ordering::Relaxed)
    }
    /// Returns a mutable reference to the payload.
    pub fn as_mut(&mut self) -> Option<&mut T> {
        Some(unsafe { &mut self.ptr.as_mut().data })
    }
}

impl<T> AsRef<T> for NABufferRef<T> {
    fn as_ref(&self) -> &T {
        &unsafe { self.ptr.as_ref() }.data
    }
}

impl<T> Deref for NABufferRef<T> {
    type Target = T;
    fn deref(&self) -> &T { self.as_ref() }
}

impl<T> DerefMut for NABufferRef<T> {
    fn deref_mut(&mut self) -> &mut T { self.as_mut().unwrap() }
}

impl<T> Clone for NABufferRef<T> {
    fn clone(&self) -> Self {
        unsafe { self.ptr.as_ref() }.refs.fetch_add(1, Ordering::SeqCst);
        Self { ptr: self.ptr }
    }
}

impl<T> Drop for NABufferRef<T> {
    fn drop(&mut self) {
        let last = unsafe { self.ptr.as_ref() }.refs.fetch_sub(1, Ordering::SeqCst) == 1;
        if last {
            let _ = unsafe { Box::from_raw(self.ptr.as_ptr()) };
        }
    }
}

impl<T: Default> Default for NABufferRef<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn refcount() {
        let mut buf = NABufferRef::new(vec![0u16; 4]);
        assert_eq!(buf.get_num_refs(), 1);
        let copy = buf.clone();
        assert_eq!(buf.get_num_refs(), 2);
        buf.as_mut().unwrap()[0] = 42;
        assert_eq!(copy[0], 42);
        std::mem::drop(copy);
        assert_eq!(buf.get_num_refs(), 1);
    }
}
