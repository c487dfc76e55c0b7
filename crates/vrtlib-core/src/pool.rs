//! Cache-aligned buffer pool.
//!
//! The demultiplexer keeps two sample buffers per channel, each large
//! enough to hold millions of samples. [`AlignedBufferPool`] carves all of
//! them out of one allocation with every buffer starting on an `alignment`
//! boundary, so vectorized conversion loops never straddle a cache line at
//! the start of a buffer.
//!
//! Once allocated, the pool can be split into independently owned
//! [`AlignedBuffer`]s with [`AlignedBufferPool::into_buffers`]. Each buffer
//! covers a disjoint region and keeps the shared allocation alive, so a
//! buffer can be locked and written from one thread while its sibling is
//! read from another.

use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Default alignment: one cache line on common x86-64 and ARM cores.
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Owner of the raw allocation; freed when the last view is dropped.
struct Allocation {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc::alloc` with exactly `layout`
        // and is freed only here, once, when the last `Arc` goes away.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: the allocation is plain memory; access is mediated by the typed
// views below, which never alias one another.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

/// A set of equally sized, aligned buffers sharing one allocation.
pub struct AlignedBufferPool<T> {
    memory: Arc<Allocation>,
    count: usize,
    buffer_len: usize,
    stride: usize,
    alignment: usize,
    _marker: PhantomData<T>,
}

impl<T: Copy + Default> AlignedBufferPool<T> {
    /// Allocate `count` buffers of `buffer_len` elements each.
    ///
    /// Every buffer starts on an `alignment`-byte boundary (raised to the
    /// natural alignment of `T` if that is larger) and is filled with
    /// `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for zero sizes, a non power of
    /// two alignment, a zero-sized `T`, or a size that overflows, and
    /// [`Error::ResourceExhausted`] if the allocator refuses the request.
    pub fn allocate(count: usize, buffer_len: usize, alignment: usize) -> Result<Self> {
        if count == 0 || buffer_len == 0 {
            return Err(Error::InvalidParameter(format!(
                "buffer pool needs a non-zero count and length (got {count} x {buffer_len})"
            )));
        }
        if !alignment.is_power_of_two() {
            return Err(Error::InvalidParameter(format!(
                "alignment {alignment} is not a power of two"
            )));
        }
        if mem::size_of::<T>() == 0 {
            return Err(Error::InvalidParameter(
                "buffer pool element type has zero size".into(),
            ));
        }

        let alignment = alignment.max(mem::align_of::<T>());
        let stride = buffer_len
            .checked_mul(mem::size_of::<T>())
            .and_then(|bytes| bytes.checked_next_multiple_of(alignment))
            .ok_or_else(|| Error::InvalidParameter("buffer length overflows".into()))?;
        let total = stride
            .checked_mul(count)
            .ok_or_else(|| Error::InvalidParameter("buffer pool size overflows".into()))?;
        let layout = Layout::from_size_align(total, alignment)
            .map_err(|e| Error::InvalidParameter(format!("buffer pool layout: {e}")))?;

        // SAFETY: `layout` has a non-zero size (count, buffer_len and
        // size_of::<T>() are all non-zero).
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            Error::ResourceExhausted(format!("failed to allocate {total} bytes for buffer pool"))
        })?;

        for i in 0..count {
            // SAFETY: each buffer start lies within the allocation, is
            // aligned to `alignment >= align_of::<T>()`, and holds
            // `buffer_len` elements because `stride >= buffer_len * size_of::<T>()`.
            unsafe {
                let base = ptr.as_ptr().add(i * stride).cast::<T>();
                for j in 0..buffer_len {
                    base.add(j).write(T::default());
                }
            }
        }

        tracing::debug!(
            count,
            buffer_len,
            alignment,
            bytes = total,
            "Allocated aligned buffer pool"
        );

        Ok(AlignedBufferPool {
            memory: Arc::new(Allocation { ptr, layout }),
            count,
            buffer_len,
            stride,
            alignment,
            _marker: PhantomData,
        })
    }

    /// Number of buffers in the pool.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the pool holds no buffers (never true for a constructed pool).
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of elements in each buffer.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Effective alignment of each buffer in bytes.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Borrow buffer `index`, or `None` if out of range.
    pub fn at(&self, index: usize) -> Option<&[T]> {
        if index >= self.count {
            return None;
        }
        // SAFETY: in range, initialized in `allocate`, and `&self` prevents
        // any mutable view of the same region for the borrow's lifetime.
        Some(unsafe { slice::from_raw_parts(self.buffer_ptr(index).as_ptr(), self.buffer_len) })
    }

    /// Mutably borrow buffer `index`, or `None` if out of range.
    pub fn at_mut(&mut self, index: usize) -> Option<&mut [T]> {
        if index >= self.count {
            return None;
        }
        // SAFETY: as in `at`, with `&mut self` guaranteeing exclusivity.
        Some(unsafe {
            slice::from_raw_parts_mut(self.buffer_ptr(index).as_ptr(), self.buffer_len)
        })
    }

    /// Split the pool into independently owned buffers, in index order.
    pub fn into_buffers(self) -> Vec<AlignedBuffer<T>> {
        (0..self.count)
            .map(|i| AlignedBuffer {
                _memory: Arc::clone(&self.memory),
                ptr: self.buffer_ptr(i),
                len: self.buffer_len,
            })
            .collect()
    }

    fn buffer_ptr(&self, index: usize) -> NonNull<T> {
        // SAFETY: callers pass `index < count`, so the offset stays inside
        // the allocation and the result is non-null.
        unsafe { NonNull::new_unchecked(self.memory.ptr.as_ptr().add(index * self.stride).cast()) }
    }
}

impl<T> fmt::Debug for AlignedBufferPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBufferPool")
            .field("count", &self.count)
            .field("buffer_len", &self.buffer_len)
            .field("alignment", &self.alignment)
            .finish()
    }
}

/// One buffer split off an [`AlignedBufferPool`].
///
/// Dereferences to a slice of the buffer's elements.
pub struct AlignedBuffer<T> {
    _memory: Arc<Allocation>,
    ptr: NonNull<T>,
    len: usize,
}

// SAFETY: each `AlignedBuffer` is the only view of its region, so it can be
// moved or shared across threads exactly when `T` can.
unsafe impl<T: Send> Send for AlignedBuffer<T> {}
unsafe impl<T: Sync> Sync for AlignedBuffer<T> {}

impl<T> AlignedBuffer<T> {
    /// Address of the first element, for alignment checks.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }
}

impl<T> Deref for AlignedBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: `ptr`/`len` describe an initialized region kept alive by
        // `_memory` and not aliased by any other view.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for AlignedBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `deref`, with `&mut self` guaranteeing exclusivity.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> fmt::Debug for AlignedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComplexSample;

    #[test]
    fn allocate_reports_shape() {
        let pool = AlignedBufferPool::<f32>::allocate(4, 100, 64).unwrap();
        assert_eq!(pool.len(), 4);
        assert!(!pool.is_empty());
        assert_eq!(pool.buffer_len(), 100);
        assert_eq!(pool.alignment(), 64);
    }

    #[test]
    fn every_buffer_is_aligned() {
        // 3 complex samples = 24 bytes, deliberately not a multiple of 64.
        let pool = AlignedBufferPool::<ComplexSample>::allocate(5, 3, 64).unwrap();
        for i in 0..pool.len() {
            let addr = pool.at(i).unwrap().as_ptr() as usize;
            assert_eq!(addr % 64, 0, "buffer {i} misaligned");
        }
        for buf in pool.into_buffers() {
            assert_eq!(buf.as_ptr() as usize % 64, 0);
        }
    }

    #[test]
    fn buffers_start_defaulted() {
        let pool = AlignedBufferPool::<ComplexSample>::allocate(2, 16, 16).unwrap();
        assert!(pool.at(0).unwrap().iter().all(|s| *s == ComplexSample::new(0.0, 0.0)));
        assert!(pool.at(1).unwrap().iter().all(|s| *s == ComplexSample::new(0.0, 0.0)));
    }

    #[test]
    fn at_out_of_range_is_none() {
        let mut pool = AlignedBufferPool::<u32>::allocate(2, 8, 16).unwrap();
        assert!(pool.at(2).is_none());
        assert!(pool.at_mut(5).is_none());
    }

    #[test]
    fn buffers_do_not_overlap() {
        let mut buffers = AlignedBufferPool::<u32>::allocate(3, 10, 32)
            .unwrap()
            .into_buffers();
        for (i, buf) in buffers.iter_mut().enumerate() {
            buf.fill(i as u32 + 1);
        }
        for (i, buf) in buffers.iter().enumerate() {
            assert_eq!(buf.len(), 10);
            assert!(buf.iter().all(|&v| v == i as u32 + 1));
        }
    }

    #[test]
    fn buffers_outlive_pool_handle() {
        let buffers = AlignedBufferPool::<u8>::allocate(2, 4, 8).unwrap().into_buffers();
        let mut second = buffers.into_iter().nth(1).unwrap();
        second.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&*second, &[1, 2, 3, 4]);
    }

    #[test]
    fn buffers_can_move_across_threads() {
        let mut buffers = AlignedBufferPool::<u64>::allocate(2, 4, 64).unwrap().into_buffers();
        let mut buf = buffers.pop().unwrap();
        let handle = std::thread::spawn(move || {
            buf[3] = 42;
            buf
        });
        let buf = handle.join().unwrap();
        assert_eq!(buf[3], 42);
    }

    #[test]
    fn reject_zero_count() {
        let err = AlignedBufferPool::<u8>::allocate(0, 4, 8).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn reject_zero_length() {
        let err = AlignedBufferPool::<u8>::allocate(4, 0, 8).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn reject_non_power_of_two_alignment() {
        let err = AlignedBufferPool::<u8>::allocate(1, 4, 24).unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }

    #[test]
    fn alignment_raised_to_element_alignment() {
        let pool = AlignedBufferPool::<u64>::allocate(1, 4, 1).unwrap();
        assert_eq!(pool.alignment(), mem::align_of::<u64>());
    }

    #[test]
    fn reject_overflowing_size() {
        let err = AlignedBufferPool::<u64>::allocate(2, usize::MAX / 4, 64).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }
}
