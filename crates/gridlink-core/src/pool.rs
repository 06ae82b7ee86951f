//! Fixed-size sample pool with reference-counted handles.
//!
//! All sample storage is allocated when the pool is created. Handing out a
//! sample pops a slot index from a lock-free free list, and the slot goes
//! back onto the list when the last handle referring to it is dropped.
//!
//! Two handle types exist:
//!
//! - [`SampleMut`] - the only reference to a slot; gives mutable access.
//! - [`Sample`] - a shared, immutable reference; cloning it increments the
//!   slot's atomic reference count.
//!
//! A `SampleMut` becomes a `Sample` through [`SampleMut::freeze`]. The way
//! back is either [`Sample::try_into_mut`] (only if no other reference
//! exists) or [`Sample::to_mut`], which copies into a fresh slot.
//!
//! ```text
//!  allocate() ──▶ SampleMut ──freeze()──▶ Sample ──clone()──▶ Sample ...
//!                    ▲                       │
//!                    └──── try_into_mut() ───┘      last drop ──▶ free list
//! ```

use crate::sample::SampleData;
use crossbeam::queue::ArrayQueue;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::sync::Arc;

struct Slot {
    refcount: AtomicUsize,
    data: UnsafeCell<SampleData>,
}

// SAFETY: `data` is only written through a `SampleMut`, which exists only
// while the slot's reference count is exactly one and no `Sample` refers to
// it. Shared handles only ever read.
unsafe impl Sync for Slot {}

struct PoolInner {
    slots: Box<[Slot]>,
    free: ArrayQueue<u32>,
    sample_capacity: usize,
}

impl PoolInner {
    fn slot(&self, index: u32) -> &Slot {
        &self.slots[index as usize]
    }

    /// Return a slot whose last reference is gone.
    fn release(&self, index: u32) {
        // SAFETY: the reference count reached zero, nothing else can reach
        // this slot until it is handed out again.
        unsafe { (*self.slot(index).data.get()).reset() };
        let pushed = self.free.push(index).is_ok();
        debug_assert!(pushed, "free list is sized to the slot count");
    }
}

/// A pre-sized pool of samples.
///
/// Cloning the pool is cheap and yields another handle to the same slots.
#[derive(Clone)]
pub struct SamplePool {
    inner: Arc<PoolInner>,
}

impl SamplePool {
    /// Create a pool of `size` samples, each able to hold `sample_capacity`
    /// values. A `size` of zero is raised to one.
    #[must_use]
    pub fn new(size: usize, sample_capacity: usize) -> Self {
        let size = size.max(1);
        let slots: Box<[Slot]> = (0..size)
            .map(|_| Slot {
                refcount: AtomicUsize::new(0),
                data: UnsafeCell::new(SampleData::with_capacity(sample_capacity)),
            })
            .collect();

        let free = ArrayQueue::new(size);
        for index in 0..size {
            let _ = free.push(index as u32);
        }

        Self {
            inner: Arc::new(PoolInner {
                slots,
                free,
                sample_capacity,
            }),
        }
    }

    /// Take one sample from the pool, or `None` if the pool is exhausted.
    #[must_use]
    pub fn allocate(&self) -> Option<SampleMut> {
        let index = self.inner.free.pop()?;
        self.inner.slot(index).refcount.store(1, Ordering::Relaxed);
        Some(SampleMut {
            pool: Arc::clone(&self.inner),
            index,
        })
    }

    /// Append up to `count` samples to `out`.
    ///
    /// Returns how many were appended; a short count means the pool ran
    /// dry, which callers treat as backpressure.
    pub fn allocate_into(&self, out: &mut Vec<SampleMut>, count: usize) -> usize {
        let mut allocated = 0;
        while allocated < count {
            match self.allocate() {
                Some(smp) => out.push(smp),
                None => break,
            }
            allocated += 1;
        }
        allocated
    }

    /// Allocate a sample holding a copy of `source`.
    #[must_use]
    pub fn copy_of(&self, source: &SampleData) -> Option<SampleMut> {
        let mut smp = self.allocate()?;
        smp.copy_from(source);
        Some(smp)
    }

    /// Total number of samples.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.slots.len()
    }

    /// Number of samples currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.free.len()
    }

    /// Number of values each sample can hold.
    #[must_use]
    pub fn sample_capacity(&self) -> usize {
        self.inner.sample_capacity
    }
}

impl fmt::Debug for SamplePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplePool")
            .field("size", &self.size())
            .field("available", &self.available())
            .field("sample_capacity", &self.sample_capacity())
            .finish()
    }
}

/// Exclusive, mutable handle to a pooled sample.
pub struct SampleMut {
    pool: Arc<PoolInner>,
    index: u32,
}

impl SampleMut {
    /// Publish the sample. From here on it can be shared but not modified.
    #[must_use]
    pub fn freeze(self) -> Sample {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the pool handle is moved out
        // exactly once and the reference count (one) carries over.
        let pool = unsafe { ptr::read(&this.pool) };
        Sample {
            pool,
            index: this.index,
        }
    }

    /// Whether both handles point at the same pool.
    #[must_use]
    pub fn is_from(&self, pool: &SamplePool) -> bool {
        Arc::ptr_eq(&self.pool, &pool.inner)
    }
}

impl Deref for SampleMut {
    type Target = SampleData;

    fn deref(&self) -> &SampleData {
        // SAFETY: a `SampleMut` is the only reference to its slot.
        unsafe { &*self.pool.slot(self.index).data.get() }
    }
}

impl DerefMut for SampleMut {
    fn deref_mut(&mut self) -> &mut SampleData {
        // SAFETY: a `SampleMut` is the only reference to its slot.
        unsafe { &mut *self.pool.slot(self.index).data.get() }
    }
}

impl Drop for SampleMut {
    fn drop(&mut self) {
        self.pool.slot(self.index).refcount.store(0, Ordering::Release);
        self.pool.release(self.index);
    }
}

impl fmt::Debug for SampleMut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Shared, immutable handle to a pooled sample.
pub struct Sample {
    pool: Arc<PoolInner>,
    index: u32,
}

impl Sample {
    /// Number of handles currently referring to this sample.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.pool.slot(self.index).refcount.load(Ordering::Acquire)
    }

    /// Regain mutable access if this is the only handle.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged if it is shared.
    pub fn try_into_mut(self) -> Result<SampleMut, Sample> {
        if self.ref_count() != 1 {
            return Err(self);
        }
        let this = ManuallyDrop::new(self);
        // SAFETY: see `SampleMut::freeze`.
        let pool = unsafe { ptr::read(&this.pool) };
        Ok(SampleMut {
            pool,
            index: this.index,
        })
    }

    /// Copy this sample into a fresh slot of `pool` (copy-on-write).
    #[must_use]
    pub fn to_mut(&self, pool: &SamplePool) -> Option<SampleMut> {
        pool.copy_of(self)
    }

    /// Whether two handles refer to the same slot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Sample) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool) && self.index == other.index
    }
}

impl Deref for Sample {
    type Target = SampleData;

    fn deref(&self) -> &SampleData {
        // SAFETY: shared handles never write and no `SampleMut` exists
        // while a `Sample` refers to the slot.
        unsafe { &*self.pool.slot(self.index).data.get() }
    }
}

impl Clone for Sample {
    fn clone(&self) -> Self {
        self.pool
            .slot(self.index)
            .refcount
            .fetch_add(1, Ordering::Relaxed);
        Self {
            pool: Arc::clone(&self.pool),
            index: self.index,
        }
    }
}

impl Drop for Sample {
    fn drop(&mut self) {
        let old = self
            .pool
            .slot(self.index)
            .refcount
            .fetch_sub(1, Ordering::Release);
        debug_assert!(old > 0, "sample refcount underflow");
        if old == 1 {
            fence(Ordering::Acquire);
            self.pool.release(self.index);
        }
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
