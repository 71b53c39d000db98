//! Free-list object pool with RAII checkout.
//!
//! Request contexts and gzip compressors are recycled through a [`Pool`].
//! Objects are reset when checked out, so whatever a previous request left
//! behind is never observable, and they return to the pool when the
//! [`Pooled`] guard drops.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// An object that can be restored to a fresh state for reuse
pub trait Poolable {
    fn reset(&mut self);
}

impl<T: Poolable + ?Sized> Poolable for Box<T> {
    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Thread-safe pool of reusable objects
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    max_idle: usize,
    created: AtomicUsize,
}

impl<T: Poolable> Pool<T> {
    /// Create a pool keeping at most `max_idle` returned objects
    pub fn new<F>(max_idle: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle.min(256))),
            factory: Box::new(factory),
            max_idle,
            created: AtomicUsize::new(0),
        }
    }

    /// Check an object out, creating one if the pool is empty
    pub fn acquire(&self) -> Pooled<'_, T> {
        let recycled = self.free.lock().pop();
        let mut item = recycled.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        });
        item.reset();
        Pooled {
            pool: self,
            item: Some(item),
        }
    }

    fn release(&self, item: T) {
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(item);
        }
    }

    /// Objects currently waiting for reuse
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Objects created by the factory so far
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.free.lock().len())
            .field("max_idle", &self.max_idle)
            .field("created", &self.created.load(Ordering::Relaxed))
            .finish()
    }
}

/// A checked-out object; returned to its pool on drop
pub struct Pooled<'a, T: Poolable> {
    pool: &'a Pool<T>,
    /// `Some` until the guard drops
    item: Option<T>,
}

impl<T: Poolable> Deref for Pooled<'_, T> {
    type Target = T;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled object used after release")
    }
}

impl<T: Poolable> DerefMut for Pooled<'_, T> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled object used after release")
    }
}

impl<T: Poolable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Buffer {
        data: Vec<u8>,
        resets: usize,
    }

    impl Poolable for Buffer {
        fn reset(&mut self) {
            self.data.clear();
            self.resets += 1;
        }
    }

    #[test]
    fn objects_are_reused_and_reset() {
        let pool = Pool::new(4, Buffer::default);
        {
            let mut buf = pool.acquire();
            buf.data.extend_from_slice(b"stale");
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.acquire();
        assert!(buf.data.is_empty());
        assert_eq!(buf.resets, 2);
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn release_happens_once_per_checkout() {
        let pool = Pool::new(4, Buffer::default);
        for _ in 0..3 {
            let _buf = pool.acquire();
        }
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn surplus_is_dropped() {
        let pool = Pool::new(1, Buffer::default);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn concurrent_checkout() {
        let pool = Pool::new(8, Buffer::default);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for i in 0..100u8 {
                        let mut buf = pool.acquire();
                        assert!(buf.data.is_empty());
                        buf.data.push(i);
                    }
                });
            }
        });
        assert!(pool.idle() <= 8);
        assert!(pool.created() <= 8);
    }
}
