#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `pool` holds a small, fixed-size, round-robin pool of shared client
//! handles. The daemon dispatches every worker request through one of these
//! handles rather than opening a fresh backend connection per request.
//!
//! # Design
//!
//! [`ConnectionPool::build`] eagerly constructs up to `max_size` connections
//! via a caller-supplied factory, mirroring how the daemon used to eagerly
//! connect its whole backend pool at startup rather than lazily on first
//! use. [`ConnectionPool::get`] then hands out the next connection using a
//! genuinely atomic fetch-and-add index, so concurrent callers on different
//! worker threads never observe the same read-modify-write race a plain
//! `index = (index + 1) % len` would have under concurrent access.
//!
//! # Invariants
//!
//! - A pool never holds more than [`MAX_POOL_SIZE`] connections, regardless
//!   of what the caller requests; requesting more just logs a warning and
//!   clamps.
//! - [`ConnectionPool::get`] never panics and never blocks: it always
//!   returns the next handle in rotation.
//! - The rotation index advances atomically; concurrent [`ConnectionPool::get`]
//!   calls from multiple threads always observe distinct, monotonically
//!   increasing slot assignments (modulo pool size).
//!
//! # Errors
//!
//! [`PoolError`] reports a factory failure while eagerly constructing the
//! pool, and is bubbled up rather than leaving the pool partially built.
//!
//! # Examples
//!
//! ```
//! use pool::ConnectionPool;
//!
//! let pool = ConnectionPool::build(3, |i| Ok::<_, std::convert::Infallible>(i)).unwrap();
//! assert_eq!(pool.len(), 3);
//! assert_eq!(*pool.get(), 0);
//! assert_eq!(*pool.get(), 1);
//! assert_eq!(*pool.get(), 2);
//! assert_eq!(*pool.get(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hard upper bound on pool size, regardless of what a caller requests.
pub const MAX_POOL_SIZE: usize = 5;

/// Errors raised while building a [`ConnectionPool`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError<E> {
    /// The connection factory failed while eagerly populating the pool.
    #[error("failed to create pool connection {index}: {source}")]
    FactoryFailed {
        /// Index of the connection that failed to construct.
        index: usize,
        /// The underlying factory error.
        #[source]
        source: E,
    },
    /// The caller asked for a pool of zero connections.
    #[error("connection pool size must be at least 1")]
    EmptyPool,
}

/// A bounded, shared, round-robin pool of client handles.
///
/// `T` is typically a handle implementing a backend trait (such as
/// `objectstore::ObjectStoreClient`); the pool itself is agnostic to what it
/// holds.
#[derive(Debug)]
pub struct ConnectionPool<T> {
    connections: Vec<Arc<T>>,
    next: AtomicUsize,
}

impl<T> ConnectionPool<T> {
    /// Eagerly builds a pool of up to [`MAX_POOL_SIZE`] connections.
    ///
    /// `requested_size` is clamped down to [`MAX_POOL_SIZE`] (with a warning
    /// logged) rather than rejected, matching the deployment-time pool size
    /// cap. `factory` is called once per connection with its future index.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::EmptyPool`] if `requested_size` is 0, and
    /// [`PoolError::FactoryFailed`] if `factory` fails for any index; no
    /// partially-built pool is returned in that case.
    pub fn build<E>(requested_size: usize, mut factory: impl FnMut(usize) -> Result<T, E>) -> Result<Self, PoolError<E>> {
        if requested_size == 0 {
            return Err(PoolError::EmptyPool);
        }

        let size = if requested_size > MAX_POOL_SIZE {
            tracing::warn!(
                requested_size,
                clamped_to = MAX_POOL_SIZE,
                "requested connection pool size exceeds the hard cap; clamping"
            );
            MAX_POOL_SIZE
        } else {
            requested_size
        };

        let mut connections = Vec::with_capacity(size);
        for index in 0..size {
            let connection = factory(index).map_err(|source| PoolError::FactoryFailed { index, source })?;
            connections.push(Arc::new(connection));
        }

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of connections currently held by the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the pool holds no connections. Only possible after
    /// [`Self::build`] was given `requested_size == 0`, which is itself
    /// rejected, so this is always `false` for a successfully built pool.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns the next connection in round-robin rotation.
    ///
    /// Uses an atomic fetch-and-add so concurrent callers always advance the
    /// rotation consistently, unlike a plain `index = (index + 1) % len`
    /// read-modify-write under concurrent access.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        Arc::clone(&self.connections[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn build_rejects_zero_size() {
        let err = ConnectionPool::build(0, |i| Ok::<_, Infallible>(i)).unwrap_err();
        assert!(matches!(err, PoolError::EmptyPool));
    }

    #[test]
    fn build_clamps_to_hard_cap() {
        let pool = ConnectionPool::build(50, |i| Ok::<_, Infallible>(i)).unwrap();
        assert_eq!(pool.len(), MAX_POOL_SIZE);
    }

    #[test]
    fn build_propagates_factory_failure() {
        #[derive(Debug)]
        struct Boom;
        impl std::fmt::Display for Boom {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "boom")
            }
        }
        impl std::error::Error for Boom {}

        let err = ConnectionPool::build(3, |i| if i == 1 { Err(Boom) } else { Ok(i) }).unwrap_err();
        assert!(matches!(err, PoolError::FactoryFailed { index: 1, .. }));
    }

    #[test]
    fn get_rotates_round_robin() {
        let pool = ConnectionPool::build(3, |i| Ok::<_, Infallible>(i)).unwrap();
        let seen: Vec<usize> = (0..7).map(|_| *pool.get()).collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn get_is_safe_under_concurrent_access() {
        let pool = Arc::new(ConnectionPool::build(5, |i| Ok::<_, Infallible>(i)).unwrap());
        let threads = 8;
        let per_thread = 200;
        let barrier = Arc::new(Barrier::new(threads));

        let mut counts = [0usize; 5];
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut local = [0usize; 5];
                    for _ in 0..per_thread {
                        local[*pool.get()] += 1;
                    }
                    local
                })
            })
            .collect();

        for handle in handles {
            let local = handle.join().unwrap();
            for (total, count) in counts.iter_mut().zip(local) {
                *total += count;
            }
        }

        assert_eq!(counts.iter().sum::<usize>(), threads * per_thread);
    }
}
