use std::sync::Arc;

use objectstore::{MemoryObjectStore, ObjectStoreClient};
use pathmap::PathMapper;
use pool::ConnectionPool;

/// Shared, read-only state every dispatched worker needs: a pool of backend
/// handles, the configured path mapper, and the read block size used when
/// streaming object bytes.
///
/// Constructed once in the process entrypoint and cloned (cheaply, via
/// [`Arc`]) into every dispatched task, rather than reached for through a
/// global singleton.
pub struct WorkerContext {
    pool: ConnectionPool<Box<dyn ObjectStoreClient>>,
    path_mapper: PathMapper,
    read_block_size: usize,
}

impl WorkerContext {
    /// Builds a context over an already-constructed connection pool, path
    /// mapper, and read block size.
    #[must_use]
    pub fn new(pool: ConnectionPool<Box<dyn ObjectStoreClient>>, path_mapper: PathMapper, read_block_size: usize) -> Self {
        Self {
            pool,
            path_mapper,
            read_block_size,
        }
    }

    /// Checks out the next backend handle in round-robin rotation.
    #[must_use]
    pub fn client(&self) -> Arc<Box<dyn ObjectStoreClient>> {
        self.pool.get()
    }

    /// The configured path mapper.
    #[must_use]
    pub const fn path_mapper(&self) -> &PathMapper {
        &self.path_mapper
    }

    /// The read block size, in bytes, used when streaming object bytes.
    #[must_use]
    pub const fn read_block_size(&self) -> usize {
        self.read_block_size
    }
}

/// Builds a [`WorkerContext`] over a single in-memory backend, the identity
/// path mapper, and a 64 KiB read block size. Intended for doctests and
/// demonstrations rather than a production deployment.
#[must_use]
pub fn default_context() -> WorkerContext {
    let pool = ConnectionPool::build(1, |_| {
        Ok::<Box<dyn ObjectStoreClient>, std::convert::Infallible>(Box::new(MemoryObjectStore::new()))
    })
    .expect("a single-connection pool always builds");
    WorkerContext::new(pool, PathMapper::identity(), 64 * 1024)
}
