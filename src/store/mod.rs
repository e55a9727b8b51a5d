//! Ordered key-value store capability and its backends.
//!
//! The query layer never holds a cursor across calls. Each scan hands the
//! backend a visitor; the backend opens its cursor, feeds entries to the
//! visitor in key order and releases the cursor before returning, whether the
//! walk ran to the end, the visitor broke out early or an error occurred.
//!
//! # Backends
//!
//! - [`RedbStore`]: a redb file with a `readings` table
//! - [`MemoryStore`]: an in-process `BTreeMap`
//! - [`PointOnlyStore`]: wraps another store and allows point lookups only
//! - `RocksDbStore` (feature `rocksdb`): the sensor daemon's `RocksDB` directory

use crate::encoding::Key;
use std::fmt;
use std::io;
use std::ops::ControlFlow;
use std::path::PathBuf;

mod memory;
mod point_only;
mod redb_backend;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use memory::MemoryStore;
pub use point_only::PointOnlyStore;
pub use redb_backend::{READINGS_TABLE, RedbStore};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

/// Operations a store may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Single-key lookup.
    PointLookup,
    /// Forward and reverse ordered iteration.
    OrderedScan,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PointLookup => f.write_str("point lookup"),
            Self::OrderedScan => f.write_str("ordered scan"),
        }
    }
}

/// Where a scan starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seek {
    /// The first entry in key order.
    First,
    /// The last entry in key order.
    Last,
    /// The first entry whose key is `>=` this key.
    AtOrAfter(Key),
}

/// Direction in which a scan walks from its seek point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order.
    Forward,
    /// Descending key order.
    Reverse,
}

/// Error returned by store operations after a successful open.
#[derive(Debug)]
pub enum StoreError {
    /// The store has been closed.
    Closed,
    /// The store does not support the requested operation.
    Unsupported(Capability),
    /// The backend failed.
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StoreError {
    pub(crate) fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self::Backend(err.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "store is closed"),
            Self::Unsupported(cap) => write!(f, "store does not support {cap}"),
            Self::Backend(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Error returned when a store cannot be opened read-only.
#[derive(Debug)]
pub enum OpenError {
    /// Nothing exists at the given path.
    NotFound(PathBuf),
    /// The backend refused to open the store.
    Backend {
        /// Path that was being opened.
        path: PathBuf,
        /// Underlying failure.
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "store path does not exist: {}", path.display()),
            Self::Backend { path, source } => {
                write!(f, "failed to open store at {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend { source, .. } => Some(source.as_ref()),
            Self::NotFound(_) => None,
        }
    }
}

/// Visitor fed raw `(key, value)` pairs during a scan.
pub type Visitor<'v> = dyn FnMut(&[u8], &[u8]) -> ControlFlow<()> + 'v;

/// A key-value store with byte-lexicographic key order.
///
/// Stores are only ever read. Backends that cannot iterate report that
/// through [`OrderedStore::capabilities`] and fail scans with
/// [`StoreError::Unsupported`].
pub trait OrderedStore {
    /// Operations this store supports.
    fn capabilities(&self) -> &'static [Capability];

    /// Returns `true` if `capability` is supported.
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Looks up a single key.
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError>;

    /// Walks entries from `seek` in `direction`, feeding each to `visit`
    /// until the store is exhausted or `visit` breaks.
    fn scan(
        &self,
        seek: Seek,
        direction: Direction,
        visit: &mut Visitor<'_>,
    ) -> Result<(), StoreError>;

    /// Returns the raw bytes of the smallest key.
    fn first_key(&self) -> Result<Option<Vec<u8>>, StoreError> {
        probe_key(self, Seek::First, Direction::Forward)
    }

    /// Returns the raw bytes of the largest key.
    fn last_key(&self) -> Result<Option<Vec<u8>>, StoreError> {
        probe_key(self, Seek::Last, Direction::Reverse)
    }

    /// Returns the exact number of entries if the backend tracks it cheaply.
    fn exact_len(&self) -> Result<Option<u64>, StoreError> {
        Ok(None)
    }

    /// Filesystem location of the store, if it has one.
    fn path(&self) -> Option<&std::path::Path> {
        None
    }
}

fn probe_key<S: OrderedStore + ?Sized>(
    store: &S,
    seek: Seek,
    direction: Direction,
) -> Result<Option<Vec<u8>>, StoreError> {
    let mut found = None;
    store.scan(seek, direction, &mut |key, _| {
        found = Some(key.to_vec());
        ControlFlow::Break(())
    })?;
    Ok(found)
}

impl<S: OrderedStore + ?Sized> OrderedStore for &S {
    fn capabilities(&self) -> &'static [Capability] {
        (**self).capabilities()
    }

    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn scan(
        &self,
        seek: Seek,
        direction: Direction,
        visit: &mut Visitor<'_>,
    ) -> Result<(), StoreError> {
        (**self).scan(seek, direction, visit)
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).first_key()
    }

    fn last_key(&self) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).last_key()
    }

    fn exact_len(&self) -> Result<Option<u64>, StoreError> {
        (**self).exact_len()
    }

    fn path(&self) -> Option<&std::path::Path> {
        (**self).path()
    }
}

impl<S: OrderedStore + ?Sized> OrderedStore for Box<S> {
    fn capabilities(&self) -> &'static [Capability] {
        (**self).capabilities()
    }

    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn scan(
        &self,
        seek: Seek,
        direction: Direction,
        visit: &mut Visitor<'_>,
    ) -> Result<(), StoreError> {
        (**self).scan(seek, direction, visit)
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).first_key()
    }

    fn last_key(&self) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).last_key()
    }

    fn exact_len(&self) -> Result<Option<u64>, StoreError> {
        (**self).exact_len()
    }

    fn path(&self) -> Option<&std::path::Path> {
        (**self).path()
    }
}
