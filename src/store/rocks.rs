use super::{Capability, Direction, OpenError, OrderedStore, Seek, StoreError, Visitor};
use crate::encoding::Key;
use rocksdb::{DB, DBRawIterator, Options};
use std::path::{Path, PathBuf};

/// Ordered store over the sensor daemon's `RocksDB` directory, opened read-only.
///
/// Scans drive a raw iterator directly: `seek` / `seek_to_last` position it
/// and `next` / `prev` walk it. The iterator is dropped when the scan returns.
pub struct RocksDbStore {
    db: DB,
    path: PathBuf,
}

impl std::fmt::Debug for RocksDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RocksDbStore {
    /// Opens the database directory without taking the writer's lock.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(OpenError::NotFound(path));
        }
        let mut opts = Options::default();
        opts.create_if_missing(false);
        let db = DB::open_for_read_only(&opts, &path, false).map_err(|e| OpenError::Backend {
            path: path.clone(),
            source: Box::new(e),
        })?;

        #[cfg(feature = "logging")]
        log::info!("opened rocksdb reading store at {}", path.display());

        Ok(Self { db, path })
    }
}

fn walk(
    iter: &mut DBRawIterator<'_>,
    direction: Direction,
    visit: &mut Visitor<'_>,
) -> Result<(), StoreError> {
    while iter.valid() {
        let (Some(key), Some(value)) = (iter.key(), iter.value()) else {
            break;
        };
        if visit(key, value).is_break() {
            return Ok(());
        }
        match direction {
            Direction::Forward => iter.next(),
            Direction::Reverse => iter.prev(),
        }
    }
    // An invalid iterator is either exhausted or failed; status tells which.
    iter.status().map_err(StoreError::backend)
}

impl OrderedStore for RocksDbStore {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::PointLookup, Capability::OrderedScan]
    }

    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(key.as_bytes()).map_err(StoreError::backend)
    }

    fn scan(
        &self,
        seek: Seek,
        direction: Direction,
        visit: &mut Visitor<'_>,
    ) -> Result<(), StoreError> {
        let mut iter = self.db.raw_iterator();
        match seek {
            Seek::First => iter.seek_to_first(),
            Seek::Last => iter.seek_to_last(),
            Seek::AtOrAfter(key) => iter.seek(key.as_bytes()),
        }
        walk(&mut iter, direction, visit)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
