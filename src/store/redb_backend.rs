use super::{Capability, Direction, OpenError, OrderedStore, Seek, StoreError, Visitor};
use crate::encoding::Key;
use redb::{
    AccessGuard, ReadOnlyDatabase, ReadOnlyTable, ReadableDatabase, ReadableTable,
    ReadableTableMetadata, StorageError, TableDefinition, TableError,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Table holding `timestamp key -> encoded reading` entries.
pub const READINGS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("readings");

type Entry<'a> = (AccessGuard<'a, &'static [u8]>, AccessGuard<'a, &'static [u8]>);

/// Ordered store backed by a redb database file, opened read-only.
///
/// The file is opened with redb's [`ReadOnlyDatabase`]: nothing is ever
/// written to it and any number of read-only handles, in this process or
/// others, may hold it at the same time. Every operation runs in its own read
/// transaction, so a scan sees one consistent snapshot. A database without a
/// `readings` table reads as empty.
///
/// redb's writer holds an exclusive lock on the file for as long as it has it
/// open, so opening fails with [`OpenError::Backend`] while a writer is
/// attached.
///
/// Clones share the same open handle.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<ReadOnlyDatabase>,
    path: PathBuf,
}

impl fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn backend_error(err: impl fmt::Display) -> StoreError {
    StoreError::backend(err.to_string())
}

impl RedbStore {
    /// Opens an existing database file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(OpenError::NotFound(path));
        }
        let db = ReadOnlyDatabase::open(&path).map_err(|e| OpenError::Backend {
            path: path.clone(),
            source: e.to_string().into(),
        })?;

        #[cfg(feature = "logging")]
        log::info!("opened redb reading store at {}", path.display());

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Runs `f` against the readings table inside a fresh read transaction.
    ///
    /// Returns `Ok(None)` if the table has never been created.
    fn with_table<T>(
        &self,
        f: impl FnOnce(&ReadOnlyTable<&'static [u8], &'static [u8]>) -> Result<T, StorageError>,
    ) -> Result<Option<T>, StoreError> {
        let txn = self.db.begin_read().map_err(backend_error)?;
        let table = match txn.open_table(READINGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(backend_error(e)),
        };
        f(&table).map(Some).map_err(backend_error)
    }
}

/// Feeds entries to `visit` until exhausted or told to stop.
fn drive<'a>(
    entries: impl Iterator<Item = Result<Entry<'a>, StorageError>>,
    visit: &mut Visitor<'_>,
) -> Result<(), StorageError> {
    for entry in entries {
        let (key, value) = entry?;
        if visit(key.value(), value.value()).is_break() {
            break;
        }
    }
    Ok(())
}

impl OrderedStore for RedbStore {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::PointLookup, Capability::OrderedScan]
    }

    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        let found = self.with_table(|table| {
            Ok(table
                .get(key.as_bytes())?
                .map(|guard| guard.value().to_vec()))
        })?;
        Ok(found.flatten())
    }

    fn scan(
        &self,
        seek: Seek,
        direction: Direction,
        visit: &mut Visitor<'_>,
    ) -> Result<(), StoreError> {
        self.with_table(|table| match (seek, direction) {
            (Seek::First, Direction::Forward) => drive(table.iter()?, visit),
            (Seek::Last, Direction::Reverse) => drive(table.iter()?.rev(), visit),
            (Seek::Last, Direction::Forward) => drive(table.last()?.into_iter().map(Ok), visit),
            (Seek::First, Direction::Reverse) => drive(table.first()?.into_iter().map(Ok), visit),
            (Seek::AtOrAfter(key), Direction::Forward) => {
                drive(table.range(key.as_bytes()..)?, visit)
            }
            (Seek::AtOrAfter(key), Direction::Reverse) => {
                let start = match table.range(key.as_bytes()..)?.next() {
                    Some(entry) => Some(entry?.0.value().to_vec()),
                    None => None,
                };
                match start {
                    Some(start) => drive(table.range(..=start.as_slice())?.rev(), visit),
                    None => Ok(()),
                }
            }
        })?;
        Ok(())
    }

    fn exact_len(&self) -> Result<Option<u64>, StoreError> {
        Ok(Some(self.with_table(ReadableTableMetadata::len)?.unwrap_or(0)))
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
