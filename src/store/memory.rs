use super::{Capability, Direction, OrderedStore, Seek, StoreError, Visitor};
use crate::encoding::Key;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory ordered store.
///
/// Entries are supplied up front or through [`MemoryStore::insert`]; the
/// query layer only reads. [`MemoryStore::close`] makes every later
/// operation fail with [`StoreError::Closed`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a raw entry, replacing any previous value for `key`.
    pub fn insert(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the store.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<K: Into<Vec<u8>>, V: Into<Vec<u8>>> FromIterator<(K, V)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let store = Self::new();
        for (key, value) in iter {
            store.insert(key, value);
        }
        store
    }
}

impl OrderedStore for MemoryStore {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::PointLookup, Capability::OrderedScan]
    }

    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_open()?;
        Ok(self.read().get(key.as_bytes()).cloned())
    }

    fn scan(
        &self,
        seek: Seek,
        direction: Direction,
        visit: &mut Visitor<'_>,
    ) -> Result<(), StoreError> {
        self.check_open()?;
        let entries = self.read();

        let lower: Bound<&[u8]> = match seek {
            Seek::AtOrAfter(ref key) => Bound::Included(key.as_bytes()),
            Seek::First | Seek::Last => Bound::Unbounded,
        };

        match (seek, direction) {
            (Seek::Last, Direction::Forward) => {
                if let Some((key, value)) = entries.last_key_value() {
                    let _ = visit(key, value);
                }
            }
            (_, Direction::Forward) => {
                for (key, value) in entries.range::<[u8], _>((lower, Bound::Unbounded)) {
                    if visit(key, value).is_break() {
                        break;
                    }
                }
            }
            (Seek::First, Direction::Reverse) => {
                if let Some((key, value)) = entries.first_key_value() {
                    let _ = visit(key, value);
                }
            }
            (Seek::Last, Direction::Reverse) => {
                for (key, value) in entries.iter().rev() {
                    if visit(key, value).is_break() {
                        break;
                    }
                }
            }
            (Seek::AtOrAfter(key), Direction::Reverse) => {
                // Positioned on the first entry >= key, then walking down; a
                // seek past the last key leaves nothing to walk.
                let start = entries
                    .range::<[u8], _>((Bound::Included(key.as_bytes()), Bound::Unbounded))
                    .next()
                    .map(|(k, _)| k.clone());
                if let Some(start) = start {
                    let upper = Bound::Included(start.as_slice());
                    for (k, value) in entries.range::<[u8], _>((Bound::Unbounded, upper)).rev() {
                        if visit(k, value).is_break() {
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn exact_len(&self) -> Result<Option<u64>, StoreError> {
        self.check_open()?;
        Ok(Some(self.read().len() as u64))
    }
}
