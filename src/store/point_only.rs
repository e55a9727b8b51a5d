use super::{Capability, Direction, OrderedStore, Seek, StoreError, Visitor};
use crate::encoding::Key;

/// A store binding limited to single-key lookups.
///
/// Some store bindings cannot iterate. Wrapping a store in `PointOnlyStore`
/// models one: `get` is forwarded, every scan fails with
/// [`StoreError::Unsupported`], and the query layer rejects range-based
/// operations up front instead of emulating them with point lookups.
#[derive(Debug)]
pub struct PointOnlyStore<S> {
    inner: S,
}

impl<S: OrderedStore> PointOnlyStore<S> {
    /// Restricts `inner` to point lookups.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns the wrapped store.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: OrderedStore> OrderedStore for PointOnlyStore<S> {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::PointLookup]
    }

    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn scan(
        &self,
        _seek: Seek,
        _direction: Direction,
        _visit: &mut Visitor<'_>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unsupported(Capability::OrderedScan))
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Unsupported(Capability::OrderedScan))
    }

    fn last_key(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Unsupported(Capability::OrderedScan))
    }

    fn path(&self) -> Option<&std::path::Path> {
        self.inner.path()
    }
}
