use std::path::Path;

use crate::error::QueryError;
use crate::query::{LivenessProbe, SensorHistory};
use crate::reading::{ProtobufCodec, ReadingCodec};
use crate::store::{OrderedStore, RedbStore};

/// Default ceiling for the record-count walk.
///
/// Counting stops here on stores that cannot report their size, bounding the
/// latency of [`SensorHistory::database_info`] on large stores.
pub const DEFAULT_COUNT_CEILING: u64 = 10_000;

/// Settings for a [`SensorHistory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Maximum number of records counted by the bounded walk.
    ///
    /// Default: 10 000
    pub count_ceiling: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            count_ceiling: DEFAULT_COUNT_CEILING,
        }
    }
}

/// Builder for configuring and opening a [`SensorHistory`].
///
/// # Example
///
/// ```rust,no_run
/// use sensor_history::SensorHistory;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let history = SensorHistory::builder()
///     .count_ceiling(50_000)
///     .open("readings.redb")?;
/// # Ok(())
/// # }
/// ```
pub struct SensorHistoryBuilder<C = ProtobufCodec> {
    codec: C,
    config: QueryConfig,
    probe: Option<Box<dyn LivenessProbe>>,
}

impl SensorHistoryBuilder {
    /// Creates a new builder with default settings and the protobuf codec.
    pub fn new() -> Self {
        Self {
            codec: ProtobufCodec,
            config: QueryConfig::default(),
            probe: None,
        }
    }
}

impl Default for SensorHistoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ReadingCodec> SensorHistoryBuilder<C> {
    /// Sets the ceiling of the bounded record-count walk.
    ///
    /// Only used for stores that cannot report their exact size. A ceiling of
    /// zero is raised to one.
    #[must_use]
    pub fn count_ceiling(mut self, ceiling: u64) -> Self {
        self.config.count_ceiling = ceiling.max(1);
        self
    }

    /// Replaces all settings at once.
    #[must_use]
    pub fn config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self.config.count_ceiling = self.config.count_ceiling.max(1);
        self
    }

    /// Decodes stored values with `codec` instead of the protobuf default.
    #[must_use]
    pub fn codec<C2: ReadingCodec>(self, codec: C2) -> SensorHistoryBuilder<C2> {
        SensorHistoryBuilder {
            codec,
            config: self.config,
            probe: self.probe,
        }
    }

    /// Installs a probe answering [`SensorHistory::daemon_running`].
    #[must_use]
    pub fn liveness_probe(mut self, probe: impl LivenessProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    /// Opens a redb reading store at `path`.
    ///
    /// Fails with [`QueryError::Open`] if the file is missing or cannot be
    /// opened; no partially initialized facade is returned.
    pub fn open(self, path: impl AsRef<Path>) -> Result<SensorHistory<RedbStore, C>, QueryError> {
        let store = RedbStore::open(path)?;
        Ok(self.with_store(store))
    }

    /// Opens the sensor daemon's `RocksDB` directory read-only.
    #[cfg(feature = "rocksdb")]
    pub fn open_rocksdb(
        self,
        path: impl AsRef<Path>,
    ) -> Result<SensorHistory<crate::store::RocksDbStore, C>, QueryError> {
        let store = crate::store::RocksDbStore::open_read_only(path)?;
        Ok(self.with_store(store))
    }

    /// Builds a facade over an already open store.
    pub fn with_store<S: OrderedStore>(self, store: S) -> SensorHistory<S, C> {
        SensorHistory::from_parts(store, self.codec, self.config, self.probe)
    }
}
