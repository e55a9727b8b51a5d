//! The public query surface: recent readings, time ranges, aggregates and
//! store information.

use crate::aggregate::{self, Bucket, Interval};
use crate::builder::{QueryConfig, SensorHistoryBuilder};
use crate::encoding::{self, Timestamp, encode_timestamp};
use crate::error::QueryError;
use crate::reading::{ProtobufCodec, Reading, ReadingCodec};
use crate::scanner::RangeScanner;
use crate::store::{Capability, Direction, OrderedStore, Seek};
use chrono::{DateTime, TimeDelta, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;

/// Reports whether the process that writes the store is alive.
///
/// Probing processes or service managers is left to the embedding
/// application; it hands the query layer an implementation.
pub trait LivenessProbe: Send + Sync {
    /// Returns `true` if the writer is running.
    fn is_running(&self) -> bool;
}

impl<F: Fn() -> bool + Send + Sync> LivenessProbe for F {
    fn is_running(&self) -> bool {
        self()
    }
}

/// Number of records in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCount {
    /// The store reported its exact size.
    Exact(u64),
    /// A bounded walk stopped at its ceiling; the store holds at least this many.
    AtLeast(u64),
}

impl fmt::Display for RecordCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::AtLeast(n) => write!(f, "{n}+"),
        }
    }
}

impl Serialize for RecordCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Exact(n) => serializer.serialize_u64(*n),
            Self::AtLeast(_) => serializer.collect_str(self),
        }
    }
}

/// Summary of a store's contents.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    /// Exact or lower-bound record count.
    pub record_count: RecordCount,
    /// Timestamp of the oldest record.
    pub earliest: Option<Timestamp>,
    /// Timestamp of the newest record.
    pub latest: Option<Timestamp>,
    /// Where the store lives, if on disk.
    pub path: Option<PathBuf>,
}

impl Serialize for DatabaseInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut info = serializer.serialize_struct("DatabaseInfo", 4)?;
        info.serialize_field("total_records", &self.record_count)?;
        info.serialize_field("database_path", &self.path)?;
        info.serialize_field("earliest_timestamp", &self.earliest.map(|t| t.to_string()))?;
        info.serialize_field("latest_timestamp", &self.latest.map(|t| t.to_string()))?;
        info.end()
    }
}

/// Read-only query facade over a sensor reading store.
///
/// # Example
///
/// ```rust,no_run
/// use sensor_history::SensorHistory;
/// use chrono::{TimeDelta, Utc};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let history = SensorHistory::open("/var/lib/sensor-daemon/readings.redb")?;
///
/// for reading in history.recent(10)? {
///     println!("{}: {:?} ppm", reading.timestamp(), reading.co2_ppm());
/// }
///
/// let end = Utc::now();
/// let start = end - TimeDelta::days(1);
/// for bucket in history.aggregate(start, end, TimeDelta::hours(1))? {
///     let co2 = bucket.stats(sensor_history::Measurement::Co2);
///     println!("{}: {} samples", bucket.start(), co2.count());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SensorHistory<S, C = ProtobufCodec> {
    store: S,
    codec: C,
    config: QueryConfig,
    probe: Option<Box<dyn LivenessProbe>>,
}

impl<S: fmt::Debug, C: fmt::Debug> fmt::Debug for SensorHistory<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorHistory")
            .field("store", &self.store)
            .field("codec", &self.codec)
            .field("config", &self.config)
            .field("probe", &self.probe.is_some())
            .finish()
    }
}

impl SensorHistory<crate::store::RedbStore> {
    /// Opens a redb reading store with default settings.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, QueryError> {
        SensorHistoryBuilder::new().open(path)
    }

    /// Returns a builder for custom settings.
    pub fn builder() -> SensorHistoryBuilder {
        SensorHistoryBuilder::new()
    }
}

impl<S: OrderedStore, C: ReadingCodec> SensorHistory<S, C> {
    pub(crate) fn from_parts(
        store: S,
        codec: C,
        config: QueryConfig,
        probe: Option<Box<dyn LivenessProbe>>,
    ) -> Self {
        Self {
            store,
            codec,
            config,
            probe,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active settings.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    fn require(&self, capability: Capability) -> Result<(), QueryError> {
        if self.store.supports(capability) {
            Ok(())
        } else {
            Err(QueryError::Unsupported(capability))
        }
    }

    fn scanner(&self) -> RangeScanner<'_, S, C> {
        RangeScanner::new(&self.store, &self.codec)
    }

    /// Returns the `n` most recent readings, oldest first.
    pub fn recent(&self, n: usize) -> Result<Vec<Reading>, QueryError> {
        if n == 0 {
            return Err(QueryError::invalid("count must be at least 1"));
        }
        self.require(Capability::OrderedScan)?;
        Ok(self.scanner().scan_last_n(n)?.readings)
    }

    /// Returns all readings with `start <= timestamp <= end`, oldest first.
    pub fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, QueryError> {
        let (start, end) = validate_range(start, end)?;
        self.require(Capability::OrderedScan)?;
        Ok(self.scanner().scan_range(start, end)?.readings)
    }

    /// Aggregates the readings of [`SensorHistory::range`] into buckets of
    /// width `interval`.
    pub fn aggregate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimeDelta,
    ) -> Result<Vec<Bucket>, QueryError> {
        self.aggregate_by(start, end, Interval::from_delta(interval)?)
    }

    /// Like [`SensorHistory::aggregate`], with a compact interval string such
    /// as `"30T"` or `"1H"`.
    pub fn aggregate_str(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<Vec<Bucket>, QueryError> {
        self.aggregate_by(start, end, Interval::parse(interval)?)
    }

    /// Like [`SensorHistory::aggregate`], with an already validated interval.
    pub fn aggregate_by(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Bucket>, QueryError> {
        let readings = self.range(start, end)?;
        Ok(aggregate::aggregate(&readings, interval))
    }

    /// Looks up the reading stored at exactly `at`.
    ///
    /// Works on point-lookup-only stores. A corrupt record reads as `None`.
    pub fn get(&self, at: DateTime<Utc>) -> Result<Option<Reading>, QueryError> {
        let timestamp = Timestamp::from_datetime(&at)?;
        self.require(Capability::PointLookup)?;
        let Some(bytes) = self.store.get(&encode_timestamp(timestamp))? else {
            return Ok(None);
        };
        match self.codec.decode(&bytes) {
            Ok(payload) => Ok(Some(Reading::new(timestamp, payload))),
            Err(_err) => {
                #[cfg(feature = "logging")]
                log::warn!("record at {timestamp} is corrupt: {_err}");
                Ok(None)
            }
        }
    }

    /// Reports the oldest and newest timestamps and a record count.
    ///
    /// The oldest and newest entries are single seek probes; if a boundary
    /// key is malformed the walk continues inward to the nearest key that
    /// decodes. The count is exact when the store tracks it; otherwise a
    /// forward walk counts up to [`QueryConfig::count_ceiling`] records and
    /// reports a lower bound if it reaches the ceiling.
    pub fn database_info(&self) -> Result<DatabaseInfo, QueryError> {
        self.require(Capability::OrderedScan)?;

        let earliest = match self.store.first_key()? {
            None => None,
            Some(key) => match encoding::decode(&key) {
                Ok(ts) => Some(ts),
                Err(_) => self.nearest_valid_key(Seek::First, Direction::Forward)?,
            },
        };
        let latest = match self.store.last_key()? {
            None => None,
            Some(key) => match encoding::decode(&key) {
                Ok(ts) => Some(ts),
                Err(_) => self.nearest_valid_key(Seek::Last, Direction::Reverse)?,
            },
        };

        let record_count = match self.store.exact_len()? {
            Some(n) => RecordCount::Exact(n),
            None => self.bounded_count()?,
        };

        Ok(DatabaseInfo {
            record_count,
            earliest,
            latest,
            path: self.store.path().map(std::path::Path::to_path_buf),
        })
    }

    /// Walks from `seek` until a key decodes.
    fn nearest_valid_key(
        &self,
        seek: Seek,
        direction: Direction,
    ) -> Result<Option<Timestamp>, QueryError> {
        let mut found = None;
        self.store.scan(seek, direction, &mut |key, _| match encoding::decode(key) {
            Ok(ts) => {
                found = Some(ts);
                ControlFlow::Break(())
            }
            Err(_) => ControlFlow::Continue(()),
        })?;
        Ok(found)
    }

    fn bounded_count(&self) -> Result<RecordCount, QueryError> {
        let ceiling = self.config.count_ceiling;
        let mut count = 0u64;
        self.store.scan(Seek::First, Direction::Forward, &mut |_, _| {
            count += 1;
            if count >= ceiling {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;

        if count >= ceiling {
            #[cfg(feature = "logging")]
            log::debug!("record count walk stopped at ceiling {ceiling}");
            Ok(RecordCount::AtLeast(count))
        } else {
            Ok(RecordCount::Exact(count))
        }
    }

    /// Asks the configured probe whether the writer is alive.
    ///
    /// Returns `None` when no probe was configured.
    pub fn daemon_running(&self) -> Option<bool> {
        self.probe.as_deref().map(LivenessProbe::is_running)
    }
}

fn validate_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(Timestamp, Timestamp), QueryError> {
    let start = Timestamp::from_datetime(&start)?;
    let end = Timestamp::from_datetime(&end)?;
    if start >= end {
        return Err(QueryError::invalid(format!(
            "start ({start}) must be before end ({end})"
        )));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Key;
    use crate::reading::ReadingPayload;
    use crate::store::{MemoryStore, PointOnlyStore};
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn insert(store: &MemoryStore, dt: DateTime<Utc>, co2: Option<f32>) {
        let ts = Timestamp::from_datetime(&dt).unwrap();
        let payload = ReadingPayload {
            co2_ppm: co2,
            ..ReadingPayload::default()
        };
        store.insert(encode_timestamp(ts).as_bytes(), ProtobufCodec.encode(ts, &payload));
    }

    fn history(store: MemoryStore) -> SensorHistory<MemoryStore> {
        SensorHistoryBuilder::new().with_store(store)
    }

    #[test]
    fn test_invalid_arguments_checked_before_store() {
        let store = MemoryStore::new();
        store.close();
        let history = history(store);

        // A closed store would fail with a store error; validation wins.
        assert!(matches!(history.recent(0), Err(QueryError::InvalidArgument(_))));
        assert!(matches!(
            history.range(at(12, 0, 0), at(12, 0, 0)),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(
            history.aggregate(at(12, 0, 0), at(13, 0, 0), TimeDelta::zero()),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(
            history.range(Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap(), at(12, 0, 0)),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(matches!(history.recent(1), Err(QueryError::Store(_))));
    }

    #[test]
    fn test_point_only_store_rejects_scans() {
        let store = MemoryStore::new();
        insert(&store, at(12, 0, 0), Some(400.0));
        let history = SensorHistoryBuilder::new().with_store(PointOnlyStore::new(store));

        for result in [
            history.recent(5).map(|_| ()),
            history.range(at(11, 0, 0), at(13, 0, 0)).map(|_| ()),
            history.aggregate_str(at(11, 0, 0), at(13, 0, 0), "1H").map(|_| ()),
            history.database_info().map(|_| ()),
        ] {
            assert!(matches!(result, Err(QueryError::Unsupported(Capability::OrderedScan))));
        }

        let reading = history.get(at(12, 0, 0)).unwrap().unwrap();
        assert_eq!(reading.co2_ppm(), Some(400.0));
        assert!(history.get(at(12, 0, 1)).unwrap().is_none());
    }

    #[test]
    fn test_hourly_scenario() {
        let store = MemoryStore::new();
        insert(&store, at(12, 0, 0), Some(10.0));
        insert(&store, at(12, 0, 30), Some(20.0));
        insert(&store, at(13, 5, 0), None);
        let history = history(store);

        let buckets = history
            .aggregate(at(12, 0, 0), at(13, 5, 0), TimeDelta::hours(1))
            .unwrap();

        // The 13:00 bucket only holds a reading without any measurement.
        assert_eq!(buckets.len(), 1);
        let stats = buckets[0].stats(crate::Measurement::Co2);
        assert_eq!(buckets[0].start(), Timestamp::from_datetime(&at(12, 0, 0)).unwrap());
        assert_eq!(stats.mean(), Some(15.0));
        assert_eq!(stats.min(), Some(10.0));
        assert_eq!(stats.max(), Some(20.0));
        assert_eq!(stats.count(), 2);
    }

    #[test]
    fn test_bounded_count() {
        struct Uncounted(MemoryStore);

        impl OrderedStore for Uncounted {
            fn capabilities(&self) -> &'static [Capability] {
                self.0.capabilities()
            }
            fn get(&self, key: &crate::Key) -> Result<Option<Vec<u8>>, crate::StoreError> {
                self.0.get(key)
            }
            fn scan(
                &self,
                seek: Seek,
                direction: Direction,
                visit: &mut crate::store::Visitor<'_>,
            ) -> Result<(), crate::StoreError> {
                self.0.scan(seek, direction, visit)
            }
        }

        let store = MemoryStore::new();
        for s in 0..5 {
            insert(&store, at(12, 0, s), Some(1.0));
        }

        let small = SensorHistoryBuilder::new()
            .count_ceiling(3)
            .with_store(Uncounted(store));
        let info = small.database_info().unwrap();
        assert_eq!(info.record_count, RecordCount::AtLeast(3));
        assert_eq!(info.record_count.to_string(), "3+");
        assert_eq!(info.earliest, Some(Timestamp::from_datetime(&at(12, 0, 0)).unwrap()));
        assert_eq!(info.latest, Some(Timestamp::from_datetime(&at(12, 0, 4)).unwrap()));

        let Uncounted(store) = small.store;
        let large = SensorHistoryBuilder::new()
            .count_ceiling(100)
            .with_store(Uncounted(store));
        assert_eq!(large.database_info().unwrap().record_count, RecordCount::Exact(5));
    }

    /// Feeds at most two entries, then reports a backend failure.
    struct FailsMidScan(MemoryStore);

    impl OrderedStore for FailsMidScan {
        fn capabilities(&self) -> &'static [Capability] {
            self.0.capabilities()
        }
        fn get(&self, key: &crate::Key) -> Result<Option<Vec<u8>>, crate::StoreError> {
            self.0.get(key)
        }
        fn scan(
            &self,
            seek: Seek,
            direction: Direction,
            visit: &mut crate::store::Visitor<'_>,
        ) -> Result<(), crate::StoreError> {
            let mut fed = 0;
            self.0.scan(seek, direction, &mut |key, value| {
                fed += 1;
                if fed > 2 || visit(key, value).is_break() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })?;
            Err(crate::StoreError::backend("device read failed"))
        }
    }

    #[test]
    fn test_store_failure_mid_scan_returns_no_partial_result() {
        let store = MemoryStore::new();
        for m in 0..6 {
            insert(&store, at(12, m, 0), Some(400.0));
        }
        let history = SensorHistoryBuilder::new().with_store(FailsMidScan(store));

        assert!(matches!(
            history.recent(10),
            Err(QueryError::Store(crate::StoreError::Backend(_)))
        ));
        assert!(matches!(
            history.range(at(11, 0, 0), at(13, 0, 0)),
            Err(QueryError::Store(crate::StoreError::Backend(_)))
        ));
        assert!(matches!(
            history.aggregate(at(11, 0, 0), at(13, 0, 0), TimeDelta::minutes(1)),
            Err(QueryError::Store(crate::StoreError::Backend(_)))
        ));
    }

    #[test]
    fn test_database_info_skips_malformed_boundary_keys() {
        let store = MemoryStore::new();
        for s in 1..=3 {
            insert(&store, at(12, 0, s), Some(1.0));
        }
        // A short key sorts before every timestamp key, a 9-byte key after
        // the last one.
        store.insert(vec![0x00], b"junk".to_vec());
        let mut long_key = Key::from(Timestamp::from_datetime(&at(12, 0, 3)).unwrap())
            .as_bytes()
            .to_vec();
        long_key.push(0);
        store.insert(long_key, b"junk".to_vec());

        let info = history(store).database_info().unwrap();
        assert_eq!(info.earliest, Some(Timestamp::from_datetime(&at(12, 0, 1)).unwrap()));
        assert_eq!(info.latest, Some(Timestamp::from_datetime(&at(12, 0, 3)).unwrap()));
        assert_eq!(info.record_count, RecordCount::Exact(5));
    }

    #[test]
    fn test_liveness_probe() {
        let history = history(MemoryStore::new());
        assert_eq!(history.daemon_running(), None);

        let history = SensorHistoryBuilder::new()
            .liveness_probe(|| true)
            .with_store(MemoryStore::new());
        assert_eq!(history.daemon_running(), Some(true));
    }
}
