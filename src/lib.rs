//! # sensor-history
//!
//! Read-only queries over a time-ordered sensor reading store.
//!
//! The store maps fixed-width timestamp keys to encoded sensor readings. This
//! crate fetches the most recent readings, scans inclusive time ranges and
//! reduces ranges to epoch-aligned buckets of mean/min/max/count statistics.
//!
//! ## Features
//!
//! - **Ordered keys**: 8-byte big-endian microsecond timestamps, so store order is time order
//! - **Resilient scans**: a corrupt record is skipped, never fatal
//! - **Streaming aggregation**: one pass, one open bucket, reproducible boundaries
//! - **Pluggable stores**: redb, `RocksDB` (feature `rocksdb`), in-memory, point-lookup only
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensor_history::{Measurement, SensorHistory};
//! use chrono::{TimeDelta, Utc};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let history = SensorHistory::open("readings.redb")?;
//!
//! let end = Utc::now();
//! let start = end - TimeDelta::hours(6);
//! for reading in history.range(start, end)? {
//!     println!("{}: {:?}", reading.timestamp(), reading.co2_ppm());
//! }
//!
//! for bucket in history.aggregate_str(start, end, "30T")? {
//!     let co2 = bucket.stats(Measurement::Co2);
//!     println!("{} mean={:?} n={}", bucket.start(), co2.mean(), co2.count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! This crate never writes to the store. It does not implement retention,
//! compaction or access control.

#![deny(missing_docs)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
mod builder;
pub mod encoding;
mod error;
pub mod query;
pub mod reading;
pub mod scanner;
pub mod store;

pub use aggregate::{Bucket, FieldStats, Interval, IntervalAggregator};
pub use builder::{DEFAULT_COUNT_CEILING, QueryConfig, SensorHistoryBuilder};
pub use encoding::{Key, KeyError, Timestamp, encode_timestamp};
pub use error::QueryError;
pub use query::{DatabaseInfo, LivenessProbe, RecordCount, SensorHistory};
pub use reading::{
    DecodeError, Measurement, ProtobufCodec, QualityFlags, Reading, ReadingCodec, ReadingPayload,
};
pub use scanner::{RangeScanner, Scan};
pub use store::{
    Capability, MemoryStore, OpenError, OrderedStore, PointOnlyStore, RedbStore, StoreError,
};
#[cfg(feature = "rocksdb")]
pub use store::RocksDbStore;
