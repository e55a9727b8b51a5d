//! Ordered scans that turn raw store entries into readings.

use crate::encoding::{self, Timestamp, encode_timestamp};
use crate::error::QueryError;
use crate::reading::{Reading, ReadingCodec};
use crate::store::{Direction, OrderedStore, Seek};
use std::ops::ControlFlow;

/// Result of a scan: readings in chronological order plus the number of
/// records that were skipped because they could not be decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scan {
    /// Decoded readings, oldest first.
    pub readings: Vec<Reading>,
    /// Records skipped as corrupt.
    pub skipped: usize,
}

impl Scan {
    /// Number of readings returned.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Returns `true` if no readings were returned.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Performs forward and reverse scans over a store, decoding each entry.
///
/// A record whose key or value fails to decode is skipped and counted in
/// [`Scan::skipped`]; it never aborts the scan. A failure of the store itself
/// aborts the scan and discards whatever had been collected.
pub struct RangeScanner<'a, S: ?Sized, C: ?Sized> {
    store: &'a S,
    codec: &'a C,
}

impl<'a, S, C> RangeScanner<'a, S, C>
where
    S: OrderedStore + ?Sized,
    C: ReadingCodec + ?Sized,
{
    /// Creates a scanner over `store` that decodes values with `codec`.
    pub fn new(store: &'a S, codec: &'a C) -> Self {
        Self { store, codec }
    }

    /// Returns the `n` most recent readings, oldest first.
    ///
    /// Walks backward from the end of the store and stops after `n` readings
    /// decode successfully or the store runs out. Skipped records do not
    /// count toward `n`.
    pub fn scan_last_n(&self, n: usize) -> Result<Scan, QueryError> {
        if n == 0 {
            return Err(QueryError::invalid("count must be at least 1"));
        }

        let mut scan = Scan::default();
        self.store.scan(Seek::Last, Direction::Reverse, &mut |key, value| {
            if let Some(reading) = self.decode_entry(key, value, &mut scan.skipped) {
                scan.readings.push(reading);
                if scan.readings.len() >= n {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        })?;

        scan.readings.reverse();
        log_scan("last_n", &scan);
        Ok(scan)
    }

    /// Returns every reading with `start <= timestamp <= end`, oldest first.
    ///
    /// Requires `start < end`.
    pub fn scan_range(&self, start: Timestamp, end: Timestamp) -> Result<Scan, QueryError> {
        if start >= end {
            return Err(QueryError::invalid(format!(
                "start ({start}) must be before end ({end})"
            )));
        }

        let end_key = encode_timestamp(end);
        let mut scan = Scan::default();
        self.store.scan(
            Seek::AtOrAfter(encode_timestamp(start)),
            Direction::Forward,
            &mut |key, value| {
                if key > end_key.as_bytes() {
                    return ControlFlow::Break(());
                }
                if let Some(reading) = self.decode_entry(key, value, &mut scan.skipped) {
                    scan.readings.push(reading);
                }
                ControlFlow::Continue(())
            },
        )?;

        log_scan("range", &scan);
        Ok(scan)
    }

    fn decode_entry(&self, key: &[u8], value: &[u8], skipped: &mut usize) -> Option<Reading> {
        let timestamp = match encoding::decode(key) {
            Ok(ts) => ts,
            Err(_err) => {
                #[cfg(feature = "logging")]
                log::warn!("skipping record with malformed key {key:02x?}: {_err}");
                *skipped += 1;
                return None;
            }
        };
        match self.codec.decode(value) {
            Ok(payload) => Some(Reading::new(timestamp, payload)),
            Err(_err) => {
                #[cfg(feature = "logging")]
                log::warn!("skipping corrupt record at {timestamp}: {_err}");
                *skipped += 1;
                None
            }
        }
    }
}

#[cfg_attr(not(feature = "logging"), allow(unused_variables))]
fn log_scan(kind: &str, scan: &Scan) {
    #[cfg(feature = "logging")]
    log::debug!(
        "{kind} scan returned {} readings, skipped {} corrupt records",
        scan.readings.len(),
        scan.skipped
    );
}
