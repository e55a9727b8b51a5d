//! Bucketed statistics over ordered reading sequences.
//!
//! Buckets are half-open windows `[start, start + interval)` whose starts are
//! multiples of the interval counted from the Unix epoch. Overlapping queries
//! therefore always agree on bucket boundaries: with a one-hour interval they
//! fall on the hour no matter where the query range begins.

use crate::encoding::Timestamp;
use crate::error::QueryError;
use crate::reading::{Measurement, Reading};
use chrono::TimeDelta;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Running statistics for one measurement within one bucket.
///
/// Absent and non-finite values are never accumulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for FieldStats {
    fn default() -> Self {
        Self::empty()
    }
}

impl FieldStats {
    /// Creates stats with no observations.
    pub fn empty() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Accumulates one observation. Non-finite values are ignored.
    pub fn accumulate(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    /// Number of observations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns `true` if nothing was observed.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean, or `None` without observations.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Smallest observation.
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Largest observation.
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// Statistics for one time window.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    start: Timestamp,
    interval: u64,
    fields: [FieldStats; Measurement::ALL.len()],
}

impl Bucket {
    fn new(start: Timestamp, interval: u64) -> Self {
        Self {
            start,
            interval,
            fields: [FieldStats::empty(); Measurement::ALL.len()],
        }
    }

    /// Inclusive start of the window.
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// Exclusive end of the window.
    pub fn end(&self) -> Timestamp {
        Timestamp::from_micros(self.start.as_micros().saturating_add(self.interval))
    }

    /// Statistics for `measurement`.
    pub fn stats(&self, measurement: Measurement) -> &FieldStats {
        &self.fields[measurement.index()]
    }

    /// Returns `true` if no measurement has any observation.
    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(FieldStats::is_empty)
    }

    fn accumulate(&mut self, reading: &Reading) {
        for measurement in Measurement::ALL {
            if let Some(value) = reading.value(measurement) {
                self.fields[measurement.index()].accumulate(f64::from(value));
            }
        }
    }
}

impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_map(Some(1 + 4 * Measurement::ALL.len()))?;
        row.serialize_entry("bucket_start", &self.start.to_string())?;
        for measurement in Measurement::ALL {
            let stats = self.stats(measurement);
            let name = measurement.name();
            row.serialize_entry(&format!("{name}_mean"), &stats.mean())?;
            row.serialize_entry(&format!("{name}_min"), &stats.min())?;
            row.serialize_entry(&format!("{name}_max"), &stats.max())?;
            row.serialize_entry(&format!("{name}_count"), &stats.count())?;
        }
        row.end()
    }
}

/// A strictly positive bucket width with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval(u64);

impl Interval {
    /// Creates an interval of `micros` microseconds.
    pub fn from_micros(micros: u64) -> Result<Self, QueryError> {
        if micros == 0 {
            return Err(QueryError::invalid("interval must be positive"));
        }
        Ok(Self(micros))
    }

    /// Converts a `chrono` duration. Zero, negative and sub-microsecond
    /// durations are rejected.
    pub fn from_delta(delta: TimeDelta) -> Result<Self, QueryError> {
        let micros = delta
            .num_microseconds()
            .ok_or_else(|| QueryError::invalid("interval is too large"))?;
        let micros = u64::try_from(micros)
            .map_err(|_| QueryError::invalid(format!("interval must be positive, got {delta}")))?;
        Self::from_micros(micros)
    }

    /// Parses a compact interval such as `30T`, `1H`, `1D` or `1M`.
    ///
    /// Units: `T` minutes, `H` hours, `D` days, `M` months of 30 days.
    pub fn parse(s: &str) -> Result<Self, QueryError> {
        let unit = s
            .chars()
            .last()
            .ok_or_else(|| QueryError::invalid("interval string is empty"))?;
        let minutes_per_unit: u64 = match unit {
            'T' => 1,
            'H' => 60,
            'D' => 60 * 24,
            'M' => 60 * 24 * 30,
            _ => {
                return Err(QueryError::invalid(format!(
                    "unknown interval unit in {s:?}, expected one of T, H, D, M"
                )));
            }
        };
        let digits = &s[..s.len() - unit.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QueryError::invalid(format!("malformed interval {s:?}")));
        }
        let count: u64 = digits
            .parse()
            .map_err(|_| QueryError::invalid(format!("malformed interval {s:?}")))?;
        let micros = count
            .checked_mul(minutes_per_unit * 60 * 1_000_000)
            .ok_or_else(|| QueryError::invalid(format!("interval {s:?} is too large")))?;
        Self::from_micros(micros)
    }

    /// Width in microseconds.
    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Start of the epoch-aligned window containing `ts`.
    ///
    /// For example, with a one-minute interval, 01:01:01.500 rounds down to
    /// 01:01:00.000.
    pub fn round_down(self, ts: Timestamp) -> Timestamp {
        let micros = ts.as_micros();
        Timestamp::from_micros(micros - micros % self.0)
    }
}

impl std::str::FromStr for Interval {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<TimeDelta> for Interval {
    type Error = QueryError;

    fn try_from(delta: TimeDelta) -> Result<Self, Self::Error> {
        Self::from_delta(delta)
    }
}

/// Single-pass reducer from an ordered reading sequence to buckets.
///
/// Readings must arrive in non-decreasing timestamp order; this is not
/// re-checked. A bucket is flushed as soon as a reading falls outside it, so
/// memory use is one bucket regardless of input size. Buckets with no
/// observation in any field are dropped.
#[derive(Debug)]
pub struct IntervalAggregator {
    interval: Interval,
    current: Option<Bucket>,
    finished: Vec<Bucket>,
}

impl IntervalAggregator {
    /// Creates an aggregator for `interval`.
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            current: None,
            finished: Vec::new(),
        }
    }

    /// Feeds the next reading.
    pub fn push(&mut self, reading: &Reading) {
        let start = self.interval.round_down(reading.timestamp());
        match self.current {
            Some(ref mut bucket) if bucket.start == start => bucket.accumulate(reading),
            _ => {
                self.flush();
                let mut bucket = Bucket::new(start, self.interval.as_micros());
                bucket.accumulate(reading);
                self.current = Some(bucket);
            }
        }
    }

    fn flush(&mut self) {
        if let Some(bucket) = self.current.take()
            && !bucket.is_empty()
        {
            self.finished.push(bucket);
        }
    }

    /// Flushes the running bucket and returns all buckets in ascending order.
    pub fn finish(mut self) -> Vec<Bucket> {
        self.flush();
        self.finished
    }
}

/// Aggregates `readings` into epoch-aligned buckets of width `interval`.
///
/// Empty input yields no buckets.
pub fn aggregate<'r>(
    readings: impl IntoIterator<Item = &'r Reading>,
    interval: Interval,
) -> Vec<Bucket> {
    let mut aggregator = IntervalAggregator::new(interval);
    for reading in readings {
        aggregator.push(reading);
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::ReadingPayload;

    const HOUR: u64 = 3_600_000_000;

    fn reading(micros: u64, co2: Option<f32>, temp: Option<f32>) -> Reading {
        Reading::new(
            Timestamp::from_micros(micros),
            ReadingPayload {
                co2_ppm: co2,
                temperature_c: temp,
                ..ReadingPayload::default()
            },
        )
    }

    #[test]
    fn test_field_stats_accumulate() {
        let mut stats = FieldStats::empty();
        stats.accumulate(10.0);
        stats.accumulate(20.0);
        stats.accumulate(5.0);
        stats.accumulate(15.0);

        assert_eq!(stats.min(), Some(5.0));
        assert_eq!(stats.max(), Some(20.0));
        assert_eq!(stats.count(), 4);
        assert_eq!(stats.mean(), Some(12.5));
    }

    #[test]
    fn test_field_stats_ignores_non_finite() {
        let mut stats = FieldStats::empty();
        stats.accumulate(f64::NAN);
        stats.accumulate(f64::INFINITY);
        assert!(stats.is_empty());
        assert_eq!(stats.mean(), None);

        stats.accumulate(3.0);
        assert_eq!(stats.count(), 1);
        assert_eq!(stats.max(), Some(3.0));
    }

    #[test]
    fn test_interval_round_down() {
        let ts = Timestamp::from_micros(1_609_459_261_500_000); // 2021-01-01 00:01:01.500 UTC
        let minute = Interval::parse("1T").unwrap();
        let hour = Interval::parse("1H").unwrap();
        let day = Interval::parse("1D").unwrap();

        assert_eq!(minute.round_down(ts).as_micros(), 1_609_459_260_000_000);
        assert_eq!(hour.round_down(ts).as_micros(), 1_609_459_200_000_000);
        assert_eq!(day.round_down(ts).as_micros(), 1_609_459_200_000_000);
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::parse("30T").unwrap().as_micros(), 30 * 60 * 1_000_000);
        assert_eq!(Interval::parse("2H").unwrap().as_micros(), 2 * HOUR);
        assert_eq!(Interval::parse("1M").unwrap().as_micros(), 30 * 24 * HOUR);

        for bad in ["", "H", "0H", "-1H", "1X", "1.5H", "1h", " 1H"] {
            assert!(
                matches!(Interval::parse(bad), Err(QueryError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_interval_from_delta() {
        assert_eq!(Interval::from_delta(TimeDelta::hours(1)).unwrap().as_micros(), HOUR);
        assert!(Interval::from_delta(TimeDelta::zero()).is_err());
        assert!(Interval::from_delta(TimeDelta::seconds(-5)).is_err());
        assert!(Interval::from_delta(TimeDelta::nanoseconds(500)).is_err());
    }

    #[test]
    fn test_aggregate_empty_input() {
        let readings: [Reading; 0] = [];
        let buckets = aggregate(&readings, Interval::from_micros(HOUR).unwrap());
        assert!(buckets.is_empty());
    }

    #[test]
    fn test_partial_field_presence() {
        // co2 present in 2 of 4 readings, all in the same bucket
        let readings = [
            reading(10, Some(400.0), Some(20.0)),
            reading(20, None, Some(21.0)),
            reading(30, Some(500.0), Some(22.0)),
            reading(40, None, Some(23.0)),
        ];
        let buckets = aggregate(&readings, Interval::from_micros(HOUR).unwrap());
        assert_eq!(buckets.len(), 1);

        let co2 = buckets[0].stats(Measurement::Co2);
        assert_eq!(co2.count(), 2);
        assert_eq!(co2.mean(), Some(450.0));

        let temp = buckets[0].stats(Measurement::Temperature);
        assert_eq!(temp.count(), 4);
        assert_eq!(temp.mean(), Some(21.5));

        assert!(buckets[0].stats(Measurement::Humidity).is_empty());
    }

    #[test]
    fn test_empty_buckets_suppressed() {
        let readings = [
            reading(0, Some(1.0), None),
            reading(HOUR + 5, None, None),
            reading(3 * HOUR, Some(3.0), None),
        ];
        let buckets = aggregate(&readings, Interval::from_micros(HOUR).unwrap());

        let starts: Vec<_> = buckets.iter().map(|b| b.start().as_micros()).collect();
        assert_eq!(starts, [0, 3 * HOUR]);
        assert_eq!(buckets[1].end().as_micros(), 4 * HOUR);
    }

    #[test]
    fn test_bucket_boundaries_independent_of_first_reading() {
        let interval = Interval::from_micros(HOUR).unwrap();
        let all = [
            reading(HOUR / 2, Some(1.0), None),
            reading(HOUR + HOUR / 4, Some(2.0), None),
            reading(2 * HOUR + 1, Some(3.0), None),
        ];

        let full = aggregate(&all, interval);
        let tail = aggregate(&all[1..], interval);

        assert_eq!(full[1..], tail[..]);
        assert_eq!(tail[0].start().as_micros(), HOUR);
    }
}
