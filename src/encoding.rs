//! Timestamp key encoding.
//!
//! Keys are 8-byte big-endian unsigned integers holding microseconds since
//! the Unix epoch. Big-endian keeps byte-lexicographic key order identical to
//! chronological order, so the store's native ordered iteration is also
//! chronological.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

/// Width of an encoded key in bytes.
pub const KEY_LEN: usize = 8;

/// Error type for key encoding/decoding operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The instant lies before the Unix epoch and cannot be encoded.
    OutOfRange(String),
    /// The key does not have the expected length.
    Format {
        /// Length of the offending key.
        len: usize,
    },
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange(msg) => write!(f, "timestamp out of range: {msg}"),
            Self::Format { len } => {
                write!(f, "expected {KEY_LEN} bytes for a timestamp key, got {len}")
            }
        }
    }
}

impl std::error::Error for KeyError {}

/// An instant with microsecond resolution, measured from the Unix epoch in UTC.
///
/// This is the decoded form of a [`Key`]. Every 8-byte key decodes to a
/// `Timestamp`, even ones that lie beyond the range `chrono` can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from microseconds since the Unix epoch.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creates a timestamp from whole seconds since the Unix epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    /// Microseconds since the Unix epoch.
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Converts an instant in any time zone to a `Timestamp`.
    ///
    /// The instant is normalized to UTC and sub-microsecond precision is
    /// truncated, never rounded, so an instant always lands in the same
    /// aggregation bucket as the microsecond it starts in.
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Result<Self, KeyError> {
        let utc = dt.with_timezone(&Utc);
        let secs = utc.timestamp();
        if secs < 0 {
            return Err(KeyError::OutOfRange(format!(
                "{} is before 1970-01-01T00:00:00Z",
                utc.to_rfc3339()
            )));
        }
        let secs = u64::try_from(secs).map_err(|_| KeyError::OutOfRange(utc.to_rfc3339()))?;
        let micros = secs
            .checked_mul(1_000_000)
            .and_then(|m| m.checked_add(u64::from(utc.timestamp_subsec_micros())))
            .ok_or_else(|| KeyError::OutOfRange(utc.to_rfc3339()))?;
        Ok(Self(micros))
    }

    /// Converts back to a `chrono` UTC instant.
    ///
    /// Returns `None` for timestamps past the range `chrono` supports.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let micros = i64::try_from(self.0).ok()?;
        DateTime::from_timestamp_micros(micros)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
            None => write!(f, "{}us", self.0),
        }
    }
}

impl TryFrom<DateTime<Utc>> for Timestamp {
    type Error = KeyError;

    fn try_from(dt: DateTime<Utc>) -> Result<Self, Self::Error> {
        Self::from_datetime(&dt)
    }
}

/// A fixed-width, sortable store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parses raw key bytes, checking only the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::Format { len: bytes.len() })?;
        Ok(Self(array))
    }

    /// Decodes the timestamp held by this key.
    pub fn timestamp(&self) -> Timestamp {
        Timestamp(u64::from_be_bytes(self.0))
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Timestamp> for Key {
    fn from(ts: Timestamp) -> Self {
        encode_timestamp(ts)
    }
}

/// Encodes an already-normalized timestamp. Cannot fail.
pub fn encode_timestamp(ts: Timestamp) -> Key {
    Key(ts.0.to_be_bytes())
}

/// Encodes an instant into its ordered key.
///
/// Fails with [`KeyError::OutOfRange`] for instants before the Unix epoch.
pub fn encode<Tz: TimeZone>(dt: &DateTime<Tz>) -> Result<Key, KeyError> {
    Timestamp::from_datetime(dt).map(encode_timestamp)
}

/// Decodes raw key bytes into a timestamp.
///
/// Any 8-byte input decodes; other lengths are a [`KeyError::Format`].
pub fn decode(bytes: &[u8]) -> Result<Timestamp, KeyError> {
    Key::from_slice(bytes).map(|key| key.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};
    use rand::Rng;

    #[test]
    fn test_key_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();

        let key = encode(&dt).unwrap();
        assert_eq!(key.as_bytes().len(), KEY_LEN);

        let decoded = decode(key.as_bytes()).unwrap();
        assert_eq!(decoded.as_micros(), 1_609_459_200_000_000);
        assert_eq!(decoded.to_datetime().unwrap(), dt);
    }

    #[test]
    fn test_sub_microsecond_truncated() {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let dt = base + Duration::nanoseconds(1_999);

        let ts = Timestamp::from_datetime(&dt).unwrap();
        assert_eq!(ts.to_datetime().unwrap(), base + Duration::microseconds(1));
    }

    #[test]
    fn test_normalized_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap();
        let utc = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(encode(&local).unwrap(), encode(&utc).unwrap());
    }

    #[test]
    fn test_keys_sort_chronologically() {
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let a: u64 = rng.random_range(0..u64::MAX / 2);
            let b: u64 = rng.random_range(0..u64::MAX / 2);
            let ka = encode_timestamp(Timestamp::from_micros(a));
            let kb = encode_timestamp(Timestamp::from_micros(b));
            // Byte order must agree with numeric order
            assert_eq!(a.cmp(&b), ka.as_bytes().cmp(kb.as_bytes()));
        }
    }

    #[test]
    fn test_pre_epoch_rejected() {
        let dt = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(encode(&dt), Err(KeyError::OutOfRange(_))));
    }

    #[test]
    fn test_decode_invalid_length() {
        assert_eq!(decode(&[1, 2, 3]), Err(KeyError::Format { len: 3 }));
        assert_eq!(decode(&[0; 9]), Err(KeyError::Format { len: 9 }));
    }

    #[test]
    fn test_decode_beyond_chrono_range() {
        let key = [0xFF; KEY_LEN];
        let ts = decode(&key).unwrap();
        assert_eq!(ts.as_micros(), u64::MAX);
        assert!(ts.to_datetime().is_none());
    }
}
