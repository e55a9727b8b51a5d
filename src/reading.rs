//! Sensor readings and the record codec that turns stored values into them.

use crate::encoding::Timestamp;
use prost::Message;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;

/// A measured channel of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Measurement {
    /// CO2 concentration in parts per million.
    Co2,
    /// Temperature in degrees Celsius.
    Temperature,
    /// Relative humidity in percent.
    Humidity,
}

impl Measurement {
    /// All channels, in output column order.
    pub const ALL: [Self; 3] = [Self::Co2, Self::Temperature, Self::Humidity];

    /// Column name used in produced records.
    pub fn name(self) -> &'static str {
        match self {
            Self::Co2 => "co2_ppm",
            Self::Temperature => "temperature_c",
            Self::Humidity => "humidity_percent",
        }
    }

    /// Quality bit that marks this channel as valid at capture time.
    pub fn quality_bit(self) -> u32 {
        match self {
            Self::Co2 => QualityFlags::CO2_VALID,
            Self::Temperature => QualityFlags::TEMP_VALID,
            Self::Humidity => QualityFlags::HUMIDITY_VALID,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Co2 => 0,
            Self::Temperature => 1,
            Self::Humidity => 2,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-reading validity bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QualityFlags(pub u32);

impl QualityFlags {
    /// CO2 channel valid.
    pub const CO2_VALID: u32 = 0x01;
    /// Temperature channel valid.
    pub const TEMP_VALID: u32 = 0x02;
    /// Humidity channel valid.
    pub const HUMIDITY_VALID: u32 = 0x04;

    /// Returns the raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if the capture marked `measurement` as valid.
    pub fn is_valid(self, measurement: Measurement) -> bool {
        self.0 & measurement.quality_bit() != 0
    }
}

/// The measured values of one record, before a key timestamp is attached.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadingPayload {
    /// CO2 concentration, if reported.
    pub co2_ppm: Option<f32>,
    /// Temperature, if reported.
    pub temperature_c: Option<f32>,
    /// Relative humidity, if reported.
    pub humidity_percent: Option<f32>,
    /// Validity bitmask.
    pub quality_flags: QualityFlags,
}

impl ReadingPayload {
    /// Returns the value of `measurement`, or `None` if the channel was absent.
    pub fn value(&self, measurement: Measurement) -> Option<f32> {
        match measurement {
            Measurement::Co2 => self.co2_ppm,
            Measurement::Temperature => self.temperature_c,
            Measurement::Humidity => self.humidity_percent,
        }
    }
}

/// One decoded sensor sample.
///
/// The timestamp always comes from the store key, never from the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    timestamp: Timestamp,
    payload: ReadingPayload,
}

impl Reading {
    /// Attaches a key timestamp to a decoded payload.
    pub fn new(timestamp: Timestamp, payload: ReadingPayload) -> Self {
        Self { timestamp, payload }
    }

    /// When the sample was taken.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the value of `measurement`, or `None` if absent.
    pub fn value(&self, measurement: Measurement) -> Option<f32> {
        self.payload.value(measurement)
    }

    /// CO2 concentration in ppm.
    pub fn co2_ppm(&self) -> Option<f32> {
        self.payload.co2_ppm
    }

    /// Temperature in degrees Celsius.
    pub fn temperature_c(&self) -> Option<f32> {
        self.payload.temperature_c
    }

    /// Relative humidity in percent.
    pub fn humidity_percent(&self) -> Option<f32> {
        self.payload.humidity_percent
    }

    /// Validity bitmask.
    pub fn quality_flags(&self) -> QualityFlags {
        self.payload.quality_flags
    }

    /// The measured values without the timestamp.
    pub fn payload(&self) -> &ReadingPayload {
        &self.payload
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_struct("Reading", 5)?;
        row.serialize_field("timestamp", &self.timestamp.to_string())?;
        row.serialize_field("co2_ppm", &self.payload.co2_ppm)?;
        row.serialize_field("temperature_c", &self.payload.temperature_c)?;
        row.serialize_field("humidity_percent", &self.payload.humidity_percent)?;
        row.serialize_field("quality_flags", &self.payload.quality_flags.bits())?;
        row.end()
    }
}

/// Error returned when a stored value cannot be decoded.
#[derive(Debug)]
pub enum DecodeError {
    /// The protobuf layer rejected the bytes.
    Protobuf(prost::DecodeError),
    /// The bytes parsed but do not form a valid reading.
    Invalid(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protobuf(err) => write!(f, "protobuf decode error: {err}"),
            Self::Invalid(msg) => write!(f, "invalid reading: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protobuf(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<prost::DecodeError> for DecodeError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Protobuf(err)
    }
}

/// Converts stored record bytes into reading payloads.
///
/// Implementations must be deterministic: identical bytes always decode to
/// the same payload or the same failure.
pub trait ReadingCodec: Send + Sync {
    /// Decodes a stored value.
    fn decode(&self, bytes: &[u8]) -> Result<ReadingPayload, DecodeError>;

    /// Encodes a payload in the format `decode` accepts.
    ///
    /// `timestamp` is embedded where the format carries one.
    fn encode(&self, timestamp: Timestamp, payload: &ReadingPayload) -> Vec<u8>;
}

/// Wire message written by the sensor daemon.
#[derive(Clone, PartialEq, Message)]
pub struct SensorReadingMessage {
    /// Capture time in microseconds since the epoch.
    #[prost(uint64, tag = "1")]
    pub timestamp_us: u64,
    /// CO2 concentration in ppm.
    #[prost(float, optional, tag = "2")]
    pub co2_ppm: Option<f32>,
    /// Temperature in degrees Celsius.
    #[prost(float, optional, tag = "3")]
    pub temperature_c: Option<f32>,
    /// Relative humidity in percent.
    #[prost(float, optional, tag = "4")]
    pub humidity_percent: Option<f32>,
    /// Validity bitmask.
    #[prost(uint32, tag = "5")]
    pub quality_flags: u32,
}

/// Protobuf codec matching the daemon's on-disk record layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufCodec;

impl ReadingCodec for ProtobufCodec {
    fn decode(&self, bytes: &[u8]) -> Result<ReadingPayload, DecodeError> {
        let message = SensorReadingMessage::decode(bytes)?;
        Ok(ReadingPayload {
            co2_ppm: message.co2_ppm,
            temperature_c: message.temperature_c,
            humidity_percent: message.humidity_percent,
            quality_flags: QualityFlags(message.quality_flags),
        })
    }

    fn encode(&self, timestamp: Timestamp, payload: &ReadingPayload) -> Vec<u8> {
        SensorReadingMessage {
            timestamp_us: timestamp.as_micros(),
            co2_ppm: payload.co2_ppm,
            temperature_c: payload.temperature_c,
            humidity_percent: payload.humidity_percent,
            quality_flags: payload.quality_flags.bits(),
        }
        .encode_to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protobuf_codec_optional_fields() {
        let payload = ReadingPayload {
            co2_ppm: Some(415.0),
            temperature_c: None,
            humidity_percent: Some(40.5),
            quality_flags: QualityFlags(QualityFlags::CO2_VALID | QualityFlags::HUMIDITY_VALID),
        };

        let bytes = ProtobufCodec.encode(Timestamp::from_secs(60), &payload);
        let decoded = ProtobufCodec.decode(&bytes).unwrap();

        assert_eq!(decoded, payload);
        assert_eq!(decoded.value(Measurement::Temperature), None);
        assert!(decoded.quality_flags.is_valid(Measurement::Co2));
        assert!(!decoded.quality_flags.is_valid(Measurement::Temperature));
    }

    #[test]
    fn test_zero_is_not_absent() {
        let payload = ReadingPayload {
            co2_ppm: Some(0.0),
            ..ReadingPayload::default()
        };
        let decoded = ProtobufCodec
            .decode(&ProtobufCodec.encode(Timestamp::EPOCH, &payload))
            .unwrap();
        assert_eq!(decoded.co2_ppm, Some(0.0));
        assert_eq!(decoded.temperature_c, None);
    }

    #[test]
    fn test_protobuf_codec_rejects_garbage() {
        // Field 1 with the wrong wire type and a length past the end
        let bytes = [0x0A, 0xFF, 0x01];
        assert!(matches!(
            ProtobufCodec.decode(&bytes),
            Err(DecodeError::Protobuf(_))
        ));
    }

    #[test]
    fn test_measurement_names() {
        let names: Vec<_> = Measurement::ALL.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["co2_ppm", "temperature_c", "humidity_percent"]);
    }
}
