//! The message timeline.
//!
//! Every message is ordered by the commit timestamp the commit clock handed
//! out when it was written. The public [`MessageId`] and the sync [`Cursor`]
//! are both views of that single value.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Microseconds since the Unix epoch, as assigned by the commit clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, sqlx::Type)]
#[sqlx(transparent)]
pub struct OrderingKey(pub i64);

impl OrderingKey {
    pub const EPOCH: OrderingKey = OrderingKey(0);

    pub fn from_datetime(at: OffsetDateTime) -> Self {
        // floor, so a sub-microsecond cursor never skips the microsecond it sits in
        let micros = at.unix_timestamp_nanos().div_euclid(1_000);
        OrderingKey(micros.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    pub fn to_datetime(self) -> Result<OffsetDateTime, time::error::ComponentRange> {
        OffsetDateTime::from_unix_timestamp_nanos(self.0 as i128 * 1_000)
    }

    pub fn to_rfc3339(self) -> Result<String, String> {
        self.to_datetime()
            .map_err(|e| e.to_string())?
            .format(&Rfc3339)
            .map_err(|e| e.to_string())
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public message identifier. Equal to the message's ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct MessageId(i64);

impl MessageId {
    pub fn from_ordering_key(key: OrderingKey) -> Self {
        MessageId(key.0)
    }

    pub fn ordering_key(self) -> OrderingKey {
        OrderingKey(self.0)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        MessageId(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client's position on the timeline.
///
/// On the wire a cursor is an RFC 3339 timestamp with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Cursor(OrderingKey);

impl Cursor {
    pub const BEGINNING: Cursor = Cursor(OrderingKey::EPOCH);

    pub fn at(key: OrderingKey) -> Self {
        Cursor(key)
    }

    pub fn key(self) -> OrderingKey {
        self.0
    }

    pub fn parse(s: &str) -> Result<Self, time::error::Parse> {
        let at = OffsetDateTime::parse(s, &Rfc3339)?;
        Ok(Cursor(OrderingKey::from_datetime(at)))
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let s = self.0.to_rfc3339().map_err(ser::Error::custom)?;
        serializer.serialize_str(&s)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cursor::parse(&s).map_err(|e| de::Error::custom(format!("invalid cursor {s:?}: {e}")))
    }
}

/// Serializes an [`OrderingKey`] as the RFC 3339 time it was committed at.
pub(crate) mod rfc3339_key {
    use super::*;

    pub fn serialize<S: Serializer>(key: &OrderingKey, serializer: S) -> Result<S::Ok, S::Error> {
        let s = key.to_rfc3339().map_err(ser::Error::custom)?;
        serializer.serialize_str(&s)
    }
}
