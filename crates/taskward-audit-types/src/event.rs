//! Core audit event type.

use crate::{FormatError, Metadata};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Field holding the event identifier.
pub const IDENTIFIER_KEY: &str = "identifier";

/// Field holding the event timestamp.
pub const EVENT_TIMESTAMP_KEY: &str = "event_timestamp";

/// Field names metadata may never use.
pub const RESERVED_KEYS: [&str; 2] = [EVENT_TIMESTAMP_KEY, IDENTIFIER_KEY];

/// A single audit event.
///
/// Events are immutable once built. The audit logger stamps the timestamp at
/// enqueue time; callers only choose the identifier and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    identifier: String,
    timestamp: DateTime<Utc>,
    metadata: Vec<Metadata>,
}

impl Event {
    /// Create an event.
    pub fn new(
        identifier: impl Into<String>,
        timestamp: DateTime<Utc>,
        metadata: Vec<Metadata>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            timestamp,
            metadata,
        }
    }

    /// Correlation identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// When the event was enqueued.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Metadata entries in insertion order.
    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    /// Nanoseconds since the Unix epoch, saturating outside the representable range.
    pub fn unix_nanos(&self) -> i64 {
        match self.timestamp.timestamp_nanos_opt() {
            Some(nanos) => nanos,
            None if self.timestamp.timestamp() < 0 => i64::MIN,
            None => i64::MAX,
        }
    }

    /// Look up a metadata value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.metadata
            .iter()
            .rev()
            .find(|md| md.name() == name)
            .map(Metadata::value)
    }

    /// Check that no metadata entry uses a reserved field name.
    pub fn validate(&self) -> Result<(), FormatError> {
        check_metadata_collisions(&self.metadata)
    }

    /// Encode as a flat JSON object.
    ///
    /// Fails if any metadata entry uses a reserved field name.
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        let fields = self.to_fields()?;
        Ok(serde_json::to_vec(&fields)?)
    }

    /// Decode an event previously produced by [`Event::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let fields: Map<String, Value> = serde_json::from_slice(bytes)?;
        Self::from_fields(fields)
    }

    /// Build the flattened object. Repeated metadata names keep the first
    /// position and the last value.
    fn to_fields(&self) -> Result<Map<String, Value>, FormatError> {
        self.validate()?;

        let mut fields = Map::with_capacity(self.metadata.len() + 2);
        fields.insert(IDENTIFIER_KEY.to_string(), Value::String(self.identifier.clone()));
        fields.insert(
            EVENT_TIMESTAMP_KEY.to_string(),
            Value::String(format_timestamp(&self.timestamp)),
        );
        for md in &self.metadata {
            fields.insert(md.name().to_string(), md.value().clone());
        }
        Ok(fields)
    }

    fn from_fields(mut fields: Map<String, Value>) -> Result<Self, FormatError> {
        let identifier = match fields.shift_remove(IDENTIFIER_KEY) {
            Some(Value::String(s)) => s,
            Some(_) => {
                return Err(FormatError::UnexpectedType {
                    field: IDENTIFIER_KEY.to_string(),
                    expected: "string",
                })
            }
            None => return Err(FormatError::MissingField(IDENTIFIER_KEY)),
        };

        let timestamp = match fields.shift_remove(EVENT_TIMESTAMP_KEY) {
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc),
            Some(_) => {
                return Err(FormatError::UnexpectedType {
                    field: EVENT_TIMESTAMP_KEY.to_string(),
                    expected: "string",
                })
            }
            None => return Err(FormatError::MissingField(EVENT_TIMESTAMP_KEY)),
        };

        let metadata = fields
            .into_iter()
            .map(|(name, value)| Metadata::new(name, value))
            .collect();

        Ok(Self {
            identifier,
            timestamp,
            metadata,
        })
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_fields()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_fields(fields).map_err(D::Error::custom)
    }
}

fn check_metadata_collisions(metadata: &[Metadata]) -> Result<(), FormatError> {
    match metadata
        .iter()
        .find(|md| RESERVED_KEYS.contains(&md.name()))
    {
        Some(md) => Err(FormatError::ReservedKey(md.name().to_string())),
        None => Ok(()),
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn epoch() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    #[test]
    fn test_event_encode_happy() {
        let event = Event::new("12345", epoch(), vec![Metadata::new("foo", "test")]);
        let bytes = event.encode().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"identifier":"12345","event_timestamp":"1970-01-01T00:00:00Z","foo":"test"}"#
        );
    }

    #[test]
    fn test_event_encode_metadata_collision() {
        let event = Event::new(
            "",
            epoch(),
            vec![
                Metadata::new("identifier", "test"),
                Metadata::new("event_timestamp", "test"),
            ],
        );
        let err = event.encode().unwrap_err();
        assert_eq!(
            err.to_string(),
            "metadata attempts to overwrite reserved key: identifier"
        );
        assert!(serde_json::to_vec(&event).is_err());
    }

    #[test]
    fn test_event_timestamp_keeps_subsecond_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let event = Event::new("id", ts, vec![]);
        let decoded = Event::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded.timestamp(), ts);
        assert_eq!(decoded.unix_nanos(), 1_700_000_000_123_456_789);
    }

    #[test]
    fn test_event_round_trip_nested() {
        let event = Event::new(
            "12345",
            epoch(),
            vec![Metadata::new(
                "test",
                json!({
                    "Name": "George",
                    "Address": "123 Fake",
                    "Friends": [
                        {"Name": "Tom", "Address": "456 Fake"},
                        {"Name": "James", "Address": "333 Fake"}
                    ],
                    "Connections": {"jake": "fake", "other": "data"}
                }),
            )],
        );

        let first = event.encode().unwrap();
        let decoded = Event::decode(&first).unwrap();
        assert_eq!(decoded, event);
        let second = decoded.encode().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_event_decode_missing_identifier() {
        let err = Event::decode(br#"{"event_timestamp":"1970-01-01T00:00:00Z"}"#).unwrap_err();
        assert!(matches!(err, FormatError::MissingField("identifier")));
    }

    #[test]
    fn test_event_decode_bad_timestamp() {
        let err = Event::decode(br#"{"identifier":"a","event_timestamp":"yesterday"}"#)
            .unwrap_err();
        assert!(matches!(err, FormatError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_get_returns_last_value() {
        let event = Event::new(
            "id",
            epoch(),
            vec![Metadata::new("a", 1), Metadata::new("a", 2)],
        );
        assert_eq!(event.get("a"), Some(&json!(2)));
        assert_eq!(event.get("missing"), None);
    }

    fn metadata_strategy() -> impl Strategy<Value = Vec<Metadata>> {
        prop::collection::vec(
            (
                "[a-z_]{1,12}".prop_filter("reserved", |n| !RESERVED_KEYS.contains(&n.as_str())),
                prop_oneof![
                    any::<String>().prop_map(Value::from),
                    any::<i64>().prop_map(Value::from),
                    any::<bool>().prop_map(Value::from),
                    Just(Value::Null),
                ],
            )
                .prop_map(|(name, value)| Metadata::new(name, value)),
            0..8,
        )
    }

    proptest! {
        #[test]
        fn prop_encode_decode_encode_is_stable(
            identifier in ".{0,24}",
            secs in 0i64..4_000_000_000,
            nanos in 0u32..1_000_000_000,
            metadata in metadata_strategy(),
        ) {
            let ts = Utc.timestamp_opt(secs, nanos).unwrap();
            let event = Event::new(identifier, ts, metadata);
            let first = event.encode().unwrap();
            let second = Event::decode(&first).unwrap().encode().unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_reserved_name_always_fails(
            reserved in prop::sample::select(RESERVED_KEYS.to_vec()),
            mut metadata in metadata_strategy(),
            position in 0usize..8,
        ) {
            let at = position.min(metadata.len());
            metadata.insert(at, Metadata::new(reserved, "x"));
            let event = Event::new("id", Utc.timestamp_opt(0, 0).unwrap(), metadata);
            prop_assert!(matches!(event.encode(), Err(FormatError::ReservedKey(_))));
        }
    }
}
