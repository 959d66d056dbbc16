//! Line encoding of an aggregate's log file
//!
//! ```text
//! 00000000000000000002\n
//! <event id>;<ticks>;<event type>;<schema version>;<payload json>\n
//! <event id>;<ticks>;<event type>;<schema version>;<payload json>\n
//! ```
//!
//! The header is the committed version as a fixed-width decimal so it can be
//! rewritten in place. Record lines do not carry the aggregate id or sequence;
//! both are implied by the file and the line position.
//!
//! The delimiter is not escaped. Records whose text fields would contain it
//! (or a line break) are refused at encode time rather than written in a form
//! that cannot be read back.

use quire_core::{AggregateId, EventRecord, QuireError, Result, SchemaVersion, StoredEvent, Timestamp, Version};
use uuid::Uuid;

pub const DELIMITER: char = ';';

/// Digits in the header line
pub const HEADER_DIGITS: usize = 20;

/// Bytes in the header line, including its newline
pub const HEADER_LEN: u64 = HEADER_DIGITS as u64 + 1;

const FIELD_COUNT: usize = 5;

/// Encode the header line, newline included
pub fn encode_header(version: Version) -> String {
    format!("{:0width$}\n", version, width = HEADER_DIGITS)
}

/// Decode the header line. Failures are reported as a corrupt line 1.
pub fn decode_header(line: &str, aggregate_id: &AggregateId) -> Result<Version> {
    let digits = trim_line_end(line);
    if digits.len() != HEADER_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QuireError::corrupt(
            *aggregate_id,
            1,
            format!("malformed version header {:?}", digits),
        ));
    }
    digits
        .parse()
        .map_err(|e| QuireError::corrupt(*aggregate_id, 1, format!("version header: {}", e)))
}

/// Encode a record as a single line, without the trailing newline
pub fn encode_record(record: &EventRecord) -> Result<String> {
    check_field("event type", &record.event_type)?;
    if record.event_type.is_empty() {
        return Err(QuireError::InvalidRecord("event type must not be empty".into()));
    }

    let schema_version = record.schema_version.to_string();
    let payload: String = serde_json::to_string(&record.payload)?
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect();
    if payload.contains(DELIMITER) {
        return Err(QuireError::InvalidRecord(format!(
            "payload of event {} contains the field delimiter '{}'",
            record.event_id, DELIMITER
        )));
    }

    Ok(format!(
        "{id}{d}{ticks}{d}{ty}{d}{schema}{d}{payload}",
        id = record.event_id.hyphenated(),
        ticks = record.timestamp.ticks(),
        ty = record.event_type,
        schema = schema_version,
        payload = payload,
        d = DELIMITER,
    ))
}

/// Decode one record line.
///
/// `sequence` is the record's 0-based position; a failure is reported
/// against the corresponding 1-based file line (the header is line 1).
pub fn decode_record(line: &str, aggregate_id: &AggregateId, sequence: Version) -> Result<StoredEvent> {
    let line_number = sequence + 2;
    let corrupt = |reason: String| QuireError::corrupt(*aggregate_id, line_number, reason);

    let fields: Vec<&str> = trim_line_end(line).split(DELIMITER).collect();
    // Older writers terminated every record with a delimiter.
    let fields = match fields.as_slice() {
        [head @ .., ""] if head.len() == FIELD_COUNT => head,
        all => all,
    };
    let [event_id, ticks, event_type, schema_version, payload] = fields else {
        return Err(corrupt(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            fields.len()
        )));
    };

    let event_id = Uuid::parse_str(event_id).map_err(|e| corrupt(format!("event id: {}", e)))?;
    let ticks: i64 = ticks
        .parse()
        .map_err(|e| corrupt(format!("timestamp {:?}: {}", ticks, e)))?;
    let timestamp = Timestamp::from_ticks(ticks)
        .ok_or_else(|| corrupt(format!("timestamp {} out of range", ticks)))?;
    if event_type.is_empty() {
        return Err(corrupt("empty event type".into()));
    }
    let schema_version: SchemaVersion = schema_version
        .parse()
        .map_err(|_| corrupt(format!("schema version {:?}", schema_version)))?;
    let payload: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| corrupt(format!("payload: {}", e)))?;

    Ok(StoredEvent {
        aggregate_id: *aggregate_id,
        sequence,
        record: EventRecord {
            event_id,
            timestamp,
            event_type: (*event_type).to_string(),
            schema_version,
            payload,
        },
    })
}

fn check_field(name: &str, value: &str) -> Result<()> {
    if value.contains(|c| c == DELIMITER || c == '\n' || c == '\r') {
        return Err(QuireError::InvalidRecord(format!(
            "{} {:?} contains a delimiter or line break",
            name, value
        )));
    }
    Ok(())
}

fn trim_line_end(line: &str) -> &str {
    line.trim_end_matches(|c| c == '\n' || c == '\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(payload: serde_json::Value) -> EventRecord {
        EventRecord::new("AccountOpened", SchemaVersion::new(1, 2), payload)
    }

    #[test]
    fn test_header_is_fixed_width() {
        assert_eq!(encode_header(0), "00000000000000000000\n");
        assert_eq!(encode_header(3).len() as u64, HEADER_LEN);
        assert_eq!(encode_header(u64::MAX).len() as u64, HEADER_LEN);

        let id = AggregateId::new();
        assert_eq!(decode_header(&encode_header(42), &id).unwrap(), 42);
        assert_eq!(decode_header("00000000000000000007\r\n", &id).unwrap(), 7);
    }

    #[test]
    fn test_bad_header_is_corrupt_line_one() {
        let id = AggregateId::new();
        for line in ["", "12\n", "0000000000000000000x\n", "99999999999999999999\n"] {
            let err = decode_header(line, &id).unwrap_err();
            assert!(
                matches!(err, QuireError::CorruptRecord { line_number: 1, .. }),
                "{:?}: {:?}",
                line,
                err
            );
        }
    }

    #[test]
    fn test_record_line_layout() {
        let record = record(json!({"owner": "ada"}))
            .with_event_id(Uuid::nil())
            .with_timestamp(Timestamp::from_ticks(638_000_000_000_000_000).unwrap());
        assert_eq!(
            encode_record(&record).unwrap(),
            "00000000-0000-0000-0000-000000000000;638000000000000000;AccountOpened;1.2;{\"owner\":\"ada\"}"
        );
    }

    #[test]
    fn test_decode_attaches_identity() {
        let id = AggregateId::new();
        let original = record(json!({"nested": {"list": [1, 2, 3]}, "text": "a\nb"}));
        let line = encode_record(&original).unwrap();

        let stored = decode_record(&line, &id, 7).unwrap();
        assert_eq!(stored.aggregate_id, id);
        assert_eq!(stored.sequence, 7);
        assert_eq!(stored.record, original);
    }

    #[test]
    fn test_decode_accepts_trailing_delimiter() {
        let id = AggregateId::new();
        let line = "0b7d1b57-6a0b-4f8e-9c39-6b2b5d0c9a11;634000000000000000;Created;1.0;{\"a\":1};";
        let stored = decode_record(line, &id, 0).unwrap();
        assert_eq!(stored.record.event_type, "Created");
        assert_eq!(stored.record.payload, json!({"a": 1}));
    }

    #[test]
    fn test_malformed_lines_are_corrupt() {
        let id = AggregateId::new();
        let good_id = "0b7d1b57-6a0b-4f8e-9c39-6b2b5d0c9a11";
        let lines = [
            "too;few;fields".to_string(),
            format!("{};1;T;1.0;{{}};extra", good_id),
            "nope;1;T;1.0;{}".to_string(),
            format!("{};abc;T;1.0;{{}}", good_id),
            format!("{};-5;T;1.0;{{}}", good_id),
            format!("{};1;;1.0;{{}}", good_id),
            format!("{};1;T;one;{{}}", good_id),
            format!("{};1;T;1.0;{{not json", good_id),
        ];
        for line in &lines {
            let err = decode_record(line, &id, 3).unwrap_err();
            assert!(
                matches!(err, QuireError::CorruptRecord { line_number: 5, .. }),
                "{}: {:?}",
                line,
                err
            );
        }
    }

    #[test]
    fn test_delimiter_in_payload_is_refused() {
        let err = encode_record(&record(json!({"note": "a;b"}))).unwrap_err();
        assert!(matches!(err, QuireError::InvalidRecord(_)));

        let mut bad_type = record(json!({}));
        bad_type.event_type = "Account;Opened".into();
        assert!(matches!(encode_record(&bad_type), Err(QuireError::InvalidRecord(_))));
    }

    #[test]
    fn test_float_payloads_are_exact() {
        let id = AggregateId::new();
        let values = [
            1.0715660391465826e-75,
            0.1,
            -0.0,
            1.0,
            f64::MIN_POSITIVE,
            5e-324,
            f64::MAX,
            f64::MIN,
            std::f64::consts::PI,
            123_456_789.123_456_78,
        ];
        for f in values {
            let original = record(json!({ "f": f, "list": [f, -f] }));
            let line = encode_record(&original).unwrap();
            let stored = decode_record(&line, &id, 0).unwrap();
            assert_eq!(stored.record.payload, original.payload, "{:e}", f);
        }
    }

    fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
        use serde_json::Value;

        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(Value::from),
            "[^;]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::btree_map("[^;]{0,8}", inner, 0..8)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(
            event_type in "[A-Za-z][A-Za-z0-9_.]{0,24}",
            ticks in 0i64..=3_155_378_975_999_999_999,
            major in 0u32..100,
            minor in 0u32..100,
            payload in arb_payload(),
        ) {
            let id = AggregateId::new();
            let original = EventRecord::new(event_type, SchemaVersion::new(major, minor), payload)
                .with_timestamp(Timestamp::from_ticks(ticks).unwrap());

            let line = encode_record(&original).unwrap();
            let stored = decode_record(&line, &id, 0).unwrap();
            prop_assert_eq!(stored.record, original);
        }

        #[test]
        fn prop_any_finite_float_roundtrips(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
            let id = AggregateId::new();
            let original = record(json!({ "f": f }));
            let line = encode_record(&original).unwrap();
            let stored = decode_record(&line, &id, 0).unwrap();
            prop_assert_eq!(stored.record.payload, original.payload);
        }
    }
}
