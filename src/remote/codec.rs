//! Record Codec
//!
//! Maps items to and from the hash fields stored per key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::cache::{Item, Payload};
use crate::error::{CacheError, Result};

pub const VALUE_FIELD: &str = "value";
pub const ERROR_FIELD: &str = "error";
pub const CREATED_FIELD: &str = "created";
pub const DURATION_FIELD: &str = "duration";

/// Field name to raw bytes, as returned by HGETALL.
pub type Record = HashMap<String, Vec<u8>>;

/// Duration units from largest to smallest, in nanoseconds.
const UNITS: [(&str, u128); 6] = [
    ("h", 3_600_000_000_000),
    ("m", 60_000_000_000),
    ("s", 1_000_000_000),
    ("ms", 1_000_000),
    ("us", 1_000),
    ("ns", 1),
];

// == Encode ==
/// Hash fields for `item`. Exactly one of `value` / `error` is present.
pub fn encode(item: &Item) -> Vec<(&'static str, Vec<u8>)> {
    let payload = match item.payload() {
        Payload::Value(value) => (VALUE_FIELD, value.clone()),
        Payload::Error(err) => (ERROR_FIELD, err.to_string().into_bytes()),
    };
    vec![
        payload,
        (
            CREATED_FIELD,
            timestamp_nanos(item.cached()).to_string().into_bytes(),
        ),
        (
            DURATION_FIELD,
            format_duration(item.duration()).into_bytes(),
        ),
    ]
}

// == Decode ==
/// Rebuilds the item stored at `key`, or `None` when the record holds neither
/// a value nor an error.
pub fn decode(key: &str, record: &Record) -> Result<Option<Item>> {
    let payload = if let Some(value) = record.get(VALUE_FIELD) {
        Payload::Value(value.clone())
    } else if let Some(message) = record.get(ERROR_FIELD) {
        let message = String::from_utf8_lossy(message).into_owned();
        Payload::Error(Arc::new(anyhow::Error::msg(message)))
    } else {
        return Ok(None);
    };

    let created = text_field(key, record, CREATED_FIELD)?
        .parse::<i64>()
        .map_err(|e| CacheError::decode(key, format!("bad {CREATED_FIELD}: {e}")))?;
    let duration = text_field(key, record, DURATION_FIELD)?;
    let duration = parse_duration(duration)
        .ok_or_else(|| CacheError::decode(key, format!("bad {DURATION_FIELD}: {duration:?}")))?;

    Ok(Some(Item::new(payload, Utc.timestamp_nanos(created), duration)))
}

fn text_field<'a>(key: &str, record: &'a Record, field: &str) -> Result<&'a str> {
    let raw = record
        .get(field)
        .ok_or_else(|| CacheError::decode(key, format!("missing {field}")))?;
    std::str::from_utf8(raw).map_err(|_| CacheError::decode(key, format!("{field} is not utf-8")))
}

/// Nanoseconds since the Unix epoch, saturating outside chrono's range.
pub fn timestamp_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(if at.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

// == Duration Strings ==
/// Formats `duration` in the largest unit that represents it exactly,
/// e.g. `1h`, `90s`, `250ms`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    UNITS
        .iter()
        .find(|(_, unit)| nanos % unit == 0)
        .map(|(suffix, unit)| format!("{}{}", nanos / unit, suffix))
        .unwrap_or_else(|| format!("{nanos}ns"))
}

/// Parses the output of [`format_duration`].
pub fn parse_duration(text: &str) -> Option<Duration> {
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let (digits, suffix) = text.split_at(split);
    let count: u128 = digits.parse().ok()?;
    let (_, unit) = UNITS.iter().find(|(name, _)| *name == suffix)?;

    let nanos = count.checked_mul(*unit)?;
    let secs = u64::try_from(nanos / 1_000_000_000).ok()?;
    Some(Duration::new(secs, (nanos % 1_000_000_000) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cacheable;

    #[test]
    fn test_format_duration_picks_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_nanos(7)), "7ns");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("3us"), Some(Duration::from_micros(3)));
        assert_eq!(parse_duration("0s"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration("10 days"), None);
        assert_eq!(parse_duration("1.5s"), None);
    }

    #[test]
    fn test_max_duration_survives_encoding() {
        let text = format_duration(Duration::MAX);
        assert_eq!(parse_duration(&text), Some(Duration::MAX));
    }

    #[test]
    fn test_decode_value_record() {
        let cached = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        let item = Item::from_cacheable(Cacheable::value("v", Duration::from_secs(60)), cached);
        let record: Record = encode(&item)
            .into_iter()
            .map(|(field, value)| (field.to_string(), value))
            .collect();

        assert_eq!(record[CREATED_FIELD], b"1700000000123456789".to_vec());
        assert_eq!(record[DURATION_FIELD], b"1m".to_vec());

        let decoded = decode("k", &record).unwrap().unwrap();
        assert_eq!(decoded.value(), Some(&b"v"[..]));
        assert_eq!(decoded.cached(), cached);
        assert_eq!(decoded.duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_decode_error_record() {
        let item = Item::from_cacheable(
            Cacheable::error(anyhow::anyhow!("upstream 503"), Duration::from_secs(5)),
            Utc::now(),
        );
        let record: Record = encode(&item)
            .into_iter()
            .map(|(field, value)| (field.to_string(), value))
            .collect();

        assert!(!record.contains_key(VALUE_FIELD));
        let decoded = decode("k", &record).unwrap().unwrap();
        assert_eq!(decoded.error().map(|e| e.to_string()), Some("upstream 503".into()));
    }

    #[test]
    fn test_decode_empty_record_is_absent() {
        assert!(decode("k", &Record::new()).unwrap().is_none());
    }

    #[test]
    fn test_decode_bad_created_field() {
        let mut record = Record::new();
        record.insert(VALUE_FIELD.into(), b"v".to_vec());
        record.insert(CREATED_FIELD.into(), b"yesterday".to_vec());
        record.insert(DURATION_FIELD.into(), b"1h".to_vec());

        let err = decode("k", &record).unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
    }

    #[test]
    fn test_decode_bad_duration_field() {
        let mut record = Record::new();
        record.insert(VALUE_FIELD.into(), b"v".to_vec());
        record.insert(CREATED_FIELD.into(), b"0".to_vec());
        record.insert(DURATION_FIELD.into(), b"forever".to_vec());

        let err = decode("k", &record).unwrap_err();
        assert!(err.to_string().contains("bad duration"));
    }
}
