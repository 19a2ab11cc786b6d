//! Priority-ordered field probing over raw JSON documents.
//!
//! Upstream ingestion has written detection documents under several
//! schema generations, so the same concept can live under different field
//! names. Each concept gets an explicit, ordered list of field names; the
//! first field holding a usable value wins.

use chrono::{DateTime, NaiveDateTime, TimeZone as _, Utc};
use serde_json::{Map, Value};
use wildlife_watch_detection_models::UNKNOWN_SPECIES;

/// Species-like fields, in priority order.
pub const SPECIES_FIELDS: &[&str] = &[
    "species",
    "speciesName",
    "label",
    "classification",
    "category",
    "animal",
    "type",
];

/// Sub-objects searched (one level deep) when no top-level species field
/// resolves.
pub const NESTED_SPECIES_OBJECTS: &[&str] = &["detection", "metadata"];

/// Explicit identity fields, in priority order.
pub const IDENTITY_FIELDS: &[&str] = &[
    "uniqueId",
    "sightingId",
    "detectionId",
    "mediaId",
    "assetId",
    "clipId",
    "eventId",
];

/// Raw media URL fields, probed after the derived display URLs.
pub const RAW_MEDIA_FIELDS: &[&str] = &[
    "mediaUrl",
    "videoUrl",
    "previewUrl",
    "rawMediaUrl",
    "rawVideoUrl",
    "rawPreviewUrl",
];

/// Confidence fields, in priority order.
pub const CONFIDENCE_FIELDS: &[&str] = &["maxConfidence", "maxConf", "confidence"];

/// Returns a non-empty, trimmed string value for `field`.
#[must_use]
pub fn get_str<'a>(fields: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    fields
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Returns a finite number for `field`. Numeric strings are accepted.
#[must_use]
pub fn get_f64(fields: &Map<String, Value>, field: &str) -> Option<f64> {
    value_as_f64(fields.get(field)?)
}

/// Converts a JSON value to a finite `f64`, accepting numeric strings.
#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Returns a non-negative whole number for `field`.
#[must_use]
pub fn get_count(fields: &Map<String, Value>, field: &str) -> Option<u64> {
    let value = fields.get(field)?;
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let n = value_as_f64(value)?;
    if n >= 0.0 && n.fract() == 0.0 && n <= 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        return Some(n as u64);
    }
    None
}

/// Returns the first field in `names` that holds a finite number.
#[must_use]
pub fn first_f64(fields: &Map<String, Value>, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| get_f64(fields, name))
}

/// Renders a value usable as an identity: a non-empty string, or a
/// finite number in its canonical JSON form.
#[must_use]
pub fn identity_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|_| n.to_string()),
        _ => None,
    }
}

/// Probes `names` across each field map in turn (all of `sources[0]`
/// first, then `sources[1]`, ...) and returns the first identity value.
#[must_use]
pub fn probe_identity(sources: &[&Map<String, Value>], names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        sources
            .iter()
            .find_map(|fields| fields.get(*name).and_then(identity_value))
    })
}

/// Resolves the species label of a detection document.
///
/// Top-level fields are tried first, then the same list inside each nested
/// sub-object. Falls back to [`UNKNOWN_SPECIES`].
#[must_use]
pub fn resolve_species(fields: &Map<String, Value>) -> String {
    probe_species(fields)
        .or_else(|| {
            NESTED_SPECIES_OBJECTS.iter().find_map(|nested| {
                fields
                    .get(*nested)
                    .and_then(Value::as_object)
                    .and_then(probe_species)
            })
        })
        .map_or_else(|| UNKNOWN_SPECIES.to_string(), str::to_string)
}

fn probe_species(fields: &Map<String, Value>) -> Option<&str> {
    SPECIES_FIELDS.iter().find_map(|name| get_str(fields, name))
}

/// Parses a stored timestamp.
///
/// Accepts RFC 3339 strings, naive ISO 8601 strings (treated as UTC),
/// epoch-millisecond numbers, and `{seconds, nanoseconds}` objects (with
/// or without leading underscores).
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => {
            let millis = n.as_f64()?;
            if !millis.is_finite() {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        Value::Object(obj) => {
            let seconds = obj
                .get("seconds")
                .or_else(|| obj.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = obj
                .get("nanoseconds")
                .or_else(|| obj.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos).single()
        }
        _ => None,
    }
}

/// Parses the timestamp stored under `field`.
#[must_use]
pub fn get_timestamp(fields: &Map<String, Value>, field: &str) -> Option<DateTime<Utc>> {
    parse_timestamp(fields.get(field)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(value: &Value) -> &Map<String, Value> {
        value.as_object().unwrap()
    }

    #[test]
    fn species_prefers_top_level_fields_in_order() {
        let doc = json!({"label": "Fox", "speciesName": "Red fox", "type": "image"});
        assert_eq!(resolve_species(obj(&doc)), "Red fox");
    }

    #[test]
    fn species_skips_blank_values() {
        let doc = json!({"species": "   ", "animal": "Badger"});
        assert_eq!(resolve_species(obj(&doc)), "Badger");
    }

    #[test]
    fn species_recurses_into_nested_objects() {
        let doc = json!({"detection": {"count": 2}, "metadata": {"classification": "Deer"}});
        assert_eq!(resolve_species(obj(&doc)), "Deer");
    }

    #[test]
    fn species_defaults_to_unknown() {
        let doc = json!({"count": 1, "metadata": "not an object"});
        assert_eq!(resolve_species(obj(&doc)), UNKNOWN_SPECIES);
    }

    #[test]
    fn identity_accepts_strings_and_numbers_only() {
        assert_eq!(identity_value(&json!(" abc ")), Some("abc".to_string()));
        assert_eq!(identity_value(&json!(42)), Some("42".to_string()));
        assert_eq!(identity_value(&json!("")), None);
        assert_eq!(identity_value(&json!(true)), None);
        assert_eq!(identity_value(&json!(null)), None);
    }

    #[test]
    fn probe_tries_every_source_before_the_next_field() {
        let detection = json!({"mediaId": "m-1"});
        let capture = json!({"uniqueId": "u-9", "mediaId": "m-2"});
        let found = probe_identity(&[obj(&detection), obj(&capture)], IDENTITY_FIELDS);
        assert_eq!(found.as_deref(), Some("u-9"));
    }

    #[test]
    fn parses_timestamp_shapes() {
        let expected = "2024-05-03 17:45:00 UTC";
        for value in [
            json!("2024-05-03T17:45:00Z"),
            json!("2024-05-03T19:45:00+02:00"),
            json!("2024-05-03T17:45:00.000"),
            json!(1_714_758_300_000_i64),
            json!({"seconds": 1_714_758_300_i64, "nanoseconds": 0}),
            json!({"_seconds": 1_714_758_300_i64, "_nanoseconds": 0}),
        ] {
            let parsed = parse_timestamp(&value).unwrap();
            assert_eq!(parsed.to_string(), expected, "for {value}");
        }
        assert!(parse_timestamp(&json!("yesterday")).is_none());
        assert!(parse_timestamp(&json!([1, 2])).is_none());
    }

    #[test]
    fn count_rejects_fractions_and_negatives() {
        let doc = json!({"a": 3, "b": 2.0, "c": 2.5, "d": -1, "e": "4"});
        let fields = obj(&doc);
        assert_eq!(get_count(fields, "a"), Some(3));
        assert_eq!(get_count(fields, "b"), Some(2));
        assert_eq!(get_count(fields, "c"), None);
        assert_eq!(get_count(fields, "d"), None);
        assert_eq!(get_count(fields, "e"), Some(4));
    }
}
