use serde::{Deserialize, Deserializer};
use serde_json::Value;

const FBID_PREFIX: &str = "fbid:";
const JSON_GUARD: &[u8] = b"for (;;);";

/// Turn `"fbid:12"` into `"12"`; other strings pass through.
pub fn strip_fbid_prefix(id: &str) -> &str {
    id.strip_prefix(FBID_PREFIX).unwrap_or(id)
}

/// Render a numeric identifier as an integer string.
///
/// Zero means "absent" on the wire and maps to an empty identifier.
pub fn numeric_id_to_string(id: f64) -> String {
    if id == 0.0 || !id.is_finite() {
        return String::new();
    }
    format!("{}", id.trunc() as i64)
}

/// Normalize a string-or-number identifier to its canonical textual form.
///
/// Anything other than a string or number (including `null`) yields `""`.
pub fn canonical_id(value: &Value) -> String {
    match value {
        Value::String(id) => strip_fbid_prefix(id).to_owned(),
        Value::Number(number) => {
            if let Some(id) = number.as_i64() {
                if id == 0 { String::new() } else { id.to_string() }
            } else if let Some(id) = number.as_u64() {
                id.to_string()
            } else {
                number.as_f64().map(numeric_id_to_string).unwrap_or_default()
            }
        }
        _ => String::new(),
    }
}

/// `deserialize_with` adapter for identifiers that arrive as strings or numbers.
pub fn deserialize_canonical_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(canonical_id).unwrap_or_default())
}

/// Like [`deserialize_canonical_id`] but keeps absence distinguishable.
pub fn deserialize_optional_canonical_id<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .map(canonical_id)
        .filter(|id| !id.is_empty()))
}

/// `deserialize_with` adapter that reads an explicit `null` as the default.
///
/// `#[serde(default)]` alone only covers a missing key.
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `deserialize_with` adapter for counters that may arrive as numbers,
/// numeric strings, or `null`.
pub fn deserialize_lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(lenient_u64).unwrap_or(0))
}

fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Remove the `for (;;);` anti-hijacking prefix from a backend JSON body.
pub fn strip_json_guard(body: &[u8]) -> &[u8] {
    body.strip_prefix(JSON_GUARD).unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn strips_fbid_prefix_only_when_present() {
        assert_eq!(strip_fbid_prefix("fbid:100004"), "100004");
        assert_eq!(strip_fbid_prefix("100004"), "100004");
        assert_eq!(strip_fbid_prefix("id:fbid:1"), "id:fbid:1");
    }

    #[test]
    fn canonicalizes_strings_and_numbers_alike() {
        assert_eq!(canonical_id(&json!("fbid:1234")), "1234");
        assert_eq!(canonical_id(&json!(1234)), "1234");
        assert_eq!(canonical_id(&json!(1234.0)), "1234");
        assert_eq!(canonical_id(&json!(100002345678901_u64)), "100002345678901");
    }

    #[test]
    fn zero_and_non_scalar_ids_are_absent() {
        assert_eq!(canonical_id(&json!(0)), "");
        assert_eq!(canonical_id(&json!(0.0)), "");
        assert_eq!(canonical_id(&Value::Null), "");
        assert_eq!(canonical_id(&json!({"id": 1})), "");
        assert_eq!(numeric_id_to_string(f64::NAN), "");
    }

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "deserialize_canonical_id")]
        id: String,
        #[serde(default, deserialize_with = "deserialize_optional_canonical_id")]
        thread: Option<String>,
        #[serde(default, deserialize_with = "deserialize_lenient_u64")]
        count: u64,
    }

    #[test]
    fn serde_adapters_tolerate_mixed_encodings() {
        let probe: Probe =
            serde_json::from_value(json!({"id": 77.0, "thread": 0, "count": "12"}))
                .expect("probe should decode");
        assert_eq!(probe.id, "77");
        assert_eq!(probe.thread, None);
        assert_eq!(probe.count, 12);

        let probe: Probe = serde_json::from_value(json!({"id": null, "thread": "fbid:9"}))
            .expect("probe should decode");
        assert_eq!(probe.id, "");
        assert_eq!(probe.thread.as_deref(), Some("9"));
        assert_eq!(probe.count, 0);
    }

    #[derive(Debug, Deserialize)]
    struct Summary {
        #[serde(default, deserialize_with = "deserialize_null_default")]
        name: String,
        #[serde(default, deserialize_with = "deserialize_null_default")]
        members: Vec<String>,
        #[serde(default, deserialize_with = "deserialize_null_default")]
        state: i64,
    }

    #[test]
    fn explicit_null_reads_as_default() {
        let summary: Summary =
            serde_json::from_value(json!({"name": null, "members": null, "state": null}))
                .expect("nulls should decode");
        assert_eq!(summary.name, "");
        assert!(summary.members.is_empty());
        assert_eq!(summary.state, 0);

        let summary: Summary = serde_json::from_value(json!({"name": "x", "members": ["a"]}))
            .expect("values should decode");
        assert_eq!(summary.name, "x");
        assert_eq!(summary.members, vec!["a"]);
    }

    #[test]
    fn strips_json_guard_when_present() {
        assert_eq!(strip_json_guard(b"for (;;);{\"t\":\"lb\"}"), b"{\"t\":\"lb\"}");
        assert_eq!(strip_json_guard(b"{\"t\":\"lb\"}"), b"{\"t\":\"lb\"}");
    }
}
