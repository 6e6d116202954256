//! Field decoders for records coming from the REST backend.
//!
//! Every decoder accepts any JSON value and yields `None` (or an empty
//! list) for shapes it does not understand, so a single bad field never
//! fails the whole record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(string) => string.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|number| number.is_finite())
}

pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(string) => Some(string.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
    .filter(|string| !string.is_empty())
}

pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_number))
}

pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_text))
}

/// A list of scalars; a lone scalar counts as a list of one.
pub fn texts<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(values)) => values.iter().filter_map(as_text).collect(),
        Some(value) => as_text(&value).into_iter().collect(),
        None => vec![],
    })
}

pub fn record<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Decodes each value, substituting `T::default()` for the ones that do
/// not fit.
pub fn records<T>(values: Vec<Value>) -> Vec<T>
where
    T: DeserializeOwned + Default,
{
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "number")]
        amount: Option<f64>,
        #[serde(default, deserialize_with = "text")]
        name: Option<String>,
        #[serde(default, deserialize_with = "texts")]
        tags: Vec<String>,
    }

    #[test]
    fn tolerates_wrong_types() {
        let sample: Sample =
            serde_json::from_value(json!({"amount": "12.5", "name": {"x": 1}, "tags": "hiking"}))
                .unwrap();
        assert_eq!(sample.amount, Some(12.5));
        assert_eq!(sample.name, None);
        assert_eq!(sample.tags, vec!["hiking".to_string()]);

        let sample: Sample =
            serde_json::from_value(json!({"amount": null, "name": "  ", "tags": [1, null, "a"]}))
                .unwrap();
        assert_eq!(sample.amount, None);
        assert_eq!(sample.name, None);
        assert_eq!(sample.tags, vec!["1".to_string(), "a".to_string()]);
    }

    #[test]
    fn non_objects_become_default() {
        let samples: Vec<Sample> = records(vec![json!(3), json!({"amount": 4})]);
        assert_eq!(samples[0].amount, None);
        assert_eq!(samples[1].amount, Some(4.0));
    }
}
