//! Fetched item model and ingestion-time sanitization

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Fields dropped from every item before it is stored
pub const NOISY_FIELDS: &[&str] = &["rating", "table_row"];

/// A record returned by the remote source
///
/// Items are kept as opaque JSON objects. The only field the crawler
/// interprets is `id`, used for deduplication, plus `latitude`/`longitude`
/// when exporting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchedItem(Map<String, Value>);

impl FetchedItem {
    /// Build an item from a raw result entry
    ///
    /// Returns `None` for null, falsy and non-object entries. Noisy fields are
    /// stripped from objects.
    pub fn sanitize(raw: Value) -> Option<Self> {
        match raw {
            Value::Object(mut fields) => {
                for field in NOISY_FIELDS {
                    fields.remove(*field);
                }
                Some(Self(fields))
            }
            _ => None,
        }
    }

    /// Identifier used for deduplication
    ///
    /// Strings are used verbatim and numbers by their numeric value, so `7`,
    /// `7.0` and `"7"` are the same item. Null, missing and structured ids
    /// yield `None`.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(number_key(n)),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Number of fields holding a non-null value
    pub fn populated_fields(&self) -> usize {
        self.0.values().filter(|v| !v.is_null()).count()
    }

    /// Look up a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Latitude as a number, accepting numeric strings
    pub fn latitude(&self) -> Option<f64> {
        self.get("latitude").and_then(as_coordinate)
    }

    /// Longitude as a number, accepting numeric strings
    pub fn longitude(&self) -> Option<f64> {
        self.get("longitude").and_then(as_coordinate)
    }

    /// Borrow the underlying JSON object
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the item, returning the underlying JSON object
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for FetchedItem {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn as_coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Integral floats render like integers so `7.0` and `7` share a key
fn number_key(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            // Beyond 2^53 floats are no longer exact integers
            if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                return format!("{}", f as i64);
            }
        }
    }
    n.to_string()
}
