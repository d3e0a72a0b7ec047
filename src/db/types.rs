//! Statement parameters and result rows.
//!
//! Row values use `serde_json::Value` as the unified representation: the
//! driver decodes server types into JSON values once, and everything above
//! the client seam is database-agnostic.

use crate::config::CursorShape;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// A parameter bound to a SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e}")))
    }
}

/// Driver-level query result: column names plus a value matrix.
///
/// Column names are shared across rows via `Arc` so shaping is cheap.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub columns: Arc<[String]>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl QueryOutput {
    /// A result with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            columns: Vec::<String>::new().into(),
            rows: Vec::new(),
        }
    }

    /// Shape the raw rows for a cursor.
    pub(crate) fn into_rows(self, shape: CursorShape) -> Vec<Row> {
        let columns = match shape {
            CursorShape::Mapped => Some(self.columns),
            CursorShape::Positional => None,
        };
        self.rows
            .into_iter()
            .map(|values| Row {
                columns: columns.clone(),
                values,
            })
            .collect()
    }
}

/// One result row, shaped per the session's [`CursorShape`].
#[derive(Debug, Clone)]
pub struct Row {
    columns: Option<Arc<[String]>>,
    values: Vec<JsonValue>,
}

impl Row {
    /// Value at a column index.
    pub fn get(&self, idx: usize) -> Option<&JsonValue> {
        self.values.get(idx)
    }

    /// Value by column name. Returns `None` for positional rows or unknown
    /// columns.
    pub fn get_named(&self, name: &str) -> Option<&JsonValue> {
        let columns = self.columns.as_ref()?;
        let idx = columns.iter().position(|c| c == name)?;
        self.values.get(idx)
    }

    /// Column names, when the row was produced by a mapped cursor.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<JsonValue> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
