//! Normalized cell values and ordered row records.
//!
//! Everything that leaves a workbook is converted into the closed [`CellValue`]
//! set before it is stored, searched, or serialized. Values that do not fit the
//! set fall back to their string form.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A serialization-safe scalar (or list of scalars) taken from a sheet cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<CellValue>),
}

impl CellValue {
    /// Float cell; integral values within `i64` range collapse to `Int`, and
    /// NaN or infinities become `Null`.
    pub fn from_number(n: f64) -> Self {
        if !n.is_finite() {
            return CellValue::Null;
        }
        if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
            CellValue::Int(n as i64)
        } else {
            CellValue::Float(n)
        }
    }

    /// Text cell. Empty strings are kept as text, not null.
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Convert an arbitrary JSON value into the closed set.
    ///
    /// Objects are outside the set and are stored as their JSON text.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CellValue::Int(i)
                } else {
                    n.as_f64().map(CellValue::from_number).unwrap_or_else(|| {
                        log::warn!("Unrepresentable number {}; keeping as text", n);
                        CellValue::Text(n.to_string())
                    })
                }
            }
            Value::String(s) => CellValue::Text(s),
            Value::Array(items) => {
                CellValue::List(items.into_iter().map(CellValue::from_json).collect())
            }
            Value::Object(map) => {
                let text = Value::Object(map).to_string();
                log::warn!("Nested object cell value converted to text: {}", text);
                CellValue::Text(text)
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Int(_) | CellValue::Float(_))
    }
}

/// String form used for search and display. `Null` renders as an empty string.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(x) => write!(f, "{}", x),
            CellValue::Text(s) => f.write_str(s),
            CellValue::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(CellValue::from_json)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(x: f64) -> Self {
        CellValue::from_number(x)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// One record of a sheet: column label to value, in column order.
///
/// Serialized as a JSON object whose key order matches the sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Append a cell, replacing the value if the column is already present.
    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        let column = column.into();
        if let Some(slot) = self.cells.iter_mut().find(|(c, _)| *c == column) {
            slot.1 = value;
        } else {
            self.cells.push((column, value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, CellValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column name to cell value")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Row, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((column, value)) = access.next_entry::<String, CellValue>()? {
                    row.insert(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_number_collapses_integral_values() {
        assert_eq!(CellValue::from_number(42.0), CellValue::Int(42));
        assert_eq!(CellValue::from_number(0.065), CellValue::Float(0.065));
        assert_eq!(CellValue::from_number(f64::NAN), CellValue::Null);
        assert_eq!(CellValue::from_number(f64::INFINITY), CellValue::Null);
    }

    #[test]
    fn test_from_json_handles_every_kind() {
        assert_eq!(CellValue::from_json(json!(null)), CellValue::Null);
        assert_eq!(CellValue::from_json(json!(true)), CellValue::Bool(true));
        assert_eq!(CellValue::from_json(json!(7)), CellValue::Int(7));
        assert_eq!(CellValue::from_json(json!(1.5)), CellValue::Float(1.5));
        assert_eq!(CellValue::from_json(json!("Midtown")), CellValue::text("Midtown"));
        assert_eq!(
            CellValue::from_json(json!([1, ["a"]])),
            CellValue::List(vec![
                CellValue::Int(1),
                CellValue::List(vec![CellValue::text("a")])
            ])
        );
        assert_eq!(
            CellValue::from_json(json!({"k": 1})),
            CellValue::text(r#"{"k":1}"#)
        );
    }

    #[test]
    fn test_display_for_search() {
        assert_eq!(CellValue::Null.to_string(), "");
        assert_eq!(CellValue::Bool(false).to_string(), "false");
        assert_eq!(CellValue::Float(6.25).to_string(), "6.25");
        assert_eq!(
            CellValue::List(vec![CellValue::Int(1), CellValue::text("x")]).to_string(),
            "[1, x]"
        );
    }

    #[test]
    fn test_row_preserves_column_order_through_json() {
        let row: Row = vec![
            ("Property", CellValue::text("Tower A")),
            ("Address", CellValue::text("1 Main St")),
            ("CapRate", CellValue::Float(0.055)),
            ("Occupied", CellValue::Bool(true)),
            ("Notes", CellValue::Null),
        ]
        .into_iter()
        .collect();

        let text = serde_json::to_string(&row).unwrap();
        assert_eq!(
            text,
            r#"{"Property":"Tower A","Address":"1 Main St","CapRate":0.055,"Occupied":true,"Notes":null}"#
        );

        let back: Row = serde_json::from_str(&text).unwrap();
        assert_eq!(back, row);
        assert_eq!(
            back.columns().collect::<Vec<_>>(),
            vec!["Property", "Address", "CapRate", "Occupied", "Notes"]
        );
    }

    #[test]
    fn test_row_insert_replaces_existing_column() {
        let mut row = Row::new();
        row.insert("A", CellValue::Int(1));
        row.insert("A", CellValue::Int(2));
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("A"), Some(&CellValue::Int(2)));
    }
}
