//! Normalized schema snapshots.
//!
//! Every analyzer maps its backend's native types down to a small closed set
//! of [`PrimitiveType`]s so that builders and the semantic layer can treat all
//! sources alike. Kind-specific details (declared SQL type, key constraints,
//! BSON type names) ride along in [`Column::native_type`] and
//! [`Column::extensions`].
//!
//! A [`NormalizedSchema`] is a pure value: no connection is held once an
//! analyzer returns it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Extension key carrying a relational constraint such as `PRIMARY KEY`.
pub const CONSTRAINT_KEY: &str = "constraint";

/// Primitive column type shared by every backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    Date,
    Identifier,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Date => "date",
            PrimitiveType::Identifier => "identifier",
        }
    }

    /// Map a declared SQL type (Postgres or MySQL spelling) to a primitive.
    ///
    /// Parameters and modifiers are ignored: `varchar(255)`, `decimal(10,2)`
    /// and `timestamp with time zone` map by their leading type name.
    pub fn from_sql_type(native: &str) -> Self {
        let lowered = native.trim().to_lowercase();
        let base = lowered
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("");

        match base {
            "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "smallint" | "tinyint"
            | "mediumint" | "serial" | "bigserial" | "smallserial" | "numeric" | "decimal"
            | "real" | "double" | "float" | "float4" | "float8" | "money" => {
                // MySQL reports booleans as tinyint(1)
                if lowered == "tinyint(1)" {
                    PrimitiveType::Boolean
                } else {
                    PrimitiveType::Number
                }
            }
            "boolean" | "bool" | "bit" => PrimitiveType::Boolean,
            "date" | "time" | "timetz" | "timestamp" | "timestamptz" | "datetime" | "year"
            | "interval" => PrimitiveType::Date,
            "uuid" => PrimitiveType::Identifier,
            _ => PrimitiveType::String,
        }
    }

    /// Infer a spreadsheet column's type from its sampled cells.
    ///
    /// Any value that is neither numeric nor a boolean literal makes the column
    /// a string; otherwise booleans win over numbers. Empty cells are ignored
    /// and an all-empty column is a string.
    pub fn infer_from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut saw_boolean = false;
        let mut saw_number = false;

        for cell in cells {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            if cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false") {
                saw_boolean = true;
            } else if cell.parse::<f64>().is_ok() {
                saw_number = true;
            } else {
                return PrimitiveType::String;
            }
        }

        if saw_boolean {
            PrimitiveType::Boolean
        } else if saw_number {
            PrimitiveType::Number
        } else {
            PrimitiveType::String
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attribute of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: PrimitiveType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_type: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            data_type,
            native_type: None,
            extensions: Map::new(),
        }
    }

    pub fn with_native_type(mut self, native: impl Into<String>) -> Self {
        self.native_type = Some(native.into());
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Relational constraint, if one was captured.
    pub fn constraint(&self) -> Option<&str> {
        self.extensions.get(CONSTRAINT_KEY).and_then(Value::as_str)
    }
}

/// Entity name → ordered columns.
///
/// Entities are kept sorted by name; column order is the backend's order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedSchema {
    entities: BTreeMap<String, Vec<Column>>,
}

impl NormalizedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity with no columns yet.
    ///
    /// Empty collections still appear in document-store schemas.
    pub fn add_entity(&mut self, entity: impl Into<String>) {
        self.entities.entry(entity.into()).or_default();
    }

    /// Append a column to `entity`, creating the entity if needed.
    pub fn push_column(&mut self, entity: impl Into<String>, column: Column) {
        self.entities.entry(entity.into()).or_default().push(column);
    }

    pub fn columns(&self, entity: &str) -> Option<&[Column]> {
        self.entities.get(entity).map(Vec::as_slice)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&str, &[Column])> {
        self.entities
            .iter()
            .map(|(name, cols)| (name.as_str(), cols.as_slice()))
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Lowercase hex SHA-256 of the canonical JSON form.
    ///
    /// Entities and extensions are ordered maps, so equal snapshots always
    /// serialize, and therefore fingerprint, the same.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let digest = Sha256::digest(serde_json::to_vec(self)?);
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn to_json(&self) -> Value {
        // Serialization of ordered maps of plain values cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl FromIterator<(String, Column)> for NormalizedSchema {
    fn from_iter<T: IntoIterator<Item = (String, Column)>>(iter: T) -> Self {
        let mut schema = NormalizedSchema::new();
        for (entity, column) in iter {
            schema.push_column(entity, column);
        }
        schema
    }
}
