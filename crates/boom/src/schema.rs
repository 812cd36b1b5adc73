//! Schema registry and log block schema resolution.
//!
//! A [`SchemaRegistry`] is built once at startup and handed by reference to
//! writers and readers. Readers use it to check that a file's writer schema
//! describes log blocks in a layout this crate can decode.

use crate::error::{BoomError, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Registry name of the log block schema.
pub const LOG_BLOCK_SCHEMA_NAME: &str = "logBlock";

/// JSON schema text written into every boom file header.
///
/// This is the canonical compact form, so headers compare equal with files
/// written by other object container writers of the same schema.
pub const LOG_BLOCK_SCHEMA: &str = concat!(
    r#"{"type":"record","name":"logBlock","fields":["#,
    r#"{"name":"second","type":"long"},"#,
    r#"{"name":"createTime","type":"long"},"#,
    r#"{"name":"blockNumber","type":"long"},"#,
    r#"{"name":"logLines","type":{"type":"array","items":{"type":"record","name":"messageWithMillis","fields":["#,
    r#"{"name":"ms","type":"long"},"#,
    r#"{"name":"eventId","type":"int","default":0},"#,
    r#"{"name":"message","type":"string"}]}}}]}"#
);

/// How the lines of a log block are laid out in a particular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogBlockLayout {
    /// Whether each line carries an `eventId` between `ms` and `message`.
    pub has_event_id: bool,
}

impl LogBlockLayout {
    /// Layout of files written by this crate.
    pub const CURRENT: LogBlockLayout = LogBlockLayout { has_event_id: true };

    /// Layout of files written before event ids existed.
    pub const LEGACY: LogBlockLayout = LogBlockLayout {
        has_event_id: false,
    };
}

impl Default for LogBlockLayout {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Named schema texts, read-only once constructed.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, String>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Creates a registry holding the log block schema.
    pub fn new() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(LOG_BLOCK_SCHEMA_NAME.to_string(), LOG_BLOCK_SCHEMA.to_string());
        Self { schemas }
    }

    /// Registers a schema under `name`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::IncompatibleSchema` if `text` is not valid JSON.
    pub fn register(&mut self, name: impl Into<String>, text: impl Into<String>) -> Result<()> {
        let name = name.into();
        let text = text.into();
        serde_json::from_str::<Value>(&text).map_err(|e| {
            BoomError::IncompatibleSchema(format!("schema {} is not valid JSON: {}", name, e))
        })?;
        self.schemas.insert(name, text);
        Ok(())
    }

    /// Looks up a schema by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.schemas.get(name).map(String::as_str)
    }

    /// Returns the log block schema text.
    pub fn log_block_schema(&self) -> &str {
        self.get(LOG_BLOCK_SCHEMA_NAME).unwrap_or(LOG_BLOCK_SCHEMA)
    }

    /// Works out how to decode log blocks written with `schema_text`.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::IncompatibleSchema` unless the text describes a
    /// record of `second`, `createTime`, `blockNumber` and `logLines` (an
    /// array of `ms`, optional `eventId`, `message` records), in that order.
    pub fn resolve_log_block(&self, schema_text: &str) -> Result<LogBlockLayout> {
        if schema_text == self.log_block_schema() {
            return Ok(LogBlockLayout::CURRENT);
        }

        let schema: Value = serde_json::from_str(schema_text)
            .map_err(|e| incompatible(format!("writer schema is not valid JSON: {}", e)))?;

        let fields = record_fields(&schema, "log block")?;
        expect_fields(
            fields,
            &[
                ("second", "long"),
                ("createTime", "long"),
                ("blockNumber", "long"),
                ("logLines", "array"),
            ],
        )?;

        let items = fields[3]
            .get("type")
            .and_then(|t| t.get("items"))
            .ok_or_else(|| incompatible("logLines has no item type"))?;
        let line_fields = record_fields(items, "log line")?;

        match line_fields.len() {
            3 => {
                expect_fields(line_fields, &[("ms", "long"), ("eventId", "int"), ("message", "string")])?;
                Ok(LogBlockLayout::CURRENT)
            }
            2 => {
                expect_fields(line_fields, &[("ms", "long"), ("message", "string")])?;
                Ok(LogBlockLayout::LEGACY)
            }
            n => Err(incompatible(format!("log line record has {} fields", n))),
        }
    }
}

fn incompatible(msg: impl Into<String>) -> BoomError {
    BoomError::IncompatibleSchema(msg.into())
}

fn type_name(schema: &Value) -> Option<&str> {
    match schema {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("type").and_then(type_name),
        _ => None,
    }
}

fn record_fields<'a>(schema: &'a Value, what: &str) -> Result<&'a [Value]> {
    if type_name(schema) != Some("record") {
        return Err(incompatible(format!("{} schema is not a record", what)));
    }
    schema
        .get("fields")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| incompatible(format!("{} record has no fields", what)))
}

fn expect_fields(fields: &[Value], expected: &[(&str, &str)]) -> Result<()> {
    if fields.len() != expected.len() {
        return Err(incompatible(format!(
            "expected {} fields, found {}",
            expected.len(),
            fields.len()
        )));
    }
    for (field, (name, ty)) in fields.iter().zip(expected) {
        let actual_name = field.get("name").and_then(Value::as_str);
        let actual_type = field.get("type").and_then(type_name);
        if actual_name != Some(*name) || actual_type != Some(*ty) {
            return Err(incompatible(format!(
                "expected field {}: {}, found {:?}: {:?}",
                name, ty, actual_name, actual_type
            )));
        }
    }
    Ok(())
}
