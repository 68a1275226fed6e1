//! Field-order model of a topic's Avro schema.
//!
//! Only what bitmap expansion needs is kept: field names, their positions
//! and whether a field's effective type is a nested record.

use crate::error::{CdcStreamError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A named field of a record, addressed by its position in the record
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    /// 0-based position within the enclosing record, as declared
    pub position: usize,
    pub field_type: FieldType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, position: usize, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            position,
            field_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Any non-record type (`string`, `long`, `enum`, `array`, ...)
    Primitive(String),
    /// `[null, T]`
    Optional(Box<FieldType>),
    Record {
        name: String,
        fields: Vec<SchemaField>,
    },
    /// A union shape with no normalization rule; opaque for bitmap purposes
    Union(Vec<FieldType>),
}

impl FieldType {
    pub fn primitive(name: impl Into<String>) -> Self {
        FieldType::Primitive(name.into())
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn record(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        FieldType::Record {
            name: name.into(),
            fields,
        }
    }

    /// The type left once optional wrapping is removed
    pub fn effective(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner.effective(),
            other => other,
        }
    }

    /// Child fields when the effective type is a record
    pub fn record_fields(&self) -> Option<&[SchemaField]> {
        match self.effective() {
            FieldType::Record { fields, .. } => Some(fields),
            _ => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, FieldType::Primitive(name) if name == "null")
    }

    fn is_string(&self) -> bool {
        matches!(self, FieldType::Primitive(name) if name == "string")
    }
}

/// The top-level record of a topic schema. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSchema {
    name: String,
    fields: Vec<SchemaField>,
    schema_json: Option<Arc<str>>,
}

impl TopicSchema {
    pub fn new(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        Self {
            name: name.into(),
            fields,
            schema_json: None,
        }
    }

    /// Build the field-order tree from an Avro JSON schema document
    pub fn parse(schema_json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(schema_json)?;
        let mut parser = SchemaParser::default();
        match parser.parse_type(&value, None)? {
            FieldType::Record { name, fields } => Ok(Self {
                name,
                fields,
                schema_json: Some(Arc::from(schema_json)),
            }),
            other => Err(CdcStreamError::SchemaResolution(format!(
                "Topic schema must be a record, got {:?}",
                other
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, position: usize) -> Option<&SchemaField> {
        self.fields.get(position)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The JSON text this schema was parsed from, if any
    pub fn schema_json(&self) -> Option<&str> {
        self.schema_json.as_deref()
    }
}

/// Walks an Avro JSON schema, tracking named records so later references
/// can be inlined.
#[derive(Default)]
struct SchemaParser {
    named: HashMap<String, FieldType>,
}

impl SchemaParser {
    fn parse_type(&mut self, value: &Value, namespace: Option<&str>) -> Result<FieldType> {
        match value {
            Value::String(name) => self.parse_named_or_primitive(name, namespace),
            Value::Array(branches) => {
                let branches = branches
                    .iter()
                    .map(|b| self.parse_type(b, namespace))
                    .collect::<Result<Vec<_>>>()?;
                Ok(normalize_union(branches))
            }
            Value::Object(object) => self.parse_complex(object, namespace),
            other => Err(CdcStreamError::SchemaResolution(format!(
                "Unsupported schema node: {}",
                other
            ))),
        }
    }

    fn parse_named_or_primitive(&self, name: &str, namespace: Option<&str>) -> Result<FieldType> {
        if is_primitive(name) {
            return Ok(FieldType::primitive(name));
        }
        let qualified = qualify(name, namespace);
        self.named
            .get(&qualified)
            .or_else(|| self.named.get(name))
            .cloned()
            .ok_or_else(|| {
                CdcStreamError::SchemaResolution(format!("Unknown named type '{}'", name))
            })
    }

    fn parse_complex(&mut self, object: &Map<String, Value>, namespace: Option<&str>) -> Result<FieldType> {
        let type_value = object.get("type").ok_or_else(|| {
            CdcStreamError::SchemaResolution("Schema object without 'type'".to_string())
        })?;

        let type_name = match type_value {
            Value::String(name) => name.as_str(),
            // {"type": {...}} or {"type": [...]} wraps another schema
            nested => return self.parse_type(nested, namespace),
        };

        match type_name {
            "record" | "error" => self.parse_record(object, namespace),
            "enum" | "fixed" => {
                let name = required_str(object, "name")?;
                let own_namespace = object
                    .get("namespace")
                    .and_then(Value::as_str)
                    .or(namespace);
                let field_type = FieldType::primitive(type_name);
                self.register(name, own_namespace, field_type.clone());
                Ok(field_type)
            }
            "array" | "map" => {
                // Items are parsed so that named types declared inside get registered
                let inner_key = if type_name == "array" { "items" } else { "values" };
                if let Some(inner) = object.get(inner_key) {
                    self.parse_type(inner, namespace)?;
                }
                Ok(FieldType::primitive(type_name))
            }
            // Primitive with attributes, e.g. a logical type
            other => self.parse_named_or_primitive(other, namespace),
        }
    }

    fn parse_record(&mut self, object: &Map<String, Value>, namespace: Option<&str>) -> Result<FieldType> {
        let name = required_str(object, "name")?;
        let own_namespace = object
            .get("namespace")
            .and_then(Value::as_str)
            .or(namespace)
            .map(str::to_string);

        let raw_fields = object
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CdcStreamError::SchemaResolution(format!("Record '{}' has no field list", name))
            })?;

        let mut fields = Vec::with_capacity(raw_fields.len());
        for (position, raw_field) in raw_fields.iter().enumerate() {
            let raw_field = raw_field.as_object().ok_or_else(|| {
                CdcStreamError::SchemaResolution(format!(
                    "Field {} of record '{}' is not an object",
                    position, name
                ))
            })?;
            let field_name = required_str(raw_field, "name")?;
            let field_schema = raw_field.get("type").ok_or_else(|| {
                CdcStreamError::SchemaResolution(format!(
                    "Field '{}' of record '{}' has no type",
                    field_name, name
                ))
            })?;
            let field_type = self.parse_type(field_schema, own_namespace.as_deref())?;
            fields.push(SchemaField::new(field_name, position, field_type));
        }

        let record = FieldType::record(name, fields);
        self.register(name, own_namespace.as_deref(), record.clone());
        Ok(record)
    }

    fn register(&mut self, name: &str, namespace: Option<&str>, field_type: FieldType) {
        let qualified = qualify(name, namespace);
        if qualified != name {
            self.named.insert(name.to_string(), field_type.clone());
        }
        self.named.insert(qualified, field_type);
    }
}

/// Union normalization. Only these three shapes unwrap; everything else
/// stays an opaque union.
fn normalize_union(mut branches: Vec<FieldType>) -> FieldType {
    match branches.len() {
        2 if branches[0].is_null() => FieldType::optional(branches.remove(1)),
        // legacy "switchable" encoding with no null branch
        2 if branches[0].is_string() => branches.remove(1),
        3 if branches[0].is_null() && branches[1].is_string() => branches.remove(2),
        _ => FieldType::Union(branches),
    }
}

fn is_primitive(name: &str) -> bool {
    matches!(
        name,
        "null" | "boolean" | "int" | "long" | "float" | "double" | "bytes" | "string"
    )
}

fn qualify(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !name.contains('.') && !ns.is_empty() => format!("{}.{}", ns, name),
        _ => name.to_string(),
    }
}

fn required_str<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    object.get(key).and_then(Value::as_str).ok_or_else(|| {
        CdcStreamError::SchemaResolution(format!("Schema object is missing '{}'", key))
    })
}
