//! Schema-driven payload decoding into a field map.

use crate::error::{CdcStreamError, Result};
use crate::models::Payload;
use apache_avro::types::Value as AvroValue;
use apache_avro::Schema;
use serde_json::{Map, Value};

/// Turns raw payload bytes into a field-name to value map
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Payload>;
}

/// Decodes single Avro binary datums (no container header) written with the
/// topic schema
pub struct AvroPayloadDecoder {
    schema: Schema,
}

impl AvroPayloadDecoder {
    pub fn new(schema_json: &str) -> Result<Self> {
        let schema = Schema::parse_str(schema_json)
            .map_err(|e| CdcStreamError::PayloadDecode(format!("Invalid Avro schema: {}", e)))?;
        Ok(Self { schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl PayloadDecoder for AvroPayloadDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Payload> {
        let mut reader = payload;
        let value = apache_avro::from_avro_datum(&self.schema, &mut reader, None)
            .map_err(|e| CdcStreamError::PayloadDecode(e.to_string()))?;

        match avro_to_json(value)? {
            Value::Object(fields) => Ok(fields),
            other => Err(CdcStreamError::PayloadDecode(format!(
                "Payload is not a record: {}",
                other
            ))),
        }
    }
}

/// Convert a generic Avro value to JSON, unwrapping unions
pub fn avro_to_json(value: AvroValue) -> Result<Value> {
    Ok(match value {
        AvroValue::Null => Value::Null,
        AvroValue::Boolean(b) => Value::Bool(b),
        AvroValue::Int(n) => Value::from(n),
        AvroValue::Long(n) => Value::from(n),
        AvroValue::String(s) => Value::String(s),
        AvroValue::Enum(_, symbol) => Value::String(symbol),
        AvroValue::Union(_, inner) => avro_to_json(*inner)?,
        AvroValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(avro_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        AvroValue::Map(entries) => {
            let mut object = Map::with_capacity(entries.len());
            for (key, value) in entries {
                object.insert(key, avro_to_json(value)?);
            }
            Value::Object(object)
        }
        AvroValue::Record(fields) => {
            let mut object = Map::with_capacity(fields.len());
            for (name, value) in fields {
                object.insert(name, avro_to_json(value)?);
            }
            Value::Object(object)
        }
        other => Value::try_from(other)
            .map_err(|e| CdcStreamError::PayloadDecode(format!("Unsupported value: {}", e)))?,
    })
}
