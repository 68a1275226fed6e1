use super::bitmap::expand_field_list;
use crate::error::{CdcStreamError, Result};
use crate::models::{ChangeEventHeader, ChangeType, Payload, TopicSchema};
use serde_json::Value;

/// Key of the header sub-record inside a decoded payload
pub const CHANGE_EVENT_HEADER_KEY: &str = "ChangeEventHeader";

/// Build a [`ChangeEventHeader`] from the decoded header sub-record.
///
/// The three field lists are expanded against the top-level `schema`;
/// record ids are copied as-is.
pub fn decode_header(schema: &TopicSchema, record: &Payload) -> Result<ChangeEventHeader> {
    let change_type: ChangeType = read_str(record, "changeType")?.parse()?;

    Ok(ChangeEventHeader {
        entity_name: read_str(record, "entityName")?.to_string(),
        record_ids: read_string_list(record, "recordIds")?,
        change_type,
        change_origin: read_str(record, "changeOrigin")?.to_string(),
        transaction_key: read_str(record, "transactionKey")?.to_string(),
        sequence_number: read_i32(record, "sequenceNumber")?,
        commit_timestamp: read_i64(record, "commitTimestamp")?,
        commit_number: read_i64(record, "commitNumber")?,
        commit_user: read_str(record, "commitUser")?.to_string(),
        nulled_fields: expand_field_list(schema, &read_string_list(record, "nulledFields")?)?,
        diff_fields: expand_field_list(schema, &read_string_list(record, "diffFields")?)?,
        changed_fields: expand_field_list(schema, &read_string_list(record, "changedFields")?)?,
    })
}

fn field<'a>(record: &'a Payload, name: &str) -> Result<&'a Value> {
    record.get(name).ok_or_else(|| {
        CdcStreamError::PayloadDecode(format!("Change event header has no '{}' field", name))
    })
}

fn mismatch(name: &str, expected: &str, actual: &Value) -> CdcStreamError {
    CdcStreamError::PayloadDecode(format!(
        "Change event header field '{}' should be {}, got {}",
        name, expected, actual
    ))
}

fn read_str<'a>(record: &'a Payload, name: &str) -> Result<&'a str> {
    let value = field(record, name)?;
    value.as_str().ok_or_else(|| mismatch(name, "a string", value))
}

fn read_i64(record: &Payload, name: &str) -> Result<i64> {
    let value = field(record, name)?;
    value.as_i64().ok_or_else(|| mismatch(name, "an integer", value))
}

fn read_i32(record: &Payload, name: &str) -> Result<i32> {
    let value = field(record, name)?;
    value
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| mismatch(name, "a 32-bit integer", value))
}

fn read_string_list(record: &Payload, name: &str) -> Result<Vec<String>> {
    let value = field(record, name)?;
    let items = value
        .as_array()
        .ok_or_else(|| mismatch(name, "a list of strings", value))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| mismatch(name, "a list of strings", value))
        })
        .collect()
}
