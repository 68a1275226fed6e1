//! Field bitmap expansion.
//!
//! Change event headers compress their field lists. The first entry may be a
//! hex bitmap over the top-level fields (`0x...`), and later entries may be
//! `<parentPosition>-<childHex>` bitmaps over the fields of a nested record.
//! Bytes are written most significant first, so the byte order is reversed
//! before bit `i` is mapped to field position `i`.

use crate::error::{CdcStreamError, Result};
use crate::models::{SchemaField, TopicSchema};
use tracing::{trace, warn};

const BITMAP_PREFIX: &str = "0x";
const NESTED_SEPARATOR: char = '-';

/// Replace every bitmap token in `tokens` with the field names it encodes.
///
/// Plain field names pass through. The result must be treated as a set:
/// top-level names come first, followed by nested expansions in token order.
pub fn expand_field_list(schema: &TopicSchema, tokens: &[String]) -> Result<Vec<String>> {
    let mut expanded = Vec::with_capacity(tokens.len());
    let mut rest = tokens;

    if let Some(first) = tokens.first() {
        if first.starts_with(BITMAP_PREFIX) {
            expanded.extend(field_names_from_bitmap(schema.fields(), first)?);
            rest = &tokens[1..];
        }
    }

    for token in rest {
        if token.contains(NESTED_SEPARATOR) {
            expanded.extend(expand_nested(schema, token)?);
        } else {
            expanded.push(token.clone());
        }
    }

    Ok(expanded)
}

/// Names of the fields whose positions are set in `bitmap`.
///
/// The `0x` prefix is optional. Names come back in ascending position order.
pub fn field_names_from_bitmap(fields: &[SchemaField], bitmap: &str) -> Result<Vec<String>> {
    let positions = positions_from_bitmap(bitmap)?;
    positions
        .into_iter()
        .map(|position| {
            fields
                .get(position)
                .map(|field| field.name.clone())
                .ok_or_else(|| {
                    CdcStreamError::SchemaResolution(format!(
                        "Bitmap '{}' sets position {} but the record has {} fields",
                        bitmap,
                        position,
                        fields.len()
                    ))
                })
        })
        .collect()
}

/// Set bit positions of a hex bitmap, ascending
pub fn positions_from_bitmap(bitmap: &str) -> Result<Vec<usize>> {
    let digits = bitmap.strip_prefix(BITMAP_PREFIX).unwrap_or(bitmap);
    let mut bytes = hex::decode(digits).map_err(|e| {
        CdcStreamError::BitmapFormat(format!("Invalid bitmap '{}': {}", bitmap, e))
    })?;
    bytes.reverse();

    let mut positions = Vec::new();
    for (index, byte) in bytes.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                positions.push(index * 8 + bit);
            }
        }
    }
    Ok(positions)
}

/// Encode field positions the way producers do: `0x` followed by the
/// bitmap bytes, most significant byte first.
pub fn bitmap_from_positions(positions: &[usize]) -> String {
    let len = positions.iter().max().map(|max| max / 8 + 1).unwrap_or(0);
    let mut bytes = vec![0u8; len];
    for &position in positions {
        bytes[position / 8] |= 1 << (position % 8);
    }
    bytes.reverse();
    format!("{}{}", BITMAP_PREFIX, hex::encode(bytes))
}

/// Expand a `<parentPosition>-<childHex>` token. Tokens that cannot be
/// interpreted as a nested bitmap are returned unchanged.
fn expand_nested(schema: &TopicSchema, token: &str) -> Result<Vec<String>> {
    let mut parts = token.split(NESTED_SEPARATOR);
    let (parent_part, child_bitmap) = match (parts.next(), parts.next()) {
        (Some(parent), Some(child)) if !child.is_empty() => (parent, child),
        _ => return Ok(vec![token.to_string()]),
    };

    let parent_position: usize = match parent_part.parse() {
        Ok(position) => position,
        Err(_) => {
            trace!("'{}' is a plain field name", token);
            return Ok(vec![token.to_string()]);
        }
    };

    let parent = schema.field(parent_position).ok_or_else(|| {
        CdcStreamError::SchemaResolution(format!(
            "Nested bitmap '{}' refers to position {} but '{}' has {} fields",
            token,
            parent_position,
            schema.name(),
            schema.fields().len()
        ))
    })?;

    let child_fields = match parent.field_type.record_fields() {
        Some(fields) => fields,
        None => {
            warn!(
                "Nested bitmap '{}' targets field '{}' which is not a record; keeping it as-is",
                token, parent.name
            );
            return Ok(vec![token.to_string()]);
        }
    };

    let child_names = field_names_from_bitmap(child_fields, child_bitmap)?;
    if child_names.is_empty() {
        return Ok(vec![token.to_string()]);
    }

    // every nested field affected: report the compound field itself
    if child_names.len() == child_fields.len() {
        return Ok(vec![parent.name.clone()]);
    }

    Ok(child_names
        .into_iter()
        .map(|child| format!("{}.{}", parent.name, child))
        .collect())
}
