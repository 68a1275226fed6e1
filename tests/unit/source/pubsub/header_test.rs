// Change event header decoding tests

use crate::fixtures::ACCOUNT_SCHEMA;
use cdcstream::error::CdcStreamError;
use cdcstream::models::{ChangeType, Payload, TopicSchema};
use cdcstream::source::pubsub::header::decode_header;
use serde_json::json;

#[cfg(test)]
mod header_tests {
    use super::*;

    fn header_record() -> Payload {
        let value = json!({
            "entityName": "Account",
            "recordIds": ["001xx000003DGb2AAG", "001xx000003DGb3AAG"],
            "changeType": "UPDATE",
            "changeOrigin": "",
            "transactionKey": "0002a1b3",
            "sequenceNumber": 2,
            "commitTimestamp": 1_700_000_000_000i64,
            "commitNumber": 99,
            "commitUser": "005xx000001X8Uz",
            "nulledFields": ["Industry"],
            "diffFields": [],
            "changedFields": ["0x02", "2-01"]
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_decodes_all_fields() {
        let schema = TopicSchema::parse(ACCOUNT_SCHEMA).unwrap();
        let header = decode_header(&schema, &header_record()).unwrap();

        assert_eq!(header.entity_name, "Account");
        assert_eq!(header.record_ids.len(), 2);
        assert_eq!(header.change_type, ChangeType::Update);
        assert_eq!(header.sequence_number, 2);
        assert_eq!(header.commit_number, 99);
        assert_eq!(header.nulled_fields, vec!["Industry"]);
        assert!(header.diff_fields.is_empty());
        assert_eq!(
            header.changed_fields,
            vec!["Name", "BillingAddress.Street"]
        );
        assert_eq!(
            header.commit_time().unwrap().timestamp(),
            1_700_000_000
        );
    }

    #[test]
    fn test_unknown_change_type() {
        let schema = TopicSchema::parse(ACCOUNT_SCHEMA).unwrap();
        let mut record = header_record();
        record.insert("changeType".to_string(), json!("SNAPSHOT"));

        assert!(matches!(
            decode_header(&schema, &record),
            Err(CdcStreamError::UnknownChangeType(_))
        ));
    }

    #[test]
    fn test_missing_or_mistyped_field() {
        let schema = TopicSchema::parse(ACCOUNT_SCHEMA).unwrap();

        let mut record = header_record();
        record.remove("commitUser");
        assert!(matches!(
            decode_header(&schema, &record),
            Err(CdcStreamError::PayloadDecode(_))
        ));

        let mut record = header_record();
        record.insert("recordIds".to_string(), json!("001xx000003DGb2AAG"));
        assert!(matches!(
            decode_header(&schema, &record),
            Err(CdcStreamError::PayloadDecode(_))
        ));

        let mut record = header_record();
        record.insert("sequenceNumber".to_string(), json!(i64::MAX));
        assert!(matches!(
            decode_header(&schema, &record),
            Err(CdcStreamError::PayloadDecode(_))
        ));
    }
}
