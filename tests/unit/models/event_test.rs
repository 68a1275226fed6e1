// Change type and replay token tests

use cdcstream::error::CdcStreamError;
use cdcstream::models::{ChangeType, ReplayId};

#[cfg(test)]
mod event_tests {
    use super::*;

    #[test]
    fn test_change_type_exact_match() {
        assert_eq!("CREATE".parse::<ChangeType>().unwrap(), ChangeType::Create);
        assert_eq!(
            "GAP_OVERFLOW".parse::<ChangeType>().unwrap(),
            ChangeType::GapOverflow
        );

        let err = "update".parse::<ChangeType>().unwrap_err();
        assert!(matches!(err, CdcStreamError::UnknownChangeType(ref s) if s == "update"));
        assert!("SNAPSHOT".parse::<ChangeType>().is_err());
    }

    #[test]
    fn test_change_type_display_matches_wire_name() {
        for name in ["UPDATE", "GAP_UNDELETE", "DELETE"] {
            let change_type: ChangeType = name.parse().unwrap();
            assert_eq!(change_type.to_string(), name);
        }
    }

    #[test]
    fn test_gap_classification() {
        assert!(ChangeType::GapCreate.is_gap());
        assert!(ChangeType::GapOverflow.is_gap());
        assert!(!ChangeType::Update.is_gap());
        assert!(!ChangeType::Undelete.is_gap());
    }

    #[test]
    fn test_replay_id_is_big_endian() {
        let id = ReplayId::from_bytes(&[0, 0, 0, 0, 0, 0, 1, 2]).unwrap();
        assert_eq!(id, ReplayId(258));
        assert_eq!(id.to_bytes(), [0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(id.to_string(), "258");
    }

    #[test]
    fn test_replay_id_requires_eight_bytes() {
        assert!(matches!(
            ReplayId::from_bytes(&[1, 2, 3, 4, 5, 6, 7]),
            Err(CdcStreamError::ReplayTokenFormat(7))
        ));
        assert!(matches!(
            ReplayId::from_bytes(&[0; 9]),
            Err(CdcStreamError::ReplayTokenFormat(9))
        ));
        assert!(matches!(
            ReplayId::from_bytes(&[]),
            Err(CdcStreamError::ReplayTokenFormat(0))
        ));
    }
}
