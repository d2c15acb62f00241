use proptest::prelude::*;
use unifying::{
    channel::{LONG_REPORT_LENGTH, ReportKind, SHORT_REPORT_LENGTH},
    nibble::U4,
    protocol::v20::{self, ErrorType},
};

fn report_kind() -> impl Strategy<Value = ReportKind> {
    prop_oneof![Just(ReportKind::Short), Just(ReportKind::Long)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn requests_keep_their_header(
        kind in report_kind(),
        device_index in any::<u8>(),
        feature_index in any::<u8>().prop_filter("error indices", |index| !v20::is_error_index(*index)),
        function in 0u8..=0x0f,
        software in 0u8..=0x0f,
        params in proptest::collection::vec(any::<u8>(), 0..=16),
    ) {
        let raw = v20::encode_request(
            kind,
            device_index,
            feature_index,
            U4::from_lo(function),
            U4::from_lo(software),
            &params,
        );
        prop_assert_eq!(raw.len(), kind.report_length());
        prop_assert_eq!(raw[3], (function << 4) | software);

        let decoded = v20::decode_reply(&raw).unwrap();
        let header = decoded.header();
        prop_assert_eq!(decoded.kind(), kind);
        prop_assert_eq!(header.device_index, device_index);
        prop_assert_eq!(header.feature_index, feature_index);
        prop_assert_eq!(header.function_id, U4::from_lo(function));
        prop_assert_eq!(header.software_id, U4::from_lo(software));
        prop_assert_eq!(decoded.error_type(), None);

        let kept = params.len().min(kind.report_length() - 4);
        prop_assert_eq!(&decoded.payload()[..kept], &params[..kept]);
        prop_assert!(decoded.payload()[kept..].iter().all(|b| *b == 0));
    }

    #[test]
    fn error_replies_carry_their_code(device_index in any::<u8>(), code in any::<u8>()) {
        let raw = [0x10, device_index, 0x8f, 0x02, 0x11, code, 0x00];

        let reply = v20::decode_reply(&raw).unwrap();
        prop_assert_eq!(reply.error_type(), Some(ErrorType::from(code)));
    }

    #[test]
    fn truncated_reports_are_rejected(len in 0usize..LONG_REPORT_LENGTH) {
        prop_assume!(len != SHORT_REPORT_LENGTH);

        let mut raw = vec![0u8; len];
        if let Some(id) = raw.first_mut() {
            *id = if len < SHORT_REPORT_LENGTH { 0x10 } else { 0x11 };
        }

        prop_assert!(v20::decode_reply(&raw).is_none());
    }
}
