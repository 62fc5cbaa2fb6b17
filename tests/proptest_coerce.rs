use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use proptest::prelude::*;

use dhcpwire::packet::BOOTREPLY;
use dhcpwire::{ConfigValue, DhcpPacket, OptionCode, apply_reply_options, coerce_option};

fn arb_addresses() -> impl Strategy<Value = Vec<Ipv4Addr>> {
    prop::collection::vec(any::<u32>().prop_map(Ipv4Addr::from), 1..16)
}

fn join(addresses: &[Ipv4Addr], separator: &str) -> String {
    addresses
        .iter()
        .map(Ipv4Addr::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn address_list_text_matches_list_value(addresses in arb_addresses()) {
        let from_list = coerce_option(
            OptionCode::Router as u8,
            &ConfigValue::AddressList(addresses.clone()),
        )
        .unwrap();
        let from_commas = coerce_option(
            OptionCode::Router as u8,
            &ConfigValue::Text(join(&addresses, ",")),
        )
        .unwrap();
        let from_spaces = coerce_option(
            OptionCode::Router as u8,
            &ConfigValue::Text(join(&addresses, " ")),
        )
        .unwrap();

        prop_assert_eq!(from_list.as_ref().map(Vec::len), Some(addresses.len() * 4));
        prop_assert_eq!(&from_commas, &from_list);
        prop_assert_eq!(&from_spaces, &from_list);
    }

    #[test]
    fn pair_text_matches_pair_value(
        pairs in prop::collection::vec(
            (any::<u32>().prop_map(Ipv4Addr::from), any::<u32>().prop_map(Ipv4Addr::from)),
            1..16,
        )
    ) {
        let text = pairs
            .iter()
            .map(|(destination, router)| format!("{}-{}", destination, router))
            .collect::<Vec<_>>()
            .join(",");

        let from_text = coerce_option(OptionCode::StaticRoute as u8, &ConfigValue::Text(text)).unwrap();
        let from_pairs =
            coerce_option(OptionCode::StaticRoute as u8, &ConfigValue::RangePairs(pairs.clone())).unwrap();

        prop_assert_eq!(from_text.as_ref().map(Vec::len), Some(pairs.len() * 8));
        prop_assert_eq!(from_text, from_pairs);
    }

    #[test]
    fn u32_options_are_big_endian(value in any::<u32>()) {
        let encoded = coerce_option(
            OptionCode::LeaseTime as u8,
            &ConfigValue::Integer(i64::from(value)),
        )
        .unwrap();
        prop_assert_eq!(encoded, Some(value.to_be_bytes().to_vec()));

        let from_text = coerce_option(
            OptionCode::RenewalTime as u8,
            &ConfigValue::Text(value.to_string()),
        )
        .unwrap();
        prop_assert_eq!(from_text, Some(value.to_be_bytes().to_vec()));
    }

    #[test]
    fn u16_list_text_matches_list_value(values in prop::collection::vec(any::<u16>(), 1..32)) {
        let text = values
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        let from_text = coerce_option(
            OptionCode::PathMtuPlateauTable as u8,
            &ConfigValue::Text(text),
        )
        .unwrap();
        let from_list = coerce_option(
            OptionCode::PathMtuPlateauTable as u8,
            &ConfigValue::U16List(values),
        )
        .unwrap();

        prop_assert_eq!(from_text, from_list);
    }

    #[test]
    fn coercion_never_panics(code in any::<u8>(), text in ".{0,300}") {
        let _ = coerce_option(code, &ConfigValue::Text(text.clone()));
        let _ = coerce_option(code, &ConfigValue::TextList(vec![text]));
    }

    #[test]
    fn successful_coercion_fits_one_option(code in 1u8..=254, text in "[ -~]{0,300}") {
        if let Ok(Some(bytes)) = coerce_option(code, &ConfigValue::Text(text)) {
            prop_assert!(bytes.len() <= 255);
        }
    }

    #[test]
    fn reply_always_carries_server_identity(
        server in any::<u32>().prop_map(Ipv4Addr::from),
        assigned in any::<u32>().prop_map(Ipv4Addr::from),
        lease_time in prop::option::of(any::<u32>()),
    ) {
        let mut configured = BTreeMap::new();
        configured.insert(
            OptionCode::ServerIdentifier as u8,
            ConfigValue::Address(Ipv4Addr::new(10, 10, 10, 10)),
        );
        if let Some(lease_time) = lease_time {
            configured.insert(OptionCode::LeaseTime as u8, ConfigValue::Integer(i64::from(lease_time)));
        }

        let mut reply = DhcpPacket::new(BOOTREPLY);
        reply.options.set(OptionCode::ParameterRequestList as u8, Some(vec![1, 3]));
        apply_reply_options(&mut reply, server, assigned, &configured).unwrap();

        let server_octets = server.octets();
        let lease_bytes = lease_time.unwrap_or(86400).to_be_bytes();
        prop_assert_eq!(
            reply.options.get(OptionCode::ServerIdentifier as u8),
            Some(&server_octets[..])
        );
        prop_assert_eq!(reply.options.get(OptionCode::LeaseTime as u8), Some(&lease_bytes[..]));
        prop_assert!(reply.options.get(OptionCode::ParameterRequestList as u8).is_none());
        prop_assert_eq!(reply.yiaddr, assigned);
        prop_assert_eq!(reply.siaddr, server);
    }
}
