//! Conversion of configured option values into reply option bytes.
//!
//! Lease providers describe reply options as [`ConfigValue`]s keyed by option
//! code. [`coerce_option`] turns one value into wire bytes according to the
//! option's [`OptionFamily`], and [`apply_reply_options`] coerces a whole map
//! and writes it into an outgoing reply together with the fields every reply
//! carries (server identifier, lease time, assigned and server addresses).
//!
//! Coercion is all-or-nothing: every value is converted before the reply is
//! touched, so a bad value leaves the message exactly as it was.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::options::{MAX_OPTION_LEN, OptionCode, OptionFamily, family_of, option_name};
use crate::packet::DhcpPacket;

/// Lease time written into replies whose options do not set one.
pub const DEFAULT_LEASE_TIME_SECONDS: u32 = 86400;

/// A configured option value, tagged with its source type.
///
/// Serialized as `{"type": "address_list", "value": ["10.0.0.1"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    /// Raw bytes, used unchanged for any option.
    Bytes(Vec<u8>),
    Bool(bool),
    Byte(u8),
    Integer(i64),
    /// Free text. Parsed according to the option family, or sent as ASCII.
    Text(String),
    Address(Ipv4Addr),
    AddressList(Vec<Ipv4Addr>),
    TextList(Vec<String>),
    /// Address/mask pairs.
    CidrPairs(Vec<(Ipv4Addr, Ipv4Addr)>),
    /// Destination/router pairs.
    RangePairs(Vec<(Ipv4Addr, Ipv4Addr)>),
    U16List(Vec<u16>),
}

impl ConfigValue {
    /// Name of the variant as used in serialized config and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
            Self::Address(_) => "address",
            Self::AddressList(_) => "address_list",
            Self::TextList(_) => "text_list",
            Self::CidrPairs(_) => "cidr_pairs",
            Self::RangePairs(_) => "range_pairs",
            Self::U16List(_) => "u16_list",
        }
    }
}

/// Result of one family encoder: bytes, nothing applicable, or a parse failure.
type Encoded = std::result::Result<Option<Vec<u8>>, String>;

/// Converts one configured value to the bytes of option `code`.
///
/// Returns `Ok(None)` when the option should be left out of the reply, which
/// only happens for an empty pair list or an empty MTU plateau table.
///
/// # Errors
///
/// Returns [`Error::OptionCoercion`] when the value type does not fit the
/// option's family, text fails to parse, a number is out of range, the result
/// is longer than 255 bytes, or `code` is Pad/End.
pub fn coerce_option(code: u8, value: &ConfigValue) -> Result<Option<Vec<u8>>> {
    let fail = |reason: String| Error::OptionCoercion {
        option: option_name(code),
        value_type: value.type_name(),
        reason,
    };

    if code == OptionCode::Pad as u8 || code == OptionCode::End as u8 {
        return Err(fail("reserved option code".to_string()));
    }

    let family = family_of(code);
    let encoded = match value {
        ConfigValue::Bytes(bytes) => Ok(Some(bytes.clone())),
        ConfigValue::Text(text) => match decode_hex(text) {
            Some(bytes) => Ok(Some(bytes)),
            None => encode_family(family, value),
        },
        _ => encode_family(family, value),
    };

    let bytes = encoded
        .map_err(fail)?
        .ok_or_else(|| fail(format!("no {:?} encoding for this value", family)))?;

    if bytes.is_empty()
        && matches!(
            family,
            OptionFamily::CidrPairList | OptionFamily::RangePairList | OptionFamily::UInt16List
        )
    {
        return Ok(None);
    }

    if bytes.len() > MAX_OPTION_LEN {
        return Err(fail(format!(
            "encoded value is {} bytes (maximum {})",
            bytes.len(),
            MAX_OPTION_LEN
        )));
    }

    Ok(Some(bytes))
}

/// Fills `reply` with the configured options and the fixed reply fields.
///
/// - Option 54 always carries `server_ip`; a configured value is discarded.
/// - Option 51 defaults to [`DEFAULT_LEASE_TIME_SECONDS`].
/// - `yiaddr` becomes `assigned_ip`, `siaddr` becomes `server_ip`.
/// - The Parameter Request List is removed; a configured value is discarded.
///
/// Options are written in ascending code order.
///
/// # Errors
///
/// Returns the first [`Error::OptionCoercion`]; `reply` is unchanged then.
pub fn apply_reply_options(
    reply: &mut DhcpPacket,
    server_ip: Ipv4Addr,
    assigned_ip: Ipv4Addr,
    configured: &BTreeMap<u8, ConfigValue>,
) -> Result<()> {
    let server_identifier = OptionCode::ServerIdentifier as u8;
    let parameter_request_list = OptionCode::ParameterRequestList as u8;

    let mut encoded = BTreeMap::new();
    for (&code, value) in configured {
        if code == server_identifier || code == parameter_request_list {
            continue;
        }
        if let Some(bytes) = coerce_option(code, value)? {
            encoded.insert(code, bytes);
        }
    }

    encoded.insert(server_identifier, server_ip.octets().to_vec());
    encoded
        .entry(OptionCode::LeaseTime as u8)
        .or_insert_with(|| DEFAULT_LEASE_TIME_SECONDS.to_be_bytes().to_vec());

    reply.yiaddr = assigned_ip;
    reply.siaddr = server_ip;
    reply.options.set(parameter_request_list, None);

    for (code, bytes) in encoded {
        trace!(option = %option_name(code), value = ?bytes, "Setting reply option");
        reply.options.set(code, Some(bytes));
    }

    Ok(())
}

fn encode_family(family: OptionFamily, value: &ConfigValue) -> Encoded {
    match family {
        OptionFamily::SingleAddress => encode_address(value),
        OptionFamily::AddressList => encode_address_list(value),
        OptionFamily::CidrPairList => encode_cidr_pairs(value),
        OptionFamily::RangePairList => encode_range_pairs(value),
        OptionFamily::Flag => encode_flag(value),
        OptionFamily::UInt8 => {
            encode_integer::<u8>(value, |number| Some(vec![number]), |text| text.parse().ok())
        }
        OptionFamily::Int32 => encode_integer::<i32>(
            value,
            |number| Some(number.to_be_bytes().to_vec()),
            |text| text.parse().ok(),
        ),
        OptionFamily::UInt32 => encode_integer::<u32>(
            value,
            |number| Some(number.to_be_bytes().to_vec()),
            |text| text.parse().ok(),
        ),
        OptionFamily::UInt16 => encode_integer::<u16>(
            value,
            |number| Some(number.to_be_bytes().to_vec()),
            |text| text.parse().ok(),
        ),
        OptionFamily::UInt16List => encode_u16_list(value),
        OptionFamily::Text => encode_text(value),
    }
}

fn encode_address(value: &ConfigValue) -> Encoded {
    match value {
        ConfigValue::Address(address) => Ok(Some(address.octets().to_vec())),
        ConfigValue::Text(text) => Ok(Some(parse_address(text)?.octets().to_vec())),
        _ => Ok(None),
    }
}

fn encode_address_list(value: &ConfigValue) -> Encoded {
    let addresses = match value {
        ConfigValue::Address(address) => vec![*address],
        ConfigValue::AddressList(addresses) => addresses.clone(),
        ConfigValue::TextList(entries) => entries
            .iter()
            .map(|entry| parse_address(entry))
            .collect::<std::result::Result<_, _>>()?,
        ConfigValue::Text(text) => split_entries(text)
            .map(parse_address)
            .collect::<std::result::Result<_, _>>()?,
        _ => return Ok(None),
    };

    Ok(Some(
        addresses
            .iter()
            .flat_map(|address| address.octets())
            .collect(),
    ))
}

fn encode_cidr_pairs(value: &ConfigValue) -> Encoded {
    match value {
        ConfigValue::CidrPairs(pairs) => Ok(Some(encode_pairs(pairs))),
        ConfigValue::Text(text) => parse_pairs(split_entries(text), '/'),
        ConfigValue::TextList(entries) => parse_pairs(entries.iter().map(String::as_str), '/'),
        _ => Ok(None),
    }
}

fn encode_range_pairs(value: &ConfigValue) -> Encoded {
    match value {
        ConfigValue::RangePairs(pairs) => Ok(Some(encode_pairs(pairs))),
        ConfigValue::Text(text) => parse_pairs(split_entries(text), '-'),
        ConfigValue::TextList(entries) => parse_pairs(entries.iter().map(String::as_str), '-'),
        _ => Ok(None),
    }
}

fn encode_pairs(pairs: &[(Ipv4Addr, Ipv4Addr)]) -> Vec<u8> {
    pairs
        .iter()
        .flat_map(|(first, second)| first.octets().into_iter().chain(second.octets()))
        .collect()
}

fn parse_pairs<'a>(entries: impl Iterator<Item = &'a str>, separator: char) -> Encoded {
    let mut pairs = Vec::new();
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (first, second) = entry
            .split_once(separator)
            .ok_or_else(|| format!("expected \"addr{}addr\", got {:?}", separator, entry))?;
        pairs.push((parse_address(first)?, parse_address(second)?));
    }
    Ok(Some(encode_pairs(&pairs)))
}

fn encode_flag(value: &ConfigValue) -> Encoded {
    match value {
        ConfigValue::Bool(flag) => Ok(Some(vec![u8::from(*flag)])),
        ConfigValue::Text(text) => {
            let text = text.trim();
            if text.eq_ignore_ascii_case("true") {
                Ok(Some(vec![1]))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Some(vec![0]))
            } else {
                Err(format!("expected \"true\" or \"false\", got {:?}", text))
            }
        }
        _ => Ok(None),
    }
}

fn encode_integer<T>(
    value: &ConfigValue,
    to_bytes: impl Fn(T) -> Option<Vec<u8>>,
    parse: impl Fn(&str) -> Option<T>,
) -> Encoded
where
    T: TryFrom<i64>,
{
    let number = match value {
        ConfigValue::Byte(byte) => T::try_from(i64::from(*byte)).ok(),
        ConfigValue::Integer(integer) => T::try_from(*integer).ok(),
        ConfigValue::Text(text) => parse(text.trim()),
        _ => return Ok(None),
    };

    match number {
        Some(number) => Ok(to_bytes(number)),
        None => Err(format!(
            "{} is not a valid {}",
            describe(value),
            std::any::type_name::<T>()
        )),
    }
}

fn encode_u16_list(value: &ConfigValue) -> Encoded {
    let numbers: Vec<u16> = match value {
        ConfigValue::U16List(numbers) => numbers.clone(),
        ConfigValue::Text(text) => split_entries(text)
            .map(parse_u16)
            .collect::<std::result::Result<_, _>>()?,
        ConfigValue::TextList(entries) => entries
            .iter()
            .map(|entry| parse_u16(entry))
            .collect::<std::result::Result<_, _>>()?,
        _ => return Ok(None),
    };

    Ok(Some(
        numbers
            .iter()
            .flat_map(|number| number.to_be_bytes())
            .collect(),
    ))
}

fn encode_text(value: &ConfigValue) -> Encoded {
    match value {
        ConfigValue::Text(text) if text.is_ascii() => Ok(Some(text.as_bytes().to_vec())),
        ConfigValue::Text(text) => Err(format!("{:?} is not ASCII", text)),
        _ => Ok(None),
    }
}

/// Splits list text on commas, or on spaces when there is no comma.
fn split_entries(text: &str) -> impl Iterator<Item = &str> {
    let separator = if text.contains(',') { ',' } else { ' ' };
    text.split(separator)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

fn parse_address(text: &str) -> std::result::Result<Ipv4Addr, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("{:?} is not an IPv4 address", text.trim()))
}

fn parse_u16(text: &str) -> std::result::Result<u16, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("{:?} is not a valid u16", text.trim()))
}

/// Decodes `0x`-prefixed text with an even, non-zero number of hex digits.
fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let digits = text.strip_prefix("0x")?;
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&digits[index..index + 2], 16).ok())
        .collect()
}

fn describe(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Byte(byte) => byte.to_string(),
        ConfigValue::Integer(integer) => integer.to_string(),
        ConfigValue::Text(text) => format!("{:?}", text),
        other => other.type_name().to_string(),
    }
}
