//! DHCP message parsing and encoding per RFC 2131.
//!
//! A DHCP message consists of a fixed 236-byte header followed by a 4-byte
//! magic cookie and variable-length options, terminated by option 255 and
//! zero-padded to a multiple of 8 bytes.
//!
//! # Message Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                    magic cookie (4) = 99.130.83.99            |
//! +---------------------------------------------------------------+
//! |                options (variable) ... 255, zero pad           |
//! +---------------------------------------------------------------+
//! ```
//!
//! # References
//!
//! - RFC 2131: Dynamic Host Configuration Protocol

use std::net::Ipv4Addr;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::options::{DhcpOption, MessageType, OptionCode, OptionStore};

/// DHCP magic cookie that marks the start of the options area.
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

const DHCP_CHADDR_OFFSET: usize = 28;
const DHCP_CHADDR_SIZE: usize = 16;
const DHCP_SNAME_OFFSET: usize = DHCP_CHADDR_OFFSET + DHCP_CHADDR_SIZE;
const DHCP_SNAME_SIZE: usize = 64;
const DHCP_FILE_OFFSET: usize = DHCP_SNAME_OFFSET + DHCP_SNAME_SIZE;
const DHCP_FILE_SIZE: usize = 128;
const DHCP_MAGIC_COOKIE_OFFSET: usize = DHCP_FILE_OFFSET + DHCP_FILE_SIZE;

/// Size of the fixed header portion including magic cookie.
pub const DHCP_FIXED_HEADER_SIZE: usize = DHCP_MAGIC_COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// Encoded messages are zero-padded to a multiple of this many bytes.
const DHCP_PAD_ALIGNMENT: usize = 8;

/// Initial capacity for the encode buffer.
///
/// 576 bytes is the minimum datagram size all hosts must accept per RFC 791.
const DHCP_ENCODE_CAPACITY: usize = 576;

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// Broadcast bit of the `flags` field.
pub const BROADCAST_FLAG: u16 = 0x8000;

/// A decoded DHCP message.
///
/// The same type carries client requests and server replies: the dispatcher
/// turns a request into its reply by mutating it in place.
#[derive(Debug, Clone)]
pub struct DhcpPacket {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed; the server rewrites it with its own processing time.
    pub secs: u16,

    /// Flags. Bit 15 (0x8000) = broadcast flag.
    pub flags: u16,

    /// Client IP address; unspecified when absent.
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address - the address being assigned to the client.
    pub yiaddr: Ipv4Addr,

    /// Server IP address.
    pub siaddr: Ipv4Addr,

    /// Relay agent IP address.
    pub giaddr: Ipv4Addr,

    /// Client hardware address, exactly `hlen` bytes (at most 16).
    pub chaddr: Vec<u8>,

    /// Server host name (64-byte null-terminated field).
    pub sname: String,

    /// Boot file name (128-byte null-terminated field).
    pub file: String,

    /// Options in store order.
    pub options: OptionStore,

    received_at: Instant,
}

impl DhcpPacket {
    /// Creates an empty message with the given operation code.
    pub fn new(op: u8) -> Self {
        Self {
            op,
            htype: HTYPE_ETHERNET,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: Vec::new(),
            sname: String::new(),
            file: String::new(),
            options: OptionStore::new(),
            received_at: Instant::now(),
        }
    }

    /// Parses a DHCP message from raw bytes.
    ///
    /// A wrong magic cookie is tolerated (plain BOOTP): the header is kept
    /// and the option list is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WireParse`] if:
    /// - The datagram is shorter than 240 bytes (fixed header + magic cookie)
    /// - `hlen` exceeds the 16-byte `chaddr` field
    /// - An option is cut off (missing length byte or short value)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DHCP_FIXED_HEADER_SIZE {
            return Err(Error::WireParse(format!(
                "Message too short: {} bytes (minimum {})",
                data.len(),
                DHCP_FIXED_HEADER_SIZE
            )));
        }

        let hlen = data[2] as usize;
        if hlen > DHCP_CHADDR_SIZE {
            return Err(Error::WireParse(format!(
                "Hardware address length {} exceeds {}",
                hlen, DHCP_CHADDR_SIZE
            )));
        }

        let magic_cookie = &data[DHCP_MAGIC_COOKIE_OFFSET..DHCP_FIXED_HEADER_SIZE];
        let options = if magic_cookie == DHCP_MAGIC_COOKIE {
            Self::parse_options(&data[DHCP_FIXED_HEADER_SIZE..])?
        } else {
            OptionStore::new()
        };

        Ok(Self {
            op: data[0],
            htype: data[1],
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            yiaddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            siaddr: Ipv4Addr::new(data[20], data[21], data[22], data[23]),
            giaddr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
            chaddr: data[DHCP_CHADDR_OFFSET..DHCP_CHADDR_OFFSET + hlen].to_vec(),
            sname: read_c_string(&data[DHCP_SNAME_OFFSET..DHCP_SNAME_OFFSET + DHCP_SNAME_SIZE]),
            file: read_c_string(&data[DHCP_FILE_OFFSET..DHCP_FILE_OFFSET + DHCP_FILE_SIZE]),
            options,
            received_at: Instant::now(),
        })
    }

    fn parse_options(data: &[u8]) -> Result<OptionStore> {
        let mut options = OptionStore::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::WireParse(format!(
                    "Option {} length missing",
                    code
                )));
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::WireParse(format!("Option {} data truncated", code)));
            }

            options.set(code, Some(data[index + 2..index + 2 + length].to_vec()));

            index += 2 + length;
        }

        Ok(options)
    }

    /// Encodes the message to bytes for transmission.
    ///
    /// Option 53 is written first, the rest follow in store order, then the
    /// End marker and zero padding up to a multiple of 8 bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(DHCP_ENCODE_CAPACITY);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen());
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        write_fixed(&mut packet, &self.chaddr, DHCP_CHADDR_SIZE);
        write_fixed(&mut packet, self.sname.as_bytes(), DHCP_SNAME_SIZE);
        write_fixed(&mut packet, self.file.as_bytes(), DHCP_FILE_SIZE);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        let message_type_code = OptionCode::MessageType as u8;
        if let Some(message_type) = self.options.get(message_type_code) {
            DhcpOption::new(message_type_code, message_type.to_vec()).encode_into(&mut packet);
        }

        for option in self.options.iter() {
            if option.code != message_type_code {
                option.encode_into(&mut packet);
            }
        }

        packet.push(OptionCode::End as u8);

        while packet.len() % DHCP_PAD_ALIGNMENT != 0 {
            packet.push(0);
        }

        packet
    }

    /// Hardware address length as written on the wire.
    pub fn hlen(&self) -> u8 {
        self.chaddr.len().min(DHCP_CHADDR_SIZE) as u8
    }

    /// Returns the DHCP message type from option 53.
    ///
    /// A message without option 53 counts as DISCOVER. Returns `None` when
    /// the option carries an unknown or empty value.
    pub fn message_type(&self) -> Option<MessageType> {
        match self.options.get(OptionCode::MessageType as u8) {
            None => Some(MessageType::Discover),
            Some(value) => value
                .first()
                .and_then(|byte| MessageType::try_from(*byte).ok()),
        }
    }

    pub fn set_message_type(&mut self, message_type: MessageType) {
        self.options
            .set(OptionCode::MessageType as u8, Some(vec![message_type as u8]));
    }

    /// Returns the server identifier (Option 54) if it holds an address.
    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.options
            .get(OptionCode::ServerIdentifier as u8)
            .and_then(bytes_to_ipv4)
    }

    /// Option codes listed in the Parameter Request List (Option 55).
    pub fn requested_options(&self) -> Vec<u8> {
        self.options
            .get(OptionCode::ParameterRequestList as u8)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    pub fn client_ip(&self) -> Option<Ipv4Addr> {
        specified(self.ciaddr)
    }

    pub fn assigned_ip(&self) -> Option<Ipv4Addr> {
        specified(self.yiaddr)
    }

    pub fn server_ip(&self) -> Option<Ipv4Addr> {
        specified(self.siaddr)
    }

    pub fn relay_ip(&self) -> Option<Ipv4Addr> {
        specified(self.giaddr)
    }

    /// Returns true if the broadcast flag (bit 15) is set.
    pub fn is_broadcast(&self) -> bool {
        (self.flags & BROADCAST_FLAG) != 0
    }

    /// Formats the client hardware address as uppercase colon-separated hex.
    ///
    /// For Ethernet, returns a string like `"AA:BB:CC:DD:EE:FF"`.
    pub fn format_mac(&self) -> String {
        self.chaddr
            .iter()
            .map(|byte| format!("{:02X}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// The hardware address as bare hex digits, used to key lease lookups.
    pub fn hardware_key(&self) -> String {
        self.format_mac().replace(':', "")
    }

    /// When this message value was created.
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Whole seconds since creation, saturating at `u16::MAX`.
    pub fn elapsed_seconds(&self) -> u16 {
        u16::try_from(self.received_at.elapsed().as_secs()).unwrap_or(u16::MAX)
    }
}

fn read_c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&byte| byte == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn write_fixed(packet: &mut Vec<u8>, value: &[u8], size: usize) {
    let len = value.len().min(size);
    packet.extend_from_slice(&value[..len]);
    packet.resize(packet.len() + size - len, 0);
}

fn specified(address: Ipv4Addr) -> Option<Ipv4Addr> {
    (!address.is_unspecified()).then_some(address)
}

pub(crate) fn bytes_to_ipv4(bytes: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = bytes.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}
