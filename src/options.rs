//! DHCP options as defined in RFC 2132.
//!
//! Each option on the wire has a code (1 byte), length (1 byte), and
//! variable-length data. Inside a [`DhcpPacket`](crate::DhcpPacket) options
//! are kept as raw bytes in an [`OptionStore`]; the meaning of those bytes is
//! decided by the option's [`OptionFamily`], which is looked up from a static
//! code table.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions
//! - RFC 3046: DHCP Relay Agent Information Option (Option 82)

use std::cmp::Ordering;
use std::fmt;

/// Largest value an option's 1-byte length field can describe.
pub const MAX_OPTION_LEN: usize = 255;

/// Wire-encoding shape shared by a group of options.
///
/// The coercion engine turns configuration values into bytes per family,
/// so a new option only needs a row in the code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionFamily {
    /// One IPv4 address, 4 bytes.
    SingleAddress,
    /// Any number of IPv4 addresses, 4 bytes each.
    AddressList,
    /// Address/mask pairs, 8 bytes each (Policy Filter).
    CidrPairList,
    /// Destination/router pairs, 8 bytes each (Static Route).
    RangePairList,
    /// Boolean flag, 1 byte 0/1.
    Flag,
    /// 8-bit unsigned integer.
    UInt8,
    /// 32-bit signed integer, network order.
    Int32,
    /// 32-bit unsigned integer, network order.
    UInt32,
    /// 16-bit unsigned integer, network order.
    UInt16,
    /// 16-bit unsigned integers, 2 bytes each.
    UInt16List,
    /// Raw ASCII text; also the family of every unclassified code.
    Text,
}

macro_rules! option_codes {
    ($($(#[$doc:meta])* $name:ident = $code:literal => $family:ident,)+) => {
        /// DHCP option codes known to this implementation.
        ///
        /// Codes outside this table are still carried verbatim and fall into
        /// the [`OptionFamily::Text`] family.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(u8)]
        pub enum OptionCode {
            $($(#[$doc])* $name = $code,)+
        }

        impl TryFrom<u8> for OptionCode {
            type Error = u8;

            fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
                match value {
                    $($code => Ok(Self::$name),)+
                    other => Err(other),
                }
            }
        }

        impl OptionCode {
            /// Returns the wire-encoding family of this option.
            pub const fn family(self) -> OptionFamily {
                match self {
                    $(Self::$name => OptionFamily::$family,)+
                }
            }
        }
    };
}

option_codes! {
    /// Padding (no operation). Single byte, no length.
    Pad = 0 => Text,
    /// Subnet mask (RFC 2132 §3.3).
    SubnetMask = 1 => SingleAddress,
    /// Offset from UTC in seconds (RFC 2132 §3.4).
    TimeOffset = 2 => Int32,
    /// Router/gateway addresses (RFC 2132 §3.5).
    Router = 3 => AddressList,
    TimeServer = 4 => AddressList,
    NameServer = 5 => AddressList,
    /// DNS server addresses (RFC 2132 §3.8).
    DomainNameServer = 6 => AddressList,
    LogServer = 7 => AddressList,
    CookieServer = 8 => AddressList,
    LprServer = 9 => AddressList,
    ImpressServer = 10 => AddressList,
    ResourceLocationServer = 11 => AddressList,
    /// Client hostname (RFC 2132 §3.14).
    Hostname = 12 => Text,
    BootFileSize = 13 => UInt16,
    MeritDumpFile = 14 => Text,
    /// Domain name for DNS resolution (RFC 2132 §3.17).
    DomainName = 15 => Text,
    SwapServer = 16 => SingleAddress,
    RootPath = 17 => Text,
    ExtensionsPath = 18 => Text,
    /// IP forwarding enable/disable (RFC 2132 §4.1).
    IpForwarding = 19 => Flag,
    NonLocalSourceRouting = 20 => Flag,
    /// Policy filter address/mask pairs (RFC 2132 §4.3).
    PolicyFilter = 21 => CidrPairList,
    MaxDatagramReassemblySize = 22 => UInt16,
    DefaultIpTtl = 23 => UInt8,
    PathMtuAgingTimeout = 24 => UInt32,
    PathMtuPlateauTable = 25 => UInt16List,
    /// Interface MTU (RFC 2132 §5.1).
    InterfaceMtu = 26 => UInt16,
    AllSubnetsAreLocal = 27 => Flag,
    /// Broadcast address (RFC 2132 §5.3).
    BroadcastAddress = 28 => SingleAddress,
    PerformMaskDiscovery = 29 => Flag,
    MaskSupplier = 30 => Flag,
    PerformRouterDiscovery = 31 => Flag,
    RouterSolicitationAddress = 32 => SingleAddress,
    /// Static route destination/router pairs (RFC 2132 §5.8).
    StaticRoute = 33 => RangePairList,
    TrailerEncapsulation = 34 => Flag,
    ArpCacheTimeout = 35 => UInt32,
    EthernetEncapsulation = 36 => Flag,
    TcpDefaultTtl = 37 => UInt8,
    TcpKeepaliveInterval = 38 => UInt32,
    TcpKeepaliveGarbage = 39 => Flag,
    NisDomain = 40 => Text,
    NisServers = 41 => AddressList,
    NtpServers = 42 => AddressList,
    VendorSpecific = 43 => Text,
    NetbiosNameServer = 44 => AddressList,
    NetbiosDatagramDistributionServer = 45 => AddressList,
    NetbiosNodeType = 46 => UInt8,
    NetbiosScope = 47 => Text,
    XWindowFontServer = 48 => AddressList,
    XWindowDisplayManager = 49 => AddressList,
    /// Requested IP address (RFC 2132 §9.1).
    RequestedIpAddress = 50 => SingleAddress,
    /// IP address lease time in seconds (RFC 2132 §9.2).
    LeaseTime = 51 => UInt32,
    /// Option overload (RFC 2132 §9.3). Takes 1, 2 or 3, so not a flag.
    OptionOverload = 52 => UInt8,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53 => UInt8,
    /// Server identifier (RFC 2132 §9.7).
    ServerIdentifier = 54 => SingleAddress,
    /// Parameter request list (RFC 2132 §9.8).
    ParameterRequestList = 55 => Text,
    Message = 56 => Text,
    MaxMessageSize = 57 => UInt16,
    /// Renewal time T1 (RFC 2132 §9.11).
    RenewalTime = 58 => UInt32,
    /// Rebinding time T2 (RFC 2132 §9.12).
    RebindingTime = 59 => UInt32,
    VendorClassIdentifier = 60 => Text,
    /// Client identifier (RFC 2132 §9.14).
    ClientIdentifier = 61 => Text,
    NisPlusDomain = 64 => Text,
    NisPlusServers = 65 => AddressList,
    TftpServerName = 66 => Text,
    BootfileName = 67 => Text,
    SmtpServer = 69 => AddressList,
    Pop3Server = 70 => AddressList,
    NntpServer = 71 => AddressList,
    WwwServer = 72 => AddressList,
    FingerServer = 73 => AddressList,
    IrcServer = 74 => AddressList,
    StreetTalkServer = 75 => AddressList,
    StdaServer = 76 => AddressList,
    /// Relay agent information (RFC 3046).
    RelayAgentInfo = 82 => Text,
    BcmcsControllerAddresses = 89 => AddressList,
    ClientLastTransactionTime = 91 => UInt32,
    /// Auto-configure (RFC 2563).
    AutoConfigure = 116 => Flag,
    SubnetSelection = 118 => SingleAddress,
    /// End of options marker.
    End = 255 => Text,
}

impl fmt::Display for OptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as u8)
    }
}

/// Looks up the family for a raw option code.
pub fn family_of(code: u8) -> OptionFamily {
    OptionCode::try_from(code)
        .map(OptionCode::family)
        .unwrap_or(OptionFamily::Text)
}

/// Human-readable option name for logs and errors.
pub fn option_name(code: u8) -> String {
    match OptionCode::try_from(code) {
        Ok(known) => known.to_string(),
        Err(unknown) => format!("Option({})", unknown),
    }
}

/// DHCP message types (Option 53) as defined in RFC 2132 §9.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client broadcast to locate servers.
    Discover = 1,
    /// Server response to DISCOVER with IP offer.
    Offer = 2,
    /// Client request for offered parameters.
    Request = 3,
    /// Client indicates address is already in use.
    Decline = 4,
    /// Server acknowledgement with configuration.
    Ack = 5,
    /// Server negative acknowledgement.
    Nak = 6,
    /// Client releases IP address.
    Release = 7,
    /// Client announces static configuration and asks for parameters.
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// A single option: code plus raw value bytes.
///
/// Ordering compares the numeric code first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DhcpOption {
    pub code: u8,
    pub value: Vec<u8>,
}

impl DhcpOption {
    pub fn new(code: u8, value: Vec<u8>) -> Self {
        Self { code, value }
    }

    /// Appends the option in TLV form. Values over 255 bytes are truncated.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        let len = self.value.len().min(MAX_OPTION_LEN);
        buffer.push(self.code);
        buffer.push(len as u8);
        buffer.extend_from_slice(&self.value[..len]);
    }
}

impl Ord for DhcpOption {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code
            .cmp(&other.code)
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for DhcpOption {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Options of one message, unique by code, in insertion order.
///
/// Setting a code that already exists removes the old entry and appends the
/// new one at the end, so re-setting moves an option to the back. Encode
/// order follows store order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionStore {
    options: Vec<DhcpOption>,
}

impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored for `code`.
    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|option| option.code == code)
            .map(|option| option.value.as_slice())
    }

    pub fn contains(&self, code: u8) -> bool {
        self.options.iter().any(|option| option.code == code)
    }

    /// Replaces the value for `code`; `None` removes it.
    ///
    /// Pad (0) and End (255) are framing bytes, not options, and are never
    /// stored.
    pub fn set(&mut self, code: u8, value: Option<Vec<u8>>) {
        if code == OptionCode::Pad as u8 || code == OptionCode::End as u8 {
            return;
        }
        self.options.retain(|option| option.code != code);
        if let Some(value) = value {
            self.options.push(DhcpOption::new(code, value));
        }
    }

    /// Removes and returns the value for `code`.
    pub fn remove(&mut self, code: u8) -> Option<Vec<u8>> {
        let index = self.options.iter().position(|option| option.code == code)?;
        Some(self.options.remove(index).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DhcpOption> {
        self.options.iter()
    }

    /// Codes in store order.
    pub fn codes(&self) -> Vec<u8> {
        self.options.iter().map(|option| option.code).collect()
    }

    /// Copy of the options ordered by code.
    pub fn sorted(&self) -> Vec<DhcpOption> {
        let mut options = self.options.clone();
        options.sort();
        options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl FromIterator<DhcpOption> for OptionStore {
    fn from_iter<I: IntoIterator<Item = DhcpOption>>(iter: I) -> Self {
        let mut store = Self::new();
        for option in iter {
            store.set(option.code, Some(option.value));
        }
        store
    }
}
