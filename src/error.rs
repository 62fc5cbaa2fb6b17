//! Error types for the DHCP engine.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

use std::net::Ipv4Addr;

/// Errors that can occur while decoding, dispatching or serving DHCP traffic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Truncated or malformed DHCP datagram.
    ///
    /// Raised when the fixed header is short, an option is cut off mid-value,
    /// or the hardware address length exceeds the 16-byte `chaddr` field.
    /// A bad magic cookie is *not* an error; it yields an empty option list.
    #[error("Malformed DHCP message: {0}")]
    WireParse(String),

    /// A configuration value could not be converted to option bytes.
    ///
    /// Aborts construction of the reply it belongs to; nothing is sent.
    #[error("Unable to convert {value_type} value for option {option}: {reason}")]
    OptionCoercion {
        /// Name (or number) of the option being encoded.
        option: String,
        /// The tag of the supplied [`ConfigValue`](crate::ConfigValue).
        value_type: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// Enumerating an address range would wrap past 255.255.255.255.
    #[error("Address range {start} - {end} overflows the IPv4 space")]
    RangeOverflow { start: Ipv4Addr, end: Ipv4Addr },

    /// Socket creation, configuration or bind failure.
    ///
    /// Typically occurs when binding to port 67 without administrator privileges.
    #[error("Socket error: {0}")]
    Socket(String),

    /// Invalid server configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The dynamic address pool has no free address left.
    #[error("No available IP addresses in pool")]
    PoolExhausted,
}

/// A specialized Result type for DHCP operations.
pub type Result<T> = std::result::Result<T, Error>;
