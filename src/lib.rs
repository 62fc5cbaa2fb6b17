//! # dhcpwire
//!
//! The protocol core of a DHCP server (RFC 2131 / RFC 2132): a wire codec,
//! an option coercion engine and a message dispatcher, plus a small UDP
//! front end and an in-memory lease provider.
//!
//! ## Features
//!
//! - Lossless decode/encode of DHCP messages, including unknown options
//! - Typed option values from configuration, encoded per option family
//! - Direct ACK for DISCOVER, REQUEST and INFORM; RELEASE/DECLINE forwarding
//! - Pluggable address and option lookup via [`LeaseProvider`]
//! - Static MAC-to-IP bindings and a dynamic pool in [`StaticLeases`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use dhcpwire::{Config, DhcpServer, StaticLeases};
//!
//! #[tokio::main]
//! async fn main() -> dhcpwire::Result<()> {
//!     let config = Config::load_or_create("config.json")?;
//!     let provider = StaticLeases::from_config(&config)?;
//!     let mut server = DhcpServer::new(&config, provider).await?;
//!     server.run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`DhcpPacket`] - DHCP message parsing and encoding
//! - [`OptionStore`] - Per-message options, unique by code
//! - [`coerce`] - Config values to option bytes
//! - [`Dispatcher`] - Request to reply decisions
//! - [`DhcpServer`] - UDP receive loop on port 67

pub mod coerce;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lease;
pub mod options;
pub mod packet;
pub mod server;

pub use coerce::{ConfigValue, DEFAULT_LEASE_TIME_SECONDS, apply_reply_options, coerce_option};
pub use config::{Config, StaticBinding};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use lease::{Lease, LeaseProvider, StaticLeases};
pub use options::{DhcpOption, MessageType, OptionCode, OptionFamily, OptionStore};
pub use packet::DhcpPacket;
pub use server::DhcpServer;
