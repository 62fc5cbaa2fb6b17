//! Lease lookup collaborators for the dispatcher.
//!
//! The dispatcher never decides addresses itself. It asks a [`LeaseProvider`]
//! for the address and reply options of a client, keyed by the client's
//! hardware key (uppercase hex, no separators), and tells it when a client
//! releases or declines an address.
//!
//! [`StaticLeases`] is the bundled in-memory provider built from [`Config`]:
//!
//! - Static MAC-to-IP bindings with per-binding options
//! - Lowest-free allocation from the dynamic pool
//! - Lease expiry tracking, with expired leases reclaimed when the pool is dry

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::coerce::{ConfigValue, DEFAULT_LEASE_TIME_SECONDS, coerce_option};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::options::OptionCode;

/// Source of addresses and reply options for clients.
///
/// Implementations own all assignment state. The dispatcher holds the
/// provider exclusively and calls it from a single task.
pub trait LeaseProvider {
    /// Returns the address to hand to the client.
    fn lookup_address(&mut self, hardware_key: &str) -> Result<Ipv4Addr>;

    /// Returns the options to put in the client's reply.
    fn lookup_options(&mut self, hardware_key: &str) -> Result<BTreeMap<u8, ConfigValue>>;

    /// Called for RELEASE and DECLINE with the message's `yiaddr`.
    fn release(&mut self, hardware_key: &str, address: Option<Ipv4Addr>);

    /// Extends the client's lease, updating `address` with the renewed
    /// address, and returns its reply options.
    ///
    /// Not called by the dispatcher, which acknowledges every REQUEST
    /// through [`lookup_address`](Self::lookup_address).
    fn renew(
        &mut self,
        hardware_key: &str,
        address: &mut Ipv4Addr,
    ) -> Result<BTreeMap<u8, ConfigValue>>;
}

/// Enumerates every address from `start` to `end` inclusive.
///
/// # Errors
///
/// Returns [`Error::RangeOverflow`] if `start` is above `end`, since walking
/// upward from `start` would wrap past 255.255.255.255.
pub fn addresses_in_range(start: Ipv4Addr, end: Ipv4Addr) -> Result<Vec<Ipv4Addr>> {
    let first = u32::from(start);
    let last = u32::from(end);
    if first > last {
        return Err(Error::RangeOverflow { start, end });
    }
    Ok((first..=last).map(Ipv4Addr::from).collect())
}

/// Converts a MAC address in `aa:bb:..`, `aa-bb-..` or `aabb..` form to a
/// hardware key such as `AABBCCDDEEFF`.
///
/// Returns `None` unless the input is 1 to 16 whole hex bytes.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let key: String = mac
        .trim()
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let valid = !key.is_empty()
        && key.len() % 2 == 0
        && key.len() <= 32
        && key.chars().all(|c| c.is_ascii_hexdigit());

    valid.then_some(key)
}

/// An address assigned to a dynamic client.
#[derive(Debug, Clone)]
pub struct Lease {
    pub ip_address: Ipv4Addr,
    pub hardware_key: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Lease {
    pub fn new(ip_address: Ipv4Addr, hardware_key: String, duration_seconds: u32) -> Self {
        let now = Utc::now();
        Self {
            ip_address,
            hardware_key,
            expires_at: now + TimeDelta::seconds(i64::from(duration_seconds)),
            created_at: now,
        }
    }

    /// A lease with zero duration is expired immediately.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn renew(&mut self, duration_seconds: u32) {
        self.expires_at = Utc::now() + TimeDelta::seconds(i64::from(duration_seconds));
    }

    /// Returns seconds remaining until expiration, or 0 if expired.
    pub fn remaining_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

#[derive(Debug, Clone)]
struct Reservation {
    ip_address: Ipv4Addr,
    options: BTreeMap<u8, ConfigValue>,
}

/// In-memory [`LeaseProvider`] backed by [`Config`].
///
/// # Example
///
/// ```
/// use dhcpwire::{Config, LeaseProvider, StaticLeases};
///
/// let mut leases = StaticLeases::from_config(&Config::default())?;
/// let ip = leases.lookup_address("AABBCCDDEEFF")?;
/// assert_eq!(ip, Config::default().pool_start);
/// # Ok::<(), dhcpwire::Error>(())
/// ```
#[derive(Debug)]
pub struct StaticLeases {
    default_options: BTreeMap<u8, ConfigValue>,
    reservations: HashMap<String, Reservation>,
    /// Unassigned pool addresses, sorted so allocation takes the lowest.
    free_ips: BTreeSet<Ipv4Addr>,
    leases: HashMap<String, Lease>,
}

impl StaticLeases {
    /// Builds the provider, excluding the server address and statically
    /// bound addresses from the dynamic pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RangeOverflow`] for an inverted pool and
    /// [`Error::InvalidConfig`] for a binding whose MAC does not parse.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut reservations = HashMap::new();
        for binding in &config.static_bindings {
            let key = normalize_mac(&binding.mac_address).ok_or_else(|| {
                Error::InvalidConfig(format!("invalid MAC address {:?}", binding.mac_address))
            })?;
            reservations.insert(
                key,
                Reservation {
                    ip_address: binding.ip_address,
                    options: binding.options.clone(),
                },
            );
        }

        let free_ips = addresses_in_range(config.pool_start, config.pool_end)?
            .into_iter()
            .filter(|ip| *ip != config.server_ip)
            .filter(|ip| {
                !reservations
                    .values()
                    .any(|reservation| reservation.ip_address == *ip)
            })
            .collect();

        Ok(Self {
            default_options: config.default_options.clone(),
            reservations,
            free_ips,
            leases: HashMap::new(),
        })
    }

    /// Returns the dynamic lease held by a client.
    pub fn lease(&self, hardware_key: &str) -> Option<&Lease> {
        self.leases.get(hardware_key)
    }

    pub fn leases(&self) -> impl Iterator<Item = &Lease> {
        self.leases.values()
    }

    /// Number of pool addresses not assigned to anyone.
    pub fn free_count(&self) -> usize {
        self.free_ips.len()
    }

    fn options_for(&self, hardware_key: &str) -> BTreeMap<u8, ConfigValue> {
        let mut options = self.default_options.clone();
        if let Some(reservation) = self.reservations.get(hardware_key) {
            options.extend(reservation.options.clone());
        }
        options
    }

    /// Lease duration from the client's option 51, or the default.
    fn lease_time_for(&self, hardware_key: &str) -> u32 {
        self.options_for(hardware_key)
            .get(&(OptionCode::LeaseTime as u8))
            .and_then(|value| coerce_option(OptionCode::LeaseTime as u8, value).ok().flatten())
            .and_then(|bytes| <[u8; 4]>::try_from(bytes.as_slice()).ok())
            .map(u32::from_be_bytes)
            .unwrap_or(DEFAULT_LEASE_TIME_SECONDS)
    }

    /// Frees the lowest-addressed expired lease held by another client.
    fn reclaim_expired(&mut self) -> Option<Ipv4Addr> {
        let (key, ip) = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.is_expired())
            .map(|(key, lease)| (key.clone(), lease.ip_address))
            .min_by_key(|(_, ip)| *ip)?;

        debug!(client = %key, ip = %ip, "Reclaiming expired lease");
        self.leases.remove(&key);
        Some(ip)
    }
}

impl LeaseProvider for StaticLeases {
    fn lookup_address(&mut self, hardware_key: &str) -> Result<Ipv4Addr> {
        if let Some(reservation) = self.reservations.get(hardware_key) {
            return Ok(reservation.ip_address);
        }

        let duration = self.lease_time_for(hardware_key);

        if let Some(lease) = self.leases.get_mut(hardware_key) {
            lease.renew(duration);
            return Ok(lease.ip_address);
        }

        let ip = match self.free_ips.pop_first() {
            Some(ip) => ip,
            None => self.reclaim_expired().ok_or_else(|| {
                warn!(client = %hardware_key, "Address pool exhausted");
                Error::PoolExhausted
            })?,
        };

        debug!(client = %hardware_key, ip = %ip, duration, "Assigned pool address");
        self.leases.insert(
            hardware_key.to_string(),
            Lease::new(ip, hardware_key.to_string(), duration),
        );
        Ok(ip)
    }

    fn lookup_options(&mut self, hardware_key: &str) -> Result<BTreeMap<u8, ConfigValue>> {
        Ok(self.options_for(hardware_key))
    }

    fn release(&mut self, hardware_key: &str, address: Option<Ipv4Addr>) {
        let matches = self
            .leases
            .get(hardware_key)
            .is_some_and(|lease| address.is_none_or(|ip| ip == lease.ip_address));

        if matches && let Some(lease) = self.leases.remove(hardware_key) {
            debug!(client = %hardware_key, ip = %lease.ip_address, "Released lease");
            self.free_ips.insert(lease.ip_address);
        }
    }

    fn renew(
        &mut self,
        hardware_key: &str,
        address: &mut Ipv4Addr,
    ) -> Result<BTreeMap<u8, ConfigValue>> {
        *address = self.lookup_address(hardware_key)?;
        self.lookup_options(hardware_key)
    }
}
