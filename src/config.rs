use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::coerce::{ConfigValue, coerce_option};
use crate::error::{Error, Result};
use crate::lease::{addresses_in_range, normalize_mac};
use crate::options::OptionCode;

pub const DEFAULT_SERVER_PORT: u16 = 67;
pub const DEFAULT_CLIENT_PORT: u16 = 68;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_ip: Ipv4Addr,
    #[serde(default = "default_bind_address")]
    pub bind_address: Ipv4Addr,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_client_port")]
    pub client_port: u16,
    /// Destination of every reply. Broadcast unless overridden for testing.
    #[serde(default = "default_reply_address")]
    pub reply_address: Ipv4Addr,
    pub pool_start: Ipv4Addr,
    pub pool_end: Ipv4Addr,
    /// Options sent to every client, keyed by option code.
    #[serde(default)]
    pub default_options: BTreeMap<u8, ConfigValue>,
    #[serde(default)]
    pub static_bindings: Vec<StaticBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticBinding {
    pub mac_address: String,
    pub ip_address: Ipv4Addr,
    /// Merged over `default_options` for this client.
    #[serde(default)]
    pub options: BTreeMap<u8, ConfigValue>,
}

fn default_bind_address() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_client_port() -> u16 {
    DEFAULT_CLIENT_PORT
}

fn default_reply_address() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

impl Default for Config {
    fn default() -> Self {
        let default_options = BTreeMap::from([
            (
                OptionCode::SubnetMask as u8,
                ConfigValue::Address(Ipv4Addr::new(255, 255, 255, 0)),
            ),
            (
                OptionCode::Router as u8,
                ConfigValue::AddressList(vec![Ipv4Addr::new(192, 168, 1, 1)]),
            ),
            (
                OptionCode::DomainNameServer as u8,
                ConfigValue::AddressList(vec![
                    Ipv4Addr::new(8, 8, 8, 8),
                    Ipv4Addr::new(8, 8, 4, 4),
                ]),
            ),
            (OptionCode::LeaseTime as u8, ConfigValue::Integer(86400)),
        ]);

        Self {
            server_ip: Ipv4Addr::new(192, 168, 1, 1),
            bind_address: default_bind_address(),
            server_port: DEFAULT_SERVER_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            reply_address: default_reply_address(),
            pool_start: Ipv4Addr::new(192, 168, 1, 100),
            pool_end: Ipv4Addr::new(192, 168, 1, 200),
            default_options,
            static_bindings: Vec::new(),
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks the pool, the bindings, and that every configured option
    /// value can be encoded.
    pub fn validate(&self) -> Result<()> {
        addresses_in_range(self.pool_start, self.pool_end)?;

        if self.ip_in_pool(self.server_ip) {
            return Err(Error::InvalidConfig(
                "server_ip must not be within the pool range".to_string(),
            ));
        }

        if self.server_port != 0 && self.server_port == self.client_port {
            return Err(Error::InvalidConfig(
                "server_port and client_port must differ".to_string(),
            ));
        }

        let mut seen_macs = HashSet::new();
        let mut seen_ips = HashSet::new();
        for binding in &self.static_bindings {
            let key = normalize_mac(&binding.mac_address).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "static binding has invalid MAC address {:?}",
                    binding.mac_address
                ))
            })?;

            if !seen_macs.insert(key) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate static binding for MAC {}",
                    binding.mac_address
                )));
            }

            if !seen_ips.insert(binding.ip_address) || binding.ip_address == self.server_ip {
                return Err(Error::InvalidConfig(format!(
                    "static binding address {} for MAC {} is already in use",
                    binding.ip_address, binding.mac_address
                )));
            }

            for (&code, value) in &binding.options {
                coerce_option(code, value)?;
            }
        }

        for (&code, value) in &self.default_options {
            coerce_option(code, value)?;
        }

        Ok(())
    }

    pub fn ip_in_pool(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        addr >= u32::from(self.pool_start) && addr <= u32::from(self.pool_end)
    }

    /// Number of addresses in the pool, or 0 for an inverted range.
    pub fn pool_size(&self) -> u32 {
        let start = u32::from(self.pool_start);
        let end = u32::from(self.pool_end);
        if start > end {
            0
        } else {
            end - start + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(mac: &str, ip: Ipv4Addr) -> StaticBinding {
        StaticBinding {
            mac_address: mac.to_string(),
            ip_address: ip,
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_port, 67);
        assert_eq!(config.client_port, 68);
        assert_eq!(config.reply_address, Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_pool_start_greater_than_end() {
        let config = Config {
            pool_start: Ipv4Addr::new(192, 168, 1, 200),
            pool_end: Ipv4Addr::new(192, 168, 1, 100),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::RangeOverflow { .. })
        ));
        assert_eq!(config.pool_size(), 0);
    }

    #[test]
    fn test_server_ip_in_pool() {
        let config = Config {
            server_ip: Ipv4Addr::new(192, 168, 1, 150),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_ports_rejected() {
        let config = Config {
            client_port: 67,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ip_in_pool() {
        let config = Config::default();
        assert!(config.ip_in_pool(Ipv4Addr::new(192, 168, 1, 150)));
        assert!(!config.ip_in_pool(Ipv4Addr::new(192, 168, 1, 50)));
        assert!(!config.ip_in_pool(Ipv4Addr::new(192, 168, 1, 250)));
    }

    #[test]
    fn test_pool_size() {
        let config = Config::default();
        assert_eq!(config.pool_size(), 101);
    }

    #[test]
    fn test_duplicate_binding_mac() {
        let config = Config {
            static_bindings: vec![
                binding("aa:bb:cc:dd:ee:ff", Ipv4Addr::new(192, 168, 1, 10)),
                binding("AA-BB-CC-DD-EE-FF", Ipv4Addr::new(192, 168, 1, 11)),
            ],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_binding_ip() {
        let config = Config {
            static_bindings: vec![
                binding("aa:bb:cc:dd:ee:01", Ipv4Addr::new(192, 168, 1, 10)),
                binding("aa:bb:cc:dd:ee:02", Ipv4Addr::new(192, 168, 1, 10)),
            ],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_binding_mac() {
        let config = Config {
            static_bindings: vec![binding("printer", Ipv4Addr::new(192, 168, 1, 10))],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_unencodable_option_rejected() {
        let mut config = Config::default();
        config
            .default_options
            .insert(19, ConfigValue::Text("sometimes".to_string()));
        assert!(matches!(
            config.validate(),
            Err(Error::OptionCoercion { .. })
        ));
    }

    #[test]
    fn test_optional_fields_default_when_missing() {
        let json = r#"{
            "server_ip": "10.0.0.1",
            "pool_start": "10.0.0.100",
            "pool_end": "10.0.0.110"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.bind_address, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.server_port, 67);
        assert_eq!(config.client_port, 68);
        assert!(config.default_options.is_empty());
        assert!(config.static_bindings.is_empty());
    }

    #[test]
    fn test_options_keyed_by_code() {
        let json = r#"{
            "server_ip": "10.0.0.1",
            "pool_start": "10.0.0.100",
            "pool_end": "10.0.0.110",
            "default_options": {
                "3": { "type": "text", "value": "10.0.0.1,10.0.0.2" },
                "19": { "type": "bool", "value": false }
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.default_options.get(&3),
            Some(&ConfigValue::Text("10.0.0.1,10.0.0.2".to_string()))
        );
        assert_eq!(config.default_options.get(&19), Some(&ConfigValue::Bool(false)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "dhcpwire-config-test-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.server_ip, created.server_ip);
        assert_eq!(loaded.default_options, created.default_options);

        std::fs::remove_file(&path).unwrap();
    }
}
