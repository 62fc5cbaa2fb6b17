//! Turns decoded client messages into replies.
//!
//! The dispatcher holds the server's own address and the lease provider.
//! Every DISCOVER and REQUEST addressed to this server is answered with an
//! ACK built from the provider's address and options; there is no OFFER
//! step. RELEASE and DECLINE are forwarded to the provider without a reply.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::coerce::apply_reply_options;
use crate::error::Result;
use crate::lease::LeaseProvider;
use crate::options::{MessageType, OptionCode};
use crate::packet::{BOOTREPLY, BOOTREQUEST, DhcpPacket};

pub struct Dispatcher<P> {
    server_ip: Ipv4Addr,
    provider: P,
}

impl<P: LeaseProvider> Dispatcher<P> {
    pub fn new(server_ip: Ipv4Addr, provider: P) -> Self {
        Self {
            server_ip,
            provider,
        }
    }

    pub fn server_ip(&self) -> Ipv4Addr {
        self.server_ip
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Processes one inbound message and returns the reply to send, if any.
    ///
    /// The reply is the request itself, mutated in place.
    ///
    /// # Errors
    ///
    /// Propagates provider failures and [`Error::OptionCoercion`](crate::Error::OptionCoercion).
    /// No reply is produced in either case.
    pub fn handle(&mut self, packet: DhcpPacket) -> Result<Option<DhcpPacket>> {
        if packet.op != BOOTREQUEST {
            debug!(op = packet.op, xid = packet.xid, "Ignoring non-request message");
            return Ok(None);
        }

        let Some(message_type) = packet.message_type() else {
            debug!(
                xid = packet.xid,
                value = ?packet.options.get(OptionCode::MessageType as u8),
                "Ignoring message with unknown type"
            );
            return Ok(None);
        };

        let hardware_key = packet.hardware_key();
        debug!(
            message_type = %message_type,
            mac = %packet.format_mac(),
            xid = packet.xid,
            "Received message"
        );

        match message_type {
            MessageType::Discover | MessageType::Request => {
                if packet.options.contains(OptionCode::ServerIdentifier as u8)
                    && packet.server_identifier() != Some(self.server_ip)
                {
                    debug!(
                        message_type = %message_type,
                        server_id = ?packet.server_identifier(),
                        "Message is for a different server, ignoring"
                    );
                    return Ok(None);
                }
                self.acknowledge(packet, &hardware_key).map(Some)
            }
            MessageType::Decline | MessageType::Release => {
                debug!(
                    message_type = %message_type,
                    client = %hardware_key,
                    ip = ?packet.assigned_ip(),
                    "Releasing address"
                );
                self.provider.release(&hardware_key, packet.assigned_ip());
                Ok(None)
            }
            MessageType::Inform => {
                if packet.server_identifier() != Some(self.server_ip) {
                    debug!(
                        server_id = ?packet.server_identifier(),
                        "INFORM not addressed to this server, ignoring"
                    );
                    return Ok(None);
                }
                self.acknowledge(packet, &hardware_key).map(Some)
            }
            MessageType::Offer | MessageType::Ack | MessageType::Nak => {
                debug!(message_type = %message_type, "Ignoring server-side message type");
                Ok(None)
            }
        }
    }

    fn acknowledge(&mut self, mut packet: DhcpPacket, hardware_key: &str) -> Result<DhcpPacket> {
        let address = self.provider.lookup_address(hardware_key)?;
        let options = self.provider.lookup_options(hardware_key)?;

        packet.set_message_type(MessageType::Ack);
        packet.op = BOOTREPLY;
        packet.secs = packet.elapsed_seconds();

        apply_reply_options(&mut packet, self.server_ip, address, &options)?;

        debug!(
            client = %hardware_key,
            ip = %address,
            xid = packet.xid,
            "Sending ACK"
        );
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::ConfigValue;
    use crate::error::Error;
    use std::collections::BTreeMap;

    const SERVER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);
    const MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    #[derive(Default)]
    struct RecordingProvider {
        options: BTreeMap<u8, ConfigValue>,
        address_lookups: Vec<String>,
        releases: Vec<(String, Option<Ipv4Addr>)>,
    }

    impl LeaseProvider for RecordingProvider {
        fn lookup_address(&mut self, hardware_key: &str) -> Result<Ipv4Addr> {
            self.address_lookups.push(hardware_key.to_string());
            Ok(CLIENT_IP)
        }

        fn lookup_options(&mut self, _hardware_key: &str) -> Result<BTreeMap<u8, ConfigValue>> {
            Ok(self.options.clone())
        }

        fn release(&mut self, hardware_key: &str, address: Option<Ipv4Addr>) {
            self.releases.push((hardware_key.to_string(), address));
        }

        fn renew(
            &mut self,
            _hardware_key: &str,
            _address: &mut Ipv4Addr,
        ) -> Result<BTreeMap<u8, ConfigValue>> {
            unreachable!("renew is never dispatched")
        }
    }

    fn dispatcher() -> Dispatcher<RecordingProvider> {
        Dispatcher::new(SERVER_IP, RecordingProvider::default())
    }

    fn request(message_type: MessageType) -> DhcpPacket {
        let mut packet = DhcpPacket::new(BOOTREQUEST);
        packet.xid = 0xCAFEBABE;
        packet.chaddr = MAC.to_vec();
        packet.set_message_type(message_type);
        packet
    }

    #[test]
    fn test_discover_acknowledged() {
        let mut dispatcher = dispatcher();
        let reply = dispatcher
            .handle(request(MessageType::Discover))
            .unwrap()
            .unwrap();

        assert_eq!(reply.op, BOOTREPLY);
        assert_eq!(reply.message_type(), Some(MessageType::Ack));
        assert_eq!(reply.xid, 0xCAFEBABE);
        assert_eq!(reply.yiaddr, CLIENT_IP);
        assert_eq!(reply.siaddr, SERVER_IP);
        assert_eq!(reply.server_identifier(), Some(SERVER_IP));
        assert_eq!(dispatcher.provider().address_lookups, vec!["001122334455"]);
    }

    #[test]
    fn test_discover_without_message_type_acknowledged() {
        let mut packet = DhcpPacket::new(BOOTREQUEST);
        packet.chaddr = MAC.to_vec();

        let reply = dispatcher().handle(packet).unwrap().unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::Ack));
    }

    #[test]
    fn test_secs_rewritten_with_processing_time() {
        let mut packet = request(MessageType::Discover);
        packet.secs = 999;

        let reply = dispatcher().handle(packet).unwrap().unwrap();
        assert_eq!(reply.secs, 0);
    }

    #[test]
    fn test_request_for_other_server_ignored() {
        let mut dispatcher = dispatcher();
        let mut packet = request(MessageType::Request);
        packet
            .options
            .set(54, Some(Ipv4Addr::new(192, 168, 1, 2).octets().to_vec()));

        assert!(dispatcher.handle(packet).unwrap().is_none());
        assert!(dispatcher.provider().address_lookups.is_empty());
    }

    #[test]
    fn test_request_for_this_server_acknowledged() {
        let mut packet = request(MessageType::Request);
        packet.options.set(54, Some(SERVER_IP.octets().to_vec()));

        let reply = dispatcher().handle(packet).unwrap();
        assert!(reply.is_some());
    }

    #[test]
    fn test_release_calls_provider_once() {
        let mut dispatcher = dispatcher();
        let mut packet = request(MessageType::Release);
        packet.yiaddr = CLIENT_IP;

        assert!(dispatcher.handle(packet).unwrap().is_none());
        assert_eq!(
            dispatcher.provider().releases,
            vec![("001122334455".to_string(), Some(CLIENT_IP))]
        );
        assert!(dispatcher.provider().address_lookups.is_empty());
    }

    #[test]
    fn test_decline_calls_release() {
        let mut dispatcher = dispatcher();
        assert!(dispatcher.handle(request(MessageType::Decline)).unwrap().is_none());
        assert_eq!(
            dispatcher.provider().releases,
            vec![("001122334455".to_string(), None)]
        );
    }

    #[test]
    fn test_default_lease_time_inserted() {
        let reply = dispatcher()
            .handle(request(MessageType::Discover))
            .unwrap()
            .unwrap();
        assert_eq!(reply.options.get(51), Some(&[0x00, 0x01, 0x51, 0x80][..]));
    }

    #[test]
    fn test_configured_options_applied_and_prl_cleared() {
        let mut dispatcher = dispatcher();
        dispatcher
            .provider_mut()
            .options
            .insert(3, ConfigValue::Text("10.0.0.1,10.0.0.2".to_string()));

        let mut packet = request(MessageType::Request);
        packet.options.set(55, Some(vec![1, 3, 6]));

        let reply = dispatcher.handle(packet).unwrap().unwrap();
        assert_eq!(reply.options.get(3), Some(&[10, 0, 0, 1, 10, 0, 0, 2][..]));
        assert!(reply.options.get(55).is_none());
    }

    #[test]
    fn test_coercion_failure_suppresses_reply() {
        let mut dispatcher = dispatcher();
        dispatcher
            .provider_mut()
            .options
            .insert(19, ConfigValue::Text("perhaps".to_string()));

        let result = dispatcher.handle(request(MessageType::Discover));
        assert!(matches!(result, Err(Error::OptionCoercion { .. })));
    }

    #[test]
    fn test_inform_requires_matching_server_identifier() {
        let mut dispatcher = dispatcher();
        assert!(dispatcher.handle(request(MessageType::Inform)).unwrap().is_none());

        let mut packet = request(MessageType::Inform);
        packet.options.set(54, Some(SERVER_IP.octets().to_vec()));
        let reply = dispatcher.handle(packet).unwrap().unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::Ack));
    }

    #[test]
    fn test_server_message_types_ignored() {
        let mut dispatcher = dispatcher();
        for message_type in [MessageType::Offer, MessageType::Ack, MessageType::Nak] {
            assert!(dispatcher.handle(request(message_type)).unwrap().is_none());
        }
        assert!(dispatcher.provider().address_lookups.is_empty());
        assert!(dispatcher.provider().releases.is_empty());
    }

    #[test]
    fn test_unknown_message_type_ignored() {
        let mut packet = request(MessageType::Discover);
        packet.options.set(53, Some(vec![99]));
        assert!(dispatcher().handle(packet).unwrap().is_none());
    }

    #[test]
    fn test_bootreply_ignored() {
        let mut packet = request(MessageType::Discover);
        packet.op = BOOTREPLY;
        assert!(dispatcher().handle(packet).unwrap().is_none());
    }

    #[test]
    fn test_lookup_failure_propagates() {
        struct EmptyPool;

        impl LeaseProvider for EmptyPool {
            fn lookup_address(&mut self, _: &str) -> Result<Ipv4Addr> {
                Err(Error::PoolExhausted)
            }
            fn lookup_options(&mut self, _: &str) -> Result<BTreeMap<u8, ConfigValue>> {
                Ok(BTreeMap::new())
            }
            fn release(&mut self, _: &str, _: Option<Ipv4Addr>) {}
            fn renew(&mut self, _: &str, _: &mut Ipv4Addr) -> Result<BTreeMap<u8, ConfigValue>> {
                Err(Error::PoolExhausted)
            }
        }

        let mut dispatcher = Dispatcher::new(SERVER_IP, EmptyPool);
        let result = dispatcher.handle(request(MessageType::Discover));
        assert!(matches!(result, Err(Error::PoolExhausted)));
    }
}
