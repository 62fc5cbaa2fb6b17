use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{error, info, trace, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::lease::LeaseProvider;
use crate::options::option_name;
use crate::packet::DhcpPacket;

const RECV_BUFFER_SIZE: usize = 1500;

/// UDP front end: one listening socket, one broadcast send socket, and a
/// receive loop that handles one datagram at a time.
pub struct DhcpServer<P> {
    dispatcher: Dispatcher<P>,
    listen_socket: UdpSocket,
    send_socket: UdpSocket,
    reply_destination: SocketAddr,
}

impl<P: LeaseProvider> DhcpServer<P> {
    /// Binds both sockets. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Socket`] if either socket cannot be created or bound.
    pub async fn new(config: &Config, provider: P) -> Result<Self> {
        let listen_socket = Self::create_socket(config.bind_address, config.server_port)?;
        let send_socket = Self::create_socket(config.bind_address, config.client_port)?;

        info!(
            "DHCP server {} listening on {}",
            config.server_ip,
            listen_socket.local_addr()?
        );
        info!(
            "IP pool: {} - {} ({} addresses)",
            config.pool_start,
            config.pool_end,
            config.pool_size()
        );

        Ok(Self {
            dispatcher: Dispatcher::new(config.server_ip, provider),
            listen_socket,
            send_socket,
            reply_destination: SocketAddrV4::new(config.reply_address, config.client_port).into(),
        })
    }

    fn create_socket(address: Ipv4Addr, port: u16) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

        let bind_addr = SocketAddrV4::new(address, port);
        socket.bind(&bind_addr.into()).map_err(|error| {
            Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error))
        })?;

        let std_socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(std_socket)
            .map_err(|error| Error::Socket(format!("Failed to convert to tokio socket: {}", error)))
    }

    /// Address of the listening socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listen_socket.local_addr()?)
    }

    /// Address replies are sent from.
    pub fn send_addr(&self) -> Result<SocketAddr> {
        Ok(self.send_socket.local_addr()?)
    }

    pub fn reply_destination(&self) -> SocketAddr {
        self.reply_destination
    }

    /// Overrides where replies go, normally the broadcast address.
    pub fn set_reply_destination(&mut self, destination: SocketAddr) {
        self.reply_destination = destination;
    }

    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.dispatcher
    }

    pub fn provider(&self) -> &P {
        self.dispatcher.provider()
    }

    /// Serves until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", error);
            }
        })
        .await
    }

    /// Serves until `shutdown` resolves.
    ///
    /// Errors for individual datagrams are logged and the loop keeps going.
    /// A receive in flight at shutdown is dropped.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        tokio::pin!(shutdown);

        info!("DHCP server ready and listening");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
                received = self.listen_socket.recv_from(&mut buffer) => match received {
                    Ok((size, source)) => {
                        if let Err(error) = self.handle_datagram(&buffer[..size], source).await {
                            match error {
                                Error::OptionCoercion { .. } => {
                                    error!("Configuration error answering {}: {}", source, error);
                                }
                                other => warn!("Error handling packet from {}: {}", source, other),
                            }
                        }
                    }
                    Err(error) => {
                        error!("Error receiving packet: {}", error);
                    }
                }
            }
        }
    }

    async fn handle_datagram(&mut self, data: &[u8], source: SocketAddr) -> Result<()> {
        let started = Instant::now();

        let packet = DhcpPacket::parse(data)?;
        let xid = packet.xid;

        for option in packet.options.iter() {
            trace!(
                xid,
                option = %option_name(option.code),
                value = ?option.value,
                "Received option"
            );
        }
        trace!(xid, requested = ?packet.requested_options(), "Requested options");

        if let Some(reply) = self.dispatcher.handle(packet)? {
            let encoded = reply.encode();
            self.send_socket
                .send_to(&encoded, self.reply_destination)
                .await?;
            trace!(
                xid,
                bytes = encoded.len(),
                destination = %self.reply_destination,
                "Sent reply"
            );
        }

        trace!(xid, %source, elapsed = ?started.elapsed(), "Processed datagram");
        Ok(())
    }
}
