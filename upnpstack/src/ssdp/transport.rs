use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use super::{SSDP_IPV6_GROUPS, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpError, SsdpMessage};

/// Outgoing side of SSDP.
pub trait SsdpTransport: Send + Sync {
    /// Sends a request to the SSDP multicast group(s).
    fn multicast(&self, message: &SsdpMessage) -> Result<(), SsdpError>;

    /// Sends a message to a single host.
    fn unicast(&self, message: &SsdpMessage, target: SocketAddr) -> Result<(), SsdpError>;
}

/// UDP transport bound to ephemeral ports.
///
/// Search responses come back to the sending port: [`UdpTransport::try_clone_v4`]
/// hands the socket to an [`SsdpListener`](super::SsdpListener).
pub struct UdpTransport {
    v4: UdpSocket,
    v6: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(ipv6: bool) -> Result<Self, SsdpError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
        socket.set_multicast_ttl_v4(2)?;
        socket.set_multicast_loop_v4(true)?;
        let v4: UdpSocket = socket.into();

        let v6 = if ipv6 {
            match Self::bind_v6() {
                Ok(socket) => Some(socket),
                Err(e) => {
                    warn!("SSDP: IPv6 transport unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        info!("✅ SSDP transport ready on {}", v4.local_addr()?);
        Ok(Self { v4, v6 })
    }

    fn bind_v6() -> Result<UdpSocket, SsdpError> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_only_v6(true)?;
        socket.bind(&SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)).into())?;
        socket.set_multicast_hops_v6(2)?;
        Ok(socket.into())
    }

    pub fn try_clone_v4(&self) -> Result<UdpSocket, SsdpError> {
        Ok(self.v4.try_clone()?)
    }

    pub fn try_clone_v6(&self) -> Result<Option<UdpSocket>, SsdpError> {
        match &self.v6 {
            Some(socket) => Ok(Some(socket.try_clone()?)),
            None => Ok(None),
        }
    }
}

impl SsdpTransport for UdpTransport {
    fn multicast(&self, message: &SsdpMessage) -> Result<(), SsdpError> {
        let bytes = message.request_bytes()?;
        self.v4.send_to(
            &bytes,
            SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT),
        )?;
        if let Some(v6) = &self.v6 {
            let target = SocketAddrV6::new(SSDP_IPV6_GROUPS[0], SSDP_PORT, 0, 0);
            if let Err(e) = v6.send_to(&bytes, target) {
                debug!("SSDP: IPv6 multicast failed: {}", e);
            }
        }
        Ok(())
    }

    fn unicast(&self, message: &SsdpMessage, target: SocketAddr) -> Result<(), SsdpError> {
        let bytes = message.to_bytes();
        match (target, &self.v6) {
            (SocketAddr::V6(_), Some(v6)) => v6.send_to(&bytes, target)?,
            (SocketAddr::V6(_), None) => {
                return Err(SsdpError::Unsupported(format!(
                    "no IPv6 socket to reach {}",
                    target
                )));
            }
            (SocketAddr::V4(_), _) => self.v4.send_to(&bytes, target)?,
        };
        Ok(())
    }
}
