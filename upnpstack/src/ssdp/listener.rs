use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};

use super::{SSDP_IPV6_GROUPS, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpError, SsdpMessage};

/// Receives every well-formed frame with its sender.
pub type SsdpHandler = Arc<dyn Fn(SsdpMessage, SocketAddr) + Send + Sync>;

/// Blocking receive loop over one UDP socket.
pub struct SsdpListener {
    socket: UdpSocket,
    label: String,
}

impl SsdpListener {
    /// Joins the SSDP multicast group(s) on the interface owning `addr`.
    ///
    /// An unspecified address (`0.0.0.0` / `::`) lets the system choose.
    pub fn bind(addr: IpAddr) -> Result<Self, SsdpError> {
        let socket = match addr {
            IpAddr::V4(ip) => Self::bind_v4(ip)?,
            IpAddr::V6(_) => Self::bind_v6()?,
        };
        info!("✅ SSDP listener joined multicast on {}", addr);
        Ok(Self {
            socket,
            label: addr.to_string(),
        })
    }

    fn bind_v4(interface: Ipv4Addr) -> Result<UdpSocket, SsdpError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, SSDP_PORT)).into())?;
        socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &interface)?;
        socket.set_multicast_loop_v4(true)?;
        Ok(socket.into())
    }

    fn bind_v6() -> Result<UdpSocket, SsdpError> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true)?;
        socket.set_only_v6(true)?;
        socket.bind(&SocketAddr::from((Ipv6Addr::UNSPECIFIED, SSDP_PORT)).into())?;

        let mut joined = 0;
        for group in SSDP_IPV6_GROUPS {
            match socket.join_multicast_v6(&group, 0) {
                Ok(()) => {
                    debug!("SSDP: joined {}", group);
                    joined += 1;
                }
                Err(e) => warn!("SSDP: failed to join {}: {}", group, e),
            }
        }
        if joined == 0 {
            return Err(SsdpError::Malformed(
                "no IPv6 multicast group could be joined".to_string(),
            ));
        }
        Ok(socket.into())
    }

    /// Wraps an already bound socket, e.g. the transport's unicast socket.
    pub fn from_socket(socket: UdpSocket, label: &str) -> Self {
        Self {
            socket,
            label: label.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Spawns the receive thread.
    pub fn start(self, handler: SsdpHandler) -> Result<ListenerHandle, SsdpError> {
        self.socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let label = self.label.clone();

        let thread = std::thread::Builder::new()
            .name(format!("ssdp-{}", self.label))
            .spawn(move || self.run(flag, handler))?;

        Ok(ListenerHandle {
            label,
            running,
            thread: Some(thread),
        })
    }

    fn run(self, running: Arc<AtomicBool>, handler: SsdpHandler) {
        let mut buf = [0u8; 8192];
        while running.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => match SsdpMessage::parse(&buf[..n]) {
                    Some(message) => handler(message, from),
                    None => trace!("SSDP frame from {} dropped", from),
                },
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    warn!("❌ SSDP read error on {}: {}", self.label, e);
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
        debug!("SSDP listener {} stopped", self.label);
    }
}

/// Running listener; stopped on [`ListenerHandle::stop`] or drop.
pub struct ListenerHandle {
    label: String,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("SSDP listener {} panicked", self.label);
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
