//! client for sending DNS queries to other servers

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use derive_more::{Display, Error};

use crate::dns::buffer::MAX_UDP_PAYLOAD;

/// Well known DNS port
pub const DNS_PORT: u16 = 53;

#[derive(Debug, Display, Error)]
pub enum ClientError {
    Io(std::io::Error),
    #[display(fmt = "no reply from {} within {:?}", server, timeout)]
    TimeOut { server: SocketAddrV4, timeout: Duration },
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

type Result<T> = std::result::Result<T, ClientError>;

/// Datagram exchange with a single nameserver
///
/// One call sends one datagram and waits for one reply. Retrying against
/// other servers is the resolver's business.
pub trait DnsClient {
    fn get_sent_count(&self) -> usize;
    fn get_failed_count(&self) -> usize;

    fn query(&self, server: Ipv4Addr, datagram: &[u8]) -> Result<Vec<u8>>;
}

/// The UDP client
///
/// Every exchange uses a fresh ephemeral socket, so a late answer to an
/// earlier query can never be mistaken for the current one. Replies are
/// capped at the legacy 512 byte payload and must arrive from the address
/// the query was sent to before the timeout runs out.
pub struct DnsNetworkClient {
    total_sent: AtomicUsize,
    total_failed: AtomicUsize,

    port: u16,
    timeout: Duration,
}

impl DnsNetworkClient {
    pub fn new(timeout: Duration) -> DnsNetworkClient {
        DnsNetworkClient {
            total_sent: AtomicUsize::new(0),
            total_failed: AtomicUsize::new(0),
            port: DNS_PORT,
            timeout,
        }
    }

    /// Send to a port other than 53
    pub fn with_port(mut self, port: u16) -> DnsNetworkClient {
        self.port = port;
        self
    }

    fn exchange(&self, server: Ipv4Addr, datagram: &[u8]) -> Result<Vec<u8>> {
        let target = SocketAddrV4::new(server, self.port);

        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.send_to(datagram, target)?;

        let deadline = Instant::now() + self.timeout;
        let mut res_buffer = [0; MAX_UDP_PAYLOAD];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::TimeOut {
                    server: target,
                    timeout: self.timeout,
                });
            }
            socket.set_read_timeout(Some(remaining))?;

            match socket.recv_from(&mut res_buffer) {
                Ok((size, SocketAddr::V4(peer))) if peer == target => {
                    return Ok(res_buffer[..size].to_vec());
                }
                Ok((_, peer)) => {
                    log::debug!("Discarding datagram from unexpected peer {}", peer);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Err(ClientError::TimeOut {
                        server: target,
                        timeout: self.timeout,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl DnsClient for DnsNetworkClient {
    fn get_sent_count(&self) -> usize {
        self.total_sent.load(Ordering::Acquire)
    }

    fn get_failed_count(&self) -> usize {
        self.total_failed.load(Ordering::Acquire)
    }

    fn query(&self, server: Ipv4Addr, datagram: &[u8]) -> Result<Vec<u8>> {
        let _ = self.total_sent.fetch_add(1, Ordering::Release);

        self.exchange(server, datagram).map_err(|e| {
            let _ = self.total_failed.fetch_add(1, Ordering::Release);
            e
        })
    }
}
