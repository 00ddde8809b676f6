// UDP transport for the tunnel driver
//
// Receives raw DNS packets, parses them into transactions and hands each one
// to a handler on its own task. A transaction is consumed by exactly one of
// answer / error / passthrough.

use super::protocol::{Header, Message, Rcode, Record};
use super::{DnsError, Result};
use std::fmt;
use std::future::Future;
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Maximum DNS message size we read off the socket
const MAX_DNS_MESSAGE_SIZE: usize = 4096;

/// Port used for an upstream given without one
pub const DEFAULT_UPSTREAM_PORT: u16 = 53;

/// Upstream resolver for queries that aren't ours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

impl Upstream {
    /// Parse `host` or `host:port`.
    ///
    /// Anything after the first `:` that isn't a valid port falls back to 53,
    /// so `a`, `a:a`, `a:53` and `a:53:53` all mean `a:53`. Bracketed IPv6
    /// socket addresses and bare IPv6 addresses are taken as-is.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();

        if let Ok(addr) = spec.parse::<SocketAddr>() {
            return Some(Self {
                host: addr.ip().to_string(),
                port: addr.port(),
            });
        }
        if let Ok(ip) = spec.parse::<IpAddr>() {
            return Some(Self {
                host: ip.to_string(),
                port: DEFAULT_UPSTREAM_PORT,
            });
        }

        let mut parts = spec.split(':');
        let host = parts.next().filter(|h| !h.is_empty())?;
        let port = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(DEFAULT_UPSTREAM_PORT);

        Some(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// One received DNS request, waiting to be answered
pub struct Transaction {
    request: Message,
    raw: Vec<u8>,
    peer: SocketAddr,
    socket: Arc<UdpSocket>,
}

impl Transaction {
    pub fn new(request: Message, raw: Vec<u8>, peer: SocketAddr, socket: Arc<UdpSocket>) -> Self {
        Self {
            request,
            raw,
            peer,
            socket,
        }
    }

    pub fn request(&self) -> &Message {
        &self.request
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Answer with the given records
    pub async fn answer(self, answers: Vec<Record>) -> Result<()> {
        let response = Message::new_response(&self.request, Rcode::NoError, answers);
        match response.to_bytes() {
            Ok(bytes) => self.send(&bytes).await,
            Err(e) => {
                log::error!("Couldn't serialize answer for {}: {}", self.peer, e);
                self.error(Rcode::ServFail).await
            }
        }
    }

    /// Fail the request with `rcode`
    pub async fn error(self, rcode: Rcode) -> Result<()> {
        let response = Message::new_response(&self.request, rcode, Vec::new());
        let bytes = response.to_bytes()?;
        self.send(&bytes).await
    }

    /// Forward the request verbatim to `upstream` and relay whatever comes back.
    /// If upstream doesn't answer within `wait`, SERVFAIL.
    pub async fn passthrough(self, upstream: &Upstream, wait: Duration) -> Result<()> {
        log::debug!("Passing request from {} through to {}", self.peer, upstream);

        match forward(&self.raw, upstream, wait).await {
            Ok(reply) => self.send(&reply).await,
            Err(e) => {
                log::warn!("Passthrough to {} failed: {}", upstream, e);
                self.error(Rcode::ServFail).await
            }
        }
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        self.socket.send_to(bytes, self.peer).await?;
        Ok(())
    }
}

async fn forward(raw: &[u8], upstream: &Upstream, wait: Duration) -> Result<Vec<u8>> {
    let target = lookup_host((upstream.host.as_str(), upstream.port))
        .await?
        .next()
        .ok_or_else(|| DnsError::InvalidMessage(format!("Couldn't resolve {}", upstream)))?;

    let local = match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(target).await?;
    socket.send(raw).await?;

    let mut buf = vec![0u8; MAX_DNS_MESSAGE_SIZE];
    let n = timeout(wait, socket.recv(&mut buf))
        .await
        .map_err(|_| {
            DnsError::IoError(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no reply from {} within {:?}", upstream, wait),
            ))
        })??;
    buf.truncate(n);

    Ok(buf)
}

/// Receive loop: parse every packet on `socket` and spawn `handler` for it,
/// until `shutdown` fires (or its sender is dropped).
pub async fn serve<H, Fut>(socket: Arc<UdpSocket>, mut shutdown: oneshot::Receiver<()>, handler: H)
where
    H: Fn(Transaction) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handler = Arc::new(handler);
    let mut buf = vec![0u8; MAX_DNS_MESSAGE_SIZE];
    let mut backoff = RecvBackoff::default();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("DNS listener shutting down");
                break;
            }

            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, peer)) => {
                        let failures = backoff.succeeded();
                        if failures > 1 {
                            log::info!("DNS listener receiving again after {} errors", failures);
                        }

                        let raw = buf[..len].to_vec();
                        match Message::parse(&raw) {
                            Ok(request) if request.header.is_response() => {
                                log::debug!("Ignoring DNS response from {}", peer);
                            }
                            Ok(request) => {
                                let tx = Transaction::new(request, raw, peer, Arc::clone(&socket));
                                let handler = Arc::clone(&handler);
                                tokio::spawn(async move {
                                    (*handler)(tx).await;
                                });
                            }
                            Err(e) => {
                                log::debug!("Malformed DNS packet from {}: {}", peer, e);
                                reply_unparsable(&socket, &raw, peer).await;
                            }
                        }
                    }
                    Err(e) => {
                        let pause = backoff.failed();
                        if backoff.failures == 1 {
                            log::error!("DNS listener recv error: {}", e);
                        } else {
                            log::debug!("DNS listener recv error #{}: {}", backoff.failures, e);
                        }

                        tokio::select! {
                            _ = &mut shutdown => {
                                log::info!("DNS listener shutting down");
                                break;
                            }
                            _ = tokio::time::sleep(pause) => {}
                        }
                    }
                }
            }
        }
    }
}

const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after failed receives, doubling up to a ceiling
#[derive(Debug, Default)]
struct RecvBackoff {
    failures: u32,
}

impl RecvBackoff {
    fn failed(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let doublings = (self.failures - 1).min(16);
        RECV_BACKOFF_MIN
            .saturating_mul(1 << doublings)
            .min(RECV_BACKOFF_MAX)
    }

    /// Reset, returning how many failures there were in a row
    fn succeeded(&mut self) -> u32 {
        std::mem::take(&mut self.failures)
    }
}

/// SERVFAIL a request whose header made it but whose body didn't
async fn reply_unparsable(socket: &UdpSocket, raw: &[u8], peer: SocketAddr) {
    let header = match Header::parse(&mut Cursor::new(raw)) {
        Ok(header) if !header.is_response() => header,
        _ => return,
    };

    let response = Message::new_header_only_response(&header, Rcode::ServFail);
    if let Ok(bytes) = response.to_bytes() {
        if let Err(e) = socket.send_to(&bytes, peer).await {
            log::warn!("Couldn't send SERVFAIL to {}: {}", peer, e);
        }
    }
}
