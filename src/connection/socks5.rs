//! SOCKS5 handshake and CONNECT request handling.
//!
//! Two phases over one [`SecureStream`], in order:
//!
//! ```text
//! handshake:  +----+----------+----------+      reply: +----+--------+
//!             |VER | NMETHODS | METHODS  |             |VER | METHOD |
//!             | 1  |    1     | 1 to 255 |             | 05 |   00   |
//!             +----+----------+----------+             +----+--------+
//!
//! request:    +----+-----+-------+------+----------+----------+
//!             |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//!             | 1  |  1  | X'00' |  1   | Variable |    2     |
//!             +----+-----+-------+------+----------+----------+
//! ```
//!
//! Only "no authentication" and CONNECT are supported. The success reply
//! always reports `0.0.0.0:0` as the bound address. Raw handshake and request
//! bytes are kept so the client can replay them to the relay server.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::connection::SecureStream;
use crate::error::{Error, Result};

/// Protocol version byte
pub const SOCKS5_VERSION: u8 = 0x05;

/// "No authentication required" method
pub const METHOD_NO_AUTH: u8 = 0x00;

/// CONNECT command
pub const CMD_CONNECT: u8 = 0x01;

/// IPv4 address type
pub const ATYP_IPV4: u8 = 0x01;

/// Domain name address type
pub const ATYP_DOMAIN: u8 = 0x03;

/// IPv6 address type
pub const ATYP_IPV6: u8 = 0x04;

/// Method selection reply
pub const HANDSHAKE_REPLY: [u8; 2] = [SOCKS5_VERSION, METHOD_NO_AUTH];

/// Success reply, bound to 0.0.0.0:0
pub const REQUEST_REPLY: [u8; 10] = [SOCKS5_VERSION, 0x00, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0];

/// Largest message either phase reads (request with a 255-byte domain)
pub const MAX_MESSAGE_LEN: usize = 4 + 1 + 255 + 2;

/// Shortest valid request: domain type with an empty name
const MIN_REQUEST_LEN: usize = 7;

/// Destination named by a CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// Literal IPv4 or IPv6 address
    Ip(SocketAddr),
    /// Domain name still to be resolved
    Domain(String, u16),
}

impl TargetAddr {
    /// Destination port.
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Resolve to a socket address, preferring IPv4 results.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let (host, port) = match self {
            TargetAddr::Ip(addr) => return Ok(*addr),
            TargetAddr::Domain(host, port) => (host, *port),
        };

        let resolve_err = |source| Error::Resolve {
            host: host.clone(),
            source,
        };
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(resolve_err)?
            .collect();

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                resolve_err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses found",
                ))
            })
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// Everything captured from a client's SOCKS5 negotiation.
#[derive(Debug, Clone)]
pub struct Negotiation {
    /// Raw handshake bytes as received
    pub handshake: Vec<u8>,
    /// Raw request bytes as received
    pub request: Vec<u8>,
    /// Parsed destination
    pub target: TargetAddr,
}

/// Validate a method-selection message.
pub fn parse_handshake(data: &[u8]) -> Result<()> {
    if data.len() < 2 {
        return Err(Error::invalid(format!("handshake too short: {} bytes", data.len())));
    }
    if data[0] != SOCKS5_VERSION {
        return Err(Error::UnsupportedVersion(data[0]));
    }
    Ok(())
}

/// Parse a CONNECT request.
///
/// The domain is taken as everything between byte 5 and the two trailing
/// port bytes; the length-prefix byte at offset 4 is not consulted. The port
/// is always the last two bytes of the message.
pub fn parse_request(data: &[u8]) -> Result<TargetAddr> {
    let n = data.len();
    if n < MIN_REQUEST_LEN {
        return Err(Error::invalid(format!("request too short: {} bytes", n)));
    }
    if data[0] != SOCKS5_VERSION {
        return Err(Error::UnsupportedVersion(data[0]));
    }
    if data[1] != CMD_CONNECT {
        return Err(Error::UnsupportedCommand(data[1]));
    }

    let port = u16::from_be_bytes([data[n - 2], data[n - 1]]);

    match data[3] {
        ATYP_IPV4 => {
            if n < 4 + 4 + 2 {
                return Err(Error::invalid(format!("IPv4 request too short: {} bytes", n)));
            }
            let ip = Ipv4Addr::new(data[4], data[5], data[6], data[7]);
            Ok(TargetAddr::Ip(SocketAddr::from((ip, port))))
        }
        ATYP_DOMAIN => {
            let host = std::str::from_utf8(&data[5..n - 2])
                .map_err(|_| Error::invalid("domain is not valid UTF-8"))?;
            Ok(TargetAddr::Domain(host.to_string(), port))
        }
        ATYP_IPV6 => {
            if n < 4 + 16 + 2 {
                return Err(Error::invalid(format!("IPv6 request too short: {} bytes", n)));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&data[4..20]);
            Ok(TargetAddr::Ip(SocketAddr::from((Ipv6Addr::from(octets), port))))
        }
        atyp => Err(Error::UnsupportedAddressType(atyp)),
    }
}

async fn read_message<S>(stream: &mut SecureStream<S>, phase: &str) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite,
{
    let mut buf = [0u8; MAX_MESSAGE_LEN];
    let n = stream.recv(&mut buf).await?;
    if n == 0 {
        return Err(Error::Network(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("connection closed before {}", phase),
        )));
    }
    Ok(buf[..n].to_vec())
}

/// Run the handshake phase: validate and accept with "no authentication".
///
/// Returns the raw handshake bytes.
pub async fn handshake<S>(stream: &mut SecureStream<S>) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite,
{
    let received = read_message(stream, "handshake").await?;
    parse_handshake(&received)?;
    stream.send(&HANDSHAKE_REPLY).await?;
    Ok(received)
}

/// Read and parse the request without acting on it.
///
/// Returns the destination and the raw request bytes.
pub async fn read_request<S>(stream: &mut SecureStream<S>) -> Result<(TargetAddr, Vec<u8>)>
where
    S: AsyncRead + AsyncWrite,
{
    let received = read_message(stream, "request").await?;
    let target = parse_request(&received)?;
    Ok((target, received))
}

/// Send the fixed success reply.
pub async fn reply_success<S>(stream: &mut SecureStream<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
{
    stream.send(&REQUEST_REPLY).await?;
    Ok(())
}

/// Dial a destination with zero linger, so an aborted connection drops
/// unsent data instead of lingering on close.
pub async fn connect(addr: SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| Error::Connect { addr, source })?;
    stream.set_linger(Some(Duration::ZERO))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Run the request phase: parse, resolve, dial, reply.
///
/// On dial failure the error is returned and no reply is sent.
pub async fn request<S>(stream: &mut SecureStream<S>) -> Result<(TcpStream, Vec<u8>)>
where
    S: AsyncRead + AsyncWrite,
{
    let (target, received) = read_request(stream).await?;
    let addr = target.resolve().await?;
    let dst = connect(addr).await?;
    tracing::debug!(%target, %addr, "connected to destination");

    reply_success(stream).await?;
    Ok((dst, received))
}

/// Terminate SOCKS5 locally up to the parsed request, without dialing.
///
/// The caller decides the route, then answers with [`reply_success`].
pub async fn negotiate<S>(stream: &mut SecureStream<S>) -> Result<Negotiation>
where
    S: AsyncRead + AsyncWrite,
{
    let handshake = handshake(stream).await?;
    let (target, request) = read_request(stream).await?;
    Ok(Negotiation {
        handshake,
        request,
        target,
    })
}

/// Read until `expected.len()` bytes are in, checking them byte for byte.
///
/// Bytes past the reply (the destination talking first) are returned.
async fn expect_reply<S>(stream: &mut SecureStream<S>, expected: &[u8]) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite,
{
    let mut received = Vec::with_capacity(MAX_MESSAGE_LEN);
    let mut buf = [0u8; MAX_MESSAGE_LEN];

    while received.len() < expected.len() {
        let n = stream.recv(&mut buf).await?;
        if n == 0 {
            return Err(Error::UnexpectedReply(received));
        }
        received.extend_from_slice(&buf[..n]);

        let checked = received.len().min(expected.len());
        if received[..checked] != expected[..checked] {
            return Err(Error::UnexpectedReply(received));
        }
    }

    Ok(received.split_off(expected.len()))
}

/// Replay a captured negotiation to the relay server and check its replies.
///
/// Returns any destination bytes that arrived together with the final reply;
/// the caller must forward them before relaying.
pub async fn replay<S>(server: &mut SecureStream<S>, negotiation: &Negotiation) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite,
{
    server.send(&negotiation.handshake).await?;
    let extra = expect_reply(server, &HANDSHAKE_REPLY).await?;
    if !extra.is_empty() {
        return Err(Error::UnexpectedReply(extra));
    }

    server.send(&negotiation.request).await?;
    expect_reply(server, &REQUEST_REPLY).await
}
