//! Remote relay server.
//!
//! Every accepted connection carries the cipher on the wire. The server runs
//! the SOCKS5 handshake and request phases over it, dials the destination
//! and relays between the two legs:
//!
//! ```text
//!  client ══cipher══▶ ┌─────────────────────────┐
//!                     │  handshake → request    │ ──plain──▶ destination
//!                     │  tunnel(client, dst)    │
//!                     └─────────────────────────┘
//! ```
//!
//! A failed dial closes the client leg without a SOCKS5 error reply.

pub mod config;

pub use config::{ServerConfig, ServerConfigFile};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::cipher::{Cipher, NopCipher};
use crate::connection::{classify, socks5, tunnel, SecureStream};
use crate::error::{Error, Result};
use crate::metrics::ProxyMetrics;

/// Main server instance.
#[derive(Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
    cipher: Arc<dyn Cipher>,
    metrics: Arc<ProxyMetrics>,
}

impl Server {
    /// Create a server with an explicit cipher.
    pub fn new(config: ServerConfig, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            config: Arc::new(config),
            cipher,
            metrics: Arc::new(ProxyMetrics::new()),
        }
    }

    /// Create a server with the cipher named in `config`.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let cipher = config.cipher.build()?;
        Ok(Self::new(config, cipher))
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("server listening on {} (cipher: {})", addr, self.cipher.name());
        self.serve(listener).await
    }

    /// Accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.metrics.increment_connections();

                        if let Err(e) = server.handle_connection(stream, peer).await {
                            match classify(e) {
                                Some(e) => {
                                    server.metrics.increment_failed();
                                    tracing::error!(%peer, error = %e, "session failed");
                                }
                                None => tracing::debug!(%peer, "peer went away"),
                            }
                        }

                        server.metrics.decrement_connections();
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }
    }

    /// Serve one client connection from handshake to teardown.
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nodelay(true)?;
        let mut client = SecureStream::new(stream, Arc::clone(&self.cipher));

        socks5::handshake(&mut client).await?;
        let (dst, _request) = socks5::request(&mut client).await?;
        let dst_addr = dst.peer_addr()?;
        tracing::debug!(%peer, target = %dst_addr, "relaying");
        self.metrics.increment_relayed();

        let dst = SecureStream::new(dst, Arc::new(NopCipher::new()));
        tunnel(client, dst).await?;

        tracing::debug!(%peer, target = %dst_addr, "session finished");
        Ok(())
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Server metrics.
    pub fn metrics(&self) -> &ProxyMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::ByteMapCipher;
    use crate::connection::socks5::{ATYP_DOMAIN, CMD_CONNECT, HANDSHAKE_REPLY, REQUEST_REPLY, SOCKS5_VERSION};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn start_server(cipher: Arc<dyn Cipher>) -> (Server, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(ServerConfig::default(), cipher);
        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });
        (server, addr)
    }

    /// Destination that sends a greeting, then echoes one message.
    async fn greeting_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"hi").await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
        });
        addr
    }

    async fn read_decrypted(stream: &mut TcpStream, cipher: &dyn Cipher, len: usize) -> Vec<u8> {
        let mut wire = vec![0u8; len];
        stream.read_exact(&mut wire).await.unwrap();
        cipher.decrypt(&wire).unwrap()
    }

    #[tokio::test]
    async fn test_encrypted_session() {
        let cipher: Arc<dyn Cipher> = Arc::new(ByteMapCipher::from_seed(5));
        let (server, addr) = start_server(Arc::clone(&cipher)).await;
        let dst = greeting_server().await;

        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(&cipher.encrypt(&[SOCKS5_VERSION, 0x01, 0x00]).unwrap())
            .await
            .unwrap();
        assert_eq!(read_decrypted(&mut conn, cipher.as_ref(), 2).await, HANDSHAKE_REPLY);

        // Domain request for localhost exercises resolution
        let host = b"localhost";
        let mut request = vec![SOCKS5_VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, host.len() as u8];
        request.extend_from_slice(host);
        request.extend_from_slice(&dst.port().to_be_bytes());
        conn.write_all(&cipher.encrypt(&request).unwrap()).await.unwrap();
        assert_eq!(read_decrypted(&mut conn, cipher.as_ref(), 10).await, REQUEST_REPLY);

        assert_eq!(read_decrypted(&mut conn, cipher.as_ref(), 2).await, b"hi");
        conn.write_all(&cipher.encrypt(b"echo me").unwrap()).await.unwrap();
        assert_eq!(read_decrypted(&mut conn, cipher.as_ref(), 7).await, b"echo me");

        assert_eq!(server.metrics().snapshot().relayed_sessions, 1);
    }

    #[tokio::test]
    async fn test_wrong_cipher_is_rejected() {
        let server_cipher = ByteMapCipher::from_seed(5);
        let (server, addr) = start_server(Arc::new(server_cipher.clone())).await;
        let other = ByteMapCipher::from_seed(6);

        let mut hello = other.encrypt(&[SOCKS5_VERSION, 0x01, 0x00]).unwrap();
        // The two tables could agree on the version byte; force a mismatch
        if server_cipher.decrypt(&hello[..1]).unwrap()[0] == SOCKS5_VERSION {
            hello[0] ^= 0xff;
        }

        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(&hello).await.unwrap();

        let mut rest = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(1), conn.read_to_end(&mut rest))
            .await
            .expect("connection was not closed");
        assert!(read.is_err() || rest.is_empty());

        tokio::time::timeout(Duration::from_secs(1), async {
            while server.metrics().snapshot().failed_sessions == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("failure was not counted");
    }

    #[tokio::test]
    async fn test_early_hangup_is_not_a_failure() {
        let (server, addr) = start_server(Arc::new(ByteMapCipher::from_seed(5))).await;

        // Connect and hang up before sending a handshake
        drop(TcpStream::connect(addr).await.unwrap());

        let metrics = server.metrics();
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let snapshot = metrics.snapshot();
                if snapshot.total_connections == 1 && snapshot.active_connections == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection was not torn down");
        assert_eq!(metrics.snapshot().failed_sessions, 0);
    }

    #[test]
    fn test_from_config() {
        let server = Server::from_config(ServerConfig::new_random("127.0.0.1", 0)).unwrap();
        assert_eq!(server.config().listen_port, 0);

        let mut config = ServerConfig::default();
        config.listen_addr.clear();
        assert!(matches!(Server::from_config(config), Err(Error::Config(_))));
    }
}
