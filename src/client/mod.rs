//! Local SOCKS5 entry point.
//!
//! Applications speak plain SOCKS5 to the client. The client answers the
//! handshake itself, resolves the requested destination and asks the
//! ruleset where it goes:
//!
//! ```text
//!                       ┌── direct ──▶ destination        (raw copy)
//!  app ── socks5 ──▶ client
//!                       └── relay ═══▶ server ──▶ destination
//!                                 cipher leg, handshake replayed
//! ```
//!
//! On the relay route the captured handshake and request are replayed to the
//! server over the cipher leg, and the application only gets its success
//! reply once the server has confirmed the destination is connected.

pub mod config;

pub use config::ClientConfig;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::cipher::{Cipher, NopCipher};
use crate::connection::{classify, copy_raw, socks5, tunnel, SecureStream};
use crate::error::{Error, Result};
use crate::metrics::ProxyMetrics;
use crate::ruleset::Ruleset;

/// SOCKS5 client instance.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    cipher: Arc<dyn Cipher>,
    ruleset: Arc<dyn Ruleset>,
    metrics: Arc<ProxyMetrics>,
}

impl Client {
    /// Create a client with an explicit cipher and ruleset.
    pub fn new(config: ClientConfig, cipher: Arc<dyn Cipher>, ruleset: Arc<dyn Ruleset>) -> Self {
        Self {
            config: Arc::new(config),
            cipher,
            ruleset,
            metrics: Arc::new(ProxyMetrics::new()),
        }
    }

    /// Create a client with the cipher and ruleset named in `config`.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let cipher = config.cipher.build()?;
        let ruleset = config.ruleset.build();
        Ok(Self::new(config, cipher, ruleset))
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!(
            "client listening on {}, relay server {}",
            self.config.listen_addr,
            self.config.server_addr
        );
        self.serve(listener).await
    }

    /// Accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let client = self.clone();
                    tokio::spawn(async move {
                        client.metrics.increment_connections();

                        if let Err(e) = client.handle_connection(stream, peer).await {
                            match classify(e) {
                                Some(e) => {
                                    client.metrics.increment_failed();
                                    tracing::error!(%peer, error = %e, "session failed");
                                }
                                None => tracing::debug!(%peer, "peer went away"),
                            }
                        }

                        client.metrics.decrement_connections();
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }
    }

    /// Serve one application connection from handshake to teardown.
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nodelay(true)?;
        let mut local = SecureStream::new(stream, Arc::new(NopCipher::new()));

        let negotiation = socks5::negotiate(&mut local).await?;
        let addr = negotiation.target.resolve().await?;
        let target = &negotiation.target;

        if !self.ruleset.matches(&addr) {
            tracing::debug!(%peer, %target, %addr, route = "direct", "dialing destination");
            let dst = socks5::connect(addr).await?;
            socks5::reply_success(&mut local).await?;
            self.metrics.increment_direct();

            copy_raw(local.into_inner()?, dst).await?;
            tracing::debug!(%peer, %target, route = "direct", "session finished");
            return Ok(());
        }

        tracing::debug!(%peer, %target, route = "relay", server = %self.config.server_addr, "connecting to relay");
        let server = TcpStream::connect(self.config.server_addr.as_str()).await?;
        server.set_nodelay(true)?;
        let mut server = SecureStream::new(server, Arc::clone(&self.cipher));

        let early = socks5::replay(&mut server, &negotiation).await?;
        socks5::reply_success(&mut local).await?;
        if !early.is_empty() {
            local.send(&early).await?;
        }
        self.metrics.increment_relayed();

        tunnel(server, local).await?;
        tracing::debug!(%peer, %target, route = "relay", "session finished");
        Ok(())
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Client metrics.
    pub fn metrics(&self) -> &ProxyMetrics {
        &self.metrics
    }
}
