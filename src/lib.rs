//! # shadowrelay
//!
//! A two-hop SOCKS5 proxy. Applications talk plain SOCKS5 to a local
//! client; the client forwards each session over a ciphered connection to a
//! remote server, which dials the real destination.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐  socks5   ┌─────────────┐  cipher   ┌─────────────┐  plain   ┌─────────────┐
//! │ Application │ ────────▶ │   Client    │ ════════▶ │   Server    │ ───────▶ │ Destination │
//! └─────────────┘           └──────┬──────┘           └─────────────┘          └─────────────┘
//!                                  │  ruleset says direct            ▲
//!                                  └─────────────────────────────────┘
//! ```
//!
//! ## Layers
//!
//! 1. **Cipher**: per-chunk transform (identity, byte table, base64)
//! 2. **Secure stream**: raw connection plus shared cipher, idempotent close
//! 3. **SOCKS5**: no-auth handshake and CONNECT request, replayable
//! 4. **Tunnel**: one task per direction, first failure tears down both
//! 5. **Ruleset**: per-destination route choice on the client
//!
//! The cipher is obfuscation, not security: there is no authentication, no
//! integrity and no key exchange.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cipher;
pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod ruleset;

#[cfg(feature = "server")]
pub mod server;

pub use error::{Error, Result};

/// Default local SOCKS5 listen address for the client
pub const DEFAULT_CLIENT_ADDR: &str = "127.0.0.1:4444";

/// Default relay server port
pub const DEFAULT_SERVER_PORT: u16 = 5555;

/// Default relay server address the client connects to
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:5555";
