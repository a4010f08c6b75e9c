//! Connection plumbing shared by the client and the server.
//!
//! ```text
//!  app ──socks5──▶ client ══cipher══▶ server ──plain──▶ destination
//!        (nop)       │                  │      (nop)
//!                    └─── tunnel ───────┘
//! ```
//!
//! - [`SecureStream`]: a raw connection plus a shared cipher
//! - [`socks5`]: handshake and CONNECT request phases
//! - [`tunnel`](mod@tunnel): two-task bidirectional relay with shared teardown
//! - [`BufferPool`]: scratch buffers borrowed per read

pub mod buffer_pool;
pub mod secure_stream;
pub mod socks5;
pub mod tunnel;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use secure_stream::{CloseHandle, SecureReader, SecureStream, SecureWriter};
pub use tunnel::{classify, copy_raw, tunnel};
