//! Streaming TLS I/O engine bridging [**Rustls**] (a synchronous,
//! non-blocking, memory-oriented TLS library whose read/write calls return
//! "would-block" and expect to be retried) and an asynchronous,
//! callback-driven byte-stream transport (one that only delivers bytes via
//! completion callbacks and accepts writes the same way).
//!
//! [`channel::Channel`] sits between application code — which posts
//! plaintext read/write requests — and a [`transport::Transport`] — which
//! moves ciphertext to and from a file descriptor — performing record
//! encryption, flow control, and connection shutdown. Four pieces, from the
//! inside out:
//!
//! - [`buffer::CiphertextBuffer`]: an unbounded FIFO byte buffer with a
//!   soft capacity used as a back-pressure hint.
//! - [`adapter::TlsAdapter`]: the abstraction over a Rustls connection that
//!   reads and writes plaintext against caller-supplied buffers while
//!   consuming and producing ciphertext through paired ingress/egress
//!   buffers. Two backends implement it, selected by Cargo feature: the
//!   default `buffered` backend ([`adapter::buffered`]) wraps Rustls's
//!   buffered `ClientConnection`/`ServerConnection`; the `unbuffered`
//!   backend ([`adapter::unbuffered`]) wraps Rustls's unbuffered connection
//!   types, which encode and decode directly into caller-owned buffers.
//! - [`shutdown::ShutdownState`]: the half-close protocol coordinating
//!   send-direction alert transmission with receive-direction close
//!   detection.
//! - [`channel::Channel`]: the state machine that drives plaintext
//!   read/write calls against the adapter, pairs them with application
//!   requests, and advances the asynchronous ciphertext pump (its `step`
//!   loop).
//!
//! All state transitions for a given channel are serialized through a
//! [`queue::Queue`] — the channel's own serial execution context — so the
//! public API and every transport completion callback touch channel state
//! from one place at a time. Cross-channel parallelism is unconstrained:
//! different channels may run on different threads simultaneously.
//!
//! Certificate validation policy, SNI, session resumption tuning,
//! cipher-suite negotiation, and renegotiation are all delegated entirely
//! to Rustls and out of scope for this crate; datagram TLS and partial
//! writes from the underlying engine are not supported.
//!
//! # Versioning
//!
//! This crate follows the major/minor version number of the [**Rustls**]
//! crate it wraps. Rustls is re-exported as `tls_channel_engine::rustls`.
//!
//! [**Rustls**]: https://crates.io/crates/rustls

pub mod adapter;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod queue;
pub mod shutdown;
pub mod transport;

#[cfg(feature = "buffered")]
pub use adapter::buffered::{BufferedClientAdapter, BufferedServerAdapter};
#[cfg(feature = "unbuffered")]
pub use adapter::unbuffered::{UnbufferedClientAdapter, UnbufferedServerAdapter};
pub use adapter::TlsAdapter;
pub use buffer::CiphertextBuffer;
pub use channel::Channel;
pub use config::{ChannelConfig, Side, SUPPORTED_PROTOCOL_VERSIONS};
pub use error::{AdapterError, ChannelError, EIO};
pub use queue::{ImmediateQueue, Queue};
pub use shutdown::ShutdownState;
pub use transport::{CloseFlags, Transport, TransportHandler};

pub use rustls;
