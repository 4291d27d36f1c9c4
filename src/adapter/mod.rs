//! The in-memory TLS adapter (SPEC_FULL.md §4.2): the abstraction over an
//! SSL engine that reads and writes plaintext against caller-supplied
//! buffers while consuming and producing ciphertext through paired
//! ingress/egress buffers.
//!
//! Two backends implement [`TlsAdapter`], selected at compile time by
//! Cargo feature (mirroring the teacher crate's `buffered`/`unbuffered`
//! split):
//!
//! - [`buffered::BufferedClientAdapter`] / [`buffered::BufferedServerAdapter`]
//!   (feature `buffered`, default) wrap Rustls's `ClientConnection` /
//!   `ServerConnection`, which own their own internal record buffers —
//!   playing the role SPEC_FULL.md §4.2 calls `MemoryBioBackend`.
//! - [`unbuffered::UnbufferedClientAdapter`] / [`unbuffered::UnbufferedServerAdapter`]
//!   (feature `unbuffered`) wrap Rustls's `UnbufferedClientConnection` /
//!   `UnbufferedServerConnection`, which encode/decode directly into
//!   caller-owned buffers — playing the role SPEC_FULL.md §4.2 calls
//!   `PortableBufferBackend`.

#[cfg(feature = "buffered")]
pub mod buffered;
#[cfg(feature = "unbuffered")]
pub mod unbuffered;

use crate::buffer::CiphertextBuffer;
use crate::error::AdapterError;

/// Common contract both adapter backends satisfy (SPEC_FULL.md §4.2).
pub trait TlsAdapter {
    /// Ciphertext received from the transport, awaiting consumption by
    /// the SSL engine.
    fn ingress(&mut self) -> &mut CiphertextBuffer;

    /// Ciphertext produced by the SSL engine, awaiting transmission.
    fn egress(&mut self) -> &mut CiphertextBuffer;

    /// Whether the handshake has completed and application data can flow.
    fn is_handshake_complete(&self) -> bool;

    /// Fill `into` with decrypted application data.
    ///
    /// Returns `Ok(None)` ("would-block": need more ingress or egress
    /// drain before progress is possible), `Ok(Some(0))` (peer sent
    /// close_notify), or `Ok(Some(n))` with `n > 0` bytes filled. Drives
    /// the handshake to completion first if it isn't already; while
    /// handshaking, always returns `Ok(None)`.
    ///
    /// A zero-length `into` is the caller's problem, not this one: the
    /// engine short-circuits length-0 reads before ever calling in here,
    /// since `Ok(Some(0))` already means "peer closed" and the two must
    /// not be conflated.
    fn read_plaintext(&mut self, into: &mut [u8]) -> Result<Option<usize>, AdapterError>;

    /// Encrypt `from` into the egress buffer.
    ///
    /// Returns `Ok(None)` (would-block: handshake not complete or egress
    /// full), `Ok(Some(0))` (peer closed before the write could be
    /// absorbed), or `Ok(Some(n))` where `n == from.len()` always (partial
    /// writes are disabled per SPEC_FULL.md §4.2).
    ///
    /// As with `read_plaintext`, a zero-length `from` is handled by the
    /// engine before this is ever called, for the same reason.
    fn write_plaintext(&mut self, from: &[u8]) -> Result<Option<usize>, AdapterError>;

    /// Attempt to send a close_notify alert.
    ///
    /// Returns `Ok(true)` once our outgoing close_notify has been fully
    /// encoded into the egress buffer, `Ok(false)` if more driving is
    /// needed first (call again after pumping ciphertext).
    fn shutdown(&mut self) -> Result<bool, AdapterError>;
}
