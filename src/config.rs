//! Configuration surface (SPEC_FULL.md §6, §10).

use crate::buffer::DEFAULT_SOFT_CAP;

/// Which side of the handshake a channel plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

/// Per-channel configuration recognized by the engine.
///
/// Certificate material itself is not part of this struct: it is supplied
/// out-of-band via the `rustls::ClientConfig`/`rustls::ServerConfig` the
/// caller constructs and is opaque to this crate (SPEC_FULL.md §6).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub side: Side,
    /// Advisory soft cap applied to both the ingress and egress ciphertext
    /// buffers (SPEC_FULL.md §3). Default 4096.
    pub soft_cap: usize,
}

impl ChannelConfig {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            soft_cap: DEFAULT_SOFT_CAP,
        }
    }

    pub fn with_soft_cap(mut self, soft_cap: usize) -> Self {
        self.soft_cap = soft_cap;
        self
    }
}

/// The protocol versions this crate accepts.
///
/// SPEC_FULL.md §4.2 calls for rejecting protocol versions older than TLS
/// 1.1. Rustls implements only TLS 1.2 and TLS 1.3 — there is no TLS 1.1
/// support to reject in the first place, so the floor is satisfied
/// vacuously as far as the *choice of versions* goes; see DESIGN.md.
///
/// An adapter's `ClientConfig`/`ServerConfig` is built by the caller
/// out-of-band (SPEC_FULL.md §6), so this crate cannot enforce the floor
/// from inside `BufferedClientAdapter::new` et al. — there is no config to
/// rebuild once a caller has already constructed one. Callers MUST pass
/// this constant to `ClientConfig::builder_with_protocol_versions`/
/// `ServerConfig::builder_with_protocol_versions` (rather than the bare
/// `::builder()`, which accepts every version Rustls implements) when
/// constructing the config passed into an adapter constructor; this
/// crate's own tests and benchmarks do so.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS12, &rustls::version::TLS13];
