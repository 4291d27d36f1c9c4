//! Error taxonomy for the TLS channel engine.
//!
//! Every error that can occur inside the adapter or the channel collapses,
//! at the public boundary, to a single POSIX `errno`. Protocol-level detail
//! is retained for logging (via [`tracing`]) but never surfaced to callers,
//! by design (see SPEC_FULL.md §7).

/// `EIO`, the only errno this crate ever surfaces at its boundary.
pub const EIO: i32 = 5;

/// Errors raised by a [`crate::adapter::TlsAdapter`] while driving the
/// underlying SSL engine.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The TLS library rejected a protocol message.
    #[error("TLS protocol error: {0}")]
    SslProtocol(String),

    /// An SSL return/state the adapter did not classify.
    #[error("unexpected TLS engine state: {0}")]
    Unexpected(String),

    /// The transport closed without a close_notify alert.
    #[error("unclean close: transport closed without a close_notify alert")]
    UncleanClose,
}

impl From<rustls::Error> for AdapterError {
    fn from(e: rustls::Error) -> Self {
        AdapterError::SslProtocol(e.to_string())
    }
}

/// Errors latched on a [`crate::channel::Channel`].
///
/// The first of these observed on a channel is sticky: once set, no further
/// SSL operations are attempted and pending requests are drained with
/// `errno = EIO` (see [`EIO`]).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Propagated from the TLS adapter.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// The transport reported a non-zero errno on a ciphertext read or
    /// write.
    #[error("transport error: errno {0}")]
    Transport(i32),
}

impl ChannelError {
    /// The errno this error surfaces as at the public API boundary.
    ///
    /// Every [`ChannelError`] variant collapses to `EIO` per SPEC_FULL.md
    /// §7: "The only TLS-originated error surfaced is `EIO`" — including
    /// `Transport`, whose underlying errno is logged but never passed
    /// through to a request handler or `cleanup_cb`. `errno()` exists as a
    /// named conversion point so the mapping is documented once instead of
    /// inlined as a magic constant at every call site.
    pub fn errno(&self) -> i32 {
        EIO
    }
}

