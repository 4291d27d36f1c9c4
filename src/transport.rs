//! The transport abstraction (SPEC_FULL.md §6): the injected collaborator
//! that moves ciphertext to and from a file descriptor asynchronously.

use std::rc::Rc;

use crate::queue::Queue;

/// Completion callback contract shared by `read` and `write`.
///
/// `done` signals the operation completed; `data` carries bytes read (for
/// `read`) or is `None` (for `write`); `data = None` on a `read` completion
/// signals transport EOF; `errno = 0` means success.
pub type TransportHandler = Box<dyn FnOnce(bool, Option<Vec<u8>>, i32)>;

/// Flags accepted by [`Transport::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseFlags {
    /// Close politely, allowing any queued writes to drain first.
    Normal,
    /// Close immediately, abandoning anything in flight.
    Abort,
}

/// The asynchronous byte-stream transport a [`crate::channel::Channel`]
/// pumps ciphertext through.
///
/// Exposes the same shape the channel's own public surface mirrors
/// (SPEC_FULL.md §6), so a TLS-encrypted channel is substitutable for a
/// plaintext transport from the application's point of view. Buffers
/// crossing this boundary are owned, independently-sized `Vec<u8>`s rather
/// than offsets into a shared arena (see SPEC_FULL.md §6 and DESIGN.md).
pub trait Transport {
    /// Issue an asynchronous read of up to `max_len` bytes. `handler` fires
    /// exactly once, dispatched onto `queue` (held by the implementation for
    /// as long as the operation is in flight, hence `Rc` rather than a
    /// borrow).
    fn read(&self, max_len: usize, queue: Rc<dyn Queue>, handler: TransportHandler);

    /// Issue an asynchronous write of `data`. `handler` fires exactly
    /// once, dispatched onto `queue`, with `data = None` always (writes
    /// never return bytes).
    fn write(&self, data: Vec<u8>, queue: Rc<dyn Queue>, handler: TransportHandler);

    /// Close the transport. Does not itself fire a callback; the caller
    /// tracks closure completion out of band (mirrors the plain transport
    /// this abstracts over, which this crate's `Channel` substitutes for).
    fn close(&self, flags: CloseFlags);

    /// Present only for interface compatibility with the plain transport;
    /// silently ignored by [`crate::channel::Channel::set_low_water`] too.
    fn set_low_water(&self, _n: usize) {}
}
