//! The shutdown state machine (SPEC_FULL.md §4.4): half-close coordination
//! between send-direction alert transmission and receive-direction
//! close-notify detection.

/// State of the half-close protocol for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Normal operation: no shutdown requested, peer's close-notify not
    /// yet observed.
    Open,
    /// `close()` was called; `force` selects whether a still-pending
    /// shutdown should be abandoned (closing the transport with `EIO`) or
    /// deferred to a later `step`.
    ShutdownRequested { force: bool },
    /// The close_notify alert has been sent; waiting for the peer's own
    /// close_notify (or for the transport to close).
    ShutdownSent,
    /// The transport has been closed and the cleanup callback has fired.
    Closed,
}

impl ShutdownState {
    pub fn is_closed(&self) -> bool {
        matches!(self, ShutdownState::Closed)
    }

    /// `close(force)` applied to the current state.
    ///
    /// Per SPEC_FULL.md §4.4 / §9 open-question decision #3: a second
    /// `close` while already `ShutdownSent` is treated as advancing the
    /// shutdown FSM again (permitting a force-close to complete even if
    /// the first, non-forced, attempt is still waiting on the peer).
    /// `close` on an already-`Closed` channel is a no-op.
    pub fn request_close(&mut self, force: bool) {
        match *self {
            ShutdownState::Closed => {}
            ShutdownState::Open => *self = ShutdownState::ShutdownRequested { force },
            ShutdownState::ShutdownRequested { force: existing } => {
                *self = ShutdownState::ShutdownRequested {
                    force: existing || force,
                };
            }
            ShutdownState::ShutdownSent => {
                *self = ShutdownState::ShutdownRequested { force };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_from_open_requests_shutdown() {
        let mut st = ShutdownState::Open;
        st.request_close(false);
        assert_eq!(st, ShutdownState::ShutdownRequested { force: false });
    }

    #[test]
    fn second_close_while_requested_latches_force() {
        let mut st = ShutdownState::ShutdownRequested { force: false };
        st.request_close(true);
        assert_eq!(st, ShutdownState::ShutdownRequested { force: true });
    }

    #[test]
    fn close_while_shutdown_sent_reopens_the_request() {
        // SPEC_FULL.md §9 open-question decision: a force-close while
        // already `ShutdownSent` advances the FSM again instead of being a
        // no-op, so a stalled peer can still be abandoned.
        let mut st = ShutdownState::ShutdownSent;
        st.request_close(true);
        assert_eq!(st, ShutdownState::ShutdownRequested { force: true });
    }

    #[test]
    fn close_on_closed_channel_is_a_no_op() {
        let mut st = ShutdownState::Closed;
        st.request_close(true);
        assert_eq!(st, ShutdownState::Closed);
    }

    #[test]
    fn is_closed_only_true_in_closed_state() {
        assert!(!ShutdownState::Open.is_closed());
        assert!(!ShutdownState::ShutdownRequested { force: false }.is_closed());
        assert!(!ShutdownState::ShutdownSent.is_closed());
        assert!(ShutdownState::Closed.is_closed());
    }
}
