//! `PortableBufferBackend`: wraps Rustls's unbuffered
//! `ClientConnection`/`ServerConnection` variants, which encode and decode
//! directly into caller-owned byte buffers rather than through hidden
//! internal state, matching SPEC_FULL.md §4.2's description of I/O
//! "pulling from/pushing to buffers we own". Grounded on the `process!`
//! macro in the teacher crate's `src/unbuf.rs`.

use std::collections::VecDeque;
use std::sync::Arc;

use rustls::client::UnbufferedClientConnection;
use rustls::pki_types::ServerName;
use rustls::server::UnbufferedServerConnection;
use rustls::unbuffered::ConnectionState;
use rustls::{ClientConfig, ServerConfig};

use super::TlsAdapter;
use crate::buffer::CiphertextBuffer;
use crate::config::{ChannelConfig, Side};
use crate::error::AdapterError;

/// Rustls-unbuffered limitation the teacher crate already worked around:
/// after `Closed`, no further `WriteTraffic` states are produced, so any
/// already-queued-but-unencrypted outgoing bytes cannot be flushed. Nothing
/// to do about that at this layer; see `src/unbuf.rs` in the teacher crate
/// for the origin of this note.
const SPACE_HANDSHAKE: usize = 18 * 1024;
const SPACE_CLOSE_NOTIFY: usize = 1024;

macro_rules! impl_unbuffered_adapter {
    ($adapter:ident, $conn:ty, $is_server:tt) => {
        pub struct $adapter {
            conn: $conn,
            ingress: CiphertextBuffer,
            egress: CiphertextBuffer,
            decoded: VecDeque<u8>,
            peer_closed: bool,
            close_notify_queued: bool,
            handshake_done: bool,
        }

        impl $adapter {
            /// Drive handshake and record processing as far as possible,
            /// optionally encrypting `outgoing` application data or
            /// queuing a close_notify alert when the connection reaches a
            /// state that can accept it. Returns how many bytes of
            /// `outgoing` were consumed (0 or `outgoing.len()`, never a
            /// partial amount).
            fn drive(
                &mut self,
                mut outgoing: Option<&[u8]>,
                want_close_notify: bool,
            ) -> Result<usize, AdapterError> {
                let mut consumed = 0;
                loop {
                    let input = self.ingress.data_mut();
                    let input_len = input.len();
                    let status = self.conn.process_tls_records(input);
                    let mut discard = status.discard;
                    let state = status
                        .state
                        .map_err(|e| AdapterError::SslProtocol(e.to_string()))?;

                    match state {
                        ConnectionState::ReadTraffic(mut rt) => {
                            self.handshake_done = true;
                            while let Some(rec) = rt.next_record() {
                                let rec = rec
                                    .map_err(|e| AdapterError::SslProtocol(e.to_string()))?;
                                discard += rec.discard;
                                self.decoded.extend(rec.payload);
                            }
                        }
                        ConnectionState::ReadEarlyData(mut red) => {
                            if $is_server {
                                while let Some(rec) = red.next_record() {
                                    let rec = rec.map_err(|e| {
                                        AdapterError::SslProtocol(e.to_string())
                                    })?;
                                    discard += rec.discard;
                                    self.decoded.extend(rec.payload);
                                }
                            } else {
                                return Err(AdapterError::Unexpected(
                                    "unexpected early data on client connection".into(),
                                ));
                            }
                        }
                        ConnectionState::Closed => {
                            self.peer_closed = true;
                            self.ingress.consume(discard.min(input_len));
                            break;
                        }
                        ConnectionState::EncodeTlsData(mut etd) => {
                            let space = self.egress.reserve(SPACE_HANDSHAKE);
                            let len = etd
                                .encode(space)
                                .map_err(|e| AdapterError::SslProtocol(e.to_string()))?;
                            self.egress.commit(SPACE_HANDSHAKE, len);
                        }
                        ConnectionState::TransmitTlsData(ttd) => {
                            ttd.done();
                        }
                        ConnectionState::BlockedHandshake => {
                            self.ingress.consume(discard.min(input_len));
                            break;
                        }
                        ConnectionState::WriteTraffic(mut wt) => {
                            self.handshake_done = true;
                            if let Some(data) = outgoing.take() {
                                if !data.is_empty() {
                                    let room = data.len() + (data.len() >> 3).max(100);
                                    let space = self.egress.reserve(room);
                                    let written = wt
                                        .encrypt(data, space)
                                        .map_err(|e| AdapterError::SslProtocol(e.to_string()))?;
                                    self.egress.commit(room, written);
                                    consumed = data.len();
                                    self.ingress.consume(discard.min(input_len));
                                    discard = 0;
                                    continue;
                                }
                            }
                            if want_close_notify && !self.close_notify_queued {
                                let space = self.egress.reserve(SPACE_CLOSE_NOTIFY);
                                let written = wt.queue_close_notify(space).map_err(|e| {
                                    AdapterError::SslProtocol(e.to_string())
                                })?;
                                self.egress.commit(SPACE_CLOSE_NOTIFY, written);
                                self.close_notify_queued = true;
                                self.ingress.consume(discard.min(input_len));
                                discard = 0;
                                continue;
                            }
                            self.ingress.consume(discard.min(input_len));
                            break;
                        }
                        _ => {
                            return Err(AdapterError::Unexpected(format!(
                                "unexpected TLS state: {state:?}"
                            )))
                        }
                    }
                    self.ingress.consume(discard.min(input_len));
                }
                Ok(consumed)
            }
        }

        impl TlsAdapter for $adapter {
            fn ingress(&mut self) -> &mut CiphertextBuffer {
                &mut self.ingress
            }

            fn egress(&mut self) -> &mut CiphertextBuffer {
                &mut self.egress
            }

            fn is_handshake_complete(&self) -> bool {
                // No direct `is_handshaking` accessor on the unbuffered
                // connection types; track completion from the first
                // `ReadTraffic`/`WriteTraffic` state instead, which only
                // the handshake-complete connection state machine reaches.
                self.handshake_done
            }

            fn read_plaintext(&mut self, into: &mut [u8]) -> Result<Option<usize>, AdapterError> {
                self.drive(None, false)?;
                if self.decoded.is_empty() {
                    if self.peer_closed {
                        return Ok(Some(0));
                    }
                    return Ok(None);
                }
                let n = into.len().min(self.decoded.len());
                for slot in into.iter_mut().take(n) {
                    *slot = self.decoded.pop_front().expect("checked length above");
                }
                Ok(Some(n))
            }

            fn write_plaintext(&mut self, from: &[u8]) -> Result<Option<usize>, AdapterError> {
                let consumed = self.drive(Some(from), false)?;
                if consumed == 0 {
                    if self.peer_closed {
                        return Ok(Some(0));
                    }
                    return Ok(None);
                }
                debug_assert_eq!(consumed, from.len());
                Ok(Some(consumed))
            }

            fn shutdown(&mut self) -> Result<bool, AdapterError> {
                self.drive(None, true)?;
                Ok(self.close_notify_queued)
            }
        }
    };
}

impl_unbuffered_adapter!(UnbufferedClientAdapter, UnbufferedClientConnection, false);
impl_unbuffered_adapter!(UnbufferedServerAdapter, UnbufferedServerConnection, true);

impl UnbufferedClientAdapter {
    pub fn new(
        config: Arc<ClientConfig>,
        name: ServerName<'static>,
        channel_config: &ChannelConfig,
    ) -> Result<Self, rustls::Error> {
        debug_assert_eq!(channel_config.side, Side::Client);
        let conn = UnbufferedClientConnection::new(config, name)?;
        Ok(Self {
            conn,
            ingress: CiphertextBuffer::new(channel_config.soft_cap),
            egress: CiphertextBuffer::new(channel_config.soft_cap),
            decoded: VecDeque::new(),
            peer_closed: false,
            close_notify_queued: false,
            handshake_done: false,
        })
    }
}

impl UnbufferedServerAdapter {
    pub fn new(
        config: Arc<ServerConfig>,
        channel_config: &ChannelConfig,
    ) -> Result<Self, rustls::Error> {
        debug_assert_eq!(channel_config.side, Side::Server);
        let conn = UnbufferedServerConnection::new(config)?;
        Ok(Self {
            conn,
            ingress: CiphertextBuffer::new(channel_config.soft_cap),
            egress: CiphertextBuffer::new(channel_config.soft_cap),
            decoded: VecDeque::new(),
            peer_closed: false,
            close_notify_queued: false,
            handshake_done: false,
        })
    }
}
