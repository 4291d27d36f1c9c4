//! `MemoryBioBackend`: wraps Rustls's buffered `ClientConnection` /
//! `ServerConnection`, which manage their own internal record buffers and
//! are fed through `std::io::Read`/`Write`, exactly as the teacher crate's
//! `src/client.rs` / `src/server.rs` feed them through `PBufRdWr`.

use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection};

use super::TlsAdapter;
use crate::buffer::CiphertextBuffer;
use crate::config::{ChannelConfig, Side};
use crate::error::AdapterError;

/// Shared driving logic for both [`BufferedClientAdapter`] and
/// [`BufferedServerAdapter`], generated once per struct via
/// [`impl_buffered_adapter`] since Rustls's buffered connection methods
/// (`wants_read`, `wants_write`, `read_tls`, `write_tls`,
/// `process_new_packets`, `reader`, `writer`, `is_handshaking`,
/// `send_close_notify`) live on `ConnectionCommon<Data>` for two different
/// `Data` types without a shared trait object, the same constraint the
/// teacher crate works around with its own per-role structs.
macro_rules! impl_buffered_adapter {
    ($adapter:ident, $conn:ty) => {
        pub struct $adapter {
            conn: $conn,
            ingress: CiphertextBuffer,
            egress: CiphertextBuffer,
            close_notify_sent: bool,
        }

        impl $adapter {
            /// Drive the handshake and any queued ciphertext as far as
            /// possible without blocking: write out anything Rustls wants
            /// to send, and feed in anything buffered in `ingress`.
            fn pump(&mut self) -> Result<(), AdapterError> {
                loop {
                    let mut progress = false;
                    if self.conn.wants_write() {
                        let n = self
                            .conn
                            .write_tls(&mut self.egress)
                            .map_err(|e| AdapterError::Unexpected(e.to_string()))?;
                        progress |= n > 0;
                    }
                    if self.conn.wants_read() && !self.ingress.is_empty() {
                        self.conn
                            .read_tls(&mut self.ingress)
                            .map_err(|e| AdapterError::Unexpected(e.to_string()))?;
                        self.conn.process_new_packets()?;
                        progress = true;
                    }
                    if !progress {
                        return Ok(());
                    }
                }
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
                !self.conn.is_handshaking()
            }

            fn read_plaintext(&mut self, into: &mut [u8]) -> Result<Option<usize>, AdapterError> {
                self.pump()?;
                if self.conn.is_handshaking() {
                    return Ok(None);
                }
                match self.conn.reader().read(into) {
                    // Ok(0) means the peer sent close_notify: std::io::Read's
                    // clean-EOF convention, which Rustls's Reader follows
                    // deliberately for this exact case.
                    Ok(n) => Ok(Some(n)),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                    // Rustls deliberately reports the transport closing
                    // without a close_notify as `UnexpectedEof` rather than
                    // a clean `Ok(0)`, to make truncation attacks visible.
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        Err(AdapterError::UncleanClose)
                    }
                    Err(e) => Err(AdapterError::Unexpected(e.to_string())),
                }
            }

            fn write_plaintext(&mut self, from: &[u8]) -> Result<Option<usize>, AdapterError> {
                self.pump()?;
                if self.conn.is_handshaking() {
                    return Ok(None);
                }
                match self.conn.writer().write(from) {
                    Ok(n) => {
                        debug_assert_eq!(
                            n,
                            from.len(),
                            "Rustls's plaintext writer must not produce partial writes"
                        );
                        self.pump()?;
                        Ok(Some(n))
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                    Err(e) => Err(AdapterError::Unexpected(e.to_string())),
                }
            }

            fn shutdown(&mut self) -> Result<bool, AdapterError> {
                if !self.close_notify_sent {
                    self.conn.send_close_notify();
                    self.close_notify_sent = true;
                }
                self.pump()?;
                Ok(self.close_notify_sent && !self.conn.wants_write())
            }
        }
    };
}

impl_buffered_adapter!(BufferedClientAdapter, ClientConnection);
impl_buffered_adapter!(BufferedServerAdapter, ServerConnection);

impl BufferedClientAdapter {
    pub fn new(
        config: Arc<ClientConfig>,
        name: ServerName<'static>,
        channel_config: &ChannelConfig,
    ) -> Result<Self, rustls::Error> {
        debug_assert_eq!(channel_config.side, Side::Client);
        let conn = ClientConnection::new(config, name)?;
        Ok(Self {
            conn,
            ingress: CiphertextBuffer::new(channel_config.soft_cap),
            egress: CiphertextBuffer::new(channel_config.soft_cap),
            close_notify_sent: false,
        })
    }
}

impl BufferedServerAdapter {
    pub fn new(
        config: Arc<ServerConfig>,
        channel_config: &ChannelConfig,
    ) -> Result<Self, rustls::Error> {
        debug_assert_eq!(channel_config.side, Side::Server);
        let conn = ServerConnection::new(config)?;
        Ok(Self {
            conn,
            ingress: CiphertextBuffer::new(channel_config.soft_cap),
            egress: CiphertextBuffer::new(channel_config.soft_cap),
            close_notify_sent: false,
        })
    }
}
