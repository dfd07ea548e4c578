//! Framed packets over an async byte stream.
//!
//! Wraps one of the sans-IO [`Framing`]s around a socket, optionally inside
//! the obfuscation layer. [`Transport::recv`] keeps partial input in its own
//! buffer, so it can be dropped from a `select!` without losing bytes.

use std::io;

use mtcore_mtproto::transport::{Framing, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::TransportMode;
use crate::consts::READ_CHUNK;
use crate::errors::InvocationError;
use crate::transport_obfuscated::{self, Obfuscation};

pub struct Transport<S> {
    stream:      S,
    framing:     Box<dyn Framing>,
    obfuscation: Option<Obfuscation>,
    /// Decrypted bytes not yet unpacked.
    read_buf:    Vec<u8>,
    write_buf:   Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport<S> {
    /// Send the transport preamble and return the ready transport.
    pub async fn open(mut stream: S, mode: &TransportMode, dc_id: i16) -> io::Result<Self> {
        let framing = mode.kind().framing();
        let obfuscation = match mode {
            TransportMode::Obfuscated { secret } => {
                let (header, obfuscation) = transport_obfuscated::handshake(
                    framing.obfuscation_tag(),
                    dc_id,
                    secret.as_ref(),
                    mtcore_crypto::random_fill,
                );
                stream.write_all(&header).await?;
                Some(obfuscation)
            }
            _ => {
                let init = framing.init_bytes();
                if !init.is_empty() {
                    stream.write_all(init).await?;
                }
                None
            }
        };
        stream.flush().await?;
        Ok(Self {
            stream,
            framing,
            obfuscation,
            read_buf: Vec::with_capacity(READ_CHUNK),
            write_buf: Vec::new(),
        })
    }

    /// Frame and write one packet.
    pub async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.write_buf.clear();
        self.framing.pack(payload, &mut self.write_buf);
        if let Some(obfuscation) = self.obfuscation.as_mut() {
            obfuscation.encrypt(&mut self.write_buf);
        }
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await
    }

    /// The next whole packet. Cancel-safe.
    ///
    /// A bare negative status from the server comes back as
    /// [`TransportError::Status`].
    pub async fn recv(&mut self) -> Result<Vec<u8>, InvocationError> {
        loop {
            if let Some(unpacked) = self.framing.unpack(&self.read_buf)? {
                self.read_buf.drain(..unpacked.consumed);
                return Ok(unpacked.payload);
            }
            self.read_buf.reserve(READ_CHUNK);
            let before = self.read_buf.len();
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            if let Some(obfuscation) = self.obfuscation.as_mut() {
                obfuscation.decrypt(&mut self.read_buf[before..]);
            }
        }
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Whether `error` is the server telling us our auth key is unknown.
pub fn is_key_unknown(error: &InvocationError) -> bool {
    matches!(error, InvocationError::Transport(TransportError::Status { code: -404 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtcore_mtproto::transport::{Abridged, Intermediate};

    #[tokio::test]
    async fn intermediate_preamble_and_packets() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = Transport::open(client, &TransportMode::Intermediate, 2).await.unwrap();

        let mut init = [0u8; 4];
        server.read_exact(&mut init).await.unwrap();
        assert_eq!(init, [0xee; 4]);

        transport.send(&[1, 2, 3, 4]).await.unwrap();
        let mut framed = [0u8; 8];
        server.read_exact(&mut framed).await.unwrap();
        assert_eq!(framed, [4, 0, 0, 0, 1, 2, 3, 4]);

        // a packet split over several writes, followed by a second one
        let mut out = Vec::new();
        let mut framing = Intermediate;
        framing.pack(&[9u8; 40], &mut out);
        framing.pack(&[7u8; 8], &mut out);
        let (a, b) = out.split_at(10);
        server.write_all(a).await.unwrap();
        let reader = tokio::spawn(async move {
            let first = transport.recv().await.unwrap();
            let second = transport.recv().await.unwrap();
            (first, second)
        });
        server.write_all(b).await.unwrap();
        let (first, second) = reader.await.unwrap();
        assert_eq!(first, [9u8; 40]);
        assert_eq!(second, [7u8; 8]);
    }

    #[tokio::test]
    async fn negative_status_and_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = Transport::open(client, &TransportMode::Abridged, 2).await.unwrap();
        let mut init = [0u8; 1];
        server.read_exact(&mut init).await.unwrap();
        assert_eq!(init, [0xef]);

        let mut out = Vec::new();
        Abridged.pack(&(-404i32).to_le_bytes(), &mut out);
        server.write_all(&out).await.unwrap();
        let err = transport.recv().await.unwrap_err();
        assert!(is_key_unknown(&err));

        drop(server);
        assert!(matches!(transport.recv().await, Err(InvocationError::Io(_))));
    }

    #[tokio::test]
    async fn obfuscated_header_is_sent_first() {
        let (client, mut server) = tokio::io::duplex(256);
        let mode = TransportMode::Obfuscated { secret: None };
        let mut transport = Transport::open(client, &mode, 2).await.unwrap();
        transport.send(&[0u8; 8]).await.unwrap();

        let mut wire = [0u8; 64 + 9];
        server.read_exact(&mut wire).await.unwrap();
        // the abridged length byte and payload are not visible in clear
        assert_ne!(wire[64..], [2, 0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
