use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::codec::ReplyCodec;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// One established transport to the server.
///
/// Owns the socket and the receive buffer. Data is read from the socket into
/// the buffer; once a whole reply has accumulated it is decoded and removed.
/// All reads and writes are awaited, which is the library's only suspension
/// point: under a cooperative scheduler a would-block simply yields here.
pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    codec: ReplyCodec,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Connection> {
        let stream = TcpStream::connect(addr).await?;
        // The protocol is latency sensitive and requests are small; never
        // let the kernel batch them.
        stream.set_nodelay(true)?;

        debug!(peer = addr, "connection established");

        Ok(Connection {
            stream,
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
            codec: ReplyCodec,
        })
    }

    /// Decode exactly one reply, reading from the socket as many times as it
    /// takes for a whole reply to accumulate.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(frame);
            }

            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(classify_io_error)?;
            if read == 0 {
                // Peer closed. Mid-reply this means the stream died between
                // chunks; either way the transport is gone.
                return if self.buffer.is_empty() {
                    Err(Error::ConnectionClosed)
                } else {
                    Err(Error::Protocol(
                        "connection closed mid-reply".to_string(),
                    ))
                };
            }
        }
    }

    /// One write call for the whole payload; pipeline batches rely on this
    /// being a single transmission.
    pub async fn write_all(&mut self, payload: &[u8]) -> Result<()> {
        self.stream
            .write_all(payload)
            .await
            .map_err(classify_io_error)
    }
}

/// Peer-closed failures get their own error subtype so the caller can apply
/// the reconnect-once policy; everything else stays an io error.
fn classify_io_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
        _ => Error::Io(err),
    }
}
