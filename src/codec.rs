use std::io::Cursor;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;
use crate::frame::{Frame, ParseError};
use crate::request::Request;

/// Hard ceiling on the bytes buffered for a single reply.
const MAX_REPLY_SIZE: usize = 512 * 1024 * 1024;

/// Stream codec for the client side of the protocol: decodes one server
/// reply at a time out of the receive buffer and encodes outgoing requests.
///
/// Decoding is incremental: a partially received reply leaves the buffer
/// untouched and yields `None`, so the transport can append more bytes and
/// try again. This is what lets replies span arbitrarily chunked reads.
pub struct ReplyCodec;

impl Decoder for ReplyCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() > MAX_REPLY_SIZE {
            return Err(Error::Protocol("reply exceeds size limit".to_string()));
        }

        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            // Not enough data buffered yet to parse an entire reply.
            Err(ParseError::Incomplete) => return Ok(None),
            Err(err) => return Err(Error::Protocol(err.to_string())),
        };

        // Remove the parsed reply from the buffer.
        let position = cursor.position() as usize;
        src.advance(position);

        Ok(Some(frame))
    }
}

impl Encoder<Request> for ReplyCodec {
    type Error = Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn decode_whole_reply() {
        let mut codec = ReplyCodec;
        let mut buf = BytesMut::from(&b"+OK\r\n"[..]);

        let frame = codec.decode(&mut buf).unwrap();

        assert_eq!(frame, Some(Frame::Simple("OK".to_string())));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_reply_leaves_buffer() {
        let mut codec = ReplyCodec;
        let mut buf = BytesMut::from(&b"$10\r\nfoo"[..]);

        let frame = codec.decode(&mut buf).unwrap();

        assert_eq!(frame, None);
        assert_eq!(&buf[..], b"$10\r\nfoo");
    }

    #[test]
    fn decode_across_chunk_boundaries() {
        let mut codec = ReplyCodec;
        let reply = b"*2\r\n$5\r\nhello\r\n:42\r\n";
        let mut buf = BytesMut::new();

        // Feed the reply one byte at a time; only the final byte completes it.
        for (i, byte) in reply.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let decoded = codec.decode(&mut buf).unwrap();
            if i < reply.len() - 1 {
                assert_eq!(decoded, None);
            } else {
                assert_eq!(
                    decoded,
                    Some(Frame::Array(vec![
                        Frame::Bulk(Bytes::from("hello")),
                        Frame::Integer(42),
                    ]))
                );
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_consumes_one_reply_per_call() {
        let mut codec = ReplyCodec;
        let mut buf = BytesMut::from(&b"+OK\r\n:7\r\n$-1\r\n"[..]);

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Simple("OK".to_string()))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Integer(7)));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Null));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn decode_malformed_reply_is_fatal() {
        let mut codec = ReplyCodec;
        let mut buf = BytesMut::from(&b"@nope\r\n"[..]);

        assert!(matches!(codec.decode(&mut buf), Err(Error::Protocol(_))));
    }

    #[test]
    fn encode_request() {
        let mut codec = ReplyCodec;
        let mut buf = BytesMut::new();
        let mut req = Request::new("GET");
        req.append(&"key");

        codec.encode(req, &mut buf).unwrap();

        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
    }
}
