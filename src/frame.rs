// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;

use bytes::{Buf, Bytes};
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError)]
pub enum ParseError {
    #[error("not enough data is available to parse an entire reply")]
    Incomplete,
    #[error("invalid reply type tag: {0:#04x}")]
    InvalidTypeTag(u8),
    #[error("{0}")]
    Malformed(String),
}

/// A single decoded server reply.
///
/// `Null` is the shared sentinel for a bulk reply of length -1 and a
/// multi-bulk reply of count -1. It is distinct from `Bulk("")` (a present
/// but empty value) and from `Array([])` (a present but empty sequence).
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Decode one reply from `src`, advancing the cursor past it.
    ///
    /// Returns `ParseError::Incomplete` when the buffer does not yet hold a
    /// whole reply; the caller is expected to read more bytes and retry from
    /// the same position. Any other error is fatal for the stream.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, ParseError> {
        // The first byte identifies the reply type; the rest of the line is
        // its payload (a message, an integer, or a length/count).
        let type_tag = get_byte(src)?;

        match type_tag {
            b'+' => {
                let line = get_line(src)?;
                let string = into_utf8(line)?;
                Ok(Frame::Simple(string))
            }
            b'-' => {
                let line = get_line(src)?;
                let string = into_utf8(line)?;
                Ok(Frame::Error(string))
            }
            b':' => {
                let line = get_line(src)?;
                let integer = parse_integer(line)?;
                Ok(Frame::Integer(integer))
            }
            // $<length>\r\n<data>\r\n
            b'$' => {
                let length = parse_integer(get_line(src)?)?;

                match length {
                    -1 => Ok(Frame::Null),
                    n if n < -1 => {
                        Err(ParseError::Malformed(format!("invalid bulk length {}", n)))
                    }
                    n => {
                        let data = get_exact(src, n as usize)?;
                        Ok(Frame::Bulk(data))
                    }
                }
            }
            // *<count>\r\n<element-1>...<element-n>
            b'*' => {
                let count = parse_integer(get_line(src)?)?;

                match count {
                    -1 => Ok(Frame::Null),
                    n if n < -1 => {
                        Err(ParseError::Malformed(format!("invalid array count {}", n)))
                    }
                    n => {
                        // Each element carries its own type tag and is decoded
                        // independently; nesting is unbounded.
                        let mut frames = Vec::with_capacity(n as usize);
                        for _ in 0..n {
                            frames.push(Self::parse(src)?);
                        }
                        Ok(Frame::Array(frames))
                    }
                }
            }
            tag => Err(ParseError::InvalidTypeTag(tag)),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(b'+');
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(b'-');
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let repr = i.to_string();
                let mut bytes = Vec::with_capacity(1 + repr.len() + CRLF.len());
                bytes.push(b':');
                bytes.extend_from_slice(repr.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Bulk(data) => {
                let length = data.len().to_string();
                let mut bytes =
                    Vec::with_capacity(1 + length.len() + CRLF.len() + data.len() + CRLF.len());
                bytes.push(b'$');
                bytes.extend_from_slice(length.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Null => b"$-1\r\n".to_vec(),
            Frame::Array(frames) => {
                let count = frames.len().to_string();
                let mut bytes = Vec::with_capacity(1 + count.len() + CRLF.len());
                bytes.push(b'*');
                bytes.extend_from_slice(count.as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in frames {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
        }
    }

    /// Short name of the reply shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "status",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(_) => "bulk",
            Frame::Null => "null",
            Frame::Array(_) => "array",
        }
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(i) => write!(f, "(integer) {}", i),
            Frame::Bulk(bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(frames) => {
                if frames.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, frame) in frames.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, frame)?;
                }
                Ok(())
            }
        }
    }
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, ParseError> {
    if !src.has_remaining() {
        return Err(ParseError::Incomplete);
    }
    Ok(src.get_u8())
}

/// Read up to the next CRLF, consuming the terminator but not returning it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ParseError> {
    let start = src.position() as usize;
    let end = src.get_ref().len();

    let line_end = src.get_ref()[start..end]
        .windows(CRLF.len())
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(ParseError::Incomplete)?;

    src.set_position((line_end + CRLF.len()) as u64);

    Ok(&src.get_ref()[start..line_end])
}

/// Read exactly `length` payload bytes plus the trailing CRLF.
///
/// Bulk payloads are binary safe and may themselves contain CRLF, so the
/// terminator is located by byte counting, never by scanning.
fn get_exact(src: &mut Cursor<&[u8]>, length: usize) -> Result<Bytes, ParseError> {
    let start = src.position() as usize;
    let remaining = &src.get_ref()[start..];

    if remaining.len() < length + CRLF.len() {
        return Err(ParseError::Incomplete);
    }
    if &remaining[length..length + CRLF.len()] != CRLF {
        return Err(ParseError::Malformed(
            "bulk payload not terminated by CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&remaining[..length]);
    src.set_position((start + length + CRLF.len()) as u64);

    Ok(data)
}

fn parse_integer(line: &[u8]) -> Result<i64, ParseError> {
    let string = std::str::from_utf8(line)
        .map_err(|_| ParseError::Malformed("non UTF-8 integer field".to_string()))?;
    string
        .parse::<i64>()
        .map_err(|_| ParseError::Malformed(format!("invalid integer field {:?}", string)))
}

fn into_utf8(line: &[u8]) -> Result<String, ParseError> {
    String::from_utf8(line.to_vec())
        .map_err(|_| ParseError::Malformed("non UTF-8 reply line".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> Result<Frame, ParseError> {
        let mut cursor = Cursor::new(data);
        Frame::parse(&mut cursor)
    }

    #[test]
    fn parse_status_reply() {
        let frame = parse(b"+OK\r\n");
        assert!(matches!(frame, Ok(Frame::Simple(ref s)) if s == "OK"));
    }

    #[test]
    fn parse_error_reply() {
        let frame = parse(b"-ERR unknown command\r\n");
        assert!(matches!(
            frame,
            Ok(Frame::Error(ref s)) if s == "ERR unknown command"
        ));
    }

    #[test]
    fn parse_integer_reply_positive() {
        assert!(matches!(parse(b":1000\r\n"), Ok(Frame::Integer(1000))));
    }

    #[test]
    fn parse_integer_reply_negative() {
        assert!(matches!(parse(b":-1000\r\n"), Ok(Frame::Integer(-1000))));
    }

    #[test]
    fn parse_integer_reply_zero() {
        assert!(matches!(parse(b":0\r\n"), Ok(Frame::Integer(0))));
    }

    #[test]
    fn parse_integer_reply_signed() {
        assert!(matches!(parse(b":+1000\r\n"), Ok(Frame::Integer(1000))));
    }

    #[test]
    fn parse_bulk_reply() {
        let frame = parse(b"$6\r\nfoobar\r\n");
        assert!(matches!(
            frame,
            Ok(Frame::Bulk(ref b)) if b == &Bytes::from("foobar")
        ));
    }

    #[test]
    fn parse_bulk_reply_empty_is_not_null() {
        let frame = parse(b"$0\r\n\r\n");
        assert!(matches!(
            frame,
            Ok(Frame::Bulk(ref b)) if b.is_empty()
        ));
    }

    #[test]
    fn parse_bulk_reply_null() {
        assert!(matches!(parse(b"$-1\r\n"), Ok(Frame::Null)));
    }

    #[test]
    fn parse_bulk_reply_with_embedded_crlf() {
        let frame = parse(b"$10\r\nfoo\r\nbar\r\n\r\n");
        assert!(matches!(
            frame,
            Ok(Frame::Bulk(ref b)) if b == &Bytes::from("foo\r\nbar\r\n")
        ));
    }

    #[test]
    fn parse_bulk_reply_binary() {
        let frame = parse(b"$4\r\n\x00\x01\xfe\xff\r\n");
        assert!(matches!(
            frame,
            Ok(Frame::Bulk(ref b)) if b == &Bytes::from_static(&[0x00, 0x01, 0xfe, 0xff])
        ));
    }

    #[test]
    fn parse_array_reply_empty_is_not_null() {
        let frame = parse(b"*0\r\n");
        assert!(matches!(frame, Ok(Frame::Array(ref a)) if a.is_empty()));
    }

    #[test]
    fn parse_array_reply_null() {
        assert!(matches!(parse(b"*-1\r\n"), Ok(Frame::Null)));
    }

    #[test]
    fn parse_array_reply() {
        let frame = parse(b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n").unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("hello")),
                Frame::Bulk(Bytes::from("world")),
            ])
        );
    }

    #[test]
    fn parse_array_reply_mixed_element_tags() {
        let frame = parse(b"*4\r\n:42\r\n$3\r\nfoo\r\n$-1\r\n+OK\r\n").unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Integer(42),
                Frame::Bulk(Bytes::from("foo")),
                Frame::Null,
                Frame::Simple("OK".to_string()),
            ])
        );
    }

    #[test]
    fn parse_array_reply_nested() {
        let frame = parse(b"*2\r\n*3\r\n:1\r\n:2\r\n:3\r\n*2\r\n+Hello\r\n-World\r\n").unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Array(vec![
                    Frame::Integer(1),
                    Frame::Integer(2),
                    Frame::Integer(3),
                ]),
                Frame::Array(vec![
                    Frame::Simple("Hello".to_string()),
                    Frame::Error("World".to_string()),
                ]),
            ])
        );
    }

    #[test]
    fn parse_incomplete_line() {
        assert!(matches!(parse(b"+OK"), Err(ParseError::Incomplete)));
    }

    #[test]
    fn parse_incomplete_bulk_payload() {
        assert!(matches!(parse(b"$10\r\nfoo"), Err(ParseError::Incomplete)));
    }

    #[test]
    fn parse_incomplete_array_tail() {
        assert!(matches!(
            parse(b"*2\r\n$3\r\nfoo\r\n"),
            Err(ParseError::Incomplete)
        ));
    }

    #[test]
    fn parse_unknown_type_tag() {
        assert!(matches!(
            parse(b"@whatever\r\n"),
            Err(ParseError::InvalidTypeTag(b'@'))
        ));
    }

    #[test]
    fn parse_invalid_bulk_length() {
        assert!(matches!(parse(b"$abc\r\n"), Err(ParseError::Malformed(_))));
        assert!(matches!(parse(b"$-2\r\n"), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn parse_bulk_missing_terminator() {
        assert!(matches!(
            parse(b"$3\r\nfooXY"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn serialize_round_trip() {
        let original = Frame::Array(vec![
            Frame::Simple("OK".to_string()),
            Frame::Integer(-3),
            Frame::Bulk(Bytes::from_static(b"a\r\nb")),
            Frame::Null,
            Frame::Array(vec![]),
        ]);

        let bytes = original.serialize();
        let mut cursor = Cursor::new(&bytes[..]);
        let parsed = Frame::parse(&mut cursor).unwrap();

        assert_eq!(parsed, original);
        assert_eq!(cursor.position() as usize, bytes.len());
    }
}
