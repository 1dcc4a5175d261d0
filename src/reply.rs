use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use itertools::Itertools;

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Result of dispatching one command.
///
/// `Queued` means no reply is available yet: either the command was appended
/// to an active client-side pipeline, or the server answered with the
/// `+QUEUED` placeholder inside a `MULTI` bracket. In both cases the real
/// reply is produced later (by draining the pipeline, or by `EXEC`) and the
/// usual reply conversion is bypassed.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    Done(T),
    Queued,
}

impl<T> Outcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, Outcome::Queued)
    }

    /// Unwrap the converted reply, failing if the command was queued.
    pub fn value(self) -> Result<T> {
        match self {
            Outcome::Done(value) => Ok(value),
            Outcome::Queued => Err(Error::PipelineActive),
        }
    }
}

/// Reply post-processing: a pure conversion from a decoded [`Frame`] to the
/// domain-level value a command returns (integer 0/1 to bool, flat
/// key/value array to a map, null to `None`, and so on).
pub trait FromReply: Sized {
    fn from_reply(frame: Frame) -> Result<Self>;
}

/// Surface a server error reply as a failure value, stripping the generic
/// `ERR ` code prefix the server puts in front of ad-hoc messages.
pub(crate) fn server_error(message: String) -> Error {
    let message = message
        .strip_prefix("ERR ")
        .map(str::to_string)
        .unwrap_or(message);
    Error::Server(message)
}

fn unexpected(expected: &'static str, frame: &Frame) -> Error {
    Error::UnexpectedReply {
        expected,
        actual: frame.kind(),
    }
}

/// Reject error frames before conversion; conversions past this point only
/// see the four value-carrying shapes plus null.
fn check_error(frame: Frame) -> Result<Frame> {
    match frame {
        Frame::Error(message) => Err(server_error(message)),
        frame => Ok(frame),
    }
}

impl FromReply for Frame {
    fn from_reply(frame: Frame) -> Result<Self> {
        check_error(frame)
    }
}

impl FromReply for () {
    fn from_reply(frame: Frame) -> Result<Self> {
        check_error(frame).map(|_| ())
    }
}

impl FromReply for bool {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Integer(0) => Ok(false),
            Frame::Integer(_) => Ok(true),
            Frame::Simple(_) => Ok(true),
            Frame::Null => Ok(false),
            frame => Err(unexpected("integer", &frame)),
        }
    }
}

impl FromReply for i64 {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Integer(i) => Ok(i),
            Frame::Simple(s) => s.parse().map_err(|_| Error::UnexpectedReply {
                expected: "integer",
                actual: "status",
            }),
            Frame::Bulk(b) => std::str::from_utf8(&b)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(Error::UnexpectedReply {
                    expected: "integer",
                    actual: "bulk",
                }),
            frame => Err(unexpected("integer", &frame)),
        }
    }
}

impl FromReply for f64 {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Integer(i) => Ok(i as f64),
            Frame::Bulk(b) => std::str::from_utf8(&b)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(Error::UnexpectedReply {
                    expected: "float",
                    actual: "bulk",
                }),
            Frame::Simple(s) => s.parse().map_err(|_| Error::UnexpectedReply {
                expected: "float",
                actual: "status",
            }),
            frame => Err(unexpected("float", &frame)),
        }
    }
}

impl FromReply for String {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(b) => String::from_utf8(b.to_vec()).map_err(|_| Error::UnexpectedReply {
                expected: "utf-8 string",
                actual: "bulk",
            }),
            Frame::Integer(i) => Ok(i.to_string()),
            frame => Err(unexpected("string", &frame)),
        }
    }
}

impl FromReply for Bytes {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Bulk(b) => Ok(b),
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Integer(i) => Ok(Bytes::from(i.to_string())),
            frame => Err(unexpected("bulk", &frame)),
        }
    }
}

impl<T: FromReply> FromReply for Option<T> {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Null => Ok(None),
            frame => T::from_reply(frame).map(Some),
        }
    }
}

impl<T: FromReply> FromReply for Vec<T> {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Array(frames) => frames.into_iter().map(T::from_reply).collect(),
            frame => Err(unexpected("array", &frame)),
        }
    }
}

impl FromReply for HashSet<Bytes> {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Array(frames) => frames.into_iter().map(Bytes::from_reply).collect(),
            frame => Err(unexpected("array", &frame)),
        }
    }
}

impl FromReply for HashSet<String> {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Array(frames) => frames.into_iter().map(String::from_reply).collect(),
            frame => Err(unexpected("array", &frame)),
        }
    }
}

// Flat alternating key/value arrays (HGETALL, CONFIG GET).

impl FromReply for HashMap<String, Bytes> {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Array(frames) => frames
                .into_iter()
                .tuples()
                .map(|(key, value)| Ok((String::from_reply(key)?, Bytes::from_reply(value)?)))
                .collect(),
            frame => Err(unexpected("array", &frame)),
        }
    }
}

impl FromReply for HashMap<String, String> {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Array(frames) => frames
                .into_iter()
                .tuples()
                .map(|(key, value)| Ok((String::from_reply(key)?, String::from_reply(value)?)))
                .collect(),
            frame => Err(unexpected("array", &frame)),
        }
    }
}

// Flat member/score arrays (WITHSCORES range queries).

impl FromReply for Vec<(Bytes, f64)> {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Array(frames) => frames
                .into_iter()
                .tuples()
                .map(|(member, score)| Ok((Bytes::from_reply(member)?, f64::from_reply(score)?)))
                .collect(),
            frame => Err(unexpected("array", &frame)),
        }
    }
}

// Key/element pairs from the blocking pop commands.

impl FromReply for (String, Bytes) {
    fn from_reply(frame: Frame) -> Result<Self> {
        match check_error(frame)? {
            Frame::Array(frames) if frames.len() == 2 => {
                let mut frames = frames.into_iter();
                match (frames.next(), frames.next()) {
                    (Some(key), Some(element)) => {
                        Ok((String::from_reply(key)?, Bytes::from_reply(element)?))
                    }
                    _ => Err(Error::Protocol("truncated key/element pair".to_string())),
                }
            }
            frame => Err(unexpected("two element array", &frame)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_one_converts_to_true() {
        assert_eq!(bool::from_reply(Frame::Integer(1)).unwrap(), true);
        assert_eq!(bool::from_reply(Frame::Integer(0)).unwrap(), false);
    }

    #[test]
    fn status_converts_to_true() {
        assert_eq!(bool::from_reply(Frame::Simple("OK".into())).unwrap(), true);
    }

    #[test]
    fn null_converts_to_none_not_empty() {
        assert_eq!(Option::<Bytes>::from_reply(Frame::Null).unwrap(), None);
        assert_eq!(
            Option::<Bytes>::from_reply(Frame::Bulk(Bytes::new())).unwrap(),
            Some(Bytes::new())
        );
    }

    #[test]
    fn flat_array_converts_to_map() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("name")),
            Frame::Bulk(Bytes::from("sam")),
            Frame::Bulk(Bytes::from("age")),
            Frame::Bulk(Bytes::from("33")),
        ]);

        let map = HashMap::<String, Bytes>::from_reply(frame).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["name"], Bytes::from("sam"));
        assert_eq!(map["age"], Bytes::from("33"));
    }

    #[test]
    fn flat_array_converts_to_set() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("a")),
            Frame::Bulk(Bytes::from("b")),
            Frame::Bulk(Bytes::from("a")),
        ]);

        let set = HashSet::<Bytes>::from_reply(frame).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains(&Bytes::from("a")));
    }

    #[test]
    fn member_score_pairs() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("one")),
            Frame::Bulk(Bytes::from("1")),
            Frame::Bulk(Bytes::from("two")),
            Frame::Bulk(Bytes::from("2.5")),
        ]);

        let pairs = Vec::<(Bytes, f64)>::from_reply(frame).unwrap();

        assert_eq!(
            pairs,
            vec![(Bytes::from("one"), 1.0), (Bytes::from("two"), 2.5)]
        );
    }

    #[test]
    fn nullable_elements_inside_array() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("1")),
            Frame::Null,
            Frame::Bulk(Bytes::from("3")),
        ]);

        let values = Vec::<Option<Bytes>>::from_reply(frame).unwrap();

        assert_eq!(
            values,
            vec![Some(Bytes::from("1")), None, Some(Bytes::from("3"))]
        );
    }

    #[test]
    fn error_reply_surfaces_as_server_error_with_code_stripped() {
        let err = i64::from_reply(Frame::Error("ERR value is not an integer".into()));
        assert!(matches!(err, Err(Error::Server(ref m)) if m == "value is not an integer"));
    }

    #[test]
    fn mismatched_shape_is_reported() {
        let err = i64::from_reply(Frame::Array(vec![]));
        assert!(matches!(
            err,
            Err(Error::UnexpectedReply {
                expected: "integer",
                actual: "array",
            })
        ));
    }

    #[test]
    fn queued_outcome_refuses_value() {
        let outcome: Outcome<i64> = Outcome::Queued;
        assert!(outcome.is_queued());
        assert!(matches!(outcome.value(), Err(Error::PipelineActive)));
    }
}
