use std::collections::HashMap;

use bytes::Bytes;

static CRLF: &[u8; 2] = b"\r\n";

/// One formatted request argument.
///
/// `Simple` arguments are plain tokens (numbers, db indexes, fixed keywords)
/// that can travel on an inline command line. `Bulk` arguments are binary
/// safe and force the multi-bulk request encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Simple(String),
    Bulk(Bytes),
}

impl Arg {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Arg::Simple(s) => s.as_bytes(),
            Arg::Bulk(b) => b,
        }
    }

    /// Whether this argument can be space-joined on an inline command line
    /// without being re-tokenized or breaking the framing.
    fn inline_safe(&self) -> bool {
        match self {
            Arg::Simple(s) => {
                !s.is_empty() && !s.bytes().any(|b| b == b' ' || b == b'\r' || b == b'\n')
            }
            Arg::Bulk(_) => false,
        }
    }
}

/// A single outgoing command: keyword plus formatted arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    keyword: String,
    args: Vec<Arg>,
}

impl Request {
    pub fn new(keyword: impl Into<String>) -> Request {
        Request {
            keyword: keyword.into(),
            args: Vec::new(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Append every argument produced by `value`'s formatter.
    pub fn append<A: ToArgs + ?Sized>(&mut self, value: &A) -> &mut Request {
        value.write_args(&mut self.args);
        self
    }

    pub fn push(&mut self, arg: Arg) -> &mut Request {
        self.args.push(arg);
        self
    }

    /// Encode the request for the wire.
    ///
    /// The inline form (`KEYWORD a b c\r\n`) is chosen only when every
    /// argument is a simple token free of protocol-significant bytes; a
    /// single bulk argument switches the whole request to the multi-bulk
    /// array form, because space-joining breaks on embedded whitespace or
    /// newlines.
    pub fn encode(&self) -> Bytes {
        if self.args.iter().all(Arg::inline_safe) {
            self.encode_inline()
        } else {
            self.encode_array()
        }
    }

    fn encode_inline(&self) -> Bytes {
        let mut out = Vec::with_capacity(self.keyword.len() + 16 * self.args.len() + CRLF.len());
        out.extend_from_slice(self.keyword.as_bytes());
        for arg in &self.args {
            out.push(b' ');
            out.extend_from_slice(arg.as_bytes());
        }
        out.extend_from_slice(CRLF);
        Bytes::from(out)
    }

    // *<argcount>\r\n$<len>\r\n<arg>\r\n...
    fn encode_array(&self) -> Bytes {
        let mut out = Vec::new();
        out.push(b'*');
        out.extend_from_slice((1 + self.args.len()).to_string().as_bytes());
        out.extend_from_slice(CRLF);

        push_bulk(&mut out, self.keyword.as_bytes());
        for arg in &self.args {
            push_bulk(&mut out, arg.as_bytes());
        }
        Bytes::from(out)
    }
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'$');
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}

/// Argument marshalling: each implementation appends zero or more formatted
/// arguments to the outgoing request.
///
/// Scalar strings and byte strings format as bulk (binary safe) arguments;
/// numbers format as simple tokens; collections format as one bulk per
/// element; key/value mappings flatten to alternating bulk pairs.
pub trait ToArgs {
    fn write_args(&self, out: &mut Vec<Arg>);
}

impl ToArgs for str {
    fn write_args(&self, out: &mut Vec<Arg>) {
        out.push(Arg::Bulk(Bytes::copy_from_slice(self.as_bytes())));
    }
}

impl ToArgs for &str {
    fn write_args(&self, out: &mut Vec<Arg>) {
        (**self).write_args(out);
    }
}

impl ToArgs for String {
    fn write_args(&self, out: &mut Vec<Arg>) {
        self.as_str().write_args(out);
    }
}

impl ToArgs for Bytes {
    fn write_args(&self, out: &mut Vec<Arg>) {
        out.push(Arg::Bulk(self.clone()));
    }
}

impl ToArgs for [u8] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        out.push(Arg::Bulk(Bytes::copy_from_slice(self)));
    }
}

impl ToArgs for &[u8] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        (**self).write_args(out);
    }
}

macro_rules! to_args_integer {
    ($($t:ty),* $(,)?) => {
        $(
            impl ToArgs for $t {
                fn write_args(&self, out: &mut Vec<Arg>) {
                    out.push(Arg::Simple(self.to_string()));
                }
            }
        )*
    };
}

to_args_integer!(i16, i32, i64, isize, u16, u32, u64, usize);

impl ToArgs for f64 {
    fn write_args(&self, out: &mut Vec<Arg>) {
        // `{}` prints infinities as "inf"/"-inf", which the server accepts
        // as score range bounds.
        out.push(Arg::Simple(format!("{}", self)));
    }
}

impl ToArgs for f32 {
    fn write_args(&self, out: &mut Vec<Arg>) {
        (*self as f64).write_args(out);
    }
}

// Variadic trailing arguments: one bulk per element.

impl<'a> ToArgs for [&'a str] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        for item in self {
            item.write_args(out);
        }
    }
}

impl<'a, 'b> ToArgs for &'a [&'b str] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        (**self).write_args(out);
    }
}

impl<'a> ToArgs for Vec<&'a str> {
    fn write_args(&self, out: &mut Vec<Arg>) {
        self.as_slice().write_args(out);
    }
}

impl ToArgs for [String] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        for item in self {
            item.write_args(out);
        }
    }
}

impl<'a> ToArgs for &'a [String] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        (**self).write_args(out);
    }
}

impl ToArgs for Vec<String> {
    fn write_args(&self, out: &mut Vec<Arg>) {
        self.as_slice().write_args(out);
    }
}

impl ToArgs for [Bytes] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        for item in self {
            item.write_args(out);
        }
    }
}

impl<'a> ToArgs for &'a [Bytes] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        (**self).write_args(out);
    }
}

impl ToArgs for Vec<Bytes> {
    fn write_args(&self, out: &mut Vec<Arg>) {
        self.as_slice().write_args(out);
    }
}

// Key/value mappings: flattened to alternating key, value arguments, each
// bulk encoded. Slices keep caller order; maps iterate in map order.

impl<'a, 'b, 'c> ToArgs for &'a [(&'b str, &'c str)] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        for (key, value) in self.iter() {
            key.write_args(out);
            value.write_args(out);
        }
    }
}

impl<'a, 'b> ToArgs for &'a [(&'b str, Bytes)] {
    fn write_args(&self, out: &mut Vec<Arg>) {
        for (key, value) in self.iter() {
            key.write_args(out);
            value.write_args(out);
        }
    }
}

impl ToArgs for HashMap<String, String> {
    fn write_args(&self, out: &mut Vec<Arg>) {
        for (key, value) in self {
            key.write_args(out);
            value.write_args(out);
        }
    }
}

impl ToArgs for HashMap<String, Bytes> {
    fn write_args(&self, out: &mut Vec<Arg>) {
        for (key, value) in self {
            key.write_args(out);
            value.write_args(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_inline_no_arguments() {
        let req = Request::new("PING");
        assert_eq!(&req.encode()[..], b"PING\r\n");
    }

    #[test]
    fn encode_inline_simple_arguments() {
        let mut req = Request::new("SELECT");
        req.append(&2u16);
        assert_eq!(&req.encode()[..], b"SELECT 2\r\n");
    }

    #[test]
    fn encode_array_for_bulk_arguments() {
        let mut req = Request::new("SET");
        req.append(&"key");
        req.append(&"value");
        assert_eq!(
            &req.encode()[..],
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n"
        );
    }

    #[test]
    fn encode_array_preserves_embedded_crlf() {
        let mut req = Request::new("SET");
        req.append(&"key");
        req.append(&"a\r\nb c");
        assert_eq!(
            &req.encode()[..],
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\na\r\nb c\r\n"
        );
    }

    #[test]
    fn encode_array_binary_value() {
        let mut req = Request::new("SET");
        req.append(&"k");
        req.append(&Bytes::from_static(&[0x00, 0xff, 0x0d, 0x0a]));
        assert_eq!(
            &req.encode()[..],
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$4\r\n\x00\xff\x0d\x0a\r\n"
        );
    }

    #[test]
    fn unsafe_simple_token_forces_array_encoding() {
        let mut req = Request::new("ECHO");
        req.push(Arg::Simple("two words".to_string()));
        assert_eq!(
            &req.encode()[..],
            b"*2\r\n$4\r\nECHO\r\n$9\r\ntwo words\r\n"
        );
    }

    #[test]
    fn empty_simple_token_forces_array_encoding() {
        let mut req = Request::new("ECHO");
        req.push(Arg::Simple(String::new()));
        assert_eq!(&req.encode()[..], b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n");
    }

    #[test]
    fn list_arguments_flatten_in_order() {
        let mut req = Request::new("DEL");
        req.append(&["a", "b", "c"][..]);
        assert_eq!(req.arg_count(), 3);
        assert_eq!(
            &req.encode()[..],
            b"*4\r\n$3\r\nDEL\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n"
        );
    }

    #[test]
    fn mapping_arguments_flatten_to_pairs() {
        let mut req = Request::new("MSET");
        req.append(&&[("k1", "v1"), ("k2", "v2")][..]);
        assert_eq!(req.arg_count(), 4);
        assert_eq!(
            &req.encode()[..],
            b"*5\r\n$4\r\nMSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n$2\r\nk2\r\n$2\r\nv2\r\n"
        );
    }

    #[test]
    fn integer_and_float_arguments_are_simple_tokens() {
        let mut req = Request::new("ZINCRBY");
        req.append(&1.5f64);
        req.append(&-7i64);
        assert_eq!(&req.encode()[..], b"ZINCRBY 1.5 -7\r\n");
    }
}
