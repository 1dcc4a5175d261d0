use std::io;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for client operations.
///
/// Every public operation returns `Result<_, Error>`; errors are values,
/// never panics across the library boundary.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Transport failure other than a clean closure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection. Outside of a pipeline this triggers
    /// the reconnect-once policy; inside a pipeline it is surfaced as is.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// No transport is established. The next non-pipelined command will
    /// attempt a single reconnect.
    #[error("connection is not established")]
    NotConnected,

    /// A reply could not be decoded: unrecognized type tag, unparseable
    /// length field or malformed framing. The stream position is unreliable
    /// after this; no recovery is attempted.
    #[error("protocol error; {0}")]
    Protocol(String),

    /// A well-formed error reply from the server. The connection remains
    /// usable.
    #[error("server error; {0}")]
    Server(String),

    /// A caller-supplied argument failed validation before any bytes were
    /// written to the wire.
    #[error("invalid argument; {0}")]
    InvalidArgument(String),

    /// The decoded reply does not fit the return type declared for the
    /// command.
    #[error("unexpected reply; expected {expected}, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: &'static str,
    },

    /// A pipeline is already active, or is still draining replies.
    #[error("pipeline already active")]
    PipelineActive,

    /// A pipeline operation was invoked with no pipeline active.
    #[error("no pipeline active")]
    NotPipelining,

    /// More pipeline replies were requested than commands were sent.
    #[error("excess pipeline replies requested")]
    ExcessPipelineReplies,
}

impl Error {
    /// Whether the transport should be considered gone after this error.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::ConnectionClosed | Error::NotConnected)
    }
}
