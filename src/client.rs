use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::pipeline::PipelineState;
use crate::reply::{server_error, FromReply, Outcome};
use crate::request::Request;
use crate::request::ToArgs;

/// A client session against one server.
///
/// A client is single-flight by construction: every operation takes
/// `&mut self`, so two commands can never race on the transport or on the
/// pipeline queue. Callers wanting concurrency open one client per task.
pub struct Client {
    id: Uuid,
    addr: String,
    connection: Option<Connection>,
    pipeline: Option<PipelineState>,
    in_multi: bool,
    /// Currently selected database, replayed after a reconnect so the new
    /// session matches the one that was lost.
    db: u16,
}

impl Client {
    /// Connect to a server at `host:port`.
    pub async fn connect(addr: impl Into<String>) -> Result<Client> {
        let addr = addr.into();
        let connection = Connection::connect(&addr).await?;
        let client = Client {
            id: Uuid::new_v4(),
            addr,
            connection: Some(connection),
            pipeline: None,
            in_multi: false,
            db: 0,
        };

        debug!(client = %client.id, peer = %client.addr, "client connected");

        Ok(client)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Send an ad-hoc command and return its raw decoded reply.
    ///
    /// The typed command methods are generated from a declarative table and
    /// all funnel through the same path; this entry point is for commands
    /// the table does not cover.
    pub async fn command(&mut self, request: Request) -> Result<Outcome<Frame>> {
        self.dispatch_typed(request).await
    }

    /// Dispatch one command and convert its reply for the declared return
    /// type. Inside a `MULTI` bracket the server defers execution and
    /// answers `+QUEUED`; that placeholder is passed through untransformed,
    /// exactly like a client-side pipeline queueing.
    pub(crate) async fn dispatch_typed<T: FromReply>(
        &mut self,
        request: Request,
    ) -> Result<Outcome<T>> {
        match self.dispatch(request).await? {
            None => Ok(Outcome::Queued),
            Some(Frame::Simple(ref s)) if self.in_multi && s == "QUEUED" => Ok(Outcome::Queued),
            Some(frame) => Ok(Outcome::Done(T::from_reply(frame)?)),
        }
    }

    /// Send one request and decode one reply, unless a pipeline is active,
    /// in which case the encoded request is queued and `None` is returned.
    pub(crate) async fn dispatch(&mut self, request: Request) -> Result<Option<Frame>> {
        let payload = request.encode();

        if let Some(pipeline) = self.pipeline.as_mut() {
            if pipeline.is_draining() {
                return Err(Error::PipelineActive);
            }
            pipeline.enqueue(payload);
            debug!(client = %self.id, command = request.keyword(), "command queued in pipeline");
            return Ok(None);
        }

        debug!(client = %self.id, command = request.keyword(), "dispatching command");

        match self.roundtrip(&payload).await? {
            Frame::Error(message) => Err(server_error(message)),
            frame => Ok(Some(frame)),
        }
    }

    /// One write, one decoded reply, with the reconnect-once policy: a
    /// peer-closed failure triggers a single transparent reconnect (and
    /// database re-selection) followed by one retry of the same operation.
    /// A second failure is reported as is.
    async fn roundtrip(&mut self, payload: &Bytes) -> Result<Frame> {
        match self.try_roundtrip(payload).await {
            Err(err) if err.is_disconnect() => {
                debug!(client = %self.id, "transport lost; reconnecting once");
                self.reconnect().await?;
                self.try_roundtrip(payload).await
            }
            other => other,
        }
    }

    async fn try_roundtrip(&mut self, payload: &[u8]) -> Result<Frame> {
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
        connection.write_all(payload).await?;
        connection.read_frame().await
    }

    /// Send a reply-less command (the pub/sub control commands): a
    /// successful write completes the operation, with the same
    /// reconnect-once policy as a full roundtrip.
    pub(crate) async fn send_only(&mut self, request: Request) -> Result<()> {
        let payload = request.encode();
        debug!(client = %self.id, command = request.keyword(), "sending reply-less command");

        match self.try_send(&payload).await {
            Err(err) if err.is_disconnect() && self.pipeline.is_none() => {
                self.reconnect().await?;
                self.try_send(&payload).await
            }
            other => other,
        }
    }

    async fn try_send(&mut self, payload: &[u8]) -> Result<()> {
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
        connection.write_all(payload).await
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.connection = None;
        let mut connection = Connection::connect(&self.addr).await?;

        // Restore the selected database before anything else goes over the
        // new transport.
        if self.db != 0 {
            let mut select = Request::new("SELECT");
            select.append(&self.db);
            connection.write_all(&select.encode()).await?;
            if let Frame::Error(message) = connection.read_frame().await? {
                return Err(server_error(message));
            }
        }

        self.connection = Some(connection);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Select the logical database to operate on. The index is remembered
    /// and re-issued transparently after a reconnect.
    ///
    /// Ref: <https://redis.io/docs/latest/commands/select>
    pub async fn select(&mut self, index: u16) -> Result<Outcome<()>> {
        let mut request = Request::new("SELECT");
        request.append(&index);
        let outcome = self.dispatch_typed(request).await?;
        self.db = index;
        Ok(outcome)
    }

    /// Close the session. The peer is expected to close its end right after
    /// acknowledging, so losing the race to its FIN is not a failure.
    pub async fn quit(&mut self) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };

        let payload = Request::new("QUIT").encode();
        match connection.write_all(&payload).await {
            Ok(()) => {
                let _ = connection.read_frame().await;
            }
            Err(Error::ConnectionClosed) => {}
            Err(err) => {
                self.connection = None;
                return Err(err);
            }
        }

        self.connection = None;
        Ok(())
    }

    /// Stop the server. On success the server never replies; the connection
    /// just closes.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::NotConnected);
        };

        connection.write_all(&Request::new("SHUTDOWN").encode()).await?;
        let result = match connection.read_frame().await {
            Err(Error::ConnectionClosed) => Ok(()),
            Ok(Frame::Error(message)) => Err(server_error(message)),
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };

        self.connection = None;
        result
    }

    // ------------------------------------------------------------------
    // Pipelining
    // ------------------------------------------------------------------

    /// Enter pipeline mode: subsequent commands are encoded and queued
    /// instead of transmitted, and report [`Outcome::Queued`].
    pub fn pipeline(&mut self) -> Result<()> {
        if self.pipeline.is_some() {
            return Err(Error::PipelineActive);
        }
        self.pipeline = Some(PipelineState::new());
        Ok(())
    }

    /// Number of commands queued and not yet flushed.
    pub fn queued_commands(&self) -> usize {
        self.pipeline
            .as_ref()
            .map(PipelineState::queued_count)
            .unwrap_or(0)
    }

    /// Number of flushed commands whose replies have not been drained yet.
    pub fn pending_replies(&self) -> usize {
        self.pipeline
            .as_ref()
            .map(PipelineState::pending_count)
            .unwrap_or(0)
    }

    /// Abandon a pipeline that has not been flushed.
    pub fn cancel_pipeline(&mut self) -> Result<()> {
        match self.pipeline.as_ref() {
            None => Err(Error::NotPipelining),
            // Replies are already in flight; they must be drained.
            Some(state) if state.is_draining() => Err(Error::PipelineActive),
            Some(_) => {
                self.pipeline = None;
                Ok(())
            }
        }
    }

    /// Transmit the whole queue as a single write and switch to draining.
    ///
    /// On a write failure the queue and count are preserved untouched: some
    /// of the batch may already have taken effect server side, so whether to
    /// retry the flush or abandon the pipeline is the caller's call, never
    /// made silently here. Returns the number of replies now owed.
    pub async fn flush_pipeline(&mut self) -> Result<usize> {
        let count;
        let payload;
        {
            let pipeline = self.pipeline.as_ref().ok_or(Error::NotPipelining)?;
            if pipeline.is_draining() {
                return Err(Error::PipelineActive);
            }
            count = pipeline.queued_count();
            if count == 0 {
                self.pipeline = None;
                return Ok(0);
            }
            payload = pipeline.batch();
        }

        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
        connection.write_all(&payload).await?;

        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.mark_sent();
        }
        debug!(client = %self.id, commands = count, "pipeline flushed");

        Ok(count)
    }

    /// Drain the next pipelined reply, in send order. Once the last owed
    /// reply is drained the connection returns to normal request/reply
    /// operation. Asking for more replies than were sent is an error.
    pub async fn next_reply(&mut self) -> Result<Frame> {
        match self.pipeline.as_ref() {
            Some(state) if state.is_draining() => {}
            _ => return Err(Error::ExcessPipelineReplies),
        }

        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
        let frame = connection.read_frame().await?;

        if let Some(pipeline) = self.pipeline.as_mut() {
            if pipeline.mark_drained() {
                self.pipeline = None;
            }
        }

        Ok(frame)
    }

    /// Drain the next pipelined reply and convert it like a direct command
    /// reply would have been.
    pub async fn next_reply_as<T: FromReply>(&mut self) -> Result<T> {
        let frame = self.next_reply().await?;
        T::from_reply(frame)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Open an atomic bracket. Commands dispatched until [`Client::exec`]
    /// are deferred by the server and acknowledged with a placeholder,
    /// surfaced here as [`Outcome::Queued`].
    pub async fn multi(&mut self) -> Result<Outcome<()>> {
        let outcome = self.dispatch_typed(Request::new("MULTI")).await?;
        self.in_multi = true;
        Ok(outcome)
    }

    /// Execute the bracket. The reply is the array of deferred replies, or
    /// null when the transaction was aborted.
    pub async fn exec(&mut self) -> Result<Outcome<Frame>> {
        let result = self.dispatch_typed(Request::new("EXEC")).await;
        self.in_multi = false;
        result
    }

    /// Abandon the bracket.
    pub async fn discard(&mut self) -> Result<Outcome<()>> {
        let result = self.dispatch_typed(Request::new("DISCARD")).await;
        self.in_multi = false;
        result
    }

    // ------------------------------------------------------------------
    // Pub/sub
    // ------------------------------------------------------------------

    /// Subscribe to one or more channels. Subscription confirmations and
    /// published messages are read with [`Client::next_message`].
    pub async fn subscribe(&mut self, channels: impl ToArgs) -> Result<()> {
        let mut request = Request::new("SUBSCRIBE");
        request.append(&channels);
        if request.arg_count() == 0 {
            return Err(Error::InvalidArgument(
                "subscribe requires at least one channel".to_string(),
            ));
        }
        self.send_only(request).await
    }

    /// Unsubscribe from the given channels, or from all of them when called
    /// with no channels.
    pub async fn unsubscribe(&mut self, channels: impl ToArgs) -> Result<()> {
        let mut request = Request::new("UNSUBSCRIBE");
        request.append(&channels);
        self.send_only(request).await
    }

    pub async fn psubscribe(&mut self, patterns: impl ToArgs) -> Result<()> {
        let mut request = Request::new("PSUBSCRIBE");
        request.append(&patterns);
        if request.arg_count() == 0 {
            return Err(Error::InvalidArgument(
                "psubscribe requires at least one pattern".to_string(),
            ));
        }
        self.send_only(request).await
    }

    pub async fn punsubscribe(&mut self, patterns: impl ToArgs) -> Result<()> {
        let mut request = Request::new("PUNSUBSCRIBE");
        request.append(&patterns);
        self.send_only(request).await
    }

    /// Publish a message to a channel.
    pub async fn publish(&mut self, channel: impl ToArgs, message: impl ToArgs) -> Result<()> {
        let mut request = Request::new("PUBLISH");
        request.append(&channel);
        request.append(&message);
        self.send_only(request).await
    }

    /// Read the next pub/sub event pushed by the server: subscription
    /// confirmations and published messages, in arrival order.
    pub async fn next_message(&mut self) -> Result<PubSubMessage> {
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
        let frame = connection.read_frame().await?;
        PubSubMessage::try_from(frame)
    }
}

/// One event on a subscribed connection.
#[derive(Clone, Debug, PartialEq)]
pub enum PubSubMessage {
    /// Confirmation of a (p)subscribe, with the subscription count.
    Subscribed { channel: String, subscriptions: i64 },
    /// Confirmation of a (p)unsubscribe, with the remaining count.
    Unsubscribed { channel: String, subscriptions: i64 },
    /// A message published to a channel this connection subscribes to.
    Message { channel: String, payload: Bytes },
    /// A message delivered through a pattern subscription.
    PatternMessage {
        pattern: String,
        channel: String,
        payload: Bytes,
    },
}

impl TryFrom<Frame> for PubSubMessage {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self> {
        let frames = match frame {
            Frame::Array(frames) => frames,
            frame => {
                return Err(Error::UnexpectedReply {
                    expected: "array",
                    actual: frame.kind(),
                })
            }
        };

        let mut parts = frames.into_iter();
        let mut next = move || parts.next().ok_or_else(truncated_event);

        let kind = String::from_reply(next()?)?;
        match kind.as_str() {
            "subscribe" | "psubscribe" => Ok(PubSubMessage::Subscribed {
                channel: String::from_reply(next()?)?,
                subscriptions: i64::from_reply(next()?)?,
            }),
            "unsubscribe" | "punsubscribe" => Ok(PubSubMessage::Unsubscribed {
                channel: String::from_reply(next()?)?,
                subscriptions: i64::from_reply(next()?)?,
            }),
            "message" => Ok(PubSubMessage::Message {
                channel: String::from_reply(next()?)?,
                payload: Bytes::from_reply(next()?)?,
            }),
            "pmessage" => Ok(PubSubMessage::PatternMessage {
                pattern: String::from_reply(next()?)?,
                channel: String::from_reply(next()?)?,
                payload: Bytes::from_reply(next()?)?,
            }),
            other => Err(Error::Protocol(format!(
                "unknown pub/sub event {:?}",
                other
            ))),
        }
    }
}

fn truncated_event() -> Error {
    Error::Protocol("truncated pub/sub event".to_string())
}
