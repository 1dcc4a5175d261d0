use bytes::Bytes;

/// Queued requests and the pending-reply count for one connection.
///
/// The state machine is `Idle -> Pipelining -> Sent(draining) -> Idle`:
/// `Idle` is the absence of this struct, `Pipelining` is a non-empty (or
/// freshly created) queue with nothing sent, and `Sent` is a flushed batch
/// whose replies have not all been drained. The invariant throughout is
/// that `pending` equals the number of sent commands whose replies have not
/// yet been read.
#[derive(Debug, Default)]
pub(crate) struct PipelineState {
    queued: Vec<Bytes>,
    pending: usize,
}

impl PipelineState {
    pub(crate) fn new() -> PipelineState {
        PipelineState::default()
    }

    /// Append one encoded request instead of transmitting it.
    pub(crate) fn enqueue(&mut self, request: Bytes) {
        debug_assert_eq!(self.pending, 0, "enqueue while draining");
        self.queued.push(request);
    }

    pub(crate) fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.pending > 0
    }

    /// The whole batch as one contiguous payload for a single write.
    ///
    /// The queue is not consumed here: a failed write must leave the batch
    /// intact so the caller can inspect it, retry the flush, or abandon the
    /// pipeline. Only a confirmed write moves the state forward via
    /// [`PipelineState::mark_sent`].
    pub(crate) fn batch(&self) -> Bytes {
        let total = self.queued.iter().map(|r| r.len()).sum();
        let mut payload = Vec::with_capacity(total);
        for request in &self.queued {
            payload.extend_from_slice(request);
        }
        Bytes::from(payload)
    }

    /// The batch write succeeded: every queued command now owes one reply.
    pub(crate) fn mark_sent(&mut self) {
        self.pending = self.queued.len();
        self.queued.clear();
    }

    /// One reply drained; returns true when the batch is fully drained and
    /// the connection is back to normal request/reply operation.
    pub(crate) fn mark_drained(&mut self) -> bool {
        debug_assert!(self.pending > 0, "drained more replies than were sent");
        self.pending -= 1;
        self.pending == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_concatenates_in_order() {
        let mut state = PipelineState::new();
        state.enqueue(Bytes::from_static(b"PING\r\n"));
        state.enqueue(Bytes::from_static(b"SELECT 1\r\n"));

        assert_eq!(state.queued_count(), 2);
        assert_eq!(&state.batch()[..], b"PING\r\nSELECT 1\r\n");
    }

    #[test]
    fn batch_does_not_consume_the_queue() {
        let mut state = PipelineState::new();
        state.enqueue(Bytes::from_static(b"PING\r\n"));

        let _ = state.batch();

        assert_eq!(state.queued_count(), 1);
        assert_eq!(state.pending_count(), 0);
    }

    #[test]
    fn mark_sent_moves_queue_to_pending() {
        let mut state = PipelineState::new();
        state.enqueue(Bytes::from_static(b"PING\r\n"));
        state.enqueue(Bytes::from_static(b"PING\r\n"));
        state.enqueue(Bytes::from_static(b"PING\r\n"));

        state.mark_sent();

        assert_eq!(state.queued_count(), 0);
        assert_eq!(state.pending_count(), 3);
        assert!(state.is_draining());
    }

    #[test]
    fn draining_counts_down_to_idle() {
        let mut state = PipelineState::new();
        state.enqueue(Bytes::from_static(b"PING\r\n"));
        state.enqueue(Bytes::from_static(b"PING\r\n"));
        state.mark_sent();

        assert!(!state.mark_drained());
        assert!(state.mark_drained());
        assert_eq!(state.pending_count(), 0);
    }
}
