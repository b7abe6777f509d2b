//! The playback queue of pending audio chunks.
//!
//! Chunks carry no sequence numbers; ordering is implicit in delivery order,
//! so the queue must never reorder. It is owned exclusively by the sequencer
//! worker and mutated only in response to its serialized commands, which is
//! why (unlike the sample queue) it needs no internal synchronization.

use std::collections::VecDeque;

/// FIFO of raw PCM chunks awaiting decode and playback.
///
/// Append-only at the tail, pop-only at the head. `close()` marks that the
/// current stream will deliver no further chunks; buffered chunks still
/// drain normally after that.
#[derive(Debug, Default)]
pub struct ChunkQueue {
    chunks: VecDeque<Vec<u8>>,
    closed: bool,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk at the tail.
    pub fn push(&mut self, chunk: Vec<u8>) {
        self.chunks.push_back(chunk);
    }

    /// Pop the head chunk, or `None` when the queue is empty.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    /// Mark the current stream as complete. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the producer signalled end of stream.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Discard all buffered chunks and reset for the next stream.
    ///
    /// Used by the Stopping transition: once one chunk is bad or playback is
    /// cancelled, the remainder of the stream is worthless.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.closed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_push_order() {
        let mut q = ChunkQueue::new();
        q.push(vec![1]);
        q.push(vec![2]);
        q.push(vec![3]);
        assert_eq!(q.pop(), Some(vec![1]));
        q.push(vec![4]);
        assert_eq!(q.pop(), Some(vec![2]));
        assert_eq!(q.pop(), Some(vec![3]));
        assert_eq!(q.pop(), Some(vec![4]));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn close_does_not_discard_buffered_chunks() {
        let mut q = ChunkQueue::new();
        q.push(vec![1]);
        q.close();
        assert!(q.is_closed());
        assert_eq!(q.pop(), Some(vec![1]));
        assert!(q.is_empty());
    }

    #[test]
    fn reset_clears_chunks_and_closed_flag() {
        let mut q = ChunkQueue::new();
        q.push(vec![1]);
        q.push(vec![2]);
        q.close();
        q.reset();
        assert!(q.is_empty());
        assert!(!q.is_closed());
        assert_eq!(q.len(), 0);
    }
}
