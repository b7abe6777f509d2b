//! Bounded queue of decoded audio samples.
//!
//! This is the hand-off between the sequencer (producer) and the output
//! stage (consumer): the sequencer decodes chunks and pushes interleaved
//! `f32` samples; the device callback pops them without blocking. Bounding
//! the queue caps memory and gives the producer natural pacing, and because
//! a single queue carries the whole utterance, consecutive chunks play
//! back-to-back with no scheduling gap between them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// How a consumer wants samples popped.
pub enum Pop {
    /// Block until exactly `frames` whole frames are available, or return
    /// `None` if the queue closes first.
    ExactBlocking { frames: usize },
    /// Block until at least one frame is available, then return up to
    /// `max_frames`. Returns `None` once closed and empty.
    UpToBlocking { max_frames: usize },
    /// Return up to `max_frames` immediately, `None` if nothing is buffered.
    /// Safe to call from the real-time output callback.
    UpToNow { max_frames: usize },
}

/// Queue capacity in samples for a `(rate, channels, seconds)` target.
pub fn capacity_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

struct Inner {
    samples: VecDeque<f32>,
    closed: bool,
}

/// Thread-safe bounded queue of interleaved `f32` samples.
///
/// Samples are stored interleaved (`frame0[ch0], frame0[ch1], ...`) with a
/// channel count fixed at construction. A single condvar doubles as the
/// "state changed" signal for both directions; the `closed` flag lives
/// under the same mutex to avoid close/push races.
pub struct SampleQueue {
    channels: usize,
    capacity: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl SampleQueue {
    pub fn new(channels: usize, capacity_samples: usize) -> Self {
        Self {
            channels,
            capacity: capacity_samples.max(channels),
            inner: Mutex::new(Inner {
                samples: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffered frames right now. Best-effort; stale as soon as it returns.
    pub fn len_frames(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.samples.len() / self.channels
    }

    /// Whether the producer has closed the queue. Buffered samples may
    /// still remain until drained.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Mark the queue as finished and wake all waiters. Idempotent.
    ///
    /// Blocked pops return once drained; blocked pushes return early.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Drop all buffered samples immediately and wake waiters.
    ///
    /// Combined with `close()`, this is the cancellation cut-off: whatever
    /// has not reached the device yet is never heard.
    pub fn clear(&self) {
        let mut g = self.inner.lock().unwrap();
        g.samples.clear();
        drop(g);
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns `true` when every sample was accepted. Returns `false` early
    /// if the queue is closed or `abort` is raised while waiting; the
    /// caller is being cancelled and the rest of the data is moot.
    pub fn push_blocking(&self, samples: &[f32], abort: Option<&AtomicBool>) -> bool {
        let aborted = || abort.map(|a| a.load(Ordering::Relaxed)).unwrap_or(false);
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.samples.len() >= self.capacity && !g.closed && !aborted() {
                let (ng, _) = self.cv.wait_timeout(g, Duration::from_millis(50)).unwrap();
                g = ng;
            }
            if g.closed || aborted() {
                return false;
            }

            while offset < samples.len() && g.samples.len() < self.capacity {
                g.samples.push_back(samples[offset]);
                offset += 1;
            }
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Pop interleaved frames using the requested strategy.
    ///
    /// Returns `None` when the queue is closed and cannot satisfy the
    /// request.
    pub fn pop(&self, strategy: Pop) -> Option<Vec<f32>> {
        match strategy {
            Pop::ExactBlocking { frames } => {
                let want = frames * self.channels;
                let mut g = self.inner.lock().unwrap();
                while g.samples.len() < want && !g.closed {
                    g = self.cv.wait(g).unwrap();
                }
                if g.samples.len() < want {
                    return None;
                }
                Some(self.take_locked(g, want))
            }
            Pop::UpToBlocking { max_frames } => {
                let mut g = self.inner.lock().unwrap();
                while g.samples.is_empty() && !g.closed {
                    g = self.cv.wait(g).unwrap();
                }
                if g.samples.is_empty() {
                    return None;
                }
                let take = self.whole_frames(g.samples.len(), max_frames);
                Some(self.take_locked(g, take))
            }
            Pop::UpToNow { max_frames } => {
                let g = self.inner.lock().unwrap();
                let take = self.whole_frames(g.samples.len(), max_frames);
                if take == 0 {
                    return None;
                }
                Some(self.take_locked(g, take))
            }
        }
    }

    fn whole_frames(&self, buffered: usize, max_frames: usize) -> usize {
        let frames = (buffered / self.channels).min(max_frames);
        frames * self.channels
    }

    fn take_locked(&self, mut g: std::sync::MutexGuard<'_, Inner>, count: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(g.samples.pop_front().unwrap_or(0.0));
        }
        drop(g);
        self.cv.notify_all();
        out
    }
}

/// Block until `q` is closed and fully drained, or until `abort` is raised.
///
/// Returns `true` when the queue drained normally, `false` on abort. Used
/// after the last chunk of an utterance to distinguish "finished" from
/// "stopped".
pub fn drain_or_abort(q: &Arc<SampleQueue>, abort: &Arc<AtomicBool>) -> bool {
    let mut g = q.inner.lock().unwrap();
    loop {
        if abort.load(Ordering::Relaxed) {
            return false;
        }
        if g.closed && g.samples.is_empty() {
            return true;
        }
        let (ng, _) = q.cv.wait_timeout(g, Duration::from_millis(50)).unwrap();
        g = ng;
    }
}
