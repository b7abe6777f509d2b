//! Playback sequencer: the single consumer of the chunk queue.
//!
//! A worker thread owns the [`ChunkQueue`] and the active playback session,
//! mutating both only in response to serialized commands, so no locking is
//! needed around either. At most one decode+push operation is in flight at
//! any time; chunks play in exact arrival order; and because every chunk of
//! an utterance feeds one continuous sample queue, playback is gapless by
//! construction.
//!
//! States: **Idle** (no session) → **Draining** (session active, popping
//! chunks) → **Stopping** (stop command or error: cut off the in-flight
//! audio, clear everything) → Idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::chunks::ChunkQueue;
use crate::config::PlaybackConfig;
use crate::pcm;
use crate::queue::{SampleQueue, capacity_samples};
use crate::sink::PlaybackSink;
use crate::StreamSpec;

enum Command {
    Chunk(Vec<u8>),
    StreamEnd,
    Stop,
    StreamError(String),
}

/// Events surfaced to the host; failures here are user-visible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequencerEvent {
    /// A new utterance began playing.
    Started,
    /// The stream ended and all queued audio played out.
    Finished,
    /// Playback was cut off by an explicit stop.
    Stopped,
    /// A decode, transport, or output error abandoned the utterance.
    Failed(String),
}

/// Command-side handle to the sequencer worker.
///
/// `enqueue` never blocks the caller; the stop flag is shared with the
/// worker's blocking pushes so cancellation takes effect immediately even
/// mid-chunk.
#[derive(Clone)]
pub struct SequencerHandle {
    cmd_tx: Sender<Command>,
    stop: Arc<AtomicBool>,
}

impl SequencerHandle {
    /// Append a raw PCM16 chunk at the tail of the playback queue.
    pub fn enqueue(&self, chunk: Vec<u8>) {
        let _ = self.cmd_tx.send(Command::Chunk(chunk));
    }

    /// Signal that no further chunks will arrive for the current utterance.
    /// Playback continues draining whatever is queued.
    pub fn finish_stream(&self) {
        let _ = self.cmd_tx.send(Command::StreamEnd);
    }

    /// Report an upstream transport error; the current utterance is
    /// abandoned and its remaining queue discarded.
    pub fn fail_stream(&self, message: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::StreamError(message.into()));
    }

    /// Stop playback now: cut off the sounding audio and clear the queue.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.cmd_tx.send(Command::Stop);
    }
}

/// Spawn the sequencer worker.
///
/// Returns the command handle and the event stream. The worker exits when
/// every handle clone has been dropped.
pub fn spawn_sequencer(
    playback: PlaybackConfig,
    sink: Box<dyn PlaybackSink>,
) -> (SequencerHandle, Receiver<SequencerEvent>) {
    let (cmd_tx, cmd_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let stop = Arc::new(AtomicBool::new(false));

    let worker = Worker {
        playback,
        sink,
        queue: ChunkQueue::new(),
        session: None,
        stop: stop.clone(),
        cmd_rx,
        events: event_tx,
    };
    thread::spawn(move || worker.run());

    (SequencerHandle { cmd_tx, stop }, event_rx)
}

struct Session {
    samples: Arc<SampleQueue>,
}

struct Worker {
    playback: PlaybackConfig,
    sink: Box<dyn PlaybackSink>,
    queue: ChunkQueue,
    session: Option<Session>,
    stop: Arc<AtomicBool>,
    cmd_rx: Receiver<Command>,
    events: Sender<SequencerEvent>,
}

impl Worker {
    fn run(mut self) {
        // Idle (and Draining-with-empty-queue) both suspend here; an
        // enqueue or stop wakes the worker. There is no timeout on waiting
        // for the next chunk.
        while let Ok(cmd) = self.cmd_rx.recv() {
            self.apply(cmd);
            self.drain();
        }
        // All handles dropped: tear down whatever is still playing.
        self.teardown(None, false);
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Chunk(chunk) => self.queue.push(chunk),
            Command::StreamEnd => self.queue.close(),
            Command::Stop => self.teardown(None, true),
            Command::StreamError(msg) => {
                tracing::warn!(error = %msg, "stream error from transport");
                self.teardown(Some(msg), true);
            }
        }
    }

    /// Draining state: pop and play head chunks one at a time, absorbing
    /// newly arrived commands between chunks so a stop is never delayed by
    /// more than the current blocking push (which itself aborts on the
    /// stop flag).
    fn drain(&mut self) {
        loop {
            while let Ok(cmd) = self.cmd_rx.try_recv() {
                self.apply(cmd);
            }
            let Some(chunk) = self.queue.pop() else {
                break;
            };
            if let Err(e) = self.play_chunk(chunk) {
                let msg = format!("{e:#}");
                tracing::warn!(error = %msg, "chunk playback failed");
                self.teardown(Some(msg), true);
                return;
            }
        }

        if self.queue.is_closed() {
            self.finish_stream();
        }
    }

    /// Decode one chunk and hand its samples to the session, creating the
    /// session on the first chunk of a new utterance.
    fn play_chunk(&mut self, chunk: Vec<u8>) -> Result<()> {
        let samples = pcm::decode_chunk(&chunk).context("decode PCM16 chunk")?;
        if samples.is_empty() {
            return Ok(());
        }

        if self.session.is_none() {
            let spec = StreamSpec::tts_stream();
            let queue = Arc::new(SampleQueue::new(
                spec.channels,
                capacity_samples(spec.rate, spec.channels, self.playback.buffer_seconds),
            ));
            // The stop flag doubles as the sink's abort so a stop cuts the
            // drain short even after the chunk queue has closed.
            self.sink
                .begin(spec, queue.clone(), self.stop.clone())
                .context("start playback output")?;
            self.session = Some(Session { samples: queue });
            let _ = self.events.send(SequencerEvent::Started);
        }

        // A false return means we were cancelled mid-push; the pending stop
        // command finishes the teardown.
        let session = self.session.as_ref().unwrap();
        session.samples.push_blocking(&samples, Some(&self.stop));
        Ok(())
    }

    /// End of stream with an empty queue: let buffered audio play out, then
    /// report how the utterance ended. A stop raised during this wait
    /// aborts the sink's drain and the utterance reports `Stopped`.
    fn finish_stream(&mut self) {
        if let Some(session) = self.session.take() {
            session.samples.close();
            let drained = self.sink.finish();
            self.queue.reset();
            self.stop.store(false, Ordering::Relaxed);
            let _ = self.events.send(if drained {
                SequencerEvent::Finished
            } else {
                SequencerEvent::Stopped
            });
        } else {
            // Zero-chunk stream: nothing ever played.
            self.queue.reset();
            let _ = self.events.send(SequencerEvent::Finished);
        }
    }

    /// Stopping state: halt the in-flight audio with no grace period,
    /// discard the entire queue, and return to Idle.
    fn teardown(&mut self, error: Option<String>, notify: bool) {
        let had_work = self.session.is_some() || !self.queue.is_empty();
        self.queue.reset();
        if let Some(session) = self.session.take() {
            session.samples.close();
            session.samples.clear();
            self.sink.cancel();
        }
        self.stop.store(false, Ordering::Relaxed);

        if !notify {
            return;
        }
        match error {
            Some(msg) => {
                let _ = self.events.send(SequencerEvent::Failed(msg));
            }
            None if had_work => {
                let _ = self.events.send(SequencerEvent::Stopped);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::CaptureSink;
    use std::time::Duration;

    fn pcm_bytes(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn expect_event(rx: &Receiver<SequencerEvent>) -> SequencerEvent {
        rx.recv_timeout(Duration::from_secs(5)).expect("event")
    }

    #[test]
    fn plays_chunks_in_arrival_order() {
        let (sink, captured, begins) = CaptureSink::new(Duration::ZERO);
        let (handle, events) = spawn_sequencer(PlaybackConfig::default(), Box::new(sink));

        handle.enqueue(pcm_bytes(&[100, 200]));
        handle.enqueue(pcm_bytes(&[300]));
        handle.enqueue(pcm_bytes(&[-400, 500]));
        handle.finish_stream();

        assert_eq!(expect_event(&events), SequencerEvent::Started);
        assert_eq!(expect_event(&events), SequencerEvent::Finished);

        let expected: Vec<f32> = [100, 200, 300, -400, 500]
            .iter()
            .map(|v| *v as f32 / 32_768.0)
            .collect();
        assert_eq!(*captured.lock().unwrap(), expected);
        assert_eq!(*begins.lock().unwrap(), 1);
    }

    #[test]
    fn zero_chunk_stream_finishes_without_starting() {
        let (sink, captured, begins) = CaptureSink::new(Duration::ZERO);
        let (handle, events) = spawn_sequencer(PlaybackConfig::default(), Box::new(sink));

        handle.finish_stream();

        assert_eq!(expect_event(&events), SequencerEvent::Finished);
        assert!(captured.lock().unwrap().is_empty());
        assert_eq!(*begins.lock().unwrap(), 0);
    }

    #[test]
    fn stop_halts_playback_and_allows_a_fresh_session() {
        let (sink, captured, begins) = CaptureSink::new(Duration::from_millis(5));
        let (handle, events) = spawn_sequencer(
            PlaybackConfig {
                buffer_seconds: 0.01,
                ..PlaybackConfig::default()
            },
            Box::new(sink),
        );

        // Enough audio that the slow consumer cannot finish before the stop.
        let total = 4000;
        for _ in 0..4 {
            handle.enqueue(pcm_bytes(&vec![1000i16; total / 4]));
        }
        assert_eq!(expect_event(&events), SequencerEvent::Started);
        thread::sleep(Duration::from_millis(20));
        handle.stop();
        assert_eq!(expect_event(&events), SequencerEvent::Stopped);
        assert!(captured.lock().unwrap().len() < total);

        // A subsequent enqueue starts a fresh draining cycle.
        handle.enqueue(pcm_bytes(&[42]));
        handle.finish_stream();
        assert_eq!(expect_event(&events), SequencerEvent::Started);
        assert_eq!(expect_event(&events), SequencerEvent::Finished);
        assert_eq!(*begins.lock().unwrap(), 2);
        assert_eq!(
            captured.lock().unwrap().last().copied(),
            Some(42.0 / 32_768.0)
        );
    }

    #[test]
    fn stop_during_stream_end_drain_cuts_playback_short() {
        let (sink, captured, _begins) = CaptureSink::new(Duration::from_millis(5));
        let (handle, events) = spawn_sequencer(PlaybackConfig::default(), Box::new(sink));

        // Default buffering holds the whole utterance, so the worker is
        // already waiting on the drain while the slow consumer still has
        // roughly 300 ms of audio left.
        let total = 4000;
        handle.enqueue(pcm_bytes(&vec![600i16; total]));
        handle.finish_stream();
        assert_eq!(expect_event(&events), SequencerEvent::Started);

        thread::sleep(Duration::from_millis(50));
        let issued = std::time::Instant::now();
        handle.stop();

        assert_eq!(expect_event(&events), SequencerEvent::Stopped);
        assert!(issued.elapsed() < Duration::from_millis(200));
        assert!(captured.lock().unwrap().len() < total);
    }

    #[test]
    fn new_utterance_after_stop_never_replays_old_audio() {
        let (sink, captured, _begins) = CaptureSink::new(Duration::from_millis(5));
        let (handle, events) = spawn_sequencer(
            PlaybackConfig {
                buffer_seconds: 0.01,
                ..PlaybackConfig::default()
            },
            Box::new(sink),
        );

        for _ in 0..4 {
            handle.enqueue(pcm_bytes(&vec![7i16; 1000]));
        }
        assert_eq!(expect_event(&events), SequencerEvent::Started);
        thread::sleep(Duration::from_millis(20));

        // Start a new utterance: stop, then stream fresh chunks.
        handle.stop();
        assert_eq!(expect_event(&events), SequencerEvent::Stopped);
        handle.enqueue(pcm_bytes(&[11, 22, 33]));
        handle.finish_stream();
        assert_eq!(expect_event(&events), SequencerEvent::Started);
        assert_eq!(expect_event(&events), SequencerEvent::Finished);

        let captured = captured.lock().unwrap();
        let tail: Vec<f32> = captured[captured.len() - 3..].to_vec();
        let expected: Vec<f32> = [11, 22, 33].iter().map(|v| *v as f32 / 32_768.0).collect();
        assert_eq!(tail, expected);
    }

    #[test]
    fn odd_length_chunk_fails_and_clears_the_queue() {
        let (sink, _captured, _begins) = CaptureSink::new(Duration::ZERO);
        let (handle, events) = spawn_sequencer(PlaybackConfig::default(), Box::new(sink));

        handle.enqueue(pcm_bytes(&[1, 2]));
        handle.enqueue(vec![0x00, 0x01, 0x02]); // not a whole number of samples
        handle.enqueue(pcm_bytes(&[3, 4])); // discarded, not skipped over

        assert_eq!(expect_event(&events), SequencerEvent::Started);
        match expect_event(&events) {
            SequencerEvent::Failed(msg) => assert!(msg.contains("3 bytes")),
            other => panic!("expected Failed, got {other:?}"),
        }

        // Back to Idle: a fresh stream plays normally.
        handle.enqueue(pcm_bytes(&[5]));
        handle.finish_stream();
        assert_eq!(expect_event(&events), SequencerEvent::Started);
        assert_eq!(expect_event(&events), SequencerEvent::Finished);
    }

    #[test]
    fn transport_error_surfaces_and_stops() {
        let (sink, _captured, _begins) = CaptureSink::new(Duration::ZERO);
        let (handle, events) = spawn_sequencer(PlaybackConfig::default(), Box::new(sink));

        handle.enqueue(pcm_bytes(&[1, 2, 3]));
        assert_eq!(expect_event(&events), SequencerEvent::Started);
        handle.fail_stream("connection reset");
        match expect_event(&events) {
            SequencerEvent::Failed(msg) => assert_eq!(msg, "connection reset"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn stop_when_idle_is_silent() {
        let (sink, _captured, _begins) = CaptureSink::new(Duration::ZERO);
        let (handle, events) = spawn_sequencer(PlaybackConfig::default(), Box::new(sink));

        handle.stop();
        handle.enqueue(pcm_bytes(&[9]));
        handle.finish_stream();

        // No Stopped event for the idle stop; just the fresh session.
        assert_eq!(expect_event(&events), SequencerEvent::Started);
        assert_eq!(expect_event(&events), SequencerEvent::Finished);
    }
}
