//! Single-resource playback of complete audio assets.
//!
//! The legacy non-streaming path: a fully encoded resource (WAV from
//! `/generate`) is decoded up front and played as one unit. The sandbox
//! holds at most one resource; playing a new one cancels whatever is
//! still sounding. Requests must carry the origin the sandbox was
//! constructed with, anything else is refused outright.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, bail};

use crate::decode;
use crate::queue::SampleQueue;
use crate::sink::PlaybackSink;

/// A complete audio resource handed to the sandbox for playback.
pub struct PlayRequest {
    /// Declared origin of the request; must match the sandbox's own.
    pub origin: String,
    /// The full encoded asset.
    pub resource: Vec<u8>,
    /// Container extension hint for the probe (e.g. "wav"), if known.
    pub ext_hint: Option<String>,
}

/// Builds a fresh output sink; invoked at construction and once more if a
/// sink fails to start.
pub type SinkFactory = Box<dyn FnMut() -> Box<dyn PlaybackSink> + Send>;

pub struct PlaybackSandbox {
    origin: String,
    sink: Box<dyn PlaybackSink>,
    factory: SinkFactory,
    current: Option<Arc<SampleQueue>>,
}

impl PlaybackSandbox {
    pub fn new(origin: impl Into<String>, mut factory: SinkFactory) -> Self {
        let sink = factory();
        Self {
            origin: origin.into(),
            sink,
            factory,
            current: None,
        }
    }

    /// Decode and start playing a complete resource.
    ///
    /// Cancels any resource still playing first; two resources never
    /// overlap. Returns once the output is running; use
    /// [`wait_and_release`](Self::wait_and_release) to block until it ends.
    ///
    /// If the sink refuses to start, it is recreated once via the factory
    /// and the start retried; a second refusal is surfaced to the caller.
    pub fn play(&mut self, request: PlayRequest) -> Result<()> {
        if request.origin != self.origin {
            bail!(
                "rejecting playback request from origin {:?} (expected {:?})",
                request.origin,
                self.origin
            );
        }

        self.release();

        let (spec, samples) = decode::decode_resource(request.resource, request.ext_hint.as_deref())
            .context("decode audio resource")?;
        tracing::debug!(
            rate_hz = spec.rate,
            channels = spec.channels,
            samples = samples.len(),
            "resource decoded"
        );

        // Sized to hold the whole resource, so the push never blocks and
        // the queue can be closed before the sink starts consuming.
        let queue = Arc::new(SampleQueue::new(spec.channels, samples.len()));
        queue.push_blocking(&samples, None);
        queue.close();

        let abort = Arc::new(AtomicBool::new(false));
        if let Err(first) = self.sink.begin(spec, queue.clone(), abort.clone()) {
            tracing::warn!("output sink failed to start, recreating: {first:#}");
            self.sink = (self.factory)();
            self.sink
                .begin(spec, queue.clone(), abort)
                .context("start recreated output sink")?;
        }

        self.current = Some(queue);
        Ok(())
    }

    /// Block until the current resource finishes playing, then release it.
    ///
    /// Returns `true` if it played to the end, `false` if it was cancelled
    /// or nothing was playing.
    pub fn wait_and_release(&mut self) -> bool {
        if self.current.take().is_none() {
            return false;
        }
        self.sink.finish()
    }

    /// Cut off the current resource immediately and release it. Idempotent.
    pub fn stop(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(queue) = self.current.take() {
            queue.close();
            queue.clear();
            self.sink.cancel();
        }
    }
}

impl Drop for PlaybackSandbox {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::test_support::wav_bytes;
    use crate::sink::test_support::{CaptureSink, FailingSink};
    use std::sync::Mutex;
    use std::time::Duration;

    const ORIGIN: &str = "http://127.0.0.1:8000";

    fn request(resource: Vec<u8>) -> PlayRequest {
        PlayRequest {
            origin: ORIGIN.to_string(),
            resource,
            ext_hint: Some("wav".to_string()),
        }
    }

    fn single_sink_sandbox(
        pop_delay: Duration,
    ) -> (PlaybackSandbox, Arc<Mutex<Vec<f32>>>, Arc<Mutex<u32>>) {
        let (sink, captured, begins) = CaptureSink::new(pop_delay);
        let mut prepared = Some(Box::new(sink) as Box<dyn PlaybackSink>);
        let sandbox = PlaybackSandbox::new(
            ORIGIN,
            Box::new(move || prepared.take().expect("factory called more than once")),
        );
        (sandbox, captured, begins)
    }

    #[test]
    fn plays_a_complete_resource_to_the_end() {
        let (mut sandbox, captured, begins) = single_sink_sandbox(Duration::ZERO);
        sandbox
            .play(request(wav_bytes(24_000, &[0, 16_384, -16_384])))
            .unwrap();
        assert!(sandbox.wait_and_release());

        assert_eq!(*begins.lock().unwrap(), 1);
        let out = captured.lock().unwrap();
        assert_eq!(out.len(), 3);
        assert!((out[1] - 0.5).abs() < 1e-4);
        assert!((out[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn rejects_a_request_from_another_origin() {
        let (mut sandbox, _captured, begins) = single_sink_sandbox(Duration::ZERO);
        let result = sandbox.play(PlayRequest {
            origin: "http://evil.example".to_string(),
            resource: wav_bytes(24_000, &[1, 2, 3]),
            ext_hint: Some("wav".to_string()),
        });
        assert!(result.is_err());
        assert_eq!(*begins.lock().unwrap(), 0);
    }

    #[test]
    fn rejects_an_undecodable_resource() {
        let (mut sandbox, _captured, begins) = single_sink_sandbox(Duration::ZERO);
        assert!(sandbox.play(request(vec![0xde, 0xad, 0xbe, 0xef])).is_err());
        assert_eq!(*begins.lock().unwrap(), 0);
        assert!(!sandbox.wait_and_release());
    }

    #[test]
    fn a_new_resource_replaces_the_current_one() {
        let (mut sandbox, captured, begins) =
            single_sink_sandbox(Duration::from_millis(5));

        let long: Vec<i16> = vec![1_000; 4_096];
        sandbox.play(request(wav_bytes(24_000, &long))).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        sandbox.play(request(wav_bytes(24_000, &[-2_000, -2_000]))).unwrap();
        assert!(sandbox.wait_and_release());

        assert_eq!(*begins.lock().unwrap(), 2);
        let out = captured.lock().unwrap();
        // The first resource was cut off mid-way; the second is complete
        // and comes last.
        let first_value = 1_000.0 / 32_768.0;
        let second_value = -2_000.0 / 32_768.0;
        assert!(out.iter().filter(|s| (**s - first_value).abs() < 1e-6).count() < long.len());
        assert!(out.len() >= 2);
        assert!((out[out.len() - 1] - second_value).abs() < 1e-6);
        assert!((out[out.len() - 2] - second_value).abs() < 1e-6);
    }

    #[test]
    fn stop_cuts_off_playback() {
        let (mut sandbox, _captured, _begins) =
            single_sink_sandbox(Duration::from_millis(5));
        let long: Vec<i16> = vec![500; 4_096];
        sandbox.play(request(wav_bytes(24_000, &long))).unwrap();
        sandbox.stop();
        assert!(!sandbox.wait_and_release());
    }

    #[test]
    fn recreates_the_sink_once_when_startup_fails() {
        let (capture, captured, begins) = CaptureSink::new(Duration::ZERO);
        let mut sinks: Vec<Box<dyn PlaybackSink>> =
            vec![Box::new(capture), Box::new(FailingSink)];
        let factory_calls = Arc::new(Mutex::new(0u32));
        let calls = factory_calls.clone();
        let mut sandbox = PlaybackSandbox::new(
            ORIGIN,
            Box::new(move || {
                *calls.lock().unwrap() += 1;
                sinks.pop().expect("factory exhausted")
            }),
        );

        sandbox.play(request(wav_bytes(24_000, &[7, 8, 9]))).unwrap();
        assert!(sandbox.wait_and_release());

        // Initial construction plus one recreation.
        assert_eq!(*factory_calls.lock().unwrap(), 2);
        assert_eq!(*begins.lock().unwrap(), 1);
        assert_eq!(captured.lock().unwrap().len(), 3);
    }

    #[test]
    fn surfaces_error_when_recreated_sink_also_fails() {
        let mut sandbox = PlaybackSandbox::new(ORIGIN, Box::new(|| Box::new(FailingSink)));
        assert!(sandbox.play(request(wav_bytes(24_000, &[1]))).is_err());
        assert!(!sandbox.wait_and_release());
    }
}
