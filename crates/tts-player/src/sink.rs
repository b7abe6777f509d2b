//! Playback sink seam between sequencing and the actual output facility.
//!
//! The sequencer and sandbox never touch cpal directly; they hand a sample
//! queue to a [`PlaybackSink`] and later ask it to finish or cancel. The
//! production implementation runs the device stream on its own thread
//! (cpal streams are not `Send`, so the stream lives and dies there);
//! tests substitute a capture sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::PlaybackConfig;
use crate::playback::OutputCounters;
use crate::queue::{SampleQueue, drain_or_abort};
use crate::{StreamSpec, device, playback, resample};

/// One active audio output consuming a sample queue until it closes.
pub trait PlaybackSink: Send {
    /// Start playing from `samples`. Returns once the output is running (or
    /// with the setup error if it could not start). `abort` is the caller's
    /// cancellation flag; raising it cuts playback off immediately, even
    /// while a closed queue is still draining.
    fn begin(
        &mut self,
        spec: StreamSpec,
        samples: Arc<SampleQueue>,
        abort: Arc<AtomicBool>,
    ) -> Result<()>;

    /// Block until buffered audio finishes playing, then tear down.
    /// Returns `true` if the queue drained fully, `false` if cancelled.
    fn finish(&mut self) -> bool;

    /// Cut off output immediately and tear down. No grace period.
    fn cancel(&mut self);
}

struct ActiveOutput {
    abort: Arc<AtomicBool>,
    srcq: Arc<SampleQueue>,
    join: thread::JoinHandle<bool>,
}

/// Plays a sample queue through a cpal output device, resampling when the
/// device cannot run at the source rate.
pub struct CpalSink {
    device_name: Option<String>,
    playback: PlaybackConfig,
    counters: OutputCounters,
    active: Option<ActiveOutput>,
}

impl CpalSink {
    pub fn new(device_name: Option<String>, playback: PlaybackConfig) -> Self {
        Self {
            device_name,
            playback,
            counters: OutputCounters::default(),
            active: None,
        }
    }

    /// Counters shared with the output callback (for status reporting).
    pub fn counters(&self) -> OutputCounters {
        self.counters.clone()
    }

    fn teardown(&mut self, abort: bool) -> bool {
        let Some(active) = self.active.take() else {
            return true;
        };
        if abort {
            active.abort.store(true, Ordering::Relaxed);
            active.srcq.close();
            active.srcq.clear();
        }
        active.join.join().unwrap_or(false)
    }
}

impl PlaybackSink for CpalSink {
    fn begin(
        &mut self,
        spec: StreamSpec,
        samples: Arc<SampleQueue>,
        abort: Arc<AtomicBool>,
    ) -> Result<()> {
        if self.active.is_some() {
            return Err(anyhow!("output already active"));
        }

        let (setup_tx, setup_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let device_name = self.device_name.clone();
        let playback = self.playback.clone();
        let counters = self.counters.clone();
        let abort_thread = abort.clone();
        let srcq = samples.clone();

        // The cpal stream is not Send; build, play, and drop it on one thread.
        let join = thread::spawn(move || {
            let drained = run_output(
                device_name.as_deref(),
                &playback,
                spec,
                srcq,
                counters,
                abort_thread,
                setup_tx,
            );
            match drained {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("output thread error: {e:#}");
                    false
                }
            }
        });

        match setup_rx.recv() {
            Ok(Ok(())) => {
                self.active = Some(ActiveOutput { abort, srcq: samples, join });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(anyhow!("output thread exited during setup"))
            }
        }
    }

    fn finish(&mut self) -> bool {
        self.teardown(false)
    }

    fn cancel(&mut self) {
        self.teardown(true);
    }
}

/// Body of the output thread: device setup, optional resampler stage,
/// stream start, then wait until the queue drains or the abort flag raises.
fn run_output(
    device_name: Option<&str>,
    playback: &PlaybackConfig,
    spec: StreamSpec,
    srcq: Arc<SampleQueue>,
    counters: OutputCounters,
    abort: Arc<AtomicBool>,
    setup_tx: crossbeam_channel::Sender<Result<()>>,
) -> Result<bool> {
    let setup = || -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, device_name)?;
        let config = device::pick_output_config(&device, spec.rate)?;
        Ok((device, config))
    };

    let (device, config) = match setup() {
        Ok(x) => x,
        Err(e) => {
            let _ = setup_tx.send(Err(e));
            return Ok(false);
        }
    };

    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buf;
    }

    let dst_rate = stream_config.sample_rate;
    let dstq = if spec.rate == dst_rate {
        srcq.clone()
    } else {
        tracing::info!(from_hz = spec.rate, to_hz = dst_rate, "resampling");
        resample::start_resampler(
            srcq.clone(),
            spec,
            dst_rate,
            resample::ResampleConfig {
                chunk_frames: playback.chunk_frames,
                buffer_seconds: playback.buffer_seconds,
            },
        )?
    };

    let stream = match playback::build_output_stream(
        &device,
        &stream_config,
        config.sample_format(),
        &dstq,
        playback.refill_max_frames,
        counters,
    )
    .and_then(|s| {
        s.play().context("start output stream")?;
        Ok(s)
    }) {
        Ok(s) => s,
        Err(e) => {
            dstq.close();
            let _ = setup_tx.send(Err(e));
            return Ok(false);
        }
    };

    tracing::debug!(
        device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
        rate_hz = dst_rate,
        channels = stream_config.channels,
        "output running"
    );
    let _ = setup_tx.send(Ok(()));

    let drained = drain_or_abort(&dstq, &abort);
    if !drained {
        dstq.close();
        dstq.clear();
    } else {
        // Let the device play out its last buffer before the stream drops.
        thread::sleep(Duration::from_millis(100));
    }
    drop(stream);
    Ok(drained)
}
