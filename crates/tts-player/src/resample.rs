//! Streaming resample stage.
//!
//! The TTS stream is fixed at 22 050 Hz, which many output devices will not
//! run at natively. This stage converts interleaved `f32` audio from the
//! source rate to the device rate on a background thread, writing into a
//! bounded [`SampleQueue`] consumed by the output callback.

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::StreamSpec;
use crate::queue::{Pop, SampleQueue, capacity_samples};

/// Configuration for the streaming resampler stage.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames for the steady-state loop.
    pub chunk_frames: usize,
    /// Target buffering (seconds) for the output queue.
    pub buffer_seconds: f32,
}

/// Start a background resampler thread.
///
/// Reads interleaved `f32` from `srcq` at `src_spec.rate` and produces
/// interleaved `f32` at `dst_rate` into a new queue. When `srcq` closes and
/// its buffered input is drained, the output queue is closed too, so
/// close/clear cancellation propagates through this stage unchanged.
pub fn start_resampler(
    srcq: Arc<SampleQueue>,
    src_spec: StreamSpec,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SampleQueue>> {
    let channels = src_spec.channels;
    let dstq = Arc::new(SampleQueue::new(
        channels,
        capacity_samples(dst_rate, channels, cfg.buffer_seconds),
    ));

    let f_ratio = dst_rate as f64 / src_spec.rate as f64;
    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let chunk_frames = cfg.chunk_frames.max(1);

    let dstq_thread = dstq.clone();
    thread::spawn(move || {
        let mut resampler: Box<dyn Resampler<f32>> = match Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        ) {
            Ok(r) => Box::new(r),
            Err(e) => {
                tracing::error!("resampler init error: {e:#}");
                dstq_thread.close();
                return;
            }
        };

        let mut out_buf = vec![0.0f32; channels * chunk_frames * 3];

        // Steady state: full input chunks.
        while let Some(block) = srcq.pop(Pop::ExactBlocking { frames: chunk_frames }) {
            if !push_resampled(&mut *resampler, &block, channels, chunk_frames, None, &mut out_buf, &dstq_thread) {
                dstq_thread.close();
                return;
            }
        }

        // Source closed: flush whatever partial frames remain buffered.
        while let Some(tail) = srcq.pop(Pop::UpToBlocking { max_frames: chunk_frames }) {
            let tail_frames = tail.len() / channels;
            if tail_frames == 0 {
                continue;
            }
            if !push_resampled(
                &mut *resampler,
                &tail,
                channels,
                tail_frames,
                Some(tail_frames),
                &mut out_buf,
                &dstq_thread,
            ) {
                break;
            }
        }

        dstq_thread.close();
    });

    Ok(dstq)
}

/// Run one block through the resampler and push the result downstream.
///
/// Returns `false` on a resampler/adapter error or when the output queue
/// rejects the push (closed by cancellation).
fn push_resampled(
    resampler: &mut dyn Resampler<f32>,
    input: &[f32],
    channels: usize,
    in_frames: usize,
    partial_len: Option<usize>,
    out_buf: &mut [f32],
    dstq: &Arc<SampleQueue>,
) -> bool {
    let input_adapter = match InterleavedSlice::new(input, channels, in_frames) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("resampler input adapter error: {e:#}");
            return false;
        }
    };

    let out_capacity_frames = out_buf.len() / channels;
    let mut output_adapter = match InterleavedSlice::new_mut(out_buf, channels, out_capacity_frames)
    {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("resampler output adapter error: {e:#}");
            return false;
        }
    };

    let indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len,
    };

    let (_consumed, produced_frames) =
        match resampler.process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing)) {
            Ok(x) => x,
            Err(e) => {
                tracing::error!("resampler process error: {e:#}");
                return false;
            }
        };

    let produced = produced_frames * channels;
    if produced == 0 {
        return true;
    }
    dstq.push_blocking(&out_buf[..produced], None)
}
