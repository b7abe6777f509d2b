//! Device output stage (cpal stream and its real-time callback).
//!
//! The callback refills a small local buffer from the sample queue without
//! blocking, maps the source channel layout onto the device layout, and
//! converts `f32` to the device sample format. Underruns produce silence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::{Pop, SampleQueue};

/// Counters updated from inside the output callback.
#[derive(Clone, Debug, Default)]
pub struct OutputCounters {
    /// Total output frames produced.
    pub played_frames: Arc<AtomicU64>,
    /// Number of times the callback ran out of buffered audio.
    pub underrun_events: Arc<AtomicU64>,
}

/// Build a cpal output stream that plays audio from `queue`.
///
/// `queue` must carry interleaved `f32` samples already at the device rate.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    refill_max_frames: usize,
    counters: OutputCounters,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, refill_max_frames, counters),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, refill_max_frames, counters),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, refill_max_frames, counters),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, refill_max_frames, counters),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    refill_max_frames: usize,
    counters: OutputCounters,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let refill_max_frames = refill_max_frames.max(1);

    let state = Arc::new(Mutex::new(RefillState {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    }));

    let queue_cb = queue.clone();
    let state_cb = state.clone();
    let err_fn = |err| tracing::warn!("output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let mut st = state_cb.lock().unwrap();
            let frames = data.len() / channels_out;
            let mut filled = 0usize;

            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match queue_cb.pop(Pop::UpToNow { max_frames: refill_max_frames }) {
                        Some(v) => st.src = v,
                        None => {
                            // Nothing buffered; pad the rest with silence.
                            if !queue_cb.is_closed() {
                                counters.underrun_events.fetch_add(1, Ordering::Relaxed);
                            }
                            for idx in (frame * channels_out)..data.len() {
                                data[idx] = <T as cpal::Sample>::from_sample::<f32>(0.0);
                            }
                            break;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = next_mapped_sample(&mut st, channels_out, ch);
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample);
                }
                filled += 1;
            }

            if filled > 0 {
                counters.played_frames.fetch_add(filled as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Local refill buffer so the callback does not lock the queue per sample.
struct RefillState {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

/// Read one output sample for `dst_ch`, mapping the source layout onto the
/// device layout. The TTS stream is mono, so the common case duplicates
/// channel 0 across all outputs; stereo sandbox resources map 1:1 or are
/// averaged down.
fn next_mapped_sample(st: &mut RefillState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let src_at = |ch: usize, st: &RefillState| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (1, _) => src_at(0, st),
        (2, 1) => 0.5 * (src_at(0, st) + src_at(1, st)),
        (2, 2) => src_at(dst_ch.min(1), st),
        _ => src_at(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    // Advance once per destination frame, after the last channel.
    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(src_channels: usize, src: Vec<f32>) -> RefillState {
        RefillState {
            pos: 0,
            src_channels,
            src,
        }
    }

    #[test]
    fn mono_source_duplicates_across_stereo_output() {
        let mut st = state(1, vec![0.25, 0.5]);
        assert_eq!(next_mapped_sample(&mut st, 2, 0), 0.25);
        assert_eq!(next_mapped_sample(&mut st, 2, 1), 0.25);
        assert_eq!(next_mapped_sample(&mut st, 2, 0), 0.5);
        assert_eq!(next_mapped_sample(&mut st, 2, 1), 0.5);
    }

    #[test]
    fn stereo_source_averages_to_mono_output() {
        let mut st = state(2, vec![0.2, 0.4]);
        let got = next_mapped_sample(&mut st, 1, 0);
        assert!((got - 0.3).abs() < 1e-6);
    }

    #[test]
    fn exhausted_buffer_yields_silence() {
        let mut st = state(1, vec![]);
        assert_eq!(next_mapped_sample(&mut st, 2, 0), 0.0);
    }
}
