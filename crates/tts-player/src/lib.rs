pub mod chunks;
pub mod config;
pub mod decode;
pub mod device;
pub mod pcm;
pub mod playback;
pub mod queue;
pub mod resample;
pub mod sandbox;
pub mod sequencer;
pub mod sink;
pub mod status;

/// Shape of an interleaved `f32` sample stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Channel count (1 = mono).
    pub channels: usize,
}

impl StreamSpec {
    /// Spec of the raw PCM16 stream delivered by the TTS server.
    pub fn tts_stream() -> Self {
        Self {
            rate: pcm::SAMPLE_RATE_HZ,
            channels: pcm::CHANNELS,
        }
    }
}
