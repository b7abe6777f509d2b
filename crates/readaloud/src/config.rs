use std::time::Duration;

pub use tts_player::config::PlaybackConfig;

/// Connection settings for the TTS server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Base URL, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Per-request timeout (connect timeout for the streaming request).
    pub timeout: Duration,
}

/// Everything the speak command needs.
#[derive(Clone, Debug)]
pub struct SpeakConfig {
    pub server: ServerConfig,
    pub device: Option<String>,
    pub voice: String,
    pub speed: f32,
    pub language: String,
    pub playback: PlaybackConfig,
    /// Fetch the whole utterance via `/generate` instead of streaming.
    pub complete: bool,
}
