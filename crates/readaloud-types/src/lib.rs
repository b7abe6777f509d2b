use serde::{Deserialize, Serialize};

/// Default voice applied when a request does not name one.
pub const DEFAULT_VOICE: &str = "af_heart";

/// Default language code applied when a request does not name one.
pub const DEFAULT_LANGUAGE: &str = "a";

/// Default speech speed multiplier.
pub const DEFAULT_SPEED: f32 = 1.0;

/// Speech generation request accepted by the TTS server's
/// `/generate` and `/stream` endpoints.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SpeechRequest {
    /// Text to synthesize. The client rejects empty/whitespace-only text
    /// before any request is sent.
    pub text: String,
    /// Voice identifier (for example `af_heart`, `bm_george`).
    pub voice: String,
    /// Speed multiplier, 1.0 is natural pace.
    pub speed: f32,
    /// Single-letter language code understood by the server.
    pub language: String,
}

impl SpeechRequest {
    /// Build a request for `text` with server-side defaults for the rest.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: DEFAULT_VOICE.to_string(),
            speed: DEFAULT_SPEED,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// Response from the TTS server's `GET /health` endpoint.
///
/// The voice/language lists are only present when the server is healthy;
/// an unhealthy server answers 503 with just `status` and `message`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub available_voices: Vec<String>,
    #[serde(default)]
    pub available_languages: Vec<String>,
}

impl HealthResponse {
    /// Whether the server reported itself ready to synthesize.
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Reason why an utterance's playback ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// The stream completed and all queued audio played out.
    Finished,
    /// Playback was explicitly stopped by a command.
    Stopped,
    /// A decode, transport, or output error interrupted playback.
    Error,
}

/// Point-in-time playback status snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SpeechStatus {
    /// Short preview of the text currently being spoken.
    pub speaking: Option<String>,
    /// Voice used for the current utterance.
    pub voice: Option<String>,
    /// Output sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Chunks received from the server so far.
    pub chunks_received: Option<u64>,
    /// Elapsed playback time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Underrun incidents observed by the output callback.
    pub underrun_events: Option<u64>,
    /// Terminal reason once playback has ended.
    pub end_reason: Option<PlaybackEndReason>,
}
