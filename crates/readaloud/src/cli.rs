use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{PlaybackConfig, ServerConfig, SpeakConfig};

#[derive(Parser, Debug)]
#[command(name = "readaloud", version, about = "Speak text through a local Kokoro TTS server")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TTS server base URL
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub server_url: String,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Voice identifier (see `voices` for what the server offers)
    #[arg(long, default_value = readaloud_types::DEFAULT_VOICE)]
    pub voice: String,

    /// Speech speed multiplier, 1.0 is natural pace
    #[arg(long, default_value_t = readaloud_types::DEFAULT_SPEED)]
    pub speed: f32,

    /// Single-letter language code
    #[arg(long, default_value = readaloud_types::DEFAULT_LANGUAGE)]
    pub language: String,

    /// Queue buffer target in seconds (per stage)
    #[arg(long, default_value_t = 2.0)]
    pub buffer_seconds: f32,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Playback callback refill cap (frames). Larger reduces lock churn but can add latency.
    #[arg(long, default_value_t = 4096)]
    pub refill_max_frames: usize,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Speak text (from the argument, or stdin when omitted)
    Speak {
        /// Text to speak
        text: Option<String>,

        /// Fetch the whole utterance as one audio file instead of streaming
        #[arg(long)]
        complete: bool,
    },

    /// List the voices and languages the server offers
    Voices,

    /// List output devices
    Devices,
}

impl Args {
    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            base_url: self.server_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn speak_config(&self, complete: bool) -> SpeakConfig {
        SpeakConfig {
            server: self.server(),
            device: normalize_device_name(self.device.clone()),
            voice: self.voice.clone(),
            speed: self.speed,
            language: self.language.clone(),
            playback: PlaybackConfig {
                chunk_frames: self.chunk_frames,
                refill_max_frames: self.refill_max_frames,
                buffer_seconds: self.buffer_seconds,
            },
            complete,
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_server() {
        let args = Args::parse_from(["readaloud", "speak", "hello"]);
        assert_eq!(args.voice, "af_heart");
        assert_eq!(args.language, "a");
        assert_eq!(args.speed, 1.0);
        assert_eq!(args.server_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn server_config_strips_trailing_slash() {
        let args = Args::parse_from(["readaloud", "--server-url", "http://host:8000/", "voices"]);
        assert_eq!(args.server().base_url, "http://host:8000");
    }

    #[test]
    fn normalize_device_name_drops_blank() {
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some(" DAC ".to_string())),
            Some("DAC".to_string())
        );
        assert_eq!(normalize_device_name(None), None);
    }
}
