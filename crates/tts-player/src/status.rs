//! Shared speech status state updated by the playback pipeline.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use readaloud_types::{PlaybackEndReason, SpeechStatus};

use crate::playback::OutputCounters;

/// Mutable status store behind a mutex, written from the client loop and
/// the output stage, read whenever a snapshot is wanted.
#[derive(Debug, Default)]
pub struct SpeechStatusState {
    /// Short preview of the text currently being spoken.
    pub speaking: Option<String>,
    /// Voice used for the current utterance.
    pub voice: Option<String>,
    /// Output sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Chunks received from the server so far.
    pub chunks_received: u64,
    /// Counters shared with the output callback.
    pub counters: Option<OutputCounters>,
    /// Terminal playback reason from the current run.
    pub end_reason: Option<PlaybackEndReason>,
}

impl SpeechStatusState {
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Return a point-in-time snapshot.
    pub fn snapshot(&self) -> SpeechStatus {
        let played_frames = self
            .counters
            .as_ref()
            .map(|c| c.played_frames.load(Ordering::Relaxed));
        let elapsed_ms = match (played_frames, self.sample_rate) {
            (Some(frames), Some(sr)) if sr > 0 => {
                Some(frames.saturating_mul(1000) / sr as u64)
            }
            _ => None,
        };
        SpeechStatus {
            speaking: self.speaking.clone(),
            voice: self.voice.clone(),
            sample_rate: self.sample_rate,
            chunks_received: Some(self.chunks_received),
            elapsed_ms,
            underrun_events: self
                .counters
                .as_ref()
                .map(|c| c.underrun_events.load(Ordering::Relaxed)),
            end_reason: self.end_reason,
        }
    }

    /// Clear utterance-specific fields when playback ends. The end reason
    /// stays so the last outcome remains reportable.
    pub fn clear_utterance(&mut self) {
        self.speaking = None;
        self.voice = None;
        self.sample_rate = None;
        self.chunks_received = 0;
        self.counters = None;
    }
}

/// Truncate `text` to a short preview suitable for status output.
pub fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
