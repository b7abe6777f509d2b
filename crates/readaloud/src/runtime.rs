//! Runtime entry points for the CLI commands.
//!
//! `speak` wires the HTTP client to the playback sequencer: a feeder thread
//! reads the chunked PCM stream and enqueues aligned chunks, while the main
//! thread waits on sequencer events and maps the terminal one to an
//! outcome. Ctrl-c is an immediate stop, not a drain.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result, anyhow, bail};
use readaloud_types::{PlaybackEndReason, SpeechRequest};
use tts_player::pcm;
use tts_player::sandbox::{PlayRequest, PlaybackSandbox};
use tts_player::sequencer::{SequencerEvent, SequencerHandle, spawn_sequencer};
use tts_player::sink::{CpalSink, PlaybackSink};
use tts_player::status::{SpeechStatusState, preview};
use tts_player::device;

use crate::client::{SampleAligner, TtsClient};
use crate::config::{ServerConfig, SpeakConfig};

const READ_BLOCK_BYTES: usize = 8 * 1024;
const PREVIEW_CHARS: usize = 60;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Query `/health` and print the server's voices and languages.
pub fn run_voices(server: &ServerConfig) -> Result<()> {
    let client = TtsClient::new(&server.base_url, server.timeout);
    let health = client
        .health()
        .with_context(|| format!("TTS server unreachable at {}", server.base_url))?;
    if !health.is_healthy() {
        bail!(
            "server not ready: {}",
            health.message.unwrap_or(health.status)
        );
    }

    println!("voices ({}):", health.available_voices.len());
    for voice in &health.available_voices {
        println!("  {voice}");
    }
    println!("languages: {}", health.available_languages.join(", "));
    Ok(())
}

/// Speak `text`, returning how playback ended.
///
/// Empty or whitespace-only text is rejected before any request is made.
pub fn run_speak(config: &SpeakConfig, text: &str) -> Result<PlaybackEndReason> {
    let text = text.trim();
    if text.is_empty() {
        bail!("no text to speak");
    }

    let request = SpeechRequest {
        text: text.to_string(),
        voice: config.voice.clone(),
        speed: config.speed,
        language: config.language.clone(),
    };

    if config.complete {
        speak_complete(config, &request)
    } else {
        speak_streaming(config, &request)
    }
}

/// Streaming path: `/stream` chunks feed the sequencer as they arrive.
fn speak_streaming(config: &SpeakConfig, request: &SpeechRequest) -> Result<PlaybackEndReason> {
    let client = TtsClient::new(&config.server.base_url, config.server.timeout);
    let status = SpeechStatusState::shared();

    let sink = CpalSink::new(config.device.clone(), config.playback.clone());
    {
        let mut s = status.lock().unwrap();
        s.speaking = Some(preview(&request.text, PREVIEW_CHARS));
        s.voice = Some(request.voice.clone());
        s.sample_rate = Some(pcm::SAMPLE_RATE_HZ);
        s.counters = Some(sink.counters());
    }

    let (handle, events) = spawn_sequencer(config.playback.clone(), Box::new(sink));

    let handle_for_signal = handle.clone();
    let _ = ctrlc::set_handler(move || handle_for_signal.stop());

    // Connectivity failures surface here, before any session exists.
    let reader = client
        .stream(request)
        .with_context(|| format!("TTS server unreachable at {}", config.server.base_url))?;
    tracing::info!(voice = %request.voice, "streaming synthesis started");

    let done = Arc::new(AtomicBool::new(false));
    let feeder = {
        let handle = handle.clone();
        let status = status.clone();
        let done = done.clone();
        thread::spawn(move || feed_stream(reader, &handle, &status, &done))
    };

    let mut outcome = Err(anyhow!("sequencer exited without a terminal event"));
    for event in events.iter() {
        match event {
            SequencerEvent::Started => tracing::debug!("speaking"),
            SequencerEvent::Finished => {
                outcome = Ok(PlaybackEndReason::Finished);
                break;
            }
            SequencerEvent::Stopped => {
                outcome = Ok(PlaybackEndReason::Stopped);
                break;
            }
            SequencerEvent::Failed(msg) => {
                outcome = Err(anyhow!(msg));
                break;
            }
        }
    }

    done.store(true, Ordering::Relaxed);
    let _ = feeder.join();

    log_end(&status, outcome.as_ref().map(|r| *r).unwrap_or(PlaybackEndReason::Error));
    outcome
}

/// Feeder loop: read stream blocks, re-align to whole samples, enqueue.
fn feed_stream(
    mut reader: impl Read,
    handle: &SequencerHandle,
    status: &Arc<Mutex<SpeechStatusState>>,
    done: &AtomicBool,
) {
    let mut aligner = SampleAligner::new();
    let mut buf = [0u8; READ_BLOCK_BYTES];

    loop {
        if done.load(Ordering::Relaxed) {
            return;
        }
        match reader.read(&mut buf) {
            Ok(0) => {
                match aligner.finish() {
                    Ok(()) => handle.finish_stream(),
                    Err(e) => handle.fail_stream(format!("{e:#}")),
                }
                return;
            }
            Ok(n) => {
                let chunk = aligner.align(&buf[..n]);
                if chunk.is_empty() || done.load(Ordering::Relaxed) {
                    continue;
                }
                if let Ok(mut s) = status.lock() {
                    s.chunks_received += 1;
                }
                handle.enqueue(chunk);
            }
            Err(e) => {
                handle.fail_stream(format!("stream read failed: {e}"));
                return;
            }
        }
    }
}

/// Non-streaming path: `/generate` returns one complete resource, played
/// through the sandbox.
fn speak_complete(config: &SpeakConfig, request: &SpeechRequest) -> Result<PlaybackEndReason> {
    let client = TtsClient::new(&config.server.base_url, config.server.timeout);
    tracing::info!(voice = %request.voice, "requesting complete synthesis");
    let resource = client
        .generate(request)
        .with_context(|| format!("TTS server unreachable at {}", config.server.base_url))?;
    tracing::info!(bytes = resource.len(), "audio received");

    let device = config.device.clone();
    let playback = config.playback.clone();
    let mut sandbox = PlaybackSandbox::new(
        config.server.base_url.clone(),
        Box::new(move || {
            Box::new(CpalSink::new(device.clone(), playback.clone())) as Box<dyn PlaybackSink>
        }),
    );

    // The sandbox blocks this thread until playback ends; ctrl-c simply
    // exits, which tears the output stream down with the process.
    let _ = ctrlc::set_handler(|| std::process::exit(130));

    sandbox.play(PlayRequest {
        origin: config.server.base_url.clone(),
        resource,
        ext_hint: Some("wav".to_string()),
    })?;

    Ok(if sandbox.wait_and_release() {
        PlaybackEndReason::Finished
    } else {
        PlaybackEndReason::Stopped
    })
}

fn log_end(status: &Arc<Mutex<SpeechStatusState>>, reason: PlaybackEndReason) {
    if let Ok(mut s) = status.lock() {
        s.end_reason = Some(reason);
        let snap = s.snapshot();
        tracing::info!(
            elapsed_ms = snap.elapsed_ms.unwrap_or(0),
            chunks = snap.chunks_received.unwrap_or(0),
            underruns = snap.underrun_events.unwrap_or(0),
            reason = ?reason,
            "playback ended"
        );
        s.clear_utterance();
    }
}
