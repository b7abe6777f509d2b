//! readaloud: speak text through a local Kokoro TTS server.
//!
//! ## Pipeline (streaming mode)
//! 1. **Fetch**: `POST /stream` returns chunked raw PCM16LE at 22 050 Hz
//!    mono; a feeder thread re-aligns reads to whole samples and enqueues.
//! 2. **Sequence**: a worker thread decodes chunks to `f32` in strict
//!    arrival order and pushes them into one bounded sample queue per
//!    utterance, so playback is gapless.
//! 3. **Playback**: a cpal output stream pulls from the queue without
//!    blocking, resampling via rubato when the device rate differs.
//!
//! `--complete` mode fetches the whole utterance from `/generate` instead
//! and plays it through the single-resource sandbox.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use readaloud::{cli, runtime};
use readaloud_types::PlaybackEndReason;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,readaloud=info")),
        )
        .init();

    match &args.cmd {
        cli::Command::Devices => runtime::list_devices(),
        cli::Command::Voices => runtime::run_voices(&args.server()),
        cli::Command::Speak { text, complete } => {
            let text = match text {
                Some(t) => t.clone(),
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("read text from stdin")?;
                    buf
                }
            };
            let config = args.speak_config(*complete);
            let reason = runtime::run_speak(&config, &text)?;
            if reason == PlaybackEndReason::Stopped {
                std::process::exit(130);
            }
            Ok(())
        }
    }
}
