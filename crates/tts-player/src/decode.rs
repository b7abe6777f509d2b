//! Complete-resource decoding for the non-streaming path.
//!
//! `/generate` returns one fully encoded asset (WAV from the current
//! server, historically MP3). Symphonia probes the container and decodes
//! the whole thing into interleaved `f32` up front; there are no ordering
//! concerns, it is one self-contained unit.

use std::io::{Read, Seek, SeekFrom};

use anyhow::{Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::StreamSpec;

/// In-memory [`MediaSource`] over a complete audio resource.
struct ResourceCursor(std::io::Cursor<Vec<u8>>);

impl Read for ResourceCursor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for ResourceCursor {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.seek(pos)
    }
}

impl MediaSource for ResourceCursor {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.0.get_ref().len() as u64)
    }
}

/// Decode a complete encoded resource into interleaved `f32` samples.
///
/// The container's declared rate/channels are trusted rather than the
/// streaming constants; the server's WAV output is not at the stream rate.
pub fn decode_resource(resource: Vec<u8>, ext_hint: Option<&str>) -> Result<(StreamSpec, Vec<f32>)> {
    let mss = MediaSourceStream::new(
        Box::new(ResourceCursor(std::io::Cursor::new(resource))),
        Default::default(),
    );

    let mut hint = Hint::new();
    if let Some(ext) = ext_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let codec_params = track.codec_params.clone();

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut bad_packets = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                tracing::warn!("packet read error: {e}");
                bad_packets += 1;
                break;
            }
        };
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("packet decode error: {e}");
                bad_packets += 1;
                continue;
            }
        };
        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        if bad_packets > 0 {
            return Err(anyhow!(
                "resource could not be decoded ({bad_packets} bad packets)"
            ));
        }
        return Err(anyhow!("resource decoded to no audio"));
    }
    if bad_packets > 0 {
        tracing::warn!(bad_packets, "resource decoded with errors; audio may be truncated");
    }

    Ok((StreamSpec { rate, channels }, samples))
}
