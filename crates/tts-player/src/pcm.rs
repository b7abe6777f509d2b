//! Raw PCM16 chunk decoding.
//!
//! The streaming endpoint delivers contiguous 16-bit signed little-endian
//! samples at a fixed rate. This module converts those byte buffers into the
//! normalized `f32` samples the rest of the pipeline works with.

use anyhow::{Result, bail};

/// Sample rate of the server's raw PCM stream, in Hz.
pub const SAMPLE_RATE_HZ: u32 = 22_050;

/// Channel count of the server's raw PCM stream.
pub const CHANNELS: usize = 1;

/// Bytes per PCM16 sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Normalization divisor mapping i16 into [-1.0, 1.0).
const PCM16_SCALE: f32 = 32_768.0;

/// Decode a chunk of raw PCM16LE bytes into normalized `f32` samples.
///
/// A chunk must contain a whole number of samples; an odd byte count means
/// the stream is corrupt, and per the sequencer's error policy the whole
/// session is abandoned rather than resynchronized.
pub fn decode_chunk(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        bail!(
            "PCM16 chunk is not a whole number of samples ({} bytes)",
            bytes.len()
        );
    }

    let samples = bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect();

    Ok(samples)
}

/// Duration of `sample_count` mono samples at the stream rate, in milliseconds.
pub fn samples_to_ms(sample_count: u64) -> u64 {
    sample_count.saturating_mul(1000) / SAMPLE_RATE_HZ as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_chunk_normalizes_extremes() {
        // i16::MIN maps to exactly -1.0.
        let samples = decode_chunk(&[0x00, 0x80]).unwrap();
        assert_eq!(samples, vec![-1.0]);

        // i16::MAX maps to 32767/32768.
        let samples = decode_chunk(&[0xFF, 0x7F]).unwrap();
        assert_eq!(samples, vec![32_767.0 / 32_768.0]);
    }

    #[test]
    fn decode_chunk_is_little_endian() {
        // 0x0100 = 256
        let samples = decode_chunk(&[0x00, 0x01]).unwrap();
        assert_eq!(samples, vec![256.0 / 32_768.0]);
    }

    #[test]
    fn decode_chunk_zero_is_silence() {
        let samples = decode_chunk(&[0x00, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(samples, vec![0.0, 0.0]);
    }

    #[test]
    fn decode_chunk_rejects_odd_length() {
        let err = decode_chunk(&[0x00, 0x01, 0x02]).unwrap_err();
        assert!(err.to_string().contains("3 bytes"));
    }

    #[test]
    fn decode_chunk_accepts_empty() {
        assert!(decode_chunk(&[]).unwrap().is_empty());
    }

    #[test]
    fn samples_to_ms_uses_stream_rate() {
        assert_eq!(samples_to_ms(22_050), 1000);
        assert_eq!(samples_to_ms(0), 0);
        assert_eq!(samples_to_ms(11_025), 500);
    }
}
