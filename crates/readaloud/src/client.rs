//! HTTP client for the TTS server.
//!
//! Three endpoints: `/health` (JSON status plus voice/language lists),
//! `/generate` (one complete WAV body), and `/stream` (chunked raw PCM16LE
//! at 22 050 Hz mono). Stream reads arrive on arbitrary byte boundaries,
//! so [`SampleAligner`] re-aligns blocks to whole samples before they are
//! handed to the sequencer.

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use readaloud_types::{HealthResponse, SpeechRequest};

pub(crate) struct TtsClient {
    base_url: String,
    timeout: Duration,
}

impl TtsClient {
    pub(crate) fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, timeout }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Query server health. An unhealthy server answers 503 with the same
    /// JSON shape (minus the lists), so status errors are turned off and
    /// the body decoded either way.
    pub(crate) fn health(&self) -> Result<HealthResponse> {
        let mut resp = ureq::get(self.url("/health"))
            .config()
            .timeout_per_call(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .call()
            .context("request /health")?;
        let body = resp
            .body_mut()
            .read_to_string()
            .context("read /health response body")?;
        serde_json::from_str(&body).context("decode /health response")
    }

    /// Synthesize `request` as one complete encoded audio resource.
    pub(crate) fn generate(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let resp = ureq::post(self.url("/generate"))
            .config()
            .timeout_per_call(Some(self.timeout))
            .build()
            .send_json(request)
            .context("request /generate")?;

        let mut bytes = Vec::new();
        let (_, body) = resp.into_parts();
        body.into_reader()
            .read_to_end(&mut bytes)
            .context("read /generate audio")?;
        if bytes.is_empty() {
            bail!("server returned no audio");
        }
        Ok(bytes)
    }

    /// Open the streaming synthesis endpoint and return its body reader.
    ///
    /// Only the connect phase is bounded by the timeout; a long utterance
    /// streams for as long as it streams.
    pub(crate) fn stream(&self, request: &SpeechRequest) -> Result<impl Read + Send + use<>> {
        let resp = ureq::post(self.url("/stream"))
            .config()
            .timeout_connect(Some(self.timeout))
            .build()
            .send_json(request)
            .context("request /stream")?;
        let (_, body) = resp.into_parts();
        Ok(body.into_reader())
    }
}

/// Re-aligns arbitrary network read boundaries to whole PCM16 samples,
/// carrying at most one byte between reads.
pub(crate) struct SampleAligner {
    carry: Option<u8>,
}

impl SampleAligner {
    pub(crate) fn new() -> Self {
        Self { carry: None }
    }

    /// Prepend the carried byte (if any) and return the largest even-length
    /// prefix, holding back a trailing odd byte for the next read.
    pub(crate) fn align(&mut self, block: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(block.len() + 1);
        if let Some(b) = self.carry.take() {
            buf.push(b);
        }
        buf.extend_from_slice(block);
        if buf.len() % 2 != 0 {
            self.carry = buf.pop();
        }
        buf
    }

    /// End of stream. A byte still held means the server stopped
    /// mid-sample, which is a transport error, not a decode error.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.carry.take().is_some() {
            bail!("stream ended mid-sample (odd byte count)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligner_passes_even_blocks_through() {
        let mut a = SampleAligner::new();
        assert_eq!(a.align(&[1, 2, 3, 4]), vec![1, 2, 3, 4]);
        assert!(a.finish().is_ok());
    }

    #[test]
    fn aligner_carries_odd_byte_into_next_block() {
        let mut a = SampleAligner::new();
        assert_eq!(a.align(&[1, 2, 3]), vec![1, 2]);
        assert_eq!(a.align(&[4, 5, 6]), vec![3, 4, 5, 6]);
        assert!(a.finish().is_ok());
    }

    #[test]
    fn aligner_handles_single_byte_reads() {
        let mut a = SampleAligner::new();
        assert_eq!(a.align(&[1]), Vec::<u8>::new());
        assert_eq!(a.align(&[2]), vec![1, 2]);
        assert!(a.finish().is_ok());
    }

    #[test]
    fn trailing_odd_byte_is_a_transport_error() {
        let mut a = SampleAligner::new();
        assert_eq!(a.align(&[1, 2, 3]), vec![1, 2]);
        assert!(a.finish().is_err());
    }

    #[test]
    fn client_strips_trailing_slash() {
        let c = TtsClient::new("http://host:8000/", Duration::from_secs(5));
        assert_eq!(c.url("/health"), "http://host:8000/health");
    }
}
