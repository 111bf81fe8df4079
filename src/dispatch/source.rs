//! Accelerometer sample sources for the monitor loop.
//!
//! Provides a unified trait for reading samples from a pre-recorded trace
//! (replay) or from JSON lines on any async reader (stdin for the CLI).

use crate::types::AccelerationSample;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

/// Events produced by a sample source.
pub enum SampleEvent {
    Sample(AccelerationSample),
    /// No more samples will arrive
    Eof,
}

/// Where accelerometer samples come from.
///
/// The monitor calls [`next_sample`](Self::next_sample) in a select! with cancellation.
#[async_trait]
pub trait SampleSource: Send + 'static {
    async fn next_sample(&mut self) -> Result<SampleEvent>;

    /// Human-readable name for logging
    fn source_name(&self) -> &str;
}

// ============================================================================
// Replay Source
// ============================================================================

/// Replays recorded samples, optionally paced.
pub struct ReplaySource {
    samples: std::vec::IntoIter<AccelerationSample>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(samples: Vec<AccelerationSample>, delay_ms: u64) -> Self {
        Self {
            samples: samples.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl SampleSource for ReplaySource {
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.samples.next() {
            Some(s) => {
                self.yielded_first = true;
                Ok(SampleEvent::Sample(s))
            }
            None => Ok(SampleEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// JSON Lines Source
// ============================================================================

/// Reads one JSON sample per line: `{"x":0.1,"y":-0.2,"z":0.98,"timestamp_ms":1200}`.
///
/// Blank and malformed lines are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    line_buffer: String,
    name: String,
}

impl<R: AsyncBufRead + Unpin + Send + 'static> JsonLinesSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            line_buffer: String::with_capacity(256),
            name: name.into(),
        }
    }
}

impl JsonLinesSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> SampleSource for JsonLinesSource<R> {
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SampleEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<AccelerationSample>(line) {
                Ok(sample) => return Ok(SampleEvent::Sample(sample)),
                Err(e) => tracing::warn!(source = %self.name, error = %e, "Skipping malformed sample"),
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_lines_skip_noise() {
        let input = b"\n{\"x\":1.0,\"y\":0.0,\"z\":0.0,\"timestamp_ms\":5}\nnot json\n{\"x\":2.0,\"y\":0.0,\"z\":0.0,\"timestamp_ms\":9}\n";
        let mut source = JsonLinesSource::new(&input[..], "test");

        let SampleEvent::Sample(first) = source.next_sample().await.unwrap() else {
            panic!("expected sample");
        };
        assert_eq!(first.timestamp_ms, 5);
        let SampleEvent::Sample(second) = source.next_sample().await.unwrap() else {
            panic!("expected sample");
        };
        assert_eq!(second.timestamp_ms, 9);
        assert!(matches!(source.next_sample().await.unwrap(), SampleEvent::Eof));
    }

    #[tokio::test]
    async fn replay_ends_with_eof() {
        let mut source = ReplaySource::new(vec![AccelerationSample::new(0.0, 0.0, 1.0, 0)], 0);
        assert!(matches!(source.next_sample().await.unwrap(), SampleEvent::Sample(_)));
        assert!(matches!(source.next_sample().await.unwrap(), SampleEvent::Eof));
    }
}
