// ABOUTME: Bounded capture of container stdout/stderr
// ABOUTME: Keeps at most a fixed number of bytes per stream and records whether the rest was dropped

use crate::engine::{OutputChunk, OutputStream, StreamType};
use crate::types::CapturedOutput;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Initial allocation per stream; buffers grow up to their cap on demand
const INITIAL_CAPACITY: usize = 8 * 1024;

/// Byte buffer that never grows past its cap
#[derive(Debug)]
pub struct CaptureBuffer {
    cap: usize,
    data: Vec<u8>,
    dropped: u64,
}

impl CaptureBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            data: Vec::with_capacity(cap.min(INITIAL_CAPACITY)),
            dropped: 0,
        }
    }

    /// Append a chunk, discarding whatever does not fit
    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.cap.saturating_sub(self.data.len());
        let take = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..take]);
        self.dropped += (chunk.len() - take) as u64;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped > 0
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.dropped
    }

    /// Convert to text. A multi-byte character split by the cap is dropped rather
    /// than replaced, so the text never exceeds the cap.
    pub fn to_output(&self) -> CapturedOutput {
        let bytes = if self.is_truncated() {
            trim_partial_char(&self.data)
        } else {
            &self.data[..]
        };

        CapturedOutput {
            text: String::from_utf8_lossy(bytes).into_owned(),
            truncated: self.is_truncated(),
        }
    }
}

/// Strip an incomplete UTF-8 sequence from the end of `bytes`
fn trim_partial_char(bytes: &[u8]) -> &[u8] {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes,
        Err(e) if e.error_len().is_none() => &bytes[..e.valid_up_to()],
        Err(_) => bytes,
    }
}

/// Paired stdout/stderr buffers for one execution
#[derive(Debug)]
pub struct OutputCapture {
    pub stdout: CaptureBuffer,
    pub stderr: CaptureBuffer,
}

impl OutputCapture {
    pub fn new(stdout_cap: usize, stderr_cap: usize) -> Self {
        Self {
            stdout: CaptureBuffer::new(stdout_cap),
            stderr: CaptureBuffer::new(stderr_cap),
        }
    }

    pub fn push(&mut self, chunk: &OutputChunk) {
        match chunk.stream {
            StreamType::Stdout => self.stdout.push(&chunk.data),
            StreamType::Stderr => self.stderr.push(&chunk.data),
        }
    }

    pub fn finish(&self) -> (CapturedOutput, CapturedOutput) {
        (self.stdout.to_output(), self.stderr.to_output())
    }
}

/// Capture shared between the draining task and the driver
pub type SharedCapture = Arc<Mutex<OutputCapture>>;

/// Drain an output stream into the shared capture until the stream closes.
/// Chunks are folded in as they arrive so partial output survives a kill.
pub async fn drain(mut stream: OutputStream, capture: SharedCapture) {
    let mut chunks = 0usize;
    while let Some(chunk) = stream.receiver.recv().await {
        chunks += 1;
        match capture.lock() {
            Ok(mut capture) => capture.push(&chunk),
            Err(poisoned) => poisoned.into_inner().push(&chunk),
        }
    }
    debug!("Output stream closed after {} chunks", chunks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10, 10, false)]
    #[case(11, 10, true)]
    #[case(0, 0, false)]
    #[case(4096, 10, true)]
    fn test_cap_applies_per_stream(
        #[case] written: usize,
        #[case] expected_len: usize,
        #[case] truncated: bool,
    ) {
        let mut buffer = CaptureBuffer::new(10);
        buffer.push(&vec![b'x'; written]);

        let output = buffer.to_output();
        assert_eq!(output.text.len(), expected_len);
        assert_eq!(output.truncated, truncated);
    }

    #[test]
    fn test_many_small_chunks_respect_cap() {
        let mut buffer = CaptureBuffer::new(5);
        for chunk in [&b"ab"[..], b"cd", b"ef", b"gh"] {
            buffer.push(chunk);
        }
        assert_eq!(buffer.to_output().text, "abcde");
        assert_eq!(buffer.dropped_bytes(), 3);
    }

    #[test]
    fn test_split_multibyte_char_is_dropped() {
        let mut buffer = CaptureBuffer::new(4);
        buffer.push("abcé".as_bytes()); // é is two bytes, only one fits

        let output = buffer.to_output();
        assert_eq!(output.text, "abc");
        assert!(output.text.len() <= 4);
        assert!(output.truncated);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut capture = OutputCapture::new(3, 100);
        capture.push(&OutputChunk {
            stream: StreamType::Stdout,
            data: b"hello".to_vec(),
        });
        capture.push(&OutputChunk {
            stream: StreamType::Stderr,
            data: b"oops".to_vec(),
        });

        let (stdout, stderr) = capture.finish();
        assert_eq!(stdout.text, "hel");
        assert!(stdout.truncated);
        assert_eq!(stderr.text, "oops");
        assert!(!stderr.truncated);
    }

    #[tokio::test]
    async fn test_drain_collects_until_close() {
        let (tx, stream) = OutputStream::channel();
        let capture: SharedCapture = Arc::new(Mutex::new(OutputCapture::new(64, 64)));

        let task = tokio::spawn(drain(stream, capture.clone()));
        tx.send(OutputChunk {
            stream: StreamType::Stdout,
            data: b"line 1\n".to_vec(),
        })
        .await
        .unwrap();
        tx.send(OutputChunk {
            stream: StreamType::Stdout,
            data: b"line 2\n".to_vec(),
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        let (stdout, _) = capture.lock().unwrap().finish();
        assert_eq!(stdout.text, "line 1\nline 2\n");
    }
}
