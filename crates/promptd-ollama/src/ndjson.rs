// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Newline-delimited JSON decoding of streaming generate responses.
//!
//! HTTP chunk boundaries do not line up with JSON lines, so bytes are
//! buffered until a full line is available.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};

use promptd_core::{ContinuationContext, Fragment, FragmentStream, PromptdError};

use crate::types::GenerateChunk;

/// Splits a byte stream into trimmed, non-empty lines.
///
/// A line that is not valid UTF-8 is reported as a malformed fragment.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already searched for a newline.
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, PromptdError>> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            let line = self.buffer.split_to(pos + 1);
            self.scanned = 0;
            if let Some(decoded) = decode_line(&line[..pos]) {
                lines.push(decoded);
            }
        }
        self.scanned = self.buffer.len();
        lines
    }

    /// The trailing line left when the body ends without a newline.
    pub fn finish(&mut self) -> Option<Result<String, PromptdError>> {
        let rest = self.buffer.split();
        self.scanned = 0;
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<Result<String, PromptdError>> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| Ok(text.to_string()))
        }
        Err(e) => Some(Err(PromptdError::Backend {
            message: format!("malformed fragment: invalid UTF-8: {e}"),
            source: Some(Box::new(e)),
        })),
    }
}

/// Convert one response line into a fragment.
pub fn parse_line(line: &str) -> Result<Fragment, PromptdError> {
    let chunk: GenerateChunk = serde_json::from_str(line).map_err(|e| PromptdError::Backend {
        message: format!("malformed fragment: {e}"),
        source: Some(Box::new(e)),
    })?;

    if let Some(error) = chunk.error {
        return Err(PromptdError::backend(format!("backend reported: {error}")));
    }

    Ok(Fragment {
        text: chunk.response,
        done: chunk.done,
        context: chunk.context.map(ContinuationContext::new),
    })
}

struct DecodeState<S> {
    bytes: S,
    decoder: LineDecoder,
    pending: VecDeque<Result<Fragment, PromptdError>>,
    finished: bool,
}

/// Turn a raw response body into a [`FragmentStream`].
///
/// A transport error becomes the final item of the stream.
pub fn decode_fragments<S, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in state.decoder.push(&chunk) {
                        state.pending.push_back(line.and_then(|l| parse_line(&l)));
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.push_back(Err(PromptdError::Backend {
                        message: format!("response stream failed: {e}"),
                        source: Some(Box::new(e)),
                    }));
                }
                None => {
                    state.finished = true;
                    if let Some(line) = state.decoder.finish() {
                        state.pending.push_back(line.and_then(|l| parse_line(&l)));
                    }
                }
            }
        }
    });

    Box::pin(stream)
}
